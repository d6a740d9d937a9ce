use argh::FromArgs;
use cmdlang::heap::DEFAULT_HEAP_CELLS;
use cmdlang::io_adapters::StdoutSink;
use cmdlang::{Environment, ErrorPolicy, HeapEnvironment, Runner};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// Run command-language scripts, or start an interactive session.
struct Args {
    #[argh(option, default = "String::from(\"basic\")")]
    /// language family: `basic` or `c`
    family: String,

    #[argh(switch)]
    /// report every failing command instead of ignoring it
    strict: bool,

    #[argh(option, default = "DEFAULT_HEAP_CELLS")]
    /// number of heap cells for the `c` family, the reserved null cell included
    heap_cells: usize,

    #[argh(switch, short = 'v')]
    /// enable debug logging on stderr
    verbose: bool,

    #[argh(positional)]
    /// script to run; starts the REPL when omitted
    script: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    // Only initialize if asked for, so the transcript on stdout stays clean.
    if !verbose && std::env::var("RUST_LOG").is_err() {
        return;
    }
    let filter = if verbose {
        EnvFilter::new("cmdlang=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn drive<E>(runner: &Runner<E>, env: &mut E, args: &Args, policy: ErrorPolicy) -> anyhow::Result<()> {
    match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
            runner.run_script(&text, env, policy)?;
        }
        None => runner.repl(env, policy)?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    init_tracing(args.verbose);

    let policy = if args.strict {
        ErrorPolicy::Strict
    } else {
        ErrorPolicy::Lenient
    };

    match args.family.as_str() {
        "basic" => {
            let mut env = Environment::with_sink(StdoutSink);
            drive(&Runner::basic(), &mut env, &args, policy)
        }
        "c" => {
            if args.heap_cells < 2 {
                anyhow::bail!("--heap-cells must be at least 2, cell 0 is reserved");
            }
            let mut env = HeapEnvironment::with_sink(args.heap_cells, StdoutSink);
            drive(&Runner::c_like(), &mut env, &args, policy)
        }
        other => anyhow::bail!("unknown family `{other}`, expected `basic` or `c`"),
    }
}
