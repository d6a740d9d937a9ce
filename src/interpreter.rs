use crate::builtin;
use crate::command::{Context, Registry};
use crate::env::{Environment, HeapEnvironment};
use crate::lexer;
use crate::value::{CoercionError, Value, to_typed};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;

/// How a runner treats a failing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Unknown commands and handler failures are logged and dropped.
    #[default]
    Lenient,
    /// Failures are returned to the caller.
    Strict,
}

/// Why a dispatched command did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("command not found: {name}")]
    UnknownCommand { name: String },
    #[error("{command}: {source:#}")]
    Handler {
        command: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failure of a whole line: either its arguments did not coerce, or the command failed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("block nesting too deep (limit {limit})")]
    NestingTooDeep { limit: usize },
}

/// A parsed command line bound to the environment it will run against.
pub struct Invocation<'r, 'e, E> {
    runner: &'r Runner<E>,
    command: String,
    args: Vec<Value>,
    env: &'e mut E,
    pub(crate) depth: usize,
}

impl<E> Invocation<'_, '_, E> {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Dispatch the command and report any failure.
    ///
    /// Side effects performed by a handler before it failed are kept.
    pub fn run(self) -> Result<(), RunError> {
        let Some(handler) = self.runner.registry.get(&self.command) else {
            return Err(RunError::UnknownCommand { name: self.command });
        };
        tracing::debug!(command = %self.command, args = self.args.len(), "dispatch");
        let mut ctx = Context::new(self.env, self.runner, self.depth);
        handler(&self.args, &mut ctx).map_err(|source| RunError::Handler {
            command: self.command,
            source,
        })
    }

    /// Dispatch the command, dropping the failure under [`ErrorPolicy::Lenient`].
    pub fn run_with(self, policy: ErrorPolicy) -> Result<(), RunError> {
        match (self.run(), policy) {
            (Err(e), ErrorPolicy::Lenient) => {
                tracing::debug!(error = %e, "command failed, ignored");
                Ok(())
            }
            (result, _) => result,
        }
    }
}

/// A command language family: a registry of commands over one environment type.
///
/// ```
/// use cmdlang::{Environment, ErrorPolicy, Runner};
///
/// let runner = Runner::basic();
/// let mut env = Environment::new();
/// runner.run_line("echo \"hi\"", &mut env, ErrorPolicy::Strict).unwrap();
/// assert_eq!(env.chat().last().map(String::as_str), Some("hi"));
/// ```
pub struct Runner<E> {
    registry: Registry<E>,
}

impl<E> Runner<E> {
    /// Create a runner over a custom registry.
    pub fn new(registry: Registry<E>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry<E> {
        &self.registry
    }

    /// Tokenize `line` and coerce its arguments, binding the result to `env`.
    ///
    /// Coercion does not touch `env`; variable references stay unresolved.
    pub fn parse<'r, 'e>(
        &'r self,
        line: &str,
        env: &'e mut E,
    ) -> Result<Invocation<'r, 'e, E>, CoercionError> {
        let mut tokens = lexer::split_line(line).into_iter();
        let command = tokens.next().unwrap_or_default();
        let args = tokens
            .map(|t| to_typed(&t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Invocation {
            runner: self,
            command,
            args,
            env,
            depth: 0,
        })
    }

    /// Parse and run a single line.
    ///
    /// Coercion errors are returned under any policy.
    pub fn run_line(&self, line: &str, env: &mut E, policy: ErrorPolicy) -> Result<(), ExecError> {
        self.parse(line, env)?.run_with(policy)?;
        Ok(())
    }

    /// Run every non-blank line of `text` in order.
    ///
    /// Lines are split with the same rules as arguments, so a newline inside a
    /// quote or block does not end the line. Under [`ErrorPolicy::Strict`] the
    /// first failure stops the script.
    pub fn run_script(&self, text: &str, env: &mut E, policy: ErrorPolicy) -> Result<(), ExecError> {
        for line in lexer::split_into_tokens(text, '\n') {
            self.run_line(&line, env, policy)?;
        }
        Ok(())
    }

    /// Interactive loop reading lines from the terminal until EOF or interrupt.
    pub fn repl(&self, env: &mut E, policy: ErrorPolicy) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let prompt = format!("{}> ", self.registry.family().unwrap_or("base"));

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    if let Err(e) = self.run_line(&line, env, policy) {
                        eprintln!("error: {e}");
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

impl Runner<Environment> {
    /// The plain family: variables, output and blocks.
    pub fn basic() -> Self {
        let mut registry = Registry::new("basic");
        builtin::register_common(&mut registry);
        Self::new(registry)
    }
}

impl Runner<HeapEnvironment> {
    /// The C-like family: every plain command plus a simulated heap.
    pub fn c_like() -> Self {
        let mut registry = Registry::new("c");
        builtin::register_common(&mut registry);
        builtin::register_heap(&mut registry);
        Self::new(registry)
    }
}
