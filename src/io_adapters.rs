use crate::env::OutputSink;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Sink printing every emitted line to standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, line: &str) -> anyhow::Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

/// Memory-backed sink collecting emitted lines.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: create a sink and return it with a handle to the collected lines.
    pub fn with_handle() -> (Self, Rc<RefCell<Vec<String>>>) {
        let sink = MemorySink::new();
        let rc = sink.lines.clone();
        (sink, rc)
    }
}

impl OutputSink for MemorySink {
    fn emit(&mut self, line: &str) -> anyhow::Result<()> {
        self.lines.borrow_mut().push(line.to_string());
        Ok(())
    }
}
