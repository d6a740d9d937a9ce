use crate::heap::{Address, Heap, HeapError};
use crate::value::Value;
use std::borrow::{Borrow, BorrowMut};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// Errors raised by variable lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("name `{name}` is not defined")]
    UnknownVariable { name: String },
}

/// Listener notified of every line passed to [`Environment::output`].
///
/// A failing listener never aborts the command that produced the output.
pub trait OutputSink {
    fn emit(&mut self, line: &str) -> anyhow::Result<()>;
}

/// Per-session state driven by command handlers.
///
/// The environment contains:
/// - a variable store keyed by name;
/// - the `last` register, holding the most recently output or retrieved value;
/// - the transcript of every line emitted through [`Environment::output`].
pub struct Environment {
    vars: HashMap<String, Value>,
    last: Value,
    chat: Vec<String>,
    sink: Option<Box<dyn OutputSink>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Create an empty environment without a listener.
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            last: Value::String(String::new()),
            chat: Vec::new(),
            sink: None,
        }
    }

    /// Create an empty environment that forwards output to `sink`.
    pub fn with_sink(sink: impl OutputSink + 'static) -> Self {
        let mut env = Self::new();
        env.sink = Some(Box::new(sink));
        env
    }

    /// Replace the output listener; lines already emitted are not replayed.
    pub fn set_sink(&mut self, sink: impl OutputSink + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// The `last` register.
    pub fn last(&self) -> &Value {
        &self.last
    }

    pub(crate) fn set_last(&mut self, value: Value) {
        self.last = value;
    }

    /// Every line output so far, oldest first.
    pub fn chat(&self) -> &[String] {
        &self.chat
    }

    /// Render `value`, notify the listener, append it to the transcript and make it `last`.
    pub fn output(&mut self, value: impl Into<Value>) {
        let value = value.into();
        let line = value.to_string();
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.emit(&line) {
                tracing::warn!(error = %e, "output listener failed");
            }
        }
        self.chat.push(line);
        self.last = value;
    }

    /// Look a variable up and make it `last`.
    pub fn get(&mut self, name: &str) -> Result<Value, EnvError> {
        let value = self
            .vars
            .get(name)
            .cloned()
            .ok_or_else(|| EnvError::UnknownVariable {
                name: name.to_string(),
            })?;
        self.last = value.clone();
        Ok(value)
    }

    /// Insert or overwrite a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Result<Value, EnvError> {
        self.vars.remove(name).ok_or_else(|| EnvError::UnknownVariable {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Defined variable names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Replace a variable reference by its value; other values are returned as-is.
    pub fn resolve(&mut self, value: &Value) -> Result<Value, EnvError> {
        match value {
            Value::Variable(name) => self.get(name),
            other => Ok(other.clone()),
        }
    }
}

/// An [`Environment`] extended with a simulated heap.
///
/// Dereferences to the inner environment, so every plain command works on it too.
#[derive(Default)]
pub struct HeapEnvironment {
    base: Environment,
    heap: Heap,
}

impl HeapEnvironment {
    pub fn new(heap_cells: usize) -> Self {
        Self {
            base: Environment::new(),
            heap: Heap::new(heap_cells),
        }
    }

    pub fn with_sink(heap_cells: usize, sink: impl OutputSink + 'static) -> Self {
        Self {
            base: Environment::with_sink(sink),
            heap: Heap::new(heap_cells),
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn alloc(&mut self, count: usize) -> Option<Address> {
        self.heap.allocate(count)
    }

    pub fn free(&mut self, address: Address) -> Result<(), HeapError> {
        self.heap.free(address)
    }

    /// Read a heap slot and make it `last`. An unwritten slot reads as [`Value::Null`].
    pub fn heap_get(&mut self, address: Address, offset: usize) -> Result<Value, HeapError> {
        let value = self.heap.read(address, offset)?.cloned().unwrap_or(Value::Null);
        self.base.set_last(value.clone());
        Ok(value)
    }

    pub fn heap_set(&mut self, address: Address, offset: usize, value: Value) -> Result<(), HeapError> {
        self.heap.write(address, offset, value)
    }
}

impl Deref for HeapEnvironment {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        &self.base
    }
}

impl DerefMut for HeapEnvironment {
    fn deref_mut(&mut self) -> &mut Environment {
        &mut self.base
    }
}

impl Borrow<Environment> for HeapEnvironment {
    fn borrow(&self) -> &Environment {
        &self.base
    }
}

impl BorrowMut<Environment> for HeapEnvironment {
    fn borrow_mut(&mut self) -> &mut Environment {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::MemorySink;

    struct BrokenSink;

    impl OutputSink for BrokenSink {
        fn emit(&mut self, _line: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("listener went away"))
        }
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();
        assert_eq!(
            env.get("x"),
            Err(EnvError::UnknownVariable { name: "x".into() })
        );

        env.set("x", Value::Integer(3));
        assert_eq!(env.last(), &Value::String(String::new()));
        assert_eq!(env.get("x"), Ok(Value::Integer(3)));
        assert_eq!(env.last(), &Value::Integer(3));
    }

    #[test]
    fn test_output_appends_and_updates_last() {
        let (sink, lines) = MemorySink::with_handle();
        let mut env = Environment::with_sink(sink);
        env.output(Value::Float(2.5));
        env.output("hi");

        assert_eq!(env.chat(), ["2.5", "hi"]);
        assert_eq!(env.last(), &Value::String("hi".into()));
        assert_eq!(*std::cell::RefCell::borrow(&lines), vec!["2.5".to_string(), "hi".to_string()]);
    }

    #[test]
    fn test_replaced_sink_gets_later_output_only() {
        let (first, first_lines) = MemorySink::with_handle();
        let (second, second_lines) = MemorySink::with_handle();
        let mut env = Environment::with_sink(first);
        env.output("before");
        env.set_sink(second);
        env.output("after");

        assert_eq!(env.chat(), ["before", "after"]);
        assert_eq!(*std::cell::RefCell::borrow(&first_lines), vec!["before".to_string()]);
        assert_eq!(*std::cell::RefCell::borrow(&second_lines), vec!["after".to_string()]);
    }

    #[test]
    fn test_failing_sink_does_not_abort_output() {
        let mut env = Environment::with_sink(BrokenSink);
        env.output(Value::Integer(1));
        assert_eq!(env.chat(), ["1"]);
        assert_eq!(env.last(), &Value::Integer(1));
    }

    #[test]
    fn test_resolve_and_remove() {
        let mut env = Environment::new();
        env.set("b", Value::String("v".into()));
        env.set("a", Value::Integer(1));
        assert_eq!(env.names(), ["a", "b"]);
        assert_eq!(env.resolve(&Value::Variable("b".into())), Ok(Value::String("v".into())));
        assert_eq!(env.resolve(&Value::Integer(9)), Ok(Value::Integer(9)));

        assert_eq!(env.remove("a"), Ok(Value::Integer(1)));
        assert!(!env.contains("a"));
        assert!(env.remove("a").is_err());
    }

    #[test]
    fn test_heap_environment_get_sets_last() {
        let mut env = HeapEnvironment::default();
        let a = env.alloc(2).unwrap();
        env.heap_set(a, 1, Value::Integer(5)).unwrap();

        assert_eq!(env.heap_get(a, 1), Ok(Value::Integer(5)));
        assert_eq!(env.last(), &Value::Integer(5));
        assert_eq!(env.heap_get(a, 0), Ok(Value::Null));
        assert_eq!(env.last(), &Value::Null);
        assert!(env.heap_get(a, 2).is_err());

        env.free(a).unwrap();
        assert!(env.heap_get(a, 0).is_err());
    }
}
