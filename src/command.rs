use crate::env::Environment;
use crate::interpreter::{ExecError, Runner};
use crate::value::Value;
use std::borrow::BorrowMut;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// How many blocks may run inside each other before a nested line is refused.
pub const MAX_BLOCK_DEPTH: usize = 64;

/// Errors raised while building a command registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Commands can only be added to the registry of a concrete language family.
    #[error("cannot register `{command}` on the abstract base registry")]
    AbstractFamily { command: String },
}

/// A command implementation.
///
/// Receives the already coerced positional arguments and the calling
/// [`Context`]. Results are communicated through the environment only.
pub type Handler<E> = Box<dyn Fn(&[Value], &mut Context<'_, E>) -> anyhow::Result<()>>;

/// The environment a handler runs against, plus access to the runner that dispatched it.
///
/// Dereferences to the environment.
pub struct Context<'a, E> {
    env: &'a mut E,
    runner: &'a Runner<E>,
    /// Number of enclosing blocks, 0 for a top-level line.
    depth: usize,
}

impl<'a, E> Context<'a, E> {
    pub(crate) fn new(env: &'a mut E, runner: &'a Runner<E>, depth: usize) -> Self {
        Self { env, runner, depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn env(&mut self) -> &mut E {
        self.env
    }

    /// Run a nested line (e.g. the content of a block) against the same environment.
    ///
    /// Nested failures are always returned so the calling handler can propagate them.
    /// Fails without running anything once [`MAX_BLOCK_DEPTH`] blocks are open.
    pub fn run_line(&mut self, line: &str) -> Result<(), ExecError> {
        if self.depth >= MAX_BLOCK_DEPTH {
            return Err(ExecError::NestingTooDeep {
                limit: MAX_BLOCK_DEPTH,
            });
        }
        let mut invocation = self.runner.parse(line, self.env)?;
        invocation.depth = self.depth + 1;
        invocation.run()?;
        Ok(())
    }
}

impl<E: BorrowMut<Environment>> Context<'_, E> {
    /// The plain variable store / transcript part of the environment.
    pub fn base(&mut self) -> &mut Environment {
        <E as BorrowMut<Environment>>::borrow_mut(self.env)
    }
}

impl<E> Deref for Context<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.env
    }
}

impl<E> DerefMut for Context<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.env
    }
}

/// Command table of one language family.
///
/// Each family owns its registry, so commands never leak between families.
/// The abstract [`Registry::base`] exists only as a placeholder and refuses
/// every registration.
pub struct Registry<E> {
    family: Option<&'static str>,
    commands: HashMap<String, Handler<E>>,
}

impl<E> Registry<E> {
    /// Empty registry for the concrete family `family`.
    pub fn new(family: &'static str) -> Self {
        Self {
            family: Some(family),
            commands: HashMap::new(),
        }
    }

    /// The abstract base registry, which cannot hold commands.
    pub fn base() -> Self {
        Self {
            family: None,
            commands: HashMap::new(),
        }
    }

    pub fn family(&self) -> Option<&'static str> {
        self.family
    }

    /// Bind `name` to `handler`, replacing any previous binding.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&[Value], &mut Context<'_, E>) -> anyhow::Result<()> + 'static,
    {
        let name = name.into();
        if self.family.is_none() {
            return Err(ConfigError::AbstractFamily { command: name });
        }
        self.commands.insert(name, Box::new(handler));
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Handler<E>> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_args: &[Value], _ctx: &mut Context<'_, Environment>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_base_registry_refuses_commands() {
        let mut registry = Registry::<Environment>::base();
        let err = registry.register("echo", noop).err();
        assert_eq!(
            err,
            Some(ConfigError::AbstractFamily {
                command: "echo".into()
            })
        );
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_concrete_registry_binds_names() -> Result<(), ConfigError> {
        let mut registry = Registry::<Environment>::new("test");
        registry.register("b", noop)?.register("a", noop)?;
        assert_eq!(registry.family(), Some("test"));
        assert_eq!(registry.names(), ["a", "b"]);
        assert!(registry.contains("a"));
        assert!(registry.get("c").is_none());
        Ok(())
    }

    #[test]
    fn test_families_do_not_share_commands() -> Result<(), ConfigError> {
        let mut first = Registry::<Environment>::new("first");
        let second = Registry::<Environment>::new("second");
        first.register("only_here", noop)?;
        assert!(first.contains("only_here"));
        assert!(!second.contains("only_here"));
        Ok(())
    }
}
