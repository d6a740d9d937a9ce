//! Execution core of a small, pluggable command language.
//!
//! A line is split into tokens by the [`lexer`], each argument is coerced into
//! a typed [`Value`], and the command name is dispatched through the
//! [`Registry`](command::Registry) owned by a [`Runner`]. Handlers work on a
//! per-session [`Environment`]: a variable store, a transcript of output lines
//! and a `last` register. The C-like family extends it with a simulated
//! [`Heap`](heap::Heap) offering `malloc`/`free` style allocation.
//!
//! The core is synchronous and not thread-safe: drive each environment from
//! one command stream at a time.

mod builtin;
pub mod command;
pub mod env;
pub mod heap;
pub mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod value;

pub use env::{Environment, HeapEnvironment};
pub use interpreter::{ErrorPolicy, Runner};
pub use value::Value;
