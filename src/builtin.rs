//! Built-in commands of the shipped language families.
//!
//! Common commands are generic over any environment that contains a plain
//! [`Environment`], so the heap family reuses them as-is.

use crate::command::{Context, Registry};
use crate::env::{Environment, HeapEnvironment};
use crate::heap::{Address, hex_index};
use crate::value::{HexValue, Value};
use anyhow::{Context as _, Result, anyhow, bail};
use std::borrow::BorrowMut;

/// Register the commands every family shares.
pub(crate) fn register_common<E: BorrowMut<Environment> + 'static>(registry: &mut Registry<E>) {
    let commands: [(&str, fn(&[Value], &mut Context<'_, E>) -> Result<()>); 10] = [
        ("echo", echo::<E>),
        ("set", set::<E>),
        ("get", get::<E>),
        ("del", del::<E>),
        ("vars", vars::<E>),
        ("last", last::<E>),
        ("hex", hex::<E>),
        ("len", len::<E>),
        ("run", run::<E>),
        ("repeat", repeat::<E>),
    ];
    for (name, handler) in commands {
        // Only the abstract base registry refuses commands, and families are always concrete.
        if let Err(e) = registry.register(name, handler) {
            tracing::warn!(error = %e, "builtin not registered");
        }
    }
}

/// Register the heap commands of the C-like family.
pub(crate) fn register_heap(registry: &mut Registry<HeapEnvironment>) {
    let commands: [(&str, fn(&[Value], &mut Context<'_, HeapEnvironment>) -> Result<()>); 5] = [
        ("malloc", malloc),
        ("free", free),
        ("heapget", heapget),
        ("heapset", heapset),
        ("heapinfo", heapinfo),
    ];
    for (name, handler) in commands {
        if let Err(e) = registry.register(name, handler) {
            tracing::warn!(error = %e, "builtin not registered");
        }
    }
}

fn expect_args(command: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        bail!(
            "{command}: expected {expected} argument(s), got {}",
            args.len()
        );
    }
    Ok(())
}

fn identifier(command: &str, value: &Value) -> Result<String> {
    value
        .as_identifier()
        .ok_or_else(|| anyhow!("{command}: `{value}` is not a name"))
}

fn resolve<E: BorrowMut<Environment>>(ctx: &mut Context<'_, E>, value: &Value) -> Result<Value> {
    Ok(ctx.base().resolve(value)?)
}

fn count(command: &str, value: &Value) -> Result<usize> {
    match value {
        Value::Integer(i) if *i >= 0 => Ok(usize::try_from(*i)?),
        Value::Hex(h) => Ok(usize::try_from(h.value())?),
        other => bail!("{command}: `{other}` is not a count"),
    }
}

/// `echo v...`: output the arguments joined by spaces.
fn echo<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    let mut values = args
        .iter()
        .map(|a| resolve(ctx, a))
        .collect::<Result<Vec<_>>>()?;
    if values.len() == 1 {
        // A single argument keeps its type in `last`.
        let value = values.remove(0);
        ctx.base().output(value);
    } else {
        let line = values
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        ctx.base().output(line);
    }
    Ok(())
}

/// `set name value`
fn set<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("set", args, 2)?;
    let name = identifier("set", &args[0])?;
    let value = resolve(ctx, &args[1])?;
    ctx.base().set(name, value);
    Ok(())
}

/// `get name`: output a variable.
fn get<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("get", args, 1)?;
    let name = identifier("get", &args[0])?;
    let value = ctx.base().get(&name)?;
    ctx.base().output(value);
    Ok(())
}

fn del<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("del", args, 1)?;
    let name = identifier("del", &args[0])?;
    ctx.base().remove(&name)?;
    Ok(())
}

fn vars<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("vars", args, 0)?;
    let names = ctx.base().names().join(" ");
    ctx.base().output(names);
    Ok(())
}

/// `last name`: store the `last` register into a variable.
fn last<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("last", args, 1)?;
    let name = identifier("last", &args[0])?;
    let env = ctx.base();
    let value = env.last().clone();
    env.set(name, value);
    Ok(())
}

/// `hex v`: output the `0x` form of a non-negative number.
fn hex<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("hex", args, 1)?;
    let rendered = match resolve(ctx, &args[0])? {
        Value::Hex(h) => h.as_hex(),
        Value::Integer(i) if i >= 0 => HexValue(i.unsigned_abs()).as_hex(),
        other => bail!("hex: `{other}` is not a non-negative integer"),
    };
    ctx.base().output(rendered);
    Ok(())
}

/// `len v`: output the length of a string or composite.
fn len<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("len", args, 1)?;
    let n = match resolve(ctx, &args[0])? {
        Value::String(s) => s.chars().count(),
        Value::Composite(serde_json::Value::Array(items)) => items.len(),
        Value::Composite(serde_json::Value::Object(map)) => map.len(),
        other => bail!("len: {} has no length", other.type_name()),
    };
    ctx.base().output(Value::Integer(i64::try_from(n)?));
    Ok(())
}

fn block_line<E: BorrowMut<Environment>>(command: &str, ctx: &mut Context<'_, E>, value: &Value) -> Result<String> {
    match resolve(ctx, value)? {
        Value::Block(b) => Ok(b.converted().to_string()),
        Value::String(s) => Ok(s),
        other => bail!("{command}: expected a block, got {}", other.type_name()),
    }
}

/// `run (line)`: execute the content of a block.
fn run<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("run", args, 1)?;
    let line = block_line("run", ctx, &args[0])?;
    ctx.run_line(&line)?;
    Ok(())
}

/// `repeat n (line)`
fn repeat<E: BorrowMut<Environment>>(args: &[Value], ctx: &mut Context<'_, E>) -> Result<()> {
    expect_args("repeat", args, 2)?;
    let times = count("repeat", &resolve(ctx, &args[0])?)?;
    let line = block_line("repeat", ctx, &args[1])?;
    for _ in 0..times {
        ctx.run_line(&line)?;
    }
    Ok(())
}

fn address(ctx: &mut Context<'_, HeapEnvironment>, value: &Value) -> Result<Address> {
    let value = resolve(ctx, value)?;
    Ok(Address::try_from(&value)?)
}

fn offset(ctx: &mut Context<'_, HeapEnvironment>, value: &Value) -> Result<usize> {
    let value = resolve(ctx, value)?;
    Ok(hex_index(&value)?)
}

/// `malloc name count`: allocate and store the address in `name`.
fn malloc(args: &[Value], ctx: &mut Context<'_, HeapEnvironment>) -> Result<()> {
    expect_args("malloc", args, 2)?;
    let name = identifier("malloc", &args[0])?;
    let slots = count("malloc", &resolve(ctx, &args[1])?)?;
    match ctx.alloc(slots) {
        Some(address) => ctx.set(name, Value::String(address.to_string())),
        None => {
            ctx.output("out of memory");
            ctx.set(name, Value::Null);
        }
    }
    Ok(())
}

fn free(args: &[Value], ctx: &mut Context<'_, HeapEnvironment>) -> Result<()> {
    expect_args("free", args, 1)?;
    let address = address(ctx, &args[0])?;
    ctx.free(address).context("free")?;
    Ok(())
}

/// `heapget addr offset`: output one slot.
fn heapget(args: &[Value], ctx: &mut Context<'_, HeapEnvironment>) -> Result<()> {
    expect_args("heapget", args, 2)?;
    let address = address(ctx, &args[0])?;
    let offset = offset(ctx, &args[1])?;
    let value = ctx.heap_get(address, offset)?;
    ctx.output(value);
    Ok(())
}

/// `heapset addr offset value`
fn heapset(args: &[Value], ctx: &mut Context<'_, HeapEnvironment>) -> Result<()> {
    expect_args("heapset", args, 3)?;
    let address = address(ctx, &args[0])?;
    let offset = offset(ctx, &args[1])?;
    let value = resolve(ctx, &args[2])?;
    ctx.heap_set(address, offset, value)?;
    Ok(())
}

/// `heapinfo`: output `used/usable` cell counts.
fn heapinfo(args: &[Value], ctx: &mut Context<'_, HeapEnvironment>) -> Result<()> {
    expect_args("heapinfo", args, 0)?;
    let heap = ctx.heap();
    let line = format!("{}/{}", heap.used(), heap.capacity().saturating_sub(1));
    ctx.output(line);
    Ok(())
}
