#![allow(dead_code)]

//! Task bodies shared by the integration tests.

use anyhow::anyhow;
use jobdag::dag::{Outcome, Payload, TaskContext};
use jobdag::exec::FunctionRegistry;
use serde_json::{json, Value};

/// Reference Fibonacci with the base cases the scenario tests expect:
/// fib(0)=0, fib(1)=1, fib(2)=2, so every later value is shifted by one
/// position against the canonical sequence (fib(6) = 13).
pub fn shifted_fib(n: u64) -> u64 {
    match n {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => shifted_fib(n - 1) + shifted_fib(n - 2),
    }
}

/// Recursive fan-out: spawn fib(n-1) and fib(n-2), continue with their sum.
pub fn fib_payload(n: u64) -> Payload {
    Payload::thunk(move |ctx| {
        if n <= 2 {
            return Outcome::value(shifted_fib(n));
        }
        let a = ctx.spawn(fib_payload(n - 1), vec![])?;
        let b = ctx.spawn(fib_payload(n - 2), vec![])?;
        Outcome::continue_with(sum_of_deps(), vec![a, b])
    })
}

/// Final step: add up the integer results of every dependency.
pub fn sum_of_deps() -> Payload {
    Payload::value_fn(|ctx: &TaskContext| {
        let mut total = 0i64;
        for dep in ctx.deps() {
            total += ctx.result_as::<i64>(*dep)?;
        }
        Ok(total)
    })
}

/// `sum(items)` as `head + sum(tail)`, with the tail spawned as a sub-task.
pub fn split_sum(items: Vec<i64>) -> Payload {
    Payload::thunk(move |ctx| match items.split_first() {
        None => Outcome::value(0),
        Some((head, [])) => Outcome::value(*head),
        Some((head, tail)) => {
            let rest = ctx.spawn(split_sum(tail.to_vec()), vec![])?;
            let head = *head;
            let finish = Payload::value_fn(move |ctx: &TaskContext| {
                Ok(head + ctx.result_as::<i64>(rest)?)
            });
            Outcome::continue_with(finish, vec![rest])
        }
    })
}

/// Registry used by the batch and pool tests.
///
/// - `double(x)` = 2x
/// - `add(a, b)` = a + b
/// - `hooray()` = "Hooray"
/// - `boom(msg)` always fails with `msg`
/// - `sum_deps()` adds the values of every dependency
/// - `countdown(n)` continues with `countdown(n-1)` until 0, then returns "done"
/// - `nap(ms)` sleeps the worker thread for `ms` and returns `ms`
pub fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .register_typed("double", |(x,): (i64,)| Ok(x * 2))
        .register_typed("add", |(a, b): (i64, i64)| Ok(a + b))
        .register("hooray", |_ctx, _args| Outcome::value("Hooray"))
        .register("boom", |_ctx, args| {
            let msg = args.first().and_then(Value::as_str).unwrap_or("boom");
            Err(anyhow!("{msg}"))
        })
        .register("sum_deps", |ctx, _args| {
            let mut total = 0i64;
            for dep in ctx.deps() {
                total += ctx.result_as::<i64>(*dep)?;
            }
            Outcome::value(total)
        })
        .register("countdown", |_ctx, args| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            if n <= 0 {
                Outcome::value("done")
            } else {
                Outcome::continue_with(Payload::call("countdown", vec![json!(n - 1)]), vec![])
            }
        })
        .register_typed("nap", |(ms,): (u64,)| {
            std::thread::sleep(std::time::Duration::from_millis(ms));
            Ok(ms)
        });
    registry
}
