// src/exec/registry.rs

//! Named function registry.
//!
//! Payloads that leave the process carry a function name plus JSON arguments.
//! Whoever executes them (the local pool, a worker, a fake substrate) resolves
//! the name here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::dag::{Function, Outcome, Payload, TaskContext, TaskFn};

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, TaskFn>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function that sees the raw context and argument list.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&TaskContext, &[Value]) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    /// Register a plain function over typed arguments.
    ///
    /// The argument list is decoded as one JSON array into `A`, so a function
    /// of two integers takes `(i64, i64)` and a single-argument one `(i64,)`.
    pub fn register_typed<A, R, F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.register(name, move |_ctx, args| {
            let decoded: A = serde_json::from_value(Value::Array(args.to_vec()))
                .with_context(|| format!("decoding arguments of `{label}`"))?;
            Outcome::value(f(decoded)?)
        })
    }

    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Named handle for a registered function, usable in `run`/`map`.
    pub fn function(&self, name: &str) -> anyhow::Result<Function> {
        if !self.contains(name) {
            return Err(anyhow!("function `{name}` is not registered"));
        }
        Ok(Function::named(name))
    }

    /// The callable behind a payload.
    pub fn resolve(&self, payload: &Payload) -> anyhow::Result<TaskFn> {
        match &payload.function {
            Function::Closure(f) => Ok(f.clone()),
            Function::Named(name) => self
                .get(name)
                .ok_or_else(|| anyhow!("function `{name}` is not registered")),
        }
    }

    /// Run a payload with the given context.
    pub fn invoke(&self, ctx: &TaskContext, payload: &Payload) -> anyhow::Result<Outcome> {
        let f = self.resolve(payload)?;
        f(ctx, &payload.args)
    }
}
