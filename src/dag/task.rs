// src/dag/task.rs

//! Task records and the values that flow through them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::JobdagError;
use crate::types::{TaskId, TaskState};

/// Body of an in-process task.
pub type TaskFn = Arc<dyn Fn(&TaskContext, &[Value]) -> anyhow::Result<Outcome> + Send + Sync>;

/// The function part of a payload.
///
/// Only `Named` functions can leave the process: a remote substrate or HTTP
/// worker resolves the name in its own registry.
#[derive(Clone)]
pub enum Function {
    Named(String),
    Closure(TaskFn),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Function::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl Function {
    pub fn named(name: impl Into<String>) -> Self {
        Function::Named(name.into())
    }

    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&TaskContext, &[Value]) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Function::Closure(Arc::new(f))
    }

    /// Bind arguments to this function.
    pub fn with_args(&self, args: Vec<Value>) -> Payload {
        Payload {
            function: self.clone(),
            args,
        }
    }
}

/// Executable unit captured at task-creation time.
#[derive(Debug, Clone)]
pub struct Payload {
    pub function: Function,
    pub args: Vec<Value>,
}

impl Payload {
    /// Call a registered function by name.
    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: Function::Named(name.into()),
            args,
        }
    }

    /// Wrap a closure taking the task context and the argument list.
    pub fn closure<F>(f: F, args: Vec<Value>) -> Self
    where
        F: Fn(&TaskContext, &[Value]) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self {
            function: Function::Closure(Arc::new(f)),
            args,
        }
    }

    /// A closure with no arguments that only needs the context.
    pub fn thunk<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self::closure(move |ctx, _args| f(ctx), Vec::new())
    }

    /// A closure with no arguments producing a final value.
    pub fn value_fn<F, R>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Serialize,
    {
        Self::thunk(move |ctx| Outcome::value(f(ctx)?))
    }

    /// Name of the function, if this payload can be shipped out of process.
    pub fn function_name(&self) -> Option<&str> {
        match &self.function {
            Function::Named(name) => Some(name),
            Function::Closure(_) => None,
        }
    }
}

/// What a task execution produced.
///
/// `Continuation` re-arms the same task id as Pending with a new payload and
/// new deps instead of resolving it.
#[derive(Debug, Clone)]
pub enum Outcome {
    Final(Value),
    Continuation { payload: Payload, deps: Vec<TaskId> },
}

impl Outcome {
    /// Final outcome from any serializable value.
    pub fn value<T: Serialize>(value: T) -> anyhow::Result<Self> {
        Ok(Outcome::Final(
            serde_json::to_value(value).context("serializing task result")?,
        ))
    }

    /// Continuation re-running `payload` once every id in `deps` is done.
    pub fn continue_with(payload: Payload, deps: Vec<TaskId>) -> anyhow::Result<Self> {
        Ok(Outcome::Continuation { payload, deps })
    }

    /// Encode for a remote unit. Closure continuations cannot be encoded.
    pub fn to_wire(&self) -> anyhow::Result<WireOutcome> {
        match self {
            Outcome::Final(value) => Ok(WireOutcome::Final {
                value: value.clone(),
            }),
            Outcome::Continuation { payload, deps } => {
                let function = payload
                    .function_name()
                    .ok_or_else(|| anyhow!("closure continuations cannot leave the process"))?;
                Ok(WireOutcome::Continuation {
                    function: function.to_string(),
                    args: payload.args.clone(),
                    deps: deps.clone(),
                })
            }
        }
    }

    /// Decode the structured output of a remote unit.
    ///
    /// Anything that is not a tagged [`WireOutcome`] is taken as a final value.
    pub fn from_wire(raw: Value) -> Self {
        match serde_json::from_value::<WireOutcome>(raw.clone()) {
            Ok(WireOutcome::Final { value }) => Outcome::Final(value),
            Ok(WireOutcome::Continuation {
                function,
                args,
                deps,
            }) => Outcome::Continuation {
                payload: Payload::call(function, args),
                deps,
            },
            Err(_) => Outcome::Final(raw),
        }
    }
}

/// Serialized form of an [`Outcome`] produced by remote units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WireOutcome {
    Final {
        value: Value,
    },
    Continuation {
        function: String,
        args: Vec<Value>,
        deps: Vec<TaskId>,
    },
}

/// Why a task ended up Failed.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskFailure {
    /// The payload returned an error; `message` carries the diagnostic output.
    Execution { message: String },
    /// A dependency failed, so this task was never run.
    Dependency { dependency: TaskId },
}

impl TaskFailure {
    pub fn to_error(&self, task: TaskId) -> JobdagError {
        match self {
            TaskFailure::Execution { message } => JobdagError::ExecutionFailed {
                task: task.to_string(),
                message: message.clone(),
            },
            TaskFailure::Dependency { dependency } => JobdagError::DependencyFailed {
                task: task.to_string(),
                dependency: dependency.to_string(),
            },
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Execution { message } => write!(f, "{message}"),
            TaskFailure::Dependency { dependency } => write!(f, "dependency {dependency} failed"),
        }
    }
}

/// One version of a task as held by the graph store.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub payload: Payload,
    /// Fixed for this version of the task; replaced by a continuation.
    pub deps: Vec<TaskId>,
    pub state: TaskState,
    /// Number of continuation hops taken so far.
    pub generation: u32,
}

/// Narrow callback interface from a running task back into the scheduler.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, payload: Payload, deps: Vec<TaskId>) -> crate::errors::Result<TaskId>;
}

/// Context handed to a task body.
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    deps: Vec<TaskId>,
    dep_results: BTreeMap<TaskId, Value>,
    spawner: Option<Arc<dyn TaskSpawner>>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("deps", &self.deps)
            .field("in_process", &self.spawner.is_some())
            .finish()
    }
}

impl TaskContext {
    pub fn new(
        task_id: TaskId,
        deps: Vec<TaskId>,
        dep_results: BTreeMap<TaskId, Value>,
        spawner: Option<Arc<dyn TaskSpawner>>,
    ) -> Self {
        Self {
            task_id,
            deps,
            dep_results,
            spawner,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn deps(&self) -> &[TaskId] {
        &self.deps
    }

    /// Result of a resolved dependency.
    pub fn result(&self, id: TaskId) -> anyhow::Result<&Value> {
        self.dep_results
            .get(&id)
            .ok_or_else(|| anyhow!("{id} is not a resolved dependency of {}", self.task_id))
    }

    pub fn result_as<T: DeserializeOwned>(&self, id: TaskId) -> anyhow::Result<T> {
        let value = self.result(id)?;
        serde_json::from_value(value.clone()).with_context(|| format!("decoding result of {id}"))
    }

    /// Enqueue a new sub-task. Only available for in-process execution.
    pub fn spawn(&self, payload: Payload, deps: Vec<TaskId>) -> anyhow::Result<TaskId> {
        let spawner = self
            .spawner
            .as_ref()
            .ok_or_else(|| anyhow!("{} cannot spawn sub-tasks outside the scheduler process", self.task_id))?;
        Ok(spawner.spawn(payload, deps)?)
    }
}

/// A task the scheduler has moved to Running, ready for a backend.
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub id: TaskId,
    pub payload: Payload,
    pub deps: Vec<TaskId>,
    /// Values of every dep, captured under the store lock at dispatch.
    pub dep_results: BTreeMap<TaskId, Value>,
    pub generation: u32,
}

impl DispatchedTask {
    pub fn context(&self, spawner: Option<Arc<dyn TaskSpawner>>) -> TaskContext {
        TaskContext::new(self.id, self.deps.clone(), self.dep_results.clone(), spawner)
    }
}
