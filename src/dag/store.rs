// src/dag/store.rs

//! The dependency graph store.
//!
//! Holds every task record plus the `pending` / `ready` / `running` index sets
//! and the `done` / `failed` resolutions. It is a plain synchronous state
//! machine with no Tokio types: the scheduler loop wraps it in a single mutex
//! and every mutation goes through the methods below.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dag::scheduler_step::{SchedulerStep, StoreStats};
use crate::dag::task::{DispatchedTask, Payload, TaskFailure, TaskRecord};
use crate::errors::{JobdagError, Result};
use crate::types::{TaskId, TaskState};

#[derive(Debug, Default)]
pub struct GraphStore {
    pub(crate) tasks: HashMap<TaskId, TaskRecord>,
    pub(crate) pending: BTreeSet<TaskId>,
    pub(crate) ready: BTreeSet<TaskId>,
    pub(crate) running: BTreeSet<TaskId>,
    pub(crate) done: HashMap<TaskId, Value>,
    pub(crate) failed: HashMap<TaskId, TaskFailure>,
    /// Reverse edges: dep -> tasks that listed it in some version of their deps.
    dependents: HashMap<TaskId, BTreeSet<TaskId>>,
    next_id: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh Pending task and return its id.
    ///
    /// Every dep must already be known. If one of them has already failed the
    /// new task is failed on the spot instead of waiting forever.
    pub fn enqueue(&mut self, payload: Payload, deps: Vec<TaskId>) -> Result<TaskId> {
        let deps = self.validated_deps(&deps)?;
        let id = TaskId(self.next_id);
        self.next_id += 1;

        self.link_dependents(id, &deps);
        self.tasks.insert(
            id,
            TaskRecord {
                id,
                payload,
                deps,
                state: TaskState::Pending,
                generation: 0,
            },
        );
        self.pending.insert(id);
        debug!(task = %id, "enqueued task");

        self.fail_if_dependency_failed(id);
        Ok(id)
    }

    /// Insert a batch of tasks in one pass and return their ids in order.
    ///
    /// Every dep list is validated before anything is inserted, so an unknown
    /// dep leaves the store untouched.
    pub fn enqueue_many(&mut self, items: Vec<(Payload, Vec<TaskId>)>) -> Result<Vec<TaskId>> {
        let items = items
            .into_iter()
            .map(|(payload, deps)| Ok((payload, self.validated_deps(&deps)?)))
            .collect::<Result<Vec<_>>>()?;

        let ids = items
            .into_iter()
            .map(|(payload, deps)| self.enqueue(payload, deps))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = ids.len(), "enqueued batch");
        Ok(ids)
    }

    /// Re-arm a Running task under its existing id with a new payload and deps.
    ///
    /// Only the continuation resolver calls this.
    pub(crate) fn requeue(&mut self, id: TaskId, payload: Payload, deps: Vec<TaskId>) -> Result<()> {
        let state = self
            .tasks
            .get(&id)
            .map(|r| r.state)
            .ok_or_else(|| JobdagError::TaskNotFound(id.to_string()))?;
        if state != TaskState::Running {
            return Err(JobdagError::SchedulerInvariantViolation(format!(
                "requeue of {id} while {state:?}; only running tasks can be re-armed"
            )));
        }

        let deps = self.validated_deps(&deps)?;
        if self.would_cycle(id, &deps) {
            return Err(JobdagError::DependencyCycle { task: id });
        }

        self.running.remove(&id);
        self.link_dependents(id, &deps);
        if let Some(record) = self.tasks.get_mut(&id) {
            record.payload = payload;
            record.deps = deps;
            record.state = TaskState::Pending;
            record.generation += 1;
            debug!(task = %id, generation = record.generation, deps = ?record.deps, "re-armed task as Pending");
        }
        self.pending.insert(id);

        self.fail_if_dependency_failed(id);
        Ok(())
    }

    /// Move every Pending task whose deps are all done to Ready.
    pub fn promote_ready(&mut self) -> Vec<TaskId> {
        let promotable: Vec<TaskId> = self
            .pending
            .iter()
            .copied()
            .filter(|id| self.deps_done(*id))
            .collect();

        for id in &promotable {
            self.pending.remove(id);
            self.ready.insert(*id);
            if let Some(record) = self.tasks.get_mut(id) {
                record.state = TaskState::Ready;
            }
            debug!(task = %id, "dependencies satisfied; marking Ready");
        }

        promotable
    }

    /// Pop Ready tasks (lowest id first) into Running while capacity allows.
    ///
    /// `capacity` bounds the size of the running set; `None` means unbounded.
    pub fn dispatch(&mut self, capacity: Option<usize>) -> Vec<DispatchedTask> {
        let mut dispatched = Vec::new();

        loop {
            if let Some(cap) = capacity {
                if self.running.len() >= cap {
                    break;
                }
            }
            let Some(id) = self.ready.pop_first() else {
                break;
            };

            let dep_results = self.snapshot_dep_results(id);
            let Some(record) = self.tasks.get_mut(&id) else {
                warn!(task = %id, "ready id missing from task map; dropping");
                continue;
            };
            record.state = TaskState::Running;
            self.running.insert(id);

            info!(task = %id, generation = record.generation, "dispatching task");
            dispatched.push(DispatchedTask {
                id,
                payload: record.payload.clone(),
                deps: record.deps.clone(),
                dep_results,
                generation: record.generation,
            });
        }

        dispatched
    }

    /// One control-loop iteration: promote, then dispatch.
    pub fn step(&mut self, capacity: Option<usize>) -> SchedulerStep {
        let promoted = self.promote_ready();
        let dispatched = self.dispatch(capacity);
        SchedulerStep {
            promoted,
            dispatched,
            idle: self.is_idle(),
        }
    }

    /// Record a final value for a Running task.
    pub fn complete(&mut self, id: TaskId, value: Value) -> Result<()> {
        self.take_running(id)?;
        if let Some(record) = self.tasks.get_mut(&id) {
            record.state = TaskState::Done;
        }
        self.done.insert(id, value);
        info!(task = %id, "task done");
        Ok(())
    }

    /// Mark an unresolved task Failed and cascade to its dependents.
    ///
    /// Returns every task newly failed, starting with `id` itself.
    pub fn fail(&mut self, id: TaskId, failure: TaskFailure) -> Result<Vec<TaskId>> {
        let state = self
            .tasks
            .get(&id)
            .map(|r| r.state)
            .ok_or_else(|| JobdagError::TaskNotFound(id.to_string()))?;
        if state.is_terminal() {
            return Err(JobdagError::SchedulerInvariantViolation(format!(
                "{id} failed after it already resolved as {state:?}"
            )));
        }

        self.pending.remove(&id);
        self.ready.remove(&id);
        self.running.remove(&id);
        if let Some(record) = self.tasks.get_mut(&id) {
            record.state = TaskState::Failed;
        }
        warn!(task = %id, reason = %failure, "task failed; failing dependents");
        self.failed.insert(id, failure);

        let mut newly_failed = vec![id];
        newly_failed.extend(self.cascade_failure(id));
        Ok(newly_failed)
    }

    /// Non-blocking: is `id` done (successfully)?
    pub fn check(&self, id: TaskId) -> bool {
        self.done.contains_key(&id)
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|r| r.state)
    }

    /// Resolution of `id`: `None` while unresolved.
    pub fn resolution(&self, id: TaskId) -> Result<Option<std::result::Result<Value, TaskFailure>>> {
        if !self.tasks.contains_key(&id) {
            return Err(JobdagError::TaskNotFound(id.to_string()));
        }
        if let Some(value) = self.done.get(&id) {
            return Ok(Some(Ok(value.clone())));
        }
        if let Some(failure) = self.failed.get(&id) {
            return Ok(Some(Err(failure.clone())));
        }
        Ok(None)
    }

    /// True when nothing is pending, ready or running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.ready.is_empty() && self.running.is_empty()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            pending: self.pending.len(),
            ready: self.ready.len(),
            running: self.running.len(),
            done: self.done.len(),
            failed: self.failed.len(),
        }
    }

    fn validated_deps(&self, deps: &[TaskId]) -> Result<Vec<TaskId>> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::with_capacity(deps.len());
        for dep in deps {
            if !self.tasks.contains_key(dep) {
                return Err(JobdagError::TaskNotFound(dep.to_string()));
            }
            if seen.insert(*dep) {
                ordered.push(*dep);
            }
        }
        Ok(ordered)
    }

    fn link_dependents(&mut self, id: TaskId, deps: &[TaskId]) {
        for dep in deps {
            self.dependents.entry(*dep).or_default().insert(id);
        }
    }

    fn deps_done(&self, id: TaskId) -> bool {
        self.tasks
            .get(&id)
            .map(|r| r.deps.iter().all(|dep| self.done.contains_key(dep)))
            .unwrap_or(false)
    }

    fn snapshot_dep_results(&self, id: TaskId) -> BTreeMap<TaskId, Value> {
        self.tasks
            .get(&id)
            .map(|r| {
                r.deps
                    .iter()
                    .filter_map(|dep| self.done.get(dep).map(|v| (*dep, v.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take_running(&mut self, id: TaskId) -> Result<()> {
        if !self.running.remove(&id) {
            let state = self.state_of(id);
            return Err(JobdagError::SchedulerInvariantViolation(format!(
                "completion for {id} which is not running (state {state:?})"
            )));
        }
        Ok(())
    }

    /// Fail `id` right away if one of its current deps has already failed.
    fn fail_if_dependency_failed(&mut self, id: TaskId) {
        let failed_dep = self
            .tasks
            .get(&id)
            .and_then(|r| r.deps.iter().find(|dep| self.failed.contains_key(*dep)).copied());

        if let Some(dependency) = failed_dep {
            if let Err(e) = self.fail(id, TaskFailure::Dependency { dependency }) {
                warn!(task = %id, error = %e, "could not fail task with failed dependency");
            }
        }
    }

    /// Fail every transitive dependent still waiting on `root`.
    fn cascade_failure(&mut self, root: TaskId) -> Vec<TaskId> {
        let mut stack = vec![root];
        let mut newly_failed = Vec::new();

        while let Some(failed) = stack.pop() {
            let dependents = self.dependents.get(&failed).cloned().unwrap_or_default();
            for dependent in dependents {
                let Some(record) = self.tasks.get_mut(&dependent) else {
                    continue;
                };
                // Only the current version's deps count; older versions may
                // have listed `failed` before a continuation replaced them.
                if !matches!(record.state, TaskState::Pending | TaskState::Ready)
                    || !record.deps.contains(&failed)
                {
                    continue;
                }

                record.state = TaskState::Failed;
                self.pending.remove(&dependent);
                self.ready.remove(&dependent);
                self.failed.insert(dependent, TaskFailure::Dependency { dependency: failed });
                debug!(task = %dependent, dependency = %failed, "failing dependent of failed task");

                newly_failed.push(dependent);
                stack.push(dependent);
            }
        }

        newly_failed
    }
}
