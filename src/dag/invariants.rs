// src/dag/invariants.rs

//! Consistency checks over the graph store.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::store::GraphStore;
use crate::errors::{JobdagError, Result};
use crate::types::{TaskId, TaskState};

impl GraphStore {
    /// Would re-arming `id` with `deps` close a cycle among unresolved tasks?
    ///
    /// Edge direction: dep -> task, as in a topological run order.
    pub(crate) fn would_cycle(&self, id: TaskId, deps: &[TaskId]) -> bool {
        if deps.contains(&id) {
            return true;
        }

        let mut graph: DiGraphMap<u64, ()> = DiGraphMap::new();
        for record in self.tasks.values() {
            if record.state.is_terminal() || record.id == id {
                continue;
            }
            graph.add_node(record.id.0);
            for dep in &record.deps {
                if !self.done.contains_key(dep) && !self.failed.contains_key(dep) {
                    graph.add_edge(dep.0, record.id.0, ());
                }
            }
        }
        graph.add_node(id.0);
        for dep in deps {
            graph.add_edge(dep.0, id.0, ());
        }

        toposort(&graph, None).is_err()
    }

    /// Verify the index-set partition.
    ///
    /// - every unresolved id sits in exactly one of pending/ready/running,
    ///   matching its record state
    /// - resolved ids sit in none of them, and in exactly one of done/failed
    /// - every running or ready task has all deps done
    pub fn check_invariants(&self) -> Result<()> {
        for (id, record) in &self.tasks {
            let memberships = [
                self.pending.contains(id),
                self.ready.contains(id),
                self.running.contains(id),
                self.done.contains_key(id),
                self.failed.contains_key(id),
            ];
            let count = memberships.iter().filter(|m| **m).count();
            if count != 1 {
                return Err(violation(format!(
                    "{id} is in {count} index sets (pending, ready, running, done, failed) = {memberships:?}"
                )));
            }

            let expected = match record.state {
                TaskState::Pending => memberships[0],
                TaskState::Ready => memberships[1],
                TaskState::Running => memberships[2],
                TaskState::Done => memberships[3],
                TaskState::Failed => memberships[4],
            };
            if !expected {
                return Err(violation(format!(
                    "{id} has state {:?} but is indexed elsewhere",
                    record.state
                )));
            }

            if matches!(record.state, TaskState::Ready | TaskState::Running) {
                if let Some(dep) = record.deps.iter().find(|d| !self.done.contains_key(*d)) {
                    return Err(violation(format!(
                        "{id} is {:?} while dependency {dep} is not done",
                        record.state
                    )));
                }
            }
        }

        let indexed = self.pending.len()
            + self.ready.len()
            + self.running.len()
            + self.done.len()
            + self.failed.len();
        if indexed != self.tasks.len() {
            return Err(violation(format!(
                "{indexed} indexed ids for {} known tasks",
                self.tasks.len()
            )));
        }

        Ok(())
    }
}

fn violation(msg: String) -> JobdagError {
    JobdagError::SchedulerInvariantViolation(msg)
}
