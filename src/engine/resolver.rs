// src/engine/resolver.rs

//! Continuation resolver.
//!
//! Classifies the raw outcome of one execution and applies it to the store:
//! a final value resolves the task, a continuation re-arms the same id as
//! Pending, an error fails it (and its dependents).

use tracing::{info, warn};

use crate::dag::{GraphStore, Outcome, TaskFailure};
use crate::errors::{JobdagError, Result};
use crate::types::TaskId;

/// What the resolver did with an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Done,
    Rearmed { deps: Vec<TaskId> },
    Failed { newly_failed: Vec<TaskId> },
}

/// Apply the outcome of executing `id` to the store.
///
/// Errors are only returned when the store itself rejects the transition;
/// payload errors and invalid continuations become task failures.
pub fn resolve(
    store: &mut GraphStore,
    id: TaskId,
    result: anyhow::Result<Outcome>,
) -> Result<Resolution> {
    match result {
        Ok(Outcome::Final(value)) => {
            store.complete(id, value)?;
            Ok(Resolution::Done)
        }
        Ok(Outcome::Continuation { payload, deps }) => {
            match store.requeue(id, payload, deps.clone()) {
                Ok(()) => {
                    info!(task = %id, ?deps, "task returned a continuation; re-armed");
                    Ok(Resolution::Rearmed { deps })
                }
                Err(e @ JobdagError::SchedulerInvariantViolation(_)) => Err(e),
                Err(e) => {
                    warn!(task = %id, error = %e, "rejected continuation");
                    let failure = TaskFailure::Execution {
                        message: format!("invalid continuation: {e}"),
                    };
                    let newly_failed = store.fail(id, failure)?;
                    Ok(Resolution::Failed { newly_failed })
                }
            }
        }
        Err(err) => {
            let failure = TaskFailure::Execution {
                message: format!("{err:#}"),
            };
            let newly_failed = store.fail(id, failure)?;
            Ok(Resolution::Failed { newly_failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Payload;
    use crate::types::TaskState;
    use serde_json::json;

    fn noop() -> Payload {
        Payload::thunk(|_| Outcome::value(0))
    }

    fn running_task(store: &mut GraphStore) -> TaskId {
        let id = store.enqueue(noop(), vec![]).unwrap();
        store.step(None);
        id
    }

    #[test]
    fn final_value_resolves_task() {
        let mut store = GraphStore::new();
        let id = running_task(&mut store);

        let r = resolve(&mut store, id, Ok(Outcome::Final(json!(6)))).unwrap();
        assert_eq!(r, Resolution::Done);
        assert!(store.check(id));
    }

    #[test]
    fn continuation_rearms_same_id() {
        let mut store = GraphStore::new();
        let id = running_task(&mut store);
        let sub = store.enqueue(noop(), vec![]).unwrap();

        let outcome = Outcome::Continuation {
            payload: noop(),
            deps: vec![sub],
        };
        let r = resolve(&mut store, id, Ok(outcome)).unwrap();
        assert_eq!(r, Resolution::Rearmed { deps: vec![sub] });
        assert_eq!(store.state_of(id), Some(TaskState::Pending));
        assert!(!store.check(id));
    }

    #[test]
    fn continuation_on_unknown_id_fails_the_task() {
        let mut store = GraphStore::new();
        let id = running_task(&mut store);

        let outcome = Outcome::Continuation {
            payload: noop(),
            deps: vec![TaskId(1000)],
        };
        let r = resolve(&mut store, id, Ok(outcome)).unwrap();
        assert_eq!(r, Resolution::Failed { newly_failed: vec![id] });
    }

    #[test]
    fn error_keeps_full_context_chain() {
        let mut store = GraphStore::new();
        let id = running_task(&mut store);

        let err = anyhow::anyhow!("disk full").context("writing shard");
        resolve(&mut store, id, Err(err)).unwrap();
        match store.resolution(id).unwrap() {
            Some(Err(TaskFailure::Execution { message })) => {
                assert_eq!(message, "writing shard: disk full")
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }
}
