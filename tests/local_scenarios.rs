// tests/local_scenarios.rs

mod common;
use crate::common::{fixtures, init_tracing, local_dispatcher, with_timeout};

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobdag::dag::{Outcome, Payload, TaskContext};
use jobdag::exec::FunctionRegistry;
use jobdag::types::TaskState;
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn dependent_task_reads_both_dependency_results() -> TestResult {
    init_tracing();
    let d = local_dispatcher(4, FunctionRegistry::new());

    let x = d.run(Payload::value_fn(|_| Ok(10)), vec![])?;
    let y = d.run(Payload::value_fn(|_| Ok(8)), vec![])?;
    let z = d.run(
        Payload::value_fn(move |ctx: &TaskContext| {
            Ok(ctx.result_as::<i64>(x)? + ctx.result_as::<i64>(y)?)
        }),
        vec![x, y],
    )?;

    let value: i64 = with_timeout(d.wait_as(z, None)).await?;
    assert_eq!(value, 18);
    assert!(d.check(x) && d.check(y) && d.check(z));
    Ok(())
}

#[tokio::test]
async fn chained_tasks_each_add_the_previous_result() -> TestResult {
    init_tracing();
    let d = local_dispatcher(2, FunctionRegistry::new());

    let job1 = d.run(Payload::value_fn(|_| Ok(1 + 2)), vec![])?;
    let job2 = d.run(
        Payload::value_fn(move |ctx: &TaskContext| Ok(1 + 2 + ctx.result_as::<i64>(job1)?)),
        vec![job1],
    )?;
    let job3 = d.run(
        Payload::value_fn(move |ctx: &TaskContext| Ok(1 + 2 + ctx.result_as::<i64>(job2)?)),
        vec![job2],
    )?;

    let values = with_timeout(d.wait_all(&[job1, job2, job3], None)).await?;
    assert_eq!(values, vec![json!(3), json!(6), json!(9)]);

    let total: i64 = values.iter().filter_map(|v| v.as_i64()).sum();
    assert_eq!(total, 18);
    Ok(())
}

#[tokio::test]
async fn continuation_resolves_under_the_same_id() -> TestResult {
    init_tracing();
    let d = local_dispatcher(2, FunctionRegistry::new());

    let id = d.run(fixtures::split_sum(vec![1, 2, 3]), vec![])?;
    let value: i64 = with_timeout(d.wait_as(id, None)).await?;

    assert_eq!(value, 6);
    assert_eq!(d.state(id), Some(TaskState::Done));
    Ok(())
}

#[tokio::test]
async fn recursive_fib_fans_out_and_joins() -> TestResult {
    init_tracing();
    let d = local_dispatcher(4, FunctionRegistry::new());

    let id = d.run(fixtures::fib_payload(6), vec![])?;
    let value: u64 = with_timeout(d.wait_as(id, None)).await?;

    assert_eq!(value, fixtures::shifted_fib(6));
    assert_eq!(value, 13);
    assert!(d.stats().done > 1, "sub-tasks should have been spawned");
    Ok(())
}

#[tokio::test]
async fn map_returns_results_in_item_order() -> TestResult {
    init_tracing();
    let d = local_dispatcher(3, fixtures::registry());

    let ids = d.map(
        &jobdag::Function::named("double"),
        vec![json!(0), json!(1), json!(2)],
        &[],
    )?;
    let values = with_timeout(d.wait_all(&ids, None)).await?;

    assert_eq!(values, vec![json!(0), json!(2), json!(4)]);
    Ok(())
}

#[tokio::test]
async fn starmap_unpacks_each_row() -> TestResult {
    init_tracing();
    let d = local_dispatcher(2, fixtures::registry());

    let rows = vec![vec![json!(1), json!(2)], vec![json!(10), json!(-4)]];
    let ids = d.starmap(&jobdag::Function::named("add"), rows, &[])?;
    let values = with_timeout(d.wait_all(&ids, None)).await?;

    assert_eq!(values, vec![json!(3), json!(6)]);
    Ok(())
}

#[tokio::test]
async fn named_continuation_chains_through_registry() -> TestResult {
    init_tracing();
    let d = local_dispatcher(1, fixtures::registry());

    let id = d.run(Payload::call("countdown", vec![json!(3)]), vec![])?;
    let value = with_timeout(d.wait(id, None)).await?;

    assert_eq!(value, json!("done"));
    assert_eq!(d.stats().done, 1);
    Ok(())
}

#[tokio::test]
async fn running_set_never_exceeds_pool_size() -> TestResult {
    init_tracing();
    let d = local_dispatcher(2, FunctionRegistry::new());

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut ids = Vec::new();
    for _ in 0..8 {
        let current = current.clone();
        let peak = peak.clone();
        ids.push(d.run(
            Payload::thunk(move |_| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                current.fetch_sub(1, Ordering::SeqCst);
                Outcome::value(())
            }),
            vec![],
        )?);
        assert!(d.stats().running <= 2);
    }

    with_timeout(d.wait_all(&ids, None)).await?;
    assert!(peak.load(Ordering::SeqCst) <= 2);
    Ok(())
}

#[tokio::test]
async fn check_is_false_until_the_task_resolves() -> TestResult {
    init_tracing();
    let d = local_dispatcher(1, FunctionRegistry::new());

    let id = d.run(
        Payload::thunk(|_| {
            std::thread::sleep(Duration::from_millis(50));
            Outcome::value("slow")
        }),
        vec![],
    )?;
    assert!(!d.check(id));

    with_timeout(d.wait(id, None)).await?;
    assert!(d.check(id));
    Ok(())
}
