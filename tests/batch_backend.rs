// tests/batch_backend.rs

mod common;
use crate::common::{
    batch_dispatcher, fixtures, init_tracing, with_timeout, ConfigFileBuilder, FakeSubstrate,
};

use std::error::Error;
use std::sync::Arc;

use jobdag::dag::Payload;
use jobdag::errors::JobdagError;
use jobdag::Function;
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

fn fake() -> Arc<FakeSubstrate> {
    Arc::new(FakeSubstrate::new(Arc::new(fixtures::registry())).with_polls_until_done(1))
}

#[tokio::test]
async fn dependency_results_travel_with_the_descriptor() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new());

    let a = d.run(Payload::call("double", vec![json!(2)]), vec![])?;
    let b = d.run(Payload::call("add", vec![json!(5), json!(6)]), vec![])?;
    let total = d.run(Payload::call("sum_deps", vec![]), vec![a, b])?;

    assert_eq!(with_timeout(d.wait(total, None)).await?, json!(15));
    assert!(substrate.live_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn remote_continuation_rearms_the_task() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new());

    let id = d.run(Payload::call("countdown", vec![json!(2)]), vec![])?;

    assert_eq!(with_timeout(d.wait(id, None)).await?, json!("done"));
    assert_eq!(substrate.deleted().len(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn map_respects_chunk_size() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new().chunk_size(2));

    let items = (1..=5).map(|i| json!(i)).collect();
    let ids = d.map(&Function::named("double"), items, &[])?;
    let values = with_timeout(d.wait_all(&ids, None)).await?;

    assert_eq!(values, vec![json!(2), json!(4), json!(6), json!(8), json!(10)]);
    assert_eq!(substrate.submitted_chunks(), vec![2, 2, 1]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn starmap_lands_in_one_dispatch() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new().chunk_size(3));

    let rows = (0..7).map(|i| vec![json!(i), json!(1)]).collect();
    let ids = d.starmap(&Function::named("add"), rows, &[])?;
    let values = with_timeout(d.wait_all(&ids, None)).await?;

    assert_eq!(values, (1..=7).map(|i| json!(i)).collect::<Vec<_>>());
    assert_eq!(substrate.submitted_chunks(), vec![3, 3, 1]);
    Ok(())
}

#[tokio::test]
async fn failed_unit_fails_dependents_and_stays_remote() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new());

    let bad = d.run(Payload::call("boom", vec![json!("remote crash")]), vec![])?;
    let after = d.run(Payload::call("sum_deps", vec![]), vec![bad])?;

    let err = with_timeout(d.wait_all(&[bad, after], None)).await.unwrap_err();
    assert_eq!(err.failed_ids(), vec![bad.to_string(), after.to_string()]);

    match with_timeout(d.wait(bad, None)).await {
        Err(JobdagError::ExecutionFailed { message, .. }) => {
            assert!(message.contains("remote crash"), "{message}")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(substrate.live_jobs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn closure_payload_cannot_be_shipped() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new());

    let id = d.run(Payload::value_fn(|_| Ok(1)), vec![])?;
    let err = with_timeout(d.wait(id, None)).await.unwrap_err();

    assert!(err.to_string().contains("register"), "{err}");
    assert_eq!(substrate.submit_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn oversized_task_fails_without_submitting() -> TestResult {
    init_tracing();
    let substrate = fake();
    let d = batch_dispatcher(substrate.clone(), ConfigFileBuilder::new().max_chunk_bytes(1024));

    let id = d.run(Payload::call("double", vec![json!("y".repeat(4096))]), vec![])?;
    let err = with_timeout(d.wait(id, None)).await.unwrap_err();

    assert!(err.to_string().contains("byte ceiling"), "{err}");
    assert_eq!(substrate.submit_calls(), 0);
    Ok(())
}
