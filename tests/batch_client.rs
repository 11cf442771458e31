// tests/batch_client.rs

mod common;
use crate::common::{fixtures, init_tracing, with_timeout, ConfigFileBuilder, FakeSubstrate};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use jobdag::errors::JobdagError;
use jobdag::exec::batch::{BatchClient, JobDescriptor};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

fn fake() -> Arc<FakeSubstrate> {
    Arc::new(FakeSubstrate::new(Arc::new(fixtures::registry())).with_polls_until_done(1))
}

fn client(substrate: Arc<FakeSubstrate>, builder: ConfigFileBuilder) -> BatchClient {
    BatchClient::new(substrate, &builder.build().batch)
}

#[tokio::test]
async fn map_submits_one_call_per_chunk_and_cleans_up() -> TestResult {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new().chunk_size(2));

    let items = (0..5).map(|i| json!(i)).collect();
    let values = with_timeout(client.map("double", items, None)).await?;

    assert_eq!(values, vec![json!(0), json!(2), json!(4), json!(6), json!(8)]);
    assert_eq!(substrate.submitted_chunks(), vec![2, 2, 1]);
    assert_eq!(substrate.deleted().len(), 5);
    assert!(substrate.live_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn partial_failure_keeps_failed_units_for_inspection() -> TestResult {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new());
    let resources = client.resources().clone();

    let descriptors = vec![
        JobDescriptor::new("double", vec![json!(1)], &resources),
        JobDescriptor::new("boom", vec![json!("bad input")], &resources),
        JobDescriptor::new("double", vec![json!(3)], &resources),
    ];
    let ids = client.submit_batch(descriptors).await?;

    let err = with_timeout(client.wait_all(&ids, None, false)).await.unwrap_err();
    match &err {
        JobdagError::Aggregate { failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, ids[1].to_string());
            assert!(failed[0].1.contains("bad input"), "{}", failed[0].1);
        }
        other => panic!("expected aggregate, got {other:?}"),
    }

    assert_eq!(substrate.live_jobs(), vec![ids[1].clone()]);
    let mut deleted = substrate.deleted();
    deleted.sort();
    let mut expected = vec![ids[0].clone(), ids[2].clone()];
    expected.sort();
    assert_eq!(deleted, expected);
    Ok(())
}

#[tokio::test]
async fn delete_failed_removes_failed_units_too() -> TestResult {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new().delete_failed(true));

    let err = with_timeout(client.map("boom", vec![json!("x"), json!("y")], None))
        .await
        .unwrap_err();

    assert_eq!(err.failed_ids().len(), 2);
    assert!(substrate.live_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn oversized_chunk_submits_nothing() {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new().max_chunk_bytes(1024));

    let big = "x".repeat(4096);
    let err = client
        .map("double", vec![json!(1), json!(big)], None)
        .await
        .unwrap_err();

    assert!(matches!(err, JobdagError::PayloadTooLarge { limit: 1024, .. }), "{err:?}");
    assert_eq!(substrate.submit_calls(), 0);
}

#[tokio::test]
async fn transient_errors_are_retried() -> TestResult {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new().transient_retries(3));

    substrate.fail_next_calls(2);
    let values = with_timeout(client.map("double", vec![json!(21)], None)).await?;

    assert_eq!(values, vec![json!(42)]);
    assert_eq!(substrate.submit_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_surface_as_transient_error() {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new().transient_retries(1));

    substrate.fail_next_calls(5);
    let err = client
        .map("double", vec![json!(1)], None)
        .await
        .unwrap_err();

    match err {
        JobdagError::TransientSubstrateError { operation, attempts, .. } => {
            assert_eq!(operation, "submit");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn timeout_leaves_units_in_place() -> TestResult {
    init_tracing();
    let substrate =
        Arc::new(FakeSubstrate::new(Arc::new(fixtures::registry())).with_polls_until_done(10_000));
    let client = client(substrate.clone(), ConfigFileBuilder::new());

    let descriptors = vec![JobDescriptor::new("hooray", vec![], client.resources())];
    let ids = client.submit_batch(descriptors).await?;

    let err = client
        .wait_all(&ids, Some(Duration::from_millis(30)), true)
        .await
        .unwrap_err();

    assert!(matches!(err, JobdagError::Timeout { pending: 1, .. }));
    assert_eq!(substrate.live_jobs(), ids);
    assert!(substrate.deleted().is_empty());
    Ok(())
}

#[tokio::test]
async fn exhausted_poll_tick_is_skipped_not_fatal() -> TestResult {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new().transient_retries(1));

    let descriptors = vec![JobDescriptor::new("double", vec![json!(4)], client.resources())];
    let ids = client.submit_batch(descriptors).await?;

    // Two attempts per tick, so the first two ticks both give up.
    substrate.fail_next_calls(4);
    let values = with_timeout(client.wait_all(&ids, None, true)).await?;

    assert_eq!(values, vec![json!(8)]);
    assert!(substrate.live_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn repeated_id_is_collected_once() -> TestResult {
    init_tracing();
    let substrate = fake();
    let client = client(substrate.clone(), ConfigFileBuilder::new());

    let descriptors = vec![JobDescriptor::new("double", vec![json!(5)], client.resources())];
    let ids = client.submit_batch(descriptors).await?;
    let repeated = vec![ids[0].clone(), ids[0].clone()];

    let values = with_timeout(client.wait_all(&repeated, None, true)).await?;

    assert_eq!(values, vec![json!(10), json!(10)]);
    assert_eq!(substrate.deleted(), ids);
    Ok(())
}
