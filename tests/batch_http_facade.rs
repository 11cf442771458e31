// tests/batch_http_facade.rs

mod common;
use crate::common::{fixtures, init_tracing, serve, with_timeout, ConfigFileBuilder, FakeSubstrate};

use std::error::Error;
use std::sync::Arc;

use jobdag::exec::batch::http::router;
use jobdag::exec::batch::{BatchClient, HttpSubstrate, RemoteId, Substrate};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

async fn serve_fake(fake: Arc<FakeSubstrate>) -> Result<String, Box<dyn Error>> {
    let substrate: Arc<dyn Substrate> = fake;
    Ok(serve(router(substrate)).await?)
}

#[tokio::test]
async fn batch_map_over_http_round_trips() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeSubstrate::new(Arc::new(fixtures::registry())).with_polls_until_done(1));
    let url = serve_fake(fake.clone()).await?;

    let substrate: Arc<dyn Substrate> = Arc::new(HttpSubstrate::new(url));
    let cfg = ConfigFileBuilder::new().chunk_size(3).build();
    let client = BatchClient::new(substrate, &cfg.batch);

    let items = (0..4).map(|i| json!(i)).collect();
    let values = with_timeout(client.map("double", items, None)).await?;

    assert_eq!(values, vec![json!(0), json!(2), json!(4), json!(6)]);
    assert_eq!(fake.submitted_chunks(), vec![3, 1]);
    assert!(fake.live_jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn server_side_outage_is_retried_over_http() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeSubstrate::new(Arc::new(fixtures::registry())));
    let url = serve_fake(fake.clone()).await?;

    let substrate: Arc<dyn Substrate> = Arc::new(HttpSubstrate::new(url));
    let cfg = ConfigFileBuilder::new().transient_retries(2).build();
    let client = BatchClient::new(substrate, &cfg.batch);

    fake.fail_next_calls(1);
    let values = with_timeout(client.map("double", vec![json!(21)], None)).await?;

    assert_eq!(values, vec![json!(42)]);
    assert_eq!(fake.submit_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_unit_is_a_permanent_error() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeSubstrate::new(Arc::new(fixtures::registry())));
    let url = serve_fake(fake).await?;
    let substrate = HttpSubstrate::new(url);

    let err = substrate.result(&RemoteId::from("job-missing")).await.unwrap_err();
    assert!(err.to_string().contains("404"), "{err}");
    Ok(())
}
