// tests/kv_service.rs

mod common;
use crate::common::{fixtures, init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use jobdag::kv::{server, HttpKvStore, KvStore, MemoryKvStore};
use jobdag::pool::WorkerPool;
use jobdag::Function;
use serde_json::json;
use tokio::net::TcpListener;

type TestResult = Result<(), Box<dyn Error>>;

async fn spawn_store() -> Result<(String, Arc<MemoryKvStore>), Box<dyn Error>> {
    let backing = Arc::new(MemoryKvStore::new());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let store: Arc<dyn KvStore> = backing.clone();
    tokio::spawn(server::serve(listener, store));
    Ok((format!("http://{addr}"), backing))
}

#[tokio::test]
async fn put_get_and_list_over_http() -> TestResult {
    init_tracing();
    let (url, backing) = spawn_store().await?;
    let kv = HttpKvStore::new(url);

    kv.put("alpha", json!({"status": "PENDING"})).await?;
    kv.put("alpha", json!({"status": "COMPLETE", "result": 3})).await?;
    kv.put("beta", json!(1)).await?;

    assert_eq!(kv.get("alpha").await?, Some(json!({"status": "COMPLETE", "result": 3})));
    assert_eq!(kv.get("missing").await?, None);

    let all = kv.all().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all["beta"], json!(1));
    assert_eq!(backing.len(), 2);
    Ok(())
}

#[tokio::test]
async fn pool_polls_a_remote_store() -> TestResult {
    init_tracing();
    let (url, backing) = spawn_store().await?;
    let kv: Arc<dyn KvStore> = Arc::new(HttpKvStore::new(url));

    let pool = WorkerPool::in_process(
        2,
        Arc::new(fixtures::registry()),
        kv,
        Duration::from_millis(5),
    )?;
    let ids = pool
        .map(&Function::named("double"), vec![json!(7), json!(8)])
        .await?;

    assert_eq!(with_timeout(pool.wait(&ids, None)).await?, vec![json!(14), json!(16)]);
    assert_eq!(backing.len(), 2);
    Ok(())
}
