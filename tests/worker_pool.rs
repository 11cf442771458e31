// tests/worker_pool.rs

mod common;
use crate::common::{fixtures, init_tracing, serve, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use jobdag::errors::JobdagError;
use jobdag::kv::{KvStore, MemoryKvStore};
use jobdag::pool::service::router;
use jobdag::pool::{
    HttpWorker, PoolTaskId, PoolTaskStatus, Worker, WorkerEndpoint, WorkerPool,
};
use jobdag::{Function, Payload};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

const POLL: Duration = Duration::from_millis(5);

fn pool(n: usize) -> (WorkerPool, Arc<MemoryKvStore>) {
    let kv = Arc::new(MemoryKvStore::new());
    let pool = WorkerPool::in_process(n, Arc::new(fixtures::registry()), kv.clone(), POLL)
        .expect("pool");
    (pool, kv)
}

#[tokio::test]
async fn tasks_are_assigned_round_robin() -> TestResult {
    init_tracing();
    let (pool, _kv) = pool(3);

    let ids = pool
        .map(&Function::named("double"), (0..6).map(|i| json!(i)).collect())
        .await?;

    let assigned: Vec<usize> = ids.iter().map(|id| pool.worker_of(*id).unwrap()).collect();
    assert_eq!(assigned, vec![0, 1, 2, 0, 1, 2]);

    let values = with_timeout(pool.wait(&ids, None)).await?;
    assert_eq!(values, (0..6).map(|i| json!(i * 2)).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn status_is_published_to_the_shared_store() -> TestResult {
    init_tracing();
    let (pool, kv) = pool(1);

    let id = pool.run(Payload::call("hooray", vec![])).await?;
    assert_eq!(with_timeout(pool.wait_one(id, None)).await?, json!("Hooray"));

    assert!(pool.check(id).await?);
    assert_eq!(pool.status(id).await?, PoolTaskStatus::Complete);
    let stored = kv.get(&id.to_string()).await?.expect("record in store");
    assert_eq!(stored["status"], json!("COMPLETE"));
    Ok(())
}

#[tokio::test]
async fn wait_aggregates_failures() -> TestResult {
    init_tracing();
    let (pool, _kv) = pool(2);

    let good = pool.run(Payload::call("double", vec![json!(4)])).await?;
    let bad = pool.run(Payload::call("boom", vec![json!("pool crash")])).await?;

    let err = with_timeout(pool.wait(&[good, bad], None)).await.unwrap_err();
    match err {
        JobdagError::Aggregate { failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, bad.to_string());
            assert!(failed[0].1.contains("pool crash"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        pool.result(bad).await,
        Err(JobdagError::ExecutionFailed { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    init_tracing();
    let (pool, _kv) = pool(1);
    let err = pool.status(PoolTaskId::new()).await.unwrap_err();
    assert!(matches!(err, JobdagError::TaskNotFound(_)));
}

#[tokio::test]
async fn closed_worker_rejects_new_work_after_draining() -> TestResult {
    init_tracing();
    let kv = Arc::new(MemoryKvStore::new());
    let worker = Worker::start("solo", Arc::new(fixtures::registry()), kv);

    let id = PoolTaskId::new();
    worker.submit(id, Payload::call("double", vec![json!(5)])).await?;
    with_timeout(worker.close()).await?;

    assert_eq!(worker.status(id), Some(PoolTaskStatus::Complete));
    assert_eq!(worker.entry(id).and_then(|e| e.result), Some(json!(10)));
    assert!(worker.submit(PoolTaskId::new(), Payload::call("hooray", vec![])).await.is_err());
    Ok(())
}

#[tokio::test]
async fn pool_of_http_workers() -> TestResult {
    init_tracing();
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let registry = Arc::new(fixtures::registry());

    let mut endpoints: Vec<Arc<dyn WorkerEndpoint>> = Vec::new();
    for i in 0..2 {
        let worker = Worker::start(format!("remote-{i}"), registry.clone(), kv.clone());
        let url = serve(router(worker)).await?;
        endpoints.push(Arc::new(HttpWorker::new(url)));
    }

    let pool = WorkerPool::new(endpoints, kv, POLL)?;
    let ids = pool
        .starmap(
            &Function::named("add"),
            vec![vec![json!(1), json!(1)], vec![json!(2), json!(3)]],
        )
        .await?;

    assert_eq!(with_timeout(pool.wait(&ids, None)).await?, vec![json!(2), json!(5)]);
    with_timeout(pool.close()).await?;
    Ok(())
}

#[tokio::test]
async fn closures_cannot_reach_http_workers() -> TestResult {
    init_tracing();
    let worker = HttpWorker::new("http://127.0.0.1:9");
    let err = worker
        .submit(PoolTaskId::new(), Payload::value_fn(|_| Ok(1)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("register"));
    Ok(())
}
