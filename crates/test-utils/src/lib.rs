//! Shared helpers for the `jobdag` integration tests.
//!
//! - [`builders`]: config and dispatcher options tuned for fast tests.
//! - [`fixtures`]: registered functions and reference payloads.
//! - [`fake_substrate`]: in-memory batch substrate with fault injection.

pub mod builders;
pub mod fake_substrate;
pub mod fixtures;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// Upper bound for any single awaited test step.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Filter used when `RUST_LOG` is unset: our own events, plus warnings from
/// the HTTP stack.
const DEFAULT_FILTER: &str = "warn,jobdag=info,jobdag_test_utils=info";

static TRACING: Once = Once::new();

/// Install a per-test capturing subscriber once per test binary.
///
/// Output only shows for failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_names(true)
            .try_init();
    });
}

/// Await `f`, panicking after [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    with_timeout_of(TEST_TIMEOUT, f).await
}

pub async fn with_timeout_of<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step did not finish within {limit:?}"),
    }
}

/// Serve `router` on an ephemeral localhost port and return its base URL.
///
/// The server task lives until the test runtime shuts down.
pub async fn serve(router: Router) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::warn!(%addr, error = %e, "test server stopped");
        }
    });
    Ok(format!("http://{addr}"))
}
