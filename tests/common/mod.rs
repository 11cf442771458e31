#![allow(dead_code)]

pub use jobdag_test_utils::builders::{fast_options, ConfigFileBuilder};
pub use jobdag_test_utils::fake_substrate::FakeSubstrate;
pub use jobdag_test_utils::fixtures;
pub use jobdag_test_utils::{init_tracing, serve, with_timeout, with_timeout_of};

use std::sync::Arc;

use jobdag::engine::Dispatcher;
use jobdag::exec::batch::{BatchBackend, BatchClient};
use jobdag::exec::{ExecutionBackend, FunctionRegistry, LocalBackend};

/// Dispatcher over a local pool of `size` threads.
pub fn local_dispatcher(size: usize, registry: FunctionRegistry) -> Dispatcher {
    let backend: Arc<dyn ExecutionBackend> = Arc::new(
        LocalBackend::new(size, Arc::new(registry)).expect("local backend"),
    );
    Dispatcher::start(backend, fast_options())
}

/// Dispatcher over the batch backend talking to `substrate`.
pub fn batch_dispatcher(substrate: Arc<FakeSubstrate>, builder: ConfigFileBuilder) -> Dispatcher {
    let cfg = builder.build();
    let client = BatchClient::new(substrate, &cfg.batch);
    let backend: Arc<dyn ExecutionBackend> = Arc::new(BatchBackend::new(client));
    Dispatcher::start(backend, fast_options())
}
