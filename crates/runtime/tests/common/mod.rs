#![allow(dead_code)]

use std::sync::Arc;

use mv_runtime::fake::{FakeEngineBuilder, FakeEngineController, FakeLoader};
use mv_runtime::{HandleFactory, HandleLedger, EngineLoader, LoadPolicy, RenderCoordinator, RenderRequest, SessionId};
use tracing_subscriber::EnvFilter;

/// Routes runtime logs to the test writer. Set `RUST_LOG=mv_runtime=debug` to see them.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_test_writer()
		.try_init();
}

pub struct Fixture {
	pub coordinator: Arc<RenderCoordinator<FakeLoader>>,
	pub controller: FakeEngineController,
	pub ledger: Arc<HandleLedger>,
}

pub fn fixture(builder: FakeEngineBuilder) -> Fixture {
	init_tracing();
	let (init, controller) = builder.build();
	let loader = Arc::new(EngineLoader::new(init, LoadPolicy::CacheFailure));
	let ledger = Arc::new(HandleLedger::new());
	let coordinator = RenderCoordinator::new(
		SessionId::from("fixture"),
		loader,
		HandleFactory::new(Arc::clone(&ledger)),
		RenderRequest::default(),
	);
	Fixture {
		coordinator: Arc::new(coordinator),
		controller,
		ledger,
	}
}
