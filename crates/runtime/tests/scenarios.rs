// End-to-end session scenarios against the fake engine:
// - valid input loads and renders
// - invalid input fails without leaving a handle
// - rapid input changes settle on the last input
// - detaching while waiting for the engine leaves nothing behind
// - highlight toggles recompute without re-creating

mod common;

use std::sync::{Arc, Weak};

use common::{Fixture, fixture, init_tracing};
use mv_runtime::fake::FakeEngineBuilder;
use mv_runtime::{
	ConfigLoader, ErrorCategory, InputOutcome, RecomputeOutcome, RenderCoordinator, RenderRequest, SessionHost, SessionId, SessionPhase, UpdateOutcome,
};

#[tokio::test]
async fn valid_input_loads_then_becomes_ready() {
	let Fixture {
		coordinator,
		controller,
		ledger,
	} = fixture(FakeEngineBuilder::new().hold_load());
	let mut updates = coordinator.watch();

	let task = tokio::spawn({
		let coordinator = Arc::clone(&coordinator);
		async move { coordinator.submit_input("A").await }
	});

	updates.changed().await.unwrap();
	{
		let loading = updates.borrow_and_update();
		assert!(loading.loading);
		assert!(!loading.valid);
	}

	controller.complete_load();
	assert!(matches!(task.await.unwrap(), InputOutcome::Committed { .. }));

	let ready = updates.borrow_and_update().clone();
	assert!(!ready.loading);
	assert!(ready.valid);
	assert!(ready.output.is_some());
	assert_eq!(ready.phase, SessionPhase::Ready);
	assert_eq!(ledger.stats().live, 1);
}

#[tokio::test]
async fn invalid_input_reports_parse_error_with_no_handle() {
	let Fixture {
		coordinator,
		controller,
		ledger,
	} = fixture(FakeEngineBuilder::new());

	let outcome = coordinator.submit_input("$$$invalid$$$").await;
	assert!(matches!(outcome, InputOutcome::ParseFailed(_)));

	let snapshot = coordinator.snapshot();
	assert!(!snapshot.valid);
	assert_eq!(snapshot.error.map(|err| err.category), Some(ErrorCategory::Parse));
	assert_eq!(ledger.stats().live, 0);
	assert_eq!(controller.live_artifacts(), 0);
}

#[tokio::test]
async fn rapid_change_settles_on_latest_input() {
	let Fixture {
		coordinator,
		controller,
		ledger,
	} = fixture(FakeEngineBuilder::new().hold_load());

	let first = tokio::spawn({
		let coordinator = Arc::clone(&coordinator);
		async move { coordinator.submit_input("A").await }
	});
	let second = tokio::spawn({
		let coordinator = Arc::clone(&coordinator);
		async move { coordinator.submit_input("B").await }
	});
	tokio::task::yield_now().await;
	tokio::task::yield_now().await;
	assert_eq!(controller.load_starts(), 1);

	controller.complete_load();
	assert_eq!(first.await.unwrap(), InputOutcome::Stale);
	assert!(matches!(second.await.unwrap(), InputOutcome::Committed { .. }));

	assert_eq!(ledger.stats().live, 1);
	assert_eq!(coordinator.handle_input().as_deref(), Some("B"));
}

#[tokio::test]
async fn detach_while_suspended_mutates_nothing_on_resume() {
	let Fixture {
		coordinator,
		controller,
		ledger,
	} = fixture(FakeEngineBuilder::new().hold_load());

	let task = tokio::spawn({
		let coordinator = Arc::clone(&coordinator);
		async move { coordinator.submit_input("A").await }
	});
	tokio::task::yield_now().await;

	assert!(coordinator.detach());
	let detached = coordinator.snapshot();

	controller.complete_load();
	assert_eq!(task.await.unwrap(), InputOutcome::Stale);

	assert_eq!(coordinator.snapshot(), detached);
	assert_eq!(detached.phase, SessionPhase::Detached);
	assert_eq!(controller.live_artifacts(), 0);
	assert!(ledger.stats().is_balanced());
}

#[tokio::test]
async fn handle_produced_after_detach_is_released_before_commit() {
	let Fixture {
		coordinator,
		controller,
		ledger,
	} = fixture(FakeEngineBuilder::new());

	// Detach from inside the engine's parse, after the post-suspend checkpoint
	// has passed but before the new handle is committed.
	let weak: Weak<RenderCoordinator<_>> = Arc::downgrade(&coordinator);
	controller.set_parse_hook(move |_| {
		if let Some(coordinator) = weak.upgrade() {
			coordinator.detach();
		}
	});

	assert_eq!(coordinator.submit_input("A").await, InputOutcome::Stale);
	assert_eq!(controller.parse_calls(), 1);
	assert_eq!(controller.releases(), 1);
	assert_eq!(controller.live_artifacts(), 0);
	assert!(ledger.stats().is_balanced());
	assert_eq!(coordinator.snapshot().phase, SessionPhase::Detached);
	assert_eq!(coordinator.version(), 0);
}

#[tokio::test]
async fn highlight_toggles_recompute_without_creation() {
	let Fixture {
		coordinator, controller, ..
	} = fixture(FakeEngineBuilder::new());
	coordinator.submit_input("A").await;
	let parses = controller.parse_calls();
	let renders = controller.render_calls();

	let highlighted = RenderRequest::default().with_highlighted([0, 1]);
	assert_eq!(coordinator.set_render_request(highlighted), RecomputeOutcome::Rendered { version: 1 });
	assert!(coordinator.snapshot().output.unwrap().contains("highlight=\"0,1\""));

	assert_eq!(coordinator.set_render_request(RenderRequest::default()), RecomputeOutcome::Rendered { version: 1 });
	assert!(coordinator.snapshot().output.unwrap().contains("highlight=\"\""));

	assert_eq!(controller.render_calls() - renders, 2);
	assert_eq!(controller.parse_calls(), parses);
}

#[tokio::test]
async fn host_subscriptions_follow_configured_defaults() -> anyhow::Result<()> {
	init_tracing();
	let config = ConfigLoader::new().skip_env().load()?;
	let (init, controller) = FakeEngineBuilder::new().build();
	let host = SessionHost::new(init, config);

	let editor = host.subscribe("editor");
	let preview = host.subscribe("preview");

	let outcome = editor.update("CCO", RenderRequest::default()).await;
	assert!(matches!(outcome, UpdateOutcome::Input(InputOutcome::Committed { .. })));
	preview.update("c1ccccc1", RenderRequest::default().with_annotate(true)).await;
	assert_eq!(controller.load_starts(), 1);

	let outcome = editor.update("CCO", RenderRequest::default().with_highlighted([2])).await;
	assert!(matches!(outcome, UpdateOutcome::Request(RecomputeOutcome::Rendered { .. })));

	assert!(host.detach(&SessionId::from("editor")));
	assert_eq!(host.handle_stats().live, 1);
	assert!(!editor.snapshot().valid);
	assert!(preview.snapshot().valid);
	Ok(())
}
