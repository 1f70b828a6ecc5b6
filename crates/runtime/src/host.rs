//! Registry of sessions sharing one engine loader.
//!
//! The host is the process-level owner: it holds the single [`EngineLoader`]
//! and the [`HandleLedger`] every session's factory records into, and keys
//! live sessions by [`SessionId`].

use std::collections::HashMap;
use std::sync::Arc;

use mv_protocol::{HandleStats, SessionId};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::coordinator::RenderCoordinator;
use crate::engine::EngineInit;
use crate::handle::{HandleFactory, HandleLedger};
use crate::loader::{EngineLoader, LoaderState};
use crate::subscription::Subscription;

pub struct SessionHost<I: EngineInit> {
	config: RuntimeConfig,
	loader: Arc<EngineLoader<I>>,
	ledger: Arc<HandleLedger>,
	sessions: Mutex<HashMap<SessionId, Arc<RenderCoordinator<I>>>>,
}

impl<I: EngineInit> SessionHost<I> {
	pub fn new(init: I, config: RuntimeConfig) -> Self {
		Self {
			loader: Arc::new(EngineLoader::new(init, config.load_policy)),
			ledger: Arc::new(HandleLedger::new()),
			sessions: Mutex::new(HashMap::new()),
			config,
		}
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	pub fn loader(&self) -> &Arc<EngineLoader<I>> {
		&self.loader
	}

	pub fn loader_state(&self) -> LoaderState {
		self.loader.state()
	}

	/// Locks the registry after forgetting sessions detached behind its back.
	fn live_sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<RenderCoordinator<I>>>> {
		let mut sessions = self.sessions.lock();
		sessions.retain(|id, coordinator| {
			let live = !coordinator.phase().is_terminal();
			if !live {
				debug!(target = "mv.host", session = %id, "pruning detached session");
			}
			live
		});
		sessions
	}

	/// Returns the session for `id`, creating it on first use.
	///
	/// A session that was detached directly, for instance through its
	/// [`Subscription`], is replaced by a fresh one.
	pub fn attach(&self, id: impl Into<SessionId>) -> Arc<RenderCoordinator<I>> {
		let id = id.into();
		let mut sessions = self.live_sessions();
		if let Some(existing) = sessions.get(&id) {
			return Arc::clone(existing);
		}

		debug!(target = "mv.host", session = %id, "attaching session");
		let coordinator = RenderCoordinator::new(
			id.clone(),
			Arc::clone(&self.loader),
			HandleFactory::new(Arc::clone(&self.ledger)),
			self.config.default_render.clone(),
		)
		.with_acquire_timeout(self.config.acquire_timeout());
		let coordinator = Arc::new(coordinator);
		sessions.insert(id, Arc::clone(&coordinator));
		coordinator
	}

	/// Attaches `id` and wraps it for reactive updates.
	pub fn subscribe(&self, id: impl Into<SessionId>) -> Subscription<I> {
		Subscription::new(self.attach(id))
	}

	pub fn get(&self, id: &SessionId) -> Option<Arc<RenderCoordinator<I>>> {
		self.live_sessions().get(id).cloned()
	}

	/// Tears down and forgets `id`. Returns `false` if it was not attached.
	pub fn detach(&self, id: &SessionId) -> bool {
		let removed = self.live_sessions().remove(id);
		match removed {
			Some(coordinator) => {
				coordinator.detach();
				debug!(target = "mv.host", session = %id, "session removed");
				true
			}
			None => false,
		}
	}

	pub fn detach_all(&self) -> usize {
		let drained: Vec<_> = self.sessions.lock().drain().collect();
		for (_, coordinator) in &drained {
			coordinator.detach();
		}
		debug!(target = "mv.host", count = drained.len(), "all sessions removed");
		drained.len()
	}

	pub fn len(&self) -> usize {
		self.live_sessions().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn handle_stats(&self) -> HandleStats {
		self.ledger.stats()
	}
}

impl<I: EngineInit> Drop for SessionHost<I> {
	fn drop(&mut self) {
		self.detach_all();
	}
}

#[cfg(test)]
mod tests {
	use mv_protocol::{ErrorCategory, RenderRequest};

	use super::*;
	use crate::coordinator::InputOutcome;
	use crate::fake::FakeEngineBuilder;
	use crate::subscription::UpdateOutcome;

	#[tokio::test]
	async fn sessions_share_one_engine() {
		let (init, controller) = FakeEngineBuilder::new().build();
		let host = SessionHost::new(init, RuntimeConfig::default());

		let left = host.attach("left");
		let right = host.attach("right");
		left.submit_input("CCO").await;
		right.submit_input("CCN").await;

		assert_eq!(controller.load_starts(), 1);
		assert_eq!(host.len(), 2);
		assert_eq!(host.handle_stats().live, 2);
		assert_eq!(host.loader_state(), LoaderState::Ready);
	}

	#[tokio::test]
	async fn attach_returns_existing_session() {
		let (init, _) = FakeEngineBuilder::new().build();
		let host = SessionHost::new(init, RuntimeConfig::default());
		let first = host.attach("editor");
		let second = host.attach("editor");
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(host.len(), 1);
	}

	#[tokio::test]
	async fn parse_errors_stay_local_to_their_session() {
		let (init, _) = FakeEngineBuilder::new().build();
		let host = SessionHost::new(init, RuntimeConfig::default());

		let good = host.attach("good");
		let bad = host.attach("bad");
		good.submit_input("CCO").await;
		bad.submit_input("$$$").await;

		assert!(good.snapshot().error.is_none());
		assert_eq!(bad.snapshot().error.unwrap().category, ErrorCategory::Parse);
	}

	#[tokio::test]
	async fn load_errors_reach_every_session() {
		let (init, _) = FakeEngineBuilder::new().fail_loads(1).build();
		let host = SessionHost::new(init, RuntimeConfig::default());

		let first = host.attach("a");
		let second = host.attach("b");
		assert!(matches!(first.submit_input("CCO").await, InputOutcome::LoadFailed(_)));
		assert!(matches!(second.submit_input("CCO").await, InputOutcome::LoadFailed(_)));
		assert_eq!(host.loader_state(), LoaderState::Failed);
	}

	#[tokio::test]
	async fn detach_releases_and_forgets() {
		let (init, controller) = FakeEngineBuilder::new().build();
		let host = SessionHost::new(init, RuntimeConfig::default());

		let session = host.attach("a");
		session.submit_input("CCO").await;
		assert!(host.detach(&SessionId::from("a")));
		assert!(!host.detach(&SessionId::from("a")));

		assert!(host.is_empty());
		assert_eq!(controller.live_artifacts(), 0);
		assert!(session.snapshot().phase.is_terminal());
	}

	#[tokio::test]
	async fn resubscribing_after_subscription_detach_gets_a_fresh_session() {
		let (init, controller) = FakeEngineBuilder::new().build();
		let host = SessionHost::new(init, RuntimeConfig::default());

		let subscription = host.subscribe("editor");
		subscription.update("CCO", RenderRequest::default()).await;
		assert!(subscription.detach());
		assert_eq!(controller.live_artifacts(), 0);
		assert!(host.is_empty());
		assert!(host.get(&SessionId::from("editor")).is_none());

		let again = host.subscribe("editor");
		assert!(!Arc::ptr_eq(subscription.coordinator(), again.coordinator()));
		let outcome = again.update("CCN", RenderRequest::default()).await;
		assert!(matches!(outcome, UpdateOutcome::Input(InputOutcome::Committed { version: 1, .. })));
		assert_eq!(host.len(), 1);
		assert_eq!(host.handle_stats().live, 1);
	}

	#[tokio::test]
	async fn new_sessions_use_configured_render_request() {
		let (init, _) = FakeEngineBuilder::new().build();
		let config = RuntimeConfig {
			default_render: RenderRequest::new(640, 480),
			..RuntimeConfig::default()
		};
		let host = SessionHost::new(init, config);
		assert_eq!(host.attach("a").render_request().width, 640);
	}

	#[tokio::test]
	async fn dropping_host_releases_everything() {
		let (init, controller) = FakeEngineBuilder::new().build();
		let host = SessionHost::new(init, RuntimeConfig::default());
		for id in ["a", "b", "c"] {
			host.attach(id).submit_input("CCO").await;
		}
		assert_eq!(controller.live_artifacts(), 3);
		drop(host);
		assert_eq!(controller.live_artifacts(), 0);
	}
}
