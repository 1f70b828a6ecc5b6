//! Process-wide engine loader.
//!
//! The loader caches the in-flight initialization future itself, not just its
//! eventual result. Every [`acquire`](EngineLoader::acquire) that arrives while
//! the engine is still loading gets a clone of that same future, so the
//! initializer runs once no matter how many callers race on first access.
//!
//! # States
//!
//! ```text
//! Unloaded ──acquire──▶ Loading ──ok──▶ Ready
//!                          │
//!                          └──err──▶ Failed ──acquire (retry policy, budget left)──▶ Loading
//! ```
//!
//! Under [`LoadPolicy::CacheFailure`] a failure is terminal for the loader.

use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::LoadPolicy;
use crate::engine::EngineInit;
use crate::error::LoadError;

/// Shared future every caller of [`EngineLoader::acquire`] awaits.
pub type Acquire<E> = Shared<BoxFuture<'static, Result<Arc<E>, LoadError>>>;

/// Observable state of an [`EngineLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
	Unloaded,
	Loading,
	Ready,
	Failed,
}

struct Slot<E> {
	pending: Option<Acquire<E>>,
	/// Initializations started so far.
	attempts: u32,
}

/// Lazily initializes one engine and shares it with every caller.
pub struct EngineLoader<I: EngineInit> {
	init: Arc<I>,
	policy: LoadPolicy,
	slot: Mutex<Slot<I::Engine>>,
}

impl<I: EngineInit> EngineLoader<I> {
	pub fn new(init: I, policy: LoadPolicy) -> Self {
		Self {
			init: Arc::new(init),
			policy,
			slot: Mutex::new(Slot { pending: None, attempts: 0 }),
		}
	}

	pub fn policy(&self) -> LoadPolicy {
		self.policy
	}

	/// Returns the shared future resolving to the engine.
	///
	/// The first call starts initialization. Later calls return a clone of the
	/// cached future: still pending, already resolved, or (unless the retry
	/// policy allows another attempt) already failed.
	pub fn acquire(&self) -> Acquire<I::Engine> {
		let mut slot = self.slot.lock();

		if let Some(pending) = &slot.pending {
			let settled_failure = matches!(pending.peek(), Some(Err(_)));
			if !settled_failure || !self.policy.allows_attempt(slot.attempts) {
				return pending.clone();
			}
			debug!(target = "mv.loader", attempt = slot.attempts + 1, "previous initialization failed; retrying");
		}

		slot.attempts += 1;
		let attempt = slot.attempts;
		let pending = self.start(attempt);
		slot.pending = Some(pending.clone());
		pending
	}

	fn start(&self, attempt: u32) -> Acquire<I::Engine> {
		debug!(target = "mv.loader", attempt, "starting engine initialization");
		let load = self.init.load();
		async move {
			match load.await {
				Ok(engine) => {
					info!(target = "mv.loader", attempt, "engine ready");
					Ok(Arc::new(engine))
				}
				Err(err) => {
					warn!(target = "mv.loader", attempt, error = %err, "engine initialization failed");
					Err(err)
				}
			}
		}
		.boxed()
		.shared()
	}

	/// Returns the engine if it has finished loading.
	pub fn ready_engine(&self) -> Option<Arc<I::Engine>> {
		let slot = self.slot.lock();
		match slot.pending.as_ref()?.peek() {
			Some(Ok(engine)) => Some(Arc::clone(engine)),
			_ => None,
		}
	}

	pub fn state(&self) -> LoaderState {
		let slot = self.slot.lock();
		match slot.pending.as_ref().map(Shared::peek) {
			None => LoaderState::Unloaded,
			Some(None) => LoaderState::Loading,
			Some(Some(Ok(_))) => LoaderState::Ready,
			Some(Some(Err(_))) => LoaderState::Failed,
		}
	}

	/// Number of initializations started over the loader's life.
	pub fn attempts(&self) -> u32 {
		self.slot.lock().attempts
	}
}

impl<I: EngineInit> fmt::Debug for EngineLoader<I> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EngineLoader")
			.field("policy", &self.policy)
			.field("state", &self.state())
			.field("attempts", &self.attempts())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fake::FakeEngineBuilder;

	#[tokio::test]
	async fn concurrent_acquires_share_one_initialization() {
		let (init, controller) = FakeEngineBuilder::new().hold_load().build();
		let loader = Arc::new(EngineLoader::new(init, LoadPolicy::CacheFailure));

		let waiters: Vec<_> = (0..8).map(|_| loader.acquire()).collect();
		assert_eq!(loader.state(), LoaderState::Loading);
		assert_eq!(controller.load_starts(), 1);

		controller.complete_load();
		let engines = futures_util::future::join_all(waiters).await;

		let first = engines[0].as_ref().unwrap();
		for engine in &engines {
			assert!(Arc::ptr_eq(first, engine.as_ref().unwrap()));
		}
		assert_eq!(controller.load_starts(), 1);
		assert_eq!(loader.state(), LoaderState::Ready);
	}

	#[tokio::test]
	async fn ready_engine_is_reused_without_reinitializing() {
		let (init, controller) = FakeEngineBuilder::new().build();
		let loader = EngineLoader::new(init, LoadPolicy::CacheFailure);

		assert!(loader.ready_engine().is_none());
		let first = loader.acquire().await.unwrap();
		let second = loader.acquire().await.unwrap();

		assert!(Arc::ptr_eq(&first, &second));
		assert!(Arc::ptr_eq(&first, &loader.ready_engine().unwrap()));
		assert_eq!(controller.load_starts(), 1);
	}

	#[tokio::test]
	async fn cached_failure_is_returned_without_retrying() {
		let (init, controller) = FakeEngineBuilder::new().fail_loads(1).build();
		let loader = EngineLoader::new(init, LoadPolicy::CacheFailure);

		let first = loader.acquire().await.unwrap_err();
		let second = loader.acquire().await.unwrap_err();

		assert_eq!(first, second);
		assert_eq!(loader.state(), LoaderState::Failed);
		assert_eq!(controller.load_starts(), 1);
	}

	#[tokio::test]
	async fn retry_policy_starts_fresh_attempt_after_failure() {
		let (init, controller) = FakeEngineBuilder::new().fail_loads(1).build();
		let loader = EngineLoader::new(init, LoadPolicy::Retry { max_attempts: 2 });

		assert!(loader.acquire().await.is_err());
		assert!(loader.acquire().await.is_ok());
		assert_eq!(controller.load_starts(), 2);
		assert_eq!(loader.attempts(), 2);
	}

	#[tokio::test]
	async fn retry_budget_is_bounded() {
		let (init, controller) = FakeEngineBuilder::new().fail_loads(5).build();
		let loader = EngineLoader::new(init, LoadPolicy::Retry { max_attempts: 2 });

		for _ in 0..4 {
			assert!(loader.acquire().await.is_err());
		}
		assert_eq!(controller.load_starts(), 2);
	}

	#[test]
	fn unloaded_until_first_acquire() {
		let (init, controller) = FakeEngineBuilder::new().build();
		let loader = EngineLoader::new(init, LoadPolicy::CacheFailure);
		assert_eq!(loader.state(), LoaderState::Unloaded);
		assert_eq!(controller.load_starts(), 0);
	}
}
