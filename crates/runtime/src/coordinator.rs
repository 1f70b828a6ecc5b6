//! Two-phase render coordination for one consumer session.
//!
//! # Phase 1: creation
//!
//! Triggered by an input change. Issues a staleness token, waits for the
//! engine (the only suspension point), then replaces the session's handle.
//! Two checkpoints compare the token against the session's current one:
//!
//! 1. after the engine wait, before the previous handle is touched
//! 2. after `create`, before the new handle is committed
//!
//! An attempt that fails either check mutates nothing and releases whatever
//! handle it produced.
//!
//! # Phase 2: recomputation
//!
//! Triggered by a render-request change or by a Phase 1 commit. Runs the
//! handle's derive operation synchronously. It never waits and never sets
//! the loading flag; a render failure keeps the handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mv_protocol::{RenderRequest, SessionId, SessionPhase, SessionSnapshot};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::engine::{ArtifactOf, EngineInit};
use crate::error::{LoadError, ParseError, RenderError};
use crate::guard::{StalenessGuard, Token};
use crate::handle::{Handle, HandleFactory, HandleId};
use crate::loader::EngineLoader;
use crate::state::{RenderedOutput, SessionState};

/// Result of a Phase 1 transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
	/// A new handle was committed at `version`.
	Committed { version: u64, handle: HandleId },
	/// The engine rejected the input; the session holds no handle.
	ParseFailed(ParseError),
	/// The engine could not be acquired; the session holds no handle.
	LoadFailed(LoadError),
	/// A newer input or a detach superseded this attempt.
	Stale,
	/// Empty input reset the session to idle.
	Cleared,
	/// The session was already detached.
	Detached,
}

/// Result of a Phase 2 transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeOutcome {
	Rendered { version: u64 },
	/// Derive failed; the handle is kept.
	RenderFailed(RenderError),
	/// No handle to derive from.
	NoHandle,
	/// The render request did not change.
	Unchanged,
}

/// Drives one session through creation and recomputation.
pub struct RenderCoordinator<I: EngineInit> {
	id: SessionId,
	loader: Arc<EngineLoader<I>>,
	factory: HandleFactory,
	guard: StalenessGuard,
	state: Mutex<SessionState<ArtifactOf<I>>>,
	acquire_timeout: Option<Duration>,
	updates: watch::Sender<SessionSnapshot>,
}

impl<I: EngineInit> RenderCoordinator<I> {
	pub fn new(id: SessionId, loader: Arc<EngineLoader<I>>, factory: HandleFactory, request: RenderRequest) -> Self {
		let state = SessionState::new(request);
		let (updates, _) = watch::channel(state.snapshot());
		Self {
			id,
			loader,
			factory,
			guard: StalenessGuard::new(),
			state: Mutex::new(state),
			acquire_timeout: None,
			updates,
		}
	}

	/// Bounds how long a creation attempt waits for the engine.
	pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.acquire_timeout = timeout;
		self
	}

	pub fn id(&self) -> &SessionId {
		&self.id
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		self.state.lock().snapshot()
	}

	/// Receives a snapshot after every transition.
	pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
		self.updates.subscribe()
	}

	pub fn phase(&self) -> SessionPhase {
		self.state.lock().phase()
	}

	pub fn version(&self) -> u64 {
		self.state.lock().version()
	}

	pub fn render_request(&self) -> RenderRequest {
		self.state.lock().request().clone()
	}

	/// Input the current handle was parsed from.
	pub fn handle_input(&self) -> Option<String> {
		self.state.lock().handle().map(|handle| handle.input().to_string())
	}

	pub fn handle_id(&self) -> Option<HandleId> {
		self.state.lock().handle().map(Handle::id)
	}

	/// Phase 1: replaces the session's handle with one parsed from `input`.
	///
	/// Empty or whitespace-only input clears the session instead.
	pub async fn submit_input(&self, input: &str) -> InputOutcome {
		if input.trim().is_empty() {
			return self.clear();
		}

		let token = {
			let mut state = self.state.lock();
			if state.is_detached() {
				return InputOutcome::Detached;
			}
			let token = self.guard.new_token();
			state.begin_loading(input);
			self.publish(&state);
			token
		};
		debug!(target = "mv.session", session = %self.id, token = token.value(), "creation started");

		let engine = match self.acquire_engine().await {
			Ok(engine) => engine,
			Err(err) => return self.fail_load(token, err),
		};

		let previous = {
			let mut state = self.state.lock();
			if !self.guard.is_current(token) {
				debug!(target = "mv.session", session = %self.id, token = token.value(), "superseded while waiting for engine");
				return InputOutcome::Stale;
			}
			state.handle.take()
		};
		self.release(previous, "replaced");

		let created = self.factory.create(engine.as_ref(), input);

		let mut state = self.state.lock();
		if !self.guard.is_current(token) {
			if let Ok(handle) = created {
				warn!(target = "mv.session", session = %self.id, handle = %handle.id(), "discarding handle from superseded creation");
				handle.release();
			}
			return InputOutcome::Stale;
		}

		match created {
			Ok(handle) => {
				let id = handle.id();
				let canonical = match handle.canonical_form() {
					Ok(canonical) => Some(canonical),
					Err(err) => {
						debug!(target = "mv.session", session = %self.id, handle = %id, error = %err, "no canonical form");
						None
					}
				};
				state.commit(handle, canonical);
				let version = state.version();
				self.recompute_locked(&mut state);
				self.publish(&state);
				debug!(target = "mv.session", session = %self.id, handle = %id, version, "committed");
				InputOutcome::Committed { version, handle: id }
			}
			Err(err) => {
				let previous = state.fail((&err).into());
				self.publish(&state);
				drop(state);
				self.release(previous, "parse failed");
				debug!(target = "mv.session", session = %self.id, error = %err, "creation failed");
				InputOutcome::ParseFailed(err)
			}
		}
	}

	async fn acquire_engine(&self) -> Result<Arc<I::Engine>, LoadError> {
		let pending = self.loader.acquire();
		let Some(limit) = self.acquire_timeout else {
			return pending.await;
		};
		match tokio::time::timeout(limit, pending).await {
			Ok(result) => result,
			Err(_) => Err(LoadError::Timeout {
				timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
			}),
		}
	}

	fn fail_load(&self, token: Token, err: LoadError) -> InputOutcome {
		let mut state = self.state.lock();
		if !self.guard.is_current(token) {
			return InputOutcome::Stale;
		}
		let previous = state.fail((&err).into());
		self.publish(&state);
		drop(state);
		self.release(previous, "engine unavailable");
		warn!(target = "mv.session", session = %self.id, error = %err, "engine unavailable");
		InputOutcome::LoadFailed(err)
	}

	/// Stores a new render request without recomputing.
	///
	/// Used when an input change accompanies the request; the Phase 1 commit
	/// renders with it.
	pub fn stage_render_request(&self, request: RenderRequest) -> bool {
		let mut state = self.state.lock();
		if state.request == request {
			return false;
		}
		state.request = request;
		true
	}

	/// Phase 2 trigger: recomputes output if `request` differs from the current one.
	pub fn set_render_request(&self, request: RenderRequest) -> RecomputeOutcome {
		let mut state = self.state.lock();
		if state.request == request {
			return RecomputeOutcome::Unchanged;
		}
		state.request = request;
		let outcome = self.recompute_locked(&mut state);
		self.publish(&state);
		outcome
	}

	/// Phase 2: derives output from the current handle and render request.
	pub fn recompute(&self) -> RecomputeOutcome {
		let mut state = self.state.lock();
		let outcome = self.recompute_locked(&mut state);
		self.publish(&state);
		outcome
	}

	fn recompute_locked(&self, state: &mut SessionState<ArtifactOf<I>>) -> RecomputeOutcome {
		let result = match state.handle.as_ref() {
			Some(handle) => handle.render(&state.request),
			None => return RecomputeOutcome::NoHandle,
		};

		match result {
			Ok(markup) => {
				let version = state.version;
				state.output = Some(RenderedOutput { version, markup });
				state.error = None;
				RecomputeOutcome::Rendered { version }
			}
			Err(err) => {
				debug!(target = "mv.session", session = %self.id, error = %err, "render failed; keeping handle");
				state.output = None;
				state.error = Some((&err).into());
				RecomputeOutcome::RenderFailed(err)
			}
		}
	}

	/// Resets to idle, releasing the handle and superseding in-flight creation.
	pub fn clear(&self) -> InputOutcome {
		let mut state = self.state.lock();
		if state.is_detached() {
			return InputOutcome::Detached;
		}
		self.guard.invalidate();
		let previous = state.reset();
		self.publish(&state);
		drop(state);
		self.release(previous, "cleared");
		InputOutcome::Cleared
	}

	/// Tears the session down. Returns `false` if it was already detached.
	pub fn detach(&self) -> bool {
		let mut state = self.state.lock();
		if state.is_detached() {
			return false;
		}
		self.guard.invalidate();
		let previous = state.detach();
		self.publish(&state);
		drop(state);
		self.release(previous, "detached");
		debug!(target = "mv.session", session = %self.id, "detached");
		true
	}

	fn release(&self, handle: Option<Handle<ArtifactOf<I>>>, reason: &'static str) {
		if let Some(handle) = handle {
			debug!(target = "mv.session", session = %self.id, handle = %handle.id(), reason, "releasing handle");
			handle.release();
		}
	}

	fn publish(&self, state: &SessionState<ArtifactOf<I>>) {
		self.updates.send_replace(state.snapshot());
	}
}

impl<I: EngineInit> Drop for RenderCoordinator<I> {
	fn drop(&mut self) {
		self.detach();
	}
}

impl<I: EngineInit> fmt::Debug for RenderCoordinator<I> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderCoordinator")
			.field("id", &self.id)
			.field("phase", &self.phase())
			.field("version", &self.version())
			.finish()
	}
}
