//! Artifact handles, their factory, and the release ledger.
//!
//! A [`Handle`] owns exactly one engine artifact and the obligation to release
//! it. Release happens through the consuming [`Handle::release`], or through
//! `Drop` when a handle goes out of scope on any other path (error return,
//! discarded stale attempt, session teardown, unwinding). Because release takes
//! the handle by value, a released handle cannot be used or released again.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mv_protocol::{HandleStats, RenderRequest};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::engine::{Artifact, EngineModule};
use crate::error::{ParseError, RenderError};

/// Process-unique handle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
	pub fn value(self) -> u64 {
		self.0
	}
}

impl fmt::Display for HandleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "handle@{}", self.0)
	}
}

/// Records every handle minted and released.
#[derive(Debug, Default)]
pub struct HandleLedger {
	next_id: AtomicU64,
	released: AtomicU64,
	live: Mutex<HashSet<HandleId>>,
}

impl HandleLedger {
	pub fn new() -> Self {
		Self::default()
	}

	fn mint(&self) -> HandleId {
		let id = HandleId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
		self.live.lock().insert(id);
		id
	}

	/// Returns `false` when `id` was not live, which means a second release.
	fn record_release(&self, id: HandleId) -> bool {
		if !self.live.lock().remove(&id) {
			warn!(target = "mv.handle", handle = %id, "release of a handle that is not live");
			return false;
		}
		self.released.fetch_add(1, Ordering::SeqCst);
		true
	}

	pub fn is_live(&self, id: HandleId) -> bool {
		self.live.lock().contains(&id)
	}

	pub fn stats(&self) -> HandleStats {
		HandleStats {
			created: self.next_id.load(Ordering::SeqCst),
			released: self.released.load(Ordering::SeqCst),
			live: self.live.lock().len() as u64,
		}
	}
}

/// Exclusive owner of one engine artifact.
pub struct Handle<A: Artifact> {
	id: HandleId,
	input: Arc<str>,
	artifact: Option<A>,
	ledger: Arc<HandleLedger>,
}

impl<A: Artifact> Handle<A> {
	pub fn id(&self) -> HandleId {
		self.id
	}

	/// The input this handle was parsed from.
	pub fn input(&self) -> &str {
		&self.input
	}

	pub fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
		if request.is_degenerate() {
			return Err(RenderError::InvalidRequest(format!("{}x{} has a zero dimension", request.width, request.height)));
		}
		let artifact = self.artifact.as_ref().ok_or(RenderError::Released)?;
		artifact
			.render(request.width, request.height, &request.highlighted_indices(), request.annotate)
			.map_err(|fault| RenderError::Engine(fault.0))
	}

	pub fn canonical_form(&self) -> Result<String, RenderError> {
		let artifact = self.artifact.as_ref().ok_or(RenderError::Released)?;
		artifact.canonical_form().map_err(|fault| RenderError::Engine(fault.0))
	}

	/// Releases the artifact.
	pub fn release(mut self) {
		self.release_artifact();
	}

	fn release_artifact(&mut self) {
		if let Some(mut artifact) = self.artifact.take() {
			artifact.release();
			if self.ledger.record_release(self.id) {
				debug!(target = "mv.handle", handle = %self.id, "released");
			}
		}
	}
}

impl<A: Artifact> Drop for Handle<A> {
	fn drop(&mut self) {
		if self.artifact.is_some() {
			debug!(target = "mv.handle", handle = %self.id, "releasing handle on drop");
			self.release_artifact();
		}
	}
}

impl<A: Artifact> fmt::Debug for Handle<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Handle")
			.field("id", &self.id)
			.field("input", &self.input)
			.field("released", &self.artifact.is_none())
			.finish()
	}
}

/// Turns raw input into handles.
#[derive(Debug, Clone)]
pub struct HandleFactory {
	ledger: Arc<HandleLedger>,
}

impl HandleFactory {
	pub fn new(ledger: Arc<HandleLedger>) -> Self {
		Self { ledger }
	}

	pub fn ledger(&self) -> &Arc<HandleLedger> {
		&self.ledger
	}

	/// Parses `input` with `engine`.
	///
	/// On error no artifact is left allocated: artifacts the engine produced
	/// but reports invalid are released before returning.
	pub fn create<E: EngineModule>(&self, engine: &E, input: &str) -> Result<Handle<E::Artifact>, ParseError> {
		if input.trim().is_empty() {
			return Err(ParseError::Empty);
		}

		let Some(mut artifact) = engine.parse(input) else {
			debug!(target = "mv.handle", "engine rejected input");
			return Err(ParseError::rejected(input));
		};

		if !artifact.is_valid() {
			artifact.release();
			debug!(target = "mv.handle", "engine produced an invalid artifact; released it");
			return Err(ParseError::rejected(input));
		}

		let id = self.ledger.mint();
		debug!(target = "mv.handle", handle = %id, "created");
		Ok(Handle {
			id,
			input: Arc::from(input),
			artifact: Some(artifact),
			ledger: Arc::clone(&self.ledger),
		})
	}
}
