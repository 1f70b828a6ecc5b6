//! Consumer-facing facade over a render coordinator.
//!
//! A [`Subscription`] takes `(input, request)` pairs the way a reactive UI
//! supplies them and routes each change to the right phase: a new input goes
//! through creation, a new request alone goes straight to recomputation.

use std::sync::Arc;

use mv_protocol::{RenderRequest, SessionSnapshot};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::coordinator::{InputOutcome, RecomputeOutcome, RenderCoordinator};
use crate::engine::EngineInit;

/// What an [`update`](Subscription::update) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
	/// The input changed and went through creation.
	Input(InputOutcome),
	/// Only the render request changed.
	Request(RecomputeOutcome),
	/// Neither argument changed.
	Unchanged,
}

pub struct Subscription<I: EngineInit> {
	coordinator: Arc<RenderCoordinator<I>>,
	last_input: Mutex<Option<String>>,
}

impl<I: EngineInit> Subscription<I> {
	pub fn new(coordinator: Arc<RenderCoordinator<I>>) -> Self {
		Self {
			coordinator,
			last_input: Mutex::new(None),
		}
	}

	pub fn coordinator(&self) -> &Arc<RenderCoordinator<I>> {
		&self.coordinator
	}

	/// Applies the consumer's current arguments.
	///
	/// When the input changed, the request is staged first so the creation
	/// commit renders with it; the old artifact is never rendered with the new
	/// request on the way out.
	pub async fn update(&self, input: &str, request: RenderRequest) -> UpdateOutcome {
		let input_changed = {
			let mut last = self.last_input.lock();
			if last.as_deref() == Some(input) {
				false
			} else {
				*last = Some(input.to_string());
				true
			}
		};

		if input_changed {
			self.coordinator.stage_render_request(request);
			let outcome = self.coordinator.submit_input(input).await;
			if matches!(outcome, InputOutcome::LoadFailed(_) | InputOutcome::Stale) {
				self.forget_input(input);
			}
			return UpdateOutcome::Input(outcome);
		}

		match self.coordinator.set_render_request(request) {
			RecomputeOutcome::Unchanged => UpdateOutcome::Unchanged,
			outcome => UpdateOutcome::Request(outcome),
		}
	}

	/// Lets the same input be submitted again after it never reached a commit.
	fn forget_input(&self, input: &str) {
		let mut last = self.last_input.lock();
		if last.as_deref() == Some(input) {
			*last = None;
		}
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		self.coordinator.snapshot()
	}

	pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
		self.coordinator.watch()
	}

	/// Detaches the underlying session.
	pub fn detach(&self) -> bool {
		self.coordinator.detach()
	}
}
