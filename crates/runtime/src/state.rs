//! Per-session state mutated by the render coordinator.

use std::sync::Arc;

use mv_protocol::{ErrorKind, RenderRequest, SessionPhase, SessionSnapshot};

use crate::engine::Artifact;
use crate::handle::Handle;

/// Derived output stamped with the artifact version it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
	pub version: u64,
	pub markup: String,
}

/// Everything one consumer session holds.
///
/// Holds at most one handle at a time. Transition helpers that drop the
/// current handle return it so the caller decides where the release happens.
pub struct SessionState<A: Artifact> {
	pub(crate) handle: Option<Handle<A>>,
	pub(crate) version: u64,
	pub(crate) loading: bool,
	pub(crate) error: Option<ErrorKind>,
	pub(crate) output: Option<RenderedOutput>,
	pub(crate) phase: SessionPhase,
	pub(crate) input: Option<Arc<str>>,
	pub(crate) request: RenderRequest,
	pub(crate) canonical: Option<String>,
}

impl<A: Artifact> SessionState<A> {
	pub(crate) fn new(request: RenderRequest) -> Self {
		Self {
			handle: None,
			version: 0,
			loading: false,
			error: None,
			output: None,
			phase: SessionPhase::Idle,
			input: None,
			request,
			canonical: None,
		}
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn phase(&self) -> SessionPhase {
		self.phase
	}

	pub fn request(&self) -> &RenderRequest {
		&self.request
	}

	/// Input of the most recent creation attempt.
	pub fn input(&self) -> Option<&str> {
		self.input.as_deref()
	}

	pub fn handle(&self) -> Option<&Handle<A>> {
		self.handle.as_ref()
	}

	pub fn is_detached(&self) -> bool {
		self.phase == SessionPhase::Detached
	}

	pub(crate) fn begin_loading(&mut self, input: &str) {
		self.input = Some(Arc::from(input));
		self.loading = true;
		self.phase = SessionPhase::Loading;
	}

	/// Stores a freshly created handle and bumps the version.
	pub(crate) fn commit(&mut self, handle: Handle<A>, canonical: Option<String>) {
		debug_assert!(self.handle.is_none(), "previous handle must be released before commit");
		self.handle = Some(handle);
		self.version += 1;
		self.error = None;
		self.output = None;
		self.canonical = canonical;
		self.loading = false;
		self.phase = SessionPhase::Ready;
	}

	/// Records a creation failure. The session holds no handle afterwards.
	pub(crate) fn fail(&mut self, error: ErrorKind) -> Option<Handle<A>> {
		let previous = self.handle.take();
		self.error = Some(error);
		self.output = None;
		self.canonical = None;
		self.loading = false;
		self.phase = SessionPhase::Failed;
		previous
	}

	/// Returns to `Idle`, keeping the version and render request.
	pub(crate) fn reset(&mut self) -> Option<Handle<A>> {
		let previous = self.handle.take();
		self.input = None;
		self.loading = false;
		self.error = None;
		self.output = None;
		self.canonical = None;
		self.phase = SessionPhase::Idle;
		previous
	}

	pub(crate) fn detach(&mut self) -> Option<Handle<A>> {
		let previous = self.reset();
		self.phase = SessionPhase::Detached;
		previous
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		SessionSnapshot {
			output: self.output.as_ref().map(|output| output.markup.clone()),
			loading: self.loading,
			error: self.error.clone(),
			valid: self.handle.is_some(),
			version: self.version,
			phase: self.phase,
			canonical: self.canonical.clone(),
		}
	}
}
