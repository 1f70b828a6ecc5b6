//! Contract for the externally compiled computation engine.
//!
//! The engine is consumed, not implemented, by this crate. Adapters for a
//! concrete engine implement three traits:
//!
//! * [`EngineInit`] performs the one-time, possibly slow initialization
//! * [`EngineModule`] is the loaded engine, shared read-only by every session
//! * [`Artifact`] is one engine-owned parsed object that must be released
//!   exactly once
//!
//! Artifacts are never handed to consumers directly; the runtime wraps each one
//! in a [`Handle`](crate::handle::Handle) that owns the release obligation.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::error::LoadError;

/// Failure reported by an engine derive operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineFault(pub String);

impl EngineFault {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// Future returned by [`EngineInit::load`].
pub type LoadFuture<E> = Pin<Box<dyn Future<Output = Result<E, LoadError>> + Send + 'static>>;

/// One-time initializer for an engine.
pub trait EngineInit: Send + Sync + 'static {
	type Engine: EngineModule;

	/// Begins initialization.
	///
	/// The loader calls this at most once per attempt and shares the returned
	/// future between every caller that arrives before it settles.
	fn load(&self) -> LoadFuture<Self::Engine>;
}

/// A loaded engine. Immutable after creation.
pub trait EngineModule: Send + Sync + 'static {
	type Artifact: Artifact;

	/// Parses `text` into a new artifact, or `None` when the engine rejects it.
	///
	/// A `None` result must not leave any engine allocation behind.
	fn parse(&self, text: &str) -> Option<Self::Artifact>;
}

/// An engine-owned parsed object.
///
/// Derive operations do not mutate or invalidate the artifact. After
/// [`release`](Artifact::release) no other method may be called.
pub trait Artifact: Send + 'static {
	/// Renders markup for the given dimensions, highlights and annotation flag.
	fn render(&self, width: u32, height: u32, highlighted: &[u32], annotate: bool) -> Result<String, EngineFault>;

	/// Returns the engine's canonical textual form of the artifact.
	fn canonical_form(&self) -> Result<String, EngineFault>;

	/// Some engines allocate an artifact for input they cannot use and only
	/// report the problem through a validity check.
	fn is_valid(&self) -> bool {
		true
	}

	/// Frees the engine-side resource. Called exactly once.
	fn release(&mut self);
}

/// Artifact type produced by the engine behind an initializer.
pub type ArtifactOf<I> = <<I as EngineInit>::Engine as EngineModule>::Artifact;
