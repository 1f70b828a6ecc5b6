//! Session snapshots published to consumers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Identifier for one consumer session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for SessionId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for SessionId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
	/// No input, no artifact.
	#[default]
	Idle,
	/// Waiting on the engine for a new artifact.
	Loading,
	/// An artifact is held for the current input.
	Ready,
	/// The last input could not be turned into an artifact, or the engine failed.
	Failed,
	/// The consumer detached; the session accepts no further input.
	Detached,
}

impl SessionPhase {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Detached)
	}
}

/// Point-in-time view of a session, as seen by its consumer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
	/// Derived output for the current artifact and render request.
	pub output: Option<String>,
	/// Whether an artifact creation is in flight.
	pub loading: bool,
	/// Most recent error, cleared by the next success of the same stage.
	pub error: Option<ErrorKind>,
	/// Whether the session currently holds an artifact.
	pub valid: bool,
	/// Monotonic artifact version; bumps on every committed creation.
	pub version: u64,
	pub phase: SessionPhase,
	/// Canonical form of the current artifact, when the engine produced one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub canonical: Option<String>,
}

/// Handle accounting across every session sharing one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HandleStats {
	/// Handles minted by successful creations.
	pub created: u64,
	/// Handles released.
	pub released: u64,
	/// Handles currently alive.
	pub live: u64,
}

impl HandleStats {
	/// Returns `true` when every created handle has been released.
	pub fn is_balanced(&self) -> bool {
		self.created == self.released && self.live == 0
	}
}
