//! Error types for engine loading, artifact creation, and rendering.
//!
//! Every error here is `Clone`: a failed engine load is cached and handed to
//! each caller that acquires afterwards, so the same value must be shareable.
//!
//! | Type | Scope | Recoverable by |
//! |------|-------|----------------|
//! | [`LoadError`] | every session sharing the loader | policy-dependent retry |
//! | [`ParseError`] | one session, one input | supplying different input |
//! | [`RenderError`] | one session, one request | changing render parameters |

use std::path::PathBuf;
use std::sync::Arc;

use mv_protocol::ErrorKind;
use thiserror::Error;

/// Longest input prefix echoed back in parse errors.
const INPUT_PREVIEW_CHARS: usize = 48;

/// The shared engine could not be initialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
	/// The engine's own initialization reported a failure.
	#[error("engine initialization failed: {0}")]
	Init(String),

	/// The caller stopped waiting; the initialization itself may still complete.
	#[error("engine not ready after {timeout_ms}ms")]
	Timeout { timeout_ms: u64 },

	/// The initialization was dropped before producing an engine.
	#[error("engine initialization abandoned")]
	Abandoned,
}

impl LoadError {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}

/// An input could not be turned into an artifact handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	/// The engine refused the input.
	#[error("engine rejected input `{input_preview}`")]
	Rejected { input_preview: String },

	/// The input was empty or whitespace only.
	#[error("input is empty")]
	Empty,
}

impl ParseError {
	pub(crate) fn rejected(input: &str) -> Self {
		let trimmed = input.trim();
		let mut input_preview: String = trimmed.chars().take(INPUT_PREVIEW_CHARS).collect();
		if trimmed.chars().count() > INPUT_PREVIEW_CHARS {
			input_preview.push('…');
		}
		Self::Rejected { input_preview }
	}
}

/// A valid artifact failed to produce derived output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
	/// The engine reported a failure for the given parameters.
	#[error("engine failed to derive output: {0}")]
	Engine(String),

	/// The render request cannot be satisfied by any engine.
	#[error("invalid render request: {0}")]
	InvalidRequest(String),

	/// The handle no longer owns its artifact.
	#[error("handle already released")]
	Released,
}

/// Configuration could not be loaded or failed validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: Arc<std::io::Error>,
	},

	#[error("failed to parse config {path}: {source}")]
	Json {
		path: PathBuf,
		#[source]
		source: Arc<serde_json::Error>,
	},

	#[error("invalid environment variable {var}: {reason}")]
	InvalidEnv { var: String, reason: String },

	#[error("invalid config: {0}")]
	Invalid(String),
}

impl ConfigError {
	pub(crate) fn invalid_env(var: &str, reason: impl Into<String>) -> Self {
		Self::InvalidEnv {
			var: var.to_string(),
			reason: reason.into(),
		}
	}
}

/// Any error produced by this crate.
#[derive(Debug, Clone, Error)]
pub enum Error {
	#[error(transparent)]
	Load(#[from] LoadError),

	#[error(transparent)]
	Parse(#[from] ParseError),

	#[error(transparent)]
	Render(#[from] RenderError),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl Error {
	/// Returns `true` when the same session can recover without a restart.
	pub fn is_recoverable(&self) -> bool {
		match self {
			Self::Load(err) => err.is_timeout(),
			Self::Parse(_) | Self::Render(_) => true,
			Self::Config(_) => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<&LoadError> for ErrorKind {
	fn from(err: &LoadError) -> Self {
		ErrorKind::load(err.to_string())
	}
}

impl From<&ParseError> for ErrorKind {
	fn from(err: &ParseError) -> Self {
		ErrorKind::parse(err.to_string())
	}
}

impl From<&RenderError> for ErrorKind {
	fn from(err: &RenderError) -> Self {
		ErrorKind::render(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use mv_protocol::ErrorCategory;

	use super::*;

	#[test]
	fn rejected_preview_is_trimmed_and_truncated() {
		let long = format!("  {}  ", "C".repeat(100));
		match ParseError::rejected(&long) {
			ParseError::Rejected { input_preview } => {
				assert_eq!(input_preview.chars().count(), INPUT_PREVIEW_CHARS + 1);
				assert!(input_preview.ends_with('…'));
				assert!(input_preview.starts_with('C'));
			}
			other => panic!("expected Rejected, got {other:?}"),
		}
	}

	#[test]
	fn errors_map_to_consumer_categories() {
		assert_eq!(ErrorKind::from(&LoadError::Abandoned).category, ErrorCategory::Load);
		assert_eq!(ErrorKind::from(&ParseError::Empty).category, ErrorCategory::Parse);
		assert_eq!(ErrorKind::from(&RenderError::Released).category, ErrorCategory::Render);
	}

	#[test]
	fn only_cached_load_failures_are_unrecoverable() {
		assert!(!Error::from(LoadError::Init("missing symbol".into())).is_recoverable());
		assert!(Error::from(LoadError::Timeout { timeout_ms: 10 }).is_recoverable());
		assert!(Error::from(ParseError::Empty).is_recoverable());
		assert!(Error::from(RenderError::Engine("x".into())).is_recoverable());
	}
}
