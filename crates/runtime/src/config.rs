//! Runtime configuration with layered loading.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. JSON config file, when one is given
//! 3. Environment variables (`MV_*`)
//!
//! Each layer overrides the previous one, then the result is validated.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `MV_LOAD_POLICY` | `cache_failure` or `retry` |
//! | `MV_LOAD_MAX_ATTEMPTS` | attempt budget for `retry` |
//! | `MV_ACQUIRE_TIMEOUT_MS` | bound on engine acquisition; `0` or `none` disables it |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mv_protocol::RenderRequest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

pub const ENV_LOAD_POLICY: &str = "MV_LOAD_POLICY";
pub const ENV_LOAD_MAX_ATTEMPTS: &str = "MV_LOAD_MAX_ATTEMPTS";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "MV_ACQUIRE_TIMEOUT_MS";

/// Attempt budget used when `MV_LOAD_POLICY=retry` is set without an explicit count.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// What the loader does after an engine initialization fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoadPolicy {
	/// Keep the failed outcome for the life of the loader. Every later
	/// acquisition resolves to the same error.
	#[default]
	CacheFailure,
	/// Start a fresh initialization on the next acquisition after a settled
	/// failure, up to `max_attempts` initializations in total.
	Retry { max_attempts: u32 },
}

impl LoadPolicy {
	/// Returns `true` when another initialization may start after `attempts` have failed.
	pub fn allows_attempt(&self, attempts: u32) -> bool {
		match self {
			Self::CacheFailure => attempts == 0,
			Self::Retry { max_attempts } => attempts < *max_attempts,
		}
	}
}

/// Settings for the engine loader and the sessions built on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
	pub load_policy: LoadPolicy,
	/// Upper bound on how long a creation attempt waits for the engine.
	pub acquire_timeout_ms: Option<u64>,
	/// Render request new sessions start with.
	pub default_render: RenderRequest,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			load_policy: LoadPolicy::default(),
			acquire_timeout_ms: None,
			default_render: RenderRequest::default(),
		}
	}
}

impl RuntimeConfig {
	/// Reads a config file without applying environment overrides.
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source: Arc::new(source),
		})?;
		let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
			path: path.to_path_buf(),
			source: Arc::new(source),
		})?;
		config.validate()?;
		Ok(config)
	}

	pub fn acquire_timeout(&self) -> Option<Duration> {
		self.acquire_timeout_ms.map(Duration::from_millis)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if let LoadPolicy::Retry { max_attempts: 0 } = self.load_policy {
			return Err(ConfigError::Invalid("retry policy needs at least one attempt".to_string()));
		}
		if self.acquire_timeout_ms == Some(0) {
			return Err(ConfigError::Invalid("acquire timeout must be positive".to_string()));
		}
		if self.default_render.is_degenerate() {
			return Err(ConfigError::Invalid(format!(
				"default render size {}x{} has a zero dimension",
				self.default_render.width, self.default_render.height
			)));
		}
		Ok(())
	}

	/// Applies `MV_*` overrides read through `lookup`.
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let attempts = match lookup(ENV_LOAD_MAX_ATTEMPTS) {
			Some(raw) => Some(
				raw.trim()
					.parse::<u32>()
					.map_err(|_| ConfigError::invalid_env(ENV_LOAD_MAX_ATTEMPTS, "expected unsigned integer"))?,
			),
			None => None,
		};

		if let Some(raw) = lookup(ENV_LOAD_POLICY) {
			self.load_policy = match raw.trim().to_ascii_lowercase().as_str() {
				"cache_failure" | "cache" => LoadPolicy::CacheFailure,
				"retry" => LoadPolicy::Retry {
					max_attempts: attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
				},
				other => return Err(ConfigError::invalid_env(ENV_LOAD_POLICY, format!("unknown policy `{other}`"))),
			};
		} else if let (Some(max_attempts), LoadPolicy::Retry { .. }) = (attempts, self.load_policy) {
			self.load_policy = LoadPolicy::Retry { max_attempts };
		}

		if let (Some(_), LoadPolicy::CacheFailure) = (attempts, self.load_policy) {
			return Err(ConfigError::invalid_env(
				ENV_LOAD_MAX_ATTEMPTS,
				"only applies to the retry load policy",
			));
		}

		if let Some(raw) = lookup(ENV_ACQUIRE_TIMEOUT_MS) {
			let raw = raw.trim();
			self.acquire_timeout_ms = if raw.eq_ignore_ascii_case("none") {
				None
			} else {
				match raw.parse::<u64>() {
					Ok(0) => None,
					Ok(ms) => Some(ms),
					Err(_) => return Err(ConfigError::invalid_env(ENV_ACQUIRE_TIMEOUT_MS, "expected milliseconds or `none`")),
				}
			};
		}

		Ok(())
	}
}

/// Builder that assembles a [`RuntimeConfig`] from its layers.
///
/// ```ignore
/// let config = ConfigLoader::new()
///     .with_file("molview.json")
///     .skip_env()
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
	file: Option<PathBuf>,
	skip_env: bool,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.file = Some(path.into());
		self
	}

	pub fn skip_env(mut self) -> Self {
		self.skip_env = true;
		self
	}

	/// Loads using the process environment.
	pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
		self.load_with_env(|var| std::env::var(var).ok())
	}

	/// Loads using `lookup` in place of the process environment.
	pub fn load_with_env<F>(&self, lookup: F) -> Result<RuntimeConfig, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut config = match &self.file {
			Some(path) => {
				debug!(target = "mv.config", path = %path.display(), "loading config file");
				RuntimeConfig::from_file(path)?
			}
			None => RuntimeConfig::default(),
		};

		if !self.skip_env {
			config.apply_env(lookup)?;
		}

		config.validate()?;
		debug!(target = "mv.config", policy = ?config.load_policy, timeout_ms = ?config.acquire_timeout_ms, "config resolved");
		Ok(config)
	}
}
