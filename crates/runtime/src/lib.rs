//! Engine loading, handle lifecycle, and render sessions.
//!
//! One [`EngineLoader`] per process initializes the engine once and shares it.
//! Each consumer gets a [`RenderCoordinator`] that owns at most one
//! [`Handle`] and moves it through a two-phase protocol: asynchronous creation
//! when the input changes, synchronous recomputation when only the render
//! request changes. [`SessionHost`] ties the two together for many sessions.
//!
//! ```ignore
//! let host = SessionHost::new(engine_init, ConfigLoader::new().load()?);
//! let subscription = host.subscribe("editor");
//! subscription.update("CCO", RenderRequest::default()).await;
//! let snapshot = subscription.snapshot();
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fake;
pub mod guard;
pub mod handle;
pub mod host;
pub mod loader;
pub mod state;
pub mod subscription;

pub use config::{ConfigLoader, LoadPolicy, RuntimeConfig};
pub use coordinator::{InputOutcome, RecomputeOutcome, RenderCoordinator};
pub use engine::{Artifact, ArtifactOf, EngineFault, EngineInit, EngineModule, LoadFuture};
pub use error::{ConfigError, Error, LoadError, ParseError, RenderError, Result};
pub use guard::{StalenessGuard, Token};
pub use handle::{Handle, HandleFactory, HandleId, HandleLedger};
pub use host::SessionHost;
pub use loader::{Acquire, EngineLoader, LoaderState};
pub use mv_protocol::{ErrorCategory, ErrorKind, HandleStats, RenderRequest, SessionId, SessionPhase, SessionSnapshot};
pub use state::{RenderedOutput, SessionState};
pub use subscription::{Subscription, UpdateOutcome};
