//! Data types shared between engine sessions and their consumers.
//!
//! This crate contains the serde-serializable values that cross the boundary
//! between the session runtime and whatever layer presents its results. These
//! types describe what a consumer asks for and what it gets back; nothing in
//! here touches the engine or owns an engine resource.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small constructors
//! * Handle-free: Consumers never see an engine handle, only snapshots
//! * Stable: Changes only when the consumer contract changes
//!
//! The lifecycle machinery that produces these values lives in `mv-runtime`.

pub mod error;
pub mod render;
pub mod snapshot;

pub use error::*;
pub use render::*;
pub use snapshot::*;
