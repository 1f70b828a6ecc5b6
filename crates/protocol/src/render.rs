//! Render parameters for derived output.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Default output width in pixels.
pub const DEFAULT_RENDER_WIDTH: u32 = 300;
/// Default output height in pixels.
pub const DEFAULT_RENDER_HEIGHT: u32 = 150;

/// Describes the derived output a consumer wants from the current artifact.
///
/// Two requests compare equal when every field matches; the highlight set is
/// ordered so equality does not depend on insertion order. Changing a request
/// only ever triggers recomputation against the existing artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
	/// Output width in pixels.
	pub width: u32,
	/// Output height in pixels.
	pub height: u32,
	/// Element indices to highlight.
	#[serde(default)]
	pub highlighted: BTreeSet<u32>,
	/// Whether element annotations are drawn.
	#[serde(default)]
	pub annotate: bool,
}

impl Default for RenderRequest {
	fn default() -> Self {
		Self::new(DEFAULT_RENDER_WIDTH, DEFAULT_RENDER_HEIGHT)
	}
}

impl RenderRequest {
	/// Creates a request with the given dimensions, no highlights and no annotations.
	pub fn new(width: u32, height: u32) -> Self {
		Self {
			width,
			height,
			highlighted: BTreeSet::new(),
			annotate: false,
		}
	}

	/// Replaces the highlight set.
	pub fn with_highlighted<I>(mut self, indices: I) -> Self
	where
		I: IntoIterator<Item = u32>,
	{
		self.highlighted = indices.into_iter().collect();
		self
	}

	/// Sets the annotation flag.
	pub fn with_annotate(mut self, annotate: bool) -> Self {
		self.annotate = annotate;
		self
	}

	/// Sets output dimensions.
	pub fn with_size(mut self, width: u32, height: u32) -> Self {
		self.width = width;
		self.height = height;
		self
	}

	/// Highlighted indices in ascending order.
	pub fn highlighted_indices(&self) -> Vec<u32> {
		self.highlighted.iter().copied().collect()
	}

	/// Returns `true` when either dimension is zero.
	pub fn is_degenerate(&self) -> bool {
		self.width == 0 || self.height == 0
	}
}
