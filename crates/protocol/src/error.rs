//! Consumer-visible error descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which stage of the session lifecycle produced an error.
///
/// Each category implies a different corrective action for the consumer:
/// wait or restart for `Load`, change the input for `Parse`, change the
/// render parameters for `Render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
	/// The shared engine failed to initialize.
	Load,
	/// The input could not be turned into an artifact.
	Parse,
	/// A valid artifact failed to produce derived output.
	Render,
}

impl fmt::Display for ErrorCategory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Load => "load",
			Self::Parse => "parse",
			Self::Render => "render",
		};
		f.write_str(name)
	}
}

/// Error as reported in a session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorKind {
	pub category: ErrorCategory,
	pub message: String,
}

impl ErrorKind {
	pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
		Self {
			category,
			message: message.into(),
		}
	}

	pub fn load(message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::Load, message)
	}

	pub fn parse(message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::Parse, message)
	}

	pub fn render(message: impl Into<String>) -> Self {
		Self::new(ErrorCategory::Render, message)
	}

	pub fn is_load(&self) -> bool {
		self.category == ErrorCategory::Load
	}

	pub fn is_parse(&self) -> bool {
		self.category == ErrorCategory::Parse
	}

	pub fn is_render(&self) -> bool {
		self.category == ErrorCategory::Render
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} error: {}", self.category, self.message)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn category_serializes_lowercase() {
		let err = ErrorKind::parse("unexpected token");
		let json = serde_json::to_value(&err).unwrap();
		assert_eq!(json["category"], "parse");
		assert_eq!(json["message"], "unexpected token");
	}

	#[test]
	fn display_includes_category() {
		assert_eq!(ErrorKind::render("bad size").to_string(), "render error: bad size");
	}
}
