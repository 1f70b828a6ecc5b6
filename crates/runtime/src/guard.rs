//! Per-session staleness tokens.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

/// Identifies one creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
	pub fn value(self) -> u64 {
		self.0
	}
}

/// Issues tokens where only the most recently issued one is current.
///
/// Issuing a token atomically invalidates every token issued before it.
#[derive(Debug, Default)]
pub struct StalenessGuard {
	current: AtomicU64,
}

impl StalenessGuard {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn new_token(&self) -> Token {
		let value = self.current.fetch_add(1, Ordering::SeqCst) + 1;
		trace!(target = "mv.session", token = value, "issued staleness token");
		Token(value)
	}

	pub fn is_current(&self, token: Token) -> bool {
		self.current.load(Ordering::SeqCst) == token.0
	}

	/// Invalidates every outstanding token without handing out a new one.
	pub fn invalidate(&self) {
		self.current.fetch_add(1, Ordering::SeqCst);
	}
}
