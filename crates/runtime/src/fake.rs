//! In-memory engine for exercising the session lifecycle without a native library.
//!
//! The fake engine accepts any input that contains no `$`, produces an
//! artifact that reports itself invalid for input starting with `!`, and
//! renders a small SVG-like string echoing its parameters. Its canonical form
//! is the input reversed.
//!
//! # Example
//!
//! ```ignore
//! let (init, controller) = FakeEngineBuilder::new().hold_load().build();
//! let loader = Arc::new(EngineLoader::new(init, LoadPolicy::CacheFailure));
//!
//! let pending = loader.acquire();
//! assert_eq!(controller.load_starts(), 1);
//! controller.complete_load();
//! let engine = pending.await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::engine::{Artifact, EngineFault, EngineInit, EngineModule, LoadFuture};
use crate::error::LoadError;

type ParseHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Counters {
	load_starts: AtomicUsize,
	parse_calls: AtomicUsize,
	render_calls: AtomicUsize,
	allocated: AtomicUsize,
	releases: AtomicUsize,
	double_releases: AtomicUsize,
}

struct Shared {
	counters: Counters,
	failing_loads: AtomicUsize,
	fail_renders: AtomicBool,
	next_artifact: AtomicU64,
	gate: watch::Sender<bool>,
	parse_hook: Mutex<Option<ParseHook>>,
}

/// Builder for a fake engine and its controller.
pub struct FakeEngineBuilder {
	hold_load: bool,
	failing_loads: usize,
}

impl FakeEngineBuilder {
	pub fn new() -> Self {
		Self {
			hold_load: false,
			failing_loads: 0,
		}
	}

	/// Keeps every initialization pending until [`FakeEngineController::complete_load`].
	pub fn hold_load(mut self) -> Self {
		self.hold_load = true;
		self
	}

	/// Fails the first `count` initializations.
	pub fn fail_loads(mut self, count: usize) -> Self {
		self.failing_loads = count;
		self
	}

	pub fn build(self) -> (FakeLoader, FakeEngineController) {
		let (gate, _) = watch::channel(!self.hold_load);
		let shared = Arc::new(Shared {
			counters: Counters::default(),
			failing_loads: AtomicUsize::new(self.failing_loads),
			fail_renders: AtomicBool::new(false),
			next_artifact: AtomicU64::new(0),
			gate,
			parse_hook: Mutex::new(None),
		});
		(
			FakeLoader {
				shared: Arc::clone(&shared),
			},
			FakeEngineController { shared },
		)
	}
}

impl Default for FakeEngineBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Initializer half of the fake engine.
pub struct FakeLoader {
	shared: Arc<Shared>,
}

impl EngineInit for FakeLoader {
	type Engine = FakeEngine;

	fn load(&self) -> LoadFuture<FakeEngine> {
		let shared = Arc::clone(&self.shared);
		shared.counters.load_starts.fetch_add(1, Ordering::SeqCst);
		let fail = shared
			.failing_loads
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();
		let mut gate = shared.gate.subscribe();

		Box::pin(async move {
			let opened = gate.wait_for(|open| *open).await.is_ok();
			if !opened {
				return Err(LoadError::Abandoned);
			}
			if fail {
				return Err(LoadError::Init("fake engine refused to start".to_string()));
			}
			Ok(FakeEngine { shared })
		})
	}
}

/// Loaded fake engine.
pub struct FakeEngine {
	shared: Arc<Shared>,
}

impl EngineModule for FakeEngine {
	type Artifact = FakeArtifact;

	fn parse(&self, text: &str) -> Option<FakeArtifact> {
		let counters = &self.shared.counters;
		counters.parse_calls.fetch_add(1, Ordering::SeqCst);

		let hook = self.shared.parse_hook.lock().clone();
		if let Some(hook) = hook {
			hook(text);
		}

		if text.contains('$') {
			return None;
		}

		counters.allocated.fetch_add(1, Ordering::SeqCst);
		Some(FakeArtifact {
			serial: self.shared.next_artifact.fetch_add(1, Ordering::SeqCst) + 1,
			input: text.to_string(),
			valid: !text.starts_with('!'),
			released: false,
			shared: Arc::clone(&self.shared),
		})
	}
}

impl fmt::Debug for FakeEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FakeEngine").finish_non_exhaustive()
	}
}

/// Artifact produced by [`FakeEngine`].
pub struct FakeArtifact {
	serial: u64,
	input: String,
	valid: bool,
	released: bool,
	shared: Arc<Shared>,
}

impl FakeArtifact {
	pub fn serial(&self) -> u64 {
		self.serial
	}
}

impl Artifact for FakeArtifact {
	fn render(&self, width: u32, height: u32, highlighted: &[u32], annotate: bool) -> Result<String, EngineFault> {
		self.shared.counters.render_calls.fetch_add(1, Ordering::SeqCst);
		if self.shared.fail_renders.load(Ordering::SeqCst) {
			return Err(EngineFault::new("fake renderer failure"));
		}
		let highlighted = highlighted.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
		Ok(format!(
			"<svg data-input=\"{}\" width=\"{width}\" height=\"{height}\" highlight=\"{highlighted}\" annotate=\"{annotate}\"/>",
			self.input
		))
	}

	fn canonical_form(&self) -> Result<String, EngineFault> {
		Ok(self.input.chars().rev().collect())
	}

	fn is_valid(&self) -> bool {
		self.valid
	}

	fn release(&mut self) {
		let counters = &self.shared.counters;
		if self.released {
			counters.double_releases.fetch_add(1, Ordering::SeqCst);
			return;
		}
		self.released = true;
		counters.releases.fetch_add(1, Ordering::SeqCst);
	}
}

/// Test-side control over a fake engine.
#[derive(Clone)]
pub struct FakeEngineController {
	shared: Arc<Shared>,
}

impl FakeEngineController {
	/// Lets held initializations finish.
	pub fn complete_load(&self) {
		self.shared.gate.send_replace(true);
	}

	pub fn fail_renders(&self, fail: bool) {
		self.shared.fail_renders.store(fail, Ordering::SeqCst);
	}

	/// Runs `hook` at the start of every parse, with the parsed text.
	pub fn set_parse_hook<F>(&self, hook: F)
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		*self.shared.parse_hook.lock() = Some(Arc::new(hook));
	}

	pub fn load_starts(&self) -> usize {
		self.shared.counters.load_starts.load(Ordering::SeqCst)
	}

	pub fn parse_calls(&self) -> usize {
		self.shared.counters.parse_calls.load(Ordering::SeqCst)
	}

	pub fn render_calls(&self) -> usize {
		self.shared.counters.render_calls.load(Ordering::SeqCst)
	}

	pub fn releases(&self) -> usize {
		self.shared.counters.releases.load(Ordering::SeqCst)
	}

	pub fn double_releases(&self) -> usize {
		self.shared.counters.double_releases.load(Ordering::SeqCst)
	}

	/// Artifacts allocated and not yet released.
	pub fn live_artifacts(&self) -> usize {
		let counters = &self.shared.counters;
		counters.allocated.load(Ordering::SeqCst) - counters.releases.load(Ordering::SeqCst)
	}
}
