use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of the current time for deadline checks.
///
/// Timeouts are detected by comparing wall-clock readings inside `process()`
/// rather than by scheduled callbacks, so substituting this trait is enough
/// to make every timeout deterministic in tests.
pub trait Clock {
	fn now(&self) -> Instant;
}

/// The real wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// A clock that only moves when told to.
///
/// Intended for tests that need to step past incoming- or waiting-packet
/// deadlines without sleeping.
#[derive(Debug)]
pub struct ManualClock {
	origin: Instant,
	offset: Mutex<Duration>,
}

impl ManualClock {
	pub fn new() -> ManualClock {
		ManualClock {
			origin: Instant::now(),
			offset: Mutex::new(Duration::from_secs(0)),
		}
	}

	pub fn advance(&self, by: Duration) {
		let mut offset = self.offset.lock().unwrap();
		*offset += by;
	}
}

impl Default for ManualClock {
	fn default() -> ManualClock {
		ManualClock::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.origin + *self.offset.lock().unwrap()
	}
}
