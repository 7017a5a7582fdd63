#![forbid(unsafe_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds.
#[inline]
pub fn unix_ms_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::from_secs(0))
		.as_millis() as i64
}

/// Server event clock (unix ms) that never goes backwards.
///
/// `stamp` values are strictly increasing, and every `stamp` issued after a
/// `now` reading is greater than that reading. Clients echo the last `now`
/// they saw as `lastEventTime`, so anything stamped later is "new" to them.
#[derive(Debug, Default)]
pub struct EventClock {
	last: u64,
}

impl EventClock {
	/// Issue a fresh stamp for an event.
	pub fn stamp(&mut self) -> u64 {
		self.last = wall_ms().max(self.last.saturating_add(1));
		self.last
	}

	/// Current server time as reported to clients.
	pub fn now(&mut self) -> u64 {
		self.last = self.last.max(wall_ms());
		self.last
	}
}

fn wall_ms() -> u64 {
	unix_ms_now().max(0) as u64
}
