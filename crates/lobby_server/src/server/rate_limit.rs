#![forbid(unsafe_code)]

use std::collections::HashMap;

use lobby_domain::ClientId;
use tokio::time::Instant;

#[derive(Debug)]
struct TokenBucket {
	capacity: f64,
	tokens: f64,
	refill_per_sec: f64,
	last: Instant,
}

impl TokenBucket {
	fn new(capacity: u32, refill_per_minute: u32, now: Instant) -> Option<Self> {
		if capacity == 0 || refill_per_minute == 0 {
			return None;
		}
		Some(Self {
			capacity: capacity as f64,
			tokens: capacity as f64,
			refill_per_sec: refill_per_minute as f64 / 60.0,
			last: now,
		})
	}

	fn allow(&mut self, now: Instant) -> bool {
		let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
		if elapsed > 0.0 {
			self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
			self.last = now;
		}
		if self.tokens >= 1.0 {
			self.tokens -= 1.0;
			true
		} else {
			false
		}
	}
}

/// Per-client bucket for `send-message`. Zero burst or rate disables limiting.
#[derive(Debug)]
pub struct SendRateLimiter {
	burst: u32,
	per_minute: u32,
	buckets: HashMap<ClientId, TokenBucket>,
}

impl SendRateLimiter {
	pub fn new(burst: u32, per_minute: u32) -> Self {
		Self {
			burst,
			per_minute,
			buckets: HashMap::new(),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.burst > 0 && self.per_minute > 0
	}

	pub fn allow(&mut self, id: &ClientId, now: Instant) -> bool {
		if !self.is_enabled() {
			return true;
		}

		let (burst, per_minute) = (self.burst, self.per_minute);
		match self.buckets.get_mut(id) {
			Some(bucket) => bucket.allow(now),
			None => {
				let Some(mut bucket) = TokenBucket::new(burst, per_minute, now) else {
					return true;
				};
				let allowed = bucket.allow(now);
				self.buckets.insert(id.clone(), bucket);
				allowed
			}
		}
	}

	pub fn forget(&mut self, id: &ClientId) {
		self.buckets.remove(id);
	}

	pub fn clear(&mut self) {
		self.buckets.clear();
	}
}
