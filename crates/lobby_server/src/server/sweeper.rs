#![forbid(unsafe_code)]

use std::time::Duration;

use lobby_protocol::Event;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::server::coordinator::Coordinator;
use crate::server::dispatcher::Outbox;
use crate::server::hub::Hub;
use crate::server::moderation::REASON_EXPIRED;

/// What one sweep tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
	pub deactivated: bool,
	pub evicted_sessions: usize,
	pub released_polls: usize,
	pub expired_requests: usize,
	pub closed_rooms: usize,
}

impl SweepReport {
	pub fn is_idle(&self) -> bool {
		*self == SweepReport::default()
	}
}

impl Hub {
	/// One sweep pass: moderator keepalive, stale sessions, pending expiry, direct-room cleanup.
	pub fn sweep(&mut self, now: Instant) -> SweepReport {
		let mut report = SweepReport::default();
		let mut outbox = Outbox::new();

		if let Some(acting) = self.gate.acting_moderator().cloned() {
			// An open poll counts as presence.
			let expired = match self.sessions.get(&acting) {
				Some(s) => s.idle_for(now) > self.config.moderator_timeout && !self.dispatcher.is_listening(&acting),
				None => true,
			};
			if expired {
				info!(moderator = %acting, "acting moderator timed out");
				self.deactivate_into(&mut outbox);
				self.flush(outbox);
				report.deactivated = true;
				return report;
			}
		}

		let server_time = self.clock.now();
		let stale: Vec<_> = self
			.sessions
			.stale(now, self.config.client_timeout, self.config.moderator_timeout)
			.into_iter()
			.filter(|id| !self.dispatcher.is_listening(id))
			.collect();
		for id in &stale {
			self.dispatcher.evict(id, server_time);
			self.end_session(id, &mut outbox);
			debug!(client_id = %id, "session timed out");
		}
		report.evicted_sessions = stale.len();
		report.released_polls = self.dispatcher.drop_abandoned();
		if let Some(cutoff) = self.config.poll_timeout.checked_mul(2).and_then(|d| now.checked_sub(d)) {
			report.released_polls += self.dispatcher.evict_parked_before(cutoff, server_time);
		}

		if let Some(cutoff) = now.checked_sub(self.config.pending_timeout) {
			let expired = self.gate.expire(cutoff);
			for req in &expired {
				if self.dispatcher.is_listening(&req.id) {
					outbox.push(
						&req.id,
						Event::JoinRejected {
							reason: REASON_EXPIRED.to_string(),
						},
					);
				}
			}
			report.expired_requests = expired.len();
		}

		report.closed_rooms = self.cleanup_direct_rooms(&mut outbox);
		self.flush(outbox);

		if report.evicted_sessions > 0 {
			metrics::counter!("lobby_server_sessions_evicted_total").increment(report.evicted_sessions as u64);
		}
		report
	}
}

/// Run `sweep` every `interval` until `shutdown` flips or its sender is dropped.
pub fn spawn_sweeper(coordinator: Coordinator, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// The first tick completes immediately.
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					let report = coordinator.sweep().await;
					if !report.is_idle() {
						debug!(?report, "sweep");
					}
				}
				res = shutdown.changed() => {
					if res.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}

		debug!("sweeper stopped");
	})
}
