#![forbid(unsafe_code)]

//! Activation / lock / approval state machine.
//!
//! `Inactive -> Unlocked <-> Locked -> Inactive`. While inactive nothing but
//! activation and status is accepted. While locked, joins become pending
//! requests that a moderator approves or rejects exactly once.

use std::collections::HashMap;

use lobby_domain::{ClientId, DisplayName, SecretString};
use lobby_protocol::Event;
use tokio::time::Instant;

use crate::server::auth::PasswordDigest;
use crate::server::error::{CoordinatorError, CoordinatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
	Inactive,
	Unlocked,
	Locked,
}

impl GateState {
	pub fn is_active(self) -> bool {
		!matches!(self, GateState::Inactive)
	}

	pub fn is_locked(self) -> bool {
		matches!(self, GateState::Locked)
	}
}

#[derive(Debug, Clone)]
pub struct PendingJoinRequest {
	pub id: ClientId,
	pub display_name: DisplayName,
	pub requested_at: Instant,
}

#[derive(Debug)]
struct Resolution {
	event: Event,
	resolved_at: Instant,
}

#[derive(Debug)]
pub struct ModerationGate {
	state: GateState,
	acting_moderator: Option<ClientId>,
	password: Option<PasswordDigest>,
	pending: HashMap<ClientId, PendingJoinRequest>,
	resolutions: HashMap<ClientId, Resolution>,
}

impl ModerationGate {
	/// A gate without a configured password can never be activated.
	pub fn new(password: Option<&SecretString>) -> Self {
		Self {
			state: GateState::Inactive,
			acting_moderator: None,
			password: password.filter(|p| !p.expose().is_empty()).map(PasswordDigest::of),
			pending: HashMap::new(),
			resolutions: HashMap::new(),
		}
	}

	pub fn state(&self) -> GateState {
		self.state
	}

	pub fn is_active(&self) -> bool {
		self.state.is_active()
	}

	pub fn is_locked(&self) -> bool {
		self.state.is_locked()
	}

	pub fn acting_moderator(&self) -> Option<&ClientId> {
		self.acting_moderator.as_ref()
	}

	pub fn is_acting_moderator(&self, id: &ClientId) -> bool {
		self.acting_moderator.as_ref() == Some(id)
	}

	pub fn verify_password(&self, candidate: &str) -> bool {
		match &self.password {
			Some(digest) => digest.verify(candidate),
			None => false,
		}
	}

	/// Bind the acting moderator and open the gate. First activation wins.
	pub fn activate(&mut self, moderator: ClientId) -> CoordinatorResult<()> {
		if self.state.is_active() {
			return Err(CoordinatorError::unauthorized("server is already active"));
		}
		self.state = GateState::Unlocked;
		self.acting_moderator = Some(moderator);
		Ok(())
	}

	/// Reset to inactive. Returns the unresolved pending requests, oldest first.
	pub fn deactivate(&mut self) -> Vec<PendingJoinRequest> {
		self.state = GateState::Inactive;
		self.acting_moderator = None;
		self.resolutions.clear();
		self.drain_pending()
	}

	/// Returns whether the state changed.
	pub fn set_locked(&mut self, locked: bool) -> CoordinatorResult<bool> {
		let next = match (self.state, locked) {
			(GateState::Inactive, _) => return Err(CoordinatorError::Inactive),
			(_, true) => GateState::Locked,
			(_, false) => GateState::Unlocked,
		};
		let changed = next != self.state;
		self.state = next;
		Ok(changed)
	}

	pub fn enqueue(&mut self, display_name: DisplayName, now: Instant) -> PendingJoinRequest {
		let req = PendingJoinRequest {
			id: ClientId::generate(),
			display_name,
			requested_at: now,
		};
		self.pending.insert(req.id.clone(), req.clone());
		metrics::gauge!("lobby_server_pending_requests").set(self.pending.len() as f64);
		req
	}

	pub fn is_pending(&self, id: &ClientId) -> bool {
		self.pending.contains_key(id)
	}

	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	/// Outstanding requests, oldest first.
	pub fn pending(&self) -> Vec<&PendingJoinRequest> {
		let mut all: Vec<&PendingJoinRequest> = self.pending.values().collect();
		all.sort_by_key(|r| r.requested_at);
		all
	}

	/// Consume one pending request.
	pub fn take_pending(&mut self, id: &ClientId) -> Option<PendingJoinRequest> {
		let req = self.pending.remove(id);
		metrics::gauge!("lobby_server_pending_requests").set(self.pending.len() as f64);
		req
	}

	/// Consume every pending request, oldest first.
	pub fn drain_pending(&mut self) -> Vec<PendingJoinRequest> {
		let mut all: Vec<PendingJoinRequest> = self.pending.drain().map(|(_, r)| r).collect();
		all.sort_by_key(|r| r.requested_at);
		metrics::gauge!("lobby_server_pending_requests").set(0.0);
		all
	}

	/// Store the outcome for a requester that was not listening when it was resolved.
	pub fn resolve(&mut self, id: ClientId, event: Event, now: Instant) {
		self.resolutions.insert(id, Resolution { event, resolved_at: now });
	}

	pub fn has_resolution(&self, id: &ClientId) -> bool {
		self.resolutions.contains_key(id)
	}

	pub fn take_resolution(&mut self, id: &ClientId) -> Option<Event> {
		self.resolutions.remove(id).map(|r| r.event)
	}

	/// Drop pending requests and resolutions older than `cutoff`. Returns the expired requests.
	pub fn expire(&mut self, cutoff: Instant) -> Vec<PendingJoinRequest> {
		self.resolutions.retain(|_, r| r.resolved_at >= cutoff);

		let expired_ids: Vec<ClientId> = self
			.pending
			.values()
			.filter(|r| r.requested_at < cutoff)
			.map(|r| r.id.clone())
			.collect();

		let mut expired: Vec<PendingJoinRequest> = expired_ids.iter().filter_map(|id| self.pending.remove(id)).collect();
		expired.sort_by_key(|r| r.requested_at);
		metrics::gauge!("lobby_server_pending_requests").set(self.pending.len() as f64);
		expired
	}
}
