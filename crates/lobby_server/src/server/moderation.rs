#![forbid(unsafe_code)]

use lobby_domain::{ClientId, DisplayName, MessageId, RoomId};
use lobby_protocol::Event;
use lobby_protocol::responses::PendingUser;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::server::dispatcher::Outbox;
use crate::server::error::{CoordinatorError, CoordinatorResult};
use crate::server::gate::PendingJoinRequest;
use crate::server::hub::Hub;

const DEFAULT_MODERATOR_NAME: &str = "Moderator";
const SERVER_NAME: &str = "SERVER";
const REASON_DEACTIVATED: &str = "server_deactivated";
const REASON_KICKED: &str = "kicked by moderator";
const REASON_REJECTED: &str = "rejected by moderator";
pub(crate) const REASON_EXPIRED: &str = "expired";

impl Hub {
	/// Open the gate and create the acting moderator's session.
	pub fn activate(&mut self, password: &str, display_name: Option<DisplayName>, now: Instant) -> CoordinatorResult<ClientId> {
		if let Some(name) = &display_name {
			self.check_display_name(name)?;
		}
		if self.gate.is_active() {
			return Err(CoordinatorError::unauthorized("server is already active"));
		}
		if !self.gate.verify_password(password) {
			warn!("activation rejected: bad password");
			return Err(CoordinatorError::unauthorized("invalid password"));
		}

		let name = match display_name {
			Some(n) => n,
			None => DisplayName::new(DEFAULT_MODERATOR_NAME)?,
		};
		let id = ClientId::generate();
		self.gate.activate(id.clone())?;
		self.sessions.register(id.clone(), name.clone(), true, now);

		let mut outbox = Outbox::new();
		self.rooms.join(&RoomId::global(), &id, &name, &mut outbox)?;
		let others: Vec<ClientId> = self.sessions.ids().into_iter().filter(|s| *s != id).collect();
		outbox.push_all(&others, &Event::ServerActivated);

		info!(moderator = %id, "server activated");
		self.audit.record_command(&id, "activate", None);
		self.flush(outbox);
		Ok(id)
	}

	/// Explicit moderator shutdown of the gate.
	pub fn deactivate(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;
		self.audit.record_command(id, "deactivate", None);

		let mut outbox = Outbox::new();
		self.deactivate_into(&mut outbox);
		self.flush(outbox);
		Ok(())
	}

	/// Kick every session, reject every pending requester, and reset all state.
	pub(crate) fn deactivate_into(&mut self, outbox: &mut Outbox) {
		let pending = self.gate.deactivate();
		for req in &pending {
			outbox.push(
				&req.id,
				Event::JoinRejected {
					reason: REASON_DEACTIVATED.to_string(),
				},
			);
		}

		let kicked = Event::Kicked {
			reason: REASON_DEACTIVATED.to_string(),
		};
		let sessions = self.sessions.clear();
		for s in &sessions {
			outbox.push(&s.id, kicked.clone());
		}

		self.rooms.reset();
		self.limiter.clear();
		metrics::counter!("lobby_server_deactivations_total").increment(1);
		info!(sessions = sessions.len(), pending = pending.len(), "server deactivated");
	}

	/// Grant moderator privileges to an existing session. The acting moderator is unchanged.
	pub fn become_mod(&mut self, id: &ClientId, password: &str, now: Instant) -> CoordinatorResult<()> {
		self.require_session(id, now)?;
		if !self.gate.verify_password(password) {
			warn!(client_id = %id, "promotion rejected: bad password");
			return Err(CoordinatorError::unauthorized("invalid password"));
		}
		if let Some(s) = self.sessions.get_mut(id) {
			s.is_moderator = true;
		}
		self.audit.record_command(id, "become_mod", None);
		Ok(())
	}

	/// Lock or unlock the gate. Unlocking approves every pending request.
	pub fn set_lock(&mut self, id: &ClientId, locked: bool, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;
		if !self.gate.set_locked(locked)? {
			return Ok(());
		}

		self.audit.record_command(id, if locked { "lock" } else { "unlock" }, None);

		let mut outbox = Outbox::new();
		let audience = self.sessions.ids();
		outbox.push_all(&audience, &Event::LockChanged { locked });

		if !locked {
			for req in self.gate.drain_pending() {
				self.approve_into(req, now, &mut outbox)?;
			}
		}

		self.flush(outbox);
		Ok(())
	}

	pub fn set_hidden(&mut self, id: &ClientId, hidden: bool, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;
		if let Some(s) = self.sessions.get_mut(id) {
			s.is_hidden = hidden;
		}
		self.audit.record_command(id, if hidden { "hide" } else { "unhide" }, None);
		Ok(())
	}

	pub fn handle_user_request(
		&mut self,
		id: &ClientId,
		pending_id: &ClientId,
		approve: bool,
		now: Instant,
	) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;
		let Some(req) = self.gate.take_pending(pending_id) else {
			return Err(CoordinatorError::not_found("pending request", pending_id));
		};

		let mut outbox = Outbox::new();
		if approve {
			self.approve_into(req, now, &mut outbox)?;
		} else {
			self.reject_into(req, REASON_REJECTED, now, &mut outbox);
		}

		let others: Vec<ClientId> = self
			.sessions
			.visible_moderators()
			.into_iter()
			.filter(|m| m != id)
			.collect();
		let resolved = Event::JoinRequestResolved {
			pending_id: pending_id.clone(),
			approved: approve,
		};
		outbox.push_all(&others, &resolved);

		self.audit
			.record_command(id, if approve { "approve" } else { "reject" }, Some(pending_id.as_str()));
		self.flush(outbox);
		Ok(())
	}

	/// Create the session for an approved request and tell the requester on its pending id.
	pub(crate) fn approve_into(&mut self, req: PendingJoinRequest, now: Instant, outbox: &mut Outbox) -> CoordinatorResult<()> {
		let client_id = ClientId::generate();
		self.sessions.register(client_id.clone(), req.display_name.clone(), false, now);
		self.rooms.join(&RoomId::global(), &client_id, &req.display_name, outbox)?;
		info!(pending_id = %req.id, client_id = %client_id, "join request approved");

		let event = Event::JoinApproved {
			client_id,
			room_id: RoomId::global(),
		};
		self.notify_requester(req.id, event, now, outbox);
		Ok(())
	}

	pub(crate) fn reject_into(&mut self, req: PendingJoinRequest, reason: &str, now: Instant, outbox: &mut Outbox) {
		info!(pending_id = %req.id, reason, "join request rejected");
		let event = Event::JoinRejected {
			reason: reason.to_string(),
		};
		self.notify_requester(req.id, event, now, outbox);
	}

	/// Deliver now if the requester is polling, otherwise keep it for the next poll.
	fn notify_requester(&mut self, pending_id: ClientId, event: Event, now: Instant, outbox: &mut Outbox) {
		if self.dispatcher.is_listening(&pending_id) {
			outbox.push(&pending_id, event);
		} else {
			self.gate.resolve(pending_id, event, now);
		}
	}

	pub fn kick_user(&mut self, id: &ClientId, target: &ClientId, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;
		if id == target {
			return Err(CoordinatorError::validation("cannot kick yourself"));
		}
		if !self.sessions.contains(target) {
			return Err(CoordinatorError::not_found("client", target));
		}
		if self.gate.is_acting_moderator(target) {
			return Err(CoordinatorError::unauthorized("cannot kick the acting moderator"));
		}

		let mut outbox = Outbox::new();
		outbox.push(
			target,
			Event::Kicked {
				reason: REASON_KICKED.to_string(),
			},
		);
		self.end_session(target, &mut outbox);

		info!(moderator = %id, client_id = %target, "client kicked");
		self.audit.record_command(id, "kick", Some(target.as_str()));
		self.flush(outbox);
		Ok(())
	}

	/// Kick every non-moderator session. Returns how many were kicked.
	pub fn kick_all(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<usize> {
		self.require_moderator(id, now)?;

		let targets: Vec<ClientId> = self
			.sessions
			.iter()
			.filter(|s| !s.is_moderator)
			.map(|s| s.id.clone())
			.collect();

		let mut outbox = Outbox::new();
		let kicked = Event::Kicked {
			reason: REASON_KICKED.to_string(),
		};
		for target in &targets {
			outbox.push(target, kicked.clone());
			self.end_session(target, &mut outbox);
		}

		info!(moderator = %id, kicked = targets.len(), "kicked all clients");
		self.audit.record_command(id, "kick_all", None);
		self.flush(outbox);
		Ok(targets.len())
	}

	/// Join requests awaiting a decision, oldest first. `requestedAt` is unix ms.
	pub fn pending_users(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<Vec<PendingUser>> {
		self.require_moderator(id, now)?;
		let server_time = self.clock.now();
		Ok(self
			.gate
			.pending()
			.into_iter()
			.map(|req| {
				let age = now.saturating_duration_since(req.requested_at).as_millis();
				PendingUser {
					pending_id: req.id.clone(),
					username: req.display_name.clone(),
					requested_at: server_time.saturating_sub(u64::try_from(age).unwrap_or(u64::MAX)),
				}
			})
			.collect())
	}

	/// Post to a room as the server. Not rate limited.
	pub fn server_message(&mut self, id: &ClientId, room_id: &RoomId, payload: String, now: Instant) -> CoordinatorResult<MessageId> {
		self.check_payload(&payload)?;
		self.require_moderator(id, now)?;
		if !self.rooms.contains(room_id) {
			return Err(CoordinatorError::not_found("room", room_id));
		}

		let server_name = DisplayName::new(SERVER_NAME)?;
		let timestamp = self.clock.stamp();
		let mut outbox = Outbox::new();
		let message_id = self
			.rooms
			.append_server_message(room_id, id, &server_name, payload, timestamp, &mut outbox)?;

		info!(moderator = %id, room = %room_id, message = %message_id, "server message posted");
		self.audit.record_command(id, "server_message", Some(room_id.as_str()));
		self.flush(outbox);
		Ok(message_id)
	}

	pub fn delete_message(&mut self, id: &ClientId, room_id: &RoomId, message_id: MessageId, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;

		let mut outbox = Outbox::new();
		self.rooms.delete_message(room_id, message_id, &mut outbox)?;

		let target = message_id.to_string();
		self.audit.record_command(id, "delete_message", Some(target.as_str()));
		self.flush(outbox);
		Ok(())
	}

	pub fn clear_messages(&mut self, id: &ClientId, room_id: &RoomId, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;

		let mut outbox = Outbox::new();
		let removed = self.rooms.clear_messages(room_id, &mut outbox)?;

		info!(moderator = %id, room = %room_id, removed, "room history cleared");
		self.audit.record_command(id, "clear_messages", Some(room_id.as_str()));
		self.flush(outbox);
		Ok(())
	}

	pub fn delete_room(&mut self, id: &ClientId, room_id: &RoomId, now: Instant) -> CoordinatorResult<()> {
		self.require_moderator(id, now)?;
		if room_id.is_global() {
			return Err(CoordinatorError::unauthorized("the global room cannot be deleted"));
		}
		if !self.rooms.contains(room_id) {
			return Err(CoordinatorError::not_found("room", room_id));
		}

		let mut outbox = Outbox::new();
		self.close_room(room_id, &mut outbox);

		self.audit.record_command(id, "delete_room", Some(room_id.as_str()));
		self.flush(outbox);
		Ok(())
	}
}
