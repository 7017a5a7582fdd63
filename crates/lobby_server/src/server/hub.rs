#![forbid(unsafe_code)]

//! The coordinator's state: sessions, rooms, gate, and dispatcher composed as
//! one owned value. Every method runs to completion against it; callers
//! serialize access (see `coordinator`).
//!
//! Operations collect their notifications into an [`Outbox`] and hand it to
//! [`Hub::flush`] once, so each client gets one ordered batch per operation.

use std::time::Duration;

use lobby_domain::{ClientId, DisplayName, MessageId, RoomId, SecretString};
use lobby_protocol::responses::{RoomSummary, Status};
use lobby_protocol::{ChatMessage, Event, Member};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::server::audit::AuditService;
use crate::server::dispatcher::{Delivery, Dispatcher, Outbox, ParkTicket};
use crate::server::error::{CoordinatorError, CoordinatorResult};
use crate::server::gate::ModerationGate;
use crate::server::rate_limit::SendRateLimiter;
use crate::server::rooms::{Message, RoomDirectory};
use crate::server::sessions::{ClientSession, SessionRegistry};
use crate::util::time::EventClock;

#[derive(Debug, Clone)]
pub struct HubConfig {
	pub history_capacity: usize,
	pub client_timeout: Duration,
	pub moderator_timeout: Duration,
	pub pending_timeout: Duration,
	pub poll_timeout: Duration,
	pub max_message_bytes: usize,
	pub max_display_name_bytes: usize,
	pub message_burst: u32,
	pub messages_per_minute: u32,
	pub moderator_password: Option<SecretString>,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			history_capacity: 100,
			client_timeout: Duration::from_secs(60),
			moderator_timeout: Duration::from_secs(180),
			pending_timeout: Duration::from_secs(300),
			poll_timeout: Duration::from_secs(25),
			max_message_bytes: 16 * 1024,
			max_display_name_bytes: 512,
			message_burst: 10,
			messages_per_minute: 120,
			moderator_password: None,
		}
	}
}

/// History handed to a newly admitted client.
pub const JOIN_HISTORY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
	Admitted(ClientId),
	/// Gate is locked; the id is the tentative pending id to poll with.
	Pending(ClientId),
}

#[derive(Debug)]
pub enum PollStart {
	Ready(Delivery),
	Parked(ParkTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
	Joining,
	Active,
	Gone,
}

pub struct Hub {
	pub(crate) config: HubConfig,
	pub(crate) clock: EventClock,
	pub(crate) sessions: SessionRegistry,
	pub(crate) rooms: RoomDirectory,
	pub(crate) gate: ModerationGate,
	pub(crate) dispatcher: Dispatcher,
	pub(crate) limiter: SendRateLimiter,
	pub(crate) audit: AuditService,
}

impl Hub {
	pub fn new(config: HubConfig) -> Self {
		Self::with_audit(config, AuditService::new())
	}

	pub fn with_audit(config: HubConfig, audit: AuditService) -> Self {
		Self {
			clock: EventClock::default(),
			sessions: SessionRegistry::default(),
			rooms: RoomDirectory::new(config.history_capacity),
			gate: ModerationGate::new(config.moderator_password.as_ref()),
			dispatcher: Dispatcher::default(),
			limiter: SendRateLimiter::new(config.message_burst, config.messages_per_minute),
			audit,
			config,
		}
	}

	pub fn config(&self) -> &HubConfig {
		&self.config
	}

	pub fn status(&self) -> Status {
		Status {
			active: self.gate.is_active(),
			lock_state: self.gate.is_locked(),
		}
	}

	pub fn server_time(&mut self) -> u64 {
		self.clock.now()
	}

	pub fn sessions(&self) -> &SessionRegistry {
		&self.sessions
	}

	pub fn rooms(&self) -> &RoomDirectory {
		&self.rooms
	}

	pub fn gate(&self) -> &ModerationGate {
		&self.gate
	}

	pub fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}

	/// Where `id` is in the client lifecycle. An inspection helper for
	/// embedders and tests; no endpoint exposes it.
	pub fn presence(&self, id: &ClientId) -> Presence {
		if self.gate.is_pending(id) {
			Presence::Joining
		} else if self.sessions.contains(id) {
			Presence::Active
		} else {
			Presence::Gone
		}
	}

	pub fn join(&mut self, display_name: DisplayName, now: Instant) -> CoordinatorResult<JoinOutcome> {
		self.check_display_name(&display_name)?;
		self.require_active()?;

		let mut outbox = Outbox::new();
		let outcome = if self.gate.is_locked() {
			let req = self.gate.enqueue(display_name.clone(), now);
			let event = Event::JoinRequest {
				pending_id: req.id.clone(),
				username: display_name,
			};
			outbox.push_all(&self.sessions.visible_moderators(), &event);
			info!(pending_id = %req.id, "join request queued");
			JoinOutcome::Pending(req.id)
		} else {
			let id = ClientId::generate();
			self.sessions.register(id.clone(), display_name.clone(), false, now);
			self.rooms.join(&RoomId::global(), &id, &display_name, &mut outbox)?;
			info!(client_id = %id, "client joined");
			JoinOutcome::Admitted(id)
		};

		self.flush(outbox);
		Ok(outcome)
	}

	/// Record liveness. Returns the current server time.
	pub fn heartbeat(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<u64> {
		self.require_session(id, now)?;
		Ok(self.clock.now())
	}

	pub fn send_message(
		&mut self,
		id: &ClientId,
		room_id: &RoomId,
		payload: String,
		now: Instant,
	) -> CoordinatorResult<MessageId> {
		self.check_payload(&payload)?;

		let session = self.require_session(id, now)?;
		self.require_member(id, room_id)?;
		if !self.limiter.allow(id, now) {
			metrics::counter!("lobby_server_messages_rate_limited_total").increment(1);
			return Err(CoordinatorError::RateLimited);
		}

		let mut outbox = Outbox::new();
		let timestamp = self.clock.stamp();
		let message_id = self
			.rooms
			.append_message(room_id, id, &session.display_name, payload, timestamp, &mut outbox)?;
		metrics::counter!("lobby_server_messages_total").increment(1);
		debug!(client_id = %id, room = %room_id, message_id = %message_id, fanout = outbox.len(), "message appended");

		self.flush(outbox);
		Ok(message_id)
	}

	pub fn typing(&mut self, id: &ClientId, room_id: &RoomId, is_typing: bool, now: Instant) -> CoordinatorResult<()> {
		let session = self.require_session(id, now)?;
		self.require_member(id, room_id)?;

		let event = Event::UserTyping {
			client_id: id.clone(),
			username: session.display_name,
			room_id: room_id.clone(),
			is_typing,
		};

		let mut outbox = Outbox::new();
		if let Some(room) = self.rooms.get(room_id) {
			outbox.push_all(room.members().filter(|m| *m != id), &event);
		}
		self.flush(outbox);
		Ok(())
	}

	/// Start a long-poll.
	///
	/// Order: stored resolution, pending requester, gate, session, history catch-up, park.
	pub fn begin_poll(&mut self, id: &ClientId, last_event_time: Option<u64>, now: Instant) -> CoordinatorResult<PollStart> {
		let server_time = self.clock.now();

		if let Some(event) = self.gate.take_resolution(id) {
			self.dispatcher.evict(id, server_time);
			return Ok(PollStart::Ready(Delivery {
				events: vec![event],
				server_time,
			}));
		}

		if self.gate.is_pending(id) {
			return Ok(PollStart::Parked(self.dispatcher.park(id, now, server_time)));
		}

		self.require_session(id, now)?;

		if let Some(after) = last_event_time.filter(|t| *t > 0) {
			let missed = self.rooms.messages_since(id, after);
			if !missed.is_empty() {
				self.dispatcher.evict(id, server_time);
				debug!(client_id = %id, count = missed.len(), "replaying missed messages");
				return Ok(PollStart::Ready(Delivery {
					events: missed.into_iter().map(Event::ReceiveMessage).collect(),
					server_time,
				}));
			}
		}

		Ok(PollStart::Parked(self.dispatcher.park(id, now, server_time)))
	}

	/// Release a timed-out poll's slot. Returns the current server time.
	pub fn end_poll(&mut self, id: &ClientId, token: u64) -> u64 {
		self.dispatcher.release(id, token);
		self.clock.now()
	}

	/// End a session voluntarily. A pending requester withdraws its request instead.
	pub fn leave(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<()> {
		if self.gate.take_pending(id).is_some() {
			info!(pending_id = %id, "join request withdrawn");
			let mut outbox = Outbox::new();
			let event = Event::JoinRequestResolved {
				pending_id: id.clone(),
				approved: false,
			};
			outbox.push_all(&self.sessions.visible_moderators(), &event);
			self.flush(outbox);
			return Ok(());
		}

		self.require_session(id, now)?;

		let mut outbox = Outbox::new();
		self.end_session(id, &mut outbox);
		info!(client_id = %id, "client left");
		self.flush(outbox);
		Ok(())
	}

	pub fn create_dm_room(&mut self, id: &ClientId, target: &ClientId, now: Instant) -> CoordinatorResult<RoomId> {
		let session = self.require_session(id, now)?;
		if id == target {
			return Err(CoordinatorError::validation("cannot open a direct room with yourself"));
		}
		let Some(peer) = self.sessions.get(target).cloned() else {
			return Err(CoordinatorError::not_found("client", target));
		};

		let room_id = RoomId::direct(id, target);
		let name = format!("{} & {}", session.display_name, peer.display_name);
		let created = self
			.rooms
			.create_room(room_id.clone(), name.clone(), true, vec![id.clone(), target.clone()]);

		let mut outbox = Outbox::new();
		self.rooms.join(&room_id, id, &session.display_name, &mut outbox)?;
		let peer_added = self.rooms.join(&room_id, target, &peer.display_name, &mut outbox)?;
		if created || peer_added {
			outbox.push(
				target,
				Event::RoomCreated {
					room_id: room_id.clone(),
					name,
					is_direct: true,
				},
			);
		}

		self.flush(outbox);
		Ok(room_id)
	}

	/// Join a room. Returns the recent history and the visible members.
	pub fn join_room(
		&mut self,
		id: &ClientId,
		room_id: &RoomId,
		now: Instant,
	) -> CoordinatorResult<(Vec<ChatMessage>, Vec<Member>)> {
		let session = self.require_session(id, now)?;
		let Some(room) = self.rooms.get(room_id) else {
			return Err(CoordinatorError::not_found("room", room_id));
		};
		if !room.admits(id) {
			return Err(CoordinatorError::unauthorized("not a participant of this room"));
		}

		let mut outbox = Outbox::new();
		self.rooms.join(room_id, id, &session.display_name, &mut outbox)?;
		let snapshot = self.room_snapshot(room_id, self.config.history_capacity);

		self.flush(outbox);
		Ok(snapshot)
	}

	/// Last `n` messages and the visible members of a room. Empty for unknown rooms.
	pub fn room_snapshot(&self, room_id: &RoomId, n: usize) -> (Vec<ChatMessage>, Vec<Member>) {
		let recent = match self.rooms.get(room_id) {
			Some(room) => room.recent(n).map(Message::to_chat).collect(),
			None => Vec::new(),
		};
		(recent, self.visible_members(room_id))
	}

	/// Rooms `id` belongs to, global first, then by id.
	pub fn user_rooms(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<Vec<RoomSummary>> {
		self.require_session(id, now)?;
		let mut rooms: Vec<RoomSummary> = self
			.rooms
			.rooms_of(id)
			.iter()
			.filter_map(|room_id| self.rooms.get(room_id))
			.map(|room| RoomSummary {
				room_id: room.id.clone(),
				name: room.name.clone(),
				is_direct: room.is_direct,
			})
			.collect();
		rooms.sort_by(|a, b| {
			b.room_id
				.is_global()
				.cmp(&a.room_id.is_global())
				.then_with(|| a.room_id.cmp(&b.room_id))
		});
		Ok(rooms)
	}

	pub fn leave_room(&mut self, id: &ClientId, room_id: &RoomId, now: Instant) -> CoordinatorResult<()> {
		let session = self.require_session(id, now)?;
		if room_id.is_global() {
			return Err(CoordinatorError::validation("cannot leave the global room"));
		}
		self.require_member(id, room_id)?;

		let mut outbox = Outbox::new();
		self.rooms.leave(room_id, id, &session.display_name, &mut outbox);
		self.cleanup_direct_rooms(&mut outbox);
		self.flush(outbox);
		Ok(())
	}

	pub fn active_users(&self, room_id: &RoomId) -> CoordinatorResult<Vec<Member>> {
		self.require_active()?;
		if !self.rooms.contains(room_id) {
			return Err(CoordinatorError::not_found("room", room_id));
		}
		Ok(self.visible_members(room_id))
	}

	fn visible_members(&self, room_id: &RoomId) -> Vec<Member> {
		let Some(room) = self.rooms.get(room_id) else {
			return Vec::new();
		};
		room.members()
			.filter_map(|m| self.sessions.get(m))
			.filter(|s| !s.is_hidden)
			.map(ClientSession::member)
			.collect()
	}

	/// Deliver an outbox, then release parked responses whose owner is gone.
	pub(crate) fn flush(&mut self, outbox: Outbox) {
		let server_time = self.clock.now();
		if !outbox.is_empty() {
			self.dispatcher.deliver(outbox, server_time);
		}

		let (sessions, gate) = (&self.sessions, &self.gate);
		self.dispatcher
			.retain_owners(|id| sessions.contains(id) || gate.is_pending(id), server_time);
	}

	/// Remove a session and everything hanging off it.
	pub(crate) fn end_session(&mut self, id: &ClientId, outbox: &mut Outbox) {
		let Some(session) = self.sessions.remove(id) else {
			return;
		};
		self.limiter.forget(id);
		self.rooms.leave_all(id, &session.display_name, outbox);

		if self.gate.is_acting_moderator(id) {
			info!(client_id = %id, "acting moderator gone; deactivating");
			self.deactivate_into(outbox);
		} else {
			self.cleanup_direct_rooms(outbox);
		}
	}

	/// Close direct rooms with fewer than two live members. Returns the number closed.
	pub(crate) fn cleanup_direct_rooms(&mut self, outbox: &mut Outbox) -> usize {
		let doomed: Vec<RoomId> = self
			.rooms
			.direct_rooms()
			.into_iter()
			.filter(|room_id| {
				self.rooms
					.get(room_id)
					.map(|r| r.members().filter(|m| self.sessions.contains(m)).count() < 2)
					.unwrap_or(false)
			})
			.collect();

		for room_id in &doomed {
			self.close_room(room_id, outbox);
		}
		doomed.len()
	}

	/// Members get `room_closed`, then every session gets `room_deleted`.
	pub(crate) fn close_room(&mut self, room_id: &RoomId, outbox: &mut Outbox) {
		let Some(room) = self.rooms.remove_room(room_id) else {
			return;
		};

		let closed = Event::RoomClosed { room_id: room_id.clone() };
		outbox.push_all(room.members().filter(|m| self.sessions.contains(m)), &closed);

		let deleted = Event::RoomDeleted { room_id: room_id.clone() };
		outbox.push_all(&self.sessions.ids(), &deleted);
		debug!(room = %room_id, "room closed");
	}

	pub(crate) fn require_active(&self) -> CoordinatorResult<()> {
		if self.gate.is_active() {
			Ok(())
		} else {
			Err(CoordinatorError::Inactive)
		}
	}

	/// Active gate and a known session. Touches liveness.
	pub(crate) fn require_session(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<ClientSession> {
		self.require_active()?;
		if !self.sessions.heartbeat(id, now) {
			return Err(CoordinatorError::not_found("client", id));
		}
		self.sessions
			.get(id)
			.cloned()
			.ok_or_else(|| CoordinatorError::not_found("client", id))
	}

	pub(crate) fn require_moderator(&mut self, id: &ClientId, now: Instant) -> CoordinatorResult<ClientSession> {
		let session = self.require_session(id, now)?;
		if !session.is_moderator {
			return Err(CoordinatorError::unauthorized("moderator privileges required"));
		}
		Ok(session)
	}

	/// Room must exist (404) and `id` must be a member (403).
	fn require_member(&self, id: &ClientId, room_id: &RoomId) -> CoordinatorResult<()> {
		let Some(room) = self.rooms.get(room_id) else {
			return Err(CoordinatorError::not_found("room", room_id));
		};
		if !room.is_member(id) {
			return Err(CoordinatorError::unauthorized("not a member of this room"));
		}
		Ok(())
	}

	pub(crate) fn check_payload(&self, payload: &str) -> CoordinatorResult<()> {
		if payload.is_empty() {
			return Err(CoordinatorError::validation("message must not be empty"));
		}
		if payload.len() > self.config.max_message_bytes {
			return Err(CoordinatorError::validation(format!(
				"message too large: len={} max={}",
				payload.len(),
				self.config.max_message_bytes
			)));
		}
		Ok(())
	}

	pub(crate) fn check_display_name(&self, name: &DisplayName) -> CoordinatorResult<()> {
		if name.len() > self.config.max_display_name_bytes {
			return Err(CoordinatorError::validation(format!(
				"display name too large: len={} max={}",
				name.len(),
				self.config.max_display_name_bytes
			)));
		}
		Ok(())
	}
}
