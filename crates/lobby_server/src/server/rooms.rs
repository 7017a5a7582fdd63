#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};

use lobby_domain::{ClientId, DisplayName, MessageId, RoomId};
use lobby_protocol::{ChatMessage, Event};
use tracing::debug;

use crate::server::dispatcher::Outbox;
use crate::server::error::{CoordinatorError, CoordinatorResult};

/// A buffered message. Immutable once appended, except for moderator deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub id: MessageId,
	pub author: ClientId,
	pub author_name: DisplayName,
	pub room: RoomId,
	pub payload: String,
	pub timestamp: u64,
	/// Moderator broadcast; `author` is the issuing moderator.
	pub is_server: bool,
}

impl Message {
	pub fn to_chat(&self) -> ChatMessage {
		ChatMessage {
			message_id: self.id,
			client_id: self.author.clone(),
			username: self.author_name.clone(),
			message: self.payload.clone(),
			room_id: self.room.clone(),
			timestamp: self.timestamp,
			is_server_message: self.is_server,
		}
	}
}

/// A named scope with members and a bounded history.
#[derive(Debug)]
pub struct Room {
	pub id: RoomId,
	pub name: String,
	pub is_direct: bool,
	/// For direct rooms: the two clients allowed in.
	participants: Vec<ClientId>,
	members: BTreeSet<ClientId>,
	history: VecDeque<Message>,
	capacity: usize,
}

impl Room {
	fn new(id: RoomId, name: String, is_direct: bool, participants: Vec<ClientId>, capacity: usize) -> Self {
		Self {
			id,
			name,
			is_direct,
			participants,
			members: BTreeSet::new(),
			history: VecDeque::with_capacity(capacity.min(1024)),
			capacity,
		}
	}

	pub fn is_member(&self, id: &ClientId) -> bool {
		self.members.contains(id)
	}

	pub fn members(&self) -> impl Iterator<Item = &ClientId> {
		self.members.iter()
	}

	pub fn member_count(&self) -> usize {
		self.members.len()
	}

	/// Whether `id` may join (always true for shared rooms).
	pub fn admits(&self, id: &ClientId) -> bool {
		!self.is_direct || self.participants.contains(id)
	}

	pub fn history_len(&self) -> usize {
		self.history.len()
	}

	/// Last `n` messages, oldest first.
	pub fn recent(&self, n: usize) -> impl Iterator<Item = &Message> {
		let skip = self.history.len().saturating_sub(n);
		self.history.iter().skip(skip)
	}

	fn push(&mut self, msg: Message) {
		self.history.push_back(msg);
		while self.history.len() > self.capacity {
			self.history.pop_front();
		}
	}

	fn others<'a>(&'a self, id: &'a ClientId) -> impl Iterator<Item = &'a ClientId> + 'a {
		self.members.iter().filter(move |m| *m != id)
	}
}

/// All rooms: the permanent global room plus lazily created direct rooms.
#[derive(Debug)]
pub struct RoomDirectory {
	rooms: HashMap<RoomId, Room>,
	history_capacity: usize,
	next_message_id: u64,
}

impl RoomDirectory {
	pub fn new(history_capacity: usize) -> Self {
		let mut dir = Self {
			rooms: HashMap::new(),
			history_capacity,
			next_message_id: 0,
		};
		dir.create_room(RoomId::global(), "Global".to_string(), false, Vec::new());
		dir
	}

	/// Create a room if absent. Returns whether it was created.
	pub fn create_room(&mut self, id: RoomId, name: String, is_direct: bool, participants: Vec<ClientId>) -> bool {
		if self.rooms.contains_key(&id) {
			return false;
		}

		debug!(room = %id, is_direct, "room created");
		let room = Room::new(id.clone(), name, is_direct, participants, self.history_capacity);
		self.rooms.insert(id, room);
		metrics::gauge!("lobby_server_rooms").set(self.rooms.len() as f64);
		true
	}

	pub fn get(&self, id: &RoomId) -> Option<&Room> {
		self.rooms.get(id)
	}

	pub fn contains(&self, id: &RoomId) -> bool {
		self.rooms.contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.rooms.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rooms.is_empty()
	}

	fn room_mut(&mut self, id: &RoomId) -> CoordinatorResult<&mut Room> {
		self.rooms.get_mut(id).ok_or_else(|| CoordinatorError::not_found("room", id))
	}

	/// Add `client` to the room and announce it to the other members.
	/// Returns whether the client was newly added.
	pub fn join(
		&mut self,
		room_id: &RoomId,
		client: &ClientId,
		username: &DisplayName,
		outbox: &mut Outbox,
	) -> CoordinatorResult<bool> {
		let room = self.room_mut(room_id)?;
		if !room.members.insert(client.clone()) {
			return Ok(false);
		}

		let event = Event::UserJoined {
			client_id: client.clone(),
			username: username.clone(),
			room_id: room_id.clone(),
		};
		outbox.push_all(room.others(client), &event);
		Ok(true)
	}

	/// Remove `client` from the room and announce it. Returns whether it was a member.
	pub fn leave(&mut self, room_id: &RoomId, client: &ClientId, username: &DisplayName, outbox: &mut Outbox) -> bool {
		let Some(room) = self.rooms.get_mut(room_id) else {
			return false;
		};
		if !room.members.remove(client) {
			return false;
		}

		let event = Event::UserLeft {
			client_id: client.clone(),
			username: username.clone(),
			room_id: room_id.clone(),
		};
		outbox.push_all(room.members.iter(), &event);
		true
	}

	/// Remove `client` from every room it is in.
	pub fn leave_all(&mut self, client: &ClientId, username: &DisplayName, outbox: &mut Outbox) -> Vec<RoomId> {
		let joined = self.rooms_of(client);
		for room_id in &joined {
			self.leave(room_id, client, username, outbox);
		}
		joined
	}

	/// Append a message, trim to capacity, and fan out to members other than the author.
	pub fn append_message(
		&mut self,
		room_id: &RoomId,
		author: &ClientId,
		author_name: &DisplayName,
		payload: String,
		timestamp: u64,
		outbox: &mut Outbox,
	) -> CoordinatorResult<MessageId> {
		self.next_message_id += 1;
		let id = MessageId(self.next_message_id);

		let room = self.room_mut(room_id)?;
		let msg = Message {
			id,
			author: author.clone(),
			author_name: author_name.clone(),
			room: room_id.clone(),
			payload,
			timestamp,
			is_server: false,
		};

		let event = Event::ReceiveMessage(msg.to_chat());
		room.push(msg);
		outbox.push_all(room.others(author), &event);

		Ok(id)
	}

	/// Append a server broadcast under `server_name` and fan out to every member, the issuer included.
	pub fn append_server_message(
		&mut self,
		room_id: &RoomId,
		issuer: &ClientId,
		server_name: &DisplayName,
		payload: String,
		timestamp: u64,
		outbox: &mut Outbox,
	) -> CoordinatorResult<MessageId> {
		self.next_message_id += 1;
		let id = MessageId(self.next_message_id);

		let room = self.room_mut(room_id)?;
		let msg = Message {
			id,
			author: issuer.clone(),
			author_name: server_name.clone(),
			room: room_id.clone(),
			payload,
			timestamp,
			is_server: true,
		};

		let event = Event::ReceiveMessage(msg.to_chat());
		room.push(msg);
		outbox.push_all(room.members.iter(), &event);

		Ok(id)
	}

	/// Last `n` messages of a room, oldest first.
	pub fn recent(&self, room_id: &RoomId, n: usize) -> CoordinatorResult<Vec<Message>> {
		let room = self.rooms.get(room_id).ok_or_else(|| CoordinatorError::not_found("room", room_id))?;
		Ok(room.recent(n).cloned().collect())
	}

	/// Buffered messages newer than `after` in rooms `client` belongs to, authored by others.
	/// Server broadcasts count as authored by nobody.
	pub fn messages_since(&self, client: &ClientId, after: u64) -> Vec<ChatMessage> {
		let mut out: Vec<&Message> = self
			.rooms
			.values()
			.filter(|r| r.is_member(client))
			.flat_map(|r| r.history.iter())
			.filter(|m| m.timestamp > after && (m.is_server || &m.author != client))
			.collect();
		out.sort_by_key(|m| m.timestamp);
		out.into_iter().map(Message::to_chat).collect()
	}

	pub fn delete_message(&mut self, room_id: &RoomId, message_id: MessageId, outbox: &mut Outbox) -> CoordinatorResult<()> {
		let room = self.room_mut(room_id)?;
		let Some(pos) = room.history.iter().position(|m| m.id == message_id) else {
			return Err(CoordinatorError::not_found("message", message_id));
		};
		room.history.remove(pos);

		let event = Event::MessageDeleted {
			room_id: room_id.clone(),
			message_id,
		};
		outbox.push_all(room.members.iter(), &event);
		Ok(())
	}

	/// Clear a room's history. Returns the number of messages removed.
	pub fn clear_messages(&mut self, room_id: &RoomId, outbox: &mut Outbox) -> CoordinatorResult<usize> {
		let room = self.room_mut(room_id)?;
		let removed = room.history.len();
		room.history.clear();

		let event = Event::MessagesCleared { room_id: room_id.clone() };
		outbox.push_all(room.members.iter(), &event);
		Ok(removed)
	}

	/// Remove a non-global room. The global room is never removed.
	pub fn remove_room(&mut self, room_id: &RoomId) -> Option<Room> {
		if room_id.is_global() {
			return None;
		}
		let removed = self.rooms.remove(room_id);
		metrics::gauge!("lobby_server_rooms").set(self.rooms.len() as f64);
		removed
	}

	pub fn direct_rooms(&self) -> Vec<RoomId> {
		self.rooms.values().filter(|r| r.is_direct).map(|r| r.id.clone()).collect()
	}

	pub fn rooms_of(&self, client: &ClientId) -> Vec<RoomId> {
		self.rooms
			.values()
			.filter(|r| r.is_member(client))
			.map(|r| r.id.clone())
			.collect()
	}

	/// Delete every non-global room and empty the global room.
	pub fn reset(&mut self) {
		self.rooms.retain(|id, _| id.is_global());
		if let Some(global) = self.rooms.get_mut(&RoomId::global()) {
			global.members.clear();
			global.history.clear();
		}
		metrics::gauge!("lobby_server_rooms").set(self.rooms.len() as f64);
	}
}
