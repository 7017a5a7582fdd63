#![forbid(unsafe_code)]

use lobby_domain::{ClientId, DisplayName, MessageId, RoomId};
use serde::{Deserialize, Serialize};

/// A buffered or live chat message as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
	pub message_id: MessageId,
	pub client_id: ClientId,
	pub username: DisplayName,
	/// Opaque payload; the server never inspects it.
	pub message: String,
	pub room_id: RoomId,
	/// Server event time (unix ms).
	pub timestamp: u64,
	/// Posted by a moderator as the server rather than as themselves.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub is_server_message: bool,
}

/// Room member entry returned by `active-users` and `join-room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
	pub client_id: ClientId,
	pub username: DisplayName,
	pub is_moderator: bool,
}

/// Event delivered to a parked `get-updates` request.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event {
	UserJoined {
		client_id: ClientId,
		username: DisplayName,
		room_id: RoomId,
	},
	UserLeft {
		client_id: ClientId,
		username: DisplayName,
		room_id: RoomId,
	},
	ReceiveMessage(ChatMessage),
	MessageDeleted {
		room_id: RoomId,
		message_id: MessageId,
	},
	MessagesCleared {
		room_id: RoomId,
	},
	UserTyping {
		client_id: ClientId,
		username: DisplayName,
		room_id: RoomId,
		is_typing: bool,
	},
	/// The session was ended by a moderator or by deactivation.
	Kicked {
		reason: String,
	},
	ServerActivated,
	LockChanged {
		locked: bool,
	},
	/// Sent to moderators while the gate is locked.
	JoinRequest {
		pending_id: ClientId,
		username: DisplayName,
	},
	/// Sent to moderators other than the one who handled the request.
	JoinRequestResolved {
		pending_id: ClientId,
		approved: bool,
	},
	/// Sent to the requester (on its pending id) with its new session id.
	JoinApproved {
		client_id: ClientId,
		room_id: RoomId,
	},
	JoinRejected {
		reason: String,
	},
	RoomCreated {
		room_id: RoomId,
		name: String,
		is_direct: bool,
	},
	RoomClosed {
		room_id: RoomId,
	},
	RoomDeleted {
		room_id: RoomId,
	},
}

impl Event {
	/// Stable event name (the `event` field on the wire).
	pub const fn name(&self) -> &'static str {
		match self {
			Event::UserJoined { .. } => "user_joined",
			Event::UserLeft { .. } => "user_left",
			Event::ReceiveMessage(_) => "receive_message",
			Event::MessageDeleted { .. } => "message_deleted",
			Event::MessagesCleared { .. } => "messages_cleared",
			Event::UserTyping { .. } => "user_typing",
			Event::Kicked { .. } => "kicked",
			Event::ServerActivated => "server_activated",
			Event::LockChanged { .. } => "lock_changed",
			Event::JoinRequest { .. } => "join_request",
			Event::JoinRequestResolved { .. } => "join_request_resolved",
			Event::JoinApproved { .. } => "join_approved",
			Event::JoinRejected { .. } => "join_rejected",
			Event::RoomCreated { .. } => "room_created",
			Event::RoomClosed { .. } => "room_closed",
			Event::RoomDeleted { .. } => "room_deleted",
		}
	}

	/// Whether this event ends the receiving session.
	pub fn ends_session(&self) -> bool {
		matches!(self, Event::Kicked { .. } | Event::JoinRejected { .. })
	}
}
