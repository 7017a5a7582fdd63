#![forbid(unsafe_code)]

//! Response bodies.

use lobby_domain::{ClientId, DisplayName, MessageId, RoomId};
use serde::{Deserialize, Serialize};

use crate::events::{ChatMessage, Event, Member};

/// Plain acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
	pub ack: bool,
}

impl Ack {
	pub const OK: Ack = Ack { ack: true };
}

/// `join`: either a session id or, while locked, a pending id.
///
/// An admitted client also gets the global room's recent history and members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<ClientId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pending_id: Option<ClientId>,
	pub server_time: u64,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub recent_messages: Vec<ChatMessage>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub members: Vec<Member>,
}

/// `send-message`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSent {
	pub ack: bool,
	pub message_id: MessageId,
}

/// `heartbeat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
	pub ack: bool,
	pub server_time: u64,
}

/// `kick-all`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickedAll {
	pub ack: bool,
	pub kicked: usize,
}

/// `get-updates`: events batch, empty on timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Updates {
	pub events: Vec<Event>,
	pub server_time: u64,
}

/// `activate-server`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activated {
	pub client_id: ClientId,
	pub is_moderator: bool,
}

/// `create-dm-room`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmRoom {
	pub room_id: RoomId,
}

/// `join-room`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
	pub room_id: RoomId,
	pub recent_messages: Vec<ChatMessage>,
	pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUser {
	pub pending_id: ClientId,
	pub username: DisplayName,
	/// Unix ms.
	pub requested_at: u64,
}

/// `pending-users`, oldest request first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUsers {
	pub pending_users: Vec<PendingUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
	pub room_id: RoomId,
	pub name: String,
	pub is_direct: bool,
}

/// `user-rooms`: every room the client is a member of, global first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRooms {
	pub rooms: Vec<RoomSummary>,
}

/// `active-users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUsers {
	pub members: Vec<Member>,
}

/// `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
	pub active: bool,
	pub lock_state: bool,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
	pub error: String,
}
