#![forbid(unsafe_code)]

//! Request bodies, one per endpoint (`POST /api/<name>`).

use lobby_domain::{ClientId, DisplayName, MessageId, RoomId};
use serde::{Deserialize, Serialize};

/// `join`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
	#[serde(alias = "username")]
	pub display_name: DisplayName,
}

/// `activate-server`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activate {
	pub password: String,
	#[serde(default, alias = "username")]
	pub display_name: Option<DisplayName>,
}

/// `send-message`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
	pub client_id: ClientId,
	pub room_id: RoomId,
	#[serde(alias = "payload")]
	pub message: String,
}

/// `get-updates`
/// Moderator broadcast posted as the server; the room defaults to global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
	pub client_id: ClientId,
	#[serde(default = "RoomId::global")]
	pub room_id: RoomId,
	#[serde(alias = "payload")]
	pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUpdates {
	pub client_id: ClientId,
	/// `serverTime` of the previous response; `None` or 0 skips history catch-up.
	#[serde(default)]
	pub last_event_time: Option<u64>,
}

/// `leave`, `heartbeat`, `kick-all`, `deactivate-server`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOnly {
	pub client_id: ClientId,
}

/// `typing`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
	pub client_id: ClientId,
	pub room_id: RoomId,
	pub is_typing: bool,
}

/// `become-mod`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BecomeMod {
	pub client_id: ClientId,
	pub password: String,
}

/// `toggle-lock`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLock {
	pub client_id: ClientId,
	pub lock_state: bool,
}

/// `toggle-hidden`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleHidden {
	pub client_id: ClientId,
	pub hidden: bool,
}

/// `handle-user-request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleUserRequest {
	pub client_id: ClientId,
	pub pending_id: ClientId,
	pub approve: bool,
}

/// `kick-user`, `create-dm-room`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetClient {
	pub client_id: ClientId,
	pub target_client_id: ClientId,
}

/// `delete-message`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessage {
	pub client_id: ClientId,
	pub room_id: RoomId,
	pub message_id: MessageId,
}

/// `clear-messages`, `delete-room`, `join-room`, `leave-room`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomScoped {
	pub client_id: ClientId,
	pub room_id: RoomId,
}

/// `active-users`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUsers {
	pub room_id: RoomId,
}
