#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("value too long: len={len} max={max}")]
	TooLong { len: usize, max: usize },
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Maximum length accepted for client and room identifiers.
pub const MAX_ID_LEN: usize = 128;

fn validate_id(id: &str) -> Result<(), ParseIdError> {
	if id.trim().is_empty() {
		return Err(ParseIdError::Empty);
	}
	if id.len() > MAX_ID_LEN {
		return Err(ParseIdError::TooLong {
			len: id.len(),
			max: MAX_ID_LEN,
		});
	}
	if id.chars().any(char::is_control) {
		return Err(ParseIdError::InvalidFormat("control characters are not allowed".into()));
	}
	Ok(())
}

/// Server-assigned client identifier.
///
/// Also used for the tentative id of a pending join request, so a requester
/// can poll for the outcome before it has a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		validate_id(&id)?;
		Ok(Self(id))
	}

	/// Create a new random client id.
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for ClientId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ClientId::new(s.to_string())
	}
}

impl TryFrom<String> for ClientId {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		ClientId::new(value)
	}
}

impl From<ClientId> for String {
	fn from(value: ClientId) -> Self {
		value.0
	}
}

/// Room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
	/// Id of the permanent global room.
	pub const GLOBAL: &'static str = "global";

	/// Prefix for direct-message room ids.
	pub const DIRECT_PREFIX: &'static str = "dm:";

	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		validate_id(&id)?;
		Ok(Self(id))
	}

	pub fn global() -> Self {
		Self(Self::GLOBAL.to_string())
	}

	/// Deterministic id of the direct room between two clients (order-independent).
	pub fn direct(a: &ClientId, b: &ClientId) -> Self {
		let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
		Self(format!("{}{}:{}", Self::DIRECT_PREFIX, lo, hi))
	}

	pub fn is_global(&self) -> bool {
		self.0 == Self::GLOBAL
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RoomId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomId::new(s.to_string())
	}
}

impl TryFrom<String> for RoomId {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		RoomId::new(value)
	}
}

impl From<RoomId> for String {
	fn from(value: RoomId) -> Self {
		value.0
	}
}

/// Server-assigned message identifier (monotonic per process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Opaque display name. The server never interprets it (clients may encrypt it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
	pub fn new(name: impl Into<String>) -> Result<Self, ParseIdError> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(name))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for DisplayName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl TryFrom<String> for DisplayName {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		DisplayName::new(value)
	}
}

impl From<DisplayName> for String {
	fn from(value: DisplayName) -> Self {
		value.0
	}
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}
