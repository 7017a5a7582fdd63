#![forbid(unsafe_code)]

pub mod body;
pub mod events;
pub mod requests;
pub mod responses;

pub use body::{BodyError, DEFAULT_MAX_BODY_SIZE, decode_body, encode_body};
pub use events::{ChatMessage, Event, Member};

/// Protocol version constants.
pub mod version {
	/// Current protocol major version (v1).
	pub const PROTOCOL_MAJOR: u32 = 1;
	/// Current protocol minor version.
	pub const PROTOCOL_MINOR: u32 = 0;

	/// Path prefix of every API endpoint.
	pub const API_PREFIX: &str = "/api/";
}
