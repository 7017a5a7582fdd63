#![forbid(unsafe_code)]

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default maximum request body size.
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug, Error)]
pub enum BodyError {
	#[error("body exceeds maximum size: len={len} max={max}")]
	BodyTooLarge {
		len: usize,
		max: usize,
	},

	#[error("empty body")]
	Empty,

	#[error("json decode error: {0}")]
	Decode(#[source] serde_json::Error),

	#[error("json encode error: {0}")]
	Encode(#[source] serde_json::Error),
}

impl BodyError {
	/// Whether this error is caused by the size limit rather than the content.
	pub fn is_too_large(&self) -> bool {
		matches!(self, BodyError::BodyTooLarge { .. })
	}
}

/// Decode a JSON request body, enforcing `max_body_size`.
///
/// Content type is not checked: page-unload beacons arrive as `text/plain`.
pub fn decode_body<T: DeserializeOwned>(src: &[u8], max_body_size: usize) -> Result<T, BodyError> {
	if src.len() > max_body_size {
		return Err(BodyError::BodyTooLarge {
			len: src.len(),
			max: max_body_size,
		});
	}

	if src.iter().all(u8::is_ascii_whitespace) {
		return Err(BodyError::Empty);
	}

	serde_json::from_slice(src).map_err(BodyError::Decode)
}

/// Encode a JSON response body.
pub fn encode_body<T: Serialize>(value: &T) -> Result<Bytes, BodyError> {
	serde_json::to_vec(value).map(Bytes::from).map_err(BodyError::Encode)
}
