#![forbid(unsafe_code)]

use lobby_domain::ParseIdError;
use thiserror::Error;

/// Errors returned by coordinator operations. Each is terminal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
	/// Malformed or out-of-range request fields.
	#[error("invalid request: {0}")]
	Validation(String),

	/// Caller lacks the privilege for the action.
	#[error("not authorized: {0}")]
	Unauthorized(String),

	/// The gate is inactive; nothing but activation and status is accepted.
	#[error("server is not active")]
	Inactive,

	#[error("rate limited")]
	RateLimited,

	#[error("unknown {kind}: {id}")]
	NotFound { kind: &'static str, id: String },
}

impl CoordinatorError {
	pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
		Self::NotFound {
			kind,
			id: id.to_string(),
		}
	}

	pub fn unauthorized(detail: impl Into<String>) -> Self {
		Self::Unauthorized(detail.into())
	}

	pub fn validation(detail: impl Into<String>) -> Self {
		Self::Validation(detail.into())
	}

	/// HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			Self::Validation(_) => 400,
			Self::Unauthorized(_) | Self::Inactive | Self::RateLimited => 403,
			Self::NotFound { .. } => 404,
		}
	}
}

impl From<ParseIdError> for CoordinatorError {
	fn from(e: ParseIdError) -> Self {
		Self::Validation(e.to_string())
	}
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
