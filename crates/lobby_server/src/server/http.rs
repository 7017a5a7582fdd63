#![forbid(unsafe_code)]

//! HTTP/1 surface: `POST /api/<name>` JSON endpoints, `GET /api/status`,
//! and the `/healthz` / `/readyz` probes.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lobby_protocol::responses::ErrorBody;
use lobby_protocol::{BodyError, decode_body, encode_body, version};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::server::coordinator::Coordinator;
use crate::server::error::CoordinatorError;

/// JSON endpoints under `/api/`, all `POST` except `status`.
const ENDPOINTS: &[&str] = &[
	"join",
	"send-message",
	"server-message",
	"get-updates",
	"leave",
	"heartbeat",
	"typing",
	"activate-server",
	"deactivate-server",
	"become-mod",
	"toggle-lock",
	"toggle-hidden",
	"handle-user-request",
	"pending-users",
	"kick-user",
	"kick-all",
	"delete-message",
	"clear-messages",
	"delete-room",
	"create-dm-room",
	"join-room",
	"leave-room",
	"user-rooms",
	"active-users",
	"status",
];

#[derive(Clone, Default)]
pub struct HealthState {
	ready: Arc<AtomicBool>,
}

impl HealthState {
	pub fn new() -> Self {
		Self {
			ready: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}
}

#[derive(Clone)]
pub struct AppState {
	pub coordinator: Coordinator,
	pub health: HealthState,
	pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
enum ApiError {
	#[error(transparent)]
	Body(#[from] BodyError),

	#[error(transparent)]
	Coordinator(#[from] CoordinatorError),

	#[error("body exceeds maximum size: max={0}")]
	TooLarge(usize),

	#[error("failed to read request body")]
	Read,
}

impl ApiError {
	fn status(&self) -> StatusCode {
		match self {
			ApiError::Body(e) if e.is_too_large() => StatusCode::PAYLOAD_TOO_LARGE,
			ApiError::Body(BodyError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
			ApiError::Body(_) | ApiError::Read => StatusCode::BAD_REQUEST,
			ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
			ApiError::Coordinator(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
		}
	}
}

/// Accept connections until `shutdown` flips or its sender is dropped.
pub async fn serve(listener: TcpListener, state: AppState, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
	if let Ok(addr) = listener.local_addr() {
		info!(%addr, "http server listening");
	}

	loop {
		let (stream, remote) = tokio::select! {
			accepted = listener.accept() => accepted?,
			res = shutdown.changed() => {
				if res.is_err() || *shutdown.borrow() {
					break;
				}
				continue;
			}
		};

		metrics::counter!("lobby_server_connections_total").increment(1);
		let io = TokioIo::new(stream);
		let state = state.clone();
		tokio::spawn(async move {
			let service = service_fn(move |req| handle(req, state.clone()));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				debug!(%remote, error = %err, "http connection error");
			}
		});
	}

	info!("http server stopped");
	Ok(())
}

async fn handle(req: Request<Incoming>, state: AppState) -> Result<Response<Full<Bytes>>, Infallible> {
	let method = req.method().clone();
	let path = req.uri().path().to_string();

	match (&method, path.as_str()) {
		(&Method::GET, "/healthz") => return Ok(text(StatusCode::OK, "ok")),
		(&Method::GET, "/readyz") => {
			return Ok(if state.health.is_ready() {
				text(StatusCode::OK, "ready")
			} else {
				text(StatusCode::SERVICE_UNAVAILABLE, "not-ready")
			});
		}
		(_, "/healthz" | "/readyz") => return Ok(error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")),
		_ => {}
	}

	let Some(name) = path
		.strip_prefix(version::API_PREFIX)
		.and_then(|n| ENDPOINTS.iter().find(|e| **e == n).copied())
	else {
		return Ok(error(StatusCode::NOT_FOUND, "not found"));
	};

	let expected = if name == "status" { Method::GET } else { Method::POST };
	if method != expected {
		return Ok(error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
	}

	let result = match read_body(req, state.max_body_bytes).await {
		Ok(body) => route(name, &body, &state).await,
		Err(e) => Err(e),
	};

	let response = match result {
		Ok(bytes) => json(StatusCode::OK, bytes),
		Err(err) => {
			let status = err.status();
			if status.is_server_error() {
				warn!(endpoint = name, error = %err, "request failed");
			} else {
				debug!(endpoint = name, status = status.as_u16(), error = %err, "request rejected");
			}
			error(status, &err.to_string())
		}
	};

	metrics::counter!(
		"lobby_server_requests_total",
		"endpoint" => name,
		"status" => response.status().as_str().to_string()
	)
	.increment(1);

	Ok(response)
}

async fn read_body(req: Request<Incoming>, max: usize) -> Result<Bytes, ApiError> {
	match Limited::new(req.into_body(), max).collect().await {
		Ok(collected) => Ok(collected.to_bytes()),
		Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ApiError::TooLarge(max)),
		Err(_) => Err(ApiError::Read),
	}
}

async fn route(name: &str, body: &[u8], state: &AppState) -> Result<Bytes, ApiError> {
	let c = &state.coordinator;
	let max = state.max_body_bytes;

	match name {
		"status" => reply(&c.status().await),
		"join" => reply(&c.join(parse(body, max)?).await?),
		"send-message" => reply(&c.send_message(parse(body, max)?).await?),
		"server-message" => reply(&c.server_message(parse(body, max)?).await?),
		"get-updates" => reply(&c.get_updates(parse(body, max)?).await?),
		"leave" => reply(&c.leave(parse(body, max)?).await?),
		"heartbeat" => reply(&c.heartbeat(parse(body, max)?).await?),
		"typing" => reply(&c.typing(parse(body, max)?).await?),
		"activate-server" => reply(&c.activate(parse(body, max)?).await?),
		"deactivate-server" => reply(&c.deactivate(parse(body, max)?).await?),
		"become-mod" => reply(&c.become_mod(parse(body, max)?).await?),
		"toggle-lock" => reply(&c.toggle_lock(parse(body, max)?).await?),
		"toggle-hidden" => reply(&c.toggle_hidden(parse(body, max)?).await?),
		"handle-user-request" => reply(&c.handle_user_request(parse(body, max)?).await?),
		"pending-users" => reply(&c.pending_users(parse(body, max)?).await?),
		"kick-user" => reply(&c.kick_user(parse(body, max)?).await?),
		"kick-all" => reply(&c.kick_all(parse(body, max)?).await?),
		"delete-message" => reply(&c.delete_message(parse(body, max)?).await?),
		"clear-messages" => reply(&c.clear_messages(parse(body, max)?).await?),
		"delete-room" => reply(&c.delete_room(parse(body, max)?).await?),
		"create-dm-room" => reply(&c.create_dm_room(parse(body, max)?).await?),
		"join-room" => reply(&c.join_room(parse(body, max)?).await?),
		"leave-room" => reply(&c.leave_room(parse(body, max)?).await?),
		"user-rooms" => reply(&c.user_rooms(parse(body, max)?).await?),
		"active-users" => reply(&c.active_users(parse(body, max)?).await?),
		_ => Err(CoordinatorError::not_found("endpoint", name).into()),
	}
}

fn parse<T: DeserializeOwned>(body: &[u8], max: usize) -> Result<T, ApiError> {
	Ok(decode_body(body, max)?)
}

fn reply<T: Serialize>(value: &T) -> Result<Bytes, ApiError> {
	Ok(encode_body(value)?)
}

fn json(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
	let mut resp = Response::new(Full::new(body));
	*resp.status_mut() = status;
	resp.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	resp
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
	let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
	*resp.status_mut() = status;
	resp.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
	resp
}

fn error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
	let body = ErrorBody {
		error: message.to_string(),
	};
	let bytes = encode_body(&body).unwrap_or_else(|_| Bytes::from_static(b"{\"error\":\"internal error\"}"));
	json(status, bytes)
}
