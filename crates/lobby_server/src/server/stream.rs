#![forbid(unsafe_code)]

//! Poll-then-repoll as a loop feeding a channel, for in-process consumers.
//!
//! The HTTP binary does not use this; remote clients run the same loop
//! themselves against `get-updates`. It is for embedders that hold a
//! [`Coordinator`] directly, and the test suite drives the coordinator
//! through it.

use lobby_domain::ClientId;
use lobby_protocol::Event;
use lobby_protocol::requests::GetUpdates;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::server::coordinator::Coordinator;
use crate::server::error::CoordinatorError;

/// Why a stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
	/// Kicked, rejected, deactivated, or the session no longer exists.
	SessionEnded,
	ReceiverDropped,
	Cancelled,
	Error(CoordinatorError),
}

pub struct EventStream {
	pub events: mpsc::Receiver<Event>,
	shutdown: watch::Sender<bool>,
	handle: JoinHandle<StreamEnd>,
}

impl EventStream {
	pub fn cancel(&self) {
		let _ = self.shutdown.send(true);
	}

	/// Wait for the loop to stop. A panicked loop reports `Cancelled`.
	pub async fn finish(self) -> StreamEnd {
		let EventStream { events, shutdown, handle } = self;
		let end = handle.await.unwrap_or(StreamEnd::Cancelled);
		drop(events);
		drop(shutdown);
		end
	}
}

/// Spawn the poll loop for `client_id`.
///
/// A pending requester may stream on its pending id; on `join_approved` the
/// loop continues on the new session id.
pub fn spawn_event_stream(
	coordinator: Coordinator,
	client_id: ClientId,
	last_event_time: Option<u64>,
	capacity: usize,
) -> EventStream {
	let (tx, rx) = mpsc::channel(capacity.max(1));
	let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

	let handle = tokio::spawn(async move {
		let mut client_id = client_id;
		let mut last_event_time = last_event_time;

		loop {
			let poll = coordinator.get_updates(GetUpdates {
				client_id: client_id.clone(),
				last_event_time,
			});

			let result = tokio::select! {
				res = poll => res,
				_ = shutdown_rx.changed() => return StreamEnd::Cancelled,
				_ = tx.closed() => return StreamEnd::ReceiverDropped,
			};

			let updates = match result {
				Ok(updates) => updates,
				Err(CoordinatorError::NotFound { .. } | CoordinatorError::Inactive) => {
					debug!(client_id = %client_id, "event stream: session gone");
					return StreamEnd::SessionEnded;
				}
				Err(err) => return StreamEnd::Error(err),
			};

			last_event_time = Some(updates.server_time);
			for event in updates.events {
				let ends = event.ends_session();
				if let Event::JoinApproved { client_id: approved, .. } = &event {
					client_id = approved.clone();
				}
				if tx.send(event).await.is_err() {
					return StreamEnd::ReceiverDropped;
				}
				if ends {
					return StreamEnd::SessionEnded;
				}
			}
		}
	});

	EventStream {
		events: rx,
		shutdown: shutdown_tx,
		handle,
	}
}
