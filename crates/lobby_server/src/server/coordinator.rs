#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use lobby_domain::RoomId;
use lobby_protocol::requests;
use lobby_protocol::responses::{
	Ack, Activated, ActiveUsers, DmRoom, Heartbeat, Joined, KickedAll, MessageSent, PendingUsers, RoomJoined, Status,
	Updates, UserRooms,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::server::dispatcher::{Delivery, ParkTicket};
use crate::server::error::CoordinatorResult;
use crate::server::hub::{Hub, JOIN_HISTORY, JoinOutcome, PollStart};
use crate::server::sweeper::SweepReport;

/// Shared handle to the hub. Every operation is one critical section; the
/// long-poll wait happens outside the lock.
#[derive(Clone)]
pub struct Coordinator {
	hub: Arc<Mutex<Hub>>,
	poll_timeout: Duration,
}

impl Coordinator {
	pub fn new(hub: Hub) -> Self {
		let poll_timeout = hub.config().poll_timeout;
		Self {
			hub: Arc::new(Mutex::new(hub)),
			poll_timeout,
		}
	}

	pub fn poll_timeout(&self) -> Duration {
		self.poll_timeout
	}

	/// Direct access to the hub, for inspection.
	pub async fn lock(&self) -> MutexGuard<'_, Hub> {
		self.hub.lock().await
	}

	pub async fn status(&self) -> Status {
		self.hub.lock().await.status()
	}

	pub async fn join(&self, req: requests::Join) -> CoordinatorResult<Joined> {
		let mut hub = self.hub.lock().await;
		let outcome = hub.join(req.display_name, Instant::now())?;
		let server_time = hub.server_time();
		Ok(match outcome {
			JoinOutcome::Admitted(id) => {
				let (recent_messages, members) = hub.room_snapshot(&RoomId::global(), JOIN_HISTORY);
				Joined {
					client_id: Some(id),
					pending_id: None,
					server_time,
					recent_messages,
					members,
				}
			}
			JoinOutcome::Pending(id) => Joined {
				client_id: None,
				pending_id: Some(id),
				server_time,
				recent_messages: Vec::new(),
				members: Vec::new(),
			},
		})
	}

	pub async fn send_message(&self, req: requests::SendMessage) -> CoordinatorResult<MessageSent> {
		let mut hub = self.hub.lock().await;
		let message_id = hub.send_message(&req.client_id, &req.room_id, req.message, Instant::now())?;
		Ok(MessageSent { ack: true, message_id })
	}

	pub async fn server_message(&self, req: requests::ServerMessage) -> CoordinatorResult<MessageSent> {
		let message_id = self
			.hub
			.lock()
			.await
			.server_message(&req.client_id, &req.room_id, req.message, Instant::now())?;
		Ok(MessageSent { ack: true, message_id })
	}

	/// Long-poll: returns at once if something is ready, otherwise waits up to the poll timeout.
	pub async fn get_updates(&self, req: requests::GetUpdates) -> CoordinatorResult<Updates> {
		let start = {
			let mut hub = self.hub.lock().await;
			hub.begin_poll(&req.client_id, req.last_event_time, Instant::now())?
		};

		let ParkTicket { token, mut rx } = match start {
			PollStart::Ready(delivery) => return Ok(into_updates(delivery)),
			PollStart::Parked(ticket) => ticket,
		};

		let delivery = match tokio::time::timeout(self.poll_timeout, &mut rx).await {
			Ok(Ok(delivery)) => delivery,
			Ok(Err(_)) => Delivery::empty(self.hub.lock().await.server_time()),
			Err(_) => {
				let mut hub = self.hub.lock().await;
				let server_time = hub.end_poll(&req.client_id, token);
				// A delivery may have landed between the timeout firing and taking the lock.
				rx.try_recv().unwrap_or_else(|_| Delivery::empty(server_time))
			}
		};

		debug!(client_id = %req.client_id, events = delivery.events.len(), "poll resolved");
		Ok(into_updates(delivery))
	}

	pub async fn leave(&self, req: requests::ClientOnly) -> CoordinatorResult<Ack> {
		self.hub.lock().await.leave(&req.client_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn heartbeat(&self, req: requests::ClientOnly) -> CoordinatorResult<Heartbeat> {
		let server_time = self.hub.lock().await.heartbeat(&req.client_id, Instant::now())?;
		Ok(Heartbeat { ack: true, server_time })
	}

	pub async fn typing(&self, req: requests::Typing) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.typing(&req.client_id, &req.room_id, req.is_typing, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn activate(&self, req: requests::Activate) -> CoordinatorResult<Activated> {
		let client_id = self
			.hub
			.lock()
			.await
			.activate(&req.password, req.display_name, Instant::now())?;
		Ok(Activated {
			client_id,
			is_moderator: true,
		})
	}

	pub async fn deactivate(&self, req: requests::ClientOnly) -> CoordinatorResult<Ack> {
		self.hub.lock().await.deactivate(&req.client_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn become_mod(&self, req: requests::BecomeMod) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.become_mod(&req.client_id, &req.password, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn toggle_lock(&self, req: requests::ToggleLock) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.set_lock(&req.client_id, req.lock_state, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn toggle_hidden(&self, req: requests::ToggleHidden) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.set_hidden(&req.client_id, req.hidden, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn handle_user_request(&self, req: requests::HandleUserRequest) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.handle_user_request(&req.client_id, &req.pending_id, req.approve, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn pending_users(&self, req: requests::ClientOnly) -> CoordinatorResult<PendingUsers> {
		let pending_users = self.hub.lock().await.pending_users(&req.client_id, Instant::now())?;
		Ok(PendingUsers { pending_users })
	}

	pub async fn kick_user(&self, req: requests::TargetClient) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.kick_user(&req.client_id, &req.target_client_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn kick_all(&self, req: requests::ClientOnly) -> CoordinatorResult<KickedAll> {
		let kicked = self.hub.lock().await.kick_all(&req.client_id, Instant::now())?;
		Ok(KickedAll { ack: true, kicked })
	}

	pub async fn delete_message(&self, req: requests::DeleteMessage) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.delete_message(&req.client_id, &req.room_id, req.message_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn clear_messages(&self, req: requests::RoomScoped) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.clear_messages(&req.client_id, &req.room_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn delete_room(&self, req: requests::RoomScoped) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.delete_room(&req.client_id, &req.room_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn create_dm_room(&self, req: requests::TargetClient) -> CoordinatorResult<DmRoom> {
		let room_id = self
			.hub
			.lock()
			.await
			.create_dm_room(&req.client_id, &req.target_client_id, Instant::now())?;
		Ok(DmRoom { room_id })
	}

	pub async fn join_room(&self, req: requests::RoomScoped) -> CoordinatorResult<RoomJoined> {
		let (recent_messages, members) = self
			.hub
			.lock()
			.await
			.join_room(&req.client_id, &req.room_id, Instant::now())?;
		Ok(RoomJoined {
			room_id: req.room_id,
			recent_messages,
			members,
		})
	}

	pub async fn leave_room(&self, req: requests::RoomScoped) -> CoordinatorResult<Ack> {
		self.hub
			.lock()
			.await
			.leave_room(&req.client_id, &req.room_id, Instant::now())?;
		Ok(Ack::OK)
	}

	pub async fn user_rooms(&self, req: requests::ClientOnly) -> CoordinatorResult<UserRooms> {
		let rooms = self.hub.lock().await.user_rooms(&req.client_id, Instant::now())?;
		Ok(UserRooms { rooms })
	}

	pub async fn active_users(&self, req: requests::ActiveUsers) -> CoordinatorResult<ActiveUsers> {
		let members = self.hub.lock().await.active_users(&req.room_id)?;
		Ok(ActiveUsers { members })
	}

	pub async fn sweep(&self) -> SweepReport {
		self.hub.lock().await.sweep(Instant::now())
	}
}

fn into_updates(delivery: Delivery) -> Updates {
	Updates {
		events: delivery.events,
		server_time: delivery.server_time,
	}
}
