#![forbid(unsafe_code)]

use std::time::Duration;

use lobby_domain::{ClientId, RoomId};
use lobby_protocol::Event;
use lobby_protocol::requests::{HandleUserRequest, Join, SendMessage, TargetClient, ToggleLock};
use tokio::time::Instant;

use crate::server::coordinator::Coordinator;
use crate::server::stream::{EventStream, StreamEnd, spawn_event_stream};
use crate::server::test_support::{active_hub, admit, name};

const WAIT: Duration = Duration::from_secs(2);

/// An activated coordinator, its acting moderator, and one admitted client.
fn setup() -> (Coordinator, ClientId, ClientId) {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);
	(Coordinator::new(hub), moderator, alice)
}

async fn wait_parked(coordinator: &Coordinator, id: &ClientId) {
	for _ in 0..200 {
		if coordinator.lock().await.dispatcher().is_parked(id) {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("{id} never parked");
}

async fn next_event(stream: &mut EventStream) -> Event {
	tokio::time::timeout(WAIT, stream.events.recv())
		.await
		.expect("event in time")
		.expect("stream open")
}

fn say(client_id: &ClientId, message: &str) -> SendMessage {
	SendMessage {
		client_id: client_id.clone(),
		room_id: RoomId::global(),
		message: message.to_string(),
	}
}

#[tokio::test]
async fn stream_yields_messages_across_repolls() {
	let (coordinator, moderator, alice) = setup();
	let mut stream = spawn_event_stream(coordinator.clone(), alice.clone(), None, 8);
	wait_parked(&coordinator, &alice).await;

	coordinator.send_message(say(&moderator, "first")).await.unwrap();
	match next_event(&mut stream).await {
		Event::ReceiveMessage(m) => assert_eq!(m.message, "first"),
		other => panic!("unexpected event: {other:?}"),
	}

	// Outlive at least one poll timeout; lastEventTime replay covers the gap.
	tokio::time::sleep(coordinator.poll_timeout() * 2).await;
	coordinator.send_message(say(&moderator, "second")).await.unwrap();
	match next_event(&mut stream).await {
		Event::ReceiveMessage(m) => assert_eq!(m.message, "second"),
		other => panic!("unexpected event: {other:?}"),
	}

	stream.cancel();
	assert_eq!(stream.finish().await, StreamEnd::Cancelled);
}

#[tokio::test]
async fn kick_ends_the_stream() {
	let (coordinator, moderator, alice) = setup();
	let stream = spawn_event_stream(coordinator.clone(), alice.clone(), None, 8);
	wait_parked(&coordinator, &alice).await;

	coordinator
		.kick_user(TargetClient {
			client_id: moderator,
			target_client_id: alice,
		})
		.await
		.unwrap();

	let end = tokio::time::timeout(WAIT, stream.finish()).await.unwrap();
	assert_eq!(end, StreamEnd::SessionEnded);
}

#[tokio::test]
async fn unknown_client_ends_immediately() {
	let (coordinator, _moderator, _alice) = setup();
	let stream = spawn_event_stream(coordinator, ClientId::generate(), None, 8);
	let end = tokio::time::timeout(WAIT, stream.finish()).await.unwrap();
	assert_eq!(end, StreamEnd::SessionEnded);
}

#[tokio::test]
async fn closed_receiver_stops_the_loop() {
	let (coordinator, _moderator, alice) = setup();
	let mut stream = spawn_event_stream(coordinator.clone(), alice.clone(), None, 8);
	wait_parked(&coordinator, &alice).await;

	stream.events.close();
	let end = tokio::time::timeout(WAIT, stream.finish()).await.unwrap();
	assert_eq!(end, StreamEnd::ReceiverDropped);
}

#[tokio::test]
async fn pending_stream_follows_approval() {
	let (coordinator, moderator, _alice) = setup();
	coordinator
		.toggle_lock(ToggleLock {
			client_id: moderator.clone(),
			lock_state: true,
		})
		.await
		.unwrap();

	let joined = coordinator.join(Join { display_name: name("dave") }).await.unwrap();
	let pending = joined.pending_id.expect("pending while locked");
	assert!(joined.client_id.is_none());

	let mut stream = spawn_event_stream(coordinator.clone(), pending.clone(), None, 8);
	wait_parked(&coordinator, &pending).await;

	coordinator
		.handle_user_request(HandleUserRequest {
			client_id: moderator.clone(),
			pending_id: pending,
			approve: true,
		})
		.await
		.unwrap();

	let approved = match next_event(&mut stream).await {
		Event::JoinApproved { client_id, .. } => client_id,
		other => panic!("unexpected event: {other:?}"),
	};

	wait_parked(&coordinator, &approved).await;
	coordinator.send_message(say(&moderator, "welcome")).await.unwrap();
	match next_event(&mut stream).await {
		Event::ReceiveMessage(m) => assert_eq!(m.message, "welcome"),
		other => panic!("unexpected event: {other:?}"),
	}

	stream.cancel();
	assert_eq!(stream.finish().await, StreamEnd::Cancelled);
}
