#![forbid(unsafe_code)]

use lobby_domain::{ClientId, RoomId};
use lobby_protocol::Event;
use tokio::time::{Duration, Instant};

use crate::server::error::CoordinatorError;
use crate::server::gate::GateState;
use crate::server::hub::{JoinOutcome, PollStart, Presence};
use crate::server::test_support::{PASSWORD, active_hub, admit, delivered, hub, name, names, park};

#[test]
fn activation_creates_the_acting_moderator_in_global() {
	let now = Instant::now();
	let mut hub = hub();
	let moderator = hub.activate(PASSWORD, None, now).unwrap();

	let session = hub.sessions().get(&moderator).unwrap();
	assert!(session.is_moderator);
	assert_eq!(session.display_name.as_str(), "Moderator");
	assert!(hub.gate().is_acting_moderator(&moderator));
	assert!(hub.rooms().get(&RoomId::global()).unwrap().is_member(&moderator));
	assert_eq!(hub.gate().state(), GateState::Unlocked);

	let err = hub.activate(PASSWORD, None, now).unwrap_err();
	assert_eq!(err.status_code(), 403);
	assert!(hub.gate().is_acting_moderator(&moderator));
}

#[test]
fn kick_ends_the_target_session() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);
	let bob = admit(&mut hub, "bob", now);
	let mut alice_poll = park(&mut hub, &alice, now);
	let mut bob_poll = park(&mut hub, &bob, now);

	hub.kick_user(&moderator, &alice, now).unwrap();

	let got = delivered(&mut alice_poll).unwrap();
	assert!(matches!(&got.events[..], [Event::Kicked { reason }] if reason == "kicked by moderator"));
	let got = delivered(&mut bob_poll).unwrap();
	assert!(matches!(&got.events[..], [Event::UserLeft { client_id, .. }] if *client_id == alice));

	assert_eq!(hub.presence(&alice), Presence::Gone);
	let err = hub.send_message(&alice, &RoomId::global(), "still here?".into(), now).unwrap_err();
	assert_eq!(err.status_code(), 404);
}

#[test]
fn kick_authorization_rules() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);
	let bob = admit(&mut hub, "bob", now);

	assert_eq!(hub.kick_user(&alice, &bob, now).unwrap_err().status_code(), 403);
	assert_eq!(hub.kick_user(&moderator, &moderator, now).unwrap_err().status_code(), 400);
	assert_eq!(
		hub.kick_user(&moderator, &ClientId::generate(), now).unwrap_err().status_code(),
		404
	);

	// A promoted moderator cannot kick the acting one.
	hub.become_mod(&alice, PASSWORD, now).unwrap();
	assert_eq!(hub.kick_user(&alice, &moderator, now).unwrap_err().status_code(), 403);
	hub.kick_user(&alice, &bob, now).unwrap();
}

#[test]
fn become_mod_keeps_the_acting_moderator() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);

	assert_eq!(hub.become_mod(&alice, "nope", now).unwrap_err().status_code(), 403);
	assert!(!hub.sessions().get(&alice).unwrap().is_moderator);

	hub.become_mod(&alice, PASSWORD, now).unwrap();
	assert!(hub.sessions().get(&alice).unwrap().is_moderator);
	assert!(hub.gate().is_acting_moderator(&moderator));
	assert!(!hub.gate().is_acting_moderator(&alice));
}

#[test]
fn locked_join_goes_through_approval() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let observer = admit(&mut hub, "observer", now);
	hub.become_mod(&observer, PASSWORD, now).unwrap();
	hub.set_lock(&moderator, true, now).unwrap();

	let mut mod_poll = park(&mut hub, &moderator, now);
	let pending = match hub.join(name("dave"), now).unwrap() {
		JoinOutcome::Pending(id) => id,
		JoinOutcome::Admitted(id) => panic!("admitted {id} while locked"),
	};
	assert_eq!(hub.presence(&pending), Presence::Joining);
	let got = delivered(&mut mod_poll).unwrap();
	assert!(matches!(&got.events[..], [Event::JoinRequest { pending_id, .. }] if *pending_id == pending));

	let mut dave_poll = park(&mut hub, &pending, now);
	let mut observer_poll = park(&mut hub, &observer, now);
	hub.handle_user_request(&moderator, &pending, true, now).unwrap();

	let got = delivered(&mut dave_poll).unwrap();
	let new_id = match &got.events[..] {
		[Event::JoinApproved { client_id, room_id }] => {
			assert!(room_id.is_global());
			client_id.clone()
		}
		other => panic!("unexpected events: {other:?}"),
	};
	assert_ne!(new_id, pending);
	assert_eq!(hub.presence(&new_id), Presence::Active);
	assert_eq!(hub.presence(&pending), Presence::Gone);

	let got = delivered(&mut observer_poll).unwrap();
	assert_eq!(names(&got.events), vec!["user_joined", "join_request_resolved"]);

	// Consumed exactly once.
	assert_eq!(
		hub.handle_user_request(&moderator, &pending, true, now).unwrap_err().status_code(),
		404
	);
}

#[test]
fn resolution_waits_for_a_requester_between_polls() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	hub.set_lock(&moderator, true, now).unwrap();
	let JoinOutcome::Pending(pending) = hub.join(name("erin"), now).unwrap() else {
		panic!("expected pending");
	};

	hub.handle_user_request(&moderator, &pending, false, now).unwrap();

	match hub.begin_poll(&pending, None, now).unwrap() {
		PollStart::Ready(d) => {
			assert!(matches!(&d.events[..], [Event::JoinRejected { reason }] if reason == "rejected by moderator"));
		}
		PollStart::Parked(_) => panic!("expected stored resolution"),
	}
	assert_eq!(hub.begin_poll(&pending, None, now).unwrap_err().status_code(), 404);
}

#[test]
fn unlocking_approves_everyone_waiting() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	hub.set_lock(&moderator, true, now).unwrap();

	let mut pendings = Vec::new();
	for who in ["a", "b", "c"] {
		match hub.join(name(who), now).unwrap() {
			JoinOutcome::Pending(id) => pendings.push(id),
			JoinOutcome::Admitted(_) => panic!("locked gate admitted"),
		}
	}

	let mut mod_poll = park(&mut hub, &moderator, now);
	hub.set_lock(&moderator, false, now).unwrap();

	assert_eq!(hub.gate().pending_len(), 0);
	assert_eq!(hub.sessions().len(), 4);
	let got = delivered(&mut mod_poll).unwrap();
	assert_eq!(
		names(&got.events),
		vec!["lock_changed", "user_joined", "user_joined", "user_joined"]
	);

	for id in &pendings {
		match hub.begin_poll(id, None, now).unwrap() {
			PollStart::Ready(d) => assert_eq!(names(&d.events), vec!["join_approved"]),
			PollStart::Parked(_) => panic!("approval not stored"),
		}
	}

	let admitted = hub.join(name("late"), now).unwrap();
	assert!(matches!(admitted, JoinOutcome::Admitted(_)));
}

#[test]
fn hidden_moderators_do_not_see_join_requests() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	hub.set_hidden(&moderator, true, now).unwrap();
	hub.set_lock(&moderator, true, now).unwrap();

	let mut mod_poll = park(&mut hub, &moderator, now);
	hub.join(name("quiet"), now).unwrap();
	assert!(delivered(&mut mod_poll).is_none());
}

#[test]
fn deactivation_kicks_everyone_and_resets_state() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);
	let bob = admit(&mut hub, "bob", now);
	let dm = hub.create_dm_room(&alice, &bob, now).unwrap();
	hub.send_message(&alice, &RoomId::global(), "hi".into(), now).unwrap();
	hub.set_lock(&moderator, true, now).unwrap();
	let JoinOutcome::Pending(pending) = hub.join(name("waiting"), now).unwrap() else {
		panic!("expected pending");
	};

	let mut alice_poll = park(&mut hub, &alice, now);
	let mut pending_poll = park(&mut hub, &pending, now);

	hub.deactivate(&moderator, now).unwrap();

	let got = delivered(&mut alice_poll).unwrap();
	assert!(matches!(&got.events[..], [Event::Kicked { reason }] if reason == "server_deactivated"));
	let got = delivered(&mut pending_poll).unwrap();
	assert_eq!(names(&got.events), vec!["join_rejected"]);

	assert!(hub.sessions().is_empty());
	assert!(!hub.rooms().contains(&dm));
	assert_eq!(hub.rooms().get(&RoomId::global()).unwrap().history_len(), 0);
	assert_eq!(hub.gate().state(), GateState::Inactive);
	assert_eq!(hub.gate().pending_len(), 0);
	assert_eq!(hub.dispatcher().parked_count(), 0);
	assert_eq!(hub.join(name("after"), now).unwrap_err(), CoordinatorError::Inactive);

	// The gate can be reopened.
	hub.activate(PASSWORD, None, now).unwrap();
}

#[test]
fn acting_moderator_leaving_deactivates() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);
	let mut alice_poll = park(&mut hub, &alice, now);

	hub.leave(&moderator, now).unwrap();

	let got = delivered(&mut alice_poll).unwrap();
	assert_eq!(names(&got.events), vec!["user_left", "kicked"]);
	assert!(!hub.status().active);
}

#[test]
fn kick_all_spares_moderators() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	admit(&mut hub, "a", now);
	admit(&mut hub, "b", now);
	let helper = admit(&mut hub, "helper", now);
	hub.become_mod(&helper, PASSWORD, now).unwrap();

	assert_eq!(hub.kick_all(&moderator, now).unwrap(), 2);
	assert_eq!(hub.sessions().len(), 2);
	assert!(hub.sessions().contains(&helper));
}

#[test]
fn room_moderation_commands() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);
	let bob = admit(&mut hub, "bob", now);
	let first = hub.send_message(&alice, &RoomId::global(), "1".into(), now).unwrap();
	hub.send_message(&alice, &RoomId::global(), "2".into(), now).unwrap();

	assert_eq!(
		hub.delete_message(&alice, &RoomId::global(), first, now).unwrap_err().status_code(),
		403
	);

	let mut bob_poll = park(&mut hub, &bob, now);
	hub.delete_message(&moderator, &RoomId::global(), first, now).unwrap();
	let got = delivered(&mut bob_poll).unwrap();
	assert!(matches!(&got.events[..], [Event::MessageDeleted { message_id, .. }] if *message_id == first));

	hub.clear_messages(&moderator, &RoomId::global(), now).unwrap();
	assert_eq!(hub.rooms().get(&RoomId::global()).unwrap().history_len(), 0);

	assert_eq!(
		hub.delete_room(&moderator, &RoomId::global(), now).unwrap_err().status_code(),
		403
	);
	let dm = hub.create_dm_room(&alice, &bob, now).unwrap();
	let mut bob_poll = park(&mut hub, &bob, now);
	hub.delete_room(&moderator, &dm, now).unwrap();
	let got = delivered(&mut bob_poll).unwrap();
	assert_eq!(names(&got.events), vec!["room_closed", "room_deleted"]);
	assert_eq!(hub.delete_room(&moderator, &dm, now).unwrap_err().status_code(), 404);
}

#[test]
fn lock_changes_are_broadcast_once() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);

	assert_eq!(hub.set_lock(&alice, true, now).unwrap_err().status_code(), 403);

	let mut alice_poll = park(&mut hub, &alice, now);
	hub.set_lock(&moderator, true, now).unwrap();
	let got = delivered(&mut alice_poll).unwrap();
	assert!(matches!(&got.events[..], [Event::LockChanged { locked: true }]));
	assert!(hub.status().lock_state);

	let mut alice_poll = park(&mut hub, &alice, now);
	hub.set_lock(&moderator, true, now).unwrap();
	assert!(delivered(&mut alice_poll).is_none());
}

#[test]
fn pending_users_lists_the_queue_oldest_first() {
	let t0 = Instant::now();
	let (mut hub, moderator) = active_hub(t0);
	let alice = admit(&mut hub, "alice", t0);
	hub.set_lock(&moderator, true, t0).unwrap();
	assert!(hub.pending_users(&moderator, t0).unwrap().is_empty());

	let JoinOutcome::Pending(first) = hub.join(name("first"), t0).unwrap() else {
		panic!("expected pending");
	};
	let later = t0 + Duration::from_secs(2);
	let JoinOutcome::Pending(second) = hub.join(name("second"), later).unwrap() else {
		panic!("expected pending");
	};

	assert_eq!(hub.pending_users(&alice, later).unwrap_err().status_code(), 403);

	let listed = hub.pending_users(&moderator, later).unwrap();
	let ids: Vec<&ClientId> = listed.iter().map(|p| &p.pending_id).collect();
	assert_eq!(ids, vec![&first, &second]);
	assert_eq!(listed[0].username.as_str(), "first");
	assert_eq!(listed[1].requested_at - listed[0].requested_at, 2000);

	// Listing does not consume.
	hub.handle_user_request(&moderator, &first, false, later).unwrap();
	let listed = hub.pending_users(&moderator, later).unwrap();
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].pending_id, second);
}

#[test]
fn server_message_reaches_every_member() {
	let now = Instant::now();
	let (mut hub, moderator) = active_hub(now);
	let alice = admit(&mut hub, "alice", now);

	let err = hub.server_message(&alice, &RoomId::global(), "hi".into(), now).unwrap_err();
	assert_eq!(err.status_code(), 403);
	let err = hub
		.server_message(&moderator, &RoomId::new("nowhere").unwrap(), "hi".into(), now)
		.unwrap_err();
	assert_eq!(err.status_code(), 404);
	let err = hub.server_message(&moderator, &RoomId::global(), String::new(), now).unwrap_err();
	assert!(matches!(err, CoordinatorError::Validation(_)));

	let mut mod_poll = park(&mut hub, &moderator, now);
	let mut alice_poll = park(&mut hub, &alice, now);
	let id = hub
		.server_message(&moderator, &RoomId::global(), "maintenance at noon".into(), now)
		.unwrap();

	for poll in [&mut mod_poll, &mut alice_poll] {
		let got = delivered(poll).unwrap();
		match &got.events[..] {
			[Event::ReceiveMessage(m)] => {
				assert_eq!(m.message_id, id);
				assert!(m.is_server_message);
				assert_eq!(m.username.as_str(), "SERVER");
				assert_eq!(m.client_id, moderator);
			}
			other => panic!("unexpected events: {other:?}"),
		}
	}

	// Replayed to the issuer too, unlike their own chat messages.
	let (recent, _) = hub.room_snapshot(&RoomId::global(), 10);
	assert!(recent.iter().any(|m| m.message_id == id && m.is_server_message));
	let replay = match hub.begin_poll(&moderator, Some(1), now).unwrap() {
		PollStart::Ready(d) => d,
		PollStart::Parked(_) => panic!("expected a replay"),
	};
	assert!(
		replay
			.events
			.iter()
			.any(|e| matches!(e, Event::ReceiveMessage(m) if m.message_id == id))
	);
}
