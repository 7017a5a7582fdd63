#![forbid(unsafe_code)]

use lobby_domain::{ClientId, RoomId};
use lobby_protocol::Event;
use tokio::time::{Duration, Instant};

use crate::server::dispatcher::{Delivery, Dispatcher, Outbox};

fn closed(room: &str) -> Event {
	Event::RoomClosed {
		room_id: RoomId::new(room).unwrap(),
	}
}

#[test]
fn second_park_resolves_the_first_with_an_empty_batch() {
	let mut d = Dispatcher::default();
	let id = ClientId::generate();
	let now = Instant::now();

	let mut first = d.park(&id, now, 10);
	let mut second = d.park(&id, now, 11);
	assert_eq!(d.parked_count(), 1);

	assert_eq!(first.rx.try_recv().unwrap(), Delivery::empty(11));
	assert!(second.rx.try_recv().is_err());

	assert!(d.fulfill(&id, vec![closed("r")], 12));
	let got = second.rx.try_recv().unwrap();
	assert_eq!(got.events, vec![closed("r")]);
	assert!(!d.is_parked(&id));
}

#[test]
fn fulfill_without_a_parked_response_drops() {
	let mut d = Dispatcher::default();
	assert!(!d.fulfill(&ClientId::generate(), vec![closed("r")], 1));
}

#[test]
fn deliver_batches_per_recipient_in_push_order() {
	let mut d = Dispatcher::default();
	let a = ClientId::generate();
	let b = ClientId::generate();
	let now = Instant::now();
	let mut ta = d.park(&a, now, 0);
	let mut tb = d.park(&b, now, 0);

	let mut outbox = Outbox::new();
	outbox.push(&a, closed("1"));
	outbox.push(&b, closed("2"));
	outbox.push(&a, closed("3"));
	outbox.push(&ClientId::generate(), closed("nobody"));
	assert_eq!(outbox.events_for(&a).len(), 2);

	assert_eq!(d.deliver(outbox, 5), 2);
	let got_a = ta.rx.try_recv().unwrap();
	assert_eq!(got_a.events, vec![closed("1"), closed("3")]);
	assert_eq!(got_a.server_time, 5);
	assert_eq!(tb.rx.try_recv().unwrap().events, vec![closed("2")]);
}

#[test]
fn release_only_matches_the_current_token() {
	let mut d = Dispatcher::default();
	let id = ClientId::generate();
	let now = Instant::now();

	let old = d.park(&id, now, 0);
	let current = d.park(&id, now, 0);

	assert!(!d.release(&id, old.token));
	assert!(d.is_parked(&id));
	assert!(d.release(&id, current.token));
	assert!(!d.is_parked(&id));
}

#[test]
fn abandoned_and_orphaned_slots_are_cleaned_up() {
	let mut d = Dispatcher::default();
	let gone = ClientId::generate();
	let orphan = ClientId::generate();
	let live = ClientId::generate();
	let now = Instant::now();

	drop(d.park(&gone, now, 0));
	let mut orphan_ticket = d.park(&orphan, now, 0);
	let _live_ticket = d.park(&live, now, 0);

	assert!(!d.is_listening(&gone));
	assert!(d.is_listening(&live));
	assert_eq!(d.drop_abandoned(), 1);

	assert_eq!(d.retain_owners(|id| *id == live, 9), 1);
	assert_eq!(orphan_ticket.rx.try_recv().unwrap(), Delivery::empty(9));
	assert_eq!(d.parked_count(), 1);
}

#[test]
fn evict_parked_before_cutoff() {
	let mut d = Dispatcher::default();
	let early = ClientId::generate();
	let late = ClientId::generate();
	let t0 = Instant::now();

	let mut early_ticket = d.park(&early, t0, 0);
	let _late_ticket = d.park(&late, t0 + Duration::from_secs(10), 0);

	assert_eq!(d.evict_parked_before(t0 + Duration::from_secs(5), 3), 1);
	assert!(early_ticket.rx.try_recv().unwrap().is_empty());
	assert!(d.is_parked(&late));
}
