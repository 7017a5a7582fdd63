#![forbid(unsafe_code)]

use std::time::Duration;

use lobby_domain::{ClientId, DisplayName, SecretString};
use lobby_protocol::Event;
use tokio::time::Instant;

use crate::server::audit::AuditService;
use crate::server::dispatcher::{Delivery, ParkTicket};
use crate::server::hub::{Hub, HubConfig, JoinOutcome, PollStart};

pub const PASSWORD: &str = "correct horse";

pub fn name(s: &str) -> DisplayName {
	DisplayName::new(s).expect("valid display name")
}

pub fn config() -> HubConfig {
	HubConfig {
		history_capacity: 5,
		client_timeout: Duration::from_secs(60),
		moderator_timeout: Duration::from_secs(180),
		pending_timeout: Duration::from_secs(300),
		poll_timeout: Duration::from_millis(200),
		message_burst: 0,
		messages_per_minute: 0,
		moderator_password: Some(SecretString::new(PASSWORD)),
		..HubConfig::default()
	}
}

pub fn hub() -> Hub {
	Hub::with_audit(config(), AuditService::disabled())
}

/// An activated hub and its acting moderator.
pub fn active_hub(now: Instant) -> (Hub, ClientId) {
	let mut hub = hub();
	let moderator = hub.activate(PASSWORD, Some(name("mod")), now).expect("activate");
	(hub, moderator)
}

pub fn admit(hub: &mut Hub, display: &str, now: Instant) -> ClientId {
	match hub.join(name(display), now).expect("join") {
		JoinOutcome::Admitted(id) => id,
		JoinOutcome::Pending(id) => panic!("expected admission, got pending {id}"),
	}
}

pub fn park(hub: &mut Hub, id: &ClientId, now: Instant) -> ParkTicket {
	match hub.begin_poll(id, None, now).expect("begin poll") {
		PollStart::Parked(ticket) => ticket,
		PollStart::Ready(d) => panic!("expected to park, got {d:?}"),
	}
}

/// Take whatever was delivered to a parked ticket without waiting.
pub fn delivered(ticket: &mut ParkTicket) -> Option<Delivery> {
	ticket.rx.try_recv().ok()
}

pub fn names(events: &[Event]) -> Vec<&'static str> {
	events.iter().map(Event::name).collect()
}
