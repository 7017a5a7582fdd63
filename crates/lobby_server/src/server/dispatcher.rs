#![forbid(unsafe_code)]

//! Per-client single-slot mailbox for long-poll responses.
//!
//! Delivery is "fire only while listening": events for a client that has no
//! parked response are dropped. There is no backing queue, so events are
//! lossy between polls. Messages are the exception only in that clients can
//! catch up on them from room history via `lastEventTime`.

use std::collections::HashMap;

use lobby_domain::ClientId;
use lobby_protocol::Event;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// One resolved long-poll: an event batch, or empty on timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
	pub events: Vec<Event>,
	pub server_time: u64,
}

impl Delivery {
	pub fn empty(server_time: u64) -> Self {
		Self {
			events: Vec::new(),
			server_time,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}
}

/// Notifications collected during one logical operation.
///
/// Delivered in one dispatcher pass, so a client receives everything an
/// operation produced for it as a single ordered batch.
#[derive(Debug, Default)]
pub struct Outbox {
	entries: Vec<(ClientId, Event)>,
}

impl Outbox {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, to: &ClientId, event: Event) {
		self.entries.push((to.clone(), event));
	}

	pub fn push_all<'a>(&mut self, to: impl IntoIterator<Item = &'a ClientId>, event: &Event) {
		for id in to {
			self.entries.push((id.clone(), event.clone()));
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Events addressed to `id`, in push order.
	pub fn events_for(&self, id: &ClientId) -> Vec<&Event> {
		self.entries.iter().filter(|(to, _)| to == id).map(|(_, e)| e).collect()
	}

	/// Group by recipient, keeping first-seen recipient order and per-recipient event order.
	fn into_batches(self) -> Vec<(ClientId, Vec<Event>)> {
		let mut index: HashMap<ClientId, usize> = HashMap::new();
		let mut batches: Vec<(ClientId, Vec<Event>)> = Vec::new();

		for (to, event) in self.entries {
			match index.get(&to) {
				Some(&i) => batches[i].1.push(event),
				None => {
					index.insert(to.clone(), batches.len());
					batches.push((to, vec![event]));
				}
			}
		}

		batches
	}
}

#[derive(Debug)]
struct ParkedResponse {
	token: u64,
	tx: oneshot::Sender<Delivery>,
	parked_at: Instant,
}

/// Handle returned to the poller.
#[derive(Debug)]
pub struct ParkTicket {
	pub token: u64,
	pub rx: oneshot::Receiver<Delivery>,
}

/// At most one parked response per client.
#[derive(Debug, Default)]
pub struct Dispatcher {
	parked: HashMap<ClientId, ParkedResponse>,
	next_token: u64,
}

impl Dispatcher {
	/// Park a response for `id`. A still-parked previous response is resolved empty first.
	pub fn park(&mut self, id: &ClientId, now: Instant, server_time: u64) -> ParkTicket {
		let (tx, rx) = oneshot::channel();
		self.next_token = self.next_token.wrapping_add(1);
		let token = self.next_token;

		let parked = ParkedResponse {
			token,
			tx,
			parked_at: now,
		};

		if let Some(stale) = self.parked.insert(id.clone(), parked) {
			let _ = stale.tx.send(Delivery::empty(server_time));
			metrics::counter!("lobby_server_polls_superseded_total").increment(1);
		}

		ParkTicket { token, rx }
	}

	/// Deliver `events` if `id` is parked. Returns whether anything was delivered.
	pub fn fulfill(&mut self, id: &ClientId, events: Vec<Event>, server_time: u64) -> bool {
		let Some(parked) = self.parked.remove(id) else {
			return false;
		};

		parked.tx.send(Delivery { events, server_time }).is_ok()
	}

	/// Resolve a parked response with an empty batch.
	pub fn evict(&mut self, id: &ClientId, server_time: u64) -> bool {
		self.fulfill(id, Vec::new(), server_time)
	}

	/// Drop the slot without sending, but only if it still belongs to `token`.
	pub fn release(&mut self, id: &ClientId, token: u64) -> bool {
		match self.parked.get(id) {
			Some(p) if p.token == token => {
				self.parked.remove(id);
				true
			}
			_ => false,
		}
	}

	pub fn is_parked(&self, id: &ClientId) -> bool {
		self.parked.contains_key(id)
	}

	/// Parked and the poller is still waiting on the other end.
	pub fn is_listening(&self, id: &ClientId) -> bool {
		self.parked.get(id).map(|p| !p.tx.is_closed()).unwrap_or(false)
	}

	pub fn parked_count(&self) -> usize {
		self.parked.len()
	}

	/// Deliver an outbox. Returns the number of clients that received a batch.
	pub fn deliver(&mut self, outbox: Outbox, server_time: u64) -> usize {
		let mut delivered = 0usize;
		let mut dropped = 0u64;

		for (to, events) in outbox.into_batches() {
			let n = events.len() as u64;
			if self.fulfill(&to, events, server_time) {
				delivered += 1;
			} else {
				dropped += n;
			}
		}

		if dropped > 0 {
			metrics::counter!("lobby_server_events_dropped_total").increment(dropped);
		}

		delivered
	}

	/// Resolve (empty) every parked response whose owner is gone.
	pub fn retain_owners(&mut self, mut is_owner: impl FnMut(&ClientId) -> bool, server_time: u64) -> usize {
		let orphans: Vec<ClientId> = self.parked.keys().filter(|id| !is_owner(id)).cloned().collect();
		for id in &orphans {
			self.evict(id, server_time);
		}
		orphans.len()
	}

	/// Drop slots whose poller has gone away (HTTP client disconnected).
	pub fn drop_abandoned(&mut self) -> usize {
		let before = self.parked.len();
		self.parked.retain(|_, p| !p.tx.is_closed());
		before - self.parked.len()
	}

	/// Resolve (empty) slots parked before `cutoff`.
	pub fn evict_parked_before(&mut self, cutoff: Instant, server_time: u64) -> usize {
		let old: Vec<ClientId> = self
			.parked
			.iter()
			.filter(|(_, p)| p.parked_at < cutoff)
			.map(|(id, _)| id.clone())
			.collect();
		for id in &old {
			self.evict(id, server_time);
		}
		old.len()
	}
}
