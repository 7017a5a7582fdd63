#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::time::Duration;

use lobby_domain::{ClientId, DisplayName};
use lobby_protocol::Member;
use tokio::time::Instant;

/// A connected identity.
#[derive(Debug, Clone)]
pub struct ClientSession {
	pub id: ClientId,
	pub display_name: DisplayName,
	pub is_moderator: bool,
	/// Hidden moderators are left out of member lists and join-request fan-out.
	pub is_hidden: bool,
	pub joined_at: Instant,
	pub last_liveness: Instant,
}

impl ClientSession {
	pub fn idle_for(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.last_liveness)
	}

	pub fn member(&self) -> Member {
		Member {
			client_id: self.id.clone(),
			username: self.display_name.clone(),
			is_moderator: self.is_moderator,
		}
	}
}

/// Registry of live sessions keyed by client id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
	sessions: HashMap<ClientId, ClientSession>,
}

impl SessionRegistry {
	pub fn register(&mut self, id: ClientId, display_name: DisplayName, is_moderator: bool, now: Instant) -> &ClientSession {
		let session = ClientSession {
			id: id.clone(),
			display_name,
			is_moderator,
			is_hidden: false,
			joined_at: now,
			last_liveness: now,
		};
		self.sessions.insert(id.clone(), session);
		metrics::gauge!("lobby_server_sessions").set(self.sessions.len() as f64);
		&self.sessions[&id]
	}

	pub fn get(&self, id: &ClientId) -> Option<&ClientSession> {
		self.sessions.get(id)
	}

	pub fn get_mut(&mut self, id: &ClientId) -> Option<&mut ClientSession> {
		self.sessions.get_mut(id)
	}

	pub fn contains(&self, id: &ClientId) -> bool {
		self.sessions.contains_key(id)
	}

	/// Record liveness. Returns `false` for unknown ids.
	pub fn heartbeat(&mut self, id: &ClientId, now: Instant) -> bool {
		match self.sessions.get_mut(id) {
			Some(s) => {
				s.last_liveness = now;
				true
			}
			None => false,
		}
	}

	pub fn remove(&mut self, id: &ClientId) -> Option<ClientSession> {
		let removed = self.sessions.remove(id);
		metrics::gauge!("lobby_server_sessions").set(self.sessions.len() as f64);
		removed
	}

	/// Remove every session.
	pub fn clear(&mut self) -> Vec<ClientSession> {
		let drained = self.sessions.drain().map(|(_, s)| s).collect();
		metrics::gauge!("lobby_server_sessions").set(0.0);
		drained
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &ClientSession> {
		self.sessions.values()
	}

	pub fn ids(&self) -> Vec<ClientId> {
		self.sessions.keys().cloned().collect()
	}

	/// Moderators that should see join requests.
	pub fn visible_moderators(&self) -> Vec<ClientId> {
		self.sessions
			.values()
			.filter(|s| s.is_moderator && !s.is_hidden)
			.map(|s| s.id.clone())
			.collect()
	}

	/// Sessions whose liveness exceeds their class timeout.
	pub fn stale(&self, now: Instant, client_timeout: Duration, moderator_timeout: Duration) -> Vec<ClientId> {
		self.sessions
			.values()
			.filter(|s| {
				let limit = if s.is_moderator { moderator_timeout } else { client_timeout };
				s.idle_for(now) > limit
			})
			.map(|s| s.id.clone())
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn name(s: &str) -> DisplayName {
		DisplayName::new(s).unwrap()
	}

	#[test]
	fn heartbeat_updates_liveness_only_for_known_ids() {
		let mut reg = SessionRegistry::default();
		let t0 = Instant::now();
		let id = ClientId::generate();
		reg.register(id.clone(), name("a"), false, t0);

		let later = t0 + Duration::from_secs(5);
		assert!(reg.heartbeat(&id, later));
		assert_eq!(reg.get(&id).unwrap().last_liveness, later);
		assert!(!reg.heartbeat(&ClientId::generate(), later));
	}

	#[test]
	fn stale_uses_class_specific_timeouts() {
		let mut reg = SessionRegistry::default();
		let t0 = Instant::now();
		let client = ClientId::generate();
		let moderator = ClientId::generate();
		reg.register(client.clone(), name("c"), false, t0);
		reg.register(moderator.clone(), name("m"), true, t0);

		let now = t0 + Duration::from_secs(90);
		let stale = reg.stale(now, Duration::from_secs(60), Duration::from_secs(120));
		assert_eq!(stale, vec![client]);

		let now = t0 + Duration::from_secs(121);
		let mut stale = reg.stale(now, Duration::from_secs(60), Duration::from_secs(120));
		stale.sort();
		assert_eq!(stale.len(), 2);
	}

	#[test]
	fn hidden_moderators_are_not_visible() {
		let mut reg = SessionRegistry::default();
		let t0 = Instant::now();
		let a = ClientId::generate();
		let b = ClientId::generate();
		reg.register(a.clone(), name("a"), true, t0);
		reg.register(b.clone(), name("b"), true, t0);
		reg.get_mut(&b).unwrap().is_hidden = true;

		assert_eq!(reg.visible_moderators(), vec![a]);
	}
}
