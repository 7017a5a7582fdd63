#![forbid(unsafe_code)]

use lobby_domain::ClientId;
use tracing::info;

/// Records moderator commands on the `audit` tracing target.
#[derive(Debug, Clone, Default)]
pub struct AuditService {
	disabled: bool,
}

impl AuditService {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn disabled() -> Self {
		Self { disabled: true }
	}

	pub fn record_command(&self, moderator: &ClientId, command_kind: &'static str, target: Option<&str>) {
		if self.disabled {
			return;
		}

		metrics::counter!("lobby_server_moderator_commands_total", "command" => command_kind).increment(1);
		info!(
			target: "audit",
			moderator = %moderator,
			command = command_kind,
			target_id = target.unwrap_or("-"),
			"moderator command"
		);
	}
}
