#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use lobby_domain::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

use crate::server::hub::HubConfig;

pub const DEFAULT_BIND: &str = "http://127.0.0.1:8080";

const DEFAULT_POLL_TIMEOUT_SECS: u64 = 25;
const MAX_POLL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MODERATOR_TIMEOUT_SECS: u64 = 180;
const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;
const DEFAULT_HISTORY_CAPACITY: usize = 100;
const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024;
const DEFAULT_MAX_DISPLAY_NAME_BYTES: usize = 512;
const DEFAULT_MESSAGE_BURST: u32 = 10;
const DEFAULT_MESSAGES_PER_MINUTE: u32 = 120;

/// Default config path: `~/.lobby/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".lobby").join("config.toml"))
}

/// Load the server config from TOML (missing file means defaults) and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);
	apply_env_overrides_with(&mut cfg, |key| std::env::var(key).ok());
	cfg.normalize();

	Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub presence: PresenceSettings,
	pub rooms: RoomSettings,
	pub limits: LimitSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// HTTP bind endpoint (`http://host:port`).
	pub bind: String,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Shared secret for activation and promotion. Without it the server can never activate.
	pub moderator_password: Option<SecretString>,
	pub poll_timeout: Duration,
	pub max_body_bytes: usize,
	pub max_message_bytes: usize,
	pub max_display_name_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct PresenceSettings {
	pub client_timeout: Duration,
	pub moderator_timeout: Duration,
	pub pending_timeout: Duration,
	pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RoomSettings {
	pub history_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct LimitSettings {
	/// Send-message burst per client; 0 disables limiting.
	pub message_burst: u32,
	pub messages_per_minute: u32,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self::from_file(FileConfig::default())
	}
}

impl ServerConfig {
	pub fn to_hub_config(&self) -> HubConfig {
		HubConfig {
			history_capacity: self.rooms.history_capacity,
			client_timeout: self.presence.client_timeout,
			moderator_timeout: self.presence.moderator_timeout,
			pending_timeout: self.presence.pending_timeout,
			poll_timeout: self.server.poll_timeout,
			max_message_bytes: self.server.max_message_bytes,
			max_display_name_bytes: self.server.max_display_name_bytes,
			message_burst: self.limits.message_burst,
			messages_per_minute: self.limits.messages_per_minute,
			moderator_password: self.server.moderator_password.clone(),
		}
	}

	fn from_file(file: FileConfig) -> Self {
		let secs = |v: Option<u64>, default: u64| Duration::from_secs(v.unwrap_or(default));

		Self {
			server: ServerSettings {
				bind: file
					.server
					.bind
					.filter(|s| !s.trim().is_empty())
					.unwrap_or_else(|| DEFAULT_BIND.to_string()),
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				moderator_password: file
					.server
					.moderator_password
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				poll_timeout: secs(file.server.poll_timeout_secs, DEFAULT_POLL_TIMEOUT_SECS),
				max_body_bytes: file
					.server
					.max_body_bytes
					.unwrap_or(lobby_protocol::DEFAULT_MAX_BODY_SIZE),
				max_message_bytes: file.server.max_message_bytes.unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
				max_display_name_bytes: file
					.server
					.max_display_name_bytes
					.unwrap_or(DEFAULT_MAX_DISPLAY_NAME_BYTES),
			},
			presence: PresenceSettings {
				client_timeout: secs(file.presence.client_timeout_secs, DEFAULT_CLIENT_TIMEOUT_SECS),
				moderator_timeout: secs(file.presence.moderator_timeout_secs, DEFAULT_MODERATOR_TIMEOUT_SECS),
				pending_timeout: secs(file.presence.pending_timeout_secs, DEFAULT_PENDING_TIMEOUT_SECS),
				sweep_interval: secs(file.presence.sweep_interval_secs, DEFAULT_SWEEP_INTERVAL_SECS),
			},
			rooms: RoomSettings {
				history_capacity: file.rooms.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY),
			},
			limits: LimitSettings {
				message_burst: file.limits.message_burst.unwrap_or(DEFAULT_MESSAGE_BURST),
				messages_per_minute: file.limits.messages_per_minute.unwrap_or(DEFAULT_MESSAGES_PER_MINUTE),
			},
		}
	}

	/// Replace zero durations and sizes with defaults; keep moderators at least as patient as clients.
	fn normalize(&mut self) {
		fn nonzero(name: &str, v: &mut Duration, default_secs: u64) {
			if v.is_zero() {
				warn!(setting = name, default_secs, "config: zero duration; using default");
				*v = Duration::from_secs(default_secs);
			}
		}

		nonzero("poll_timeout", &mut self.server.poll_timeout, DEFAULT_POLL_TIMEOUT_SECS);
		nonzero("client_timeout", &mut self.presence.client_timeout, DEFAULT_CLIENT_TIMEOUT_SECS);
		nonzero(
			"moderator_timeout",
			&mut self.presence.moderator_timeout,
			DEFAULT_MODERATOR_TIMEOUT_SECS,
		);
		nonzero("pending_timeout", &mut self.presence.pending_timeout, DEFAULT_PENDING_TIMEOUT_SECS);
		nonzero("sweep_interval", &mut self.presence.sweep_interval, DEFAULT_SWEEP_INTERVAL_SECS);

		if self.rooms.history_capacity == 0 {
			warn!("config: history_capacity is 0; using default");
			self.rooms.history_capacity = DEFAULT_HISTORY_CAPACITY;
		}

		if self.presence.moderator_timeout < self.presence.client_timeout {
			warn!(
				client_secs = self.presence.client_timeout.as_secs(),
				moderator_secs = self.presence.moderator_timeout.as_secs(),
				"config: moderator_timeout < client_timeout; swapping"
			);
			std::mem::swap(&mut self.presence.moderator_timeout, &mut self.presence.client_timeout);
		}

		let max_poll = Duration::from_secs(MAX_POLL_TIMEOUT_SECS);
		if self.server.poll_timeout > max_poll {
			warn!(
				poll_secs = self.server.poll_timeout.as_secs(),
				max_secs = MAX_POLL_TIMEOUT_SECS,
				"config: poll_timeout too large; clamping"
			);
			self.server.poll_timeout = max_poll;
		}

		// A client waiting in a poll must not look idle to the sweeper.
		if self.server.poll_timeout >= self.presence.client_timeout {
			let clamped = self.presence.client_timeout / 2;
			warn!(
				poll_secs = self.server.poll_timeout.as_secs(),
				client_secs = self.presence.client_timeout.as_secs(),
				"config: poll_timeout >= client_timeout; using half the client timeout"
			);
			self.server.poll_timeout = clamped;
		}

		if self.server.moderator_password.is_none() {
			warn!("config: no moderator_password configured; the server cannot be activated");
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	presence: FilePresenceSettings,

	#[serde(default)]
	rooms: FileRoomSettings,

	#[serde(default)]
	limits: FileLimitSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	bind: Option<String>,
	metrics_bind: Option<String>,
	moderator_password: Option<String>,
	poll_timeout_secs: Option<u64>,
	max_body_bytes: Option<usize>,
	max_message_bytes: Option<usize>,
	max_display_name_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePresenceSettings {
	client_timeout_secs: Option<u64>,
	moderator_timeout_secs: Option<u64>,
	pending_timeout_secs: Option<u64>,
	sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRoomSettings {
	history_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileLimitSettings {
	message_burst: Option<u32>,
	messages_per_minute: Option<u32>,
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

/// Apply `LOBBY_*` overrides using `lookup` to read variables.
fn apply_env_overrides_with(cfg: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
	let string = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
	let secs = |key: &str| string(key).and_then(|v| v.parse::<u64>().ok());

	if let Some(v) = string("LOBBY_BIND") {
		cfg.server.bind = v;
		info!("server config: bind overridden by env");
	}

	if let Some(v) = string("LOBBY_METRICS_BIND") {
		cfg.server.metrics_bind = Some(v);
		info!("server config: metrics_bind overridden by env");
	}

	if let Some(v) = string("LOBBY_MODERATOR_PASSWORD") {
		cfg.server.moderator_password = Some(SecretString::new(v));
		info!("server config: moderator_password overridden by env");
	}

	if let Some(s) = secs("LOBBY_POLL_TIMEOUT_SECS") {
		cfg.server.poll_timeout = Duration::from_secs(s);
		info!(secs = s, "server config: poll_timeout overridden by env");
	}

	if let Some(s) = secs("LOBBY_CLIENT_TIMEOUT_SECS") {
		cfg.presence.client_timeout = Duration::from_secs(s);
		info!(secs = s, "presence config: client_timeout overridden by env");
	}

	if let Some(s) = secs("LOBBY_MODERATOR_TIMEOUT_SECS") {
		cfg.presence.moderator_timeout = Duration::from_secs(s);
		info!(secs = s, "presence config: moderator_timeout overridden by env");
	}

	if let Some(s) = secs("LOBBY_PENDING_TIMEOUT_SECS") {
		cfg.presence.pending_timeout = Duration::from_secs(s);
		info!(secs = s, "presence config: pending_timeout overridden by env");
	}

	if let Some(s) = secs("LOBBY_SWEEP_INTERVAL_SECS") {
		cfg.presence.sweep_interval = Duration::from_secs(s);
		info!(secs = s, "presence config: sweep_interval overridden by env");
	}

	if let Some(v) = string("LOBBY_HISTORY_CAPACITY")
		&& let Ok(capacity) = v.parse::<usize>()
	{
		cfg.rooms.history_capacity = capacity;
		info!(capacity, "rooms config: history_capacity overridden by env");
	}

	if let Some(v) = string("LOBBY_MESSAGE_BURST")
		&& let Ok(burst) = v.parse::<u32>()
	{
		cfg.limits.message_burst = burst;
		info!(burst, "limits config: message_burst overridden by env");
	}

	if let Some(v) = string("LOBBY_MESSAGES_PER_MINUTE")
		&& let Ok(rate) = v.parse::<u32>()
	{
		cfg.limits.messages_per_minute = rate;
		info!(rate, "limits config: messages_per_minute overridden by env");
	}
}
