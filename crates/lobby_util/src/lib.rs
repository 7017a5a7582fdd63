#![forbid(unsafe_code)]

//! Bind address parsing for `--bind` and `server.bind`.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
	#[error("bind address must be non-empty (expected http://host:port)")]
	Empty,

	#[error("TLS is terminated upstream; bind with http://host:port: {0}")]
	Tls(String),

	#[error("bind address must not carry a path, query or fragment: {0}")]
	HasPath(String),

	#[error("bind host must be an IP literal with a port 1..=65535 (IPv6 bracketed like [::1]:8080): {0}")]
	NotSocketAddr(String),
}

/// Parse `http://ip:port` (scheme optional) into a socket address.
pub fn parse_bind(s: &str) -> Result<SocketAddr, BindError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(BindError::Empty);
	}
	if s.starts_with("https://") {
		return Err(BindError::Tls(s.to_string()));
	}

	let rest = s.strip_prefix("http://").unwrap_or(s);
	if rest.contains(['/', '?', '#']) {
		return Err(BindError::HasPath(s.to_string()));
	}

	match rest.parse::<SocketAddr>() {
		Ok(addr) if addr.port() != 0 => Ok(addr),
		_ => Err(BindError::NotSocketAddr(s.to_string())),
	}
}
