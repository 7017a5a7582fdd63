#![forbid(unsafe_code)]

use lobby_domain::SecretString;
use sha2::{Digest, Sha256};

/// SHA-256 digest of the moderator password. The plaintext is not retained.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest([u8; 32]);

impl std::fmt::Debug for PasswordDigest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("PasswordDigest(<redacted>)")
	}
}

impl PasswordDigest {
	pub fn of(secret: &SecretString) -> Self {
		Self(digest(secret.expose().as_bytes()))
	}

	/// Constant-time check of a candidate password.
	pub fn verify(&self, candidate: &str) -> bool {
		constant_time_eq(&self.0, &digest(candidate.as_bytes()))
	}
}

fn digest(bytes: &[u8]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	hasher.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}

	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}

	diff == 0
}
