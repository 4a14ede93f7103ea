//! Artifact fingerprints.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`, 64 characters.
pub fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}
