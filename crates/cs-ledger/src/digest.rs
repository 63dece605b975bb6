//! SHA-256 helpers shared by block hashing and identity digests

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash arbitrary bytes and return lowercase hex
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Pseudonymous account key for a user identifier
pub fn identity_digest(user_id: &str) -> String {
    sha256_hex(user_id.as_bytes())
}

/// Check that a string looks like a hex-encoded SHA-256 digest
pub fn is_digest(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_digest_is_stable() {
        let a = identity_digest("player-1");
        let b = identity_digest("player-1");
        assert_eq!(a, b);
        assert_ne!(a, identity_digest("player-2"));
        assert!(is_digest(&a));
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_is_digest_rejects_short_values() {
        assert!(!is_digest("0"));
        assert!(!is_digest(&"g".repeat(64)));
    }
}
