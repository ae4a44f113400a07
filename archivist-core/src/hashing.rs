//! Content addressing.
//!
//! Two records sharing a hash are duplicates regardless of path. Hashes are
//! also how the watcher recognises a file it already knows under another
//! name.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .as_bytes()
            .iter()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable_hex() {
        let hash = content_hash(b"abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(is_valid_hash(&hash));
        assert!(!is_valid_hash("xyz"));
    }
}
