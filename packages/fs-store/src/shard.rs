//! Hash sharding of keys into directory prefixes.

use cairn_store::KeyPath;
use sha2::{Digest, Sha256};

pub(crate) const DEFAULT_LEVELS: usize = 2;

/// Two hex characters per level, out of a 64-character digest.
pub(crate) const MAX_LEVELS: usize = 32;

/// Prefix `key` with `levels` directories taken from the SHA-256 of its
/// normalized form, so `a/b` becomes something like `3f/a9/a/b`.
pub(crate) fn shard(key: &KeyPath, levels: usize) -> KeyPath {
    if levels == 0 {
        return key.clone();
    }
    let digest = Sha256::digest(key.to_string().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    let prefix: Vec<&str> = (0..levels.min(MAX_LEVELS))
        .map(|i| &hex[2 * i..2 * i + 2])
        .collect();
    match cairn_store::Key::from(prefix.join("/")).normalize() {
        Ok(prefix) => prefix.join(key),
        Err(_) => key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_store::Key;

    fn path(key: &str) -> KeyPath {
        Key::from(key).normalize().unwrap()
    }

    #[test]
    fn prefixes_are_stable_hex_pairs() {
        let sharded = shard(&path("a/b"), 2);
        assert_eq!(sharded.len(), 4);
        assert_eq!(&sharded.segments()[2..], ["a", "b"]);
        for segment in &sharded.segments()[..2] {
            assert_eq!(segment.len(), 2);
            assert!(segment.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert_eq!(shard(&path("a/b"), 2), sharded);
    }

    #[test]
    fn digest_of_known_key() {
        // sha256("test") = 9f86d081...
        let sharded = shard(&path("test"), 3);
        assert_eq!(sharded.to_string(), "9f/86/d0/test");
    }

    #[test]
    fn equivalent_keys_land_together() {
        let a = shard(&Key::from(("x", "y")).normalize().unwrap(), 2);
        let b = shard(&path("x/y"), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_levels_is_identity() {
        assert_eq!(shard(&path("k"), 0), path("k"));
    }
}
