//! BLAKE2b content hashing (§3 invariant 1, §4 "Crypto primitives").

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use openodin_core::Id;

type Blake2b256 = Blake2b<U32>;

/// `H(bytes)` — the hash function used for `id1`, `uniquehash`,
/// `transienthash`, achilles hashes, and blob fragment hashing.
pub fn hash(bytes: &[u8]) -> Id {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// `H(a, b, ...)` — multi-part hashing without an intermediate
/// concatenation allocation, used for `uniquehash = H(owner, id, contentType, ...)`.
pub fn hash_parts(parts: &[&[u8]]) -> Id {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash(b"hello"), hash(b"hello"));
        assert_ne!(hash(b"hello"), hash(b"world"));
    }

    #[test]
    fn parts_match_concatenation() {
        let mut concat = Vec::new();
        concat.extend_from_slice(b"abc");
        concat.extend_from_slice(b"def");
        assert_eq!(hash(&concat), hash_parts(&[b"abc", b"def"]));
    }

    #[test]
    fn s4_blob_hash_example() {
        // S4: blobHash = H("Hello World"), split across two writes.
        let whole = hash(b"Hello World");
        let mut buf = Vec::new();
        buf.extend_from_slice(b"Hello ");
        buf.extend_from_slice(b"World");
        assert_eq!(hash(&buf), whole);
    }
}
