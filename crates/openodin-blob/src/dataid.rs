//! `dataid = H(node_id1, sourcePublicKey)` isolates fragments per writer
//! (§4.5) so two peers writing the same node's blob never collide.

use openodin_core::{Id, PublicKey};
use openodin_crypto::hash_parts;

pub fn compute_dataid(node_id1: &Id, source_public_key: &PublicKey) -> Id {
    hash_parts(&[node_id1, source_public_key.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::KeyType;
    use openodin_crypto::SecretKey;

    #[test]
    fn isolates_per_writer() {
        let node_id1 = [1u8; 32];
        let a = SecretKey::generate(KeyType::Ed25519).public_key();
        let b = SecretKey::generate(KeyType::Ed25519).public_key();
        assert_ne!(compute_dataid(&node_id1, &a), compute_dataid(&node_id1, &b));
    }

    #[test]
    fn deterministic() {
        let node_id1 = [3u8; 32];
        let pk = SecretKey::generate(KeyType::Ed25519).public_key();
        assert_eq!(
            compute_dataid(&node_id1, &pk),
            compute_dataid(&node_id1, &pk)
        );
    }
}
