//! Key registry shared by every worker. `addKeyPair` broadcasts by virtue
//! of all workers holding a clone of the same `Arc<RwLock<..>>` handle —
//! there is exactly one registry, not one copy per worker, which sidesteps
//! the coroutine fan-out anti-pattern called out in §9 while preserving
//! the "every worker learns about new keys" contract.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use openodin_core::PublicKey;
use openodin_crypto::SecretKey;

#[derive(Clone, Default)]
pub struct KeyRegistry {
    inner: Arc<RwLock<HashMap<PublicKey, SecretKey>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key_pair(&self, secret_key: SecretKey) {
        let public_key = secret_key.public_key();
        self.inner.write().insert(public_key, secret_key);
    }

    pub fn remove_key_pair(&self, public_key: &PublicKey) {
        self.inner.write().remove(public_key);
    }

    pub fn get(&self, public_key: &PublicKey) -> Option<SecretKey> {
        self.inner.read().get(public_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::KeyType;

    #[test]
    fn add_and_lookup() {
        let registry = KeyRegistry::new();
        let sk = SecretKey::generate(KeyType::Ed25519);
        let pk = sk.public_key();
        registry.add_key_pair(sk);
        assert!(registry.get(&pk).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clone_shares_state() {
        let registry = KeyRegistry::new();
        let clone = registry.clone();
        let sk = SecretKey::generate(KeyType::Ed25519);
        let pk = sk.public_key();
        registry.add_key_pair(sk);
        // The clone sees the insert immediately: this is the "broadcast".
        assert!(clone.get(&pk).is_some());
    }
}
