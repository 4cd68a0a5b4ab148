//! Ed25519 and secp256k1 sign/verify, plus BLAKE2b content hashing —
//! Layer 2 primitives that the signature offloader batches over.

pub mod hash;
pub mod signing;

pub use hash::{hash, hash_parts};
pub use signing::{verify, SecretKey};
