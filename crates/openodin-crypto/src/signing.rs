//! Sign/verify over the two owner key types the corpus this core is
//! modeled on supports side by side (§9 open question: "implement the
//! superset").

use ed25519_dalek::{Signer as _, SigningKey as DalekSigningKey, Verifier as _};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{
    Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey as K256VerifyingKey,
};

use openodin_core::{Error, KeyType, PublicKey, Result, Signature};

/// A local secret key, kept only inside the offloader's key registry —
/// never serialized into a `Node`.
#[derive(Clone)]
pub enum SecretKey {
    Ed25519(Box<DalekSigningKey>),
    Secp256k1(Box<K256SigningKey>),
}

impl SecretKey {
    pub fn generate(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Ed25519 => {
                let mut rng = rand::rngs::OsRng;
                SecretKey::Ed25519(Box::new(DalekSigningKey::generate(&mut rng)))
            }
            KeyType::Secp256k1 => {
                let mut rng = rand::rngs::OsRng;
                SecretKey::Secp256k1(Box::new(K256SigningKey::random(&mut rng)))
            }
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            SecretKey::Ed25519(sk) => PublicKey::Ed25519(sk.verifying_key().to_bytes()),
            SecretKey::Secp256k1(sk) => {
                let point = sk.verifying_key().to_encoded_point(true);
                let mut bytes = [0u8; 33];
                bytes.copy_from_slice(point.as_bytes());
                PublicKey::Secp256k1(bytes)
            }
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            SecretKey::Ed25519(_) => KeyType::Ed25519,
            SecretKey::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    /// Signs `message`. Callers (the offloader) are responsible for
    /// ensuring `message` is a fully-formed node encoding, never an
    /// arbitrary caller-supplied blob (§4.6 sign contract).
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            SecretKey::Ed25519(sk) => {
                let sig = sk.sign(message);
                Signature::Ed25519(sig.to_bytes())
            }
            SecretKey::Secp256k1(sk) => {
                let digest = crate::hash::hash(message);
                let sig: K256Signature = sk
                    .sign_prehash(&digest)
                    .expect("secp256k1 signing over a 32-byte digest cannot fail");
                let mut out = [0u8; 64];
                out.copy_from_slice(&sig.to_bytes());
                Signature::Secp256k1(out)
            }
        }
    }
}

/// Verifies `signature` over `message` under `public_key`. Used both by
/// the synchronous single-node path and by offloader workers batching
/// many verifications.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    match (public_key, signature) {
        (PublicKey::Ed25519(pk_bytes), Signature::Ed25519(sig_bytes)) => {
            let vk = ed25519_dalek::VerifyingKey::from_bytes(pk_bytes)
                .map_err(|e| Error::crypto(format!("invalid ed25519 public key: {e}")))?;
            let sig = ed25519_dalek::Signature::from_bytes(sig_bytes);
            vk.verify(message, &sig)
                .map_err(|e| Error::crypto(format!("ed25519 verification failed: {e}")))
        }
        (PublicKey::Secp256k1(pk_bytes), Signature::Secp256k1(sig_bytes)) => {
            let vk = K256VerifyingKey::from_sec1_bytes(pk_bytes)
                .map_err(|e| Error::crypto(format!("invalid secp256k1 public key: {e}")))?;
            let sig = K256Signature::from_slice(sig_bytes)
                .map_err(|e| Error::crypto(format!("invalid secp256k1 signature: {e}")))?;
            let digest = crate::hash::hash(message);
            vk.verify_prehash(&digest, &sig)
                .map_err(|e| Error::crypto(format!("secp256k1 verification failed: {e}")))
        }
        _ => Err(Error::crypto("public key and signature type mismatch")),
    }
}
