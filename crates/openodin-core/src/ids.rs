//! Identifier and key types shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A content hash / node identity. `id1`, `id2`, `parentId`, `uniquehash`,
/// `transienthash` and every auxiliary-table hash are all `Id`.
pub type Id = [u8; 32];

pub const ZERO_ID: Id = [0u8; 32];

pub fn is_zero(id: &Id) -> bool {
    id.iter().all(|b| *b == 0)
}

pub fn hex_encode(id: &Id) -> String {
    hex::encode(id)
}

pub fn hex_decode(s: &str) -> Result<Id> {
    let bytes = hex::decode(s).map_err(|e| Error::malformed(format!("invalid hex id: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::malformed("id must be exactly 32 bytes"))
}

/// Owner/signer public key. The corpus this core is modeled on carries both
/// Ed25519 and secp256k1 variants through the same code paths (§9 open
/// question: "implement the superset").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicKey {
    Ed25519([u8; 32]),
    Secp256k1([u8; 33]),
}

impl PublicKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            PublicKey::Ed25519(_) => KeyType::Ed25519,
            PublicKey::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(b) => b.as_slice(),
            PublicKey::Secp256k1(b) => b.as_slice(),
        }
    }

    pub fn from_type_and_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self> {
        match key_type {
            KeyType::Ed25519 => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::malformed("ed25519 public key must be 32 bytes"))?;
                Ok(PublicKey::Ed25519(arr))
            }
            KeyType::Secp256k1 => {
                let arr: [u8; 33] = bytes
                    .try_into()
                    .map_err(|_| Error::malformed("secp256k1 public key must be 33 bytes"))?;
                Ok(PublicKey::Secp256k1(arr))
            }
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.key_type(), hex::encode(self.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Ed25519 = 0,
    Secp256k1 = 1,
}

impl KeyType {
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(KeyType::Ed25519),
            1 => Ok(KeyType::Secp256k1),
            other => Err(Error::malformed(format!("unknown key type tag {other}"))),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A signature over `hashToSign()`. Ed25519 signatures are fixed 64 bytes;
/// secp256k1 signatures are compact (r || s), also 64 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signature {
    Ed25519([u8; 64]),
    Secp256k1([u8; 64]),
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Signature::Ed25519(b) => b.as_slice(),
            Signature::Secp256k1(b) => b.as_slice(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Signature::Ed25519(_) => KeyType::Ed25519,
            Signature::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    pub fn from_type_and_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::malformed("signature must be 64 bytes"))?;
        Ok(match key_type {
            KeyType::Ed25519 => Signature::Ed25519(arr),
            KeyType::Secp256k1 => Signature::Secp256k1(arr),
        })
    }
}
