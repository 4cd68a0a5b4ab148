//! Node, Cert and License data model (§3).

use serde::{Deserialize, Serialize};

use crate::ids::{Id, PublicKey, Signature, ZERO_ID};

/// Boolean attributes carried by every node (§3). Kept as named fields
/// rather than a packed bitset — the codec is what cares about the wire
/// representation, not this in-memory struct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    pub is_public: bool,
    pub is_licensed: bool,
    pub is_leaf: bool,
    pub is_indestructible: bool,
    pub disallow_parent_licensing: bool,
    pub has_online_id: bool,
    pub is_online_id_validated: bool,
}

/// Per-storage mutable metadata. Not part of `id1`; included in
/// `transienthash` (§3 invariant 3, lifecycle "Mutate").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transient {
    pub is_online_id_validated: Option<bool>,
    pub storage_time: Option<u64>,
}

/// A signature attached to a node, one of possibly several co-signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// License data embedded in a node with `content_type == "license"`
/// (§3 "License"). Modeled as a first-class field on `Node` rather than an
/// opaque payload blob so the node driver can derive `licensing_hashes`
/// without a second decode pass — an explicit choice recorded in
/// DESIGN.md against the open question on license-chain semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseData {
    /// The node (or subtree root) this license grants access to.
    pub target_id1: Id,
    /// The key being granted access (the licensee).
    pub target_public_key: PublicKey,
    /// Maximum parent-chain distance the license extends over (subtree
    /// licensing); `0` means "this node only".
    pub max_distance: u32,
    pub disallow_retro_licensing: bool,
    pub restrictive_mode_writer: bool,
    pub restrictive_mode_manager: bool,
}

/// A friend cert linking two owners for cross-owner licensing paths
/// (§3 "Friend cert", GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendCertData {
    pub other_owner: PublicKey,
    pub constraints: Vec<CertConstraint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertType {
    Auth,
    Friend,
    Sign,
    Chain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertConstraint {
    pub key: String,
    pub value: CertValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertValue {
    Bytes(Vec<u8>),
    Text(String),
    Number(i64),
}

/// A signed delegation object. Validation is recursive through `parent` up
/// to a self-signed root (§3 "Cert").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cert {
    pub id1: Id,
    pub cert_type: CertType,
    pub owner: PublicKey,
    pub target: Option<PublicKey>,
    pub constraints: Vec<CertConstraint>,
    pub creation_time: u64,
    pub expire_time: Option<u64>,
    pub parent: Option<Box<Cert>>,
    pub signature: Signature,
}

impl Cert {
    /// True at the root of a chain: a cert is self-signed when its own
    /// owner is the signer and it carries no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Walks the chain depth, root = 0.
    pub fn chain_len(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.chain_len())
    }
}

/// An immutable, signed record (§3 "Node").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id1: Id,
    pub id2: Option<Id>,
    pub parent_id: Id,
    pub owner: PublicKey,
    pub creation_time: u64,
    pub expire_time: Option<u64>,
    pub region: Option<[u8; 2]>,
    pub jurisdiction: Option<[u8; 2]>,
    pub flags: NodeFlags,
    pub node_type: Vec<u8>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    pub blob_hash: Option<Id>,
    pub blob_length: Option<u64>,
    /// Set when this node's blob payload is a duplicate of another node's
    /// already-stored blob (§3 FULL: `copiedId1`).
    pub copied_id1: Option<Id>,
    pub difficulty: Option<u8>,
    pub nonce: Option<u64>,
    pub license: Option<LicenseData>,
    pub friend_cert: Option<FriendCertData>,
    pub certs: Vec<Cert>,
    /// Hashes that, if ever asserted by a `destroy_hashes` entry, kill this
    /// node (§3 "Achilles hash", GLOSSARY).
    pub achilles_hashes: Vec<Id>,
    /// Hashes this node asserts as destroy tokens against any node
    /// carrying a matching achilles hash (§3 auxiliary table
    /// `destroy_hashes`, lifecycle "Destroy").
    pub destroy_hashes: Vec<Id>,
    pub signatures: Vec<NodeSignature>,
    pub transient: Transient,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id == ZERO_ID
    }

    pub fn has_blob(&self) -> bool {
        self.blob_hash.is_some()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expire_time, Some(t) if t <= now_ms)
    }

    /// §3 invariant 2 (time bound only; signature/hash checks live in the
    /// codec and crypto crates which have access to the raw encoding).
    pub fn within_clock_tolerance(&self, now_ms: u64, tolerance_ms: u64) -> bool {
        self.creation_time <= now_ms.saturating_add(tolerance_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node() -> Node {
        Node {
            id1: [1u8; 32],
            id2: None,
            parent_id: ZERO_ID,
            owner: PublicKey::Ed25519([2u8; 32]),
            creation_time: 1000,
            expire_time: Some(11000),
            region: None,
            jurisdiction: None,
            flags: NodeFlags::default(),
            node_type: b"data".to_vec(),
            content_type: None,
            data: vec![],
            blob_hash: None,
            blob_length: None,
            copied_id1: None,
            difficulty: None,
            nonce: None,
            license: None,
            friend_cert: None,
            certs: vec![],
            achilles_hashes: vec![],
            destroy_hashes: vec![],
            signatures: vec![],
            transient: Transient::default(),
        }
    }

    #[test]
    fn root_node_has_zero_parent() {
        assert!(sample_node().is_root());
    }

    #[test]
    fn expiry_is_inclusive() {
        let n = sample_node();
        assert!(!n.is_expired(10_999));
        assert!(n.is_expired(11_000));
        assert!(n.is_expired(11_001));
    }

    #[test]
    fn clock_tolerance_boundary() {
        let n = sample_node();
        assert!(n.within_clock_tolerance(940, 60));
        assert!(!n.within_clock_tolerance(939, 60));
    }
}
