//! Deterministic binary encoding for `Node` (§3 invariant 1, §9 "define a
//! dedicated binary codec module with deterministic encoding... forbid
//! implicit conversions at call sites").
//!
//! The wire format is a bincode encoding of the node's fields. Hash
//! derivation always goes through [`canonical_bytes`], which excludes
//! signatures and transient metadata — the only two parts of a node that
//! may legitimately change after the node is created.

use serde::{Deserialize, Serialize};

use openodin_core::{Error, Id, Node, Result};
use openodin_crypto::hash_parts;

/// The subset of a node's fields that determine its identity. Excludes
/// `signatures` and `transient` per §3 invariant 1 and the "Mutate"
/// lifecycle rule (transient changes do not change `id1`).
#[derive(Debug, Serialize, Deserialize)]
struct CanonicalView<'a> {
    id2: &'a Option<Id>,
    parent_id: &'a Id,
    owner: &'a openodin_core::PublicKey,
    creation_time: u64,
    expire_time: &'a Option<u64>,
    region: &'a Option<[u8; 2]>,
    jurisdiction: &'a Option<[u8; 2]>,
    flags: &'a openodin_core::NodeFlags,
    node_type: &'a [u8],
    content_type: &'a Option<String>,
    data: &'a [u8],
    blob_hash: &'a Option<Id>,
    blob_length: &'a Option<u64>,
    copied_id1: &'a Option<Id>,
    difficulty: &'a Option<u8>,
    nonce: &'a Option<u64>,
    license: &'a Option<openodin_core::LicenseData>,
    friend_cert: &'a Option<openodin_core::FriendCertData>,
    certs: &'a [openodin_core::Cert],
    achilles_hashes: &'a [Id],
    destroy_hashes: &'a [Id],
}

fn canonical_view(node: &Node) -> CanonicalView<'_> {
    CanonicalView {
        id2: &node.id2,
        parent_id: &node.parent_id,
        owner: &node.owner,
        creation_time: node.creation_time,
        expire_time: &node.expire_time,
        region: &node.region,
        jurisdiction: &node.jurisdiction,
        flags: &node.flags,
        node_type: &node.node_type,
        content_type: &node.content_type,
        data: &node.data,
        blob_hash: &node.blob_hash,
        blob_length: &node.blob_length,
        copied_id1: &node.copied_id1,
        difficulty: &node.difficulty,
        nonce: &node.nonce,
        license: &node.license,
        friend_cert: &node.friend_cert,
        certs: &node.certs,
        achilles_hashes: &node.achilles_hashes,
        destroy_hashes: &node.destroy_hashes,
    }
}

/// Bytes hashed to produce `id1` — everything except signatures and
/// transient metadata.
pub fn canonical_bytes(node: &Node) -> Result<Vec<u8>> {
    bincode::serialize(&canonical_view(node))
        .map_err(|e| Error::serialization(format!("canonical encoding failed: {e}")))
}

/// `id1 = H(canonical_encoding_excluding_signatures_and_transient)`
/// (§3 invariant 1).
pub fn compute_id1(node: &Node) -> Result<Id> {
    Ok(openodin_crypto::hash(&canonical_bytes(node)?))
}

/// `uniquehash = H(owner, id, contentType, ...)` (§3 invariant 3). Folding
/// in `node_type` and `id2` as well so that distinct logical variants
/// never collide on uniqueness — an explicit choice recorded in
/// DESIGN.md since the distilled spec leaves the "..." unspecified.
pub fn compute_uniquehash(node: &Node) -> Id {
    let content_type = node.content_type.as_deref().unwrap_or("").as_bytes();
    let id2 = node.id2.unwrap_or_default();
    hash_parts(&[
        node.owner.as_bytes(),
        &node.id1,
        &id2,
        content_type,
        &node.node_type,
    ])
}

/// Hash of the mutable transient metadata (§3 "Transient").
pub fn compute_transienthash(node: &Node) -> Result<Id> {
    let bytes = bincode::serialize(&node.transient)
        .map_err(|e| Error::serialization(format!("transient encoding failed: {e}")))?;
    Ok(openodin_crypto::hash(&bytes))
}

/// The message every node signature is computed over (§3 "Signatures").
/// Signing the 32-byte `id1` rather than the full canonical encoding keeps
/// offloader batches small regardless of payload size.
pub fn hash_to_sign(node: &Node) -> Result<Id> {
    compute_id1(node)
}

/// The full wire encoding, including signatures and transient state.
pub fn encode_node(node: &Node) -> Result<Vec<u8>> {
    bincode::serialize(node).map_err(|e| Error::serialization(format!("encode failed: {e}")))
}

/// Single decoder entry point. Aliased as [`unpack_node`] so both of the
/// call-site names the source corpus used (`UnpackNode` / `Decoder.DecodeNode`)
/// resolve to the same implementation (§9 open question).
pub fn decode_node(bytes: &[u8]) -> Result<Node> {
    bincode::deserialize(bytes).map_err(|e| Error::malformed(format!("decode failed: {e}")))
}

/// Alias for [`decode_node`] — see its doc comment.
pub fn unpack_node(bytes: &[u8]) -> Result<Node> {
    decode_node(bytes)
}
