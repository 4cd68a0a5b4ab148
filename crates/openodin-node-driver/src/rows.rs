//! Maps a [`Node`] onto the `nodes` table's indexed columns and its
//! opaque `encoded` blob. Filters over fields that aren't indexed columns
//! are evaluated in Rust against the decoded node (§4.2 step 2d) rather
//! than translated into dynamic SQL — the corpus's own SQL glue
//! (`holochain_state`'s mutations module, grounding this crate's
//! `prepare_cached` usage) always hand-writes a fixed statement per
//! concern rather than building ad-hoc query strings, which this mirrors
//! by keeping SQL fixed and pushing per-field predicates to application
//! code.

use rusqlite::Row;

use openodin_core::{Error, Id, Node, Result, ZERO_ID};
use openodin_crypto::hash_parts;

pub fn bumphash(node: &Node) -> Id {
    hash_parts(&[&node.id1, &node.parent_id])
}

pub struct NodeRow {
    pub id1: Id,
    pub id2: Option<Id>,
    pub parent_id: Id,
    pub owner: Vec<u8>,
    pub creation_time: u64,
    pub expire_time: Option<u64>,
    pub storage_time: u64,
    pub trail_update_time: u64,
    pub region: Option<[u8; 2]>,
    pub jurisdiction: Option<[u8; 2]>,
    pub node_type: Vec<u8>,
    pub is_public: bool,
    pub is_licensed: bool,
    pub bumphash: Id,
    pub uniquehash: Id,
    pub transienthash: Id,
    pub encoded: Vec<u8>,
}

impl NodeRow {
    pub fn from_node(
        node: &Node,
        uniquehash: Id,
        transienthash: Id,
        storage_time: u64,
        encoded: Vec<u8>,
    ) -> Self {
        Self {
            id1: node.id1,
            id2: node.id2,
            parent_id: node.parent_id,
            owner: owner_bytes(node),
            creation_time: node.creation_time,
            expire_time: node.expire_time,
            storage_time,
            trail_update_time: storage_time,
            region: node.region,
            jurisdiction: node.jurisdiction,
            node_type: node.node_type.clone(),
            is_public: node.flags.is_public,
            is_licensed: node.flags.is_licensed,
            bumphash: bumphash(node),
            uniquehash,
            transienthash,
            encoded,
        }
    }
}

/// Owner bytes tagged with key type so owners of different key types
/// never collide in the `owner` column.
pub fn owner_bytes(node: &Node) -> Vec<u8> {
    public_key_bytes(&node.owner)
}

pub fn public_key_bytes(pk: &openodin_core::PublicKey) -> Vec<u8> {
    let mut out = vec![pk.key_type().tag()];
    out.extend_from_slice(pk.as_bytes());
    out
}

pub fn decode_public_key(bytes: &[u8]) -> Result<openodin_core::PublicKey> {
    if bytes.is_empty() {
        return Err(Error::internal("empty public key column"));
    }
    let key_type = openodin_core::KeyType::from_tag(bytes[0])?;
    openodin_core::PublicKey::from_type_and_bytes(key_type, &bytes[1..])
}

pub fn decode_node_from_row(row: &Row) -> rusqlite::Result<Node> {
    let encoded: Vec<u8> = row.get("encoded")?;
    openodin_codec::decode_node(&encoded).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::other(e.to_string())),
        )
    })
}

pub fn id_or_zero(id: Option<Id>) -> Id {
    id.unwrap_or(ZERO_ID)
}
