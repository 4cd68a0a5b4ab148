//! `redb` table definitions and row encodings for the blob driver.
//!
//! Keys are plain byte concatenations rather than structured redb keys so
//! that range scans over "every fragment/blob row for this id" are cheap
//! prefix scans on the underlying btree, the way the teacher's own
//! `redb`-backed storage adapter keys by a single string (see
//! `ProductionStorage` in the aura agent crate) — here widened to
//! composite keys since fragments and blob rows are addressed by a pair.

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use openodin_core::Id;

pub const FRAGMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blob_data");
pub const BLOBS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blob");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRow {
    pub finalized: bool,
    pub fragment: Vec<u8>,
    pub creationtime: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobRow {
    pub storagetime: u64,
}

/// `(dataid, fragmentnr)` as a 40-byte key: 32-byte dataid followed by an
/// 8-byte big-endian fragment number, so lexicographic key order matches
/// fragment order for a given dataid.
pub fn fragment_key(dataid: &Id, fragmentnr: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(dataid);
    key.extend_from_slice(&fragmentnr.to_be_bytes());
    key
}

pub fn fragment_key_range(dataid: &Id) -> (Vec<u8>, Vec<u8>) {
    let lo = fragment_key(dataid, 0);
    let hi = fragment_key(dataid, u64::MAX);
    (lo, hi)
}

/// `(node_id1, dataid)` as a 64-byte key.
pub fn blob_key(node_id1: &Id, dataid: &Id) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(node_id1);
    key.extend_from_slice(dataid);
    key
}

pub fn blob_key_range(node_id1: &Id) -> (Vec<u8>, Vec<u8>) {
    let lo = blob_key(node_id1, &[0u8; 32]);
    let hi = blob_key(node_id1, &[0xffu8; 32]);
    (lo, hi)
}

pub fn dataid_from_blob_key(key: &[u8]) -> Id {
    let mut id = [0u8; 32];
    id.copy_from_slice(&key[32..64]);
    id
}

pub fn encode<T: Serialize>(value: &T) -> openodin_core::Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| openodin_core::Error::serialization(format!("blob row encode: {e}")))
}

pub fn decode<T: for<'a> Deserialize<'a>>(bytes: &[u8]) -> openodin_core::Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| openodin_core::Error::serialization(format!("blob row decode: {e}")))
}
