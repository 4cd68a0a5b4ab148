//! Store algorithm (§4.2 "Store algorithm"). Runs every node of a batch
//! through one transaction: hash derivation, the achilles/destroy
//! cross-check, uniquehash dedup/update, and ancillary row derivation.

use rusqlite::{params, Transaction};

use openodin_core::{Error, Id, Node, Result};
use openodin_crypto::hash_parts;

use crate::rows::{decode_node_from_row, owner_bytes, public_key_bytes, NodeRow};

/// What happened to a single node during [`store_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    TransientUpdated,
    Skipped,
}

pub struct StoreResult {
    pub inserted_id1s: Vec<Id>,
    pub parent_ids: Vec<Id>,
    pub nodes_with_blobs: Vec<Id>,
}

/// `licensing_hashes.hash` / `friend_certs` derive from the `refId`-style
/// target the license or friend cert is issued against. We key both off
/// the node's own `parent_id`, matching how a license or friend-cert node
/// is stored as a child of the node/subtree it governs.
fn license_hash(node: &Node) -> Id {
    hash_parts(&[&node.parent_id, node.owner.as_bytes()])
}

fn friend_cert_image(node: &Node) -> Result<Vec<u8>> {
    let Some(fc) = &node.friend_cert else {
        return Ok(Vec::new());
    };
    bincode::serialize(fc).map_err(|e| Error::serialization(format!("friend cert image: {e}")))
}

fn friend_cert_constraints_bytes(node: &Node) -> Result<Vec<u8>> {
    let constraints = node.friend_cert.as_ref().map(|fc| fc.constraints.as_slice()).unwrap_or(&[]);
    bincode::serialize(constraints).map_err(|e| Error::serialization(format!("constraints: {e}")))
}

/// §4.2 store step 2: "if a destroy-hash already matches any of its
/// achilles hashes, skip."
fn killed_by_existing_destroy_hash(tx: &Transaction<'_>, node: &Node) -> Result<bool> {
    if node.achilles_hashes.is_empty() {
        return Ok(false);
    }
    let mut stmt = tx
        .prepare_cached("SELECT 1 FROM destroy_hashes WHERE hash = ?1 LIMIT 1")
        .map_err(|e| Error::storage(format!("prepare destroy lookup: {e}")))?;
    for hash in &node.achilles_hashes {
        let hit: Option<i64> = stmt
            .query_row(params![hash.as_slice()], |row| row.get(0))
            .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })
            .map_err(|e| Error::storage(format!("destroy lookup: {e}")))?;
        if hit.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The reverse direction: this node's own `destroy_hashes` may kill
/// already-stored nodes that carry a matching achilles hash.
fn apply_destroy_hashes(tx: &Transaction<'_>, node: &Node) -> Result<()> {
    for hash in &node.destroy_hashes {
        let killed: Vec<Id> = {
            let mut stmt = tx
                .prepare_cached("SELECT id1 FROM achilles_hashes WHERE hash = ?1")
                .map_err(|e| Error::storage(format!("prepare achilles lookup: {e}")))?;
            let rows = stmt
                .query_map(params![hash.as_slice()], |row| {
                    let bytes: Vec<u8> = row.get(0)?;
                    let mut id = [0u8; 32];
                    id.copy_from_slice(&bytes);
                    Ok(id)
                })
                .map_err(|e| Error::storage(format!("achilles lookup: {e}")))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage(format!("achilles lookup row: {e}")))?
        };
        for id1 in killed {
            delete_node(tx, &id1)?;
        }
    }
    Ok(())
}

pub fn delete_node(tx: &Transaction<'_>, id1: &Id) -> Result<()> {
    tx.execute("DELETE FROM nodes WHERE id1 = ?1", params![id1.as_slice()])
        .map_err(|e| Error::storage(format!("delete node: {e}")))?;
    tx.execute("DELETE FROM achilles_hashes WHERE id1 = ?1", params![id1.as_slice()])
        .map_err(|e| Error::storage(format!("delete achilles: {e}")))?;
    tx.execute("DELETE FROM destroy_hashes WHERE id1 = ?1", params![id1.as_slice()])
        .map_err(|e| Error::storage(format!("delete destroy: {e}")))?;
    tx.execute("DELETE FROM licensing_hashes WHERE license_id1 = ?1", params![id1.as_slice()])
        .map_err(|e| Error::storage(format!("delete licensing: {e}")))?;
    tx.execute("DELETE FROM friend_certs WHERE id1 = ?1", params![id1.as_slice()])
        .map_err(|e| Error::storage(format!("delete friend cert: {e}")))?;
    Ok(())
}

fn insert_ancillary_rows(tx: &Transaction<'_>, node: &Node) -> Result<()> {
    for hash in &node.achilles_hashes {
        tx.execute(
            "INSERT INTO achilles_hashes (id1, hash) VALUES (?1, ?2)",
            params![node.id1.as_slice(), hash.as_slice()],
        )
        .map_err(|e| Error::storage(format!("insert achilles: {e}")))?;
    }
    for hash in &node.destroy_hashes {
        tx.execute(
            "INSERT INTO destroy_hashes (id1, hash) VALUES (?1, ?2)",
            params![node.id1.as_slice(), hash.as_slice()],
        )
        .map_err(|e| Error::storage(format!("insert destroy: {e}")))?;
    }
    if let Some(license) = &node.license {
        let hash = license_hash(node);
        tx.execute(
            "INSERT INTO licensing_hashes (
                license_id1, hash, target_public_key, max_distance,
                disallowretrolicensing, parentpathhash,
                restrictivemode_writer, restrictivemode_manager
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                node.id1.as_slice(),
                hash.as_slice(),
                public_key_bytes(&license.target_public_key),
                license.max_distance,
                license.disallow_retro_licensing,
                node.parent_id.as_slice(),
                license.restrictive_mode_writer,
                license.restrictive_mode_manager,
            ],
        )
        .map_err(|e| Error::storage(format!("insert licensing: {e}")))?;
    }
    if node.friend_cert.is_some() {
        tx.execute(
            "INSERT INTO friend_certs (id1, owner, other_owner, constraints, image)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.id1.as_slice(),
                owner_bytes(node),
                public_key_bytes(&node.friend_cert.as_ref().map_or(node.owner, |fc| fc.other_owner)),
                friend_cert_constraints_bytes(node)?,
                friend_cert_image(node)?,
            ],
        )
        .map_err(|e| Error::storage(format!("insert friend cert: {e}")))?;
    }
    Ok(())
}

/// §4.2 store step 1-5, applied to a single node within an open
/// transaction. Returns `None` when the node was skipped (killed by an
/// existing destroy-hash, or an unchanged duplicate).
fn store_one(tx: &Transaction<'_>, node: &Node, now_ms: u64, preserve_transient: bool) -> Result<StoreOutcome> {
    if killed_by_existing_destroy_hash(tx, node)? {
        return Ok(StoreOutcome::Skipped);
    }

    let uniquehash = openodin_codec::compute_uniquehash(node);
    let transienthash = openodin_codec::compute_transienthash(node)?;

    let existing: Option<(Id, Id)> = tx
        .query_row(
            "SELECT id1, transienthash FROM nodes WHERE uniquehash = ?1",
            params![uniquehash.as_slice()],
            |row| {
                let id1: Vec<u8> = row.get(0)?;
                let th: Vec<u8> = row.get(1)?;
                let mut id1_arr = [0u8; 32];
                id1_arr.copy_from_slice(&id1);
                let mut th_arr = [0u8; 32];
                th_arr.copy_from_slice(&th);
                Ok((id1_arr, th_arr))
            },
        )
        .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })
        .map_err(|e| Error::storage(format!("uniquehash lookup: {e}")))?;

    if let Some((existing_id1, existing_transienthash)) = existing {
        if preserve_transient && existing_transienthash != transienthash {
            tx.execute(
                "UPDATE nodes SET transienthash = ?1, trailupdatetime = ?2 WHERE id1 = ?3",
                params![transienthash.as_slice(), now_ms, existing_id1.as_slice()],
            )
            .map_err(|e| Error::storage(format!("update transient: {e}")))?;
            return Ok(StoreOutcome::TransientUpdated);
        }
        return Ok(StoreOutcome::Skipped);
    }

    let encoded = openodin_codec::encode_node(node)?;
    let row = NodeRow::from_node(node, uniquehash, transienthash, now_ms, encoded);
    tx.execute(
        "INSERT INTO nodes (
            id1, id2, parentid, owner, creationtime, expiretime, storagetime,
            trailupdatetime, region, jurisdiction, node_type, is_public,
            is_licensed, bumphash, uniquehash, transienthash, encoded
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        params![
            row.id1.as_slice(),
            row.id2.map(|v| v.to_vec()),
            row.parent_id.as_slice(),
            row.owner,
            row.creation_time,
            row.expire_time,
            row.storage_time,
            row.trail_update_time,
            row.region.map(|v| v.to_vec()),
            row.jurisdiction.map(|v| v.to_vec()),
            row.node_type,
            row.is_public,
            row.is_licensed,
            row.bumphash.as_slice(),
            row.uniquehash.as_slice(),
            row.transienthash.as_slice(),
            row.encoded,
        ],
    )
    .map_err(|e| Error::storage(format!("insert node: {e}")))?;

    insert_ancillary_rows(tx, node)?;
    apply_destroy_hashes(tx, node)?;

    Ok(StoreOutcome::Inserted)
}

pub fn store_nodes(tx: &Transaction<'_>, nodes: &[Node], now_ms: u64, preserve_transient: bool) -> Result<StoreResult> {
    let mut inserted_id1s = Vec::new();
    let mut parent_ids = Vec::new();
    let mut nodes_with_blobs = Vec::new();

    for node in nodes {
        let outcome = store_one(tx, node, now_ms, preserve_transient)?;
        if matches!(outcome, StoreOutcome::Inserted | StoreOutcome::TransientUpdated) {
            inserted_id1s.push(node.id1);
            parent_ids.push(node.parent_id);
            if node.has_blob() {
                nodes_with_blobs.push(node.id1);
            }
        }
    }

    Ok(StoreResult { inserted_id1s, parent_ids, nodes_with_blobs })
}

/// Re-reads a node by id1, used by `bumpBlobNode` and blob finalisation to
/// refresh `trailupdatetime` on the owning node and its ancestor trail.
pub fn bump_trail_update_time(tx: &Transaction<'_>, id1: &Id, now_ms: u64) -> Result<()> {
    tx.execute(
        "UPDATE nodes SET trailupdatetime = ?1 WHERE id1 = ?2",
        params![now_ms, id1.as_slice()],
    )
    .map_err(|e| Error::storage(format!("bump trail update time: {e}")))?;
    Ok(())
}

pub fn get_parent_id(tx: &Transaction<'_>, id1: &Id) -> Result<Option<Id>> {
    let parent: Option<Id> = tx
        .query_row("SELECT parentid FROM nodes WHERE id1 = ?1", params![id1.as_slice()], |row| {
            let bytes: Vec<u8> = row.get(0)?;
            let mut id = [0u8; 32];
            id.copy_from_slice(&bytes);
            Ok(id)
        })
        .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })
        .map_err(|e| Error::storage(format!("get parent id: {e}")))?;
    Ok(parent.filter(|id| *id != openodin_core::ZERO_ID))
}

pub fn get_node_by_id1(tx: &Transaction<'_>, id1: &Id) -> Result<Option<Node>> {
    let mut stmt = tx
        .prepare_cached("SELECT * FROM nodes WHERE id1 = ?1")
        .map_err(|e| Error::storage(format!("prepare get node: {e}")))?;
    let mut rows = stmt
        .query(params![id1.as_slice()])
        .map_err(|e| Error::storage(format!("query get node: {e}")))?;
    match rows.next().map_err(|e| Error::storage(format!("row next: {e}")))? {
        Some(row) => Ok(Some(decode_node_from_row(row).map_err(|e| Error::storage(format!("decode node: {e}")))?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use openodin_core::{KeyType, Transient, ZERO_ID};
    use openodin_crypto::SecretKey;
    use rusqlite::Connection;

    fn sample_node(parent_id: Id, data: &[u8]) -> Node {
        let sk = SecretKey::generate(KeyType::Ed25519);
        let mut node = Node {
            id1: ZERO_ID,
            id2: None,
            parent_id,
            owner: sk.public_key(),
            creation_time: 1_000,
            expire_time: None,
            region: None,
            jurisdiction: None,
            flags: Default::default(),
            node_type: b"data".to_vec(),
            content_type: None,
            data: data.to_vec(),
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
            signatures: vec![openodin_core::NodeSignature {
                public_key: sk.public_key(),
                signature: sk.sign(b"placeholder"),
            }],
            transient: Transient::default(),
        };
        node.id1 = openodin_codec::compute_id1(&node).unwrap();
        node
    }

    fn open_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn inserts_new_node() {
        let mut conn = open_conn();
        let tx = conn.transaction().unwrap();
        let node = sample_node(ZERO_ID, b"hello");
        let result = store_nodes(&tx, std::slice::from_ref(&node), 2_000, false).unwrap();
        tx.commit().unwrap();
        assert_eq!(result.inserted_id1s, vec![node.id1]);
    }

    #[test]
    fn duplicate_uniquehash_is_skipped() {
        let mut conn = open_conn();
        let node = sample_node(ZERO_ID, b"hello");
        {
            let tx = conn.transaction().unwrap();
            store_nodes(&tx, std::slice::from_ref(&node), 2_000, false).unwrap();
            tx.commit().unwrap();
        }
        let tx = conn.transaction().unwrap();
        let result = store_nodes(&tx, std::slice::from_ref(&node), 3_000, false).unwrap();
        tx.commit().unwrap();
        assert!(result.inserted_id1s.is_empty());
    }

    #[test]
    fn preserve_transient_updates_on_transient_change() {
        let mut conn = open_conn();
        let mut node = sample_node(ZERO_ID, b"hello");
        {
            let tx = conn.transaction().unwrap();
            store_nodes(&tx, std::slice::from_ref(&node), 2_000, true).unwrap();
            tx.commit().unwrap();
        }
        node.transient.storage_time = Some(99);
        let tx = conn.transaction().unwrap();
        let result = store_nodes(&tx, std::slice::from_ref(&node), 3_000, true).unwrap();
        tx.commit().unwrap();
        assert_eq!(result.inserted_id1s, vec![node.id1]);
    }

    #[test]
    fn destroy_hash_kills_matching_achilles_node() {
        let mut conn = open_conn();
        let secret = [42u8; 32];
        let mut victim = sample_node(ZERO_ID, b"victim");
        victim.achilles_hashes = vec![openodin_crypto::hash(&secret)];
        victim.id1 = openodin_codec::compute_id1(&victim).unwrap();

        let mut destroyer = sample_node(ZERO_ID, b"destroyer");
        destroyer.destroy_hashes = vec![openodin_crypto::hash(&secret)];
        destroyer.id1 = openodin_codec::compute_id1(&destroyer).unwrap();

        {
            let tx = conn.transaction().unwrap();
            store_nodes(&tx, std::slice::from_ref(&victim), 1_000, false).unwrap();
            tx.commit().unwrap();
        }
        let tx = conn.transaction().unwrap();
        store_nodes(&tx, std::slice::from_ref(&destroyer), 2_000, false).unwrap();
        let found = get_node_by_id1(&tx, &victim.id1).unwrap();
        tx.commit().unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn node_with_existing_destroy_hash_is_skipped_on_store() {
        let mut conn = open_conn();
        let secret = [7u8; 32];

        let mut destroyer = sample_node(ZERO_ID, b"destroyer");
        destroyer.destroy_hashes = vec![openodin_crypto::hash(&secret)];
        destroyer.id1 = openodin_codec::compute_id1(&destroyer).unwrap();
        {
            let tx = conn.transaction().unwrap();
            store_nodes(&tx, std::slice::from_ref(&destroyer), 1_000, false).unwrap();
            tx.commit().unwrap();
        }

        let mut victim = sample_node(ZERO_ID, b"victim");
        victim.achilles_hashes = vec![openodin_crypto::hash(&secret)];
        victim.id1 = openodin_codec::compute_id1(&victim).unwrap();

        let tx = conn.transaction().unwrap();
        let result = store_nodes(&tx, std::slice::from_ref(&victim), 2_000, false).unwrap();
        tx.commit().unwrap();
        assert!(result.inserted_id1s.is_empty());
    }
}
