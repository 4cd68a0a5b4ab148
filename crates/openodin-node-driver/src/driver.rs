//! The node driver itself (§4.2). One `rusqlite::Connection` in WAL mode
//! behind a `tokio::sync::Mutex`, mirroring [`openodin_blob::BlobDriver`]'s
//! write/read-transaction closure shape (the engine is single-threaded
//! cooperative per §5, so one connection is not a bottleneck).

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::instrument;

use openodin_core::constants::MAX_QUERY_ROWS_LIMIT;
use openodin_core::{Error, Id, Node, Result};

use crate::fetch::{self, FetchOutcome};
use crate::schema::init_schema;
use crate::store::{self, StoreResult};
use crate::types::{FetchQuery, PermissionContext};

pub struct NodeDriver {
    conn: Arc<Mutex<Connection>>,
}

impl NodeDriver {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::storage(format!("creating node db directory: {e}")))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| Error::storage(format!("opening node database: {e}")))?;
        init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(format!("opening in-memory db: {e}")))?;
        init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_tx<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<R>,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(|e| Error::storage(format!("begin transaction: {e}")))?;
        let result = f(&tx)?;
        tx.commit().map_err(|e| Error::storage(format!("commit transaction: {e}")))?;
        Ok(result)
    }

    /// §4.2 "store(nodes, now, preserveTransient) -> (inserted, parentIds, blobNodes)".
    #[instrument(skip(self, nodes))]
    pub async fn store(&self, nodes: &[Node], now_ms: u64, preserve_transient: bool) -> Result<StoreResult> {
        self.with_tx(|tx| store::store_nodes(tx, nodes, now_ms, preserve_transient)).await
    }

    #[instrument(skip(self))]
    pub async fn get_node_by_id1(&self, id1: Id) -> Result<Option<Node>> {
        self.with_tx(|tx| store::get_node_by_id1(tx, &id1)).await
    }

    /// §4.2 "fetchSingleNode(id1, now, source, target) with permissive
    /// upward license check". We reuse the batch `fetch` engine seeded at
    /// the single node and unbounded depth 0.
    #[instrument(skip(self, ctx))]
    pub async fn fetch_single_node(&self, id1: Id, now_ms: u64, ctx: PermissionContext) -> Result<Option<Node>> {
        let query = FetchQuery {
            seed: crate::types::Seed::RootNodeId1(id1),
            depth: 0,
            matches: Vec::new(),
            embed: Vec::new(),
            descending: false,
            order_by_storage_time: false,
            ignore_own: false,
            ignore_inactive: false,
            discard_root: false,
            preserve_transient: false,
            include_licenses: false,
            region: None,
            jurisdiction: None,
            cutoff_time: None,
            cursor_id1: None,
            head: 1,
            tail: 0,
            reverse: false,
            trigger_node_id: None,
            trigger_interval: None,
        };
        let outcome = self.fetch(&query, now_ms, ctx).await?;
        Ok(outcome.nodes.into_iter().next().map(|f| f.node))
    }

    #[instrument(skip(self, query, ctx))]
    pub async fn fetch(&self, query: &FetchQuery, now_ms: u64, ctx: PermissionContext) -> Result<FetchOutcome> {
        let query = query.clone();
        self.with_tx(move |tx| fetch::fetch(tx, &query, now_ms, &ctx)).await
    }

    #[instrument(skip(self, id1s))]
    pub async fn delete_nodes(&self, id1s: &[Id]) -> Result<usize> {
        let id1s = id1s.to_vec();
        self.with_tx(move |tx| {
            for id1 in &id1s {
                store::delete_node(tx, id1)?;
            }
            Ok(id1s.len())
        })
        .await
    }

    /// §4.1 "bumps the node and its ancestor trail", used by `WriteBlob`'s
    /// finalise path to wake downstream peers.
    #[instrument(skip(self))]
    pub async fn bump_blob_node(&self, id1: Id, now_ms: u64) -> Result<()> {
        self.with_tx(move |tx| {
            store::bump_trail_update_time(tx, &id1, now_ms)?;
            let mut current = store::get_parent_id(tx, &id1)?;
            while let Some(parent) = current {
                store::bump_trail_update_time(tx, &parent, now_ms)?;
                current = store::get_parent_id(tx, &parent)?;
            }
            Ok(())
        })
        .await
    }

    /// §4.1 WriteBlob permission check: owner, or a non-restrictive
    /// license chain reaching `ctx.target`.
    #[instrument(skip(self, ctx))]
    pub async fn check_write_permission(&self, node: &Node, ctx: PermissionContext) -> Result<bool> {
        let node = node.clone();
        self.with_tx(move |tx| fetch::write_permitted(tx, &node, &ctx)).await
    }

    /// §4.1 ReadBlob permission check: owner, licensed, or a public node.
    #[instrument(skip(self, ctx))]
    pub async fn check_read_permission(&self, node: &Node, ctx: PermissionContext) -> Result<bool> {
        let node = node.clone();
        self.with_tx(move |tx| fetch::read_permitted(tx, &node, &ctx)).await
    }

    #[instrument(skip(self))]
    pub async fn get_expired_node_id1s(&self, now_ms: u64, limit: usize) -> Result<Vec<Id>> {
        let limit = limit.min(MAX_QUERY_ROWS_LIMIT);
        self.with_tx(move |tx| {
            let mut stmt = tx
                .prepare_cached("SELECT id1 FROM nodes WHERE expiretime IS NOT NULL AND expiretime <= ?1 LIMIT ?2")
                .map_err(|e| Error::storage(format!("prepare expired: {e}")))?;
            let rows = stmt
                .query_map(params![now_ms, limit as i64], |row| {
                    let bytes: Vec<u8> = row.get(0)?;
                    let mut id = [0u8; 32];
                    id.copy_from_slice(&bytes);
                    Ok(id)
                })
                .map_err(|e| Error::storage(format!("query expired: {e}")))?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::storage(format!("expired row: {e}")))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_node_by_id1s(&self, id1s: &[Id]) -> Result<Vec<Node>> {
        let id1s = id1s.to_vec();
        self.with_tx(move |tx| {
            let mut out = Vec::with_capacity(id1s.len());
            for id1 in &id1s {
                if let Some(node) = store::get_node_by_id1(tx, id1)? {
                    out.push(node);
                }
            }
            Ok(out)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::{KeyType, NodeFlags, Transient, ZERO_ID};
    use openodin_crypto::SecretKey;

    fn sample_node(parent_id: Id, creation_time: u64) -> Node {
        let sk = SecretKey::generate(KeyType::Ed25519);
        let mut node = Node {
            id1: ZERO_ID,
            id2: None,
            parent_id,
            owner: sk.public_key(),
            creation_time,
            expire_time: None,
            region: None,
            jurisdiction: None,
            flags: NodeFlags { is_public: true, ..Default::default() },
            node_type: b"data".to_vec(),
            content_type: None,
            data: vec![1, 2, 3],
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
            signatures: vec![openodin_core::NodeSignature { public_key: sk.public_key(), signature: sk.sign(b"x") }],
            transient: Transient::default(),
        };
        node.id1 = openodin_codec::compute_id1(&node).unwrap();
        node
    }

    fn ctx() -> PermissionContext {
        let sk = SecretKey::generate(KeyType::Ed25519);
        PermissionContext { source: sk.public_key(), target: sk.public_key() }
    }

    #[tokio::test]
    async fn stores_and_fetches_children_of_parent() {
        let driver = NodeDriver::open_in_memory().unwrap();
        let node = sample_node(ZERO_ID, 1_000);
        driver.store(std::slice::from_ref(&node), 2_000, false).await.unwrap();

        let query = FetchQuery::children_of(ZERO_ID);
        let outcome = driver.fetch(&query, 3_000, ctx()).await.unwrap();
        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.nodes[0].node.id1, node.id1);
    }

    #[tokio::test]
    async fn expired_node_is_excluded() {
        let driver = NodeDriver::open_in_memory().unwrap();
        let mut node = sample_node(ZERO_ID, 1_000);
        node.expire_time = Some(1_500);
        node.id1 = openodin_codec::compute_id1(&node).unwrap();
        driver.store(std::slice::from_ref(&node), 1_100, false).await.unwrap();

        let query = FetchQuery::children_of(ZERO_ID);
        let outcome = driver.fetch(&query, 2_000, ctx()).await.unwrap();
        assert!(outcome.nodes.is_empty());
    }

    #[tokio::test]
    async fn missing_cursor_is_an_error() {
        let driver = NodeDriver::open_in_memory().unwrap();
        let node = sample_node(ZERO_ID, 1_000);
        driver.store(std::slice::from_ref(&node), 2_000, false).await.unwrap();

        let mut query = FetchQuery::children_of(ZERO_ID);
        query.cursor_id1 = Some([0xaa; 32]);
        let err = driver.fetch(&query, 3_000, ctx()).await.unwrap_err();
        assert!(matches!(err, Error::MissingCursor { .. }));
    }

    #[tokio::test]
    async fn bump_blob_node_walks_ancestor_trail() {
        let driver = NodeDriver::open_in_memory().unwrap();
        let root = sample_node(ZERO_ID, 1_000);
        driver.store(std::slice::from_ref(&root), 2_000, false).await.unwrap();
        let child = sample_node(root.id1, 1_100);
        driver.store(std::slice::from_ref(&child), 2_100, false).await.unwrap();

        driver.bump_blob_node(child.id1, 5_000).await.unwrap();

        let conn = driver.conn.lock().await;
        let trail: u64 = conn
            .query_row("SELECT trailupdatetime FROM nodes WHERE id1 = ?1", params![root.id1.as_slice()], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(trail, 5_000);
    }
}
