//! `StorageEngine`: the single orchestration point wiring the node driver,
//! blob driver, signature offloader and subscription scheduler behind one
//! async method per handler (§4.1). Nothing here knows about a concrete
//! transport: every handler takes its permissions explicitly and replies
//! through a [`crate::reply::ReplySink`], mirroring the driver crates'
//! own transport-agnostic boundaries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tracing::instrument;

use openodin_blob::{compute_dataid, BlobDriver};
use openodin_codec::{decode_node, encode_node, hash_to_sign, validate_structure};
use openodin_core::constants::{MAX_BATCH_SIZE, MAX_READBLOB_LENGTH};
use openodin_core::{Clock, EngineConfig, Error, Id, Node, Result, Status};
use openodin_node_driver::types::{FetchQuery, PermissionContext};
use openodin_node_driver::NodeDriver;
use openodin_offloader::{SignatureOffloader, SignatureToVerify, SignaturesCollection, ToBeSigned};
use openodin_scheduler::{compute_hash_key, FireFn, HashKey, Trigger, TriggerEvent, TriggerRegistry};
use openodin_transformer::{build_algo, AlgoKind, EmittedDiff, Transformer};

use crate::chunking::chunk_fetch_response;
use crate::reply::ReplySink;
use crate::requests::{
    FetchPermissions, FetchRequest, FetchResponse, GenericMessageRequest, GenericResponse,
    ReadBlobRequest, ReadBlobResponse, StorePermissions, StoreRequest, StoreResponse,
    UnsubscribeRequest, UnsubscribeResponse, WriteBlobRequest, WriteBlobResponse,
};
use crate::trigger_sink::FetchTriggerSink;

/// One shared, `id1`-keyed view per (query, algos, msgId) combination
/// (§4.4 "triggers with the same key MAY share a transformer").
type TransformerMap = HashMap<HashKey, Arc<SyncMutex<Transformer>>>;

#[derive(Clone)]
pub struct StorageEngine {
    node_driver: Arc<NodeDriver>,
    blob_driver: Arc<BlobDriver>,
    offloader: Arc<SignatureOffloader>,
    triggers: Arc<TriggerRegistry>,
    transformers: Arc<SyncMutex<TransformerMap>>,
    /// `Trigger` is transport- and permission-agnostic by design (§9); the
    /// engine keeps the `(source, target)` each subscription was opened
    /// with here rather than widening the scheduler crate's struct.
    trigger_ctx: Arc<SyncMutex<HashMap<[u8; 4], PermissionContext>>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl StorageEngine {
    pub fn new(
        node_driver: NodeDriver,
        blob_driver: BlobDriver,
        offloader: SignatureOffloader,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            node_driver: Arc::new(node_driver),
            blob_driver: Arc::new(blob_driver),
            offloader: Arc::new(offloader),
            triggers: Arc::new(TriggerRegistry::new()),
            transformers: Arc::new(SyncMutex::new(HashMap::new())),
            trigger_ctx: Arc::new(SyncMutex::new(HashMap::new())),
            clock,
            config,
        }
    }

    /// Opens the node and blob databases at the configured paths and
    /// starts a signature offloader sized per `config` (§2 ambient stack).
    pub fn open(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let node_driver = NodeDriver::open(&config.node_db_path)?;
        let blob_driver = BlobDriver::open(&config.blob_db_path)?;
        let offloader = SignatureOffloader::new(config.offloader_workers);
        Ok(Self::new(node_driver, blob_driver, offloader, clock, config))
    }

    pub fn add_key_pair(&self, secret_key: openodin_crypto::SecretKey) {
        self.offloader.add_key_pair(secret_key);
    }

    /// Spawns the periodic `triggerInterval` sweep (§4.4). The returned
    /// handle is detached; dropping the engine does not stop it — callers
    /// that need a clean shutdown should abort it explicitly.
    pub fn spawn_sweep(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        let fire: FireFn = Arc::new(move |trigger| {
            let engine = engine.clone();
            Box::pin(async move { engine.drive_trigger(trigger).await })
        });
        openodin_scheduler::spawn_sweep(
            self.triggers.clone(),
            self.clock.clone(),
            self.config.trigger_sweep_interval_ms,
            fire,
        )
    }

    /// §3 lifecycle "Destroy: row deleted ... or on expiry GC". Runs
    /// [`NodeDriver::get_expired_node_id1s`]/`delete_nodes` on a fixed tick
    /// so nodes past `expireTime` (§3 invariant 6) are actually reclaimed
    /// rather than merely elided from query results forever. Detached like
    /// [`Self::spawn_sweep`]; callers that need clean shutdown abort it.
    pub fn spawn_expired_node_gc(&self) -> tokio::task::JoinHandle<()> {
        let node_driver = self.node_driver.clone();
        let clock = self.clock.clone();
        let interval_ms = self.config.expired_node_gc_interval_ms.max(1);
        let limit = self.config.expired_node_gc_batch_limit;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                let now_ms = clock.now_ms();
                match node_driver.get_expired_node_id1s(now_ms, limit).await {
                    Ok(expired) if !expired.is_empty() => {
                        if let Err(e) = node_driver.delete_nodes(&expired).await {
                            tracing::warn!(error = %e, "expired node GC: delete_nodes failed");
                        } else {
                            tracing::debug!(count = expired.len(), "expired node GC: reclaimed nodes");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "expired node GC: get_expired_node_id1s failed"),
                }
            }
        })
    }

    /// Builds and signs a node through the offloader (lifecycle "Create",
    /// §4.6). A convenience for callers authoring nodes in-process (tests,
    /// the development binary); the wire `Store` path only ever receives
    /// already-signed encodings.
    pub async fn sign_node(&self, mut node: Node) -> Result<Node> {
        let to_sign = hash_to_sign(&node)?;
        let owner = node.owner;
        let mut results = self
            .offloader
            .sign_batch(vec![ToBeSigned { index: 0, message: to_sign.to_vec(), public_key: owner }])
            .await;
        let signed = results.pop().ok_or_else(|| Error::internal("signing failed: key not registered"))?;
        node.signatures.push(openodin_core::NodeSignature { public_key: owner, signature: signed.signature });
        node.id1 = openodin_codec::compute_id1(&node)?;
        Ok(node)
    }

    // ---------------------------------------------------------------
    // Store
    // ---------------------------------------------------------------

    #[instrument(skip(self, request, permissions))]
    pub async fn handle_store(&self, request: StoreRequest, permissions: &StorePermissions) -> StoreResponse {
        if !permissions.allow_store {
            return StoreResponse::error(request.msg_id, Status::NotAllowed, "store not permitted for this peer");
        }
        if request.preserve_transient && !permissions.allow_preserve_transient {
            return StoreResponse::error(request.msg_id, Status::Malformed, "preserveTransient not permitted");
        }
        if request.nodes.len() > MAX_BATCH_SIZE {
            return StoreResponse::error(request.msg_id, Status::Malformed, "batch exceeds MAX_BATCH_SIZE");
        }

        let now_ms = self.clock.now_ms();
        let mut decoded = Vec::with_capacity(request.nodes.len());
        for bytes in &request.nodes {
            match decode_node(bytes) {
                Ok(node) => decoded.push(node),
                Err(e) => return StoreResponse::error(request.msg_id, Status::Malformed, e.to_string()),
            }
        }

        if let Some(allowed) = &permissions.allowed_node_types {
            if decoded.iter().any(|n| !allowed.iter().any(|t| t == &n.node_type)) {
                return StoreResponse::error(request.msg_id, Status::NotAllowed, "node type not permitted for this peer");
            }
        }

        // §3 invariant 2: nodes claiming a future creation time beyond
        // tolerance are silently dropped rather than rejecting the batch.
        let accepted: Vec<Node> =
            decoded.into_iter().filter(|n| n.within_clock_tolerance(now_ms, self.config.now_tolerance_ms)).collect();
        if accepted.is_empty() {
            return StoreResponse { msg_id: request.msg_id, status: Status::Result, error: None, stored_id1s: Vec::new() };
        }

        for node in &accepted {
            if let Err(e) = validate_structure(node, now_ms, self.config.now_tolerance_ms) {
                return StoreResponse::error(request.msg_id, Status::Malformed, e.to_string());
            }
        }

        let mut collections = Vec::with_capacity(accepted.len());
        for (index, node) in accepted.iter().enumerate() {
            let message = node.id1.to_vec();
            let signatures = node
                .signatures
                .iter()
                .map(|s| SignatureToVerify { public_key: s.public_key, message: message.clone(), signature: s.signature.clone() })
                .collect();
            collections.push(SignaturesCollection { index, signatures });
        }
        let verified = self.offloader.verify_batch(collections).await;
        if verified.len() != accepted.len() {
            return StoreResponse::error(request.msg_id, Status::Malformed, "one or more signatures failed verification");
        }

        let preserve_transient = request.preserve_transient && permissions.allow_preserve_transient;
        let store_result = match self.node_driver.store(&accepted, now_ms, preserve_transient).await {
            Ok(r) => r,
            Err(e) => return StoreResponse::error(request.msg_id, e.status(), e.to_string()),
        };

        for parent_id in store_result.parent_ids.iter().copied().collect::<HashSet<_>>() {
            self.awaken_and_run(parent_id, &request.mute_msg_ids).await;
        }

        StoreResponse { msg_id: request.msg_id, status: Status::Result, error: None, stored_id1s: store_result.inserted_id1s }
    }

    // ---------------------------------------------------------------
    // Fetch
    // ---------------------------------------------------------------

    #[instrument(skip(self, request, permissions, reply_sink))]
    pub async fn handle_fetch(
        &self,
        request: FetchRequest,
        permissions: &FetchPermissions,
        reply_sink: Arc<dyn ReplySink<FetchResponse>>,
    ) {
        let now_ms = self.clock.now_ms();
        if !permissions.allow_fetch {
            Self::send_fetch_error(&reply_sink, request.msg_id, Status::NotAllowed, "fetch not permitted for this peer", now_ms);
            return;
        }
        if let Some(allowed) = &permissions.allowed_node_types {
            let disallowed = request.query.matches.iter().any(|m| !m.node_type.is_empty() && !allowed.iter().any(|t| t == &m.node_type));
            if disallowed {
                Self::send_fetch_error(&reply_sink, request.msg_id, Status::NotAllowed, "node type not permitted for this peer", now_ms);
                return;
            }
        }

        let wants_trigger = request.query.trigger_node_id.is_some() || request.query.trigger_interval.is_some();
        if wants_trigger && !permissions.allow_trigger {
            Self::send_fetch_error(&reply_sink, request.msg_id, Status::NotAllowed, "subscriptions not permitted for this peer", now_ms);
            return;
        }

        let ctx = PermissionContext { source: request.source_public_key, target: request.target_public_key };
        let algos = request.transform.as_ref().map(|t| t.algos.clone()).filter(|a| !a.is_empty());
        let use_transformer = algos.is_some() || wants_trigger;
        let effective_algos = algos.unwrap_or_else(|| vec![AlgoKind::Sorted]);

        let outcome = if use_transformer {
            let hash_key = compute_hash_key(&request.query, &effective_algos, &request.msg_id);
            match self.run_transformer_query(&request.query, &effective_algos, hash_key, ctx, now_ms).await {
                Ok(diff) => Self::diff_to_chunks(request.msg_id, diff, now_ms, self.config.message_split_bytes),
                Err(e) => Err(e),
            }
        } else {
            self.fetch_direct(request.msg_id, &request.query, ctx, now_ms).await
        };

        match outcome {
            Ok(chunks) => {
                for chunk in chunks {
                    if reply_sink.send(chunk).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                Self::send_fetch_error(&reply_sink, request.msg_id, e.status(), e.to_string(), now_ms);
                return;
            }
        }

        if wants_trigger {
            self.register_trigger(&request, effective_algos, ctx, reply_sink);
        }
    }

    async fn fetch_direct(&self, msg_id: [u8; 4], query: &FetchQuery, ctx: PermissionContext, now_ms: u64) -> Result<Vec<FetchResponse>> {
        let outcome = self.node_driver.fetch(query, now_ms, ctx).await?;
        let mut nodes = Vec::with_capacity(outcome.nodes.len());
        for row in &outcome.nodes {
            nodes.push(encode_node(&row.node)?);
        }
        let mut embed = Vec::with_capacity(outcome.embed.len());
        for node in &outcome.embed {
            embed.push(encode_node(node)?);
        }
        let row_count = nodes.len();
        let cursor_index = query.cursor_id1.map(|_| outcome.indexes.first().copied().unwrap_or(0));
        Ok(chunk_fetch_response(msg_id, nodes, embed, None, row_count, cursor_index, now_ms, self.config.message_split_bytes))
    }

    fn diff_to_chunks(msg_id: [u8; 4], diff: EmittedDiff, now_ms: u64, max_bytes: usize) -> Result<Vec<FetchResponse>> {
        let mut nodes = Vec::with_capacity(diff.added.len() + diff.transient_updated.len());
        for node in diff.added.iter().chain(diff.transient_updated.iter()) {
            nodes.push(encode_node(node)?);
        }
        let row_count = diff.ordered_ids.len();
        Ok(chunk_fetch_response(msg_id, nodes, Vec::new(), diff.delta, row_count, None, now_ms, max_bytes))
    }

    fn get_or_create_transformer(&self, key: HashKey, algo_kind: AlgoKind, descending: bool, order_by_storage_time: bool) -> Arc<SyncMutex<Transformer>> {
        self.transformers
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(SyncMutex::new(Transformer::new(build_algo(algo_kind, descending, order_by_storage_time)))))
            .clone()
    }

    /// Runs one fetch/emit/window cycle for a transformer-backed query.
    /// Used both for the initial reply to a `Fetch` carrying a `transform`
    /// or subscription, and for every subsequent trigger re-fire — the
    /// same transformer (keyed by `HashKey`) is reused across both.
    async fn run_transformer_query(
        &self,
        query: &FetchQuery,
        algos: &[AlgoKind],
        key: HashKey,
        ctx: PermissionContext,
        now_ms: u64,
    ) -> Result<EmittedDiff> {
        // The transformer owns windowing for this path (§4.3); the node
        // driver is asked for the full matched set, unwindowed.
        let mut unwindowed = query.clone();
        unwindowed.head = 0;
        unwindowed.tail = 0;
        unwindowed.cursor_id1 = None;
        unwindowed.reverse = false;

        let outcome = self.node_driver.fetch(&unwindowed, now_ms, ctx).await?;
        let nodes: Vec<Node> = outcome.nodes.into_iter().map(|f| f.node).collect();

        let algo_kind = algos.first().copied().unwrap_or(AlgoKind::Sorted);
        let transformer = self.get_or_create_transformer(key, algo_kind, query.descending, query.order_by_storage_time);

        let mut t = transformer.lock();
        t.add(nodes)?;
        let diff = t.emit();
        let windowed = t.get(query.cursor_id1, query.head, query.tail, query.reverse);
        drop(t);

        let Some((windowed_nodes, _)) = windowed else {
            return Err(Error::missing_cursor("cursor node not present in transformer view"));
        };
        let window_ids: HashSet<Id> = windowed_nodes.iter().map(|n| n.id1).collect();
        let added = diff.added.into_iter().filter(|n| window_ids.contains(&n.id1)).collect();
        let transient_updated = diff.transient_updated.into_iter().filter(|n| window_ids.contains(&n.id1)).collect();

        Ok(EmittedDiff { ordered_ids: diff.ordered_ids, added, transient_updated, delta: diff.delta })
    }

    fn register_trigger(&self, request: &FetchRequest, algos: Vec<AlgoKind>, ctx: PermissionContext, reply_sink: Arc<dyn ReplySink<FetchResponse>>) {
        let key = compute_hash_key(&request.query, &algos, &request.msg_id);
        let sink = Arc::new(FetchTriggerSink {
            msg_id: request.msg_id,
            reply_sink,
            clock: self.clock.clone(),
            message_split_bytes: self.config.message_split_bytes,
        });
        let trigger = Arc::new(Trigger::new(
            key,
            request.msg_id,
            request.query.clone(),
            algos,
            request.query.trigger_node_id,
            request.query.trigger_interval,
            sink,
        ));
        self.trigger_ctx.lock().insert(request.msg_id, ctx);
        self.triggers.register(trigger.clone());
        // Flushes the corked state; the seed fetch was already delivered
        // above through `reply_sink`, not through the trigger itself.
        trigger.uncork();
    }

    async fn awaken_and_run(&self, trigger_node_id: Id, mute_msg_ids: &[[u8; 4]]) {
        for trigger in self.triggers.awaken(trigger_node_id, mute_msg_ids) {
            self.drive_trigger(trigger).await;
        }
    }

    async fn drive_trigger(&self, trigger: Arc<Trigger>) {
        loop {
            self.run_trigger_once(&trigger).await;
            if !trigger.finish_run() {
                break;
            }
        }
    }

    async fn run_trigger_once(&self, trigger: &Trigger) {
        let ctx = { self.trigger_ctx.lock().get(&trigger.msg_id).copied() };
        let Some(ctx) = ctx else {
            // Context removed by an in-flight Unsubscribe; nothing to do.
            return;
        };
        let now_ms = self.clock.now_ms();
        match self.run_transformer_query(&trigger.fetch_query, &trigger.algos, trigger.key, ctx, now_ms).await {
            Ok(diff) => {
                let _ = trigger.sink.deliver(TriggerEvent::Diff(diff));
            }
            Err(e) => {
                let _ = trigger.sink.deliver(TriggerEvent::Error(e));
                trigger.close();
            }
        }
    }

    fn send_fetch_error(reply_sink: &Arc<dyn ReplySink<FetchResponse>>, msg_id: [u8; 4], status: Status, message: impl Into<String>, now_ms: u64) {
        let _ = reply_sink.send(FetchResponse {
            msg_id,
            status,
            error: Some(message.into()),
            nodes: Vec::new(),
            embed: Vec::new(),
            delta: None,
            row_count: 0,
            cursor_index: None,
            length: 0,
            is_first: true,
            is_last: true,
            now: now_ms,
            seq: 0,
            end_seq: 0,
        });
    }

    // ---------------------------------------------------------------
    // Unsubscribe
    // ---------------------------------------------------------------

    #[instrument(skip(self, request))]
    pub fn handle_unsubscribe(&self, request: UnsubscribeRequest) -> UnsubscribeResponse {
        self.triggers.unsubscribe(&request.original_msg_id);
        self.trigger_ctx.lock().remove(&request.original_msg_id);
        UnsubscribeResponse { msg_id: request.original_msg_id, status: Status::Result, error: None }
    }

    // ---------------------------------------------------------------
    // WriteBlob
    // ---------------------------------------------------------------

    #[instrument(skip(self, request))]
    pub async fn handle_write_blob(&self, request: WriteBlobRequest) -> WriteBlobResponse {
        let node = match self.node_driver.get_node_by_id1(request.node_id1).await {
            Ok(Some(n)) => n,
            Ok(None) => return WriteBlobResponse::error(request.msg_id, Status::NotAllowed, "node not found"),
            Err(e) => return WriteBlobResponse::error(request.msg_id, e.status(), e.to_string()),
        };
        if !node.has_blob() {
            return WriteBlobResponse::error(request.msg_id, Status::NotAllowed, "node is not configured for a blob");
        }

        let ctx = PermissionContext { source: request.source_public_key, target: request.target_public_key };
        match self.node_driver.check_write_permission(&node, ctx).await {
            Ok(true) => {}
            Ok(false) => return WriteBlobResponse::error(request.msg_id, Status::NotAllowed, "write not permitted"),
            Err(e) => return WriteBlobResponse::error(request.msg_id, e.status(), e.to_string()),
        }

        let now_ms = self.clock.now_ms();
        let dataid = compute_dataid(&request.node_id1, &request.source_public_key);
        if let Some(source_id1) = request.copy_from_id1 {
            match self.blob_driver.copy_fragments_from(source_id1, dataid, now_ms).await {
                Ok(Some(_)) => {}
                Ok(None) => return WriteBlobResponse::error(request.msg_id, Status::NotAllowed, "copyFromId1 has no finalised blob"),
                Err(e) => return WriteBlobResponse::error(request.msg_id, e.status(), e.to_string()),
            }
        } else if let Err(e) = self.blob_driver.write_blob(dataid, request.pos, &request.data, now_ms).await {
            return WriteBlobResponse::error(request.msg_id, e.status(), e.to_string());
        }

        let current_length = match self.blob_driver.read_blob_intermediary_length(dataid).await {
            Ok(len) => len,
            Err(e) => return WriteBlobResponse::error(request.msg_id, e.status(), e.to_string()),
        };

        let blob_length = node.blob_length.unwrap_or(0);
        if current_length.unwrap_or(0) >= blob_length {
            let blob_hash = node.blob_hash.unwrap_or(openodin_core::ZERO_ID);
            match self.blob_driver.finalize_write_blob(request.node_id1, dataid, blob_length, blob_hash, now_ms).await {
                Ok(()) => self.on_blob_finalized(request.node_id1, now_ms, &request.mute_msg_ids).await,
                Err(Error::Exists { .. }) => {
                    return WriteBlobResponse { msg_id: request.msg_id, status: Status::Exists, error: None, current_length };
                }
                Err(e) => return WriteBlobResponse::error(request.msg_id, e.status(), e.to_string()),
            }
        }

        WriteBlobResponse { msg_id: request.msg_id, status: Status::Result, error: None, current_length }
    }

    /// Bumps the node's ancestor trail (§4.1) and awakens every trigger
    /// registered against the blob node itself or any ancestor, mirroring
    /// [`NodeDriver::bump_blob_node`]'s own parent-chain walk.
    async fn on_blob_finalized(&self, node_id1: Id, now_ms: u64, mute_msg_ids: &[[u8; 4]]) {
        if self.node_driver.bump_blob_node(node_id1, now_ms).await.is_err() {
            return;
        }
        self.awaken_and_run(node_id1, mute_msg_ids).await;

        let mut current = self.node_driver.get_node_by_id1(node_id1).await.ok().flatten();
        while let Some(node) = current {
            if node.is_root() {
                break;
            }
            let parent_id = node.parent_id;
            self.awaken_and_run(parent_id, mute_msg_ids).await;
            current = self.node_driver.get_node_by_id1(parent_id).await.ok().flatten();
        }
    }

    // ---------------------------------------------------------------
    // ReadBlob
    // ---------------------------------------------------------------

    #[instrument(skip(self, request))]
    pub async fn handle_read_blob(&self, request: ReadBlobRequest) -> ReadBlobResponse {
        let node = match self.node_driver.get_node_by_id1(request.node_id1).await {
            Ok(Some(n)) => n,
            Ok(None) => return ReadBlobResponse::error(request.msg_id, Status::NotAllowed, "node not found"),
            Err(e) => return ReadBlobResponse::error(request.msg_id, e.status(), e.to_string()),
        };

        let ctx = PermissionContext { source: request.source_public_key, target: request.target_public_key };
        match self.node_driver.check_read_permission(&node, ctx).await {
            Ok(true) => {}
            Ok(false) => return ReadBlobResponse::error(request.msg_id, Status::NotAllowed, "read not permitted"),
            Err(e) => return ReadBlobResponse::error(request.msg_id, e.status(), e.to_string()),
        }

        let length = request.length.min(MAX_READBLOB_LENGTH as u64);
        match self.blob_driver.read_blob(request.node_id1, request.pos, length).await {
            Ok(Some(data)) => ReadBlobResponse { msg_id: request.msg_id, status: Status::Result, error: None, data: Some(data) },
            Ok(None) => ReadBlobResponse::error(request.msg_id, Status::NotAllowed, "no finalized blob yet"),
            Err(e) => ReadBlobResponse::error(request.msg_id, e.status(), e.to_string()),
        }
    }

    // ---------------------------------------------------------------
    // GenericMessage
    // ---------------------------------------------------------------

    /// §4.1 "explicitly a no-op ... not implemented at this layer": the
    /// outer peer layer owns whatever custom action namespace it wants to
    /// support, this core only guarantees it never silently swallows one.
    pub fn handle_generic_message(&self, request: GenericMessageRequest) -> GenericResponse {
        GenericResponse {
            msg_id: request.msg_id,
            status: Status::Error,
            error: Some(format!("action '{}' not implemented at this layer", request.action)),
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::CollectorSink;
    use crate::requests::FetchTransform;
    use openodin_core::{KeyType, ManualClock, NodeFlags, Transient, ZERO_ID};
    use openodin_crypto::SecretKey;
    use openodin_node_driver::types::{FetchQuery, Seed};

    fn engine() -> (StorageEngine, SecretKey) {
        let node_driver = NodeDriver::open_in_memory().unwrap();
        let blob_driver_path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let blob_driver = BlobDriver::open(&blob_driver_path).unwrap();
        let offloader = SignatureOffloader::new(2);
        let sk = SecretKey::generate(KeyType::Ed25519);
        offloader.add_key_pair(sk.clone());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000_000));
        let engine = StorageEngine::new(node_driver, blob_driver, offloader, clock, EngineConfig::default());
        (engine, sk)
    }

    fn unsigned_node(owner: openodin_core::PublicKey, parent_id: Id, creation_time: u64, has_blob: bool) -> Node {
        Node {
            id1: ZERO_ID,
            id2: None,
            parent_id,
            owner,
            creation_time,
            expire_time: None,
            region: None,
            jurisdiction: None,
            flags: NodeFlags { is_public: true, ..Default::default() },
            node_type: b"data".to_vec(),
            content_type: None,
            data: vec![1, 2, 3],
            blob_hash: if has_blob { Some([7u8; 32]) } else { None },
            blob_length: if has_blob { Some(3) } else { None },
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

    #[tokio::test]
    async fn store_then_fetch_round_trip() {
        let (engine, sk) = engine();
        let node = engine.sign_node(unsigned_node(sk.public_key(), ZERO_ID, 1_000, false)).await.unwrap();

        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 1],
            nodes: vec![encode_node(&node).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        let store_resp = engine.handle_store(store_req, &StorePermissions::default()).await;
        assert_eq!(store_resp.status, Status::Result);
        assert_eq!(store_resp.stored_id1s, vec![node.id1]);

        let fetch_req = FetchRequest {
            msg_id: [0, 0, 0, 2],
            query: FetchQuery::children_of(ZERO_ID),
            transform: None,
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
        };
        let sink: Arc<CollectorSink<FetchResponse>> = Arc::new(CollectorSink::new());
        engine.handle_fetch(fetch_req, &FetchPermissions::default(), sink.clone()).await;
        let replies = sink.take();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status, Status::Result);
        assert_eq!(replies[0].nodes.len(), 1);
        assert_eq!(decode_node(&replies[0].nodes[0]).unwrap().id1, node.id1);
    }

    #[tokio::test]
    async fn malformed_node_type_rejects_whole_batch() {
        let (engine, sk) = engine();
        let node = engine.sign_node(unsigned_node(sk.public_key(), ZERO_ID, 1_000, false)).await.unwrap();
        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 1],
            nodes: vec![encode_node(&node).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        let perms = StorePermissions { allow_store: true, allow_preserve_transient: false, allowed_node_types: Some(vec![b"other".to_vec()]) };
        let resp = engine.handle_store(store_req, &perms).await;
        assert_eq!(resp.status, Status::NotAllowed);
    }

    #[tokio::test]
    async fn subscription_delivers_seed_then_diff_on_insert() {
        let (engine, sk) = engine();
        let fetch_req = FetchRequest {
            msg_id: [0, 0, 0, 5],
            query: FetchQuery::children_of(ZERO_ID),
            transform: Some(FetchTransform { algos: vec![AlgoKind::Sorted] }),
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
        };
        let mut query = fetch_req.query.clone();
        query.trigger_node_id = Some(ZERO_ID);
        let fetch_req = FetchRequest { query, ..fetch_req };

        let sink: Arc<CollectorSink<FetchResponse>> = Arc::new(CollectorSink::new());
        engine.handle_fetch(fetch_req, &FetchPermissions::default(), sink.clone()).await;
        assert_eq!(sink.take().len(), 1);

        let node = engine.sign_node(unsigned_node(sk.public_key(), ZERO_ID, 1_000, false)).await.unwrap();
        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 1],
            nodes: vec![encode_node(&node).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        engine.handle_store(store_req, &StorePermissions::default()).await;

        let diffs = sink.take();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].nodes.len(), 1);
        assert!(diffs[0].delta.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_deliveries() {
        let (engine, sk) = engine();
        let mut query = FetchQuery::children_of(ZERO_ID);
        query.trigger_node_id = Some(ZERO_ID);
        let fetch_req = FetchRequest {
            msg_id: [0, 0, 0, 9],
            query,
            transform: None,
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
        };
        let sink: Arc<CollectorSink<FetchResponse>> = Arc::new(CollectorSink::new());
        engine.handle_fetch(fetch_req, &FetchPermissions::default(), sink.clone()).await;
        sink.take();

        let unsub = UnsubscribeRequest { original_msg_id: [0, 0, 0, 9], target_public_key: sk.public_key() };
        let resp = engine.handle_unsubscribe(unsub);
        assert_eq!(resp.status, Status::Result);

        let node = engine.sign_node(unsigned_node(sk.public_key(), ZERO_ID, 1_000, false)).await.unwrap();
        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 2],
            nodes: vec![encode_node(&node).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        engine.handle_store(store_req, &StorePermissions::default()).await;
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn write_blob_then_read_blob_round_trip() {
        let (engine, sk) = engine();
        let node = engine.sign_node(unsigned_node(sk.public_key(), ZERO_ID, 1_000, true)).await.unwrap();
        let payload = b"abc".to_vec();
        let hash = openodin_crypto::hash(&payload);
        let mut node = node;
        node.blob_hash = Some(hash);
        node.blob_length = Some(payload.len() as u64);
        node.id1 = openodin_codec::compute_id1(&node).unwrap();
        node.signatures.clear();
        let node = engine.sign_node(node).await.unwrap();

        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 1],
            nodes: vec![encode_node(&node).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        engine.handle_store(store_req, &StorePermissions::default()).await;

        let write_req = WriteBlobRequest {
            msg_id: [0, 0, 0, 2],
            node_id1: node.id1,
            data: payload.clone(),
            pos: 0,
            copy_from_id1: None,
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
        };
        let write_resp = engine.handle_write_blob(write_req).await;
        assert_eq!(write_resp.status, Status::Result);
        assert_eq!(write_resp.current_length, Some(3));

        let read_req =
            ReadBlobRequest { msg_id: [0, 0, 0, 3], node_id1: node.id1, pos: 0, length: 3, source_public_key: sk.public_key(), target_public_key: sk.public_key() };
        let read_resp = engine.handle_read_blob(read_req).await;
        assert_eq!(read_resp.status, Status::Result);
        assert_eq!(read_resp.data, Some(payload));
    }

    #[tokio::test]
    async fn generic_message_is_not_implemented_here() {
        let (engine, _sk) = engine();
        let resp = engine.handle_generic_message(GenericMessageRequest { msg_id: [0, 0, 0, 1], action: "ping".into(), data: vec![] });
        assert_eq!(resp.status, Status::Error);
        assert!(resp.error.unwrap().contains("not implemented"));
    }

    #[tokio::test]
    async fn missing_cursor_reports_as_missing_cursor_status() {
        let (engine, sk) = engine();
        let mut query = FetchQuery::children_of(ZERO_ID);
        query.cursor_id1 = Some([0xaa; 32]);
        let fetch_req =
            FetchRequest { msg_id: [0, 0, 0, 1], query, transform: None, source_public_key: sk.public_key(), target_public_key: sk.public_key(), mute_msg_ids: vec![] };
        let sink: Arc<CollectorSink<FetchResponse>> = Arc::new(CollectorSink::new());
        engine.handle_fetch(fetch_req, &FetchPermissions::default(), sink.clone()).await;
        let replies = sink.take();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status, Status::MissingCursor);
    }

    #[tokio::test]
    async fn write_blob_copy_from_id1_duplicates_without_payload() {
        let (engine, sk) = engine();
        let payload = b"shared".to_vec();
        let hash = openodin_crypto::hash(&payload);

        let mut source = unsigned_node(sk.public_key(), ZERO_ID, 1_000, true);
        source.blob_hash = Some(hash);
        source.blob_length = Some(payload.len() as u64);
        source.id1 = openodin_codec::compute_id1(&source).unwrap();
        let source = engine.sign_node(source).await.unwrap();

        let mut target = unsigned_node(sk.public_key(), ZERO_ID, 1_001, true);
        target.blob_hash = Some(hash);
        target.blob_length = Some(payload.len() as u64);
        target.id1 = openodin_codec::compute_id1(&target).unwrap();
        let target = engine.sign_node(target).await.unwrap();

        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 1],
            nodes: vec![encode_node(&source).unwrap(), encode_node(&target).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        engine.handle_store(store_req, &StorePermissions::default()).await;

        let write_source = WriteBlobRequest {
            msg_id: [0, 0, 0, 2],
            node_id1: source.id1,
            data: payload.clone(),
            pos: 0,
            copy_from_id1: None,
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
        };
        let resp = engine.handle_write_blob(write_source).await;
        assert_eq!(resp.status, Status::Result);

        let write_copy = WriteBlobRequest {
            msg_id: [0, 0, 0, 3],
            node_id1: target.id1,
            data: vec![],
            pos: 0,
            copy_from_id1: Some(source.id1),
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
        };
        let resp = engine.handle_write_blob(write_copy).await;
        assert_eq!(resp.status, Status::Result);

        let read_req = ReadBlobRequest {
            msg_id: [0, 0, 0, 4],
            node_id1: target.id1,
            pos: 0,
            length: payload.len() as u64,
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
        };
        let read_resp = engine.handle_read_blob(read_req).await;
        assert_eq!(read_resp.status, Status::Result);
        assert_eq!(read_resp.data, Some(payload));
    }

    #[tokio::test]
    async fn expired_node_gc_reclaims_past_expiry() {
        let (engine, sk) = engine();
        let mut node = unsigned_node(sk.public_key(), ZERO_ID, 1_000, false);
        node.expire_time = Some(1_500);
        node.id1 = openodin_codec::compute_id1(&node).unwrap();
        let node = engine.sign_node(node).await.unwrap();

        let store_req = StoreRequest {
            msg_id: [0, 0, 0, 1],
            nodes: vec![encode_node(&node).unwrap()],
            source_public_key: sk.public_key(),
            target_public_key: sk.public_key(),
            mute_msg_ids: vec![],
            preserve_transient: false,
            batch_id: None,
            has_more: false,
        };
        engine.handle_store(store_req, &StorePermissions::default()).await;

        let expired = engine.node_driver.get_expired_node_id1s(2_000, 100).await.unwrap();
        assert_eq!(expired, vec![node.id1]);
        let removed = engine.node_driver.delete_nodes(&expired).await.unwrap();
        assert_eq!(removed, 1);
        assert!(engine.node_driver.get_node_by_id1(node.id1).await.unwrap().is_none());
    }

    // Keep Seed import referenced for the engine-level fetch tests above.
    #[allow(dead_code)]
    fn _unused(_: Seed) {}
}
