//! The wire / request surface (§6): binary-framed requests and responses
//! consumed by this core and produced by the outer peer layer. Requests
//! are represented as tagged variants with explicit fields (§9 "represent
//! requests as tagged variants... validation is a total function returning
//! `Result<Request, MalformedReason>`") rather than the dynamic-JSON
//! schema the real wire parser decodes from.

use openodin_core::{Id, PublicKey, Status};
use openodin_node_driver::types::FetchQuery;
use openodin_transformer::AlgoKind;

/// `transform?: FetchTransform` on a [`FetchRequest`] (§6). Selecting one
/// or more algos is what turns a plain streamed fetch into a subscribed,
/// transformer-backed one (§4.1 "Builds a `Transformer` if
/// `transform.algos` is non-empty").
#[derive(Debug, Clone)]
pub struct FetchTransform {
    pub algos: Vec<AlgoKind>,
}

/// A peer's store-side permission grant, checked by the `Store` handler
/// (§4.1, §7 MALFORMED). Out of scope per §1 is *how* these are parsed
/// from a peer connection's configuration; this struct is the total,
/// explicit shape the engine consumes.
#[derive(Debug, Clone)]
pub struct StorePermissions {
    pub allow_store: bool,
    pub allow_preserve_transient: bool,
    /// `None` = any node type permitted.
    pub allowed_node_types: Option<Vec<Vec<u8>>>,
}

impl Default for StorePermissions {
    fn default() -> Self {
        Self { allow_store: true, allow_preserve_transient: false, allowed_node_types: None }
    }
}

/// A peer's fetch-side permission grant, checked by the `Fetch` handler
/// (§4.1 "validates `fetchPermissions` against requested node types,
/// filters, and `allowTrigger`").
#[derive(Debug, Clone)]
pub struct FetchPermissions {
    pub allow_fetch: bool,
    pub allow_trigger: bool,
    pub allowed_node_types: Option<Vec<Vec<u8>>>,
}

impl Default for FetchPermissions {
    fn default() -> Self {
        Self { allow_fetch: true, allow_trigger: true, allowed_node_types: None }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub msg_id: [u8; 4],
    pub query: FetchQuery,
    pub transform: Option<FetchTransform>,
    pub source_public_key: PublicKey,
    pub target_public_key: PublicKey,
    pub mute_msg_ids: Vec<[u8; 4]>,
}

#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub msg_id: [u8; 4],
    /// Each entry is a fully-formed node encoding (§9 "never pass arbitrary
    /// messages" — the offloader re-validates before signing/verifying).
    pub nodes: Vec<Vec<u8>>,
    pub source_public_key: PublicKey,
    pub target_public_key: PublicKey,
    pub mute_msg_ids: Vec<[u8; 4]>,
    pub preserve_transient: bool,
    pub batch_id: Option<u64>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct UnsubscribeRequest {
    pub original_msg_id: [u8; 4],
    pub target_public_key: PublicKey,
}

#[derive(Debug, Clone)]
pub struct WriteBlobRequest {
    pub msg_id: [u8; 4],
    pub node_id1: Id,
    pub data: Vec<u8>,
    pub pos: u64,
    pub copy_from_id1: Option<Id>,
    pub source_public_key: PublicKey,
    pub target_public_key: PublicKey,
    pub mute_msg_ids: Vec<[u8; 4]>,
}

#[derive(Debug, Clone)]
pub struct ReadBlobRequest {
    pub msg_id: [u8; 4],
    pub node_id1: Id,
    pub pos: u64,
    pub length: u64,
    pub source_public_key: PublicKey,
    pub target_public_key: PublicKey,
}

/// Pass-through (§1 Non-goals, §4.1 "explicitly a no-op ... not
/// implemented at this layer").
#[derive(Debug, Clone)]
pub struct GenericMessageRequest {
    pub msg_id: [u8; 4],
    pub action: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub msg_id: [u8; 4],
    pub status: Status,
    pub error: Option<String>,
    pub nodes: Vec<Vec<u8>>,
    /// Present only on the chunk carrying ancillary arrays (§4.1 "ancillary
    /// arrays (indexes, extras) appear only on the last chunk").
    pub embed: Vec<Vec<u8>>,
    pub delta: Option<Vec<u8>>,
    pub row_count: usize,
    pub cursor_index: Option<usize>,
    pub length: usize,
    pub is_first: bool,
    pub is_last: bool,
    pub now: u64,
    pub seq: u32,
    pub end_seq: u32,
}

#[derive(Debug, Clone)]
pub struct StoreResponse {
    pub msg_id: [u8; 4],
    pub status: Status,
    pub error: Option<String>,
    pub stored_id1s: Vec<Id>,
}

impl StoreResponse {
    pub fn error(msg_id: [u8; 4], status: Status, message: impl Into<String>) -> Self {
        Self { msg_id, status, error: Some(message.into()), stored_id1s: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct UnsubscribeResponse {
    pub msg_id: [u8; 4],
    pub status: Status,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WriteBlobResponse {
    pub msg_id: [u8; 4],
    pub status: Status,
    pub error: Option<String>,
    pub current_length: Option<u64>,
}

impl WriteBlobResponse {
    pub fn error(msg_id: [u8; 4], status: Status, message: impl Into<String>) -> Self {
        Self { msg_id, status, error: Some(message.into()), current_length: None }
    }
}

#[derive(Debug, Clone)]
pub struct ReadBlobResponse {
    pub msg_id: [u8; 4],
    pub status: Status,
    pub error: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl ReadBlobResponse {
    pub fn error(msg_id: [u8; 4], status: Status, message: impl Into<String>) -> Self {
        Self { msg_id, status, error: Some(message.into()), data: None }
    }
}

#[derive(Debug, Clone)]
pub struct GenericResponse {
    pub msg_id: [u8; 4],
    pub status: Status,
    pub error: Option<String>,
    pub data: Vec<u8>,
}
