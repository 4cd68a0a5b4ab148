//! Fetch request types (§4.2 "Fetch algorithm"). A total, explicit
//! representation of the wire `FetchQuery` rather than the dynamic-JSON
//! schema the outer peer layer parses (§9 "represent requests as tagged
//! variants with explicit fields").

use openodin_core::{Id, PublicKey};

/// Comparison operators usable in a [`Filter`] (§4.2 step 2d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bytes(Vec<u8>),
    Text(String),
    Number(i64),
}

/// A single typed-field comparison within a [`MatchSpec`].
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: CmpOp,
    pub value: FieldValue,
}

/// `−1` means "unbounded" for both `limit` and `depth` per §4.2.
pub const UNBOUNDED: i64 = -1;

/// One disjunct of the match set (§4.2 step 2d). Matches are tried in
/// order; the first whose `node_type` and `filters` all pass wins.
#[derive(Debug, Clone)]
pub struct MatchSpec {
    pub node_type: Vec<u8>,
    pub filters: Vec<Filter>,
    pub limit: i64,
    pub limit_field: Option<String>,
    pub level: Option<u32>,
    pub require_id: Option<Id>,
    pub discard: bool,
    pub bottom: bool,
    pub cursor_id1: Option<Id>,
}

impl Default for MatchSpec {
    fn default() -> Self {
        Self {
            node_type: Vec::new(),
            filters: Vec::new(),
            limit: UNBOUNDED,
            limit_field: None,
            level: None,
            require_id: None,
            discard: false,
            bottom: false,
            cursor_id1: None,
        }
    }
}

/// An embedded-node expansion rule (§4.2 step 3).
#[derive(Debug, Clone)]
pub struct EmbedSpec {
    pub node_type: Vec<u8>,
    pub filters: Vec<Filter>,
}

/// The seed of a fetch: either an explicit root or the children of a
/// parent id (§4.2 step 1).
#[derive(Debug, Clone)]
pub enum Seed {
    RootNodeId1(Id),
    ParentId(Id),
}

#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub seed: Seed,
    pub depth: i64,
    pub matches: Vec<MatchSpec>,
    pub embed: Vec<EmbedSpec>,
    pub descending: bool,
    pub order_by_storage_time: bool,
    pub ignore_own: bool,
    pub ignore_inactive: bool,
    pub discard_root: bool,
    pub preserve_transient: bool,
    pub include_licenses: bool,
    pub region: Option<[u8; 2]>,
    pub jurisdiction: Option<[u8; 2]>,
    pub cutoff_time: Option<u64>,
    pub cursor_id1: Option<Id>,
    pub head: i64,
    pub tail: i64,
    pub reverse: bool,
    pub trigger_node_id: Option<Id>,
    pub trigger_interval: Option<u64>,
}

impl FetchQuery {
    pub fn children_of(parent_id: Id) -> Self {
        Self {
            seed: Seed::ParentId(parent_id),
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
            head: 0,
            tail: 0,
            reverse: false,
            trigger_node_id: None,
            trigger_interval: None,
        }
    }
}

/// `(source, target)` pair permission checks are evaluated against
/// (§4.2 step 2c). `source` is the peer making the request; `target` is
/// the key the request is addressed as (usually the same, but e.g. a
/// relay forwards on behalf of another key).
#[derive(Debug, Clone, Copy)]
pub struct PermissionContext {
    pub source: PublicKey,
    pub target: PublicKey,
}

/// One row surviving the walk, ready to be emitted or embedded.
#[derive(Debug, Clone)]
pub struct FetchedNode {
    pub node: openodin_core::Node,
    /// `[self, parent, grandparent, ...]` up to the query root, used for
    /// license parent-path checks (§4.2 step 2c).
    pub ancestors: Vec<Id>,
}
