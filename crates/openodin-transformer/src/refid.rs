//! AlgoRefId (id 2): a tree keyed by each node's referent, flattened into
//! depth-major levels for emission (§4.3).
//!
//! The distilled spec names a `refId` field; the node model this core
//! carries has no separate field for it; §9's open question treats the
//! source's differing type/field names as a superset to reconcile, so
//! this algorithm resolves `refId` onto the existing `parent_id` — every
//! node already names its referent there, and using it here keeps a
//! referencing node sorting strictly after its referent exactly as §4.3
//! requires (recorded in DESIGN.md).

use std::collections::HashMap;

use openodin_core::{Id, Node, ZERO_ID};

use crate::algo::{window, AddOutcome, TransformerAlgo};

struct NodeMeta {
    parent_id: Id,
    creation_time: u64,
    transient_hash: Id,
}

pub struct AlgoRefId {
    descending: bool,
    nodes: HashMap<Id, NodeMeta>,
    ordered: Vec<Id>,
    dirty: bool,
}

impl AlgoRefId {
    pub fn new(descending: bool) -> Self {
        Self {
            descending,
            nodes: HashMap::new(),
            ordered: Vec::new(),
            dirty: false,
        }
    }

    fn transient_hash(node: &Node) -> Id {
        openodin_codec::compute_transienthash(node).unwrap_or(ZERO_ID)
    }

    /// Depth of `id` within the current view: `0` for a root or a node
    /// whose `parent_id` isn't (yet) in the view, else `1 + depth(parent)`.
    /// Guards against cycles (impossible for content-addressed nodes, but
    /// cheap to guard) by tracking the visited set.
    fn depth_of(&self, id: Id) -> usize {
        let mut current = id;
        let mut seen = std::collections::HashSet::new();
        let mut depth = 0usize;
        loop {
            if !seen.insert(current) {
                return depth;
            }
            let Some(meta) = self.nodes.get(&current) else {
                return depth;
            };
            if meta.parent_id == ZERO_ID {
                return depth;
            }
            if !self.nodes.contains_key(&meta.parent_id) {
                return depth;
            }
            current = meta.parent_id;
            depth += 1;
        }
    }

    fn rebuild(&mut self) {
        if !self.dirty {
            return;
        }
        let mut by_depth: HashMap<usize, Vec<Id>> = HashMap::new();
        let mut max_depth = 0usize;
        for &id in self.nodes.keys() {
            let depth = self.depth_of(id);
            max_depth = max_depth.max(depth);
            by_depth.entry(depth).or_default().push(id);
        }
        let mut ordered = Vec::with_capacity(self.nodes.len());
        for depth in 0..=max_depth {
            if let Some(mut level) = by_depth.remove(&depth) {
                level.sort_by(|a, b| {
                    let ma = &self.nodes[a];
                    let mb = &self.nodes[b];
                    (ma.creation_time, *a).cmp(&(mb.creation_time, *b))
                });
                ordered.extend(level);
            }
        }
        self.ordered = ordered;
        self.dirty = false;
    }

    fn public_order(&mut self) -> Vec<Id> {
        self.rebuild();
        if self.descending {
            self.ordered.iter().rev().copied().collect()
        } else {
            self.ordered.clone()
        }
    }
}

impl TransformerAlgo for AlgoRefId {
    fn add(&mut self, nodes: &[Node]) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        for node in nodes {
            let transient_hash = Self::transient_hash(node);
            match self.nodes.get_mut(&node.id1) {
                Some(existing) => {
                    if existing.transient_hash != transient_hash {
                        existing.transient_hash = transient_hash;
                        outcome.transient_updated.push(node.id1);
                    }
                }
                None => {
                    self.nodes.insert(
                        node.id1,
                        NodeMeta {
                            parent_id: node.parent_id,
                            creation_time: node.creation_time,
                            transient_hash,
                        },
                    );
                    outcome.newly_inserted.push(node.id1);
                    self.dirty = true;
                }
            }
        }
        outcome
    }

    fn delete(&mut self, indexes: &[usize]) {
        let public = self.public_order();
        for &i in indexes {
            if let Some(id) = public.get(i) {
                self.nodes.remove(id);
                self.dirty = true;
            }
        }
    }

    fn get(
        &mut self,
        cursor_id1: Option<Id>,
        head: i64,
        tail: i64,
        reverse: bool,
        max_len: usize,
    ) -> Option<(Vec<Id>, Vec<usize>)> {
        let public = self.public_order();
        window(&public, cursor_id1, head, tail, reverse, max_len)
    }

    fn get_indexes(&mut self, ids: &[Id]) -> Vec<Option<usize>> {
        let public = self.public_order();
        ids.iter().map(|id| public.iter().position(|x| x == id)).collect()
    }

    fn get_length(&mut self) -> usize {
        self.nodes.len()
    }

    fn get_all_nodes(&mut self) -> Vec<Id> {
        self.public_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::{KeyType, NodeFlags, Transient};
    use openodin_crypto::SecretKey;

    fn node(id1_tag: u8, parent_tag: u8, creation_time: u64) -> Node {
        let sk = SecretKey::generate(KeyType::Ed25519);
        let parent_id = if parent_tag == 0 { ZERO_ID } else { [parent_tag; 32] };
        Node {
            id1: [id1_tag; 32],
            id2: None,
            parent_id,
            owner: sk.public_key(),
            creation_time,
            expire_time: None,
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
    fn referent_sorts_before_referencer() {
        let mut algo = AlgoRefId::new(false);
        // child (id=2) references parent (id=1); inserted out of order.
        let child = node(2, 1, 100);
        let parent = node(1, 0, 200);
        algo.add(&[child, parent]);
        let ordered = algo.get_all_nodes();
        let pos_parent = ordered.iter().position(|x| *x == [1u8; 32]).unwrap();
        let pos_child = ordered.iter().position(|x| *x == [2u8; 32]).unwrap();
        assert!(pos_parent < pos_child);
    }

    #[test]
    fn same_level_orders_by_creation_time_then_id1() {
        let mut algo = AlgoRefId::new(false);
        let a = node(5, 0, 200);
        let b = node(3, 0, 100);
        algo.add(&[a, b]);
        assert_eq!(algo.get_all_nodes(), vec![[3u8; 32], [5u8; 32]]);
    }

    #[test]
    fn grandchild_sorts_after_grandparent_and_parent() {
        let mut algo = AlgoRefId::new(false);
        let grandchild = node(3, 2, 50);
        let child = node(2, 1, 40);
        let root = node(1, 0, 10);
        algo.add(&[grandchild, child, root]);
        assert_eq!(
            algo.get_all_nodes(),
            vec![[1u8; 32], [2u8; 32], [3u8; 32]]
        );
    }

    #[test]
    fn unknown_parent_is_treated_as_its_own_root_level() {
        let mut algo = AlgoRefId::new(false);
        // parent 9 never arrives in the view.
        let orphan = node(4, 9, 100);
        algo.add(&[orphan]);
        assert_eq!(algo.get_all_nodes(), vec![[4u8; 32]]);
    }

    #[test]
    fn add_is_idempotent_and_reports_transient_changes() {
        let mut algo = AlgoRefId::new(false);
        let mut n = node(1, 0, 100);
        algo.add(std::slice::from_ref(&n));
        n.transient.storage_time = Some(42);
        let outcome = algo.add(std::slice::from_ref(&n));
        assert_eq!(outcome.transient_updated, vec![[1u8; 32]]);
        assert_eq!(algo.get_length(), 1);
    }
}
