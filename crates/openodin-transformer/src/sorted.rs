//! AlgoSorted (id 1): a flat vector ordered by `creationTime` (or
//! `storagetime`), tie-broken by `id1` bytewise compare (§4.3).

use std::collections::HashMap;

use openodin_core::{Id, Node};

use crate::algo::{window, AddOutcome, TransformerAlgo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    time: u64,
    id1: Id,
}

struct Entry {
    key: OrderKey,
    transient_hash: Id,
}

pub struct AlgoSorted {
    order_by_storage_time: bool,
    descending: bool,
    entries: HashMap<Id, Entry>,
    /// Kept sorted ascending by `OrderKey`; `descending` only flips how the
    /// public-facing ordering reads, not how positions are stored.
    ordered: Vec<Id>,
}

impl AlgoSorted {
    pub fn new(order_by_storage_time: bool, descending: bool) -> Self {
        Self {
            order_by_storage_time,
            descending,
            entries: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    fn order_key(&self, node: &Node) -> OrderKey {
        let time = if self.order_by_storage_time {
            node.transient.storage_time.unwrap_or(node.creation_time)
        } else {
            node.creation_time
        };
        OrderKey { time, id1: node.id1 }
    }

    fn transient_hash(node: &Node) -> Id {
        openodin_codec::compute_transienthash(node).unwrap_or(openodin_core::ZERO_ID)
    }

    fn insert_sorted(&mut self, id1: Id, key: OrderKey) {
        let pos = self.ordered.partition_point(|existing| self.entries[existing].key < key);
        self.ordered.insert(pos, id1);
    }

    fn public_order(&self) -> Vec<Id> {
        if self.descending {
            self.ordered.iter().rev().copied().collect()
        } else {
            self.ordered.clone()
        }
    }
}

impl TransformerAlgo for AlgoSorted {
    fn add(&mut self, nodes: &[Node]) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        for node in nodes {
            let key = self.order_key(node);
            let transient_hash = Self::transient_hash(node);
            match self.entries.get_mut(&node.id1) {
                Some(entry) => {
                    if entry.transient_hash != transient_hash {
                        entry.transient_hash = transient_hash;
                        outcome.transient_updated.push(node.id1);
                    }
                }
                None => {
                    self.entries.insert(node.id1, Entry { key, transient_hash });
                    self.insert_sorted(node.id1, key);
                    outcome.newly_inserted.push(node.id1);
                }
            }
        }
        outcome
    }

    fn delete(&mut self, indexes: &[usize]) {
        let public = self.public_order();
        let to_remove: Vec<Id> = indexes.iter().filter_map(|&i| public.get(i).copied()).collect();
        for id in to_remove {
            if let Some(pos) = self.ordered.iter().position(|x| *x == id) {
                self.ordered.remove(pos);
            }
            self.entries.remove(&id);
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
        self.ordered.len()
    }

    fn get_all_nodes(&mut self) -> Vec<Id> {
        self.public_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::{KeyType, NodeFlags, Transient, ZERO_ID};
    use openodin_crypto::SecretKey;

    fn node(creation_time: u64, id1_tag: u8) -> Node {
        let sk = SecretKey::generate(KeyType::Ed25519);
        Node {
            id1: [id1_tag; 32],
            id2: None,
            parent_id: ZERO_ID,
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
    fn orders_ascending_by_creation_time() {
        let mut algo = AlgoSorted::new(false, false);
        let nodes = vec![node(300, 3), node(100, 1), node(200, 2)];
        algo.add(&nodes);
        assert_eq!(algo.get_all_nodes(), vec![[1u8; 32], [2u8; 32], [3u8; 32]]);
    }

    #[test]
    fn descending_reverses_public_order() {
        let mut algo = AlgoSorted::new(false, true);
        let nodes = vec![node(100, 1), node(200, 2)];
        algo.add(&nodes);
        assert_eq!(algo.get_all_nodes(), vec![[2u8; 32], [1u8; 32]]);
    }

    #[test]
    fn tie_break_by_id1_bytewise() {
        let mut algo = AlgoSorted::new(false, false);
        let nodes = vec![node(100, 9), node(100, 1)];
        algo.add(&nodes);
        assert_eq!(algo.get_all_nodes(), vec![[1u8; 32], [9u8; 32]]);
    }

    #[test]
    fn add_is_idempotent() {
        let mut algo = AlgoSorted::new(false, false);
        let n = node(100, 1);
        let first = algo.add(std::slice::from_ref(&n));
        let second = algo.add(std::slice::from_ref(&n));
        assert_eq!(first.newly_inserted, vec![[1u8; 32]]);
        assert!(second.newly_inserted.is_empty());
        assert!(second.transient_updated.is_empty());
        assert_eq!(algo.get_length(), 1);
    }

    #[test]
    fn transient_change_is_reported_without_moving_position() {
        let mut algo = AlgoSorted::new(false, false);
        let mut n = node(100, 1);
        algo.add(std::slice::from_ref(&n));
        n.transient.storage_time = Some(5);
        let outcome = algo.add(std::slice::from_ref(&n));
        assert_eq!(outcome.transient_updated, vec![[1u8; 32]]);
        assert_eq!(algo.get_length(), 1);
    }

    #[test]
    fn delete_removes_by_public_index() {
        let mut algo = AlgoSorted::new(false, false);
        let nodes = vec![node(100, 1), node(200, 2), node(300, 3)];
        algo.add(&nodes);
        algo.delete(&[1]);
        assert_eq!(algo.get_all_nodes(), vec![[1u8; 32], [3u8; 32]]);
    }
}
