//! `Transformer`: the `id1`-keyed ordered view plus diff emission that a
//! [`crate::algo::TransformerAlgo`] drives (§4.3).

use std::collections::HashMap;
use std::sync::Arc;

use openodin_core::constants::MAX_TRANSFORMER_LENGTH;
use openodin_core::{Error, Id, Node, Result};

use crate::algo::{AddOutcome, TransformerAlgo};
use crate::delta::fossil_delta;

fn joined_hex(ids: &[Id]) -> Vec<u8> {
    let parts: Vec<String> = ids.iter().map(openodin_core::hex_encode).collect();
    parts.join(" ").into_bytes()
}

/// What a fetch cycle emits to a trigger's sink (§4.3 "Diff emission").
#[derive(Debug, Clone)]
pub struct EmittedDiff {
    pub ordered_ids: Vec<Id>,
    pub added: Vec<Arc<Node>>,
    pub transient_updated: Vec<Arc<Node>>,
    /// `None` on the first emission (full window ships instead).
    pub delta: Option<Vec<u8>>,
}

struct EmissionState {
    joined: Vec<u8>,
    transient_hashes: HashMap<Id, Id>,
}

pub struct Transformer {
    algo: Box<dyn TransformerAlgo>,
    nodes: HashMap<Id, Arc<Node>>,
    last_emission: Option<EmissionState>,
}

impl Transformer {
    pub fn new(algo: Box<dyn TransformerAlgo>) -> Self {
        Self { algo, nodes: HashMap::new(), last_emission: None }
    }

    /// (§4.3 "idempotent; rejects beyond `MAX_TRANSFORMER_LENGTH`").
    pub fn add(&mut self, nodes: Vec<Node>) -> Result<AddOutcome> {
        let projected = self.algo.get_length() + nodes.iter().filter(|n| !self.nodes.contains_key(&n.id1)).count();
        if projected > MAX_TRANSFORMER_LENGTH {
            return Err(Error::internal("transformer overflow: MAX_TRANSFORMER_LENGTH exceeded"));
        }
        let outcome = self.algo.add(&nodes);
        for node in nodes {
            self.nodes.insert(node.id1, Arc::new(node));
        }
        Ok(outcome)
    }

    pub fn delete(&mut self, indexes: &[usize]) {
        let ids: Vec<Id> = {
            let all = self.algo.get_all_nodes();
            indexes.iter().filter_map(|&i| all.get(i).copied()).collect()
        };
        self.algo.delete(indexes);
        for id in ids {
            self.nodes.remove(&id);
        }
    }

    pub fn get(
        &mut self,
        cursor_id1: Option<Id>,
        head: i64,
        tail: i64,
        reverse: bool,
    ) -> Option<(Vec<Arc<Node>>, Vec<usize>)> {
        let (ids, indexes) = self.algo.get(cursor_id1, head, tail, reverse, MAX_TRANSFORMER_LENGTH)?;
        let nodes = ids.iter().map(|id| self.nodes[id].clone()).collect();
        Some((nodes, indexes))
    }

    pub fn get_indexes(&mut self, nodes: &[Id]) -> Vec<Option<usize>> {
        self.algo.get_indexes(nodes)
    }

    pub fn get_length(&mut self) -> usize {
        self.algo.get_length()
    }

    pub fn get_all_nodes(&mut self) -> Vec<Arc<Node>> {
        self.algo.get_all_nodes().iter().map(|id| self.nodes[id].clone()).collect()
    }

    /// Runs one fetch cycle's diff computation (§4.3 "Diff emission"):
    /// compares the new ordering against the last emitted one, computes
    /// the Fossil-style byte delta of the space-joined hex id sequence,
    /// and collects the added/transient-changed nodes still in the window.
    pub fn emit(&mut self) -> EmittedDiff {
        let ordered_ids = self.algo.get_all_nodes();
        let joined = joined_hex(&ordered_ids);
        let mut transient_hashes = HashMap::with_capacity(ordered_ids.len());
        for id in &ordered_ids {
            let hash = openodin_codec::compute_transienthash(&self.nodes[id]).unwrap_or(openodin_core::ZERO_ID);
            transient_hashes.insert(*id, hash);
        }

        let (added, transient_updated, delta) = match &self.last_emission {
            None => {
                let added = ordered_ids.iter().map(|id| self.nodes[id].clone()).collect();
                (added, Vec::new(), None)
            }
            Some(prev) => {
                let mut added = Vec::new();
                let mut transient_updated = Vec::new();
                for id in &ordered_ids {
                    match prev.transient_hashes.get(id) {
                        None => added.push(self.nodes[id].clone()),
                        Some(prev_hash) => {
                            if *prev_hash != transient_hashes[id] {
                                transient_updated.push(self.nodes[id].clone());
                            }
                        }
                    }
                }
                let delta = fossil_delta(&prev.joined, &joined);
                (added, transient_updated, Some(delta))
            }
        };

        self.last_emission = Some(EmissionState { joined, transient_hashes });
        EmittedDiff { ordered_ids, added, transient_updated, delta }
    }

    /// Returns `true` once [`Transformer::emit`] has run at least once;
    /// callers use this to know whether a `delta` buffer (framed with
    /// [`crate::delta::DELTA_TAG_FOSSIL`]) should be expected at all.
    pub fn has_emitted(&self) -> bool {
        self.last_emission.is_some()
    }
}
