//! `TriggerRegistry`: triggers indexed by `triggerNodeId` as
//! `map<triggerNodeId, vector<Trigger>>` (§4.4), plus a `msgId` index for
//! `Unsubscribe`. Owned exclusively by the scheduler (§5 "Trigger table:
//! owned by the scheduler; mutated only inside scheduler task") — we model
//! that ownership with an internal lock rather than a global, matching
//! §9's "replace the global map with explicit ownership".

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use openodin_core::Id;

use crate::trigger::{FireOutcome, Trigger};

#[derive(Default)]
struct Index {
    by_msg_id: HashMap<[u8; 4], Arc<Trigger>>,
    by_trigger_node_id: HashMap<Id, Vec<Arc<Trigger>>>,
}

/// Owns every live [`Trigger`] in the engine.
#[derive(Default)]
pub struct TriggerRegistry {
    index: RwLock<Index>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, trigger))]
    pub fn register(&self, trigger: Arc<Trigger>) {
        let mut index = self.index.write();
        index.by_msg_id.insert(trigger.msg_id, trigger.clone());
        if let Some(node_id) = trigger.trigger_node_id {
            index.by_trigger_node_id.entry(node_id).or_default().push(trigger);
        }
    }

    pub fn get(&self, msg_id: &[u8; 4]) -> Option<Arc<Trigger>> {
        self.index.read().by_msg_id.get(msg_id).cloned()
    }

    /// §4.1 "Unsubscribe(request): closes the matching trigger (keyed by
    /// original `msgId`), frees its sink, idempotent." Removal from the
    /// `triggerNodeId` bucket happens lazily on the next sweep/fire via
    /// [`TriggerRegistry::prune_closed`] per §4.4 "removed from the index
    /// on the next opportunity" — we close it here immediately so no
    /// further events are delivered even before the prune runs.
    #[instrument(skip(self))]
    pub fn unsubscribe(&self, msg_id: &[u8; 4]) {
        if let Some(trigger) = self.index.read().by_msg_id.get(msg_id) {
            trigger.close();
        }
        self.index.write().by_msg_id.remove(msg_id);
    }

    /// Closes and drops every trigger for a session in one sweep (§5
    /// "`close(session)` cancels all triggers for that session"). Sessions
    /// aren't modeled in this crate (no session map lives here per §9's
    /// "replace the global session map"); callers pass the set of
    /// `msgId`s belonging to the session being closed.
    pub fn close_all(&self, msg_ids: &[[u8; 4]]) {
        for msg_id in msg_ids {
            self.unsubscribe(msg_id);
        }
    }

    /// §4.1 "Awakens any triggers whose `triggerNodeId` equals any stored
    /// node's `parentId` (subject to `muteMsgIds`)." Returns the triggers
    /// that now hold the run slot (`FireOutcome::Run`); the caller (the
    /// storage engine) drives each one's fetch/emit cycle and then calls
    /// [`Trigger::finish_run`], looping while it returns `true`.
    #[instrument(skip(self, mute_msg_ids))]
    pub fn awaken(&self, trigger_node_id: Id, mute_msg_ids: &[[u8; 4]]) -> Vec<Arc<Trigger>> {
        let buckets = self.index.read();
        let Some(triggers) = buckets.by_trigger_node_id.get(&trigger_node_id) else {
            return Vec::new();
        };
        let mut to_run = Vec::new();
        for trigger in triggers {
            if mute_msg_ids.contains(&trigger.msg_id) {
                continue;
            }
            match trigger.request_fire() {
                FireOutcome::Run => to_run.push(trigger.clone()),
                FireOutcome::Coalesced => {}
                FireOutcome::Closed => debug!(msg_id = ?trigger.msg_id, "skipping closed trigger"),
            }
        }
        to_run
    }

    /// Triggers due for their periodic `triggerInterval` sweep (§4.4 "runs
    /// a periodic sweep that re-fires triggers whose `triggerInterval` has
    /// elapsed"). Advances `last_interval_run_ms` for every trigger
    /// returned so the same tick is not double-counted.
    #[instrument(skip(self))]
    pub fn due_for_interval_sweep(&self, now_ms: u64) -> Vec<Arc<Trigger>> {
        let buckets = self.index.read();
        let mut due = Vec::new();
        for trigger in buckets.by_msg_id.values() {
            let Some(interval) = trigger.trigger_interval_ms else { continue };
            if trigger.is_closed() {
                continue;
            }
            let mut last = trigger.last_interval_run_ms.lock();
            if now_ms.saturating_sub(*last) >= interval {
                *last = now_ms;
                drop(last);
                if let FireOutcome::Run = trigger.request_fire() {
                    due.push(trigger.clone());
                }
            }
        }
        due
    }

    /// Drops closed triggers from the `triggerNodeId` buckets (§4.4
    /// "removed from the index on the next opportunity"). Safe to call
    /// from a periodic maintenance pass; cheap no-op when nothing closed.
    pub fn prune_closed(&self) {
        let mut index = self.index.write();
        for bucket in index.by_trigger_node_id.values_mut() {
            bucket.retain(|t| !t.is_closed());
        }
        index.by_trigger_node_id.retain(|_, bucket| !bucket.is_empty());
    }

    pub fn len(&self) -> usize {
        self.index.read().by_msg_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::{Result, ZERO_ID};
    use openodin_node_driver::types::FetchQuery;
    use openodin_transformer::AlgoKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);
    impl crate::trigger::TriggerSink for CountingSink {
        fn deliver(&self, _event: crate::trigger::TriggerEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_trigger(node_id: Id, msg_id: [u8; 4]) -> Arc<Trigger> {
        Arc::new(Trigger::new(
            [0u8; 32],
            msg_id,
            FetchQuery::children_of(node_id),
            vec![AlgoKind::Sorted],
            Some(node_id),
            None,
            Arc::new(CountingSink(AtomicUsize::new(0))),
        ))
    }

    #[test]
    fn awaken_fires_uncorked_triggers_on_matching_parent() {
        let registry = TriggerRegistry::new();
        let trigger = make_trigger(ZERO_ID, [0, 0, 0, 1]);
        trigger.uncork();
        registry.register(trigger.clone());

        let fired = registry.awaken(ZERO_ID, &[]);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn muted_msg_id_is_skipped() {
        let registry = TriggerRegistry::new();
        let trigger = make_trigger(ZERO_ID, [0, 0, 0, 1]);
        trigger.uncork();
        registry.register(trigger);

        let fired = registry.awaken(ZERO_ID, &[[0, 0, 0, 1]]);
        assert!(fired.is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_future_fires() {
        let registry = TriggerRegistry::new();
        let trigger = make_trigger(ZERO_ID, [0, 0, 0, 1]);
        trigger.uncork();
        registry.register(trigger);

        registry.unsubscribe(&[0, 0, 0, 1]);
        registry.unsubscribe(&[0, 0, 0, 1]);
        assert!(registry.get(&[0, 0, 0, 1]).is_none());

        let fired = registry.awaken(ZERO_ID, &[]);
        assert!(fired.is_empty());
    }

    #[test]
    fn prune_closed_removes_dead_bucket_entries() {
        let registry = TriggerRegistry::new();
        let trigger = make_trigger(ZERO_ID, [0, 0, 0, 1]);
        registry.register(trigger.clone());
        trigger.close();

        registry.prune_closed();
        assert!(registry.awaken(ZERO_ID, &[]).is_empty());
    }
}
