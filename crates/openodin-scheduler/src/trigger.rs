//! `Trigger`: the server-side state of one live query (§4.4). Concurrency
//! discipline (corking, run/pending coalescing, cancellation) is modeled
//! as an explicit state machine rather than an event-emitter handler map
//! (§9 "replace the runtime handler map with a typed subscription
//! registry, storing `Trigger` values with explicit `state`").

use std::sync::Arc;

use parking_lot::Mutex;

use openodin_core::{Error, Id, Result};
use openodin_node_driver::types::FetchQuery;
use openodin_transformer::{AlgoKind, EmittedDiff};

use crate::hashkey::HashKey;

/// What a trigger's sink receives on a fire. Mirrors
/// [`openodin_transformer::EmittedDiff`] with the error path a trigger
/// failure takes before it is closed (§4.4 "Trigger failures mark the
/// trigger closed and deliver an `ERROR` reply chunk").
pub enum TriggerEvent {
    Diff(EmittedDiff),
    Error(Error),
}

/// The sink a trigger delivers events to. Implemented by the outer
/// request/reply layer (`openodin-storage`); the scheduler never depends
/// on a concrete transport (§9, mirroring the blob/node driver's
/// transport-agnostic design).
pub trait TriggerSink: Send + Sync {
    fn deliver(&self, event: TriggerEvent) -> Result<()>;
    /// True once the outer sink (socket, channel, test collector) has been
    /// closed; triggers stop firing into a closed sink (§5 "respect a
    /// sink-closed observation").
    fn is_closed(&self) -> bool {
        false
    }
}

/// Explicit run state (§9). `Corked` and `Closed` are sticky states a
/// trigger exits only via [`Trigger::uncork`] / it is simply never
/// un-closed; `Idle`/`Running`/`Pending` is the coalescing discipline of
/// §4.4's "Concurrency discipline per trigger".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    RunningWithPending,
}

struct Inner {
    run_state: RunState,
    corked: bool,
    cork_pending: bool,
    closed: bool,
}

/// What a caller should do after calling [`Trigger::request_fire`] or
/// [`Trigger::finish_run`] or [`Trigger::uncork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Caller holds the run slot and should execute the fetch/emit cycle
    /// now, then call [`Trigger::finish_run`].
    Run,
    /// Another run is already in flight (or the trigger is corked); the
    /// event has been coalesced into a pending follow-up.
    Coalesced,
    /// The trigger is closed; the event is dropped.
    Closed,
}

pub struct Trigger {
    pub key: HashKey,
    pub msg_id: [u8; 4],
    pub fetch_query: FetchQuery,
    pub algos: Vec<AlgoKind>,
    pub trigger_node_id: Option<Id>,
    pub trigger_interval_ms: Option<u64>,
    pub last_interval_run_ms: Mutex<u64>,
    pub sink: Arc<dyn TriggerSink>,
    state: Mutex<Inner>,
}

impl Trigger {
    /// New triggers start corked until the seed fetch has been delivered
    /// (§4.4 "initial state is corked until the seed fetch has been
    /// delivered").
    pub fn new(
        key: HashKey,
        msg_id: [u8; 4],
        fetch_query: FetchQuery,
        algos: Vec<AlgoKind>,
        trigger_node_id: Option<Id>,
        trigger_interval_ms: Option<u64>,
        sink: Arc<dyn TriggerSink>,
    ) -> Self {
        Self {
            key,
            msg_id,
            fetch_query,
            algos,
            trigger_node_id,
            trigger_interval_ms,
            last_interval_run_ms: Mutex::new(0),
            sink,
            state: Mutex::new(Inner { run_state: RunState::Idle, corked: true, cork_pending: false, closed: false }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed || self.sink.is_closed()
    }

    /// Marks the trigger ready to fire once the seed fetch has been
    /// delivered through some other channel; flushes any event that
    /// arrived while corked (§4.4 "uncork() flushes any pending event").
    pub fn uncork(&self) -> FireOutcome {
        let mut inner = self.state.lock();
        if inner.closed {
            return FireOutcome::Closed;
        }
        inner.corked = false;
        if inner.cork_pending {
            inner.cork_pending = false;
            return begin_run(&mut inner);
        }
        FireOutcome::Coalesced
    }

    /// An insert/interval event arrived for this trigger. Returns whether
    /// the caller now holds the run slot (§4.4 "isRunning guards
    /// re-entry; new events arriving while running set isPending = true").
    pub fn request_fire(&self) -> FireOutcome {
        let mut inner = self.state.lock();
        if inner.closed {
            return FireOutcome::Closed;
        }
        if inner.corked {
            inner.cork_pending = true;
            return FireOutcome::Coalesced;
        }
        begin_run(&mut inner)
    }

    /// Call after running the fetch/emit cycle for a [`FireOutcome::Run`].
    /// Returns `true` if a follow-up run should start immediately (a
    /// coalesced event arrived mid-run) — the caller loops and runs again
    /// rather than spawning a second concurrent run.
    pub fn finish_run(&self) -> bool {
        let mut inner = self.state.lock();
        match inner.run_state {
            RunState::RunningWithPending if !inner.closed => {
                inner.run_state = RunState::Running;
                true
            }
            _ => {
                inner.run_state = RunState::Idle;
                false
            }
        }
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

fn begin_run(inner: &mut Inner) -> FireOutcome {
    match inner.run_state {
        RunState::Idle => {
            inner.run_state = RunState::Running;
            FireOutcome::Run
        }
        RunState::Running | RunState::RunningWithPending => {
            inner.run_state = RunState::RunningWithPending;
            FireOutcome::Coalesced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::ZERO_ID;

    struct NullSink;
    impl TriggerSink for NullSink {
        fn deliver(&self, _event: TriggerEvent) -> Result<()> {
            Ok(())
        }
    }

    fn trigger() -> Trigger {
        Trigger::new(
            [0u8; 32],
            [0, 0, 0, 1],
            FetchQuery::children_of(ZERO_ID),
            vec![AlgoKind::Sorted],
            None,
            None,
            Arc::new(NullSink),
        )
    }

    #[test]
    fn corked_trigger_coalesces_without_running() {
        let t = trigger();
        assert_eq!(t.request_fire(), FireOutcome::Coalesced);
    }

    #[test]
    fn uncork_flushes_pending_event() {
        let t = trigger();
        t.request_fire();
        assert_eq!(t.uncork(), FireOutcome::Run);
    }

    #[test]
    fn uncork_with_no_pending_event_does_not_run() {
        let t = trigger();
        assert_eq!(t.uncork(), FireOutcome::Coalesced);
    }

    #[test]
    fn concurrent_events_coalesce_into_one_followup_run() {
        let t = trigger();
        t.uncork();
        assert_eq!(t.request_fire(), FireOutcome::Run);
        // A second and third event arrive while the first run is in flight.
        assert_eq!(t.request_fire(), FireOutcome::Coalesced);
        assert_eq!(t.request_fire(), FireOutcome::Coalesced);
        // Exactly one follow-up run is signalled, not two.
        assert!(t.finish_run());
        assert!(!t.finish_run());
    }

    #[test]
    fn closed_trigger_drops_events() {
        let t = trigger();
        t.uncork();
        t.close();
        assert_eq!(t.request_fire(), FireOutcome::Closed);
    }
}
