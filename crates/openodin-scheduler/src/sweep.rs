//! The periodic `triggerInterval` sweep (§4.4 "runs a periodic sweep that
//! re-fires triggers whose `triggerInterval` has elapsed"). One
//! `tokio::time::interval` task for the whole registry rather than one
//! task per trigger (§9 "Coroutine fan-out": avoid modeling this as N
//! concurrently-scheduled tasks; SPEC_FULL §4.4 calls this out explicitly).

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::instrument;

use openodin_core::Clock;

use crate::registry::TriggerRegistry;
use crate::trigger::Trigger;

/// Invoked once per due trigger; runs the fetch/emit cycle and calls
/// [`Trigger::finish_run`], looping while it returns `true`. Boxed rather
/// than generic so [`spawn_sweep`] doesn't need to be generic over it.
pub type FireFn = Arc<dyn Fn(Arc<Trigger>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Spawns the sweep task. `tick_ms` should be the GCD of every registered
/// `triggerInterval` (default 1000ms per SPEC_FULL §4.4); the caller picks
/// it, this module only drives the loop.
#[instrument(skip(registry, clock, fire))]
pub fn spawn_sweep(
    registry: Arc<TriggerRegistry>,
    clock: Arc<dyn Clock>,
    tick_ms: u64,
    fire: FireFn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(tick_ms.max(1)));
        loop {
            ticker.tick().await;
            let now_ms = clock.now_ms();
            let due = registry.due_for_interval_sweep(now_ms);
            if due.is_empty() {
                continue;
            }
            for trigger in due {
                fire(trigger).await;
            }
            registry.prune_closed();
        }
    })
}

/// `tick_ms` for a set of registered intervals: their GCD, clamped to a
/// sane floor so a degenerate `triggerInterval` of 0 can't spin the sweep.
pub fn tick_interval_ms(intervals: impl IntoIterator<Item = u64>, default_ms: u64) -> u64 {
    let gcd = intervals.into_iter().filter(|&n| n > 0).fold(0u64, gcd_u64);
    if gcd == 0 {
        default_ms
    } else {
        gcd
    }
}

fn gcd_u64(a: u64, b: u64) -> u64 {
    if a == 0 {
        return b;
    }
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_defaults_when_no_triggers_registered() {
        assert_eq!(tick_interval_ms(std::iter::empty(), 1_000), 1_000);
    }

    #[test]
    fn tick_interval_is_gcd_of_registered_intervals() {
        assert_eq!(tick_interval_ms([2_000, 3_000], 1_000), 1_000);
        assert_eq!(tick_interval_ms([4_000, 6_000], 1_000), 2_000);
        assert_eq!(tick_interval_ms([5_000], 1_000), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_fires_due_trigger_and_skips_idle_ones() {
        use openodin_core::{Result, ZERO_ID};
        use openodin_node_driver::types::FetchQuery;
        use openodin_transformer::AlgoKind;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Mutex as StdMutex;

        struct NullSink;
        impl crate::trigger::TriggerSink for NullSink {
            fn deliver(&self, _event: crate::trigger::TriggerEvent) -> Result<()> {
                Ok(())
            }
        }

        let registry = Arc::new(TriggerRegistry::new());
        let trigger = Arc::new(Trigger::new(
            [0u8; 32],
            [0, 0, 0, 9],
            FetchQuery::children_of(ZERO_ID),
            vec![AlgoKind::Sorted],
            None,
            Some(100),
            Arc::new(NullSink),
        ));
        trigger.uncork();
        registry.register(trigger);

        let clock = Arc::new(openodin_core::ManualClock::new(0));
        let fire_count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let counted = fire_count.clone();
        let seen_for_closure = seen.clone();
        let fire: FireFn = Arc::new(move |t: Arc<Trigger>| {
            let counted = counted.clone();
            let seen = seen_for_closure.clone();
            Box::pin(async move {
                counted.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(t.msg_id);
                t.finish_run();
            })
        });

        let handle = spawn_sweep(registry, clock.clone(), 50, fire);
        for _ in 0..3 {
            clock.advance(50);
            tokio::time::advance(std::time::Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
        }
        handle.abort();

        assert!(fire_count.load(Ordering::SeqCst) >= 1);
        assert_eq!(seen.lock().unwrap()[0], [0, 0, 0, 9]);
    }
}
