//! Subscription scheduler (§4.4): the `Trigger` registry, insert/update
//! fan-out keyed by `triggerNodeId`, and the periodic `triggerInterval`
//! sweep. Owns no database and no transformer state directly — it owns
//! only the bookkeeping of *which* live queries exist and *when* they
//! should re-run; the storage engine drives the actual re-fetch.

pub mod hashkey;
pub mod registry;
pub mod sweep;
pub mod trigger;

pub use hashkey::{compute_hash_key, HashKey};
pub use registry::TriggerRegistry;
pub use sweep::{spawn_sweep, tick_interval_ms, FireFn};
pub use trigger::{FireOutcome, Trigger, TriggerEvent, TriggerSink};
