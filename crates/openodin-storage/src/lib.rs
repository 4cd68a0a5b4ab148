//! Request handlers and orchestration for the OpenOdin storage core
//! (§4.1). Wires the node driver, blob driver, signature offloader and
//! subscription scheduler together behind [`StorageEngine`]; this is the
//! only crate in the workspace that touches all of the others.

pub mod chunking;
pub mod engine;
pub mod reply;
pub mod requests;
pub mod trigger_sink;

pub use engine::StorageEngine;
pub use reply::{CollectorSink, ReplySink};
pub use requests::*;
pub use trigger_sink::FetchTriggerSink;
