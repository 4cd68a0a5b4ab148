//! `ReplySink`: the boundary between the engine and whatever outer
//! transport delivers responses (a socket, an mpsc channel, a test
//! collector). The engine never depends on a concrete transport (§9
//! "Shared-mutable session map" note generalizes to every transport-facing
//! type in this core) and every handler must "respect a sink-closed
//! observation and stop producing further chunks" (§5).

use openodin_core::Result;

/// Generic over the reply type because each handler emits a different
/// response shape (`FetchResponse` chunks, a single `StoreResponse`, ...).
pub trait ReplySink<T>: Send + Sync {
    fn send(&self, item: T) -> Result<()>;

    /// §5 "All handlers MUST respect a sink-closed observation and stop
    /// producing further chunks." Default `false` — most sinks (a bounded
    /// channel, a test collector) learn about closure only from `send`
    /// failing, which handlers already treat as stop-iterating.
    fn is_closed(&self) -> bool {
        false
    }
}

/// An in-memory sink collecting every item sent to it, for tests and for
/// the `serve-stdin` development binary.
pub struct CollectorSink<T> {
    items: parking_lot::Mutex<Vec<T>>,
}

impl<T> Default for CollectorSink<T> {
    fn default() -> Self {
        Self { items: parking_lot::Mutex::new(Vec::new()) }
    }
}

impl<T> CollectorSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut self.items.lock())
    }
}

impl<T: Send> ReplySink<T> for CollectorSink<T> {
    fn send(&self, item: T) -> Result<()> {
        self.items.lock().push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_sink_preserves_order() {
        let sink: CollectorSink<i32> = CollectorSink::new();
        sink.send(1).unwrap();
        sink.send(2).unwrap();
        assert_eq!(sink.take(), vec![1, 2]);
    }
}
