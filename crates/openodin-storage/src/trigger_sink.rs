//! [`FetchTriggerSink`]: bridges the scheduler's transport-agnostic
//! `TriggerSink` to this crate's `ReplySink<FetchResponse>` + chunking
//! (§4.1, §4.4). The scheduler never knows about `FetchResponse` or
//! message splitting; this is the one place that translates between them.

use std::sync::Arc;

use openodin_core::{Clock, Result};
use openodin_scheduler::{TriggerEvent, TriggerSink};

use crate::chunking::chunk_fetch_response;
use crate::reply::ReplySink;
use crate::requests::FetchResponse;

pub struct FetchTriggerSink {
    pub msg_id: [u8; 4],
    pub reply_sink: Arc<dyn ReplySink<FetchResponse>>,
    pub clock: Arc<dyn Clock>,
    pub message_split_bytes: usize,
}

impl TriggerSink for FetchTriggerSink {
    fn deliver(&self, event: TriggerEvent) -> Result<()> {
        match event {
            TriggerEvent::Diff(diff) => {
                let mut nodes = Vec::with_capacity(diff.added.len() + diff.transient_updated.len());
                for node in diff.added.iter().chain(diff.transient_updated.iter()) {
                    nodes.push(openodin_codec::encode_node(node)?);
                }
                let row_count = diff.ordered_ids.len();
                let chunks = chunk_fetch_response(
                    self.msg_id,
                    nodes,
                    Vec::new(),
                    diff.delta,
                    row_count,
                    None,
                    self.clock.now_ms(),
                    self.message_split_bytes,
                );
                for chunk in chunks {
                    self.reply_sink.send(chunk)?;
                }
                Ok(())
            }
            TriggerEvent::Error(e) => {
                let response = FetchResponse {
                    msg_id: self.msg_id,
                    status: e.status(),
                    error: Some(e.to_string()),
                    nodes: Vec::new(),
                    embed: Vec::new(),
                    delta: None,
                    row_count: 0,
                    cursor_index: None,
                    length: 0,
                    is_first: true,
                    is_last: true,
                    now: self.clock.now_ms(),
                    seq: 0,
                    end_seq: 0,
                };
                self.reply_sink.send(response)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.reply_sink.is_closed()
    }
}
