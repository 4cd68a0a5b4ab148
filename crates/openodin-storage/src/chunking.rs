//! Reply chunking (§4.1 "any reply larger than `MESSAGE_SPLIT_BYTES` is
//! split into ordered `FetchResponse` chunks sharing the same `msgId`,
//! each carrying `seq` and `endSeq`; ancillary arrays (indexes, extras)
//! appear only on the last chunk").

use crate::requests::FetchResponse;
use openodin_core::Status;

/// Splits `nodes` (already-encoded bytes) into one or more
/// [`FetchResponse`] chunks bounded by `max_bytes` per chunk, attaching
/// `embed`/`delta`/`row_count`/`cursor_index` only to the last chunk.
#[allow(clippy::too_many_arguments)]
pub fn chunk_fetch_response(
    msg_id: [u8; 4],
    nodes: Vec<Vec<u8>>,
    embed: Vec<Vec<u8>>,
    delta: Option<Vec<u8>>,
    row_count: usize,
    cursor_index: Option<usize>,
    now_ms: u64,
    max_bytes: usize,
) -> Vec<FetchResponse> {
    let length = nodes.len();
    let mut chunks: Vec<Vec<Vec<u8>>> = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0usize;
    for node in nodes {
        let node_len = node.len();
        if !current.is_empty() && current_bytes + node_len > max_bytes {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += node_len;
        current.push(node);
    }
    // Always emit at least one chunk, even for an empty result.
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }

    let end_seq = (chunks.len() - 1) as u32;
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk_nodes)| {
            let is_last = i + 1 == total;
            FetchResponse {
                msg_id,
                status: Status::Result,
                error: None,
                nodes: chunk_nodes,
                embed: if is_last { embed.clone() } else { Vec::new() },
                delta: if is_last { delta.clone() } else { None },
                row_count: if is_last { row_count } else { 0 },
                cursor_index: if is_last { cursor_index } else { None },
                length,
                is_first: i == 0,
                is_last,
                now: now_ms,
                seq: i as u32,
                end_seq,
            }
        })
        .collect()
}
