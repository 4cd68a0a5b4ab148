//! Protocol constants from §6. Never change `BLOB_FRAGMENT_SIZE` for a live
//! database — it is baked into fragment row numbering.

pub const NOW_TOLERANCE_MS: u64 = 60_000;
pub const MAX_READBLOB_LENGTH: usize = 1 << 20; // 1 MiB
pub const MAX_BATCH_SIZE: usize = 100;
pub const MAX_QUERY_LEVEL_LIMIT: usize = 100_000;
pub const MAX_QUERY_ROWS_LIMIT: usize = 1_000_000;
pub const BLOB_FRAGMENT_SIZE: usize = 32 * 1024; // 32 KiB
pub const MAX_TRANSFORMER_LENGTH: usize = 100_000;
pub const MSG_ID_LENGTH: usize = 4;
pub const MESSAGE_SPLIT_BYTES: usize = 60_000;
pub const NONFINALIZED_BLOB_GC_THRESHOLD_MS: u64 = 7 * 24 * 60 * 60 * 1000;
