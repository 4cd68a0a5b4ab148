//! Engine configuration (§2 FULL: "ambient stack"). Loaded once by the
//! binary and threaded explicitly into constructors — nothing here is read
//! from a global.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub node_db_path: PathBuf,
    pub blob_db_path: PathBuf,
    pub offloader_workers: usize,
    pub message_split_bytes: usize,
    pub max_transformer_length: usize,
    pub trigger_sweep_interval_ms: u64,
    pub nonfinalized_blob_gc_threshold_ms: u64,
    pub now_tolerance_ms: u64,
    pub expired_node_gc_interval_ms: u64,
    pub expired_node_gc_batch_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_db_path: PathBuf::from("openodin-nodes.sqlite3"),
            blob_db_path: PathBuf::from("openodin-blobs.redb"),
            offloader_workers: default_worker_count(),
            message_split_bytes: MESSAGE_SPLIT_BYTES,
            max_transformer_length: MAX_TRANSFORMER_LENGTH,
            trigger_sweep_interval_ms: 1_000,
            nonfinalized_blob_gc_threshold_ms: NONFINALIZED_BLOB_GC_THRESHOLD_MS,
            now_tolerance_ms: NOW_TOLERANCE_MS,
            expired_node_gc_interval_ms: 60_000,
            expired_node_gc_batch_limit: 10_000,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::malformed(format!("invalid config: {e}")))
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::storage(format!("reading config {path:?}: {e}")))?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.message_split_bytes, MESSAGE_SPLIT_BYTES);
        assert_eq!(cfg.max_transformer_length, MAX_TRANSFORMER_LENGTH);
        assert!(cfg.offloader_workers >= 1);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = EngineConfig::from_toml_str("offloader_workers = 4\n").unwrap();
        assert_eq!(cfg.offloader_workers, 4);
        assert_eq!(cfg.message_split_bytes, MESSAGE_SPLIT_BYTES);
    }
}
