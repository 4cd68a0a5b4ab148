//! The blob driver itself (§4.5). Modeled on the teacher's `redb`-backed
//! `ProductionStorage` (one `Database` behind a `tokio::sync::Mutex`, a
//! write-transaction closure and a read-transaction closure) widened from
//! single key/value pairs to fragment rows and hash-gated finalisation.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use openodin_core::constants::BLOB_FRAGMENT_SIZE;
use openodin_core::{Error, Id, Result};
use openodin_crypto::hash;

use crate::schema::{
    blob_key, blob_key_range, dataid_from_blob_key, decode, encode, fragment_key,
    fragment_key_range, BlobRow, FragmentRow, BLOBS, FRAGMENTS,
};

/// The largest `pos` the driver will accept, mirroring the JS source's
/// `Number.isSafeInteger` bound this core is modeled on (§4.5 "pos must
/// fit within safe integer range").
pub const MAX_SAFE_BLOB_OFFSET: u64 = (1u64 << 53) - 1;

pub struct BlobDriver {
    db: Arc<Mutex<Database>>,
}

impl BlobDriver {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::storage(format!("creating blob db directory: {e}")))?;
            }
        }
        let database = Database::create(path)
            .map_err(|e| Error::storage(format!("opening blob database: {e}")))?;
        {
            let write_txn = database
                .begin_write()
                .map_err(|e| Error::storage(format!("begin write txn: {e}")))?;
            write_txn
                .open_table(FRAGMENTS)
                .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
            write_txn
                .open_table(BLOBS)
                .map_err(|e| Error::storage(format!("open blobs table: {e}")))?;
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("commit table creation: {e}")))?;
        }
        Ok(Self {
            db: Arc::new(Mutex::new(database)),
        })
    }

    async fn with_write<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&redb::WriteTransaction) -> Result<R>,
    {
        let db = self.db.lock().await;
        let txn = db
            .begin_write()
            .map_err(|e| Error::storage(format!("begin write txn: {e}")))?;
        let result = f(&txn)?;
        txn.commit()
            .map_err(|e| Error::storage(format!("commit txn: {e}")))?;
        Ok(result)
    }

    async fn with_read<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&redb::ReadTransaction) -> Result<R>,
    {
        let db = self.db.lock().await;
        let txn = db
            .begin_read()
            .map_err(|e| Error::storage(format!("begin read txn: {e}")))?;
        f(&txn)
    }

    /// Writes `data` at byte offset `pos` for `dataid`, splitting across
    /// `BLOB_FRAGMENT_SIZE`-aligned fragment rows (§4.5 "append-or-overwrite
    /// fragments within `[pos, pos+len)`").
    #[tracing::instrument(skip(self, data))]
    pub async fn write_blob(&self, dataid: Id, pos: u64, data: &[u8], now_ms: u64) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = pos
            .checked_add(data.len() as u64)
            .ok_or_else(|| Error::internal("write_blob: pos + len overflows"))?;
        if end > MAX_SAFE_BLOB_OFFSET {
            return Err(Error::internal("write_blob: pos exceeds safe integer range"));
        }
        let frag_size = BLOB_FRAGMENT_SIZE as u64;
        self.with_write(|txn| {
            let mut table = txn
                .open_table(FRAGMENTS)
                .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
            let mut written = 0usize;
            while written < data.len() {
                let global_offset = pos + written as u64;
                let fragmentnr = global_offset / frag_size;
                let local_offset = (global_offset % frag_size) as usize;
                let space_in_fragment = BLOB_FRAGMENT_SIZE - local_offset;
                let chunk_len = space_in_fragment.min(data.len() - written);
                let chunk = &data[written..written + chunk_len];

                let key = fragment_key(&dataid, fragmentnr);
                let mut row = match table
                    .get(key.as_slice())
                    .map_err(|e| Error::storage(format!("read fragment: {e}")))?
                {
                    Some(existing) => decode::<FragmentRow>(existing.value())?,
                    None => FragmentRow {
                        finalized: false,
                        fragment: Vec::new(),
                        creationtime: now_ms,
                    },
                };
                if row.fragment.len() < local_offset {
                    row.fragment.resize(local_offset, 0);
                }
                let write_end = local_offset + chunk.len();
                if row.fragment.len() < write_end {
                    row.fragment.resize(write_end, 0);
                }
                row.fragment[local_offset..write_end].copy_from_slice(chunk);

                let encoded = encode(&row)?;
                table
                    .insert(key.as_slice(), encoded.as_slice())
                    .map_err(|e| Error::storage(format!("write fragment: {e}")))?;
                written += chunk_len;
            }
            Ok(())
        })
        .await
    }

    /// Length of the continuous, zero-started prefix buffered for
    /// `dataid` (§4.5). Returns `None` if no fragments exist yet.
    pub async fn read_blob_intermediary_length(&self, dataid: Id) -> Result<Option<u64>> {
        self.with_read(|txn| {
            let table = txn
                .open_table(FRAGMENTS)
                .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
            let mut total = 0u64;
            let mut fragmentnr = 0u64;
            let mut seen_any = false;
            loop {
                let key = fragment_key(&dataid, fragmentnr);
                match table
                    .get(key.as_slice())
                    .map_err(|e| Error::storage(format!("read fragment: {e}")))?
                {
                    Some(value) => {
                        seen_any = true;
                        let row: FragmentRow = decode(value.value())?;
                        let len = row.fragment.len();
                        total += len as u64;
                        if len < BLOB_FRAGMENT_SIZE {
                            break;
                        }
                        fragmentnr += 1;
                    }
                    None => break,
                }
            }
            Ok(if seen_any { Some(total) } else { None })
        })
        .await
    }

    fn read_continuous_bytes(
        txn: &redb::ReadTransaction,
        dataid: &Id,
        max_len: u64,
    ) -> Result<Vec<u8>> {
        let table = txn
            .open_table(FRAGMENTS)
            .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
        let mut out = Vec::new();
        let mut fragmentnr = 0u64;
        loop {
            if out.len() as u64 >= max_len {
                break;
            }
            let key = fragment_key(dataid, fragmentnr);
            match table
                .get(key.as_slice())
                .map_err(|e| Error::storage(format!("read fragment: {e}")))?
            {
                Some(value) => {
                    let row: FragmentRow = decode(value.value())?;
                    let remaining = (max_len - out.len() as u64) as usize;
                    let take = row.fragment.len().min(remaining);
                    out.extend_from_slice(&row.fragment[..take]);
                    if row.fragment.len() < BLOB_FRAGMENT_SIZE {
                        break;
                    }
                    fragmentnr += 1;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Atomically, hash-gated promotion of fragments into a finalised blob
    /// (§4.5). Idempotent: a second call with the same arguments returns
    /// `Error::exists` (caller treats as `EXISTS`, §8 invariant 5).
    #[tracing::instrument(skip(self, blob_hash))]
    pub async fn finalize_write_blob(
        &self,
        node_id1: Id,
        dataid: Id,
        blob_length: u64,
        blob_hash: Id,
        now_ms: u64,
    ) -> Result<()> {
        self.with_write(|txn| {
            {
                let blobs = txn
                    .open_table(BLOBS)
                    .map_err(|e| Error::storage(format!("open blobs table: {e}")))?;
                let key = blob_key(&node_id1, &dataid);
                if blobs
                    .get(key.as_slice())
                    .map_err(|e| Error::storage(format!("read blob row: {e}")))?
                    .is_some()
                {
                    debug!("finalize_write_blob: already finalised, EXISTS");
                    return Err(Error::exists("blob already finalized"));
                }
            }

            let bytes = Self::read_continuous_bytes_write(txn, &dataid, blob_length)?;
            if bytes.len() as u64 != blob_length {
                warn!(
                    got = bytes.len(),
                    want = blob_length,
                    "finalize_write_blob: continuous prefix shorter than declared length"
                );
                return Err(Error::mismatch("blob length does not match continuous data"));
            }
            let actual_hash = hash(&bytes);
            if actual_hash != blob_hash {
                warn!("finalize_write_blob: hash mismatch");
                return Err(Error::mismatch("blob hash does not match content"));
            }

            {
                let mut fragments = txn
                    .open_table(FRAGMENTS)
                    .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
                let (lo, hi) = fragment_key_range(&dataid);
                let keys: Vec<Vec<u8>> = fragments
                    .range(lo.as_slice()..=hi.as_slice())
                    .map_err(|e| Error::storage(format!("range fragments: {e}")))?
                    .map(|r| r.map(|(k, _)| k.value().to_vec()))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::storage(format!("iterate fragments: {e}")))?;
                for key in keys {
                    let value = fragments
                        .get(key.as_slice())
                        .map_err(|e| Error::storage(format!("read fragment: {e}")))?
                        .expect("key came from this table's own range scan")
                        .value()
                        .to_vec();
                    let mut row: FragmentRow = decode(&value)?;
                    row.finalized = true;
                    let encoded = encode(&row)?;
                    fragments
                        .insert(key.as_slice(), encoded.as_slice())
                        .map_err(|e| Error::storage(format!("mark fragment finalized: {e}")))?;
                }
            }

            let mut blobs = txn
                .open_table(BLOBS)
                .map_err(|e| Error::storage(format!("open blobs table: {e}")))?;
            let key = blob_key(&node_id1, &dataid);
            let row = BlobRow {
                storagetime: now_ms,
            };
            let encoded = encode(&row)?;
            blobs
                .insert(key.as_slice(), encoded.as_slice())
                .map_err(|e| Error::storage(format!("insert blob row: {e}")))?;
            Ok(())
        })
        .await
    }

    fn read_continuous_bytes_write(
        txn: &redb::WriteTransaction,
        dataid: &Id,
        max_len: u64,
    ) -> Result<Vec<u8>> {
        let table = txn
            .open_table(FRAGMENTS)
            .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
        let mut out = Vec::new();
        let mut fragmentnr = 0u64;
        loop {
            if out.len() as u64 >= max_len {
                break;
            }
            let key = fragment_key(dataid, fragmentnr);
            match table
                .get(key.as_slice())
                .map_err(|e| Error::storage(format!("read fragment: {e}")))?
            {
                Some(value) => {
                    let row: FragmentRow = decode(value.value())?;
                    let remaining = (max_len - out.len() as u64) as usize;
                    let take = row.fragment.len().min(remaining);
                    out.extend_from_slice(&row.fragment[..take]);
                    if row.fragment.len() < BLOB_FRAGMENT_SIZE {
                        break;
                    }
                    fragmentnr += 1;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Reads `length` bytes starting at `pos` from a finalised blob
    /// belonging to `node_id1`. Returns `Ok(None)` if no finalised blob
    /// exists yet (§4.5 "returns data only from finalised blobs").
    pub async fn read_blob(&self, node_id1: Id, pos: u64, length: u64) -> Result<Option<Vec<u8>>> {
        self.with_read(|txn| {
            let dataid = match Self::find_any_dataid(txn, &node_id1)? {
                Some(d) => d,
                None => return Ok(None),
            };
            let bytes = Self::read_continuous_bytes(txn, &dataid, pos + length)?;
            if (bytes.len() as u64) <= pos {
                return Ok(Some(Vec::new()));
            }
            let start = pos as usize;
            let end = bytes.len().min((pos + length) as usize);
            Ok(Some(bytes[start..end].to_vec()))
        })
        .await
    }

    fn find_any_dataid(txn: &redb::ReadTransaction, node_id1: &Id) -> Result<Option<Id>> {
        let table = txn
            .open_table(BLOBS)
            .map_err(|e| Error::storage(format!("open blobs table: {e}")))?;
        let (lo, hi) = blob_key_range(node_id1);
        let mut iter = table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(|e| Error::storage(format!("range blobs: {e}")))?;
        match iter.next() {
            Some(entry) => {
                let (key, _) = entry.map_err(|e| Error::storage(format!("iterate blobs: {e}")))?;
                Ok(Some(dataid_from_blob_key(key.value())))
            }
            None => Ok(None),
        }
    }

    /// Duplicates every fragment row already stored under `from_node_id1`'s
    /// finalised blob onto `to_dataid`, without the caller re-transmitting
    /// payload bytes (SPEC_FULL §3/§4.5 `copyFromId1`). The copied rows are
    /// written as ordinary non-finalised fragments so the usual
    /// `finalize_write_blob` hash-gate still applies to the new `dataid`.
    /// Returns `None` if `from_node_id1` has no finalised blob to copy from.
    #[tracing::instrument(skip(self))]
    pub async fn copy_fragments_from(
        &self,
        from_node_id1: Id,
        to_dataid: Id,
        now_ms: u64,
    ) -> Result<Option<u64>> {
        self.with_write(|txn| {
            let source_dataid = {
                let blobs = txn
                    .open_table(BLOBS)
                    .map_err(|e| Error::storage(format!("open blobs table: {e}")))?;
                let (lo, hi) = blob_key_range(&from_node_id1);
                let mut iter = blobs
                    .range(lo.as_slice()..=hi.as_slice())
                    .map_err(|e| Error::storage(format!("range blobs: {e}")))?;
                match iter.next() {
                    Some(entry) => {
                        let (key, _) = entry.map_err(|e| Error::storage(format!("iterate blobs: {e}")))?;
                        dataid_from_blob_key(key.value())
                    }
                    None => {
                        debug!("copy_fragments_from: no finalised source blob");
                        return Ok(None);
                    }
                }
            };

            let mut fragments = txn
                .open_table(FRAGMENTS)
                .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
            let (lo, hi) = fragment_key_range(&source_dataid);
            let source_rows: Vec<(u64, FragmentRow)> = fragments
                .range(lo.as_slice()..=hi.as_slice())
                .map_err(|e| Error::storage(format!("range fragments: {e}")))?
                .map(|r| {
                    r.map_err(|e| Error::storage(format!("iterate fragments: {e}")))
                        .and_then(|(k, v)| {
                            let fragmentnr = u64::from_be_bytes(k.value()[32..40].try_into().unwrap());
                            let row: FragmentRow = decode(v.value())?;
                            Ok((fragmentnr, row))
                        })
                })
                .collect::<Result<_>>()?;

            let mut total = 0u64;
            for (fragmentnr, mut row) in source_rows {
                row.finalized = false;
                row.creationtime = now_ms;
                total += row.fragment.len() as u64;
                let encoded = encode(&row)?;
                let key = fragment_key(&to_dataid, fragmentnr);
                fragments
                    .insert(key.as_slice(), encoded.as_slice())
                    .map_err(|e| Error::storage(format!("write copied fragment: {e}")))?;
            }
            Ok(Some(total))
        })
        .await
    }

    /// True for node ids that have at least one finalised blob row
    /// (§4.5 `blobExists`).
    pub async fn blob_exists(&self, node_id1s: &[Id]) -> Result<Vec<Id>> {
        self.with_read(|txn| {
            let mut existing = Vec::new();
            for id in node_id1s {
                if Self::find_any_dataid(txn, id)?.is_some() {
                    existing.push(*id);
                }
            }
            Ok(existing)
        })
        .await
    }

    /// Deletes every fragment and blob row belonging to `node_id1s`
    /// (§4.5 `deleteBlobs`). Returns the number of blob rows removed.
    pub async fn delete_blobs(&self, node_id1s: &[Id]) -> Result<usize> {
        self.with_write(|txn| {
            let mut removed = 0usize;
            let mut blobs = txn
                .open_table(BLOBS)
                .map_err(|e| Error::storage(format!("open blobs table: {e}")))?;
            let mut fragments = txn
                .open_table(FRAGMENTS)
                .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
            for node_id1 in node_id1s {
                let (lo, hi) = blob_key_range(node_id1);
                let keys: Vec<(Vec<u8>, Id)> = blobs
                    .range(lo.as_slice()..=hi.as_slice())
                    .map_err(|e| Error::storage(format!("range blobs: {e}")))?
                    .map(|r| {
                        r.map(|(k, _)| {
                            let key_bytes = k.value().to_vec();
                            let dataid = dataid_from_blob_key(&key_bytes);
                            (key_bytes, dataid)
                        })
                    })
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::storage(format!("iterate blobs: {e}")))?;
                for (key, dataid) in keys {
                    blobs
                        .remove(key.as_slice())
                        .map_err(|e| Error::storage(format!("remove blob row: {e}")))?;
                    removed += 1;

                    let (flo, fhi) = fragment_key_range(&dataid);
                    let frag_keys: Vec<Vec<u8>> = fragments
                        .range(flo.as_slice()..=fhi.as_slice())
                        .map_err(|e| Error::storage(format!("range fragments: {e}")))?
                        .map(|r| r.map(|(k, _)| k.value().to_vec()))
                        .collect::<std::result::Result<_, _>>()
                        .map_err(|e| Error::storage(format!("iterate fragments: {e}")))?;
                    for fkey in frag_keys {
                        fragments
                            .remove(fkey.as_slice())
                            .map_err(|e| Error::storage(format!("remove fragment: {e}")))?;
                    }
                }
            }
            Ok(removed)
        })
        .await
    }

    /// GC of non-finalised fragments older than `threshold_ms` ago, by
    /// convention 7 days (§4.5 `deleteNonfinalizedBlobData`). `limit`
    /// bounds rows examined per call so a GC sweep never blocks the
    /// single-threaded engine for long.
    pub async fn delete_nonfinalized_blob_data(
        &self,
        now_ms: u64,
        threshold_ms: u64,
        limit: usize,
    ) -> Result<usize> {
        let cutoff = now_ms.saturating_sub(threshold_ms);
        self.with_write(|txn| {
            let mut fragments = txn
                .open_table(FRAGMENTS)
                .map_err(|e| Error::storage(format!("open fragments table: {e}")))?;
            let stale: Vec<Vec<u8>> = fragments
                .iter()
                .map_err(|e| Error::storage(format!("iterate fragments: {e}")))?
                .filter_map(|r| {
                    let (k, v) = r.ok()?;
                    let row: FragmentRow = decode(v.value()).ok()?;
                    if !row.finalized && row.creationtime < cutoff {
                        Some(k.value().to_vec())
                    } else {
                        None
                    }
                })
                .take(limit)
                .collect();
            let count = stale.len();
            for key in stale {
                fragments
                    .remove(key.as_slice())
                    .map_err(|e| Error::storage(format!("remove stale fragment: {e}")))?;
            }
            Ok(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_crypto::hash as blake2b;
    use tempfile::TempDir;

    async fn new_driver() -> (TempDir, BlobDriver) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blobs.redb");
        let driver = BlobDriver::open(&path).unwrap();
        (dir, driver)
    }

    #[tokio::test]
    async fn s4_write_finalize_read() {
        let (_dir, driver) = new_driver().await;
        let node_id1 = [1u8; 32];
        let dataid = [2u8; 32];
        let blob_hash = blake2b(b"Hello World");

        driver
            .write_blob(dataid, 0, b"Hello ", 1_000)
            .await
            .unwrap();
        assert_eq!(
            driver
                .read_blob_intermediary_length(dataid)
                .await
                .unwrap(),
            Some(6)
        );
        assert!(driver.read_blob(node_id1, 0, 100).await.unwrap().is_none());

        driver
            .write_blob(dataid, 6, b"World", 1_001)
            .await
            .unwrap();
        assert_eq!(
            driver
                .read_blob_intermediary_length(dataid)
                .await
                .unwrap(),
            Some(11)
        );

        driver
            .finalize_write_blob(node_id1, dataid, 11, blob_hash, 1_002)
            .await
            .unwrap();

        let second = driver
            .finalize_write_blob(node_id1, dataid, 11, blob_hash, 1_003)
            .await;
        assert!(matches!(second, Err(Error::Exists { .. })));

        let bytes = driver.read_blob(node_id1, 0, 11).await.unwrap().unwrap();
        assert_eq!(bytes, b"Hello World");
    }

    #[tokio::test]
    async fn finalize_rejects_wrong_hash() {
        let (_dir, driver) = new_driver().await;
        let node_id1 = [5u8; 32];
        let dataid = [6u8; 32];
        driver
            .write_blob(dataid, 0, b"some data", 1_000)
            .await
            .unwrap();
        let wrong_hash = blake2b(b"not the data");
        let result = driver
            .finalize_write_blob(node_id1, dataid, 9, wrong_hash, 1_001)
            .await;
        assert!(matches!(result, Err(Error::Mismatch { .. })));
    }

    #[tokio::test]
    async fn finalize_rejects_short_prefix() {
        let (_dir, driver) = new_driver().await;
        let node_id1 = [7u8; 32];
        let dataid = [8u8; 32];
        driver.write_blob(dataid, 0, b"abc", 1_000).await.unwrap();
        let hash_of_longer = blake2b(b"abcdefghi");
        let result = driver
            .finalize_write_blob(node_id1, dataid, 9, hash_of_longer, 1_001)
            .await;
        assert!(matches!(result, Err(Error::Mismatch { .. })));
    }

    #[tokio::test]
    async fn spans_multiple_fragments() {
        let (_dir, driver) = new_driver().await;
        let node_id1 = [9u8; 32];
        let dataid = [10u8; 32];
        let frag = BLOB_FRAGMENT_SIZE;
        let mut data = vec![0u8; frag + 100];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        driver.write_blob(dataid, 0, &data, 1_000).await.unwrap();
        let len = driver
            .read_blob_intermediary_length(dataid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(len as usize, data.len());

        let h = blake2b(&data);
        driver
            .finalize_write_blob(node_id1, dataid, data.len() as u64, h, 1_001)
            .await
            .unwrap();
        let read = driver
            .read_blob(node_id1, 0, data.len() as u64)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn delete_blobs_removes_fragments_and_row() {
        let (_dir, driver) = new_driver().await;
        let node_id1 = [11u8; 32];
        let dataid = [12u8; 32];
        driver.write_blob(dataid, 0, b"data", 1_000).await.unwrap();
        let h = blake2b(b"data");
        driver
            .finalize_write_blob(node_id1, dataid, 4, h, 1_001)
            .await
            .unwrap();
        assert_eq!(
            driver.blob_exists(&[node_id1]).await.unwrap(),
            vec![node_id1]
        );
        let removed = driver.delete_blobs(&[node_id1]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(driver.blob_exists(&[node_id1]).await.unwrap().is_empty());
        assert!(driver.read_blob(node_id1, 0, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gc_removes_only_stale_nonfinalized_fragments() {
        let (_dir, driver) = new_driver().await;
        let dataid_old = [13u8; 32];
        let dataid_new = [14u8; 32];
        driver
            .write_blob(dataid_old, 0, b"old", 1_000)
            .await
            .unwrap();
        driver
            .write_blob(dataid_new, 0, b"new", 900_000_000)
            .await
            .unwrap();

        let removed = driver
            .delete_nonfinalized_blob_data(900_000_000, 7 * 24 * 60 * 60 * 1000, 100)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            driver
                .read_blob_intermediary_length(dataid_old)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            driver
                .read_blob_intermediary_length(dataid_new)
                .await
                .unwrap(),
            Some(3)
        );
    }

    #[tokio::test]
    async fn write_beyond_safe_offset_fails() {
        let (_dir, driver) = new_driver().await;
        let dataid = [15u8; 32];
        let result = driver
            .write_blob(dataid, MAX_SAFE_BLOB_OFFSET, b"x", 1_000)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn copy_fragments_from_duplicates_finalized_blob() {
        let (_dir, driver) = new_driver().await;
        let source_node = [16u8; 32];
        let source_dataid = [17u8; 32];
        let h = blake2b(b"shared payload");
        driver.write_blob(source_dataid, 0, b"shared payload", 1_000).await.unwrap();
        driver
            .finalize_write_blob(source_node, source_dataid, 14, h, 1_001)
            .await
            .unwrap();

        let target_dataid = [18u8; 32];
        let copied = driver
            .copy_fragments_from(source_node, target_dataid, 1_002)
            .await
            .unwrap();
        assert_eq!(copied, Some(14));

        let target_node = [19u8; 32];
        driver
            .finalize_write_blob(target_node, target_dataid, 14, h, 1_003)
            .await
            .unwrap();
        let read = driver.read_blob(target_node, 0, 14).await.unwrap().unwrap();
        assert_eq!(read, b"shared payload");
    }

    #[tokio::test]
    async fn copy_fragments_from_missing_source_returns_none() {
        let (_dir, driver) = new_driver().await;
        let copied = driver.copy_fragments_from([20u8; 32], [21u8; 32], 1_000).await.unwrap();
        assert_eq!(copied, None);
    }
}
