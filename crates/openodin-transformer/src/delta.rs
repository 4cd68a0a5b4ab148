//! In-memory change representation and the wire `delta` byte buffer
//! (§4.3 "Diff emission").
//!
//! `Delta<T>` generalizes the teacher's reactive-list vocabulary
//! (`aura_core::reactive::Delta`) to the transformer's incremental-update
//! concept; the wire byte buffer underneath is a from-scratch "Fossil-style"
//! copy/insert encoding (the corpus carries no Fossil-delta crate, so the
//! op stream is serialized with `bincode` the way every other internal
//! format in this workspace is — recorded in DESIGN.md).

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use openodin_core::{Error, Result};

/// Incremental change to the transformer's in-memory ordered view, prior
/// to being serialized into the wire `delta` buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta<T> {
    Reset(Vec<T>),
    Insert { index: usize, item: T },
    Remove { index: usize },
    Update { index: usize, item: T },
    Batch(Vec<Delta<T>>),
}

impl<T> Delta<T> {
    pub fn is_empty(&self) -> bool {
        match self {
            Delta::Reset(items) => items.is_empty(),
            Delta::Batch(deltas) => deltas.is_empty(),
            _ => false,
        }
    }
}

/// Leading tag byte of the wire `delta` buffer: `0` is the only format
/// defined so far (§4.3 "future formats may use other tags").
pub const DELTA_TAG_FOSSIL: u8 = 0;

const BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum FossilOp {
    Copy { offset: u32, len: u32 },
    Insert(Vec<u8>),
}

fn hash_block(block: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    block.hash(&mut hasher);
    hasher.finish()
}

fn compute_ops(old: &[u8], new: &[u8]) -> Vec<FossilOp> {
    let mut block_map: HashMap<u64, Vec<usize>> = HashMap::new();
    if old.len() >= BLOCK_SIZE {
        for i in 0..=(old.len() - BLOCK_SIZE) {
            block_map.entry(hash_block(&old[i..i + BLOCK_SIZE])).or_default().push(i);
        }
    }

    let mut ops = Vec::new();
    let mut pending_insert: Vec<u8> = Vec::new();
    let mut i = 0usize;
    while i < new.len() {
        let mut found: Option<(usize, usize)> = None;
        if i + BLOCK_SIZE <= new.len() {
            let h = hash_block(&new[i..i + BLOCK_SIZE]);
            if let Some(candidates) = block_map.get(&h) {
                for &off in candidates {
                    if old[off..off + BLOCK_SIZE] == new[i..i + BLOCK_SIZE] {
                        let mut len = BLOCK_SIZE;
                        while off + len < old.len() && i + len < new.len() && old[off + len] == new[i + len] {
                            len += 1;
                        }
                        found = Some((off, len));
                        break;
                    }
                }
            }
        }
        match found {
            Some((off, len)) => {
                if !pending_insert.is_empty() {
                    ops.push(FossilOp::Insert(std::mem::take(&mut pending_insert)));
                }
                ops.push(FossilOp::Copy { offset: off as u32, len: len as u32 });
                i += len;
            }
            None => {
                pending_insert.push(new[i]);
                i += 1;
            }
        }
    }
    if !pending_insert.is_empty() {
        ops.push(FossilOp::Insert(pending_insert));
    }
    ops
}

/// Computes a Fossil-style byte delta from `old` to `new`, framed with a
/// single leading type byte (§4.3).
pub fn fossil_delta(old: &[u8], new: &[u8]) -> Vec<u8> {
    let ops = compute_ops(old, new);
    let mut out = vec![DELTA_TAG_FOSSIL];
    out.extend(bincode::serialize(&ops).expect("fossil op stream is always serializable"));
    out
}

/// Reconstructs `new` from `old` and a buffer produced by [`fossil_delta`].
pub fn apply_fossil_delta(old: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let Some((&tag, body)) = delta.split_first() else {
        return Err(Error::malformed("empty delta buffer"));
    };
    if tag != DELTA_TAG_FOSSIL {
        return Err(Error::malformed(format!("unknown delta format tag {tag}")));
    }
    let ops: Vec<FossilOp> =
        bincode::deserialize(body).map_err(|e| Error::malformed(format!("invalid delta op stream: {e}")))?;
    let mut out = Vec::new();
    for op in ops {
        match op {
            FossilOp::Copy { offset, len } => {
                let (offset, len) = (offset as usize, len as usize);
                let end = offset
                    .checked_add(len)
                    .ok_or_else(|| Error::malformed("delta copy range overflows"))?;
                if end > old.len() {
                    return Err(Error::malformed("delta copy range exceeds source length"));
                }
                out.extend_from_slice(&old[offset..end]);
            }
            FossilOp::Insert(bytes) => out.extend_from_slice(&bytes),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_empty_for_empty_reset() {
        assert!(Delta::<u8>::Reset(vec![]).is_empty());
        assert!(!Delta::Reset(vec![1u8]).is_empty());
    }

    #[test]
    fn roundtrips_identical_buffers() {
        let old = b"the quick brown fox jumps over the lazy dog";
        let delta = fossil_delta(old, old);
        let applied = apply_fossil_delta(old, &delta).unwrap();
        assert_eq!(applied, old);
    }

    #[test]
    fn roundtrips_appended_suffix() {
        let old = b"0011223344556677889900aa".to_vec();
        let mut new = old.clone();
        new.extend_from_slice(b"bbccddeeff00112233");
        let delta = fossil_delta(&old, &new);
        let applied = apply_fossil_delta(&old, &delta).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn roundtrips_unrelated_content() {
        let old = b"aaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
        let new = b"zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz".to_vec();
        let delta = fossil_delta(&old, &new);
        let applied = apply_fossil_delta(&old, &delta).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn first_tag_byte_identifies_fossil_format() {
        let delta = fossil_delta(b"abc", b"abcd");
        assert_eq!(delta[0], DELTA_TAG_FOSSIL);
    }

    #[test]
    fn rejects_unknown_tag() {
        let bogus = vec![7u8, 1, 2, 3];
        assert!(apply_fossil_delta(b"abc", &bogus).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_roundtrip_any_bytes(old in proptest::collection::vec(proptest::num::u8::ANY, 0..200), new in proptest::collection::vec(proptest::num::u8::ANY, 0..200)) {
            let delta = fossil_delta(&old, &new);
            let applied = apply_fossil_delta(&old, &delta).unwrap();
            proptest::prop_assert_eq!(applied, new);
        }
    }
}
