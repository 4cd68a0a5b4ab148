//! The algorithm interface both sort strategies implement (§4.3 "Algorithms
//! share an interface").

use openodin_core::{Id, Node};

/// Selects which [`TransformerAlgo`] a transformer runs (§4.3 "exactly one
/// algorithm is selected per transformer"). Corresponds to the wire
/// `FetchTransform.algos` entries (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgoKind {
    /// AlgoSorted, id 1.
    Sorted,
    /// AlgoRefId, id 2.
    RefId,
}

impl AlgoKind {
    pub fn id(self) -> u8 {
        match self {
            AlgoKind::Sorted => 1,
            AlgoKind::RefId => 2,
        }
    }
}

/// Result of [`TransformerAlgo::add`]: which ids were brand new to the view
/// and which were already present but had their transient metadata change
/// (§4.3 `add(nodes) -> (newlyInserted, transientUpdated)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub newly_inserted: Vec<Id>,
    pub transient_updated: Vec<Id>,
}

/// One of the two ordering strategies a [`crate::Transformer`] can run
/// (§4.3 "exactly one is selected per transformer").
pub trait TransformerAlgo: Send {
    /// Idempotent; rejects beyond the view's capacity by returning an
    /// error (checked by the caller against `MAX_TRANSFORMER_LENGTH`).
    fn add(&mut self, nodes: &[Node]) -> AddOutcome;

    /// Removes the rows currently at `indexes` (positions into
    /// [`TransformerAlgo::get_all_nodes`]'s ordering).
    fn delete(&mut self, indexes: &[usize]);

    /// `(−1, ∞)`-style head/tail values clamp to `max_len`.
    /// `None` iff `cursor_id1` was given but isn't present in the view
    /// (§4.3 "undefined iff cursor is missing").
    fn get(
        &mut self,
        cursor_id1: Option<Id>,
        head: i64,
        tail: i64,
        reverse: bool,
        max_len: usize,
    ) -> Option<(Vec<Id>, Vec<usize>)>;

    fn get_indexes(&mut self, ids: &[Id]) -> Vec<Option<usize>>;

    fn get_length(&mut self) -> usize;

    /// The full ordered id list, as currently positioned.
    fn get_all_nodes(&mut self) -> Vec<Id>;
}

/// Shared windowing logic over an already-ordered id list (§4.2 cursor
/// semantics, reused verbatim by both algorithms since windowing only
/// depends on position within the ordering, not how that ordering was
/// produced).
pub(crate) fn window(
    ordered: &[Id],
    cursor_id1: Option<Id>,
    head: i64,
    tail: i64,
    reverse: bool,
    max_len: usize,
) -> Option<(Vec<Id>, Vec<usize>)> {
    let cursor_pos: i64 = match cursor_id1 {
        Some(id) => {
            let pos = ordered.iter().position(|x| *x == id)?;
            pos as i64
        }
        None => -1,
    };

    let (eff_head, eff_tail) = if reverse { (tail, head) } else { (head, tail) };
    let clamp = |n: i64| -> usize {
        if n < 0 {
            max_len
        } else {
            (n as usize).min(max_len)
        }
    };

    let len = ordered.len() as i64;
    // §4.2 "exactly one of head/tail is non-zero" (0 means unset, -1 means
    // unbounded); tail takes the branch only when head was left at 0.
    let (start, end) = if eff_tail == 0 {
        let n = clamp(eff_head) as i64;
        let start = (cursor_pos + 1).clamp(0, len);
        let end = (start + n).min(len);
        (start, end)
    } else {
        let n = clamp(eff_tail) as i64;
        let stop = if cursor_id1.is_some() { cursor_pos } else { len };
        let start = (stop - n).max(0);
        (start, stop.min(len))
    };

    let start = start.max(0) as usize;
    let end = end.max(start as i64) as usize;
    let indexes: Vec<usize> = (start..end).collect();
    let ids: Vec<Id> = indexes.iter().map(|&i| ordered[i]).collect();
    Some((ids, indexes))
}
