//! Cursor/head/tail windowing over an already-ordered fetch result (§4.2
//! "Cursor semantics"). Independent of [`openodin_transformer`]'s own
//! windowing helper — the node driver sits below the transformer in the
//! workspace's dependency order, so it carries its own small copy of the
//! same cursor arithmetic rather than depending upward.

use openodin_core::Id;

/// `None` iff `cursor_id1` was given but isn't present in `ordered` (§4.2
/// "a missing cursor returns `MISSING_CURSOR`").
pub fn window<T>(
    ordered: &[T],
    id_of: impl Fn(&T) -> Id,
    cursor_id1: Option<Id>,
    head: i64,
    tail: i64,
    reverse: bool,
    max_len: usize,
) -> Option<Vec<usize>> {
    let cursor_pos: i64 = match cursor_id1 {
        Some(id) => ordered.iter().position(|row| id_of(row) == id)? as i64,
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
    Some((start..end).collect())
}
