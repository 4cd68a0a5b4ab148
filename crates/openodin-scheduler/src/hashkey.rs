//! `HashKey`: canonicalises the subset of a fetch request that determines
//! the underlying model — query fields plus `algos`, `triggerNodeId` and
//! `msgId` — omitting window-only fields (`head`, `tail`, `cursorId1`,
//! `reverse`, `cutoffTime`) so that window changes do not invalidate a
//! shared view (§4.4).

use openodin_core::Id;
use openodin_node_driver::types::{CmpOp, EmbedSpec, FetchQuery, FieldValue, Filter, MatchSpec, Seed};
use openodin_transformer::AlgoKind;

pub type HashKey = Id;

fn push_bool(buf: &mut Vec<u8>, b: bool) {
    buf.push(b as u8);
}

fn push_u64(buf: &mut Vec<u8>, n: u64) {
    buf.extend_from_slice(&n.to_be_bytes());
}

fn push_i64(buf: &mut Vec<u8>, n: i64) {
    buf.extend_from_slice(&n.to_be_bytes());
}

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    push_u64(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn push_opt_id(buf: &mut Vec<u8>, id: Option<Id>) {
    match id {
        Some(id) => {
            buf.push(1);
            buf.extend_from_slice(&id);
        }
        None => buf.push(0),
    }
}

fn push_opt_u64(buf: &mut Vec<u8>, n: Option<u64>) {
    match n {
        Some(n) => {
            buf.push(1);
            push_u64(buf, n);
        }
        None => buf.push(0),
    }
}

fn push_opt_tag2(buf: &mut Vec<u8>, tag: Option<[u8; 2]>) {
    match tag {
        Some(t) => {
            buf.push(1);
            buf.extend_from_slice(&t);
        }
        None => buf.push(0),
    }
}

fn push_seed(buf: &mut Vec<u8>, seed: &Seed) {
    match seed {
        Seed::RootNodeId1(id) => {
            buf.push(0);
            buf.extend_from_slice(id);
        }
        Seed::ParentId(id) => {
            buf.push(1);
            buf.extend_from_slice(id);
        }
    }
}

fn push_field_value(buf: &mut Vec<u8>, value: &FieldValue) {
    match value {
        FieldValue::Bytes(b) => {
            buf.push(0);
            push_bytes(buf, b);
        }
        FieldValue::Text(s) => {
            buf.push(1);
            push_bytes(buf, s.as_bytes());
        }
        FieldValue::Number(n) => {
            buf.push(2);
            push_i64(buf, *n);
        }
    }
}

fn push_cmp(buf: &mut Vec<u8>, op: CmpOp) {
    buf.push(match op {
        CmpOp::Eq => 0,
        CmpOp::Ne => 1,
        CmpOp::Lt => 2,
        CmpOp::Le => 3,
        CmpOp::Gt => 4,
        CmpOp::Ge => 5,
    });
}

fn push_filter(buf: &mut Vec<u8>, filter: &Filter) {
    push_bytes(buf, filter.field.as_bytes());
    push_cmp(buf, filter.op);
    push_field_value(buf, &filter.value);
}

fn push_match(buf: &mut Vec<u8>, m: &MatchSpec) {
    push_bytes(buf, &m.node_type);
    push_u64(buf, m.filters.len() as u64);
    for f in &m.filters {
        push_filter(buf, f);
    }
    push_i64(buf, m.limit);
    match &m.limit_field {
        Some(s) => {
            buf.push(1);
            push_bytes(buf, s.as_bytes());
        }
        None => buf.push(0),
    }
    match m.level {
        Some(l) => {
            buf.push(1);
            push_u64(buf, l as u64);
        }
        None => buf.push(0),
    }
    push_opt_id(buf, m.require_id);
    push_bool(buf, m.discard);
    push_bool(buf, m.bottom);
    // `cursor_id1` on a match is part of the model, not the outer window
    // cursor, and is left in: it changes which rows a match selects.
    push_opt_id(buf, m.cursor_id1);
}

fn push_embed(buf: &mut Vec<u8>, e: &EmbedSpec) {
    push_bytes(buf, &e.node_type);
    push_u64(buf, e.filters.len() as u64);
    for f in &e.filters {
        push_filter(buf, f);
    }
}

/// (§4.4 "HashKey canonicalises the subset of the fetch request that
/// determines the underlying model ... omitting window-only fields").
pub fn compute_hash_key(query: &FetchQuery, algos: &[AlgoKind], msg_id: &[u8; 4]) -> HashKey {
    let mut buf = Vec::new();

    push_seed(&mut buf, &query.seed);
    push_i64(&mut buf, query.depth);

    push_u64(&mut buf, query.matches.len() as u64);
    for m in &query.matches {
        push_match(&mut buf, m);
    }
    push_u64(&mut buf, query.embed.len() as u64);
    for e in &query.embed {
        push_embed(&mut buf, e);
    }

    push_bool(&mut buf, query.descending);
    push_bool(&mut buf, query.order_by_storage_time);
    push_bool(&mut buf, query.ignore_own);
    push_bool(&mut buf, query.ignore_inactive);
    push_bool(&mut buf, query.discard_root);
    push_bool(&mut buf, query.preserve_transient);
    push_bool(&mut buf, query.include_licenses);
    push_opt_tag2(&mut buf, query.region);
    push_opt_tag2(&mut buf, query.jurisdiction);
    push_opt_id(&mut buf, query.trigger_node_id);
    push_opt_u64(&mut buf, query.trigger_interval);

    push_u64(&mut buf, algos.len() as u64);
    for algo in algos {
        buf.push(algo.id());
    }

    buf.extend_from_slice(msg_id);

    openodin_crypto::hash(&buf)
}
