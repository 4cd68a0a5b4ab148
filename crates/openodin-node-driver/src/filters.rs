//! Named-field filter evaluation for `match[]` (§4.2 step 2d).

use openodin_core::Node;

use crate::types::{CmpOp, FieldValue, Filter};

/// Pulls the named field off a node, as the [`FieldValue`] variant the
/// field's type naturally compares as. Unknown field names yield `None`,
/// which makes any filter against them fail closed (never matches).
fn field_value(node: &Node, field: &str) -> Option<FieldValue> {
    match field {
        "creationTime" => Some(FieldValue::Number(node.creation_time as i64)),
        "expireTime" => node.expire_time.map(|t| FieldValue::Number(t as i64)),
        "dataLen" => Some(FieldValue::Number(node.data.len() as i64)),
        "contentType" => node.content_type.clone().map(FieldValue::Text),
        "region" => node.region.map(|r| FieldValue::Text(String::from_utf8_lossy(&r).into_owned())),
        "jurisdiction" => node.jurisdiction.map(|j| FieldValue::Text(String::from_utf8_lossy(&j).into_owned())),
        "nodeType" => Some(FieldValue::Bytes(node.node_type.clone())),
        "parentId" => Some(FieldValue::Bytes(node.parent_id.to_vec())),
        "owner" => Some(FieldValue::Bytes(node.owner.as_bytes().to_vec())),
        "data" => Some(FieldValue::Bytes(node.data.clone())),
        _ => None,
    }
}

fn cmp_numbers(op: CmpOp, a: i64, b: i64) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

fn cmp_ord<T: Ord>(op: CmpOp, a: &T, b: &T) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

/// Evaluates a single [`Filter`] against `node`; a field that doesn't exist
/// on the node, or whose value is a different shape than the filter's,
/// never matches.
pub fn filter_matches(node: &Node, filter: &Filter) -> bool {
    let Some(actual) = field_value(node, &filter.field) else {
        return false;
    };
    match (&actual, &filter.value) {
        (FieldValue::Number(a), FieldValue::Number(b)) => cmp_numbers(filter.op, *a, *b),
        (FieldValue::Text(a), FieldValue::Text(b)) => cmp_ord(filter.op, a, b),
        (FieldValue::Bytes(a), FieldValue::Bytes(b)) => cmp_ord(filter.op, a, b),
        _ => false,
    }
}

pub fn all_filters_match(node: &Node, filters: &[Filter]) -> bool {
    filters.iter().all(|f| filter_matches(node, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openodin_core::{KeyType, NodeFlags, Transient, ZERO_ID};
    use openodin_crypto::SecretKey;

    fn node(creation_time: u64, content_type: Option<&str>) -> Node {
        let sk = SecretKey::generate(KeyType::Ed25519);
        Node {
            id1: ZERO_ID,
            id2: None,
            parent_id: ZERO_ID,
            owner: sk.public_key(),
            creation_time,
            expire_time: None,
            region: None,
            jurisdiction: None,
            flags: NodeFlags::default(),
            node_type: b"data".to_vec(),
            content_type: content_type.map(String::from),
            data: vec![1, 2, 3],
            blob_hash: None,
            blob_length: None,
            copied_id1: None,
            difficulty: None,
            nonce: None,
            license: None,
            friend_cert: None,
            certs: vec![],
            achilles_hashes: vec![],
            destroy_hashes: vec![],
            signatures: vec![],
            transient: Transient::default(),
        }
    }

    #[test]
    fn numeric_comparison() {
        let n = node(500, None);
        assert!(filter_matches(&n, &Filter { field: "creationTime".into(), op: CmpOp::Gt, value: FieldValue::Number(100) }));
        assert!(!filter_matches(&n, &Filter { field: "creationTime".into(), op: CmpOp::Lt, value: FieldValue::Number(100) }));
    }

    #[test]
    fn text_comparison() {
        let n = node(1, Some("image/png"));
        assert!(filter_matches(
            &n,
            &Filter { field: "contentType".into(), op: CmpOp::Eq, value: FieldValue::Text("image/png".into()) }
        ));
    }

    #[test]
    fn unknown_field_never_matches() {
        let n = node(1, None);
        assert!(!filter_matches(&n, &Filter { field: "bogus".into(), op: CmpOp::Eq, value: FieldValue::Number(0) }));
    }

    #[test]
    fn missing_value_never_matches() {
        let n = node(1, None);
        assert!(!filter_matches(
            &n,
            &Filter { field: "contentType".into(), op: CmpOp::Eq, value: FieldValue::Text("x".into()) }
        ));
    }

    #[test]
    fn data_len_filter() {
        let n = node(1, None);
        assert!(filter_matches(&n, &Filter { field: "dataLen".into(), op: CmpOp::Eq, value: FieldValue::Number(3) }));
    }
}
