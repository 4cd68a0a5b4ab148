//! Deterministic binary codec for nodes, hash derivation, and the
//! structural half of node validity (§3, §9).

pub mod node_codec;
pub mod validate;

pub use node_codec::{
    canonical_bytes, compute_id1, compute_transienthash, compute_uniquehash, decode_node,
    encode_node, hash_to_sign, unpack_node,
};
pub use validate::validate_structure;
