//! Structural and temporal validity checks that don't require the
//! signature offloader (§3 invariant 2). Signature verification itself is
//! batched through `openodin-offloader` by the caller — this module only
//! checks the parts that are local and cheap.

use openodin_core::{Error, Node, Result};

use crate::node_codec::compute_id1;

/// Checks that `node.id1` matches its own content hash and that
/// `creationTime` is within tolerance of `now_ms` (§3 invariant 2, minus
/// the signature and cert-chain checks which need the offloader/driver).
pub fn validate_structure(node: &Node, now_ms: u64, tolerance_ms: u64) -> Result<()> {
    let expected_id1 = compute_id1(node)?;
    if expected_id1 != node.id1 {
        return Err(Error::malformed("id1 does not match canonical content hash"));
    }
    if !node.within_clock_tolerance(now_ms, tolerance_ms) {
        return Err(Error::malformed("creationTime is too far in the future"));
    }
    if node.signatures.is_empty() {
        return Err(Error::malformed("node carries no signatures"));
    }
    Ok(())
}
