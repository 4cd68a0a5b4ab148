//! Ordered in-memory transformer views over a query's result set, plus the
//! diff machinery that feeds a subscription's sink (§4.3).

pub mod algo;
pub mod delta;
pub mod refid;
pub mod sorted;
pub mod transformer;

pub use algo::{AddOutcome, AlgoKind, TransformerAlgo};
pub use delta::{apply_fossil_delta, fossil_delta, Delta, DELTA_TAG_FOSSIL};
pub use refid::AlgoRefId;
pub use sorted::AlgoSorted;
pub use transformer::{EmittedDiff, Transformer};

/// Builds the algorithm a [`Transformer`] drives, selected by a fetch
/// request's `transform.algos` entry (§4.3, §6).
pub fn build_algo(kind: AlgoKind, descending: bool, order_by_storage_time: bool) -> Box<dyn TransformerAlgo> {
    match kind {
        AlgoKind::Sorted => Box::new(AlgoSorted::new(order_by_storage_time, descending)),
        AlgoKind::RefId => Box::new(AlgoRefId::new(descending)),
    }
}
