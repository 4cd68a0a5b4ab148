//! Fragmented blob persistence (§4.5). Two `redb` tables: fragment rows
//! keyed `(dataid, fragmentnr)` and finalised-blob rows keyed
//! `(node_id1, dataid)`. `BLOB_FRAGMENT_SIZE` must never change for a live
//! database — it is baked into fragment row numbering.

pub mod dataid;
pub mod driver;
mod schema;

pub use dataid::compute_dataid;
pub use driver::BlobDriver;
