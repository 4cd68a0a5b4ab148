//! Relational node persistence plus the permission-aware query engine
//! (§4.2).

pub mod cursor;
pub mod driver;
pub mod fetch;
pub mod filters;
pub mod permission;
pub mod rows;
pub mod schema;
pub mod store;
pub mod types;

pub use driver::NodeDriver;
pub use fetch::FetchOutcome;
pub use permission::{is_write_visible, license_grants_write};
pub use permission::{FriendCertRow, LicenseRow};
pub use store::{StoreOutcome, StoreResult};
pub use types::{
    CmpOp, EmbedSpec, FetchQuery, FetchedNode, FieldValue, Filter, MatchSpec, PermissionContext, Seed, UNBOUNDED,
};
