//! Foundation types for the OpenOdin storage core: identifiers, the node
//! and cert data model, the unified error type, the explicit clock, and
//! engine configuration. No other crate in this workspace depends on
//! anything outside this one plus third-party crates — this is Layer 1.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod node;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{Error, Result, Status};
pub use ids::{hex_decode, hex_encode, is_zero, Id, KeyType, PublicKey, Signature, ZERO_ID};
pub use node::{
    Cert, CertConstraint, CertType, CertValue, FriendCertData, LicenseData, Node, NodeFlags,
    NodeSignature, Transient,
};
