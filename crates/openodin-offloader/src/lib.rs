//! Signature offloader: a pool of worker threads holding a shared key
//! registry, batching sign/verify work round-robin (§4.6).

pub mod pool;
pub mod registry;

pub use pool::{
    SignatureOffloader, SignaturesCollection, SignatureToVerify, SignedResult, ToBeSigned,
};
pub use registry::KeyRegistry;
