//! Unified error type for the storage core.
//!
//! One flat enum rather than a hierarchy per crate: every layer widens it
//! with `#[from]` so handler code can use `?` end to end and only maps to
//! the wire `Status` at the outermost boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    #[error("malformed: {message}")]
    Malformed { message: String },

    #[error("not allowed: {message}")]
    NotAllowed { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("cursor missing: {message}")]
    MissingCursor { message: String },

    #[error("already exists: {message}")]
    Exists { message: String },

    #[error("mismatch: {message}")]
    Mismatch { message: String },

    #[error("crypto error: {message}")]
    Crypto { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }
    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::NotAllowed { message: message.into() }
    }
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }
    pub fn missing_cursor(message: impl Into<String>) -> Self {
        Self::MissingCursor { message: message.into() }
    }
    pub fn exists(message: impl Into<String>) -> Self {
        Self::Exists { message: message.into() }
    }
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::Mismatch { message: message.into() }
    }
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto { message: message.into() }
    }
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Maps this error onto the wire-level status enum (§6/§7).
    pub fn status(&self) -> Status {
        match self {
            Error::Malformed { .. } => Status::Malformed,
            Error::NotAllowed { .. } => Status::NotAllowed,
            Error::MissingCursor { .. } => Status::MissingCursor,
            Error::Exists { .. } => Status::Exists,
            Error::Mismatch { .. } => Status::Mismatch,
            Error::NotFound { .. }
            | Error::Crypto { .. }
            | Error::Serialization { .. }
            | Error::Storage { .. }
            | Error::Internal { .. } => Status::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level reply status shared by every response type (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Result,
    Error,
    Malformed,
    NotAllowed,
    MissingCursor,
    Exists,
    Mismatch,
}
