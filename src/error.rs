//! Error Types
//!
//! A single error enum covers every failure a public operation can report.
//! Store backends report their own [`StoreError`], which converts into
//! [`RlzError::Store`] with `?`.

use crate::model::types::OwnerId;
use crate::storage::StoreError;

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = RlzError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RlzError {
    /// A required input was empty or a capacity of zero was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("owner {owner} lacks {} access", access_kind(.write))]
    AccessDenied { owner: OwnerId, write: bool },

    /// The output would not fit. The output buffer has been reset to empty.
    #[error("output needs {needed} bytes but capacity is {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("value not found")]
    NotFound,

    #[error("ping response failed checksum validation")]
    ChecksumMismatch,

    #[error("ping response is {len} bytes, limit is {max}")]
    ResponseTooLong { len: usize, max: usize },

    /// Only used while tokenizing a response; the line is skipped.
    #[error("malformed response line: {0}")]
    MalformedLine(String),

    #[error("timed out after {0:?} waiting for the exclusive lock")]
    LockTimeout(Duration),

    #[error("unsupported access point '{0}'")]
    UnsupportedAccessPoint(String),

    #[error("unsupported event '{0}'")]
    UnsupportedEvent(String),

    #[error("unknown product '{0}'")]
    UnknownProduct(String),

    #[error("value is {len} bytes, limit is {max}")]
    ValueTooLong { len: usize, max: usize },

    /// A delete was read back and the value was still there.
    #[error("{0} still present after delete")]
    VerificationFailed(String),

    #[error("last ping was too recent")]
    NotPingTime,

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn access_kind(write: &bool) -> &'static str {
    if *write {
        "write"
    } else {
        "read"
    }
}
