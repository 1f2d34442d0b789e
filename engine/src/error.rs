//! Error types for the SyncDB engine.

use crate::{RecordKey, SchemaVersion, StoreName};
use std::time::Duration;
use thiserror::Error;

/// All possible errors from the SyncDB engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Store errors
    #[error("store not found: {0}")]
    StoreNotFound(StoreName),

    #[error("store '{0}' is not part of this transaction")]
    StoreNotInScope(StoreName),

    #[error("cannot write to '{0}' in a read-only transaction")]
    ReadOnly(StoreName),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("record not found: {0}")]
    RecordNotFound(RecordKey),

    #[error("record already exists: {0}")]
    RecordAlreadyExists(RecordKey),

    #[error("unique index '{index}' already holds the value of record {key}")]
    ConstraintViolation { index: String, key: RecordKey },

    #[error("record has no key")]
    MissingKey,

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid transaction mode: {0}")]
    InvalidMode(String),

    // Schema errors
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("cannot open version {requested}: database is already at version {stored}")]
    VersionDowngrade {
        requested: SchemaVersion,
        stored: SchemaVersion,
    },

    // Diff errors
    #[error("maximum diff depth exceeded ({0})")]
    DiffDepth(usize),

    #[error("cannot apply diff: {0}")]
    Patch(String),

    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(String),

    // Channel errors
    #[error("channel error: {0}")]
    Channel(String),

    #[error("channel closed before the sync session completed")]
    ChannelClosed,

    #[error("no remote configured")]
    NoRemote,

    // Session errors
    #[error("sync session cancelled")]
    Cancelled,

    #[error("sync session timed out after {0:?}")]
    Timeout(Duration),

    // Persistence errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl Error {
    /// Whether this error ended a sync session because of the transport.
    pub fn is_channel(&self) -> bool {
        matches!(self, Error::Channel(_) | Error::ChannelClosed)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
