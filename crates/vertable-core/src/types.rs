//! Core types: composite keys, row status, time-to-live, reserved attribute
//! names, and the reference backend limits.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum statements in one batch-execute request (reference backend).
pub const MAX_BATCH_STATEMENTS: usize = 25;

/// Maximum combined entries and constraints in one transaction.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// Maximum length, in characters, of a single rendered statement.
pub const MAX_STATEMENT_LENGTH: usize = 8192;

/// Maximum keys in one batch-get request.
pub const MAX_BATCH_GET_KEYS: usize = 100;

pub const PARTITION_KEY_ATTRIBUTE: &str = "PK";
pub const SORT_KEY_ATTRIBUTE: &str = "SK";
pub const CREATE_DATE_ATTRIBUTE: &str = "CreateDate";
pub const ROW_TYPE_ATTRIBUTE: &str = "RowType";
pub const ROW_VERSION_ATTRIBUTE: &str = "RowVersion";
pub const LAST_UPDATED_DATE_ATTRIBUTE: &str = "LastUpdatedDate";
pub const TIME_TO_LIVE_ATTRIBUTE: &str = "ExpireDate";

/// Row attributes owned by the table layer. Payloads may not use these names.
pub const RESERVED_ATTRIBUTES: [&str; 7] = [
    PARTITION_KEY_ATTRIBUTE,
    SORT_KEY_ATTRIBUTE,
    CREATE_DATE_ATTRIBUTE,
    ROW_TYPE_ATTRIBUTE,
    ROW_VERSION_ATTRIBUTE,
    LAST_UPDATED_DATE_ATTRIBUTE,
    TIME_TO_LIVE_ATTRIBUTE,
];

/// Two-part row identity. Rows sharing a partition key are ordered by sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl CompositeKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.sort_key)
    }
}

/// Version counter and last-write time of a row.
///
/// Only a successful write changes the status: inserts start at version 0
/// and every update advances the version by exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStatus {
    pub row_version: u64,
    pub last_updated_date: DateTime<Utc>,
}

impl RowStatus {
    /// Status of a freshly created row.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            row_version: 0,
            last_updated_date: now,
        }
    }

    /// Status of the row after one more successful update.
    pub fn next(&self, now: DateTime<Utc>) -> Self {
        Self {
            row_version: self.row_version + 1,
            last_updated_date: now,
        }
    }
}

/// The optimistic-lock token: a write guarded by this only applies if the
/// stored row still has this version and create date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedVersion {
    pub row_version: u64,
    pub create_date: DateTime<Utc>,
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {} created {}",
            self.row_version,
            self.create_date.to_rfc3339()
        )
    }
}

/// Expiry of a row, in Unix epoch seconds. Opaque to the concurrency engine;
/// it is stored and returned but never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeToLive {
    pub expires_at: i64,
}

impl TimeToLive {
    pub fn at(expires_at: i64) -> Self {
        Self { expires_at }
    }
}
