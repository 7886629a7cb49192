//! Table configuration.
//!
//! Limits default to the reference backend's documented values; everything
//! can be overridden in code or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, Result};
use crate::retry::ExponentialBackoff;
use crate::types::{
    MAX_BATCH_GET_KEYS, MAX_BATCH_STATEMENTS, MAX_STATEMENT_LENGTH, MAX_TRANSACTION_ITEMS,
};

/// Per-request size limits enforced before any store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLimits {
    pub max_batch_statements: usize,
    pub max_transaction_items: usize,
    pub max_statement_length: usize,
    pub max_batch_get_keys: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_batch_statements: MAX_BATCH_STATEMENTS,
            max_transaction_items: MAX_TRANSACTION_ITEMS,
            max_statement_length: MAX_STATEMENT_LENGTH,
            max_batch_get_keys: MAX_BATCH_GET_KEYS,
        }
    }
}

/// Configuration for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub table_name: String,
    pub limits: StoreLimits,
    /// Double single quotes inside string literals of rendered statements.
    pub escape_single_quotes: bool,
    /// Backoff and budget for transaction-conflict resubmission.
    pub retry: ExponentialBackoff,
    /// How many times a batch get re-requests keys the store left unprocessed.
    pub unprocessed_key_retries: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            table_name: "vertable".to_string(),
            limits: StoreLimits::default(),
            escape_single_quotes: true,
            retry: ExponentialBackoff::default(),
            unprocessed_key_retries: 3,
        }
    }
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_escape_single_quotes(mut self, escape: bool) -> Self {
        self.escape_single_quotes = escape;
        self
    }

    pub fn with_retry(mut self, retry: ExponentialBackoff) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_unprocessed_key_retries(mut self, retries: u32) -> Self {
        self.unprocessed_key_retries = retries;
        self
    }

    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(EncodingError::from)
            .map_err(Into::into)
    }
}
