//! The store client contract the table layer is written against.
//!
//! A client is bound to one table. Implementations: the in-memory store
//! (`memory::InMemoryStore`) and the socket client in `vertable-server`.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::StoredItem;
use crate::query::{QueryPage, QueryRequest};
use crate::types::{CompositeKey, ExpectedVersion};
use crate::write::Statement;

/// Server-side predicate guarding a single put or delete.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteCondition {
    /// Always apply.
    None,
    /// Apply only if no row exists at the key.
    NotExists,
    /// Apply only if the stored row holds this version and create date.
    VersionMatches { expected: ExpectedVersion },
}

/// Error codes a batch-execute response may carry, per statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchErrorCode {
    ConditionalCheckFailed,
    DuplicateItem,
    ItemCollectionSizeLimitExceeded,
    RequestLimitExceeded,
    ValidationError,
    ProvisionedThroughputExceeded,
    TransactionConflict,
    ThrottlingError,
    InternalServerError,
    ResourceNotFound,
    AccessDenied,
}

impl BatchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchErrorCode::ConditionalCheckFailed => "ConditionalCheckFailed",
            BatchErrorCode::DuplicateItem => "DuplicateItem",
            BatchErrorCode::ItemCollectionSizeLimitExceeded => "ItemCollectionSizeLimitExceeded",
            BatchErrorCode::RequestLimitExceeded => "RequestLimitExceeded",
            BatchErrorCode::ValidationError => "ValidationError",
            BatchErrorCode::ProvisionedThroughputExceeded => "ProvisionedThroughputExceeded",
            BatchErrorCode::TransactionConflict => "TransactionConflict",
            BatchErrorCode::ThrottlingError => "ThrottlingError",
            BatchErrorCode::InternalServerError => "InternalServerError",
            BatchErrorCode::ResourceNotFound => "ResourceNotFound",
            BatchErrorCode::AccessDenied => "AccessDenied",
        }
    }
}

impl fmt::Display for BatchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one statement inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatementError {
    pub code: BatchErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-statement result of a batch execute, positionally aligned with the
/// submitted statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchStatementError>,
}

impl StatementResponse {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(code: BatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: Some(BatchStatementError {
                code,
                message: Some(message.into()),
            }),
        }
    }
}

/// Why one statement of a canceled transaction did not apply.
///
/// `code` is the backend's free-form code string; `"None"` or a missing code
/// means the statement itself was fine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancellationReason {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CancellationReason {
    pub fn none() -> Self {
        Self {
            code: Some("None".to_string()),
            message: None,
        }
    }

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }
}

/// Result of submitting a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reasons", rename_all = "snake_case")]
pub enum TransactionOutcome {
    Committed,
    /// Nothing was applied; one reason per submitted statement.
    Canceled(Vec<CancellationReason>),
}

/// Result of one batch get.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchGetOutput {
    pub items: Vec<StoredItem>,
    /// Keys the store did not get to; the caller may ask again.
    #[serde(default)]
    pub unprocessed_keys: Vec<CompositeKey>,
}

/// Low-level operations against one table of the backing store.
///
/// Every method is a single store call. Retrying, chunking and error decoding
/// happen in the table layer above.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get_item(&self, key: &CompositeKey) -> Result<Option<StoredItem>>;

    /// Write `item`, subject to `condition`. A failed condition is reported as
    /// `Error::ConditionalCheckFailed`.
    async fn put_conditional(&self, item: StoredItem, condition: WriteCondition) -> Result<()>;

    async fn delete_conditional(&self, key: &CompositeKey, condition: WriteCondition)
    -> Result<()>;

    /// Execute independent statements; one response per statement.
    async fn batch_execute(&self, statements: Vec<Statement>) -> Result<Vec<StatementResponse>>;

    /// Execute statements atomically.
    async fn execute_transaction(&self, statements: Vec<Statement>) -> Result<TransactionOutcome>;

    async fn batch_get_item(&self, keys: Vec<CompositeKey>) -> Result<BatchGetOutput>;

    async fn query_partition(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>>;
}
