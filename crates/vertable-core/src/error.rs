//! Error types for all vertable operations.

use thiserror::Error;

use crate::types::CompositeKey;

/// Top-level error type for table operations.
#[derive(Debug, Error)]
pub enum Error {
    // -- Precondition --
    #[error("conditional check failed for {key}: {message}")]
    ConditionalCheckFailed { key: CompositeKey, message: String },

    #[error("duplicate item {key}: {message}")]
    DuplicateItem { key: CompositeKey, message: String },

    // -- Resource / limit --
    #[error("item collection size limit exceeded: attempted {attempted}, maximum {max}")]
    ItemCollectionSizeLimitExceeded { attempted: usize, max: usize },

    #[error("item collection too large{}: {message}", key_suffix(.key))]
    ItemCollectionSizeExceeded {
        key: Option<CompositeKey>,
        message: String,
    },

    #[error("statement for {key} is {length} characters, maximum {max}")]
    StatementLengthExceeded {
        key: CompositeKey,
        length: usize,
        max: usize,
    },

    #[error("transaction size exceeded: {message}")]
    TransactionSizeExceeded { message: String },

    // -- Backend transient --
    #[error("provisioned throughput exceeded: {message}")]
    ProvisionedThroughputExceeded { message: String },

    #[error("request throttled: {message}")]
    Throttling { message: String },

    #[error("request limit exceeded: {message}")]
    RequestLimitExceeded { message: String },

    #[error("transaction conflict{}: {message}", key_suffix(.key))]
    TransactionConflict {
        key: Option<CompositeKey>,
        message: String,
    },

    #[error("internal server error: {message}")]
    InternalServerError { message: String },

    // -- Terminal --
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("resource not found: {message}")]
    ResourceNotFound { message: String },

    #[error("validation error{}: {message}", key_suffix(.key))]
    Validation {
        key: Option<CompositeKey>,
        message: String,
    },

    #[error("gave up after {attempts} attempts on {}: {}", format_keys(.keys), format_errors(.reasons))]
    ConcurrencyError {
        keys: Vec<CompositeKey>,
        attempts: u32,
        reasons: Vec<Error>,
    },

    #[error("declared constraint violated: {}", format_errors(.reasons))]
    ConstraintFailure { reasons: Vec<Error> },

    #[error("unable to build update: {reason}")]
    UnableToUpdate { reason: String },

    #[error("row {key} has type '{provided}', expected '{expected}'")]
    TypeMismatch {
        key: CompositeKey,
        expected: String,
        provided: String,
    },

    #[error("row {key} has unregistered type '{row_type}'")]
    UnknownRowType { key: CompositeKey, row_type: String },

    #[error("invalid pagination token: '{0}'")]
    InvalidPaginationToken(String),

    // -- Aggregate --
    #[error("batch failures: {}", format_errors(.0))]
    BatchFailures(Vec<Error>),

    #[error("transaction canceled: {}", format_errors(.0))]
    TransactionCanceled(Vec<Error>),

    #[error("multiple unexpected errors: {}", format_errors(.0))]
    MultipleUnexpectedErrors(Vec<Error>),

    // -- Unrecognized --
    #[error("unknown error code '{code}'{}: {message}", key_suffix(.key))]
    Unknown {
        code: String,
        key: Option<CompositeKey>,
        message: String,
    },

    #[error("unrecognized error {type_name}: {description}")]
    Unrecognized {
        type_name: String,
        description: String,
    },

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Failures converting between typed payloads, attribute maps and rows.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must encode to a map of attributes, got {0}")]
    PayloadNotAMap(&'static str),

    #[error("payload uses reserved attribute name '{0}'")]
    ReservedAttribute(String),

    #[error("missing row attribute '{0}'")]
    MissingAttribute(String),

    #[error("attribute '{attribute}' has type {found}, expected {expected}")]
    UnexpectedAttributeType {
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid number: '{0}'")]
    InvalidNumber(String),

    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Coarse classification of an [`Error`], used to decide who handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An expected precondition failed; a higher layer may re-read and retry.
    Precondition,
    /// The input must be restructured; never retried automatically.
    ResourceLimit,
    /// Backend contention or capacity; safe to retry with backoff.
    Transient,
    /// Surfaced to the caller as-is.
    Terminal,
    /// A container of other errors.
    Aggregate,
    /// An error code or foreign error the library does not know.
    Unrecognized,
    /// A payload or row could not be encoded or decoded.
    Encoding,
}

impl Error {
    /// Wrap a foreign error, keeping its type name and description.
    pub fn unrecognized<E: std::error::Error>(err: &E) -> Self {
        Error::Unrecognized {
            type_name: std::any::type_name::<E>().to_string(),
            description: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConditionalCheckFailed { .. } | Error::DuplicateItem { .. } => {
                ErrorKind::Precondition
            }
            Error::ItemCollectionSizeLimitExceeded { .. }
            | Error::ItemCollectionSizeExceeded { .. }
            | Error::StatementLengthExceeded { .. }
            | Error::TransactionSizeExceeded { .. } => ErrorKind::ResourceLimit,
            Error::ProvisionedThroughputExceeded { .. }
            | Error::Throttling { .. }
            | Error::RequestLimitExceeded { .. }
            | Error::TransactionConflict { .. }
            | Error::InternalServerError { .. } => ErrorKind::Transient,
            Error::AccessDenied { .. }
            | Error::ResourceNotFound { .. }
            | Error::Validation { .. }
            | Error::ConcurrencyError { .. }
            | Error::ConstraintFailure { .. }
            | Error::UnableToUpdate { .. }
            | Error::TypeMismatch { .. }
            | Error::UnknownRowType { .. }
            | Error::InvalidPaginationToken(_) => ErrorKind::Terminal,
            Error::BatchFailures(_)
            | Error::TransactionCanceled(_)
            | Error::MultipleUnexpectedErrors(_) => ErrorKind::Aggregate,
            Error::Unknown { .. } | Error::Unrecognized { .. } => ErrorKind::Unrecognized,
            Error::Encoding(_) => ErrorKind::Encoding,
        }
    }

    /// True for backend-transient errors that may succeed on resubmission.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Errors about the request or the service rather than a single item.
    ///
    /// Batch results keep one occurrence of each of these and every
    /// occurrence of everything else.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::AccessDenied { .. }
                | Error::InternalServerError { .. }
                | Error::RequestLimitExceeded { .. }
                | Error::StatementLengthExceeded { .. }
                | Error::ItemCollectionSizeExceeded { .. }
                | Error::ProvisionedThroughputExceeded { .. }
        )
    }

    /// The row this error is about, when the failure is tied to one.
    pub fn key(&self) -> Option<&CompositeKey> {
        match self {
            Error::ConditionalCheckFailed { key, .. }
            | Error::DuplicateItem { key, .. }
            | Error::StatementLengthExceeded { key, .. }
            | Error::TypeMismatch { key, .. }
            | Error::UnknownRowType { key, .. } => Some(key),
            Error::ItemCollectionSizeExceeded { key, .. }
            | Error::TransactionConflict { key, .. }
            | Error::Validation { key, .. }
            | Error::Unknown { key, .. } => key.as_ref(),
            _ => None,
        }
    }

    /// Member errors of an aggregate, empty for everything else.
    pub fn members(&self) -> &[Error] {
        match self {
            Error::BatchFailures(errors)
            | Error::TransactionCanceled(errors)
            | Error::MultipleUnexpectedErrors(errors) => errors,
            Error::ConstraintFailure { reasons } | Error::ConcurrencyError { reasons, .. } => {
                reasons
            }
            _ => &[],
        }
    }

    /// Backend error code for this error, as used in cancellation reasons,
    /// batch responses and the wire protocol.
    pub fn code(&self) -> &str {
        match self {
            Error::ConditionalCheckFailed { .. } => "ConditionalCheckFailed",
            Error::DuplicateItem { .. } => "DuplicateItem",
            Error::ItemCollectionSizeLimitExceeded { .. }
            | Error::ItemCollectionSizeExceeded { .. } => "ItemCollectionSizeLimitExceeded",
            Error::StatementLengthExceeded { .. } => "StatementLengthExceeded",
            Error::TransactionSizeExceeded { .. } => "TransactionSizeExceeded",
            Error::ProvisionedThroughputExceeded { .. } => "ProvisionedThroughputExceeded",
            Error::Throttling { .. } => "ThrottlingError",
            Error::RequestLimitExceeded { .. } => "RequestLimitExceeded",
            Error::TransactionConflict { .. } => "TransactionConflict",
            Error::InternalServerError { .. } => "InternalServerError",
            Error::AccessDenied { .. } => "AccessDenied",
            Error::ResourceNotFound { .. } => "ResourceNotFound",
            Error::Validation { .. } | Error::UnableToUpdate { .. } | Error::Encoding(_) => {
                "ValidationError"
            }
            Error::InvalidPaginationToken(_) => "InvalidPaginationToken",
            Error::Unknown { code, .. } => code,
            _ => "Unrecognized",
        }
    }
}

fn key_suffix(key: &Option<CompositeKey>) -> String {
    match key {
        Some(key) => format!(" for {key}"),
        None => String::new(),
    }
}

fn format_keys(keys: &[CompositeKey]) -> String {
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    format!("[{}]", keys.join(", "))
}

fn format_errors(errors: &[Error]) -> String {
    let errors: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("[{}]", errors.join("; "))
}

pub type Result<T> = std::result::Result<T, Error>;
