//! Backend error codes to typed errors, and batch error de-duplication.

use std::collections::HashSet;
use std::mem;

use crate::client::{BatchErrorCode, BatchStatementError, CancellationReason};
use crate::error::Error;
use crate::types::CompositeKey;
use crate::write::Statement;

/// Code a cancellation reason carries when its statement was fine.
pub const NO_ERROR_CODE: &str = "None";

/// Map a backend error code to a typed error.
///
/// Returns `None` for the no-error code. Codes that need a row but come
/// without one, and codes this table does not know, become
/// [`Error::Unknown`] so nothing is dropped.
pub fn error_from_code(code: &str, key: Option<&CompositeKey>, message: String) -> Option<Error> {
    let unknown = |key: Option<&CompositeKey>, message: String| Error::Unknown {
        code: code.to_string(),
        key: key.cloned(),
        message,
    };
    let error = match code {
        "" | NO_ERROR_CODE => return None,
        "ConditionalCheckFailed" => match key {
            Some(key) => Error::ConditionalCheckFailed {
                key: key.clone(),
                message,
            },
            None => unknown(None, message),
        },
        "DuplicateItem" => match key {
            Some(key) => Error::DuplicateItem {
                key: key.clone(),
                message,
            },
            None => unknown(None, message),
        },
        "ItemCollectionSizeLimitExceeded" => Error::ItemCollectionSizeExceeded {
            key: key.cloned(),
            message,
        },
        "TransactionSizeExceeded" => Error::TransactionSizeExceeded { message },
        "ProvisionedThroughputExceeded" => Error::ProvisionedThroughputExceeded { message },
        "ThrottlingError" => Error::Throttling { message },
        "RequestLimitExceeded" => Error::RequestLimitExceeded { message },
        "ValidationError" => Error::Validation {
            key: key.cloned(),
            message,
        },
        "TransactionConflict" => Error::TransactionConflict {
            key: key.cloned(),
            message,
        },
        "InternalServerError" => Error::InternalServerError { message },
        "AccessDenied" => Error::AccessDenied { message },
        "ResourceNotFound" => Error::ResourceNotFound { message },
        _ => unknown(key, message),
    };
    Some(error)
}

/// Decode the reasons of a canceled transaction.
///
/// Reasons are positional: reason `i` belongs to statement `i`. Reasons with
/// no error code are skipped.
pub fn decode_cancellation_reasons(
    reasons: &[CancellationReason],
    statements: &[Statement],
) -> Vec<Error> {
    reasons
        .iter()
        .enumerate()
        .filter_map(|(i, reason)| {
            let code = reason.code.as_deref()?;
            let key = statements.get(i).map(Statement::key);
            error_from_code(code, key, reason.message.clone().unwrap_or_default())
        })
        .collect()
}

/// Typed error for one failed statement of a batch.
pub fn error_from_batch_error(error: BatchStatementError, key: &CompositeKey) -> Error {
    let message = error.message.unwrap_or_default();
    error_from_code(error.code.as_str(), Some(key), message.clone()).unwrap_or_else(|| {
        Error::Unknown {
            code: error.code.as_str().to_string(),
            key: Some(key.clone()),
            message,
        }
    })
}

/// The batch response code a store reports for `error`.
pub fn batch_code_for(error: &Error) -> BatchErrorCode {
    match error {
        Error::ConditionalCheckFailed { .. } => BatchErrorCode::ConditionalCheckFailed,
        Error::DuplicateItem { .. } => BatchErrorCode::DuplicateItem,
        Error::ItemCollectionSizeLimitExceeded { .. } | Error::ItemCollectionSizeExceeded { .. } => {
            BatchErrorCode::ItemCollectionSizeLimitExceeded
        }
        Error::RequestLimitExceeded { .. } => BatchErrorCode::RequestLimitExceeded,
        Error::ProvisionedThroughputExceeded { .. } => {
            BatchErrorCode::ProvisionedThroughputExceeded
        }
        Error::TransactionConflict { .. } => BatchErrorCode::TransactionConflict,
        Error::Throttling { .. } => BatchErrorCode::ThrottlingError,
        Error::InternalServerError { .. } => BatchErrorCode::InternalServerError,
        Error::ResourceNotFound { .. } => BatchErrorCode::ResourceNotFound,
        Error::AccessDenied { .. } => BatchErrorCode::AccessDenied,
        _ => BatchErrorCode::ValidationError,
    }
}

/// Keep one occurrence of each infrastructure error and every item error,
/// in their original order.
pub fn dedupe_errors(errors: Vec<Error>) -> Vec<Error> {
    let mut seen = HashSet::new();
    errors
        .into_iter()
        .filter(|error| !error.is_infrastructure() || seen.insert(mem::discriminant(error)))
        .collect()
}
