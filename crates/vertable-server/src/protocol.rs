//! Wire protocol: JSON-over-newlines request/response types.
//!
//! Each request is a single JSON line naming the table it is for; each
//! response is a single JSON line.

use serde::{Deserialize, Serialize};

use vertable_core::client::{BatchGetOutput, StatementResponse, TransactionOutcome, WriteCondition};
use vertable_core::error::Error as StoreError;
use vertable_core::item::StoredItem;
use vertable_core::query::{QueryPage, QueryRequest};
use vertable_core::table::reasons::error_from_code;
use vertable_core::types::CompositeKey;
use vertable_core::write::Statement;

/// A request from a client.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetItem {
        table: String,
        key: CompositeKey,
    },
    PutItem {
        table: String,
        item: StoredItem,
        #[serde(default)]
        condition: Option<WriteCondition>,
    },
    DeleteItem {
        table: String,
        key: CompositeKey,
        #[serde(default)]
        condition: Option<WriteCondition>,
    },
    BatchExecute {
        table: String,
        statements: Vec<Statement>,
    },
    ExecuteTransaction {
        table: String,
        statements: Vec<Statement>,
    },
    BatchGetItem {
        table: String,
        keys: Vec<CompositeKey>,
    },
    Query {
        table: String,
        request: QueryRequest,
    },
}

impl Request {
    pub fn table(&self) -> &str {
        match self {
            Request::GetItem { table, .. }
            | Request::PutItem { table, .. }
            | Request::DeleteItem { table, .. }
            | Request::BatchExecute { table, .. }
            | Request::ExecuteTransaction { table, .. }
            | Request::BatchGetItem { table, .. }
            | Request::Query { table, .. } => table,
        }
    }
}

/// A response to a client.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok(OkResponse),
    Error(ErrorResponse),
}

/// Successful response variants.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OkResponse {
    Item {
        ok: bool,
        item: Option<StoredItem>,
    },
    Responses {
        ok: bool,
        responses: Vec<StatementResponse>,
    },
    Outcome {
        ok: bool,
        outcome: TransactionOutcome,
    },
    BatchGet {
        ok: bool,
        items: Vec<StoredItem>,
        unprocessed_keys: Vec<CompositeKey>,
    },
    Page {
        ok: bool,
        items: Vec<StoredItem>,
        last_evaluated_key: Option<String>,
    },
    Empty {
        ok: bool,
    },
}

/// Error response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CompositeKey>,
    /// Size or length the request tried, for limit errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

/// Error code for a request line that is not valid JSON or not a request.
pub const PARSE_ERROR: &str = "ParseError";
/// Error code for a response that could not be serialized.
pub const SERIALIZATION_ERROR: &str = "SerializationError";
/// Error code for a bad continuation token.
pub const INVALID_PAGINATION_TOKEN: &str = "InvalidPaginationToken";

impl ErrorResponse {
    /// Wire form of a store error. The row key travels alongside the code so
    /// the client can rebuild keyed errors.
    pub fn from_store_error(err: &StoreError) -> Self {
        let message = match err {
            StoreError::InvalidPaginationToken(token) => token.clone(),
            other => other.to_string(),
        };
        let (attempted, max) = match err {
            StoreError::ItemCollectionSizeLimitExceeded { attempted, max } => {
                (Some(*attempted), Some(*max))
            }
            StoreError::StatementLengthExceeded { length, max, .. } => (Some(*length), Some(*max)),
            _ => (None, None),
        };
        Self {
            error: err.code().to_string(),
            message,
            key: err.key().cloned(),
            attempted,
            max,
        }
    }

    /// Decode back into a store error by code.
    pub fn into_store_error(self) -> StoreError {
        match (self.error.as_str(), self.key.as_ref(), self.attempted, self.max) {
            (INVALID_PAGINATION_TOKEN, ..) => {
                return StoreError::InvalidPaginationToken(self.message);
            }
            ("ItemCollectionSizeLimitExceeded", None, Some(attempted), Some(max)) => {
                return StoreError::ItemCollectionSizeLimitExceeded { attempted, max };
            }
            ("StatementLengthExceeded", Some(key), Some(length), Some(max)) => {
                return StoreError::StatementLengthExceeded {
                    key: key.clone(),
                    length,
                    max,
                };
            }
            _ => {}
        }
        let fallback = StoreError::Unknown {
            code: self.error.clone(),
            key: self.key.clone(),
            message: self.message.clone(),
        };
        error_from_code(&self.error, self.key.as_ref(), self.message).unwrap_or(fallback)
    }
}

impl Response {
    pub fn ok_empty() -> Self {
        Response::Ok(OkResponse::Empty { ok: true })
    }

    pub fn ok_item(item: Option<StoredItem>) -> Self {
        Response::Ok(OkResponse::Item { ok: true, item })
    }

    pub fn ok_responses(responses: Vec<StatementResponse>) -> Self {
        Response::Ok(OkResponse::Responses {
            ok: true,
            responses,
        })
    }

    pub fn ok_outcome(outcome: TransactionOutcome) -> Self {
        Response::Ok(OkResponse::Outcome { ok: true, outcome })
    }

    pub fn ok_batch_get(output: BatchGetOutput) -> Self {
        Response::Ok(OkResponse::BatchGet {
            ok: true,
            items: output.items,
            unprocessed_keys: output.unprocessed_keys,
        })
    }

    pub fn ok_page(page: QueryPage<StoredItem>) -> Self {
        Response::Ok(OkResponse::Page {
            ok: true,
            items: page.items,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            error: error.into(),
            message: message.into(),
            ..ErrorResponse::default()
        })
    }

    pub fn store_error(err: &StoreError) -> Self {
        Response::Error(ErrorResponse::from_store_error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let request: Request = serde_json::from_value(json!({
            "op": "get_item",
            "table": "t",
            "key": {"partition_key": "P1", "sort_key": "S1"},
        }))
        .unwrap();
        assert_eq!(request.table(), "t");
        assert!(matches!(request, Request::GetItem { ref key, .. } if key.sort_key == "S1"));

        let request: Request = serde_json::from_value(json!({
            "op": "delete_item",
            "table": "t",
            "key": {"partition_key": "P1", "sort_key": "S1"},
        }))
        .unwrap();
        assert!(matches!(request, Request::DeleteItem { condition: None, .. }));
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let result = serde_json::from_value::<Request>(json!({"op": "scan", "table": "t"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_shapes() {
        let value = serde_json::to_value(Response::ok_item(None)).unwrap();
        assert_eq!(value, json!({"ok": true, "item": null}));

        let value = serde_json::to_value(Response::error(PARSE_ERROR, "bad")).unwrap();
        assert_eq!(value, json!({"error": "ParseError", "message": "bad"}));
    }

    #[test]
    fn test_keyed_error_survives_the_wire() {
        let key = CompositeKey::new("P1", "S1");
        let err = StoreError::ConditionalCheckFailed {
            key: key.clone(),
            message: "stale".to_string(),
        };
        let value = serde_json::to_value(Response::store_error(&err)).unwrap();
        assert_eq!(value["error"], "ConditionalCheckFailed");

        let response: ErrorResponse = serde_json::from_value(value).unwrap();
        let decoded = response.into_store_error();
        assert!(matches!(decoded, StoreError::ConditionalCheckFailed { key: k, .. } if k == key));
    }

    #[test]
    fn test_pagination_token_survives_the_wire() {
        let err = StoreError::InvalidPaginationToken("zz".to_string());
        let decoded = ErrorResponse::from_store_error(&err).into_store_error();
        assert!(matches!(decoded, StoreError::InvalidPaginationToken(t) if t == "zz"));
    }

    #[test]
    fn test_limit_errors_keep_their_numbers() {
        let err = StoreError::ItemCollectionSizeLimitExceeded {
            attempted: 101,
            max: 100,
        };
        let value = serde_json::to_value(Response::store_error(&err)).unwrap();
        assert_eq!(value["attempted"], 101);
        let response: ErrorResponse = serde_json::from_value(value).unwrap();
        assert!(matches!(
            response.into_store_error(),
            StoreError::ItemCollectionSizeLimitExceeded {
                attempted: 101,
                max: 100
            }
        ));

        let key = CompositeKey::new("P1", "BIG");
        let err = StoreError::StatementLengthExceeded {
            key: key.clone(),
            length: 9000,
            max: 8192,
        };
        let decoded = ErrorResponse::from_store_error(&err).into_store_error();
        assert!(matches!(
            decoded,
            StoreError::StatementLengthExceeded { key: k, length: 9000, max: 8192 } if k == key
        ));
    }

    #[test]
    fn test_keyed_size_error_stays_keyed() {
        let key = CompositeKey::new("P1", "S1");
        let err = StoreError::ItemCollectionSizeExceeded {
            key: Some(key.clone()),
            message: "too big".to_string(),
        };
        let decoded = ErrorResponse::from_store_error(&err).into_store_error();
        assert!(matches!(decoded, StoreError::ItemCollectionSizeExceeded { key: Some(k), .. } if k == key));
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let response = ErrorResponse {
            error: "Brand New".to_string(),
            message: "m".to_string(),
            ..ErrorResponse::default()
        };
        let decoded = response.into_store_error();
        assert!(matches!(decoded, StoreError::Unknown { ref code, .. } if code == "Brand New"));
    }
}
