//! A [`StoreClient`] that talks to a `vertable-server` over its Unix socket.
//!
//! Each call serializes a JSON-line request, sends it, reads a JSON-line
//! response and decodes it. One connection is shared by all callers; calls
//! take turns on it.

use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use vertable_core::client::{
    BatchGetOutput, StatementResponse, StoreClient, TransactionOutcome, WriteCondition,
};
use vertable_core::error::Result as StoreResult;
use vertable_core::item::StoredItem;
use vertable_core::query::{QueryPage, QueryRequest};
use vertable_core::types::CompositeKey;
use vertable_core::write::Statement;

use crate::error::ClientError;
use crate::protocol::ErrorResponse;

/// Result type alias for transport-level client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    line_buf: String,
}

/// Client for one table hosted by a vertable server.
pub struct RemoteStoreClient {
    table_name: String,
    connection: Mutex<Connection>,
}

impl RemoteStoreClient {
    /// Connect to the server at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>, table_name: impl Into<String>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        let (read_half, write_half) = stream.into_split();
        let table_name = table_name.into();
        debug!(path = %path.as_ref().display(), table = %table_name, "connected");
        Ok(Self {
            table_name,
            connection: Mutex::new(Connection {
                reader: BufReader::new(read_half),
                writer: BufWriter::new(write_half),
                line_buf: String::new(),
            }),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Send one request and return the raw response, failing on an error
    /// response.
    pub async fn send_request(&self, req: &Value) -> Result<Value> {
        let mut data = serde_json::to_vec(req).map_err(ClientError::Serialization)?;
        data.push(b'\n');

        let mut connection = self.connection.lock().await;
        let Connection {
            reader,
            writer,
            line_buf,
        } = &mut *connection;
        writer.write_all(&data).await?;
        writer.flush().await?;

        line_buf.clear();
        let n = reader.read_line(line_buf).await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }

        let resp: Value =
            serde_json::from_str(line_buf.trim()).map_err(ClientError::Serialization)?;
        check_error(&resp)?;
        Ok(resp)
    }
}

#[async_trait]
impl StoreClient for RemoteStoreClient {
    async fn get_item(&self, key: &CompositeKey) -> StoreResult<Option<StoredItem>> {
        let resp = self
            .send_request(&json!({
                "op": "get_item",
                "table": self.table_name,
                "key": key,
            }))
            .await?;
        Ok(field(&resp, "item")?)
    }

    async fn put_conditional(&self, item: StoredItem, condition: WriteCondition) -> StoreResult<()> {
        self.send_request(&json!({
            "op": "put_item",
            "table": self.table_name,
            "item": item,
            "condition": condition,
        }))
        .await?;
        Ok(())
    }

    async fn delete_conditional(
        &self,
        key: &CompositeKey,
        condition: WriteCondition,
    ) -> StoreResult<()> {
        self.send_request(&json!({
            "op": "delete_item",
            "table": self.table_name,
            "key": key,
            "condition": condition,
        }))
        .await?;
        Ok(())
    }

    async fn batch_execute(&self, statements: Vec<Statement>) -> StoreResult<Vec<StatementResponse>> {
        let resp = self
            .send_request(&json!({
                "op": "batch_execute",
                "table": self.table_name,
                "statements": statements,
            }))
            .await?;
        Ok(field(&resp, "responses")?)
    }

    async fn execute_transaction(&self, statements: Vec<Statement>) -> StoreResult<TransactionOutcome> {
        let resp = self
            .send_request(&json!({
                "op": "execute_transaction",
                "table": self.table_name,
                "statements": statements,
            }))
            .await?;
        Ok(field(&resp, "outcome")?)
    }

    async fn batch_get_item(&self, keys: Vec<CompositeKey>) -> StoreResult<BatchGetOutput> {
        let resp = self
            .send_request(&json!({
                "op": "batch_get_item",
                "table": self.table_name,
                "keys": keys,
            }))
            .await?;
        Ok(BatchGetOutput {
            items: field(&resp, "items")?,
            unprocessed_keys: field(&resp, "unprocessed_keys")?,
        })
    }

    async fn query_partition(&self, request: QueryRequest) -> StoreResult<QueryPage<StoredItem>> {
        let resp = self
            .send_request(&json!({
                "op": "query",
                "table": self.table_name,
                "request": request,
            }))
            .await?;
        Ok(QueryPage {
            items: field(&resp, "items")?,
            last_evaluated_key: field(&resp, "last_evaluated_key")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

fn check_error(resp: &Value) -> Result<()> {
    if resp.get("error").is_some() {
        let error: ErrorResponse =
            serde_json::from_value(resp.clone()).map_err(ClientError::Serialization)?;
        return Err(ClientError::Server(error));
    }
    Ok(())
}

fn field<T: DeserializeOwned>(resp: &Value, name: &str) -> Result<T> {
    let value = resp
        .get(name)
        .cloned()
        .ok_or_else(|| ClientError::Protocol(format!("response has no '{name}' field")))?;
    serde_json::from_value(value).map_err(ClientError::Serialization)
}
