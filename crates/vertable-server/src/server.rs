//! Unix domain socket server that wraps one in-memory table.
//!
//! Each connected client sends JSON-line requests and receives JSON-line
//! responses. Requests from all connections go to the same store, whose
//! mutex serializes every mutation.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use vertable_core::client::{StoreClient, WriteCondition};
use vertable_core::memory::InMemoryStore;

use crate::protocol::{PARSE_ERROR, Request, Response, SERIALIZATION_ERROR};

/// A vertable server listening on a Unix socket.
pub struct VertableServer {
    store: InMemoryStore,
    table_name: String,
    socket_path: PathBuf,
}

impl VertableServer {
    pub fn new(store: InMemoryStore, table_name: impl Into<String>, socket_path: PathBuf) -> Self {
        Self {
            store,
            table_name: table_name.into(),
            socket_path,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Run the server, accepting connections until a shutdown signal is received.
    ///
    /// On startup, removes any stale socket file and binds a new one.
    /// On shutdown (SIGINT or SIGTERM), removes the socket file before exiting.
    pub async fn run(&self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(
            path = %self.socket_path.display(),
            table = %self.table_name,
            "server listening"
        );

        let accept_loop = async {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let store = self.store.clone();
                        let table_name = self.table_name.clone();
                        tokio::spawn(async move {
                            debug!("client connected");
                            if let Err(e) = handle_connection(store, &table_name, stream).await {
                                warn!(error = %e, "connection handler error");
                            }
                            debug!("client disconnected");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
        };

        tokio::select! {
            _ = accept_loop => {}
            result = shutdown_signal() => {
                result?;
                info!("shutdown signal received");
            }
        }

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "failed to remove socket file on shutdown");
            } else {
                info!(path = %self.socket_path.display(), "socket file removed");
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    store: InMemoryStore,
    table_name: &str,
    stream: tokio::net::UnixStream,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => dispatch(&store, table_name, request).await,
            Err(e) => Response::error(PARSE_ERROR, e.to_string()),
        };

        let mut bytes = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(e) => serde_json::to_vec(&Response::error(SERIALIZATION_ERROR, e.to_string()))
                .map_err(std::io::Error::other)?,
        };
        bytes.push(b'\n');

        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn dispatch(store: &InMemoryStore, table_name: &str, request: Request) -> Response {
    if request.table() != table_name {
        return Response::error(
            "ResourceNotFound",
            format!("table not found: {}", request.table()),
        );
    }

    let result = match request {
        Request::GetItem { key, .. } => store.get_item(&key).await.map(Response::ok_item),
        Request::PutItem {
            item, condition, ..
        } => store
            .put_conditional(item, condition.unwrap_or(WriteCondition::None))
            .await
            .map(|()| Response::ok_empty()),
        Request::DeleteItem { key, condition, .. } => store
            .delete_conditional(&key, condition.unwrap_or(WriteCondition::None))
            .await
            .map(|()| Response::ok_empty()),
        Request::BatchExecute { statements, .. } => store
            .batch_execute(statements)
            .await
            .map(Response::ok_responses),
        Request::ExecuteTransaction { statements, .. } => store
            .execute_transaction(statements)
            .await
            .map(Response::ok_outcome),
        Request::BatchGetItem { keys, .. } => store
            .batch_get_item(keys)
            .await
            .map(Response::ok_batch_get),
        Request::Query { request, .. } => store
            .query_partition(request)
            .await
            .map(Response::ok_page),
    };

    result.unwrap_or_else(|e| {
        debug!(code = e.code(), error = %e, "request failed");
        Response::store_error(&e)
    })
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
