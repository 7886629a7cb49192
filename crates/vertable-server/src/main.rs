//! vertable server binary.
//!
//! Creates an in-memory table and serves it over a Unix domain socket.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use vertable_core::config::TableConfig;
use vertable_core::memory::InMemoryStore;
use vertable_server::VertableServer;

#[derive(Parser)]
#[command(name = "vertable-server", about = "Serve an in-memory vertable table over a Unix socket")]
struct Args {
    /// Socket path. Defaults to the local data directory.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Table name clients must address. Overrides the config file.
    #[arg(long)]
    table: Option<String>,

    /// JSON file with a table config; its limits apply to every request.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn default_socket_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vertable")
        .join("server.sock")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TableConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => TableConfig::default(),
    };
    if let Some(table) = args.table {
        config.table_name = table;
    }
    let socket_path = args.socket.unwrap_or_else(default_socket_path);

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(
        socket = %socket_path.display(),
        table = %config.table_name,
        "starting"
    );

    let store = InMemoryStore::new().with_limits(config.limits);
    let server = VertableServer::new(store, config.table_name, socket_path);
    server.run().await?;

    Ok(())
}
