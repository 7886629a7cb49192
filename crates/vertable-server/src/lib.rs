//! vertable server and remote store client.
//!
//! Hosts one in-memory table behind a Unix socket so several processes can
//! share it, and provides [`RemoteStoreClient`], a [`StoreClient`] that
//! talks to that socket. A `StoreTable<RemoteStoreClient>` runs the full
//! coordinator against the server.
//!
//! [`StoreClient`]: vertable_core::client::StoreClient

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::RemoteStoreClient;
pub use server::VertableServer;
