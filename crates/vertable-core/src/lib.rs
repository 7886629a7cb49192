//! # vertable
//!
//! Versioned, optimistically locked items over a DynamoDB-style
//! partition/sort key table.
//!
//! Every row carries a version counter and create date. Writes are
//! conditional on the version the writer last read, so concurrent writers
//! are detected at commit time instead of being locked out in advance.
//! Multi-row writes go through a coordinator that chunks batches, runs
//! transactions, decodes cancellation reasons and resubmits on conflicts.
//! An in-memory store implements the same contracts for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use vertable_core::item::{ItemPayload, VersionedItem};
//! use vertable_core::memory::InMemoryStore;
//! use vertable_core::table::{ConditionalWrites, TableExt};
//! use vertable_core::types::CompositeKey;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Counter {
//!     n: i64,
//! }
//!
//! impl ItemPayload for Counter {
//!     const ROW_TYPE: &'static str = "Counter";
//! }
//!
//! # async fn run() -> vertable_core::error::Result<()> {
//! let table = InMemoryStore::new();
//! let key = CompositeKey::new("P1", "S1");
//!
//! // Insert at version 0
//! table.insert_item(&VersionedItem::new_item(key.clone(), Counter { n: 1 })).await?;
//!
//! // Read, transform and write back, retrying on version conflicts
//! let updated = table
//!     .conditionally_update_item(&key, 3, |c: &Counter| Ok(Counter { n: c.n + 1 }))
//!     .await?;
//! assert_eq!(updated.row_version(), 1);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod item;
pub mod memory;
pub mod query;
pub mod retry;
pub mod table;
pub mod types;
pub mod write;
