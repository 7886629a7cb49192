//! The table contract shared by store-backed and in-memory tables.
//!
//! [`Table`] works on encoded [`StoredItem`]s so implementations stay object
//! safe. Typed access lives in [`TableExt`]; the read-modify-write retry
//! loops live in [`ConditionalWrites`].

pub mod conditional;
pub mod coordinator;
pub mod executor;
pub mod observer;
pub mod reasons;
pub mod store;
pub mod typed;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::item::StoredItem;
use crate::query::{QueryPage, QueryRequest};
use crate::retry::RetryPolicy;
use crate::types::CompositeKey;
use crate::write::{ConstraintEntry, WriteEntry};

pub use conditional::ConditionalWrites;
pub use coordinator::Coordinator;
pub use executor::WriteExecutor;
pub use observer::{ObservedTable, TableObserver};
pub use store::StoreTable;
pub use typed::TableExt;

/// Versioned reads and writes against one table.
#[async_trait]
pub trait Table: Send + Sync {
    /// Backoff used between retries of operations on this table.
    fn retry_policy(&self) -> &dyn RetryPolicy;

    /// Create a row. Fails with `ConditionalCheckFailed` if the key is taken.
    async fn insert(&self, item: StoredItem) -> Result<()>;

    /// Replace `existing` with `new`. Fails with `ConditionalCheckFailed`
    /// unless the stored row still has `existing`'s version and create date.
    async fn update(&self, new: StoredItem, existing: StoredItem) -> Result<()>;

    /// Remove the row at `key`, if any.
    async fn delete_at_key(&self, key: &CompositeKey) -> Result<()>;

    /// Remove `existing`, guarded like [`update`](Table::update).
    async fn delete_item(&self, existing: StoredItem) -> Result<()>;

    /// Overwrite the row at the item's key, ignoring whatever is stored.
    async fn clobber(&self, item: StoredItem) -> Result<()>;

    async fn get(&self, key: &CompositeKey) -> Result<Option<StoredItem>>;

    /// Fetch several rows. Absent keys are missing from the result.
    async fn get_many(&self, keys: &[CompositeKey]) -> Result<HashMap<CompositeKey, StoredItem>>;

    async fn query(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>>;

    /// Apply all entries and check all constraints atomically.
    async fn transact(
        &self,
        entries: Vec<WriteEntry>,
        constraints: Vec<ConstraintEntry>,
    ) -> Result<()>;

    /// Apply entries independently. Failures are collected into
    /// `Error::BatchFailures` and do not stop the other entries.
    async fn bulk_write(&self, entries: Vec<WriteEntry>) -> Result<()>;

    /// Like [`bulk_write`](Table::bulk_write), executing entries too large for
    /// a batch statement one at a time instead of failing them.
    async fn bulk_write_with_fallback(&self, entries: Vec<WriteEntry>) -> Result<()>;

    /// Execute a single entry.
    async fn write(&self, entry: WriteEntry) -> Result<()> {
        match entry {
            WriteEntry::Insert { new } => self.insert(new).await,
            WriteEntry::Update { new, existing } => self.update(new, existing).await,
            WriteEntry::DeleteAtKey { key } => self.delete_at_key(&key).await,
            WriteEntry::DeleteItem { existing } => self.delete_item(existing).await,
        }
    }
}
