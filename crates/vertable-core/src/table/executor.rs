//! Single-entry conditional writes.
//!
//! Each call is exactly one store request guarded by the item's version.
//! Nothing here retries.

use std::sync::Arc;

use tracing::debug;

use crate::client::{StoreClient, WriteCondition};
use crate::error::Result;
use crate::item::StoredItem;
use crate::types::CompositeKey;
use crate::write::WriteEntry;

/// Executes write entries one at a time against a [`StoreClient`].
pub struct WriteExecutor<C> {
    client: Arc<C>,
}

impl<C> Clone for WriteExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: StoreClient> WriteExecutor<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Create the row; the key must be unused.
    pub async fn insert(&self, item: StoredItem) -> Result<()> {
        debug!(partition_key = %item.key.partition_key, sort_key = %item.key.sort_key, "insert");
        self.client
            .put_conditional(item, WriteCondition::NotExists)
            .await
    }

    /// Replace the row; it must still hold `existing`'s version.
    pub async fn update(&self, new: StoredItem, existing: StoredItem) -> Result<()> {
        debug!(
            partition_key = %new.key.partition_key,
            sort_key = %new.key.sort_key,
            expected_version = existing.row_status.row_version,
            "update"
        );
        self.client
            .put_conditional(
                new,
                WriteCondition::VersionMatches {
                    expected: existing.expected_version(),
                },
            )
            .await
    }

    /// Remove the row if present.
    pub async fn delete_at_key(&self, key: &CompositeKey) -> Result<()> {
        debug!(partition_key = %key.partition_key, sort_key = %key.sort_key, "delete at key");
        self.client
            .delete_conditional(key, WriteCondition::None)
            .await
    }

    /// Remove the row; it must still hold `existing`'s version.
    pub async fn delete_item(&self, existing: StoredItem) -> Result<()> {
        debug!(
            partition_key = %existing.key.partition_key,
            sort_key = %existing.key.sort_key,
            expected_version = existing.row_status.row_version,
            "delete item"
        );
        self.client
            .delete_conditional(
                &existing.key,
                WriteCondition::VersionMatches {
                    expected: existing.expected_version(),
                },
            )
            .await
    }

    /// Unconditional overwrite.
    pub async fn clobber(&self, item: StoredItem) -> Result<()> {
        debug!(partition_key = %item.key.partition_key, sort_key = %item.key.sort_key, "clobber");
        self.client.put_conditional(item, WriteCondition::None).await
    }

    pub async fn execute(&self, entry: WriteEntry) -> Result<()> {
        match entry {
            WriteEntry::Insert { new } => self.insert(new).await,
            WriteEntry::Update { new, existing } => self.update(new, existing).await,
            WriteEntry::DeleteAtKey { key } => self.delete_at_key(&key).await,
            WriteEntry::DeleteItem { existing } => self.delete_item(existing).await,
        }
    }
}
