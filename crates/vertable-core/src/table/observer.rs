//! Observer decorator: react to successful writes, e.g. to keep an index
//! table in step with a primary table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::item::StoredItem;
use crate::query::{QueryPage, QueryRequest};
use crate::retry::RetryPolicy;
use crate::types::CompositeKey;
use crate::write::{ConstraintEntry, WriteEntry};

use super::Table;
use super::reasons::dedupe_errors;

/// Called after a write to the primary table succeeds.
///
/// An error returned here fails the write call it was observing; the primary
/// write itself is not undone.
#[async_trait]
pub trait TableObserver: Send + Sync {
    async fn on_insert(&self, _item: &StoredItem, _auxiliary: &dyn Table) -> Result<()> {
        Ok(())
    }

    async fn on_update(
        &self,
        _new: &StoredItem,
        _existing: &StoredItem,
        _auxiliary: &dyn Table,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_delete(&self, _key: &CompositeKey, _auxiliary: &dyn Table) -> Result<()> {
        Ok(())
    }
}

/// A table that reports successful writes to an observer.
///
/// `clobber` is reported as an insert.
pub struct ObservedTable<P> {
    primary: P,
    auxiliary: Arc<dyn Table>,
    observer: Arc<dyn TableObserver>,
}

impl<P: Table> ObservedTable<P> {
    pub fn new(primary: P, auxiliary: Arc<dyn Table>, observer: Arc<dyn TableObserver>) -> Self {
        Self {
            primary,
            auxiliary,
            observer,
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn auxiliary(&self) -> &dyn Table {
        self.auxiliary.as_ref()
    }

    async fn notify(&self, entry: &WriteEntry) -> Result<()> {
        let auxiliary = self.auxiliary.as_ref();
        match entry {
            WriteEntry::Insert { new } => self.observer.on_insert(new, auxiliary).await,
            WriteEntry::Update { new, existing } => {
                self.observer.on_update(new, existing, auxiliary).await
            }
            WriteEntry::DeleteAtKey { key } => self.observer.on_delete(key, auxiliary).await,
            WriteEntry::DeleteItem { existing } => {
                self.observer.on_delete(&existing.key, auxiliary).await
            }
        }
    }

    /// Notify entries that were applied by a bulk write.
    ///
    /// Entries whose key appears in a failure are skipped. A failure with no
    /// key means it is unknown what was applied, so nothing is reported.
    async fn notify_bulk(&self, entries: &[WriteEntry], result: Result<()>) -> Result<()> {
        let mut errors = match result {
            Ok(()) => Vec::new(),
            Err(Error::BatchFailures(errors)) => errors,
            Err(e) => return Err(e),
        };
        if errors.iter().any(|e| e.key().is_none()) {
            return Err(Error::BatchFailures(errors));
        }

        let failed: HashSet<CompositeKey> = errors.iter().filter_map(|e| e.key().cloned()).collect();
        for entry in entries.iter().filter(|entry| !failed.contains(entry.key())) {
            if let Err(e) = self.notify(entry).await {
                errors.push(e);
            }
        }

        let errors = dedupe_errors(errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::BatchFailures(errors))
        }
    }
}

#[async_trait]
impl<P: Table> Table for ObservedTable<P> {
    fn retry_policy(&self) -> &dyn RetryPolicy {
        self.primary.retry_policy()
    }

    async fn insert(&self, item: StoredItem) -> Result<()> {
        self.primary.insert(item.clone()).await?;
        self.observer.on_insert(&item, self.auxiliary.as_ref()).await
    }

    async fn update(&self, new: StoredItem, existing: StoredItem) -> Result<()> {
        self.primary.update(new.clone(), existing.clone()).await?;
        self.observer
            .on_update(&new, &existing, self.auxiliary.as_ref())
            .await
    }

    async fn delete_at_key(&self, key: &CompositeKey) -> Result<()> {
        self.primary.delete_at_key(key).await?;
        self.observer.on_delete(key, self.auxiliary.as_ref()).await
    }

    async fn delete_item(&self, existing: StoredItem) -> Result<()> {
        let key = existing.key.clone();
        self.primary.delete_item(existing).await?;
        self.observer.on_delete(&key, self.auxiliary.as_ref()).await
    }

    async fn clobber(&self, item: StoredItem) -> Result<()> {
        self.primary.clobber(item.clone()).await?;
        self.observer.on_insert(&item, self.auxiliary.as_ref()).await
    }

    async fn get(&self, key: &CompositeKey) -> Result<Option<StoredItem>> {
        self.primary.get(key).await
    }

    async fn get_many(&self, keys: &[CompositeKey]) -> Result<HashMap<CompositeKey, StoredItem>> {
        self.primary.get_many(keys).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>> {
        self.primary.query(request).await
    }

    async fn transact(
        &self,
        entries: Vec<WriteEntry>,
        constraints: Vec<ConstraintEntry>,
    ) -> Result<()> {
        self.primary.transact(entries.clone(), constraints).await?;
        for entry in &entries {
            self.notify(entry).await?;
        }
        Ok(())
    }

    async fn bulk_write(&self, entries: Vec<WriteEntry>) -> Result<()> {
        let result = self.primary.bulk_write(entries.clone()).await;
        self.notify_bulk(&entries, result).await
    }

    async fn bulk_write_with_fallback(&self, entries: Vec<WriteEntry>) -> Result<()> {
        let result = self.primary.bulk_write_with_fallback(entries.clone()).await;
        self.notify_bulk(&entries, result).await
    }
}
