//! Read-modify-write loops with optimistic locking.
//!
//! Both loops re-read, recompute and resubmit when another writer got there
//! first, and give up with [`Error::ConcurrencyError`] once `retries` is
//! spent: a loop makes at most `retries + 1` attempts.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::item::{ItemPayload, VersionedItem};
use crate::types::CompositeKey;
use crate::write::{ConstraintEntry, WriteEntry};

use super::Table;
use super::typed::TableExt;

#[async_trait]
pub trait ConditionalWrites: Table {
    /// Read the item at `key`, compute a new payload and write it back as the
    /// next version.
    ///
    /// A missing item fails with `ConditionalCheckFailed` straight away. Only
    /// a version conflict is retried; every other error is returned as-is.
    async fn conditionally_update_item<T, F>(
        &self,
        key: &CompositeKey,
        retries: u32,
        mut transform: F,
    ) -> Result<VersionedItem<T>>
    where
        T: ItemPayload,
        F: FnMut(&T) -> Result<T> + Send,
    {
        self.conditionally_update_item_with(key, retries, move |existing: &VersionedItem<T>| {
            let payload = transform(existing.payload())?;
            Ok(existing.create_updated_item(payload))
        })
        .await
    }

    /// Like [`conditionally_update_item`](Self::conditionally_update_item),
    /// with a transform that builds the whole next item.
    async fn conditionally_update_item_with<T, F>(
        &self,
        key: &CompositeKey,
        retries: u32,
        mut transform: F,
    ) -> Result<VersionedItem<T>>
    where
        T: ItemPayload,
        F: FnMut(&VersionedItem<T>) -> Result<VersionedItem<T>> + Send,
    {
        let mut remaining = retries;
        let mut attempts = 0;
        let mut reasons = Vec::new();
        loop {
            attempts += 1;
            let Some(existing) = self.get_item::<T>(key).await? else {
                return Err(Error::ConditionalCheckFailed {
                    key: key.clone(),
                    message: "item does not exist".to_string(),
                });
            };
            let new = transform(&existing)?;

            match self.update_item(&new, &existing).await {
                Ok(()) => return Ok(new),
                Err(e @ Error::ConditionalCheckFailed { .. }) => reasons.push(e),
                Err(e) => return Err(e),
            }

            if remaining == 0 {
                warn!(
                    partition_key = %key.partition_key,
                    sort_key = %key.sort_key,
                    attempts,
                    "conditional update retries exhausted"
                );
                return Err(Error::ConcurrencyError {
                    keys: vec![key.clone()],
                    attempts,
                    reasons,
                });
            }
            let delay = self.retry_policy().delay_for_attempt(attempts - 1);
            remaining -= 1;
            debug!(
                partition_key = %key.partition_key,
                sort_key = %key.sort_key,
                attempt = attempts,
                "version conflict, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Read every key, let `provider` decide what to write for each, and
    /// submit the result with `constraints` as one transaction.
    ///
    /// `provider` sees `None` for keys with no stored row and may return
    /// `None` to leave a key out. If the transaction is canceled because one
    /// of `constraints` no longer holds, the loop stops with
    /// [`Error::ConstraintFailure`]; any other cancellation is retried from a
    /// fresh read.
    async fn transact_write_with_retries<T, F>(
        &self,
        keys: &[CompositeKey],
        constraints: Vec<ConstraintEntry>,
        retries: u32,
        mut provider: F,
    ) -> Result<()>
    where
        T: ItemPayload,
        F: FnMut(&CompositeKey, Option<&VersionedItem<T>>) -> Result<Option<WriteEntry>> + Send,
    {
        let mut seen = HashSet::new();
        let keys: Vec<CompositeKey> = keys
            .iter()
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect();
        let constraint_keys: HashSet<CompositeKey> =
            constraints.iter().map(|c| c.key().clone()).collect();

        let mut remaining = retries;
        let mut attempts = 0;
        loop {
            attempts += 1;

            // 1. Fresh read of everything the provider may look at.
            let current = self.get_items::<T>(&keys).await?;

            // 2. Ask the provider for this round's entries.
            let mut entries = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(entry) = provider(key, current.get(key))? {
                    entries.push(entry);
                }
            }

            // 3. Submit and sort out why it failed, if it did.
            let errors = match self.transact(entries, constraints.clone()).await {
                Ok(()) => return Ok(()),
                Err(Error::TransactionCanceled(errors)) => errors,
                Err(e) => return Err(e),
            };
            let (violated, others): (Vec<Error>, Vec<Error>) =
                errors.into_iter().partition(|error| {
                    matches!(error, Error::ConditionalCheckFailed { key, .. } if constraint_keys.contains(key))
                });
            if !violated.is_empty() {
                return Err(Error::ConstraintFailure { reasons: violated });
            }

            if remaining == 0 {
                warn!(keys = keys.len(), attempts, "transactional update retries exhausted");
                return Err(Error::ConcurrencyError {
                    keys,
                    attempts,
                    reasons: others,
                });
            }
            let delay = self.retry_policy().delay_for_attempt(attempts - 1);
            remaining -= 1;
            debug!(keys = keys.len(), attempt = attempts, "transaction canceled, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

impl<T: Table + ?Sized> ConditionalWrites for T {}
