//! In-memory reference store.
//!
//! One mutex guards the whole partition map, so every mutation, including
//! each transaction and batch, is applied in a single total order. The lock
//! is never held across an `.await`.
//!
//! The store is both a [`Table`] (entry-level semantics, for tests that do
//! not care about statements) and a [`StoreClient`] (statement-level, so a
//! [`StoreTable`](crate::table::StoreTable) can run the real coordinator
//! against it).

mod engine;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::client::{
    BatchGetOutput, CancellationReason, StatementResponse, StoreClient, TransactionOutcome,
    WriteCondition,
};
use crate::config::StoreLimits;
use crate::error::{Error, Result};
use crate::item::StoredItem;
use crate::query::{QueryPage, QueryRequest};
use crate::retry::{ExponentialBackoff, RetryPolicy};
use crate::table::Table;
use crate::table::reasons::{batch_code_for, dedupe_errors};
use crate::types::CompositeKey;
use crate::write::{ConstraintEntry, Operation, Statement, WriteEntry};

use engine::Partitions;

/// A table held entirely in memory.
///
/// Cloning is cheap and clones share the same data.
#[derive(Clone)]
pub struct InMemoryStore {
    partitions: Arc<Mutex<Partitions>>,
    limits: StoreLimits,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            partitions: Arc::new(Mutex::new(Partitions::new())),
            limits: StoreLimits::default(),
            retry_policy: Arc::new(ExponentialBackoff::default()),
        }
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    /// Every stored row, ordered by key.
    pub fn snapshot(&self) -> Vec<StoredItem> {
        self.partitions
            .lock()
            .values()
            .flat_map(|partition| partition.values().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.partitions.lock().values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.lock().is_empty()
    }

    fn check_transaction_size(&self, attempted: usize) -> Result<()> {
        if attempted > self.limits.max_transaction_items {
            return Err(Error::ItemCollectionSizeLimitExceeded {
                attempted,
                max: self.limits.max_transaction_items,
            });
        }
        Ok(())
    }

    fn check_request_size(&self, what: &str, attempted: usize, max: usize) -> Result<()> {
        if attempted > max {
            return Err(Error::Validation {
                key: None,
                message: format!("{what} has {attempted} members, maximum is {max}"),
            });
        }
        Ok(())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Partitions) -> R) -> R {
        f(&mut self.partitions.lock())
    }
}

// ---------------------------------------------------------------------------
// Entry-level table
// ---------------------------------------------------------------------------

#[async_trait]
impl Table for InMemoryStore {
    fn retry_policy(&self) -> &dyn RetryPolicy {
        self.retry_policy.as_ref()
    }

    async fn insert(&self, item: StoredItem) -> Result<()> {
        self.mutate(|p| engine::put(p, item, &WriteCondition::NotExists))
    }

    async fn update(&self, new: StoredItem, existing: StoredItem) -> Result<()> {
        let condition = WriteCondition::VersionMatches {
            expected: existing.expected_version(),
        };
        self.mutate(|p| engine::put(p, new, &condition))
    }

    async fn delete_at_key(&self, key: &CompositeKey) -> Result<()> {
        self.mutate(|p| engine::delete(p, key, &WriteCondition::None))
    }

    async fn delete_item(&self, existing: StoredItem) -> Result<()> {
        let condition = WriteCondition::VersionMatches {
            expected: existing.expected_version(),
        };
        self.mutate(|p| engine::delete(p, &existing.key, &condition))
    }

    async fn clobber(&self, item: StoredItem) -> Result<()> {
        self.mutate(|p| engine::put(p, item, &WriteCondition::None))
    }

    async fn get(&self, key: &CompositeKey) -> Result<Option<StoredItem>> {
        Ok(engine::get(&self.partitions.lock(), key).cloned())
    }

    async fn get_many(&self, keys: &[CompositeKey]) -> Result<HashMap<CompositeKey, StoredItem>> {
        let partitions = self.partitions.lock();
        Ok(keys
            .iter()
            .filter_map(|key| engine::get(&partitions, key).map(|item| (key.clone(), item.clone())))
            .collect())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>> {
        engine::query(&self.partitions.lock(), &request)
    }

    /// Apply everything to a copy of the map and swap it in only if every
    /// entry and constraint succeeded.
    async fn transact(
        &self,
        entries: Vec<WriteEntry>,
        constraints: Vec<ConstraintEntry>,
    ) -> Result<()> {
        self.check_transaction_size(entries.len() + constraints.len())?;
        engine::ensure_distinct_keys(
            entries
                .iter()
                .map(WriteEntry::key)
                .chain(constraints.iter().map(ConstraintEntry::key)),
        )?;
        self.mutate(|partitions| {
            let mut working = partitions.clone();
            let mut errors: Vec<Error> = constraints
                .iter()
                .filter_map(|constraint| engine::apply_constraint(partitions, constraint).err())
                .collect();
            errors.extend(
                entries
                    .iter()
                    .filter_map(|entry| engine::apply_entry(&mut working, entry).err()),
            );
            if !errors.is_empty() {
                debug!(failures = errors.len(), "transaction rolled back");
                return Err(Error::TransactionCanceled(errors));
            }
            *partitions = working;
            Ok(())
        })
    }

    async fn bulk_write(&self, entries: Vec<WriteEntry>) -> Result<()> {
        let errors = self.mutate(|partitions| {
            entries
                .iter()
                .filter_map(|entry| engine::apply_entry(partitions, entry).err())
                .collect::<Vec<_>>()
        });
        let errors = dedupe_errors(errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::BatchFailures(errors))
        }
    }

    async fn bulk_write_with_fallback(&self, entries: Vec<WriteEntry>) -> Result<()> {
        // No statements here, so nothing is ever too long for a batch.
        self.bulk_write(entries).await
    }
}

// ---------------------------------------------------------------------------
// Statement-level store client
// ---------------------------------------------------------------------------

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get_item(&self, key: &CompositeKey) -> Result<Option<StoredItem>> {
        Ok(engine::get(&self.partitions.lock(), key).cloned())
    }

    async fn put_conditional(&self, item: StoredItem, condition: WriteCondition) -> Result<()> {
        self.mutate(|p| engine::put(p, item, &condition))
    }

    async fn delete_conditional(
        &self,
        key: &CompositeKey,
        condition: WriteCondition,
    ) -> Result<()> {
        self.mutate(|p| engine::delete(p, key, &condition))
    }

    async fn batch_execute(&self, statements: Vec<Statement>) -> Result<Vec<StatementResponse>> {
        self.check_request_size(
            "batch",
            statements.len(),
            self.limits.max_batch_statements,
        )?;
        Ok(self.mutate(|partitions| {
            statements
                .iter()
                .map(
                    |statement| match engine::apply_operation(partitions, &statement.operation) {
                        Ok(()) => StatementResponse::ok(),
                        Err(e) => StatementResponse::failed(batch_code_for(&e), e.to_string()),
                    },
                )
                .collect()
        }))
    }

    async fn execute_transaction(&self, statements: Vec<Statement>) -> Result<TransactionOutcome> {
        self.check_transaction_size(statements.len())?;
        engine::ensure_distinct_keys(statements.iter().map(Statement::key))?;

        Ok(self.mutate(|partitions| {
            let mut working = partitions.clone();
            let mut failed = false;
            let reasons = statements
                .iter()
                .map(|statement| {
                    // Checks see the committed state, writes the working copy.
                    let result = match &statement.operation {
                        Operation::Check { key, expected } => {
                            engine::check(partitions, key, expected)
                        }
                        operation => engine::apply_operation(&mut working, operation),
                    };
                    match result {
                        Ok(()) => CancellationReason::none(),
                        Err(e) => {
                            failed = true;
                            CancellationReason::new(e.code(), e.to_string())
                        }
                    }
                })
                .collect();
            if failed {
                return TransactionOutcome::Canceled(reasons);
            }
            *partitions = working;
            TransactionOutcome::Committed
        }))
    }

    async fn batch_get_item(&self, keys: Vec<CompositeKey>) -> Result<BatchGetOutput> {
        self.check_request_size("batch get", keys.len(), self.limits.max_batch_get_keys)?;
        let partitions = self.partitions.lock();
        Ok(BatchGetOutput {
            items: keys
                .iter()
                .filter_map(|key| engine::get(&partitions, key).cloned())
                .collect(),
            unprocessed_keys: Vec::new(),
        })
    }

    async fn query_partition(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>> {
        engine::query(&self.partitions.lock(), &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::VersionedItem;
    use crate::item::tests::Counter;
    use crate::write::StatementBuilder;

    fn counter(sort_key: &str, n: i64) -> VersionedItem<Counter> {
        VersionedItem::new_item(CompositeKey::new("P1", sort_key), Counter { n })
    }

    fn builder() -> StatementBuilder {
        StatementBuilder::new("t", true, 8192)
    }

    #[tokio::test]
    async fn test_transaction_reasons_are_positional() {
        let store = InMemoryStore::new();
        let a = counter("a", 1);
        Table::insert(&store, a.encode().unwrap()).await.unwrap();

        let statements = vec![
            builder()
                .for_entry(&WriteEntry::insert(&counter("b", 2)).unwrap())
                .unwrap(),
            builder()
                .for_entry(&WriteEntry::insert(&a).unwrap())
                .unwrap(),
        ];
        let outcome = store.execute_transaction(statements).await.unwrap();
        let TransactionOutcome::Canceled(reasons) = outcome else {
            panic!("expected cancellation");
        };
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0].code.as_deref(), Some("None"));
        assert_eq!(reasons[1].code.as_deref(), Some("DuplicateItem"));
        // Nothing from the canceled transaction was kept.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_rejects_repeated_key() {
        let store = InMemoryStore::new();
        let b = counter("b", 1);
        let statements = vec![
            builder().for_entry(&WriteEntry::insert(&b).unwrap()).unwrap(),
            builder()
                .for_entry(&WriteEntry::delete_at_key(b.key().clone()))
                .unwrap(),
        ];
        let err = store.execute_transaction(statements).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_batch_execute_reports_each_statement() {
        let store = InMemoryStore::new();
        let a = counter("a", 1);
        Table::insert(&store, a.encode().unwrap()).await.unwrap();

        let statements = vec![
            builder().for_entry(&WriteEntry::insert(&a).unwrap()).unwrap(),
            builder()
                .for_entry(&WriteEntry::insert(&counter("b", 1)).unwrap())
                .unwrap(),
        ];
        let responses = store.batch_execute(statements).await.unwrap();
        assert_eq!(
            responses[0].error.as_ref().map(|e| e.code),
            Some(crate::client::BatchErrorCode::DuplicateItem)
        );
        assert!(responses[1].error.is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_execute_enforces_request_size() {
        let store = InMemoryStore::new().with_limits(StoreLimits {
            max_batch_statements: 1,
            ..StoreLimits::default()
        });
        let statements = vec![
            builder()
                .for_entry(&WriteEntry::delete_at_key(CompositeKey::new("P", "a")))
                .unwrap(),
            builder()
                .for_entry(&WriteEntry::delete_at_key(CompositeKey::new("P", "b")))
                .unwrap(),
        ];
        let err = store.batch_execute(statements).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let other = store.clone();
        Table::insert(&store, counter("a", 1).encode().unwrap())
            .await
            .unwrap();
        assert_eq!(other.snapshot().len(), 1);
        assert!(!other.is_empty());
    }
}
