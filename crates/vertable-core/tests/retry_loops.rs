//! Read-modify-write loops under contention.
//!
//! `Interfering` wraps a table and, before selected writes reach it, bumps
//! the stored version of one row out of band, the way a second writer would.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use common::*;

use vertable_core::error::{Error, Result};
use vertable_core::item::StoredItem;
use vertable_core::memory::InMemoryStore;
use vertable_core::query::{QueryPage, QueryRequest};
use vertable_core::retry::RetryPolicy;
use vertable_core::table::{ConditionalWrites, Table, TableExt};
use vertable_core::types::CompositeKey;
use vertable_core::write::{ConstraintEntry, WriteEntry};

struct Interfering {
    inner: InMemoryStore,
    target: CompositeKey,
    /// Writes still to be preceded by an out-of-band bump.
    interference: AtomicU32,
    updates: AtomicU32,
    transactions: AtomicU32,
}

impl Interfering {
    fn new(inner: InMemoryStore, target: CompositeKey, interference: u32) -> Self {
        Self {
            inner,
            target,
            interference: AtomicU32::new(interference),
            updates: AtomicU32::new(0),
            transactions: AtomicU32::new(0),
        }
    }

    async fn interfere(&self) {
        let due = self
            .interference
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !due {
            return;
        }
        if let Some(mut stored) = self.inner.get(&self.target).await.unwrap() {
            stored.row_status = stored.row_status.next(Utc::now());
            self.inner.clobber(stored).await.unwrap();
        }
    }
}

#[async_trait]
impl Table for Interfering {
    fn retry_policy(&self) -> &dyn RetryPolicy {
        self.inner.retry_policy()
    }

    async fn insert(&self, item: StoredItem) -> Result<()> {
        self.inner.insert(item).await
    }

    async fn update(&self, new: StoredItem, existing: StoredItem) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.interfere().await;
        self.inner.update(new, existing).await
    }

    async fn delete_at_key(&self, key: &CompositeKey) -> Result<()> {
        self.inner.delete_at_key(key).await
    }

    async fn delete_item(&self, existing: StoredItem) -> Result<()> {
        self.inner.delete_item(existing).await
    }

    async fn clobber(&self, item: StoredItem) -> Result<()> {
        self.inner.clobber(item).await
    }

    async fn get(&self, key: &CompositeKey) -> Result<Option<StoredItem>> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[CompositeKey]) -> Result<HashMap<CompositeKey, StoredItem>> {
        self.inner.get_many(keys).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>> {
        self.inner.query(request).await
    }

    async fn transact(
        &self,
        entries: Vec<WriteEntry>,
        constraints: Vec<ConstraintEntry>,
    ) -> Result<()> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        self.interfere().await;
        self.inner.transact(entries, constraints).await
    }

    async fn bulk_write(&self, entries: Vec<WriteEntry>) -> Result<()> {
        self.inner.bulk_write(entries).await
    }

    async fn bulk_write_with_fallback(&self, entries: Vec<WriteEntry>) -> Result<()> {
        self.inner.bulk_write_with_fallback(entries).await
    }
}

fn increment(counter: &Counter) -> Result<Counter> {
    Ok(Counter { n: counter.n + 1 })
}

// ---------------------------------------------------------------------------
// conditionally_update_item
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_conditional_update_without_contention() {
    let table = memory_store();
    table.insert_item(&counter("S1", 1)).await.unwrap();

    let updated = table
        .conditionally_update_item(&key("S1"), 3, increment)
        .await
        .unwrap();
    assert_eq!((updated.row_version(), updated.payload().n), (1, 2));
}

#[tokio::test]
async fn test_conditional_update_retries_after_interference() {
    let table = Interfering::new(memory_store(), key("S1"), 1);
    table.insert_item(&counter("S1", 1)).await.unwrap();

    let updated = table
        .conditionally_update_item(&key("S1"), 3, increment)
        .await
        .unwrap();

    // First attempt lost to the bump, second read version 1 and wrote 2.
    assert_eq!(table.updates.load(Ordering::SeqCst), 2);
    assert_eq!(updated.payload().n, 2);
    assert_eq!(updated.row_version(), 2);
    let stored = table.get_item::<Counter>(&key("S1")).await.unwrap().unwrap();
    assert_eq!((stored.row_version(), stored.payload().n), (2, 2));
}

#[tokio::test]
async fn test_conditional_update_gives_up_after_retries() {
    let retries = 4;
    let table = Interfering::new(memory_store(), key("S1"), u32::MAX);
    table.insert_item(&counter("S1", 1)).await.unwrap();

    let err = table
        .conditionally_update_item(&key("S1"), retries, increment)
        .await
        .unwrap_err();
    let Error::ConcurrencyError {
        keys,
        attempts,
        reasons,
    } = &err
    else {
        panic!("expected a concurrency error, got {err}");
    };
    assert_eq!(keys, &vec![key("S1")]);
    assert_eq!(*attempts, retries + 1);
    assert_eq!(reasons.len(), (retries + 1) as usize);
    assert_eq!(table.updates.load(Ordering::SeqCst), retries + 1);

    let stored = table.get_item::<Counter>(&key("S1")).await.unwrap().unwrap();
    assert_eq!(stored.payload().n, 1);
}

#[tokio::test]
async fn test_conditional_update_with_zero_retries_tries_once() {
    let table = Interfering::new(memory_store(), key("S1"), 1);
    table.insert_item(&counter("S1", 1)).await.unwrap();

    let err = table
        .conditionally_update_item(&key("S1"), 0, increment)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyError { attempts: 1, .. }), "{err}");
    assert_eq!(table.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_conditional_update_of_missing_item_fails_fast() {
    let table = Interfering::new(memory_store(), key("S1"), 0);
    let err = table
        .conditionally_update_item(&key("S1"), 3, increment)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConditionalCheckFailed { .. }), "{err}");
    assert_eq!(table.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_conditional_update_returns_transform_error() {
    let table = memory_store();
    table.insert_item(&counter("S1", 1)).await.unwrap();

    let err = table
        .conditionally_update_item(&key("S1"), 3, |_: &Counter| {
            Err(Error::Validation {
                key: None,
                message: "refused".to_string(),
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err}");
    let stored = table.get_item::<Counter>(&key("S1")).await.unwrap().unwrap();
    assert_eq!(stored.row_version(), 0);
}

#[tokio::test]
async fn test_conditional_update_with_keeps_time_to_live() {
    use vertable_core::item::VersionedItem;
    use vertable_core::types::TimeToLive;

    let table = memory_store();
    table.insert_item(&counter("S1", 1)).await.unwrap();

    let updated = table
        .conditionally_update_item_with(&key("S1"), 3, |existing: &VersionedItem<Counter>| {
            Ok(existing.create_updated_item_with_time_to_live(
                Counter {
                    n: existing.payload().n * 10,
                },
                Some(TimeToLive::at(2_000_000_000)),
            ))
        })
        .await
        .unwrap();
    assert_eq!(updated.payload().n, 10);
    let stored = table.get_item::<Counter>(&key("S1")).await.unwrap().unwrap();
    assert_eq!(stored.time_to_live(), Some(TimeToLive::at(2_000_000_000)));
}

#[tokio::test]
async fn test_concurrent_incrementers_all_land() {
    let (store, table) = store_table();
    table.insert_item(&counter("S1", 0)).await.unwrap();
    let table = std::sync::Arc::new(table);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let table = std::sync::Arc::clone(&table);
            tokio::spawn(async move {
                table
                    .conditionally_update_item(&key("S1"), 50, increment)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let stored: StoredItem = store.snapshot().remove(0);
    let stored = stored.decode::<Counter>().unwrap();
    assert_eq!((stored.row_version(), stored.payload().n), (8, 8));
}

// ---------------------------------------------------------------------------
// transact_write_with_retries
// ---------------------------------------------------------------------------

fn increment_all(
    key: &CompositeKey,
    existing: Option<&vertable_core::item::VersionedItem<Counter>>,
) -> Result<Option<WriteEntry>> {
    match existing {
        Some(existing) => {
            let next = existing.create_updated_item(Counter {
                n: existing.payload().n + 1,
            });
            WriteEntry::update(&next, existing).map(Some)
        }
        None => WriteEntry::insert(&vertable_core::item::VersionedItem::new_item(
            key.clone(),
            Counter { n: 1 },
        ))
        .map(Some),
    }
}

#[tokio::test]
async fn test_transactional_update_writes_every_key() {
    let table = memory_store();
    table.insert_item(&counter("A", 5)).await.unwrap();

    table
        .transact_write_with_retries::<Counter, _>(
            &[key("A"), key("B"), key("A")],
            Vec::new(),
            3,
            increment_all,
        )
        .await
        .unwrap();

    let found = table.get_items::<Counter>(&[key("A"), key("B")]).await.unwrap();
    assert_eq!(found[&key("A")].payload().n, 6);
    assert_eq!(found[&key("B")].payload().n, 1);
}

#[tokio::test]
async fn test_transactional_update_retries_after_interference() {
    let table = Interfering::new(memory_store(), key("A"), 2);
    table.insert_item(&counter("A", 0)).await.unwrap();
    table.insert_item(&counter("B", 0)).await.unwrap();

    table
        .transact_write_with_retries::<Counter, _>(&[key("A"), key("B")], Vec::new(), 3, increment_all)
        .await
        .unwrap();

    assert_eq!(table.transactions.load(Ordering::SeqCst), 3);
    let found = table.get_items::<Counter>(&[key("A"), key("B")]).await.unwrap();
    assert_eq!(found[&key("A")].payload().n, 1);
    assert_eq!(found[&key("A")].row_version(), 3);
    assert_eq!(found[&key("B")].row_version(), 1);
}

#[tokio::test]
async fn test_transactional_update_gives_up_after_retries() {
    let table = Interfering::new(memory_store(), key("A"), u32::MAX);
    table.insert_item(&counter("A", 0)).await.unwrap();

    let err = table
        .transact_write_with_retries::<Counter, _>(&[key("A")], Vec::new(), 2, increment_all)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyError { attempts: 3, .. }), "{err}");
    assert_eq!(table.transactions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_transactional_update_stops_on_violated_constraint() {
    let table = Interfering::new(memory_store(), key("G"), 1);
    let guard = counter("G", 0);
    table.insert_item(&guard).await.unwrap();
    table.insert_item(&counter("A", 0)).await.unwrap();

    // The guard is bumped before the first submit, so the constraint captured
    // here can never hold again: no retry.
    let err = table
        .transact_write_with_retries::<Counter, _>(
            &[key("A")],
            vec![ConstraintEntry::required(&guard)],
            5,
            increment_all,
        )
        .await
        .unwrap_err();
    let Error::ConstraintFailure { reasons } = &err else {
        panic!("expected a constraint failure, got {err}");
    };
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].key(), Some(&key("G")));
    assert_eq!(table.transactions.load(Ordering::SeqCst), 1);

    let a = table.get_item::<Counter>(&key("A")).await.unwrap().unwrap();
    assert_eq!(a.row_version(), 0);
}

#[tokio::test]
async fn test_transactional_update_provider_may_skip_keys() {
    let table = memory_store();
    table.insert_item(&counter("A", 0)).await.unwrap();

    table
        .transact_write_with_retries::<Counter, _>(&[key("A"), key("B")], Vec::new(), 0, |key, existing| {
            if key.sort_key == "B" {
                return Ok(None);
            }
            increment_all(key, existing)
        })
        .await
        .unwrap();
    assert!(table.get(&key("B")).await.unwrap().is_none());
    assert_eq!(table.len(), 1);
}
