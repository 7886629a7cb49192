//! Shared fixtures for the vertable-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use vertable_core::config::TableConfig;
use vertable_core::item::{ItemPayload, VersionedItem};
use vertable_core::memory::InMemoryStore;
use vertable_core::retry::ExponentialBackoff;
use vertable_core::table::StoreTable;
use vertable_core::types::CompositeKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub n: i64,
}

impl ItemPayload for Counter {
    const ROW_TYPE: &'static str = "Counter";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub body: String,
}

impl ItemPayload for Note {
    const ROW_TYPE: &'static str = "Note";
}

pub fn key(sort_key: &str) -> CompositeKey {
    CompositeKey::new("P1", sort_key)
}

pub fn counter(sort_key: &str, n: i64) -> VersionedItem<Counter> {
    VersionedItem::new_item(key(sort_key), Counter { n })
}

/// Zero-delay retries so tests never sleep.
pub fn fast_retry(retries: u32) -> ExponentialBackoff {
    ExponentialBackoff::none(retries)
}

pub fn test_config() -> TableConfig {
    TableConfig::new("test").with_retry(fast_retry(3))
}

pub fn memory_store() -> InMemoryStore {
    InMemoryStore::new().with_retry_policy(Arc::new(fast_retry(3)))
}

/// A coordinator-driven table and a handle on the store behind it.
pub fn store_table() -> (InMemoryStore, StoreTable<InMemoryStore>) {
    let store = memory_store();
    let table = StoreTable::new(store.clone(), test_config());
    (store, table)
}
