//! [`Table`] over any [`StoreClient`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::StoreClient;
use crate::config::TableConfig;
use crate::error::Result;
use crate::item::StoredItem;
use crate::query::{QueryPage, QueryRequest};
use crate::retry::RetryPolicy;
use crate::types::CompositeKey;
use crate::write::{ConstraintEntry, StatementBuilder, WriteEntry};

use super::Table;
use super::coordinator::Coordinator;
use super::executor::WriteExecutor;

/// A table backed by a store client.
///
/// Single writes go through the [`WriteExecutor`]; transactions, batches and
/// batch gets through the [`Coordinator`].
pub struct StoreTable<C> {
    client: Arc<C>,
    config: TableConfig,
    coordinator: Coordinator<C>,
}

impl<C: StoreClient> StoreTable<C> {
    pub fn new(client: C, config: TableConfig) -> Self {
        Self::from_arc(Arc::new(client), config)
    }

    /// Share a client with other tables or tasks.
    pub fn from_arc(client: Arc<C>, config: TableConfig) -> Self {
        let retry_policy: Arc<dyn RetryPolicy> = Arc::new(config.retry.clone());
        let coordinator = Coordinator::new(
            Arc::clone(&client),
            StatementBuilder::from_config(&config),
            config.limits,
            config.unprocessed_key_retries,
            retry_policy,
        );
        Self {
            client,
            config,
            coordinator,
        }
    }

    /// Replace the backoff configured in [`TableConfig::retry`].
    pub fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.coordinator.set_retry_policy(retry_policy);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn executor(&self) -> &WriteExecutor<C> {
        self.coordinator.executor()
    }
}

#[async_trait]
impl<C: StoreClient + 'static> Table for StoreTable<C> {
    fn retry_policy(&self) -> &dyn RetryPolicy {
        self.coordinator.retry_policy()
    }

    async fn insert(&self, item: StoredItem) -> Result<()> {
        self.executor().insert(item).await
    }

    async fn update(&self, new: StoredItem, existing: StoredItem) -> Result<()> {
        self.executor().update(new, existing).await
    }

    async fn delete_at_key(&self, key: &CompositeKey) -> Result<()> {
        self.executor().delete_at_key(key).await
    }

    async fn delete_item(&self, existing: StoredItem) -> Result<()> {
        self.executor().delete_item(existing).await
    }

    async fn clobber(&self, item: StoredItem) -> Result<()> {
        self.executor().clobber(item).await
    }

    async fn get(&self, key: &CompositeKey) -> Result<Option<StoredItem>> {
        self.client.get_item(key).await
    }

    async fn get_many(&self, keys: &[CompositeKey]) -> Result<HashMap<CompositeKey, StoredItem>> {
        self.coordinator.get_many(keys).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage<StoredItem>> {
        self.client.query_partition(request).await
    }

    async fn transact(
        &self,
        entries: Vec<WriteEntry>,
        constraints: Vec<ConstraintEntry>,
    ) -> Result<()> {
        self.coordinator.transact(entries, constraints).await
    }

    async fn bulk_write(&self, entries: Vec<WriteEntry>) -> Result<()> {
        self.coordinator.bulk_write(entries).await
    }

    async fn bulk_write_with_fallback(&self, entries: Vec<WriteEntry>) -> Result<()> {
        self.coordinator.bulk_write_with_fallback(entries).await
    }
}
