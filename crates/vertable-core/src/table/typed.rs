//! Typed access on top of [`Table`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::encoding::TypeRegistry;
use crate::error::Result;
use crate::item::{ItemPayload, VersionedItem};
use crate::query::{QueryPage, QueryRequest};
use crate::types::CompositeKey;
use crate::write::WriteEntry;

use super::Table;

/// Encode and decode [`VersionedItem`]s around the raw [`Table`] calls.
#[async_trait]
pub trait TableExt: Table {
    async fn insert_item<T: ItemPayload>(&self, item: &VersionedItem<T>) -> Result<()> {
        self.insert(item.encode()?).await
    }

    /// Write `new` over `existing`. The keys must match.
    async fn update_item<T: ItemPayload>(
        &self,
        new: &VersionedItem<T>,
        existing: &VersionedItem<T>,
    ) -> Result<()> {
        self.write(WriteEntry::update(new, existing)?).await
    }

    /// Overwrite regardless of the stored version.
    async fn clobber_item<T: ItemPayload>(&self, item: &VersionedItem<T>) -> Result<()> {
        self.clobber(item.encode()?).await
    }

    async fn delete_existing_item<T: ItemPayload>(&self, existing: &VersionedItem<T>) -> Result<()> {
        self.delete_item(existing.encode()?).await
    }

    async fn get_item<T: ItemPayload>(&self, key: &CompositeKey) -> Result<Option<VersionedItem<T>>> {
        self.get(key).await?.map(|stored| stored.decode()).transpose()
    }

    async fn get_items<T: ItemPayload>(
        &self,
        keys: &[CompositeKey],
    ) -> Result<HashMap<CompositeKey, VersionedItem<T>>> {
        self.get_many(keys)
            .await?
            .into_iter()
            .map(|(key, stored)| Ok((key, stored.decode()?)))
            .collect()
    }

    /// One page of results, all of type `T`.
    async fn query_page<T: ItemPayload>(
        &self,
        request: QueryRequest,
    ) -> Result<QueryPage<VersionedItem<T>>> {
        self.query(request).await?.try_map(|stored| stored.decode())
    }

    /// All results, following continuation tokens. `limit` sets the page size.
    async fn query_items<T: ItemPayload>(&self, request: QueryRequest) -> Result<Vec<VersionedItem<T>>> {
        let mut request = request;
        let mut items = Vec::new();
        loop {
            let page = self.query(request.clone()).await?;
            for stored in page.items {
                items.push(stored.decode()?);
            }
            match page.last_evaluated_key {
                Some(token) => request.exclusive_start = Some(token),
                None => return Ok(items),
            }
        }
    }

    /// All results, each decoded through the registry by its row type.
    async fn query_polymorphic<R: Send + 'static>(
        &self,
        request: QueryRequest,
        registry: &TypeRegistry<R>,
    ) -> Result<Vec<R>> {
        let mut request = request;
        let mut items = Vec::new();
        loop {
            let page = self.query(request.clone()).await?;
            for stored in &page.items {
                items.push(registry.decode(stored)?);
            }
            match page.last_evaluated_key {
                Some(token) => request.exclusive_start = Some(token),
                None => return Ok(items),
            }
        }
    }
}

impl<T: Table + ?Sized> TableExt for T {}
