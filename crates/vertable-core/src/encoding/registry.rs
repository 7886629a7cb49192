//! Runtime type registry: decode rows of several payload types into one
//! caller-defined enum, keyed by the stored row type.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::item::{ItemPayload, StoredItem, VersionedItem};

type Decoder<R> = Box<dyn Fn(&StoredItem) -> Result<R> + Send + Sync>;

/// Maps row-type discriminators to decode functions.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use vertable_core::encoding::TypeRegistry;
/// use vertable_core::item::{ItemPayload, VersionedItem};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Customer { name: String }
/// impl ItemPayload for Customer { const ROW_TYPE: &'static str = "Customer"; }
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Order { total: u64 }
/// impl ItemPayload for Order { const ROW_TYPE: &'static str = "Order"; }
///
/// enum Row {
///     Customer(VersionedItem<Customer>),
///     Order(VersionedItem<Order>),
/// }
///
/// let registry = TypeRegistry::new()
///     .register(Row::Customer)
///     .register(Row::Order);
/// assert!(registry.contains("Order"));
/// ```
pub struct TypeRegistry<R> {
    decoders: HashMap<&'static str, Decoder<R>>,
}

impl<R: 'static> TypeRegistry<R> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register payload type `T`; decoded rows are passed through `wrap`.
    ///
    /// Registering the same row type twice replaces the earlier decoder.
    pub fn register<T, F>(mut self, wrap: F) -> Self
    where
        T: ItemPayload,
        F: Fn(VersionedItem<T>) -> R + Send + Sync + 'static,
    {
        self.decoders.insert(
            T::ROW_TYPE,
            Box::new(move |stored: &StoredItem| stored.decode::<T>().map(&wrap)),
        );
        self
    }

    pub fn contains(&self, row_type: &str) -> bool {
        self.decoders.contains_key(row_type)
    }

    /// Decode one stored row through the decoder registered for its row type.
    pub fn decode(&self, stored: &StoredItem) -> Result<R> {
        match self.decoders.get(stored.row_type.as_str()) {
            Some(decoder) => decoder(stored),
            None => Err(Error::UnknownRowType {
                key: stored.key.clone(),
                row_type: stored.row_type.clone(),
            }),
        }
    }
}

impl<R: 'static> Default for TypeRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for TypeRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut row_types: Vec<&&str> = self.decoders.keys().collect();
        row_types.sort();
        f.debug_struct("TypeRegistry")
            .field("row_types", &row_types)
            .finish()
    }
}
