//! Write intents and read-only transaction constraints.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::{ItemPayload, StoredItem, VersionedItem};
use crate::types::{CompositeKey, ExpectedVersion};

/// One write against a table.
///
/// Items are carried in their encoded form so entries of different payload
/// types can share one batch or transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteEntry {
    /// Create a row; fails if one already exists at the key.
    Insert { new: StoredItem },
    /// Replace a row; fails unless the stored row still matches `existing`.
    Update {
        new: StoredItem,
        existing: StoredItem,
    },
    /// Remove whatever is at the key. Removing nothing is not an error.
    DeleteAtKey { key: CompositeKey },
    /// Remove a row; fails unless the stored row still matches `existing`.
    DeleteItem { existing: StoredItem },
}

impl WriteEntry {
    pub fn insert<T: ItemPayload>(new: &VersionedItem<T>) -> Result<Self> {
        Ok(WriteEntry::Insert { new: new.encode()? })
    }

    /// An update from `existing` to `new`. Both must have the same key.
    pub fn update<T: ItemPayload>(
        new: &VersionedItem<T>,
        existing: &VersionedItem<T>,
    ) -> Result<Self> {
        if new.key() != existing.key() {
            return Err(Error::Validation {
                key: Some(new.key().clone()),
                message: format!(
                    "update changes the key from {} to {}",
                    existing.key(),
                    new.key()
                ),
            });
        }
        Ok(WriteEntry::Update {
            new: new.encode()?,
            existing: existing.encode()?,
        })
    }

    pub fn delete_at_key(key: CompositeKey) -> Self {
        WriteEntry::DeleteAtKey { key }
    }

    pub fn delete_item<T: ItemPayload>(existing: &VersionedItem<T>) -> Result<Self> {
        Ok(WriteEntry::DeleteItem {
            existing: existing.encode()?,
        })
    }

    /// The key this entry writes, whatever its payload type.
    pub fn key(&self) -> &CompositeKey {
        match self {
            WriteEntry::Insert { new } | WriteEntry::Update { new, .. } => &new.key,
            WriteEntry::DeleteAtKey { key } => key,
            WriteEntry::DeleteItem { existing } => &existing.key,
        }
    }
}

/// A read-only condition checked as part of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintEntry {
    /// The row must exist with exactly this version and create date.
    Required {
        key: CompositeKey,
        expected: ExpectedVersion,
    },
}

impl ConstraintEntry {
    pub fn required<T: ItemPayload>(existing: &VersionedItem<T>) -> Self {
        ConstraintEntry::Required {
            key: existing.key().clone(),
            expected: existing.expected_version(),
        }
    }

    pub fn key(&self) -> &CompositeKey {
        match self {
            ConstraintEntry::Required { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::tests::Counter;

    #[test]
    fn test_entry_keys() {
        let item = VersionedItem::new_item(CompositeKey::new("P1", "S1"), Counter { n: 1 });
        let updated = item.create_updated_item(Counter { n: 2 });

        let entries = vec![
            WriteEntry::insert(&item).unwrap(),
            WriteEntry::update(&updated, &item).unwrap(),
            WriteEntry::delete_at_key(CompositeKey::new("P1", "S2")),
            WriteEntry::delete_item(&updated).unwrap(),
        ];
        let keys: Vec<&str> = entries.iter().map(|e| e.key().sort_key.as_str()).collect();
        assert_eq!(keys, vec!["S1", "S1", "S2", "S1"]);
    }

    #[test]
    fn test_update_rejects_key_change() {
        let a = VersionedItem::new_item(CompositeKey::new("P1", "S1"), Counter { n: 1 });
        let b = VersionedItem::new_item(CompositeKey::new("P1", "S2"), Counter { n: 1 });
        let err = WriteEntry::update(&b, &a).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_required_constraint_captures_version() {
        let item = VersionedItem::new_item(CompositeKey::new("P1", "S1"), Counter { n: 1 })
            .create_updated_item(Counter { n: 2 });
        let ConstraintEntry::Required { key, expected } = ConstraintEntry::required(&item);
        assert_eq!(key, CompositeKey::new("P1", "S1"));
        assert_eq!(expected.row_version, 1);
        assert_eq!(expected.create_date, item.create_date());
    }
}
