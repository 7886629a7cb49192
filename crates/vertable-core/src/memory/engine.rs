//! Pure operations on the in-memory partition map.
//!
//! Callers hold the store lock for the duration of each call; nothing here
//! locks or awaits.

use std::collections::{BTreeMap, HashSet};

use crate::client::WriteCondition;
use crate::error::{Error, Result};
use crate::item::StoredItem;
use crate::query::{QueryPage, QueryRequest, paginate};
use crate::types::{CompositeKey, ExpectedVersion};
use crate::write::{ConstraintEntry, Operation, UpdateChange, WriteEntry, apply_differences};

/// partition key -> sort key -> row
pub(crate) type Partitions = BTreeMap<String, BTreeMap<String, StoredItem>>;

pub(crate) fn get<'a>(partitions: &'a Partitions, key: &CompositeKey) -> Option<&'a StoredItem> {
    partitions
        .get(&key.partition_key)
        .and_then(|partition| partition.get(&key.sort_key))
}

fn check_version<'a>(
    stored: Option<&'a StoredItem>,
    key: &CompositeKey,
    expected: &ExpectedVersion,
) -> Result<&'a StoredItem> {
    match stored {
        None => Err(Error::ConditionalCheckFailed {
            key: key.clone(),
            message: format!("item does not exist, expected {expected}"),
        }),
        Some(stored) if !stored.matches(expected) => Err(Error::ConditionalCheckFailed {
            key: key.clone(),
            message: format!("expected {expected}, found {}", stored.expected_version()),
        }),
        Some(stored) => Ok(stored),
    }
}

fn check_condition(
    partitions: &Partitions,
    key: &CompositeKey,
    condition: &WriteCondition,
) -> Result<()> {
    let stored = get(partitions, key);
    match condition {
        WriteCondition::None => Ok(()),
        WriteCondition::NotExists if stored.is_some() => Err(Error::ConditionalCheckFailed {
            key: key.clone(),
            message: "item already exists".to_string(),
        }),
        WriteCondition::NotExists => Ok(()),
        WriteCondition::VersionMatches { expected } => {
            check_version(stored, key, expected).map(|_| ())
        }
    }
}

fn store(partitions: &mut Partitions, item: StoredItem) {
    partitions
        .entry(item.key.partition_key.clone())
        .or_default()
        .insert(item.key.sort_key.clone(), item);
}

pub(crate) fn put(
    partitions: &mut Partitions,
    item: StoredItem,
    condition: &WriteCondition,
) -> Result<()> {
    check_condition(partitions, &item.key, condition)?;
    store(partitions, item);
    Ok(())
}

pub(crate) fn delete(
    partitions: &mut Partitions,
    key: &CompositeKey,
    condition: &WriteCondition,
) -> Result<()> {
    check_condition(partitions, key, condition)?;
    if let Some(partition) = partitions.get_mut(&key.partition_key) {
        partition.remove(&key.sort_key);
        if partition.is_empty() {
            partitions.remove(&key.partition_key);
        }
    }
    Ok(())
}

pub(crate) fn check(
    partitions: &Partitions,
    key: &CompositeKey,
    expected: &ExpectedVersion,
) -> Result<()> {
    check_version(get(partitions, key), key, expected).map(|_| ())
}

/// A transaction may touch each row once, as a write or as a check.
pub(crate) fn ensure_distinct_keys<'a>(
    keys: impl IntoIterator<Item = &'a CompositeKey>,
) -> Result<()> {
    let mut seen = HashSet::new();
    match keys.into_iter().find(|key| !seen.insert(*key)) {
        Some(key) => Err(Error::Validation {
            key: Some(key.clone()),
            message: "transaction touches the same item more than once".to_string(),
        }),
        None => Ok(()),
    }
}

/// Apply one write entry with its optimistic-lock condition.
pub(crate) fn apply_entry(partitions: &mut Partitions, entry: &WriteEntry) -> Result<()> {
    match entry {
        WriteEntry::Insert { new } => put(partitions, new.clone(), &WriteCondition::NotExists),
        WriteEntry::Update { new, existing } => put(
            partitions,
            new.clone(),
            &WriteCondition::VersionMatches {
                expected: existing.expected_version(),
            },
        ),
        WriteEntry::DeleteAtKey { key } => delete(partitions, key, &WriteCondition::None),
        WriteEntry::DeleteItem { existing } => delete(
            partitions,
            &existing.key,
            &WriteCondition::VersionMatches {
                expected: existing.expected_version(),
            },
        ),
    }
}

pub(crate) fn apply_constraint(partitions: &Partitions, constraint: &ConstraintEntry) -> Result<()> {
    match constraint {
        ConstraintEntry::Required { key, expected } => check(partitions, key, expected),
    }
}

/// Execute one statement's operation.
pub(crate) fn apply_operation(partitions: &mut Partitions, operation: &Operation) -> Result<()> {
    match operation {
        Operation::Insert { item } => {
            if get(partitions, &item.key).is_some() {
                return Err(Error::DuplicateItem {
                    key: item.key.clone(),
                    message: "an item with this key already exists".to_string(),
                });
            }
            store(partitions, item.clone());
            Ok(())
        }
        Operation::Update {
            key,
            expected,
            change,
        } => {
            let stored = check_version(get(partitions, key), key, expected)?;
            let new = match change {
                UpdateChange::Patch { differences } => {
                    let mut row = stored.to_row();
                    apply_differences(&mut row, differences)?;
                    StoredItem::from_row(&row)?
                }
                UpdateChange::Replace { item } => item.clone(),
            };
            if &new.key != key {
                return Err(Error::Validation {
                    key: Some(key.clone()),
                    message: format!("update would move the row to {}", new.key),
                });
            }
            store(partitions, new);
            Ok(())
        }
        Operation::Delete { key, expected } => {
            let condition = match expected {
                Some(expected) => WriteCondition::VersionMatches {
                    expected: *expected,
                },
                None => WriteCondition::None,
            };
            delete(partitions, key, &condition)
        }
        Operation::Check { key, expected } => check(partitions, key, expected),
    }
}

/// Rows of one partition matching the request, ordered by sort key.
pub(crate) fn query(partitions: &Partitions, request: &QueryRequest) -> Result<QueryPage<StoredItem>> {
    let mut rows: Vec<StoredItem> = partitions
        .get(&request.partition_key)
        .map(|partition| {
            partition
                .iter()
                .filter(|(sort_key, _)| {
                    request
                        .condition
                        .as_ref()
                        .is_none_or(|condition| condition.matches(sort_key))
                })
                .map(|(_, item)| item.clone())
                .collect()
        })
        .unwrap_or_default();
    if !request.scan_forward {
        rows.reverse();
    }
    paginate(rows, request.limit, request.exclusive_start.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::VersionedItem;
    use crate::item::tests::Counter;
    use crate::write::StatementBuilder;

    fn item(sort_key: &str, n: i64) -> VersionedItem<Counter> {
        VersionedItem::new_item(CompositeKey::new("P1", sort_key), Counter { n })
    }

    #[test]
    fn test_put_conditions() {
        let mut partitions = Partitions::new();
        let a = item("a", 1);
        put(&mut partitions, a.encode().unwrap(), &WriteCondition::NotExists).unwrap();
        let err = put(&mut partitions, a.encode().unwrap(), &WriteCondition::NotExists).unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed { .. }));

        let stale = a.create_updated_item(Counter { n: 5 });
        let newer = stale.create_updated_item(Counter { n: 6 });
        let err = put(
            &mut partitions,
            newer.encode().unwrap(),
            &WriteCondition::VersionMatches {
                expected: stale.expected_version(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed { .. }));
        assert_eq!(get(&partitions, a.key()).unwrap().row_status.row_version, 0);
    }

    #[test]
    fn test_delete_removes_empty_partition() {
        let mut partitions = Partitions::new();
        let a = item("a", 1);
        put(&mut partitions, a.encode().unwrap(), &WriteCondition::None).unwrap();
        delete(&mut partitions, a.key(), &WriteCondition::None).unwrap();
        assert!(partitions.is_empty());
        delete(&mut partitions, a.key(), &WriteCondition::None).unwrap();
    }

    #[test]
    fn test_patch_operation_reproduces_new_row() {
        let mut partitions = Partitions::new();
        let a = item("a", 1);
        let b = a.create_updated_item(Counter { n: 2 });
        put(&mut partitions, a.encode().unwrap(), &WriteCondition::None).unwrap();

        let statement = StatementBuilder::new("t", true, 8192)
            .for_entry(&WriteEntry::update(&b, &a).unwrap())
            .unwrap();
        apply_operation(&mut partitions, &statement.operation).unwrap();
        assert_eq!(get(&partitions, a.key()).unwrap(), &b.encode().unwrap());

        // Same statement again is stale.
        let err = apply_operation(&mut partitions, &statement.operation).unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed { .. }));
    }

    #[test]
    fn test_repeated_key_is_rejected() {
        let a = CompositeKey::new("P1", "a");
        let b = CompositeKey::new("P1", "b");
        ensure_distinct_keys([&a, &b]).unwrap();
        let err = ensure_distinct_keys([&a, &b, &a]).unwrap_err();
        assert!(matches!(err, Error::Validation { key: Some(ref k), .. } if k == &a));
    }

    #[test]
    fn test_insert_operation_reports_duplicate() {
        let mut partitions = Partitions::new();
        let a = item("a", 1);
        let operation = Operation::Insert {
            item: a.encode().unwrap(),
        };
        apply_operation(&mut partitions, &operation).unwrap();
        let err = apply_operation(&mut partitions, &operation).unwrap_err();
        assert!(matches!(err, Error::DuplicateItem { .. }));
    }

    #[test]
    fn test_query_orders_and_filters() {
        let mut partitions = Partitions::new();
        for sort_key in ["S3", "S1", "T1", "S2"] {
            put(&mut partitions, item(sort_key, 0).encode().unwrap(), &WriteCondition::None).unwrap();
        }
        let page = query(&partitions, &QueryRequest::new("P1").sort_key_begins_with("S")).unwrap();
        let keys: Vec<&str> = page.items.iter().map(|i| i.key.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["S1", "S2", "S3"]);

        let page = query(&partitions, &QueryRequest::new("P1").scan_forward(false).limit(2)).unwrap();
        let keys: Vec<&str> = page.items.iter().map(|i| i.key.sort_key.as_str()).collect();
        assert_eq!(keys, vec!["T1", "S3"]);
        assert_eq!(page.last_evaluated_key.as_deref(), Some("2"));

        let page = query(&partitions, &QueryRequest::new("nope")).unwrap();
        assert!(page.items.is_empty());
    }
}
