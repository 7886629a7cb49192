//! Translate write entries and constraints into store operations.
//!
//! Each [`Statement`] carries both a structured [`Operation`] (what a store
//! executes) and its rendered PartiQL-style text (what is measured against
//! the backend's statement length limit and shown in diagnostics).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TableConfig;
use crate::encoding::attribute::{AttributeValue, Attributes};
use crate::encoding::row::format_timestamp;
use crate::error::{Error, Result};
use crate::item::StoredItem;
use crate::types::{
    CREATE_DATE_ATTRIBUTE, CompositeKey, ExpectedVersion, PARTITION_KEY_ATTRIBUTE,
    ROW_VERSION_ATTRIBUTE, SORT_KEY_ATTRIBUTE,
};

use super::diff::{AttributeDifference, AttributePath, PathSegment, diff_attributes};
use super::entry::{ConstraintEntry, WriteEntry};

/// How an update changes the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UpdateChange {
    /// Apply only these differences to the stored row.
    Patch { differences: Vec<AttributeDifference> },
    /// Replace the stored row entirely.
    Replace { item: StoredItem },
}

/// A single conditional store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a row; fails with a duplicate-item error if one exists.
    Insert { item: StoredItem },
    /// Change a row that must still hold `expected`.
    Update {
        key: CompositeKey,
        expected: ExpectedVersion,
        change: UpdateChange,
    },
    /// Remove a row, guarded by `expected` when present.
    Delete {
        key: CompositeKey,
        expected: Option<ExpectedVersion>,
    },
    /// Assert a row holds `expected` without writing it.
    Check {
        key: CompositeKey,
        expected: ExpectedVersion,
    },
}

impl Operation {
    pub fn key(&self) -> &CompositeKey {
        match self {
            Operation::Insert { item } => &item.key,
            Operation::Update { key, .. }
            | Operation::Delete { key, .. }
            | Operation::Check { key, .. } => key,
        }
    }
}

/// A rendered operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub operation: Operation,
    pub text: String,
}

impl Statement {
    pub fn key(&self) -> &CompositeKey {
        self.operation.key()
    }
}

/// Builds statements for one table.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    table_name: String,
    escape_single_quotes: bool,
    max_statement_length: usize,
}

impl StatementBuilder {
    pub fn new(
        table_name: impl Into<String>,
        escape_single_quotes: bool,
        max_statement_length: usize,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            escape_single_quotes,
            max_statement_length,
        }
    }

    pub fn from_config(config: &TableConfig) -> Self {
        Self::new(
            config.table_name.clone(),
            config.escape_single_quotes,
            config.limits.max_statement_length,
        )
    }

    pub fn max_statement_length(&self) -> usize {
        self.max_statement_length
    }

    /// The statement for one write entry.
    ///
    /// Fails with [`Error::StatementLengthExceeded`] when the rendered text is
    /// longer than the configured limit.
    pub fn for_entry(&self, entry: &WriteEntry) -> Result<Statement> {
        let operation = match entry {
            WriteEntry::Insert { new } => Operation::Insert { item: new.clone() },
            WriteEntry::Update { new, existing } => Operation::Update {
                key: new.key.clone(),
                expected: existing.expected_version(),
                change: self.update_change(new, existing)?,
            },
            WriteEntry::DeleteAtKey { key } => Operation::Delete {
                key: key.clone(),
                expected: None,
            },
            WriteEntry::DeleteItem { existing } => Operation::Delete {
                key: existing.key.clone(),
                expected: Some(existing.expected_version()),
            },
        };
        self.finish(operation, Some(entry))
    }

    /// The statement for one read-only constraint.
    pub fn for_constraint(&self, constraint: &ConstraintEntry) -> Result<Statement> {
        let operation = match constraint {
            ConstraintEntry::Required { key, expected } => Operation::Check {
                key: key.clone(),
                expected: *expected,
            },
        };
        self.finish(operation, None)
    }

    fn update_change(&self, new: &StoredItem, existing: &StoredItem) -> Result<UpdateChange> {
        match diff_attributes(&existing.to_row(), &new.to_row()) {
            Ok(differences) => Ok(UpdateChange::Patch { differences }),
            Err(Error::UnableToUpdate { reason }) => {
                debug!(
                    partition_key = %new.key.partition_key,
                    sort_key = %new.key.sort_key,
                    %reason,
                    "falling back to full-row update"
                );
                Ok(UpdateChange::Replace { item: new.clone() })
            }
            Err(e) => Err(e),
        }
    }

    fn finish(&self, operation: Operation, entry: Option<&WriteEntry>) -> Result<Statement> {
        let text = self.render(&operation, entry);
        let length = text.chars().count();
        if length > self.max_statement_length {
            return Err(Error::StatementLengthExceeded {
                key: operation.key().clone(),
                length,
                max: self.max_statement_length,
            });
        }
        Ok(Statement { operation, text })
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn render(&self, operation: &Operation, entry: Option<&WriteEntry>) -> String {
        let table = quote_identifier(&self.table_name);
        match operation {
            Operation::Insert { item } => {
                format!(
                    "INSERT INTO {table} VALUE {}",
                    self.render_map(&item.to_row())
                )
            }
            Operation::Update {
                key,
                expected,
                change,
            } => {
                let mut clauses = Vec::new();
                match change {
                    UpdateChange::Patch { differences } => {
                        for difference in differences {
                            clauses.push(self.render_difference(difference));
                        }
                    }
                    UpdateChange::Replace { item } => {
                        let row = item.to_row();
                        for (name, value) in row.iter().filter(|(name, _)| !is_key_attribute(name)) {
                            clauses.push(format!(
                                "SET {}={}",
                                quote_identifier(name),
                                self.render_value(value)
                            ));
                        }
                        if let Some(WriteEntry::Update { existing, .. }) = entry {
                            for name in existing
                                .to_row()
                                .keys()
                                .filter(|name| !row.contains_key(*name))
                            {
                                clauses.push(format!("REMOVE {}", quote_identifier(name)));
                            }
                        }
                    }
                }
                format!(
                    "UPDATE {table} {} WHERE {}",
                    clauses.join(" "),
                    self.render_condition(key, Some(expected))
                )
            }
            Operation::Delete { key, expected } => format!(
                "DELETE FROM {table} WHERE {}",
                self.render_condition(key, expected.as_ref())
            ),
            Operation::Check { key, expected } => format!(
                "EXISTS(SELECT * FROM {table} WHERE {})",
                self.render_condition(key, Some(expected))
            ),
        }
    }

    fn render_condition(&self, key: &CompositeKey, expected: Option<&ExpectedVersion>) -> String {
        let mut condition = format!(
            "{}={} AND {}={}",
            quote_identifier(PARTITION_KEY_ATTRIBUTE),
            self.quote_string(&key.partition_key),
            quote_identifier(SORT_KEY_ATTRIBUTE),
            self.quote_string(&key.sort_key),
        );
        if let Some(expected) = expected {
            condition.push_str(&format!(
                " AND {}={} AND {}={}",
                quote_identifier(ROW_VERSION_ATTRIBUTE),
                expected.row_version,
                quote_identifier(CREATE_DATE_ATTRIBUTE),
                self.quote_string(&format_timestamp(&expected.create_date)),
            ));
        }
        condition
    }

    fn render_difference(&self, difference: &AttributeDifference) -> String {
        match difference {
            AttributeDifference::Update { path, value } => {
                format!("SET {path}={}", self.render_value(value))
            }
            AttributeDifference::Remove { path } => format!("REMOVE {path}"),
        }
    }

    fn render_map(&self, map: &Attributes) -> String {
        let fields: Vec<String> = map
            .iter()
            .map(|(name, value)| format!("{}: {}", self.quote_string(name), self.render_value(value)))
            .collect();
        format!("{{{}}}", fields.join(", "))
    }

    fn render_value(&self, value: &AttributeValue) -> String {
        match value {
            AttributeValue::S(s) => self.quote_string(s),
            AttributeValue::N(n) => n.clone(),
            AttributeValue::B(bytes) => self.quote_string(&hex(bytes)),
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Null => "NULL".to_string(),
            AttributeValue::L(items) => {
                let items: Vec<String> = items.iter().map(|v| self.render_value(v)).collect();
                format!("[{}]", items.join(", "))
            }
            AttributeValue::M(map) => self.render_map(map),
            AttributeValue::Ss(strings) => {
                let items: Vec<String> = strings.iter().map(|s| self.quote_string(s)).collect();
                format!("<<{}>>", items.join(", "))
            }
            AttributeValue::Ns(numbers) => format!("<<{}>>", numbers.join(", ")),
            AttributeValue::Bs(values) => {
                let items: Vec<String> = values.iter().map(|b| self.quote_string(&hex(b))).collect();
                format!("<<{}>>", items.join(", "))
            }
        }
    }

    fn quote_string(&self, s: &str) -> String {
        if self.escape_single_quotes {
            format!("'{}'", s.replace('\'', "''"))
        } else {
            format!("'{s}'")
        }
    }
}

fn is_key_attribute(name: &str) -> bool {
    name == PARTITION_KEY_ATTRIBUTE || name == SORT_KEY_ATTRIBUTE
}

fn quote_identifier(name: &str) -> String {
    AttributePath(vec![PathSegment::Attribute(name.to_string())]).to_string()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
