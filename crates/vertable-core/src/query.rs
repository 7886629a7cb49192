//! Partition queries: sort key conditions, request builder and pagination.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sort key condition for queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKeyCondition {
    Eq(String),
    Lt(String),
    Le(String),
    Gt(String),
    Ge(String),
    /// Inclusive on both ends.
    Between(String, String),
    BeginsWith(String),
}

impl SortKeyCondition {
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::Eq(v) => sort_key == v,
            SortKeyCondition::Lt(v) => sort_key < v.as_str(),
            SortKeyCondition::Le(v) => sort_key <= v.as_str(),
            SortKeyCondition::Gt(v) => sort_key > v.as_str(),
            SortKeyCondition::Ge(v) => sort_key >= v.as_str(),
            SortKeyCondition::Between(low, high) => {
                sort_key >= low.as_str() && sort_key <= high.as_str()
            }
            SortKeyCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
        }
    }
}

/// A query over one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<SortKeyCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Continuation token from a previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_start: Option<String>,
    #[serde(default = "default_scan_forward")]
    pub scan_forward: bool,
}

fn default_scan_forward() -> bool {
    true
}

impl QueryRequest {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            condition: None,
            limit: None,
            exclusive_start: None,
            scan_forward: true,
        }
    }

    pub fn sort_key_eq(mut self, value: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::Eq(value.into()));
        self
    }

    pub fn sort_key_lt(mut self, value: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::Lt(value.into()));
        self
    }

    pub fn sort_key_le(mut self, value: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::Le(value.into()));
        self
    }

    pub fn sort_key_gt(mut self, value: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::Gt(value.into()));
        self
    }

    pub fn sort_key_ge(mut self, value: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::Ge(value.into()));
        self
    }

    pub fn sort_key_between(mut self, low: impl Into<String>, high: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::Between(low.into(), high.into()));
        self
    }

    pub fn sort_key_begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.condition = Some(SortKeyCondition::BeginsWith(prefix.into()));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn scan_forward(mut self, forward: bool) -> Self {
        self.scan_forward = forward;
        self
    }

    pub fn exclusive_start(mut self, token: impl Into<String>) -> Self {
        self.exclusive_start = Some(token.into());
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage<I> {
    pub items: Vec<I>,
    /// Pass back as `exclusive_start` to get the next page. `None` on the
    /// last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<String>,
}

impl<I> QueryPage<I> {
    pub fn map<J>(self, f: impl FnMut(I) -> J) -> QueryPage<J> {
        QueryPage {
            items: self.items.into_iter().map(f).collect(),
            last_evaluated_key: self.last_evaluated_key,
        }
    }

    pub fn try_map<J>(self, f: impl FnMut(I) -> Result<J>) -> Result<QueryPage<J>> {
        Ok(QueryPage {
            items: self.items.into_iter().map(f).collect::<Result<_>>()?,
            last_evaluated_key: self.last_evaluated_key,
        })
    }
}

/// Cut one page out of a fully evaluated, ordered result.
///
/// The continuation token is the decimal offset of the next row. A token that
/// does not parse, or points past the end of the result, is rejected with
/// [`Error::InvalidPaginationToken`].
pub fn paginate<I>(
    rows: Vec<I>,
    limit: Option<usize>,
    exclusive_start: Option<&str>,
) -> Result<QueryPage<I>> {
    if limit == Some(0) {
        return Err(Error::Validation {
            key: None,
            message: "query limit must be at least 1".to_string(),
        });
    }
    let start = match exclusive_start {
        None => 0,
        Some(token) => match token.parse::<usize>() {
            Ok(start) if start <= rows.len() => start,
            _ => return Err(Error::InvalidPaginationToken(token.to_string())),
        },
    };
    let end = match limit {
        Some(limit) => start.saturating_add(limit).min(rows.len()),
        None => rows.len(),
    };
    let last_evaluated_key = (end < rows.len()).then(|| end.to_string());
    let items = rows.into_iter().skip(start).take(end - start).collect();
    Ok(QueryPage {
        items,
        last_evaluated_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions() {
        assert!(SortKeyCondition::Eq("b".into()).matches("b"));
        assert!(SortKeyCondition::Lt("b".into()).matches("a"));
        assert!(!SortKeyCondition::Lt("b".into()).matches("b"));
        assert!(SortKeyCondition::Le("b".into()).matches("b"));
        assert!(SortKeyCondition::Gt("b".into()).matches("c"));
        assert!(SortKeyCondition::Ge("b".into()).matches("b"));
        assert!(SortKeyCondition::Between("b".into(), "d".into()).matches("d"));
        assert!(!SortKeyCondition::Between("b".into(), "d".into()).matches("e"));
        assert!(SortKeyCondition::BeginsWith("ord#".into()).matches("ord#2"));
        assert!(!SortKeyCondition::BeginsWith("ord#".into()).matches("cust#1"));
    }

    #[test]
    fn test_pages_concatenate_to_full_result() {
        let rows: Vec<u32> = (0..5).collect();

        let first = paginate(rows.clone(), Some(2), None).unwrap();
        assert_eq!(first.items, vec![0, 1]);
        assert_eq!(first.last_evaluated_key.as_deref(), Some("2"));

        let second = paginate(rows.clone(), Some(2), Some("2")).unwrap();
        assert_eq!(second.items, vec![2, 3]);
        assert_eq!(second.last_evaluated_key.as_deref(), Some("4"));

        let third = paginate(rows.clone(), Some(2), Some("4")).unwrap();
        assert_eq!(third.items, vec![4]);
        assert_eq!(third.last_evaluated_key, None);
    }

    #[test]
    fn test_unlimited_returns_everything() {
        let page = paginate(vec!["a", "b"], None, None).unwrap();
        assert_eq!(page.items, vec!["a", "b"]);
        assert!(page.last_evaluated_key.is_none());
    }

    #[test]
    fn test_invalid_pagination_token_is_a_typed_error() {
        let err = paginate(vec![1, 2, 3], Some(1), Some("not-a-number")).unwrap_err();
        assert!(matches!(err, Error::InvalidPaginationToken(ref t) if t == "not-a-number"));

        let err = paginate(vec![1, 2, 3], Some(1), Some("17")).unwrap_err();
        assert!(matches!(err, Error::InvalidPaginationToken(_)));

        let err = paginate(vec![1, 2, 3], Some(1), Some("-1")).unwrap_err();
        assert!(matches!(err, Error::InvalidPaginationToken(_)));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = paginate(vec![1], Some(0), None).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_request_builder() {
        let request = QueryRequest::new("P1")
            .sort_key_begins_with("S")
            .limit(2)
            .scan_forward(false);
        assert_eq!(request.partition_key, "P1");
        assert_eq!(request.condition, Some(SortKeyCondition::BeginsWith("S".into())));
        assert_eq!(request.limit, Some(2));
        assert!(!request.scan_forward);
    }
}
