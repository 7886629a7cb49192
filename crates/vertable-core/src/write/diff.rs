//! Structural diff between two attribute maps, and patch application.
//!
//! Update statements only need to carry what changed. `diff_attributes`
//! walks both maps recursively over scalar, list and map shapes and emits
//! the sparse set of `Update`/`Remove` actions that turns the first into the
//! second. Binary and set shapes are not diffable; hitting one returns
//! [`Error::UnableToUpdate`] and the caller falls back to a full replace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding::attribute::{AttributeValue, Attributes};
use crate::error::{Error, Result};

/// One step into a nested value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Attribute(String),
    Index(usize),
}

/// Location of a value inside a row, e.g. `"address"."lines"[1]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributePath(pub Vec<PathSegment>);

impl AttributePath {
    fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        AttributePath(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Attribute(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "\"{}\"", name.replace('"', "\"\""))?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A single change between two attribute maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AttributeDifference {
    /// Set the value at `path`, adding it if absent.
    Update {
        path: AttributePath,
        value: AttributeValue,
    },
    /// Remove the value at `path`.
    Remove { path: AttributePath },
}

impl AttributeDifference {
    pub fn path(&self) -> &AttributePath {
        match self {
            AttributeDifference::Update { path, .. } | AttributeDifference::Remove { path } => {
                path
            }
        }
    }
}

fn unsupported(path: &AttributePath, value: &AttributeValue) -> Error {
    Error::UnableToUpdate {
        reason: format!(
            "attribute {path} has type {} which cannot be diffed",
            value.type_name()
        ),
    }
}

/// Reject binary and set shapes anywhere inside `value`.
fn ensure_diffable(path: &AttributePath, value: &AttributeValue) -> Result<()> {
    if value.is_binary_or_set() {
        return Err(unsupported(path, value));
    }
    match value {
        AttributeValue::L(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| ensure_diffable(&path.child(PathSegment::Index(i)), item)),
        AttributeValue::M(map) => map.iter().try_for_each(|(name, item)| {
            ensure_diffable(&path.child(PathSegment::Attribute(name.clone())), item)
        }),
        _ => Ok(()),
    }
}

/// The ordered differences that turn `existing` into `new`.
///
/// Deterministic: map keys are visited in sorted order, updates before
/// removals; list removals run from the highest index down so earlier
/// indices stay valid, followed by appended elements in ascending order.
pub fn diff_attributes(existing: &Attributes, new: &Attributes) -> Result<Vec<AttributeDifference>> {
    let mut differences = Vec::new();
    diff_maps(&AttributePath::default(), existing, new, &mut differences)?;
    Ok(differences)
}

fn diff_maps(
    path: &AttributePath,
    existing: &Attributes,
    new: &Attributes,
    out: &mut Vec<AttributeDifference>,
) -> Result<()> {
    for (name, new_value) in new {
        let child = path.child(PathSegment::Attribute(name.clone()));
        match existing.get(name) {
            Some(old_value) => diff_values(&child, old_value, new_value, out)?,
            None => {
                ensure_diffable(&child, new_value)?;
                out.push(AttributeDifference::Update {
                    path: child,
                    value: new_value.clone(),
                });
            }
        }
    }
    for name in existing.keys().filter(|name| !new.contains_key(*name)) {
        out.push(AttributeDifference::Remove {
            path: path.child(PathSegment::Attribute(name.clone())),
        });
    }
    Ok(())
}

fn diff_lists(
    path: &AttributePath,
    existing: &[AttributeValue],
    new: &[AttributeValue],
    out: &mut Vec<AttributeDifference>,
) -> Result<()> {
    let common = existing.len().min(new.len());
    for i in 0..common {
        diff_values(&path.child(PathSegment::Index(i)), &existing[i], &new[i], out)?;
    }
    for i in (common..existing.len()).rev() {
        out.push(AttributeDifference::Remove {
            path: path.child(PathSegment::Index(i)),
        });
    }
    for (i, value) in new.iter().enumerate().skip(common) {
        let child = path.child(PathSegment::Index(i));
        ensure_diffable(&child, value)?;
        out.push(AttributeDifference::Update {
            path: child,
            value: value.clone(),
        });
    }
    Ok(())
}

fn diff_values(
    path: &AttributePath,
    existing: &AttributeValue,
    new: &AttributeValue,
    out: &mut Vec<AttributeDifference>,
) -> Result<()> {
    if existing.is_binary_or_set() {
        return Err(unsupported(path, existing));
    }
    if new.is_binary_or_set() {
        return Err(unsupported(path, new));
    }
    match (existing, new) {
        (AttributeValue::M(old), AttributeValue::M(new)) => diff_maps(path, old, new, out),
        (AttributeValue::L(old), AttributeValue::L(new)) => diff_lists(path, old, new, out),
        (old, new) if old == new => Ok(()),
        (_, new) => {
            ensure_diffable(path, new)?;
            out.push(AttributeDifference::Update {
                path: path.clone(),
                value: new.clone(),
            });
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Patch application
// ---------------------------------------------------------------------------

enum Change {
    Set(AttributeValue),
    Remove,
}

fn bad_path(path: &AttributePath, reason: &str) -> Error {
    Error::UnableToUpdate {
        reason: format!("cannot apply change at {path}: {reason}"),
    }
}

/// Apply differences in order to `target`.
///
/// An `Update` at a list index past the end appends.
pub fn apply_differences(target: &mut Attributes, differences: &[AttributeDifference]) -> Result<()> {
    for difference in differences {
        let (path, change) = match difference {
            AttributeDifference::Update { path, value } => (path, Change::Set(value.clone())),
            AttributeDifference::Remove { path } => (path, Change::Remove),
        };
        apply_to_map(target, path, path.segments(), change)?;
    }
    Ok(())
}

fn apply_to_map(
    map: &mut Attributes,
    full: &AttributePath,
    segments: &[PathSegment],
    change: Change,
) -> Result<()> {
    let Some((PathSegment::Attribute(name), rest)) = segments.split_first() else {
        return Err(bad_path(full, "expected an attribute name"));
    };
    if rest.is_empty() {
        match change {
            Change::Set(value) => {
                map.insert(name.clone(), value);
            }
            Change::Remove => {
                map.remove(name);
            }
        }
        return Ok(());
    }
    let child = map
        .get_mut(name)
        .ok_or_else(|| bad_path(full, "parent attribute is missing"))?;
    apply_to_value(child, full, rest, change)
}

fn apply_to_value(
    value: &mut AttributeValue,
    full: &AttributePath,
    segments: &[PathSegment],
    change: Change,
) -> Result<()> {
    match (value, segments.first()) {
        (AttributeValue::M(map), Some(PathSegment::Attribute(_))) => {
            apply_to_map(map, full, segments, change)
        }
        (AttributeValue::L(items), Some(PathSegment::Index(index))) => {
            let index = *index;
            let rest = &segments[1..];
            if rest.is_empty() {
                match change {
                    Change::Set(value) if index < items.len() => items[index] = value,
                    Change::Set(value) => items.push(value),
                    Change::Remove if index < items.len() => {
                        items.remove(index);
                    }
                    Change::Remove => return Err(bad_path(full, "list index out of range")),
                }
                return Ok(());
            }
            let child = items
                .get_mut(index)
                .ok_or_else(|| bad_path(full, "list index out of range"))?;
            apply_to_value(child, full, rest, change)
        }
        _ => Err(bad_path(full, "path does not match the value shape")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn n(value: i64) -> AttributeValue {
        AttributeValue::from(value)
    }

    fn s(value: &str) -> AttributeValue {
        AttributeValue::from(value)
    }

    #[test]
    fn test_scalar_change_add_and_remove() {
        let old = attrs(&[("a", n(1)), ("b", s("x")), ("c", AttributeValue::Bool(true))]);
        let new = attrs(&[("a", n(2)), ("b", s("x")), ("d", AttributeValue::Null)]);
        let diffs = diff_attributes(&old, &new).unwrap();

        let rendered: Vec<String> = diffs
            .iter()
            .map(|d| match d {
                AttributeDifference::Update { path, .. } => format!("set {path}"),
                AttributeDifference::Remove { path } => format!("remove {path}"),
            })
            .collect();
        assert_eq!(rendered, vec!["set \"a\"", "set \"d\"", "remove \"c\""]);
    }

    #[test]
    fn test_nested_map_and_list() {
        let old = attrs(&[(
            "profile",
            AttributeValue::M(attrs(&[
                ("tags", AttributeValue::L(vec![s("a"), s("b"), s("c")])),
                ("age", n(30)),
            ])),
        )]);
        let new = attrs(&[(
            "profile",
            AttributeValue::M(attrs(&[
                ("tags", AttributeValue::L(vec![s("a"), s("z")])),
                ("age", n(30)),
            ])),
        )]);
        let diffs = diff_attributes(&old, &new).unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].path().to_string(), "\"profile\".\"tags\"[1]");
        assert!(matches!(&diffs[1], AttributeDifference::Remove { path } if path.to_string() == "\"profile\".\"tags\"[2]"));

        let mut patched = old.clone();
        apply_differences(&mut patched, &diffs).unwrap();
        assert_eq!(patched, new);
    }

    #[test]
    fn test_list_growth_appends() {
        let old = attrs(&[("l", AttributeValue::L(vec![n(1)]))]);
        let new = attrs(&[("l", AttributeValue::L(vec![n(1), n(2), n(3)]))]);
        let diffs = diff_attributes(&old, &new).unwrap();
        assert_eq!(diffs.len(), 2);
        let mut patched = old.clone();
        apply_differences(&mut patched, &diffs).unwrap();
        assert_eq!(patched, new);
    }

    #[test]
    fn test_type_change_is_an_update() {
        let old = attrs(&[("a", AttributeValue::L(vec![n(1)]))]);
        let new = attrs(&[("a", s("flat"))]);
        let diffs = diff_attributes(&old, &new).unwrap();
        assert_eq!(
            diffs,
            vec![AttributeDifference::Update {
                path: AttributePath(vec![PathSegment::Attribute("a".to_string())]),
                value: s("flat"),
            }]
        );
    }

    #[test]
    fn test_identical_maps_have_no_differences() {
        let old = attrs(&[("a", n(1)), ("m", AttributeValue::M(attrs(&[("x", s("y"))])))]);
        assert!(diff_attributes(&old, &old.clone()).unwrap().is_empty());
    }

    #[test]
    fn test_binary_and_sets_are_unsupported() {
        let cases = vec![
            AttributeValue::B(vec![1, 2]),
            AttributeValue::Ss(vec!["a".to_string()]),
            AttributeValue::Ns(vec!["1".to_string()]),
            AttributeValue::Bs(vec![vec![0]]),
        ];
        for value in cases {
            let old = attrs(&[("a", value.clone())]);
            let new = attrs(&[("a", n(1))]);
            let err = diff_attributes(&old, &new).unwrap_err();
            assert!(matches!(err, Error::UnableToUpdate { .. }));

            let added = attrs(&[("m", AttributeValue::M(attrs(&[("deep", value)])))]);
            let err = diff_attributes(&Attributes::new(), &added).unwrap_err();
            assert!(matches!(err, Error::UnableToUpdate { .. }));
        }
    }

    #[test]
    fn test_apply_rejects_shape_mismatch() {
        let mut target = attrs(&[("a", n(1))]);
        let diffs = vec![AttributeDifference::Update {
            path: AttributePath(vec![
                PathSegment::Attribute("a".to_string()),
                PathSegment::Index(0),
            ]),
            value: n(2),
        }];
        let err = apply_differences(&mut target, &diffs).unwrap_err();
        assert!(matches!(err, Error::UnableToUpdate { .. }));
    }

    fn arb_value() -> impl Strategy<Value = AttributeValue> {
        let leaf = prop_oneof![
            "[a-z']{0,4}".prop_map(AttributeValue::S),
            any::<i32>().prop_map(|v| AttributeValue::from(v as i64)),
            any::<bool>().prop_map(AttributeValue::Bool),
            Just(AttributeValue::Null),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(AttributeValue::L),
                prop::collection::btree_map("[a-c]", inner, 0..4).prop_map(AttributeValue::M),
            ]
        })
    }

    fn arb_attributes() -> impl Strategy<Value = Attributes> {
        prop::collection::btree_map("[a-d]", arb_value(), 0..5)
    }

    proptest! {
        #[test]
        fn test_applying_diff_reproduces_target(old in arb_attributes(), new in arb_attributes()) {
            let diffs = diff_attributes(&old, &new).unwrap();
            let mut patched = old.clone();
            apply_differences(&mut patched, &diffs).unwrap();
            prop_assert_eq!(patched, new);
        }

        #[test]
        fn test_diff_is_deterministic(old in arb_attributes(), new in arb_attributes()) {
            prop_assert_eq!(diff_attributes(&old, &new).unwrap(), diff_attributes(&old, &new).unwrap());
        }
    }
}
