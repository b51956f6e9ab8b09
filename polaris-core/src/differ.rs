//! Differ - Compare desired state with current state
//!
//! Besides the resource level diff, this module holds the collection helpers
//! used to reconcile remote collections with local ones: order-insensitive
//! set comparison and order-preserving merges that keep the locally declared
//! ordering stable so that a permutation never shows up as a change.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state, sorted by name
///
/// Attributes only present in the current state are computed by the provider
/// and never count as a change.
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, desired_value)| match current.get(*key) {
            Some(current_value) => !values_equivalent(desired_value, current_value),
            None => true,
        })
        .map(|(key, _)| key.clone())
        .collect();
    changed.sort();
    changed
}

/// Structural equality where maps only compare keys the desired side declares
/// and computed keys on the current side are ignored
fn values_equivalent(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => d
            .iter()
            .all(|(k, dv)| c.get(k).is_some_and(|cv| values_equivalent(dv, cv))),
        (Value::List(d), Value::List(c)) => {
            d.len() == c.len() && d.iter().zip(c).all(|(dv, cv)| values_equivalent(dv, cv))
        }
        _ => desired == current,
    }
}

/// Report whether two unordered collections differ by value
///
/// Ordering and duplicates are ignored.
pub fn sets_differ<T, A, B>(old: A, new: B) -> bool
where
    T: Ord,
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
{
    let old: BTreeSet<T> = old.into_iter().collect();
    let new: BTreeSet<T> = new.into_iter().collect();
    old != new
}

/// Report whether two string maps (e.g. tags) differ by value
pub fn maps_differ(old: &HashMap<String, String>, new: &HashMap<String, String>) -> bool {
    old != new
}

/// Merge a new value set into an existing ordering
///
/// Values present in both keep their existing position, values no longer
/// present are dropped, and newly appearing values are appended in their
/// incoming order.
pub fn merge_ordered<T>(existing: &[T], new: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    merge_ordered_by_key(existing, new, |item| item.clone())
}

/// Merge keyed records into an existing ordering
///
/// Like [`merge_ordered`], but records are matched by `key`. Records present
/// in both take the new value at the existing position.
pub fn merge_ordered_by_key<T, K, F>(existing: &[T], new: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut incoming: HashMap<K, &T> = HashMap::with_capacity(new.len());
    for item in new {
        incoming.entry(key(item)).or_insert(item);
    }

    let mut seen: HashSet<K> = HashSet::with_capacity(new.len());
    let mut merged = Vec::with_capacity(new.len());

    for item in existing {
        let k = key(item);
        if let Some(replacement) = incoming.get(&k)
            && !seen.contains(&k)
        {
            merged.push((*replacement).clone());
            seen.insert(k);
        }
    }

    for item in new {
        let k = key(item);
        if !seen.contains(&k) {
            merged.push(item.clone());
            seen.insert(k);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("azure_subscription", "test");
        let current = State::not_found(ResourceId::new("azure_subscription", "test"));

        let result = diff(&desired, &current);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("azure_subscription", "test")
            .with_attribute("name", Value::String("prod".to_string()));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("prod".to_string()));
        attrs.insert("status".to_string(), Value::String("CONNECTED".to_string()));
        let current = State::existing(ResourceId::new("azure_subscription", "test"), attrs);

        let result = diff(&desired, &current);
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn diff_ignores_computed_keys_in_blocks() {
        let block = |status: Option<&str>| {
            let mut map = HashMap::from([(
                "regions".to_string(),
                Value::string_list(["eastus"]),
            )]);
            if let Some(status) = status {
                map.insert("status".to_string(), Value::from(status));
            }
            Value::Map(map)
        };
        let desired = Resource::new("azure_subscription", "test")
            .with_attribute("cloud_native_protection", block(None));
        let attrs = HashMap::from([(
            "cloud_native_protection".to_string(),
            block(Some("CONNECTED")),
        )]);
        let current = State::existing(ResourceId::new("azure_subscription", "test"), attrs);

        assert!(!diff(&desired, &current).is_change());
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("azure_subscription", "test")
            .with_attribute("name", Value::String("new".to_string()));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("old".to_string()));
        let current = State::existing(ResourceId::new("azure_subscription", "test"), attrs);

        match diff(&desired, &current) {
            Diff::Update {
                changed_attributes, ..
            } => {
                assert_eq!(changed_attributes, vec!["name".to_string()]);
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn sets_compare_by_value() {
        assert!(!sets_differ(["a", "b"], ["b", "a"]));
        assert!(sets_differ(["a", "b"], ["a"]));
        assert!(!sets_differ(["a", "a"], ["a"]));
        assert!(!sets_differ(Vec::<&str>::new(), Vec::<&str>::new()));
    }

    #[test]
    fn maps_compare_by_value() {
        let a = HashMap::from([("env".to_string(), "prod".to_string())]);
        let b = HashMap::from([("env".to_string(), "dev".to_string())]);
        assert!(!maps_differ(&a, &a.clone()));
        assert!(maps_differ(&a, &b));
    }

    #[test]
    fn merge_keeps_existing_positions() {
        let merged = merge_ordered(&["x", "y"], &["z", "y"]);
        assert_eq!(merged, vec!["y", "z"]);
    }

    #[test]
    fn merge_appends_in_incoming_order() {
        let merged = merge_ordered(&["b"], &["c", "a", "b"]);
        assert_eq!(merged, vec!["b", "c", "a"]);
    }

    #[test]
    fn merge_with_empty_existing_uses_incoming_order() {
        let merged = merge_ordered(&[], &["c", "a"]);
        assert_eq!(merged, vec!["c", "a"]);
    }

    #[test]
    fn merge_by_key_takes_new_values() {
        #[derive(Debug, Clone, PartialEq)]
        struct Spec {
            location: &'static str,
            threshold: u32,
        }

        let existing = vec![
            Spec {
                location: "loc-1",
                threshold: 30,
            },
            Spec {
                location: "loc-2",
                threshold: 30,
            },
        ];
        let new = vec![
            Spec {
                location: "loc-3",
                threshold: 7,
            },
            Spec {
                location: "loc-2",
                threshold: 60,
            },
        ];

        let merged = merge_ordered_by_key(&existing, &new, |s| s.location);
        assert_eq!(
            merged,
            vec![
                Spec {
                    location: "loc-2",
                    threshold: 60
                },
                Spec {
                    location: "loc-3",
                    threshold: 7
                },
            ]
        );
    }
}
