//! Structural diff and patch over JSON value trees.
//!
//! Objects are compared key by key and only changed leaves are emitted.
//! Everything else, arrays and byte payloads included, is replaced wholesale
//! when it differs. A removed key is an explicit [`PatchNode::Delete`],
//! distinct from a key that is simply absent from a [`PatchNode::Merge`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of a patch tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum PatchNode {
    /// Replace the value at this position.
    Set(Value),
    /// Remove the key holding this node.
    Delete,
    /// Recurse into an object; keys not listed are unchanged.
    Merge(BTreeMap<String, PatchNode>),
}

/// Compute the patch turning `old` into `new`, or `None` if they are equal.
pub fn diff(old: &Value, new: &Value) -> Option<PatchNode> {
    match (old, new) {
        (Value::Object(before), Value::Object(after)) => {
            let mut changes = BTreeMap::new();
            for (key, value) in after {
                match before.get(key) {
                    Some(previous) => {
                        if let Some(node) = diff(previous, value) {
                            changes.insert(key.clone(), node);
                        }
                    }
                    None => {
                        changes.insert(key.clone(), PatchNode::Set(value.clone()));
                    }
                }
            }
            for key in before.keys() {
                if !after.contains_key(key) {
                    changes.insert(key.clone(), PatchNode::Delete);
                }
            }
            (!changes.is_empty()).then_some(PatchNode::Merge(changes))
        }
        _ if old == new => None,
        _ => Some(PatchNode::Set(new.clone())),
    }
}

/// Apply `patch` to `base`, returning the patched value.
///
/// A merge onto something that is not an object starts from an empty
/// object. A top-level delete yields `null`.
pub fn apply_patch(base: Value, patch: &PatchNode) -> Value {
    match patch {
        PatchNode::Set(value) => value.clone(),
        PatchNode::Delete => Value::Null,
        PatchNode::Merge(changes) => {
            let mut object = match base {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            for (key, node) in changes {
                match node {
                    PatchNode::Delete => {
                        object.remove(key);
                    }
                    _ => {
                        let current = object.remove(key).unwrap_or(Value::Null);
                        object.insert(key.clone(), apply_patch(current, node));
                    }
                }
            }
            Value::Object(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_equal_values_produce_no_patch() {
        let state = json!({"stage": "LOBBY", "players": {"a": {"points": 0}}});
        assert_eq!(diff(&state, &state.clone()), None);
    }

    #[test]
    fn test_only_changed_leaves_are_emitted() {
        let old = json!({"stage": "LOBBY", "players": {"a": {"points": 0, "name": "Ann"}}});
        let new = json!({"stage": "LOBBY", "players": {"a": {"points": 5, "name": "Ann"}}});

        let patch = diff(&old, &new).unwrap();
        let expected: PatchNode = serde_json::from_value(json!({
            "op": "merge",
            "value": {"players": {"op": "merge", "value": {
                "a": {"op": "merge", "value": {"points": {"op": "set", "value": 5}}}
            }}}
        }))
        .unwrap();
        assert_eq!(patch, expected);
    }

    #[test]
    fn test_removed_key_is_explicit_delete() {
        let old = json!({"activeRound": {"artifactId": "x"}, "stage": "SCORING"});
        let new = json!({"stage": "FOOLING"});

        let Some(PatchNode::Merge(changes)) = diff(&old, &new) else {
            panic!("expected merge");
        };
        assert_eq!(changes["activeRound"], PatchNode::Delete);
        assert_eq!(apply_patch(old, &PatchNode::Merge(changes)), new);
    }

    #[test]
    fn test_arrays_replaced_wholesale() {
        let old = json!({"content": [1, 2, 3, 4]});
        let new = json!({"content": [1, 2, 3, 5]});

        let Some(PatchNode::Merge(changes)) = diff(&old, &new) else {
            panic!("expected merge");
        };
        assert_eq!(changes["content"], PatchNode::Set(json!([1, 2, 3, 5])));
    }

    #[test]
    fn test_merge_onto_non_object_starts_empty() {
        let patch = diff(&json!({}), &json!({"a": {"b": 1}})).unwrap();
        assert_eq!(apply_patch(Value::Null, &patch), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_object_replaced_by_scalar() {
        let old = json!({"activeRound": {"artifactId": "x"}});
        let new = json!({"activeRound": null});
        let patch = diff(&old, &new).unwrap();
        assert_eq!(apply_patch(old, &patch), new);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 5, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-e]", inner, 0..5)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-e]", arb_json(), 0..6)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        /// Applying the diff of two states to the first yields the second.
        #[test]
        fn prop_diff_then_apply_reproduces_target(a in arb_object(), b in arb_object()) {
            let patched = match diff(&a, &b) {
                Some(patch) => apply_patch(a.clone(), &patch),
                None => a.clone(),
            };
            prop_assert_eq!(patched, b);
        }

        /// The patch survives a trip through its JSON encoding.
        #[test]
        fn prop_patch_json_is_lossless(a in arb_object(), b in arb_object()) {
            if let Some(patch) = diff(&a, &b) {
                let text = serde_json::to_string(&patch).unwrap();
                let back: PatchNode = serde_json::from_str(&text).unwrap();
                prop_assert_eq!(back, patch);
            }
        }
    }
}
