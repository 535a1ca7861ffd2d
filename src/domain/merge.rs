// Recursive JSON merge used by widget patches
use serde_json::Value;

/// Merge `patch` into `target`.
///
/// Objects are merged key by key, recursively. Anything else (arrays,
/// strings, numbers, null) replaces the target value wholesale.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Owned variant of [`deep_merge`].
pub fn merged(mut target: Value, patch: &Value) -> Value {
    deep_merge(&mut target, patch);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_into_itself_is_unchanged() {
        let original = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        let result = merged(original.clone(), &original);
        assert_eq!(result, original);
    }

    #[test]
    fn test_nested_objects_are_unioned() {
        let result = merged(json!({"a": {"c": 2}}), &json!({"a": {"b": 1}}));
        assert_eq!(result, json!({"a": {"b": 1, "c": 2}}));
    }

    #[test]
    fn test_arrays_are_replaced() {
        let result = merged(json!({"a": [1, 2]}), &json!({"a": [3]}));
        assert_eq!(result, json!({"a": [3]}));
    }

    #[test]
    fn test_primitive_replaces_object() {
        let result = merged(json!({"a": {"b": 1}}), &json!({"a": null}));
        assert_eq!(result, json!({"a": null}));

        let result = merged(json!("old"), &json!({"fresh": true}));
        assert_eq!(result, json!({"fresh": true}));
    }
}
