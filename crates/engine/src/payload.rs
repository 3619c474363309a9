//! Helpers over the opaque JSON payload carried by every entity.

use serde_json::{Map, Value};

/// Entity payload: a flat JSON object keyed by field name.
pub type Payload = Map<String, Value>;

/// Shallow merge of `patch` into `base`. A `null` in the patch removes the key.
pub fn merge_patch(base: &mut Payload, patch: &Payload) {
    for (k, v) in patch {
        if v.is_null() {
            base.remove(k);
        } else {
            base.insert(k.clone(), v.clone());
        }
    }
}

/// A field counts as present when it exists and is not null, `""`, `[]` or `{}`.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// Names from `fields` that are not present in `payload`, in declaration order.
pub fn missing_fields(payload: &Payload, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| !is_present(payload.get(f.as_str())))
        .cloned()
        .collect()
}

/// Add one to an integer counter field. A missing or null field counts as zero.
pub fn increment_counter(payload: &mut Payload, field: &str) -> Result<(), String> {
    let not_integer = || format!("counter '{}' is not an integer", field);
    let current = match payload.get(field) {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n.as_i64().ok_or_else(not_integer)?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| not_integer())?,
        Some(_) => return Err(not_integer()),
    };
    let next = current
        .checked_add(1)
        .ok_or_else(|| format!("counter '{}' overflowed", field))?;
    payload.insert(field.to_string(), Value::from(next));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_overwrites_adds_and_removes() {
        let mut base = obj(json!({"a": 1, "b": 2, "c": 3}));
        merge_patch(&mut base, &obj(json!({"a": 10, "c": null, "d": "x"})));
        assert_eq!(Value::Object(base), json!({"a": 10, "b": 2, "d": "x"}));
    }

    #[test]
    fn empty_values_are_not_present() {
        assert!(!is_present(None));
        assert!(!is_present(Some(&json!(null))));
        assert!(!is_present(Some(&json!("   "))));
        assert!(!is_present(Some(&json!([]))));
        assert!(!is_present(Some(&json!({}))));
        assert!(is_present(Some(&json!(0))));
        assert!(is_present(Some(&json!(false))));
        assert!(is_present(Some(&json!("duplicate charge"))));
    }

    #[test]
    fn missing_fields_keeps_declaration_order() {
        let payload = obj(json!({"b": "ok"}));
        let fields = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(missing_fields(&payload, &fields), vec!["c", "a"]);
    }

    #[test]
    fn counters_start_at_zero_and_reject_text() {
        let mut payload = obj(json!({"seen": "4", "note": "n/a"}));
        increment_counter(&mut payload, "retryCount").unwrap();
        increment_counter(&mut payload, "retryCount").unwrap();
        increment_counter(&mut payload, "seen").unwrap();
        assert_eq!(payload.get("retryCount"), Some(&json!(2)));
        assert_eq!(payload.get("seen"), Some(&json!(5)));
        let err = increment_counter(&mut payload, "note").unwrap_err();
        assert_eq!(err, "counter 'note' is not an integer");
    }
}
