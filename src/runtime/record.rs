//! Record reflection: turning host input objects into field values.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::runtime::value::Value;

/// A host input record the engine can evaluate a script against.
///
/// The VM asks for the key set once per run (on the first name lookup)
/// and materialises every field into its cache, so `get` is only called
/// during that walk.
pub trait Record {
    /// Names of the record's top-level fields.
    fn keys(&self) -> Vec<String>;

    /// The value of one field, converted to the engine's value model.
    /// Unknown names convert to `Null`.
    fn get(&self, name: &str) -> Value;
}

/// Convert a JSON value to a runtime value.
///
/// Numbers become integers when they fit, floats otherwise; arrays
/// convert element-wise with the same rules; nested objects have no
/// counterpart in the value model and become `Null`.
fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(from_json).collect()),
        Json::Object(_) => Value::Null,
    }
}

impl Record for Json {
    fn keys(&self) -> Vec<String> {
        match self {
            Json::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn get(&self, name: &str) -> Value {
        match self {
            Json::Object(map) => map.get(name).map(from_json).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

impl Record for HashMap<String, Value> {
    fn keys(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Value {
        HashMap::get(self, name).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // serde_json::Value has an inherent `get`, so the trait methods are
    // called through `Record::` here.
    #[test]
    fn test_json_scalar_conversions() {
        let record = json!({
            "Author": "Steve",
            "Count": 3,
            "Score": 2.5,
            "Valid": true,
            "Missing": null,
        });

        assert_eq!(Record::get(&record, "Author"), Value::String("Steve".to_string()));
        assert_eq!(Record::get(&record, "Count"), Value::Integer(3));
        assert_eq!(Record::get(&record, "Score"), Value::Float(2.5));
        assert_eq!(Record::get(&record, "Valid"), Value::Boolean(true));
        assert_eq!(Record::get(&record, "Missing"), Value::Null);
        assert_eq!(Record::get(&record, "Absent"), Value::Null);
    }

    #[test]
    fn test_json_array_converts_element_wise() {
        let record = json!({ "Tags": ["a", 2, true] });
        assert_eq!(
            Record::get(&record, "Tags"),
            Value::Array(vec![
                Value::String("a".to_string()),
                Value::Integer(2),
                Value::Boolean(true),
            ])
        );
    }

    #[test]
    fn test_json_nested_object_is_null() {
        let record = json!({ "Inner": { "x": 1 } });
        assert_eq!(Record::get(&record, "Inner"), Value::Null);
    }

    #[test]
    fn test_json_non_object_has_no_fields() {
        let record = json!([1, 2, 3]);
        assert!(Record::keys(&record).is_empty());
    }

    #[test]
    fn test_map_record() {
        let mut map = HashMap::new();
        map.insert("x".to_string(), Value::Integer(1));

        assert_eq!(Record::keys(&map), vec!["x".to_string()]);
        assert_eq!(Record::get(&map, "x"), Value::Integer(1));
        assert_eq!(Record::get(&map, "y"), Value::Null);
    }
}
