//! Codec for Firestore's typed document values.
//!
//! Firestore's REST API wraps every field in a type tag
//! (`stringValue`, `integerValue`, `timestampValue`, ...). Integers travel
//! as decimal strings. These helpers build and read that shape so the rest
//! of the crate works with plain domain types.
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub fn string(s: &str) -> Value {
    json!({ "stringValue": s })
}

pub fn integer(i: i64) -> Value {
    json!({ "integerValue": i.to_string() })
}

pub fn double(f: f64) -> Value {
    json!({ "doubleValue": f })
}

pub fn boolean(b: bool) -> Value {
    json!({ "booleanValue": b })
}

pub fn timestamp(t: DateTime<Utc>) -> Value {
    json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

pub fn array(values: Vec<Value>) -> Value {
    json!({ "arrayValue": { "values": values } })
}

pub fn map(fields: Map<String, Value>) -> Value {
    json!({ "mapValue": { "fields": fields } })
}

/// Convert arbitrary JSON (e.g. an LLM-produced summary) into a Firestore
/// value tree.
pub fn from_json(v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                integer(i)
            } else {
                double(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => string(s),
        Value::Array(items) => array(items.iter().map(from_json).collect()),
        Value::Object(obj) => {
            let mut fields = Map::new();
            for (k, v) in obj {
                fields.insert(k.clone(), from_json(v));
            }
            map(fields)
        }
    }
}

/// Read a string field out of a document's `fields` map.
pub fn get_string(fields: &Value, key: &str) -> Option<String> {
    fields[key]["stringValue"].as_str().map(str::to_string)
}

/// Read an integer field; Firestore serializes these as strings.
pub fn get_integer(fields: &Value, key: &str) -> Option<i64> {
    let v = &fields[key]["integerValue"];
    v.as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| v.as_i64())
}

pub fn get_timestamp(fields: &Value, key: &str) -> Option<DateTime<Utc>> {
    fields[key]["timestampValue"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Items of an array field; empty when the field is absent or not an array.
pub fn get_array(fields: &Value, key: &str) -> Vec<Value> {
    fields[key]["arrayValue"]["values"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

/// The `fields` map of a `mapValue`, for nested decoding.
pub fn map_fields(value: &Value) -> &Value {
    &value["mapValue"]["fields"]
}

/// Collect the string items of an array value, skipping anything else.
pub fn string_items(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v["stringValue"].as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip_as_strings() {
        let v = integer(42);
        assert_eq!(v["integerValue"], "42");
        let fields = json!({ "limit": v });
        assert_eq!(get_integer(&fields, "limit"), Some(42));
    }

    #[test]
    fn integer_accepts_numeric_form() {
        let fields = json!({ "count": { "integerValue": 7 } });
        assert_eq!(get_integer(&fields, "count"), Some(7));
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let fields = json!({ "at": timestamp(now) });
        let back = get_timestamp(&fields, "at").unwrap();
        assert_eq!(back.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn missing_fields_decode_to_none() {
        let fields = json!({});
        assert_eq!(get_string(&fields, "name"), None);
        assert_eq!(get_integer(&fields, "limit"), None);
        assert!(get_array(&fields, "entries").is_empty());
    }

    #[test]
    fn from_json_handles_nested_objects() {
        let summary = json!({
            "niche": "bakery",
            "seo_keywords": ["bread", "cake"],
            "pricing": { "basic": "$5", "premium": "$20" },
            "rating": 4.5,
            "reviews": 120,
            "verified": true,
            "notes": null
        });
        let encoded = from_json(&summary);
        let fields = map_fields(&encoded);
        assert_eq!(fields["niche"]["stringValue"], "bakery");
        assert_eq!(
            fields["seo_keywords"]["arrayValue"]["values"][1]["stringValue"],
            "cake"
        );
        assert_eq!(
            map_fields(&fields["pricing"])["premium"]["stringValue"],
            "$20"
        );
        assert_eq!(fields["rating"]["doubleValue"], 4.5);
        assert_eq!(fields["reviews"]["integerValue"], "120");
        assert_eq!(fields["verified"]["booleanValue"], true);
        assert!(fields["notes"]["nullValue"].is_null());
    }
}
