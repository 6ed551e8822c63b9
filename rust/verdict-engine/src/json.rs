//! JSON is strictly the external codec: values cross the boundary here and
//! nowhere else.
//!
//! Numbers travel through their decimal string form rather than f64 to keep
//! `1.1` exact. On the way out, whole numbers serialize as JSON integers.

use indexmap::IndexMap;
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use verdict_feel::value::parse_decimal;
use verdict_feel::Value;

/// Build a FEEL value from external JSON.
pub fn value_from_json(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => parse_decimal(&n.to_string())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::list(items.iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(entries) => {
            let mut out = IndexMap::new();
            for (k, v) in entries {
                out.insert(k.clone(), value_from_json(v));
            }
            Value::context(out)
        }
    }
}

/// Serialize a FEEL value for the result object.
pub fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Context(entries) => {
            let mut out = serde_json::Map::new();
            for (k, v) in entries.iter() {
                out.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(out)
        }
        Value::Range(r) => json!({
            "start": r.lo.as_ref().map(value_to_json).unwrap_or(serde_json::Value::Null),
            "end": r.hi.as_ref().map(value_to_json).unwrap_or(serde_json::Value::Null),
            "start included": r.lo_inclusive,
            "end included": r.hi_inclusive,
        }),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => serde_json::Value::String(t.format("%H:%M:%S").to_string()),
        Value::DateTime(dt) => {
            serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        Value::Duration(d) => serde_json::Value::String(d.to_string()),
        Value::Function(_) => serde_json::Value::Null,
    }
}

fn number_to_json(n: rust_decimal::Decimal) -> serde_json::Value {
    let n = n.normalize();
    if n.fract().is_zero() {
        if let Some(i) = n.to_i64() {
            return serde_json::Value::Number(i.into());
        }
    }
    n.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn scalars_round_trip() {
        for v in [json!(null), json!(true), json!(42), json!("hi"), json!(2.5)] {
            assert_eq!(value_to_json(&value_from_json(&v)), v);
        }
    }

    #[test]
    fn lists_round_trip() {
        let v = json!([1, "a", null, [2, 3]]);
        assert_eq!(value_to_json(&value_from_json(&v)), v);
    }

    #[test]
    fn objects_preserve_insertion_order() {
        let v: serde_json::Value =
            serde_json::from_str(r#"{"zeta": 1, "alpha": 2}"#).unwrap();
        let value = value_from_json(&v);
        match &value {
            Value::Context(entries) => {
                let keys: Vec<_> = entries.keys().cloned().collect();
                assert_eq!(keys, vec!["zeta".to_string(), "alpha".to_string()]);
            }
            other => panic!("expected context, got {:?}", other),
        }
    }

    #[test]
    fn whole_decimals_serialize_as_integers() {
        assert_eq!(
            value_to_json(&Value::Number(parse_decimal("60.0").unwrap())),
            json!(60)
        );
        assert_eq!(
            value_to_json(&Value::Number(parse_decimal("0.5").unwrap())),
            json!(0.5)
        );
    }

    #[test]
    fn range_serializes_with_inclusivity() {
        let r = Value::range(
            Some(Value::Number(Decimal::from(18))),
            Some(Value::Number(Decimal::from(65))),
            true,
            false,
        );
        assert_eq!(
            value_to_json(&r),
            json!({"start": 18, "end": 65, "start included": true, "end included": false})
        );
    }

    #[test]
    fn temporal_values_serialize_iso() {
        let d = verdict_feel::value::parse_date("2024-03-01").unwrap();
        assert_eq!(value_to_json(&Value::Date(d)), json!("2024-03-01"));
    }
}
