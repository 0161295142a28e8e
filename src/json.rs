//! JSON value helpers.
//!
//! `serde_json` compares numbers by their literal text when built with
//! `arbitrary_precision`, so `1` and `1.0` would be different values. JSON
//! Schema wants them to be equal. The functions here compare values the way
//! the keywords need.

use crate::decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// The type of a JSON value, telling integer and real numbers apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Real,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Real => "real",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(JsonType::Null),
            "boolean" => Some(JsonType::Boolean),
            "integer" => Some(JsonType::Integer),
            "real" => Some(JsonType::Real),
            "string" => Some(JsonType::String),
            "array" => Some(JsonType::Array),
            "object" => Some(JsonType::Object),
            _ => None,
        }
    }

    /// Whether a value is of this type, where integral reals such as `1.0`
    /// count as integers.
    pub fn matches(self, value: &Value) -> bool {
        match (self, type_of(value)) {
            (JsonType::Integer, JsonType::Real) => {
                Decimal::from_value(value).map_or(false, |number| number.is_integer())
            }
            (expected, actual) => expected == actual,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The type of a value, going by its literal.
///
/// A number is an integer when its literal has no fraction and no exponent.
pub fn type_of(value: &Value) -> JsonType {
    match value {
        Value::Null => JsonType::Null,
        Value::Bool(_) => JsonType::Boolean,
        Value::Number(number) => {
            if number.is_i64() || number.is_u64() {
                return JsonType::Integer;
            }

            let literal = number.to_string();
            if literal.contains(|c| c == '.' || c == 'e' || c == 'E') {
                JsonType::Real
            } else {
                JsonType::Integer
            }
        }
        Value::String(_) => JsonType::String,
        Value::Array(_) => JsonType::Array,
        Value::Object(_) => JsonType::Object,
    }
}

/// Deep equality, comparing numbers by value.
pub fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            Decimal::from_value(left) == Decimal::from_value(right)
        }
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| equals(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).map_or(false, |other| equals(value, other)))
        }
        _ => left == right,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// A total order over JSON values, consistent with [`equals`](fn.equals.html).
///
/// Values of different types order by type. Objects compare as their sorted
/// members.
pub fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Number(_), Value::Number(_)) => {
            Decimal::from_value(left).cmp(&Decimal::from_value(right))
        }
        (Value::String(left), Value::String(right)) => left.cmp(right),
        (Value::Array(left), Value::Array(right)) => {
            for (l, r) in left.iter().zip(right) {
                match compare(l, r) {
                    Ordering::Equal => {}
                    ordering => return ordering,
                }
            }

            left.len().cmp(&right.len())
        }
        (Value::Object(left), Value::Object(right)) => {
            let mut left: Vec<_> = left.iter().collect();
            let mut right: Vec<_> = right.iter().collect();
            left.sort_by(|a, b| a.0.cmp(b.0));
            right.sort_by(|a, b| a.0.cmp(b.0));

            for ((lk, lv), (rk, rv)) in left.iter().zip(&right) {
                match lk.cmp(rk).then_with(|| compare(lv, rv)) {
                    Ordering::Equal => {}
                    ordering => return ordering,
                }
            }

            left.len().cmp(&right.len())
        }
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Whether every item of an array is distinct from every other.
pub fn is_unique(items: &[Value]) -> bool {
    let mut sorted: Vec<&Value> = items.iter().collect();
    sorted.sort_by(|a, b| compare(a, b));
    sorted.windows(2).all(|pair| !equals(pair[0], pair[1]))
}

/// The length of a string in Unicode code points.
pub fn string_length(value: &str) -> usize {
    value.chars().count()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn types() {
        assert_eq!(JsonType::Integer, type_of(&json!(5)));
        assert_eq!(JsonType::Real, type_of(&json!(5.5)));
        assert_eq!(JsonType::Object, type_of(&json!({})));

        let big: Value = serde_json::from_str("100000000000000000000000000").unwrap();
        assert_eq!(JsonType::Integer, type_of(&big));

        let real: Value = serde_json::from_str("1.0").unwrap();
        assert_eq!(JsonType::Real, type_of(&real));
        assert!(JsonType::Integer.matches(&real));
        assert!(!JsonType::Integer.matches(&json!(1.5)));
    }

    #[test]
    fn numbers_compare_by_value() {
        let one: Value = serde_json::from_str("1.0").unwrap();
        assert!(equals(&json!(1), &one));
        assert!(equals(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!equals(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert_eq!(Ordering::Less, compare(&json!(1), &json!(1.5)));
        assert_eq!(Ordering::Less, compare(&json!(null), &json!(false)));
        assert_eq!(Ordering::Equal, compare(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
    }

    #[test]
    fn uniqueness() {
        assert!(is_unique(&[json!(1), json!("1"), json!([1])]));
        assert!(!is_unique(&[json!(1), json!(true), json!(1.0)]));
        assert!(!is_unique(&[json!({"a": 1, "b": 2}), json!({"b": 2, "a": 1})]));
    }

    #[test]
    fn code_points() {
        assert_eq!(2, string_length("\u{1f4a9}\u{1f4a9}"));
        assert_eq!(3, string_length("foo"));
    }
}
