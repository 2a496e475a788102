//! Source-side game records: a flat mapping of provider field names to JSON
//! values, with the coercions every provider needs.

use serde_json::{Map, Value};

use crate::error::SkipReason;

/// Strings providers use in place of a missing value.
const NULL_SENTINELS: &[&str] = &["NL", "-", ""];

/// One game as delivered by an upstream provider, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Raw value for `key`, with nulls and sentinel strings treated as absent.
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if is_sentinel(s) => None,
            Some(v) => Some(v),
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        match self.value(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Result<Option<i32>, SkipReason> {
        let Some(value) = self.value(key) else {
            return Ok(None);
        };
        coerce_int(value)
            .map(Some)
            .ok_or_else(|| SkipReason::malformed(key, format!("expected an integer, got {value}")))
    }

    pub fn float(&self, key: &str) -> Result<Option<f64>, SkipReason> {
        let Some(value) = self.value(key) else {
            return Ok(None);
        };
        coerce_float(value)
            .map(Some)
            .ok_or_else(|| SkipReason::malformed(key, format!("expected a number, got {value}")))
    }

    /// Truthiness the way the feeds encode flags: `1`/`0`, booleans, or
    /// `"true"`/`"yes"` strings.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.value(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "t"
            )),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for SourceRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for SourceRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn is_sentinel(s: &str) -> bool {
    NULL_SENTINELS.contains(&s.trim())
}

pub(crate) fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn coerce_int(value: &Value) -> Option<i32> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return i32::try_from(i).ok();
        }
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return i32::try_from(i).ok();
        }
    }
    // Whole-valued floats ("102.0") show up in a few feeds.
    let f = coerce_float(value)?;
    if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sentinels_read_as_absent() {
        let record = SourceRecord::new()
            .with("money line", "NL")
            .with("total", "-")
            .with("site", "")
            .with("line", Value::Null);

        assert_eq!(record.value("money line"), None);
        assert_eq!(record.float("total"), Ok(None));
        assert_eq!(record.text("site"), None);
        assert_eq!(record.float("line"), Ok(None));
        assert_eq!(record.int("not present"), Ok(None));
    }

    #[test]
    fn test_numeric_strings_coerce() {
        let record = SourceRecord::new()
            .with("points", "102")
            .with("line", "-3.5")
            .with("money line", "+150")
            .with("runs", 7.0);

        assert_eq!(record.int("points"), Ok(Some(102)));
        assert_eq!(record.float("line"), Ok(Some(-3.5)));
        assert_eq!(record.int("money line"), Ok(Some(150)));
        assert_eq!(record.int("runs"), Ok(Some(7)));
    }

    #[test]
    fn test_non_numeric_is_malformed() {
        let record = SourceRecord::new().with("points", "final").with("line", 2.5);
        assert!(matches!(
            record.int("points"),
            Err(SkipReason::Malformed { ref field, .. }) if field == "points"
        ));
        assert!(record.int("line").is_err());
    }

    #[test]
    fn test_flag_coercion() {
        let record: SourceRecord = json!({
            "a": 1, "b": 0, "c": "true", "d": "no", "e": true, "f": null
        })
        .as_object()
        .cloned()
        .unwrap()
        .into();

        assert_eq!(record.flag("a"), Some(true));
        assert_eq!(record.flag("b"), Some(false));
        assert_eq!(record.flag("c"), Some(true));
        assert_eq!(record.flag("d"), Some(false));
        assert_eq!(record.flag("e"), Some(true));
        assert_eq!(record.flag("f"), None);
    }
}
