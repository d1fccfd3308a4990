//! Persistent Data
//!
//! Key/value stores attached to quests and player profiles.

use std::collections::BTreeMap;
use std::fmt;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::error::QuestError;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A value held in a [`DataContainer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl DataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            DataValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int(i) => Some(*i),
            DataValue::Float(f) => Some(*f as i64),
            DataValue::Text(s) => s.trim().parse().ok(),
            DataValue::Bool(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Int(i) => Some(*i as f64),
            DataValue::Float(f) => Some(*f),
            DataValue::Text(s) => s.trim().parse().ok(),
            DataValue::Bool(_) => None,
        }
    }

    /// Numeric sum of two values, read through their text form.
    ///
    /// Integers stay integers unless either side is fractional or the sum
    /// overflows. A text value stays text, so `"5"` plus `3` is `"8"`.
    pub fn increased_by(&self, other: &DataValue) -> Option<DataValue> {
        let lhs = Number::parse(&self.to_string())?;
        let rhs = Number::parse(&other.to_string())?;

        let sum = match (lhs, rhs) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 + b as f64)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        };

        Some(match (self, sum) {
            (DataValue::Text(_), sum) => DataValue::Text(sum.to_string()),
            (_, Number::Int(i)) => DataValue::Int(i),
            (_, Number::Float(f)) => DataValue::Float(f),
        })
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Bool(b) => write!(f, "{}", b),
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(v) => write!(f, "{}", v),
            DataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Text(value)
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Some(Number::Int(i));
        }
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Number::Float)
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Concurrent string-keyed store of [`DataValue`]s
#[derive(Debug, Default)]
pub struct DataContainer {
    values: DashMap<String, DataValue>,
}

impl DataContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<DataValue> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Get a value, or `default` when the key is absent
    pub fn get_or(&self, key: &str, default: impl Into<DataValue>) -> DataValue {
        self.get(key).unwrap_or_else(|| default.into())
    }

    pub fn set(&self, key: &str, value: impl Into<DataValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<DataValue> {
        self.values.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn clear(&self) {
        self.values.clear();
    }

    /// All keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numerically add `amount` to the value under `key`, storing `amount`
    /// as-is when the key is absent. Returns the stored value.
    pub fn increase(&self, key: &str, amount: impl Into<DataValue>) -> Result<DataValue, QuestError> {
        let amount = amount.into();
        match self.values.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(amount.clone());
                Ok(amount)
            }
            Entry::Occupied(mut entry) => {
                let merged = entry.get().increased_by(&amount).ok_or_else(|| {
                    QuestError::NotNumeric {
                        key: key.to_string(),
                        value: entry.get().to_string(),
                    }
                })?;
                entry.insert(merged.clone());
                Ok(merged)
            }
        }
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, DataValue> {
        self.values
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Serialize to JSON for storage
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Deserialize from JSON, empty on malformed input
    pub fn from_json(json: &str) -> Self {
        let values: BTreeMap<String, DataValue> = serde_json::from_str(json).unwrap_or_default();
        Self {
            values: values.into_iter().collect(),
        }
    }
}
