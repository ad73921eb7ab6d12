//! Ordered multi-map of environment variable histories.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Everything observed for one variable name, in observation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarRecord {
    name: String,
    values: Vec<String>,
    array: bool,
}

impl EnvVarRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: Vec::new(),
            array: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Most recently observed value; this is what a debug script exports.
    pub fn last_value(&self) -> Option<&str> {
        self.values.last().map(String::as_str)
    }

    /// Bash array literal, which can be assigned but not exported.
    pub fn is_array(&self) -> bool {
        self.array
    }

    /// True once every observation agrees (or there is only one).
    pub fn is_uniform(&self) -> bool {
        self.values.windows(2).all(|pair| pair[0] == pair[1])
    }

    fn push(&mut self, value: String) {
        self.array = value.starts_with('(');
        self.values.push(value);
    }

    fn collapse(&mut self) {
        if self.values.len() > 1 && self.is_uniform() {
            self.values.truncate(1);
        }
    }
}

/// Variable histories keyed by name, iterated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarHistory {
    order: Vec<String>,
    records: HashMap<String, EnvVarRecord>,
}

impl VarHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation of `name`.
    pub fn record(&mut self, name: &str, value: impl Into<String>) {
        if !self.records.contains_key(name) {
            self.order.push(name.to_string());
            self.records.insert(name.to_string(), EnvVarRecord::new(name));
        }
        if let Some(record) = self.records.get_mut(name) {
            record.push(value.into());
        }
    }

    /// Reduce each history whose observations are all identical to a single
    /// value. Histories with any disagreement keep every observation.
    pub fn collapse_uniform(&mut self) {
        for record in self.records.values_mut() {
            record.collapse();
        }
    }

    /// Concatenate `other` after `self`.
    ///
    /// Names new to `self` are appended in `other`'s order; known names get
    /// `other`'s values appended. No collapsing happens here.
    pub fn merge(&mut self, other: VarHistory) {
        let VarHistory { order, mut records } = other;
        for name in order {
            let Some(incoming) = records.remove(&name) else {
                continue;
            };
            for value in incoming.values {
                self.record(&name, value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&EnvVarRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Names in first-seen order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &EnvVarRecord> {
        self.order.iter().filter_map(|name| self.records.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Serializes as an ordered map: a single observation as a plain string,
/// several as a list.
impl Serialize for VarHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for record in self.iter() {
            match record.values() {
                [single] => map.serialize_entry(record.name(), single)?,
                values => map.serialize_entry(record.name(), values)?,
            }
        }
        map.end()
    }
}
