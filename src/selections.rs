use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::all_required_fields;

/// Value written into every still-missing field when the user hands the choices over.
pub const AUTO: &str = "Auto";

/// Accumulated production choices for one conversation.
///
/// Keys are field names. The set only grows: values are overwritten by later
/// turns but never removed, except by resetting the whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet(BTreeMap<String, String>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// A field counts as present only if it holds a non-blank value.
    pub fn is_present(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Last-write-wins merge: every key of `extracted` overwrites, everything else is kept.
    pub fn merge(&self, extracted: &SelectionSet) -> SelectionSet {
        let mut merged = self.clone();
        for (field, value) in &extracted.0 {
            merged.0.insert(field.clone(), value.clone());
        }
        merged
    }

    /// Sets every required field that is still absent to [`AUTO`] and returns
    /// the names it filled. Must run after the turn's ordinary merge.
    pub fn apply_auto_fill(&mut self) -> Vec<&'static str> {
        let mut filled = Vec::new();
        for field in all_required_fields() {
            if !self.is_present(field) {
                self.0.insert(field.to_string(), AUTO.to_string());
                filled.push(field);
            }
        }
        filled
    }

    /// Builds a set from the loosely typed JSON object an extractor returns.
    ///
    /// Scalars are stringified; nulls, blanks and nested values are dropped so
    /// an extraction can never clear a field.
    pub fn from_json_object(value: &serde_json::Value) -> SelectionSet {
        let mut set = SelectionSet::new();
        let Some(object) = value.as_object() else {
            return set;
        };
        for (field, raw) in object {
            let text = match raw {
                serde_json::Value::String(s) => s.trim().to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            if text.is_empty() {
                continue;
            }
            set.0.insert(field.trim().to_string(), text);
        }
        set
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SelectionSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Free-function form of [`SelectionSet::merge`].
pub fn merge(current: &SelectionSet, extracted: &SelectionSet) -> SelectionSet {
    current.merge(extracted)
}
