use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Small tagged value stored in world state, scenario conditions and environment maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    /// Boolean fact.
    Bool(bool),
    /// Numeric fact.
    Number(f64),
    /// Free-form text fact.
    Text(String),
}

impl FactValue {
    /// Numeric view of the fact, if it is a number.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean view of the fact, if it is a bool.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FactValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for FactValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Insertion-ordered key/value facts (preconditions, effects, conditions).
pub type FactMap = IndexMap<String, FactValue>;

/// Mutable fact base read by preconditions and written by effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldState {
    facts: FactMap,
}

impl WorldState {
    /// Creates an empty world state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a fact.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FactValue> {
        self.facts.get(key)
    }

    /// Inserts or replaces a fact.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FactValue>) {
        self.facts.insert(key.into(), value.into());
    }

    /// Removes a fact, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<FactValue> {
        self.facts.shift_remove(key)
    }

    /// Whether the fact exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.facts.contains_key(key)
    }

    /// Number of stored facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether no facts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Iterates facts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> {
        self.facts.iter()
    }

    /// Borrowed view of the underlying map.
    #[must_use]
    pub const fn facts(&self) -> &FactMap {
        &self.facts
    }

    /// Merges effects into the fact base, overwriting existing keys.
    pub fn apply(&mut self, effects: &FactMap) {
        for (key, value) in effects {
            self.facts.insert(key.clone(), value.clone());
        }
    }

    /// True when every key is present and equal. A missing key never matches.
    #[must_use]
    pub fn satisfies(&self, preconditions: &FactMap) -> bool {
        preconditions
            .iter()
            .all(|(key, expected)| self.facts.get(key) == Some(expected))
    }
}

impl From<FactMap> for WorldState {
    fn from(facts: FactMap) -> Self {
        Self { facts }
    }
}

impl<K: Into<String>, V: Into<FactValue>> FromIterator<(K, V)> for WorldState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            facts: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    #[test]
    fn missing_key_never_matches() {
        let state = WorldState::new();
        let pre: FactMap = indexmap! { "armed".into() => FactValue::Bool(false) };
        assert!(!state.satisfies(&pre));
        assert!(state.satisfies(&FactMap::new()));
    }

    #[test]
    fn apply_overwrites_and_satisfies() {
        let mut state: WorldState = [("fuel", FactValue::Number(10.0))].into_iter().collect();
        state.apply(&indexmap! {
            "fuel".into() => FactValue::Number(4.0),
            "docked".into() => FactValue::Bool(true),
        });
        assert_eq!(state.get("fuel"), Some(&FactValue::Number(4.0)));
        assert!(state.satisfies(&indexmap! { "docked".into() => FactValue::Bool(true) }));
        assert!(!state.satisfies(&indexmap! { "docked".into() => FactValue::from("true") }));
    }

    #[test]
    fn untagged_serde_roundtrip_keeps_kinds() {
        let state: WorldState = serde_json::from_str(r#"{"a":true,"b":2.5,"c":"x"}"#).unwrap();
        assert_eq!(state.get("a").and_then(FactValue::as_bool), Some(true));
        assert_eq!(state.get("b").and_then(FactValue::as_number), Some(2.5));
        assert_eq!(state.get("c"), Some(&FactValue::from("x")));
    }
}
