//! Parsed representation of EU4 text.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

/// Key prefix marking an additive set operation.
pub const ADD_PREFIX: &str = "add_";
/// Key prefix marking a subtractive set operation.
pub const REMOVE_PREFIX: &str = "remove_";

/// Returns true if values under `key` always accumulate into a [`Value::List`].
pub fn is_accumulating_key(key: &str) -> bool {
    key.starts_with(ADD_PREFIX) || key.starts_with(REMOVE_PREFIX)
}

/// A parsed value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// A bare or quoted item, verbatim.
    Scalar(String),
    /// A brace block of `key = value` pairs.
    Block(Block),
    /// A brace block of unlabeled values, e.g. `{ 10 20 200 }` or `{ 5 }`.
    Tuple(Vec<Value>),
    /// Values coalesced under a repeated key or an `add_`/`remove_` key.
    List(Vec<Value>),
    /// An explicit `{ }`.
    Empty,
}

impl Value {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Value::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty_block(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Iterates a coalesced list element by element, or yields `self` once.
    pub fn items(&self) -> std::slice::Iter<'_, Value> {
        match self {
            Value::List(v) => v.iter(),
            other => std::slice::from_ref(other).iter(),
        }
    }

    /// Iterates the members of a tuple or list, or yields `self` once.
    pub fn members(&self) -> std::slice::Iter<'_, Value> {
        match self {
            Value::List(v) | Value::Tuple(v) => v.iter(),
            Value::Empty => Default::default(),
            other => std::slice::from_ref(other).iter(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_block().and_then(|b| b.get(key))
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Block(_) => "block",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Empty => "empty block",
        }
    }

    /// Short human readable description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Scalar(s) => format!("scalar '{}'", s),
            other => other.kind().to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<Block> for Value {
    fn from(b: Block) -> Self {
        Value::Block(b)
    }
}

/// An ordered mapping of keys to values.
///
/// Keys keep the order of their first occurrence. A key seen once maps to
/// its value directly; a key seen again, or any `add_`/`remove_` key, maps to
/// a [`Value::List`] of everything assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
    entries: Vec<(String, Value)>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a block from assignments in source order, coalescing repeats.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut entries: Vec<(String, Value)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (key, value) in pairs {
            match index.entry(key) {
                Entry::Occupied(slot) => {
                    let existing = &mut entries[*slot.get()].1;
                    match existing {
                        Value::List(items) => items.push(value),
                        single => {
                            let first = std::mem::replace(single, Value::Empty);
                            *single = Value::List(vec![first, value]);
                        }
                    }
                }
                Entry::Vacant(slot) => {
                    let value = if is_accumulating_key(slot.key()) {
                        Value::List(vec![value])
                    } else {
                        value
                    };
                    entries.push((slot.key().clone(), value));
                    slot.insert(entries.len() - 1);
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Convenience accessor for a scalar value under `key`.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_scalar)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Overlays `other` on top of this block.
    ///
    /// Ordinary keys are overwritten in place. `add_`/`remove_` lists are
    /// concatenated so that no set operation is lost.
    pub fn merge(&mut self, other: Block) {
        for (key, value) in other.entries {
            match self.entries.iter_mut().find(|(k, _)| *k == key) {
                Some((k, existing)) if is_accumulating_key(k) => {
                    let mut items = match std::mem::replace(existing, Value::Empty) {
                        Value::List(items) => items,
                        single => vec![single],
                    };
                    match value {
                        Value::List(more) => items.extend(more),
                        single => items.push(single),
                    }
                    *existing = Value::List(items);
                }
                Some((_, existing)) => *existing = value,
                None => self.entries.push((key, value)),
            }
        }
    }
}

impl IntoIterator for Block {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Block {
    type Item = &'a (String, Value);
    type IntoIter = std::slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, Value)> for Block {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Block::from_pairs(iter)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(s) => serializer.serialize_str(s),
            Value::Block(b) => b.serialize(serializer),
            Value::Tuple(items) | Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Empty => serializer.serialize_none(),
        }
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '=' | '#' | '"'))
}

fn write_scalar(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    if needs_quotes(s) {
        write!(f, "\"{}\"", s)
    } else {
        f.write_str(s)
    }
}

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize) -> fmt::Result {
    match value {
        Value::Scalar(s) => write_scalar(f, s),
        Value::Empty => f.write_str("{ }"),
        Value::Tuple(items) => {
            f.write_str("{")?;
            for item in items {
                f.write_str(" ")?;
                write_value(f, item, depth)?;
            }
            f.write_str(" }")
        }
        // Only reachable for nested lists built by hand; the parser never
        // produces one outside a block entry.
        Value::List(items) => {
            f.write_str("{")?;
            for item in items {
                f.write_str(" ")?;
                write_value(f, item, depth)?;
            }
            f.write_str(" }")
        }
        Value::Block(block) => {
            f.write_str("{\n")?;
            write_entries(f, block, depth + 1)?;
            write_indent(f, depth)?;
            f.write_str("}")
        }
    }
}

fn write_entries(f: &mut fmt::Formatter<'_>, block: &Block, depth: usize) -> fmt::Result {
    for (key, value) in block.iter() {
        for item in value.items() {
            write_indent(f, depth)?;
            write_scalar(f, key)?;
            f.write_str(" = ")?;
            write_value(f, item, depth)?;
            f.write_str("\n")?;
        }
    }
    Ok(())
}

/// Pretty prints a block in EU4 text syntax, one assignment per line.
impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_entries(f, self, 0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Scalar(v.to_string())
    }

    fn pairs(items: &[(&str, Value)]) -> Vec<(String, Value)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_single_key_not_wrapped() {
        let block = Block::from_pairs(pairs(&[("a", s("1"))]));
        assert_eq!(block.get("a"), Some(&s("1")));
    }

    #[test]
    fn test_repeated_key_coalesces_in_first_position() {
        let block = Block::from_pairs(pairs(&[("a", s("1")), ("b", s("x")), ("a", s("2")), ("a", s("3"))]));
        assert_eq!(block.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(block.get("a"), Some(&Value::List(vec![s("1"), s("2"), s("3")])));
    }

    #[test]
    fn test_add_and_remove_always_lists() {
        let block = Block::from_pairs(pairs(&[("add_core", s("SWE")), ("remove_claim", s("DAN"))]));
        assert_eq!(block.get("add_core"), Some(&Value::List(vec![s("SWE")])));
        assert_eq!(block.get("remove_claim"), Some(&Value::List(vec![s("DAN")])));
    }

    #[test]
    fn test_repeated_tuple_is_not_flattened() {
        let t = Value::Tuple(vec![s("1"), s("2")]);
        let block = Block::from_pairs(pairs(&[("c", t.clone()), ("c", t.clone())]));
        assert_eq!(block.get("c"), Some(&Value::List(vec![t.clone(), t])));
    }

    #[test]
    fn test_merge_overwrites_and_concatenates() {
        let mut base = Block::from_pairs(pairs(&[("owner", s("SWE")), ("add_core", s("SWE"))]));
        let other = Block::from_pairs(pairs(&[("owner", s("DAN")), ("add_core", s("DAN")), ("x", s("1"))]));
        base.merge(other);
        assert_eq!(base.scalar("owner"), Some("DAN"));
        assert_eq!(base.get("add_core"), Some(&Value::List(vec![s("SWE"), s("DAN")])));
        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["owner", "add_core", "x"]);
    }

    #[test]
    fn test_items_and_members() {
        assert_eq!(s("a").items().count(), 1);
        assert_eq!(Value::List(vec![s("a"), s("b")]).items().count(), 2);
        assert_eq!(Value::Tuple(vec![s("a"), s("b")]).items().count(), 1);
        assert_eq!(Value::Tuple(vec![s("a"), s("b")]).members().count(), 2);
        assert_eq!(Value::Empty.members().count(), 0);
    }

    #[test]
    fn test_serialize_json_keeps_order() {
        let inner = Block::from_pairs(pairs(&[("z", s("1")), ("a", Value::Empty)]));
        let block = Block::from_pairs(pairs(&[
            ("color", Value::Tuple(vec![s("10"), s("20")])),
            ("inner", Value::Block(inner)),
        ]));
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, r#"{"color":["10","20"],"inner":{"z":"1","a":null}}"#);
    }

    #[test]
    fn test_display_repeats_coalesced_keys() {
        let block = Block::from_pairs(pairs(&[
            ("a", s("1")),
            ("a", s("2")),
            ("name", s("Den Haag")),
            ("c", Value::Tuple(vec![s("1")])),
        ]));
        assert_eq!(
            block.to_string(),
            "a = 1\na = 2\nname = \"Den Haag\"\nc = { 1 }\n"
        );
    }
}
