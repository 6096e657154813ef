//! Time-versioned history entities (`history/provinces`, `history/countries`).
//!
//! A history file is a base state followed by dated blocks:
//!
//! ```text
//! owner = SWE
//! add_core = SWE
//! 1521.1.1 = { owner = DAN }
//! 1523.6.6 = { owner = SWE remove_core = DAN }
//! ```
//!
//! [`TimedEntity`] splits the dated blocks out once at construction and folds
//! them over a copy of the base state whenever a snapshot is requested.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use eu4txt::{ADD_PREFIX, Block, REMOVE_PREFIX, Value};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::date::{Date, SnapshotDate};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("invalid date '{input}', expected YYYY.M.D")]
    DateFormat { input: String },
    #[error("cannot apply '{key}' on {date}: target is {found}, not a set")]
    SetOperation {
        key: String,
        date: Date,
        found: &'static str,
    },
    #[error("no {kind} with code or name '{query}'")]
    UnknownCodeOrName { kind: &'static str, query: String },
    #[error("{kind} '{code}' is defined more than once")]
    DuplicateCode { kind: &'static str, code: String },
    #[error("invalid {kind} code '{code}'")]
    InvalidCode { kind: &'static str, code: String },
    #[error("dated entry {date} holds {found} instead of a block")]
    InvalidDelta { date: Date, found: String },
}

/// One field of a reconstructed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Value(Value),
    /// Accumulated by `add_`/`remove_` operations.
    Set(BTreeSet<Value>),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            Field::Set(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_scalar)
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Field::Set(s) => Some(s),
            Field::Value(_) => None,
        }
    }

    /// Parses a scalar field as a number. Fractions are accepted.
    pub fn as_number(&self) -> Option<f64> {
        self.as_scalar().and_then(|s| s.trim().parse().ok())
    }

    fn kind(&self) -> &'static str {
        match self {
            Field::Value(_) => "a non-set value",
            Field::Set(_) => "a set",
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        match item {
            Value::Scalar(s) => f.write_str(s)?,
            other => write!(f, "{}", other)?,
        }
    }
    Ok(())
}

/// Scalars print verbatim, collections comma separated.
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(Value::Scalar(s)) => f.write_str(s),
            Field::Value(Value::List(items)) => write_joined(f, items.iter()),
            Field::Value(other) => write!(f, "{}", other),
            Field::Set(items) => write_joined(f, items.iter()),
        }
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => v.serialize(serializer),
            Field::Set(s) => serializer.collect_seq(s),
        }
    }
}

/// Flat point-in-time state of an entity. Owned by the caller.
pub type Snapshot = BTreeMap<String, Field>;

/// An immutable historical record that can be reconstructed at any date.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEntity {
    name: String,
    code: String,
    default_date: Date,
    base: Snapshot,
    deltas: BTreeMap<Date, Block>,
}

impl TimedEntity {
    /// Splits a parsed history file into its base state and dated deltas.
    ///
    /// `name` and `code` are recorded verbatim and also written into the base
    /// state under `name` and `code`.
    pub fn build(
        raw: Block,
        name: impl Into<String>,
        code: impl Into<String>,
        default_date: Date,
    ) -> Result<Self, HistoryError> {
        let name = name.into();
        let code = code.into();
        let mut base = Snapshot::new();
        let mut additions = Vec::new();
        let mut deltas: BTreeMap<Date, Block> = BTreeMap::new();

        for (key, value) in raw {
            if let Some(date) = Date::from_key(&key)? {
                let delta = delta_block(date, value)?;
                match deltas.entry(date) {
                    Entry::Occupied(mut slot) => slot.get_mut().merge(delta),
                    Entry::Vacant(slot) => {
                        slot.insert(delta);
                    }
                }
            } else if let Some(target) = key.strip_prefix(ADD_PREFIX) {
                additions.push((target.to_string(), value));
            } else {
                base.insert(key, Field::Value(value));
            }
        }

        // Starting sets replace any plain value under the same key.
        for (target, value) in additions {
            base.insert(target, Field::Set(value.items().cloned().collect()));
        }

        base.insert("name".to_string(), Field::Value(Value::Scalar(name.clone())));
        base.insert("code".to_string(), Field::Value(Value::Scalar(code.clone())));

        Ok(Self {
            name,
            code,
            default_date,
            base,
            deltas,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn default_date(&self) -> Date {
        self.default_date
    }

    /// The state before any dated delta applies.
    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    /// Dates carrying a delta, ascending.
    pub fn dates(&self) -> impl Iterator<Item = Date> + '_ {
        self.deltas.keys().copied()
    }

    pub fn delta(&self, date: Date) -> Option<&Block> {
        self.deltas.get(&date)
    }

    /// Reconstructs the state as of `when`, inclusive of deltas on that date.
    pub fn at(&self, when: SnapshotDate) -> Result<Snapshot, HistoryError> {
        let target = when.resolve(self.default_date);
        let mut state = self.base.clone();
        for (&date, delta) in &self.deltas {
            if date > target {
                break;
            }
            apply_delta(&mut state, date, delta)?;
        }
        Ok(state)
    }

    /// Like [`TimedEntity::at`], parsing the date first. `""` means the default date.
    pub fn at_str(&self, when: &str) -> Result<Snapshot, HistoryError> {
        self.at(SnapshotDate::parse(when)?)
    }

    /// The snapshot at the default observation date.
    pub fn start(&self) -> Result<Snapshot, HistoryError> {
        self.at(SnapshotDate::Start)
    }
}

/// Normalizes the value of a dated key into one flat block.
fn delta_block(date: Date, value: Value) -> Result<Block, HistoryError> {
    match value {
        Value::Block(block) => Ok(block),
        Value::Empty => Ok(Block::new()),
        Value::Tuple(items) | Value::List(items) => {
            let mut merged = Block::new();
            for item in items {
                merged.merge(delta_block(date, item)?);
            }
            Ok(merged)
        }
        Value::Scalar(s) => Err(HistoryError::InvalidDelta {
            date,
            found: format!("'{}'", s),
        }),
    }
}

fn apply_delta(state: &mut Snapshot, date: Date, delta: &Block) -> Result<(), HistoryError> {
    for (key, value) in delta.iter() {
        if let Some(target) = key.strip_prefix(ADD_PREFIX) {
            match state.entry(target.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(Field::Set(value.items().cloned().collect()));
                }
                Entry::Occupied(mut slot) => match slot.get_mut() {
                    Field::Set(set) => set.extend(value.items().cloned()),
                    other => {
                        return Err(HistoryError::SetOperation {
                            key: key.to_string(),
                            date,
                            found: other.kind(),
                        });
                    }
                },
            }
        } else if let Some(target) = key.strip_prefix(REMOVE_PREFIX) {
            match state.get_mut(target) {
                Some(Field::Set(set)) => {
                    for item in value.items() {
                        set.remove(item);
                    }
                }
                other => {
                    return Err(HistoryError::SetOperation {
                        key: key.to_string(),
                        date,
                        found: other.map_or("absent", |f| f.kind()),
                    });
                }
            }
        } else {
            state.insert(key.to_string(), Field::Value(value.clone()));
        }
    }
    Ok(())
}

/// Splits `"<code> - <display name>.txt"` into its code and name parts.
///
/// The code is everything before the first `-`; the name is the rest with
/// the extension removed. Both are trimmed.
pub fn split_file_name(file_name: &str) -> (String, String) {
    let (code, rest) = file_name.split_once('-').unwrap_or((file_name, ""));
    let rest = rest.trim();
    let name = match rest.rfind('.') {
        Some(dot) if dot > 0 => &rest[..dot],
        _ => rest,
    };
    let code = if rest.is_empty() {
        code.rsplit_once('.').map_or(code, |(stem, _)| stem)
    } else {
        code
    };
    (code.trim().to_string(), name.trim().to_string())
}

/// Upper-cases the first letter of every word and lower-cases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start_of_word = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

/// The primary key of a history collection.
pub trait EntityCode: Clone + Ord + Hash + fmt::Display + Send + Sync + Sized {
    /// Human readable kind, used in errors and logs.
    const KIND: &'static str;
    /// Directory holding the history files, relative to the game root.
    const DIRECTORY: &'static str;

    /// Normalizes the code part of a file name or a lookup query.
    fn parse_code(raw: &str) -> Result<Self, HistoryError>;
}

/// A country tag such as `SWE`, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Tag(String);

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl EntityCode for Tag {
    const KIND: &'static str = "country";
    const DIRECTORY: &'static str = "history/countries";

    fn parse_code(raw: &str) -> Result<Self, HistoryError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(HistoryError::InvalidCode {
                kind: Self::KIND,
                code: raw.to_string(),
            });
        }
        Ok(Tag(raw.to_uppercase()))
    }
}

/// A numeric province identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProvinceId(pub u32);

impl fmt::Display for ProvinceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl EntityCode for ProvinceId {
    const KIND: &'static str = "province";
    const DIRECTORY: &'static str = "history/provinces";

    /// Takes the first word, so `"123 Name"` yields 123.
    fn parse_code(raw: &str) -> Result<Self, HistoryError> {
        let word = raw.split_whitespace().next().unwrap_or_default();
        word.parse().map(ProvinceId).map_err(|_| HistoryError::InvalidCode {
            kind: Self::KIND,
            code: raw.trim().to_string(),
        })
    }
}

/// Entities keyed by code, with a secondary index by display name.
#[derive(Debug, Clone)]
pub struct Registry<K: EntityCode> {
    entities: BTreeMap<K, TimedEntity>,
    names: HashMap<String, K>,
}

pub type Countries = Registry<Tag>;
pub type Provinces = Registry<ProvinceId>;

impl<K: EntityCode> Default for Registry<K> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
            names: HashMap::new(),
        }
    }
}

impl<K: EntityCode> Registry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity. A code may only be inserted once.
    pub fn insert(&mut self, code: K, entity: TimedEntity) -> Result<(), HistoryError> {
        if self.entities.contains_key(&code) {
            return Err(HistoryError::DuplicateCode {
                kind: K::KIND,
                code: code.to_string(),
            });
        }
        match self.names.get(entity.name()) {
            _ if entity.name().is_empty() => {}
            Some(existing) => log::warn!(
                "{} name '{}' already used by {}, {} only reachable by code",
                K::KIND,
                entity.name(),
                existing,
                code
            ),
            None => {
                self.names.insert(entity.name().to_string(), code.clone());
            }
        }
        self.entities.insert(code, entity);
        Ok(())
    }

    pub fn get(&self, code: &K) -> Option<&TimedEntity> {
        self.entities.get(code)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&TimedEntity> {
        self.names.get(name).and_then(|code| self.entities.get(code))
    }

    /// Resolves a code first, then an exact or title-cased display name.
    pub fn resolve(&self, query: &str) -> Result<(&K, &TimedEntity), HistoryError> {
        let by_code = K::parse_code(query)
            .ok()
            .and_then(|code| self.entities.get_key_value(&code));
        by_code
            .or_else(|| {
                self.names
                    .get(query.trim())
                    .or_else(|| self.names.get(&title_case(query.trim())))
                    .and_then(|code| self.entities.get_key_value(code))
            })
            .ok_or_else(|| HistoryError::UnknownCodeOrName {
                kind: K::KIND,
                query: query.to_string(),
            })
    }

    pub fn lookup(&self, query: &str) -> Result<&TimedEntity, HistoryError> {
        self.resolve(query).map(|(_, entity)| entity)
    }

    pub fn contains(&self, code: &K) -> bool {
        self.entities.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &TimedEntity)> {
        self.entities.iter()
    }
}
