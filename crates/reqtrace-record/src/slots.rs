//! Insertion-ordered keyed storage
//!
//! Collectors store log entries and user panels either positionally or under
//! an explicit key. `Slots` keeps both kinds in one ordered list following
//! associative-array rules:
//! - `push` assigns the next free positional index
//! - `insert` overwrites an existing key in place, otherwise appends
//! - string keys that are canonical integers in `0..=i64::MAX` become indices

use std::fmt;

/// Largest string key that still normalizes to a positional index
pub const MAX_STRING_INDEX: u64 = i64::MAX as u64;

/// Key of a single slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Index(u64),
    Name(String),
}

impl SlotKey {
    pub fn is_index(&self) -> bool {
        matches!(self, SlotKey::Index(_))
    }
}

impl From<u64> for SlotKey {
    fn from(index: u64) -> Self {
        SlotKey::Index(index)
    }
}

impl From<&str> for SlotKey {
    fn from(key: &str) -> Self {
        let canonical = key == "0" || (!key.starts_with('0') && !key.starts_with('+'));
        match key.parse::<u64>() {
            Ok(index) if canonical && index <= MAX_STRING_INDEX => SlotKey::Index(index),
            _ => SlotKey::Name(key.to_string()),
        }
    }
}

impl From<String> for SlotKey {
    fn from(key: String) -> Self {
        SlotKey::from(key.as_str())
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Index(index) => write!(f, "{}", index),
            SlotKey::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Ordered list of keyed values
#[derive(Debug, Clone, PartialEq)]
pub struct Slots<T> {
    entries: Vec<(SlotKey, T)>,
    next_index: u64,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_index: 0,
        }
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under the next free positional index
    ///
    /// Once the index space is exhausted the value replaces the one stored
    /// under `u64::MAX`.
    pub fn push(&mut self, value: T) -> &mut T {
        let index = self.next_index;
        match index.checked_add(1) {
            Some(next) => {
                self.next_index = next;
                self.entries.push((SlotKey::Index(index), value));
                let last = self.entries.len() - 1;
                &mut self.entries[last].1
            }
            None => self.insert(SlotKey::Index(index), value),
        }
    }

    /// Store a value under `key`, replacing any value already there
    pub fn insert(&mut self, key: impl Into<SlotKey>, value: T) -> &mut T {
        let key = key.into();

        if let Some(pos) = self.position(&key) {
            self.entries[pos].1 = value;
            return &mut self.entries[pos].1;
        }

        if let SlotKey::Index(index) = key {
            self.next_index = self.next_index.max(index.saturating_add(1));
        }
        self.entries.push((key, value));
        let last = self.entries.len() - 1;
        &mut self.entries[last].1
    }

    /// Value stored under `key`, inserting one built by `make` if absent
    pub fn get_or_insert_with(&mut self, key: impl Into<SlotKey>, make: impl FnOnce() -> T) -> &mut T {
        let key = key.into();
        match self.position(&key) {
            Some(pos) => &mut self.entries[pos].1,
            None => self.insert(key, make()),
        }
    }

    pub fn get(&self, key: &SlotKey) -> Option<&T> {
        self.position(key).map(|pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, key: &SlotKey) -> Option<&mut T> {
        let pos = self.position(key)?;
        Some(&mut self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &SlotKey) -> bool {
        self.position(key).is_some()
    }

    /// Whether any slot was stored under a named (non-positional) key
    pub fn has_named_keys(&self) -> bool {
        self.entries.iter().any(|(key, _)| !key.is_index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &T)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Values in insertion order, keys dropped
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    fn position(&self, key: &SlotKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}
