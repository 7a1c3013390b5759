//! Build-global name dictionary.
//!
//! One dictionary exists per build invocation. It is filled in a single pass
//! over the input before any record is packed and treated as immutable from
//! then on, so every record family resolves names against the same id space.

use std::collections::HashMap;
use std::fmt;

/// Identifier assigned to an interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameId(pub u32);

impl NameId {
    /// Creates a new name id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name:{}", self.0)
    }
}

/// Deduplicating, insertion-ordered string table.
///
/// Ids are dense and assigned in first-seen order, so serializing the names
/// in id order and re-interning them reproduces the same ids.
#[derive(Debug, Clone, Default)]
pub struct NameDictionary {
    ids: HashMap<String, NameId>,
    names: Vec<String>,
}

impl NameDictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a dictionary from names already in id order.
    #[must_use]
    pub fn from_names(names: Vec<String>) -> Self {
        let mut dict = Self::new();
        for name in names {
            dict.intern(&name);
        }
        dict
    }

    /// Returns the id for `name`, interning it on first sight.
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = NameId::new(self.names.len() as u32);
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Looks up an already-interned name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<NameId> {
        self.ids.get(name).copied()
    }

    /// Resolves an id back to its string.
    #[must_use]
    pub fn resolve(&self, id: NameId) -> Option<&str> {
        self.names.get(id.as_u32() as usize).map(String::as_str)
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the dictionary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates names in id order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let mut dict = NameDictionary::new();
        let main = dict.intern("Main St");
        let oak = dict.intern("Oak Ave");
        let main_again = dict.intern("Main St");

        assert_eq!(main, main_again);
        assert_ne!(main, oak);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn ids_follow_insertion_order() {
        let mut dict = NameDictionary::new();
        assert_eq!(dict.intern("a").as_u32(), 0);
        assert_eq!(dict.intern("b").as_u32(), 1);
        assert_eq!(dict.intern("a").as_u32(), 0);
        assert_eq!(dict.intern("c").as_u32(), 2);
    }

    #[test]
    fn resolve_roundtrip() {
        let mut dict = NameDictionary::new();
        let id = dict.intern("Hauptstraße");
        assert_eq!(dict.resolve(id), Some("Hauptstraße"));
        assert_eq!(dict.resolve(NameId::new(99)), None);
    }

    #[test]
    fn from_names_reproduces_ids() {
        let mut dict = NameDictionary::new();
        dict.intern("x");
        dict.intern("y");
        dict.intern("z");

        let copy = NameDictionary::from_names(dict.iter().map(str::to_string).collect());
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.get("y"), Some(NameId::new(1)));
    }
}
