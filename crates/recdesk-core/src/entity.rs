// ── Normalized entity store ──
//
// Ordered id -> entity map produced by list queries. Replaced wholesale on
// every successful fetch; there is no partial merge.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// An entity that carries its own store identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Normalized collection: unique ids in first-seen order, one entity each.
///
/// When the input holds several entities with the same id, the id keeps
/// the position of its first occurrence and the value of its last.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStore<T> {
    entities: IndexMap<String, T>,
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self {
            entities: IndexMap::new(),
        }
    }
}

impl<T: Identified> EntityStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a fresh collection.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut store = Self::new();
        store.set_all(items);
        store
    }

    /// Replace the whole contents with `items`.
    pub fn set_all(&mut self, items: impl IntoIterator<Item = T>) {
        let mut entities = IndexMap::new();
        for item in items {
            entities.insert(item.id().to_owned(), item);
        }
        self.entities = entities;
    }

    /// All entities in id order.
    pub fn select_all(&self) -> Vec<&T> {
        self.entities.values().collect()
    }

    pub fn select_by_id(&self, id: &str) -> Option<&T> {
        self.entities.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entities.values()
    }
}

/// Serializes as a JSON array in id order.
impl<T: Serialize> Serialize for EntityStore<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entities.values())
    }
}
