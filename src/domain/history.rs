use std::collections::HashMap;

/// Last-seen state per entity, plus the order in which entity keys were first
/// observed. Keys are never reordered or removed, so an index stays valid for
/// the lifetime of the store even after the entity disappears.
#[derive(Debug)]
pub struct HistoryStore<E> {
    entries: HashMap<String, E>,
    order: Vec<String>,
}

impl<E> HistoryStore<E> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: &str, entry: E) {
        if self.entries.insert(key.to_string(), entry).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.order.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<E> Default for HistoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}
