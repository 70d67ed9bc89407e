use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::arena::{ArenaStr, LinearArena};

use super::Recognition;

/// Key → recognition table whose keys live in a shared [`LinearArena`].
///
/// Buckets are keyed by the content hash so lookups work with a plain `&str`
/// while the table itself only holds arena handles.
pub(crate) struct ClassTable {
    buckets: HashMap<u64, Vec<(ArenaStr, Recognition)>>,
    hasher: RandomState,
}

impl ClassTable {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            hasher: RandomState::new(),
        }
    }

    pub fn get(&self, arena: &LinearArena, key: &str) -> Option<Recognition> {
        self.buckets
            .get(&self.hasher.hash_one(key))?
            .iter()
            .find(|(k, _)| arena.get(*k) == key)
            .map(|(_, v)| *v)
    }

    /// Insert or overwrite. Returns `false` if the key could not be stored.
    pub fn insert(&mut self, arena: &mut LinearArena, key: &str, value: Recognition) -> bool {
        let bucket = self.buckets.entry(self.hasher.hash_one(key)).or_default();
        if let Some(slot) = bucket.iter_mut().find(|(k, _)| arena.get(*k) == key) {
            slot.1 = value;
            return true;
        }
        let Some(stored) = arena.store(key) else {
            return false;
        };
        bucket.push((stored, value));
        true
    }

    pub fn remove(&mut self, arena: &LinearArena, key: &str) -> Option<Recognition> {
        let hash = self.hasher.hash_one(key);
        let bucket = self.buckets.get_mut(&hash)?;
        let pos = bucket.iter().position(|(k, _)| arena.get(*k) == key)?;
        let (_, value) = bucket.swap_remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        Some(value)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_overwrite_remove() {
        let mut arena = LinearArena::new(64, 4);
        let mut table = ClassTable::new();
        assert!(table.insert(&mut arena, "git", Recognition::Unknown));
        assert_eq!(table.get(&arena, "git"), Some(Recognition::Unknown));
        assert!(table.insert(&mut arena, "git", Recognition::Recognized));
        assert_eq!(table.get(&arena, "git"), Some(Recognition::Recognized));
        assert_eq!(table.len(), 1);
        assert_eq!(table.remove(&arena, "git"), Some(Recognition::Recognized));
        assert_eq!(table.get(&arena, "git"), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn overwrite_does_not_consume_arena() {
        let mut arena = LinearArena::new(3, 1);
        let mut table = ClassTable::new();
        assert!(table.insert(&mut arena, "abc", Recognition::Unknown));
        assert!(table.insert(&mut arena, "abc", Recognition::NotRecognized));
        assert!(!table.insert(&mut arena, "d", Recognition::Unknown));
    }
}
