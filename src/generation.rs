use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Identifies one completion/suggestion request cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GenerationId(u64);

impl GenerationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Monotonic source of generation ids. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    last: AtomicU64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> GenerationId {
        GenerationId(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Most recently issued id, if any.
    pub fn current(&self) -> Option<GenerationId> {
        match self.last.load(Ordering::SeqCst) {
            0 => None,
            n => Some(GenerationId(n)),
        }
    }

    pub fn is_current(&self, id: GenerationId) -> bool {
        self.current() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.current(), None);
        let a = counter.next();
        let b = counter.next();
        assert!(a < b);
        assert_eq!(counter.current(), Some(b));
    }

    #[test]
    fn older_id_is_stale() {
        let counter = GenerationCounter::new();
        let g1 = counter.next();
        assert!(counter.is_current(g1));
        let g2 = counter.next();
        assert!(!counter.is_current(g1));
        assert!(counter.is_current(g2));
    }
}
