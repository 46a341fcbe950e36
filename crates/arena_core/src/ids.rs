//! # Session Ids
//!
//! Lock-free generator for auto-assigned session ids.

use std::sync::atomic::{AtomicU64, Ordering};

/// First value the generator counts up from.
pub const DEFAULT_FIRST_SESSION_ID: u64 = 1000;

/// Hands out strictly increasing session ids.
///
/// Every returned id is strictly greater than the starting value and
/// strictly greater than any id returned before it.
#[derive(Debug)]
pub struct SessionIdGenerator {
    last: AtomicU64,
}

impl SessionIdGenerator {
    /// Creates a generator whose first id is `start + 1`.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self {
            last: AtomicU64::new(start),
        }
    }

    /// Returns the next id.
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently issued id (or the start value if none yet).
    #[inline]
    #[must_use]
    pub fn last_issued(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_FIRST_SESSION_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_strictly_increase_from_start() {
        let ids = SessionIdGenerator::default();
        let first = ids.next_id();
        let second = ids.next_id();
        assert_eq!(first, 1001);
        assert_eq!(second, 1002);
        assert_eq!(ids.last_issued(), 1002);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(SessionIdGenerator::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id > 0);
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4_000);
    }
}
