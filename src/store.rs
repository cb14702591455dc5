//! Thread-safe buffer of recorded key events.
//!
//! The store is shared between the primary context and the OS callback that
//! records keys. Its lock is held for exactly one buffer operation: callers
//! take a [`snapshot`](SequenceStore::snapshot) and work on the copy, so the
//! lock never spans I/O, a sleep, or a UI update.

use crate::error::{KsrError, Result};
use crate::event::KeyEvent;
use std::sync::{Mutex, MutexGuard};

/// Ordered, mutex-protected sequence of key events.
#[derive(Debug, Default)]
pub struct SequenceStore {
    events: Mutex<Vec<KeyEvent>>,
    limit: Option<usize>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses to grow past `limit` events.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Append an event and return the new length.
    ///
    /// Only fails when a soft cap is configured and already reached.
    pub fn append(&self, event: KeyEvent) -> Result<usize> {
        let mut events = self.lock();
        if let Some(limit) = self.limit {
            if events.len() >= limit {
                return Err(KsrError::Overflow { limit });
            }
        }
        events.push(event);
        Ok(events.len())
    }

    /// Independent copy of the current contents.
    pub fn snapshot(&self) -> Vec<KeyEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Replace the whole sequence in one critical section.
    pub fn replace(&self, events: Vec<KeyEvent>) {
        *self.lock() = events;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-pushed Vec behind,
    // so a poisoned buffer is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<KeyEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyState;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_append_preserves_order() {
        let store = SequenceStore::new();
        store.append(KeyEvent::new("A", KeyState::Down, 0)).unwrap();
        store.append(KeyEvent::new("A", KeyState::Up, 50)).unwrap();
        store.append(KeyEvent::new("B", KeyState::Down, 100)).unwrap();

        let keys: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|e| (e.key, e.state, e.delay))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), KeyState::Down, 0),
                ("A".to_string(), KeyState::Up, 50),
                ("B".to_string(), KeyState::Down, 100),
            ]
        );
    }

    #[test]
    fn test_snapshot_is_independent() {
        let store = SequenceStore::new();
        store.append(KeyEvent::new("A", KeyState::Down, 0)).unwrap();
        let snapshot = store.snapshot();

        store.clear();
        assert!(store.is_empty());
        assert_eq!(snapshot.len(), 1);

        store.append(KeyEvent::new("B", KeyState::Down, 0)).unwrap();
        assert_eq!(snapshot[0].key, "A");
    }

    #[test]
    fn test_soft_cap_overflow() {
        let store = SequenceStore::with_limit(2);
        assert_eq!(store.append(KeyEvent::new("A", KeyState::Down, 0)).unwrap(), 1);
        assert_eq!(store.append(KeyEvent::new("A", KeyState::Up, 0)).unwrap(), 2);
        let err = store
            .append(KeyEvent::new("B", KeyState::Down, 0))
            .unwrap_err();
        assert!(matches!(err, KsrError::Overflow { limit: 2 }));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(SequenceStore::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..250 {
                        store.append(KeyEvent::new("X", KeyState::Down, 1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 1000);
    }
}
