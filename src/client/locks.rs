use std::collections::HashSet;

/// Card ids currently held by some remote editor.
///
/// Advisory only: membership changes exclusively on remote
/// `flashcard:locked`/`flashcard:unlocked` events, never on local focus,
/// so a session never locks itself out. Locks carry no expiry; a lost
/// unlock leaves the card held until a fresh lock/unlock cycle arrives or
/// the view reloads.
#[derive(Debug, Default, Clone)]
pub struct LockTracker {
    locked: HashSet<String>,
}

impl LockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&mut self, card_id: &str) {
        self.locked.insert(card_id.to_string());
    }

    pub fn unlock(&mut self, card_id: &str) {
        self.locked.remove(card_id);
    }

    pub fn is_locked(&self, card_id: &str) -> bool {
        self.locked.contains(card_id)
    }

    pub fn snapshot(&self) -> HashSet<String> {
        self.locked.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_is_held_strictly_between_lock_and_unlock() {
        let mut locks = LockTracker::new();
        assert!(!locks.is_locked("c1"));

        locks.lock("c1");
        assert!(locks.is_locked("c1"));
        assert!(!locks.is_locked("c2"));

        locks.unlock("c1");
        assert!(!locks.is_locked("c1"));
    }

    #[test]
    fn repeated_events_are_idempotent() {
        let mut locks = LockTracker::new();
        locks.lock("c1");
        locks.lock("c1");
        assert!(locks.is_locked("c1"));
        assert_eq!(locks.snapshot().len(), 1);

        locks.unlock("c1");
        locks.unlock("c1");
        assert!(!locks.is_locked("c1"));

        // unlock for a card never locked is a no-op
        locks.unlock("c9");
        assert!(locks.snapshot().is_empty());
    }
}
