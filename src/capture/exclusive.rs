//! Exclusive resource slots.
//!
//! A slot admits one holder at a time. Acquiring returns a guard that frees
//! the slot when dropped, so a session keeps the slot for exactly as long as
//! it keeps its guard.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared handle to one exclusive resource. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveSlot {
    held: Arc<AtomicBool>,
}

impl ExclusiveSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, or returns `None` if somebody else holds it.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of holding an [`ExclusiveSlot`].
#[derive(Debug)]
pub struct SlotGuard {
    held: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let slot = ExclusiveSlot::new();
        let guard = slot.try_acquire().expect("first acquire");
        assert!(slot.is_held());
        assert!(slot.clone().try_acquire().is_none());

        drop(guard);
        assert!(!slot.is_held());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn independent_slots_do_not_interfere() {
        let a = ExclusiveSlot::new();
        let b = ExclusiveSlot::new();
        let _ga = a.try_acquire().unwrap();
        assert!(b.try_acquire().is_some());
    }
}
