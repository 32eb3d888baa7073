// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poison-tolerant lock helpers.
//!
//! Used for the in-memory token slot and for presenter state. A panic while
//! one of these is held must not take every later session check down with it.
//! The worst a stale token slot can do is send the user to the login screen,
//! so the guard is recovered and the event logged.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering the guard if the lock is poisoned.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "security::locks",
            event = "LOCK_POISONED_READ",
            "Lock was poisoned; recovering the last stored value"
        );
        poisoned.into_inner()
    })
}

/// Acquire a write lock, recovering the guard if the lock is poisoned.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!(
            target: "security::locks",
            event = "LOCK_POISONED_WRITE",
            "Lock was poisoned; overwriting the last stored value"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn poisoned_slot() -> Arc<RwLock<Option<String>>> {
        let slot = Arc::new(RwLock::new(Some("stale-token".to_string())));
        let slot_clone = Arc::clone(&slot);

        let handle = thread::spawn(move || {
            let _guard = slot_clone.write().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();
        assert!(slot.is_poisoned());
        slot
    }

    #[test]
    fn test_read_recovers_poisoned_slot() {
        let slot = poisoned_slot();
        assert_eq!(resilient_read(&slot).as_deref(), Some("stale-token"));
    }

    #[test]
    fn test_write_recovers_poisoned_slot() {
        let slot = poisoned_slot();
        *resilient_write(&slot) = None;
        assert!(resilient_read(&slot).is_none());
    }
}
