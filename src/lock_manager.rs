//! Shared/exclusive record-level locking for strict two-phase locking. See
//! spec section 4.7.
//!
//! REDESIGN FLAG resolution (open question "upgrade race"): an upgrade from
//! shared to exclusive is only granted when the requesting transaction is
//! the *sole* shared holder (`s_locks[key] == {txn}` exactly), not merely a
//! member of the shared set. A transaction that upgrades while another
//! transaction also holds the shared lock must instead release and retry
//! (the worker's abort/retry loop handles this), which prevents two
//! concurrent upgraders from each waiting on the other's shared lock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct Inner {
    s_locks: HashMap<i64, HashSet<u64>>,
    x_locks: HashMap<i64, u64>,
    /// Reverse index: every key a transaction currently holds, for `release_all`.
    held_by: HashMap<u64, HashSet<i64>>,
}

pub struct LockManager {
    inner: Mutex<Inner>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            inner: Mutex::new(Inner {
                s_locks: HashMap::new(),
                x_locks: HashMap::new(),
                held_by: HashMap::new(),
            }),
        }
    }

    /// Attempt to acquire `mode` on `key` for `txn`. Returns `false` if the
    /// lock is unavailable; the caller (a `QueryWrapper`/`Transaction`)
    /// should treat that as a reason to abort and retry.
    pub fn request(&self, txn: u64, key: i64, mode: LockMode) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match mode {
            LockMode::Shared => {
                if let Some(holder) = inner.x_locks.get(&key) {
                    return *holder == txn;
                }
                inner.s_locks.entry(key).or_default().insert(txn);
                inner.held_by.entry(txn).or_default().insert(key);
                true
            }
            LockMode::Exclusive => {
                if let Some(holder) = inner.x_locks.get(&key) {
                    return *holder == txn;
                }
                let shared_holders = inner.s_locks.get(&key);
                let sole_shared_holder = match shared_holders {
                    None => true,
                    Some(set) => set.is_empty() || (set.len() == 1 && set.contains(&txn)),
                };
                if !sole_shared_holder {
                    return false;
                }
                inner.s_locks.remove(&key);
                inner.x_locks.insert(key, txn);
                inner.held_by.entry(txn).or_default().insert(key);
                true
            }
        }
    }

    pub fn release(&self, txn: u64, key: i64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.x_locks.get(&key) == Some(&txn) {
            inner.x_locks.remove(&key);
        }
        if let Some(set) = inner.s_locks.get_mut(&key) {
            set.remove(&txn);
            if set.is_empty() {
                inner.s_locks.remove(&key);
            }
        }
        if let Some(held) = inner.held_by.get_mut(&txn) {
            held.remove(&key);
        }
    }

    /// Release every lock held by `txn`, e.g. on abort or commit.
    pub fn release_all(&self, txn: u64) {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<i64> = inner
            .held_by
            .remove(&txn)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default();
        for key in keys {
            if inner.x_locks.get(&key) == Some(&txn) {
                inner.x_locks.remove(&key);
            }
            if let Some(set) = inner.s_locks.get_mut(&key) {
                set.remove(&txn);
                if set.is_empty() {
                    inner.s_locks.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_transactions_can_share_a_read_lock() {
        let lm = LockManager::new();
        assert!(lm.request(1, 10, LockMode::Shared));
        assert!(lm.request(2, 10, LockMode::Shared));
    }

    #[test]
    fn exclusive_lock_blocks_other_transactions() {
        let lm = LockManager::new();
        assert!(lm.request(1, 10, LockMode::Exclusive));
        assert!(!lm.request(2, 10, LockMode::Shared));
        assert!(!lm.request(2, 10, LockMode::Exclusive));
    }

    #[test]
    fn sole_shared_holder_can_upgrade_in_place() {
        let lm = LockManager::new();
        assert!(lm.request(1, 10, LockMode::Shared));
        assert!(lm.request(1, 10, LockMode::Exclusive));
    }

    #[test]
    fn upgrade_fails_when_another_transaction_also_holds_shared() {
        let lm = LockManager::new();
        assert!(lm.request(1, 10, LockMode::Shared));
        assert!(lm.request(2, 10, LockMode::Shared));
        assert!(!lm.request(1, 10, LockMode::Exclusive));
    }

    #[test]
    fn release_all_frees_every_key_held_by_a_transaction() {
        let lm = LockManager::new();
        lm.request(1, 10, LockMode::Shared);
        lm.request(1, 20, LockMode::Exclusive);
        lm.release_all(1);
        assert!(lm.request(2, 10, LockMode::Exclusive));
        assert!(lm.request(2, 20, LockMode::Exclusive));
    }
}
