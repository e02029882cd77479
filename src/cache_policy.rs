//! Pluggable priority-update rules for `PriorityQueue`. Each variant
//! implements two hooks: `on_push` (run on every push, regardless of key
//! presence) and `update_priority` (run when a push targets an existing
//! key). A small tagged enum is enough here; no dynamic dispatch needed.

use rand::Rng;

#[derive(Debug, Clone)]
pub enum CachePolicy {
    /// Default: priorities never change.
    ZeroWeight,
    /// Least-recently-used: bumping an item raises its priority.
    Lru,
    /// Most-recently-used: bumping an item lowers its priority.
    Mru,
    /// Priorities leak toward zero on every push; a touched item jumps to
    /// `min(old + increment, capacity)`.
    LeakyBucket { capacity: i64, increment: i64 },
    /// Mirror image of `LeakyBucket`: priorities leak toward zero from
    /// below; a touched item drops to `max(old - decrement, -capacity)`.
    InverseLeakyBucket { capacity: i64, decrement: i64 },
    /// Uniform random priority in `[lo, hi]` on touch.
    Stochastic { lo: i64, hi: i64 },
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::ZeroWeight
    }
}

impl CachePolicy {
    /// Compute the new priority for an item that was pushed again with an
    /// existing key, given its current priority.
    pub fn update_priority(&self, old_priority: i64) -> i64 {
        match self {
            CachePolicy::ZeroWeight => old_priority,
            CachePolicy::Lru => old_priority + 1,
            CachePolicy::Mru => old_priority - 1,
            CachePolicy::LeakyBucket { capacity, increment } => {
                (old_priority + increment).min(*capacity)
            }
            CachePolicy::InverseLeakyBucket { capacity, decrement } => {
                (old_priority - decrement).max(-*capacity)
            }
            CachePolicy::Stochastic { lo, hi } => rand::thread_rng().gen_range(*lo..=*hi),
        }
    }

    /// Given every `(key, priority)` pair currently in the queue, return the
    /// updates this policy wants to apply before a push proceeds (the
    /// leaky-bucket family decays every entry toward zero on each push).
    pub fn on_push_adjustments(&self, entries: &[(i64, i64)]) -> Vec<(i64, i64)> {
        match self {
            CachePolicy::LeakyBucket { .. } => entries
                .iter()
                .map(|(key, priority)| (*key, (priority - 1).max(0)))
                .collect(),
            CachePolicy::InverseLeakyBucket { .. } => entries
                .iter()
                .map(|(key, priority)| (*key, (priority + 1).min(0)))
                .collect(),
            _ => Vec::new(),
        }
    }
}
