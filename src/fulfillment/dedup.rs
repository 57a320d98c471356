//! Idempotency guard for repeated webhook deliveries.
//!
//! The provider redelivers events it believes were not acknowledged, and two
//! replicas of the provider can deliver the same event concurrently. A bounded
//! in-memory seen-set keyed by payment id prevents the same capture from
//! triggering duplicate report deliveries within the retention window.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Bounded set of recently processed payment ids.
pub struct SeenPayments {
    entries: DashMap<String, Instant>,
    retention: Duration,
    max_entries: usize,
}

impl SeenPayments {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
            max_entries,
        }
    }

    /// Record `payment_id` as processed.
    ///
    /// Returns `false` if it was already recorded within the retention window
    /// (a duplicate delivery). Concurrent claims for the same id serialize on
    /// the map entry, so exactly one caller wins.
    pub fn try_claim(&self, payment_id: &str) -> bool {
        if self.entries.len() >= self.max_entries {
            self.sweep_expired();
            // Nothing expired yet: give up the oldest claim so the cap is a
            // real bound. That payment becomes re-claimable early, which is
            // the cheaper failure mode than unbounded growth.
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        match self.entries.entry(payment_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().elapsed() >= self.retention {
                    occupied.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                true
            }
        }
    }

    /// Drop entries older than the retention window. Called opportunistically
    /// from `try_claim` when the map reaches capacity, so no background task
    /// is needed.
    fn sweep_expired(&self) {
        let retention = self.retention;
        self.entries.retain(|_, seen_at| seen_at.elapsed() < retention);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
