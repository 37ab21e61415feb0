//! Operation deduplicator.
//!
//! The control plane re-sends intent, so the same logical operation can
//! arrive more than once. The deduplicator gates handler execution per
//! [`OperationKey`]:
//!
//! - With a version token: run when the key is unseen or the token
//!   changed; suppress an exact re-delivery of the stored token.
//! - Without a token: a per-key state machine
//!   `Idle -> Running -> Cooldown(duration) -> Idle` absorbs
//!   near-simultaneous duplicates. Weaker than the token path; callers
//!   should prefer supplying a token.
//!
//! The map is the only state shared across per-message tasks; every
//! transition is a single lock acquisition, never held across `.await`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::model::OperationKey;

#[derive(Debug, Clone)]
enum DedupEntry {
    /// Sentinel-mode handler currently executing.
    Running,
    /// Token-mode record of the last applied version.
    Applied { token: String },
    /// Sentinel-mode quiet period after completion.
    Cooldown { until: Instant },
}

/// Suppresses re-execution of in-flight or already-applied operations.
pub struct Deduplicator {
    entries: Mutex<HashMap<OperationKey, DedupEntry>>,
    cooldown: Duration,
}

impl Deduplicator {
    /// `cooldown` is the quiet period after a tokenless run completes.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    /// Decide whether the operation for `key` should run, recording it
    /// if so. Atomic check-and-set: of two concurrent deliveries for
    /// the same key, exactly one passes.
    pub fn should_run(&self, key: &OperationKey, token: Option<&str>) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match token {
            Some(token) => {
                if let Some(DedupEntry::Applied { token: stored }) = entries.get(key) {
                    if stored == token {
                        debug!(%key, token, "suppressing duplicate delivery");
                        return false;
                    }
                }
                entries.insert(
                    key.clone(),
                    DedupEntry::Applied {
                        token: token.to_string(),
                    },
                );
                true
            }
            None => match entries.get(key) {
                Some(DedupEntry::Running) => {
                    debug!(%key, "operation already in flight");
                    false
                }
                Some(DedupEntry::Cooldown { until }) if Instant::now() < *until => {
                    debug!(%key, "operation in cooldown");
                    false
                }
                _ => {
                    entries.insert(key.clone(), DedupEntry::Running);
                    true
                }
            },
        }
    }

    /// Mark a tokenless run as finished, starting the cooldown window.
    /// Token-mode records are left in place so duplicates stay
    /// suppressed until the token changes or the key is cleared.
    pub fn finish(&self, key: &OperationKey) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(DedupEntry::Running) = entries.get(key) {
            entries.insert(
                key.clone(),
                DedupEntry::Cooldown {
                    until: Instant::now() + self.cooldown,
                },
            );
        }
    }

    /// Drop the record for `key`. Used on delete operations (deletion
    /// must never be suppressed) and after handler failures so a
    /// re-delivery is not incorrectly swallowed.
    pub fn clear(&self, key: &OperationKey) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> OperationKey {
        OperationKey::workload("ns1", "pod1", "svc-a")
    }

    #[test]
    fn first_delivery_runs_duplicate_is_suppressed() {
        let dedup = Deduplicator::new(Duration::from_secs(1));
        assert!(dedup.should_run(&key(), Some("v1")));
        assert!(!dedup.should_run(&key(), Some("v1")));
    }

    #[test]
    fn token_change_runs_again() {
        let dedup = Deduplicator::new(Duration::from_secs(1));
        assert!(dedup.should_run(&key(), Some("v1")));
        assert!(dedup.should_run(&key(), Some("v2")));
        assert!(!dedup.should_run(&key(), Some("v2")));
    }

    #[test]
    fn clear_allows_rerun_with_same_token() {
        let dedup = Deduplicator::new(Duration::from_secs(1));
        assert!(dedup.should_run(&key(), Some("v1")));
        dedup.clear(&key());
        assert!(dedup.should_run(&key(), Some("v1")));
    }

    #[test]
    fn sentinel_blocks_while_running_and_in_cooldown() {
        let dedup = Deduplicator::new(Duration::from_millis(50));
        assert!(dedup.should_run(&key(), None));
        // In flight.
        assert!(!dedup.should_run(&key(), None));
        dedup.finish(&key());
        // Cooldown.
        assert!(!dedup.should_run(&key(), None));
        std::thread::sleep(Duration::from_millis(60));
        assert!(dedup.should_run(&key(), None));
    }

    #[test]
    fn finish_keeps_token_record() {
        let dedup = Deduplicator::new(Duration::from_millis(1));
        assert!(dedup.should_run(&key(), Some("v1")));
        dedup.finish(&key());
        std::thread::sleep(Duration::from_millis(5));
        assert!(!dedup.should_run(&key(), Some("v1")));
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let dedup = Deduplicator::new(Duration::from_secs(1));
        let other = OperationKey::workload("ns1", "pod2", "svc-b");
        assert!(dedup.should_run(&key(), Some("v1")));
        assert!(dedup.should_run(&other, Some("v1")));
    }
}
