//! Presence cache: freshness-gated, rate-limited batch lookups.
//!
//! Owned by the actor thread, so no locking; the in-flight flag is a hard
//! mutual-exclusion gate on the presence service, not an optimization —
//! concurrent batches would mean duplicate billed queries.

use std::collections::{BTreeSet, HashMap};

use crate::state::PresenceDelta;

pub(crate) const PRESENCE_STALE_MS: i64 = 60_000;
pub(crate) const PRESENCE_BATCH_MAX: usize = 25;

/// What `ensure` decided for a set of requested ids.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EnsureOutcome {
    /// Every requested id is fresh; read values via `known`.
    Fresh,
    /// A batch is already in flight; nothing queued, caller re-invokes later
    /// or relies on push updates.
    Busy,
    /// The actor must run one service lookup for exactly these ids.
    Batch(Vec<String>),
}

#[derive(Debug, Default)]
pub(crate) struct PresenceCache {
    online: HashMap<String, bool>,
    fetched_at: HashMap<String, i64>,
    // BTreeSet keeps batch composition deterministic.
    pending: BTreeSet<String>,
    in_flight: bool,
    in_flight_ids: BTreeSet<String>,
}

impl PresenceCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Last observed value for `id`, from any batch or push update.
    pub(crate) fn known(&self, id: &str) -> Option<bool> {
        self.online.get(id).copied()
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// True while `id` sits in the pending set or the in-flight batch, i.e. a
    /// lookup that may still produce a value for it has not concluded.
    pub(crate) fn awaiting(&self, id: &str) -> bool {
        self.pending.contains(id) || self.in_flight_ids.contains(id)
    }

    /// Merge stale/never-fetched ids into the pending set and, unless a batch
    /// is already in flight, take up to [`PRESENCE_BATCH_MAX`] of them.
    pub(crate) fn ensure<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a str>,
        now: i64,
    ) -> EnsureOutcome {
        for id in ids {
            if id.is_empty() {
                continue;
            }
            let fresh = self
                .fetched_at
                .get(id)
                .is_some_and(|at| now - at < PRESENCE_STALE_MS);
            if !fresh {
                self.pending.insert(id.to_string());
            }
        }

        if self.in_flight {
            return EnsureOutcome::Busy;
        }
        if self.pending.is_empty() {
            return EnsureOutcome::Fresh;
        }

        let batch: Vec<String> = self
            .pending
            .iter()
            .take(PRESENCE_BATCH_MAX)
            .cloned()
            .collect();
        for id in &batch {
            self.pending.remove(id);
        }
        self.in_flight = true;
        self.in_flight_ids = batch.iter().cloned().collect();
        EnsureOutcome::Batch(batch)
    }

    /// Fold in one batch result. Only ids actually present in the response
    /// are stamped fresh — a failed lookup (empty map) marks nothing.
    pub(crate) fn resolve(&mut self, resolved: &PresenceDelta, now: i64) {
        for (id, online) in resolved {
            self.online.insert(id.clone(), *online);
            self.fetched_at.insert(id.clone(), now);
        }
        self.in_flight = false;
        self.in_flight_ids.clear();
    }

    /// Opportunistic push update; bypasses the staleness gate and does not
    /// stamp `fetched_at` (a later `ensure` may still refetch).
    pub(crate) fn push(&mut self, id: &str, online: bool) {
        self.online.insert(id.to_string(), online);
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(pairs: &[(&str, bool)]) -> PresenceDelta {
        pairs
            .iter()
            .map(|(id, on)| (id.to_string(), *on))
            .collect()
    }

    #[test]
    fn fresh_id_triggers_no_batch() {
        let mut cache = PresenceCache::new();
        let EnsureOutcome::Batch(batch) = cache.ensure(["alice"], 0) else {
            panic!("expected batch");
        };
        cache.resolve(&resolved(&[("alice", true)]), 0);
        assert_eq!(batch, vec!["alice".to_string()]);

        // Within the staleness window: no second lookup.
        assert_eq!(
            cache.ensure(["alice"], PRESENCE_STALE_MS - 1),
            EnsureOutcome::Fresh
        );
        assert_eq!(cache.known("alice"), Some(true));

        // Past the window it goes stale again.
        assert!(matches!(
            cache.ensure(["alice"], PRESENCE_STALE_MS),
            EnsureOutcome::Batch(_)
        ));
    }

    #[test]
    fn batch_is_capped_at_twenty_five_with_remainder_pending() {
        let mut cache = PresenceCache::new();
        let ids: Vec<String> = (0..40).map(|i| format!("user{i:02}")).collect();
        let EnsureOutcome::Batch(batch) = cache.ensure(ids.iter().map(|s| s.as_str()), 0) else {
            panic!("expected batch");
        };
        assert_eq!(batch.len(), PRESENCE_BATCH_MAX);
        assert_eq!(cache.pending_len(), 40 - PRESENCE_BATCH_MAX);
    }

    #[test]
    fn ensure_while_in_flight_returns_busy_without_queuing_a_batch() {
        let mut cache = PresenceCache::new();
        assert!(matches!(cache.ensure(["alice"], 0), EnsureOutcome::Batch(_)));
        assert_eq!(cache.ensure(["bob"], 0), EnsureOutcome::Busy);
        assert!(cache.in_flight());
        // Bob stays pending for the next round, not a concurrent one.
        assert_eq!(cache.pending_len(), 1);
    }

    #[test]
    fn failed_lookup_marks_nothing_fresh() {
        let mut cache = PresenceCache::new();
        assert!(matches!(cache.ensure(["alice"], 0), EnsureOutcome::Batch(_)));
        cache.resolve(&PresenceDelta::new(), 0);
        assert!(!cache.in_flight());
        assert_eq!(cache.known("alice"), None);
        // The id is stale again, so the next ensure retries it.
        assert!(matches!(cache.ensure(["alice"], 1), EnsureOutcome::Batch(_)));
    }

    #[test]
    fn awaiting_covers_pending_and_in_flight_ids() {
        let mut cache = PresenceCache::new();
        assert!(matches!(cache.ensure(["alice"], 0), EnsureOutcome::Batch(_)));
        assert_eq!(cache.ensure(["bob"], 0), EnsureOutcome::Busy);
        assert!(cache.awaiting("alice"));
        assert!(cache.awaiting("bob"));
        assert!(!cache.awaiting("carol"));

        // The batch concluded without alice; she is no longer awaited, bob
        // still is (pending for the next round).
        cache.resolve(&PresenceDelta::new(), 0);
        assert!(!cache.awaiting("alice"));
        assert!(cache.awaiting("bob"));
    }

    #[test]
    fn push_updates_bypass_the_staleness_gate() {
        let mut cache = PresenceCache::new();
        cache.push("alice", true);
        assert_eq!(cache.known("alice"), Some(true));
        // Push does not stamp freshness; ensure still wants a fetch.
        assert!(matches!(cache.ensure(["alice"], 0), EnsureOutcome::Batch(_)));
    }

    #[test]
    fn partial_response_leaves_missing_ids_stale() {
        let mut cache = PresenceCache::new();
        assert!(matches!(
            cache.ensure(["alice", "bob"], 0),
            EnsureOutcome::Batch(_)
        ));
        cache.resolve(&resolved(&[("alice", false)]), 0);
        assert_eq!(cache.known("alice"), Some(false));
        assert_eq!(cache.known("bob"), None);
        assert!(matches!(cache.ensure(["bob"], 1), EnsureOutcome::Batch(_)));
    }
}
