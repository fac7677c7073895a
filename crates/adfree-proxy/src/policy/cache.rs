use std::sync::Arc;

use dashmap::DashMap;

use super::validator::ValidatedPolicy;

/// Origin -> last successfully validated policy.
///
/// Owned by `AppState`; no TTL. Each `put` replaces the whole entry, so
/// overlapping validations of one origin resolve last-writer-wins and a
/// reader never observes a partially updated policy.
#[derive(Default)]
pub struct PolicyCache {
    entries: DashMap<String, Arc<ValidatedPolicy>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, origin: &str) -> Option<Arc<ValidatedPolicy>> {
        self.entries.get(origin).map(|e| Arc::clone(e.value()))
    }

    /// Store `policy` under `origin`. A policy validated for a different
    /// origin is refused (returns false).
    pub fn put(&self, origin: &str, policy: Arc<ValidatedPolicy>) -> bool {
        if policy.origin() != origin {
            tracing::warn!(origin, validated_for = policy.origin(), "refusing cross-origin policy cache write");
            return false;
        }
        self.entries.insert(origin.to_string(), policy);
        true
    }

    pub fn remove(&self, origin: &str) -> Option<Arc<ValidatedPolicy>> {
        self.entries.remove(origin).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
