use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use warden_core::{Principal, PrincipalKey};

use super::metrics::{record_cache_eviction, record_cache_lookup, CACHE_HIT, CACHE_MISS};

#[derive(Debug, Clone)]
struct CacheEntry {
    generation: u64,
    loaded_at: Instant,
    principal: Arc<Principal>,
}

/// Read-through cache of principal records keyed by [`PrincipalKey`].
///
/// Entries expire after `ttl`. [`ResolutionCache::evict`] bumps a generation
/// counter and clears every entry; a load that started under an older
/// generation is discarded instead of inserted, so an eviction is never undone
/// by a read that raced it.
#[derive(Debug)]
pub(crate) struct ResolutionCache {
    entries: DashMap<PrincipalKey, CacheEntry>,
    generation: AtomicU64,
    ttl: Duration,
}

impl ResolutionCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    /// Capture before loading from the store and pass to [`Self::insert`].
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn get(&self, key: &PrincipalKey) -> Option<Arc<Principal>> {
        let current = self.generation();
        let hit = self.entries.get(key).and_then(|entry| {
            (entry.generation == current && entry.loaded_at.elapsed() < self.ttl)
                .then(|| Arc::clone(&entry.principal))
        });
        record_cache_lookup(if hit.is_some() { CACHE_HIT } else { CACHE_MISS });
        hit
    }

    pub(crate) fn insert(&self, key: PrincipalKey, generation: u64, principal: Arc<Principal>) {
        if generation != self.generation() {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                generation,
                loaded_at: Instant::now(),
                principal,
            },
        );
        // An evict may have landed between the check and the insert.
        if generation != self.generation() {
            self.entries
                .remove_if(&key, |_, entry| entry.generation == generation);
        }
    }

    pub(crate) fn remove(&self, key: &PrincipalKey) {
        self.entries.remove(key);
    }

    pub(crate) fn evict(&self, reason: &'static str) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
        record_cache_eviction(reason);
        tracing::debug!(event = "permissions.cache.evicted", reason);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::ResolutionCache;
    use warden_core::{Principal, PrincipalKey, UserId};

    fn user(id: u64) -> (PrincipalKey, Arc<Principal>) {
        let key = PrincipalKey::User(UserId::new(id));
        (key, Arc::new(key.materialize("someone")))
    }

    #[test]
    fn serves_inserted_entries_until_evicted() {
        let cache = ResolutionCache::new(Duration::from_secs(30));
        let (key, principal) = user(1);
        assert!(cache.get(&key).is_none());

        cache.insert(key, cache.generation(), Arc::clone(&principal));
        assert_eq!(cache.get(&key).as_deref(), Some(principal.as_ref()));

        cache.evict("test");
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn discards_loads_that_started_before_an_eviction() {
        let cache = ResolutionCache::new(Duration::from_secs(30));
        let (key, principal) = user(2);
        let stale_generation = cache.generation();
        cache.evict("test");

        cache.insert(key, stale_generation, principal);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = ResolutionCache::new(Duration::ZERO);
        let (key, principal) = user(3);
        cache.insert(key, cache.generation(), principal);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn remove_drops_a_single_key() {
        let cache = ResolutionCache::new(Duration::from_secs(30));
        let (first, first_principal) = user(4);
        let (second, second_principal) = user(5);
        cache.insert(first, cache.generation(), first_principal);
        cache.insert(second, cache.generation(), second_principal);

        cache.remove(&first);
        assert!(cache.get(&first).is_none());
        assert!(cache.get(&second).is_some());
    }
}
