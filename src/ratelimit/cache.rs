//! Time-boxed cache of per-tenant rule sets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::Clock;
use super::rules::{Rule, RuleStore};
use crate::error::Result;

/// Default lifetime of a cached rule set, in seconds.
pub const DEFAULT_RULE_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, Clone)]
struct CacheEntry {
    rules: Arc<Vec<Rule>>,
    expires_at: u64,
}

/// Cache of rule sets keyed by tenant.
///
/// An entry is served only while `now < expires_at`. Misses and expired
/// entries go to the [`RuleStore`] and replace the tenant's entry wholesale.
/// Concurrent refreshes for one tenant may both fetch; the last write wins.
pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
    entries: DashMap<String, CacheEntry>,
    fetches: AtomicU64,
}

impl RuleCache {
    /// Create a cache with the default 60 second lifetime.
    pub fn new(store: Arc<dyn RuleStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(store, clock, DEFAULT_RULE_CACHE_TTL_SECS)
    }

    /// Create a cache with a custom entry lifetime.
    pub fn with_ttl(store: Arc<dyn RuleStore>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            store,
            clock,
            ttl_secs,
            entries: DashMap::new(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Rules for `tenant_id`, from cache when fresh, otherwise from the store.
    pub async fn rules_for(&self, tenant_id: &str) -> Result<Arc<Vec<Rule>>> {
        let now = self.clock.now_secs();

        if let Some(entry) = self.entries.get(tenant_id) {
            if now < entry.expires_at {
                trace!(tenant_id = %tenant_id, "Rule cache hit");
                return Ok(entry.rules.clone());
            }
        }

        // The map guard is released before awaiting the store.
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let rules = Arc::new(self.store.fetch_rules(tenant_id).await?);
        let expires_at = now.saturating_add(self.ttl_secs);

        debug!(
            tenant_id = %tenant_id,
            rule_count = rules.len(),
            expires_at = expires_at,
            "Refreshed rule cache entry"
        );

        self.entries.insert(
            tenant_id.to_string(),
            CacheEntry {
                rules: rules.clone(),
                expires_at,
            },
        );
        Ok(rules)
    }

    /// Drop every cached rule set.
    pub fn invalidate(&self) {
        debug!(entries = self.entries.len(), "Invalidating rule cache");
        self.entries.clear();
    }

    /// Number of store fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of tenants with a cached entry, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LimiterError;
    use crate::ratelimit::clock::MockClock;
    use crate::ratelimit::rules::{MemoryRuleStore, RuleKind};
    use async_trait::async_trait;

    struct UnavailableStore;

    #[async_trait]
    impl RuleStore for UnavailableStore {
        async fn fetch_rules(&self, _tenant_id: &str) -> Result<Vec<Rule>> {
            Err(LimiterError::StoreUnavailable("database down".to_string()))
        }
    }

    fn seeded_store() -> Arc<MemoryRuleStore> {
        let store = Arc::new(MemoryRuleStore::new());
        store.register_tenant("acme", "Acme").unwrap();
        store
            .add_rule(Rule::new("acme", RuleKind::TenantWide, 10, 60, None).unwrap())
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_lookups_within_ttl_fetch_once() {
        let clock = MockClock::new(1_000);
        let cache = RuleCache::new(seeded_store(), Arc::new(clock.clone()));

        assert_eq!(cache.rules_for("acme").await.unwrap().len(), 1);
        clock.advance(59);
        assert_eq!(cache.rules_for("acme").await.unwrap().len(), 1);

        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_lookup_after_ttl_refetches() {
        let clock = MockClock::new(1_000);
        let cache = RuleCache::new(seeded_store(), Arc::new(clock.clone()));

        cache.rules_for("acme").await.unwrap();
        clock.advance(60);
        cache.rules_for("acme").await.unwrap();

        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_refetch_sees_new_rules() {
        let clock = MockClock::new(0);
        let store = seeded_store();
        let cache = RuleCache::new(store.clone(), Arc::new(clock.clone()));

        assert_eq!(cache.rules_for("acme").await.unwrap().len(), 1);
        store
            .add_rule(Rule::new("acme", RuleKind::BySource, 5, 60, None).unwrap())
            .unwrap();

        // Stale until expiry.
        assert_eq!(cache.rules_for("acme").await.unwrap().len(), 1);
        clock.advance(61);
        assert_eq!(cache.rules_for("acme").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let clock = MockClock::new(1_000);
        let cache = RuleCache::with_ttl(seeded_store(), Arc::new(clock.clone()), u64::MAX);

        cache.rules_for("acme").await.unwrap();
        clock.advance(1_000_000);
        cache.rules_for("acme").await.unwrap();

        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let clock = MockClock::new(0);
        let cache = RuleCache::new(seeded_store(), Arc::new(clock));

        cache.rules_for("acme").await.unwrap();
        cache.rules_for("other").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate();
        assert!(cache.is_empty());

        cache.rules_for("acme").await.unwrap();
        assert_eq!(cache.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_rule_sets_are_cached() {
        let clock = MockClock::new(0);
        let cache = RuleCache::new(seeded_store(), Arc::new(clock));

        assert!(cache.rules_for("nobody").await.unwrap().is_empty());
        assert!(cache.rules_for("nobody").await.unwrap().is_empty());
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_store_errors_propagate_and_are_not_cached() {
        let clock = MockClock::new(0);
        let cache = RuleCache::with_ttl(Arc::new(UnavailableStore), Arc::new(clock), 30);

        assert!(cache.rules_for("acme").await.unwrap_err().is_store_unavailable());
        assert!(cache.rules_for("acme").await.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.fetch_count(), 2);
        assert_eq!(cache.ttl_secs(), 30);
    }
}
