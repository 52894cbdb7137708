//! Decision Cache: TTL-bounded memoization of access decisions.
//!
//! Decisions are pure functions of a (user snapshot, permission, context)
//! triple, so concurrent evaluators may race to populate an entry;
//! last-write-wins is fine because results are deterministic for identical
//! fingerprints. Expired entries are swept by a periodic cleanup pass, not
//! only by per-read checks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{AccessContext, AccessDecision, Permission, User};

#[derive(Debug, Clone)]
pub struct DecisionCacheConfig {
    /// TTL for allow decisions.
    pub default_ttl: Duration,
    /// TTL for deny decisions; kept shorter so recovered access shows up
    /// quickly.
    pub deny_ttl: Duration,
    pub max_entries: usize,
    pub cleanup_interval: Duration,
    pub enabled: bool,
}

impl Default for DecisionCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            deny_ttl: Duration::from_secs(60),
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    decision: AccessDecision,
    expires_at: Instant,
    created_at: Instant,
    hit_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

/// Thread-safe decision cache with TTL, capacity eviction, and stats.
pub struct DecisionCache {
    entries: DashMap<String, CacheEntry>,
    config: DecisionCacheConfig,
    stats: Arc<RwLock<DecisionCacheStats>>,
    last_cleanup: Arc<RwLock<Instant>>,
}

/// Deterministic fingerprint of the evaluation inputs. The user snapshot is
/// hashed field by field (ids, role tuples, regions, scope, token ids), never
/// by pointer, so identical snapshots collide on purpose.
pub fn decision_fingerprint(user: &User, permission: Permission, context: &AccessContext) -> String {
    let mut hasher = DefaultHasher::new();
    user.id.hash(&mut hasher);
    for role in &user.roles {
        role.role.as_str().hash(&mut hasher);
        role.level.hash(&mut hasher);
        role.allowed_regions.hash(&mut hasher);
        role.valid_from.timestamp().hash(&mut hasher);
        role.valid_until.map(|t| t.timestamp()).hash(&mut hasher);
        role.is_active.hash(&mut hasher);
    }
    user.allowed_regions.hash(&mut hasher);
    (user.pii_scope as u8).hash(&mut hasher);
    for token in &user.active_tokens {
        token.id.hash(&mut hasher);
        token.expires_at.timestamp().hash(&mut hasher);
        token.revoked_at.map(|t| t.timestamp()).hash(&mut hasher);
    }
    permission.as_str().hash(&mut hasher);
    context.region.hash(&mut hasher);
    context.ownership_type.map(|o| o as u8).hash(&mut hasher);
    context.data_class.map(|d| d as u8).hash(&mut hasher);
    context.contains_pii.hash(&mut hasher);
    context.case_id.hash(&mut hasher);
    context.emergency_override.hash(&mut hasher);
    context
        .emergency_granted_at
        .map(|t| t.timestamp())
        .hash(&mut hasher);
    context.skip_mfa.hash(&mut hasher);
    context.resource_id.hash(&mut hasher);
    format!("decision:{:x}", hasher.finish())
}

impl DecisionCache {
    pub fn new(config: DecisionCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: Arc::new(RwLock::new(DecisionCacheStats::default())),
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<AccessDecision> {
        if !self.config.enabled {
            return None;
        }

        if let Some(mut entry) = self.entries.get_mut(key) {
            if Instant::now() < entry.expires_at {
                entry.hit_count += 1;
                let decision = entry.decision.clone();
                let age = entry.created_at.elapsed().as_secs();
                drop(entry);

                let mut stats = self.stats.write().await;
                stats.hits += 1;
                debug!(cache_key = %key, age_seconds = age, "decision cache hit");
                return Some(decision);
            }
            drop(entry);
            self.entries.remove(key);
            let mut stats = self.stats.write().await;
            stats.evictions += 1;
        }

        let mut stats = self.stats.write().await;
        stats.misses += 1;
        None
    }

    pub async fn put(&self, key: String, decision: AccessDecision) {
        if !self.config.enabled {
            return;
        }

        if self.entries.len() >= self.config.max_entries {
            self.evict_coldest().await;
        }

        let ttl = if decision.allowed {
            self.config.default_ttl
        } else {
            self.config.deny_ttl
        };
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                decision,
                expires_at: now + ttl,
                created_at: now,
                hit_count: 0,
            },
        );

        let mut stats = self.stats.write().await;
        stats.entries = self.entries.len();
    }

    /// Drop every cached decision. Used when a grant is revoked: revocation
    /// takes effect immediately, so stale allows must not be served.
    pub async fn clear(&self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        let mut stats = self.stats.write().await;
        stats.entries = 0;
        stats.evictions += cleared as u64;
        if cleared > 0 {
            info!(cleared, "decision cache cleared");
        }
        cleared
    }

    async fn evict_coldest(&self) {
        let target = std::cmp::max(1, self.config.max_entries / 10);
        let mut candidates: Vec<(String, u64, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().hit_count, e.value().created_at))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)));

        let mut removed = 0u64;
        for (key, _, _) in candidates.iter().take(target) {
            if self.entries.remove(key).is_some() {
                removed += 1;
            }
        }

        let mut stats = self.stats.write().await;
        stats.evictions += removed;
        stats.entries = self.entries.len();
        warn!(removed, remaining = self.entries.len(), "evicted cold decision cache entries");
    }

    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            if now >= entry.expires_at {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            let mut stats = self.stats.write().await;
            stats.entries = self.entries.len();
            stats.evictions += removed;
            debug!(removed, "cleaned up expired decision cache entries");
        }

        *self.last_cleanup.write().await = now;
    }

    pub async fn needs_cleanup(&self) -> bool {
        self.last_cleanup.read().await.elapsed() >= self.config.cleanup_interval
    }

    pub async fn stats(&self) -> DecisionCacheStats {
        let mut stats = self.stats.read().await.clone();
        stats.entries = self.entries.len();
        stats
    }
}

/// Periodic sweep of expired entries.
pub async fn start_cache_cleanup_task(cache: Arc<DecisionCache>) {
    let mut interval = tokio::time::interval(cache.config.cleanup_interval);
    loop {
        interval.tick().await;
        if cache.needs_cleanup().await {
            cache.cleanup_expired().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OwnershipAccessLevel, PiiScope};
    use uuid::Uuid;

    fn sample_user() -> User {
        User {
            id: "u1".into(),
            roles: vec![],
            allowed_regions: vec!["ncr".into()],
            pii_scope: PiiScope::Masked,
            active_tokens: vec![],
        }
    }

    fn sample_decision(allowed: bool) -> AccessDecision {
        AccessDecision {
            allowed,
            reason: if allowed { "ok".into() } else { "permission_denied".into() },
            applied_policies: vec![],
            requires_mfa: false,
            masked_fields: vec![],
            ownership_access_level: OwnershipAccessLevel::Basic,
            audit_required: true,
            decision_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn fingerprint_is_deterministic_and_input_sensitive() {
        let user = sample_user();
        let ctx = AccessContext::default();
        let a = decision_fingerprint(&user, Permission::ViewVehicles, &ctx);
        let b = decision_fingerprint(&user, Permission::ViewVehicles, &ctx);
        assert_eq!(a, b);

        let c = decision_fingerprint(&user, Permission::ManageVehicles, &ctx);
        assert_ne!(a, c);

        let mut other = user.clone();
        other.pii_scope = PiiScope::Full;
        let d = decision_fingerprint(&other, Permission::ViewVehicles, &ctx);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn get_and_put_round_trip() {
        let cache = DecisionCache::new(DecisionCacheConfig::default());
        assert!(cache.get("decision:abc").await.is_none());

        cache.put("decision:abc".into(), sample_decision(true)).await;
        let hit = cache.get("decision:abc").await.unwrap();
        assert!(hit.allowed);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = DecisionCache::new(DecisionCacheConfig {
            default_ttl: Duration::from_millis(50),
            ..Default::default()
        });
        cache.put("k".into(), sample_decision(true)).await;
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn deny_decisions_use_the_shorter_ttl() {
        let cache = DecisionCache::new(DecisionCacheConfig {
            default_ttl: Duration::from_secs(60),
            deny_ttl: Duration::from_millis(50),
            ..Default::default()
        });
        cache.put("deny".into(), sample_decision(false)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("deny").await.is_none());
    }

    #[tokio::test]
    async fn capacity_eviction_keeps_the_cache_bounded() {
        let cache = DecisionCache::new(DecisionCacheConfig {
            max_entries: 4,
            ..Default::default()
        });
        for i in 0..8 {
            cache.put(format!("k{i}"), sample_decision(true)).await;
        }
        let stats = cache.stats().await;
        assert!(stats.entries <= 5);
        assert!(stats.evictions > 0);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = DecisionCache::new(DecisionCacheConfig::default());
        cache.put("a".into(), sample_decision(true)).await;
        cache.put("b".into(), sample_decision(true)).await;
        assert_eq!(cache.clear().await, 2);
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = DecisionCache::new(DecisionCacheConfig {
            enabled: false,
            ..Default::default()
        });
        cache.put("k".into(), sample_decision(true)).await;
        assert!(cache.get("k").await.is_none());
    }
}
