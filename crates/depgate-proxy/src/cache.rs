//! TTL caches for proxy decisions and upstream responses.
//!
//! Both are mutex-guarded maps with cleanup that runs inline on access at
//! most once per interval. The response cache additionally enforces a byte
//! budget with exact accounting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use depgate_core::policy::PolicyDecision;

const DECISION_MAX_ENTRIES: usize = 10_000;
const DECISION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

const RESPONSE_MAX_ENTRIES: usize = 1_000;
const RESPONSE_MAX_BYTES: usize = 100 * 1024 * 1024;
const RESPONSE_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    created_at: Instant,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

struct DecisionCacheInner {
    entries: HashMap<String, Entry<PolicyDecision>>,
    last_cleanup: Instant,
}

/// TTL cache for policy decisions, keyed
/// `"{registry}:{name}:{version|latest}"`.
pub struct DecisionCache {
    inner: Mutex<DecisionCacheInner>,
    default_ttl: Duration,
    max_entries: usize,
}

impl DecisionCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(DecisionCacheInner {
                entries: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            default_ttl,
            max_entries: DECISION_MAX_ENTRIES,
        }
    }

    fn make_key(registry: &str, package_name: &str, version: Option<&str>) -> String {
        format!("{registry}:{package_name}:{}", version.unwrap_or("latest"))
    }

    pub fn get(
        &self,
        registry: &str,
        package_name: &str,
        version: Option<&str>,
    ) -> Option<PolicyDecision> {
        let key = Self::make_key(registry, package_name, version);
        let mut guard = self.inner.lock().expect("decision cache poisoned");
        let inner = &mut *guard;
        maybe_cleanup(
            &mut inner.last_cleanup,
            DECISION_CLEANUP_INTERVAL,
            &mut inner.entries,
        );
        match inner.entries.get(&key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn set(
        &self,
        registry: &str,
        package_name: &str,
        version: Option<&str>,
        decision: PolicyDecision,
    ) {
        let key = Self::make_key(registry, package_name, version);
        let mut guard = self.inner.lock().expect("decision cache poisoned");
        let inner = &mut *guard;
        maybe_cleanup(
            &mut inner.last_cleanup,
            DECISION_CLEANUP_INTERVAL,
            &mut inner.entries,
        );
        inner
            .entries
            .insert(key, Entry::new(decision, self.default_ttl));

        // Over the cap: evict the oldest tenth.
        if inner.entries.len() > self.max_entries {
            evict_oldest(&mut inner.entries, self.max_entries / 10);
        }
    }

    /// Drop one version, or every version of a package when `None`.
    pub fn invalidate(&self, registry: &str, package_name: &str, version: Option<&str>) {
        let mut inner = self.inner.lock().expect("decision cache poisoned");
        match version {
            Some(_) => {
                let key = Self::make_key(registry, package_name, version);
                inner.entries.remove(&key);
            }
            None => {
                let prefix = format!("{registry}:{package_name}:");
                inner.entries.retain(|key, _| !key.starts_with(&prefix));
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("decision cache poisoned");
        inner.entries.clear();
    }

    pub fn stats(&self) -> Value {
        let inner = self.inner.lock().expect("decision cache poisoned");
        let expired = inner.entries.values().filter(|e| e.is_expired()).count();
        json!({
            "total_entries": inner.entries.len(),
            "expired_entries": expired,
            "active_entries": inner.entries.len() - expired,
            "max_entries": self.max_entries,
            "default_ttl": self.default_ttl.as_secs(),
        })
    }
}

struct ResponseCacheInner {
    entries: HashMap<String, Entry<(Vec<u8>, Vec<(String, String)>)>>,
    current_bytes: usize,
    last_cleanup: Instant,
}

/// TTL + byte-bounded cache for upstream response bodies.
pub struct ResponseCache {
    inner: Mutex<ResponseCacheInner>,
    default_ttl: Duration,
    max_entries: usize,
    max_bytes: usize,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(ResponseCacheInner {
                entries: HashMap::new(),
                current_bytes: 0,
                last_cleanup: Instant::now(),
            }),
            default_ttl,
            max_entries: RESPONSE_MAX_ENTRIES,
            max_bytes: RESPONSE_MAX_BYTES,
        }
    }

    pub fn get(&self, key: &str) -> Option<(Vec<u8>, Vec<(String, String)>)> {
        let mut inner = self.inner.lock().expect("response cache poisoned");
        Self::cleanup_expired_if_due(&mut inner);
        let expired = matches!(inner.entries.get(key), Some(entry) if entry.is_expired());
        if expired {
            Self::remove_entry(&mut inner, key);
            return None;
        }
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: &str, body: Vec<u8>, headers: Vec<(String, String)>) {
        // Refuse outsized bodies rather than churning the whole cache.
        if body.len() > self.max_bytes / 10 {
            return;
        }

        let mut inner = self.inner.lock().expect("response cache poisoned");
        Self::cleanup_expired_if_due(&mut inner);

        if inner.entries.contains_key(key) {
            Self::remove_entry(&mut inner, key);
        }

        // Evict oldest until the new body fits the byte budget.
        while inner.current_bytes + body.len() > self.max_bytes && !inner.entries.is_empty() {
            Self::evict_oldest_one(&mut inner);
        }

        inner.current_bytes += body.len();
        inner
            .entries
            .insert(key.to_string(), Entry::new((body, headers), self.default_ttl));

        if inner.entries.len() > self.max_entries {
            let excess = self.max_entries / 10;
            for _ in 0..excess {
                Self::evict_oldest_one(&mut inner);
            }
        }
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().expect("response cache poisoned");
        Self::remove_entry(&mut inner, key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("response cache poisoned");
        inner.entries.clear();
        inner.current_bytes = 0;
    }

    /// Exact byte accounting; never negative by construction.
    pub fn current_bytes(&self) -> usize {
        self.inner
            .lock()
            .expect("response cache poisoned")
            .current_bytes
    }

    pub fn stats(&self) -> Value {
        let inner = self.inner.lock().expect("response cache poisoned");
        let expired = inner.entries.values().filter(|e| e.is_expired()).count();
        json!({
            "total_entries": inner.entries.len(),
            "expired_entries": expired,
            "active_entries": inner.entries.len() - expired,
            "current_bytes": inner.current_bytes,
            "max_bytes": self.max_bytes,
            "max_entries": self.max_entries,
            "default_ttl": self.default_ttl.as_secs(),
        })
    }

    fn remove_entry(inner: &mut ResponseCacheInner, key: &str) {
        if let Some(entry) = inner.entries.remove(key) {
            inner.current_bytes = inner.current_bytes.saturating_sub(entry.value.0.len());
        }
    }

    fn evict_oldest_one(inner: &mut ResponseCacheInner) {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            Self::remove_entry(inner, &key);
        }
    }

    fn cleanup_expired_if_due(inner: &mut ResponseCacheInner) {
        if inner.last_cleanup.elapsed() < RESPONSE_CLEANUP_INTERVAL {
            return;
        }
        inner.last_cleanup = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            Self::remove_entry(inner, &key);
        }
    }
}

fn maybe_cleanup<T>(
    last_cleanup: &mut Instant,
    interval: Duration,
    entries: &mut HashMap<String, Entry<T>>,
) {
    if last_cleanup.elapsed() < interval {
        return;
    }
    *last_cleanup = Instant::now();
    entries.retain(|_, entry| !entry.is_expired());
}

fn evict_oldest<T>(entries: &mut HashMap<String, Entry<T>>, count: usize) {
    let mut by_age: Vec<(String, Instant)> = entries
        .iter()
        .map(|(key, entry)| (key.clone(), entry.created_at))
        .collect();
    by_age.sort_by_key(|(_, created)| *created);
    for (key, _) in by_age.into_iter().take(count) {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use depgate_core::policy::{Decision, PolicyDecision};

    fn allow() -> PolicyDecision {
        PolicyDecision::allow()
    }

    fn deny(rule: &str) -> PolicyDecision {
        PolicyDecision {
            decision: Decision::Deny,
            violated_rules: vec![rule.to_string()],
            evaluated_metrics: Default::default(),
        }
    }

    #[test]
    fn decision_round_trip_and_latest_key() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.set("npm", "lodash", None, deny("excluded by pattern: bad-.*"));

        let hit = cache.get("npm", "lodash", None).unwrap();
        assert_eq!(hit.decision, Decision::Deny);
        // `None` and the literal string address different keys only via
        // the same "latest" placeholder.
        assert!(cache.get("npm", "lodash", Some("1.0.0")).is_none());
    }

    #[test]
    fn decision_expiry() {
        let cache = DecisionCache::new(Duration::from_secs(0));
        cache.set("npm", "lodash", Some("1.0.0"), allow());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("npm", "lodash", Some("1.0.0")).is_none());
    }

    #[test]
    fn decision_invalidate_all_versions() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.set("npm", "lodash", Some("1.0.0"), allow());
        cache.set("npm", "lodash", Some("2.0.0"), allow());
        cache.set("npm", "other", Some("1.0.0"), allow());

        cache.invalidate("npm", "lodash", None);
        assert!(cache.get("npm", "lodash", Some("1.0.0")).is_none());
        assert!(cache.get("npm", "lodash", Some("2.0.0")).is_none());
        assert!(cache.get("npm", "other", Some("1.0.0")).is_some());
    }

    #[test]
    fn response_byte_accounting_is_exact() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("a", vec![0u8; 100], vec![]);
        cache.set("b", vec![0u8; 50], vec![]);
        assert_eq!(cache.current_bytes(), 150);

        // Overwriting replaces the old entry's bytes.
        cache.set("a", vec![0u8; 30], vec![]);
        assert_eq!(cache.current_bytes(), 80);

        cache.invalidate("b");
        assert_eq!(cache.current_bytes(), 30);

        cache.invalidate("b");
        assert_eq!(cache.current_bytes(), 30);

        cache.clear();
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn response_refuses_outsized_bodies() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("big", vec![0u8; RESPONSE_MAX_BYTES / 10 + 1], vec![]);
        assert!(cache.get("big").is_none());
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn response_headers_survive() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set(
            "k",
            b"body".to_vec(),
            vec![("Content-Type".to_string(), "application/json".to_string())],
        );
        let (body, headers) = cache.get("k").unwrap();
        assert_eq!(body, b"body");
        assert_eq!(headers[0].0, "Content-Type");
    }
}
