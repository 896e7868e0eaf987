use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Candidate versions fetched for one `(ecosystem, identifier)`.
///
/// `latest` and `release` carry the Maven metadata hints; the other
/// ecosystems leave them empty.
#[derive(Debug, Clone, Default)]
pub struct CachedCandidates {
    pub versions: Vec<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
}

/// TTL cache for candidate lists, keyed `"{ecosystem}:{identifier}"`.
///
/// Shared across concurrent resolution tasks behind a mutex; entries expire
/// after ten minutes by default.
pub struct ResolverCache {
    entries: Mutex<HashMap<String, (Instant, CachedCandidates)>>,
    ttl: Duration,
}

impl Default for ResolverCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl ResolverCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedCandidates> {
        let mut entries = self.entries.lock().expect("resolver cache poisoned");
        match entries.get(key) {
            Some((inserted, cached)) if inserted.elapsed() < self.ttl => Some(cached.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, cached: CachedCandidates) {
        let mut entries = self.entries.lock().expect("resolver cache poisoned");
        entries.insert(key.to_string(), (Instant::now(), cached));
    }
}
