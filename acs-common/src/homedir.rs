//! Home-directory cache shared by both backends.
//!
//! SSH targets keep their entry until the owning pool key is closed; WSL
//! distributions get a short TTL because they are reconfigured far more
//! often. An expired entry is never returned.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct HomeEntry {
    path: String,
    resolved_at: Instant,
}

/// Cache of resolved home directories, keyed by pool key or distro name.
pub struct HomeDirCache {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, HomeEntry>>,
}

impl HomeDirCache {
    /// Entries live until explicitly invalidated.
    pub fn persistent() -> Self {
        Self {
            ttl: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Entries expire `ttl` after resolution.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a cached path, dropping it if past its TTL.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match (entries.get(key), self.ttl) {
            (Some(entry), Some(ttl)) => entry.resolved_at.elapsed() >= ttl,
            (Some(_), None) => false,
            (None, _) => return None,
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.path.clone())
    }

    pub fn insert(&self, key: impl Into<String>, path: impl Into<String>) {
        self.entries.lock().unwrap().insert(
            key.into(),
            HomeEntry {
                path: path.into(),
                resolved_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_entries_survive() {
        let cache = HomeDirCache::persistent();
        cache.insert("deploy@build01:22", "/home/deploy");
        assert_eq!(
            cache.get("deploy@build01:22").as_deref(),
            Some("/home/deploy")
        );

        cache.invalidate("deploy@build01:22");
        assert_eq!(cache.get("deploy@build01:22"), None);
    }

    #[test]
    fn expired_entries_are_never_returned() {
        let cache = HomeDirCache::with_ttl(Duration::ZERO);
        cache.insert("Ubuntu-22.04", "/home/user");
        assert_eq!(cache.get("Ubuntu-22.04"), None);
    }

    #[test]
    fn ttl_entries_live_until_deadline() {
        let cache = HomeDirCache::with_ttl(Duration::from_secs(300));
        cache.insert("Ubuntu-22.04", "/home/user");
        assert_eq!(cache.get("Ubuntu-22.04").as_deref(), Some("/home/user"));
    }
}
