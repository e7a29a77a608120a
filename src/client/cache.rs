//! TTL-bounded metadata cache, per `[4.L]`: two keyspaces (stat, directory
//! listings) sharing one LRU policy and entry budget, each with its own TTL.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::vfs::{DirEntry, Metadata};

struct Entry<T> {
    value: T,
    inserted_at: Instant,
    last_touched: u64,
}

/// One keyspace: a plain map plus an LRU clock (`last_touched` generation
/// counter) the shared budget trims against.
struct Keyspace<T> {
    entries: HashMap<String, Entry<T>>,
    ttl: Duration,
}

impl<T> Keyspace<T> {
    fn new(ttl: Duration) -> Self {
        Keyspace { entries: HashMap::new(), ttl }
    }

    fn get(&mut self, key: &str, clock: &mut u64) -> Option<&T> {
        if self.ttl.is_zero() {
            return None;
        }
        let fresh = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() < self.ttl,
            None => false,
        };
        if !fresh {
            self.entries.remove(key);
            return None;
        }
        *clock += 1;
        let gen = *clock;
        let entry = self.entries.get_mut(key).unwrap();
        entry.last_touched = gen;
        Some(&self.entries.get(key).unwrap().value)
    }

    fn put(&mut self, key: String, value: T, clock: &mut u64) {
        if self.ttl.is_zero() {
            return;
        }
        *clock += 1;
        self.entries.insert(key, Entry { value, inserted_at: Instant::now(), last_touched: *clock });
    }

    fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Evicts the single least-recently-touched entry, if any.
    fn evict_oldest(&mut self) {
        if let Some(oldest_key) = self.entries.iter().min_by_key(|(_, e)| e.last_touched).map(|(k, _)| k.clone()) {
            self.entries.remove(&oldest_key);
        }
    }
}

struct Shared {
    stat: Keyspace<Metadata>,
    dir: Keyspace<Vec<DirEntry>>,
    clock: u64,
    max_entries: usize,
}

impl Shared {
    fn total_len(&self) -> usize {
        self.stat.len() + self.dir.len()
    }

    fn enforce_budget(&mut self) {
        while self.total_len() > self.max_entries {
            // Evict from whichever keyspace currently holds the globally
            // oldest entry, so the budget is shared rather than split evenly.
            let stat_oldest = self.stat.entries.values().map(|e| e.last_touched).min();
            let dir_oldest = self.dir.entries.values().map(|e| e.last_touched).min();
            match (stat_oldest, dir_oldest) {
                (Some(s), Some(d)) if s <= d => self.stat.evict_oldest(),
                (Some(_), _) => self.dir.evict_oldest(),
                (None, Some(_)) => self.dir.evict_oldest(),
                (None, None) => break,
            }
        }
    }
}

/// A shared, thread-safe metadata cache for one mounted client.
pub struct MetadataCache {
    inner: RwLock<Shared>,
}

impl MetadataCache {
    pub fn new(stat_ttl: Duration, dir_ttl: Duration, max_entries: usize) -> Self {
        MetadataCache {
            inner: RwLock::new(Shared { stat: Keyspace::new(stat_ttl), dir: Keyspace::new(dir_ttl), clock: 0, max_entries }),
        }
    }

    pub fn get_stat(&self, path: &str) -> Option<Metadata> {
        let mut shared = self.inner.write().unwrap();
        let Shared { stat, clock, .. } = &mut *shared;
        stat.get(path, clock).cloned()
    }

    pub fn put_stat(&self, path: &str, metadata: Metadata) {
        let mut shared = self.inner.write().unwrap();
        let clock = &mut shared.clock;
        shared.stat.put(path.to_string(), metadata, clock);
        shared.enforce_budget();
    }

    pub fn get_dir(&self, path: &str) -> Option<Vec<DirEntry>> {
        let mut shared = self.inner.write().unwrap();
        let Shared { dir, clock, .. } = &mut *shared;
        dir.get(path, clock).cloned()
    }

    pub fn put_dir(&self, path: &str, entries: Vec<DirEntry>) {
        let mut shared = self.inner.write().unwrap();
        let clock = &mut shared.clock;
        shared.dir.put(path.to_string(), entries, clock);
        shared.enforce_budget();
    }

    /// Evicts both keyspaces for `path` plus the directory listing of its
    /// parent (a mutation under `path` stales the parent's enumeration).
    pub fn invalidate(&self, path: &str) {
        let mut shared = self.inner.write().unwrap();
        shared.stat.invalidate(path);
        shared.dir.invalidate(path);
        shared.dir.invalidate(&parent_of(path));
    }

    pub fn invalidate_all(&self) {
        let mut shared = self.inner.write().unwrap();
        shared.stat.clear();
        shared.dir.clear();
    }
}

fn parent_of(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consts::FileAttributes;
    use crate::protocol::wire::FileTime;
    use crate::vfs::FileType;

    fn meta() -> Metadata {
        Metadata {
            file_type: FileType::File,
            size: 1,
            attributes: FileAttributes::NORMAL,
            creation_time: FileTime::now(),
            last_access_time: FileTime::now(),
            last_write_time: FileTime::now(),
            change_time: FileTime::now(),
        }
    }

    #[test]
    fn a_fresh_entry_is_served_from_cache() {
        let cache = MetadataCache::new(Duration::from_secs(5), Duration::from_secs(5), 100);
        cache.put_stat("/a", meta());
        assert!(cache.get_stat("/a").is_some());
    }

    #[test]
    fn a_zero_ttl_keyspace_never_caches() {
        let cache = MetadataCache::new(Duration::ZERO, Duration::from_secs(5), 100);
        cache.put_stat("/a", meta());
        assert!(cache.get_stat("/a").is_none());
    }

    #[test]
    fn an_expired_entry_is_filtered_lazily() {
        let cache = MetadataCache::new(Duration::from_millis(5), Duration::from_secs(5), 100);
        cache.put_stat("/a", meta());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get_stat("/a").is_none());
    }

    #[test]
    fn invalidate_clears_both_keyspaces_for_the_path_and_the_parent_dir_entry() {
        let cache = MetadataCache::new(Duration::from_secs(5), Duration::from_secs(5), 100);
        cache.put_stat("/dir/a", meta());
        cache.put_dir("/dir/a", vec![]);
        cache.put_dir("/dir", vec![]);

        cache.invalidate("/dir/a");

        assert!(cache.get_stat("/dir/a").is_none());
        assert!(cache.get_dir("/dir/a").is_none());
        assert!(cache.get_dir("/dir").is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = MetadataCache::new(Duration::from_secs(5), Duration::from_secs(5), 100);
        cache.put_stat("/a", meta());
        cache.put_dir("/", vec![]);
        cache.invalidate_all();
        assert!(cache.get_stat("/a").is_none());
        assert!(cache.get_dir("/").is_none());
    }

    #[test]
    fn the_entry_budget_is_shared_across_both_keyspaces() {
        let cache = MetadataCache::new(Duration::from_secs(5), Duration::from_secs(5), 2);
        cache.put_stat("/a", meta());
        cache.put_stat("/b", meta());
        cache.put_dir("/c", vec![]);
        let mut shared = cache.inner.write().unwrap();
        assert_eq!(shared.total_len(), 2);
    }
}
