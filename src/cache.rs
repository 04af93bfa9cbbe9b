//! Session Cache Module
//!
//! Keeps one live [`Session`] per consulted file.
//!
//! ## Design
//!
//! Entries are keyed by canonical path. A lookup re-consults the file when
//! its modification time has advanced since the last load, and replaces the
//! session when it has been closed. Lookups and reloads are serialised under
//! one lock, so concurrent callers never start two engines for one path.
//!
//! New sessions come from an injected spawner, which lets tests supply
//! scripted engines.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::EngineConfig;
use crate::error::DriverResult;
use crate::session::Session;

/// Creates a fresh, ready session
pub type Spawner = Box<dyn Fn() -> DriverResult<Session> + Send + Sync>;

/// A cached session and the file version it has consulted
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub session: Arc<Session>,

    /// Modification time of the file at the last successful load
    pub modified: SystemTime,

    /// Number of re-consults after the first load
    pub reloads: usize,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Lookups answered by a cached session without reloading
    pub hits: usize,

    /// Lookups that started a new session
    pub misses: usize,

    /// Lookups that re-consulted a changed file
    pub reloads: usize,

    /// Cached sessions found closed and replaced
    pub respawns: usize,
}

/// Path → session map with modification-time invalidation
pub struct SessionCache {
    spawner: Spawner,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    stats: Mutex<CacheStats>,
}

impl SessionCache {
    /// Cache whose sessions run the configured engine.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_spawner(move || Session::spawn_with(&config))
    }

    pub fn with_spawner(
        spawner: impl Fn() -> DriverResult<Session> + Send + Sync + 'static,
    ) -> Self {
        SessionCache {
            spawner: Box::new(spawner),
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Session with `path` consulted, loading or reloading as needed.
    ///
    /// A failed first load discards the new session. A failed reload keeps
    /// the cached session, so the next lookup tries again.
    pub fn load_file(&self, path: impl AsRef<Path>) -> DriverResult<Arc<Session>> {
        let key = fs::canonicalize(path.as_ref())?;
        let modified = fs::metadata(&key)?.modified()?;

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            if !entry.session.is_closed() {
                if entry.modified < modified {
                    tracing::info!(path = %key.display(), "cache_reload");
                    entry.session.load(&key)?;
                    entry.modified = modified;
                    entry.reloads += 1;
                    self.stats.lock().reloads += 1;
                } else {
                    self.stats.lock().hits += 1;
                }
                return Ok(Arc::clone(&entry.session));
            }

            tracing::info!(path = %key.display(), "cache_respawn");
            entries.remove(&key);
            self.stats.lock().respawns += 1;
        }

        let session = (self.spawner)()?;
        if let Err(e) = session.load(&key) {
            session.close();
            return Err(e);
        }

        let session = Arc::new(session);
        entries.insert(
            key,
            CacheEntry {
                session: Arc::clone(&session),
                modified,
                reloads: 0,
            },
        );
        self.stats.lock().misses += 1;
        Ok(session)
    }

    /// Drop the entry for `path`, returning its session.
    pub fn evict(&self, path: impl AsRef<Path>) -> Option<Arc<Session>> {
        let path = path.as_ref();
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.entries.lock().remove(&key).map(|entry| entry.session)
    }

    /// Close and drop every cached session.
    pub fn clear(&self) {
        let drained: Vec<CacheEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.session.close();
        }
    }

    /// Snapshot of the entry for `path`
    pub fn entry(&self, path: impl AsRef<Path>) -> Option<CacheEntry> {
        let key = fs::canonicalize(path.as_ref()).ok()?;
        self.entries.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::transport::ScriptedTransport;

    fn scripted_cache() -> SessionCache {
        SessionCache::with_spawner(|| {
            let config = EngineConfig {
                read_timeout_ms: 20,
                ..EngineConfig::default()
            };
            let transport = ScriptedTransport::new()
                .greeting("?- ")
                .reply(&["   true.\n?- "])
                .reply(&["   true.\n?- "]);
            Session::with_transport(transport, &config)
        })
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let cache = scripted_cache();
        let err = cache.load_file("/definitely/not/here.pl").unwrap_err();
        assert!(matches!(err, DriverError::Io(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.pl");
        fs::write(&path, "a.\n").unwrap();

        let cache = scripted_cache();
        let session = cache.load_file(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entry(&path).unwrap().reloads, 0);

        let evicted = cache.evict(&path).unwrap();
        assert!(Arc::ptr_eq(&session, &evicted));
        assert!(cache.is_empty());

        cache.load_file(&path).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 2);
    }
}
