//! Session cache: hits, reloads on modification, respawns.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use trealla_driver::{DriverError, EngineConfig, ScriptedTransport, Session, SessionCache};

/// Cache over scripted engines that each accept `replies` consults.
fn counting_cache(replies: &'static [&'static str]) -> (SessionCache, Arc<AtomicUsize>) {
    let spawns = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&spawns);
    let cache = SessionCache::with_spawner(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let config = EngineConfig {
            read_timeout_ms: 20,
            ..EngineConfig::default()
        };
        let mut transport = ScriptedTransport::new().greeting("?- ");
        for reply in replies {
            transport = transport.reply(&[*reply]);
        }
        Session::with_transport(transport, &config)
    });
    (cache, spawns)
}

fn write_facts(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, "parent(tom, bob).\n").unwrap();
    path
}

fn touch_forward(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
}

#[test]
fn test_unchanged_file_hits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_facts(dir.path(), "family.pl");
    let (cache, spawns) = counting_cache(&["   true.\r\n?- "]);

    let first = cache.load_file(&path).unwrap();
    let second = cache.load_file(&path).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(spawns.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_modified_file_is_reconsulted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_facts(dir.path(), "family.pl");
    let (cache, spawns) = counting_cache(&["   true.\r\n?- ", "   true.\r\n?- "]);

    let first = cache.load_file(&path).unwrap();
    touch_forward(&path);
    let second = cache.load_file(&path).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(spawns.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().reloads, 1);
    assert_eq!(cache.entry(&path).unwrap().reloads, 1);
}

#[test]
fn test_closed_session_is_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_facts(dir.path(), "family.pl");
    let (cache, spawns) = counting_cache(&["   true.\r\n?- "]);

    let first = cache.load_file(&path).unwrap();
    first.close();

    let second = cache.load_file(&path).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.is_closed());
    assert_eq!(spawns.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().respawns, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_failed_first_load_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_facts(dir.path(), "broken.pl");
    let (cache, spawns) = counting_cache(&["   error(syntax_error(x),'broken.pl':1).\r\n?- "]);

    let err = cache.load_file(&path).unwrap_err();
    assert!(matches!(err, DriverError::Consult(_)));
    assert!(cache.is_empty());

    cache.load_file(&path).unwrap_err();
    assert_eq!(spawns.load(Ordering::SeqCst), 2);
}

#[test]
fn test_paths_are_cached_separately() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_facts(dir.path(), "a.pl");
    let b = write_facts(dir.path(), "b.pl");
    let (cache, spawns) = counting_cache(&["   true.\r\n?- "]);

    let sa = cache.load_file(&a).unwrap();
    let sb = cache.load_file(&b).unwrap();
    assert!(!Arc::ptr_eq(&sa, &sb));
    assert_eq!(cache.len(), 2);
    assert_eq!(spawns.load(Ordering::SeqCst), 2);

    // Same file through a different spelling of its path
    let dotted = dir.path().join(".").join("a.pl");
    let again = cache.load_file(&dotted).unwrap();
    assert!(Arc::ptr_eq(&sa, &again));
}
