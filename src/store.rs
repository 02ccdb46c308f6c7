//! Durable key to bytes storage backing the counters.
//!
//! Keys are flat: every key maps to exactly one file directly under the base
//! directory of a [`DiskStore`], named after the key with no transformation.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use lru::LruCache;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("io error")]
    Io(#[from] io::Error),
}

/// A durable mapping from flat string keys to byte sequences.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).write(key, value)
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    // Dot files are reserved for in-progress writes
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains(|c| c == '/' || c == '\\' || c == '\0');

    if invalid {
        Err(StoreError::InvalidKey(key.to_owned()))
    } else {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stores each key as a file under `base_path`, with a bounded read cache.
///
/// Reads and writes hold the cache lock across the file access, so a reader
/// never caches a value that a concurrent write already replaced. Values are
/// written to a temporary file and renamed over the key, so the key file
/// always holds a complete value.
pub struct DiskStore {
    base_path: PathBuf,
    cache: Mutex<ReadCache>,
}

impl DiskStore {
    pub const DEFAULT_CACHE_SIZE_MAX: usize = 1024 * 1024;

    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_cache_size(base_path, Self::DEFAULT_CACHE_SIZE_MAX)
    }

    pub fn with_cache_size(base_path: impl Into<PathBuf>, cache_size_max: usize) -> Self {
        Self {
            base_path: base_path.into(),
            cache: Mutex::new(ReadCache::new(cache_size_max)),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

impl KeyValueStore for DiskStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        let mut cache = lock(&self.cache);

        if let Some(value) = cache.get(key) {
            return Ok(value);
        }

        let value = match fs::read(&path) {
            Ok(value) => value,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_owned()))
            }
            Err(err) => return Err(err.into()),
        };

        cache.insert(key, &value);
        Ok(value)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp_path = self.base_path.join(format!(".{key}.tmp"));
        let mut cache = lock(&self.cache);

        fs::create_dir_all(&self.base_path)?;
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, &path)?;

        cache.remove(key);
        Ok(())
    }
}

/// LRU cache bounded by the total size of the values it holds.
struct ReadCache {
    entries: LruCache<String, Vec<u8>>,
    size: usize,
    size_max: usize,
}

impl ReadCache {
    fn new(size_max: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            size: 0,
            size_max,
        }
    }

    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: &str, value: &[u8]) {
        self.remove(key);

        if value.len() > self.size_max {
            return;
        }

        while self.size + value.len() > self.size_max {
            match self.entries.pop_lru() {
                Some((_, old)) => self.size -= old.len(),
                None => break,
            }
        }

        self.size += value.len();
        self.entries.put(key.to_owned(), value.to_vec());
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.entries.pop(key) {
            self.size -= old.len();
        }
    }
}

/// Keeps everything in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore(Mutex<HashMap<String, Vec<u8>>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_key(key)?;
        lock(&self.0)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        lock(&self.0).insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    use super::*;

    #[test]
    fn disk_store_writes_one_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("data-dir"));

        store.write("positive", b"42").unwrap();

        let raw = fs::read(dir.path().join("data-dir").join("positive")).unwrap();
        assert_eq!(raw, b"42");
        assert_eq!(store.read("positive").unwrap(), b"42");
    }

    #[test]
    fn disk_store_reports_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        assert!(matches!(
            store.read("negative"),
            Err(StoreError::NotFound(key)) if key == "negative"
        ));
    }

    #[test]
    fn disk_store_rejects_hierarchical_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        for key in ["", ".", "..", ".hidden", "a/b", "../escape", "a\\b"] {
            assert!(
                matches!(store.write(key, b"1"), Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn writes_bust_the_read_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        store.write("positive", b"1").unwrap();
        assert_eq!(store.read("positive").unwrap(), b"1");

        store.write("positive", b"2").unwrap();
        assert_eq!(store.read("positive").unwrap(), b"2");
    }

    #[test]
    fn disk_store_works_without_a_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::with_cache_size(dir.path(), 0);

        store.write("negative", b"7").unwrap();
        assert_eq!(store.read("negative").unwrap(), b"7");
        assert_eq!(lock(&store.cache).size, 0);
    }

    #[test]
    fn read_cache_evicts_least_recently_used() {
        let mut cache = ReadCache::new(4);

        cache.insert("a", b"12");
        cache.insert("b", b"34");
        assert!(cache.get("a").is_some());
        cache.insert("c", b"56");

        assert_eq!(cache.size, 4);
        assert_eq!(cache.get("a"), Some(b"12".to_vec()));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(b"56".to_vec()));
    }

    #[test]
    fn read_cache_skips_oversized_values() {
        let mut cache = ReadCache::new(4);

        cache.insert("a", b"12");
        cache.insert("a", b"123456");

        assert_eq!(cache.size, 0);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn disk_store_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        store.write("positive", b"1").unwrap();
        store.write("positive", b"2").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["positive"]);
        assert!(matches!(
            store.write(".positive.tmp", b"1"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    fn readers_see_complete_values(cache_size_max: usize) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskStore::with_cache_size(dir.path(), cache_size_max));
        store.write("positive", b"1000").unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut last = 1000;
                    while !done.load(Ordering::SeqCst) {
                        let raw = store.read("positive").unwrap();
                        let value: u64 = std::str::from_utf8(&raw).unwrap().parse().unwrap();
                        assert!(value >= last, "read {value} after {last}");
                        last = value;
                    }
                })
            })
            .collect();

        for value in 1001..=3000_u64 {
            store.write("positive", value.to_string().as_bytes()).unwrap();
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.read("positive").unwrap(), b"3000");
        assert_eq!(fs::read(dir.path().join("positive")).unwrap(), b"3000");
    }

    #[test]
    fn concurrent_reads_never_see_partial_or_stale_values() {
        readers_see_complete_values(0);
        readers_see_complete_values(DiskStore::DEFAULT_CACHE_SIZE_MAX);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();

        assert!(matches!(store.read("k"), Err(StoreError::NotFound(_))));
        store.write("k", b"v").unwrap();
        assert_eq!(store.read("k").unwrap(), b"v");
    }
}
