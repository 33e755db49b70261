//! SQLite-backed persistent cache tier
//!
//! Values are stored as opaque JSON blobs. Descriptive metadata (origin
//! path, file count, total size) lives in its own columns so statistics
//! never have to deserialize a payload.

use crate::error::{CacheError, CacheResult};
use crate::scan_cache::memory::TierCounters;
use crate::scan_cache::CacheKey;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const SCHEMA_VERSION: i32 = 1;
const DB_FILE: &str = "cache.db";

/// Descriptive data stored next to a payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub origin_path: String,
    pub file_count: u64,
    pub total_size: u64,
}

/// Persistent tier statistics, answered from metadata columns only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistentStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl: Duration,
    pub total_entries: u64,
    pub total_files_cached: u64,
    pub total_size_cached: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub cache_file_size: u64,
}

/// Durable key/blob store surviving restarts
pub struct PersistentCache {
    db: Mutex<Connection>,
    db_path: PathBuf,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    closed: bool,
}

impl PersistentCache {
    /// Open or create `cache.db` under `cache_dir`
    pub fn open(cache_dir: &Path, ttl: Duration) -> CacheResult<Self> {
        std::fs::create_dir_all(cache_dir)?;
        let db_path = cache_dir.join(DB_FILE);

        let db = match connect(&db_path).and_then(|mut db| init_schema(&mut db).map(|_| db)) {
            Ok(db) => db,
            Err(e) => {
                warn!(
                    "Failed to initialize cache store at {}: {}. Recreating it",
                    db_path.display(),
                    e
                );
                let backup_path = db_path.with_extension("db.backup");
                let _ = std::fs::copy(&db_path, &backup_path);
                let _ = std::fs::remove_file(&db_path);
                let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
                let _ = std::fs::remove_file(db_path.with_extension("db-shm"));

                let mut db = connect(&db_path)?;
                init_schema(&mut db)?;
                db
            }
        };

        debug!("Opened persistent cache at {}", db_path.display());
        Ok(Self {
            db: Mutex::new(db),
            db_path,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            closed: false,
        })
    }

    /// Fetch and deserialize a live entry
    ///
    /// Expired and undecodable entries are deleted and reported as misses.
    pub fn get<V: DeserializeOwned>(&self, key: &CacheKey) -> Option<V> {
        let row: rusqlite::Result<Option<(Vec<u8>, i64)>> = self
            .db
            .lock()
            .query_row(
                "SELECT value, inserted_at FROM file_cache WHERE key = ?1",
                [key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional();

        let (blob, inserted_at) = match row {
            Ok(Some(row)) => row,
            Ok(None) => return self.miss(),
            Err(e) => {
                warn!("Persistent cache lookup failed for {}: {}", key, e);
                return self.miss();
            }
        };

        if self.is_expired(inserted_at) {
            debug!("Persistent entry {} expired", key);
            self.delete_quietly(key);
            return self.miss();
        }

        match serde_json::from_slice(&blob) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                warn!("Discarding corrupt cache entry {}: {}", key, e);
                self.delete_quietly(key);
                self.miss()
            }
        }
    }

    /// Store a value with its metadata, replacing any previous entry
    pub fn set<V: Serialize>(
        &self,
        key: &CacheKey,
        value: &V,
        metadata: &EntryMetadata,
    ) -> CacheResult<()> {
        let blob = serde_json::to_vec(value).map_err(|e| CacheError::write(key.as_str(), e))?;

        self.db
            .lock()
            .execute(
                "INSERT OR REPLACE INTO file_cache
                 (key, value, inserted_at, origin_path, file_count, total_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.as_str(),
                    blob,
                    now_millis(),
                    metadata.origin_path,
                    clamp_i64(metadata.file_count),
                    clamp_i64(metadata.total_size),
                ],
            )
            .map_err(|e| CacheError::write(key.as_str(), e))?;
        Ok(())
    }

    /// Stored metadata for a key, regardless of expiry
    pub fn metadata(&self, key: &CacheKey) -> CacheResult<Option<EntryMetadata>> {
        let metadata = self
            .db
            .lock()
            .query_row(
                "SELECT origin_path, file_count, total_size FROM file_cache WHERE key = ?1",
                [key.as_str()],
                |row| {
                    Ok(EntryMetadata {
                        origin_path: row.get(0)?,
                        file_count: row.get::<_, i64>(1)?.max(0) as u64,
                        total_size: row.get::<_, i64>(2)?.max(0) as u64,
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }

    pub fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let deleted = self
            .db
            .lock()
            .execute("DELETE FROM file_cache WHERE key = ?1", [key.as_str()])?;
        Ok(deleted > 0)
    }

    /// Remove every entry and reset the counters
    pub fn clear(&self) -> CacheResult<usize> {
        let deleted = self.db.lock().execute("DELETE FROM file_cache", [])?;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(deleted)
    }

    /// Bulk delete of entries older than the TTL
    pub fn cleanup_expired(&self) -> CacheResult<usize> {
        let cutoff = now_millis() - ttl_millis(self.ttl);
        let deleted = self
            .db
            .lock()
            .execute("DELETE FROM file_cache WHERE inserted_at < ?1", [cutoff])?;
        Ok(deleted)
    }

    pub fn counters(&self) -> TierCounters {
        TierCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn stats(&self) -> CacheResult<PersistentStats> {
        let (total_entries, total_files, total_size, oldest, newest) = self.db.lock().query_row(
            "SELECT COUNT(*), COALESCE(SUM(file_count), 0), COALESCE(SUM(total_size), 0),
                    MIN(inserted_at), MAX(inserted_at)
             FROM file_cache",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            },
        )?;

        let counters = self.counters();
        Ok(PersistentStats {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate: counters.hit_rate(),
            ttl: self.ttl,
            total_entries: total_entries.max(0) as u64,
            total_files_cached: total_files.max(0) as u64,
            total_size_cached: total_size.max(0) as u64,
            oldest_entry: oldest.and_then(DateTime::from_timestamp_millis),
            newest_entry: newest.and_then(DateTime::from_timestamp_millis),
            cache_file_size: std::fs::metadata(&self.db_path)
                .map(|m| m.len())
                .unwrap_or(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Run the final cleanup pass now and release the store
    pub fn shutdown(mut self) -> CacheResult<usize> {
        self.closed = true;
        self.cleanup_expired()
    }

    fn is_expired(&self, inserted_at: i64) -> bool {
        now_millis() - inserted_at > ttl_millis(self.ttl)
    }

    fn miss<V>(&self) -> Option<V> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn delete_quietly(&self, key: &CacheKey) {
        if let Err(e) = self.delete(key) {
            warn!("Failed to delete cache entry {}: {}", key, e);
        }
    }
}

impl Drop for PersistentCache {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.cleanup_expired() {
            Ok(0) => {}
            Ok(n) => debug!("Removed {} expired entries on shutdown", n),
            Err(e) => warn!("Final cache cleanup failed: {}", e),
        }
    }
}

fn connect(db_path: &Path) -> CacheResult<Connection> {
    let db = Connection::open(db_path)?;
    // WAL lets readers proceed while another process writes
    db.pragma_update(None, "journal_mode", "WAL")?;
    db.busy_timeout(Duration::from_secs(30))?;
    Ok(db)
}

fn init_schema(db: &mut Connection) -> CacheResult<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let version: Option<i32> = db
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    let version = match version {
        Some(version) => version,
        None => {
            db.execute("INSERT INTO schema_version (version) VALUES (0)", [])?;
            0
        }
    };

    if version < SCHEMA_VERSION {
        migrate_schema(db, version)?;
    }
    Ok(())
}

fn migrate_schema(db: &mut Connection, from_version: i32) -> CacheResult<()> {
    let tx = db.transaction()?;

    if from_version == 0 {
        tx.execute(
            "CREATE TABLE IF NOT EXISTS file_cache (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                inserted_at INTEGER NOT NULL,
                origin_path TEXT NOT NULL,
                file_count INTEGER NOT NULL,
                total_size INTEGER NOT NULL
            )",
            [],
        )?;
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_inserted_at ON file_cache(inserted_at)",
            [],
        )?;
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_origin_path ON file_cache(origin_path)",
            [],
        )?;
        tx.execute("UPDATE schema_version SET version = ?1", [SCHEMA_VERSION])?;
    }

    tx.commit()?;
    Ok(())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// SQLite integers are signed 64-bit
fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn setup_test_cache(ttl: Duration) -> (TempDir, PersistentCache) {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), ttl).unwrap();
        (temp_dir, cache)
    }

    fn meta(count: u64, size: u64) -> EntryMetadata {
        EntryMetadata {
            origin_path: "/data".to_string(),
            file_count: count,
            total_size: size,
        }
    }

    #[test]
    fn test_open_cache() {
        let (temp_dir, cache) = setup_test_cache(Duration::from_secs(60));
        assert_eq!(cache.path(), temp_dir.path().join("cache.db"));
        assert!(cache.path().exists());
    }

    #[test]
    fn test_set_then_get() {
        let (_temp_dir, cache) = setup_test_cache(Duration::from_secs(60));
        let key = CacheKey::from_raw("k1");
        let value = vec!["/data/a.txt".to_string(), "/data/b.txt".to_string()];

        cache.set(&key, &value, &meta(2, 30)).unwrap();
        assert_eq!(cache.get::<Vec<String>>(&key), Some(value));
        assert_eq!(cache.get::<Vec<String>>(&CacheKey::from_raw("nope")), None);
        assert_eq!(cache.counters(), TierCounters { hits: 1, misses: 1 });
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = CacheKey::from_raw("k1");
        {
            let cache = PersistentCache::open(temp_dir.path(), Duration::from_secs(60)).unwrap();
            cache.set(&key, &vec![1u32, 2, 3], &meta(3, 0)).unwrap();
        }

        let cache = PersistentCache::open(temp_dir.path(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get::<Vec<u32>>(&key), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_expired_entry_is_deleted() {
        let (_temp_dir, cache) = setup_test_cache(Duration::from_millis(50));
        let key = CacheKey::from_raw("k1");
        cache.set(&key, &"v", &meta(1, 1)).unwrap();
        thread::sleep(Duration::from_millis(120));

        assert_eq!(cache.get::<String>(&key), None);
        assert_eq!(cache.metadata(&key).unwrap(), None);
        assert_eq!(cache.counters().misses, 1);
    }

    #[test]
    fn test_corrupt_entry_self_heals() {
        let (_temp_dir, cache) = setup_test_cache(Duration::from_secs(60));
        let key = CacheKey::from_raw("k1");
        cache.set(&key, &"not a list", &meta(0, 0)).unwrap();

        assert_eq!(cache.get::<Vec<String>>(&key), None);
        assert_eq!(cache.metadata(&key).unwrap(), None);

        cache.set(&key, &vec!["ok".to_string()], &meta(1, 0)).unwrap();
        cache
            .db
            .lock()
            .execute("UPDATE file_cache SET value = x'00ff' WHERE key = 'k1'", [])
            .unwrap();
        assert_eq!(cache.get::<Vec<String>>(&key), None);
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_cleanup_expired_bulk_delete() {
        let (_temp_dir, cache) = setup_test_cache(Duration::from_millis(50));
        cache.set(&CacheKey::from_raw("a"), &1, &meta(1, 1)).unwrap();
        cache.set(&CacheKey::from_raw("b"), &2, &meta(1, 1)).unwrap();
        thread::sleep(Duration::from_millis(120));
        cache.set(&CacheKey::from_raw("c"), &3, &meta(1, 1)).unwrap();

        assert_eq!(cache.cleanup_expired().unwrap(), 2);
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_stats_from_metadata() {
        let (_temp_dir, cache) = setup_test_cache(Duration::from_secs(60));
        cache.set(&CacheKey::from_raw("a"), &0, &meta(10, 1000)).unwrap();
        cache.set(&CacheKey::from_raw("b"), &0, &meta(5, 24)).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_files_cached, 15);
        assert_eq!(stats.total_size_cached, 1024);
        assert!(stats.oldest_entry.is_some());
        assert!(stats.oldest_entry <= stats.newest_entry);
        assert!(stats.cache_file_size > 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let (_temp_dir, cache) = setup_test_cache(Duration::from_secs(60));
        let key = CacheKey::from_raw("a");
        cache.set(&key, &1, &meta(1, 1)).unwrap();
        cache.set(&CacheKey::from_raw("b"), &2, &meta(1, 1)).unwrap();

        assert!(cache.delete(&key).unwrap());
        assert!(!cache.delete(&key).unwrap());
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.counters(), TierCounters::default());
    }

    #[test]
    fn test_shutdown_runs_final_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), Duration::from_millis(20)).unwrap();
        cache.set(&CacheKey::from_raw("a"), &1, &meta(1, 1)).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.shutdown().unwrap(), 1);
    }

    #[test]
    fn test_garbage_store_file_is_recreated() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("cache.db"), b"this is not sqlite at all").unwrap();

        let cache = PersistentCache::open(temp_dir.path(), Duration::from_secs(60)).unwrap();
        let key = CacheKey::from_raw("a");
        cache.set(&key, &1, &meta(1, 1)).unwrap();
        assert_eq!(cache.get::<i32>(&key), Some(1));
        assert!(temp_dir.path().join("cache.db.backup").exists());
    }
}
