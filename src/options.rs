use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};

use crate::db::DbPool;
use crate::models::option::SiteOption;

/// Option lookups with an in-process cache and a JSON snapshot on disk.
///
/// The first read loads every option row into memory; writes go through to
/// the database, refresh the cache, and rewrite the snapshot. The snapshot
/// is a plain key/value JSON object that external tooling can read without
/// opening the database.
pub struct Options {
    pool: DbPool,
    snapshot_path: PathBuf,
    cache: Mutex<Option<HashMap<String, String>>>,
}

impl Options {
    pub fn new(pool: DbPool, snapshot_path: PathBuf) -> Self {
        Options {
            pool,
            snapshot_path,
            cache: Mutex::new(None),
        }
    }

    fn with_cache<T>(&self, f: impl FnOnce(&HashMap<String, String>) -> T) -> T {
        let mut guard = match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_none() {
            let mut map = HashMap::new();
            for opt in SiteOption::all(&self.pool) {
                if let Some(value) = opt.value {
                    map.insert(opt.key, value);
                }
            }
            debug!("Loaded {} options into cache", map.len());
            *guard = Some(map);
        }
        match guard.as_ref() {
            Some(map) => f(map),
            None => f(&HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.with_cache(|map| map.get(key).cloned())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => v == "1" || v == "true",
            None => default,
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), String> {
        SiteOption::set(&self.pool, key, value)?;

        let mut guard = match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(map) = guard.as_mut() {
            map.insert(key.to_string(), value.to_string());
        }
        drop(guard);

        self.write_snapshot();
        Ok(())
    }

    /// Drop the in-memory cache; the next read reloads from the database.
    pub fn invalidate(&self) {
        let mut guard = match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    /// Dump the current option map to the snapshot file. Failures are
    /// logged and ignored; the snapshot is a convenience, not a store.
    pub fn write_snapshot(&self) {
        let json = self.with_cache(|map| serde_json::to_string_pretty(map));
        let json = match json {
            Ok(j) => j,
            Err(e) => {
                warn!("Could not serialize options snapshot: {}", e);
                return;
            }
        };
        if let Some(parent) = self.snapshot_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Could not create {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = fs::write(&self.snapshot_path, json) {
            warn!("Could not write {}: {}", self.snapshot_path.display(), e);
        }
    }
}
