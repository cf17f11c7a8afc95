//! Bucket storage trait with in-memory and on-disk implementations.
//!
//! A bucket maps request identity to a response snapshot. Individual
//! operations are atomic with respect to each other; `populate` writes a
//! whole set of entries in one step so an install either lands completely or
//! not at all. `populate` is also the only operation that creates a bucket.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::StorageError;
use super::request::{RequestKey, ResponseSnapshot};

/// Extension of bucket files in a [`DiskStorage`] directory
const BUCKET_EXT: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub key: RequestKey,
    pub response: ResponseSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    /// Keyed by the `Display` form of [`RequestKey`]
    pub entries: BTreeMap<String, CachedEntry>,
}

impl Bucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }
    }

    fn get(&self, key: &RequestKey) -> Option<&ResponseSnapshot> {
        self.entries.get(&key.to_string()).map(|e| &e.response)
    }

    fn put(&mut self, key: RequestKey, response: ResponseSnapshot) {
        self.entries
            .insert(key.to_string(), CachedEntry { key, response });
    }

    fn insert_new(&mut self, key: &RequestKey, response: ResponseSnapshot) -> bool {
        let id = key.to_string();
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(
            id,
            CachedEntry {
                key: key.clone(),
                response,
            },
        );
        true
    }
}

/// Bucket names double as file names, so only `[A-Za-z0-9._-]` is accepted
/// and a leading dot is not.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Summary of one bucket for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub entries: usize,
    pub created_at: DateTime<Utc>,
}

/// Trait for bucket storage backends.
pub trait CacheStorage: Send + Sync {
    /// Bucket names in creation order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.keys()?.iter().any(|k| k == name))
    }

    /// Remove a bucket. Returns whether it existed.
    fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// Open (or create) `name` and write every entry in a single step.
    fn populate(
        &self,
        name: &str,
        entries: Vec<(RequestKey, ResponseSnapshot)>,
    ) -> Result<(), StorageError>;

    fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>, StorageError>;

    /// Add an entry to an existing bucket unless one already exists for
    /// `key`. A missing bucket is left missing. Returns whether the entry was
    /// written.
    fn insert_new(
        &self,
        name: &str,
        key: &RequestKey,
        response: ResponseSnapshot,
    ) -> Result<bool, StorageError>;

    fn info(&self, name: &str) -> Result<Option<BucketInfo>, StorageError>;
}

// ============================================================================
// In-memory storage
// ============================================================================

/// Storage held entirely in memory. Used for tests and simulations.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<Vec<CachedData<Bucket>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, Vec<CachedData<Bucket>>>, StorageError> {
        self.buckets.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Vec<CachedData<Bucket>>>, StorageError> {
        self.buckets.write().map_err(|_| StorageError::Poisoned)
    }

    fn open<'a>(buckets: &'a mut Vec<CachedData<Bucket>>, name: &str) -> &'a mut Bucket {
        let index = match buckets.iter().position(|b| b.data.name == name) {
            Some(index) => index,
            None => {
                buckets.push(CachedData::new(Bucket::new(name)));
                buckets.len() - 1
            }
        };
        &mut buckets[index].data
    }
}

impl CacheStorage for MemoryStorage {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read()?.iter().map(|b| b.data.name.clone()).collect())
    }

    fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut buckets = self.write()?;
        let before = buckets.len();
        buckets.retain(|b| b.data.name != name);
        Ok(buckets.len() != before)
    }

    fn populate(
        &self,
        name: &str,
        entries: Vec<(RequestKey, ResponseSnapshot)>,
    ) -> Result<(), StorageError> {
        validate_name(name)?;
        let mut buckets = self.write()?;
        let bucket = Self::open(&mut buckets, name);
        for (key, response) in entries {
            bucket.put(key, response);
        }
        Ok(())
    }

    fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>, StorageError> {
        let buckets = self.read()?;
        Ok(buckets
            .iter()
            .find(|b| b.data.name == name)
            .and_then(|b| b.data.get(key).cloned()))
    }

    fn insert_new(
        &self,
        name: &str,
        key: &RequestKey,
        response: ResponseSnapshot,
    ) -> Result<bool, StorageError> {
        let mut buckets = self.write()?;
        Ok(buckets
            .iter_mut()
            .find(|b| b.data.name == name)
            .map(|b| b.data.insert_new(key, response))
            .unwrap_or(false))
    }

    fn info(&self, name: &str) -> Result<Option<BucketInfo>, StorageError> {
        let buckets = self.read()?;
        Ok(buckets
            .iter()
            .find(|b| b.data.name == name)
            .map(|b| BucketInfo {
                name: b.data.name.clone(),
                entries: b.data.entries.len(),
                created_at: b.cached_at,
            }))
    }
}

// ============================================================================
// On-disk storage
// ============================================================================

/// One JSON document per bucket inside a directory.
pub struct DiskStorage {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on bucket files
    write_lock: Mutex<()>,
}

impl DiskStorage {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn bucket_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, BUCKET_EXT)))
    }

    fn load(&self, path: &Path) -> Result<Option<CachedData<Bucket>>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let bucket: CachedData<Bucket> =
            serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
                name: path.display().to_string(),
                source,
            })?;
        Ok(Some(bucket))
    }

    fn load_bucket(&self, name: &str) -> Result<Option<CachedData<Bucket>>, StorageError> {
        self.load(&self.bucket_path(name)?)
    }

    /// Write via a temp file and rename so readers never see a partial bucket.
    fn save(&self, name: &str, bucket: &CachedData<Bucket>) -> Result<(), StorageError> {
        let path = self.bucket_path(name)?;
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string(bucket)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), entries = bucket.data.entries.len(), "Wrote bucket");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        self.write_lock.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl CacheStorage for DiskStorage {
    /// Names come from file stems, so a bucket file that no longer parses is
    /// still listed (ahead of readable ones) and can be deleted.
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut found: Vec<(Option<DateTime<Utc>>, String)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_name(name).is_err() {
                continue;
            }
            let created_at = match self.load(&path) {
                Ok(bucket) => bucket.map(|b| b.cached_at),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable bucket");
                    None
                }
            };
            found.push((created_at, name.to_string()));
        }
        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.bucket_path(name)?.exists())
    }

    fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let _guard = self.lock()?;
        let path = self.bucket_path(name)?;
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn populate(
        &self,
        name: &str,
        entries: Vec<(RequestKey, ResponseSnapshot)>,
    ) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        let mut bucket = match self.load_bucket(name) {
            Ok(Some(bucket)) => bucket,
            Ok(None) => CachedData::new(Bucket::new(name)),
            Err(StorageError::Corrupt { .. }) => {
                warn!(cache = name, "Replacing unreadable bucket");
                CachedData::new(Bucket::new(name))
            }
            Err(e) => return Err(e),
        };
        for (key, response) in entries {
            bucket.data.put(key, response);
        }
        self.save(name, &bucket)
    }

    fn lookup(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>, StorageError> {
        Ok(self
            .load_bucket(name)?
            .and_then(|b| b.data.get(key).cloned()))
    }

    fn insert_new(
        &self,
        name: &str,
        key: &RequestKey,
        response: ResponseSnapshot,
    ) -> Result<bool, StorageError> {
        let _guard = self.lock()?;
        let Some(mut bucket) = self.load_bucket(name)? else {
            return Ok(false);
        };
        if !bucket.data.insert_new(key, response) {
            return Ok(false);
        }
        self.save(name, &bucket)?;
        Ok(true)
    }

    fn info(&self, name: &str) -> Result<Option<BucketInfo>, StorageError> {
        Ok(self.load_bucket(name)?.map(|b| BucketInfo {
            name: name.to_string(),
            entries: b.data.entries.len(),
            created_at: b.cached_at,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
