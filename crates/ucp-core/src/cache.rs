//! # File Cache
//!
//! One JSON file per key under a cache directory. Writes go to a uniquely
//! named temp file in the same directory and are renamed over the target,
//! so readers see either the previous file or the new one, never a torn
//! write. Concurrent writers are not coordinated: last rename wins.
//!
//! File names are the sanitised key plus a short digest of the raw key, and
//! the stored key is checked on read, so distinct keys never share an entry.

use crate::error::{UcpError, UcpResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A cached payload with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a key; the same key always maps to the same file
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    /// Cached entry for `key`. Missing, unreadable and unparsable files are
    /// all a miss, as is a file holding a different key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return None,
        };
        match serde_json::from_str::<CacheEntry<T>>(&content) {
            Ok(entry) if entry.key == key => Some(entry),
            Ok(entry) => {
                warn!(path = %path.display(), stored = %entry.key, "Cache file holds another key");
                None
            }
            Err(e) => {
                debug!(path = %path.display(), "Ignoring unparsable cache file: {}", e);
                None
            }
        }
    }

    /// Store `payload` under `key`, replacing any previous entry atomically
    pub fn put<T: Serialize>(&self, key: &str, payload: T, source: &str) -> UcpResult<CacheEntry<T>> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at: Utc::now(),
            source: source.to_string(),
        };
        let body = serde_json::to_vec_pretty(&entry)?;

        fs::create_dir_all(&self.dir)
            .map_err(|e| UcpError::Cache(format!("create {}: {}", self.dir.display(), e)))?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!(
            "{}.{}.tmp",
            file_stem(key),
            Uuid::new_v4().simple()
        ));

        if let Err(e) = write_file(&tmp, &body) {
            let _ = fs::remove_file(&tmp);
            return Err(UcpError::Cache(format!("write {}: {}", tmp.display(), e)));
        }

        if let Err(e) = fs::rename(&tmp, &target) {
            warn!(path = %target.display(), "Cache rename failed: {}", e);
            let _ = fs::remove_file(&tmp);
            return Err(UcpError::Cache(format!("rename to {}: {}", target.display(), e)));
        }

        debug!(key, path = %target.display(), "Cache entry written");
        Ok(entry)
    }
}

fn write_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(body)?;
    file.sync_all()
}

fn file_stem(key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{}-{}", sanitize_key(key), &digest[..12])
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
