//! Content-addressed tracking of external input files.
//!
//! Jobs must process data as it existed at tracking time, not whatever is
//! at the original path when processing finally runs. Every referenced
//! file is hashed and copied into the store; the copy is refreshed only
//! when the source content diverges from the recorded hash.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::TrackError;
use crate::logging::redact_path;

const INDEX_FILENAME: &str = "index.json";

/// One external file that has been content-addressed into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Stable id derived from the original path, not the content.
    pub file_id: String,
    pub original_path: PathBuf,
    /// SHA-256 of the file content, lowercase hex.
    pub content_hash: String,
    /// Cached copy inside the store, byte-identical to the original at
    /// the moment of the last refresh.
    pub local_path: PathBuf,
    pub file_size: u64,
    /// Source mtime at last refresh. Fast-path hint only, never trusted
    /// as proof of equality.
    pub source_modified: Option<DateTime<Utc>>,
    pub last_refreshed: DateTime<Utc>,
}

pub struct FileStore {
    storage_dir: PathBuf,
    index: Mutex<HashMap<String, TrackedFile>>,
}

impl FileStore {
    /// Opens (or initializes) a store rooted at `storage_dir`, loading the
    /// persisted index if one exists.
    pub fn open<P: AsRef<Path>>(storage_dir: P) -> Result<Self, TrackError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir).map_err(|e| TrackError::StoreWrite {
            path: storage_dir.clone(),
            source: e,
        })?;

        let index_path = storage_dir.join(INDEX_FILENAME);
        let index = if index_path.is_file() {
            let content =
                std::fs::read_to_string(&index_path).map_err(|e| TrackError::ReadSource {
                    path: index_path.clone(),
                    source: e,
                })?;
            serde_json::from_str(&content)
                .map_err(|e| TrackError::IndexWrite(format!("corrupt index: {}", e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            storage_dir,
            index: Mutex::new(index),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Ensures the store holds a current copy of `original_path` and
    /// returns its record.
    ///
    /// Unchanged files (same hash) are not re-copied; a changed mtime or
    /// size only forces a re-hash, never by itself a re-copy.
    pub fn track<P: AsRef<Path>>(&self, original_path: P) -> Result<TrackedFile, TrackError> {
        let original_path = original_path.as_ref();

        let metadata = std::fs::metadata(original_path).map_err(|_| TrackError::SourceNotFound {
            path: original_path.to_path_buf(),
        })?;
        if !metadata.is_file() {
            return Err(TrackError::SourceNotFound {
                path: original_path.to_path_buf(),
            });
        }

        let file_id = path_id(original_path);
        let source_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        {
            let index = self
                .index
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(entry) = index.get(&file_id) {
                let hints_match = entry.file_size == metadata.len()
                    && entry.source_modified == source_modified
                    && entry.source_modified.is_some();
                if hints_match && entry.local_path.is_file() {
                    debug!(file = %redact_path(original_path), "tracked file unchanged (fast path)");
                    return Ok(entry.clone());
                }
            }
        }

        let content_hash = hash_file(original_path)?;

        let mut index = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(entry) = index.get(&file_id) {
            if entry.content_hash == content_hash && entry.local_path.is_file() {
                // Content identical, only the hints were stale.
                let mut refreshed = entry.clone();
                refreshed.file_size = metadata.len();
                refreshed.source_modified = source_modified;
                refreshed.last_refreshed = Utc::now();
                index.insert(file_id.clone(), refreshed.clone());
                self.persist_index(&index)?;
                debug!(file = %redact_path(original_path), "tracked file unchanged (hash verified)");
                return Ok(refreshed);
            }
        }

        // Content diverged (or first sighting): copy into the store.
        let local_path = self.cache_copy(original_path, &file_id, &content_hash)?;

        let entry = TrackedFile {
            file_id: file_id.clone(),
            original_path: original_path.to_path_buf(),
            content_hash,
            local_path,
            file_size: metadata.len(),
            source_modified,
            last_refreshed: Utc::now(),
        };
        index.insert(file_id, entry.clone());
        self.persist_index(&index)?;

        info!(
            file = %redact_path(original_path),
            hash = %&entry.content_hash[..12],
            "tracked file refreshed"
        );
        Ok(entry)
    }

    /// Returns the current record for a path without refreshing it.
    pub fn get<P: AsRef<Path>>(&self, original_path: P) -> Option<TrackedFile> {
        let index = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        index.get(&path_id(original_path.as_ref())).cloned()
    }

    /// True when the source at `original_path` no longer matches its
    /// tracked copy (missing entries also count as stale).
    pub fn is_stale<P: AsRef<Path>>(&self, original_path: P) -> Result<bool, TrackError> {
        let original_path = original_path.as_ref();
        let entry = match self.get(original_path) {
            Some(entry) => entry,
            None => return Ok(true),
        };

        let metadata = std::fs::metadata(original_path).map_err(|_| TrackError::SourceNotFound {
            path: original_path.to_path_buf(),
        })?;
        let source_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        if entry.file_size == metadata.len()
            && entry.source_modified == source_modified
            && entry.source_modified.is_some()
        {
            return Ok(false);
        }

        Ok(hash_file(original_path)? != entry.content_hash)
    }

    /// Drops every entry whose file id is not in `referenced`, removing
    /// the cached copies from disk. Returns the number of entries swept.
    pub fn cleanup_orphaned(&self, referenced: &[String]) -> Result<usize, TrackError> {
        let mut index = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let orphaned: Vec<String> = index
            .keys()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect();

        let mut reclaimed: u64 = 0;
        for id in &orphaned {
            if let Some(entry) = index.remove(id) {
                let dir = self.storage_dir.join(&entry.file_id);
                if dir.is_dir() {
                    reclaimed += dir_size(&dir);
                    // Best effort; a locked file must not fail the sweep.
                    let _ = std::fs::remove_dir_all(&dir);
                }
            }
        }

        if !orphaned.is_empty() {
            self.persist_index(&index)?;
            info!(
                count = orphaned.len(),
                bytes = reclaimed,
                "swept orphaned tracked files"
            );
        }
        Ok(orphaned.len())
    }

    fn cache_copy(
        &self,
        original_path: &Path,
        file_id: &str,
        content_hash: &str,
    ) -> Result<PathBuf, TrackError> {
        let dir = self.storage_dir.join(file_id);
        std::fs::create_dir_all(&dir).map_err(|e| TrackError::StoreWrite {
            path: dir.clone(),
            source: e,
        })?;

        let filename = original_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let local_path = dir.join(format!("{}_{}", &content_hash[..12], filename));

        if !local_path.is_file() {
            std::fs::copy(original_path, &local_path).map_err(|e| TrackError::StoreWrite {
                path: local_path.clone(),
                source: e,
            })?;
        }
        Ok(local_path)
    }

    fn persist_index(&self, index: &HashMap<String, TrackedFile>) -> Result<(), TrackError> {
        let index_path = self.storage_dir.join(INDEX_FILENAME);
        let tmp_path = self.storage_dir.join(format!("{}.tmp", INDEX_FILENAME));

        let content = serde_json::to_string_pretty(index)
            .map_err(|e| TrackError::IndexWrite(e.to_string()))?;
        std::fs::write(&tmp_path, content).map_err(|e| TrackError::StoreWrite {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &index_path).map_err(|e| TrackError::StoreWrite {
            path: index_path,
            source: e,
        })?;
        Ok(())
    }
}

fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}

/// Stable id for an original path, independent of the file's content.
pub fn path_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// SHA-256 of a file's content, streaming to keep memory flat on large
/// spreadsheets.
pub fn hash_file(path: &Path) -> Result<String, TrackError> {
    let mut file = std::fs::File::open(path).map_err(|e| TrackError::ReadSource {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(|e| TrackError::ReadSource {
            path: path.to_path_buf(),
            source: e,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer, lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
