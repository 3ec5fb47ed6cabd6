// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bucket-style object storage for enrollment material and trust anchors.
//!
//! Keys are `/`-separated paths inside one bucket. Three backends ship:
//!
//! - [`FsObjectStore`] maps the bucket onto a directory (one file per key).
//! - [`MemoryObjectStore`] keeps everything in process, for local runs and tests.
//! - [`S3ObjectStore`](super::S3ObjectStore) uses an S3 bucket.
//!
//! ## Write semantics
//!
//! - `put` replaces the object atomically (temp file + rename).
//! - `put_if_absent` publishes the object only if no object exists at the key;
//!   a concurrent writer loses with [`StorageError::AlreadyExists`]. The
//!   filesystem backend uses `link(2)` which fails atomically on an existing
//!   target; S3 uses a conditional `If-None-Match: *` upload.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Error type for object storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations
    Io(io::Error),
    /// No object at the key (or, for prefix lookups, no unique object)
    NotFound(String),
    /// Object already exists (create-if-absent lost)
    AlreadyExists(String),
    /// Key is not a valid bucket path
    InvalidKey(String),
    /// Stored bytes could not be decoded
    Corrupted(String),
    /// Remote store refused the request (permissions, missing bucket)
    Backend(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::NotFound(key) => write!(f, "Not found: {key}"),
            StorageError::AlreadyExists(key) => write!(f, "Already exists: {key}"),
            StorageError::InvalidKey(key) => write!(f, "Invalid object key: {key}"),
            StorageError::Corrupted(msg) => write!(f, "Corrupted object: {msg}"),
            StorageError::Backend(msg) => write!(f, "Object store error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl StorageError {
    /// Whether the failure is a transport/storage fault worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Minimal object store contract used by the credential store and the
/// channel topology builder.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the object at `key`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Write (or replace) the object at `key`.
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Write the object only if `key` is currently absent.
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// List every key starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Verify the backend is reachable and writable.
    async fn health_check(&self) -> StorageResult<()>;
}

/// Split a key into validated segments.
///
/// Rejects absolute keys, empty segments and dot-prefixed segments (which
/// also keeps temp files and traversal out of the key space).
pub(super) fn key_segments(key: &str, allow_trailing_slash: bool) -> StorageResult<Vec<&str>> {
    let trimmed = if allow_trailing_slash {
        key.strip_suffix('/').unwrap_or(key)
    } else {
        key
    };
    if trimmed.is_empty() {
        return if allow_trailing_slash {
            Ok(Vec::new())
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        };
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    for segment in &segments {
        if segment.is_empty() || segment.starts_with('.') || segment.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
    }
    Ok(segments)
}

// =============================================================================
// Filesystem backend
// =============================================================================

/// Directory-backed bucket.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. Call [`FsObjectStore::initialize`] before use.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Bucket root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the bucket directory. Safe to call multiple times.
    pub async fn initialize(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key_segments(key, false)? {
            path.push(segment);
        }
        Ok(path)
    }

    /// Temp file next to the target so rename/link stay on one filesystem.
    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
    }

    async fn write_temp(path: &Path, data: &[u8]) -> StorageResult<PathBuf> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = Self::temp_path(path);
        tokio::fs::write(&temp, data).await?;
        Ok(temp)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.resolve(key)?;
        let temp = Self::write_temp(&path, data).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.resolve(key)?;
        let temp = Self::write_temp(&path, data).await?;
        let linked = tokio::fs::hard_link(&temp, &path).await;
        let _ = tokio::fs::remove_file(&temp).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // Start from the deepest directory fully named by the prefix.
        let segments = key_segments(prefix, true)?;
        let dir_segments = if prefix.ends_with('/') || segments.is_empty() {
            &segments[..]
        } else {
            &segments[..segments.len() - 1]
        };

        let mut start = self.root.clone();
        for segment in dir_segments {
            start.push(segment);
        }

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.starts_with('.') {
                    continue;
                }
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let test_file = self.root.join(".health_check");
        let test_data = b"health_check_data";

        tokio::fs::write(&test_file, test_data).await?;
        let read_data = tokio::fs::read(&test_file).await?;
        tokio::fs::remove_file(&test_file).await?;

        if read_data != test_data {
            return Err(StorageError::Corrupted(
                "Health check data mismatch".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Process-local bucket.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        key_segments(key, false)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        key_segments(key, false)?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        key_segments(key, false)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        key_segments(prefix, true)?;
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fs_store() -> (FsObjectStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let store = FsObjectStore::new(dir.path().join("bucket"));
        store.initialize().await.expect("initialize bucket");
        (store, dir)
    }

    #[tokio::test]
    async fn fs_put_then_get_returns_same_bytes() {
        let (store, _dir) = fs_store().await;
        let data = b"raw bytes\nwith newline \x00\x01";
        store.put("org1/alice/signcerts/cert.pem", data).await.unwrap();
        assert_eq!(store.get("org1/alice/signcerts/cert.pem").await.unwrap(), data);
    }

    #[tokio::test]
    async fn fs_get_missing_is_not_found() {
        let (store, _dir) = fs_store().await;
        let result = store.get("org1/nobody/signcerts/cert.pem").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn fs_put_overwrites() {
        let (store, _dir) = fs_store().await;
        store.put("a/b", b"one").await.unwrap();
        store.put("a/b", b"two").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn fs_put_if_absent_rejects_second_writer() {
        let (store, _dir) = fs_store().await;
        store.put_if_absent("a/b", b"first").await.unwrap();
        let second = store.put_if_absent("a/b", b"second").await;
        assert!(matches!(second, Err(StorageError::AlreadyExists(_))));
        assert_eq!(store.get("a/b").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn fs_list_matches_prefix_and_skips_temp_files() {
        let (store, _dir) = fs_store().await;
        store.put("org1/u1/keystore/pk", b"k1").await.unwrap();
        store.put("org1/u1/keystore/pk2", b"k2").await.unwrap();
        store.put("org1/u1/signcerts/cert.pem", b"c").await.unwrap();
        store.put("org1/u10/keystore/pk", b"other").await.unwrap();
        tokio::fs::write(store.root().join("org1/u1/keystore/.pk.tmp"), b"x")
            .await
            .unwrap();

        let keys = store.list("org1/u1/keystore/").await.unwrap();
        assert_eq!(keys, vec!["org1/u1/keystore/pk", "org1/u1/keystore/pk2"]);

        let keys = store.list("org1/u1").await.unwrap();
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn fs_list_missing_prefix_is_empty() {
        let (store, _dir) = fs_store().await;
        assert!(store.list("org9/ghost/keystore/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (store, _dir) = fs_store().await;
        for key in ["../escape", "org1/../../etc/passwd", "/abs", "a//b", ""] {
            let result = store.put(key, b"x").await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn fs_health_check_works() {
        let (store, _dir) = fs_store().await;
        store.health_check().await.expect("health check should pass");
    }

    #[tokio::test]
    async fn memory_store_list_and_create_if_absent() {
        let store = MemoryObjectStore::new();
        store.put("org1/u1/keystore/pk", b"k").await.unwrap();
        store.put("org1/u2/keystore/pk", b"k").await.unwrap();

        assert_eq!(
            store.list("org1/u1/").await.unwrap(),
            vec!["org1/u1/keystore/pk"]
        );
        assert!(matches!(
            store.put_if_absent("org1/u1/keystore/pk", b"x").await,
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(store.len().await, 2);
    }
}
