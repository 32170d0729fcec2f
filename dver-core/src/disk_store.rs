//! Disk-backed store implementation
//!
//! Blobs are stored content-addressed on the filesystem (like git objects);
//! the mutable path namespace lives in a sled embedded database for
//! O(log n) lookups and prefix scans.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::record::BlobId;
use crate::store::{
    chunk_stream, BlobStore, ByteStream, PathEntry, PathStat, PathStore, Result, StoreError,
    DEFAULT_CHUNK_SIZE,
};

/// Disk-backed blob + path store
///
/// Layout on disk:
/// ```text
/// {root}/
///   objects/{hash[0..2]}/{hash[2..]}  — content-addressed blob store
///   files.db/                         — sled database for the path namespace
/// ```
pub struct DiskStore {
    root: PathBuf,
    files_db: sled::Db,
}

impl DiskStore {
    /// Open or create a store rooted at `root`
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join("objects"))?;
        let files_db = sled::open(root.join("files.db"))
            .map_err(|e| StoreError::Database(format!("Failed to open path database: {}", e)))?;
        Ok(Self {
            root: root.to_path_buf(),
            files_db,
        })
    }

    fn object_path(&self, id: &BlobId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    async fn flush(&self) -> Result<()> {
        self.files_db
            .flush_async()
            .await
            .map_err(|e| StoreError::Database(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for DiskStore {
    async fn add(&self, content: Bytes) -> Result<BlobId> {
        let id = BlobId::from_data(&content);
        let path = self.object_path(&id);
        // Content-addressed: an existing object already holds these bytes
        if !tokio::fs::try_exists(&path).await? {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &content).await?;
        }
        Ok(id)
    }

    async fn fetch(&self, id: &BlobId) -> Result<ByteStream> {
        let path = self.object_path(id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_hex()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(chunk_stream(Bytes::from(data), DEFAULT_CHUNK_SIZE))
    }
}

#[async_trait]
impl PathStore for DiskStore {
    async fn read(&self, path: &str) -> Result<ByteStream> {
        let value = self
            .files_db
            .get(path.as_bytes())
            .map_err(|e| StoreError::Database(format!("Read failed: {}", e)))?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(chunk_stream(Bytes::from(value.to_vec()), DEFAULT_CHUNK_SIZE))
    }

    async fn write(&self, path: &str, content: Bytes) -> Result<()> {
        self.files_db
            .insert(path.as_bytes(), content.to_vec())
            .map_err(|e| StoreError::Database(format!("Write failed: {}", e)))?;
        self.flush().await
    }

    async fn list(&self, dir: &str) -> Result<Vec<PathEntry>> {
        let prefix = if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        };
        let mut names: Vec<String> = Vec::new();
        for item in self.files_db.scan_prefix(prefix.as_bytes()) {
            let (key, _) =
                item.map_err(|e| StoreError::Database(format!("Iteration failed: {}", e)))?;
            let path = String::from_utf8_lossy(&key);
            if let Some(rest) = path.strip_prefix(&prefix) {
                let name = rest.split('/').next().unwrap_or(rest);
                if !name.is_empty() && names.last().map(|last| last != name).unwrap_or(true) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names.into_iter().map(|name| PathEntry { name }).collect())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let prior = self
            .files_db
            .remove(path.as_bytes())
            .map_err(|e| StoreError::Database(format!("Remove failed: {}", e)))?;
        if prior.is_none() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        self.flush().await
    }

    async fn stat(&self, path: &str) -> Result<PathStat> {
        let value = self
            .files_db
            .get(path.as_bytes())
            .map_err(|e| StoreError::Database(format!("Stat failed: {}", e)))?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(PathStat {
            address: BlobId::from_data(&value),
            size: value.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_all;

    #[tokio::test]
    async fn test_blob_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let data = Bytes::from(b"hello world".as_ref());
        let id = store.add(data.clone()).await.unwrap();
        let fetched = read_all(store.fetch(&id).await.unwrap()).await.unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_blob_fetch_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let result = store.fetch(&BlobId::from_data(b"absent")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_roundtrip_and_persistence() {
        let dir = tempfile::tempdir().unwrap();

        // Create store and write data
        let store = DiskStore::open(dir.path()).unwrap();
        store
            .write("/notes.txt", Bytes::from(b"persistent".as_ref()))
            .await
            .unwrap();

        // Drop store to release the database lock
        drop(store);

        // Reopen store and verify data
        let store2 = DiskStore::open(dir.path()).unwrap();
        let data = read_all(store2.read("/notes.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(data, b"persistent");
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.write("/d/a.txt", Bytes::new()).await.unwrap();
        store.write("/d/sub/b.txt", Bytes::new()).await.unwrap();

        let entries = store.list("/d").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);

        store.remove("/d/a.txt").await.unwrap();
        assert!(matches!(
            store.remove("/d/a.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
