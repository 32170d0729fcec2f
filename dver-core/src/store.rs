//! Backing store contracts for the versioning engine
//!
//! The engine depends on two narrow collaborator contracts: an immutable
//! content-addressed blob store and a mutable path-addressed file store.
//! Any implementation satisfying these traits is valid; an in-memory
//! backend lives here for tests and small deployments.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::record::BlobId;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Lazy byte stream returned by store reads
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Collect a byte stream into a single buffer
pub async fn read_all(mut stream: ByteStream) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}

pub(crate) fn chunk_stream(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunks: Vec<Result<Bytes>> = data
        .chunks(chunk_size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Immutable content-addressed blob store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store content immutably, returning its content address
    async fn add(&self, content: Bytes) -> Result<BlobId>;

    /// Lazily stream immutable content back by address
    async fn fetch(&self, id: &BlobId) -> Result<ByteStream>;
}

/// Directory entry returned by `PathStore::list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub name: String,
}

/// Metadata returned by `PathStore::stat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStat {
    pub address: BlobId,
    pub size: u64,
}

/// Mutable path-addressed file store
#[async_trait]
pub trait PathStore: Send + Sync {
    /// Lazily stream a file's content
    async fn read(&self, path: &str) -> Result<ByteStream>;

    /// Write a file's content with truncate semantics
    async fn write(&self, path: &str, content: Bytes) -> Result<()>;

    /// List the direct children of a directory
    async fn list(&self, dir: &str) -> Result<Vec<PathEntry>>;

    /// Remove a file
    async fn remove(&self, path: &str) -> Result<()>;

    /// Stat a file
    async fn stat(&self, path: &str) -> Result<PathStat>;
}

/// Default fetch chunk size for the in-memory store
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// In-memory blob + path store
///
/// Fetch chunking is configurable so tests can exercise spans that straddle
/// chunk boundaries.
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<BlobId, Bytes>>>,
    files: Arc<RwLock<BTreeMap<String, Bytes>>>,
    chunk_size: usize,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a new in-memory store with a specific fetch chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            files: Arc::new(RwLock::new(BTreeMap::new())),
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn add(&self, content: Bytes) -> Result<BlobId> {
        let id = BlobId::from_data(&content);
        self.blobs.write().await.insert(id, content);
        Ok(id)
    }

    async fn fetch(&self, id: &BlobId) -> Result<ByteStream> {
        let data = self
            .blobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))?;
        Ok(chunk_stream(data, self.chunk_size))
    }
}

#[async_trait]
impl PathStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<ByteStream> {
        let data = self
            .files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(chunk_stream(data, self.chunk_size))
    }

    async fn write(&self, path: &str, content: Bytes) -> Result<()> {
        self.files.write().await.insert(path.to_string(), content);
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<PathEntry>> {
        let prefix = if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        };
        let files = self.files.read().await;
        let mut names: Vec<String> = Vec::new();
        for path in files.keys() {
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
        self.files
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn stat(&self, path: &str) -> Result<PathStat> {
        let files = self.files.read().await;
        let data = files
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(PathStat {
            address: BlobId::from_data(data),
            size: data.len() as u64,
        })
    }
}
