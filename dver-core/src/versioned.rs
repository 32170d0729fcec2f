//! Versioned file engine
//!
//! History records are stored as a JSON array at the file's mutable path.
//! Every operation reloads that array, builds a fresh copy, and rewrites it
//! wholesale (truncate semantics); history is never patched in place. The
//! engine itself is stateless between calls.
//!
//! There is no locking or transaction layer: a write is a read-modify-write
//! against the backing store's path, so two concurrent writers targeting
//! the same path race and the later write silently discards the other's
//! delta. This lost-update window is an accepted limitation of the design,
//! not a defect to patch around here.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::address::{resolve_index, VersionAddress, VersionedPath};
use crate::changeset::coalesce;
use crate::delta;
use crate::error::{Result, VersionError};
use crate::record::{
    content_hash, Content, ContentKind, HistoryRecord, Metadata, Published, RebaseEntry, Version,
};
use crate::store::{read_all, BlobStore, PathStore, StoreError};
use crate::stream::{Chunk, VersionStream};

/// Options for `read_with`
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOptions {
    pub with_metadata: bool,
    pub with_history: bool,
    pub with_root: bool,
}

/// Options for `write_with`
#[derive(Debug, Default, Clone)]
pub struct WriteOptions {
    /// Version label for the new record; a `@name` path suffix overrides
    /// this
    pub version: Option<Version>,
    /// User metadata carried on the new record
    pub metadata: Metadata,
    /// Publication pin update, the only change an ordinal-addressed write
    /// may carry
    pub published: Option<Published>,
    /// Discard all history and make this content the new root
    pub as_base: bool,
}

/// Result of `read_with`
#[derive(Debug, Clone)]
pub struct VersionedRead {
    pub content: Content,
    pub metadata: Option<HistoryRecord>,
    pub history: Option<Vec<HistoryRecord>>,
    pub root: Option<HistoryRecord>,
}

/// Versioned file engine over a blob store and a path store
pub struct Versioned {
    blobs: Arc<dyn BlobStore>,
    paths: Arc<dyn PathStore>,
}

impl Versioned {
    /// Create an engine over a single backend implementing both contracts
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: BlobStore + PathStore + 'static,
    {
        Self {
            blobs: store.clone(),
            paths: store,
        }
    }

    /// Create an engine over separate blob and path backends
    pub fn with_stores(blobs: Arc<dyn BlobStore>, paths: Arc<dyn PathStore>) -> Self {
        Self { blobs, paths }
    }

    async fn load_history(&self, base: &str) -> Result<Vec<HistoryRecord>> {
        let stream = self.paths.read(base).await?;
        let bytes = read_all(stream).await?;
        let history: Vec<HistoryRecord> = serde_json::from_slice(&bytes)?;
        if history.is_empty() {
            return Err(VersionError::CorruptHistory {
                path: base.to_string(),
                reason: "empty history".to_string(),
            });
        }
        Ok(history)
    }

    async fn save_history(&self, base: &str, history: &[HistoryRecord]) -> Result<()> {
        let bytes = serde_json::to_vec(history)?;
        self.paths.write(base, Bytes::from(bytes)).await?;
        Ok(())
    }

    async fn load(&self, path: &str) -> Result<(VersionedPath, Vec<HistoryRecord>, usize)> {
        let parsed = VersionedPath::parse(path)?;
        let history = self.load_history(&parsed.base).await?;
        let index = resolve_index(&parsed.base, &history, &parsed.address)?;
        Ok((parsed, history, index))
    }

    async fn root_stream(
        &self,
        path: &str,
        history: &[HistoryRecord],
    ) -> Result<crate::store::ByteStream> {
        let blob = history
            .first()
            .and_then(|record| record.blob.as_ref())
            .ok_or_else(|| VersionError::CorruptHistory {
                path: path.to_string(),
                reason: "root record has no blob address".to_string(),
            })?;
        Ok(self.blobs.fetch(blob).await?)
    }

    /// Fold every record's delta onto the root content, through `index`
    async fn reconstruct(
        &self,
        path: &str,
        history: &[HistoryRecord],
        index: usize,
    ) -> Result<Vec<u8>> {
        let stream = self.root_stream(path, history).await?;
        let mut content = read_all(stream).await?;
        for record in &history[1..index + 1] {
            content = delta::apply(&content, &record.delta);
        }
        Ok(content)
    }

    /// Read and fully materialize a version's content
    pub async fn read(&self, path: &str) -> Result<Content> {
        let (parsed, history, index) = self.load(path).await?;
        let bytes = self.reconstruct(&parsed.base, &history, index).await?;
        Content::from_bytes(history[index].kind, bytes)
    }

    /// Read a version together with its record, history run and root
    pub async fn read_with(&self, path: &str, options: ReadOptions) -> Result<VersionedRead> {
        let (parsed, history, index) = self.load(path).await?;
        let bytes = self.reconstruct(&parsed.base, &history, index).await?;
        let content = Content::from_bytes(history[index].kind, bytes)?;
        let metadata = options.with_metadata.then(|| {
            let mut record = history[index].clone();
            record.btime = history[0].btime;
            record
        });
        let root = options.with_root.then(|| history[0].clone());
        let history_run = options.with_history.then(|| history[..index + 1].to_vec());
        Ok(VersionedRead {
            content,
            metadata,
            history: history_run,
            root,
        })
    }

    /// Read a version as a lazy chunk sequence
    ///
    /// Structured content is always materialized and parsed; its sequence
    /// yields exactly one chunk.
    pub async fn read_stream(&self, path: &str) -> Result<VersionStream> {
        let (parsed, history, index) = self.load(path).await?;
        let kind = history[index].kind;
        if kind == ContentKind::Structured {
            let bytes = self.reconstruct(&parsed.base, &history, index).await?;
            let value: Value = serde_json::from_slice(&bytes)?;
            return Ok(VersionStream::materialized(Chunk::Structured(value)));
        }
        let spans = coalesce(&history[..index + 1]);
        let source = self.root_stream(&parsed.base, &history).await?;
        Ok(VersionStream::new(source, kind, spans))
    }

    /// Write content, appending a new version when anything changed
    pub async fn write(&self, path: &str, content: Content) -> Result<()> {
        self.write_with(path, content, WriteOptions::default()).await
    }

    /// Write content with an explicit version label, metadata, publication
    /// pin or history reset
    pub async fn write_with(
        &self,
        path: &str,
        content: Content,
        options: WriteOptions,
    ) -> Result<()> {
        let parsed = VersionedPath::parse(path)?;
        let label = match &parsed.address {
            VersionAddress::Symbolic(token) => Some(Version::Symbolic(token.clone())),
            _ => options.version.clone(),
        };
        if let Some(Version::Symbolic(token)) = &label {
            if Version::is_numeric_label(token) {
                return Err(VersionError::SymbolicVersionRequired(token.clone()));
            }
        }
        let kind = content.kind();
        let bytes = content.to_bytes()?;
        let hash = content_hash(&bytes);
        let now = Utc::now().timestamp_millis();

        let existing = match self.load_history(&parsed.base).await {
            Ok(history) => Some(history),
            Err(VersionError::Store(StoreError::NotFound(_))) => None,
            Err(err) => return Err(err),
        };

        let Some(mut history) = existing else {
            if matches!(parsed.address, VersionAddress::Ordinal(_)) {
                return Err(VersionError::VersionNotFound {
                    path: parsed.base.clone(),
                    address: parsed.address.to_string(),
                });
            }
            let blob = self.blobs.add(bytes).await?;
            debug!(path = %parsed.base, "creating versioned file");
            let root = HistoryRecord {
                version: label.unwrap_or(Version::Ordinal(1)),
                kind,
                hash,
                delta: Vec::new(),
                mtime: now,
                btime: Some(now),
                blob: Some(blob),
                rebased: Vec::new(),
                published: None,
                metadata: options.metadata,
            };
            return self.save_history(&parsed.base, &[root]).await;
        };

        if options.as_base {
            let old_root = &history[0];
            let mut rebased = old_root.rebased.clone();
            rebased.push(RebaseEntry(now, old_root.version.clone()));
            let btime = old_root.btime;
            let blob = self.blobs.add(bytes).await?;
            info!(path = %parsed.base, "resetting history to new base");
            let root = HistoryRecord {
                version: label.unwrap_or(Version::Ordinal(1)),
                kind,
                hash,
                delta: Vec::new(),
                mtime: now,
                btime,
                blob: Some(blob),
                rebased,
                published: None,
                metadata: options.metadata,
            };
            return self.save_history(&parsed.base, &[root]).await;
        }

        if matches!(parsed.address, VersionAddress::Ordinal(_)) {
            let index = resolve_index(&parsed.base, &history, &parsed.address)?;
            if history[index].hash != hash {
                return Err(VersionError::ImmutableVersionConflict {
                    path: parsed.base.clone(),
                    address: parsed.address.to_string(),
                });
            }
            if !options.metadata.is_empty() || options.version.is_some() {
                return Err(VersionError::InvalidPinnedWrite {
                    path: parsed.base.clone(),
                });
            }
            let Some(published) = options.published else {
                // Identical content, nothing to update.
                return Ok(());
            };
            let position = published.version as usize;
            let valid = position >= 1
                && position <= history.len()
                && history[position - 1].hash == published.hash;
            if !valid {
                return Err(VersionError::InvalidPinnedWrite {
                    path: parsed.base.clone(),
                });
            }
            debug!(path = %parsed.base, version = published.version, "updating publication pin");
            history[0].published = Some(published);
            return self.save_history(&parsed.base, &history).await;
        }

        let parent_index = history.len() - 1;
        let parent = &history[parent_index];
        let content_changed = parent.hash != hash;
        let version_changed = label
            .as_ref()
            .map(|version| *version != parent.version)
            .unwrap_or(false);
        let metadata_changed = options
            .metadata
            .iter()
            .any(|(key, value)| parent.metadata.get(key) != Some(value));
        if !content_changed && !version_changed && !metadata_changed {
            debug!(path = %parsed.base, "write changed nothing, skipping");
            return Ok(());
        }

        let delta = if content_changed {
            let parent_content = self.reconstruct(&parsed.base, &history, parent_index).await?;
            delta::diff(&parent_content, &bytes)
        } else {
            Vec::new()
        };
        let version = label.unwrap_or(Version::Ordinal(history.len() as u64 + 1));
        debug!(path = %parsed.base, version = %version, ops = delta.len(), "appending version");
        history.push(HistoryRecord {
            version,
            kind,
            hash,
            delta,
            mtime: now,
            btime: None,
            blob: None,
            rebased: Vec::new(),
            published: None,
            metadata: options.metadata,
        });
        self.save_history(&parsed.base, &history).await
    }

    /// Squash history up to the addressed version into a new root
    ///
    /// Records after the target are retained; purely ordinal versions are
    /// renumbered to their new positions, symbolic labels are untouched.
    pub async fn rebase(&self, path: &str) -> Result<()> {
        let (parsed, history, index) = self.load(path).await?;
        let content = self.reconstruct(&parsed.base, &history, index).await?;
        let now = Utc::now().timestamp_millis();
        let target_version = history[index].version.clone();
        let blob = self.blobs.add(Bytes::from(content)).await?;
        let mut rebased = history[0].rebased.clone();
        rebased.push(RebaseEntry(now, target_version.clone()));
        let root_version = match &target_version {
            Version::Symbolic(_) => target_version.clone(),
            Version::Ordinal(_) => Version::Ordinal(1),
        };
        let root = HistoryRecord {
            version: root_version,
            kind: history[index].kind,
            hash: history[index].hash.clone(),
            delta: Vec::new(),
            mtime: now,
            btime: history[0].btime,
            blob: Some(blob),
            rebased,
            // A pin indexes the pre-rebase sequence.
            published: None,
            metadata: history[index].metadata.clone(),
        };
        let mut records = vec![root];
        for (offset, mut record) in history.into_iter().skip(index + 1).enumerate() {
            if matches!(record.version, Version::Ordinal(_)) {
                record.version = Version::Ordinal(offset as u64 + 2);
            }
            record.mtime = now;
            records.push(record);
        }
        info!(path = %parsed.base, version = %target_version, retained = records.len(), "rebased history");
        self.save_history(&parsed.base, &records).await
    }

    /// Publish the addressed version as an immutable snapshot and pin it
    ///
    /// The snapshot always lands in the blob store; with a target location
    /// it is additionally written to the mutable store. Returns the
    /// snapshot's immutable address.
    pub async fn publish(&self, path: &str, target: Option<&str>) -> Result<crate::record::BlobId> {
        let (parsed, mut history, index) = self.load(path).await?;
        let content = Bytes::from(self.reconstruct(&parsed.base, &history, index).await?);
        let cid = self.blobs.add(content.clone()).await?;
        if let Some(target_path) = target {
            self.paths.write(target_path, content).await?;
        }
        let published = Published {
            cid,
            path: target.map(str::to_string),
            version: (index + 1) as u64,
            hash: history[index].hash.clone(),
        };
        info!(path = %parsed.base, version = published.version, cid = %cid, "published snapshot");
        history[0].published = Some(published);
        self.save_history(&parsed.base, &history).await?;
        Ok(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> Versioned {
        Versioned::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_identical_write_is_noop() {
        let fs = engine();
        fs.write("/f.txt", Content::from("same")).await.unwrap();
        fs.write("/f.txt", Content::from("same")).await.unwrap();
        let result = fs
            .read_with(
                "/f.txt",
                ReadOptions {
                    with_history: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.history.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_numeric_symbolic_label_rejected() {
        let fs = engine();
        for label in ["1", "1.0"] {
            let err = fs
                .write_with(
                    "/f.txt",
                    Content::from("test"),
                    WriteOptions {
                        version: Some(Version::Symbolic(label.to_string())),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, VersionError::SymbolicVersionRequired(_)));
        }
    }

    #[tokio::test]
    async fn test_ordinal_write_to_missing_file_fails() {
        let fs = engine();
        let err = fs
            .write("/missing.txt#1", Content::from("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, VersionError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_metadata_only_write_appends_record() {
        let fs = engine();
        fs.write("/f.txt", Content::from("test")).await.unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("author".to_string(), Value::from("joe"));
        fs.write_with(
            "/f.txt",
            Content::from("test"),
            WriteOptions {
                metadata,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let result = fs
            .read_with(
                "/f.txt",
                ReadOptions {
                    with_history: true,
                    with_metadata: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let history = result.history.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].delta.is_empty());
        assert_eq!(result.metadata.unwrap().metadata.get("author").unwrap(), "joe");
    }
}
