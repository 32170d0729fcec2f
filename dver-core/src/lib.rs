//! DVer Core Library
//!
//! Version history for files kept in a path-addressed mutable store backed
//! by a content-addressed immutable blob store:
//! - History record model (root blob anchor + per-version deltas)
//! - Version address parsing and resolution (`path#n`, `path@name`)
//! - Delta engine (edit-script diff/apply)
//! - Change-set coalescing for streaming reconstruction
//! - Lazy chunked reconstruction of any historical version
//! - Write / rebase / publish state transitions on the history record
//! - In-memory and disk-backed store implementations

pub mod address;
pub mod changeset;
pub mod delta;
pub mod disk_store;
pub mod error;
pub mod record;
pub mod store;
pub mod stream;
pub mod versioned;

pub use address::{resolve_index, VersionAddress, VersionedPath};
pub use changeset::{coalesce, ChangeSet};
pub use delta::{apply, diff, EditOp};
pub use disk_store::DiskStore;
pub use error::{Result, VersionError};
pub use record::{
    content_hash, BlobId, Content, ContentKind, HistoryRecord, Metadata, Published, RebaseEntry,
    Version,
};
pub use store::{
    read_all, BlobStore, ByteStream, MemoryStore, PathEntry, PathStat, PathStore, StoreError,
};
pub use stream::{Chunk, VersionStream};
pub use versioned::{ReadOptions, Versioned, VersionedRead, WriteOptions};
