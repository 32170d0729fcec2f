//! History record model for versioned files
//!
//! A file's history is an ordered list of records, serialized as a JSON
//! array at the file's mutable path. Index 0 is the root: it anchors the
//! immutable blob holding the original bytes and always has an empty delta.
//! Every later record carries a delta against the immediately preceding
//! reconstructed content.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::delta::EditOp;
use crate::error::{Result, VersionError};

/// Address of an immutable blob in the content-addressed store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId([u8; 32]);

impl BlobId {
    /// Create a new BlobId from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute BlobId from data
    pub fn from_data(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hash.into())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for BlobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        Self::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

/// Hex SHA-256 digest of content bytes
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Version label of a history record
///
/// Ordinals are position-derived (JSON number); symbolic labels are
/// user-chosen strings (e.g. `"1.0.0"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Version {
    Ordinal(u64),
    Symbolic(String),
}

impl Version {
    /// A symbolic label must not look like a number: tokens that fully
    /// parse as an integer or a two-part decimal are rejected.
    pub fn is_numeric_label(label: &str) -> bool {
        if label.parse::<i64>().is_ok() {
            return true;
        }
        if let Some((whole, frac)) = label.split_once('.') {
            return whole.parse::<i64>().is_ok() && frac.parse::<i64>().is_ok();
        }
        false
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::Ordinal(n) => write!(f, "{}", n),
            Version::Symbolic(label) => write!(f, "{}", label),
        }
    }
}

/// Content kind discriminator
///
/// Determines how raw bytes are interpreted and reassembled on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Text,
    Binary,
    Structured,
}

/// Content value of a versioned file
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Binary(Bytes),
    Structured(serde_json::Value),
}

impl Content {
    /// Classify the content kind
    pub fn kind(&self) -> ContentKind {
        match self {
            Content::Text(_) => ContentKind::Text,
            Content::Binary(_) => ContentKind::Binary,
            Content::Structured(_) => ContentKind::Structured,
        }
    }

    /// Serialize to the byte representation used for hashing, diffing and
    /// blob storage (Structured content is serialized as JSON)
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Content::Text(text) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Content::Binary(data) => Ok(data.clone()),
            Content::Structured(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }

    /// Reassemble content of a given kind from reconstructed bytes
    pub fn from_bytes(kind: ContentKind, bytes: Vec<u8>) -> Result<Self> {
        match kind {
            ContentKind::Text => Ok(Content::Text(
                String::from_utf8(bytes).map_err(|_| VersionError::InvalidText)?,
            )),
            ContentKind::Binary => Ok(Content::Binary(Bytes::from(bytes))),
            ContentKind::Structured => Ok(Content::Structured(serde_json::from_slice(&bytes)?)),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(data: Vec<u8>) -> Self {
        Content::Binary(Bytes::from(data))
    }
}

impl From<Bytes> for Content {
    fn from(data: Bytes) -> Self {
        Content::Binary(data)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Structured(value)
    }
}

/// Open user metadata carried on a record (insertion order preserved)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Publication pin recorded on the root
///
/// When present, addressless reads resolve to the pinned version instead of
/// the latest record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Published {
    /// Immutable address of the published snapshot
    pub cid: BlobId,
    /// Mutable-store location of the snapshot, when one was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 1-based position of the pinned version in the history sequence
    pub version: u64,
    /// Content hash of the pinned version
    pub hash: String,
}

/// One squash event: `(timestamp, prior version label)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebaseEntry(pub i64, pub Version);

/// One entry in a file's ordered version list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub version: Version,
    pub kind: ContentKind,
    /// Hex SHA-256 of the fully reconstructed content at this version
    pub hash: String,
    /// Edit operations against the immediately preceding reconstructed
    /// content; empty only for the root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delta: Vec<EditOp>,
    /// Modification timestamp, Unix milliseconds
    pub mtime: i64,
    /// Creation timestamp, root only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btime: Option<i64>,
    /// Immutable blob address of the original bytes, root only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobId>,
    /// Squash log, root only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rebased: Vec<RebaseEntry>,
    /// Publication pin, root only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<Published>,
    /// Open user metadata (flattened into the record's JSON object)
    #[serde(flatten)]
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_id_roundtrip() {
        let bytes = [42u8; 32];
        let id = BlobId::new(bytes);
        let hex = id.to_hex();
        let id2 = BlobId::from_hex(&hex).unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn test_blob_id_from_data() {
        let id = BlobId::from_data(b"hello world");
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn test_version_serde_untagged() {
        let ordinal: Version = serde_json::from_str("3").unwrap();
        assert_eq!(ordinal, Version::Ordinal(3));
        let symbolic: Version = serde_json::from_str("\"1.0.0\"").unwrap();
        assert_eq!(symbolic, Version::Symbolic("1.0.0".to_string()));
        assert_eq!(serde_json::to_string(&ordinal).unwrap(), "3");
        assert_eq!(serde_json::to_string(&symbolic).unwrap(), "\"1.0.0\"");
    }

    #[test]
    fn test_numeric_label_guard() {
        assert!(Version::is_numeric_label("1"));
        assert!(Version::is_numeric_label("-4"));
        assert!(Version::is_numeric_label("1.0"));
        assert!(!Version::is_numeric_label("1.0.0"));
        assert!(!Version::is_numeric_label("v1"));
        assert!(!Version::is_numeric_label("beta"));
    }

    #[test]
    fn test_history_record_json_roundtrip() {
        let mut metadata = Metadata::new();
        metadata.insert("author".to_string(), serde_json::Value::from("joe"));
        let record = HistoryRecord {
            version: Version::Ordinal(1),
            kind: ContentKind::Text,
            hash: content_hash(b"test"),
            delta: Vec::new(),
            mtime: 1_700_000_000_000,
            btime: Some(1_700_000_000_000),
            blob: Some(BlobId::from_data(b"test")),
            rebased: Vec::new(),
            published: None,
            metadata,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: HistoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
        assert_eq!(back.metadata.get("author").unwrap(), "joe");
    }

    #[test]
    fn test_content_bytes_roundtrip() {
        let text = Content::from("hello");
        let bytes = text.to_bytes().unwrap();
        assert_eq!(
            Content::from_bytes(ContentKind::Text, bytes.to_vec()).unwrap(),
            text
        );

        let value = Content::from(serde_json::json!({"message": "hi"}));
        let bytes = value.to_bytes().unwrap();
        assert_eq!(
            Content::from_bytes(ContentKind::Structured, bytes.to_vec()).unwrap(),
            value
        );
    }
}
