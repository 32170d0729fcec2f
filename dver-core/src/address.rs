//! Version address parsing and resolution
//!
//! Paths may carry a version suffix on their final segment: `#n` addresses
//! the n-th record (1-based) in the stored history sequence, `@name`
//! addresses the last record carrying the symbolic label `name`. Without a
//! suffix a path resolves to the most recent record, or to the published
//! pin when the root carries one.

use crate::error::{Result, VersionError};
use crate::record::{HistoryRecord, Version};

/// How a path addresses a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionAddress {
    /// No suffix: most recent record, or the published pin when one exists
    Latest,
    /// `#n`: 1-based position in the history sequence
    Ordinal(u64),
    /// `@name`: last record whose version label matches
    Symbolic(String),
}

impl std::fmt::Display for VersionAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionAddress::Latest => write!(f, "latest"),
            VersionAddress::Ordinal(n) => write!(f, "#{}", n),
            VersionAddress::Symbolic(token) => write!(f, "@{}", token),
        }
    }
}

/// A raw path split into its base path and version address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPath {
    pub base: String,
    pub address: VersionAddress,
}

impl VersionedPath {
    /// Parse a raw path, extracting a `#n` or `@name` suffix from the final
    /// segment
    ///
    /// `@` wins over `#` when both appear, and the last marker of the chosen
    /// kind delimits the suffix. A `#` suffix must parse as an integer.
    pub fn parse(raw: &str) -> Result<Self> {
        let (dir, segment) = match raw.rfind('/') {
            Some(i) => (&raw[..=i], &raw[i + 1..]),
            None => ("", raw),
        };
        if let Some(i) = segment.rfind('@') {
            let (name, token) = (&segment[..i], &segment[i + 1..]);
            if token.is_empty() {
                return Err(malformed(segment, token));
            }
            return Ok(Self {
                base: format!("{}{}", dir, name),
                address: VersionAddress::Symbolic(token.to_string()),
            });
        }
        if let Some(i) = segment.rfind('#') {
            let (name, token) = (&segment[..i], &segment[i + 1..]);
            let ordinal: u64 = token.parse().map_err(|_| malformed(segment, token))?;
            return Ok(Self {
                base: format!("{}{}", dir, name),
                address: VersionAddress::Ordinal(ordinal),
            });
        }
        Ok(Self {
            base: raw.to_string(),
            address: VersionAddress::Latest,
        })
    }
}

fn malformed(segment: &str, suffix: &str) -> VersionError {
    VersionError::MalformedVersion {
        segment: segment.to_string(),
        suffix: suffix.to_string(),
    }
}

/// Resolve an address against a loaded history to a record index
///
/// An explicit address always bypasses the published pin; only `Latest`
/// honors it.
pub fn resolve_index(
    path: &str,
    history: &[HistoryRecord],
    address: &VersionAddress,
) -> Result<usize> {
    match address {
        VersionAddress::Ordinal(n) => {
            let n = *n as usize;
            if n >= 1 && n <= history.len() {
                Ok(n - 1)
            } else {
                Err(not_found(path, address))
            }
        }
        VersionAddress::Symbolic(token) => history
            .iter()
            .rposition(|record| {
                matches!(&record.version, Version::Symbolic(label) if label == token)
            })
            .ok_or_else(|| not_found(path, address)),
        VersionAddress::Latest => {
            let root = history.first().ok_or_else(|| VersionError::CorruptHistory {
                path: path.to_string(),
                reason: "empty history".to_string(),
            })?;
            match &root.published {
                Some(published) => {
                    let position = published.version as usize;
                    if position >= 1 && position <= history.len() {
                        Ok(position - 1)
                    } else {
                        Err(VersionError::CorruptHistory {
                            path: path.to_string(),
                            reason: format!(
                                "published pin references version {}",
                                published.version
                            ),
                        })
                    }
                }
                None => Ok(history.len() - 1),
            }
        }
    }
}

fn not_found(path: &str, address: &VersionAddress) -> VersionError {
    VersionError::VersionNotFound {
        path: path.to_string(),
        address: address.to_string(),
    }
}
