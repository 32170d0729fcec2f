//! Delta engine: edit scripts between content values
//!
//! An edit script is an ordered list of splice operations expressed in the
//! content's element unit (bytes of the serialized representation for every
//! kind). `diff` produces a minimal, not necessarily optimal, script;
//! `apply` replays a script in the order given.

use serde::{Deserialize, Serialize};

/// One splice operation: delete `delete` elements at `start`, then insert
/// `insert` in their place
///
/// Offsets are absolute into the element sequence as it exists immediately
/// before this operation's own effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOp {
    pub start: usize,
    pub delete: usize,
    #[serde(with = "base64_bytes")]
    pub insert: Vec<u8>,
}

impl EditOp {
    /// Range of elements this operation touches in its input,
    /// `[start, start + delete)`
    pub fn end(&self) -> usize {
        self.start + self.delete
    }
}

/// Compute an edit script turning `old` into `new`
///
/// Trims the common prefix and suffix and emits at most one operation for
/// the differing middle; identical inputs yield an empty script.
pub fn diff(old: &[u8], new: &[u8]) -> Vec<EditOp> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if prefix == old.len() && prefix == new.len() {
        return Vec::new();
    }
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    vec![EditOp {
        start: prefix,
        delete: old.len() - prefix - suffix,
        insert: new[prefix..new.len() - suffix].to_vec(),
    }]
}

/// Apply an edit script to content, returning the transformed bytes
///
/// Operations are spliced sequentially in the order given; out-of-range
/// starts and delete counts clamp to the current length, so empty scripts
/// and scripts reaching past the end are tolerated.
pub fn apply(content: &[u8], script: &[EditOp]) -> Vec<u8> {
    let mut out = content.to_vec();
    for op in script {
        let start = op.start.min(out.len());
        let end = (start + op.delete).min(out.len());
        out.splice(start..end, op.insert.iter().copied());
    }
    out
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
