//! Lazy streaming reconstruction of a historical version
//!
//! Reads the root content stream once, forward-only, re-emitting unmodified
//! regions as they arrive and patching coalesced change-set spans in place.
//! The sequence is pull-based and not restartable; consuming it may await
//! the next chunk of the underlying stream, and cancellation is simply
//! dropping it.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::changeset::ChangeSet;
use crate::delta::{self, EditOp};
use crate::error::{Result, VersionError};
use crate::record::ContentKind;
use crate::store::ByteStream;

/// One emitted piece of reconstructed content
///
/// Text chunks are re-encoded strings; Binary chunks pass through as raw
/// bytes; Structured content is never streamed piecewise, so its stream
/// yields a single parsed chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text(String),
    Binary(Bytes),
    Structured(serde_json::Value),
}

impl Chunk {
    /// Byte representation of this chunk
    pub fn into_bytes(self) -> Bytes {
        match self {
            Chunk::Text(text) => Bytes::from(text.into_bytes()),
            Chunk::Binary(data) => data,
            Chunk::Structured(value) => Bytes::from(value.to_string().into_bytes()),
        }
    }
}

/// Lazy chunk sequence for one reconstructed version
pub struct VersionStream {
    source: ByteStream,
    kind: ContentKind,
    spans: VecDeque<ChangeSet>,
    /// Bytes read from the source but not yet emitted
    buf: Vec<u8>,
    /// Root-coordinate position of `buf[0]`
    pos: usize,
    /// Incomplete UTF-8 tail carried into the next text chunk
    utf8_carry: Vec<u8>,
    source_done: bool,
    pending: Option<Chunk>,
    finished: bool,
}

impl VersionStream {
    /// Build a stream over a root content stream and coalesced spans in
    /// ascending start order
    pub fn new(source: ByteStream, kind: ContentKind, spans: Vec<ChangeSet>) -> Self {
        Self {
            source,
            kind,
            spans: VecDeque::from(spans),
            buf: Vec::new(),
            pos: 0,
            utf8_carry: Vec::new(),
            source_done: false,
            pending: None,
            finished: false,
        }
    }

    /// A pre-materialized single-chunk sequence (Structured content)
    pub(crate) fn materialized(chunk: Chunk) -> Self {
        Self {
            source: Box::pin(futures::stream::empty()),
            kind: ContentKind::Structured,
            spans: VecDeque::new(),
            buf: Vec::new(),
            pos: 0,
            utf8_carry: Vec::new(),
            source_done: true,
            pending: Some(chunk),
            finished: true,
        }
    }

    /// Pull the next chunk; `Ok(None)` is the exhaustion sentinel
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if let Some(chunk) = self.pending.take() {
            return Ok(Some(chunk));
        }
        loop {
            if self.finished {
                return Ok(None);
            }

            let Some(span) = self.spans.front().cloned() else {
                // Tail: everything after the last span passes through.
                if !self.buf.is_empty() {
                    let emitted = std::mem::take(&mut self.buf);
                    self.pos += emitted.len();
                    if let Some(chunk) = self.encode(emitted)? {
                        return Ok(Some(chunk));
                    }
                    continue;
                }
                if self.fill().await? {
                    continue;
                }
                self.finished = true;
                if !self.utf8_carry.is_empty() {
                    return Err(VersionError::InvalidText);
                }
                return Ok(None);
            };

            if self.pos < span.start {
                // Re-emit the unmodified region ahead of the span.
                if !self.buf.is_empty() {
                    let take = (span.start - self.pos).min(self.buf.len());
                    let emitted: Vec<u8> = self.buf.drain(..take).collect();
                    self.pos += take;
                    if let Some(chunk) = self.encode(emitted)? {
                        return Ok(Some(chunk));
                    }
                } else if !self.fill().await? {
                    // Source ended ahead of the span; its operations still
                    // apply (inserts past the end of the root content).
                    self.pos = span.start;
                }
                continue;
            }

            // Buffer the span window, reading past chunk boundaries as
            // needed; spans are not chunk-aligned.
            let want = span.end - span.start;
            while self.buf.len() < want && self.fill().await? {}
            let take = want.min(self.buf.len());
            let window: Vec<u8> = self.buf.drain(..take).collect();
            self.pos += take;
            self.spans.pop_front();

            let rebased: Vec<EditOp> = span
                .changes
                .iter()
                .map(|op| EditOp {
                    start: op.start - span.start,
                    delete: op.delete,
                    insert: op.insert.clone(),
                })
                .collect();
            let patched = delta::apply(&window, &rebased);
            if let Some(chunk) = self.encode(patched)? {
                return Ok(Some(chunk));
            }
        }
    }

    async fn fill(&mut self) -> Result<bool> {
        if self.source_done {
            return Ok(false);
        }
        match self.source.next().await {
            Some(Ok(chunk)) => {
                self.buf.extend_from_slice(&chunk);
                Ok(true)
            }
            Some(Err(err)) => {
                self.finished = true;
                Err(err.into())
            }
            None => {
                self.source_done = true;
                Ok(false)
            }
        }
    }

    fn encode(&mut self, bytes: Vec<u8>) -> Result<Option<Chunk>> {
        match self.kind {
            ContentKind::Binary => {
                Ok((!bytes.is_empty()).then(|| Chunk::Binary(Bytes::from(bytes))))
            }
            ContentKind::Text | ContentKind::Structured => {
                let mut data = std::mem::take(&mut self.utf8_carry);
                data.extend_from_slice(&bytes);
                if data.is_empty() {
                    return Ok(None);
                }
                match String::from_utf8(data) {
                    Ok(text) => Ok(Some(Chunk::Text(text))),
                    Err(err) => {
                        let utf8_error = err.utf8_error();
                        if utf8_error.error_len().is_some() {
                            return Err(VersionError::InvalidText);
                        }
                        // Incomplete trailing code point: carry it forward.
                        let valid = utf8_error.valid_up_to();
                        let mut data = err.into_bytes();
                        self.utf8_carry = data.split_off(valid);
                        if data.is_empty() {
                            Ok(None)
                        } else {
                            let text =
                                String::from_utf8(data).map_err(|_| VersionError::InvalidText)?;
                            Ok(Some(Chunk::Text(text)))
                        }
                    }
                }
            }
        }
    }

    /// Adapt into a `futures::Stream` of chunks
    pub fn into_stream(self) -> impl Stream<Item = Result<Chunk>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Drain the sequence into a single byte buffer
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk.into_bytes());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::coalesce;
    use crate::record::{content_hash, ContentKind, HistoryRecord, Metadata, Version};
    use crate::store::chunk_stream;

    fn record(ordinal: u64, delta: Vec<EditOp>) -> HistoryRecord {
        HistoryRecord {
            version: Version::Ordinal(ordinal),
            kind: ContentKind::Text,
            hash: content_hash(b""),
            delta,
            mtime: 0,
            btime: None,
            blob: None,
            rebased: Vec::new(),
            published: None,
            metadata: Metadata::new(),
        }
    }

    fn op(start: usize, delete: usize, insert: &[u8]) -> EditOp {
        EditOp {
            start,
            delete,
            insert: insert.to_vec(),
        }
    }

    async fn reconstruct(
        root: &[u8],
        kind: ContentKind,
        history: &[HistoryRecord],
        chunk: usize,
    ) -> Vec<u8> {
        let spans = coalesce(history);
        let source = chunk_stream(Bytes::copy_from_slice(root), chunk);
        VersionStream::new(source, kind, spans)
            .collect_bytes()
            .await
            .unwrap()
    }

    fn eager(root: &[u8], history: &[HistoryRecord]) -> Vec<u8> {
        history
            .iter()
            .fold(root.to_vec(), |content, record| {
                delta::apply(&content, &record.delta)
            })
    }

    #[tokio::test]
    async fn test_no_spans_passes_through() {
        let history = vec![record(1, Vec::new())];
        let out = reconstruct(b"hello world", ContentKind::Text, &history, 4).await;
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_single_edit_across_chunk_boundary() {
        let root = b"hello there jake!";
        let history = vec![record(1, Vec::new()), record(2, vec![op(12, 4, b"bill")])];
        for chunk in [1, 3, 4, 16, 64] {
            let out = reconstruct(root, ContentKind::Text, &history, chunk).await;
            assert_eq!(out, eager(root, &history));
            assert_eq!(out, b"hello there bill!");
        }
    }

    #[tokio::test]
    async fn test_stacked_same_length_edits() {
        let root = b"aaaa bbbb cccc";
        let history = vec![
            record(1, Vec::new()),
            record(2, vec![op(0, 4, b"xxxx")]),
            record(3, vec![op(10, 4, b"yyyy")]),
        ];
        let out = reconstruct(root, ContentKind::Text, &history, 3).await;
        assert_eq!(out, eager(root, &history));
        assert_eq!(out, b"xxxx bbbb yyyy");
    }

    #[tokio::test]
    async fn test_appends_past_end_of_root() {
        let root = b"base";
        let history = vec![
            record(1, Vec::new()),
            record(2, vec![op(4, 0, b"-v2")]),
            record(3, vec![op(7, 0, b"-v3")]),
        ];
        let out = reconstruct(root, ContentKind::Text, &history, 2).await;
        assert_eq!(out, eager(root, &history));
        assert_eq!(out, b"base-v2-v3");
    }

    #[tokio::test]
    async fn test_binary_passthrough() {
        let root: Vec<u8> = (0u8..=255).collect();
        let history = vec![record(1, Vec::new()), record(2, vec![op(10, 5, &[1, 2])])];
        let out = reconstruct(&root, ContentKind::Binary, &history, 7).await;
        assert_eq!(out, eager(&root, &history));
    }

    #[tokio::test]
    async fn test_text_chunks_respect_utf8_boundaries() {
        let root = "héllo wörld".as_bytes();
        let history = vec![record(1, Vec::new())];
        let spans = coalesce(&history);
        // chunk size 1 splits every multi-byte code point
        let source = chunk_stream(Bytes::copy_from_slice(root), 1);
        let mut stream = VersionStream::new(source, ContentKind::Text, spans);
        let mut text = String::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            match chunk {
                Chunk::Text(part) => text.push_str(&part),
                other => panic!("unexpected chunk {:?}", other),
            }
        }
        assert_eq!(text, "héllo wörld");
    }

    #[tokio::test]
    async fn test_stream_adapter_yields_same_bytes() {
        let root = b"stream me through the adapter";
        let history = vec![record(1, Vec::new()), record(2, vec![op(7, 2, b"XY")])];
        let spans = coalesce(&history);
        let source = chunk_stream(Bytes::copy_from_slice(root), 5);
        let stream = VersionStream::new(source, ContentKind::Text, spans);
        let chunks: Vec<_> = stream.into_stream().collect::<Vec<_>>().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk.unwrap().into_bytes());
        }
        assert_eq!(out, eager(root, &history));
    }

    #[tokio::test]
    async fn test_materialized_single_chunk() {
        let value = serde_json::json!({"message": "hi"});
        let mut stream = VersionStream::materialized(Chunk::Structured(value.clone()));
        assert_eq!(
            stream.next_chunk().await.unwrap(),
            Some(Chunk::Structured(value))
        );
        assert_eq!(stream.next_chunk().await.unwrap(), None);
    }
}
