//! The streaming response generators.
//!
//! The HTTP layer consumes response bodies as a sequence of byte chunks at
//! monotonically increasing absolute offsets, while the journal underneath
//! is a forward-only iterator that serializes one entry at a time. The
//! generators here bridge the two with a per-request scratch buffer and a
//! running offset base: `delta` is the absolute offset of the start of the
//! scratch within the response, so any read inside the current entry is
//! answered from the scratch and the journal advances exactly when the
//! caller has consumed it.
//!
//! [`EntryStream`] implements the full window policy (cursor + skip +
//! count, follow, discrete); [`FieldStream`] is the reduced variant walking
//! a unique-value query.
//!
//! Failures here happen after response headers are committed, so they
//! cannot be shaped into an error response; they surface as
//! [`Error::StreamAbort`] and terminate the chunked body.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures::Stream;

use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::output::{self, OutputMode};
use crate::server::metrics::Metrics;
use crate::server::request::RequestContext;

/// Chunk size the body stream hands to the HTTP layer.
pub(crate) const CHUNK_SIZE: usize = 4096;

/// Poll interval for `follow` mode. The wait is bounded so a dropped
/// connection cancels the stream within one interval.
const FOLLOW_POLL: Duration = Duration::from_millis(250);

/// One answer from a positioned read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadChunk {
    /// Bytes at the requested offset; never empty.
    Data(Bytes),
    /// The stream is complete.
    Eof,
}

/// Serializes successive journal entries and answers byte-range reads.
pub struct EntryStream {
    journal: Box<dyn Journal>,
    mode: OutputMode,
    cursor: Option<String>,
    n_skip: i64,
    n_entries: Option<u64>,
    follow: bool,
    discrete: bool,
    scratch: Vec<u8>,
    delta: u64,
    metrics: Option<Arc<Metrics>>,
}

impl EntryStream {
    /// Builds a generator from a seeked journal and a parsed request.
    pub fn new(journal: Box<dyn Journal>, ctx: RequestContext) -> Self {
        Self {
            journal,
            mode: ctx.mode,
            cursor: ctx.cursor,
            n_skip: ctx.n_skip,
            n_entries: ctx.n_entries,
            follow: ctx.follow,
            discrete: ctx.discrete,
            scratch: Vec::new(),
            delta: 0,
            metrics: None,
        }
    }

    /// Attaches stream counters.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns up to `max` bytes of the response starting at absolute
    /// offset `pos`, advancing the journal as entries are consumed.
    ///
    /// Reads are monotonically non-decreasing: `pos` below the offset of
    /// the current scratch is a contract violation.
    pub async fn read_at(&mut self, pos: u64, max: usize) -> Result<ReadChunk> {
        debug_assert!(pos >= self.delta);
        let Some(mut rel) = pos.checked_sub(self.delta) else {
            return Err(Error::StreamAbort(format!(
                "read at {pos} precedes stream offset {}",
                self.delta
            )));
        };

        while rel >= self.scratch.len() as u64 {
            // The current entry is fully consumed; serialize the next one.
            if self.n_entries == Some(0) {
                return Ok(ReadChunk::Eof);
            }

            let stepped = if self.n_skip < 0 {
                self.journal.previous_skip(self.n_skip.unsigned_abs() + 1)
            } else if self.n_skip > 0 {
                self.journal.next_skip(self.n_skip as u64 + 1)
            } else {
                self.journal.next()
            }
            .map_err(|err| abort("failed to advance journal pointer", err))?;

            if !stepped {
                if self.follow {
                    self.journal
                        .wait(FOLLOW_POLL)
                        .await
                        .map_err(|err| abort("failed to wait for journal event", err))?;
                    continue;
                }
                return Ok(ReadChunk::Eof);
            }

            if self.discrete {
                let Some(cursor) = self.cursor.as_deref() else {
                    return Err(Error::StreamAbort(
                        "discrete stream without a cursor".into(),
                    ));
                };
                let matches = self
                    .journal
                    .test_cursor(cursor)
                    .map_err(|err| abort("failed to test cursor", err))?;
                if !matches {
                    return Ok(ReadChunk::Eof);
                }
            }

            let consumed = self.scratch.len() as u64;
            rel -= consumed;
            self.delta += consumed;
            if let Some(n) = self.n_entries.as_mut() {
                *n -= 1;
            }
            // The skip folds into the first advance only.
            self.n_skip = 0;

            self.scratch.clear();
            self.journal
                .serialize_current(&mut self.scratch, self.mode)
                .map_err(|err| abort("failed to serialize entry", err))?;
            if let Some(metrics) = &self.metrics {
                metrics.entries_streamed_total.inc();
            }
        }

        Ok(copy_from_scratch(
            &self.scratch,
            rel,
            max,
            self.metrics.as_deref(),
        ))
    }

    /// Adapts the generator into a chunked byte stream for the HTTP layer.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::try_unfold((self, 0u64), |(mut stream, pos)| async move {
            match stream.read_at(pos, CHUNK_SIZE).await? {
                ReadChunk::Data(chunk) => {
                    let next = pos + chunk.len() as u64;
                    Ok(Some((chunk, (stream, next))))
                }
                ReadChunk::Eof => Ok(None),
            }
        })
    }

    /// Wraps the generator as a response body.
    pub fn into_body(self) -> Body {
        Body::from_stream(self.into_stream())
    }
}

/// Enumerates the distinct values of one field.
///
/// Offset bookkeeping is identical to [`EntryStream`] but there is no
/// window, no follow and no discrete guard; the walk ends when the
/// unique-value query is exhausted.
pub struct FieldStream {
    journal: Box<dyn Journal>,
    mode: OutputMode,
    n_fields: Option<u64>,
    scratch: Vec<u8>,
    delta: u64,
    metrics: Option<Arc<Metrics>>,
}

impl FieldStream {
    /// Builds a generator over a journal with an active unique-value query.
    pub fn new(journal: Box<dyn Journal>, mode: OutputMode) -> Self {
        Self {
            journal,
            mode,
            n_fields: None,
            scratch: Vec::new(),
            delta: 0,
            metrics: None,
        }
    }

    /// Attaches stream counters.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns up to `max` bytes of the response starting at absolute
    /// offset `pos`, advancing the unique-value walk as items are consumed.
    pub async fn read_at(&mut self, pos: u64, max: usize) -> Result<ReadChunk> {
        debug_assert!(pos >= self.delta);
        let Some(mut rel) = pos.checked_sub(self.delta) else {
            return Err(Error::StreamAbort(format!(
                "read at {pos} precedes stream offset {}",
                self.delta
            )));
        };

        while rel >= self.scratch.len() as u64 {
            if self.n_fields == Some(0) {
                return Ok(ReadChunk::Eof);
            }

            let item = self
                .journal
                .enumerate_unique()
                .map_err(|err| abort("failed to advance field index", err))?;
            let Some(item) = item else {
                return Ok(ReadChunk::Eof);
            };

            let consumed = self.scratch.len() as u64;
            rel -= consumed;
            self.delta += consumed;
            if let Some(n) = self.n_fields.as_mut() {
                *n -= 1;
            }

            self.scratch.clear();
            output::write_field(&mut self.scratch, &item, self.mode)
                .map_err(|err| abort("failed to serialize field", err))?;
            if let Some(metrics) = &self.metrics {
                metrics.fields_streamed_total.inc();
            }
        }

        Ok(copy_from_scratch(
            &self.scratch,
            rel,
            max,
            self.metrics.as_deref(),
        ))
    }

    /// Adapts the generator into a chunked byte stream for the HTTP layer.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::try_unfold((self, 0u64), |(mut stream, pos)| async move {
            match stream.read_at(pos, CHUNK_SIZE).await? {
                ReadChunk::Data(chunk) => {
                    let next = pos + chunk.len() as u64;
                    Ok(Some((chunk, (stream, next))))
                }
                ReadChunk::Eof => Ok(None),
            }
        })
    }

    /// Wraps the generator as a response body.
    pub fn into_body(self) -> Body {
        Body::from_stream(self.into_stream())
    }
}

/// Logs a mid-stream failure and converts it into the abort kind.
fn abort(context: &str, err: Error) -> Error {
    tracing::error!("{context}: {err}");
    Error::StreamAbort(err.to_string())
}

fn copy_from_scratch(
    scratch: &[u8],
    rel: u64,
    max: usize,
    metrics: Option<&Metrics>,
) -> ReadChunk {
    let rel = rel as usize;
    let len = (scratch.len() - rel).min(max);
    if let Some(metrics) = metrics {
        metrics.bytes_streamed_total.inc_by(len as u64);
    }
    ReadChunk::Data(Bytes::copy_from_slice(&scratch[rel..rel + len]))
}
