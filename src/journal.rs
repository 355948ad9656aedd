//! The journal adapter: a positioned cursor over an append-only store.
//!
//! The gateway treats the store behind an opaque cursor API so that the
//! streaming layer can be exercised against a mock. [`Journal`] is that API:
//! seek, step, match, wait, and enumerate operations over a store that only
//! ever grows. A fresh journal is opened per request through a
//! [`JournalOpener`]; the handle is positioned before the first entry and
//! owns its match set and unique-query state.
//!
//! Step operations return `Ok(true)` when the journal is positioned on an
//! entry afterwards and `Ok(false)` on end-of-data, mirroring the
//! success / end-of-data / failure triple of the underlying store protocol.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::model::Entry;
use crate::output::{self, OutputMode};

/// Outcome of waiting for the store to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// Entries were appended since the journal last hit end-of-data.
    NewData,
    /// The timeout elapsed without a change.
    Timeout,
}

/// A positioned, read-only cursor into the journal store.
#[async_trait]
pub trait Journal: Send {
    /// Restricts iteration to entries whose `field` equals `value`.
    ///
    /// Matches on the same field are ORed, matches across fields are ANDed.
    fn add_match(&mut self, field: &str, value: &[u8]) -> Result<()>;

    /// Positions the cursor before the first entry.
    fn seek_head(&mut self) -> Result<()>;

    /// Positions the cursor after the last entry.
    fn seek_tail(&mut self) -> Result<()>;

    /// Positions the cursor so that the next forward step lands on the
    /// entry the cursor identifies, or on the nearest following entry.
    fn seek_cursor(&mut self, cursor: &str) -> Result<()>;

    /// Tests whether the current entry is the one the cursor identifies.
    fn test_cursor(&self, cursor: &str) -> Result<bool>;

    /// Advances to the next matching entry.
    fn next(&mut self) -> Result<bool>;

    /// Moves back to the previous matching entry.
    fn previous(&mut self) -> Result<bool>;

    /// Advances up to `n` matching entries. Returns `Ok(true)` if at least
    /// one step succeeded, leaving the cursor on the furthest entry reached.
    fn next_skip(&mut self, n: u64) -> Result<bool>;

    /// Moves back up to `n` matching entries, symmetric to [`next_skip`].
    ///
    /// [`next_skip`]: Journal::next_skip
    fn previous_skip(&mut self, n: u64) -> Result<bool>;

    /// Blocks until entries are appended past the position where this
    /// journal last observed end-of-data, or until `timeout` elapses.
    async fn wait(&mut self, timeout: Duration) -> Result<WaitEvent>;

    /// Returns the entry the cursor is positioned on.
    fn current(&self) -> Result<Entry>;

    /// Returns the cursor string of the current entry.
    fn cursor(&self) -> Result<String>;

    /// Begins a unique-value query for `field`, resetting any previous one.
    fn query_unique(&mut self, field: &str) -> Result<()>;

    /// Returns the next distinct `FIELD=value` item of the active unique
    /// query, or `None` when exhausted.
    fn enumerate_unique(&mut self) -> Result<Option<Bytes>>;

    /// Approximate disk usage of the store, in bytes.
    fn usage(&self) -> Result<u64>;

    /// Wall-clock timestamps of the oldest and newest entries, in
    /// microseconds since the epoch; `(0, 0)` for an empty store.
    fn cutoff_realtime(&self) -> Result<(u64, u64)>;

    /// Serializes the current entry into `buf` in the given output mode.
    fn serialize_current(&self, buf: &mut Vec<u8>, mode: OutputMode) -> Result<()> {
        let entry = self.current()?;
        output::write_entry(buf, &entry, mode)
    }
}

/// Opens fresh journal handles, one per request.
pub trait JournalOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn Journal>>;
}
