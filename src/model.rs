//! Core data types for the journal gateway.
//!
//! The unit of data is the [`Entry`]: an immutable record of `KEY=VALUE`
//! fields with binary-safe values, stamped with a sequence number and
//! timestamps at append time. Entries are identified across requests by an
//! opaque cursor string derived from the sequence number.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Global sequence number for journal entries.
///
/// Sequence numbers are monotonically increasing integers assigned to each
/// entry at append time. They provide a total ordering over the journal and
/// are the basis of the cursor encoding.
pub type Sequence = u64;

/// A single journal entry.
///
/// Each entry carries the user-supplied fields plus the metadata the store
/// assigns when the entry is appended. Field values are binary-safe; field
/// names are plain strings by journal convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Position of this entry in the journal.
    pub seq: Sequence,

    /// Wall-clock time of the append, in microseconds since the epoch.
    pub realtime_usec: u64,

    /// Monotonic time of the append, in microseconds since store creation.
    pub monotonic_usec: u64,

    /// Identifier of the boot during which the entry was written,
    /// rendered as 32 lowercase hex digits.
    pub boot_id: String,

    /// The `KEY=VALUE` payload. Names may repeat.
    pub fields: Vec<(String, Bytes)>,
}

impl Entry {
    /// Returns the value of the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Returns the first field with the given name as UTF-8 text, if it is
    /// valid UTF-8.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Returns the opaque cursor identifying this entry.
    pub fn cursor(&self) -> String {
        format_cursor(self.seq)
    }

    /// Rough on-disk footprint of the entry, used for usage accounting.
    pub(crate) fn approx_size(&self) -> u64 {
        let payload: usize = self
            .fields
            .iter()
            .map(|(key, value)| key.len() + value.len() + 1)
            .sum();
        payload as u64 + 64
    }
}

/// Renders the cursor for a sequence number.
pub fn format_cursor(seq: Sequence) -> String {
    format!("s={seq:x}")
}

/// Parses a cursor string back into a sequence number.
///
/// Cursors are opaque to clients but must survive a round-trip through them
/// unchanged; anything that does not look like one of ours is rejected.
pub fn parse_cursor(cursor: &str) -> Result<Sequence> {
    let hex = cursor
        .strip_prefix("s=")
        .ok_or_else(|| Error::InvalidInput(format!("unrecognized cursor: {cursor:?}")))?;
    Sequence::from_str_radix(hex, 16)
        .map_err(|_| Error::InvalidInput(format!("unrecognized cursor: {cursor:?}")))
}
