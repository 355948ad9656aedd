//! In-memory journal store.
//!
//! [`MemoryStore`] is a shared, appendable store; [`MemoryJournal`] is a
//! per-request cursor over it implementing the [`Journal`] adapter. The
//! store only grows, so cursor positions are modeled as a sequence-number
//! watermark: stepping forward finds the first matching entry past the
//! watermark, stepping backward the nearest one before it. Appends wake
//! blocked `wait` callers through a [`tokio::sync::Notify`].
//!
//! This is the store the shipped binary serves and the mock the streaming
//! tests drive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::journal::{Journal, JournalOpener, WaitEvent};
use crate::model::{format_cursor, parse_cursor, Entry, Sequence};

struct Shared {
    entries: RwLock<Vec<Entry>>,
    notify: Notify,
    boot_id: String,
    next_monotonic: AtomicU64,
}

/// A shared, append-only journal store.
///
/// Cloning is cheap and clones share the same entries. Readers open
/// independent cursors through [`MemoryStore::open`] (or the
/// [`JournalOpener`] impl).
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store whose entries carry the given boot id.
    pub fn new(boot_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(Vec::new()),
                notify: Notify::new(),
                boot_id: boot_id.into(),
                next_monotonic: AtomicU64::new(0),
            }),
        }
    }

    /// Appends an entry with the current wall-clock timestamp.
    pub fn append(&self, fields: Vec<(String, Bytes)>) -> Sequence {
        self.append_at(now_usec(), fields)
    }

    /// Appends an entry with an explicit wall-clock timestamp.
    pub fn append_at(&self, realtime_usec: u64, fields: Vec<(String, Bytes)>) -> Sequence {
        // Synthetic monotonic clock: strictly increasing across appends even
        // when callers supply out-of-order wall-clock timestamps.
        let monotonic_usec = self.shared.next_monotonic.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.shared.entries.write().expect("store lock poisoned");
        let seq = entries.len() as Sequence;
        entries.push(Entry {
            seq,
            realtime_usec,
            monotonic_usec,
            boot_id: self.shared.boot_id.clone(),
            fields,
        });
        drop(entries);
        self.shared.notify.notify_waiters();
        seq
    }

    /// Number of entries in the store.
    pub fn len(&self) -> usize {
        self.shared.entries.read().expect("store lock poisoned").len()
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a fresh cursor positioned before the first entry.
    pub fn open(&self) -> MemoryJournal {
        MemoryJournal {
            shared: self.shared.clone(),
            matches: Vec::new(),
            pos: Position::BeforeHead,
            unique: None,
            eof_len: 0,
        }
    }
}

impl JournalOpener for MemoryStore {
    fn open(&self) -> Result<Box<dyn Journal>> {
        Ok(Box::new(MemoryStore::open(self)))
    }
}

fn now_usec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeHead,
    At(Sequence),
    AfterTail,
}

/// A per-request cursor over a [`MemoryStore`].
pub struct MemoryJournal {
    shared: Arc<Shared>,
    matches: Vec<(String, Vec<Bytes>)>,
    pos: Position,
    unique: Option<std::vec::IntoIter<Bytes>>,
    /// Store length observed when a step last reported end-of-data.
    eof_len: u64,
}

impl MemoryJournal {
    fn entry_matches(&self, entry: &Entry) -> bool {
        self.matches.iter().all(|(field, values)| {
            values.iter().any(|value| {
                if field == "_BOOT_ID" {
                    entry.boot_id.as_bytes() == &value[..]
                } else {
                    entry
                        .fields
                        .iter()
                        .any(|(key, field_value)| key == field && field_value == value)
                }
            })
        })
    }

    /// First matching entry with `seq >= from`, scanning forward.
    fn find_forward(&self, entries: &[Entry], from: Sequence) -> Option<Sequence> {
        entries
            .iter()
            .skip(from as usize)
            .find(|entry| self.entry_matches(entry))
            .map(|entry| entry.seq)
    }

    /// Nearest matching entry with `seq < before`, scanning backward.
    fn find_backward(&self, entries: &[Entry], before: Sequence) -> Option<Sequence> {
        entries
            .iter()
            .take((before as usize).min(entries.len()))
            .rev()
            .find(|entry| self.entry_matches(entry))
            .map(|entry| entry.seq)
    }

    fn step_next(&mut self) -> bool {
        let entries = self.shared.entries.read().expect("store lock poisoned");
        let found = match self.pos {
            Position::BeforeHead => self.find_forward(&entries, 0),
            Position::At(seq) => self.find_forward(&entries, seq + 1),
            Position::AfterTail => None,
        };
        match found {
            Some(seq) => {
                self.pos = Position::At(seq);
                true
            }
            None => {
                self.eof_len = entries.len() as u64;
                false
            }
        }
    }

    fn step_previous(&mut self) -> bool {
        let entries = self.shared.entries.read().expect("store lock poisoned");
        let found = match self.pos {
            Position::BeforeHead => None,
            Position::At(seq) => self.find_backward(&entries, seq),
            Position::AfterTail => self.find_backward(&entries, entries.len() as Sequence),
        };
        match found {
            Some(seq) => {
                self.pos = Position::At(seq);
                true
            }
            None => {
                self.eof_len = entries.len() as u64;
                false
            }
        }
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    fn add_match(&mut self, field: &str, value: &[u8]) -> Result<()> {
        if field.is_empty() {
            return Err(Error::InvalidInput("empty match field".into()));
        }
        let value = Bytes::copy_from_slice(value);
        match self.matches.iter_mut().find(|(name, _)| name == field) {
            Some((_, values)) => values.push(value),
            None => self.matches.push((field.to_string(), vec![value])),
        }
        Ok(())
    }

    fn seek_head(&mut self) -> Result<()> {
        self.pos = Position::BeforeHead;
        Ok(())
    }

    fn seek_tail(&mut self) -> Result<()> {
        self.pos = Position::AfterTail;
        Ok(())
    }

    fn seek_cursor(&mut self, cursor: &str) -> Result<()> {
        let seq = parse_cursor(cursor)?;
        self.pos = match seq {
            0 => Position::BeforeHead,
            _ => Position::At(seq - 1),
        };
        Ok(())
    }

    fn test_cursor(&self, cursor: &str) -> Result<bool> {
        let seq = parse_cursor(cursor)?;
        match self.pos {
            Position::At(current) => Ok(current == seq),
            _ => Err(Error::NoCurrentEntry),
        }
    }

    fn next(&mut self) -> Result<bool> {
        Ok(self.step_next())
    }

    fn previous(&mut self) -> Result<bool> {
        Ok(self.step_previous())
    }

    fn next_skip(&mut self, n: u64) -> Result<bool> {
        let mut advanced = false;
        for _ in 0..n {
            if !self.step_next() {
                break;
            }
            advanced = true;
        }
        Ok(advanced)
    }

    fn previous_skip(&mut self, n: u64) -> Result<bool> {
        let mut moved = false;
        for _ in 0..n {
            if !self.step_previous() {
                break;
            }
            moved = true;
        }
        Ok(moved)
    }

    async fn wait(&mut self, timeout: Duration) -> Result<WaitEvent> {
        let notified = self.shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // An append may have raced the end-of-data observation.
        let len = self.shared.entries.read().expect("store lock poisoned").len() as u64;
        if len > self.eof_len {
            return Ok(WaitEvent::NewData);
        }

        tokio::select! {
            _ = notified => Ok(WaitEvent::NewData),
            _ = tokio::time::sleep(timeout) => Ok(WaitEvent::Timeout),
        }
    }

    fn current(&self) -> Result<Entry> {
        let Position::At(seq) = self.pos else {
            return Err(Error::NoCurrentEntry);
        };
        let entries = self.shared.entries.read().expect("store lock poisoned");
        entries
            .get(seq as usize)
            .filter(|entry| entry.seq == seq)
            .cloned()
            .ok_or(Error::NoCurrentEntry)
    }

    fn cursor(&self) -> Result<String> {
        let Position::At(seq) = self.pos else {
            return Err(Error::NoCurrentEntry);
        };
        Ok(format_cursor(seq))
    }

    fn query_unique(&mut self, field: &str) -> Result<()> {
        let entries = self.shared.entries.read().expect("store lock poisoned");
        let mut seen: Vec<Bytes> = Vec::new();
        let mut items: Vec<Bytes> = Vec::new();
        for entry in entries.iter() {
            for (key, value) in &entry.fields {
                if key == field && !seen.contains(value) {
                    seen.push(value.clone());
                    let mut item = Vec::with_capacity(field.len() + 1 + value.len());
                    item.extend_from_slice(field.as_bytes());
                    item.push(b'=');
                    item.extend_from_slice(value);
                    items.push(Bytes::from(item));
                }
            }
        }
        self.unique = Some(items.into_iter());
        Ok(())
    }

    fn enumerate_unique(&mut self) -> Result<Option<Bytes>> {
        match self.unique.as_mut() {
            Some(iter) => Ok(iter.next()),
            None => Err(Error::Journal("no unique-value query is active".into())),
        }
    }

    fn usage(&self) -> Result<u64> {
        let entries = self.shared.entries.read().expect("store lock poisoned");
        Ok(entries.iter().map(Entry::approx_size).sum())
    }

    fn cutoff_realtime(&self) -> Result<(u64, u64)> {
        let entries = self.shared.entries.read().expect("store lock poisoned");
        match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => Ok((first.realtime_usec, last.realtime_usec)),
            _ => Ok((0, 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, Bytes)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), Bytes::copy_from_slice(value.as_bytes())))
            .collect()
    }

    fn store_with_messages(messages: &[&str]) -> MemoryStore {
        let store = MemoryStore::new("b".repeat(32));
        for message in messages {
            store.append(fields(&[("MESSAGE", message)]));
        }
        store
    }

    #[test]
    fn should_walk_forward_from_head() {
        // given
        let store = store_with_messages(&["one", "two", "three"]);
        let mut journal = store.open();

        // when
        journal.seek_head().unwrap();

        // then
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().field_str("MESSAGE"), Some("one"));
        assert!(journal.next().unwrap());
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().field_str("MESSAGE"), Some("three"));
        assert!(!journal.next().unwrap());
    }

    #[test]
    fn should_walk_backward_from_tail() {
        // given
        let store = store_with_messages(&["one", "two", "three"]);
        let mut journal = store.open();

        // when
        journal.seek_tail().unwrap();

        // then
        assert!(journal.previous().unwrap());
        assert_eq!(journal.current().unwrap().field_str("MESSAGE"), Some("three"));
        assert!(journal.previous().unwrap());
        assert!(journal.previous().unwrap());
        assert_eq!(journal.current().unwrap().field_str("MESSAGE"), Some("one"));
        assert!(!journal.previous().unwrap());
    }

    #[test]
    fn should_stop_skip_at_boundary_and_keep_position() {
        // given
        let store = store_with_messages(&["one", "two"]);
        let mut journal = store.open();
        journal.seek_head().unwrap();

        // when - asking for more steps than available
        let stepped = journal.next_skip(5).unwrap();

        // then - still lands on the last entry
        assert!(stepped);
        assert_eq!(journal.current().unwrap().field_str("MESSAGE"), Some("two"));
    }

    #[test]
    fn should_report_no_movement_at_boundary() {
        // given
        let store = store_with_messages(&["one"]);
        let mut journal = store.open();
        journal.seek_head().unwrap();

        // when/then
        assert!(!journal.previous_skip(2).unwrap());
    }

    #[test]
    fn should_seek_to_cursor_and_test_it() {
        // given
        let store = store_with_messages(&["one", "two", "three"]);
        let mut journal = store.open();
        let cursor = format_cursor(1);

        // when
        journal.seek_cursor(&cursor).unwrap();
        assert!(journal.next().unwrap());

        // then
        assert!(journal.test_cursor(&cursor).unwrap());
        assert!(!journal.test_cursor(&format_cursor(2)).unwrap());
        assert_eq!(journal.cursor().unwrap(), cursor);
    }

    #[test]
    fn should_and_matches_across_fields_and_or_within() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        store.append(fields(&[("UNIT", "a.service"), ("PRIORITY", "3")]));
        store.append(fields(&[("UNIT", "b.service"), ("PRIORITY", "3")]));
        store.append(fields(&[("UNIT", "a.service"), ("PRIORITY", "6")]));
        let mut journal = store.open();

        // when
        journal.add_match("UNIT", b"a.service").unwrap();
        journal.add_match("UNIT", b"b.service").unwrap();
        journal.add_match("PRIORITY", b"3").unwrap();
        journal.seek_head().unwrap();

        // then
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().seq, 0);
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().seq, 1);
        assert!(!journal.next().unwrap());
    }

    #[test]
    fn should_match_boot_id_against_entry_metadata() {
        // given
        let store = store_with_messages(&["one"]);
        let mut journal = store.open();

        // when
        journal.add_match("_BOOT_ID", "b".repeat(32).as_bytes()).unwrap();
        journal.seek_head().unwrap();

        // then
        assert!(journal.next().unwrap());

        // when - a cursor filtered on a different boot
        let mut other = store.open();
        other.add_match("_BOOT_ID", "c".repeat(32).as_bytes()).unwrap();
        other.seek_head().unwrap();

        // then
        assert!(!other.next().unwrap());
    }

    #[test]
    fn should_enumerate_unique_values_in_first_seen_order() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        store.append(fields(&[("UNIT", "a.service")]));
        store.append(fields(&[("UNIT", "b.service")]));
        store.append(fields(&[("UNIT", "a.service")]));
        let mut journal = store.open();

        // when
        journal.query_unique("UNIT").unwrap();

        // then
        assert_eq!(
            journal.enumerate_unique().unwrap().unwrap().as_ref(),
            b"UNIT=a.service"
        );
        assert_eq!(
            journal.enumerate_unique().unwrap().unwrap().as_ref(),
            b"UNIT=b.service"
        );
        assert!(journal.enumerate_unique().unwrap().is_none());
    }

    #[test]
    fn should_reject_enumerate_without_query() {
        // given
        let store = store_with_messages(&[]);
        let mut journal = store.open();

        // when/then
        assert!(journal.enumerate_unique().is_err());
    }

    #[test]
    fn should_report_cutoff_from_first_and_last_entries() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        store.append_at(100, fields(&[("MESSAGE", "early")]));
        store.append_at(900, fields(&[("MESSAGE", "late")]));

        // when
        let journal = store.open();

        // then
        assert_eq!(journal.cutoff_realtime().unwrap(), (100, 900));
    }

    #[test]
    fn should_report_zero_cutoff_for_empty_store() {
        // given/when
        let journal = store_with_messages(&[]).open();

        // then
        assert_eq!(journal.cutoff_realtime().unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn should_wake_wait_on_append() {
        // given - a cursor that has observed end-of-data
        let store = store_with_messages(&[]);
        let mut journal = store.open();
        journal.seek_head().unwrap();
        assert!(!journal.next().unwrap());

        // when - an entry arrives while the cursor is waiting
        let appender = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.append(fields(&[("MESSAGE", "late arrival")]));
            })
        };
        let event = journal.wait(Duration::from_secs(5)).await.unwrap();
        appender.await.unwrap();

        // then
        assert_eq!(event, WaitEvent::NewData);
        assert!(journal.next().unwrap());
        assert_eq!(
            journal.current().unwrap().field_str("MESSAGE"),
            Some("late arrival")
        );
    }

    #[tokio::test]
    async fn should_time_out_wait_when_nothing_arrives() {
        // given - a cursor that has observed end-of-data
        let store = store_with_messages(&[]);
        let mut journal = store.open();
        journal.seek_head().unwrap();
        assert!(!journal.next().unwrap());

        // when
        let event = journal.wait(Duration::from_millis(10)).await.unwrap();

        // then
        assert_eq!(event, WaitEvent::Timeout);
    }
}
