//! Per-request state and the header / query parsers.
//!
//! A [`RequestContext`] collects everything a streaming response needs to
//! know before the first body byte is produced: the output mode from
//! `Accept`, the window from `Range: entries=…`, and the flags and journal
//! matches from the URL query. Field-equality matches are applied directly
//! to the journal handle as the query is walked; the first parse error wins
//! and aborts the walk.

use axum::http::{header, HeaderMap};

use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::machine::MachineProbe;
use crate::output::OutputMode;

/// Field name used for restricting a request to the current boot.
const BOOT_ID_FIELD: &str = "_BOOT_ID";

/// Everything parsed out of one `/entries` request.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Output representation, from the `Accept` header.
    pub mode: OutputMode,
    /// Entry cursor to start from, from the `Range` header.
    pub cursor: Option<String>,
    /// Signed skip applied on the first advance; sign encodes direction.
    pub n_skip: i64,
    /// Upper bound on emitted entries; `None` means unbounded.
    pub n_entries: Option<u64>,
    /// Long-poll for new entries at end-of-data.
    pub follow: bool,
    /// Serve at most the single entry identified by `cursor`.
    pub discrete: bool,
}

impl RequestContext {
    /// Applies the `Accept` header. Unknown values select `Short`; a missing
    /// header leaves the default untouched.
    pub fn parse_accept(&mut self, headers: &HeaderMap) {
        if let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
            self.mode = OutputMode::from_accept(accept);
        }
    }

    /// Applies the `Range` header.
    ///
    /// The recognized grammar is `entries=<cursor>[:<n_skip>[:<n_entries>]]`;
    /// a missing header or a different range unit is a no-op. The cursor may
    /// be empty (seek by skip sign alone), the skip is signed decimal, the
    /// count unsigned decimal and strictly positive.
    pub fn parse_range(&mut self, headers: &HeaderMap) -> Result<()> {
        let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
            return Ok(());
        };
        let Some(rest) = range.strip_prefix("entries=") else {
            return Ok(());
        };
        let rest = rest.trim_start();

        let mut parts = rest.splitn(3, ':');
        let cursor = parts.next().unwrap_or("").trim_end();
        if let Some(skip) = parts.next() {
            let skip = skip.trim();
            if !skip.is_empty() {
                self.n_skip = skip
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad skip: {skip:?}")))?;
            }
        }
        if let Some(count) = parts.next() {
            let count = count.trim();
            if !count.is_empty() {
                let count: u64 = count
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad entry count: {count:?}")))?;
                if count == 0 {
                    return Err(Error::InvalidInput("entry count must be positive".into()));
                }
                self.n_entries = Some(count);
            }
        }
        if !cursor.is_empty() {
            self.cursor = Some(cursor.to_string());
        }
        Ok(())
    }

    /// Walks the URL query pairs, setting flags and applying matches.
    ///
    /// `follow`, `discrete` and `boot` are booleans (present without a value
    /// means true); `boot` restricts the journal to the current boot id; any
    /// other key adds a `KEY=VALUE` match. An empty key is an error.
    pub fn parse_arguments(
        &mut self,
        query: &str,
        journal: &mut dyn Journal,
        probe: &dyn MachineProbe,
    ) -> Result<()> {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key.is_empty() {
                return Err(Error::InvalidInput("empty argument name".into()));
            }
            match &*key {
                "follow" => self.follow = value.is_empty() || parse_boolean(&value)?,
                "discrete" => self.discrete = value.is_empty() || parse_boolean(&value)?,
                "boot" => {
                    if value.is_empty() || parse_boolean(&value)? {
                        let boot_id = probe
                            .boot_id()
                            .map_err(|err| Error::InvalidInput(err.to_string()))?;
                        journal.add_match(BOOT_ID_FIELD, boot_id.as_bytes())?;
                    }
                }
                _ => journal.add_match(&key, value.as_bytes())?,
            }
        }
        Ok(())
    }

    /// Positions the journal according to the parsed window: at the cursor
    /// when one was given, otherwise at head or tail per the skip sign.
    pub fn seek(&self, journal: &mut dyn Journal) -> Result<()> {
        match &self.cursor {
            Some(cursor) => journal.seek_cursor(cursor),
            None if self.n_skip >= 0 => journal.seek_head(),
            None => journal.seek_tail(),
        }
    }
}

/// Boolean grammar shared by the flag arguments.
pub fn parse_boolean(value: &str) -> Result<bool> {
    match value {
        "1" | "yes" | "y" | "true" | "t" | "on" => Ok(true),
        "0" | "no" | "n" | "false" | "f" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!("bad boolean: {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use bytes::Bytes;

    use crate::memory::MemoryStore;
    use crate::MachineProbe;

    use super::*;

    struct FixedProbe;

    impl MachineProbe for FixedProbe {
        fn machine_id(&self) -> crate::Result<String> {
            Ok("0".repeat(32))
        }
        fn boot_id(&self) -> crate::Result<String> {
            Ok("b".repeat(32))
        }
        fn hostname(&self) -> crate::Result<String> {
            Ok("test".into())
        }
        fn os_pretty_name(&self) -> Option<String> {
            None
        }
        fn virtualization(&self) -> String {
            "bare".into()
        }
    }

    fn headers_with_range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn should_parse_full_range() {
        // given
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_range(&headers_with_range("entries=s=2a:-5:10")).unwrap();

        // then
        assert_eq!(ctx.cursor.as_deref(), Some("s=2a"));
        assert_eq!(ctx.n_skip, -5);
        assert_eq!(ctx.n_entries, Some(10));
    }

    #[test]
    fn should_parse_range_with_empty_cursor() {
        // given
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_range(&headers_with_range("entries=:-1:1")).unwrap();

        // then
        assert_eq!(ctx.cursor, None);
        assert_eq!(ctx.n_skip, -1);
        assert_eq!(ctx.n_entries, Some(1));
    }

    #[test]
    fn should_parse_cursor_only_range() {
        // given
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_range(&headers_with_range("entries= s=5 ")).unwrap();

        // then - surrounding whitespace is stripped from the cursor
        assert_eq!(ctx.cursor.as_deref(), Some("s=5"));
        assert_eq!(ctx.n_skip, 0);
        assert_eq!(ctx.n_entries, None);
    }

    #[test]
    fn should_ignore_missing_or_foreign_range() {
        // given
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_range(&HeaderMap::new()).unwrap();
        ctx.parse_range(&headers_with_range("bytes=0-100")).unwrap();

        // then
        assert_eq!(ctx.cursor, None);
        assert_eq!(ctx.n_skip, 0);
        assert_eq!(ctx.n_entries, None);
    }

    #[test]
    fn should_reject_zero_count() {
        // given
        let mut ctx = RequestContext::default();

        // when
        let result = ctx.parse_range(&headers_with_range("entries=::0"));

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn should_reject_malformed_skip() {
        // given
        let mut ctx = RequestContext::default();

        // when/then
        assert!(ctx.parse_range(&headers_with_range("entries=:abc:1")).is_err());
    }

    #[test]
    fn should_parse_accept_into_mode() {
        // given
        let mut ctx = RequestContext::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        // when
        ctx.parse_accept(&headers);

        // then
        assert_eq!(ctx.mode, OutputMode::Json);
    }

    #[test]
    fn should_default_to_short_for_unknown_accept() {
        // given
        let mut ctx = RequestContext::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        // when
        ctx.parse_accept(&headers);

        // then
        assert_eq!(ctx.mode, OutputMode::Short);
    }

    #[test]
    fn should_parse_boolean_grammar() {
        // given
        let truthy = ["1", "yes", "y", "true", "t", "on"];
        let falsy = ["0", "no", "n", "false", "f", "off"];

        // when/then
        for value in truthy {
            assert!(parse_boolean(value).unwrap());
        }
        for value in falsy {
            assert!(!parse_boolean(value).unwrap());
        }
        assert!(parse_boolean("maybe").is_err());
    }

    #[test]
    fn should_set_flags_from_bare_arguments() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        let mut journal = store.open();
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_arguments("follow&discrete", &mut journal, &FixedProbe)
            .unwrap();

        // then
        assert!(ctx.follow);
        assert!(ctx.discrete);
    }

    #[test]
    fn should_honor_explicit_boolean_values() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        let mut journal = store.open();
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_arguments("follow=false&discrete=1", &mut journal, &FixedProbe)
            .unwrap();

        // then
        assert!(!ctx.follow);
        assert!(ctx.discrete);
    }

    #[test]
    fn should_apply_field_match_from_arbitrary_key() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        store.append(vec![("UNIT".into(), Bytes::from("a.service"))]);
        store.append(vec![("UNIT".into(), Bytes::from("b.service"))]);
        let mut journal = store.open();
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_arguments("UNIT=b.service", &mut journal, &FixedProbe)
            .unwrap();

        // then - the cursor only visits the matching entry
        journal.seek_head().unwrap();
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().seq, 1);
        assert!(!journal.next().unwrap());
    }

    #[test]
    fn should_restrict_to_current_boot() {
        // given - FixedProbe reports boot id bbbb…, the store holds cccc…
        let store = MemoryStore::new("c".repeat(32));
        store.append(vec![("MESSAGE".into(), Bytes::from("other boot"))]);
        let mut journal = store.open();
        let mut ctx = RequestContext::default();

        // when
        ctx.parse_arguments("boot", &mut journal, &FixedProbe).unwrap();

        // then
        journal.seek_head().unwrap();
        assert!(!journal.next().unwrap());
    }

    #[test]
    fn should_reject_empty_argument_name() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        let mut journal = store.open();
        let mut ctx = RequestContext::default();

        // when
        let result = ctx.parse_arguments("=value", &mut journal, &FixedProbe);

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn should_seek_by_cursor_then_skip_sign() {
        // given
        let store = MemoryStore::new("b".repeat(32));
        store.append(vec![("MESSAGE".into(), Bytes::from("one"))]);
        store.append(vec![("MESSAGE".into(), Bytes::from("two"))]);

        // when - a cursor is present
        let mut journal = store.open();
        let ctx = RequestContext {
            cursor: Some("s=1".into()),
            ..Default::default()
        };
        ctx.seek(&mut journal).unwrap();

        // then - the journal is positioned at the cursor
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().seq, 1);

        // when - no cursor, negative skip
        let mut journal = store.open();
        let ctx = RequestContext {
            n_skip: -1,
            ..Default::default()
        };
        ctx.seek(&mut journal).unwrap();

        // then - the journal is positioned at the tail
        assert!(journal.previous().unwrap());
        assert_eq!(journal.current().unwrap().seq, 1);

        // when - no cursor, non-negative skip
        let mut journal = store.open();
        let ctx = RequestContext::default();
        ctx.seek(&mut journal).unwrap();

        // then - the journal is positioned at the head
        assert!(journal.next().unwrap());
        assert_eq!(journal.current().unwrap().seq, 0);
    }
}
