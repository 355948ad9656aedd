//! Output modes and entry serialization.
//!
//! The gateway serves the same entries in four interchangeable
//! representations. [`write_entry`] renders one entry per call into a caller
//! supplied buffer; [`write_field`] does the same for one `FIELD=value` item
//! of a unique-value query. Both append exactly the bytes of one item so the
//! streaming layer can account for offsets precisely.

use std::io::Write;

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::Entry;

/// The representation an entry is serialized in, selected by the `Accept`
/// header. Unknown accept values fall back to [`OutputMode::Short`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Human-readable one-line syslog style.
    #[default]
    Short,
    /// One JSON object per line.
    Json,
    /// JSON wrapped in Server-Sent-Events framing.
    JsonSse,
    /// The journal's native export form.
    Export,
}

impl OutputMode {
    /// The MIME type announced for responses in this mode.
    pub fn mime(self) -> &'static str {
        match self {
            OutputMode::Short => "text/plain",
            OutputMode::Json => "application/json",
            OutputMode::JsonSse => "text/event-stream",
            OutputMode::Export => "application/vnd.fdo.journal",
        }
    }

    /// Maps an `Accept` header value to a mode. Only exact matches of the
    /// known MIME types are recognized; everything else is `Short`.
    pub fn from_accept(header: &str) -> OutputMode {
        match header {
            "application/json" => OutputMode::Json,
            "text/event-stream" => OutputMode::JsonSse,
            "application/vnd.fdo.journal" => OutputMode::Export,
            _ => OutputMode::Short,
        }
    }
}

/// Serializes `entry` into `buf` in the given mode.
pub fn write_entry(buf: &mut Vec<u8>, entry: &Entry, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Short => write_short(buf, entry),
        OutputMode::Json => {
            write_json_object(buf, entry)?;
            buf.push(b'\n');
            Ok(())
        }
        OutputMode::JsonSse => {
            buf.extend_from_slice(b"data: ");
            write_json_object(buf, entry)?;
            buf.extend_from_slice(b"\n\n");
            Ok(())
        }
        OutputMode::Export => write_export(buf, entry),
    }
}

fn write_short(buf: &mut Vec<u8>, entry: &Entry) -> Result<()> {
    let timestamp = DateTime::from_timestamp_micros(entry.realtime_usec as i64)
        .ok_or_else(|| Error::Serialization(format!("timestamp {} out of range", entry.realtime_usec)))?;
    write!(buf, "{}", timestamp.format("%b %d %H:%M:%S"))?;

    if let Some(hostname) = entry.field_str("_HOSTNAME") {
        buf.push(b' ');
        buf.extend_from_slice(hostname.as_bytes());
    }

    let identifier = entry
        .field_str("SYSLOG_IDENTIFIER")
        .or_else(|| entry.field_str("_COMM"))
        .unwrap_or("unknown");
    buf.push(b' ');
    buf.extend_from_slice(identifier.as_bytes());
    if let Some(pid) = entry.field_str("_PID") {
        write!(buf, "[{pid}]")?;
    }
    buf.extend_from_slice(b": ");

    match entry.field("MESSAGE") {
        Some(message) => match std::str::from_utf8(message) {
            Ok(text) => buf.extend_from_slice(text.as_bytes()),
            Err(_) => buf.extend_from_slice(b"[blob data]"),
        },
        None => buf.extend_from_slice(b"[no message]"),
    }
    buf.push(b'\n');
    Ok(())
}

/// Renders one entry as a JSON object (no trailing newline).
fn write_json_object(buf: &mut Vec<u8>, entry: &Entry) -> Result<()> {
    let mut object = Map::new();
    object.insert("__CURSOR".into(), Value::String(entry.cursor()));
    object.insert(
        "__REALTIME_TIMESTAMP".into(),
        Value::String(entry.realtime_usec.to_string()),
    );
    object.insert(
        "__MONOTONIC_TIMESTAMP".into(),
        Value::String(entry.monotonic_usec.to_string()),
    );
    object.insert("_BOOT_ID".into(), Value::String(entry.boot_id.clone()));
    for (key, value) in &entry.fields {
        object.insert(key.clone(), json_field_value(value));
    }
    serde_json::to_writer(&mut *buf, &Value::Object(object))
        .map_err(|err| Error::Serialization(err.to_string()))
}

/// UTF-8 values become JSON strings; binary values become arrays of byte
/// numbers, preserving binary safety through the JSON representations.
fn json_field_value(value: &[u8]) -> Value {
    match std::str::from_utf8(value) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::Array(value.iter().map(|b| Value::from(*b)).collect()),
    }
}

fn write_export(buf: &mut Vec<u8>, entry: &Entry) -> Result<()> {
    write!(buf, "__CURSOR={}\n", entry.cursor())?;
    write!(buf, "__REALTIME_TIMESTAMP={}\n", entry.realtime_usec)?;
    write!(buf, "__MONOTONIC_TIMESTAMP={}\n", entry.monotonic_usec)?;
    write!(buf, "_BOOT_ID={}\n", entry.boot_id)?;
    for (key, value) in &entry.fields {
        match std::str::from_utf8(value) {
            Ok(text) if !text.contains('\n') => {
                buf.extend_from_slice(key.as_bytes());
                buf.push(b'=');
                buf.extend_from_slice(value);
                buf.push(b'\n');
            }
            _ => {
                // Binary-safe form: KEY, newline, little-endian length, raw bytes.
                buf.extend_from_slice(key.as_bytes());
                buf.push(b'\n');
                buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
                buf.extend_from_slice(value);
                buf.push(b'\n');
            }
        }
    }
    buf.push(b'\n');
    Ok(())
}

/// Serializes one `FIELD=value` item of a unique-value query.
///
/// In `Short` (and every other non-JSON) mode the value substring is emitted
/// followed by a newline; in `Json` mode a one-pair object is emitted. An
/// item without `=` violates the store contract and is an error.
pub fn write_field(buf: &mut Vec<u8>, data: &[u8], mode: OutputMode) -> Result<()> {
    let eq = data
        .iter()
        .position(|b| *b == b'=')
        .ok_or_else(|| Error::Serialization("unique entry lacks '=' separator".into()))?;
    let (key, value) = (&data[..eq], &data[eq + 1..]);

    if mode == OutputMode::Json {
        let key = std::str::from_utf8(key)
            .map_err(|_| Error::Serialization("field name is not UTF-8".into()))?;
        let key_json = serde_json::to_string(key)
            .map_err(|err| Error::Serialization(err.to_string()))?;
        let value_json = serde_json::to_string(&json_field_value(value))
            .map_err(|err| Error::Serialization(err.to_string()))?;
        write!(buf, "{{ {key_json} : {value_json} }}\n")?;
    } else {
        buf.extend_from_slice(value);
        buf.push(b'\n');
    }
    Ok(())
}
