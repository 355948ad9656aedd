//! journal-gateway — an HTTP gateway over an append-only journal.
//!
//! The gateway exposes the host's journal as browsable, streamable content.
//! Clients issue GET requests to fetch ranges of entries, enumerate the
//! distinct values a field takes, retrieve machine metadata, or receive a
//! live tail of new entries as they arrive. Entries are served in four
//! interchangeable representations selected by the `Accept` header: a
//! human-readable short form, structured JSON, Server-Sent-Events JSON, and
//! the journal's native export form.
//!
//! # Architecture
//!
//! The journal store sits behind the [`Journal`] adapter, an opaque cursor
//! API opened once per request. The HTTP layer consumes response bodies as
//! byte ranges at arbitrary offsets; the stream generators in
//! [`server::stream`] translate those positioned reads onto the forward-only
//! cursor with a per-request scratch buffer and a running offset base.
//!
//! # Key Concepts
//!
//! - **Cursor**: an opaque string identifying one entry, stable across
//!   requests. The `Range: entries=<cursor>[:<skip>[:<count>]]` header
//!   positions and bounds the response window.
//! - **Follow**: long-poll mode; at end-of-data the stream waits for new
//!   entries instead of terminating.
//! - **Discrete**: single-entry mode; the response contains exactly the
//!   entry the cursor identifies, or nothing.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use journal_gateway::{GatewayConfig, GatewayServer, HostProbe, MemoryStore};
//!
//! let store = MemoryStore::new("0".repeat(32));
//! let server = GatewayServer::new(
//!     Arc::new(store.clone()),
//!     Arc::new(HostProbe),
//!     GatewayConfig::default(),
//! );
//! server.run().await?;
//! ```

mod error;
mod journal;
mod machine;
mod memory;
mod model;
mod output;
pub mod server;

pub use error::{Error, Result};
pub use journal::{Journal, JournalOpener, WaitEvent};
pub use machine::{
    hostname_cleanup, parse_os_release_pretty_name, HostProbe, MachineDescriptor, MachineProbe,
};
pub use memory::{MemoryJournal, MemoryStore};
pub use model::{format_cursor, parse_cursor, Entry, Sequence};
pub use output::{write_entry, write_field, OutputMode};
pub use server::{CliArgs, GatewayConfig, GatewayServer, TlsPaths};
