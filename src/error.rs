//! Error types for the journal gateway.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the journal adapter and the streaming layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A request carried input we could not parse (bad range, bad boolean,
    /// malformed cursor, empty argument name).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The journal store refused or failed an operation.
    #[error("journal error: {0}")]
    Journal(String),

    /// The journal is not positioned on an entry.
    #[error("no entry at the current journal position")]
    NoCurrentEntry,

    /// An entry or field could not be serialized in the requested mode.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A failure after response headers were committed. It cannot be shaped
    /// into an error response anymore; the chunked body is aborted instead.
    #[error("stream aborted: {0}")]
    StreamAbort(String),

    /// A machine metadata probe failed.
    #[error("probe error: {0}")]
    Probe(String),

    /// TLS material could not be loaded or assembled.
    #[error("tls error: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
