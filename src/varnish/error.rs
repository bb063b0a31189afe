// src/varnish/error.rs

/// Everything that can go wrong on a management connection. Every variant
/// means the connection is no longer usable and must be replaced.
#[derive(Debug, thiserror::Error)]
pub enum VarnishError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response header: {0:?}")]
    MalformedHeader(String),

    #[error("Short read: expected {expected} bytes, got {read}")]
    ShortRead { expected: usize, read: usize },

    #[error("Response body not terminated by newline")]
    MissingTerminator,

    #[error("Received code {actual}, expected {expected}")]
    UnexpectedStatus { expected: u16, actual: u16 },

    #[error("Varnish did not give authentication prompt (code {0})")]
    NoAuthChallenge(u16),

    #[error("Failed to authenticate (code {0})")]
    AuthRejected(u16),
}
