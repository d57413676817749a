//! Error types for hostblock.

use thiserror::Error;

/// Error type for hostblock operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid index file magic bytes
    #[error("invalid magic bytes: expected HBIDX header")]
    InvalidMagic,

    /// Unsupported index format version
    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    /// Checksum mismatch on a persisted index
    #[error("index checksum mismatch")]
    ChecksumMismatch,

    /// Index file too small to contain a header
    #[error("invalid header size: expected {expected}, got {actual}")]
    InvalidHeaderSize { expected: usize, actual: usize },

    /// Hostname exceeds the 253 byte limit
    #[error("hostname exceeds 253 bytes")]
    HostTooLong,

    /// Non-printable byte in a filter-list line
    #[error("control byte 0x{0:02x} in filter list entry")]
    ControlByte(u8),

    /// Tokenizer output buffer exhausted
    #[error("host entry buffer overflow")]
    BufferOverflow,

    /// Content-Encoding the fetcher cannot decode
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    /// Download failure for a single source URL
    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// Failure attributed to one configured source
    #[error("source {url}: {source}")]
    Source {
        url: String,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Attach the offending source URL to an error.
    pub(crate) fn for_source(self, url: &str) -> Self {
        Error::Source {
            url: url.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for hostblock operations.
pub type Result<T> = std::result::Result<T, Error>;
