use std::io;
use thiserror::Error;

/// Errors raised by the key, transform, storage and vault layers.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Unknown cipher identifier, or key length that does not match the cipher
    #[error("unsupported cipher or key length: {0}")]
    UnsupportedCipherOrKeyLength(String),

    /// Textual key could not be decoded
    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    /// Source or destination stream could not be opened
    #[error("unable to open stream for {path}: {source}")]
    StreamOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Reading from the source stream failed mid-transform
    #[error("stream read error: {0}")]
    StreamRead(#[source] io::Error),

    /// Writing to the destination stream failed mid-transform
    #[error("stream write error: {0}")]
    StreamWrite(#[source] io::Error),

    /// The cipher rejected the ciphertext (wrong key or corrupted data)
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Metadata, existence or delete call on the storage backend failed
    #[error("storage error: {0}")]
    Storage(String),

    /// No storage location is registered under this name
    #[error("unknown disk: {0}")]
    UnknownDisk(String),
}

impl VaultError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCipherOrKeyLength(msg.into())
    }

    pub fn key_encoding(msg: impl Into<String>) -> Self {
        Self::KeyEncoding(msg.into())
    }

    pub fn open(path: impl Into<String>, source: io::Error) -> Self {
        Self::StreamOpen {
            path: path.into(),
            source,
        }
    }

    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
