//! # FileVault - Streaming File Encryption Library
//!
//! FileVault encrypts and decrypts arbitrarily large files with AES-CBC,
//! one bounded chunk at a time, reading from local or remote storage that may
//! return short reads.
//!
//! ## Features
//!
//! - **AES-128-CBC / AES-256-CBC**: Key length validated against the cipher
//! - **Streaming API**: Memory use bounded by one 4KiB chunk
//! - **Short-Read Recovery**: Chunks that come back short are re-read
//! - **Named Disks**: Encrypt and decrypt files on any configured storage location
//!
//! ## Quick Start
//!
//! ```no_run
//! use filevault::{Cipher, Disks, Key, LocalStorage, Vault};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let disks = Disks::single("local", LocalStorage::new("./storage"));
//!     let vault = Vault::new(Key::make(Cipher::Aes256Cbc), &disks);
//!
//!     // report.pdf -> report.pdf.enc, keeping the original
//!     vault.encrypt("report.pdf", None, false).await?;
//!
//!     // report.pdf.enc -> report.pdf, removing the encrypted copy
//!     vault.decrypt("report.pdf.enc", None, true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## File Format
//!
//! A 16-byte random IV followed by CBC chunks; see [`streaming`]. No header,
//! length or MAC is stored, so the format provides confidentiality only.

pub mod config;
pub mod error;
pub mod key;
pub mod storage;
pub mod streaming;
pub mod vault;

// Re-export common types for convenience
pub use error::{Result, VaultError};
pub use key::{Cipher, Key};
pub use storage::{Disks, LocalStorage, MemoryStorage, Storage};
pub use streaming::{ByteSink, ByteSource, ChunkedCipher};
pub use vault::Vault;
