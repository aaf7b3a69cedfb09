//! High-level encrypt/decrypt operations on named storage locations.
//!
//! This module provides [`Vault`], the primary interface for encrypting and
//! decrypting files that live on one of the configured [`Disks`].
//!
//! ## Features
//!
//! - Default destination names (`.enc` appended on encrypt, stripped on decrypt)
//! - Optional deletion of the source once the transform has succeeded
//! - Streaming decryption into any caller-provided sink

use crate::error::{Result, VaultError};
use crate::key::Key;
use crate::storage::{Disks, Storage};
use crate::streaming::{ByteSink, ChunkedCipher};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Suffix given to encrypted files.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Suffix given to decrypted files whose name carries no `.enc` suffix.
pub const DECRYPTED_SUFFIX: &str = ".dec";

/// Default destination for encrypting `source`.
pub fn encrypted_name(source: &str) -> String {
    format!("{source}{ENCRYPTED_SUFFIX}")
}

/// Default destination for decrypting `source`.
pub fn decrypted_name(source: &str) -> String {
    match source.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => format!("{source}{DECRYPTED_SUFFIX}"),
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

pub struct Vault<'d, S> {
    key: Key,
    disk: String,
    disks: &'d Disks<S>,
}

impl<'d, S: Storage> Vault<'d, S> {
    /// Creates a vault on the registry's default disk.
    pub fn new(key: Key, disks: &'d Disks<S>) -> Self {
        Self {
            key,
            disk: disks.default_name().to_string(),
            disks,
        }
    }

    /// Selects the disk the following operations run against.
    pub fn disk(&mut self, name: impl Into<String>) -> &mut Self {
        self.disk = name.into();
        self
    }

    /// Replaces the encryption key.
    pub fn key(&mut self, key: Key) -> &mut Self {
        self.key = key;
        self
    }

    pub fn current_disk(&self) -> &str {
        &self.disk
    }

    /// Encrypts `source` into `dest` (default `<source>.enc`), returning the destination name.
    /// The source is deleted afterwards when `delete_source` is set and the transform succeeded.
    pub async fn encrypt(
        &self,
        source: &str,
        dest: Option<&str>,
        delete_source: bool,
    ) -> Result<String> {
        let dest = dest.map_or_else(|| encrypted_name(source), str::to_string);
        self.run(Direction::Encrypt, source, &dest, delete_source)
            .await?;
        Ok(dest)
    }

    /// Decrypts `source` into `dest`, returning the destination name.
    /// The default destination strips a trailing `.enc`, or appends `.dec` when there is none.
    pub async fn decrypt(
        &self,
        source: &str,
        dest: Option<&str>,
        delete_source: bool,
    ) -> Result<String> {
        let dest = dest.map_or_else(|| decrypted_name(source), str::to_string);
        self.run(Direction::Decrypt, source, &dest, delete_source)
            .await?;
        Ok(dest)
    }

    /// Decrypts `source` straight into `writer`. The source is left in place.
    pub async fn stream_decrypt<W: ByteSink>(&self, source: &str, writer: &mut W) -> Result<u64> {
        let storage = self.storage()?;
        debug!(disk = %self.disk, file = source, "decrypting file to stream");

        let mut reader = storage.open_read(source).await?;
        let source_len = storage.size(source).await?;
        let bytes = ChunkedCipher::new(&self.key)
            .decrypt(&mut reader, source_len, writer)
            .await?;

        info!(disk = %self.disk, file = source, bytes, "file decrypted to stream");
        Ok(bytes)
    }

    fn storage(&self) -> Result<&'d S> {
        self.disks.disk(&self.disk)
    }

    async fn run(
        &self,
        direction: Direction,
        source: &str,
        dest: &str,
        delete_source: bool,
    ) -> Result<()> {
        let storage = self.storage()?;
        debug!(disk = %self.disk, source, dest, ?direction, cipher = %self.key.cipher(), "starting transform");

        // opening the destination truncates it
        if storage.same_object(source, dest) {
            return Err(VaultError::storage(format!(
                "source and destination are the same file: {source:?}"
            )));
        }

        // source first, so a missing source leaves no empty destination behind
        let mut reader = storage.open_read(source).await?;
        let source_len = storage.size(source).await?;
        let mut writer = storage.open_write(dest).await?;

        let cipher = ChunkedCipher::new(&self.key);
        let bytes = match direction {
            Direction::Encrypt => cipher.encrypt(&mut reader, source_len, &mut writer).await?,
            Direction::Decrypt => cipher.decrypt(&mut reader, source_len, &mut writer).await?,
        };
        writer.shutdown().await.map_err(VaultError::StreamWrite)?;
        drop(writer);
        drop(reader);

        if delete_source {
            storage.delete(source).await?;
            debug!(disk = %self.disk, file = source, "source deleted");
        }

        info!(disk = %self.disk, source, dest, bytes, ?direction, "file transformed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Cipher;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_default_destination_names() {
        assert_eq!(encrypted_name("text.txt"), "text.txt.enc");
        assert_eq!(decrypted_name("text.txt.enc"), "text.txt");
        assert_eq!(decrypted_name("text.txt"), "text.txt.dec");
        assert_eq!(decrypted_name("archive.enc.bak"), "archive.enc.bak.dec");
        assert_eq!(decrypted_name(".enc"), ".enc.dec");
    }

    #[tokio::test]
    async fn test_setters_switch_disk_and_key() {
        let primary = MemoryStorage::new();
        let backup = MemoryStorage::new();
        let disks = Disks::single("primary", primary.clone()).with_disk("backup", backup.clone());
        backup.put("notes.txt", b"on the backup disk".to_vec()).unwrap();

        let mut vault = Vault::new(Key::make(Cipher::Aes128Cbc), &disks);
        assert_eq!(vault.current_disk(), "primary");

        let key = Key::make(Cipher::Aes256Cbc);
        vault.disk("backup").key(key.clone());
        let dest = vault.encrypt("notes.txt", None, true).await.unwrap();
        assert_eq!(dest, "notes.txt.enc");
        assert!(backup.get("notes.txt").unwrap().is_none());
        assert!(primary.get("notes.txt.enc").unwrap().is_none());

        // a fresh vault starts on the default disk, where the file does not exist
        let mut other = Vault::new(key, &disks);
        let mut out = Vec::new();
        assert!(other.stream_decrypt("notes.txt.enc", &mut out).await.is_err());

        other.disk("backup");
        other.stream_decrypt("notes.txt.enc", &mut out).await.unwrap();
        assert_eq!(out, b"on the backup disk");
    }

    #[tokio::test]
    async fn test_same_source_and_destination_is_refused() {
        let storage = MemoryStorage::new();
        let disks = Disks::single("memory", storage.clone());
        let vault = Vault::new(Key::make(Cipher::Aes128Cbc), &disks);
        storage.put("ledger.csv", b"a,b,c".to_vec()).unwrap();

        let err = vault.encrypt("ledger.csv", Some("ledger.csv"), true).await.unwrap_err();
        assert!(matches!(err, VaultError::Storage(_)));
        let err = vault.decrypt("ledger.csv", Some("ledger.csv"), false).await.unwrap_err();
        assert!(matches!(err, VaultError::Storage(_)));

        assert_eq!(storage.get("ledger.csv").unwrap().unwrap(), b"a,b,c");
    }

    #[tokio::test]
    async fn test_unknown_disk() {
        let disks = Disks::single("memory", MemoryStorage::new());
        let mut vault = Vault::new(Key::make(Cipher::Aes128Cbc), &disks);
        vault.disk("s3");

        let err = vault.encrypt("a.txt", None, false).await.unwrap_err();
        assert!(matches!(err, VaultError::UnknownDisk(name) if name == "s3"));
    }
}
