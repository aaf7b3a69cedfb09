//! Chunked AES-CBC encryption and decryption for large files.
//!
//! This module provides [`ChunkedCipher`] for transforming a source stream
//! into a destination stream one bounded chunk at a time, so memory use stays
//! at O(chunk size) regardless of file size.
//!
//! ## File Format
//!
//! ```text
//! [iv:16][chunk0][chunk1]...[chunkN]
//!
//! chunk k   = AES-CBC(plaintext[k*4080 .. (k+1)*4080], iv_k) with PKCS#7 padding
//! iv_0      = random
//! iv_(k+1)  = first 16 bytes of chunk k
//! ```
//!
//! A full chunk holds 255 plaintext blocks and encrypts to 256 blocks
//! (4096 bytes). The last chunk always carries fewer than 4080 plaintext
//! bytes, so a plaintext that ends on a chunk boundary gets a trailing
//! padding-only chunk. There is no header magic, stored length or MAC.
//!
//! ## Short Reads
//!
//! Remote object stores may hand back fewer bytes than requested, or report
//! end-of-stream early. A chunk read keeps reading until the buffer is full
//! or the source returns zero bytes; a chunk that still holds fewer bytes than
//! the backend's reported size implies, the last chunk included, is re-read
//! after seeking back to its start.

use crate::error::{Result, VaultError};
use crate::key::{Cipher, Key};
use aes::{Aes128, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core::{OsRng, RngCore};
use std::io::{self, SeekFrom};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of the IV stored at the head of every encrypted file
pub const IV_SIZE: usize = 16;

/// Cipher blocks read from the plaintext per chunk
pub const BLOCKS_PER_CHUNK: usize = 255;

/// Plaintext bytes per chunk (4080)
pub const PLAIN_CHUNK_SIZE: usize = BLOCK_SIZE * BLOCKS_PER_CHUNK;

/// Ciphertext bytes per full chunk, one padding block larger (4096)
pub const CIPHER_CHUNK_SIZE: usize = BLOCK_SIZE * (BLOCKS_PER_CHUNK + 1);

/// Consecutive short reads tolerated on one chunk before giving up
pub const MAX_CHUNK_RETRIES: usize = 8;

/// Readable, seekable byte stream consumed by the transform.
pub trait ByteSource: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> ByteSource for T {}

/// Writable byte stream produced by the transform.
pub trait ByteSink: AsyncWrite + Unpin + Send {}

impl<T: AsyncWrite + Unpin + Send> ByteSink for T {}

/// Size of the encrypted file produced from `plain_len` plaintext bytes.
pub fn encrypted_len(plain_len: u64) -> u64 {
    let full_chunks = plain_len / PLAIN_CHUNK_SIZE as u64;
    let tail = plain_len % PLAIN_CHUNK_SIZE as u64;
    let tail_blocks = tail / BLOCK_SIZE as u64 + 1;
    IV_SIZE as u64 + full_chunks * CIPHER_CHUNK_SIZE as u64 + tail_blocks * BLOCK_SIZE as u64
}

/// ChunkedCipher performs the chunked CBC transform for one key.
/// Holds no state between calls; every call is a self-contained pass.
pub struct ChunkedCipher<'k> {
    key: &'k Key,
}

impl<'k> ChunkedCipher<'k> {
    pub fn new(key: &'k Key) -> Self {
        Self { key }
    }

    /// Encrypts `source` into `dest`, returning the number of plaintext bytes consumed.
    ///
    /// `source_len` is the size reported by the storage backend and is only
    /// used to tell a short read from the legitimate final chunk.
    pub async fn encrypt<R, W>(&self, source: &mut R, source_len: u64, dest: &mut W) -> Result<u64>
    where
        R: ByteSource,
        W: ByteSink,
    {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        dest.write_all(&iv).await.map_err(VaultError::StreamWrite)?;

        let mut buffer = vec![0u8; PLAIN_CHUNK_SIZE];
        let mut chunk_index = 0u64;
        let mut retries = 0usize;
        let mut total_bytes = 0u64;

        loop {
            let n = read_chunk(source, &mut buffer)
                .await
                .map_err(VaultError::StreamRead)?;

            let offset = chunk_index * PLAIN_CHUNK_SIZE as u64;
            if n < expected_len(source_len, offset, PLAIN_CHUNK_SIZE) {
                rewind(source, offset, chunk_index, n, &mut retries).await?;
                continue;
            }
            retries = 0;

            let ciphertext = self.encrypt_chunk(&iv, &buffer[..n])?;
            iv.copy_from_slice(&ciphertext[..IV_SIZE]);
            dest.write_all(&ciphertext)
                .await
                .map_err(VaultError::StreamWrite)?;
            trace!(chunk = chunk_index, plain = n, cipher = ciphertext.len(), "chunk encrypted");

            total_bytes += n as u64;
            chunk_index += 1;
            if n < PLAIN_CHUNK_SIZE {
                break;
            }
        }

        dest.flush().await.map_err(VaultError::StreamWrite)?;
        Ok(total_bytes)
    }

    /// Decrypts `source` into `dest`, returning the number of plaintext bytes written.
    pub async fn decrypt<R, W>(&self, source: &mut R, source_len: u64, dest: &mut W) -> Result<u64>
    where
        R: ByteSource,
        W: ByteSink,
    {
        let mut iv = [0u8; IV_SIZE];
        let n = read_chunk(source, &mut iv)
            .await
            .map_err(VaultError::StreamRead)?;
        if n != IV_SIZE {
            return Err(VaultError::decryption(format!(
                "source holds {n} bytes, too short for the {IV_SIZE}-byte IV"
            )));
        }

        let mut buffer = vec![0u8; CIPHER_CHUNK_SIZE];
        let mut chunk_index = 0u64;
        let mut retries = 0usize;
        let mut total_bytes = 0u64;

        loop {
            let n = read_chunk(source, &mut buffer)
                .await
                .map_err(VaultError::StreamRead)?;

            let offset = IV_SIZE as u64 + chunk_index * CIPHER_CHUNK_SIZE as u64;
            if n < expected_len(source_len, offset, CIPHER_CHUNK_SIZE) {
                rewind(source, offset, chunk_index, n, &mut retries).await?;
                continue;
            }
            retries = 0;

            if n == 0 {
                if chunk_index == 0 {
                    return Err(VaultError::decryption(
                        "source holds an IV but no ciphertext chunks",
                    ));
                }
                break;
            }

            let ciphertext = &buffer[..n];
            let plaintext = self.decrypt_chunk(&iv, ciphertext, chunk_index)?;
            iv.copy_from_slice(&ciphertext[..IV_SIZE]);
            dest.write_all(&plaintext)
                .await
                .map_err(VaultError::StreamWrite)?;
            trace!(chunk = chunk_index, cipher = n, plain = plaintext.len(), "chunk decrypted");

            total_bytes += plaintext.len() as u64;
            chunk_index += 1;
            if n < CIPHER_CHUNK_SIZE {
                break;
            }
        }

        dest.flush().await.map_err(VaultError::StreamWrite)?;
        Ok(total_bytes)
    }

    fn encrypt_chunk(&self, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_bytes();
        let ciphertext = match self.key.cipher() {
            Cipher::Aes128Cbc => Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(|e| VaultError::unsupported(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            Cipher::Aes256Cbc => Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|e| VaultError::unsupported(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(ciphertext)
    }

    fn decrypt_chunk(&self, iv: &[u8; IV_SIZE], ciphertext: &[u8], chunk: u64) -> Result<Vec<u8>> {
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(VaultError::decryption(format!(
                "chunk {chunk} is {} bytes, not a whole number of blocks",
                ciphertext.len()
            )));
        }

        let key = self.key.as_bytes();
        let plaintext = match self.key.cipher() {
            Cipher::Aes128Cbc => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|e| VaultError::unsupported(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            Cipher::Aes256Cbc => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|e| VaultError::unsupported(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        plaintext.map_err(|_| VaultError::decryption(format!("chunk {chunk} was rejected by the cipher")))
    }
}

/// Reads until `buf` is full or the source reports end-of-stream.
async fn read_chunk<R: ByteSource>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Bytes a chunk read starting at `offset` must return, given the size the
/// backend reported. Anything less is a premature end-of-stream.
fn expected_len(source_len: u64, offset: u64, chunk_size: usize) -> usize {
    source_len.saturating_sub(offset).min(chunk_size as u64) as usize
}

/// Seeks back to the start of a chunk that came up short.
async fn rewind<R: ByteSource>(
    source: &mut R,
    offset: u64,
    chunk: u64,
    got: usize,
    retries: &mut usize,
) -> Result<()> {
    *retries += 1;
    if *retries > MAX_CHUNK_RETRIES {
        return Err(VaultError::StreamRead(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("chunk {chunk} still short after {MAX_CHUNK_RETRIES} retries ({got} bytes)"),
        )));
    }
    debug!(chunk, got, attempt = *retries, "chunk came up short, re-reading");
    source
        .seek(SeekFrom::Start(offset))
        .await
        .map_err(VaultError::StreamRead)?;
    Ok(())
}
