//! Symmetric keys bound to the cipher they are valid for.
//!
//! A [`Key`] can only be built with a length that matches its [`Cipher`]:
//! 16 bytes for AES-128-CBC and 32 bytes for AES-256-CBC.
//!
//! ## Security Features
//!
//! - Key bytes are zeroized on drop (via `Zeroize` trait)
//! - `Debug` output never contains key material
//! - Random keys come from the operating system CSPRNG via `OsRng`

use crate::error::{Result, VaultError};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

/// Prefix marking a base64-encoded textual key.
pub const BASE64_PREFIX: &str = "base64:";

/// Block ciphers supported by the chunked transform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cipher {
    #[default]
    #[serde(rename = "AES-128-CBC")]
    Aes128Cbc,
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,
}

impl Cipher {
    /// Required key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Cipher::Aes128Cbc => 16,
            Cipher::Aes256Cbc => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cipher::Aes128Cbc => "AES-128-CBC",
            Cipher::Aes256Cbc => "AES-256-CBC",
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cipher {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AES-128-CBC" => Ok(Cipher::Aes128Cbc),
            "AES-256-CBC" => Ok(Cipher::Aes256Cbc),
            other => Err(VaultError::unsupported(format!(
                "the only supported ciphers are AES-128-CBC and AES-256-CBC, got {other}"
            ))),
        }
    }
}

/// Key material plus the cipher it was validated against. Immutable.
#[derive(Clone)]
pub struct Key {
    cipher: Cipher,
    bytes: Vec<u8>,
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("cipher", &self.cipher)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Key {
    /// Generates a random key of the right length for `cipher`.
    pub fn make(cipher: Cipher) -> Self {
        let mut bytes = vec![0u8; cipher.key_len()];
        OsRng.fill_bytes(&mut bytes);
        Self { cipher, bytes }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>, cipher: Cipher) -> Result<Self> {
        let mut bytes = bytes.into();
        if bytes.len() != cipher.key_len() {
            let found = bytes.len();
            bytes.zeroize();
            return Err(VaultError::unsupported(format!(
                "{cipher} requires a {}-byte key but {found} bytes were supplied",
                cipher.key_len()
            )));
        }
        Ok(Self { cipher, bytes })
    }

    /// Builds a key from its textual form.
    ///
    /// Text starting with `base64:` is decoded first; anything else is taken
    /// as the raw key bytes.
    pub fn parse(text: &str, cipher: Cipher) -> Result<Self> {
        match text.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| VaultError::key_encoding(e.to_string()))?;
                Self::from_bytes(decoded, cipher)
            }
            None => Self::from_bytes(text.as_bytes(), cipher),
        }
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    /// Renders the key as `base64:<encoded>` so it can be handed to a user.
    pub fn export(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("{BASE64_PREFIX}{}", STANDARD.encode(&self.bytes)))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
