//! The cipher pipeline.
//!
//! [`Cipher`] is a value: every configuration call consumes it and returns the
//! updated pipeline, so two pipelines never share state. A call whose
//! precondition fails records a typed error and leaves that field unchanged.
//! Configuration keeps going after an error so every problem is reported, but
//! [`Cipher::encrypt`] and [`Cipher::decrypt`] do nothing once an error has been
//! recorded, and the terminal accessors hand back the error list instead of
//! bytes.
//!
//! ```
//! use cipherkit::cipher::Cipher;
//! use cipherkit::registry::{BlockMode, CipherAlgorithm, PaddingScheme};
//!
//! let key = [0x11u8; 16];
//! let iv = [0x22u8; 16];
//! let sealed = Cipher::new()
//!     .from_string("attack at dawn")
//!     .with_algorithm(CipherAlgorithm::Aes)
//!     .with_mode(BlockMode::Cbc)
//!     .with_padding(PaddingScheme::Pkcs7)
//!     .with_key(&key)
//!     .with_iv(&iv)
//!     .encrypt()
//!     .to_hex_string()
//!     .unwrap();
//!
//! let opened = Cipher::new()
//!     .from_hex_string(&sealed)
//!     .with_algorithm(CipherAlgorithm::Aes)
//!     .with_mode(BlockMode::Cbc)
//!     .with_padding(PaddingScheme::Pkcs7)
//!     .with_key(&key)
//!     .with_iv(&iv)
//!     .decrypt()
//!     .to_string()
//!     .unwrap();
//! assert_eq!(opened, "attack at dawn");
//! ```

pub mod aead;
pub mod block;
pub mod mode;
pub mod stream;
pub mod typed;

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CipherKitError, ErrorList, Result};
use crate::padding;
use crate::registry::{BlockMode, CipherAlgorithm, PaddingScheme, Registries};

/// Fluent symmetric encryption and decryption over byte buffers.
#[derive(Clone)]
pub struct Cipher {
    registries: Arc<Registries>,
    algorithm: Option<CipherAlgorithm>,
    mode: BlockMode,
    padding: PaddingScheme,
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Vec<u8>,
    aad: Vec<u8>,
    data: Vec<u8>,
    parsed: Vec<u8>,
    errors: ErrorList,
}

impl Default for Cipher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &self.algorithm)
            .field("mode", &self.mode)
            .field("padding", &self.padding)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("iv", &hex::encode(&self.iv))
            .field("data_len", &self.data.len())
            .field("errors", &self.errors)
            .finish()
    }
}

impl Cipher {
    /// A pipeline resolving custom entries in [`Registries::global`].
    pub fn new() -> Self {
        Self::with_registries(Registries::global())
    }

    /// A pipeline resolving custom entries in `registries`.
    pub fn with_registries(registries: Arc<Registries>) -> Self {
        Self {
            registries,
            algorithm: None,
            mode: BlockMode::Ecb,
            padding: PaddingScheme::NoPadding,
            key: None,
            iv: Vec::new(),
            aad: Vec::new(),
            data: Vec::new(),
            parsed: Vec::new(),
            errors: ErrorList::new(),
        }
    }

    fn fail(mut self, err: CipherKitError) -> Self {
        self.errors.push(err);
        self
    }

    pub fn from_bytes(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn from_string(self, data: &str) -> Self {
        self.from_bytes(data.as_bytes())
    }

    pub fn from_base64_string(self, data: &str) -> Self {
        match STANDARD.decode(data.trim()) {
            Ok(bytes) => self.from_bytes(&bytes),
            Err(e) => self.fail(CipherKitError::DecodingError(format!("base64: {e}"))),
        }
    }

    pub fn from_hex_string(self, data: &str) -> Self {
        match hex::decode(data.trim()) {
            Ok(bytes) => self.from_bytes(&bytes),
            Err(e) => self.fail(CipherKitError::DecodingError(format!("hex: {e}"))),
        }
    }

    pub fn with_algorithm(mut self, algorithm: CipherAlgorithm) -> Self {
        let known = stream::is_stream(algorithm)
            || block::block_size(&self.registries.ciphers, algorithm).is_some();
        if !known {
            let name = self.registries.cipher_name(algorithm);
            return self.fail(CipherKitError::UnsupportedAlgorithm(name));
        }
        if let Some(key) = &self.key {
            if let Err(e) = self.check_key(algorithm, key) {
                return self.fail(e);
            }
        }
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_mode(mut self, mode: BlockMode) -> Self {
        if mode::builtin(mode).is_none()
            && !mode::is_aead(mode)
            && self.registries.modes.behavior(mode).is_none()
        {
            let name = self.registries.mode_name(mode);
            return self.fail(CipherKitError::UnsupportedAlgorithm(name));
        }
        self.mode = mode;
        self
    }

    pub fn with_padding(mut self, padding: PaddingScheme) -> Self {
        if padding::builtin(padding).is_none() && self.registries.paddings.behavior(padding).is_none()
        {
            let name = self.registries.padding_name(padding);
            return self.fail(CipherKitError::UnsupportedAlgorithm(name));
        }
        self.padding = padding;
        self
    }

    pub fn with_key(mut self, key: &[u8]) -> Self {
        if let Some(algorithm) = self.algorithm {
            if let Err(e) = self.check_key(algorithm, key) {
                return self.fail(e);
            }
        }
        self.key = Some(Zeroizing::new(key.to_vec()));
        self
    }

    /// IV for feedback modes, nonce for GCM/CCM and the stream algorithms.
    pub fn with_iv(mut self, iv: &[u8]) -> Self {
        self.iv = iv.to_vec();
        self
    }

    /// Associated data authenticated by GCM, CCM and ChaCha20-Poly1305.
    pub fn with_aad(mut self, aad: &[u8]) -> Self {
        self.aad = aad.to_vec();
        self
    }

    fn check_key(&self, algorithm: CipherAlgorithm, key: &[u8]) -> Result<()> {
        if block::key_size_valid(&self.registries.ciphers, algorithm, key.len()) {
            Ok(())
        } else {
            Err(CipherKitError::Configuration(format!(
                "invalid key size {} for {}",
                key.len(),
                self.registries.cipher_name(algorithm)
            )))
        }
    }

    fn check_iv(&self, expected: usize) -> Result<()> {
        if self.iv.len() != expected {
            return Err(CipherKitError::Configuration(format!(
                "iv length {} does not match required {expected}",
                self.iv.len()
            )));
        }
        Ok(())
    }

    fn run(&self, decrypt: bool) -> Result<Vec<u8>> {
        let algorithm = self
            .algorithm
            .ok_or_else(|| CipherKitError::Configuration("no cipher algorithm selected".to_string()))?;
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| CipherKitError::Configuration("no key set".to_string()))?;

        debug!(
            algorithm = %self.registries.cipher_name(algorithm),
            mode = %self.registries.mode_name(self.mode),
            padding = %self.registries.padding_name(self.padding),
            decrypt,
            "running cipher pipeline"
        );

        if stream::is_stream(algorithm) {
            self.check_iv(stream::nonce_len(algorithm))?;
            return if decrypt {
                stream::decrypt(algorithm, key, &self.iv, &self.aad, &self.data)
            } else {
                stream::encrypt(algorithm, key, &self.iv, &self.aad, &self.data)
            };
        }

        let registry = &self.registries.ciphers;
        match self.mode {
            BlockMode::Gcm => {
                let typed = if decrypt {
                    typed::gcm_decrypt(algorithm, key, &self.iv, &self.aad, &self.data)?
                } else {
                    typed::gcm_encrypt(algorithm, key, &self.iv, &self.aad, &self.data)?
                };
                if let Some(out) = typed {
                    return Ok(out);
                }
                let cipher = block::new_block_cipher(registry, algorithm, key)?;
                if decrypt {
                    aead::gcm_decrypt(cipher.as_ref(), &self.iv, &self.aad, &self.data)
                } else {
                    aead::gcm_encrypt(cipher.as_ref(), &self.iv, &self.aad, &self.data)
                }
            }
            BlockMode::Ccm => {
                let cipher = block::new_block_cipher(registry, algorithm, key)?;
                if decrypt {
                    aead::ccm_decrypt(cipher.as_ref(), &self.iv, &self.aad, &self.data)
                } else {
                    aead::ccm_encrypt(cipher.as_ref(), &self.iv, &self.aad, &self.data)
                }
            }
            other => {
                let transform = mode::resolve(&self.registries.modes, other)?;
                let bs = block::block_size(registry, algorithm).ok_or_else(|| {
                    CipherKitError::UnsupportedAlgorithm(self.registries.cipher_name(algorithm))
                })?;
                self.check_iv(transform.iv_len(bs))?;
                let paddings = &self.registries.paddings;
                if decrypt {
                    let plain = match typed::decrypt(algorithm, other, key, &self.iv, &self.data)? {
                        Some(plain) => plain,
                        None => {
                            let cipher = block::new_block_cipher(registry, algorithm, key)?;
                            transform.decrypt(cipher.as_ref(), &self.iv, &self.data)?
                        }
                    };
                    if transform.needs_padding() {
                        padding::unpad_with(paddings, self.padding, &plain, bs)
                    } else {
                        Ok(plain)
                    }
                } else {
                    let padded;
                    let input = if transform.needs_padding() {
                        padded = padding::pad_with(paddings, self.padding, &self.data, bs)?;
                        &padded
                    } else {
                        &self.data
                    };
                    match typed::encrypt(algorithm, other, key, &self.iv, input)? {
                        Some(out) => Ok(out),
                        None => {
                            let cipher = block::new_block_cipher(registry, algorithm, key)?;
                            transform.encrypt(cipher.as_ref(), &self.iv, input)
                        }
                    }
                }
            }
        }
    }

    /// Encrypts the data. Skipped when an error was recorded earlier.
    pub fn encrypt(mut self) -> Self {
        if !self.errors.is_empty() {
            return self;
        }
        match self.run(false) {
            Ok(out) => {
                self.parsed = out;
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Decrypts the data. Skipped when an error was recorded earlier.
    pub fn decrypt(mut self) -> Self {
        if !self.errors.is_empty() {
            return self;
        }
        match self.run(true) {
            Ok(out) => {
                self.parsed = out;
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Errors recorded so far, in order.
    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, ErrorList> {
        self.errors.clone().into_result(self.parsed.clone())
    }

    pub fn to_string(&self) -> std::result::Result<String, ErrorList> {
        let bytes = self.to_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| ErrorList::from(CipherKitError::DecodingError(format!("utf-8: {e}"))))
    }

    pub fn to_hex_string(&self) -> std::result::Result<String, ErrorList> {
        self.to_bytes().map(hex::encode)
    }

    pub fn to_base64_string(&self) -> std::result::Result<String, ErrorList> {
        self.to_bytes().map(|b| STANDARD.encode(b))
    }
}
