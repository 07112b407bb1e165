//! Error types returned by every CipherKit operation, plus [`ErrorList`] for
//! the builders that collect failures instead of stopping at the first.

use std::fmt;

use thiserror::Error;

/// Represents errors that can occur in the CipherKit library.
///
/// Every failure of the engine is one of these values; nothing in the crate
/// panics on malformed input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherKitError {
    /// Missing key material or an invalid option value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown cipher, mode, padding, hash, scheme or signature algorithm.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Unpadding failed: corrupt ciphertext, wrong key or wrong password.
    #[error("Invalid padding: {0}")]
    Padding(String),

    /// AEAD tag mismatch.
    #[error("Authentication tag mismatch")]
    AuthenticationTag,

    /// A well-formed signature that does not match the data.
    #[error("Signature does not match")]
    SignatureMismatch,

    /// A signature that cannot be parsed for the key family.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error related to certificate operations.
    #[error("Certificate error: {0}")]
    CertificateError(String),
}

pub type Result<T> = std::result::Result<T, CipherKitError>;

impl From<der::Error> for CipherKitError {
    /// Converts a `der::Error` into a `CipherKitError`.
    fn from(err: der::Error) -> Self {
        CipherKitError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for CipherKitError {
    fn from(err: rsa::Error) -> Self {
        match err {
            rsa::Error::Verification => CipherKitError::SignatureMismatch,
            other => CipherKitError::InvalidInput(format!("rsa: {other}")),
        }
    }
}

impl From<rsa::pkcs1::Error> for CipherKitError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        CipherKitError::DecodingError(format!("pkcs1: {err}"))
    }
}

impl From<pkcs8::Error> for CipherKitError {
    fn from(err: pkcs8::Error) -> Self {
        match err {
            // PBES2 reports a bad password as a failed unpad
            pkcs8::Error::EncryptedPrivateKey(pkcs8::pkcs5::Error::DecryptFailed) => {
                CipherKitError::Padding("decryption failed".to_string())
            }
            other => CipherKitError::DecodingError(format!("pkcs8: {other}")),
        }
    }
}

impl From<pkcs8::spki::Error> for CipherKitError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CipherKitError::DecodingError(format!("spki: {err}"))
    }
}

impl From<pem::PemError> for CipherKitError {
    fn from(err: pem::PemError) -> Self {
        CipherKitError::DecodingError(format!("pem: {err}"))
    }
}

/// An ordered collection of errors gathered by an accumulating builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(pub Vec<CipherKitError>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: CipherKitError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CipherKitError> {
        self.0.iter()
    }

    /// The first recorded error, if any.
    pub fn first(&self) -> Option<&CipherKitError> {
        self.0.first()
    }

    /// Returns `Ok(value)` when no error was recorded.
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ErrorList> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{} error(s): {}", self.0.len(), joined)
    }
}

impl std::error::Error for ErrorList {}

impl From<CipherKitError> for ErrorList {
    fn from(err: CipherKitError) -> Self {
        Self(vec![err])
    }
}

impl IntoIterator for ErrorList {
    type Item = CipherKitError;
    type IntoIter = std::vec::IntoIter<CipherKitError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
