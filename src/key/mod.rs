//! Asymmetric key families.
//!
//! Every family implements [`KeyFamily`], the capability set the key builder
//! and the certificate authority compose: marshalling to the supported
//! [`KeyFormat`]s, parsing back, signing and verifying, and exposing the
//! subject public key info that goes into certificates.

pub mod dh;
pub mod ecdsa;
pub mod rsa;
pub mod sm2;

use std::fmt;

use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::cert::SignatureAlgorithm;
use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;
use crate::pbes;
use crate::pem_utils;

pub use self::dh::DhKey;
pub use self::ecdsa::EcdsaP256Key;
pub use self::rsa::RsaKey;
pub use self::sm2::Sm2Key;

/// Serialization formats for key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Algorithm specific structure: PKCS#1 for RSA, SEC1 for curves.
    Pkcs1,
    /// PKCS#8 `PrivateKeyInfo` / `SubjectPublicKeyInfo`.
    Pkcs8,
    /// .NET style `<RSAKeyValue>` document.
    Xml,
    /// Bare key bytes without any wrapper.
    Raw,
}

/// Serialized key bytes tagged with their format and PEM label.
#[derive(Clone)]
pub struct KeyMaterial {
    format: KeyFormat,
    label: &'static str,
    bytes: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("format", &self.format)
            .field("label", &self.label)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl KeyMaterial {
    pub fn new(format: KeyFormat, label: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            format,
            label,
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Text form: the document itself for XML, a labeled PEM block otherwise.
    pub fn to_text(&self) -> Result<String> {
        match self.format {
            KeyFormat::Xml => String::from_utf8(self.bytes.to_vec())
                .map_err(|e| CipherKitError::EncodingError(format!("xml key: {e}"))),
            _ => Ok(pem_utils::der_to_pem(&self.bytes, self.label)),
        }
    }
}

/// Capability set shared by RSA, DH, SM2 and ECDSA keys.
///
/// A key value may hold only the public half; operations that need the
/// private half fail with [`CipherKitError::Configuration`].
pub trait KeyFamily: Clone + Send + Sync + Sized {
    /// Family name used in diagnostics.
    const NAME: &'static str;

    /// Digest [`crate::builder::KeyBuilder`] signs over unless told otherwise.
    const DEFAULT_HASH: HashAlgorithm;

    fn has_private(&self) -> bool;

    fn marshal_private(&self, format: KeyFormat) -> Result<KeyMaterial>;

    fn marshal_public(&self, format: KeyFormat) -> Result<KeyMaterial>;

    /// Parses a private key. For [`KeyFormat::Xml`] the bytes are the document.
    fn parse_private(format: KeyFormat, bytes: &[u8]) -> Result<Self>;

    /// Parses a public key. For [`KeyFormat::Xml`] the bytes are the document.
    fn parse_public(format: KeyFormat, bytes: &[u8]) -> Result<Self>;

    fn spki(&self) -> Result<SubjectPublicKeyInfoOwned>;

    /// Signs `data` with the family's conventional scheme over `hash`.
    fn sign(&self, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>>;

    /// Verifies a signature made by [`KeyFamily::sign`].
    ///
    /// Fails with [`CipherKitError::MalformedSignature`] when the signature
    /// cannot be parsed and [`CipherKitError::SignatureMismatch`] when it
    /// does not match.
    fn verify(&self, hash: HashAlgorithm, data: &[u8], signature: &[u8]) -> Result<()>;

    /// Signature algorithm used when a template does not name one.
    fn default_signature_algorithm(&self) -> Result<SignatureAlgorithm>;

    /// Signs a to-be-signed certificate or request body.
    fn sign_certificate(&self, algorithm: SignatureAlgorithm, tbs: &[u8]) -> Result<Vec<u8>> {
        if !algorithm.is_compatible_with(Self::NAME) {
            return Err(CipherKitError::Configuration(format!(
                "{} cannot be produced by a {} key",
                algorithm.name(),
                Self::NAME
            )));
        }
        self.sign(algorithm.hash(), tbs)
    }

    /// Verifies a signature made by [`KeyFamily::sign_certificate`].
    fn verify_certificate(&self, algorithm: SignatureAlgorithm, tbs: &[u8], signature: &[u8]) -> Result<()> {
        if !algorithm.is_compatible_with(Self::NAME) {
            return Err(CipherKitError::Configuration(format!(
                "{} cannot be checked with a {} key",
                algorithm.name(),
                Self::NAME
            )));
        }
        self.verify(algorithm.hash(), tbs, signature)
    }
}

pub(crate) fn missing_private(family: &str) -> CipherKitError {
    CipherKitError::Configuration(format!("{family}: private key absent"))
}

/// Parses any private key PEM block of family `K`.
///
/// `ENCRYPTED PRIVATE KEY` blocks need `password`.
pub fn parse_private_pem<K: KeyFamily>(pem: &str, password: Option<&[u8]>) -> Result<K> {
    let (label, der) = pem_utils::pem_to_der(pem)?;
    match label.as_str() {
        pem_utils::PRIVATE_KEY => K::parse_private(KeyFormat::Pkcs8, &der),
        pem_utils::ENCRYPTED_PRIVATE_KEY => {
            let password = password.ok_or_else(|| {
                CipherKitError::Configuration("encrypted private key needs a password".to_string())
            })?;
            let plain = pbes::decrypt(&der, password)?;
            K::parse_private(KeyFormat::Pkcs8, &plain)
        }
        pem_utils::RSA_PRIVATE_KEY | pem_utils::EC_PRIVATE_KEY => {
            K::parse_private(KeyFormat::Pkcs1, &der)
        }
        other => Err(CipherKitError::DecodingError(format!(
            "unexpected PEM label \"{other}\" for a {} private key",
            K::NAME
        ))),
    }
}

/// Parses a `PUBLIC KEY` or `RSA PUBLIC KEY` PEM block of family `K`.
pub fn parse_public_pem<K: KeyFamily>(pem: &str) -> Result<K> {
    let (label, der) = pem_utils::pem_to_der(pem)?;
    match label.as_str() {
        pem_utils::PUBLIC_KEY => K::parse_public(KeyFormat::Pkcs8, &der),
        pem_utils::RSA_PUBLIC_KEY => K::parse_public(KeyFormat::Pkcs1, &der),
        other => Err(CipherKitError::DecodingError(format!(
            "unexpected PEM label \"{other}\" for a {} public key",
            K::NAME
        ))),
    }
}

/// Hashes `data` and checks the family accepts `hash`.
pub(crate) fn prehash(family: &str, allowed: &[HashAlgorithm], hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    if !allowed.contains(&hash) {
        return Err(CipherKitError::UnsupportedAlgorithm(format!(
            "{} signatures over {}",
            family,
            hash.name()
        )));
    }
    Ok(hash.digest(data))
}
