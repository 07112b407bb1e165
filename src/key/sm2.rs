//! SM2 keys with SM3 signatures (GB/T 32918).

use ::sm2::dsa::signature::{Signer, Verifier};
use ::sm2::dsa::{Signature, SigningKey, VerifyingKey};
use ::sm2::{PublicKey, SecretKey};
use der::asn1::Uint;
use der::{Decode, Encode, Sequence};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand_core::{CryptoRngCore, OsRng};
use tracing::debug;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::{KeyFamily, KeyFormat, KeyMaterial, missing_private};
use crate::cert::SignatureAlgorithm;
use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;
use crate::pem_utils::{EC_PRIVATE_KEY, PRIVATE_KEY, PUBLIC_KEY};

/// Distinguishing identifier used when none is configured.
pub const DEFAULT_DISTID: &str = "1234567812345678";

/// `SM2Signature ::= SEQUENCE { r INTEGER, s INTEGER }`
#[derive(Sequence)]
struct DerSignature {
    r: Uint,
    s: Uint,
}

fn left_pad(bytes: &[u8]) -> Result<[u8; 32]> {
    if bytes.len() > 32 {
        return Err(CipherKitError::MalformedSignature("scalar longer than 32 bytes".to_string()));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct Sm2Key {
    secret: Option<SecretKey>,
    public: PublicKey,
    distid: String,
}

impl Sm2Key {
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    pub fn generate_with_rng(rng: &mut impl CryptoRngCore) -> Self {
        debug!("generating SM2 key");
        Self::from_secret(SecretKey::random(rng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            secret: Some(secret),
            public,
            distid: DEFAULT_DISTID.to_string(),
        }
    }

    pub fn from_public(public: PublicKey) -> Self {
        Self {
            secret: None,
            public,
            distid: DEFAULT_DISTID.to_string(),
        }
    }

    /// Replaces the signer identity hashed into every signature.
    pub fn with_distid(mut self, distid: impl Into<String>) -> Self {
        self.distid = distid.into();
        self
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    fn secret(&self) -> Result<&SecretKey> {
        self.secret.as_ref().ok_or_else(|| missing_private(Self::NAME))
    }

    fn check_hash(hash: HashAlgorithm) -> Result<()> {
        if hash != HashAlgorithm::Sm3 {
            return Err(CipherKitError::UnsupportedAlgorithm(format!(
                "SM2 signatures over {}",
                hash.name()
            )));
        }
        Ok(())
    }

    fn unsupported(format: KeyFormat) -> CipherKitError {
        CipherKitError::UnsupportedAlgorithm(format!("{format:?} encoding of SM2 keys"))
    }
}

impl KeyFamily for Sm2Key {
    const NAME: &'static str = "SM2";
    const DEFAULT_HASH: HashAlgorithm = HashAlgorithm::Sm3;

    fn has_private(&self) -> bool {
        self.secret.is_some()
    }

    fn marshal_private(&self, format: KeyFormat) -> Result<KeyMaterial> {
        let secret = self.secret()?;
        match format {
            KeyFormat::Pkcs1 => {
                let der = secret
                    .to_sec1_der()
                    .map_err(|e| CipherKitError::EncodingError(e.to_string()))?;
                Ok(KeyMaterial::new(format, EC_PRIVATE_KEY, der.to_vec()))
            }
            KeyFormat::Pkcs8 => {
                let der = secret
                    .to_pkcs8_der()
                    .map_err(|e| CipherKitError::EncodingError(e.to_string()))?;
                Ok(KeyMaterial::new(format, PRIVATE_KEY, der.as_bytes().to_vec()))
            }
            KeyFormat::Raw => Ok(KeyMaterial::new(format, EC_PRIVATE_KEY, secret.to_bytes().to_vec())),
            KeyFormat::Xml => Err(Self::unsupported(format)),
        }
    }

    fn marshal_public(&self, format: KeyFormat) -> Result<KeyMaterial> {
        match format {
            KeyFormat::Pkcs8 => {
                let der = self
                    .public
                    .to_public_key_der()
                    .map_err(|e| CipherKitError::EncodingError(e.to_string()))?;
                Ok(KeyMaterial::new(format, PUBLIC_KEY, der.as_bytes().to_vec()))
            }
            KeyFormat::Raw => Ok(KeyMaterial::new(format, PUBLIC_KEY, self.public.to_sec1_bytes().to_vec())),
            other => Err(Self::unsupported(other)),
        }
    }

    fn parse_private(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        let secret = match format {
            KeyFormat::Pkcs1 => SecretKey::from_sec1_der(bytes)
                .map_err(|e| CipherKitError::DecodingError(format!("sec1: {e}")))?,
            KeyFormat::Pkcs8 => SecretKey::from_pkcs8_der(bytes)?,
            KeyFormat::Raw => SecretKey::from_slice(bytes)
                .map_err(|_| CipherKitError::DecodingError("invalid SM2 scalar".to_string()))?,
            KeyFormat::Xml => return Err(Self::unsupported(format)),
        };
        Ok(Self::from_secret(secret))
    }

    fn parse_public(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        let public = match format {
            KeyFormat::Pkcs8 => PublicKey::from_public_key_der(bytes)?,
            KeyFormat::Raw => PublicKey::from_sec1_bytes(bytes)
                .map_err(|_| CipherKitError::DecodingError("invalid SM2 point".to_string()))?,
            other => return Err(Self::unsupported(other)),
        };
        Ok(Self::from_public(public))
    }

    fn spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_key(self.public)?)
    }

    /// DER encoded `(r, s)`; `hash` must be SM3.
    fn sign(&self, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        Self::check_hash(hash)?;
        let signing_key = SigningKey::new(&self.distid, self.secret()?)
            .map_err(|e| CipherKitError::InvalidInput(format!("sm2: {e}")))?;
        let signature: Signature = signing_key
            .try_sign(data)
            .map_err(|e| CipherKitError::InvalidInput(format!("sm2: {e}")))?;
        let bytes = signature.to_bytes();
        let der = DerSignature {
            r: Uint::new(&bytes[..32])?,
            s: Uint::new(&bytes[32..])?,
        };
        Ok(der.to_der()?)
    }

    fn verify(&self, hash: HashAlgorithm, data: &[u8], signature: &[u8]) -> Result<()> {
        Self::check_hash(hash)?;
        let der = DerSignature::from_der(signature)
            .map_err(|e| CipherKitError::MalformedSignature(e.to_string()))?;
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&left_pad(der.r.as_bytes())?);
        raw[32..].copy_from_slice(&left_pad(der.s.as_bytes())?);
        let signature = Signature::from_slice(&raw)
            .map_err(|e| CipherKitError::MalformedSignature(e.to_string()))?;
        let verifying_key = VerifyingKey::new(&self.distid, self.public)
            .map_err(|e| CipherKitError::InvalidInput(format!("sm2: {e}")))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|_| CipherKitError::SignatureMismatch)
    }

    fn default_signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        Ok(SignatureAlgorithm::Sm2WithSm3)
    }
}
