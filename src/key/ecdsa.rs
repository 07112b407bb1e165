//! ECDSA over P-256. Signatures are computed over a caller chosen digest, so
//! every `ECDSAWithSHA*` certificate algorithm can be produced.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{PublicKey, SecretKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand_core::{CryptoRngCore, OsRng};
use tracing::debug;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::{KeyFamily, KeyFormat, KeyMaterial, missing_private, prehash};
use crate::cert::SignatureAlgorithm;
use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;
use crate::pem_utils::{EC_PRIVATE_KEY, PRIVATE_KEY, PUBLIC_KEY};

const DIGESTS: [HashAlgorithm; 5] = [
    HashAlgorithm::Sha1,
    HashAlgorithm::Sha224,
    HashAlgorithm::Sha256,
    HashAlgorithm::Sha384,
    HashAlgorithm::Sha512,
];

#[derive(Clone, Debug)]
pub struct EcdsaP256Key {
    secret: Option<SecretKey>,
    public: PublicKey,
}

impl EcdsaP256Key {
    /// Generate an ECDSA P-256 key pair.
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    pub fn generate_with_rng(rng: &mut impl CryptoRngCore) -> Self {
        debug!("generating P-256 key");
        Self::from_secret(SecretKey::random(rng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            secret: Some(secret),
            public,
        }
    }

    pub fn from_public(public: PublicKey) -> Self {
        Self {
            secret: None,
            public,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    fn secret(&self) -> Result<&SecretKey> {
        self.secret.as_ref().ok_or_else(|| missing_private(Self::NAME))
    }

    fn unsupported(format: KeyFormat) -> CipherKitError {
        CipherKitError::UnsupportedAlgorithm(format!("{format:?} encoding of EC keys"))
    }
}

impl KeyFamily for EcdsaP256Key {
    const NAME: &'static str = "ECDSA";
    const DEFAULT_HASH: HashAlgorithm = HashAlgorithm::Sha256;

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
                .map_err(|_| CipherKitError::DecodingError("invalid P-256 scalar".to_string()))?,
            KeyFormat::Xml => return Err(Self::unsupported(format)),
        };
        Ok(Self::from_secret(secret))
    }

    fn parse_public(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        let public = match format {
            KeyFormat::Pkcs8 => PublicKey::from_public_key_der(bytes)?,
            KeyFormat::Raw => PublicKey::from_sec1_bytes(bytes)
                .map_err(|_| CipherKitError::DecodingError("invalid P-256 point".to_string()))?,
            other => return Err(Self::unsupported(other)),
        };
        Ok(Self::from_public(public))
    }

    fn spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_key(self.public)?)
    }

    fn sign(&self, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let digest = prehash(Self::NAME, &DIGESTS, hash, data)?;
        let signing_key = SigningKey::from(self.secret()?);
        let signature: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|e| CipherKitError::InvalidInput(format!("ecdsa: {e}")))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify(&self, hash: HashAlgorithm, data: &[u8], signature: &[u8]) -> Result<()> {
        let digest = prehash(Self::NAME, &DIGESTS, hash, data)?;
        let signature = Signature::from_der(signature)
            .map_err(|e| CipherKitError::MalformedSignature(e.to_string()))?;
        VerifyingKey::from(&self.public)
            .verify_prehash(&digest, &signature)
            .map_err(|_| CipherKitError::SignatureMismatch)
    }

    fn default_signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        Ok(SignatureAlgorithm::EcdsaWithSha256)
    }
}
