//! RSA keys: PKCS#1, PKCS#8, XML and raw DER, PKCS#1 v1.5 and PSS signatures.

use ::rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use ::rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ::rsa::traits::PublicKeyParts;
use ::rsa::{BigUint, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use der::Decode;
use rand_core::{CryptoRngCore, OsRng};
use regex::Regex;
use tracing::debug;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::{KeyFamily, KeyFormat, KeyMaterial, missing_private};
use crate::cert::{SignatureAlgorithm, SignatureFamily};
use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;
use crate::pem_utils::{PRIVATE_KEY, PUBLIC_KEY, RSA_PRIVATE_KEY, RSA_PUBLIC_KEY};

/// An RSA public key, optionally with its private half.
#[derive(Clone, Debug)]
pub struct RsaKey {
    private: Option<Box<RsaPrivateKey>>,
    public: RsaPublicKey,
}

impl RsaKey {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate(bits: usize) -> Result<Self> {
        Self::generate_with_rng(&mut OsRng, bits)
    }

    pub fn generate_with_rng(rng: &mut impl CryptoRngCore, bits: usize) -> Result<Self> {
        debug!(bits, "generating RSA key");
        let private = RsaPrivateKey::new(rng, bits)
            .map_err(|e| CipherKitError::KeyGenerationError(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self {
            private: Some(Box::new(private)),
            public,
        }
    }

    pub fn from_public(public: RsaPublicKey) -> Self {
        Self {
            private: None,
            public,
        }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    fn private(&self) -> Result<&RsaPrivateKey> {
        self.private.as_deref().ok_or_else(|| missing_private(Self::NAME))
    }

    /// RSASSA-PSS signature with a salt as long as the digest.
    pub fn sign_pss(&self, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let digest = hash.digest(data);
        Ok(self.private()?.sign_with_rng(&mut OsRng, pss(hash)?, &digest)?)
    }

    pub fn verify_pss(&self, hash: HashAlgorithm, data: &[u8], signature: &[u8]) -> Result<()> {
        self.check_signature_len(signature)?;
        let digest = hash.digest(data);
        Ok(self.public.verify(pss(hash)?, &digest, signature)?)
    }

    fn check_signature_len(&self, signature: &[u8]) -> Result<()> {
        if signature.len() != self.public.size() {
            return Err(CipherKitError::MalformedSignature(format!(
                "expected {} signature bytes, got {}",
                self.public.size(),
                signature.len()
            )));
        }
        Ok(())
    }

    fn to_xml(&self, include_private: bool) -> Result<String> {
        let b64 = |bytes: &[u8]| STANDARD.encode(bytes);
        let mut xml = format!(
            "<RSAKeyValue><Modulus>{}</Modulus><Exponent>{}</Exponent>",
            b64(&self.public.n().to_bytes_be()),
            b64(&self.public.e().to_bytes_be())
        );
        if include_private {
            let der = self.private()?.to_pkcs1_der()?;
            let parts = ::rsa::pkcs1::RsaPrivateKey::from_der(der.as_bytes())?;
            for (tag, value) in [
                ("P", parts.prime1),
                ("Q", parts.prime2),
                ("DP", parts.exponent1),
                ("DQ", parts.exponent2),
                ("InverseQ", parts.coefficient),
                ("D", parts.private_exponent),
            ] {
                xml.push_str(&format!("<{tag}>{}</{tag}>", b64(value.as_bytes())));
            }
        }
        xml.push_str("</RSAKeyValue>");
        Ok(xml)
    }

    fn xml_field(xml: &str, tag: &str) -> Result<BigUint> {
        let pattern = Regex::new(&format!(r"<{tag}>\s*([A-Za-z0-9+/=\s]+?)\s*</{tag}>"))
            .map_err(|e| CipherKitError::DecodingError(e.to_string()))?;
        let value = pattern
            .captures(xml)
            .and_then(|c| c.get(1))
            .ok_or_else(|| CipherKitError::DecodingError(format!("xml key: <{tag}> missing")))?;
        let compact: String = value.as_str().split_whitespace().collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| CipherKitError::DecodingError(format!("xml key <{tag}>: {e}")))?;
        Ok(BigUint::from_bytes_be(&bytes))
    }

    fn xml_text(bytes: &[u8]) -> Result<&str> {
        std::str::from_utf8(bytes).map_err(|e| CipherKitError::DecodingError(format!("xml key: {e}")))
    }
}

fn pkcs1v15(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    Ok(match hash {
        HashAlgorithm::Md2 => Pkcs1v15Sign::new::<md2::Md2>(),
        HashAlgorithm::Md5 => Pkcs1v15Sign::new::<md5::Md5>(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        HashAlgorithm::Sm3 => {
            return Err(CipherKitError::UnsupportedAlgorithm(
                "RSA PKCS#1 v1.5 over SM3".to_string(),
            ));
        }
    })
}

fn pss(hash: HashAlgorithm) -> Result<Pss> {
    Ok(match hash {
        HashAlgorithm::Sha1 => Pss::new::<sha1::Sha1>(),
        HashAlgorithm::Sha224 => Pss::new::<sha2::Sha224>(),
        HashAlgorithm::Sha256 => Pss::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pss::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pss::new::<sha2::Sha512>(),
        other => {
            return Err(CipherKitError::UnsupportedAlgorithm(format!(
                "RSA-PSS over {}",
                other.name()
            )));
        }
    })
}

impl KeyFamily for RsaKey {
    const NAME: &'static str = "RSA";
    const DEFAULT_HASH: HashAlgorithm = HashAlgorithm::Sha256;

    fn has_private(&self) -> bool {
        self.private.is_some()
    }

    fn marshal_private(&self, format: KeyFormat) -> Result<KeyMaterial> {
        let private = self.private()?;
        Ok(match format {
            KeyFormat::Pkcs1 => KeyMaterial::new(
                format,
                RSA_PRIVATE_KEY,
                private.to_pkcs1_der()?.as_bytes().to_vec(),
            ),
            KeyFormat::Pkcs8 => KeyMaterial::new(
                format,
                PRIVATE_KEY,
                private
                    .to_pkcs8_der()
                    .map_err(|e| CipherKitError::EncodingError(e.to_string()))?
                    .as_bytes()
                    .to_vec(),
            ),
            KeyFormat::Xml => KeyMaterial::new(format, RSA_PRIVATE_KEY, self.to_xml(true)?.into_bytes()),
            KeyFormat::Raw => KeyMaterial::new(
                format,
                RSA_PRIVATE_KEY,
                private.to_pkcs1_der()?.as_bytes().to_vec(),
            ),
        })
    }

    fn marshal_public(&self, format: KeyFormat) -> Result<KeyMaterial> {
        Ok(match format {
            KeyFormat::Pkcs1 | KeyFormat::Raw => KeyMaterial::new(
                format,
                RSA_PUBLIC_KEY,
                self.public.to_pkcs1_der()?.as_bytes().to_vec(),
            ),
            KeyFormat::Pkcs8 => KeyMaterial::new(
                format,
                PUBLIC_KEY,
                self.public
                    .to_public_key_der()
                    .map_err(|e| CipherKitError::EncodingError(e.to_string()))?
                    .as_bytes()
                    .to_vec(),
            ),
            KeyFormat::Xml => KeyMaterial::new(format, RSA_PUBLIC_KEY, self.to_xml(false)?.into_bytes()),
        })
    }

    fn parse_private(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        let private = match format {
            KeyFormat::Pkcs1 | KeyFormat::Raw => RsaPrivateKey::from_pkcs1_der(bytes)?,
            KeyFormat::Pkcs8 => RsaPrivateKey::from_pkcs8_der(bytes)?,
            KeyFormat::Xml => {
                let xml = Self::xml_text(bytes)?;
                let n = Self::xml_field(xml, "Modulus")?;
                let e = Self::xml_field(xml, "Exponent")?;
                let d = Self::xml_field(xml, "D")?;
                let p = Self::xml_field(xml, "P")?;
                let q = Self::xml_field(xml, "Q")?;
                RsaPrivateKey::from_components(n, e, d, vec![p, q])?
            }
        };
        private.validate()?;
        Ok(Self::from_private(private))
    }

    fn parse_public(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        let public = match format {
            KeyFormat::Pkcs1 | KeyFormat::Raw => RsaPublicKey::from_pkcs1_der(bytes)?,
            KeyFormat::Pkcs8 => RsaPublicKey::from_public_key_der(bytes)?,
            KeyFormat::Xml => {
                let xml = Self::xml_text(bytes)?;
                RsaPublicKey::new(Self::xml_field(xml, "Modulus")?, Self::xml_field(xml, "Exponent")?)?
            }
        };
        Ok(Self::from_public(public))
    }

    fn spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_key(self.public.clone())?)
    }

    fn sign(&self, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let digest = hash.digest(data);
        Ok(self.private()?.sign(pkcs1v15(hash)?, &digest)?)
    }

    fn verify(&self, hash: HashAlgorithm, data: &[u8], signature: &[u8]) -> Result<()> {
        self.check_signature_len(signature)?;
        let digest = hash.digest(data);
        Ok(self.public.verify(pkcs1v15(hash)?, &digest, signature)?)
    }

    fn default_signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        Ok(SignatureAlgorithm::Sha256WithRsa)
    }

    fn sign_certificate(&self, algorithm: SignatureAlgorithm, tbs: &[u8]) -> Result<Vec<u8>> {
        match algorithm.family() {
            SignatureFamily::Rsa => self.sign(algorithm.hash(), tbs),
            SignatureFamily::RsaPss => self.sign_pss(algorithm.hash(), tbs),
            _ => Err(CipherKitError::Configuration(format!(
                "{} cannot be produced by an RSA key",
                algorithm.name()
            ))),
        }
    }

    fn verify_certificate(&self, algorithm: SignatureAlgorithm, tbs: &[u8], signature: &[u8]) -> Result<()> {
        match algorithm.family() {
            SignatureFamily::Rsa => self.verify(algorithm.hash(), tbs, signature),
            SignatureFamily::RsaPss => self.verify_pss(algorithm.hash(), tbs, signature),
            _ => Err(CipherKitError::Configuration(format!(
                "{} cannot be checked with an RSA key",
                algorithm.name()
            ))),
        }
    }
}
