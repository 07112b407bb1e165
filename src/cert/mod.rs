pub mod extensions;
pub mod params;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912;
use der::{Decode, DecodePem, Encode, EncodePem};
use x509_cert::certificate::CertificateInner;
use x509_cert::request::{CertReq, ExtensionReq};
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;
use crate::issuer::Issuer;
use crate::key::{KeyFamily, KeyFormat};
use extensions::{AuthorityKeyIdentifier, BasicConstraints, SubjectKeyIdentifier, ToAndFromX509Extension};
use params::{DistinguishedName, ExtensionParam, Validity};

const ECDSA_WITH_SHA_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
const SM2_WITH_SM3: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.156.10197.1.501");
const SM2_WITH_SHA_1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.156.10197.1.502");
const SM2_WITH_SHA_256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.156.10197.1.503");

/// Signature scheme a [`SignatureAlgorithm`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFamily {
    /// PKCS#1 v1.5.
    Rsa,
    RsaPss,
    Ecdsa,
    Sm2,
}

/// Certificate signature algorithms, resolvable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Md2WithRsa,
    Md5WithRsa,
    Sha1WithRsa,
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    EcdsaWithSha1,
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
    Sha256WithRsaPss,
    Sha384WithRsaPss,
    Sha512WithRsaPss,
    Sm2WithSm3,
    /// Recognized when parsing; SM2 keys only sign over SM3.
    Sm2WithSha1,
    /// Recognized when parsing; SM2 keys only sign over SM3.
    Sm2WithSha256,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 16] = [
        SignatureAlgorithm::Md2WithRsa,
        SignatureAlgorithm::Md5WithRsa,
        SignatureAlgorithm::Sha1WithRsa,
        SignatureAlgorithm::Sha256WithRsa,
        SignatureAlgorithm::Sha384WithRsa,
        SignatureAlgorithm::Sha512WithRsa,
        SignatureAlgorithm::EcdsaWithSha1,
        SignatureAlgorithm::EcdsaWithSha256,
        SignatureAlgorithm::EcdsaWithSha384,
        SignatureAlgorithm::EcdsaWithSha512,
        SignatureAlgorithm::Sha256WithRsaPss,
        SignatureAlgorithm::Sha384WithRsaPss,
        SignatureAlgorithm::Sha512WithRsaPss,
        SignatureAlgorithm::Sm2WithSm3,
        SignatureAlgorithm::Sm2WithSha1,
        SignatureAlgorithm::Sm2WithSha256,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Md2WithRsa => "MD2WithRSA",
            SignatureAlgorithm::Md5WithRsa => "MD5WithRSA",
            SignatureAlgorithm::Sha1WithRsa => "SHA1WithRSA",
            SignatureAlgorithm::Sha256WithRsa => "SHA256WithRSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384WithRSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512WithRSA",
            SignatureAlgorithm::EcdsaWithSha1 => "ECDSAWithSHA1",
            SignatureAlgorithm::EcdsaWithSha256 => "ECDSAWithSHA256",
            SignatureAlgorithm::EcdsaWithSha384 => "ECDSAWithSHA384",
            SignatureAlgorithm::EcdsaWithSha512 => "ECDSAWithSHA512",
            SignatureAlgorithm::Sha256WithRsaPss => "SHA256WithRSAPSS",
            SignatureAlgorithm::Sha384WithRsaPss => "SHA384WithRSAPSS",
            SignatureAlgorithm::Sha512WithRsaPss => "SHA512WithRSAPSS",
            SignatureAlgorithm::Sm2WithSm3 => "SM2WithSM3",
            SignatureAlgorithm::Sm2WithSha1 => "SM2WithSHA1",
            SignatureAlgorithm::Sm2WithSha256 => "SM2WithSHA256",
        }
    }

    /// Resolves a name such as `SHA256WithRSA`, ignoring ASCII case.
    ///
    /// Unknown names are an error; there is no fallback algorithm.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| CipherKitError::UnsupportedAlgorithm(format!("signature algorithm {name}")))
    }

    pub fn hash(self) -> HashAlgorithm {
        match self {
            SignatureAlgorithm::Md2WithRsa => HashAlgorithm::Md2,
            SignatureAlgorithm::Md5WithRsa => HashAlgorithm::Md5,
            SignatureAlgorithm::Sha1WithRsa
            | SignatureAlgorithm::EcdsaWithSha1
            | SignatureAlgorithm::Sm2WithSha1 => HashAlgorithm::Sha1,
            SignatureAlgorithm::Sha256WithRsa
            | SignatureAlgorithm::EcdsaWithSha256
            | SignatureAlgorithm::Sha256WithRsaPss
            | SignatureAlgorithm::Sm2WithSha256 => HashAlgorithm::Sha256,
            SignatureAlgorithm::Sha384WithRsa
            | SignatureAlgorithm::EcdsaWithSha384
            | SignatureAlgorithm::Sha384WithRsaPss => HashAlgorithm::Sha384,
            SignatureAlgorithm::Sha512WithRsa
            | SignatureAlgorithm::EcdsaWithSha512
            | SignatureAlgorithm::Sha512WithRsaPss => HashAlgorithm::Sha512,
            SignatureAlgorithm::Sm2WithSm3 => HashAlgorithm::Sm3,
        }
    }

    pub fn family(self) -> SignatureFamily {
        match self {
            SignatureAlgorithm::Md2WithRsa
            | SignatureAlgorithm::Md5WithRsa
            | SignatureAlgorithm::Sha1WithRsa
            | SignatureAlgorithm::Sha256WithRsa
            | SignatureAlgorithm::Sha384WithRsa
            | SignatureAlgorithm::Sha512WithRsa => SignatureFamily::Rsa,
            SignatureAlgorithm::EcdsaWithSha1
            | SignatureAlgorithm::EcdsaWithSha256
            | SignatureAlgorithm::EcdsaWithSha384
            | SignatureAlgorithm::EcdsaWithSha512 => SignatureFamily::Ecdsa,
            SignatureAlgorithm::Sha256WithRsaPss
            | SignatureAlgorithm::Sha384WithRsaPss
            | SignatureAlgorithm::Sha512WithRsaPss => SignatureFamily::RsaPss,
            SignatureAlgorithm::Sm2WithSm3
            | SignatureAlgorithm::Sm2WithSha1
            | SignatureAlgorithm::Sm2WithSha256 => SignatureFamily::Sm2,
        }
    }

    /// Whether a key of the named family (`KeyFamily::NAME`) can produce it.
    pub fn is_compatible_with(self, key_family: &str) -> bool {
        let expected = match self.family() {
            SignatureFamily::Rsa | SignatureFamily::RsaPss => "RSA",
            SignatureFamily::Ecdsa => "ECDSA",
            SignatureFamily::Sm2 => "SM2",
        };
        expected == key_family
    }

    pub fn oid(self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::Md2WithRsa => rfc5912::MD_2_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Md5WithRsa => rfc5912::MD_5_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha1WithRsa => rfc5912::SHA_1_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha256WithRsa => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha384WithRsa => rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha512WithRsa => rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::EcdsaWithSha1 => ECDSA_WITH_SHA_1,
            SignatureAlgorithm::EcdsaWithSha256 => rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::EcdsaWithSha384 => rfc5912::ECDSA_WITH_SHA_384,
            SignatureAlgorithm::EcdsaWithSha512 => rfc5912::ECDSA_WITH_SHA_512,
            SignatureAlgorithm::Sha256WithRsaPss
            | SignatureAlgorithm::Sha384WithRsaPss
            | SignatureAlgorithm::Sha512WithRsaPss => rfc5912::ID_RSASSA_PSS,
            SignatureAlgorithm::Sm2WithSm3 => SM2_WITH_SM3,
            SignatureAlgorithm::Sm2WithSha1 => SM2_WITH_SHA_1,
            SignatureAlgorithm::Sm2WithSha256 => SM2_WITH_SHA_256,
        }
    }

    /// The `AlgorithmIdentifier` placed in certificates and requests.
    ///
    /// PKCS#1 v1.5 identifiers carry an explicit NULL, ECDSA and SM2 ones
    /// carry no parameters, and PSS ones carry `RSASSA-PSS-params`.
    pub fn algorithm_identifier(self) -> Result<AlgorithmIdentifierOwned> {
        let parameters = match self {
            SignatureAlgorithm::Sha256WithRsaPss => {
                return Ok(::rsa::pss::get_default_pss_signature_algo_id::<sha2::Sha256>()?);
            }
            SignatureAlgorithm::Sha384WithRsaPss => {
                return Ok(::rsa::pss::get_default_pss_signature_algo_id::<sha2::Sha384>()?);
            }
            SignatureAlgorithm::Sha512WithRsaPss => {
                return Ok(::rsa::pss::get_default_pss_signature_algo_id::<sha2::Sha512>()?);
            }
            _ if self.family() == SignatureFamily::Rsa => Some(der::Any::null()),
            _ => None,
        };
        Ok(AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters,
        })
    }

    /// Maps a parsed `AlgorithmIdentifier` back to an algorithm.
    pub fn from_algorithm_identifier(id: &AlgorithmIdentifierOwned) -> Result<Self> {
        if id.oid == rfc5912::ID_RSASSA_PSS {
            let params = id
                .parameters
                .as_ref()
                .ok_or_else(|| CipherKitError::DecodingError("RSASSA-PSS without parameters".to_string()))?;
            let params: ::rsa::pkcs1::RsaPssParams<'_> = params.decode_as()?;
            return match params.hash.oid {
                rfc5912::ID_SHA_256 => Ok(SignatureAlgorithm::Sha256WithRsaPss),
                rfc5912::ID_SHA_384 => Ok(SignatureAlgorithm::Sha384WithRsaPss),
                rfc5912::ID_SHA_512 => Ok(SignatureAlgorithm::Sha512WithRsaPss),
                other => Err(CipherKitError::UnsupportedAlgorithm(format!("RSASSA-PSS with {other}"))),
            };
        }
        Self::ALL
            .into_iter()
            .find(|alg| alg.family() != SignatureFamily::RsaPss && alg.oid() == id.oid)
            .ok_or_else(|| CipherKitError::UnsupportedAlgorithm(format!("signature algorithm {}", id.oid)))
    }
}

/// Represents an X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CipherKitError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into a `CERTIFICATE` PEM block.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| CipherKitError::EncodingError(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_pem(pem)?,
        })
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    pub fn validity(&self) -> Validity {
        Validity::from_x509(&self.inner.tbs_certificate.validity)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)
    }

    pub fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .map(ExtensionParam::from_x509)
            .collect()
    }

    /// Decodes extension `E` if present.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        find_extension(&self.extensions())
    }

    pub fn is_ca(&self) -> bool {
        matches!(self.extension::<BasicConstraints>(), Ok(Some(bc)) if bc.is_ca)
    }

    /// Checks the signature against the issuer's public key.
    pub fn verify_signature<K: KeyFamily>(&self, issuer_key: &K) -> Result<()> {
        let algorithm = self.signature_algorithm()?;
        let tbs = self.inner.tbs_certificate.to_der()?;
        let signature = self
            .inner
            .signature
            .as_bytes()
            .ok_or_else(|| CipherKitError::MalformedSignature("unaligned signature bits".to_string()))?;
        issuer_key.verify_certificate(algorithm, &tbs, signature)
    }
}

fn find_extension<E: ToAndFromX509Extension>(extensions: &[ExtensionParam]) -> Result<Option<E>> {
    extensions
        .iter()
        .find(|ext| ext.oid == E::OID)
        .map(|ext| ext.to_extension())
        .transpose()
}

/// A PKCS#10 certificate signing request.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub inner: CertReq,
}

impl CertificateRequest {
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CipherKitError::EncodingError(e.to_string()))
    }

    /// Encodes the request into a `CERTIFICATE REQUEST` PEM block.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| CipherKitError::EncodingError(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertReq::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            inner: CertReq::from_pem(pem)?,
        })
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.algorithm)
    }

    /// Extensions carried in the `extensionRequest` attribute.
    pub fn extensions(&self) -> Result<Vec<ExtensionParam>> {
        let mut out = Vec::new();
        for attribute in self.inner.info.attributes.iter() {
            if attribute.oid != <ExtensionReq as const_oid::AssociatedOid>::OID {
                continue;
            }
            for value in attribute.values.iter() {
                let requested: ExtensionReq = value.decode_as()?;
                out.extend(requested.0.iter().map(ExtensionParam::from_x509));
            }
        }
        Ok(out)
    }

    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        find_extension(&self.extensions()?)
    }

    /// Checks the self-signature with the embedded public key.
    pub fn verify<K: KeyFamily>(&self) -> Result<()> {
        let key = K::parse_public(KeyFormat::Pkcs8, &self.inner.info.public_key.to_der()?)?;
        let algorithm = self.signature_algorithm()?;
        let info = self.inner.info.to_der()?;
        let signature = self
            .inner
            .signature
            .as_bytes()
            .ok_or_else(|| CipherKitError::MalformedSignature("unaligned signature bits".to_string()))?;
        key.verify_certificate(algorithm, &info, signature)
    }
}

/// A certificate together with the private key of its subject, able to
/// issue further certificates.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey<K: KeyFamily> {
    pub cert: Certificate,
    pub key: K,
}

impl<K: KeyFamily> Issuer for CertificateWithPrivateKey<K> {
    type Key = K;

    fn issuer_name(&self) -> Result<x509_cert::name::Name> {
        // The name of the issuer is the subject of the certificate
        Ok(self.cert.inner.tbs_certificate.subject.clone())
    }

    fn signing_key(&self) -> &K {
        &self.key
    }

    /// Key identifier from the certificate's own SKI, or the SPKI hash when it
    /// has none; issuer and serial name this certificate within its issuer.
    fn authority_key_identifier(&self) -> Result<Option<AuthorityKeyIdentifier>> {
        let tbs = &self.cert.inner.tbs_certificate;
        let key_identifier = match self.cert.extension::<SubjectKeyIdentifier>()? {
            Some(ski) => ski.0,
            None => SubjectKeyIdentifier::from_spki(&tbs.subject_public_key_info).0,
        };
        Ok(Some(AuthorityKeyIdentifier {
            key_identifier,
            authority_cert_issuer: Some(tbs.issuer.clone()),
            authority_cert_serial_number: Some(self.cert.serial_number().to_vec()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_case_insensitively() {
        for alg in SignatureAlgorithm::ALL {
            assert_eq!(SignatureAlgorithm::from_name(alg.name()).unwrap(), alg);
        }
        assert_eq!(
            SignatureAlgorithm::from_name("sha256withrsa").unwrap(),
            SignatureAlgorithm::Sha256WithRsa
        );
        assert!(matches!(
            SignatureAlgorithm::from_name("SHA256WithDSA"),
            Err(CipherKitError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn identifiers_map_back_to_algorithms() {
        for alg in SignatureAlgorithm::ALL {
            let id = alg.algorithm_identifier().unwrap();
            assert_eq!(SignatureAlgorithm::from_algorithm_identifier(&id).unwrap(), alg);
        }
    }

    #[test]
    fn compatibility_follows_family() {
        assert!(SignatureAlgorithm::Sha384WithRsaPss.is_compatible_with("RSA"));
        assert!(SignatureAlgorithm::EcdsaWithSha1.is_compatible_with("ECDSA"));
        assert!(!SignatureAlgorithm::Sm2WithSm3.is_compatible_with("RSA"));
        assert!(!SignatureAlgorithm::Sha256WithRsa.is_compatible_with("DH"));
    }
}
