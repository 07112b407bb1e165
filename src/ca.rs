//! Certificate authority builder.
//!
//! [`Ca`] prepares a template (`make_csr`, `make_ca`, `make_cert`), lets the
//! caller adjust it (`update_cert`, `update_cert_request`) and then signs it
//! (`create_csr`, `create_ca`, `create_cert`). Problems with the subject are
//! all collected before anything is signed.
//!
//! ```
//! use cipherkit::ca::Ca;
//! use cipherkit::cert::params::DistinguishedName;
//! use cipherkit::key::EcdsaP256Key;
//!
//! let root = Ca::new()
//!     .with_key(EcdsaP256Key::generate())
//!     .make_ca(
//!         DistinguishedName::builder().common_name("Example Root").country("US").build(),
//!         10,
//!         "ECDSAWithSHA256",
//!     )
//!     .create_ca()
//!     .into_issuer()
//!     .unwrap();
//!
//! let leaf = Ca::new()
//!     .with_key(EcdsaP256Key::generate())
//!     .make_cert(
//!         DistinguishedName::builder().common_name("www.example.com").build(),
//!         1,
//!         &["www.example.com"],
//!         &["192.0.2.10"],
//!         "ECDSAWithSHA384",
//!     )
//!     .create_cert(&root)
//!     .to_certificate()
//!     .unwrap();
//! assert!(leaf.verify_signature(&root.key).is_ok());
//! ```

use std::net::IpAddr;

use der::Encode;
use der::asn1::{BitString, SetOfVec};
use tracing::debug;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::KeyUsages;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq};

use crate::cert::extensions::{ExtendedKeyUsageOption, SubjectAltName};
use crate::cert::params::{
    CertificateRequestTemplate, CertificateTemplate, DistinguishedName, ExtensionParam, Validity,
};
use crate::cert::{Certificate, CertificateRequest, CertificateWithPrivateKey, SignatureAlgorithm};
use crate::error::{CipherKitError, ErrorList, Result};
use crate::issuer::{Issuer, SelfIssuer};
use crate::key::{KeyFamily, KeyFormat};

type Outcome<T> = std::result::Result<T, ErrorList>;

#[derive(Debug, Clone)]
enum Signed {
    Certificate(Certificate),
    Request(CertificateRequest),
}

#[derive(Debug, Clone)]
pub struct Ca<K: KeyFamily> {
    key: Option<K>,
    cert_template: Option<CertificateTemplate>,
    request_template: Option<CertificateRequestTemplate>,
    signed: Option<Signed>,
    errors: ErrorList,
}

impl<K: KeyFamily> Default for Ca<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ips(ips: &[&str], errors: &mut ErrorList) -> Vec<IpAddr> {
    ips.iter()
        .filter_map(|ip| match ip.parse::<IpAddr>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                errors.push(CipherKitError::InvalidInput(format!(
                    "\"{ip}\" is not an IP address"
                )));
                None
            }
        })
        .collect()
}

impl<K: KeyFamily> Ca<K> {
    pub fn new() -> Self {
        Self {
            key: None,
            cert_template: None,
            request_template: None,
            signed: None,
            errors: ErrorList::new(),
        }
    }

    fn fail(mut self, err: CipherKitError) -> Self {
        self.errors.push(err);
        self
    }

    fn absorb(mut self, result: Outcome<()>) -> Self {
        if let Err(list) = result {
            self.errors.0.extend(list);
        }
        self
    }

    /// The key certified by the template; also the signer for CSRs and
    /// self-signed certificates.
    pub fn with_key(mut self, key: K) -> Self {
        self.key = Some(key);
        self
    }

    fn key(&self) -> Result<&K> {
        self.key
            .as_ref()
            .ok_or_else(|| CipherKitError::Configuration(format!("no {} key set", K::NAME)))
    }

    fn signature_algorithm(&mut self, name: &str) -> Option<SignatureAlgorithm> {
        match SignatureAlgorithm::from_name(name) {
            Ok(algorithm) => Some(algorithm),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Prepares a certificate request for `subject`.
    pub fn make_csr(self, subject: DistinguishedName) -> Self {
        let template = CertificateRequestTemplate::builder().subject(subject).build();
        let checked = template.validate();
        let mut ca = self.absorb(checked);
        ca.request_template = Some(template);
        ca
    }

    /// Prepares a CA certificate valid for `expire_years` from now.
    pub fn make_ca(mut self, subject: DistinguishedName, expire_years: u32, signature_algorithm: &str) -> Self {
        let algorithm = self.signature_algorithm(signature_algorithm);
        let validity = match Validity::for_years(expire_years) {
            Ok(validity) => validity,
            Err(e) => return self.fail(e),
        };
        let template = CertificateTemplate::builder()
            .subject(subject)
            .validity(validity)
            .key_usage(KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign)
            .extended_key_usage(vec![ExtendedKeyUsageOption::ClientAuth, ExtendedKeyUsageOption::ServerAuth])
            .maybe_signature_algorithm(algorithm)
            .is_ca(true)
            .build();
        let checked = template.validate();
        let mut ca = self.absorb(checked);
        ca.cert_template = Some(template);
        ca
    }

    /// Prepares an end-entity certificate for the given DNS names and IPs.
    pub fn make_cert(
        mut self,
        subject: DistinguishedName,
        expire_years: u32,
        dns_names: &[&str],
        ip_addresses: &[&str],
        signature_algorithm: &str,
    ) -> Self {
        let algorithm = self.signature_algorithm(signature_algorithm);
        let ip_addresses = parse_ips(ip_addresses, &mut self.errors);
        let validity = match Validity::for_years(expire_years) {
            Ok(validity) => validity,
            Err(e) => return self.fail(e),
        };
        let template = CertificateTemplate::builder()
            .subject(subject)
            .validity(validity)
            .key_usage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
            .extended_key_usage(vec![ExtendedKeyUsageOption::ClientAuth, ExtendedKeyUsageOption::ServerAuth])
            .dns_names(dns_names.iter().map(|name| name.to_string()).collect())
            .ip_addresses(ip_addresses)
            .maybe_signature_algorithm(algorithm)
            .build();
        let checked = template.validate();
        let mut ca = self.absorb(checked);
        ca.cert_template = Some(template);
        ca
    }

    /// Rewrites the prepared certificate template before signing.
    pub fn update_cert(mut self, f: impl FnOnce(CertificateTemplate) -> CertificateTemplate) -> Self {
        match self.cert_template.take() {
            Some(template) => {
                let template = f(template);
                let checked = template.validate();
                let mut ca = self.absorb(checked);
                ca.cert_template = Some(template);
                ca
            }
            None => self.fail(CipherKitError::Configuration(
                "no certificate template to update".to_string(),
            )),
        }
    }

    /// Rewrites the prepared request template before signing.
    pub fn update_cert_request(
        mut self,
        f: impl FnOnce(CertificateRequestTemplate) -> CertificateRequestTemplate,
    ) -> Self {
        match self.request_template.take() {
            Some(template) => {
                let template = f(template);
                let checked = template.validate();
                let mut ca = self.absorb(checked);
                ca.request_template = Some(template);
                ca
            }
            None => self.fail(CipherKitError::Configuration(
                "no certificate request template to update".to_string(),
            )),
        }
    }

    fn cert_template(&self) -> Result<&CertificateTemplate> {
        self.cert_template
            .as_ref()
            .ok_or_else(|| CipherKitError::Configuration("no certificate template prepared".to_string()))
    }

    fn finish(mut self, signed: Result<Signed>) -> Self {
        match signed {
            Ok(signed) => {
                self.signed = Some(signed);
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Self-signs the prepared template with the builder's key.
    pub fn create_ca(self) -> Self {
        if !self.errors.is_empty() {
            return self;
        }
        let signed = (|| -> Result<Signed> {
            let key = self.key()?;
            let template = self.cert_template()?;
            let issuer = SelfIssuer {
                name: template.subject.as_x509_name()?,
                key,
            };
            Ok(Signed::Certificate(issuer.issue(template, &key.spki()?)?))
        })();
        self.finish(signed)
    }

    /// Has `issuer` sign the prepared template for the builder's key.
    pub fn create_cert<I: Issuer>(self, issuer: &I) -> Self {
        if !self.errors.is_empty() {
            return self;
        }
        let signed = (|| -> Result<Signed> {
            let subject_key = self.key()?.spki()?;
            let template = self.cert_template()?;
            Ok(Signed::Certificate(issuer.issue(template, &subject_key)?))
        })();
        self.finish(signed)
    }

    /// Has `issuer` certify the subject and key of a signing request.
    ///
    /// The request's self-signature is checked first. Its DNS and IP names
    /// are used when the prepared template lists none.
    pub fn create_cert_from_request<I: Issuer, R: KeyFamily>(self, issuer: &I, request: &CertificateRequest) -> Self {
        if !self.errors.is_empty() {
            return self;
        }
        let signed = (|| -> Result<Signed> {
            request.verify::<R>()?;
            let mut template = self.cert_template()?.clone();
            template.subject = request.subject();
            if template.dns_names.is_empty() && template.ip_addresses.is_empty() {
                if let Some(san) = request.extension::<SubjectAltName>()? {
                    template.dns_names = san.dns_names;
                    template.ip_addresses = san.ip_addresses;
                }
            }
            template
                .validate()
                .map_err(|list| CipherKitError::InvalidInput(list.to_string()))?;
            let subject_key = request.inner.info.public_key.clone();
            Ok(Signed::Certificate(issuer.issue(&template, &subject_key)?))
        })();
        self.finish(signed)
    }

    /// Signs the prepared request template with the builder's key.
    pub fn create_csr(self) -> Self {
        if !self.errors.is_empty() {
            return self;
        }
        let signed = (|| -> Result<Signed> {
            let key = self.key()?;
            let template = self.request_template.as_ref().ok_or_else(|| {
                CipherKitError::Configuration("no certificate request template prepared".to_string())
            })?;
            Ok(Signed::Request(sign_request(key, template)?))
        })();
        self.finish(signed)
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    fn signed(&self) -> Outcome<&Signed> {
        if !self.errors.is_empty() {
            return Err(self.errors.clone());
        }
        Ok(self
            .signed
            .as_ref()
            .ok_or_else(|| CipherKitError::Configuration("nothing has been signed".to_string()))?)
    }

    pub fn to_certificate(&self) -> Outcome<Certificate> {
        match self.signed()? {
            Signed::Certificate(cert) => Ok(cert.clone()),
            Signed::Request(_) => Err(CipherKitError::Configuration(
                "a certificate request was signed, not a certificate".to_string(),
            )
            .into()),
        }
    }

    pub fn to_certificate_request(&self) -> Outcome<CertificateRequest> {
        match self.signed()? {
            Signed::Request(request) => Ok(request.clone()),
            Signed::Certificate(_) => Err(CipherKitError::Configuration(
                "a certificate was signed, not a certificate request".to_string(),
            )
            .into()),
        }
    }

    /// The signed certificate or request as DER.
    pub fn to_bytes(&self) -> Outcome<Vec<u8>> {
        let der = match self.signed()? {
            Signed::Certificate(cert) => cert.to_der(),
            Signed::Request(request) => request.to_der(),
        };
        Ok(der?)
    }

    /// `CERTIFICATE` or `CERTIFICATE REQUEST` PEM.
    pub fn to_pem(&self) -> Outcome<String> {
        let pem = match self.signed()? {
            Signed::Certificate(cert) => cert.to_pem(),
            Signed::Request(request) => request.to_pem(),
        };
        Ok(pem?)
    }

    /// The builder's private key in `format`, as PEM or XML text.
    pub fn to_key_string(&self, format: KeyFormat) -> Outcome<String> {
        if !self.errors.is_empty() {
            return Err(self.errors.clone());
        }
        let material = self.key()?.marshal_private(format)?;
        Ok(material.to_text()?)
    }

    /// The signed certificate paired with the key, ready to issue others.
    pub fn into_issuer(self) -> Outcome<CertificateWithPrivateKey<K>> {
        let cert = self.to_certificate()?;
        let key = self.key.ok_or_else(|| {
            CipherKitError::Configuration(format!("no {} key set", K::NAME))
        })?;
        debug!(subject = %cert.subject().common_name, "certificate ready to issue");
        Ok(CertificateWithPrivateKey { cert, key })
    }
}

fn sign_request<K: KeyFamily>(key: &K, template: &CertificateRequestTemplate) -> Result<CertificateRequest> {
    let algorithm = match template.signature_algorithm {
        Some(algorithm) => algorithm,
        None => key.default_signature_algorithm()?,
    };

    let mut requested = Vec::new();
    let san = SubjectAltName {
        dns_names: template.dns_names.clone(),
        ip_addresses: template.ip_addresses.clone(),
    };
    if !san.is_empty() {
        requested.push(ExtensionParam::from_extension(san, false)?);
    }
    requested.extend(template.extensions.iter().cloned());

    let mut attributes = SetOfVec::new();
    if !requested.is_empty() {
        let extensions = requested
            .iter()
            .map(ExtensionParam::to_x509)
            .collect::<Result<Vec<_>>>()?;
        attributes.insert(Attribute::try_from(ExtensionReq(extensions))?)?;
    }

    let info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: template.subject.as_x509_name()?,
        public_key: key.spki()?,
        attributes,
    };
    let signature = key.sign_certificate(algorithm, &info.to_der()?)?;
    debug!(subject = %template.subject.common_name, algorithm = algorithm.name(), "signed certificate request");

    Ok(CertificateRequest {
        inner: CertReq {
            info,
            algorithm: algorithm.algorithm_identifier()?,
            signature: BitString::from_bytes(&signature)?,
        },
    })
}
