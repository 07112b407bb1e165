use der::Encode;
use der::asn1::BitString;
use rand_core::{CryptoRngCore, OsRng};
use tracing::debug;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier,
};
use crate::cert::params::{CertificateTemplate, ExtensionParam};
use crate::error::{CipherKitError, Result};
use crate::key::KeyFamily;
use crate::tbs_certificate::TbsCertificate;

/// A positive 16 byte serial: random with the top bit cleared, never zero.
pub fn random_serial(rng: &mut impl CryptoRngCore) -> Vec<u8> {
    let mut serial = vec![0u8; 16];
    rng.fill_bytes(&mut serial);
    serial[0] &= 0x7f;
    serial[0] |= 0x01;
    serial
}

/// Extensions derived from the template fields, followed by its custom ones.
fn template_extensions(
    template: &CertificateTemplate,
    subject_key: &SubjectPublicKeyInfoOwned,
    authority: Option<AuthorityKeyIdentifier>,
) -> Result<Vec<ExtensionParam>> {
    let mut extensions = vec![ExtensionParam::from_extension(
        BasicConstraints {
            is_ca: template.is_ca,
            max_path_length: template.max_path_length,
        },
        true,
    )?];

    if !template.key_usage.is_empty() {
        extensions.push(ExtensionParam::from_extension(KeyUsage(template.key_usage), true)?);
    }

    if !template.extended_key_usage.is_empty() {
        let eku = ExtendedKeyUsage {
            usage: template.extended_key_usage.clone(),
        };
        extensions.push(ExtensionParam::from_extension(eku, false)?);
    }

    let san = SubjectAltName {
        dns_names: template.dns_names.clone(),
        ip_addresses: template.ip_addresses.clone(),
    };
    if !san.is_empty() {
        extensions.push(ExtensionParam::from_extension(san, false)?);
    }

    let ski = match &template.subject_key_id {
        Some(id) => SubjectKeyIdentifier(id.clone()),
        None => SubjectKeyIdentifier::from_spki(subject_key),
    };
    extensions.push(ExtensionParam::from_extension(ski, false)?);

    if let Some(aki) = authority {
        extensions.push(ExtensionParam::from_extension(aki, false)?);
    }

    for custom in &template.extensions {
        if extensions.iter().any(|ext| ext.oid == custom.oid) {
            return Err(CipherKitError::CertificateError(format!(
                "extension {} is set twice",
                custom.oid
            )));
        }
        extensions.push(custom.clone());
    }
    Ok(extensions)
}

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    type Key: KeyFamily;

    /// The name written into the issuer field of issued certificates.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &Self::Key;

    /// Authority key identifier written into issued certificates.
    ///
    /// Self-signed certificates have none.
    fn authority_key_identifier(&self) -> Result<Option<AuthorityKeyIdentifier>>;

    /// Issues a certificate for `subject_key` from `template`.
    fn issue(&self, template: &CertificateTemplate, subject_key: &SubjectPublicKeyInfoOwned) -> Result<Certificate> {
        self.issue_with_rng(template, subject_key, &mut OsRng)
    }

    fn issue_with_rng(
        &self,
        template: &CertificateTemplate,
        subject_key: &SubjectPublicKeyInfoOwned,
        rng: &mut impl CryptoRngCore,
    ) -> Result<Certificate> {
        let key = self.signing_key();
        let signature_algorithm = match template.signature_algorithm {
            Some(algorithm) => algorithm,
            None => key.default_signature_algorithm()?,
        };
        let issuer = self.issuer_name()?;
        let authority = self.authority_key_identifier()?;

        let serial_number = match &template.serial_number {
            Some(serial) => serial.clone(),
            None => random_serial(rng),
        };

        let tbs_cert = TbsCertificate {
            serial_number,
            signature_algorithm,
            issuer,
            validity: template.validity.clone(),
            subject: template.subject.as_x509_name()?,
            subject_public_key: subject_key.clone(),
            extensions: template_extensions(template, subject_key, authority)?,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let signature = key.sign_certificate(signature_algorithm, &tbs_cert_inner.to_der()?)?;
        debug!(
            subject = %template.subject.common_name,
            algorithm = signature_algorithm.name(),
            is_ca = template.is_ca,
            "issued certificate"
        );

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algorithm.algorithm_identifier()?,
            signature: BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issuer for self-signed certificates: the subject signs for itself.
pub struct SelfIssuer<'a, K: KeyFamily> {
    pub name: Name,
    pub key: &'a K,
}

impl<K: KeyFamily> Issuer for SelfIssuer<'_, K> {
    type Key = K;

    fn issuer_name(&self) -> Result<Name> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &K {
        self.key
    }

    fn authority_key_identifier(&self) -> Result<Option<AuthorityKeyIdentifier>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::DistinguishedName;
    use crate::key::EcdsaP256Key;
    use rand_chacha::ChaCha20Rng;
    use rand_chacha::rand_core::SeedableRng;

    #[test]
    fn serials_are_positive_and_distinct() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let a = random_serial(&mut rng);
        let b = random_serial(&mut rng);
        assert_eq!(a.len(), 16);
        assert!(a[0] < 0x80 && a[0] != 0);
        assert_ne!(a, b);
    }

    #[test]
    fn custom_extension_cannot_shadow_a_derived_one() {
        let key = EcdsaP256Key::generate_with_rng(&mut ChaCha20Rng::seed_from_u64(2));
        let subject = DistinguishedName::builder().common_name("dup").build();
        let template = CertificateTemplate::builder()
            .subject(subject.clone())
            .extensions(vec![
                ExtensionParam::from_extension(BasicConstraints::default(), false).unwrap(),
            ])
            .build();
        let issuer = SelfIssuer {
            name: subject.as_x509_name().unwrap(),
            key: &key,
        };
        let err = issuer.issue(&template, &key.spki().unwrap()).unwrap_err();
        assert!(matches!(err, CipherKitError::CertificateError(_)));
    }
}
