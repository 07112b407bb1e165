use std::net::IpAddr;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{OctetString, PrintableStringRef, SetOfVec, Utf8StringRef};
use der::flagset::FlagSet;
use der::{Any, Tag, Tagged};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::KeyUsages;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::SignatureAlgorithm;
use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::{CipherKitError, ErrorList, Result};

const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const STREET_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
const POSTAL_CODE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.17");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

const DNS_NAME: &str = r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$";

/// Distinguished name of a certificate subject or issuer.
///
/// Attributes are written in the order country, organization, unit,
/// locality, province, street address, postal code, common name; absent
/// ones are omitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder)]
pub struct DistinguishedName {
    #[builder(into, default)]
    pub common_name: String,
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organizational_unit: Option<String>,
    #[builder(into)]
    pub locality: Option<String>,
    #[builder(into)]
    pub province: Option<String>,
    #[builder(into)]
    pub street_address: Option<String>,
    #[builder(into)]
    pub postal_code: Option<String>,
}

impl DistinguishedName {
    fn attributes(&self) -> Vec<(ObjectIdentifier, &str)> {
        let optional = [
            (COUNTRY, &self.country),
            (ORGANIZATION, &self.organization),
            (ORGANIZATIONAL_UNIT, &self.organizational_unit),
            (LOCALITY, &self.locality),
            (PROVINCE, &self.province),
            (STREET_ADDRESS, &self.street_address),
            (POSTAL_CODE, &self.postal_code),
        ];
        let mut out: Vec<(ObjectIdentifier, &str)> = optional
            .into_iter()
            .filter_map(|(oid, value)| value.as_deref().map(|v| (oid, v)))
            .collect();
        if !self.common_name.is_empty() {
            out.push((COMMON_NAME, self.common_name.as_str()));
        }
        out
    }

    /// Converts the distinguished name to an X.509 `Name`.
    ///
    /// Values that fit PrintableString are encoded as such, the rest as
    /// UTF8String.
    pub fn as_x509_name(&self) -> Result<Name> {
        let mut rdns = Vec::new();
        for (oid, value) in self.attributes() {
            let value = match PrintableStringRef::new(value) {
                Ok(printable) => Any::encode_from(&printable)?,
                Err(_) => Any::encode_from(&Utf8StringRef::new(value)?)?,
            };
            let set = SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }])?;
            rdns.push(RelativeDistinguishedName(set));
        }
        Ok(RdnSequence(rdns))
    }

    /// Reads the known attributes of an X.509 `Name`; others are skipped.
    pub fn from_x509_name(name: &Name) -> Self {
        let mut dn = DistinguishedName::default();
        for attr in name.0.iter().flat_map(|rdn| rdn.0.iter()) {
            let Some(text) = attribute_text(&attr.value) else {
                continue;
            };
            match attr.oid {
                COMMON_NAME => dn.common_name = text,
                COUNTRY => dn.country = Some(text),
                ORGANIZATION => dn.organization = Some(text),
                ORGANIZATIONAL_UNIT => dn.organizational_unit = Some(text),
                LOCALITY => dn.locality = Some(text),
                PROVINCE => dn.province = Some(text),
                STREET_ADDRESS => dn.street_address = Some(text),
                POSTAL_CODE => dn.postal_code = Some(text),
                _ => {}
            }
        }
        dn
    }

    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> std::result::Result<(), ErrorList> {
        let mut errors = ErrorList::new();
        if self.common_name.trim().is_empty() {
            errors.push(invalid("common name must not be empty"));
        }
        if let Some(country) = &self.country {
            let upper_alpha = country.len() == 2 && country.bytes().all(|b| b.is_ascii_uppercase());
            if !upper_alpha {
                errors.push(invalid(&format!(
                    "country \"{country}\" is not a two letter ISO 3166 code"
                )));
            }
        }
        let limits = [
            ("common name", Some(&self.common_name), 64),
            ("organization", self.organization.as_ref(), 64),
            ("organizational unit", self.organizational_unit.as_ref(), 64),
            ("locality", self.locality.as_ref(), 128),
            ("province", self.province.as_ref(), 128),
            ("street address", self.street_address.as_ref(), 128),
            ("postal code", self.postal_code.as_ref(), 40),
        ];
        for (field, value, max) in limits {
            if let Some(value) = value {
                if value.chars().count() > max {
                    errors.push(invalid(&format!("{field} is longer than {max} characters")));
                }
            }
        }
        errors.into_result(())
    }
}

fn invalid(message: &str) -> CipherKitError {
    CipherKitError::InvalidInput(message.to_string())
}

fn attribute_text(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            String::from_utf8(value.value().to_vec()).ok()
        }
        _ => None,
    }
}

/// Checks a DNS name for a subject alternative name. A single leading
/// `*.` wildcard label is accepted.
pub fn validate_dns_name(name: &str) -> Result<()> {
    let pattern = Regex::new(DNS_NAME).map_err(|e| CipherKitError::InvalidInput(e.to_string()))?;
    if name.len() > 253 || !pattern.is_match(name) {
        return Err(invalid(&format!("\"{name}\" is not a valid DNS name")));
    }
    Ok(())
}

/// Certificate validity period.
///
/// Both ends are whole seconds, the precision certificates carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// Adds calendar years; February 29 rolls over to March 1 in common years.
fn add_years(at: OffsetDateTime, years: u32) -> Result<OffsetDateTime> {
    let years = i32::try_from(years).map_err(|_| invalid("validity too long"))?;
    let year = at
        .year()
        .checked_add(years)
        .ok_or_else(|| invalid("validity too long"))?;
    match at.replace_year(year) {
        Ok(shifted) => Ok(shifted),
        Err(_) => {
            let feb_28 = at
                .replace_day(28)
                .and_then(|d| d.replace_year(year))
                .map_err(|e| invalid(&format!("validity: {e}")))?;
            Ok(feb_28 + Duration::days(1))
        }
    }
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = now();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// A validity period from now until the same instant `years` later.
    pub fn for_years(years: u32) -> Result<Self> {
        let now = now();
        Ok(Self {
            not_before: now,
            not_after: add_years(now, years)?,
        })
    }

    pub fn from_x509(validity: &x509_cert::time::Validity) -> Self {
        Self {
            not_before: OffsetDateTime::from(validity.not_before.to_system_time()),
            not_after: OffsetDateTime::from(validity.not_after.to_system_time()),
        }
    }
}

/// Everything a certificate carries besides its keys.
///
/// The issuing key and, for self-signed certificates, the subject key come
/// from the [`crate::ca::Ca`] that signs it.
#[derive(Clone, Debug, Builder)]
pub struct CertificateTemplate {
    pub subject: DistinguishedName,
    #[builder(default = Validity::for_days(365))]
    pub validity: Validity,
    #[builder(default)]
    pub key_usage: FlagSet<KeyUsages>,
    #[builder(default)]
    pub extended_key_usage: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub dns_names: Vec<String>,
    #[builder(default)]
    pub ip_addresses: Vec<IpAddr>,
    /// Falls back to the signing key's default algorithm.
    pub signature_algorithm: Option<SignatureAlgorithm>,
    /// Random when absent.
    pub serial_number: Option<Vec<u8>>,
    #[builder(default)]
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
    /// SHA-1 of the subject public key when absent.
    pub subject_key_id: Option<Vec<u8>>,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

impl CertificateTemplate {
    /// Collects every problem with the subject, names and validity window.
    pub fn validate(&self) -> std::result::Result<(), ErrorList> {
        let mut errors = match self.subject.validate() {
            Ok(()) => ErrorList::new(),
            Err(list) => list,
        };
        for name in &self.dns_names {
            if let Err(e) = validate_dns_name(name) {
                errors.push(e);
            }
        }
        if self.validity.not_after <= self.validity.not_before {
            errors.push(invalid("validity ends before it starts"));
        }
        if self.serial_number.as_ref().is_some_and(|s| s.is_empty() || s.len() > 20) {
            errors.push(invalid("serial number must be 1 to 20 bytes"));
        }
        errors.into_result(())
    }
}

/// Contents of a certificate signing request.
#[derive(Clone, Debug, Builder)]
pub struct CertificateRequestTemplate {
    pub subject: DistinguishedName,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    #[builder(default)]
    pub dns_names: Vec<String>,
    #[builder(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

impl CertificateRequestTemplate {
    pub fn validate(&self) -> std::result::Result<(), ErrorList> {
        let mut errors = match self.subject.validate() {
            Ok(()) => ErrorList::new(),
            Err(list) => list,
        };
        for name in &self.dns_names {
            if let Err(e) = validate_dns_name(name) {
                errors.push(e);
            }
        }
        errors.into_result(())
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }

    pub fn from_x509(ext: &Extension) -> Self {
        Self {
            oid: ext.extn_id,
            critical: ext.critical,
            value: ext.extn_value.as_bytes().to_vec(),
        }
    }

    pub fn to_x509(&self) -> Result<Extension> {
        Ok(Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: OctetString::new(self.value.clone())?,
        })
    }
}
