//! Labeled PEM blocks.

use crate::error::{CipherKitError, Result};

pub const RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";
pub const RSA_PUBLIC_KEY: &str = "RSA PUBLIC KEY";
pub const EC_PRIVATE_KEY: &str = "EC PRIVATE KEY";
pub const DH_PARAMETERS: &str = "DH PARAMETERS";
pub const PRIVATE_KEY: &str = "PRIVATE KEY";
pub const ENCRYPTED_PRIVATE_KEY: &str = "ENCRYPTED PRIVATE KEY";
pub const PUBLIC_KEY: &str = "PUBLIC KEY";
pub const CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
pub const CERTIFICATE: &str = "CERTIFICATE";

/// Convert DER data into a PEM string with the provided label and LF line endings.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Convert a PEM string to its label and DER bytes.
pub fn pem_to_der(pem_str: &str) -> Result<(String, Vec<u8>)> {
    let pem = pem::parse(pem_str)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}

/// Like [`pem_to_der`], but the block must carry `label`.
pub fn pem_to_der_expecting(pem_str: &str, label: &str) -> Result<Vec<u8>> {
    let (found, der) = pem_to_der(pem_str)?;
    if found != label {
        return Err(CipherKitError::DecodingError(format!(
            "expected PEM label \"{label}\", found \"{found}\""
        )));
    }
    Ok(der)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_is_checked() {
        let text = der_to_pem(&[0x30, 0x00], CERTIFICATE);
        assert!(text.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert_eq!(pem_to_der_expecting(&text, CERTIFICATE).unwrap(), vec![0x30, 0x00]);
        assert!(matches!(
            pem_to_der_expecting(&text, PRIVATE_KEY),
            Err(CipherKitError::DecodingError(_))
        ));
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        assert!(matches!(pem_to_der("not pem"), Err(CipherKitError::DecodingError(_))));
    }
}
