#![allow(dead_code)]

use cipherkit::ca::Ca;
use cipherkit::cert::CertificateWithPrivateKey;
use cipherkit::cert::params::DistinguishedName;
use cipherkit::key::EcdsaP256Key;
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;

pub const PLAINTEXT: &[u8] = b"The quick brown fox jumps over the lazy dog";

/// Deterministic RNG so key generation in tests is repeatable.
pub fn rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

pub fn subject(common_name: &str) -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(common_name)
        .organization("CipherKit Test")
        .country("US")
        .build()
}

/// A self-signed ECDSA root, ready to issue certificates.
pub fn generate_ca_cert() -> CertificateWithPrivateKey<EcdsaP256Key> {
    Ca::new()
        .with_key(EcdsaP256Key::generate_with_rng(&mut rng(0xca)))
        .make_ca(subject("myca.local"), 10, "ECDSAWithSHA256")
        .create_ca()
        .into_issuer()
        .expect("root certificate")
}
