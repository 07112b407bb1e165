//! Finite field Diffie-Hellman keys (PKCS#3).
//!
//! Keys are carried in PKCS#8 with the `dhKeyAgreement` algorithm and a
//! `DHParameter` of prime and generator. The raw format is the big-endian
//! private (or public) value. DH keys agree on secrets; they never sign.

use ::rsa::BigUint;
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, Uint};
use der::{Any, AnyRef, Decode, Encode, Sequence};
use rand_core::{CryptoRngCore, OsRng};
use tracing::debug;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use zeroize::Zeroizing;

use super::{KeyFamily, KeyFormat, KeyMaterial, missing_private};
use crate::cert::SignatureAlgorithm;
use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;
use crate::pem_utils::{PRIVATE_KEY, PUBLIC_KEY};

/// `dhKeyAgreement`, 1.2.840.113549.1.3.1.
pub const DH_KEY_AGREEMENT: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.3.1");

const RFC2409_GROUP2: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381\
FFFFFFFFFFFFFFFF";

const RFC3526_GROUP14: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";

/// Well known MODP groups, all with generator 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhGroup {
    /// RFC 2409 second Oakley group, 1024 bits.
    Rfc2409Group2,
    /// RFC 3526 group 14, 2048 bits.
    Rfc3526Group14,
}

impl DhGroup {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "P1024" | "rfc2409-group2" => Ok(DhGroup::Rfc2409Group2),
            "P2048" | "rfc3526-group14" => Ok(DhGroup::Rfc3526Group14),
            other => Err(CipherKitError::UnsupportedAlgorithm(format!("DH group {other}"))),
        }
    }

    pub fn params(self) -> DhParams {
        let hex = match self {
            DhGroup::Rfc2409Group2 => RFC2409_GROUP2,
            DhGroup::Rfc3526Group14 => RFC3526_GROUP14,
        };
        let prime = BigUint::parse_bytes(hex.as_bytes(), 16).unwrap_or_default();
        DhParams {
            prime,
            generator: BigUint::from(2u32),
        }
    }
}

/// Domain parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    pub prime: BigUint,
    pub generator: BigUint,
}

/// `DHParameter ::= SEQUENCE { prime INTEGER, base INTEGER, privateValueLength INTEGER OPTIONAL }`
#[derive(Sequence)]
struct DhParameter {
    prime: Uint,
    base: Uint,
    #[asn1(optional = "true")]
    private_value_length: Option<u32>,
}

impl DhParams {
    fn to_any(&self) -> Result<Any> {
        let params = DhParameter {
            prime: Uint::new(&self.prime.to_bytes_be())?,
            base: Uint::new(&self.generator.to_bytes_be())?,
            private_value_length: None,
        };
        Ok(Any::encode_from(&params)?)
    }

    fn from_any(any: AnyRef<'_>) -> Result<Self> {
        let params: DhParameter = any.decode_as()?;
        let prime = BigUint::from_bytes_be(params.prime.as_bytes());
        let generator = BigUint::from_bytes_be(params.base.as_bytes());
        if prime.bits() < 512 || generator < BigUint::from(2u32) || generator >= prime {
            return Err(CipherKitError::DecodingError("unusable DH parameters".to_string()));
        }
        Ok(Self { prime, generator })
    }

    fn algorithm(&self) -> Result<AlgorithmIdentifierOwned> {
        Ok(AlgorithmIdentifierOwned {
            oid: DH_KEY_AGREEMENT,
            parameters: Some(self.to_any()?),
        })
    }

    fn byte_len(&self) -> usize {
        (self.prime.bits() as usize).div_ceil(8)
    }
}

fn encode_integer(value: &BigUint) -> Result<Vec<u8>> {
    Ok(Uint::new(&value.to_bytes_be())?.to_der()?)
}

fn decode_integer(der: &[u8]) -> Result<BigUint> {
    Ok(BigUint::from_bytes_be(Uint::from_der(der)?.as_bytes()))
}

#[derive(Clone, Debug)]
pub struct DhKey {
    params: DhParams,
    private: Option<Zeroizing<Vec<u8>>>,
    public: BigUint,
}

impl DhKey {
    pub fn generate(group: DhGroup) -> Result<Self> {
        Self::generate_with_rng(&mut OsRng, &group.params())
    }

    pub fn generate_with_rng(rng: &mut impl CryptoRngCore, params: &DhParams) -> Result<Self> {
        debug!(bits = params.prime.bits(), "generating DH key");
        let mut bytes = Zeroizing::new(vec![0u8; params.byte_len()]);
        rng.fill_bytes(&mut bytes);
        // 1 < x < p - 1
        let two = BigUint::from(2u32);
        let range = &params.prime - 3u32;
        let x = BigUint::from_bytes_be(&bytes) % range + two;
        Self::from_private_value(params.clone(), &x)
    }

    fn from_private_value(params: DhParams, x: &BigUint) -> Result<Self> {
        if x < &BigUint::from(2u32) || x >= &params.prime {
            return Err(CipherKitError::InvalidInput("DH private value out of range".to_string()));
        }
        let public = params.generator.modpow(x, &params.prime);
        Ok(Self {
            params,
            private: Some(Zeroizing::new(x.to_bytes_be())),
            public,
        })
    }

    pub fn params(&self) -> &DhParams {
        &self.params
    }

    pub fn public_value(&self) -> &BigUint {
        &self.public
    }

    fn private_value(&self) -> Result<BigUint> {
        self.private
            .as_ref()
            .map(|x| BigUint::from_bytes_be(x))
            .ok_or_else(|| missing_private(Self::NAME))
    }

    /// Shared secret `peer^x mod p`, left padded to the prime's length.
    pub fn compute_secret(&self, peer: &DhKey) -> Result<Zeroizing<Vec<u8>>> {
        if peer.params != self.params {
            return Err(CipherKitError::InvalidInput("DH peers use different groups".to_string()));
        }
        let one = BigUint::from(1u32);
        if peer.public <= one || peer.public >= &self.params.prime - 1u32 {
            return Err(CipherKitError::InvalidInput("DH peer public value out of range".to_string()));
        }
        let secret = peer.public.modpow(&self.private_value()?, &self.params.prime);
        let bytes = secret.to_bytes_be();
        let mut out = Zeroizing::new(vec![0u8; self.params.byte_len()]);
        let offset = out.len() - bytes.len();
        out[offset..].copy_from_slice(&bytes);
        Ok(out)
    }

    fn unsupported(format: KeyFormat) -> CipherKitError {
        CipherKitError::UnsupportedAlgorithm(format!("{format:?} encoding of DH keys"))
    }

    fn cannot_sign() -> CipherKitError {
        CipherKitError::UnsupportedAlgorithm("DH keys cannot sign".to_string())
    }
}

impl KeyFamily for DhKey {
    const NAME: &'static str = "DH";
    const DEFAULT_HASH: HashAlgorithm = HashAlgorithm::Sha256;

    fn has_private(&self) -> bool {
        self.private.is_some()
    }

    fn marshal_private(&self, format: KeyFormat) -> Result<KeyMaterial> {
        let x = self.private_value()?;
        match format {
            KeyFormat::Pkcs8 => {
                let algorithm = self.params.algorithm()?;
                let private_key = Zeroizing::new(encode_integer(&x)?);
                let params_any = algorithm.parameters.as_ref().map(AnyRef::from);
                let info = pkcs8::PrivateKeyInfo {
                    algorithm: pkcs8::AlgorithmIdentifierRef {
                        oid: algorithm.oid,
                        parameters: params_any,
                    },
                    private_key: &private_key,
                    public_key: None,
                };
                Ok(KeyMaterial::new(format, PRIVATE_KEY, info.to_der()?))
            }
            KeyFormat::Raw => Ok(KeyMaterial::new(format, PRIVATE_KEY, x.to_bytes_be())),
            other => Err(Self::unsupported(other)),
        }
    }

    fn marshal_public(&self, format: KeyFormat) -> Result<KeyMaterial> {
        match format {
            KeyFormat::Pkcs8 => Ok(KeyMaterial::new(format, PUBLIC_KEY, self.spki()?.to_der()?)),
            KeyFormat::Raw => Ok(KeyMaterial::new(format, PUBLIC_KEY, self.public.to_bytes_be())),
            other => Err(Self::unsupported(other)),
        }
    }

    fn parse_private(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        match format {
            KeyFormat::Pkcs8 => {
                let info = pkcs8::PrivateKeyInfo::try_from(bytes)?;
                if info.algorithm.oid != DH_KEY_AGREEMENT {
                    return Err(CipherKitError::DecodingError(format!(
                        "not a DH key: {}",
                        info.algorithm.oid
                    )));
                }
                let params_any = info
                    .algorithm
                    .parameters
                    .ok_or_else(|| CipherKitError::DecodingError("DH parameters missing".to_string()))?;
                let params = DhParams::from_any(params_any)?;
                let x = decode_integer(info.private_key)?;
                Self::from_private_value(params, &x)
            }
            other => Err(Self::unsupported(other)),
        }
    }

    fn parse_public(format: KeyFormat, bytes: &[u8]) -> Result<Self> {
        match format {
            KeyFormat::Pkcs8 => {
                let spki = SubjectPublicKeyInfoOwned::from_der(bytes)?;
                if spki.algorithm.oid != DH_KEY_AGREEMENT {
                    return Err(CipherKitError::DecodingError(format!(
                        "not a DH key: {}",
                        spki.algorithm.oid
                    )));
                }
                let params_any = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| CipherKitError::DecodingError("DH parameters missing".to_string()))?;
                let params = DhParams::from_any(AnyRef::from(params_any))?;
                let y = spki
                    .subject_public_key
                    .as_bytes()
                    .ok_or_else(|| CipherKitError::DecodingError("DH public key bits".to_string()))?;
                Ok(Self {
                    params,
                    private: None,
                    public: decode_integer(y)?,
                })
            }
            other => Err(Self::unsupported(other)),
        }
    }

    fn spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned {
            algorithm: self.params.algorithm()?,
            subject_public_key: BitString::from_bytes(&encode_integer(&self.public)?)?,
        })
    }

    fn sign(&self, _hash: HashAlgorithm, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Self::cannot_sign())
    }

    fn verify(&self, _hash: HashAlgorithm, _data: &[u8], _signature: &[u8]) -> Result<()> {
        Err(Self::cannot_sign())
    }

    fn default_signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        Err(Self::cannot_sign())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_chacha::rand_core::SeedableRng;

    #[test]
    fn group_primes_have_documented_sizes() {
        assert_eq!(DhGroup::Rfc2409Group2.params().prime.bits(), 1024);
        assert_eq!(DhGroup::Rfc3526Group14.params().prime.bits(), 2048);
    }

    #[test]
    fn both_sides_agree() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let params = DhGroup::Rfc2409Group2.params();
        let alice = DhKey::generate_with_rng(&mut rng, &params).unwrap();
        let bob = DhKey::generate_with_rng(&mut rng, &params).unwrap();
        let a = alice.compute_secret(&bob).unwrap();
        let b = bob.compute_secret(&alice).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn pkcs8_keys_parse_back() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let key = DhKey::generate_with_rng(&mut rng, &DhGroup::Rfc2409Group2.params()).unwrap();

        let private = key.marshal_private(KeyFormat::Pkcs8).unwrap();
        let parsed = DhKey::parse_private(KeyFormat::Pkcs8, private.as_bytes()).unwrap();
        assert_eq!(parsed.public_value(), key.public_value());

        let public = key.marshal_public(KeyFormat::Pkcs8).unwrap();
        let parsed = DhKey::parse_public(KeyFormat::Pkcs8, public.as_bytes()).unwrap();
        assert!(!parsed.has_private());
        assert_eq!(parsed.params(), key.params());
    }

    #[test]
    fn dh_keys_do_not_sign() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let key = DhKey::generate_with_rng(&mut rng, &DhGroup::Rfc2409Group2.params()).unwrap();
        assert!(matches!(
            key.sign(HashAlgorithm::Sha256, b"x"),
            Err(CipherKitError::UnsupportedAlgorithm(_))
        ));
        assert!(key.marshal_private(KeyFormat::Xml).is_err());
    }
}
