//! # CipherKit - Symmetric Ciphers, Keys and Certificates in Pure Rust
//!
//! CipherKit is a cryptography toolkit built entirely on the RustCrypto
//! crates. It exposes a fluent, value-semantics pipeline for symmetric
//! encryption, password based private key encryption (PBES1 and PBES2),
//! asymmetric key handling with signing and verification, and a small
//! certificate authority.
//!
//! ## Supported Algorithms
//!
//! - **Block ciphers**: AES, DES, 2DES, 3DES, Twofish, Blowfish, CAST5, RC2,
//!   IDEA, SM4, Camellia
//! - **Stream and AEAD ciphers**: RC4, ChaCha20, ChaCha20-Poly1305, Salsa20
//! - **Modes**: ECB, CBC, PCBC, CFB (1 to 128 bit segments), OFB, OFB8, CTR,
//!   GCM, CCM
//! - **Paddings**: Zero, PKCS#5, PKCS#7, X.923, ISO 10126, ISO 7816-4,
//!   ISO 9797-1, TBC, PKCS#1 type 1
//! - **Keys**: RSA, ECDSA P-256, SM2, finite field Diffie-Hellman
//! - **Key formats**: PKCS#1, PKCS#8, XML and raw, plus encrypted PKCS#8
//!
//! Custom ciphers, modes and paddings can be registered at runtime, see
//! [`registry`].
//!
//! ## Quick Start
//!
//! ### Encrypting with the cipher pipeline
//!
//! ```rust
//! use cipherkit::cipher::Cipher;
//! use cipherkit::registry::{BlockMode, CipherAlgorithm};
//!
//! let key = [7u8; 32];
//! let nonce = [9u8; 12];
//! let sealed = Cipher::new()
//!     .from_string("hello")
//!     .with_algorithm(CipherAlgorithm::Aes)
//!     .with_mode(BlockMode::Gcm)
//!     .with_key(&key)
//!     .with_iv(&nonce)
//!     .with_aad(b"header")
//!     .encrypt()
//!     .to_bytes()
//!     .unwrap();
//! assert_eq!(sealed.len(), 5 + 16);
//! ```
//!
//! ### Password protecting a private key
//!
//! ```rust
//! use cipherkit::builder::KeyBuilder;
//! use cipherkit::key::{EcdsaP256Key, KeyFamily};
//! use cipherkit::pbes::PbeOpts;
//!
//! let pem = KeyBuilder::new()
//!     .with_key(EcdsaP256Key::generate())
//!     .create_private_key_with_password(b"secret", &PbeOpts::pbes1("SHA1And3DES"))
//!     .to_key_string()
//!     .unwrap();
//!
//! let loaded = KeyBuilder::<EcdsaP256Key>::new().from_private_pem(&pem, Some(b"secret".as_slice()));
//! assert!(loaded.get_key().unwrap().has_private());
//! ```
//!
//! ### Issuing certificates
//!
//! ```rust,no_run
//! use cipherkit::ca::Ca;
//! use cipherkit::cert::params::DistinguishedName;
//! use cipherkit::key::RsaKey;
//!
//! # fn main() -> Result<(), cipherkit::error::ErrorList> {
//! let root = Ca::new()
//!     .with_key(RsaKey::generate(2048)?)
//!     .make_ca(
//!         DistinguishedName::builder()
//!             .common_name("Example Root")
//!             .organization("Example Corp")
//!             .country("US")
//!             .build(),
//!         5,
//!         "SHA256WithRSA",
//!     )
//!     .create_ca()
//!     .into_issuer()?;
//!
//! let server = Ca::new()
//!     .with_key(RsaKey::generate(2048)?)
//!     .make_cert(
//!         DistinguishedName::builder().common_name("server.example.com").build(),
//!         1,
//!         &["server.example.com"],
//!         &[],
//!         "SHA256WithRSA",
//!     )
//!     .create_cert(&root)
//!     .to_pem()?;
//! assert!(server.starts_with("-----BEGIN CERTIFICATE-----"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Single operations return [`error::CipherKitError`]. The builders keep
//! going after a failed configuration call and report every recorded problem
//! together as an [`error::ErrorList`]:
//!
//! ```rust
//! use cipherkit::cipher::Cipher;
//! use cipherkit::error::CipherKitError;
//! use cipherkit::registry::CipherAlgorithm;
//!
//! let errors = Cipher::new()
//!     .with_algorithm(CipherAlgorithm::Aes)
//!     .with_key(b"short")
//!     .encrypt()
//!     .to_bytes()
//!     .unwrap_err();
//! assert!(matches!(errors.first(), Some(CipherKitError::Configuration(_))));
//! ```
//!
//! ## Module Organization
//!
//! - [`registry`]: Builtin and runtime-registered ciphers, modes and paddings
//! - [`cipher`]: The fluent symmetric pipeline and its primitives
//! - [`padding`]: Block padding schemes
//! - [`hash`]: Digest selection by name
//! - [`kdf`]: PBES1 key derivation (PKCS#5 v1.5, PKCS#12, OpenSSL)
//! - [`pbes`]: Password based encryption of private keys
//! - [`pem_utils`]: PEM framing helpers
//! - [`key`]: Key families, formats, signing and verification
//! - [`builder`]: The fluent key builder
//! - [`cert`]: Certificates, requests, templates and extensions
//! - [`issuer`]: Certificate issuing
//! - [`ca`]: The fluent certificate authority
//! - [`tbs_certificate`]: Low-level certificate structure
//! - [`error`]: Error types

pub mod builder;
pub mod ca;
pub mod cert;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod issuer;
pub mod kdf;
pub mod key;
pub mod padding;
pub mod pbes;
pub mod pem_utils;
pub mod registry;
pub mod tbs_certificate;
