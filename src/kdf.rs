//! Password based key derivation for the PBES1 scheme table.
//!
//! Two derivations are provided: the PKCS#5 v1.5 iterated hash (as used by
//! OpenSSL's `EVP_BytesToKey`) and the PKCS#12 Appendix B diversified block
//! derivation. Both are deterministic.

use zeroize::Zeroizing;

use crate::error::{CipherKitError, Result};
use crate::hash::HashAlgorithm;

/// PKCS#12 diversifier for key material.
pub const PKCS12_KEY_ID: u8 = 1;
/// PKCS#12 diversifier for IV material.
pub const PKCS12_IV_ID: u8 = 2;
/// PKCS#12 diversifier for MAC keys.
pub const PKCS12_MAC_ID: u8 = 3;

/// Key and IV produced by a derivation.
#[derive(Clone)]
pub struct DerivedKey {
    pub key: Zeroizing<Vec<u8>>,
    pub iv: Vec<u8>,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"<redacted>")
            .field("iv", &hex::encode(&self.iv))
            .finish()
    }
}

/// Which derivation a scheme uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    /// PKCS#5 v1.5 iterated hash.
    Pkcs5V15,
    /// PKCS#12 Appendix B.
    Pkcs12,
}

impl Kdf {
    /// Derives `key_len` key bytes and `iv_len` IV bytes.
    pub fn derive(
        self,
        hash: HashAlgorithm,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        key_len: usize,
        iv_len: usize,
    ) -> Result<DerivedKey> {
        if iterations == 0 {
            return Err(CipherKitError::Configuration(
                "iteration count must be positive".to_string(),
            ));
        }
        match self {
            Kdf::Pkcs5V15 => {
                let stream = pkcs5_v15(hash, password, salt, iterations, key_len + iv_len);
                Ok(DerivedKey {
                    key: Zeroizing::new(stream[..key_len].to_vec()),
                    iv: stream[key_len..].to_vec(),
                })
            }
            Kdf::Pkcs12 => {
                let password = bmp_password(password)?;
                Ok(DerivedKey {
                    key: pkcs12(hash, &password, salt, PKCS12_KEY_ID, iterations, key_len),
                    iv: pkcs12(hash, &password, salt, PKCS12_IV_ID, iterations, iv_len).to_vec(),
                })
            }
        }
    }
}

/// Hashes `password || salt` `iterations` times in total, then keeps
/// extending with `H^c(prev || password || salt)` until `len` bytes exist.
pub fn pkcs5_v15(
    hash: HashAlgorithm,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(len + hash.output_size()));
    let mut prev: Vec<u8> = Vec::new();
    while out.len() < len {
        let mut block = hash.digest_parts(&[prev.as_slice(), password, salt]);
        for _ in 1..iterations {
            block = hash.digest(&block);
        }
        out.extend_from_slice(&block);
        prev = block;
    }
    out.truncate(len);
    out
}

/// Encodes a UTF-8 password as a NUL terminated big endian BMPString.
pub fn bmp_password(password: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let text = std::str::from_utf8(password)
        .map_err(|_| CipherKitError::InvalidInput("password is not valid UTF-8".to_string()))?;
    let mut out = Zeroizing::new(Vec::with_capacity(text.len() * 2 + 2));
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    Ok(out)
}

/// Repeats `src` to fill a whole number of `v` byte blocks.
fn fill_blocks(src: &[u8], v: usize) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    let len = src.len().div_ceil(v) * v;
    src.iter().copied().cycle().take(len).collect()
}

/// RFC 7292 Appendix B.2. `password` is the already BMP encoded password.
pub fn pkcs12(
    hash: HashAlgorithm,
    password: &[u8],
    salt: &[u8],
    id: u8,
    iterations: u32,
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let u = hash.output_size();
    let v = hash.block_size();

    let diversifier = vec![id; v];
    let mut i_buf = Zeroizing::new(fill_blocks(salt, v));
    i_buf.extend_from_slice(&fill_blocks(password, v));

    let mut out = Zeroizing::new(Vec::with_capacity(len + u));
    loop {
        let mut a = hash.digest_parts(&[diversifier.as_slice(), i_buf.as_slice()]);
        for _ in 1..iterations {
            a = hash.digest(&a);
        }
        out.extend_from_slice(&a);
        if out.len() >= len {
            break;
        }

        let b: Vec<u8> = a.iter().copied().cycle().take(v).collect();
        // I_j = (I_j + B + 1) mod 2^(8v)
        for chunk in i_buf.chunks_mut(v) {
            let mut carry = 1u16;
            for k in (0..v).rev() {
                let sum = chunk[k] as u16 + b[k] as u16 + carry;
                chunk[k] = sum as u8;
                carry = sum >> 8;
            }
        }
    }
    out.truncate(len);
    out
}
