//! Stream algorithms. These ignore the block mode and padding of a pipeline.

use chacha20poly1305::ChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, Payload};
use cipher::generic_array::ArrayLength;
use cipher::{KeyInit, KeyIvInit, StreamCipher};
use rc4::Rc4;

use crate::error::{CipherKitError, Result};
use crate::registry::CipherAlgorithm;

/// Whether the algorithm is applied as a keystream rather than per block.
pub fn is_stream(algorithm: CipherAlgorithm) -> bool {
    matches!(
        algorithm,
        CipherAlgorithm::Rc4
            | CipherAlgorithm::ChaCha20
            | CipherAlgorithm::ChaCha20Poly1305
            | CipherAlgorithm::Salsa20
    )
}

/// Nonce length the algorithm expects; RC4 takes none.
pub fn nonce_len(algorithm: CipherAlgorithm) -> usize {
    match algorithm {
        CipherAlgorithm::ChaCha20 | CipherAlgorithm::ChaCha20Poly1305 => 12,
        CipherAlgorithm::Salsa20 => 8,
        _ => 0,
    }
}

fn rc4_apply<N>(key: &[u8], data: &mut [u8]) -> Result<()>
where
    N: ArrayLength<u8>,
    Rc4<N>: KeyInit + StreamCipher,
{
    let mut rc4 = Rc4::<N>::new_from_slice(key).map_err(|_| {
        CipherKitError::Configuration(format!("invalid key size {} for RC4", key.len()))
    })?;
    rc4.apply_keystream(data);
    Ok(())
}

macro_rules! rc4_by_len {
    ($key:expr, $data:expr; $($len:literal => $size:ident),+ $(,)?) => {
        match $key.len() {
            $($len => rc4_apply::<cipher::consts::$size>($key, $data),)+
            n => Err(CipherKitError::Configuration(format!(
                "invalid key size {n} for RC4"
            ))),
        }
    };
}

/// RC4 keystream over `data`, for keys of 5 to 32 bytes.
pub fn rc4(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    rc4_by_len!(key, &mut out;
        5 => U5, 6 => U6, 7 => U7, 8 => U8, 9 => U9, 10 => U10, 11 => U11, 12 => U12,
        13 => U13, 14 => U14, 15 => U15, 16 => U16, 17 => U17, 18 => U18, 19 => U19,
        20 => U20, 21 => U21, 22 => U22, 23 => U23, 24 => U24, 25 => U25, 26 => U26,
        27 => U27, 28 => U28, 29 => U29, 30 => U30, 31 => U31, 32 => U32,
    )?;
    Ok(out)
}

fn keystream<C: KeyIvInit + StreamCipher>(name: &str, key: &[u8], nonce: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut cipher = C::new_from_slices(key, nonce).map_err(|_| {
        CipherKitError::Configuration(format!(
            "{name} needs a 32 byte key and a {} byte nonce",
            C::iv_size()
        ))
    })?;
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    Ok(out)
}

fn chacha20poly1305(key: &[u8], nonce: &[u8]) -> Result<(ChaCha20Poly1305, chacha20poly1305::Nonce)> {
    let aead = ChaCha20Poly1305::new_from_slice(key).map_err(|_| {
        CipherKitError::Configuration(format!("invalid key size {} for ChaCha20Poly1305", key.len()))
    })?;
    if nonce.len() != 12 {
        return Err(CipherKitError::Configuration(format!(
            "ChaCha20Poly1305 needs a 12 byte nonce, got {}",
            nonce.len()
        )));
    }
    Ok((aead, *chacha20poly1305::Nonce::from_slice(nonce)))
}

/// Encrypts with a stream algorithm. ChaCha20-Poly1305 appends its tag.
pub fn encrypt(
    algorithm: CipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    match algorithm {
        CipherAlgorithm::Rc4 => rc4(key, data),
        CipherAlgorithm::ChaCha20 => keystream::<chacha20::ChaCha20>("ChaCha20", key, nonce, data),
        CipherAlgorithm::Salsa20 => keystream::<salsa20::Salsa20>("Salsa20", key, nonce, data),
        CipherAlgorithm::ChaCha20Poly1305 => {
            let (aead, nonce) = chacha20poly1305(key, nonce)?;
            aead.encrypt(&nonce, Payload { msg: data, aad })
                .map_err(|_| CipherKitError::EncodingError("ChaCha20Poly1305 seal failed".to_string()))
        }
        other => Err(CipherKitError::UnsupportedAlgorithm(format!(
            "{other:?} is not a stream algorithm"
        ))),
    }
}

/// Decrypts with a stream algorithm, verifying the ChaCha20-Poly1305 tag.
pub fn decrypt(
    algorithm: CipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    match algorithm {
        CipherAlgorithm::ChaCha20Poly1305 => {
            let (aead, nonce) = chacha20poly1305(key, nonce)?;
            aead.decrypt(&nonce, Payload { msg: data, aad })
                .map_err(|_| CipherKitError::AuthenticationTag)
        }
        other => encrypt(other, key, nonce, aad, data),
    }
}
