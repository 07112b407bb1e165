//! CBC, CTR and GCM over the builtin block ciphers, run by the RustCrypto
//! `cbc`, `ctr` and `aes-gcm` crates.
//!
//! Every entry point returns `Ok(None)` when the algorithm has no concrete
//! cipher type here (registered ciphers, a key length no builtin accepts) so
//! that callers can fall back to the object safe transforms in
//! [`super::mode`] and [`super::aead`].

use aes_gcm::AesGcm;
use aes_gcm::aead::{Aead, AeadCore, Payload};
use block_padding::{NoPadding, PadType, Padding, Pkcs7};
use cipher::consts::U12;
use cipher::typenum::Unsigned;
use cipher::{
    BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit, InvalidLength, KeyInit, StreamCipher,
    StreamCipherCoreWrapper,
};
use ctr::CtrCore;
use ctr::flavors::{Ctr64BE, Ctr128BE};

use crate::cipher::aead::TAG_SIZE;
use crate::error::{CipherKitError, Result};
use crate::registry::{BlockMode, CipherAlgorithm};

/// Binds `$c` to the concrete 128-bit block type of a builtin algorithm.
macro_rules! wide_block {
    ($algorithm:expr, $key:expr, $c:ident => $body:expr) => {
        match ($algorithm, $key.len()) {
            (CipherAlgorithm::Aes, 16) => {
                type $c = aes::Aes128;
                Some($body)
            }
            (CipherAlgorithm::Aes, 24) => {
                type $c = aes::Aes192;
                Some($body)
            }
            (CipherAlgorithm::Aes, 32) => {
                type $c = aes::Aes256;
                Some($body)
            }
            (CipherAlgorithm::Camellia, 16) => {
                type $c = camellia::Camellia128;
                Some($body)
            }
            (CipherAlgorithm::Camellia, 24) => {
                type $c = camellia::Camellia192;
                Some($body)
            }
            (CipherAlgorithm::Camellia, 32) => {
                type $c = camellia::Camellia256;
                Some($body)
            }
            (CipherAlgorithm::Sm4, _) => {
                type $c = sm4::Sm4;
                Some($body)
            }
            (CipherAlgorithm::Twofish, _) => {
                type $c = twofish::Twofish;
                Some($body)
            }
            _ => None,
        }
    };
}

/// Binds `$c` to the concrete 64-bit block type of a builtin algorithm.
macro_rules! narrow_block {
    ($algorithm:expr, $key:expr, $c:ident => $body:expr) => {
        match $algorithm {
            CipherAlgorithm::Des => {
                type $c = des::Des;
                Some($body)
            }
            CipherAlgorithm::TwoDes => {
                type $c = des::TdesEde2;
                Some($body)
            }
            CipherAlgorithm::TripleDes => {
                type $c = des::TdesEde3;
                Some($body)
            }
            CipherAlgorithm::Blowfish => {
                type $c = blowfish::Blowfish;
                Some($body)
            }
            CipherAlgorithm::Cast5 => {
                type $c = cast5::Cast5;
                Some($body)
            }
            CipherAlgorithm::Rc2 => {
                type $c = rc2::Rc2;
                Some($body)
            }
            CipherAlgorithm::Idea => {
                type $c = idea::Idea;
                Some($body)
            }
            _ => None,
        }
    };
}

macro_rules! any_block {
    ($algorithm:expr, $key:expr, $c:ident => $body:expr) => {
        match wide_block!($algorithm, $key, $c => $body) {
            Some(out) => Some(out),
            None => narrow_block!($algorithm, $key, $c => $body),
        }
    };
}

fn keyed<C: KeyInit>(algorithm: CipherAlgorithm, key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| {
        CipherKitError::Configuration(format!("invalid key size {} for {algorithm:?}", key.len()))
    })
}

fn iv_error(block_size: usize) -> impl FnOnce(InvalidLength) -> CipherKitError {
    move |_| CipherKitError::Configuration(format!("iv length does not match block size {block_size}"))
}

fn check_aligned(data: &[u8], block_size: usize) -> Result<()> {
    if data.len() % block_size != 0 {
        return Err(CipherKitError::InvalidInput(format!(
            "input length {} is not a multiple of block size {block_size}",
            data.len()
        )));
    }
    Ok(())
}

fn cbc_encrypt_with<C, P>(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
    P: Padding<C::BlockSize>,
{
    if P::TYPE == PadType::NoPadding {
        check_aligned(data, C::block_size())?;
    }
    let encryptor = cbc::Encryptor::<C>::inner_iv_slice_init(keyed(algorithm, key)?, iv)
        .map_err(iv_error(C::block_size()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<P>(data))
}

fn cbc_decrypt_with<C, P>(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
    P: Padding<C::BlockSize>,
{
    check_aligned(data, C::block_size())?;
    let decryptor = cbc::Decryptor::<C>::inner_iv_slice_init(keyed(algorithm, key)?, iv)
        .map_err(iv_error(C::block_size()))?;
    decryptor
        .decrypt_padded_vec_mut::<P>(data)
        .map_err(|_| CipherKitError::Padding("bad padding after cbc decryption".to_string()))
}

fn keystream(mut cipher: impl StreamCipher, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    cipher
        .try_apply_keystream(&mut out)
        .map_err(|_| CipherKitError::InvalidInput("counter space exhausted".to_string()))?;
    Ok(out)
}

/// Counter mode over the whole block as one big endian counter.
fn ctr(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Option<Vec<u8>>> {
    let wide = wide_block!(algorithm, key, C => {
        let core = CtrCore::<C, Ctr128BE>::inner_iv_slice_init(keyed(algorithm, key)?, iv)
            .map_err(iv_error(16))?;
        keystream(StreamCipherCoreWrapper::from_core(core), data)?
    });
    if wide.is_some() {
        return Ok(wide);
    }
    Ok(narrow_block!(algorithm, key, C => {
        let core = CtrCore::<C, Ctr64BE>::inner_iv_slice_init(keyed(algorithm, key)?, iv)
            .map_err(iv_error(8))?;
        keystream(StreamCipherCoreWrapper::from_core(core), data)?
    }))
}

/// Encrypts with a builtin confidentiality mode. The data must already be
/// padded for CBC.
pub fn encrypt(
    algorithm: CipherAlgorithm,
    mode: BlockMode,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Option<Vec<u8>>> {
    match mode {
        BlockMode::Cbc => Ok(any_block!(algorithm, key, C => {
            cbc_encrypt_with::<C, NoPadding>(algorithm, key, iv, data)?
        })),
        BlockMode::Ctr => ctr(algorithm, key, iv, data),
        _ => Ok(None),
    }
}

/// Decrypts with a builtin confidentiality mode, leaving any padding in place.
pub fn decrypt(
    algorithm: CipherAlgorithm,
    mode: BlockMode,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Option<Vec<u8>>> {
    match mode {
        BlockMode::Cbc => Ok(any_block!(algorithm, key, C => {
            cbc_decrypt_with::<C, NoPadding>(algorithm, key, iv, data)?
        })),
        BlockMode::Ctr => ctr(algorithm, key, iv, data),
        _ => Ok(None),
    }
}

/// CBC with PKCS#7 padding applied by the mode.
pub fn cbc_pkcs7_encrypt(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(any_block!(algorithm, key, C => {
        cbc_encrypt_with::<C, Pkcs7>(algorithm, key, iv, data)?
    }))
}

/// CBC decryption stripping PKCS#7 padding. Malformed padding is
/// [`CipherKitError::Padding`].
pub fn cbc_pkcs7_decrypt(algorithm: CipherAlgorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(any_block!(algorithm, key, C => {
        cbc_decrypt_with::<C, Pkcs7>(algorithm, key, iv, data)?
    }))
}

fn seal<A: Aead>(aead: &A, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = aes_gcm::Nonce::<<A as AeadCore>::NonceSize>::from_slice(nonce);
    aead.encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CipherKitError::EncodingError("GCM seal failed".to_string()))
}

fn open<A: Aead>(aead: &A, nonce: &[u8], aad: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let nonce = aes_gcm::Nonce::<<A as AeadCore>::NonceSize>::from_slice(nonce);
    aead.decrypt(nonce, Payload { msg: data, aad })
        .map_err(|_| CipherKitError::AuthenticationTag)
}

/// GCM with a 96-bit nonce and an appended 16 byte tag.
pub fn gcm_encrypt(
    algorithm: CipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Option<Vec<u8>>> {
    if nonce.len() != U12::USIZE {
        return Ok(None);
    }
    Ok(wide_block!(algorithm, key, C => {
        let aead = AesGcm::<C, U12>::from(keyed::<C>(algorithm, key)?);
        seal(&aead, nonce, aad, plaintext)?
    }))
}

pub fn gcm_decrypt(
    algorithm: CipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<Option<Vec<u8>>> {
    if nonce.len() != U12::USIZE {
        return Ok(None);
    }
    if data.len() < TAG_SIZE {
        return Err(CipherKitError::InvalidInput(format!(
            "ciphertext of {} bytes is shorter than the tag",
            data.len()
        )));
    }
    Ok(wide_block!(algorithm, key, C => {
        let aead = AesGcm::<C, U12>::from(keyed::<C>(algorithm, key)?);
        open(&aead, nonce, aad, data)?
    }))
}
