//! Confidentiality modes over any [`BlockCipher`].
//!
//! Builtin ciphers run CBC and CTR through [`super::typed`]; the functions here
//! serve registered ciphers and the modes without a RustCrypto crate.

use crate::cipher::block::BlockCipher;
use crate::error::{CipherKitError, Result};
use crate::registry::{BlockMode, ModeRegistry};

/// Transform behind a mode. Custom modes registered with a [`ModeRegistry`]
/// implement this; the builtin non-AEAD modes are served by [`builtin`].
pub trait ModeTransform: Send + Sync {
    fn encrypt(&self, cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// Block oriented modes need plaintext padded to the block size.
    fn needs_padding(&self) -> bool;

    /// IV length for a cipher of `block_size`; 0 when no IV is used.
    fn iv_len(&self, block_size: usize) -> usize {
        block_size
    }
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

fn check_iv(iv: &[u8], block_size: usize) -> Result<()> {
    if iv.len() != block_size {
        return Err(CipherKitError::Configuration(format!(
            "iv length {} does not match block size {block_size}",
            iv.len()
        )));
    }
    Ok(())
}

fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

pub fn ecb_encrypt(cipher: &dyn BlockCipher, data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_aligned(data, bs)?;
    let mut out = data.to_vec();
    for block in out.chunks_mut(bs) {
        cipher.encrypt_block(block);
    }
    Ok(out)
}

pub fn ecb_decrypt(cipher: &dyn BlockCipher, data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_aligned(data, bs)?;
    let mut out = data.to_vec();
    for block in out.chunks_mut(bs) {
        cipher.decrypt_block(block);
    }
    Ok(out)
}

pub fn cbc_encrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    check_aligned(data, bs)?;
    let mut out = data.to_vec();
    let mut prev = iv.to_vec();
    for block in out.chunks_mut(bs) {
        xor_in_place(block, &prev);
        cipher.encrypt_block(block);
        prev.copy_from_slice(block);
    }
    Ok(out)
}

pub fn cbc_decrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    check_aligned(data, bs)?;
    let mut out = data.to_vec();
    let mut prev = iv.to_vec();
    for block in out.chunks_mut(bs) {
        let saved = block.to_vec();
        cipher.decrypt_block(block);
        xor_in_place(block, &prev);
        prev = saved;
    }
    Ok(out)
}

/// Propagating CBC: the chaining value is `P_i xor C_i`.
pub fn pcbc_encrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    check_aligned(data, bs)?;
    let mut out = data.to_vec();
    let mut chain = iv.to_vec();
    for block in out.chunks_mut(bs) {
        let plain = block.to_vec();
        xor_in_place(block, &chain);
        cipher.encrypt_block(block);
        chain.copy_from_slice(block);
        xor_in_place(&mut chain, &plain);
    }
    Ok(out)
}

pub fn pcbc_decrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    check_aligned(data, bs)?;
    let mut out = data.to_vec();
    let mut chain = iv.to_vec();
    for block in out.chunks_mut(bs) {
        let encrypted = block.to_vec();
        cipher.decrypt_block(block);
        xor_in_place(block, &chain);
        chain = encrypted;
        xor_in_place(&mut chain, block);
    }
    Ok(out)
}

/// Cipher feedback with a segment of `segment` bytes (`1..=block_size`).
/// A trailing partial segment is processed as a stream.
pub fn cfb(
    cipher: &dyn BlockCipher,
    iv: &[u8],
    data: &[u8],
    segment: usize,
    decrypt: bool,
) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    if segment == 0 || segment > bs {
        return Err(CipherKitError::Configuration(format!(
            "cfb segment of {segment} bytes does not fit a {bs} byte block"
        )));
    }
    let mut register = iv.to_vec();
    let mut keystream = vec![0u8; bs];
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(segment) {
        keystream.copy_from_slice(&register);
        cipher.encrypt_block(&mut keystream);
        let produced: Vec<u8> = chunk.iter().zip(&keystream).map(|(d, k)| d ^ k).collect();
        let feedback = if decrypt { chunk } else { &produced[..] };
        register.rotate_left(segment);
        register[bs - segment..bs - segment + feedback.len()].copy_from_slice(feedback);
        out.extend_from_slice(&produced);
    }
    Ok(out)
}

/// One bit cipher feedback, most significant bit first.
pub fn cfb1(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8], decrypt: bool) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    let mut register = iv.to_vec();
    let mut keystream = vec![0u8; bs];
    let mut out = Vec::with_capacity(data.len());
    for byte in data {
        let mut result = 0u8;
        for bit in (0..8).rev() {
            keystream.copy_from_slice(&register);
            cipher.encrypt_block(&mut keystream);
            let input = (byte >> bit) & 1;
            let output = input ^ (keystream[0] >> 7);
            result |= output << bit;
            let feedback = if decrypt { input } else { output };
            shift_left_one_bit(&mut register, feedback);
        }
        out.push(result);
    }
    Ok(out)
}

fn shift_left_one_bit(register: &mut [u8], low_bit: u8) {
    let mut carry = low_bit;
    for b in register.iter_mut().rev() {
        let next = *b >> 7;
        *b = (*b << 1) | carry;
        carry = next;
    }
}

/// Output feedback over full blocks. Encryption and decryption are identical.
pub fn ofb(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    let mut register = iv.to_vec();
    let mut out = data.to_vec();
    for chunk in out.chunks_mut(bs) {
        cipher.encrypt_block(&mut register);
        xor_in_place(chunk, &register);
    }
    Ok(out)
}

/// Output feedback with an 8 bit feedback register shift.
pub fn ofb8(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    let mut register = iv.to_vec();
    let mut keystream = vec![0u8; bs];
    let out = data
        .iter()
        .map(|b| {
            keystream.copy_from_slice(&register);
            cipher.encrypt_block(&mut keystream);
            register.rotate_left(1);
            register[bs - 1] = keystream[0];
            b ^ keystream[0]
        })
        .collect();
    Ok(out)
}

/// Big endian increment of the whole counter block, wrapping on overflow.
pub(crate) fn increment_be(counter: &mut [u8]) {
    for b in counter.iter_mut().rev() {
        let (next, overflow) = b.overflowing_add(1);
        *b = next;
        if !overflow {
            break;
        }
    }
}

/// Counter mode; the IV is the initial counter block.
pub fn ctr(cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    check_iv(iv, bs)?;
    let mut counter = iv.to_vec();
    let mut keystream = vec![0u8; bs];
    let mut out = data.to_vec();
    for chunk in out.chunks_mut(bs) {
        keystream.copy_from_slice(&counter);
        cipher.encrypt_block(&mut keystream);
        xor_in_place(chunk, &keystream);
        increment_be(&mut counter);
    }
    Ok(out)
}

/// The builtin non-authenticated modes as [`ModeTransform`]s.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinMode(BlockMode);

impl BuiltinMode {
    fn cfb_segment(&self, block_size: usize) -> Option<usize> {
        match self.0 {
            BlockMode::Cfb => Some(block_size),
            BlockMode::Cfb8 => Some(1),
            BlockMode::Cfb16 => Some(2),
            BlockMode::Cfb32 => Some(4),
            BlockMode::Cfb64 => Some(8),
            BlockMode::Cfb128 => Some(16),
            _ => None,
        }
    }

    fn apply(&self, cipher: &dyn BlockCipher, iv: &[u8], data: &[u8], decrypt: bool) -> Result<Vec<u8>> {
        let bs = cipher.block_size();
        match self.0 {
            BlockMode::Ecb if decrypt => ecb_decrypt(cipher, data),
            BlockMode::Ecb => ecb_encrypt(cipher, data),
            BlockMode::Cbc if decrypt => cbc_decrypt(cipher, iv, data),
            BlockMode::Cbc => cbc_encrypt(cipher, iv, data),
            BlockMode::Pcbc if decrypt => pcbc_decrypt(cipher, iv, data),
            BlockMode::Pcbc => pcbc_encrypt(cipher, iv, data),
            BlockMode::Cfb1 => cfb1(cipher, iv, data, decrypt),
            BlockMode::Ofb => ofb(cipher, iv, data),
            BlockMode::Ofb8 => ofb8(cipher, iv, data),
            BlockMode::Ctr => ctr(cipher, iv, data),
            _ => match self.cfb_segment(bs) {
                Some(segment) => cfb(cipher, iv, data, segment, decrypt),
                None => Err(CipherKitError::UnsupportedAlgorithm(format!(
                    "{:?} is not a confidentiality mode",
                    self.0
                ))),
            },
        }
    }
}

impl ModeTransform for BuiltinMode {
    fn encrypt(&self, cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        self.apply(cipher, iv, data, false)
    }

    fn decrypt(&self, cipher: &dyn BlockCipher, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        self.apply(cipher, iv, data, true)
    }

    fn needs_padding(&self) -> bool {
        matches!(self.0, BlockMode::Ecb | BlockMode::Cbc | BlockMode::Pcbc)
    }

    fn iv_len(&self, block_size: usize) -> usize {
        match self.0 {
            BlockMode::Ecb => 0,
            _ => block_size,
        }
    }
}

/// Builtin transform for a non-AEAD mode.
pub fn builtin(mode: BlockMode) -> Option<BuiltinMode> {
    match mode {
        BlockMode::Gcm | BlockMode::Ccm | BlockMode::Custom(_) => None,
        other => Some(BuiltinMode(other)),
    }
}

/// Whether the mode authenticates (GCM, CCM).
pub fn is_aead(mode: BlockMode) -> bool {
    matches!(mode, BlockMode::Gcm | BlockMode::Ccm)
}

/// Resolves a builtin or registered transform.
pub fn resolve(registry: &ModeRegistry, mode: BlockMode) -> Result<std::sync::Arc<dyn ModeTransform>> {
    if let Some(builtin) = builtin(mode) {
        return Ok(std::sync::Arc::new(builtin));
    }
    registry
        .behavior(mode)
        .ok_or_else(|| CipherKitError::UnsupportedAlgorithm(registry.name(mode)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::block::new_builtin;
    use crate::registry::CipherAlgorithm;

    fn aes128() -> Box<dyn BlockCipher> {
        // NIST SP 800-38A key
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        new_builtin(CipherAlgorithm::Aes, &key).unwrap()
    }

    fn plaintext() -> Vec<u8> {
        hex::decode("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51").unwrap()
    }

    #[test]
    fn cbc_sp800_38a() {
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let out = cbc_encrypt(aes128().as_ref(), &iv, &plaintext()).unwrap();
        assert_eq!(
            hex::encode(&out),
            "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2"
        );
        assert_eq!(cbc_decrypt(aes128().as_ref(), &iv, &out).unwrap(), plaintext());
    }

    #[test]
    fn ecb_sp800_38a() {
        let out = ecb_encrypt(aes128().as_ref(), &plaintext()).unwrap();
        assert_eq!(
            hex::encode(&out),
            "3ad77bb40d7a3660a89ecaf32466ef97f5d3d58503b9699de785895a96fdbaaf"
        );
    }

    #[test]
    fn cfb128_sp800_38a() {
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let out = cfb(aes128().as_ref(), &iv, &plaintext(), 16, false).unwrap();
        assert_eq!(
            hex::encode(&out),
            "3b3fd92eb72dad20333449f8e83cfb4ac8a64537a0b3a93fcde3cdad9f1ce58b"
        );
        assert_eq!(cfb(aes128().as_ref(), &iv, &out, 16, true).unwrap(), plaintext());
    }

    #[test]
    fn cfb8_sp800_38a() {
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172aae2d").unwrap();
        let out = cfb(aes128().as_ref(), &iv, &pt, 1, false).unwrap();
        assert_eq!(hex::encode(&out), "3b79424c9c0dd436bace9e0ed4586a4f32b9");
        assert_eq!(cfb(aes128().as_ref(), &iv, &out, 1, true).unwrap(), pt);
    }

    #[test]
    fn cfb1_sp800_38a() {
        // plaintext bits 0110 1011 1100 0001 -> ciphertext bits 0110 1000 1011 0011
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let out = cfb1(aes128().as_ref(), &iv, &[0x6b, 0xc1], false).unwrap();
        assert_eq!(out, vec![0x68, 0xb3]);
        assert_eq!(cfb1(aes128().as_ref(), &iv, &out, true).unwrap(), vec![0x6b, 0xc1]);
    }

    #[test]
    fn ofb_sp800_38a() {
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let out = ofb(aes128().as_ref(), &iv, &plaintext()).unwrap();
        assert_eq!(
            hex::encode(&out),
            "3b3fd92eb72dad20333449f8e83cfb4a7789508d16918f03f53c52dac54ed825"
        );
    }

    #[test]
    fn ctr_sp800_38a() {
        let iv = hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").unwrap();
        let out = ctr(aes128().as_ref(), &iv, &plaintext()).unwrap();
        assert_eq!(
            hex::encode(&out),
            "874d6191b620e3261bef6864990db6ce9806f66b7970fdff8617187bb9fffdff"
        );
        assert_eq!(ctr(aes128().as_ref(), &iv, &out).unwrap(), plaintext());
    }

    #[test]
    fn pcbc_and_ofb8_invert() {
        let iv = [7u8; 16];
        let data = plaintext();
        let c = pcbc_encrypt(aes128().as_ref(), &iv, &data).unwrap();
        assert_ne!(c, cbc_encrypt(aes128().as_ref(), &iv, &data).unwrap());
        assert_eq!(pcbc_decrypt(aes128().as_ref(), &iv, &c).unwrap(), data);

        let c = ofb8(aes128().as_ref(), &iv, &data[..21]).unwrap();
        assert_eq!(ofb8(aes128().as_ref(), &iv, &c).unwrap(), &data[..21]);
    }

    #[test]
    fn counter_wraps() {
        let mut counter = [0x00, 0xff, 0xff];
        increment_be(&mut counter);
        assert_eq!(counter, [0x01, 0x00, 0x00]);
        let mut counter = [0xff, 0xff];
        increment_be(&mut counter);
        assert_eq!(counter, [0x00, 0x00]);
    }

    #[test]
    fn cfb128_needs_a_wide_block() {
        let des = new_builtin(CipherAlgorithm::Des, &[0x13; 8]).unwrap();
        let mode = builtin(BlockMode::Cfb128).unwrap();
        assert!(matches!(
            mode.encrypt(des.as_ref(), &[0; 8], b"data"),
            Err(CipherKitError::Configuration(_))
        ));
    }

    #[test]
    fn unaligned_cbc_input_is_rejected() {
        assert!(matches!(
            cbc_encrypt(aes128().as_ref(), &[0; 16], &[1, 2, 3]),
            Err(CipherKitError::InvalidInput(_))
        ));
    }
}
