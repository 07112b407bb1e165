//! GCM and CCM over any 128-bit [`BlockCipher`]. The 16 byte tag is appended
//! to the ciphertext.
//!
//! GCM with a 96-bit nonce over a builtin cipher goes through `aes-gcm` in
//! [`super::typed`]; this construction covers other nonce lengths and
//! registered ciphers.

use ghash::GHash;
use ghash::universal_hash::{KeyInit, UniversalHash};
use subtle::ConstantTimeEq;

use crate::cipher::block::BlockCipher;
use crate::error::{CipherKitError, Result};

pub const TAG_SIZE: usize = 16;

fn require_128(cipher: &dyn BlockCipher, mode: &str) -> Result<()> {
    if cipher.block_size() != 16 {
        return Err(CipherKitError::Configuration(format!(
            "{mode} needs a 128-bit block cipher, got {} byte blocks",
            cipher.block_size()
        )));
    }
    Ok(())
}

fn split_tag(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < TAG_SIZE {
        return Err(CipherKitError::InvalidInput(format!(
            "ciphertext of {} bytes is shorter than the tag",
            data.len()
        )));
    }
    Ok(data.split_at(data.len() - TAG_SIZE))
}

fn verify_tag(expected: &[u8], received: &[u8]) -> Result<()> {
    if bool::from(expected.ct_eq(received)) {
        Ok(())
    } else {
        Err(CipherKitError::AuthenticationTag)
    }
}

fn inc32(counter: &mut [u8; 16]) {
    let n = u32::from_be_bytes([counter[12], counter[13], counter[14], counter[15]]);
    counter[12..].copy_from_slice(&n.wrapping_add(1).to_be_bytes());
}

struct Gcm<'a> {
    cipher: &'a dyn BlockCipher,
    h: [u8; 16],
    j0: [u8; 16],
}

impl<'a> Gcm<'a> {
    fn new(cipher: &'a dyn BlockCipher, nonce: &[u8]) -> Result<Self> {
        require_128(cipher, "GCM")?;
        if nonce.is_empty() {
            return Err(CipherKitError::Configuration("GCM nonce is empty".to_string()));
        }
        let mut h = [0u8; 16];
        cipher.encrypt_block(&mut h);

        let mut j0 = [0u8; 16];
        if nonce.len() == 12 {
            j0[..12].copy_from_slice(nonce);
            j0[15] = 1;
        } else {
            let mut ghash = GHash::new(&h.into());
            ghash.update_padded(nonce);
            let mut len_block = [0u8; 16];
            len_block[8..].copy_from_slice(&((nonce.len() as u64) * 8).to_be_bytes());
            ghash.update_padded(&len_block);
            j0.copy_from_slice(&ghash.finalize());
        }
        Ok(Self { cipher, h, j0 })
    }

    fn keystream(&self, data: &[u8]) -> Vec<u8> {
        let mut counter = self.j0;
        let mut out = data.to_vec();
        for chunk in out.chunks_mut(16) {
            inc32(&mut counter);
            let mut block = counter;
            self.cipher.encrypt_block(&mut block);
            for (d, k) in chunk.iter_mut().zip(&block) {
                *d ^= k;
            }
        }
        out
    }

    fn tag(&self, aad: &[u8], ciphertext: &[u8]) -> [u8; 16] {
        let mut ghash = GHash::new(&self.h.into());
        ghash.update_padded(aad);
        ghash.update_padded(ciphertext);
        let mut len_block = [0u8; 16];
        len_block[..8].copy_from_slice(&((aad.len() as u64) * 8).to_be_bytes());
        len_block[8..].copy_from_slice(&((ciphertext.len() as u64) * 8).to_be_bytes());
        ghash.update_padded(&len_block);

        let mut mask = self.j0;
        self.cipher.encrypt_block(&mut mask);
        let mut tag = [0u8; 16];
        for ((t, s), m) in tag.iter_mut().zip(ghash.finalize().iter()).zip(&mask) {
            *t = s ^ m;
        }
        tag
    }
}

pub fn gcm_encrypt(
    cipher: &dyn BlockCipher,
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let gcm = Gcm::new(cipher, nonce)?;
    let mut out = gcm.keystream(plaintext);
    let tag = gcm.tag(aad, &out);
    out.extend_from_slice(&tag);
    Ok(out)
}

pub fn gcm_decrypt(
    cipher: &dyn BlockCipher,
    nonce: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    let gcm = Gcm::new(cipher, nonce)?;
    let (ciphertext, tag) = split_tag(data)?;
    verify_tag(&gcm.tag(aad, ciphertext), tag)?;
    Ok(gcm.keystream(ciphertext))
}

struct Ccm<'a> {
    cipher: &'a dyn BlockCipher,
    nonce: &'a [u8],
    /// Width of the length field, `15 - nonce.len()`.
    l: usize,
}

impl<'a> Ccm<'a> {
    fn new(cipher: &'a dyn BlockCipher, nonce: &'a [u8], payload_len: usize) -> Result<Self> {
        require_128(cipher, "CCM")?;
        if !(7..=13).contains(&nonce.len()) {
            return Err(CipherKitError::Configuration(format!(
                "CCM nonce must be 7 to 13 bytes, got {}",
                nonce.len()
            )));
        }
        let l = 15 - nonce.len();
        if l < 8 && (payload_len as u64) >> (8 * l) != 0 {
            return Err(CipherKitError::InvalidInput(format!(
                "payload of {payload_len} bytes is too long for a {}-byte CCM nonce",
                nonce.len()
            )));
        }
        Ok(Self { cipher, nonce, l })
    }

    fn counter_block(&self, i: u64) -> [u8; 16] {
        let mut block = [0u8; 16];
        block[0] = (self.l - 1) as u8;
        block[1..1 + self.nonce.len()].copy_from_slice(self.nonce);
        block[16 - self.l..].copy_from_slice(&i.to_be_bytes()[8 - self.l..]);
        block
    }

    fn mac(&self, aad: &[u8], plaintext: &[u8]) -> [u8; 16] {
        let mut b0 = [0u8; 16];
        let adata = if aad.is_empty() { 0 } else { 0x40 };
        b0[0] = adata | ((((TAG_SIZE - 2) / 2) as u8) << 3) | (self.l - 1) as u8;
        b0[1..1 + self.nonce.len()].copy_from_slice(self.nonce);
        let len = (plaintext.len() as u64).to_be_bytes();
        b0[16 - self.l..].copy_from_slice(&len[8 - self.l..]);

        let mut stream = b0.to_vec();
        if !aad.is_empty() {
            let a = aad.len() as u64;
            if a < 0xFF00 {
                stream.extend_from_slice(&(a as u16).to_be_bytes());
            } else if a <= u32::MAX as u64 {
                stream.extend_from_slice(&[0xFF, 0xFE]);
                stream.extend_from_slice(&(a as u32).to_be_bytes());
            } else {
                stream.extend_from_slice(&[0xFF, 0xFF]);
                stream.extend_from_slice(&a.to_be_bytes());
            }
            stream.extend_from_slice(aad);
            stream.resize(stream.len().div_ceil(16) * 16, 0);
        }
        stream.extend_from_slice(plaintext);
        stream.resize(stream.len().div_ceil(16) * 16, 0);

        let mut x = [0u8; 16];
        for block in stream.chunks(16) {
            for (xi, bi) in x.iter_mut().zip(block) {
                *xi ^= bi;
            }
            self.cipher.encrypt_block(&mut x);
        }

        let mut s0 = self.counter_block(0);
        self.cipher.encrypt_block(&mut s0);
        for (xi, si) in x.iter_mut().zip(&s0) {
            *xi ^= si;
        }
        x
    }

    fn keystream(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        for (i, chunk) in out.chunks_mut(16).enumerate() {
            let mut block = self.counter_block(i as u64 + 1);
            self.cipher.encrypt_block(&mut block);
            for (d, k) in chunk.iter_mut().zip(&block) {
                *d ^= k;
            }
        }
        out
    }
}

pub fn ccm_encrypt(
    cipher: &dyn BlockCipher,
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let ccm = Ccm::new(cipher, nonce, plaintext.len())?;
    let tag = ccm.mac(aad, plaintext);
    let mut out = ccm.keystream(plaintext);
    out.extend_from_slice(&tag);
    Ok(out)
}

pub fn ccm_decrypt(
    cipher: &dyn BlockCipher,
    nonce: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<Vec<u8>> {
    let (ciphertext, tag) = split_tag(data)?;
    let ccm = Ccm::new(cipher, nonce, ciphertext.len())?;
    let plaintext = ccm.keystream(ciphertext);
    verify_tag(&ccm.mac(aad, &plaintext), tag)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::block::new_builtin;
    use crate::registry::CipherAlgorithm;

    fn aes(key: &[u8]) -> Box<dyn BlockCipher> {
        new_builtin(CipherAlgorithm::Aes, key).unwrap()
    }

    #[test]
    fn gcm_zero_vectors() {
        let cipher = aes(&[0; 16]);
        assert_eq!(
            hex::encode(gcm_encrypt(cipher.as_ref(), &[0; 12], b"", b"").unwrap()),
            "58e2fccefa7e3061367f1d57a4e7455a"
        );
        assert_eq!(
            hex::encode(gcm_encrypt(cipher.as_ref(), &[0; 12], b"", &[0; 16]).unwrap()),
            "0388dace60b6a392f328c2b971b2fe78ab6e47d42cec13bdf53a67b21257bddf"
        );
    }

    #[test]
    fn gcm_short_nonce_with_aad() {
        let cipher = aes(&hex::decode("feffe9928665731c6d6a8f9467308308").unwrap());
        let nonce = hex::decode("cafebabefacedbad").unwrap();
        let aad = hex::decode("feedfacedeadbeeffeedfacedeadbeefabaddad2").unwrap();
        let pt = hex::decode(
            "d9313225f88406e5a55909c5aff5269a86a7a9531534f7da2e4c303d8a318a72\
             1c3c0c95956809532fcf0e2449a6b525b16aedf5aa0de657ba637b39",
        )
        .unwrap();
        let out = gcm_encrypt(cipher.as_ref(), &nonce, &aad, &pt).unwrap();
        assert_eq!(
            hex::encode(&out),
            "61353b4c2806934a777ff51fa22a4755699b2a714fcdc6f83766e5f97b6c7423\
             73806900e49f24b22b097544d4896b424989b5e1ebac0f07c23f4598\
             3612d2e79e3b0785561be14aaca2fccb"
        );
        assert_eq!(gcm_decrypt(cipher.as_ref(), &nonce, &aad, &out).unwrap(), pt);
    }

    #[test]
    fn ccm_matches_reference() {
        let key: Vec<u8> = (0x40..0x50).collect();
        let nonce: Vec<u8> = (0x10..0x17).collect();
        let aad: Vec<u8> = (0x00..0x08).collect();
        let pt: Vec<u8> = (0x20..0x24).collect();
        let cipher = aes(&key);
        let out = ccm_encrypt(cipher.as_ref(), &nonce, &aad, &pt).unwrap();
        assert_eq!(hex::encode(&out), "7162015b2bb57c0af45e4d8304f05f45993f1517");
        assert_eq!(ccm_decrypt(cipher.as_ref(), &nonce, &aad, &out).unwrap(), pt);

        let nonce = hex::decode("cafebabefacedbaddecaf888").unwrap();
        let out = ccm_encrypt(cipher.as_ref(), &nonce, b"", b"hello ccm world!!").unwrap();
        assert_eq!(
            hex::encode(&out),
            "a022656b4da1f12f523062ffd14a0aff6982412a5c02828266cf419d94df94388e"
        );
    }

    type AeadFn = fn(&dyn BlockCipher, &[u8], &[u8], &[u8]) -> Result<Vec<u8>>;

    #[test]
    fn tampering_fails_with_tag_error() {
        let cipher = aes(&[9; 32]);
        let nonce = [3u8; 12];
        let modes: [(AeadFn, AeadFn); 2] = [(gcm_encrypt, gcm_decrypt), (ccm_encrypt, ccm_decrypt)];
        for (encrypt, decrypt) in modes {
            let sealed = encrypt(cipher.as_ref(), &nonce, b"header", b"attack at dawn").unwrap();
            for i in [0, sealed.len() - 1] {
                let mut tampered = sealed.clone();
                tampered[i] ^= 0x01;
                assert_eq!(
                    decrypt(cipher.as_ref(), &nonce, b"header", &tampered),
                    Err(CipherKitError::AuthenticationTag)
                );
            }
            assert_eq!(
                decrypt(cipher.as_ref(), &nonce, b"other", &sealed),
                Err(CipherKitError::AuthenticationTag)
            );
        }
    }

    #[test]
    fn aead_rejects_64_bit_ciphers() {
        let des = new_builtin(CipherAlgorithm::Des, &[1; 8]).unwrap();
        assert!(matches!(
            gcm_encrypt(des.as_ref(), &[0; 12], b"", b"x"),
            Err(CipherKitError::Configuration(_))
        ));
    }
}
