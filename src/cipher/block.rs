//! Block cipher primitives behind an object safe trait.

use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::{CipherKitError, Result};
use crate::registry::{CipherAlgorithm, CipherRegistry};

/// A keyed block cipher. `block` is always exactly [`BlockCipher::block_size`]
/// bytes long.
pub trait BlockCipher: Send + Sync {
    fn block_size(&self) -> usize;

    fn encrypt_block(&self, block: &mut [u8]);

    fn decrypt_block(&self, block: &mut [u8]);
}

/// Constructs block ciphers for a custom registered algorithm.
pub trait CipherFactory: Send + Sync {
    fn block_size(&self) -> usize;

    fn key_size_valid(&self, len: usize) -> bool;

    fn new_cipher(&self, key: &[u8]) -> Result<Box<dyn BlockCipher>>;
}

struct Keyed<C>(C);

impl<C> BlockCipher for Keyed<C>
where
    C: BlockEncrypt + BlockDecrypt + Send + Sync,
{
    fn block_size(&self) -> usize {
        C::block_size()
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        self.0.encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        self.0.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

fn keyed<C>(algorithm: CipherAlgorithm, key: &[u8]) -> Result<Box<dyn BlockCipher>>
where
    C: KeyInit + BlockEncrypt + BlockDecrypt + Send + Sync + 'static,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key(algorithm, key.len()))?;
    Ok(Box::new(Keyed(cipher)))
}

fn invalid_key(algorithm: CipherAlgorithm, len: usize) -> CipherKitError {
    CipherKitError::Configuration(format!("invalid key size {len} for {algorithm:?}"))
}

/// Block size of a builtin block algorithm. `None` for stream algorithms and
/// custom entries.
pub fn builtin_block_size(algorithm: CipherAlgorithm) -> Option<usize> {
    match algorithm {
        CipherAlgorithm::Aes | CipherAlgorithm::Sm4 | CipherAlgorithm::Camellia => Some(16),
        CipherAlgorithm::Twofish => Some(16),
        CipherAlgorithm::Des
        | CipherAlgorithm::TwoDes
        | CipherAlgorithm::TripleDes
        | CipherAlgorithm::Blowfish
        | CipherAlgorithm::Cast5
        | CipherAlgorithm::Rc2
        | CipherAlgorithm::Idea => Some(8),
        _ => None,
    }
}

/// Whether `len` is an acceptable key length for a builtin algorithm.
pub fn builtin_key_size_valid(algorithm: CipherAlgorithm, len: usize) -> bool {
    match algorithm {
        CipherAlgorithm::Aes | CipherAlgorithm::Twofish | CipherAlgorithm::Camellia => {
            matches!(len, 16 | 24 | 32)
        }
        CipherAlgorithm::Des => len == 8,
        CipherAlgorithm::TwoDes => len == 16,
        CipherAlgorithm::TripleDes => len == 24,
        CipherAlgorithm::Blowfish => (4..=56).contains(&len),
        CipherAlgorithm::Cast5 => (5..=16).contains(&len),
        CipherAlgorithm::Rc2 => (1..=128).contains(&len),
        CipherAlgorithm::Idea | CipherAlgorithm::Sm4 => len == 16,
        CipherAlgorithm::Rc4 => (5..=32).contains(&len),
        CipherAlgorithm::ChaCha20
        | CipherAlgorithm::ChaCha20Poly1305
        | CipherAlgorithm::Salsa20 => len == 32,
        CipherAlgorithm::Custom(_) => false,
    }
}

/// Keys a builtin block algorithm.
pub fn new_builtin(algorithm: CipherAlgorithm, key: &[u8]) -> Result<Box<dyn BlockCipher>> {
    match algorithm {
        CipherAlgorithm::Aes => match key.len() {
            16 => keyed::<aes::Aes128>(algorithm, key),
            24 => keyed::<aes::Aes192>(algorithm, key),
            32 => keyed::<aes::Aes256>(algorithm, key),
            n => Err(invalid_key(algorithm, n)),
        },
        CipherAlgorithm::Camellia => match key.len() {
            16 => keyed::<camellia::Camellia128>(algorithm, key),
            24 => keyed::<camellia::Camellia192>(algorithm, key),
            32 => keyed::<camellia::Camellia256>(algorithm, key),
            n => Err(invalid_key(algorithm, n)),
        },
        CipherAlgorithm::Des => keyed::<des::Des>(algorithm, key),
        CipherAlgorithm::TwoDes => keyed::<des::TdesEde2>(algorithm, key),
        CipherAlgorithm::TripleDes => keyed::<des::TdesEde3>(algorithm, key),
        CipherAlgorithm::Twofish => keyed::<twofish::Twofish>(algorithm, key),
        CipherAlgorithm::Blowfish => keyed::<blowfish::Blowfish>(algorithm, key),
        CipherAlgorithm::Cast5 => keyed::<cast5::Cast5>(algorithm, key),
        // effective key bits follow the key length
        CipherAlgorithm::Rc2 => keyed::<rc2::Rc2>(algorithm, key),
        CipherAlgorithm::Idea => keyed::<idea::Idea>(algorithm, key),
        CipherAlgorithm::Sm4 => keyed::<sm4::Sm4>(algorithm, key),
        other => Err(CipherKitError::UnsupportedAlgorithm(format!(
            "{other:?} is not a block cipher"
        ))),
    }
}

/// Keys a builtin or registered block algorithm.
pub fn new_block_cipher(
    registry: &CipherRegistry,
    algorithm: CipherAlgorithm,
    key: &[u8],
) -> Result<Box<dyn BlockCipher>> {
    if let CipherAlgorithm::Custom(_) = algorithm {
        let factory = registry
            .behavior(algorithm)
            .ok_or_else(|| CipherKitError::UnsupportedAlgorithm(registry.name(algorithm)))?;
        if !factory.key_size_valid(key.len()) {
            return Err(CipherKitError::Configuration(format!(
                "invalid key size {} for {}",
                key.len(),
                registry.name(algorithm)
            )));
        }
        return factory.new_cipher(key);
    }
    new_builtin(algorithm, key)
}

/// Block size of a builtin or registered block algorithm.
pub fn block_size(registry: &CipherRegistry, algorithm: CipherAlgorithm) -> Option<usize> {
    match algorithm {
        CipherAlgorithm::Custom(_) => registry.behavior(algorithm).map(|f| f.block_size()),
        builtin => builtin_block_size(builtin),
    }
}

/// Key length check for a builtin or registered algorithm.
pub fn key_size_valid(registry: &CipherRegistry, algorithm: CipherAlgorithm, len: usize) -> bool {
    match algorithm {
        CipherAlgorithm::Custom(_) => registry
            .behavior(algorithm)
            .is_some_and(|f| f.key_size_valid(len)),
        builtin => builtin_key_size_valid(builtin, len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes128_fips197_vector() {
        let key = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let cipher = new_builtin(CipherAlgorithm::Aes, &key).unwrap();
        cipher.encrypt_block(&mut block);
        assert_eq!(hex::encode(&block), "69c4e0d86a7b0430d8cdb78070b4c55a");
        cipher.decrypt_block(&mut block);
        assert_eq!(hex::encode(&block), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn every_block_algorithm_keys_and_inverts() {
        let algorithms = [
            (CipherAlgorithm::Aes, 32),
            (CipherAlgorithm::Des, 8),
            (CipherAlgorithm::TwoDes, 16),
            (CipherAlgorithm::TripleDes, 24),
            (CipherAlgorithm::Twofish, 16),
            (CipherAlgorithm::Blowfish, 16),
            (CipherAlgorithm::Cast5, 16),
            (CipherAlgorithm::Rc2, 5),
            (CipherAlgorithm::Idea, 16),
            (CipherAlgorithm::Sm4, 16),
            (CipherAlgorithm::Camellia, 24),
        ];
        for (algorithm, key_len) in algorithms {
            assert!(builtin_key_size_valid(algorithm, key_len));
            let cipher = new_builtin(algorithm, &vec![0x42; key_len]).unwrap();
            let bs = builtin_block_size(algorithm).unwrap();
            assert_eq!(cipher.block_size(), bs);
            let original: Vec<u8> = (0..bs as u8).collect();
            let mut block = original.clone();
            cipher.encrypt_block(&mut block);
            assert_ne!(block, original, "{algorithm:?}");
            cipher.decrypt_block(&mut block);
            assert_eq!(block, original, "{algorithm:?}");
        }
    }

    #[test]
    fn wrong_key_size_is_a_configuration_error() {
        assert!(matches!(
            new_builtin(CipherAlgorithm::Aes, &[0; 15]),
            Err(CipherKitError::Configuration(_))
        ));
        assert!(matches!(
            new_builtin(CipherAlgorithm::Des, &[0; 7]),
            Err(CipherKitError::Configuration(_))
        ));
    }

    #[test]
    fn stream_algorithms_are_not_block_ciphers() {
        assert!(builtin_block_size(CipherAlgorithm::Rc4).is_none());
        assert!(matches!(
            new_builtin(CipherAlgorithm::ChaCha20, &[0; 32]),
            Err(CipherKitError::UnsupportedAlgorithm(_))
        ));
    }
}
