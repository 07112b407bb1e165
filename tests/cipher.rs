mod util;

use cipherkit::cipher::Cipher;
use cipherkit::error::CipherKitError;
use cipherkit::registry::{BlockMode, CipherAlgorithm, PaddingScheme};

use util::PLAINTEXT;

fn seq(start: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| start.wrapping_add(i as u8)).collect()
}

fn pipeline(algorithm: CipherAlgorithm, mode: BlockMode, padding: PaddingScheme, key: &[u8], iv: &[u8]) -> Cipher {
    Cipher::new()
        .with_algorithm(algorithm)
        .with_mode(mode)
        .with_padding(padding)
        .with_key(key)
        .with_iv(iv)
}

fn seal(algorithm: CipherAlgorithm, mode: BlockMode, padding: PaddingScheme, key: &[u8], iv: &[u8]) -> String {
    pipeline(algorithm, mode, padding, key, iv)
        .from_bytes(PLAINTEXT)
        .encrypt()
        .to_hex_string()
        .unwrap()
}

fn open(
    algorithm: CipherAlgorithm,
    mode: BlockMode,
    padding: PaddingScheme,
    key: &[u8],
    iv: &[u8],
    hex: &str,
) -> Vec<u8> {
    pipeline(algorithm, mode, padding, key, iv)
        .from_hex_string(hex)
        .decrypt()
        .to_bytes()
        .unwrap()
}

#[test]
fn aes_modes_match_reference_ciphertexts() {
    let key = seq(0, 16);
    let iv = seq(16, 16);
    let cases = [
        (
            BlockMode::Cbc,
            PaddingScheme::Pkcs7,
            "3f619c6faefed52c801aa3d5ffd7997860d9b12a37c6847cd0c17b79579ad0b22f09b772b4c6573c46d349c9d82d30b6",
        ),
        (
            BlockMode::Ctr,
            PaddingScheme::NoPadding,
            "53968a5490a06a0dfb2e8c63e1e3fcb3f4adbd24b279ef7235591214ee8bfe7ca244180b549f818b01f9ed",
        ),
        (
            BlockMode::Cfb,
            PaddingScheme::NoPadding,
            "53968a5490a06a0dfb2e8c63e1e3fcb351bdce482f8b6c202e21ea30213ce06c67a31d1a15e67c2319ee07",
        ),
        (
            BlockMode::Cfb8,
            PaddingScheme::NoPadding,
            "53fd47a8903d40f8126a3bfa61ed26b32651cc727abb8253f498cf8732e20e5c2566dced85b1e0569c2d8d",
        ),
        (
            BlockMode::Ofb,
            PaddingScheme::NoPadding,
            "53968a5490a06a0dfb2e8c63e1e3fcb3efa0fc284f7e95b4dfba2bf0361698438765972a48bb2afb6ddf41",
        ),
    ];
    for (mode, padding, expected) in cases {
        assert_eq!(seal(CipherAlgorithm::Aes, mode, padding, &key, &iv), expected, "{mode:?}");
        assert_eq!(open(CipherAlgorithm::Aes, mode, padding, &key, &iv, expected), PLAINTEXT);
    }
}

#[test]
fn other_block_ciphers_match_reference_cbc() {
    let cases = [
        (
            CipherAlgorithm::Camellia,
            seq(0, 16),
            seq(16, 16),
            "a5ad9bc5cc3aa66839e2341cb56328f059cba0a1439df9541e3ad12a7c445496ce3e5f511cab51ac2e6656c114274550",
        ),
        (
            CipherAlgorithm::Sm4,
            seq(0, 16),
            seq(16, 16),
            "0db2c4e7edb73d002b880984d5ec10361ab195e4809aace4ea0507e81fd259393a24c7d91f930c133890120e1985f692",
        ),
        (
            CipherAlgorithm::TripleDes,
            seq(0, 24),
            seq(24, 8),
            "9dd195872b3786b744862a333ec17d18058d74ed1ee428ee8e9e3d74e5cad55bc3dd4734d4e3d30955be36e4f44c340b",
        ),
        (
            CipherAlgorithm::Blowfish,
            seq(0, 16),
            seq(24, 8),
            "13191c56413499623d9b706ab475e2d851710ccb04b553f02b77a0f939800e876faf87ac8590e3488db8386a915f6bdd",
        ),
        (
            CipherAlgorithm::Cast5,
            seq(0, 16),
            seq(24, 8),
            "5cc3c57c1d7bafafe31823ee3e070be7206ae25acba696dfb750f97ba84de3a8d09d158c41c3f7bd2c5fae331d754cf3",
        ),
    ];
    for (algorithm, key, iv, expected) in cases {
        assert_eq!(
            seal(algorithm, BlockMode::Cbc, PaddingScheme::Pkcs7, &key, &iv),
            expected,
            "{algorithm:?}"
        );
    }
}

#[test]
fn aead_outputs_carry_a_trailing_tag() {
    let key = seq(0, 32);
    let nonce = seq(100, 12);

    let gcm = pipeline(CipherAlgorithm::Aes, BlockMode::Gcm, PaddingScheme::NoPadding, &key, &nonce)
        .with_aad(b"header")
        .from_bytes(PLAINTEXT)
        .encrypt()
        .to_hex_string()
        .unwrap();
    assert_eq!(
        gcm,
        "1c73bb46089c3ffd55423d9ab51204dd24ad7e2ae1199e02d4f1c33e9ed1853cfc8c60ac2d68e224999c1f68ed6b6c9e967cc9aad5ee0f75575a7c"
    );

    let ccm = pipeline(CipherAlgorithm::Aes, BlockMode::Ccm, PaddingScheme::NoPadding, &seq(0, 16), &seq(0, 13))
        .with_aad(b"header")
        .from_bytes(PLAINTEXT)
        .encrypt()
        .to_hex_string()
        .unwrap();
    assert_eq!(
        ccm,
        "425cd1a8227c93e131b751d5f24370f8856f7c021c581c965fdf912ce920eb6fbd306f24b4d6de581de2c219bb5c2e650328ff972261ef646a0c20"
    );

    let sealed = Cipher::new()
        .with_algorithm(CipherAlgorithm::ChaCha20Poly1305)
        .with_key(&key)
        .with_iv(&nonce)
        .with_aad(b"header")
        .from_bytes(PLAINTEXT)
        .encrypt()
        .to_hex_string()
        .unwrap();
    assert_eq!(
        sealed,
        "6079deeae9d01f3190fe770d9dfeb6b316a9ea14f52586ddb51f99c49f40ec87a2dc928cce403353fb80ad832c7868bebcd866c18c3411df5172a7"
    );
}

#[test]
fn chacha20_keystream_starts_at_counter_zero() {
    let sealed = Cipher::new()
        .with_algorithm(CipherAlgorithm::ChaCha20)
        .with_key(&seq(0, 32))
        .with_iv(&seq(100, 12))
        .from_bytes(PLAINTEXT)
        .encrypt()
        .to_hex_string()
        .unwrap();
    assert_eq!(
        sealed,
        "bbb25602fcb57e05d08bcae008f8a7e49a301db5aa6f1b7a6f517679761423ab12ebd3ac8378ff845d566d"
    );
}

#[test]
fn tampered_aead_ciphertext_is_rejected() {
    let key = seq(0, 32);
    let nonce = seq(100, 12);
    for algorithm in [CipherAlgorithm::Aes, CipherAlgorithm::ChaCha20Poly1305] {
        let mut sealed = pipeline(algorithm, BlockMode::Gcm, PaddingScheme::NoPadding, &key, &nonce)
            .with_aad(b"header")
            .from_bytes(PLAINTEXT)
            .encrypt()
            .to_bytes()
            .unwrap();
        sealed[3] ^= 0x01;

        let errors = pipeline(algorithm, BlockMode::Gcm, PaddingScheme::NoPadding, &key, &nonce)
            .with_aad(b"header")
            .from_bytes(&sealed)
            .decrypt()
            .to_bytes()
            .unwrap_err();
        assert_eq!(errors.first(), Some(&CipherKitError::AuthenticationTag), "{algorithm:?}");

        // right ciphertext, wrong associated data
        sealed[3] ^= 0x01;
        let errors = pipeline(algorithm, BlockMode::Gcm, PaddingScheme::NoPadding, &key, &nonce)
            .with_aad(b"footer")
            .from_bytes(&sealed)
            .decrypt()
            .to_bytes()
            .unwrap_err();
        assert_eq!(errors.first(), Some(&CipherKitError::AuthenticationTag));
    }
}

#[test]
fn padding_handles_block_boundaries() {
    let key = seq(0, 16);
    let iv = seq(16, 16);
    let paddings = [
        PaddingScheme::Pkcs7,
        PaddingScheme::Pkcs5,
        PaddingScheme::X923,
        PaddingScheme::Iso10126,
        PaddingScheme::Iso7816_4,
        PaddingScheme::Tbc,
    ];
    for padding in paddings {
        for len in [0usize, 1, 15, 16, 83] {
            let data = seq(1, len);
            let sealed = pipeline(CipherAlgorithm::Aes, BlockMode::Cbc, padding, &key, &iv)
                .from_bytes(&data)
                .encrypt()
                .to_bytes()
                .unwrap();
            assert_eq!(sealed.len() % 16, 0);
            assert!(sealed.len() > len, "{padding:?} must always add padding");
            let opened = pipeline(CipherAlgorithm::Aes, BlockMode::Cbc, padding, &key, &iv)
                .from_bytes(&sealed)
                .decrypt()
                .to_bytes()
                .unwrap();
            assert_eq!(opened, data, "{padding:?} with {len} bytes");
        }
    }
}

#[test]
fn stream_modes_preserve_length_on_64_bit_blocks() {
    let key = seq(0, 16);
    let iv = seq(24, 8);
    for mode in [BlockMode::Cfb, BlockMode::Cfb8, BlockMode::Cfb1, BlockMode::Ofb, BlockMode::Ctr] {
        for len in [0usize, 1, 7, 8, 43] {
            let data = seq(9, len);
            let sealed = pipeline(CipherAlgorithm::Idea, mode, PaddingScheme::NoPadding, &key, &iv)
                .from_bytes(&data)
                .encrypt()
                .to_bytes()
                .unwrap();
            assert_eq!(sealed.len(), len, "{mode:?}");
            let opened = pipeline(CipherAlgorithm::Idea, mode, PaddingScheme::NoPadding, &key, &iv)
                .from_bytes(&sealed)
                .decrypt()
                .to_bytes()
                .unwrap();
            assert_eq!(opened, data);
        }
    }
}

#[test]
fn wrong_key_surfaces_as_padding_error() {
    let iv = seq(16, 16);
    let sealed = seal(CipherAlgorithm::Aes, BlockMode::Cbc, PaddingScheme::Pkcs7, &seq(0, 16), &iv);
    let errors = pipeline(CipherAlgorithm::Aes, BlockMode::Cbc, PaddingScheme::Pkcs7, &[0xee; 16], &iv)
        .from_hex_string(&sealed)
        .decrypt()
        .to_bytes();
    // a wrong key can still unpad by chance, but never to the plaintext
    match errors {
        Err(list) => assert!(matches!(list.first(), Some(CipherKitError::Padding(_)))),
        Ok(bytes) => assert_ne!(bytes, PLAINTEXT),
    }
}

#[test]
fn pipelines_are_independent_values() {
    let base = Cipher::new()
        .with_algorithm(CipherAlgorithm::Aes)
        .with_mode(BlockMode::Cbc)
        .with_padding(PaddingScheme::Pkcs7)
        .with_key(&seq(0, 16))
        .with_iv(&seq(16, 16));

    let broken = base.clone().with_key(b"bad");
    assert_eq!(broken.errors().len(), 1);
    assert!(base.errors().is_empty());

    let sealed = base.from_bytes(PLAINTEXT).encrypt().to_hex_string().unwrap();
    assert_eq!(
        sealed,
        "3f619c6faefed52c801aa3d5ffd7997860d9b12a37c6847cd0c17b79579ad0b22f09b772b4c6573c46d349c9d82d30b6"
    );
}
