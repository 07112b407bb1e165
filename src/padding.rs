//! Block padding schemes.

use block_padding::{AnsiX923, Iso7816, PadType, RawPadding};
use rand::RngCore;

use crate::error::{CipherKitError, Result};
use crate::registry::{PaddingRegistry, PaddingScheme};

/// Extends data to a multiple of the block size and removes that extension
/// again. Custom paddings registered with a [`PaddingRegistry`] implement this.
pub trait Padding: Send + Sync {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>>;

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>>;
}

fn check_block_size(block_size: usize) -> Result<()> {
    if (1..=255).contains(&block_size) {
        Ok(())
    } else {
        Err(CipherKitError::Configuration(format!(
            "invalid block size {block_size}"
        )))
    }
}

fn check_padded_len(data: &[u8], block_size: usize) -> Result<()> {
    check_block_size(block_size)?;
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(CipherKitError::Padding(format!(
            "padded length {} is not a positive multiple of {block_size}",
            data.len()
        )));
    }
    Ok(())
}

/// Number of bytes needed to reach the next boundary, always `1..=block_size`.
fn fill_len(len: usize, block_size: usize) -> usize {
    block_size - len % block_size
}

/// Pads the final partial (or empty) block with a `block-padding` scheme.
fn raw_pad<P: RawPadding>(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    check_block_size(block_size)?;
    let tail = data.len() % block_size;
    let mut out = data.to_vec();
    if tail == 0 && P::TYPE == PadType::Ambiguous {
        return Ok(out);
    }
    let start = data.len() - tail;
    out.resize(start + block_size, 0);
    P::raw_pad(&mut out[start..], tail);
    Ok(out)
}

/// Strips a `block-padding` scheme from the final block.
fn raw_unpad<P: RawPadding>(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    check_padded_len(data, block_size)?;
    let (body, last) = data.split_at(data.len() - block_size);
    let kept = P::raw_unpad(last)
        .map_err(|_| CipherKitError::Padding(format!("malformed padding in the final {block_size} byte block")))?;
    let mut out = body.to_vec();
    out.extend_from_slice(kept);
    Ok(out)
}

/// Leaves the data untouched; the data must already be block aligned.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPadding;

impl Padding for NoPadding {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        check_block_size(block_size)?;
        if data.len() % block_size != 0 {
            return Err(CipherKitError::InvalidInput(format!(
                "data length {} is not a multiple of block size {block_size}",
                data.len()
            )));
        }
        Ok(data.to_vec())
    }

    fn unpad(&self, data: &[u8], _block_size: usize) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Zero bytes up to the next boundary, nothing when already aligned.
///
/// Trailing zero bytes of the plaintext are indistinguishable from the fill and
/// are stripped on unpad.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroPadding;

impl Padding for ZeroPadding {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_pad::<block_padding::ZeroPadding>(data, block_size)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        raw_unpad::<block_padding::ZeroPadding>(data, block_size)
    }
}

/// PKCS#7: `n` bytes of value `n`. PKCS#5 is the same rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkcs7;

impl Padding for Pkcs7 {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_pad::<block_padding::Pkcs7>(data, block_size)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_unpad::<block_padding::Pkcs7>(data, block_size)
    }
}

/// ANSI X9.23: zeros followed by the fill length.
#[derive(Debug, Clone, Copy, Default)]
pub struct X923;

impl Padding for X923 {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_pad::<AnsiX923>(data, block_size)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_unpad::<AnsiX923>(data, block_size)
    }
}

/// ISO 10126: random bytes followed by the fill length.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso10126;

impl Padding for Iso10126 {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        check_block_size(block_size)?;
        let n = fill_len(data.len(), block_size);
        let mut filler = vec![0u8; n - 1];
        rand::rng().fill_bytes(&mut filler);
        let mut out = data.to_vec();
        out.extend_from_slice(&filler);
        out.push(n as u8);
        Ok(out)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_unpad::<block_padding::Iso10126>(data, block_size)
    }
}

/// ISO/IEC 7816-4 (also ISO/IEC 9797-1 method 2): `0x80` then zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso7816_4;

impl Padding for Iso7816_4 {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_pad::<Iso7816>(data, block_size)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        raw_unpad::<Iso7816>(data, block_size)
    }
}

/// Trailing bit complement: the fill repeats the inverse of the last data bit
/// (`0x00` after a set bit, `0xFF` otherwise).
#[derive(Debug, Clone, Copy, Default)]
pub struct Tbc;

impl Padding for Tbc {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        check_block_size(block_size)?;
        let n = fill_len(data.len(), block_size);
        let fill = match data.last() {
            Some(b) if b & 1 == 1 => 0x00,
            _ => 0xFF,
        };
        let mut out = data.to_vec();
        out.resize(data.len() + n, fill);
        Ok(out)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        check_padded_len(data, block_size)?;
        let fill = data[data.len() - 1];
        if fill != 0x00 && fill != 0xFF {
            return Err(CipherKitError::Padding("bad trailing bit fill".to_string()));
        }
        let end = data.iter().rposition(|b| *b != fill).map_or(0, |i| i + 1);
        Ok(data[..end].to_vec())
    }
}

/// PKCS#1 type 1 block: `00 01 FF.. 00 || data`, sized to a block boundary.
///
/// At least eight `FF` bytes are always present.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkcs1;

impl Padding for Pkcs1 {
    fn pad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        check_block_size(block_size)?;
        let min = data.len() + 11;
        let total = min.div_ceil(block_size) * block_size;
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&[0x00, 0x01]);
        out.resize(total - data.len() - 1, 0xFF);
        out.push(0x00);
        out.extend_from_slice(data);
        Ok(out)
    }

    fn unpad(&self, data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        check_padded_len(data, block_size)?;
        if data.len() < 11 || data[0] != 0x00 || data[1] != 0x01 {
            return Err(CipherKitError::Padding("bad PKCS#1 header".to_string()));
        }
        let sep = data[2..]
            .iter()
            .position(|b| *b != 0xFF)
            .map(|i| i + 2)
            .ok_or_else(|| CipherKitError::Padding("missing separator".to_string()))?;
        if data[sep] != 0x00 || sep < 10 {
            return Err(CipherKitError::Padding("bad PKCS#1 separator".to_string()));
        }
        Ok(data[sep + 1..].to_vec())
    }
}

static NO_PADDING: NoPadding = NoPadding;
static ZERO: ZeroPadding = ZeroPadding;
static PKCS7: Pkcs7 = Pkcs7;
static X923_PAD: X923 = X923;
static ISO10126: Iso10126 = Iso10126;
static ISO7816_4: Iso7816_4 = Iso7816_4;
static TBC: Tbc = Tbc;
static PKCS1: Pkcs1 = Pkcs1;

/// The implementation behind a builtin padding scheme.
pub fn builtin(scheme: PaddingScheme) -> Option<&'static dyn Padding> {
    let padding: &'static dyn Padding = match scheme {
        PaddingScheme::NoPadding => &NO_PADDING,
        PaddingScheme::Zero => &ZERO,
        PaddingScheme::Pkcs5 | PaddingScheme::Pkcs7 => &PKCS7,
        PaddingScheme::X923 => &X923_PAD,
        PaddingScheme::Iso10126 => &ISO10126,
        PaddingScheme::Iso7816_4 | PaddingScheme::Iso97971 => &ISO7816_4,
        PaddingScheme::Tbc => &TBC,
        PaddingScheme::Pkcs1 => &PKCS1,
        PaddingScheme::Custom(_) => return None,
    };
    Some(padding)
}

/// Pads with a builtin or registered scheme.
pub fn pad_with(
    registry: &PaddingRegistry,
    scheme: PaddingScheme,
    data: &[u8],
    block_size: usize,
) -> Result<Vec<u8>> {
    match builtin(scheme) {
        Some(p) => p.pad(data, block_size),
        None => resolve(registry, scheme)?.pad(data, block_size),
    }
}

/// Unpads with a builtin or registered scheme.
pub fn unpad_with(
    registry: &PaddingRegistry,
    scheme: PaddingScheme,
    data: &[u8],
    block_size: usize,
) -> Result<Vec<u8>> {
    match builtin(scheme) {
        Some(p) => p.unpad(data, block_size),
        None => resolve(registry, scheme)?.unpad(data, block_size),
    }
}

fn resolve(
    registry: &PaddingRegistry,
    scheme: PaddingScheme,
) -> Result<std::sync::Arc<dyn Padding>> {
    registry
        .behavior(scheme)
        .ok_or_else(|| CipherKitError::UnsupportedAlgorithm(registry.name(scheme)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_REVERSIBLE: [PaddingScheme; 8] = [
        PaddingScheme::Pkcs5,
        PaddingScheme::Pkcs7,
        PaddingScheme::X923,
        PaddingScheme::Iso10126,
        PaddingScheme::Iso7816_4,
        PaddingScheme::Iso97971,
        PaddingScheme::Tbc,
        PaddingScheme::Pkcs1,
    ];

    #[test]
    fn padded_length_is_block_aligned_and_reversible() {
        for scheme in ALL_REVERSIBLE {
            let p = builtin(scheme).unwrap();
            for len in [0usize, 1, 7, 8, 9, 43] {
                let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37) | 1).collect();
                let padded = p.pad(&data, 8).unwrap();
                assert_eq!(padded.len() % 8, 0, "{scheme:?} len {len}");
                assert!(padded.len() > data.len(), "{scheme:?} len {len}");
                assert_eq!(p.unpad(&padded, 8).unwrap(), data, "{scheme:?} len {len}");
            }
        }
    }

    #[test]
    fn pkcs7_known_bytes() {
        assert_eq!(Pkcs7.pad(b"abcde", 8).unwrap(), b"abcde\x03\x03\x03");
        assert_eq!(Pkcs7.pad(b"", 4).unwrap(), vec![4, 4, 4, 4]);
    }

    #[test]
    fn pkcs7_rejects_inconsistent_fill() {
        assert!(matches!(
            Pkcs7.unpad(b"abcde\x01\x03\x03", 8),
            Err(CipherKitError::Padding(_))
        ));
        assert!(matches!(
            Pkcs7.unpad(b"abcdefg\x09", 8),
            Err(CipherKitError::Padding(_))
        ));
        assert!(matches!(
            Pkcs7.unpad(b"abcdefg\x00", 8),
            Err(CipherKitError::Padding(_))
        ));
    }

    #[test]
    fn x923_and_iso7816_layout() {
        assert_eq!(X923.pad(b"ab", 4).unwrap(), vec![b'a', b'b', 0, 2]);
        assert_eq!(Iso7816_4.pad(b"ab", 4).unwrap(), vec![b'a', b'b', 0x80, 0]);
        assert!(Iso7816_4.unpad(&[1, 2, 0, 0], 4).is_err());
    }

    #[test]
    fn tbc_fill_depends_on_last_bit() {
        assert_eq!(Tbc.pad(&[0x01], 4).unwrap(), vec![0x01, 0, 0, 0]);
        assert_eq!(Tbc.pad(&[0x02], 4).unwrap(), vec![0x02, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Tbc.pad(&[], 2).unwrap(), vec![0xFF, 0xFF]);
    }

    #[test]
    fn pkcs1_has_minimum_fill() {
        let padded = Pkcs1.pad(b"key", 16).unwrap();
        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[..2], &[0x00, 0x01]);
        assert_eq!(&padded[2..12], &[0xFF; 10]);
        assert_eq!(padded[12], 0x00);
        assert_eq!(Pkcs1.unpad(&padded, 16).unwrap(), b"key");
    }

    #[test]
    fn zero_padding_only_fills_partial_blocks() {
        assert_eq!(ZeroPadding.pad(b"abcd", 4).unwrap(), b"abcd");
        assert_eq!(ZeroPadding.pad(b"abc", 4).unwrap(), b"abc\0");
        assert_eq!(ZeroPadding.unpad(b"abc\0", 4).unwrap(), b"abc");
    }

    #[test]
    fn no_padding_requires_alignment() {
        assert!(matches!(
            NoPadding.pad(b"abc", 8),
            Err(CipherKitError::InvalidInput(_))
        ));
        assert_eq!(NoPadding.pad(b"abcdefgh", 8).unwrap(), b"abcdefgh");
    }

    #[test]
    fn unregistered_custom_padding_is_unsupported() {
        let registry = PaddingRegistry::new();
        let err = pad_with(&registry, PaddingScheme::Custom(77), b"x", 8).unwrap_err();
        assert_eq!(
            err,
            CipherKitError::UnsupportedAlgorithm("unknown padding value 77".to_string())
        );
    }
}
