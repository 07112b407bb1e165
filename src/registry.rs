//! Algorithm registry.
//!
//! The builtin ciphers, block modes and padding schemes are closed enums. Anything
//! else is registered at runtime in an append-only [`Registry`] that stores a name
//! together with the behavior the cipher pipeline executes for it.
//!
//! Name resolution always follows the same order: builtin table, then the
//! registry, then a diagnostic string such as `"unknown mode value 42"`.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::cipher::block::CipherFactory;
use crate::cipher::mode::ModeTransform;
use crate::padding::Padding;

/// Numeric handle of a cipher, mode or padding scheme.
pub type AlgorithmId = u32;

/// Shared shape of the three open enumerations.
pub trait AlgorithmKind: Copy + Eq + Sized + 'static {
    /// Word used in diagnostics, e.g. `"cipher"`.
    const KIND: &'static str;

    /// Builtin variants in id order; the id of entry `i` is `i + 1`.
    const BUILTIN: &'static [(Self, &'static str)];

    /// Wraps a registered id.
    fn custom(id: AlgorithmId) -> Self;

    /// The registered id, for custom variants.
    fn custom_id(self) -> Option<AlgorithmId>;

    /// Largest builtin id. Custom ids are allocated above it.
    fn builtin_max() -> AlgorithmId {
        Self::BUILTIN.len() as AlgorithmId
    }

    fn id(self) -> AlgorithmId {
        match self.custom_id() {
            Some(id) => id,
            None => Self::BUILTIN
                .iter()
                .position(|(v, _)| *v == self)
                .map(|i| i as AlgorithmId + 1)
                .unwrap_or(0),
        }
    }

    fn from_id(id: AlgorithmId) -> Self {
        match (id as usize).checked_sub(1).and_then(|i| Self::BUILTIN.get(i)) {
            Some((v, _)) => *v,
            None => Self::custom(id),
        }
    }

    fn builtin_name(self) -> Option<&'static str> {
        Self::BUILTIN
            .iter()
            .find(|(v, _)| *v == self)
            .map(|(_, name)| *name)
    }

    /// Case-sensitive lookup of a builtin name.
    fn from_builtin_name(name: &str) -> Option<Self> {
        Self::BUILTIN
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(v, _)| *v)
    }
}

/// Symmetric algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    Aes,
    Des,
    TwoDes,
    TripleDes,
    Twofish,
    Blowfish,
    Cast5,
    Rc2,
    Rc4,
    Idea,
    Sm4,
    Camellia,
    ChaCha20,
    ChaCha20Poly1305,
    Salsa20,
    Custom(AlgorithmId),
}

impl AlgorithmKind for CipherAlgorithm {
    const KIND: &'static str = "cipher";
    const BUILTIN: &'static [(Self, &'static str)] = &[
        (Self::Aes, "Aes"),
        (Self::Des, "Des"),
        (Self::TwoDes, "TwoDes"),
        (Self::TripleDes, "TripleDes"),
        (Self::Twofish, "Twofish"),
        (Self::Blowfish, "Blowfish"),
        (Self::Cast5, "Cast5"),
        (Self::Rc2, "RC2"),
        (Self::Rc4, "RC4"),
        (Self::Idea, "Idea"),
        (Self::Sm4, "SM4"),
        (Self::Camellia, "Camellia"),
        (Self::ChaCha20, "Chacha20"),
        (Self::ChaCha20Poly1305, "Chacha20poly1305"),
        (Self::Salsa20, "Salsa20"),
    ];

    fn custom(id: AlgorithmId) -> Self {
        Self::Custom(id)
    }

    fn custom_id(self) -> Option<AlgorithmId> {
        match self {
            Self::Custom(id) => Some(id),
            _ => None,
        }
    }
}

/// Block modes of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMode {
    Ecb,
    Cbc,
    Pcbc,
    /// Full-block cipher feedback.
    Cfb,
    Cfb1,
    Cfb8,
    Cfb16,
    Cfb32,
    Cfb64,
    Cfb128,
    Ofb,
    Ofb8,
    Ctr,
    Gcm,
    Ccm,
    Custom(AlgorithmId),
}

impl AlgorithmKind for BlockMode {
    const KIND: &'static str = "mode";
    const BUILTIN: &'static [(Self, &'static str)] = &[
        (Self::Ecb, "ECB"),
        (Self::Cbc, "CBC"),
        (Self::Pcbc, "PCBC"),
        (Self::Cfb, "CFB"),
        (Self::Cfb1, "CFB1"),
        (Self::Cfb8, "CFB8"),
        (Self::Cfb16, "CFB16"),
        (Self::Cfb32, "CFB32"),
        (Self::Cfb64, "CFB64"),
        (Self::Cfb128, "CFB128"),
        (Self::Ofb, "OFB"),
        (Self::Ofb8, "OFB8"),
        (Self::Ctr, "CTR"),
        (Self::Gcm, "GCM"),
        (Self::Ccm, "CCM"),
    ];

    fn custom(id: AlgorithmId) -> Self {
        Self::Custom(id)
    }

    fn custom_id(self) -> Option<AlgorithmId> {
        match self {
            Self::Custom(id) => Some(id),
            _ => None,
        }
    }
}

/// Padding schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaddingScheme {
    NoPadding,
    Zero,
    Pkcs5,
    Pkcs7,
    X923,
    Iso10126,
    Iso7816_4,
    Iso97971,
    Tbc,
    Pkcs1,
    Custom(AlgorithmId),
}

impl AlgorithmKind for PaddingScheme {
    const KIND: &'static str = "padding";
    const BUILTIN: &'static [(Self, &'static str)] = &[
        (Self::NoPadding, "NoPadding"),
        (Self::Zero, "ZeroPadding"),
        (Self::Pkcs5, "PKCS5Padding"),
        (Self::Pkcs7, "PKCS7Padding"),
        (Self::X923, "X923Padding"),
        (Self::Iso10126, "ISO10126Padding"),
        (Self::Iso7816_4, "ISO7816_4Padding"),
        (Self::Iso97971, "ISO97971Padding"),
        (Self::Tbc, "TBCPadding"),
        (Self::Pkcs1, "PKCS1Padding"),
    ];

    fn custom(id: AlgorithmId) -> Self {
        Self::Custom(id)
    }

    fn custom_id(self) -> Option<AlgorithmId> {
        match self {
            Self::Custom(id) => Some(id),
            _ => None,
        }
    }
}

struct Entry<B: ?Sized> {
    name: String,
    behavior: Arc<B>,
}

struct Table<B: ?Sized> {
    next: AlgorithmId,
    entries: BTreeMap<AlgorithmId, Entry<B>>,
}

/// Append-only map from allocated id to (name, behavior).
///
/// Ids are handed out from a counter that starts right above the builtin
/// maximum of `K` and never goes back, so an id is never reused.
pub struct Registry<K: AlgorithmKind, B: ?Sized> {
    table: RwLock<Table<B>>,
    _kind: std::marker::PhantomData<K>,
}

impl<K: AlgorithmKind, B: ?Sized> Default for Registry<K, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: AlgorithmKind, B: ?Sized> Registry<K, B> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table {
                next: K::builtin_max() + 1,
                entries: BTreeMap::new(),
            }),
            _kind: std::marker::PhantomData,
        }
    }

    /// Allocates a fresh id for `name` and stores its behavior.
    pub fn register(&self, name: impl Into<String>, behavior: Arc<B>) -> K {
        let name = name.into();
        let mut table = self.table.write();
        let id = table.next;
        table.next += 1;
        debug!(kind = K::KIND, id, name = %name, "registered custom algorithm");
        table.entries.insert(id, Entry { name, behavior });
        K::custom(id)
    }

    /// Registered name of `id`, without the builtin table.
    pub fn registered_name(&self, id: AlgorithmId) -> Option<String> {
        self.table.read().entries.get(&id).map(|e| e.name.clone())
    }

    pub fn behavior(&self, value: K) -> Option<Arc<B>> {
        let id = value.custom_id()?;
        self.table.read().entries.get(&id).map(|e| e.behavior.clone())
    }

    /// Looks a registered entry up by name.
    pub fn find(&self, name: &str) -> Option<K> {
        self.table
            .read()
            .entries
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, _)| K::custom(*id))
    }

    /// Builtin name, then registered name, then `"unknown <kind> value <id>"`.
    pub fn name(&self, value: K) -> String {
        if let Some(name) = value.builtin_name() {
            return name.to_string();
        }
        let id = value.id();
        self.registered_name(id)
            .unwrap_or_else(|| format!("unknown {} value {}", K::KIND, id))
    }

    /// Parses a builtin or registered name.
    pub fn parse(&self, name: &str) -> Option<K> {
        K::from_builtin_name(name).or_else(|| self.find(name))
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type CipherRegistry = Registry<CipherAlgorithm, dyn CipherFactory>;
pub type ModeRegistry = Registry<BlockMode, dyn ModeTransform>;
pub type PaddingRegistry = Registry<PaddingScheme, dyn Padding>;

/// The three extension registries, passed to the cipher pipeline.
///
/// Tests build isolated instances with [`Registries::new`]; applications that
/// want one shared table use [`Registries::global`].
#[derive(Default)]
pub struct Registries {
    pub ciphers: CipherRegistry,
    pub modes: ModeRegistry,
    pub paddings: PaddingRegistry,
}

static GLOBAL: Lazy<Arc<Registries>> = Lazy::new(|| Arc::new(Registries::new()));

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registries.
    pub fn global() -> Arc<Registries> {
        GLOBAL.clone()
    }

    pub fn register_cipher(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn CipherFactory>,
    ) -> CipherAlgorithm {
        self.ciphers.register(name, factory)
    }

    pub fn register_mode(
        &self,
        name: impl Into<String>,
        transform: Arc<dyn ModeTransform>,
    ) -> BlockMode {
        self.modes.register(name, transform)
    }

    pub fn register_padding(
        &self,
        name: impl Into<String>,
        padding: Arc<dyn Padding>,
    ) -> PaddingScheme {
        self.paddings.register(name, padding)
    }

    pub fn cipher_name(&self, value: CipherAlgorithm) -> String {
        self.ciphers.name(value)
    }

    pub fn mode_name(&self, value: BlockMode) -> String {
        self.modes.name(value)
    }

    pub fn padding_name(&self, value: PaddingScheme) -> String {
        self.paddings.name(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::padding::Pkcs7;

    #[test]
    fn builtin_ids_round_trip() {
        for (value, name) in BlockMode::BUILTIN {
            assert_eq!(BlockMode::from_id(value.id()), *value);
            assert_eq!(value.builtin_name(), Some(*name));
        }
        assert_eq!(CipherAlgorithm::Aes.id(), 1);
        assert_eq!(PaddingScheme::Pkcs1.id(), PaddingScheme::builtin_max());
    }

    #[test]
    fn register_allocates_increasing_ids() {
        let registry = PaddingRegistry::new();
        let ids: Vec<AlgorithmId> = (0..5)
            .map(|i| registry.register(format!("Custom{i}"), Arc::new(Pkcs7)).id())
            .collect();

        assert!(ids[0] > PaddingScheme::builtin_max());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(
                registry.name(PaddingScheme::from_id(*id)),
                format!("Custom{i}")
            );
        }
    }

    #[test]
    fn unknown_id_gets_diagnostic_name() {
        let registries = Registries::new();
        assert_eq!(
            registries.mode_name(BlockMode::Custom(999)),
            "unknown mode value 999"
        );
        assert_eq!(registries.cipher_name(CipherAlgorithm::Sm4), "SM4");
    }

    #[test]
    fn isolated_registries_do_not_share_entries() {
        let a = Registries::new();
        let b = Registries::new();
        let id = a.register_padding("Mine", Arc::new(Pkcs7));
        assert_eq!(a.padding_name(id), "Mine");
        assert!(b.paddings.behavior(id).is_none());
        assert_eq!(b.paddings.parse("Mine"), None);
        assert_eq!(a.paddings.parse("Mine"), Some(id));
    }

    #[test]
    fn concurrent_registration_yields_distinct_ids() {
        let registry = Arc::new(PaddingRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(format!("P{i}"), Arc::new(Pkcs7)).id())
            })
            .collect();
        let mut ids: Vec<AlgorithmId> = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(registry.len(), 8);
    }
}
