//! # Profiles
//!
//! A profile bundles the algorithms used for key generation, encryption and signing.
//! Four profiles are built in, more can be registered on a [`ProfileRegistry`].

use log::debug;

use crate::crypto::aead::AeadConfig;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::s2k::S2kConfig;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::key::KeyType;
use crate::packet::CompressionAlgorithm;
use crate::types::KeyVersion;

/// Name of the default profile.
pub const DEFAULT: &str = "default";
/// Name of the RFC 4880 profile.
pub const RFC4880: &str = "rfc4880";
/// Name of the GnuPG compatible profile.
pub const GNUPG: &str = "draft-koch-eddsa-for-openpgp-00";
/// Name of the crypto refresh profile.
pub const CRYPTO_REFRESH: &str = "draft-ietf-openpgp-crypto-refresh-10";

/// Requested strength of generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityLevel {
    #[default]
    Standard,
    High,
}

/// Primary and encryption subkey types of a generated key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyAlgorithm {
    pub primary: KeyType,
    pub subkey: KeyType,
}

impl KeyAlgorithm {
    pub const fn rsa(bits: u32) -> Self {
        KeyAlgorithm {
            primary: KeyType::Rsa(bits),
            subkey: KeyType::Rsa(bits),
        }
    }

    pub const fn curve25519() -> Self {
        KeyAlgorithm {
            primary: KeyType::Ed25519,
            subkey: KeyType::X25519,
        }
    }

    pub const fn curve448() -> Self {
        KeyAlgorithm {
            primary: KeyType::Ed448,
            subkey: KeyType::X448,
        }
    }
}

/// Chooses the key algorithm from the security level, and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyAlgorithmSelector {
    Fixed(KeyAlgorithm),
    ByLevel {
        standard: KeyAlgorithm,
        high: KeyAlgorithm,
    },
}

impl KeyAlgorithmSelector {
    pub fn select(&self, level: SecurityLevel) -> KeyAlgorithm {
        match (self, level) {
            (KeyAlgorithmSelector::Fixed(alg), _) => *alg,
            (KeyAlgorithmSelector::ByLevel { standard, .. }, SecurityLevel::Standard) => *standard,
            (KeyAlgorithmSelector::ByLevel { high, .. }, SecurityLevel::High) => *high,
        }
    }
}

/// A named, immutable set of algorithm choices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub key_algorithm: KeyAlgorithmSelector,
    /// Hash used for key certifications.
    pub hash: HashAlgorithm,
    /// Hash used for message signatures.
    pub signing_hash: HashAlgorithm,
    pub cipher: SymmetricKeyAlgorithm,
    pub compression: CompressionAlgorithm,
    pub compression_level: Option<u32>,
    /// AEAD used to wrap session keys for passwords.
    pub key_encryption_aead: Option<AeadConfig>,
    /// AEAD used for the encrypted data packet.
    pub data_aead: Option<AeadConfig>,
    pub s2k: S2kConfig,
    /// Generate version 6 keys.
    pub v6: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self::default_profile()
    }
}

impl Profile {
    /// Widely implemented algorithms, Curve25519 keys.
    pub fn default_profile() -> Self {
        Profile {
            name: DEFAULT.to_string(),
            key_algorithm: KeyAlgorithmSelector::Fixed(KeyAlgorithm::curve25519()),
            hash: HashAlgorithm::Sha256,
            signing_hash: HashAlgorithm::Sha512,
            cipher: SymmetricKeyAlgorithm::AES256,
            compression: CompressionAlgorithm::ZLIB,
            compression_level: Some(6),
            key_encryption_aead: None,
            data_aead: None,
            s2k: S2kConfig::default(),
            v6: false,
        }
    }

    /// Algorithms from RFC 4880 only, RSA keys.
    pub fn rfc4880() -> Self {
        Profile {
            name: RFC4880.to_string(),
            key_algorithm: KeyAlgorithmSelector::ByLevel {
                standard: KeyAlgorithm::rsa(3072),
                high: KeyAlgorithm::rsa(4096),
            },
            compression_level: None,
            ..Self::default_profile()
        }
    }

    /// GnuPG interoperable: EdDSA keys and AEAD encryption.
    pub fn gnupg() -> Self {
        Profile {
            name: GNUPG.to_string(),
            key_algorithm: KeyAlgorithmSelector::ByLevel {
                standard: KeyAlgorithm::curve25519(),
                high: KeyAlgorithm::curve448(),
            },
            compression_level: None,
            key_encryption_aead: Some(AeadConfig::default()),
            data_aead: Some(AeadConfig::default()),
            ..Self::default_profile()
        }
    }

    /// RFC 9580: v6 keys, AEAD everywhere and Argon2 password hashing.
    pub fn crypto_refresh() -> Self {
        Profile {
            name: CRYPTO_REFRESH.to_string(),
            key_algorithm: KeyAlgorithmSelector::ByLevel {
                standard: KeyAlgorithm::curve25519(),
                high: KeyAlgorithm::curve448(),
            },
            compression_level: None,
            key_encryption_aead: Some(AeadConfig::default()),
            data_aead: Some(AeadConfig::default()),
            s2k: S2kConfig::argon2(),
            v6: true,
            ..Self::default_profile()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixes the security level.
    pub fn resolve(&self, level: SecurityLevel) -> AlgorithmProfile {
        AlgorithmProfile {
            name: self.name.clone(),
            security_level: level,
            key_algorithm: self.key_algorithm.select(level),
            key_version: if self.v6 { KeyVersion::V6 } else { KeyVersion::V4 },
            hash: self.hash,
            signing_hash: self.signing_hash,
            cipher: self.cipher,
            compression: self.compression,
            compression_level: self.compression_level,
            key_encryption_aead: self.key_encryption_aead,
            data_aead: self.data_aead,
            s2k: self.s2k,
        }
    }
}

/// A profile with the security level applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlgorithmProfile {
    pub name: String,
    pub security_level: SecurityLevel,
    pub key_algorithm: KeyAlgorithm,
    pub key_version: KeyVersion,
    pub hash: HashAlgorithm,
    pub signing_hash: HashAlgorithm,
    pub cipher: SymmetricKeyAlgorithm,
    pub compression: CompressionAlgorithm,
    pub compression_level: Option<u32>,
    pub key_encryption_aead: Option<AeadConfig>,
    pub data_aead: Option<AeadConfig>,
    pub s2k: S2kConfig,
}

impl AlgorithmProfile {
    pub fn is_v6(&self) -> bool {
        self.key_version == KeyVersion::V6
    }

    /// Whether armored output carries a CRC24 checksum line.
    pub fn armor_checksum(&self) -> bool {
        !self.is_v6()
    }
}

/// Profiles addressable by name.
#[derive(Clone, Debug)]
pub struct ProfileRegistry {
    profiles: Vec<Profile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        ProfileRegistry {
            profiles: vec![
                Profile::default_profile(),
                Profile::rfc4880(),
                Profile::gnupg(),
                Profile::crypto_refresh(),
            ],
        }
    }
}

impl ProfileRegistry {
    /// Adds a profile, names must be unique.
    pub fn register(&mut self, profile: Profile) -> Result<()> {
        if self.get(&profile.name).is_some() {
            return Err(Error::Configuration {
                message: format!("profile {} already registered", profile.name),
            });
        }
        debug!("registering profile {}", profile.name);
        self.profiles.push(profile);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn resolve(&self, name: &str, level: SecurityLevel) -> Result<AlgorithmProfile> {
        self.get(name)
            .map(|profile| profile.resolve(level))
            .ok_or_else(|| Error::UnknownProfile {
                name: name.to_string(),
            })
    }
}

/// Resolves one of the built-in profiles.
pub fn resolve(name: &str, level: SecurityLevel) -> Result<AlgorithmProfile> {
    ProfileRegistry::default().resolve(name, level)
}
