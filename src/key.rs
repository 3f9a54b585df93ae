//! # Transferable keys
//!
//! [`PublicKey`] and [`PrivateKey`] bundle a primary key with its user ids and subkeys,
//! together with the self-signatures that bind them. Parsing checks every self-signature,
//! components without a valid one are dropped.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rand::{CryptoRng, Rng};

use crate::armor::{self, BlockType};
use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{ed25519, ed448, rsa, x25519, x448};
use crate::errors::{invalid_packet, Error, Result};
use crate::packet::{
    CompressionAlgorithm, KeyFlags, Packet, PacketParser, PacketTrait, PublicKeyPacket,
    PublicParams, SecretKeyPacket, SecretParams, Signature, SignatureConfig, SignatureType,
    Subpacket, SubpacketData, UserId,
};
use crate::profile::AlgorithmProfile;
use crate::types::{Fingerprint, KeyId, KeyVersion, Mpi, Tag};

/// Feature flags: SEIPD v1 and SEIPD v2.
const FEATURE_SEIPD_V1: u8 = 0x01;
const FEATURE_SEIPD_V2: u8 = 0x08;

/// Key types that can be generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Encryption & Signing with RSA and the given bitsize.
    Rsa(u32),
    /// Signing with Ed25519
    Ed25519,
    /// Signing with Ed448
    Ed448,
    /// Encrypting with X25519
    X25519,
    /// Encrypting with X448
    X448,
}

impl KeyType {
    pub fn to_alg(&self) -> PublicKeyAlgorithm {
        match self {
            KeyType::Rsa(_) => PublicKeyAlgorithm::RSA,
            KeyType::Ed25519 => PublicKeyAlgorithm::Ed25519,
            KeyType::Ed448 => PublicKeyAlgorithm::Ed448,
            KeyType::X25519 => PublicKeyAlgorithm::X25519,
            KeyType::X448 => PublicKeyAlgorithm::X448,
        }
    }

    pub fn generate<R: Rng + CryptoRng>(&self, rng: R) -> Result<(PublicParams, SecretParams)> {
        let params = match self {
            KeyType::Rsa(bits) => {
                let (public, secret) = rsa::generate_key(rng, *bits as usize)?;
                (
                    PublicParams::Rsa {
                        n: Mpi::from_slice(&public.n),
                        e: Mpi::from_slice(&public.e),
                    },
                    SecretParams::Rsa {
                        d: secret.d,
                        p: secret.p,
                        q: secret.q,
                        u: secret.u,
                    },
                )
            }
            KeyType::Ed25519 => {
                let (secret, public) = ed25519::generate_key(rng);
                (
                    PublicParams::Ed25519 { key: public },
                    SecretParams::Ed25519(secret),
                )
            }
            KeyType::X25519 => {
                let (secret, public) = x25519::generate_key(rng);
                (
                    PublicParams::X25519 { key: public },
                    SecretParams::X25519(secret),
                )
            }
            KeyType::Ed448 => {
                let (secret, public) = ed448::generate_key(rng);
                (PublicParams::Ed448 { key: public }, SecretParams::Ed448(secret))
            }
            KeyType::X448 => {
                let (secret, public) = x448::generate_key(rng);
                (PublicParams::X448 { key: public }, SecretParams::X448(secret))
            }
        };
        Ok(params)
    }

    /// Hash for self-signatures made by this key type. Ed448 needs at least 512 bits.
    pub fn certification_hash(&self, preferred: HashAlgorithm) -> HashAlgorithm {
        match self {
            KeyType::Ed448 if preferred.digest_size().map_or(true, |size| size < 64) => {
                HashAlgorithm::Sha512
            }
            _ => preferred,
        }
    }
}

/// A user id with its certifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUser {
    pub id: UserId,
    pub signatures: Vec<Signature>,
}

/// A subkey with its binding signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSubkey {
    pub key: PublicKeyPacket,
    pub signatures: Vec<Signature>,
}

impl SignedSubkey {
    fn binding(&self) -> Option<&Signature> {
        newest(&self.signatures)
    }

    pub fn flags(&self) -> KeyFlags {
        self.binding()
            .and_then(Signature::key_flags)
            .unwrap_or_default()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        expiration(&self.key, self.binding())
    }
}

/// A public key as found in a key ring: primary key, user ids and subkeys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    primary: PublicKeyPacket,
    direct_signatures: Vec<Signature>,
    users: Vec<SignedUser>,
    subkeys: Vec<SignedSubkey>,
}

/// A component key that may be used at some point in time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComponentKey<'a> {
    pub packet: &'a PublicKeyPacket,
    pub flags: KeyFlags,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ComponentKey<'_> {
    /// Created no later than `at` and not yet expired.
    pub fn is_valid_at(&self, at: &DateTime<Utc>) -> bool {
        self.packet.created_at() <= at && self.expires_at.map_or(true, |exp| *at < exp)
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (public, secrets) = parse_key(bytes)?;
        if secrets.is_some() {
            invalid_packet!("expected a public key, found a secret key");
        }
        Ok(public)
    }

    pub fn from_armor(input: &str) -> Result<Self> {
        let (typ, bytes) = armor::parse(input.as_bytes())?;
        if typ != BlockType::PublicKey {
            return Err(Error::InvalidArmor {
                message: format!("expected a public key block, found {}", typ),
            });
        }
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.primary.to_writer_with_header(&mut out)?;
        self.write_components(&mut out, |subkey, out| {
            subkey.to_writer_with_header(out)
        })?;
        Ok(out)
    }

    pub fn to_armored_string(&self) -> Result<String> {
        armored(&self.to_bytes()?, BlockType::PublicKey, self.version())
    }

    fn write_components<F>(&self, out: &mut Vec<u8>, mut write_subkey: F) -> Result<()>
    where
        F: FnMut(&PublicKeyPacket, &mut Vec<u8>) -> Result<()>,
    {
        for sig in &self.direct_signatures {
            sig.to_writer_with_header(out)?;
        }
        for user in &self.users {
            user.id.to_writer_with_header(out)?;
            for sig in &user.signatures {
                sig.to_writer_with_header(out)?;
            }
        }
        for subkey in &self.subkeys {
            write_subkey(&subkey.key, out)?;
            for sig in &subkey.signatures {
                sig.to_writer_with_header(out)?;
            }
        }
        Ok(())
    }

    pub fn version(&self) -> KeyVersion {
        self.primary.version()
    }

    pub fn primary_key(&self) -> &PublicKeyPacket {
        &self.primary
    }

    pub fn key_id(&self) -> KeyId {
        self.primary.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.primary.fingerprint()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.id.as_str_lossy()).collect()
    }

    pub fn subkeys(&self) -> &[SignedSubkey] {
        &self.subkeys
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        self.primary.created_at()
    }

    /// The self-signature describing the primary key.
    fn primary_signature(&self) -> Option<&Signature> {
        let primary_user = self.users.iter().find(|user| {
            newest(&user.signatures).is_some_and(|sig| {
                sig.config
                    .hashed_subpackets
                    .iter()
                    .any(|s| s.data == SubpacketData::IsPrimary(true))
            })
        });
        primary_user
            .or_else(|| self.users.first())
            .and_then(|user| newest(&user.signatures))
            .or_else(|| newest(&self.direct_signatures))
    }

    /// When the primary key expires, `None` if it never does.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        expiration(&self.primary, self.primary_signature())
    }

    pub(crate) fn primary_component(&self) -> ComponentKey<'_> {
        ComponentKey {
            packet: &self.primary,
            flags: self
                .primary_signature()
                .and_then(Signature::key_flags)
                .unwrap_or_default(),
            expires_at: self.expires_at(),
        }
    }

    /// Primary key first, then subkeys in key order.
    pub(crate) fn components(&self) -> impl Iterator<Item = ComponentKey<'_>> {
        let primary_expiration = self.expires_at();
        std::iter::once(self.primary_component()).chain(self.subkeys.iter().map(
            move |subkey| ComponentKey {
                packet: &subkey.key,
                flags: subkey.flags(),
                expires_at: match (subkey.expires_at(), primary_expiration) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                },
            },
        ))
    }

    /// The newest key usable for encryption at `at`, any time if `None`.
    pub(crate) fn encryption_key(&self, at: Option<&DateTime<Utc>>) -> Result<&PublicKeyPacket> {
        let usable = |c: &ComponentKey<'_>| {
            c.flags.can_encrypt()
                && c.packet.algorithm().can_encrypt()
                && at.map_or(true, |at| c.is_valid_at(at))
        };
        let key = self
            .components()
            .skip(1)
            .filter(usable)
            .max_by_key(|c| *c.packet.created_at())
            .or_else(|| Some(self.primary_component()).filter(usable))
            .map(|c| c.packet)
            .ok_or_else(|| Error::Configuration {
                message: format!("key {} has no valid encryption key", self.fingerprint()),
            })?;
        debug!("selected encryption key {}", key.fingerprint());
        Ok(key)
    }

    /// The key used to sign at `at`: the primary key if it may sign, else the newest signing subkey.
    pub(crate) fn signing_key(&self, at: Option<&DateTime<Utc>>) -> Result<&PublicKeyPacket> {
        let usable = |c: &ComponentKey<'_>| {
            c.flags.can_sign()
                && c.packet.algorithm().can_sign()
                && at.map_or(true, |at| c.is_valid_at(at))
        };
        Some(self.primary_component())
            .filter(usable)
            .or_else(|| {
                self.components()
                    .skip(1)
                    .filter(usable)
                    .max_by_key(|c| *c.packet.created_at())
            })
            .map(|c| c.packet)
            .ok_or_else(|| Error::Configuration {
                message: format!("key {} has no valid signing key", self.fingerprint()),
            })
    }
}

/// Secret material of a [`PrivateKey`], aligned with the public components.
#[derive(Debug)]
pub(crate) struct SecretMaterial {
    pub primary: SecretKeyPacket,
    pub subkeys: Vec<SecretKeyPacket>,
}

impl SecretMaterial {
    pub fn all(&self) -> impl Iterator<Item = &SecretKeyPacket> {
        std::iter::once(&self.primary).chain(self.subkeys.iter())
    }

    pub fn find(&self, fingerprint: &Fingerprint) -> Option<&SecretKeyPacket> {
        self.all()
            .find(|key| key.public_key().fingerprint() == *fingerprint)
    }
}

/// A private key. Clones share the secret material, so clearing one clears all of them.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    public: PublicKey,
    secret: Arc<RwLock<Option<SecretMaterial>>>,
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && Arc::ptr_eq(&self.secret, &other.secret)
    }
}

impl PrivateKey {
    fn new(public: PublicKey, secret: SecretMaterial) -> Self {
        PrivateKey {
            public,
            secret: Arc::new(RwLock::new(Some(secret))),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (public, secrets) = parse_key(bytes)?;
        let Some(secret) = secrets else {
            invalid_packet!("expected a secret key, found a public key");
        };
        Ok(Self::new(public, secret))
    }

    pub fn from_armor(input: &str) -> Result<Self> {
        let (typ, bytes) = armor::parse(input.as_bytes())?;
        if typ != BlockType::PrivateKey {
            return Err(Error::InvalidArmor {
                message: format!("expected a private key block, found {}", typ),
            });
        }
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.with_secret(|secret| {
            let mut out = Vec::new();
            secret.primary.to_writer_with_header(&mut out)?;
            self.public.write_components(&mut out, |subkey, out| {
                let secret = secret
                    .find(&subkey.fingerprint())
                    .ok_or_else(|| crate::errors::format_err!("missing secret subkey"))?;
                secret.to_writer_with_header(out)
            })?;
            Ok(out)
        })
    }

    pub fn to_armored_string(&self) -> Result<String> {
        armored(&self.to_bytes()?, BlockType::PrivateKey, self.public.version())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.public.user_ids()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.public.expires_at()
    }

    /// Zeroes the secret material of this key and of all its clones.
    ///
    /// Fails with [`Error::AlreadyCleared`] when called on a cleared key.
    pub fn clear_private_params(&self) -> Result<()> {
        let mut guard = self.secret.write().map_err(|_| poisoned())?;
        match guard.take() {
            Some(material) => {
                debug!("clearing secret material of {}", self.fingerprint());
                drop(material);
                Ok(())
            }
            None => Err(Error::AlreadyCleared),
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.secret.read().map_or(true, |guard| guard.is_none())
    }

    /// Runs `f` with the secret material, failing if it was cleared.
    pub(crate) fn with_secret<T>(&self, f: impl FnOnce(&SecretMaterial) -> Result<T>) -> Result<T> {
        let guard = self.secret.read().map_err(|_| poisoned())?;
        match guard.as_ref() {
            Some(material) => f(material),
            None => Err(Error::PrivateParamsCleared),
        }
    }
}

fn poisoned() -> Error {
    crate::errors::format_err!("secret key lock poisoned")
}

fn armored(bytes: &[u8], typ: BlockType, version: KeyVersion) -> Result<String> {
    let mut out = Vec::new();
    armor::write(bytes, typ, &mut out, version != KeyVersion::V6)?;
    String::from_utf8(out).map_err(|_| Error::InvalidUtf8)
}

fn newest(signatures: &[Signature]) -> Option<&Signature> {
    signatures.iter().max_by_key(|sig| sig.created().copied())
}

fn expiration(key: &PublicKeyPacket, sig: Option<&Signature>) -> Option<DateTime<Utc>> {
    sig.and_then(Signature::key_expiration_time)
        .map(|secs| *key.created_at() + Duration::seconds(i64::from(secs)))
}

/// Splits a transferable key into its parts, verifying all self-signatures.
fn parse_key(bytes: &[u8]) -> Result<(PublicKey, Option<SecretMaterial>)> {
    let mut packets = PacketParser::new(bytes)
        .filter(|p| !matches!(p, Ok(Packet::Ignored(_))))
        .peekable();

    let (primary, primary_secret) = match packets.next().transpose()? {
        Some(Packet::PublicKey(key)) => (key, None),
        Some(Packet::SecretKey(key)) => (key.public_key().clone(), Some(key)),
        Some(other) => invalid_packet!("key must start with a primary key, found {:?}", other),
        None => invalid_packet!("empty key"),
    };

    let mut signatures = Vec::new();
    while let Some(Ok(Packet::Signature(_))) = packets.peek() {
        if let Some(Ok(Packet::Signature(sig))) = packets.next() {
            signatures.push(sig);
        }
    }
    let direct_signatures = signatures
        .into_iter()
        .filter(|sig| sig.typ() == SignatureType::Key)
        .filter(|sig| match sig.verify_direct_key(&primary) {
            Ok(()) => true,
            Err(err) => {
                warn!("dropping invalid direct key signature: {}", err);
                false
            }
        })
        .collect::<Vec<_>>();

    let mut users = Vec::new();
    let mut subkeys = Vec::new();
    let mut secret_subkeys = Vec::new();

    while let Some(packet) = packets.next().transpose()? {
        let mut signatures = Vec::new();
        while let Some(Ok(Packet::Signature(_))) = packets.peek() {
            if let Some(Ok(Packet::Signature(sig))) = packets.next() {
                signatures.push(sig);
            }
        }

        match packet {
            Packet::UserId(id) => {
                let signatures: Vec<_> = signatures
                    .into_iter()
                    .filter(|sig| sig.typ().is_certification() && sig.is_issued_by(&primary))
                    .filter(|sig| match sig.verify_certification(&primary, &id) {
                        Ok(()) => true,
                        Err(err) => {
                            warn!("dropping invalid certification: {}", err);
                            false
                        }
                    })
                    .collect();
                if signatures.is_empty() {
                    warn!("dropping user id {} without self-signature", id.as_str_lossy());
                    continue;
                }
                users.push(SignedUser { id, signatures });
            }
            Packet::PublicSubkey(key) => {
                if primary_secret.is_some() {
                    invalid_packet!("public subkey in a secret key");
                }
                add_subkey(&mut subkeys, &primary, key, signatures);
            }
            Packet::SecretSubkey(secret) => {
                if primary_secret.is_none() {
                    invalid_packet!("secret subkey in a public key");
                }
                if add_subkey(&mut subkeys, &primary, secret.public_key().clone(), signatures) {
                    secret_subkeys.push(secret);
                }
            }
            other => {
                debug!("skipping {:?} in key", other);
            }
        }
    }

    if users.is_empty() && direct_signatures.is_empty() {
        invalid_packet!("key {} has no valid self-signature", primary.fingerprint());
    }

    let public = PublicKey {
        primary,
        direct_signatures,
        users,
        subkeys,
    };
    let secret = primary_secret.map(|primary| SecretMaterial {
        primary,
        subkeys: secret_subkeys,
    });
    Ok((public, secret))
}

/// Keeps `key` if one of `signatures` binds it to `primary`.
fn add_subkey(
    subkeys: &mut Vec<SignedSubkey>,
    primary: &PublicKeyPacket,
    key: PublicKeyPacket,
    signatures: Vec<Signature>,
) -> bool {
    let signatures: Vec<_> = signatures
        .into_iter()
        .filter(|sig| sig.typ() == SignatureType::SubkeyBinding)
        .filter(|sig| match sig.verify_key_binding(primary, &key) {
            Ok(()) => true,
            Err(err) => {
                warn!("dropping invalid subkey binding: {}", err);
                false
            }
        })
        .collect();
    if signatures.is_empty() {
        warn!("dropping subkey {} without binding signature", key.fingerprint());
        return false;
    }
    subkeys.push(SignedSubkey { key, signatures });
    true
}

/// Generates a key with a signing primary key and one encryption subkey.
pub(crate) fn generate<R: Rng + CryptoRng>(
    mut rng: R,
    profile: &AlgorithmProfile,
    user_ids: &[String],
    created: DateTime<Utc>,
    lifetime: Option<u32>,
) -> Result<PrivateKey> {
    let version = profile.key_version;
    let alg = profile.key_algorithm;
    if user_ids.is_empty() && version != KeyVersion::V6 {
        return Err(Error::Configuration {
            message: "v4 keys need at least one user id".to_string(),
        });
    }
    debug!(
        "generating {:?} key: {:?} / {:?}",
        version, alg.primary, alg.subkey
    );

    let (public_params, secret_params) = alg.primary.generate(&mut rng)?;
    let primary = SecretKeyPacket::new(
        PublicKeyPacket::new(
            Tag::PublicKey,
            version,
            created,
            alg.primary.to_alg(),
            public_params,
        )?,
        secret_params,
    );
    let (public_params, secret_params) = alg.subkey.generate(&mut rng)?;
    let subkey = SecretKeyPacket::new(
        PublicKeyPacket::new(
            Tag::PublicSubkey,
            version,
            created,
            alg.subkey.to_alg(),
            public_params,
        )?,
        secret_params,
    );

    let cert_hash = alg.primary.certification_hash(profile.hash);
    let preferences = preference_subpackets(profile, lifetime);
    let primary_flags = KeyFlags::CERTIFY | KeyFlags::SIGN;

    let mut direct_signatures = Vec::new();
    if version == KeyVersion::V6 {
        let mut config = SignatureConfig::from_key(
            &mut rng,
            primary.public_key(),
            SignatureType::Key,
            cert_hash,
            created,
        )?;
        config
            .hashed_subpackets
            .push(Subpacket::regular(SubpacketData::KeyFlags(primary_flags)));
        config.hashed_subpackets.extend(preferences.iter().cloned());
        direct_signatures.push(config.sign_direct_key(&primary)?);
    }

    let mut users = Vec::new();
    for (i, id) in user_ids.iter().enumerate() {
        let id = UserId::new(id);
        let mut config = SignatureConfig::from_key(
            &mut rng,
            primary.public_key(),
            SignatureType::CertPositive,
            cert_hash,
            created,
        )?;
        config
            .hashed_subpackets
            .push(Subpacket::regular(SubpacketData::KeyFlags(primary_flags)));
        config.hashed_subpackets.extend(preferences.iter().cloned());
        if i == 0 {
            config
                .hashed_subpackets
                .push(Subpacket::regular(SubpacketData::IsPrimary(true)));
        }
        let sig = config.sign_certification(&primary, primary.public_key(), &id)?;
        users.push(SignedUser {
            id,
            signatures: vec![sig],
        });
    }

    let mut config = SignatureConfig::from_key(
        &mut rng,
        primary.public_key(),
        SignatureType::SubkeyBinding,
        cert_hash,
        created,
    )?;
    config
        .hashed_subpackets
        .push(Subpacket::regular(SubpacketData::KeyFlags(
            KeyFlags::ENCRYPT_COMMS | KeyFlags::ENCRYPT_STORAGE,
        )));
    if let Some(secs) = lifetime {
        config
            .hashed_subpackets
            .push(Subpacket::regular(SubpacketData::KeyExpirationTime(secs)));
    }
    let binding = config.sign_key_binding(&primary, subkey.public_key())?;

    let public = PublicKey {
        primary: primary.public_key().clone(),
        direct_signatures,
        users,
        subkeys: vec![SignedSubkey {
            key: subkey.public_key().clone(),
            signatures: vec![binding],
        }],
    };
    Ok(PrivateKey::new(
        public,
        SecretMaterial {
            primary,
            subkeys: vec![subkey],
        },
    ))
}

fn preference_subpackets(profile: &AlgorithmProfile, lifetime: Option<u32>) -> Vec<Subpacket> {
    let mut hashes = vec![profile.signing_hash, profile.hash];
    hashes.dedup();
    hashes.push(HashAlgorithm::Sha384);
    let mut compression = vec![profile.compression];
    for alg in [CompressionAlgorithm::ZLIB, CompressionAlgorithm::ZIP] {
        if !compression.contains(&alg) {
            compression.push(alg);
        }
    }

    let mut features = FEATURE_SEIPD_V1;
    let mut subpackets = vec![
        Subpacket::regular(SubpacketData::PreferredSymmetricAlgorithms(vec![
            profile.cipher,
            SymmetricKeyAlgorithm::AES128,
        ])),
        Subpacket::regular(SubpacketData::PreferredHashAlgorithms(hashes)),
        Subpacket::regular(SubpacketData::PreferredCompressionAlgorithms(compression)),
    ];
    if profile.data_aead.is_some() {
        features |= FEATURE_SEIPD_V2;
        subpackets.push(Subpacket::regular(
            SubpacketData::PreferredAeadCiphersuites(vec![
                (profile.cipher, AeadAlgorithm::Gcm),
                (SymmetricKeyAlgorithm::AES128, AeadAlgorithm::Gcm),
            ]),
        ));
    }
    subpackets.push(Subpacket::regular(SubpacketData::Features(features)));
    if let Some(secs) = lifetime {
        subpackets.push(Subpacket::regular(SubpacketData::KeyExpirationTime(secs)));
    }
    subpackets
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::profile::{self, SecurityLevel};
    use crate::types::timestamp;

    fn gen(profile_name: &str, lifetime: Option<u32>) -> PrivateKey {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let profile = profile::resolve(profile_name, SecurityLevel::Standard).unwrap();
        generate(
            &mut rng,
            &profile,
            &["Alice <alice@example.org>".to_string()],
            timestamp::from_wire(1_700_000_000),
            lifetime,
        )
        .unwrap()
    }

    #[test]
    fn generate_v4_roundtrip() {
        let key = gen(profile::DEFAULT, Some(3600));
        assert_eq!(key.public_key().version(), KeyVersion::V4);
        assert_eq!(key.user_ids(), vec!["Alice <alice@example.org>".to_string()]);
        assert_eq!(
            key.expires_at(),
            Some(timestamp::from_wire(1_700_003_600))
        );

        let parsed = PrivateKey::from_bytes(&key.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.public_key(), key.public_key());

        let armored = key.public_key().to_armored_string().unwrap();
        assert!(armored.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
        let public = PublicKey::from_armor(&armored).unwrap();
        assert_eq!(public.fingerprint(), key.fingerprint());
        assert!(PrivateKey::from_armor(&armored).is_err());
    }

    #[test]
    fn generate_v6() {
        let key = gen(profile::CRYPTO_REFRESH, None);
        assert_eq!(key.public_key().version(), KeyVersion::V6);
        assert!(matches!(key.fingerprint(), Fingerprint::V6(_)));
        assert_eq!(key.expires_at(), None);

        let parsed = PublicKey::from_bytes(&key.public_key().to_bytes().unwrap()).unwrap();
        assert_eq!(&parsed, key.public_key());
        assert_eq!(
            parsed.encryption_key(None).unwrap().algorithm(),
            PublicKeyAlgorithm::X25519
        );
        assert_eq!(
            parsed.signing_key(None).unwrap().fingerprint(),
            parsed.fingerprint()
        );
    }

    #[test]
    fn expired_encryption_key() {
        let key = gen(profile::DEFAULT, Some(10));
        let public = key.public_key();
        assert!(public
            .encryption_key(Some(&timestamp::from_wire(1_700_000_005)))
            .is_ok());
        assert!(public
            .encryption_key(Some(&timestamp::from_wire(1_700_000_011)))
            .is_err());
    }

    #[test]
    fn clear_is_shared_and_final() {
        let key = gen(profile::DEFAULT, None);
        let clone = key.clone();
        key.clear_private_params().unwrap();
        assert!(clone.is_cleared());
        assert!(matches!(
            clone.clear_private_params(),
            Err(Error::AlreadyCleared)
        ));
        assert!(matches!(key.to_bytes(), Err(Error::PrivateParamsCleared)));
        // the public part stays usable
        assert!(key.public_key().to_bytes().is_ok());
    }

    #[test]
    fn tampered_binding_drops_subkey() {
        let key = gen(profile::DEFAULT, None);
        let mut public = key.public_key().clone();
        let other = gen(profile::CRYPTO_REFRESH, None);
        public.subkeys[0].signatures = other.public_key().subkeys[0].signatures.clone();
        let parsed = PublicKey::from_bytes(&public.to_bytes().unwrap()).unwrap();
        assert!(parsed.subkeys().is_empty());
    }

    #[test]
    fn generate_curve448() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for name in [profile::GNUPG, profile::CRYPTO_REFRESH] {
            let profile = profile::resolve(name, SecurityLevel::High).unwrap();
            assert_eq!(profile.key_algorithm.primary, KeyType::Ed448);
            let key = generate(
                &mut rng,
                &profile,
                &["Carol <carol@example.org>".to_string()],
                timestamp::from_wire(1_700_000_000),
                None,
            )
            .unwrap();

            let parsed = PrivateKey::from_bytes(&key.to_bytes().unwrap()).unwrap();
            assert_eq!(parsed.public_key(), key.public_key());
            let public = parsed.public_key();
            assert_eq!(public.primary_key().algorithm(), PublicKeyAlgorithm::Ed448);
            assert_eq!(public.user_ids(), vec!["Carol <carol@example.org>".to_string()]);
            assert_eq!(
                public.encryption_key(None).unwrap().algorithm(),
                PublicKeyAlgorithm::X448
            );
            let binding = &public.subkeys()[0].signatures[0];
            assert_eq!(binding.hash_alg(), HashAlgorithm::Sha512);
        }
    }

    #[test]
    fn ed448_certification_hash() {
        assert_eq!(
            KeyType::Ed448.certification_hash(HashAlgorithm::Sha256),
            HashAlgorithm::Sha512
        );
        assert_eq!(
            KeyType::Ed25519.certification_hash(HashAlgorithm::Sha256),
            HashAlgorithm::Sha256
        );
    }
}
