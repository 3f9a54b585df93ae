use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{bail, ensure, format_err, invalid_packet, unsupported_err, Result};
use crate::normalize_lines::CrlfState;
use crate::packet::{KeyFlags, PacketTrait, PublicKeyPacket, SecretKeyPacket, Serialize, UserId};
use crate::types::{Fingerprint, KeyId, KeyVersion, Mpi, Tag};

pub mod subpacket;

use self::subpacket::{read_area, write_area, Notation, Subpacket, SubpacketData};

/// Available signature packet versions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureVersion {
    V4 = 4,
    V6 = 6,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for SignatureVersion {
    fn default() -> Self {
        Self::V4
    }
}

impl From<KeyVersion> for SignatureVersion {
    fn from(version: KeyVersion) -> Self {
        match version {
            KeyVersion::V6 => SignatureVersion::V6,
            _ => SignatureVersion::V4,
        }
    }
}

/// Signature types.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-signature-types>
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, line endings converted to `<CR><LF>`.
    Text = 0x01,
    Standalone = 0x02,
    CertGeneric = 0x10,
    CertPersona = 0x11,
    CertCasual = 0x12,
    CertPositive = 0x13,
    SubkeyBinding = 0x18,
    KeyBinding = 0x19,
    Key = 0x1F,
    KeyRevocation = 0x20,
    SubkeyRevocation = 0x28,
    CertRevocation = 0x30,
    Timestamp = 0x40,
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    Other(u8),
}

impl SignatureType {
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            SignatureType::CertGeneric
                | SignatureType::CertPersona
                | SignatureType::CertCasual
                | SignatureType::CertPositive
        )
    }
}

/// Algorithm specific signature values.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum SignatureBytes {
    Mpis(Vec<Mpi>),
    Native(#[debug("{}", hex::encode(_0))] Vec<u8>),
}

impl SignatureBytes {
    fn from_reader(alg: PublicKeyAlgorithm, input: &mut &[u8]) -> Result<Self> {
        let sig = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSASign => {
                SignatureBytes::Mpis(vec![Mpi::from_reader(input)?])
            }
            PublicKeyAlgorithm::Ed25519 => {
                let mut raw = vec![0u8; 64];
                input.read_exact(&mut raw)?;
                SignatureBytes::Native(raw)
            }
            PublicKeyAlgorithm::Ed448 => {
                let mut raw = vec![0u8; 114];
                input.read_exact(&mut raw)?;
                SignatureBytes::Native(raw)
            }
            _ => {
                let mut raw = Vec::new();
                input.read_to_end(&mut raw)?;
                SignatureBytes::Native(raw)
            }
        };
        Ok(sig)
    }

    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SignatureBytes::Mpis(mpis) => {
                for mpi in mpis {
                    mpi.to_writer(writer)?;
                }
            }
            SignatureBytes::Native(raw) => writer.write_all(raw)?,
        }
        Ok(())
    }
}

/// Incrementally hashes signed data.
///
/// For [`SignatureType::Text`] line endings are canonicalized to `<CR><LF>` before hashing,
/// the data itself is never modified.
pub struct SignatureHasher {
    hasher: Box<dyn DynDigest + Send>,
    text: Option<CrlfState>,
}

impl SignatureHasher {
    pub fn new(hash_alg: HashAlgorithm, typ: SignatureType, salt: Option<&[u8]>) -> Result<Self> {
        let mut hasher = hash_alg.new_hasher()?;
        if let Some(salt) = salt {
            hasher.update(salt);
        }
        Ok(SignatureHasher {
            hasher,
            text: (typ == SignatureType::Text).then(CrlfState::default),
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        let hasher = &mut self.hasher;
        match self.text.as_mut() {
            Some(state) => state.feed(data, |segment| hasher.update(segment)),
            None => hasher.update(data),
        }
    }

    fn into_inner(self) -> Box<dyn DynDigest + Send> {
        self.hasher
    }
}

impl io::Write for SignatureHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Everything about a signature except the cryptographic values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfig {
    pub version: SignatureVersion,
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    pub hash_alg: HashAlgorithm,
    pub hashed_subpackets: Vec<Subpacket>,
    pub unhashed_subpackets: Vec<Subpacket>,
    /// Only present on v6 signatures.
    pub salt: Option<Vec<u8>>,
}

impl SignatureConfig {
    /// Constructs a v4 signature config without any subpackets.
    pub fn v4(typ: SignatureType, pub_alg: PublicKeyAlgorithm, hash_alg: HashAlgorithm) -> Self {
        SignatureConfig {
            version: SignatureVersion::V4,
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
            salt: None,
        }
    }

    /// Constructs a v6 signature config with a fresh random salt.
    pub fn v6<R: Rng + CryptoRng>(
        mut rng: R,
        typ: SignatureType,
        pub_alg: PublicKeyAlgorithm,
        hash_alg: HashAlgorithm,
    ) -> Result<Self> {
        let Some(salt_len) = hash_alg.salt_len() else {
            unsupported_err!("v6 signatures with {}", hash_alg);
        };
        let mut salt = vec![0u8; salt_len];
        rng.fill_bytes(&mut salt);
        Ok(SignatureConfig {
            version: SignatureVersion::V6,
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
            salt: Some(salt),
        })
    }

    /// A config matching the version of `key`, carrying creation time and issuer subpackets.
    pub fn from_key<R: Rng + CryptoRng>(
        rng: R,
        key: &PublicKeyPacket,
        typ: SignatureType,
        hash_alg: HashAlgorithm,
        created: DateTime<Utc>,
    ) -> Result<Self> {
        let mut config = match key.version() {
            KeyVersion::V6 => Self::v6(rng, typ, key.algorithm(), hash_alg)?,
            _ => Self::v4(typ, key.algorithm(), hash_alg),
        };
        config.hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(created)),
            Subpacket::regular(SubpacketData::IssuerFingerprint(key.fingerprint())),
        ];
        if config.version == SignatureVersion::V4 {
            config.unhashed_subpackets =
                vec![Subpacket::regular(SubpacketData::Issuer(key.key_id()))];
        }
        Ok(config)
    }

    /// Creates a hasher for the signed data.
    pub fn data_hasher(&self) -> Result<SignatureHasher> {
        SignatureHasher::new(self.hash_alg, self.typ, self.salt.as_deref())
    }

    /// Hashes the signature fields and hashed subpacket area, returns the number of bytes hashed.
    fn hash_signature_data(&self, hasher: &mut dyn DynDigest) -> Result<usize> {
        let area = write_area(&self.hashed_subpackets)?;
        let mut prefix = vec![
            self.version.into(),
            self.typ.into(),
            self.pub_alg.into(),
            self.hash_alg.into(),
        ];
        match self.version {
            SignatureVersion::V6 => prefix.write_u32::<BigEndian>(u32::try_from(area.len())?)?,
            _ => prefix.write_u16::<BigEndian>(u16::try_from(area.len())?)?,
        }
        hasher.update(&prefix);
        hasher.update(&area);
        Ok(prefix.len() + area.len())
    }

    fn hash_trailer(&self, hasher: &mut dyn DynDigest, len: usize) -> Result<()> {
        let mut trailer = vec![self.version.into(), 0xFF];
        trailer.write_u32::<BigEndian>(u32::try_from(len)?)?;
        hasher.update(&trailer);
        Ok(())
    }

    /// Completes the hash over data already fed into `hasher`.
    fn finalize(&self, hasher: SignatureHasher) -> Result<Vec<u8>> {
        let mut hasher = hasher.into_inner();
        let len = self.hash_signature_data(&mut *hasher)?;
        self.hash_trailer(&mut *hasher, len)?;
        Ok(hasher.finalize().to_vec())
    }

    /// Signs the data hashed into `hasher`.
    pub fn sign(self, key: &SecretKeyPacket, hasher: SignatureHasher) -> Result<Signature> {
        ensure!(
            key.public_key().algorithm() == self.pub_alg,
            "signing key does not match the signature algorithm"
        );
        let hash = self.finalize(hasher)?;
        let signature = key.sign(self.hash_alg, &hash)?;
        Ok(Signature {
            config: self,
            signed_hash_value: [hash[0], hash[1]],
            signature,
        })
    }

    /// Certifies `user_id` on the primary key `signee`.
    pub fn sign_certification(
        self,
        key: &SecretKeyPacket,
        signee: &PublicKeyPacket,
        user_id: &UserId,
    ) -> Result<Signature> {
        let mut hasher = self.data_hasher()?;
        signee.hash_for_signature(&mut *hasher.hasher)?;
        user_id.hash_for_signature(&mut *hasher.hasher)?;
        self.sign(key, hasher)
    }

    /// Signs the primary key itself.
    pub fn sign_direct_key(self, key: &SecretKeyPacket) -> Result<Signature> {
        let mut hasher = self.data_hasher()?;
        key.public_key().hash_for_signature(&mut *hasher.hasher)?;
        self.sign(key, hasher)
    }

    /// Binds `subkey` to the primary key of `key`.
    pub fn sign_key_binding(self, key: &SecretKeyPacket, subkey: &PublicKeyPacket) -> Result<Signature> {
        let mut hasher = self.data_hasher()?;
        key.public_key().hash_for_signature(&mut *hasher.hasher)?;
        subkey.hash_for_signature(&mut *hasher.hasher)?;
        self.sign(key, hasher)
    }
}

/// Signature packet.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-signature-packet-type-id-2>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub config: SignatureConfig,
    #[debug("{}", hex::encode(signed_hash_value))]
    pub signed_hash_value: [u8; 2],
    pub signature: SignatureBytes,
}

impl Signature {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let mut input = body;
        let version = SignatureVersion::from(input.read_u8()?);
        if !matches!(version, SignatureVersion::V4 | SignatureVersion::V6) {
            unsupported_err!("signature version {:?}", version);
        }
        let typ = SignatureType::from(input.read_u8()?);
        let pub_alg = PublicKeyAlgorithm::from(input.read_u8()?);
        let hash_alg = HashAlgorithm::from(input.read_u8()?);

        let read_area_len = |input: &mut &[u8]| -> Result<usize> {
            let len = match version {
                SignatureVersion::V6 => input.read_u32::<BigEndian>()? as usize,
                _ => usize::from(input.read_u16::<BigEndian>()?),
            };
            if len > input.len() {
                invalid_packet!("subpacket area exceeds signature packet");
            }
            Ok(len)
        };

        let len = read_area_len(&mut input)?;
        let hashed_subpackets = read_area(&input[..len])?;
        input = &input[len..];
        let len = read_area_len(&mut input)?;
        let unhashed_subpackets = read_area(&input[..len])?;
        input = &input[len..];

        let mut signed_hash_value = [0u8; 2];
        input.read_exact(&mut signed_hash_value)?;

        let salt = if version == SignatureVersion::V6 {
            let salt_len = usize::from(input.read_u8()?);
            if Some(salt_len) != hash_alg.salt_len() {
                invalid_packet!("invalid salt length {} for {}", salt_len, hash_alg);
            }
            let mut salt = vec![0u8; salt_len];
            input.read_exact(&mut salt)?;
            Some(salt)
        } else {
            None
        };

        let signature = SignatureBytes::from_reader(pub_alg, &mut input)?;
        debug!("parsed {:?} signature {:?}", version, typ);

        Ok(Signature {
            config: SignatureConfig {
                version,
                typ,
                pub_alg,
                hash_alg,
                hashed_subpackets,
                unhashed_subpackets,
                salt,
            },
            signed_hash_value,
            signature,
        })
    }

    pub fn version(&self) -> SignatureVersion {
        self.config.version
    }

    pub fn typ(&self) -> SignatureType {
        self.config.typ
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.config.hash_alg
    }

    fn hashed(&self) -> impl Iterator<Item = &SubpacketData> {
        self.config.hashed_subpackets.iter().map(|s| &s.data)
    }

    fn all(&self) -> impl Iterator<Item = &SubpacketData> {
        self.config
            .hashed_subpackets
            .iter()
            .chain(self.config.unhashed_subpackets.iter())
            .map(|s| &s.data)
    }

    /// The signature creation time, from the hashed area.
    pub fn created(&self) -> Option<&DateTime<Utc>> {
        self.hashed().find_map(|data| match data {
            SubpacketData::SignatureCreationTime(created) => Some(created),
            _ => None,
        })
    }

    /// Seconds after creation at which the signature expires.
    pub fn signature_expiration_time(&self) -> Option<u32> {
        self.hashed().find_map(|data| match data {
            SubpacketData::SignatureExpirationTime(secs) if *secs != 0 => Some(*secs),
            _ => None,
        })
    }

    /// Seconds after key creation at which the key expires.
    pub fn key_expiration_time(&self) -> Option<u32> {
        self.hashed().find_map(|data| match data {
            SubpacketData::KeyExpirationTime(secs) if *secs != 0 => Some(*secs),
            _ => None,
        })
    }

    pub fn key_flags(&self) -> Option<KeyFlags> {
        self.hashed().find_map(|data| match data {
            SubpacketData::KeyFlags(flags) => Some(*flags),
            _ => None,
        })
    }

    pub fn issuer_fingerprint(&self) -> Option<&Fingerprint> {
        self.all().find_map(|data| match data {
            SubpacketData::IssuerFingerprint(fp) => Some(fp),
            _ => None,
        })
    }

    /// The issuer key id, taken from the issuer or issuer fingerprint subpackets.
    pub fn issuer_key_id(&self) -> Option<KeyId> {
        self.all()
            .find_map(|data| match data {
                SubpacketData::Issuer(id) => Some(*id),
                _ => None,
            })
            .or_else(|| self.issuer_fingerprint().map(Fingerprint::key_id))
    }

    /// Whether this signature names `key` as its issuer.
    pub fn is_issued_by(&self, key: &PublicKeyPacket) -> bool {
        if let Some(fp) = self.issuer_fingerprint() {
            return *fp == key.fingerprint();
        }
        self.issuer_key_id()
            .is_some_and(|id| id == key.key_id())
    }

    /// Notations from the hashed area, with their criticality, in packet order.
    pub fn notations(&self) -> impl Iterator<Item = (&Notation, bool)> {
        self.config
            .hashed_subpackets
            .iter()
            .filter_map(|s| match &s.data {
                SubpacketData::Notation(notation) => Some((notation, s.is_critical)),
                _ => None,
            })
    }

    /// Whether the hashed area holds a critical subpacket of a type this crate does not know.
    pub fn has_unknown_critical_subpacket(&self) -> bool {
        self.config
            .hashed_subpackets
            .iter()
            .any(|s| s.is_critical && !s.is_known())
    }

    /// Verifies the signature over the data hashed into `hasher`.
    pub fn verify(&self, key: &PublicKeyPacket, hasher: SignatureHasher) -> Result<()> {
        ensure!(
            key.algorithm() == self.config.pub_alg,
            "key algorithm {} does not match signature algorithm {}",
            key.algorithm(),
            self.config.pub_alg
        );
        let hash = self.config.finalize(hasher)?;
        if hash[0..2] != self.signed_hash_value {
            bail!("signature hash prefix mismatch");
        }
        key.verify_signature(self.config.hash_alg, &hash, &self.signature)
    }

    /// Verifies a user id certification issued by `key` over its own primary key.
    pub fn verify_certification(&self, key: &PublicKeyPacket, user_id: &UserId) -> Result<()> {
        ensure!(
            self.config.typ.is_certification(),
            "not a certification: {:?}",
            self.config.typ
        );
        let mut hasher = self.config.data_hasher()?;
        key.hash_for_signature(&mut *hasher.hasher)?;
        user_id.hash_for_signature(&mut *hasher.hasher)?;
        self.verify(key, hasher)
    }

    /// Verifies a direct key signature of `key` over itself.
    pub fn verify_direct_key(&self, key: &PublicKeyPacket) -> Result<()> {
        ensure!(
            self.config.typ == SignatureType::Key,
            "not a direct key signature: {:?}",
            self.config.typ
        );
        let mut hasher = self.config.data_hasher()?;
        key.hash_for_signature(&mut *hasher.hasher)?;
        self.verify(key, hasher)
    }

    /// Verifies a subkey binding signature made by `primary`.
    pub fn verify_key_binding(&self, primary: &PublicKeyPacket, subkey: &PublicKeyPacket) -> Result<()> {
        ensure!(
            self.config.typ == SignatureType::SubkeyBinding,
            "not a subkey binding: {:?}",
            self.config.typ
        );
        let mut hasher = self.config.data_hasher()?;
        primary.hash_for_signature(&mut *hasher.hasher)?;
        subkey.hash_for_signature(&mut *hasher.hasher)?;
        self.verify(primary, hasher)
    }

    /// The full packet, header included.
    pub fn to_packet_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.to_writer_with_header(&mut out)?;
        Ok(out)
    }
}

impl Serialize for Signature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let config = &self.config;
        writer.write_all(&[
            config.version.into(),
            config.typ.into(),
            config.pub_alg.into(),
            config.hash_alg.into(),
        ])?;
        for area in [&config.hashed_subpackets, &config.unhashed_subpackets] {
            let bytes = write_area(area)?;
            match config.version {
                SignatureVersion::V6 => writer.write_u32::<BigEndian>(u32::try_from(bytes.len())?)?,
                _ => writer.write_u16::<BigEndian>(u16::try_from(bytes.len())?)?,
            }
            writer.write_all(&bytes)?;
        }
        writer.write_all(&self.signed_hash_value)?;
        if config.version == SignatureVersion::V6 {
            let salt = config
                .salt
                .as_deref()
                .ok_or_else(|| format_err!("v6 signature without salt"))?;
            writer.write_u8(u8::try_from(salt.len())?)?;
            writer.write_all(salt)?;
        }
        self.signature.to_writer(writer)?;
        Ok(())
    }
}

impl PacketTrait for Signature {
    fn tag(&self) -> Tag {
        Tag::Signature
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::ed25519;
    use crate::packet::{PublicParams, SecretParams};
    use crate::types::timestamp;

    fn key(version: KeyVersion) -> SecretKeyPacket {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (secret, public) = ed25519::generate_key(&mut rng);
        let public = PublicKeyPacket::new(
            Tag::PublicKey,
            version,
            timestamp::from_wire(1_700_000_000),
            PublicKeyAlgorithm::Ed25519,
            PublicParams::Ed25519 { key: public },
        )
        .unwrap();
        SecretKeyPacket::new(public, SecretParams::Ed25519(secret))
    }

    fn sign(key: &SecretKeyPacket, typ: SignatureType, data: &[u8]) -> Signature {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let config = SignatureConfig::from_key(
            &mut rng,
            key.public_key(),
            typ,
            HashAlgorithm::Sha256,
            timestamp::from_wire(1_700_000_100),
        )
        .unwrap();
        let mut hasher = config.data_hasher().unwrap();
        hasher.update(data);
        config.sign(key, hasher).unwrap()
    }

    #[test]
    fn sign_parse_verify() {
        for version in [KeyVersion::V4, KeyVersion::V6] {
            let key = key(version);
            let sig = sign(&key, SignatureType::Binary, b"hello world");
            let parsed = Signature::from_slice(&sig.to_bytes().unwrap()).unwrap();
            assert_eq!(parsed, sig);
            assert!(parsed.is_issued_by(key.public_key()));
            assert_eq!(
                parsed.created(),
                Some(&timestamp::from_wire(1_700_000_100))
            );

            let mut hasher = parsed.config.data_hasher().unwrap();
            hasher.update(b"hello world");
            parsed.verify(key.public_key(), hasher).unwrap();

            let mut hasher = parsed.config.data_hasher().unwrap();
            hasher.update(b"hello World");
            assert!(parsed.verify(key.public_key(), hasher).is_err());
        }
    }

    #[test]
    fn text_signature_normalizes_line_endings() {
        let key = key(KeyVersion::V4);
        let sig = sign(&key, SignatureType::Text, b"a\nb\r\nc\n");

        let mut hasher = sig.config.data_hasher().unwrap();
        hasher.update(b"a\r");
        hasher.update(b"\nb\n");
        hasher.update(b"c\r\n");
        sig.verify(key.public_key(), hasher).unwrap();
    }

    #[test]
    fn certification() {
        let key = key(KeyVersion::V6);
        let user_id = UserId::new("alice <alice@example.org>");
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let config = SignatureConfig::from_key(
            &mut rng,
            key.public_key(),
            SignatureType::CertPositive,
            HashAlgorithm::Sha512,
            timestamp::from_wire(1_700_000_000),
        )
        .unwrap();
        let sig = config
            .sign_certification(&key, key.public_key(), &user_id)
            .unwrap();
        sig.verify_certification(key.public_key(), &user_id).unwrap();
        assert!(sig
            .verify_certification(key.public_key(), &UserId::new("mallory"))
            .is_err());
    }
}
