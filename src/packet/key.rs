use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{ed25519, ed448, rsa, simple_checksum, x25519, x448};
use crate::errors::{bail, ensure, invalid_packet, unsupported_err, Error, Result};
use crate::packet::{PacketTrait, PkeskValues, Serialize, SignatureBytes};
use crate::types::{timestamp, Fingerprint, KeyId, KeyVersion, Mpi, Tag};

/// Key flags, as carried in self-signatures.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-key-flags>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags(u8);

impl KeyFlags {
    pub const CERTIFY: KeyFlags = KeyFlags(0x01);
    pub const SIGN: KeyFlags = KeyFlags(0x02);
    pub const ENCRYPT_COMMS: KeyFlags = KeyFlags(0x04);
    pub const ENCRYPT_STORAGE: KeyFlags = KeyFlags(0x08);

    pub const fn from_bits(bits: u8) -> Self {
        KeyFlags(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn can_sign(&self) -> bool {
        self.0 & Self::SIGN.0 != 0
    }

    pub fn can_encrypt(&self) -> bool {
        self.0 & (Self::ENCRYPT_COMMS.0 | Self::ENCRYPT_STORAGE.0) != 0
    }
}

impl std::ops::BitOr for KeyFlags {
    type Output = KeyFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        KeyFlags(self.0 | rhs.0)
    }
}

/// Algorithm specific public key material.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum PublicParams {
    Rsa {
        n: Mpi,
        e: Mpi,
    },
    Ed25519 {
        #[debug("{}", hex::encode(key))]
        key: [u8; 32],
    },
    X25519 {
        #[debug("{}", hex::encode(key))]
        key: [u8; 32],
    },
    Ed448 {
        #[debug("{}", hex::encode(key))]
        key: [u8; 57],
    },
    X448 {
        #[debug("{}", hex::encode(key))]
        key: [u8; 56],
    },
    Unknown {
        #[debug("{}", hex::encode(data))]
        data: Vec<u8>,
    },
}

impl PublicParams {
    fn from_reader<R: Read>(alg: PublicKeyAlgorithm, mut reader: R) -> Result<Self> {
        let params = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                let n = Mpi::from_reader(&mut reader)?;
                let e = Mpi::from_reader(&mut reader)?;
                PublicParams::Rsa { n, e }
            }
            PublicKeyAlgorithm::Ed25519 => {
                let mut key = [0u8; 32];
                reader.read_exact(&mut key)?;
                PublicParams::Ed25519 { key }
            }
            PublicKeyAlgorithm::X25519 => {
                let mut key = [0u8; 32];
                reader.read_exact(&mut key)?;
                PublicParams::X25519 { key }
            }
            PublicKeyAlgorithm::Ed448 => {
                let mut key = [0u8; 57];
                reader.read_exact(&mut key)?;
                PublicParams::Ed448 { key }
            }
            PublicKeyAlgorithm::X448 => {
                let mut key = [0u8; 56];
                reader.read_exact(&mut key)?;
                PublicParams::X448 { key }
            }
            _ => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                PublicParams::Unknown { data }
            }
        };
        Ok(params)
    }

    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PublicParams::Rsa { n, e } => {
                n.to_writer(writer)?;
                e.to_writer(writer)?;
            }
            PublicParams::Ed25519 { key } | PublicParams::X25519 { key } => {
                writer.write_all(key)?;
            }
            PublicParams::Ed448 { key } => writer.write_all(key)?,
            PublicParams::X448 { key } => writer.write_all(key)?,
            PublicParams::Unknown { data } => writer.write_all(data)?,
        }
        Ok(())
    }

    pub(crate) fn rsa_components(&self) -> Option<rsa::PublicComponents> {
        match self {
            PublicParams::Rsa { n, e } => Some(rsa::PublicComponents {
                n: n.as_bytes().to_vec(),
                e: e.as_bytes().to_vec(),
            }),
            _ => None,
        }
    }
}

/// Public key or public subkey packet.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-packet-formats>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPacket {
    tag: Tag,
    version: KeyVersion,
    created_at: DateTime<Utc>,
    algorithm: PublicKeyAlgorithm,
    params: PublicParams,
}

impl PublicKeyPacket {
    pub fn new(
        tag: Tag,
        version: KeyVersion,
        created_at: DateTime<Utc>,
        algorithm: PublicKeyAlgorithm,
        params: PublicParams,
    ) -> Result<Self> {
        ensure!(
            matches!(tag, Tag::PublicKey | Tag::PublicSubkey),
            "invalid key tag {:?}",
            tag
        );
        ensure!(
            matches!(version, KeyVersion::V4 | KeyVersion::V6),
            "unsupported key version {:?}",
            version
        );
        Ok(PublicKeyPacket {
            tag,
            version,
            created_at,
            algorithm,
            params,
        })
    }

    pub fn from_slice(tag: Tag, body: &[u8]) -> Result<Self> {
        let mut input = body;
        let key = Self::from_reader(tag, &mut input)?;
        ensure!(input.is_empty(), "trailing data in public key packet");
        Ok(key)
    }

    /// Parses the public part of a (secret) key packet, leaving the reader after it.
    pub(crate) fn from_reader(tag: Tag, input: &mut &[u8]) -> Result<Self> {
        let tag = match tag {
            Tag::PublicKey | Tag::SecretKey => Tag::PublicKey,
            Tag::PublicSubkey | Tag::SecretSubkey => Tag::PublicSubkey,
            _ => invalid_packet!("not a key packet: {:?}", tag),
        };
        let version = KeyVersion::from(input.read_u8()?);
        let created_at = timestamp::from_wire(input.read_u32::<BigEndian>()?);
        let algorithm = PublicKeyAlgorithm::from(input.read_u8()?);
        let params = match version {
            KeyVersion::V4 => {
                let mut public = *input;
                let params = PublicParams::from_reader(algorithm, &mut public)?;
                *input = public;
                params
            }
            KeyVersion::V6 => {
                let len = input.read_u32::<BigEndian>()? as usize;
                ensure!(len <= input.len(), "truncated v6 key material");
                let (material, rest) = input.split_at(len);
                *input = rest;
                PublicParams::from_reader(algorithm, material)?
            }
            _ => unsupported_err!("key version {:?}", version),
        };
        debug!("parsed {:?} {:?} {}", tag, version, algorithm);

        Ok(PublicKeyPacket {
            tag,
            version,
            created_at,
            algorithm,
            params,
        })
    }

    pub fn version(&self) -> KeyVersion {
        self.version
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn params(&self) -> &PublicParams {
        &self.params
    }

    pub fn is_subkey(&self) -> bool {
        self.tag == Tag::PublicSubkey
    }

    fn params_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.params.to_writer(&mut out)?;
        Ok(out)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let body = self.to_bytes().expect("serialize to Vec<u8>");
        match self.version {
            KeyVersion::V6 => {
                use sha2::Digest;
                let mut hasher = sha2::Sha256::new();
                Digest::update(&mut hasher, [0x9B]);
                Digest::update(&mut hasher, (body.len() as u32).to_be_bytes());
                Digest::update(&mut hasher, &body);
                Fingerprint::V6(hasher.finalize().into())
            }
            _ => {
                use sha1::Digest;
                let mut hasher = sha1::Sha1::new();
                Digest::update(&mut hasher, [0x99]);
                Digest::update(&mut hasher, (body.len() as u16).to_be_bytes());
                Digest::update(&mut hasher, &body);
                Fingerprint::V4(hasher.finalize().into())
            }
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    /// Feeds the key into a signature hash, as done for certifications and bindings.
    pub(crate) fn hash_for_signature(&self, hasher: &mut dyn DynDigest) -> Result<()> {
        let body = self.to_bytes()?;
        match self.version {
            KeyVersion::V6 => {
                hasher.update(&[0x9B]);
                hasher.update(&u32::try_from(body.len())?.to_be_bytes());
            }
            _ => {
                hasher.update(&[0x99]);
                hasher.update(&u16::try_from(body.len())?.to_be_bytes());
            }
        }
        hasher.update(&body);
        Ok(())
    }

    /// Verifies a raw signature over `digest`.
    pub fn verify_signature(
        &self,
        hash: HashAlgorithm,
        digest: &[u8],
        sig: &SignatureBytes,
    ) -> Result<()> {
        match (&self.params, sig) {
            (PublicParams::Rsa { .. }, SignatureBytes::Mpis(mpis)) => {
                ensure!(mpis.len() == 1, "invalid RSA signature");
                let public = self
                    .params
                    .rsa_components()
                    .ok_or_else(|| crate::errors::format_err!("not an RSA key"))?;
                rsa::verify(&public, hash, digest, mpis[0].as_bytes())
            }
            (PublicParams::Ed25519 { key }, SignatureBytes::Native(raw)) => {
                ed25519::verify(key, hash, digest, raw)
            }
            (PublicParams::Ed448 { key }, SignatureBytes::Native(raw)) => {
                ed448::verify(key, hash, digest, raw)
            }
            (PublicParams::X25519 { .. } | PublicParams::X448 { .. }, _) => {
                bail!("{} keys can not sign", self.algorithm)
            }
            _ => unsupported_err!("signature verification with {}", self.algorithm),
        }
    }

    /// Encrypts an already prepared session key payload to this key.
    ///
    /// `sym_alg` is only carried in the clear by X25519/X448 values of v3 PKESKs.
    pub(crate) fn encrypt_raw<R: Rng + CryptoRng>(
        &self,
        rng: R,
        plain: &[u8],
        sym_alg: Option<SymmetricKeyAlgorithm>,
    ) -> Result<PkeskValues> {
        match &self.params {
            PublicParams::Rsa { .. } => {
                let public = self
                    .params
                    .rsa_components()
                    .ok_or_else(|| crate::errors::format_err!("not an RSA key"))?;
                let ciphertext = rsa::encrypt(rng, &public, plain)?;
                Ok(PkeskValues::Rsa {
                    mpi: Mpi::from_slice(&ciphertext),
                })
            }
            PublicParams::X25519 { key } => {
                let (ephemeral, wrapped) = x25519::encrypt(rng, key, plain)?;
                Ok(PkeskValues::X25519 {
                    ephemeral,
                    sym_alg,
                    session_key: wrapped,
                })
            }
            PublicParams::X448 { key } => {
                let (ephemeral, wrapped) = x448::encrypt(rng, key, plain)?;
                Ok(PkeskValues::X448 {
                    ephemeral,
                    sym_alg,
                    session_key: wrapped,
                })
            }
            _ => unsupported_err!("encryption to {} keys", self.algorithm),
        }
    }

    pub(crate) fn as_tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }
}

impl Serialize for PublicKeyPacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.version.into())?;
        writer.write_u32::<BigEndian>(timestamp::to_wire(&self.created_at)?)?;
        writer.write_u8(self.algorithm.into())?;
        let params = self.params_bytes()?;
        if self.version == KeyVersion::V6 {
            writer.write_u32::<BigEndian>(u32::try_from(params.len())?)?;
        }
        writer.write_all(&params)?;
        Ok(())
    }
}

impl PacketTrait for PublicKeyPacket {
    fn tag(&self) -> Tag {
        self.tag
    }
}

/// Algorithm specific secret key material. Zeroed when dropped.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum SecretParams {
    Rsa {
        #[debug("..")]
        d: Zeroizing<Vec<u8>>,
        #[debug("..")]
        p: Zeroizing<Vec<u8>>,
        #[debug("..")]
        q: Zeroizing<Vec<u8>>,
        #[debug("..")]
        u: Zeroizing<Vec<u8>>,
    },
    Ed25519(#[debug("..")] Zeroizing<[u8; 32]>),
    X25519(#[debug("..")] Zeroizing<[u8; 32]>),
    Ed448(#[debug("..")] Zeroizing<[u8; 57]>),
    X448(#[debug("..")] Zeroizing<[u8; 56]>),
}

impl SecretParams {
    fn from_reader(alg: PublicKeyAlgorithm, input: &mut &[u8]) -> Result<Self> {
        let params = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                let d = Mpi::from_reader(input)?;
                let p = Mpi::from_reader(input)?;
                let q = Mpi::from_reader(input)?;
                let u = Mpi::from_reader(input)?;
                SecretParams::Rsa {
                    d: d.as_bytes().to_vec().into(),
                    p: p.as_bytes().to_vec().into(),
                    q: q.as_bytes().to_vec().into(),
                    u: u.as_bytes().to_vec().into(),
                }
            }
            PublicKeyAlgorithm::Ed25519 | PublicKeyAlgorithm::X25519 => {
                let mut key = Zeroizing::new([0u8; 32]);
                input.read_exact(&mut key[..])?;
                if alg == PublicKeyAlgorithm::Ed25519 {
                    SecretParams::Ed25519(key)
                } else {
                    SecretParams::X25519(key)
                }
            }
            PublicKeyAlgorithm::Ed448 => {
                let mut key = Zeroizing::new([0u8; 57]);
                input.read_exact(&mut key[..])?;
                SecretParams::Ed448(key)
            }
            PublicKeyAlgorithm::X448 => {
                let mut key = Zeroizing::new([0u8; 56]);
                input.read_exact(&mut key[..])?;
                SecretParams::X448(key)
            }
            _ => unsupported_err!("secret keys for {}", alg),
        };
        Ok(params)
    }

    fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(Vec::new());
        match self {
            SecretParams::Rsa { d, p, q, u } => {
                for part in [d, p, q, u] {
                    Mpi::from_slice(part).to_writer(&mut *out)?;
                }
            }
            SecretParams::Ed25519(key) | SecretParams::X25519(key) => {
                out.extend_from_slice(&key[..]);
            }
            SecretParams::Ed448(key) => out.extend_from_slice(&key[..]),
            SecretParams::X448(key) => out.extend_from_slice(&key[..]),
        }
        Ok(out)
    }
}

/// Secret key or secret subkey packet, always stored unencrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeyPacket {
    public: PublicKeyPacket,
    secret: SecretParams,
}

impl SecretKeyPacket {
    pub fn new(public: PublicKeyPacket, secret: SecretParams) -> Self {
        SecretKeyPacket { public, secret }
    }

    pub fn from_slice(tag: Tag, body: &[u8]) -> Result<Self> {
        let mut input = body;
        let public = PublicKeyPacket::from_reader(tag, &mut input)?;
        let usage = input.read_u8()?;
        if usage != 0 {
            unsupported_err!("password protected secret keys");
        }
        let secret = SecretParams::from_reader(public.algorithm(), &mut input)?;
        if public.version() != KeyVersion::V6 {
            let mut checksum = [0u8; 2];
            input.read_exact(&mut checksum)?;
            if checksum != simple_checksum(&secret.to_bytes()?) {
                return Err(Error::InvalidPacket {
                    message: "invalid secret key checksum".to_string(),
                });
            }
        }
        ensure!(input.is_empty(), "trailing data in secret key packet");
        Ok(SecretKeyPacket { public, secret })
    }

    pub fn public_key(&self) -> &PublicKeyPacket {
        &self.public
    }

    pub fn secret_params(&self) -> &SecretParams {
        &self.secret
    }

    fn rsa_key(&self) -> Result<::rsa::RsaPrivateKey> {
        let SecretParams::Rsa { d, p, q, u } = &self.secret else {
            bail!("not an RSA key");
        };
        let public = self
            .public
            .params()
            .rsa_components()
            .ok_or_else(|| crate::errors::format_err!("RSA params mismatch"))?;
        let secret = rsa::SecretComponents {
            d: d.clone(),
            p: p.clone(),
            q: q.clone(),
            u: u.clone(),
        };
        rsa::private_key(&public, &secret)
    }

    /// Signs a digest.
    pub fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<SignatureBytes> {
        match &self.secret {
            SecretParams::Rsa { .. } => {
                let key = self.rsa_key()?;
                let sig = rsa::sign(&key, hash, digest)?;
                Ok(SignatureBytes::Mpis(vec![Mpi::from_slice(&sig)]))
            }
            SecretParams::Ed25519(secret) => {
                let sig = ed25519::sign(secret, hash, digest)?;
                Ok(SignatureBytes::Native(sig.to_vec()))
            }
            SecretParams::Ed448(secret) => {
                let sig = ed448::sign(secret, hash, digest)?;
                Ok(SignatureBytes::Native(sig))
            }
            SecretParams::X25519(_) | SecretParams::X448(_) => {
                bail!("{} keys can not sign", self.public.algorithm())
            }
        }
    }

    /// Decrypts PKESK values, returning the raw payload.
    pub(crate) fn decrypt_raw(&self, values: &PkeskValues) -> Result<Zeroizing<Vec<u8>>> {
        match (&self.secret, values) {
            (SecretParams::Rsa { .. }, PkeskValues::Rsa { mpi }) => {
                let key = self.rsa_key()?;
                rsa::decrypt(&key, mpi.as_bytes())
            }
            (
                SecretParams::X25519(secret),
                PkeskValues::X25519 {
                    ephemeral,
                    session_key,
                    ..
                },
            ) => {
                let PublicParams::X25519 { key } = self.public.params() else {
                    bail!("X25519 params mismatch");
                };
                x25519::decrypt(secret, key, ephemeral, session_key)
            }
            (
                SecretParams::X448(secret),
                PkeskValues::X448 {
                    ephemeral,
                    session_key,
                    ..
                },
            ) => {
                let PublicParams::X448 { key } = self.public.params() else {
                    bail!("X448 params mismatch");
                };
                x448::decrypt(secret, key, ephemeral, session_key)
            }
            _ => bail!("key algorithm does not match encrypted session key"),
        }
    }
}

impl Serialize for SecretKeyPacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.public.to_writer(writer)?;
        writer.write_u8(0)?;
        let secret = self.secret.to_bytes()?;
        writer.write_all(&secret)?;
        if self.public.version() != KeyVersion::V6 {
            writer.write_all(&simple_checksum(&secret))?;
        }
        Ok(())
    }
}

impl PacketTrait for SecretKeyPacket {
    fn tag(&self) -> Tag {
        if self.public.is_subkey() {
            Tag::SecretSubkey
        } else {
            Tag::SecretKey
        }
    }
}
