use std::io::{self, Read};

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::debug;
use rand::{CryptoRng, Rng};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::simple_checksum;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{bail, ensure, invalid_packet, unsupported_err, Error, Result};
use crate::packet::{PacketTrait, PublicKeyPacket, SecretKeyPacket, Serialize};
use crate::types::{Fingerprint, KeyId, KeyVersion, Mpi, Tag};

/// Algorithm specific fields of an encrypted session key.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum PkeskValues {
    Rsa {
        mpi: Mpi,
    },
    X25519 {
        #[debug("{}", hex::encode(ephemeral))]
        ephemeral: [u8; 32],
        /// Only set for v3 packets.
        sym_alg: Option<SymmetricKeyAlgorithm>,
        #[debug("{}", hex::encode(session_key))]
        session_key: Vec<u8>,
    },
    X448 {
        #[debug("{}", hex::encode(ephemeral))]
        ephemeral: [u8; 56],
        /// Only set for v3 packets.
        sym_alg: Option<SymmetricKeyAlgorithm>,
        #[debug("{}", hex::encode(session_key))]
        session_key: Vec<u8>,
    },
    Other {
        #[debug("{}", hex::encode(data))]
        data: Vec<u8>,
    },
}

impl PkeskValues {
    fn from_reader(alg: PublicKeyAlgorithm, v3: bool, input: &mut &[u8]) -> Result<Self> {
        let values = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt => PkeskValues::Rsa {
                mpi: Mpi::from_reader(input)?,
            },
            PublicKeyAlgorithm::X25519 => {
                let (ephemeral, sym_alg, session_key) = read_native::<32>(v3, input)?;
                PkeskValues::X25519 {
                    ephemeral,
                    sym_alg,
                    session_key,
                }
            }
            PublicKeyAlgorithm::X448 => {
                let (ephemeral, sym_alg, session_key) = read_native::<56>(v3, input)?;
                PkeskValues::X448 {
                    ephemeral,
                    sym_alg,
                    session_key,
                }
            }
            _ => {
                let mut data = Vec::new();
                input.read_to_end(&mut data)?;
                PkeskValues::Other { data }
            }
        };
        Ok(values)
    }

    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PkeskValues::Rsa { mpi } => mpi.to_writer(writer)?,
            PkeskValues::X25519 {
                ephemeral,
                sym_alg,
                session_key,
            } => write_native(writer, ephemeral, *sym_alg, session_key)?,
            PkeskValues::X448 {
                ephemeral,
                sym_alg,
                session_key,
            } => write_native(writer, ephemeral, *sym_alg, session_key)?,
            PkeskValues::Other { data } => writer.write_all(data)?,
        }
        Ok(())
    }

    /// The symmetric algorithm carried in the clear, if any.
    fn clear_sym_alg(&self) -> Option<Option<SymmetricKeyAlgorithm>> {
        match self {
            PkeskValues::X25519 { sym_alg, .. } | PkeskValues::X448 { sym_alg, .. } => {
                Some(*sym_alg)
            }
            _ => None,
        }
    }
}

/// Reads the fields shared by X25519 and X448: ephemeral key, length octet,
/// v3 cleartext algorithm and the wrapped session key.
fn read_native<const N: usize>(
    v3: bool,
    input: &mut &[u8],
) -> Result<([u8; N], Option<SymmetricKeyAlgorithm>, Vec<u8>)> {
    let mut ephemeral = [0u8; N];
    input.read_exact(&mut ephemeral)?;
    let mut len = usize::from(input.read_u8()?);
    let sym_alg = if v3 {
        ensure!(len > 0, "missing symmetric algorithm");
        len -= 1;
        Some(SymmetricKeyAlgorithm::from(input.read_u8()?))
    } else {
        None
    };
    let mut session_key = vec![0u8; len];
    input.read_exact(&mut session_key)?;
    Ok((ephemeral, sym_alg, session_key))
}

fn write_native<W: io::Write>(
    writer: &mut W,
    ephemeral: &[u8],
    sym_alg: Option<SymmetricKeyAlgorithm>,
    session_key: &[u8],
) -> Result<()> {
    writer.write_all(ephemeral)?;
    let len = session_key.len() + usize::from(sym_alg.is_some());
    writer.write_u8(u8::try_from(len)?)?;
    if let Some(sym_alg) = sym_alg {
        writer.write_u8(sym_alg.into())?;
    }
    writer.write_all(session_key)?;
    Ok(())
}

/// Public Key Encrypted Session Key Packet (PKESK)
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-encrypted-sessio>
///
/// V3 packets accompany version 1 encrypted data, V6 packets version 2 (AEAD) encrypted data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkesk {
    V3 {
        id: KeyId,
        pk_algo: PublicKeyAlgorithm,
        values: PkeskValues,
    },
    V6 {
        /// `None` for anonymous recipients.
        fingerprint: Option<Fingerprint>,
        pk_algo: PublicKeyAlgorithm,
        values: PkeskValues,
    },
}

impl Pkesk {
    /// Encrypts `session_key` to `recipient`.
    ///
    /// `sym_alg` is bound into v3 packets, v6 packets leave it to the encrypted data packet.
    /// Hidden recipients get the wildcard key id or an anonymous fingerprint.
    pub fn encrypt<R: Rng + CryptoRng>(
        rng: R,
        session_key: &[u8],
        sym_alg: SymmetricKeyAlgorithm,
        recipient: &PublicKeyPacket,
        v6: bool,
        hidden: bool,
    ) -> Result<Self> {
        let pk_algo = recipient.algorithm();
        ensure!(
            pk_algo.can_encrypt(),
            "key {} can not be used for encryption",
            recipient.key_id()
        );
        debug!(
            "encrypting session key to {} (v6: {}, hidden: {})",
            recipient.key_id(),
            v6,
            hidden
        );

        let values = match pk_algo {
            PublicKeyAlgorithm::X25519 | PublicKeyAlgorithm::X448 => {
                ensure!(
                    sym_alg.is_supported() && session_key.len() == sym_alg.key_size(),
                    "invalid session key"
                );
                let clear_alg = if v6 { None } else { Some(sym_alg) };
                recipient.encrypt_raw(rng, session_key, clear_alg)?
            }
            _ => {
                let mut plain = Zeroizing::new(Vec::with_capacity(session_key.len() + 3));
                if !v6 {
                    plain.push(sym_alg.into());
                }
                plain.extend_from_slice(session_key);
                plain.extend_from_slice(&simple_checksum(session_key));
                recipient.encrypt_raw(rng, &plain, None)?
            }
        };

        let packet = if v6 {
            Pkesk::V6 {
                fingerprint: (!hidden).then(|| recipient.fingerprint()),
                pk_algo,
                values,
            }
        } else {
            Pkesk::V3 {
                id: if hidden {
                    KeyId::WILDCARD
                } else {
                    recipient.key_id()
                },
                pk_algo,
                values,
            }
        };
        Ok(packet)
    }

    /// Parses a `PublicKeyEncryptedSessionKey` packet from the given slice.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let mut input = body;
        let version = input.read_u8()?;
        let packet = match version {
            3 => {
                let mut id = [0u8; 8];
                input.read_exact(&mut id)?;
                let pk_algo = PublicKeyAlgorithm::from(input.read_u8()?);
                let values = PkeskValues::from_reader(pk_algo, true, &mut input)?;
                Pkesk::V3 {
                    id: KeyId::from(id),
                    pk_algo,
                    values,
                }
            }
            6 => {
                let len = usize::from(input.read_u8()?);
                let fingerprint = if len == 0 {
                    None
                } else {
                    let key_version = KeyVersion::from(input.read_u8()?);
                    ensure!(len - 1 <= input.len(), "truncated recipient fingerprint");
                    let (fp, rest) = input.split_at(len - 1);
                    input = rest;
                    Some(Fingerprint::new(key_version, fp)?)
                };
                let pk_algo = PublicKeyAlgorithm::from(input.read_u8()?);
                let values = PkeskValues::from_reader(pk_algo, false, &mut input)?;
                Pkesk::V6 {
                    fingerprint,
                    pk_algo,
                    values,
                }
            }
            _ => unsupported_err!("PKESK version {}", version),
        };
        if !input.is_empty() {
            invalid_packet!("trailing data in PKESK");
        }
        Ok(packet)
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, Pkesk::V6 { .. })
    }

    /// Whether the recipient was hidden.
    pub fn is_anonymous(&self) -> bool {
        match self {
            Pkesk::V3 { id, .. } => id.is_wildcard(),
            Pkesk::V6 { fingerprint, .. } => fingerprint.is_none(),
        }
    }

    /// The recipient key id, `None` for hidden recipients.
    pub fn recipient_key_id(&self) -> Option<KeyId> {
        match self {
            Pkesk::V3 { id, .. } if !id.is_wildcard() => Some(*id),
            Pkesk::V6 {
                fingerprint: Some(fp),
                ..
            } => Some(fp.key_id()),
            _ => None,
        }
    }

    fn pk_algo(&self) -> PublicKeyAlgorithm {
        match self {
            Pkesk::V3 { pk_algo, .. } | Pkesk::V6 { pk_algo, .. } => *pk_algo,
        }
    }

    /// Whether `key` is the addressed recipient, or could be for hidden recipients.
    pub fn matches(&self, key: &PublicKeyPacket) -> bool {
        if key.algorithm() != self.pk_algo() {
            return false;
        }
        match self {
            Pkesk::V3 { id, .. } => id.is_wildcard() || *id == key.key_id(),
            Pkesk::V6 { fingerprint, .. } => {
                fingerprint.map_or(true, |fp| fp == key.fingerprint())
            }
        }
    }

    /// Recovers the session key, and for v3 packets the symmetric algorithm.
    pub fn decrypt(
        &self,
        key: &SecretKeyPacket,
    ) -> Result<(Option<SymmetricKeyAlgorithm>, Zeroizing<Vec<u8>>)> {
        let values = match self {
            Pkesk::V3 { values, .. } | Pkesk::V6 { values, .. } => values,
        };
        let plain = key.decrypt_raw(values)?;

        if let Some(sym_alg) = values.clear_sym_alg() {
            return Ok((sym_alg, plain));
        }

        let (sym_alg, rest) = match self {
            Pkesk::V3 { .. } => {
                let Some((alg, rest)) = plain.split_first() else {
                    bail!("empty session key payload");
                };
                (Some(SymmetricKeyAlgorithm::from(*alg)), rest)
            }
            Pkesk::V6 { .. } => (None, &plain[..]),
        };
        ensure!(rest.len() > 2, "session key payload too short");
        let (session_key, checksum) = rest.split_at(rest.len() - 2);
        if !bool::from(simple_checksum(session_key)[..].ct_eq(checksum)) {
            return Err(Error::InvalidChecksum);
        }
        if let Some(alg) = sym_alg {
            ensure!(
                alg.is_supported() && alg.key_size() == session_key.len(),
                "session key does not match {}",
                alg
            );
        }
        Ok((sym_alg, Zeroizing::new(session_key.to_vec())))
    }
}

impl Serialize for Pkesk {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Pkesk::V3 {
                id,
                pk_algo,
                values,
            } => {
                writer.write_u8(3)?;
                writer.write_all(id.as_ref())?;
                writer.write_u8((*pk_algo).into())?;
                values.to_writer(writer)?;
            }
            Pkesk::V6 {
                fingerprint,
                pk_algo,
                values,
            } => {
                writer.write_u8(6)?;
                match fingerprint {
                    Some(fp) => {
                        writer.write_u8(u8::try_from(fp.as_bytes().len() + 1)?)?;
                        writer.write_u8(fp.version().into())?;
                        writer.write_all(fp.as_bytes())?;
                    }
                    None => writer.write_u8(0)?,
                }
                writer.write_u8((*pk_algo).into())?;
                values.to_writer(writer)?;
            }
        }
        Ok(())
    }
}

impl PacketTrait for Pkesk {
    fn tag(&self) -> Tag {
        Tag::PublicKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::{x25519, x448};
    use crate::packet::{PublicParams, SecretParams};
    use crate::types::timestamp;

    fn x25519_key(version: KeyVersion) -> SecretKeyPacket {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let (secret, public) = x25519::generate_key(&mut rng);
        let public = PublicKeyPacket::new(
            Tag::PublicSubkey,
            version,
            timestamp::from_wire(1_700_000_000),
            PublicKeyAlgorithm::X25519,
            PublicParams::X25519 { key: public },
        )
        .unwrap();
        SecretKeyPacket::new(public, SecretParams::X25519(secret))
    }

    #[test]
    fn x25519_v3_and_v6() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let key = x25519_key(KeyVersion::V4);
        let session_key = SymmetricKeyAlgorithm::AES256.new_session_key(&mut rng);

        for (v6, hidden) in [(false, false), (false, true), (true, false), (true, true)] {
            let pkesk = Pkesk::encrypt(
                &mut rng,
                &session_key,
                SymmetricKeyAlgorithm::AES256,
                key.public_key(),
                v6,
                hidden,
            )
            .unwrap();
            let parsed = Pkesk::from_slice(&pkesk.to_bytes().unwrap()).unwrap();
            assert_eq!(parsed, pkesk);
            assert_eq!(parsed.is_anonymous(), hidden);
            assert!(parsed.matches(key.public_key()));

            let (alg, decrypted) = parsed.decrypt(&key).unwrap();
            assert_eq!(alg.is_some(), !v6);
            assert_eq!(&decrypted[..], &session_key[..]);
        }
    }

    #[test]
    fn wrong_key_fails() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let key = x25519_key(KeyVersion::V6);
        let session_key = SymmetricKeyAlgorithm::AES128.new_session_key(&mut rng);
        let pkesk = Pkesk::encrypt(
            &mut rng,
            &session_key,
            SymmetricKeyAlgorithm::AES128,
            key.public_key(),
            true,
            false,
        )
        .unwrap();

        let (secret, public) = x25519::generate_key(&mut rng);
        let other = SecretKeyPacket::new(
            PublicKeyPacket::new(
                Tag::PublicSubkey,
                KeyVersion::V6,
                timestamp::from_wire(1_700_000_000),
                PublicKeyAlgorithm::X25519,
                PublicParams::X25519 { key: public },
            )
            .unwrap(),
            SecretParams::X25519(secret),
        );
        assert!(!pkesk.matches(other.public_key()));
        assert!(pkesk.decrypt(&other).is_err());
    }

    #[test]
    fn x448_v3_and_v6() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let (secret, public) = x448::generate_key(&mut rng);
        for (version, v6) in [(KeyVersion::V4, false), (KeyVersion::V6, true)] {
            let key = SecretKeyPacket::new(
                PublicKeyPacket::new(
                    Tag::PublicSubkey,
                    version,
                    timestamp::from_wire(1_700_000_000),
                    PublicKeyAlgorithm::X448,
                    PublicParams::X448 { key: public },
                )
                .unwrap(),
                SecretParams::X448(secret.clone()),
            );
            let session_key = SymmetricKeyAlgorithm::AES256.new_session_key(&mut rng);
            let pkesk = Pkesk::encrypt(
                &mut rng,
                &session_key,
                SymmetricKeyAlgorithm::AES256,
                key.public_key(),
                v6,
                false,
            )
            .unwrap();
            let parsed = Pkesk::from_slice(&pkesk.to_bytes().unwrap()).unwrap();
            assert_eq!(parsed, pkesk);
            assert!(matches!(
                parsed,
                Pkesk::V3 { values: PkeskValues::X448 { .. }, .. }
                    | Pkesk::V6 { values: PkeskValues::X448 { .. }, .. }
            ));

            let (alg, decrypted) = parsed.decrypt(&key).unwrap();
            assert_eq!(alg, (!v6).then_some(SymmetricKeyAlgorithm::AES256));
            assert_eq!(&decrypted[..], &session_key[..]);
        }
    }
}
