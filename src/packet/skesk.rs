use std::io::{self, Read};

use byteorder::{ReadBytesExt, WriteBytesExt};
use hkdf::Hkdf;
use log::debug;
use rand::{CryptoRng, Rng};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::s2k::{S2kConfig, StringToKey};
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, invalid_packet, unsupported_err, Error, Result};
use crate::packet::{PacketTrait, Serialize};
use crate::types::Tag;

/// Symmetric-Key Encrypted Session Key Packet (SKESK)
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetric-key-encrypted-ses>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum Skesk {
    V4 {
        sym_algorithm: SymmetricKeyAlgorithm,
        s2k: StringToKey,
        /// Absent when the derived key is used as session key directly.
        #[debug("{:?}", encrypted_key.as_ref().map(hex::encode))]
        encrypted_key: Option<Vec<u8>>,
    },
    V6 {
        sym_algorithm: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        s2k: StringToKey,
        #[debug("{}", hex::encode(iv))]
        iv: Vec<u8>,
        /// Encrypted session key followed by the authentication tag.
        #[debug("{}", hex::encode(encrypted_key))]
        encrypted_key: Vec<u8>,
    },
}

impl Skesk {
    /// Encrypts `session_key` with a password derived key using CFB, for version 1 encrypted data.
    pub fn encrypt_v4<R: Rng + CryptoRng>(
        rng: R,
        password: &[u8],
        session_key: &[u8],
        sym_algorithm: SymmetricKeyAlgorithm,
        s2k: &S2kConfig,
    ) -> Result<Self> {
        ensure!(sym_algorithm.is_supported(), "unsupported cipher {}", sym_algorithm);
        let s2k = s2k.specifier(rng);
        let key = s2k.derive_key(password, sym_algorithm.key_size())?;

        let mut data = Zeroizing::new(Vec::with_capacity(session_key.len() + 1));
        data.push(sym_algorithm.into());
        data.extend_from_slice(session_key);
        let iv = vec![0u8; sym_algorithm.block_size()];
        sym_algorithm.encrypt_with_iv_regular(&key, &iv, &mut data)?;

        Ok(Skesk::V4 {
            sym_algorithm,
            s2k,
            encrypted_key: Some(data.to_vec()),
        })
    }

    /// Encrypts `session_key` with AEAD under a password derived key, for version 2 encrypted data.
    pub fn encrypt_v6<R: Rng + CryptoRng>(
        mut rng: R,
        password: &[u8],
        session_key: &[u8],
        sym_algorithm: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        s2k: &S2kConfig,
    ) -> Result<Self> {
        let s2k = s2k.specifier(&mut rng);
        let mut iv = vec![0u8; aead.nonce_size()];
        rng.fill_bytes(&mut iv);

        let info = info(sym_algorithm, aead);
        let kek = derive_kek(&s2k, password, sym_algorithm, &info)?;
        let encrypted_key = aead.encrypt(sym_algorithm, &kek, &iv, &info, session_key)?;

        Ok(Skesk::V6 {
            sym_algorithm,
            aead,
            s2k,
            iv,
            encrypted_key,
        })
    }

    /// Parses a `SymKeyEncryptedSessionKey` packet from the given slice.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let mut input = body;
        let version = input.read_u8()?;
        let packet = match version {
            4 => {
                let sym_algorithm = SymmetricKeyAlgorithm::from(input.read_u8()?);
                let s2k = StringToKey::from_reader(&mut input)?;
                let encrypted_key = (!input.is_empty()).then(|| input.to_vec());
                Skesk::V4 {
                    sym_algorithm,
                    s2k,
                    encrypted_key,
                }
            }
            6 => {
                let count = usize::from(input.read_u8()?);
                ensure!(count <= input.len(), "truncated SKESK");
                let sym_algorithm = SymmetricKeyAlgorithm::from(input.read_u8()?);
                let aead = AeadAlgorithm::from(input.read_u8()?);
                let s2k_len = usize::from(input.read_u8()?);
                ensure!(s2k_len <= input.len(), "truncated S2K specifier");
                let (mut s2k_bytes, rest) = input.split_at(s2k_len);
                input = rest;
                let s2k = StringToKey::from_reader(&mut s2k_bytes)?;
                if !s2k_bytes.is_empty() {
                    invalid_packet!("S2K length mismatch");
                }
                let iv_len = count
                    .checked_sub(3 + s2k_len)
                    .ok_or_else(|| crate::errors::format_err!("invalid SKESK field count"))?;
                ensure!(iv_len <= input.len(), "truncated SKESK iv");
                let (iv, rest) = input.split_at(iv_len);
                input = rest;
                let encrypted_key = input.to_vec();
                Skesk::V6 {
                    sym_algorithm,
                    aead,
                    s2k,
                    iv: iv.to_vec(),
                    encrypted_key,
                }
            }
            _ => unsupported_err!("SKESK version {}", version),
        };
        debug!("parsed SKESK v{}", version);
        Ok(packet)
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, Skesk::V6 { .. })
    }

    /// Recovers the session key with `password`.
    ///
    /// The symmetric algorithm is returned for v4 packets, v6 packets leave it to the data packet.
    pub fn decrypt(
        &self,
        password: &[u8],
    ) -> Result<(Option<SymmetricKeyAlgorithm>, Zeroizing<Vec<u8>>)> {
        match self {
            Skesk::V4 {
                sym_algorithm,
                s2k,
                encrypted_key,
            } => {
                ensure!(sym_algorithm.is_supported(), "unsupported cipher {}", sym_algorithm);
                let key = s2k.derive_key(password, sym_algorithm.key_size())?;
                let Some(encrypted_key) = encrypted_key else {
                    return Ok((Some(*sym_algorithm), key));
                };

                let mut data = Zeroizing::new(encrypted_key.clone());
                let iv = vec![0u8; sym_algorithm.block_size()];
                sym_algorithm.decrypt_with_iv_regular(&key, &iv, &mut data)?;
                let Some((alg, session_key)) = data.split_first() else {
                    return Err(Error::NoDecryptionKey);
                };
                let alg = SymmetricKeyAlgorithm::from(*alg);
                // a wrong password yields random bytes here
                if !alg.is_supported() || alg.key_size() != session_key.len() {
                    return Err(Error::NoDecryptionKey);
                }
                Ok((Some(alg), Zeroizing::new(session_key.to_vec())))
            }
            Skesk::V6 {
                sym_algorithm,
                aead,
                s2k,
                iv,
                encrypted_key,
            } => {
                let info = info(*sym_algorithm, *aead);
                let kek = derive_kek(s2k, password, *sym_algorithm, &info)?;
                let session_key = aead.decrypt(*sym_algorithm, &kek, iv, &info, encrypted_key)?;
                Ok((None, Zeroizing::new(session_key)))
            }
        }
    }
}

fn info(sym_algorithm: SymmetricKeyAlgorithm, aead: AeadAlgorithm) -> [u8; 4] {
    [0xC3, 6, sym_algorithm.into(), aead.into()]
}

fn derive_kek(
    s2k: &StringToKey,
    password: &[u8],
    sym_algorithm: SymmetricKeyAlgorithm,
    info: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    ensure!(sym_algorithm.is_supported(), "unsupported cipher {}", sym_algorithm);
    let ikm = s2k.derive_key(password, sym_algorithm.key_size())?;
    let hk = Hkdf::<Sha256>::new(None, &ikm);
    let mut kek = Zeroizing::new(vec![0u8; sym_algorithm.key_size()]);
    hk.expand(info, &mut kek)
        .map_err(|_| Error::InvalidKeyLength)?;
    Ok(kek)
}

impl Serialize for Skesk {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Skesk::V4 {
                sym_algorithm,
                s2k,
                encrypted_key,
            } => {
                writer.write_u8(4)?;
                writer.write_u8((*sym_algorithm).into())?;
                s2k.to_writer(writer)?;
                if let Some(key) = encrypted_key {
                    writer.write_all(key)?;
                }
            }
            Skesk::V6 {
                sym_algorithm,
                aead,
                s2k,
                iv,
                encrypted_key,
            } => {
                writer.write_u8(6)?;
                writer.write_u8(u8::try_from(3 + s2k.write_len() + iv.len())?)?;
                writer.write_u8((*sym_algorithm).into())?;
                writer.write_u8((*aead).into())?;
                writer.write_u8(u8::try_from(s2k.write_len())?)?;
                s2k.to_writer(writer)?;
                writer.write_all(iv)?;
                writer.write_all(encrypted_key)?;
            }
        }
        Ok(())
    }
}

impl PacketTrait for Skesk {
    fn tag(&self) -> Tag {
        Tag::SymKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::hash::HashAlgorithm;

    fn fast_s2k() -> S2kConfig {
        S2kConfig::IteratedAndSalted {
            hash_alg: HashAlgorithm::Sha256,
            count: 0,
        }
    }

    #[test]
    fn v4_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let session_key = SymmetricKeyAlgorithm::AES256.new_session_key(&mut rng);
        let skesk = Skesk::encrypt_v4(
            &mut rng,
            b"password",
            &session_key,
            SymmetricKeyAlgorithm::AES256,
            &fast_s2k(),
        )
        .unwrap();
        let parsed = Skesk::from_slice(&skesk.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, skesk);

        let (alg, key) = parsed.decrypt(b"password").unwrap();
        assert_eq!(alg, Some(SymmetricKeyAlgorithm::AES256));
        assert_eq!(&key[..], &session_key[..]);
    }

    #[test]
    fn v6_roundtrip_and_wrong_password() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let session_key = SymmetricKeyAlgorithm::AES128.new_session_key(&mut rng);
        let skesk = Skesk::encrypt_v6(
            &mut rng,
            b"password",
            &session_key,
            SymmetricKeyAlgorithm::AES128,
            AeadAlgorithm::Gcm,
            &fast_s2k(),
        )
        .unwrap();
        let parsed = Skesk::from_slice(&skesk.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, skesk);
        assert!(parsed.is_v6());

        let (alg, key) = parsed.decrypt(b"password").unwrap();
        assert_eq!(alg, None);
        assert_eq!(&key[..], &session_key[..]);
        assert!(parsed.decrypt(b"wrong").is_err());
    }
}
