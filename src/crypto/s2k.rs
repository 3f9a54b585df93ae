use std::io::{self, Read};

use argon2::{Algorithm, Argon2, Params, Version};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{ensure, unsupported_err, Result};

const DEFAULT_ITER_COUNT: u8 = 224;

/// String-to-key specifier, deriving a symmetric key from a password.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-string-to-key-s2k-specifier>
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringToKey {
    IteratedAndSalted {
        hash_alg: HashAlgorithm,
        salt: [u8; 8],
        count: u8,
    },
    Argon2 {
        salt: [u8; 16],
        /// Number of passes
        t: u8,
        /// Degree of parallelism
        p: u8,
        /// Exponent of the memory size in KiB
        m_enc: u8,
    },
}

/// How a profile derives keys from passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2kConfig {
    IteratedAndSalted { hash_alg: HashAlgorithm, count: u8 },
    Argon2 { t: u8, p: u8, m_enc: u8 },
}

impl Default for S2kConfig {
    fn default() -> Self {
        S2kConfig::IteratedAndSalted {
            hash_alg: HashAlgorithm::Sha256,
            count: DEFAULT_ITER_COUNT,
        }
    }
}

impl S2kConfig {
    /// Argon2 with 3 passes, 4 lanes and 64 MiB of memory.
    pub fn argon2() -> Self {
        S2kConfig::Argon2 {
            t: 3,
            p: 4,
            m_enc: 16,
        }
    }

    /// Draws fresh salt and produces a concrete specifier.
    pub fn specifier<R: Rng + CryptoRng>(&self, mut rng: R) -> StringToKey {
        match *self {
            S2kConfig::IteratedAndSalted { hash_alg, count } => {
                let mut salt = [0u8; 8];
                rng.fill(&mut salt);
                StringToKey::IteratedAndSalted {
                    hash_alg,
                    salt,
                    count,
                }
            }
            S2kConfig::Argon2 { t, p, m_enc } => {
                let mut salt = [0u8; 16];
                rng.fill(&mut salt);
                StringToKey::Argon2 { salt, t, p, m_enc }
            }
        }
    }
}

impl StringToKey {
    pub fn id(&self) -> u8 {
        match self {
            StringToKey::IteratedAndSalted { .. } => 3,
            StringToKey::Argon2 { .. } => 4,
        }
    }

    pub fn write_len(&self) -> usize {
        match self {
            StringToKey::IteratedAndSalted { .. } => 1 + 1 + 8 + 1,
            StringToKey::Argon2 { .. } => 1 + 16 + 3,
        }
    }

    pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.id()])?;
        match self {
            StringToKey::IteratedAndSalted {
                hash_alg,
                salt,
                count,
            } => {
                writer.write_all(&[(*hash_alg).into()])?;
                writer.write_all(salt)?;
                writer.write_all(&[*count])?;
            }
            StringToKey::Argon2 { salt, t, p, m_enc } => {
                writer.write_all(salt)?;
                writer.write_all(&[*t, *p, *m_enc])?;
            }
        }
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut id = [0u8; 1];
        reader.read_exact(&mut id)?;
        match id[0] {
            3 => {
                let mut buf = [0u8; 10];
                reader.read_exact(&mut buf)?;
                let mut salt = [0u8; 8];
                salt.copy_from_slice(&buf[1..9]);
                Ok(StringToKey::IteratedAndSalted {
                    hash_alg: buf[0].into(),
                    salt,
                    count: buf[9],
                })
            }
            4 => {
                let mut salt = [0u8; 16];
                reader.read_exact(&mut salt)?;
                let mut params = [0u8; 3];
                reader.read_exact(&mut params)?;
                Ok(StringToKey::Argon2 {
                    salt,
                    t: params[0],
                    p: params[1],
                    m_enc: params[2],
                })
            }
            other => unsupported_err!("S2K type {}", other),
        }
    }

    /// Derives a key of `key_size` octets from the password.
    pub fn derive_key(&self, password: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            StringToKey::IteratedAndSalted {
                hash_alg,
                salt,
                count,
            } => {
                let digest_size = hash_alg
                    .digest_size()
                    .ok_or_else(|| crate::errors::format_err!("invalid S2K hash {}", hash_alg))?;
                let count = decode_count(*count);
                debug!("iterated S2K with {} over {} octets", hash_alg, count);

                let mut data = Zeroizing::new(Vec::with_capacity(salt.len() + password.len()));
                data.extend_from_slice(salt);
                data.extend_from_slice(password);
                let total = count.max(data.len());

                let mut key = Zeroizing::new(Vec::with_capacity(key_size + digest_size));
                let rounds = key_size.div_ceil(digest_size);
                for round in 0..rounds {
                    let mut hasher = hash_alg.new_hasher()?;
                    hasher.update(&vec![0u8; round]);

                    let mut remaining = total;
                    while remaining > 0 {
                        let take = remaining.min(data.len());
                        hasher.update(&data[..take]);
                        remaining -= take;
                    }
                    key.extend_from_slice(&hasher.finalize());
                }
                key.truncate(key_size);
                Ok(key)
            }
            StringToKey::Argon2 { salt, t, p, m_enc } => {
                ensure!(*m_enc >= 3 && *m_enc < 32, "invalid argon2 memory exponent");
                debug!("argon2 S2K t={} p={} m=2^{}", t, p, m_enc);
                let params = Params::new(
                    1u32 << m_enc,
                    u32::from(*t),
                    u32::from(*p),
                    Some(key_size),
                )?;
                let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
                let mut key = Zeroizing::new(vec![0u8; key_size]);
                argon.hash_password_into(password, salt, &mut key)?;
                Ok(key)
            }
        }
    }
}

fn decode_count(c: u8) -> usize {
    (16usize + usize::from(c & 15)) << (u32::from(c >> 4) + 6)
}
