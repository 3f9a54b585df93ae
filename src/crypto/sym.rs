use aes::{Aes128, Aes192, Aes256};
use cfb_mode::{
    cipher::{AsyncStreamCipher, KeyIvInit},
    BufDecryptor, BufEncryptor, Decryptor, Encryptor,
};
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::errors::{unsupported_err, Error, Result};

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetric-key-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    #[display("Plaintext")]
    Plaintext = 0,
    #[display("IDEA")]
    IDEA = 1,
    #[display("3DES")]
    TripleDES = 2,
    #[display("CAST5")]
    CAST5 = 3,
    #[display("Blowfish")]
    Blowfish = 4,
    /// AES with 128-bit key
    #[display("AES128")]
    AES128 = 7,
    /// AES with 192-bit key
    #[display("AES192")]
    AES192 = 8,
    /// AES with 256-bit key
    #[display("AES256")]
    AES256 = 9,
    #[display("Twofish")]
    Twofish = 10,

    #[num_enum(catch_all)]
    #[display("Unknown({_0})")]
    Other(u8),
}

impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES256
    }
}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA
            | SymmetricKeyAlgorithm::TripleDES
            | SymmetricKeyAlgorithm::CAST5
            | SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128
            | SymmetricKeyAlgorithm::AES192
            | SymmetricKeyAlgorithm::AES256
            | SymmetricKeyAlgorithm::Twofish => 16,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of a key in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA | SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::Blowfish => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 | SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(
            self,
            SymmetricKeyAlgorithm::AES128
                | SymmetricKeyAlgorithm::AES192
                | SymmetricKeyAlgorithm::AES256
        )
    }

    /// Generate a new session key.
    pub fn new_session_key<R: Rng + CryptoRng>(self, mut rng: R) -> Zeroizing<Vec<u8>> {
        let mut session_key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut session_key);
        session_key
    }

    /// Encrypt the data in place using regular CFB mode.
    pub fn encrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        match self {
            SymmetricKeyAlgorithm::AES128 => {
                Encryptor::<Aes128>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength)?
                    .encrypt(data);
            }
            SymmetricKeyAlgorithm::AES192 => {
                Encryptor::<Aes192>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength)?
                    .encrypt(data);
            }
            SymmetricKeyAlgorithm::AES256 => {
                Encryptor::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength)?
                    .encrypt(data);
            }
            _ => unsupported_err!("symmetric algorithm {}", self),
        }
        Ok(())
    }

    /// Decrypt the data in place using regular CFB mode.
    pub fn decrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        match self {
            SymmetricKeyAlgorithm::AES128 => {
                Decryptor::<Aes128>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength)?
                    .decrypt(data);
            }
            SymmetricKeyAlgorithm::AES192 => {
                Decryptor::<Aes192>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength)?
                    .decrypt(data);
            }
            SymmetricKeyAlgorithm::AES256 => {
                Decryptor::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength)?
                    .decrypt(data);
            }
            _ => unsupported_err!("symmetric algorithm {}", self),
        }
        Ok(())
    }
}

/// Incremental CFB encryption, as used by version 1 encrypted data packets.
pub(crate) enum CfbEncryptor {
    Aes128(BufEncryptor<Aes128>),
    Aes192(BufEncryptor<Aes192>),
    Aes256(BufEncryptor<Aes256>),
}

impl CfbEncryptor {
    pub fn new(alg: SymmetricKeyAlgorithm, key: &[u8], iv: &[u8]) -> Result<Self> {
        let enc = match alg {
            SymmetricKeyAlgorithm::AES128 => Self::Aes128(
                BufEncryptor::new_from_slices(key, iv).map_err(|_| Error::InvalidKeyLength)?,
            ),
            SymmetricKeyAlgorithm::AES192 => Self::Aes192(
                BufEncryptor::new_from_slices(key, iv).map_err(|_| Error::InvalidKeyLength)?,
            ),
            SymmetricKeyAlgorithm::AES256 => Self::Aes256(
                BufEncryptor::new_from_slices(key, iv).map_err(|_| Error::InvalidKeyLength)?,
            ),
            _ => unsupported_err!("symmetric algorithm {}", alg),
        };
        Ok(enc)
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(mode) => mode.encrypt(data),
            Self::Aes192(mode) => mode.encrypt(data),
            Self::Aes256(mode) => mode.encrypt(data),
        }
    }
}

/// Incremental CFB decryption.
pub(crate) enum CfbDecryptor {
    Aes128(BufDecryptor<Aes128>),
    Aes192(BufDecryptor<Aes192>),
    Aes256(BufDecryptor<Aes256>),
}

impl CfbDecryptor {
    pub fn new(alg: SymmetricKeyAlgorithm, key: &[u8], iv: &[u8]) -> Result<Self> {
        let dec = match alg {
            SymmetricKeyAlgorithm::AES128 => Self::Aes128(
                BufDecryptor::new_from_slices(key, iv).map_err(|_| Error::InvalidKeyLength)?,
            ),
            SymmetricKeyAlgorithm::AES192 => Self::Aes192(
                BufDecryptor::new_from_slices(key, iv).map_err(|_| Error::InvalidKeyLength)?,
            ),
            SymmetricKeyAlgorithm::AES256 => Self::Aes256(
                BufDecryptor::new_from_slices(key, iv).map_err(|_| Error::InvalidKeyLength)?,
            ),
            _ => unsupported_err!("symmetric algorithm {}", alg),
        };
        Ok(dec)
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(mode) => mode.decrypt(data),
            Self::Aes192(mode) => mode.decrypt(data),
            Self::Aes256(mode) => mode.decrypt(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn buffered_cfb_matches_one_shot() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let key = SymmetricKeyAlgorithm::AES256.new_session_key(&mut rng);
        let iv = [0u8; 16];
        let plaintext: Vec<u8> = (0..100u8).collect();

        let mut one_shot = plaintext.clone();
        SymmetricKeyAlgorithm::AES256
            .encrypt_with_iv_regular(&key, &iv, &mut one_shot)
            .unwrap();

        let mut chunked = plaintext.clone();
        let mut enc = CfbEncryptor::new(SymmetricKeyAlgorithm::AES256, &key, &iv).unwrap();
        for chunk in chunked.chunks_mut(7) {
            enc.encrypt(chunk);
        }
        assert_eq!(one_shot, chunked);

        let mut dec = CfbDecryptor::new(SymmetricKeyAlgorithm::AES256, &key, &iv).unwrap();
        for chunk in chunked.chunks_mut(13) {
            dec.decrypt(chunk);
        }
        assert_eq!(chunked, plaintext);
    }

    #[test]
    fn unsupported_cipher() {
        let mut data = [0u8; 8];
        assert!(SymmetricKeyAlgorithm::CAST5
            .encrypt_with_iv_regular(&[0; 16], &[0; 8], &mut data)
            .is_err());
    }
}
