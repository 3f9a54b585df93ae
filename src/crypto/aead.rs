use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, unsupported_err, Error, Result};

/// Available AEAD algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-aead-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AeadAlgorithm {
    None = 0,
    Eax = 1,
    Ocb = 2,
    Gcm = 3,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for AeadAlgorithm {
    fn default() -> Self {
        Self::None
    }
}

impl AeadAlgorithm {
    /// Nonce size used for this AEAD algorithm.
    pub fn nonce_size(&self) -> usize {
        match self {
            Self::Eax => 16,
            Self::Ocb => 15,
            Self::Gcm => 12,
            _ => 0,
        }
    }

    /// Size of the IV derived for chunked encryption: the nonce without the 8 octet counter.
    pub fn iv_size(&self) -> usize {
        self.nonce_size().saturating_sub(8)
    }

    /// Size of the authentication tag.
    pub fn tag_size(&self) -> usize {
        match self {
            Self::Eax | Self::Ocb | Self::Gcm => 16,
            _ => 0,
        }
    }

    pub fn encrypt(
        &self,
        sym: SymmetricKeyAlgorithm,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        msg: &[u8],
    ) -> Result<Vec<u8>> {
        self.check(nonce)?;
        let payload = Payload { msg, aad };
        let nonce = Nonce::from_slice(nonce);
        let out = match sym {
            SymmetricKeyAlgorithm::AES128 => Aes128Gcm::new_from_slice(key)
                .map_err(|_| Error::InvalidKeyLength)?
                .encrypt(nonce, payload),
            SymmetricKeyAlgorithm::AES256 => Aes256Gcm::new_from_slice(key)
                .map_err(|_| Error::InvalidKeyLength)?
                .encrypt(nonce, payload),
            _ => unsupported_err!("AEAD with {}", sym),
        };
        out.map_err(|_| Error::Aead)
    }

    /// Decrypts `ciphertext || tag`, failing on an authentication error.
    pub fn decrypt(
        &self,
        sym: SymmetricKeyAlgorithm,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.check(nonce)?;
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let nonce = Nonce::from_slice(nonce);
        let out = match sym {
            SymmetricKeyAlgorithm::AES128 => Aes128Gcm::new_from_slice(key)
                .map_err(|_| Error::InvalidKeyLength)?
                .decrypt(nonce, payload),
            SymmetricKeyAlgorithm::AES256 => Aes256Gcm::new_from_slice(key)
                .map_err(|_| Error::InvalidKeyLength)?
                .decrypt(nonce, payload),
            _ => unsupported_err!("AEAD with {}", sym),
        };
        out.map_err(|_| Error::Aead)
    }

    fn check(&self, nonce: &[u8]) -> Result<()> {
        if *self != AeadAlgorithm::Gcm {
            unsupported_err!("AEAD algorithm {:?}", self);
        }
        ensure!(
            nonce.len() == self.nonce_size(),
            "invalid nonce length {}",
            nonce.len()
        );
        Ok(())
    }
}

/// Chunked AEAD configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AeadConfig {
    pub algorithm: AeadAlgorithm,
    /// Chunk size octet `c`, the chunk length is `2^(c + 6)`.
    pub chunk_size: u8,
}

impl Default for AeadConfig {
    fn default() -> Self {
        AeadConfig {
            algorithm: AeadAlgorithm::Gcm,
            chunk_size: 12,
        }
    }
}

impl AeadConfig {
    pub fn chunk_len(&self) -> usize {
        1usize << (u32::from(self.chunk_size) + 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_roundtrip_and_tamper() {
        let key = [3u8; 32];
        let nonce = [1u8; 12];
        let ct = AeadAlgorithm::Gcm
            .encrypt(SymmetricKeyAlgorithm::AES256, &key, &nonce, b"ad", b"hello")
            .unwrap();
        assert_eq!(ct.len(), 5 + 16);

        let pt = AeadAlgorithm::Gcm
            .decrypt(SymmetricKeyAlgorithm::AES256, &key, &nonce, b"ad", &ct)
            .unwrap();
        assert_eq!(pt, b"hello");

        let err = AeadAlgorithm::Gcm
            .decrypt(SymmetricKeyAlgorithm::AES256, &key, &nonce, b"other", &ct)
            .unwrap_err();
        assert!(matches!(err, Error::Aead));
    }

    #[test]
    fn ocb_is_unsupported() {
        let res = AeadAlgorithm::Ocb.encrypt(
            SymmetricKeyAlgorithm::AES256,
            &[0; 32],
            &[0; 15],
            b"",
            b"",
        );
        assert!(matches!(res, Err(Error::Unsupported { .. })));
    }

    #[test]
    fn chunk_len() {
        assert_eq!(AeadConfig::default().chunk_len(), 1 << 18);
    }
}
