use std::fmt;

use crate::errors::{invalid_packet, Result};
use crate::types::{KeyId, KeyVersion};

/// Represents a Fingerprint.
///
/// Version 4 keys use SHA-1 fingerprints, version 6 keys SHA-256 fingerprints.
#[derive(Clone, Copy, Eq, PartialEq, Hash, derive_more::Debug)]
pub enum Fingerprint {
    #[debug("{}", hex::encode(_0))]
    V4([u8; 20]),
    #[debug("{}", hex::encode(_0))]
    V6([u8; 32]),
}

impl Fingerprint {
    pub fn new(version: KeyVersion, fp: &[u8]) -> Result<Self> {
        let fp = match (version, fp.len()) {
            (KeyVersion::V4, 20) => {
                let mut raw = [0u8; 20];
                raw.copy_from_slice(fp);
                Fingerprint::V4(raw)
            }
            (KeyVersion::V6, 32) => {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(fp);
                Fingerprint::V6(raw)
            }
            (version, len) => {
                invalid_packet!("invalid fingerprint length {} for {:?}", len, version)
            }
        };

        Ok(fp)
    }

    pub fn version(&self) -> KeyVersion {
        match self {
            Self::V4(_) => KeyVersion::V4,
            Self::V6(_) => KeyVersion::V6,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V4(fp) => &fp[..],
            Self::V6(fp) => &fp[..],
        }
    }

    /// Derives the key id: the low 64 bits for v4, the high 64 bits for v6.
    pub fn key_id(&self) -> KeyId {
        let mut raw = [0u8; 8];
        match self {
            Self::V4(fp) => raw.copy_from_slice(&fp[12..]),
            Self::V6(fp) => raw.copy_from_slice(&fp[..8]),
        }
        KeyId::from(raw)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_positions() {
        let mut v4 = [0u8; 20];
        v4[12..].copy_from_slice(&[9; 8]);
        let fp = Fingerprint::new(KeyVersion::V4, &v4).unwrap();
        assert_eq!(fp.key_id(), KeyId::from([9; 8]));

        let mut v6 = [0u8; 32];
        v6[..8].copy_from_slice(&[7; 8]);
        let fp = Fingerprint::new(KeyVersion::V6, &v6).unwrap();
        assert_eq!(fp.key_id(), KeyId::from([7; 8]));

        assert!(Fingerprint::new(KeyVersion::V6, &v4).is_err());
    }
}
