use std::io::{self, Read};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{format_err, invalid_packet, unsupported_err, Result};
use crate::packet::{PacketTrait, Serialize, SignatureConfig, SignatureType, SignatureVersion};
use crate::types::{Fingerprint, KeyId, KeyVersion, Tag};

/// Identifies the key of an upcoming signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnePassIssuer {
    /// Version 3 packets, paired with v4 signatures.
    KeyId(KeyId),
    /// Version 6 packets, paired with v6 signatures.
    Fingerprint { salt: Vec<u8>, fingerprint: Fingerprint },
}

/// One-Pass Signature Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-one-pass-signature-packet-t>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignature {
    pub typ: SignatureType,
    pub hash_algorithm: HashAlgorithm,
    pub pub_algorithm: PublicKeyAlgorithm,
    pub issuer: OnePassIssuer,
    /// Set when this is the last one-pass signature before the signed data.
    pub last: bool,
}

impl OnePassSignature {
    /// Announces the signature described by `config`, made with the key `fingerprint`.
    pub fn from_config(config: &SignatureConfig, fingerprint: &Fingerprint, last: bool) -> Result<Self> {
        let issuer = match config.version {
            SignatureVersion::V6 => OnePassIssuer::Fingerprint {
                salt: config
                    .salt
                    .clone()
                    .ok_or_else(|| format_err!("v6 signature without salt"))?,
                fingerprint: *fingerprint,
            },
            _ => OnePassIssuer::KeyId(fingerprint.key_id()),
        };
        Ok(OnePassSignature {
            typ: config.typ,
            hash_algorithm: config.hash_alg,
            pub_algorithm: config.pub_alg,
            issuer,
            last,
        })
    }

    /// Parses a `OnePassSignature` packet from the given slice.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let mut input = body;
        let version = input.read_u8()?;
        let typ = SignatureType::from(input.read_u8()?);
        let hash_algorithm = HashAlgorithm::from(input.read_u8()?);
        let pub_algorithm = PublicKeyAlgorithm::from(input.read_u8()?);
        let issuer = match version {
            3 => {
                let mut id = [0u8; 8];
                input.read_exact(&mut id)?;
                OnePassIssuer::KeyId(KeyId::from(id))
            }
            6 => {
                let salt_len = usize::from(input.read_u8()?);
                let mut salt = vec![0u8; salt_len];
                input.read_exact(&mut salt)?;
                let mut fp = [0u8; 32];
                input.read_exact(&mut fp)?;
                OnePassIssuer::Fingerprint {
                    salt,
                    fingerprint: Fingerprint::new(KeyVersion::V6, &fp)?,
                }
            }
            _ => unsupported_err!("one-pass signature version {}", version),
        };
        let last = input.read_u8()? != 0;
        if !input.is_empty() {
            invalid_packet!("trailing data in one-pass signature");
        }

        Ok(OnePassSignature {
            typ,
            hash_algorithm,
            pub_algorithm,
            issuer,
            last,
        })
    }

    /// The salt that the matching v6 signature hashes first.
    pub fn salt(&self) -> Option<&[u8]> {
        match &self.issuer {
            OnePassIssuer::Fingerprint { salt, .. } => Some(salt),
            OnePassIssuer::KeyId(_) => None,
        }
    }

    pub fn key_id(&self) -> KeyId {
        match &self.issuer {
            OnePassIssuer::KeyId(id) => *id,
            OnePassIssuer::Fingerprint { fingerprint, .. } => fingerprint.key_id(),
        }
    }
}

impl Serialize for OnePassSignature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let version = match self.issuer {
            OnePassIssuer::KeyId(_) => 3,
            OnePassIssuer::Fingerprint { .. } => 6,
        };
        writer.write_all(&[
            version,
            self.typ.into(),
            self.hash_algorithm.into(),
            self.pub_algorithm.into(),
        ])?;
        match &self.issuer {
            OnePassIssuer::KeyId(id) => writer.write_all(id.as_ref())?,
            OnePassIssuer::Fingerprint { salt, fingerprint } => {
                writer.write_u8(u8::try_from(salt.len())?)?;
                writer.write_all(salt)?;
                writer.write_all(fingerprint.as_bytes())?;
            }
        }
        writer.write_u8(u8::from(self.last))?;
        Ok(())
    }
}

impl PacketTrait for OnePassSignature {
    fn tag(&self) -> Tag {
        Tag::OnePassSignature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_and_v6_roundtrip() {
        let v3 = OnePassSignature {
            typ: SignatureType::Text,
            hash_algorithm: HashAlgorithm::Sha512,
            pub_algorithm: PublicKeyAlgorithm::Ed25519,
            issuer: OnePassIssuer::KeyId(KeyId::from([1, 2, 3, 4, 5, 6, 7, 8])),
            last: false,
        };
        let bytes = v3.to_bytes().unwrap();
        assert_eq!(bytes.len(), 13);
        assert_eq!(OnePassSignature::from_slice(&bytes).unwrap(), v3);

        let v6 = OnePassSignature {
            typ: SignatureType::Binary,
            hash_algorithm: HashAlgorithm::Sha256,
            pub_algorithm: PublicKeyAlgorithm::Ed25519,
            issuer: OnePassIssuer::Fingerprint {
                salt: vec![9; 16],
                fingerprint: Fingerprint::V6([7; 32]),
            },
            last: true,
        };
        let bytes = v6.to_bytes().unwrap();
        let parsed = OnePassSignature::from_slice(&bytes).unwrap();
        assert_eq!(parsed.salt(), Some(&[9u8; 16][..]));
        assert_eq!(parsed, v6);
    }
}
