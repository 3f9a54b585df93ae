use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{invalid_packet, Result};
use crate::packet::{write_fixed_length, CompressionAlgorithm, KeyFlags};
use crate::types::{timestamp, Fingerprint, KeyId, KeyVersion};

/// A notation, an annotation attached to a signature.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-notation-data>
#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub struct Notation {
    pub readable: bool,
    pub name: String,
    #[debug("{}", String::from_utf8_lossy(value))]
    pub value: Vec<u8>,
}

impl Notation {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>, readable: bool) -> Self {
        Notation {
            readable,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subpacket {
    pub is_critical: bool,
    pub data: SubpacketData,
}

impl Subpacket {
    /// Construct a new regular subpacket.
    pub fn regular(data: SubpacketData) -> Self {
        Subpacket {
            is_critical: false,
            data,
        }
    }

    /// Construct a new critical subpacket.
    pub fn critical(data: SubpacketData) -> Self {
        Subpacket {
            is_critical: true,
            data,
        }
    }

    /// Whether the type of this subpacket is understood by this implementation.
    pub fn is_known(&self) -> bool {
        !matches!(self.data, SubpacketData::Other { .. })
    }
}

#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub enum SubpacketData {
    /// The time the signature was made.
    SignatureCreationTime(DateTime<Utc>),
    /// Seconds after creation at which the signature expires.
    SignatureExpirationTime(u32),
    /// Seconds after key creation at which the key expires.
    KeyExpirationTime(u32),
    PreferredSymmetricAlgorithms(Vec<SymmetricKeyAlgorithm>),
    /// The OpenPGP Key ID of the key issuing the signature.
    Issuer(KeyId),
    Notation(Notation),
    PreferredHashAlgorithms(Vec<HashAlgorithm>),
    PreferredCompressionAlgorithms(Vec<CompressionAlgorithm>),
    IsPrimary(bool),
    KeyFlags(KeyFlags),
    Features(#[debug("{:#04x}", _0)] u8),
    IssuerFingerprint(Fingerprint),
    PreferredAeadCiphersuites(Vec<(SymmetricKeyAlgorithm, AeadAlgorithm)>),
    Other {
        typ: u8,
        #[debug("{}", hex::encode(body))]
        body: Vec<u8>,
    },
}

impl SubpacketData {
    pub fn typ(&self) -> u8 {
        match self {
            SubpacketData::SignatureCreationTime(_) => 2,
            SubpacketData::SignatureExpirationTime(_) => 3,
            SubpacketData::KeyExpirationTime(_) => 9,
            SubpacketData::PreferredSymmetricAlgorithms(_) => 11,
            SubpacketData::Issuer(_) => 16,
            SubpacketData::Notation(_) => 20,
            SubpacketData::PreferredHashAlgorithms(_) => 21,
            SubpacketData::PreferredCompressionAlgorithms(_) => 22,
            SubpacketData::IsPrimary(_) => 25,
            SubpacketData::KeyFlags(_) => 27,
            SubpacketData::Features(_) => 30,
            SubpacketData::IssuerFingerprint(_) => 33,
            SubpacketData::PreferredAeadCiphersuites(_) => 39,
            SubpacketData::Other { typ, .. } => *typ,
        }
    }

    fn body(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            SubpacketData::SignatureCreationTime(time) => {
                out.write_u32::<BigEndian>(timestamp::to_wire(time)?)?;
            }
            SubpacketData::SignatureExpirationTime(secs)
            | SubpacketData::KeyExpirationTime(secs) => {
                out.write_u32::<BigEndian>(*secs)?;
            }
            SubpacketData::PreferredSymmetricAlgorithms(algs) => {
                out.extend(algs.iter().map(|alg| u8::from(*alg)));
            }
            SubpacketData::Issuer(id) => out.extend_from_slice(id.as_ref()),
            SubpacketData::Notation(notation) => {
                let flag = if notation.readable { 0x80 } else { 0 };
                out.extend_from_slice(&[flag, 0, 0, 0]);
                out.write_u16::<BigEndian>(u16::try_from(notation.name.len())?)?;
                out.write_u16::<BigEndian>(u16::try_from(notation.value.len())?)?;
                out.extend_from_slice(notation.name.as_bytes());
                out.extend_from_slice(&notation.value);
            }
            SubpacketData::PreferredHashAlgorithms(algs) => {
                out.extend(algs.iter().map(|alg| u8::from(*alg)));
            }
            SubpacketData::PreferredCompressionAlgorithms(algs) => {
                out.extend(algs.iter().map(|alg| u8::from(*alg)));
            }
            SubpacketData::IsPrimary(primary) => out.push(u8::from(*primary)),
            SubpacketData::KeyFlags(flags) => out.push(flags.bits()),
            SubpacketData::Features(features) => out.push(*features),
            SubpacketData::IssuerFingerprint(fp) => {
                out.push(fp.version().into());
                out.extend_from_slice(fp.as_bytes());
            }
            SubpacketData::PreferredAeadCiphersuites(suites) => {
                for (sym, aead) in suites {
                    out.push((*sym).into());
                    out.push((*aead).into());
                }
            }
            SubpacketData::Other { body, .. } => out.extend_from_slice(body),
        }
        Ok(out)
    }

    fn from_body(typ: u8, body: &[u8]) -> Result<Self> {
        let mut input = body;
        let data = match typ {
            2 => SubpacketData::SignatureCreationTime(timestamp::from_wire(
                input.read_u32::<BigEndian>()?,
            )),
            3 => SubpacketData::SignatureExpirationTime(input.read_u32::<BigEndian>()?),
            9 => SubpacketData::KeyExpirationTime(input.read_u32::<BigEndian>()?),
            11 => SubpacketData::PreferredSymmetricAlgorithms(
                body.iter().map(|b| (*b).into()).collect(),
            ),
            16 => SubpacketData::Issuer(KeyId::from_slice(body)?),
            20 => {
                let mut flags = [0u8; 4];
                input.read_exact(&mut flags)?;
                let name_len = usize::from(input.read_u16::<BigEndian>()?);
                let value_len = usize::from(input.read_u16::<BigEndian>()?);
                if input.len() != name_len + value_len {
                    invalid_packet!("invalid notation lengths");
                }
                let name = String::from_utf8(input[..name_len].to_vec()).map_err(|_| {
                    crate::errors::Error::InvalidPacket {
                        message: "notation name is not utf-8".to_string(),
                    }
                })?;
                SubpacketData::Notation(Notation {
                    readable: flags[0] & 0x80 != 0,
                    name,
                    value: input[name_len..].to_vec(),
                })
            }
            21 => SubpacketData::PreferredHashAlgorithms(body.iter().map(|b| (*b).into()).collect()),
            22 => SubpacketData::PreferredCompressionAlgorithms(
                body.iter().map(|b| (*b).into()).collect(),
            ),
            25 => SubpacketData::IsPrimary(input.read_u8()? != 0),
            27 => SubpacketData::KeyFlags(KeyFlags::from_bits(body.first().copied().unwrap_or(0))),
            30 => SubpacketData::Features(body.first().copied().unwrap_or(0)),
            33 => {
                let version = KeyVersion::from(input.read_u8()?);
                SubpacketData::IssuerFingerprint(Fingerprint::new(version, input)?)
            }
            39 => SubpacketData::PreferredAeadCiphersuites(
                body.chunks_exact(2)
                    .map(|pair| (pair[0].into(), pair[1].into()))
                    .collect(),
            ),
            _ => SubpacketData::Other {
                typ,
                body: body.to_vec(),
            },
        };
        Ok(data)
    }
}

/// Serializes a subpacket area, without its length prefix.
pub(crate) fn write_area(subpackets: &[Subpacket]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for subpacket in subpackets {
        let body = subpacket.data.body()?;
        let len = u32::try_from(body.len() + 1)?;
        write_fixed_length(&mut out, len)?;
        let mut typ = subpacket.data.typ();
        if subpacket.is_critical {
            typ |= 0x80;
        }
        out.push(typ);
        out.extend_from_slice(&body);
    }
    Ok(out)
}

/// Parses a subpacket area.
pub(crate) fn read_area(mut area: &[u8]) -> Result<Vec<Subpacket>> {
    let mut subpackets = Vec::new();
    while !area.is_empty() {
        let olen = area.read_u8()?;
        let len = match olen {
            0..=191 => usize::from(olen),
            192..=254 => {
                let a = area.read_u8()?;
                ((usize::from(olen) - 192) << 8) + 192 + usize::from(a)
            }
            255 => area.read_u32::<BigEndian>()? as usize,
        };
        if len == 0 || len > area.len() {
            invalid_packet!("invalid subpacket length {}", len);
        }
        let (body, rest) = area.split_at(len);
        area = rest;

        let is_critical = body[0] & 0x80 != 0;
        let typ = body[0] & 0x7F;
        let data = SubpacketData::from_body(typ, &body[1..])?;
        subpackets.push(Subpacket { is_critical, data });
    }
    Ok(subpackets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_roundtrip() {
        let subpackets = vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(timestamp::from_wire(
                1_650_000_000,
            ))),
            Subpacket::critical(SubpacketData::Notation(Notation::new(
                "context@proton.ch",
                "test",
                true,
            ))),
            Subpacket::regular(SubpacketData::Issuer(KeyId::from([1, 2, 3, 4, 5, 6, 7, 8]))),
            Subpacket::critical(SubpacketData::Other {
                typ: 101,
                body: vec![1, 2, 3],
            }),
            Subpacket::regular(SubpacketData::Notation(Notation::new(
                "long@example.org",
                vec![0x42; 400],
                false,
            ))),
        ];
        let area = write_area(&subpackets).unwrap();
        let parsed = read_area(&area).unwrap();
        assert_eq!(parsed, subpackets);
        assert!(!parsed[3].is_known());
        assert!(parsed[1].is_known());
    }

    #[test]
    fn truncated_area() {
        assert!(read_area(&[5, 2, 0]).is_err());
    }
}
