//! # Messages
//!
//! Streaming production and consumption of OpenPGP messages: literal data, optionally
//! signed, compressed and encrypted, with the parts routed to the channels of a
//! [`Destination`](crate::split::Destination).

use chrono::{DateTime, Utc};

use crate::armor::{self, BlockType};
use crate::errors::{Error, Result};
use crate::packet::{read_body, DataMode, LiteralHeader, PacketHeader};
use crate::session_key::{KeyPackets, SessionKey};
use crate::types::{Encoding, KeyId};
use crate::verify::VerificationResult;

mod reader;
mod writer;

pub use self::reader::{DecryptingReader, MessageReader, VerifyingReader};
pub use self::writer::{EncryptingWriter, MessageWriter, SigningWriter};

pub(crate) use self::reader::{parse_signatures, DecryptionKeys, ReadPlan};
pub(crate) use self::writer::{EncryptionPlan, SignerKey, WritePlan};

/// Metadata stored in the literal data packet next to the plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiteralMetadata {
    pub file_name: String,
    pub modification_time: Option<DateTime<Utc>>,
    /// The data is UTF-8 text, signatures are made in text mode.
    pub is_utf8: bool,
}

impl LiteralMetadata {
    pub fn new(file_name: impl Into<String>, is_utf8: bool) -> Self {
        LiteralMetadata {
            file_name: file_name.into(),
            modification_time: None,
            is_utf8,
        }
    }

    pub fn with_modification_time(mut self, time: DateTime<Utc>) -> Self {
        self.modification_time = Some(time);
        self
    }

    pub(crate) fn to_header(&self) -> LiteralHeader {
        LiteralHeader {
            mode: if self.is_utf8 {
                DataMode::Utf8
            } else {
                DataMode::Binary
            },
            file_name: self.file_name.as_bytes().to_vec(),
            created: self.modification_time,
        }
    }

    pub(crate) fn from_header(header: &LiteralHeader) -> Self {
        LiteralMetadata {
            file_name: String::from_utf8_lossy(&header.file_name).into_owned(),
            modification_time: header.created,
            is_utf8: matches!(header.mode, DataMode::Utf8 | DataMode::Text),
        }
    }
}

/// Plaintext recovered from a message, with the verification of its signatures.
#[derive(Debug, Clone)]
pub struct VerifiedData {
    pub data: Vec<u8>,
    pub metadata: LiteralMetadata,
    pub result: VerificationResult,
    /// Only set when the handle was asked to retrieve it.
    pub session_key: Option<SessionKey>,
}

impl VerifiedData {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The data as text, fails if it is not UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.data).map_err(|_| Error::InvalidUtf8)
    }
}

/// An encrypted message, kept as its key packets and data packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgpMessage {
    key_packets: Vec<u8>,
    data_packets: Vec<u8>,
    detached_signature: Option<Vec<u8>>,
    armor_checksum: bool,
}

impl PgpMessage {
    pub(crate) fn new(
        key_packets: Vec<u8>,
        data_packets: Vec<u8>,
        detached_signature: Option<Vec<u8>>,
        armor_checksum: bool,
    ) -> Self {
        PgpMessage {
            key_packets,
            data_packets,
            detached_signature,
            armor_checksum,
        }
    }

    /// Splits a binary message after its session key packets.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let split = key_packets_len(bytes)?;
        Ok(PgpMessage {
            key_packets: bytes[..split].to_vec(),
            data_packets: bytes[split..].to_vec(),
            detached_signature: None,
            armor_checksum: true,
        })
    }

    pub fn from_armor(input: &str) -> Result<Self> {
        let (typ, bytes) = armor::parse(input.as_bytes())?;
        if typ != BlockType::Message {
            return Err(Error::InvalidArmor {
                message: format!("expected a message, found {}", typ),
            });
        }
        Self::from_bytes(&bytes)
    }

    pub fn key_packets(&self) -> &[u8] {
        &self.key_packets
    }

    pub fn data_packets(&self) -> &[u8] {
        &self.data_packets
    }

    /// The encrypted detached signature, a message of its own.
    pub fn detached_signature(&self) -> Option<&[u8]> {
        self.detached_signature.as_deref()
    }

    pub fn with_detached_signature(mut self, signature: Vec<u8>) -> Self {
        self.detached_signature = Some(signature);
        self
    }

    /// Key ids of the recipients, hidden recipients are skipped.
    pub fn encryption_key_ids(&self) -> Result<Vec<KeyId>> {
        let packets = KeyPackets::from_bytes(&self.key_packets)?;
        Ok(packets
            .pkesks
            .iter()
            .filter_map(|pkesk| pkesk.recipient_key_id())
            .collect())
    }

    /// Key packets followed by data packets.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key_packets.len() + self.data_packets.len());
        out.extend_from_slice(&self.key_packets);
        out.extend_from_slice(&self.data_packets);
        out
    }

    pub fn armor(&self) -> Result<String> {
        let mut out = Vec::new();
        armor::write(&self.to_bytes(), BlockType::Message, &mut out, self.armor_checksum)?;
        String::from_utf8(out).map_err(|_| Error::InvalidUtf8)
    }

    pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>> {
        match encoding {
            Encoding::Bytes => Ok(self.to_bytes()),
            Encoding::Armor => Ok(self.armor()?.into_bytes()),
        }
    }
}

/// Length of the leading session key packets of `bytes`.
fn key_packets_len(bytes: &[u8]) -> Result<usize> {
    let mut rest = bytes;
    loop {
        let before = rest.len();
        let Some(header) = PacketHeader::try_from_reader(&mut rest)? else {
            return Ok(bytes.len());
        };
        if !header.tag().is_session_key_packet() {
            return Ok(bytes.len() - before);
        }
        let (_, after) = read_body(header, rest)?;
        rest = after;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::timestamp;

    #[test]
    fn metadata_header_roundtrip() {
        let meta = LiteralMetadata::new("notes.txt", true)
            .with_modification_time(timestamp::from_wire(1_650_000_000));
        let header = meta.to_header();
        assert_eq!(header.mode, DataMode::Utf8);
        assert_eq!(LiteralMetadata::from_header(&header), meta);

        let binary = LiteralMetadata::default().to_header();
        assert_eq!(binary.mode, DataMode::Binary);
        assert!(binary.created.is_none());
    }

    #[test]
    fn message_without_key_packets() {
        // a marker packet followed by nothing else
        let bytes = [0xCA, 0x03, b'P', b'G', b'P'];
        let message = PgpMessage::from_bytes(&bytes).unwrap();
        assert!(message.key_packets().is_empty());
        assert_eq!(message.data_packets(), &bytes);
        assert!(message.encryption_key_ids().unwrap().is_empty());
    }
}
