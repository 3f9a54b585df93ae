//! # Packet module
//!
//! Handles everything in relationship to packets: framing, streaming bodies and the
//! individual packet types this crate produces and consumes.

use std::io::{self, BufRead, Read};

use log::debug;

use crate::errors::{Error, Result};
use crate::types::{PacketLength, Tag};

mod body;
mod compressed;
mod header;
mod key;
mod literal_data;
mod one_pass_signature;
mod pkesk;
mod seipd;
mod signature;
mod skesk;
mod user_id;

pub use self::{
    body::{PacketBodyReader, PartialBodyWriter},
    compressed::{CompressedWriter, CompressionAlgorithm, CompressionReader},
    header::PacketHeader,
    key::{KeyFlags, PublicKeyPacket, PublicParams, SecretKeyPacket, SecretParams},
    literal_data::{DataMode, LiteralHeader},
    one_pass_signature::{OnePassIssuer, OnePassSignature},
    pkesk::{Pkesk, PkeskValues},
    seipd::{SeipdHeader, SeipdReader, SeipdWriter},
    signature::{
        subpacket::{Notation, Subpacket, SubpacketData},
        Signature, SignatureBytes, SignatureConfig, SignatureHasher, SignatureType,
        SignatureVersion,
    },
    skesk::Skesk,
    user_id::UserId,
};

pub(crate) use self::header::{fixed_length_len, write_fixed_length};

/// Maximum body size of packets that are parsed in memory.
const MAX_BUFFERED_PACKET: usize = 64 * 1024 * 1024;

/// Serialization of packet bodies.
pub trait Serialize {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;
        Ok(buf)
    }
}

pub trait PacketTrait: Serialize {
    fn tag(&self) -> Tag;

    /// Writes the packet including a new format header.
    fn to_writer_with_header<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let body = self.to_bytes()?;
        let len = u32::try_from(body.len())?;
        PacketHeader::new(self.tag(), PacketLength::Fixed(len)).to_writer(writer)?;
        writer.write_all(&body)?;
        Ok(())
    }
}

/// A packet that is small enough to be handled in memory.
#[derive(Debug, Clone)]
pub enum Packet {
    PublicKeyEncryptedSessionKey(Pkesk),
    SymKeyEncryptedSessionKey(Skesk),
    Signature(Signature),
    OnePassSignature(OnePassSignature),
    PublicKey(PublicKeyPacket),
    PublicSubkey(PublicKeyPacket),
    SecretKey(SecretKeyPacket),
    SecretSubkey(SecretKeyPacket),
    UserId(UserId),
    /// Marker, padding and trust packets.
    Ignored(Tag),
    Other { tag: Tag, body: Vec<u8> },
}

impl Packet {
    pub fn from_body(tag: Tag, body: &[u8]) -> Result<Self> {
        let packet = match tag {
            Tag::PublicKeyEncryptedSessionKey => {
                Packet::PublicKeyEncryptedSessionKey(Pkesk::from_slice(body)?)
            }
            Tag::SymKeyEncryptedSessionKey => {
                Packet::SymKeyEncryptedSessionKey(Skesk::from_slice(body)?)
            }
            Tag::Signature => Packet::Signature(Signature::from_slice(body)?),
            Tag::OnePassSignature => Packet::OnePassSignature(OnePassSignature::from_slice(body)?),
            Tag::PublicKey => Packet::PublicKey(PublicKeyPacket::from_slice(tag, body)?),
            Tag::PublicSubkey => Packet::PublicSubkey(PublicKeyPacket::from_slice(tag, body)?),
            Tag::SecretKey => Packet::SecretKey(SecretKeyPacket::from_slice(tag, body)?),
            Tag::SecretSubkey => Packet::SecretSubkey(SecretKeyPacket::from_slice(tag, body)?),
            Tag::UserId => Packet::UserId(UserId::from_slice(body)),
            Tag::Marker | Tag::Padding | Tag::Trust => Packet::Ignored(tag),
            _ => Packet::Other {
                tag,
                body: body.to_vec(),
            },
        };
        Ok(packet)
    }
}

/// Reads the full body of a packet into memory.
pub fn read_body<R: BufRead>(header: PacketHeader, reader: R) -> Result<(Vec<u8>, R)> {
    let mut body_reader = PacketBodyReader::new(header, reader);
    let mut body = Vec::new();
    (&mut body_reader)
        .take(MAX_BUFFERED_PACKET as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > MAX_BUFFERED_PACKET {
        return Err(Error::InvalidPacket {
            message: format!("{:?} packet too large", header.tag()),
        });
    }
    Ok((body, body_reader.into_inner()))
}

/// Iterates over in-memory packets of a stream.
pub struct PacketParser<R: BufRead> {
    reader: Option<R>,
}

impl<R: BufRead> PacketParser<R> {
    pub fn new(reader: R) -> Self {
        PacketParser {
            reader: Some(reader),
        }
    }

    /// Reads the next header without consuming the body.
    pub fn next_header(&mut self) -> Result<Option<PacketHeader>> {
        match self.reader.as_mut() {
            Some(reader) => PacketHeader::try_from_reader(reader),
            None => Ok(None),
        }
    }

    /// Reads the body for a header returned from [`Self::next_header`].
    pub fn read_packet(&mut self, header: PacketHeader) -> Result<Packet> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| crate::errors::format_err!("parser exhausted"))?;
        let (body, reader) = read_body(header, reader)?;
        self.reader = Some(reader);
        Packet::from_body(header.tag(), &body)
    }

    pub fn into_inner(self) -> Option<R> {
        self.reader
    }
}

impl<R: BufRead> Iterator for PacketParser<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.next_header() {
            Ok(Some(header)) => header,
            Ok(None) => return None,
            Err(err) => {
                self.reader = None;
                return Some(Err(err));
            }
        };
        let packet = self.read_packet(header);
        if let Ok(packet) = &packet {
            debug!("parsed {:?}", packet_tag(packet));
        }
        Some(packet)
    }
}

fn packet_tag(packet: &Packet) -> Tag {
    match packet {
        Packet::PublicKeyEncryptedSessionKey(_) => Tag::PublicKeyEncryptedSessionKey,
        Packet::SymKeyEncryptedSessionKey(_) => Tag::SymKeyEncryptedSessionKey,
        Packet::Signature(_) => Tag::Signature,
        Packet::OnePassSignature(_) => Tag::OnePassSignature,
        Packet::PublicKey(_) => Tag::PublicKey,
        Packet::PublicSubkey(_) => Tag::PublicSubkey,
        Packet::SecretKey(_) => Tag::SecretKey,
        Packet::SecretSubkey(_) => Tag::SecretSubkey,
        Packet::UserId(_) => Tag::UserId,
        Packet::Ignored(tag) | Packet::Other { tag, .. } => *tag,
    }
}
