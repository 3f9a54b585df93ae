use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::errors::{invalid_packet, Result};
use crate::types::{PacketLength, Tag};

/// Represents a packet header.
///
/// Headers are always written in the new format; old format headers are accepted when parsing.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-headers>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    tag: Tag,
    length: PacketLength,
}

impl PacketHeader {
    pub fn new(tag: Tag, length: PacketLength) -> Self {
        PacketHeader { tag, length }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn length(&self) -> PacketLength {
        self.length
    }

    /// Parse a single packet header, returning `None` if the reader is exhausted.
    pub fn try_from_reader<R: Read>(mut reader: R) -> Result<Option<Self>> {
        let mut first = [0u8; 1];
        loop {
            match reader.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        let header = first[0];

        let header = match header & 0b1100_0000 {
            0b1100_0000 => {
                let tag = Tag::from(header & 0b0011_1111);
                let olen = reader.read_u8()?;
                let length = read_new_length(olen, &mut reader)?;
                PacketHeader { tag, length }
            }
            0b1000_0000 => {
                let tag = Tag::from((header >> 2) & 0b1111);
                let length = match header & 0b11 {
                    0 => PacketLength::Fixed(reader.read_u8()?.into()),
                    1 => PacketLength::Fixed(reader.read_u16::<BigEndian>()?.into()),
                    2 => PacketLength::Fixed(reader.read_u32::<BigEndian>()?),
                    _ => PacketLength::Indeterminate,
                };
                PacketHeader { tag, length }
            }
            _ => invalid_packet!("unknown packet header {:#010b}", header),
        };
        debug!("packet header {:?}", header);
        Ok(Some(header))
    }

    /// Writes a new format header with a fixed length.
    pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(0b1100_0000 | u8::from(self.tag))?;
        match self.length {
            PacketLength::Fixed(len) => write_fixed_length(writer, len)?,
            PacketLength::Partial(len) => {
                debug_assert!(len.is_power_of_two());
                writer.write_u8(224 | len.trailing_zeros() as u8)?;
            }
            PacketLength::Indeterminate => {
                invalid_packet!("indeterminate lengths can not be written")
            }
        }
        Ok(())
    }
}

/// Reads the remainder of a new format length, given its first octet.
pub(crate) fn read_new_length<R: Read>(olen: u8, reader: &mut R) -> Result<PacketLength> {
    let length = match olen {
        // One-Octet Lengths
        0..=191 => PacketLength::Fixed(olen.into()),
        // Two-Octet Lengths
        192..=223 => {
            let a = reader.read_u8()?;
            PacketLength::Fixed(((u32::from(olen) - 192) << 8) + 192 + u32::from(a))
        }
        // Partial Body Lengths
        224..=254 => PacketLength::Partial(1 << (olen & 0x1F)),
        // Five-Octet Lengths
        255 => PacketLength::Fixed(reader.read_u32::<BigEndian>()?),
    };
    Ok(length)
}

/// Writes a new format (and subpacket) length.
pub(crate) fn write_fixed_length<W: io::Write>(writer: &mut W, len: u32) -> io::Result<()> {
    if len < 192 {
        writer.write_u8(len as u8)?;
    } else if len < 8384 {
        let len = len - 192;
        writer.write_u8(((len >> 8) + 192) as u8)?;
        writer.write_u8((len & 0xFF) as u8)?;
    } else {
        writer.write_u8(255)?;
        writer.write_u32::<BigEndian>(len)?;
    }
    Ok(())
}

/// Number of octets [`write_fixed_length`] produces.
pub(crate) fn fixed_length_len(len: usize) -> usize {
    if len < 192 {
        1
    } else if len < 8384 {
        2
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_format_lengths() {
        for len in [0u32, 191, 192, 8383, 8384, 100_000] {
            let mut out = Vec::new();
            PacketHeader::new(Tag::LiteralData, PacketLength::Fixed(len))
                .to_writer(&mut out)
                .unwrap();
            assert_eq!(out.len(), 1 + fixed_length_len(len as usize));
            let parsed = PacketHeader::try_from_reader(&out[..]).unwrap().unwrap();
            assert_eq!(parsed.tag(), Tag::LiteralData);
            assert_eq!(parsed.length(), PacketLength::Fixed(len));
        }
    }

    #[test]
    fn old_format() {
        // old format, tag 2 (signature), two octet length
        let parsed = PacketHeader::try_from_reader(&[0x89, 0x01, 0x00][..])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.tag(), Tag::Signature);
        assert_eq!(parsed.length(), PacketLength::Fixed(256));

        let parsed = PacketHeader::try_from_reader(&[0xA3, 0x02][..])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.tag(), Tag::CompressedData);
        assert_eq!(parsed.length(), PacketLength::Indeterminate);
    }

    #[test]
    fn partial_and_eof() {
        let parsed = PacketHeader::try_from_reader(&[0xCB, 0xED][..])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.length(), PacketLength::Partial(1 << 13));
        assert!(PacketHeader::try_from_reader(&[][..]).unwrap().is_none());
        assert!(PacketHeader::try_from_reader(&[0x0F][..]).is_err());
    }
}
