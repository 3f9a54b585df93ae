use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Result;
use crate::types::timestamp;

/// Format of literal data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',
    Mime = b'm',

    #[num_enum(catch_all)]
    Other(u8),
}

/// The header fields of a literal data packet, preceding the data itself.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-literal-data-packet-type-id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralHeader {
    pub mode: DataMode,
    pub file_name: Vec<u8>,
    pub created: Option<DateTime<Utc>>,
}

impl LiteralHeader {
    pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let name = &self.file_name[..self.file_name.len().min(255)];
        writer.write_u8(self.mode.into())?;
        writer.write_u8(name.len() as u8)?;
        writer.write_all(name)?;
        let created = match &self.created {
            Some(created) => timestamp::to_wire(created)?,
            None => 0,
        };
        writer.write_u32::<BigEndian>(created)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mode = DataMode::from(reader.read_u8()?);
        let name_len = reader.read_u8()?;
        let mut file_name = vec![0u8; usize::from(name_len)];
        reader.read_exact(&mut file_name)?;
        let created = match reader.read_u32::<BigEndian>()? {
            0 => None,
            secs => Some(timestamp::from_wire(secs)),
        };
        Ok(LiteralHeader {
            mode,
            file_name,
            created,
        })
    }
}
