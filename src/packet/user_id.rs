use std::io;

use crate::errors::Result;
use crate::packet::{PacketTrait, Serialize};
use crate::types::Tag;

/// User ID Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-user-id-packet-type-id-13>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId {
    id: Vec<u8>,
}

impl UserId {
    pub fn new(id: &str) -> Self {
        UserId {
            id: id.as_bytes().to_vec(),
        }
    }

    pub fn from_slice(input: &[u8]) -> Self {
        UserId { id: input.to_vec() }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Lossy utf-8 rendering of the id.
    pub fn as_str_lossy(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// Feeds the certification hash prefix and the id into a hasher.
    pub(crate) fn hash_for_signature(&self, hasher: &mut dyn digest::DynDigest) -> Result<()> {
        let len = u32::try_from(self.id.len())?;
        hasher.update(&[0xB4]);
        hasher.update(&len.to_be_bytes());
        hasher.update(&self.id);
        Ok(())
    }
}

impl Serialize for UserId {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.id)?;
        Ok(())
    }
}

impl PacketTrait for UserId {
    fn tag(&self) -> Tag {
        Tag::UserId
    }
}
