mod fingerprint;
mod key_id;
mod packet;
mod password;
pub(crate) mod timestamp;

pub use self::{
    fingerprint::Fingerprint,
    key_id::KeyId,
    packet::{KeyVersion, PacketLength, Tag},
    password::Password,
};

/// Wire representation of inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Raw binary packets.
    #[default]
    Bytes,
    /// ASCII armored packets.
    Armor,
}

/// Multiprecision integer, stored without leading zeros.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
#[debug("Mpi({})", hex::encode(&self.0))]
pub struct Mpi(Vec<u8>);

impl Mpi {
    pub fn from_slice(raw: &[u8]) -> Self {
        let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len());
        Mpi(raw[start..].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Bit length as written in the two octet MPI header.
    pub fn bit_len(&self) -> usize {
        match self.0.first() {
            Some(first) => (self.0.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
            None => 0,
        }
    }

    pub fn write_len(&self) -> usize {
        2 + self.0.len()
    }

    pub fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> crate::errors::Result<()> {
        let bits = u16::try_from(self.bit_len())?;
        writer.write_all(&bits.to_be_bytes())?;
        writer.write_all(&self.0)?;
        Ok(())
    }

    pub fn from_reader<R: std::io::Read>(reader: &mut R) -> crate::errors::Result<Self> {
        let mut len = [0u8; 2];
        reader.read_exact(&mut len)?;
        let bits = usize::from(u16::from_be_bytes(len));
        let mut raw = vec![0u8; bits.div_ceil(8)];
        reader.read_exact(&mut raw)?;
        Ok(Mpi::from_slice(&raw))
    }
}

impl From<&[u8]> for Mpi {
    fn from(value: &[u8]) -> Self {
        Mpi::from_slice(value)
    }
}
