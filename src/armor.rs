//! # Armor module
//!
//! ASCII Armor as specified in RFC 9580, streaming in both directions.

use std::fmt;

mod reader;
mod writer;

pub use self::reader::{parse, Dearmor};
pub use self::writer::{write, ArmorWriter};

/// Armor block types.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BlockType {
    PublicKey,
    PrivateKey,
    Message,
    Signature,
    /// Cleartext Framework message
    CleartextMessage,
}

impl BlockType {
    fn from_label(label: &str) -> Option<Self> {
        let typ = match label {
            "PGP PUBLIC KEY BLOCK" => BlockType::PublicKey,
            "PGP PRIVATE KEY BLOCK" => BlockType::PrivateKey,
            "PGP MESSAGE" => BlockType::Message,
            "PGP SIGNATURE" => BlockType::Signature,
            "PGP SIGNED MESSAGE" => BlockType::CleartextMessage,
            _ => return None,
        };
        Some(typ)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::PublicKey => f.write_str("PGP PUBLIC KEY BLOCK"),
            BlockType::PrivateKey => f.write_str("PGP PRIVATE KEY BLOCK"),
            BlockType::Message => f.write_str("PGP MESSAGE"),
            BlockType::Signature => f.write_str("PGP SIGNATURE"),
            BlockType::CleartextMessage => f.write_str("PGP SIGNED MESSAGE"),
        }
    }
}

/// CRC24 over the raw octets, as carried in the optional checksum line.
pub(crate) fn crc24(data: &[u8]) -> u32 {
    use std::hash::Hasher;

    let mut hasher = crc24::Crc24Hasher::new();
    hasher.write(data);
    hasher.finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        for typ in [
            BlockType::PublicKey,
            BlockType::PrivateKey,
            BlockType::Message,
            BlockType::Signature,
            BlockType::CleartextMessage,
        ] {
            assert_eq!(BlockType::from_label(&typ.to_string()), Some(typ));
        }
        assert_eq!(BlockType::from_label("PGP ARMORED FILE"), None);
    }
}
