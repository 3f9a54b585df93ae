use num_enum::{FromPrimitive, IntoPrimitive};

/// Packet tags.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-types>
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Tag {
    PublicKeyEncryptedSessionKey = 1,
    Signature = 2,
    SymKeyEncryptedSessionKey = 3,
    OnePassSignature = 4,
    SecretKey = 5,
    PublicKey = 6,
    SecretSubkey = 7,
    CompressedData = 8,
    SymEncryptedData = 9,
    Marker = 10,
    LiteralData = 11,
    Trust = 12,
    UserId = 13,
    PublicSubkey = 14,
    UserAttribute = 17,
    SymEncryptedProtectedData = 18,
    ModDetectionCode = 19,
    Padding = 21,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Tag {
    /// Session key packets, routed to the keys channel of a split destination.
    pub fn is_session_key_packet(self) -> bool {
        matches!(
            self,
            Tag::PublicKeyEncryptedSessionKey | Tag::SymKeyEncryptedSessionKey
        )
    }
}

/// Length of a packet body.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketLength {
    Fixed(u32),
    /// Length of the first chunk of a partial body.
    Partial(u32),
    /// Old format only: the body extends to the end of the stream.
    Indeterminate,
}

/// Key and signature packet versions we produce and accept.
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum KeyVersion {
    V4 = 4,
    V6 = 6,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for KeyVersion {
    fn default() -> Self {
        Self::V4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_version_defaults_and_unknowns() {
        assert_eq!(KeyVersion::default(), KeyVersion::V4);
        assert_eq!(KeyVersion::from(6), KeyVersion::V6);
        assert_eq!(KeyVersion::from(5), KeyVersion::Other(5));
        assert_eq!(u8::from(KeyVersion::Other(5)), 5);
    }
}
