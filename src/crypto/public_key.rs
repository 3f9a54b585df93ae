use num_enum::{FromPrimitive, IntoPrimitive};

/// Public key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive, derive_more::Display)]
#[repr(u8)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt and Sign)
    #[display("RSA")]
    RSA = 1,
    #[display("RSA (encrypt only)")]
    RSAEncrypt = 2,
    #[display("RSA (sign only)")]
    RSASign = 3,
    #[display("Elgamal")]
    ElgamalEncrypt = 16,
    #[display("DSA")]
    DSA = 17,
    #[display("ECDH")]
    ECDH = 18,
    #[display("ECDSA")]
    ECDSA = 19,
    #[display("EdDSA (legacy)")]
    EdDSALegacy = 22,
    #[display("X25519")]
    X25519 = 25,
    #[display("X448")]
    X448 = 26,
    #[display("Ed25519")]
    Ed25519 = 27,
    #[display("Ed448")]
    Ed448 = 28,

    #[num_enum(catch_all)]
    #[display("Unknown({_0})")]
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    pub fn can_sign(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA
                | PublicKeyAlgorithm::RSASign
                | PublicKeyAlgorithm::DSA
                | PublicKeyAlgorithm::ECDSA
                | PublicKeyAlgorithm::EdDSALegacy
                | PublicKeyAlgorithm::Ed25519
                | PublicKeyAlgorithm::Ed448
        )
    }

    pub fn can_encrypt(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA
                | PublicKeyAlgorithm::RSAEncrypt
                | PublicKeyAlgorithm::ElgamalEncrypt
                | PublicKeyAlgorithm::ECDH
                | PublicKeyAlgorithm::X25519
                | PublicKeyAlgorithm::X448
        )
    }
}
