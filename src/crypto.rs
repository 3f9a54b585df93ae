//! # Cryptography module
//!
//! Algorithm identifiers and thin wrappers around the RustCrypto primitives
//! used by the packet layer.

pub mod aead;
pub mod aes_kw;
pub mod hash;
pub mod public_key;
pub mod s2k;
pub mod sym;

pub(crate) mod ed25519;
pub(crate) mod ed448;
pub(crate) mod rsa;
pub(crate) mod x25519;
pub(crate) mod x448;

/// Two octet checksum used by v3/v4 session key and secret key encodings:
/// the sum of all octets modulo 65536.
pub(crate) fn simple_checksum(data: &[u8]) -> [u8; 2] {
    let sum = data
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
    sum.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps() {
        assert_eq!(simple_checksum(&[]), [0, 0]);
        assert_eq!(simple_checksum(&[0xFF, 0x01]), [0x01, 0x00]);
        // 258 * 0xFF = 65790, one wrap past u16::MAX
        assert_eq!(simple_checksum(&vec![0xFF; 258]), [0x00, 0xFE]);
    }
}
