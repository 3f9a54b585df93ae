use hkdf::Hkdf;
use rand::{CryptoRng, Rng};
use sha2::Sha512;
use x448::{PublicKey, Secret};
use zeroize::Zeroizing;

use crate::crypto::aes_kw;
use crate::errors::{format_err, Error, Result};

const INFO: &[u8] = b"OpenPGP X448";

/// Generate an X448 key pair, returning `(clamped secret, public key)`.
pub(crate) fn generate_key<R: Rng + CryptoRng>(mut rng: R) -> (Zeroizing<[u8; 56]>, [u8; 56]) {
    let mut raw = Zeroizing::new([0u8; 56]);
    rng.fill_bytes(&mut raw[..]);
    let secret = Secret::from(*raw);
    let public = *PublicKey::from(&secret).as_bytes();
    (Zeroizing::new(*secret.as_bytes()), public)
}

pub(crate) fn public_from_secret(secret: &[u8; 56]) -> [u8; 56] {
    *PublicKey::from(&Secret::from(*secret)).as_bytes()
}

/// Wraps a session key for the recipient, returning `(ephemeral public key, wrapped key)`.
pub(crate) fn encrypt<R: Rng + CryptoRng>(
    mut rng: R,
    recipient: &[u8; 56],
    session_key: &[u8],
) -> Result<([u8; 56], Vec<u8>)> {
    let their_public =
        PublicKey::from_bytes(recipient).ok_or_else(|| format_err!("invalid X448 public key"))?;

    let mut raw = Zeroizing::new([0u8; 56]);
    rng.fill_bytes(&mut raw[..]);
    let ephemeral = Secret::from(*raw);
    let ephemeral_public = *PublicKey::from(&ephemeral).as_bytes();

    // None for low order points
    let shared = ephemeral
        .as_diffie_hellman(&their_public)
        .ok_or_else(|| format_err!("X448 key agreement failed"))?;
    let kek = hkdf(&ephemeral_public, recipient, shared.as_bytes())?;
    let wrapped = aes_kw::wrap(&kek[..], session_key)?;

    Ok((ephemeral_public, wrapped))
}

/// Unwraps a session key encrypted to the key pair `(secret, public)`.
pub(crate) fn decrypt(
    secret: &[u8; 56],
    public: &[u8; 56],
    ephemeral_public: &[u8; 56],
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let their_public = PublicKey::from_bytes(ephemeral_public)
        .ok_or_else(|| format_err!("invalid X448 ephemeral key"))?;
    let shared = Secret::from(*secret)
        .as_diffie_hellman(&their_public)
        .ok_or_else(|| format_err!("X448 key agreement failed"))?;
    let kek = hkdf(ephemeral_public, public, shared.as_bytes())?;
    aes_kw::unwrap(&kek[..], wrapped)
}

/// HKDF-SHA512 over `ephemeral || recipient || shared`, producing an AES-256 key.
fn hkdf(ephemeral: &[u8; 56], recipient: &[u8; 56], shared: &[u8; 56]) -> Result<Zeroizing<[u8; 32]>> {
    let mut input = Zeroizing::new([0u8; 168]);
    input[..56].copy_from_slice(ephemeral);
    input[56..112].copy_from_slice(recipient);
    input[112..].copy_from_slice(shared);

    let hk = Hkdf::<Sha512>::new(None, &input[..]);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(INFO, &mut okm[..])
        .map_err(|_| Error::InvalidKeyLength)?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn wrap_unwrap() {
        let mut rng = ChaCha8Rng::seed_from_u64(56);
        let (secret, public) = generate_key(&mut rng);
        assert_eq!(public_from_secret(&secret), public);

        let session_key = [7u8; 32];
        let (eph, wrapped) = encrypt(&mut rng, &public, &session_key).unwrap();
        assert_eq!(wrapped.len(), session_key.len() + 8);
        let unwrapped = decrypt(&secret, &public, &eph, &wrapped).unwrap();
        assert_eq!(&unwrapped[..], &session_key[..]);

        let (other, other_public) = generate_key(&mut rng);
        assert!(decrypt(&other, &other_public, &eph, &wrapped).is_err());
    }
}
