use hkdf::Hkdf;
use rand::{CryptoRng, Rng};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::aes_kw;
use crate::errors::{Error, Result};

const INFO: &[u8] = b"OpenPGP X25519";

/// Generate an X25519 key pair, returning `(secret, public key)`.
pub(crate) fn generate_key<R: Rng + CryptoRng>(mut rng: R) -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let mut raw = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut raw[..]);
    let secret = StaticSecret::from(*raw);
    let public = PublicKey::from(&secret);
    (Zeroizing::new(secret.to_bytes()), public.to_bytes())
}

pub(crate) fn public_from_secret(secret: &[u8; 32]) -> [u8; 32] {
    PublicKey::from(&StaticSecret::from(*secret)).to_bytes()
}

/// Wraps a session key for the recipient, returning `(ephemeral public key, wrapped key)`.
pub(crate) fn encrypt<R: Rng + CryptoRng>(
    mut rng: R,
    recipient: &[u8; 32],
    session_key: &[u8],
) -> Result<([u8; 32], Vec<u8>)> {
    let mut raw = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut raw[..]);
    let ephemeral = StaticSecret::from(*raw);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();

    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
    let kek = hkdf(&ephemeral_public, recipient, shared.as_bytes())?;
    let wrapped = aes_kw::wrap(&kek[..], session_key)?;

    Ok((ephemeral_public, wrapped))
}

/// Unwraps a session key encrypted to the key pair `(secret, public)`.
pub(crate) fn decrypt(
    secret: &[u8; 32],
    public: &[u8; 32],
    ephemeral_public: &[u8; 32],
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let secret = StaticSecret::from(*secret);
    let shared = secret.diffie_hellman(&PublicKey::from(*ephemeral_public));
    let kek = hkdf(ephemeral_public, public, shared.as_bytes())?;
    aes_kw::unwrap(&kek[..], wrapped)
}

/// HKDF-SHA256 over `ephemeral || recipient || shared`, producing an AES-128 key.
fn hkdf(ephemeral: &[u8; 32], recipient: &[u8; 32], shared: &[u8; 32]) -> Result<Zeroizing<[u8; 16]>> {
    let mut input = Zeroizing::new([0u8; 96]);
    input[..32].copy_from_slice(ephemeral);
    input[32..64].copy_from_slice(recipient);
    input[64..].copy_from_slice(shared);

    let hk = Hkdf::<Sha256>::new(None, &input[..]);
    let mut okm = Zeroizing::new([0u8; 16]);
    hk.expand(INFO, &mut okm[..])
        .map_err(|_| Error::InvalidKeyLength)?;
    Ok(okm)
}
