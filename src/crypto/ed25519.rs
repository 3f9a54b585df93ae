use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{ensure, Result};

const MIN_HASH_LEN_BITS: usize = 256;

/// Generate an Ed25519 key pair, returning `(secret seed, public key)`.
pub(crate) fn generate_key<R: Rng + CryptoRng>(mut rng: R) -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let mut seed = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut seed[..]);
    let signing = SigningKey::from_bytes(&seed);
    (seed, signing.verifying_key().to_bytes())
}

/// Derives the public key from a secret seed.
pub(crate) fn public_from_secret(secret: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(secret).verifying_key().to_bytes()
}

pub(crate) fn sign(secret: &[u8; 32], hash: HashAlgorithm, digest: &[u8]) -> Result<[u8; 64]> {
    check_hash(hash)?;
    let key = SigningKey::from_bytes(secret);
    Ok(key.sign(digest).to_bytes())
}

pub(crate) fn verify(
    public: &[u8; 32],
    hash: HashAlgorithm,
    digest: &[u8],
    sig: &[u8],
) -> Result<()> {
    check_hash(hash)?;
    let key = VerifyingKey::from_bytes(public)?;
    let sig: [u8; 64] = sig
        .try_into()
        .map_err(|_| crate::errors::format_err!("invalid Ed25519 signature length"))?;
    key.verify(digest, &Signature::from_bytes(&sig))?;
    Ok(())
}

fn check_hash(hash: HashAlgorithm) -> Result<()> {
    let Some(digest_size) = hash.digest_size() else {
        crate::errors::bail!("EdDSA signature: invalid hash algorithm: {:?}", hash);
    };
    ensure!(
        digest_size * 8 >= MIN_HASH_LEN_BITS,
        "EdDSA signature: hash algorithm {:?} is too weak for Ed25519",
        hash
    );
    Ok(())
}
