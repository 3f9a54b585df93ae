use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{bail, ensure, format_err, Result};

const MIN_HASH_LEN_BITS: usize = 512;

pub(crate) const SIGNATURE_LEN: usize = 114;

fn signing_key(secret: &[u8; 57]) -> cx448::SigningKey {
    cx448::SigningKey::from(cx448::SecretKey::from_slice(secret))
}

/// Generate an Ed448 key pair, returning `(secret, public key)`.
pub(crate) fn generate_key<R: Rng + CryptoRng>(mut rng: R) -> (Zeroizing<[u8; 57]>, [u8; 57]) {
    let mut secret = Zeroizing::new([0u8; 57]);
    rng.fill_bytes(&mut secret[..]);
    let public = public_from_secret(&secret);
    (secret, public)
}

pub(crate) fn public_from_secret(secret: &[u8; 57]) -> [u8; 57] {
    let mut public = [0u8; 57];
    public.copy_from_slice(&signing_key(secret).verifying_key().as_bytes()[..]);
    public
}

pub(crate) fn sign(secret: &[u8; 57], hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
    check_hash(hash)?;
    let signature = signing_key(secret).sign_raw(digest);
    Ok(signature.to_bytes()[..].to_vec())
}

pub(crate) fn verify(
    public: &[u8; 57],
    hash: HashAlgorithm,
    digest: &[u8],
    sig: &[u8],
) -> Result<()> {
    check_hash(hash)?;
    let key = cx448::VerifyingKey::from_bytes(public)
        .map_err(|_| format_err!("invalid Ed448 public key"))?;
    let sig: &[u8; SIGNATURE_LEN] = sig
        .try_into()
        .map_err(|_| format_err!("invalid Ed448 signature length"))?;
    let sig = cx448::Signature::from_bytes(sig)
        .map_err(|_| format_err!("invalid Ed448 signature"))?;
    key.verify_raw(&sig, digest)
        .map_err(|_| format_err!("Ed448 signature mismatch"))
}

fn check_hash(hash: HashAlgorithm) -> Result<()> {
    let Some(digest_size) = hash.digest_size() else {
        bail!("EdDSA signature: invalid hash algorithm: {:?}", hash);
    };
    ensure!(
        digest_size * 8 >= MIN_HASH_LEN_BITS,
        "EdDSA signature: hash algorithm {:?} is too weak for Ed448",
        hash
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn sign_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(448);
        let (secret, public) = generate_key(&mut rng);
        assert_eq!(public_from_secret(&secret), public);

        let digest = HashAlgorithm::Sha512.digest(b"hello").unwrap();
        let sig = sign(&secret, HashAlgorithm::Sha512, &digest).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        verify(&public, HashAlgorithm::Sha512, &digest, &sig).unwrap();

        let other = HashAlgorithm::Sha512.digest(b"hellO").unwrap();
        assert!(verify(&public, HashAlgorithm::Sha512, &other, &sig).is_err());
        assert!(verify(&public, HashAlgorithm::Sha512, &digest, &sig[..64]).is_err());
    }

    #[test]
    fn rejects_short_hashes() {
        let mut rng = ChaCha8Rng::seed_from_u64(449);
        let (secret, _) = generate_key(&mut rng);
        let digest = HashAlgorithm::Sha256.digest(b"hello").unwrap();
        assert!(sign(&secret, HashAlgorithm::Sha256, &digest).is_err());
    }
}
