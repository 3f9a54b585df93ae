use rand::{CryptoRng, Rng};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{ensure, unsupported_err, Result};

const MIN_BITS: usize = 2048;

/// Public components `(n, e)`.
pub(crate) struct PublicComponents {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
}

/// Secret components in OpenPGP order `(d, p, q, u)` with `p < q` and `u = p^-1 mod q`.
pub(crate) struct SecretComponents {
    pub d: Zeroizing<Vec<u8>>,
    pub p: Zeroizing<Vec<u8>>,
    pub q: Zeroizing<Vec<u8>>,
    pub u: Zeroizing<Vec<u8>>,
}

/// Generate an RSA key pair.
pub(crate) fn generate_key<R: Rng + CryptoRng>(
    mut rng: R,
    bit_size: usize,
) -> Result<(PublicComponents, SecretComponents)> {
    ensure!(
        bit_size >= MIN_BITS,
        "RSA keys with less than {} bits are considered insecure",
        MIN_BITS
    );
    let key = RsaPrivateKey::new(&mut rng, bit_size)?;

    let mut primes = key.primes().to_vec();
    primes.sort();
    let p = &primes[0];
    let q = &primes[1];
    // q is prime, so p^(q-2) is the inverse of p modulo q
    let u = p.modpow(&(q - &BigUint::from(2u32)), q);

    Ok((
        PublicComponents {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
        },
        SecretComponents {
            d: key.d().to_bytes_be().into(),
            p: p.to_bytes_be().into(),
            q: q.to_bytes_be().into(),
            u: u.to_bytes_be().into(),
        },
    ))
}

pub(crate) fn private_key(public: &PublicComponents, secret: &SecretComponents) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_components(
        BigUint::from_bytes_be(&public.n),
        BigUint::from_bytes_be(&public.e),
        BigUint::from_bytes_be(&secret.d),
        vec![
            BigUint::from_bytes_be(&secret.p),
            BigUint::from_bytes_be(&secret.q),
        ],
    )?;
    Ok(key)
}

/// RSA encryption using PKCS1v15 padding.
pub(crate) fn encrypt<R: CryptoRng + Rng>(
    mut rng: R,
    public: &PublicComponents,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(&public.n),
        BigUint::from_bytes_be(&public.e),
    )?;
    let data = key.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)?;
    Ok(data)
}

/// RSA decryption using PKCS1v15 padding.
pub(crate) fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let m = key.decrypt(Pkcs1v15Encrypt, ciphertext)?;
    Ok(m.into())
}

fn scheme(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    let scheme = match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        _ => unsupported_err!("RSA signatures with {}", hash),
    };
    Ok(scheme)
}

/// Sign using RSA, with PKCS1v15 padding.
pub(crate) fn sign(key: &RsaPrivateKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
    let sig = key.sign(scheme(hash)?, digest)?;
    Ok(sig)
}

/// Verify a RSA, PKCS1v15 padded signature.
pub(crate) fn verify(
    public: &PublicComponents,
    hash: HashAlgorithm,
    digest: &[u8],
    sig: &[u8],
) -> Result<()> {
    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(&public.n),
        BigUint::from_bytes_be(&public.e),
    )?;
    // leading zeros are stripped from the MPI, the verifier expects the full modulus length
    let mut padded = vec![0u8; key.size().saturating_sub(sig.len())];
    padded.extend_from_slice(sig);
    key.verify(scheme(hash)?, digest, &padded)?;
    Ok(())
}
