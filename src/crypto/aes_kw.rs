//! AES key wrap, RFC 3394.

use aes::cipher::generic_array::GenericArray;
use aes::{Aes128, Aes192, Aes256};
use aes_kw::Kek;
use zeroize::Zeroizing;

use crate::errors::{ensure, Error, Result};

/// Wraps `data` with the key encryption key `kek`.
pub fn wrap(kek: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        data.len() % 8 == 0 && data.len() >= 16,
        "key wrap input must be a multiple of 8 octets"
    );
    let mut out = vec![0u8; data.len() + aes_kw::IV_LEN];
    let res = match kek.len() {
        16 => Kek::<Aes128>::new(GenericArray::from_slice(kek)).wrap(data, &mut out),
        24 => Kek::<Aes192>::new(GenericArray::from_slice(kek)).wrap(data, &mut out),
        32 => Kek::<Aes256>::new(GenericArray::from_slice(kek)).wrap(data, &mut out),
        _ => return Err(Error::InvalidKeyLength),
    };
    res.map_err(|err| Error::Message {
        message: format!("key wrap failed: {}", err),
    })?;
    Ok(out)
}

/// Unwraps `data` with the key encryption key `kek`, checking the integrity value.
pub fn unwrap(kek: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    ensure!(
        data.len() % 8 == 0 && data.len() >= 24,
        "key unwrap input must be a multiple of 8 octets"
    );
    let mut out = Zeroizing::new(vec![0u8; data.len() - aes_kw::IV_LEN]);
    let res = match kek.len() {
        16 => Kek::<Aes128>::new(GenericArray::from_slice(kek)).unwrap(data, &mut out),
        24 => Kek::<Aes192>::new(GenericArray::from_slice(kek)).unwrap(data, &mut out),
        32 => Kek::<Aes256>::new(GenericArray::from_slice(kek)).unwrap(data, &mut out),
        _ => return Err(Error::InvalidKeyLength),
    };
    res.map_err(|err| Error::Message {
        message: format!("key unwrap failed: {}", err),
    })?;
    Ok(out)
}
