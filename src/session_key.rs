//! # Session keys
//!
//! The symmetric key of a message and the packets wrapping it for recipients and passwords.

use std::io::{self, BufRead, Write};

use log::{debug, warn};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, Error, Result};
use crate::key::PrivateKey;
use crate::packet::{
    Packet, PacketHeader, PacketParser, PacketTrait, Pkesk, PublicKeyPacket, Skesk,
};
use crate::profile::AlgorithmProfile;
use crate::types::Password;

/// The symmetric key encrypting the data of a message.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SessionKey {
    #[debug("..")]
    key: Zeroizing<Vec<u8>>,
    algorithm: Option<SymmetricKeyAlgorithm>,
}

impl SessionKey {
    /// Wraps raw key material.
    ///
    /// The algorithm may be unknown, as for keys recovered from v6 key packets, in which
    /// case the encrypted data packet determines it.
    pub fn new(key: &[u8], algorithm: Option<SymmetricKeyAlgorithm>) -> Result<Self> {
        if let Some(alg) = algorithm {
            ensure!(alg.is_supported(), "unsupported cipher {}", alg);
            if key.len() != alg.key_size() {
                return Err(Error::InvalidKeyLength);
            }
        }
        ensure!(!key.is_empty(), "empty session key");
        Ok(SessionKey {
            key: Zeroizing::new(key.to_vec()),
            algorithm,
        })
    }

    /// A fresh random key for `algorithm`.
    pub fn generate<R: Rng + CryptoRng>(rng: R, algorithm: SymmetricKeyAlgorithm) -> Self {
        SessionKey {
            key: algorithm.new_session_key(rng),
            algorithm: Some(algorithm),
        }
    }

    pub fn algorithm(&self) -> Option<SymmetricKeyAlgorithm> {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// The algorithm of this key, `default` if unknown. Fails if the key length does not fit.
    pub(crate) fn algorithm_or(&self, default: SymmetricKeyAlgorithm) -> Result<SymmetricKeyAlgorithm> {
        let alg = self.algorithm.unwrap_or(default);
        if self.key.len() != alg.key_size() {
            return Err(Error::InvalidKeyLength);
        }
        Ok(alg)
    }

    fn from_decrypted(algorithm: Option<SymmetricKeyAlgorithm>, key: Zeroizing<Vec<u8>>) -> Self {
        SessionKey { key, algorithm }
    }
}

/// Writes one PKESK per recipient and one SKESK per password for `session_key`.
///
/// Version 6 packets are produced when the profile encrypts data with AEAD.
pub(crate) fn write_key_packets<R, W>(
    mut rng: R,
    session_key: &SessionKey,
    recipients: &[&PublicKeyPacket],
    passwords: &[Password],
    profile: &AlgorithmProfile,
    hidden: bool,
    out: &mut W,
) -> Result<()>
where
    R: Rng + CryptoRng,
    W: Write + ?Sized,
{
    if recipients.is_empty() && passwords.is_empty() {
        return Err(Error::MissingRecipient);
    }
    let sym_alg = session_key.algorithm_or(profile.cipher)?;
    let v6 = profile.data_aead.is_some();

    for recipient in recipients {
        debug!("encrypting session key to {}", recipient.key_id());
        let pkesk = Pkesk::encrypt(&mut rng, session_key.as_bytes(), sym_alg, recipient, v6, hidden)?;
        pkesk.to_writer_with_header(&mut WriteAdapter(out))?;
    }

    for password in passwords {
        let password = password.read();
        let skesk = match (profile.key_encryption_aead, profile.data_aead) {
            (Some(key_aead), Some(_)) => Skesk::encrypt_v6(
                &mut rng,
                &password,
                session_key.as_bytes(),
                sym_alg,
                key_aead.algorithm,
                &profile.s2k,
            )?,
            _ => Skesk::encrypt_v4(
                &mut rng,
                &password,
                session_key.as_bytes(),
                sym_alg,
                &profile.s2k,
            )?,
        };
        debug!("encrypting session key with password, v6: {}", skesk.is_v6());
        skesk.to_writer_with_header(&mut WriteAdapter(out))?;
    }
    Ok(())
}

/// Lets `?Sized` writers be passed where a sized `Write` is expected.
struct WriteAdapter<'a, W: Write + ?Sized>(&'a mut W);

impl<W: Write + ?Sized> Write for WriteAdapter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Session key packets found at the start of a message.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyPackets {
    pub pkesks: Vec<Pkesk>,
    pub skesks: Vec<Skesk>,
}

impl KeyPackets {
    /// Reads key packets up to the first other packet, whose header is returned.
    pub fn read<R: BufRead>(parser: &mut PacketParser<R>) -> Result<(Self, Option<PacketHeader>)> {
        let mut packets = KeyPackets::default();
        loop {
            let Some(header) = parser.next_header()? else {
                return Ok((packets, None));
            };
            if !header.tag().is_session_key_packet() && !is_ignored(&header) {
                return Ok((packets, Some(header)));
            }
            match parser.read_packet(header)? {
                Packet::PublicKeyEncryptedSessionKey(pkesk) => packets.pkesks.push(pkesk),
                Packet::SymKeyEncryptedSessionKey(skesk) => packets.skesks.push(skesk),
                _ => {}
            }
        }
    }

    /// Parses a buffer holding only key packets.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = PacketParser::new(bytes);
        let (packets, next) = Self::read(&mut parser)?;
        if let Some(header) = next {
            return Err(Error::InvalidPacket {
                message: format!("unexpected {:?} packet among session key packets", header.tag()),
            });
        }
        Ok(packets)
    }

    pub fn is_empty(&self) -> bool {
        self.pkesks.is_empty() && self.skesks.is_empty()
    }

    /// Recovers the session key.
    ///
    /// Supplied session keys are used as is, then every PKESK is tried against the matching
    /// secret keys, then every SKESK against the passwords. The first success wins.
    pub fn decrypt(
        &self,
        keys: &[PrivateKey],
        passwords: &[Password],
        session_keys: &[SessionKey],
    ) -> Result<SessionKey> {
        if let Some(session_key) = session_keys.first() {
            debug!("using supplied session key");
            return Ok(session_key.clone());
        }

        let mut cleared = false;
        for pkesk in &self.pkesks {
            for key in keys {
                let attempt = key.with_secret(|material| {
                    for secret in material.all() {
                        if !pkesk.matches(secret.public_key()) {
                            continue;
                        }
                        match pkesk.decrypt(secret) {
                            Ok((alg, session_key)) => {
                                debug!("decrypted session key with {}", secret.public_key().key_id());
                                return Ok(Some(SessionKey::from_decrypted(alg, session_key)));
                            }
                            Err(err) => debug!(
                                "key {} failed on PKESK: {}",
                                secret.public_key().key_id(),
                                err
                            ),
                        }
                    }
                    Ok(None)
                });
                match attempt {
                    Ok(Some(session_key)) => return Ok(session_key),
                    Ok(None) => {}
                    Err(Error::PrivateParamsCleared) => {
                        warn!("skipping cleared key {}", key.fingerprint());
                        cleared = true;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        for skesk in &self.skesks {
            for password in passwords {
                match skesk.decrypt(&password.read()) {
                    Ok((alg, session_key)) => {
                        debug!("decrypted session key with password");
                        return Ok(SessionKey::from_decrypted(alg, session_key));
                    }
                    Err(err) => debug!("password failed on SKESK: {}", err),
                }
            }
        }

        if cleared {
            return Err(Error::PrivateParamsCleared);
        }
        Err(Error::NoDecryptionKey)
    }
}

fn is_ignored(header: &PacketHeader) -> bool {
    matches!(
        header.tag(),
        crate::types::Tag::Marker | crate::types::Tag::Padding
    )
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::key::generate;
    use crate::profile::{resolve, SecurityLevel, CRYPTO_REFRESH, DEFAULT};
    use crate::types::timestamp;

    fn key(rng: &mut ChaCha8Rng, profile: &AlgorithmProfile) -> PrivateKey {
        let created = timestamp::from_wire(1_700_000_000);
        generate(rng, profile, &["alice <alice@example.org>".to_string()], created, None).unwrap()
    }

    #[test]
    fn new_checks_length() {
        assert!(SessionKey::new(&[0u8; 32], Some(SymmetricKeyAlgorithm::AES256)).is_ok());
        assert!(matches!(
            SessionKey::new(&[0u8; 16], Some(SymmetricKeyAlgorithm::AES256)),
            Err(Error::InvalidKeyLength)
        ));
        assert!(SessionKey::new(&[0u8; 16], None).is_ok());
        assert!(SessionKey::new(&[], None).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = SessionKey::new(&[0xAB; 16], Some(SymmetricKeyAlgorithm::AES128)).unwrap();
        assert!(!format!("{:?}", key).contains("ab"));
    }

    #[test]
    fn pkesk_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for name in [DEFAULT, CRYPTO_REFRESH] {
            let profile = resolve(name, SecurityLevel::Standard).unwrap();
            let alice = key(&mut rng, &profile);
            let session_key = SessionKey::generate(&mut rng, profile.cipher);
            let recipient = alice.public_key().encryption_key(None).unwrap();

            let mut out = Vec::new();
            write_key_packets(&mut rng, &session_key, &[recipient], &[], &profile, false, &mut out)
                .unwrap();
            let packets = KeyPackets::from_bytes(&out).unwrap();
            assert_eq!(packets.pkesks.len(), 1);
            assert_eq!(packets.pkesks[0].is_v6(), profile.data_aead.is_some());

            let decrypted = packets.decrypt(&[alice], &[], &[]).unwrap();
            assert_eq!(decrypted.as_bytes(), session_key.as_bytes());
        }
    }

    #[test]
    fn password_and_hidden_recipient() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let alice = key(&mut rng, &profile);
        let session_key = SessionKey::generate(&mut rng, profile.cipher);
        let recipient = alice.public_key().encryption_key(None).unwrap();

        let mut out = Vec::new();
        write_key_packets(
            &mut rng,
            &session_key,
            &[recipient],
            &[Password::from("secret")],
            &profile,
            true,
            &mut out,
        )
        .unwrap();
        let packets = KeyPackets::from_bytes(&out).unwrap();
        assert!(packets.pkesks[0].is_anonymous());

        let by_password = packets.decrypt(&[], &[Password::from("secret")], &[]).unwrap();
        assert_eq!(by_password.as_bytes(), session_key.as_bytes());
        let by_key = packets.decrypt(&[alice], &[], &[]).unwrap();
        assert_eq!(by_key.as_bytes(), session_key.as_bytes());

        assert!(matches!(
            packets.decrypt(&[], &[Password::from("wrong")], &[]),
            Err(Error::NoDecryptionKey)
        ));
    }

    #[test]
    fn cleared_key_is_reported() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let alice = key(&mut rng, &profile);
        let session_key = SessionKey::generate(&mut rng, profile.cipher);
        let recipient = alice.public_key().encryption_key(None).unwrap();
        let mut out = Vec::new();
        write_key_packets(&mut rng, &session_key, &[recipient], &[], &profile, false, &mut out)
            .unwrap();

        alice.clear_private_params().unwrap();
        let packets = KeyPackets::from_bytes(&out).unwrap();
        assert!(matches!(
            packets.decrypt(&[alice], &[], &[]),
            Err(Error::PrivateParamsCleared)
        ));
    }

    #[test]
    fn missing_recipient() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let session_key = SessionKey::generate(&mut rng, profile.cipher);
        let mut out = Vec::new();
        assert!(matches!(
            write_key_packets(&mut rng, &session_key, &[], &[], &profile, false, &mut out),
            Err(Error::MissingRecipient)
        ));
    }
}
