use std::io::{self, Write};

use chrono::{DateTime, Utc};
use log::debug;
use rand::{CryptoRng, Rng};

use crate::armor::BlockType;
use crate::context::SigningContext;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{format_err, Error, Result};
use crate::key::PrivateKey;
use crate::message::LiteralMetadata;
use crate::packet::{
    CompressedWriter, OnePassSignature, PacketTrait, PartialBodyWriter, PublicKeyPacket,
    SeipdWriter, Signature, SignatureConfig, SignatureHasher, SignatureType,
};
use crate::profile::AlgorithmProfile;
use crate::session_key::{write_key_packets, SessionKey};
use crate::split::{ChannelWriter, Channels};
use crate::types::{Encoding, Fingerprint, Password, Tag};
use crate::util::Utf8Checker;

/// A signing key, resolved to the component that makes the signatures.
#[derive(Debug, Clone)]
pub(crate) struct SignerKey {
    key: PrivateKey,
    packet: PublicKeyPacket,
}

impl SignerKey {
    /// Picks the signing component valid at `at`. Fails on cleared keys.
    pub fn new(key: &PrivateKey, at: Option<&DateTime<Utc>>) -> Result<Self> {
        let packet = key.public_key().signing_key(at)?.clone();
        let fingerprint = packet.fingerprint();
        key.with_secret(|material| {
            material
                .find(&fingerprint)
                .map(|_| ())
                .ok_or_else(|| format_err!("no secret key material for {}", fingerprint))
        })?;
        Ok(SignerKey {
            key: key.clone(),
            packet,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.packet.fingerprint()
    }

    /// A signature config carrying the context notations, if any.
    pub fn config<R: Rng + CryptoRng>(
        &self,
        rng: R,
        typ: SignatureType,
        hash_alg: HashAlgorithm,
        created: DateTime<Utc>,
        context: Option<&SigningContext>,
    ) -> Result<SignatureConfig> {
        let mut config = SignatureConfig::from_key(rng, &self.packet, typ, hash_alg, created)?;
        if let Some(context) = context {
            config.hashed_subpackets.extend(context.notations());
        }
        Ok(config)
    }

    pub fn sign(&self, config: SignatureConfig, hasher: SignatureHasher) -> Result<Signature> {
        let fingerprint = self.fingerprint();
        self.key.with_secret(|material| {
            let secret = material
                .find(&fingerprint)
                .ok_or_else(|| format_err!("no secret key material for {}", fingerprint))?;
            config.sign(secret, hasher)
        })
    }
}

/// Encryption settings of a message.
pub(crate) struct EncryptionPlan<'p> {
    pub recipients: Vec<&'p PublicKeyPacket>,
    pub passwords: &'p [Password],
    pub session_key: Option<&'p SessionKey>,
    pub hidden: bool,
    pub compress: bool,
}

/// Everything a [`MessageWriter`] produces, fixed before the first byte is written.
pub(crate) struct WritePlan<'p> {
    pub profile: &'p AlgorithmProfile,
    pub encryption: Option<EncryptionPlan<'p>>,
    pub signers: &'p [SignerKey],
    pub context: Option<&'p SigningContext>,
    pub detached: bool,
    pub metadata: &'p LiteralMetadata,
    pub signing_time: DateTime<Utc>,
    pub encoding: Encoding,
}

/// A stage of the output pipeline that writes a trailer when closed.
trait WriteLayer: Write {
    fn close(self: Box<Self>) -> io::Result<()>;
}

type Layer<'a> = Box<dyn WriteLayer + 'a>;

impl WriteLayer for ChannelWriter<'_> {
    fn close(self: Box<Self>) -> io::Result<()> {
        (*self).finish()
    }
}

impl<'a> WriteLayer for SeipdWriter<Layer<'a>> {
    fn close(self: Box<Self>) -> io::Result<()> {
        (*self).finish()?.close()
    }
}

impl<'a> WriteLayer for CompressedWriter<Layer<'a>> {
    fn close(self: Box<Self>) -> io::Result<()> {
        (*self).finish()?.close()
    }
}

struct PendingSignature {
    signer: SignerKey,
    config: SignatureConfig,
    hasher: SignatureHasher,
}

enum Body<'a> {
    Literal(PartialBodyWriter<Layer<'a>>),
    /// Detached signing without encryption: the data is only hashed.
    HashOnly,
}

/// Streams plaintext into a signed and/or encrypted message.
///
/// Nothing is complete until [`MessageWriter::close`] was called: it finishes the
/// channels in the order key packets, data, detached signature.
pub struct MessageWriter<'a> {
    body: Body<'a>,
    keys: Option<ChannelWriter<'a>>,
    detached: Option<Layer<'a>>,
    pending: Vec<PendingSignature>,
    utf8: Option<Utf8Checker>,
    closed: bool,
}

/// Writer returned by encryption handles.
pub type EncryptingWriter<'a> = MessageWriter<'a>;
/// Writer returned by sign handles.
pub type SigningWriter<'a> = MessageWriter<'a>;

impl<'a> MessageWriter<'a> {
    pub(crate) fn new<R: Rng + CryptoRng>(
        mut rng: R,
        channels: Channels<'a>,
        plan: WritePlan<'_>,
    ) -> Result<Self> {
        let Channels {
            main,
            keys,
            signature,
        } = channels;
        let profile = plan.profile;
        let armor = |typ: BlockType| match plan.encoding {
            Encoding::Armor => Some((typ, profile.armor_checksum())),
            Encoding::Bytes => None,
        };

        if plan.detached && plan.signers.is_empty() {
            return Err(Error::Configuration {
                message: "detached signature requested without signing key".to_string(),
            });
        }
        if plan.detached && plan.encryption.is_some() && signature.is_none() {
            return Err(Error::Configuration {
                message: "encrypted detached signatures need a signature channel".to_string(),
            });
        }

        // all signature configs are made up front, a bad key fails before any output
        let typ = if plan.metadata.is_utf8 {
            SignatureType::Text
        } else {
            SignatureType::Binary
        };
        let mut pending = Vec::with_capacity(plan.signers.len());
        for signer in plan.signers {
            let config = signer.config(
                &mut rng,
                typ,
                profile.signing_hash,
                plan.signing_time,
                plan.context,
            )?;
            let hasher = config.data_hasher()?;
            pending.push(PendingSignature {
                signer: signer.clone(),
                config,
                hasher,
            });
        }

        let mut keys_channel = None;
        let mut detached = None;
        let top: Option<Layer<'a>> = match &plan.encryption {
            Some(encryption) => {
                let session_key = match encryption.session_key {
                    Some(key) => key.clone(),
                    None => SessionKey::generate(&mut rng, profile.cipher),
                };
                let sym_alg = session_key.algorithm_or(profile.cipher)?;
                let mut key_packets = Vec::new();
                write_key_packets(
                    &mut rng,
                    &session_key,
                    &encryption.recipients,
                    encryption.passwords,
                    profile,
                    encryption.hidden,
                    &mut key_packets,
                )?;

                let mut main = ChannelWriter::new(main, armor(BlockType::Message))?;
                match keys {
                    Some(keys) => {
                        let mut keys = ChannelWriter::new(keys, armor(BlockType::Message))?;
                        keys.write_all(&key_packets)?;
                        keys_channel = Some(keys);
                    }
                    None => main.write_all(&key_packets)?,
                }

                if plan.detached {
                    if let Some(signature) = signature {
                        let mut channel = ChannelWriter::new(signature, armor(BlockType::Message))?;
                        channel.write_all(&key_packets)?;
                        detached = Some(encrypt_layer(
                            &mut rng,
                            profile,
                            sym_alg,
                            &session_key,
                            Box::new(channel),
                        )?);
                    }
                }

                let mut top = encrypt_layer(&mut rng, profile, sym_alg, &session_key, Box::new(main))?;
                if encryption.compress {
                    debug!("compressing with {:?}", profile.compression);
                    top = Box::new(CompressedWriter::new(
                        profile.compression,
                        profile.compression_level,
                        top,
                    )?);
                }
                Some(top)
            }
            None if plan.detached => {
                let target = signature.unwrap_or(main);
                detached = Some(Box::new(ChannelWriter::new(
                    target,
                    armor(BlockType::Signature),
                )?));
                None
            }
            None => Some(Box::new(ChannelWriter::new(main, armor(BlockType::Message))?)),
        };

        let body = match top {
            Some(mut top) => {
                if !plan.detached {
                    for (i, pending) in pending.iter().enumerate().rev() {
                        OnePassSignature::from_config(
                            &pending.config,
                            &pending.signer.fingerprint(),
                            i == 0,
                        )?
                        .to_writer_with_header(&mut top)?;
                    }
                }
                let mut literal = PartialBodyWriter::new(Tag::LiteralData, top)?;
                plan.metadata.to_header().to_writer(&mut literal)?;
                Body::Literal(literal)
            }
            None => Body::HashOnly,
        };

        Ok(MessageWriter {
            body,
            keys: keys_channel,
            detached,
            pending,
            utf8: plan.metadata.is_utf8.then(Utf8Checker::new),
            closed: false,
        })
    }

    /// Writes the signatures and finishes every channel.
    ///
    /// Fails with [`Error::AlreadyClosed`] on a second call.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        self.closed = true;
        if let Some(checker) = &self.utf8 {
            checker.finish()?;
        }

        let signatures = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|pending| pending.signer.sign(pending.config, pending.hasher))
            .collect::<Result<Vec<_>>>()?;

        if let Some(keys) = self.keys.take() {
            keys.finish()?;
        }

        if let Body::Literal(literal) = std::mem::replace(&mut self.body, Body::HashOnly) {
            let mut top = literal.finish()?;
            if self.detached.is_none() {
                for signature in &signatures {
                    signature.to_writer_with_header(&mut top)?;
                }
            }
            top.close()?;
        }

        if let Some(mut target) = self.detached.take() {
            for signature in &signatures {
                signature.to_writer_with_header(&mut target)?;
            }
            target.close()?;
        }
        debug!("message closed with {} signatures", signatures.len());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Write for MessageWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(Error::AlreadyClosed.into());
        }
        if let Some(checker) = &mut self.utf8 {
            checker.update(buf)?;
        }
        if let Body::Literal(literal) = &mut self.body {
            literal.write_all(buf)?;
        }
        for pending in &mut self.pending {
            pending.hasher.update(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.body {
            Body::Literal(literal) => literal.flush(),
            Body::HashOnly => Ok(()),
        }
    }
}

/// SEIPD v2 when the profile configures data AEAD, v1 otherwise.
fn encrypt_layer<'a, R: Rng + CryptoRng>(
    rng: R,
    profile: &AlgorithmProfile,
    sym_alg: SymmetricKeyAlgorithm,
    session_key: &SessionKey,
    inner: Layer<'a>,
) -> Result<Layer<'a>> {
    let writer = match profile.data_aead {
        Some(aead) => SeipdWriter::v2(rng, sym_alg, aead, session_key.as_bytes(), inner)?,
        None => SeipdWriter::v1(rng, sym_alg, session_key.as_bytes(), inner)?,
    };
    Ok(Box::new(writer))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::key::generate;
    use crate::packet::{Packet, PacketParser};
    use crate::profile::{resolve, SecurityLevel, DEFAULT};
    use crate::split::Destination;
    use crate::types::timestamp;

    fn signer(rng: &mut ChaCha8Rng, profile: &AlgorithmProfile) -> SignerKey {
        let key = generate(
            rng,
            profile,
            &["bob <bob@example.org>".to_string()],
            timestamp::from_wire(1_700_000_000),
            None,
        )
        .unwrap();
        SignerKey::new(&key, None).unwrap()
    }

    #[test]
    fn inline_signed_packet_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let signers = vec![signer(&mut rng, &profile), signer(&mut rng, &profile)];
        let metadata = LiteralMetadata::default();

        let mut out = Vec::new();
        {
            let plan = WritePlan {
                profile: &profile,
                encryption: None,
                signers: &signers,
                context: None,
                detached: false,
                metadata: &metadata,
                signing_time: timestamp::from_wire(1_700_000_100),
                encoding: Encoding::Bytes,
            };
            let mut writer = MessageWriter::new(&mut rng, (&mut out).into_channels(), plan).unwrap();
            writer.write_all(b"hello").unwrap();
            writer.close().unwrap();
            assert!(matches!(writer.close(), Err(Error::AlreadyClosed)));
            assert!(writer.write(b"more").is_err());
        }

        // OPS packets are parsed, the literal packet is kept opaque
        let packets: Vec<_> = PacketParser::new(&out[..]).collect::<Result<_>>().unwrap();
        assert_eq!(packets.len(), 5);
        match (&packets[0], &packets[1]) {
            (Packet::OnePassSignature(first), Packet::OnePassSignature(second)) => {
                assert_eq!(first.key_id(), signers[1].fingerprint().key_id());
                assert!(!first.last);
                assert_eq!(second.key_id(), signers[0].fingerprint().key_id());
                assert!(second.last);
            }
            other => panic!("unexpected packets {:?}", other),
        }
        assert!(matches!(packets[2], Packet::Other { tag: Tag::LiteralData, .. }));
        match (&packets[3], &packets[4]) {
            (Packet::Signature(first), Packet::Signature(second)) => {
                assert!(first.is_issued_by(&signers[0].packet));
                assert!(second.is_issued_by(&signers[1].packet));
            }
            other => panic!("unexpected packets {:?}", other),
        }
    }

    #[test]
    fn encrypted_detached_needs_channel() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let signers = vec![signer(&mut rng, &profile)];
        let metadata = LiteralMetadata::default();
        let passwords = [Password::from("pw")];
        let plan = WritePlan {
            profile: &profile,
            encryption: Some(EncryptionPlan {
                recipients: Vec::new(),
                passwords: &passwords,
                session_key: None,
                hidden: false,
                compress: false,
            }),
            signers: &signers,
            context: None,
            detached: true,
            metadata: &metadata,
            signing_time: timestamp::from_wire(1_700_000_100),
            encoding: Encoding::Bytes,
        };
        let mut out = Vec::new();
        let err = MessageWriter::new(&mut rng, (&mut out).into_channels(), plan).err();
        assert!(matches!(err, Some(Error::Configuration { .. })));
        assert!(out.is_empty());
    }

    #[test]
    fn utf8_text_is_checked() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let signers = vec![signer(&mut rng, &profile)];
        let metadata = LiteralMetadata::new("", true);
        let plan = WritePlan {
            profile: &profile,
            encryption: None,
            signers: &signers,
            context: None,
            detached: true,
            metadata: &metadata,
            signing_time: timestamp::from_wire(1_700_000_100),
            encoding: Encoding::Bytes,
        };
        let mut out = Vec::new();
        let mut writer = MessageWriter::new(&mut rng, (&mut out).into_channels(), plan).unwrap();
        let err = writer.write_all(&[0xFF, 0xFE]).unwrap_err();
        assert!(matches!(Error::from(err), Error::InvalidUtf8));
    }
}
