use std::io::{self, BufRead, BufReader, Read};

use log::debug;

use crate::armor::Dearmor;
use crate::errors::{format_err, invalid_packet, unsupported_err, Error, Result};
use crate::key::PrivateKey;
use crate::message::{LiteralMetadata, VerifiedData};
use crate::packet::{
    read_body, CompressionReader, LiteralHeader, Packet, PacketBodyReader, PacketHeader,
    PacketParser, SeipdReader, Signature, SignatureHasher,
};
use crate::session_key::{KeyPackets, SessionKey};
use crate::split::Inputs;
use crate::types::{Encoding, Password, Tag};
use crate::util::Utf8Checker;
use crate::verify::{VerificationPolicy, VerificationResult};

/// Secrets able to unlock an encrypted message.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecryptionKeys<'a> {
    pub keys: &'a [PrivateKey],
    pub passwords: &'a [Password],
    pub session_keys: &'a [SessionKey],
}

/// How a [`MessageReader`] opens and checks a message.
pub(crate) struct ReadPlan<'a> {
    /// `None` reads plain signed messages, encrypted ones are rejected.
    pub decryption: Option<DecryptionKeys<'a>>,
    pub policy: VerificationPolicy<'a>,
    pub encoding: Encoding,
    pub utf8: bool,
    pub retrieve_session_key: bool,
}

/// A stage of the input pipeline. Nested stages are kept so they can be read to their end.
enum ReadLayer<'a> {
    Source(Box<dyn BufRead + 'a>),
    Encrypted(BufReader<SeipdReader<PacketBodyReader<Box<ReadLayer<'a>>>>>),
    Compressed(BufReader<CompressionReader<PacketBodyReader<Box<ReadLayer<'a>>>>>),
}

impl ReadLayer<'_> {
    /// Reads every stage to its end, which runs the integrity check of encrypted data.
    fn close(self) -> Result<()> {
        match self {
            ReadLayer::Source(_) => Ok(()),
            ReadLayer::Encrypted(mut reader) => {
                io::copy(&mut reader, &mut io::sink())?;
                let mut body = reader.into_inner().into_inner();
                body.drain()?;
                (*body.into_inner()).close()
            }
            ReadLayer::Compressed(mut reader) => {
                io::copy(&mut reader, &mut io::sink())?;
                let mut body = reader.into_inner().into_inner();
                body.drain()?;
                (*body.into_inner()).close()
            }
        }
    }
}

impl Read for ReadLayer<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReadLayer::Source(r) => r.read(buf),
            ReadLayer::Encrypted(r) => r.read(buf),
            ReadLayer::Compressed(r) => r.read(buf),
        }
    }
}

impl BufRead for ReadLayer<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            ReadLayer::Source(r) => r.fill_buf(),
            ReadLayer::Encrypted(r) => r.fill_buf(),
            ReadLayer::Compressed(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            ReadLayer::Source(r) => r.consume(amt),
            ReadLayer::Encrypted(r) => r.consume(amt),
            ReadLayer::Compressed(r) => r.consume(amt),
        }
    }
}

/// Signatures waiting for the data they cover.
#[derive(Default)]
struct Hashers {
    /// Announced by one-pass signature packets, in packet order.
    one_pass: Vec<SignatureHasher>,
    /// Signatures preceding the data, and detached signatures.
    complete: Vec<(Signature, SignatureHasher)>,
}

impl Hashers {
    fn update(&mut self, data: &[u8]) {
        for hasher in &mut self.one_pass {
            hasher.update(data);
        }
        for (_, hasher) in &mut self.complete {
            hasher.update(data);
        }
    }

    fn push_signature(&mut self, signature: Signature) -> Result<()> {
        let hasher = signature.config.data_hasher()?;
        self.complete.push((signature, hasher));
        Ok(())
    }
}

/// Streams the plaintext of a message, verifying its signatures once the end is reached.
///
/// Reading to the end runs the integrity check of encrypted data, a failed check is
/// reported as an error of the final `read` call.
pub struct MessageReader<'a> {
    body: Option<PacketBodyReader<Box<ReadLayer<'a>>>>,
    metadata: LiteralMetadata,
    hashers: Hashers,
    utf8: Option<Utf8Checker>,
    policy: VerificationPolicy<'a>,
    session_key: Option<SessionKey>,
    result: Option<VerificationResult>,
}

/// Reader returned by decryption handles.
pub type DecryptingReader<'a> = MessageReader<'a>;
/// Reader returned by verify handles.
pub type VerifyingReader<'a> = MessageReader<'a>;

impl<'a> MessageReader<'a> {
    pub(crate) fn new(inputs: Inputs<'a>, plan: ReadPlan<'a>) -> Result<Self> {
        let Inputs {
            main,
            keys,
            signature,
        } = inputs;
        let main = decode(main, plan.encoding);
        let stream: Box<dyn Read + 'a> = match keys {
            Some(keys) => Box::new(decode(keys, plan.encoding).chain(main)),
            None => main,
        };
        let source: Box<dyn BufRead + 'a> = Box::new(BufReader::new(stream));

        let (layer, first, session_key) = open(source, plan.decryption.as_ref(), None, false)?;
        let mut hashers = Hashers::default();

        if let Some(signature) = signature {
            let signature: Box<dyn BufRead + 'a> =
                Box::new(BufReader::new(decode(signature, plan.encoding)));
            for sig in read_detached(signature, plan.decryption.as_ref(), session_key.as_ref())? {
                hashers.push_signature(sig)?;
            }
        }

        let (header, body) = open_literal(layer, first, &mut hashers)?;
        let metadata = LiteralMetadata::from_header(&header);
        debug!(
            "reading literal data {:?}, {} one-pass signatures",
            metadata.file_name,
            hashers.one_pass.len()
        );

        Ok(MessageReader {
            body: Some(body),
            metadata,
            hashers,
            utf8: plan.utf8.then(Utf8Checker::new),
            policy: plan.policy,
            session_key: session_key.filter(|_| plan.retrieve_session_key),
            result: None,
        })
    }

    pub fn metadata(&self) -> &LiteralMetadata {
        &self.metadata
    }

    /// The session key of an encrypted message, if retrieval was requested.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// The verification of all signatures, available once the data was read to the end.
    pub fn verify_signature(&self) -> Result<VerificationResult> {
        self.result
            .clone()
            .ok_or_else(|| format_err!("the message must be read to the end before verifying"))
    }

    /// Reads and discards the rest of the data, then returns the verification.
    pub fn finish(mut self) -> Result<VerificationResult> {
        io::copy(&mut self, &mut io::sink())?;
        self.verify_signature()
    }

    /// Reads all data and verifies the signatures.
    pub fn read_all(mut self) -> Result<VerifiedData> {
        let mut data = Vec::new();
        self.read_to_end(&mut data)?;
        let result = self.verify_signature()?;
        Ok(VerifiedData {
            data,
            metadata: self.metadata,
            result,
            session_key: self.session_key,
        })
    }

    /// Runs at the end of the literal data: trailing signatures, integrity, verification.
    fn complete(&mut self, mut body: PacketBodyReader<Box<ReadLayer<'a>>>) -> Result<()> {
        body.drain()?;
        let mut layer = *body.into_inner();

        let mut trailing = Vec::new();
        while let Some(header) = PacketHeader::try_from_reader(&mut layer)? {
            let (raw, _) = read_body(header, &mut layer)?;
            match Packet::from_body(header.tag(), &raw)? {
                Packet::Signature(signature) => trailing.push(signature),
                Packet::Ignored(_) => {}
                _ => invalid_packet!("unexpected {:?} packet after literal data", header.tag()),
            }
        }
        layer.close()?;
        if let Some(checker) = &self.utf8 {
            checker.finish()?;
        }

        let Hashers {
            mut one_pass,
            complete,
        } = std::mem::take(&mut self.hashers);
        if trailing.len() != one_pass.len() {
            invalid_packet!(
                "{} one-pass signatures but {} signatures",
                one_pass.len(),
                trailing.len()
            );
        }

        let mut outcomes = Vec::with_capacity(complete.len() + trailing.len());
        // one-pass signatures nest, the last announced one is the first to follow the data
        for signature in trailing {
            let Some(hasher) = one_pass.pop() else {
                break;
            };
            outcomes.push(self.policy.evaluate(signature, hasher));
        }
        for (signature, hasher) in complete {
            outcomes.push(self.policy.evaluate(signature, hasher));
        }
        self.result = Some(VerificationResult::new(outcomes));
        Ok(())
    }
}

impl Read for MessageReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(body) = self.body.as_mut() else {
            return Ok(0);
        };
        let n = body.read(buf)?;
        if n > 0 {
            self.hashers.update(&buf[..n]);
            if let Some(checker) = &mut self.utf8 {
                checker.update(&buf[..n])?;
            }
            return Ok(n);
        }
        if let Some(body) = self.body.take() {
            self.complete(body)?;
        }
        Ok(0)
    }
}

fn decode<'a>(input: Box<dyn Read + 'a>, encoding: Encoding) -> Box<dyn Read + 'a> {
    match encoding {
        Encoding::Bytes => input,
        Encoding::Armor => Box::new(Dearmor::new(BufReader::new(input))),
    }
}

/// Reads the key packets and sets up decryption.
///
/// Returns the plaintext packet stream, the header of its first packet if it was already
/// read, and the session key of encrypted messages. With `decryption` set, unencrypted
/// input is only accepted if `allow_plain` is.
fn open<'a>(
    source: Box<dyn BufRead + 'a>,
    decryption: Option<&DecryptionKeys<'_>>,
    known_session_key: Option<&SessionKey>,
    allow_plain: bool,
) -> Result<(ReadLayer<'a>, Option<PacketHeader>, Option<SessionKey>)> {
    let mut parser = PacketParser::new(source);
    let (key_packets, first) = KeyPackets::read(&mut parser)?;
    let source = parser
        .into_inner()
        .ok_or_else(|| format_err!("packet stream ended unexpectedly"))?;
    let Some(first) = first else {
        invalid_packet!("message without data packets");
    };

    match first.tag() {
        Tag::SymEncryptedProtectedData => {
            let Some(decryption) = decryption else {
                return Err(Error::NoDecryptionKey);
            };
            let session_key = match known_session_key {
                Some(key) if key_packets.is_empty() => key.clone(),
                _ => key_packets.decrypt(
                    decryption.keys,
                    decryption.passwords,
                    decryption.session_keys,
                )?,
            };
            let body = PacketBodyReader::new(first, Box::new(ReadLayer::Source(source)));
            let seipd = SeipdReader::new(body, session_key.as_bytes(), session_key.algorithm())?;
            debug!("decrypting {:?}", seipd.header());
            Ok((
                ReadLayer::Encrypted(BufReader::new(seipd)),
                None,
                Some(session_key),
            ))
        }
        Tag::SymEncryptedData => unsupported_err!("encrypted data without integrity protection"),
        tag => {
            if !key_packets.is_empty() {
                invalid_packet!("session key packets followed by {:?}", tag);
            }
            if decryption.is_some() && !allow_plain {
                return Err(Error::Message {
                    message: "message is not encrypted".to_string(),
                });
            }
            Ok((ReadLayer::Source(source), Some(first), None))
        }
    }
}

/// Walks one-pass signatures, leading signatures and compression up to the literal data.
fn open_literal<'a>(
    mut layer: ReadLayer<'a>,
    mut next: Option<PacketHeader>,
    hashers: &mut Hashers,
) -> Result<(LiteralHeader, PacketBodyReader<Box<ReadLayer<'a>>>)> {
    loop {
        let header = match next.take() {
            Some(header) => header,
            None => match PacketHeader::try_from_reader(&mut layer)? {
                Some(header) => header,
                None => invalid_packet!("message without literal data"),
            },
        };
        match header.tag() {
            Tag::LiteralData => {
                let mut body = PacketBodyReader::new(header, Box::new(layer));
                let literal = LiteralHeader::from_reader(&mut body)?;
                return Ok((literal, body));
            }
            Tag::CompressedData => {
                let body = PacketBodyReader::new(header, Box::new(layer));
                layer = ReadLayer::Compressed(BufReader::new(CompressionReader::new(body)?));
            }
            Tag::OnePassSignature | Tag::Signature | Tag::Marker | Tag::Padding => {
                let (raw, _) = read_body(header, &mut layer)?;
                match Packet::from_body(header.tag(), &raw)? {
                    Packet::OnePassSignature(ops) => {
                        let hasher = SignatureHasher::new(ops.hash_algorithm, ops.typ, ops.salt())?;
                        hashers.one_pass.push(hasher);
                    }
                    Packet::Signature(signature) => hashers.push_signature(signature)?,
                    _ => {}
                }
            }
            tag => invalid_packet!("unexpected {:?} packet in message", tag),
        }
    }
}

/// Reads a detached signature, plain or encrypted like the message it belongs to.
fn read_detached<'a>(
    source: Box<dyn BufRead + 'a>,
    decryption: Option<&DecryptionKeys<'_>>,
    session_key: Option<&SessionKey>,
) -> Result<Vec<Signature>> {
    let (mut layer, mut next, _) = open(source, decryption, session_key, true)?;
    let mut signatures = Vec::new();
    loop {
        let header = match next.take() {
            Some(header) => header,
            None => match PacketHeader::try_from_reader(&mut layer)? {
                Some(header) => header,
                None => break,
            },
        };
        let (raw, _) = read_body(header, &mut layer)?;
        match Packet::from_body(header.tag(), &raw)? {
            Packet::Signature(signature) => signatures.push(signature),
            Packet::Ignored(_) => {}
            _ => invalid_packet!("unexpected {:?} packet in detached signature", header.tag()),
        }
    }
    layer.close()?;
    debug!("read {} detached signatures", signatures.len());
    Ok(signatures)
}

/// Parses plain signature packets, used by detached verification.
pub(crate) fn parse_signatures<R: BufRead>(input: R) -> Result<Vec<Signature>> {
    let mut signatures = Vec::new();
    for packet in PacketParser::new(input) {
        match packet? {
            Packet::Signature(signature) => signatures.push(signature),
            Packet::Ignored(_) => {}
            other => invalid_packet!("expected signature packets, found {:?}", other),
        }
    }
    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::key::{generate, PublicKey};
    use crate::message::{EncryptionPlan, MessageWriter, SignerKey, WritePlan};
    use crate::profile::{resolve, AlgorithmProfile, SecurityLevel, CRYPTO_REFRESH, DEFAULT};
    use crate::split::{Destination, Source, SplitReader, SplitWriter};
    use crate::types::timestamp;
    use crate::verify::{SignatureStatus, VerifyTime};

    fn key(rng: &mut ChaCha8Rng, profile: &AlgorithmProfile, name: &str) -> PrivateKey {
        generate(
            rng,
            profile,
            &[format!("{name} <{name}@example.org>")],
            timestamp::from_wire(1_700_000_000),
            None,
        )
        .unwrap()
    }

    fn write<'a>(
        rng: &mut ChaCha8Rng,
        destination: impl Destination<'a>,
        plan: WritePlan<'_>,
        data: &[u8],
    ) {
        let mut writer = MessageWriter::new(rng, destination.into_channels(), plan).unwrap();
        writer.write_all(data).unwrap();
        writer.close().unwrap();
    }

    fn read_plan<'a>(decryption: Option<DecryptionKeys<'a>>, keys: &'a [PublicKey]) -> ReadPlan<'a> {
        ReadPlan {
            decryption,
            policy: VerificationPolicy {
                keys,
                time: VerifyTime::Disabled,
                context: None,
            },
            encoding: Encoding::Bytes,
            utf8: false,
            retrieve_session_key: true,
        }
    }

    #[test]
    fn inline_signatures_in_signer_order() {
        let _ = pretty_env_logger::try_init();
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let alice = key(&mut rng, &profile, "alice");
        let bob = key(&mut rng, &profile, "bob");
        let signers = vec![
            SignerKey::new(&alice, None).unwrap(),
            SignerKey::new(&bob, None).unwrap(),
        ];
        let metadata = LiteralMetadata::new("data.bin", false);

        let mut out = Vec::new();
        let plan = WritePlan {
            profile: &profile,
            encryption: None,
            signers: &signers,
            context: None,
            detached: false,
            metadata: &metadata,
            signing_time: timestamp::from_wire(1_700_000_100),
            encoding: Encoding::Armor,
        };
        write(&mut rng, &mut out, plan, b"signed twice");

        let keys = vec![alice.public_key().clone(), bob.public_key().clone()];
        let mut plan = read_plan(None, &keys);
        plan.encoding = Encoding::Armor;
        let reader = MessageReader::new((&out[..]).into_inputs(), plan).unwrap();
        assert_eq!(reader.metadata(), &metadata);
        assert!(reader.verify_signature().is_err());

        let verified = reader.read_all().unwrap();
        assert_eq!(verified.bytes(), b"signed twice");
        assert_eq!(verified.result.status(), SignatureStatus::Ok);
        let verifiers: Vec<_> = verified
            .result
            .signatures()
            .iter()
            .map(|outcome| outcome.verifier)
            .collect();
        assert_eq!(
            verifiers,
            vec![Some(signers[0].fingerprint()), Some(signers[1].fingerprint())]
        );
        assert!(verified.session_key.is_none());
    }

    #[test]
    fn encrypted_compressed_with_password() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let passwords = [Password::from("correct horse")];
        let metadata = LiteralMetadata::default();
        let data = vec![b'x'; 100_000];

        let mut out = Vec::new();
        let plan = WritePlan {
            profile: &profile,
            encryption: Some(EncryptionPlan {
                recipients: Vec::new(),
                passwords: &passwords,
                session_key: None,
                hidden: false,
                compress: true,
            }),
            signers: &[],
            context: None,
            detached: false,
            metadata: &metadata,
            signing_time: timestamp::from_wire(1_700_000_100),
            encoding: Encoding::Bytes,
        };
        write(&mut rng, &mut out, plan, &data);
        assert!(out.len() < data.len());

        let decryption = DecryptionKeys {
            keys: &[],
            passwords: &passwords,
            session_keys: &[],
        };
        let verified = MessageReader::new((&out[..]).into_inputs(), read_plan(Some(decryption), &[]))
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(verified.data, data);
        assert_eq!(verified.result.status(), SignatureStatus::NotSigned);
        let session_key = verified.session_key.unwrap();

        // the recovered session key opens the message without the password
        let decryption = DecryptionKeys {
            keys: &[],
            passwords: &[],
            session_keys: std::slice::from_ref(&session_key),
        };
        let verified = MessageReader::new((&out[..]).into_inputs(), read_plan(Some(decryption), &[]))
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(verified.data, data);
    }

    #[test]
    fn split_message_with_encrypted_detached_signature() {
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        let profile = resolve(CRYPTO_REFRESH, SecurityLevel::Standard).unwrap();
        let carol = key(&mut rng, &profile, "carol");
        let signers = vec![SignerKey::new(&carol, None).unwrap()];
        let recipient = carol.public_key().encryption_key(None).unwrap().clone();
        let metadata = LiteralMetadata::default();

        let (mut keys, mut data, mut signature) = (Vec::new(), Vec::new(), Vec::new());
        let plan = WritePlan {
            profile: &profile,
            encryption: Some(EncryptionPlan {
                recipients: vec![&recipient],
                passwords: &[],
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
        let destination = SplitWriter::key_and_data(&mut keys, &mut data).with_signature(&mut signature);
        write(&mut rng, destination, plan, b"split apart");

        // key packets never reach the data channel
        assert!(matches!(
            PacketHeader::try_from_reader(&data[..]).unwrap().map(|h| h.tag()),
            Some(Tag::SymEncryptedProtectedData)
        ));

        let private = [carol.clone()];
        let public = [carol.public_key().clone()];
        let decryption = DecryptionKeys {
            keys: &private,
            passwords: &[],
            session_keys: &[],
        };
        let source = SplitReader::key_and_data(&keys[..], &data[..]).with_signature(&signature[..]);
        let verified = MessageReader::new(source.into_inputs(), read_plan(Some(decryption), &public))
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(verified.bytes(), b"split apart");
        assert_eq!(verified.result.status(), SignatureStatus::Ok);

        // without the key channel there is nothing to decrypt with
        let decryption = DecryptionKeys {
            keys: &private,
            passwords: &[],
            session_keys: &[],
        };
        let err = MessageReader::new((&data[..]).into_inputs(), read_plan(Some(decryption), &public)).err();
        assert!(matches!(err, Some(Error::NoDecryptionKey)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut rng = ChaCha8Rng::seed_from_u64(44);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let passwords = [Password::from("pw")];
        let metadata = LiteralMetadata::default();
        let mut out = Vec::new();
        let plan = WritePlan {
            profile: &profile,
            encryption: Some(EncryptionPlan {
                recipients: Vec::new(),
                passwords: &passwords,
                session_key: None,
                hidden: false,
                compress: false,
            }),
            signers: &[],
            context: None,
            detached: false,
            metadata: &metadata,
            signing_time: timestamp::from_wire(1_700_000_100),
            encoding: Encoding::Bytes,
        };
        write(&mut rng, &mut out, plan, b"do not touch");
        let last = out.len() - 1;
        out[last] ^= 0x01;

        let decryption = DecryptionKeys {
            keys: &[],
            passwords: &passwords,
            session_keys: &[],
        };
        let result = MessageReader::new((&out[..]).into_inputs(), read_plan(Some(decryption), &[]))
            .and_then(MessageReader::read_all);
        assert!(result.is_err());
    }

    #[test]
    fn plain_message_is_not_decrypted() {
        let mut rng = ChaCha8Rng::seed_from_u64(45);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let signer = key(&mut rng, &profile, "dave");
        let signers = vec![SignerKey::new(&signer, None).unwrap()];
        let metadata = LiteralMetadata::default();
        let mut out = Vec::new();
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
        write(&mut rng, &mut out, plan, b"plain");

        let passwords = [Password::from("pw")];
        let decryption = DecryptionKeys {
            keys: &[],
            passwords: &passwords,
            session_keys: &[],
        };
        let err = MessageReader::new((&out[..]).into_inputs(), read_plan(Some(decryption), &[])).err();
        assert!(matches!(err, Some(Error::Message { .. })));
    }

    #[test]
    fn detached_signature_packets() {
        let mut rng = ChaCha8Rng::seed_from_u64(46);
        let profile = resolve(DEFAULT, SecurityLevel::Standard).unwrap();
        let signer = key(&mut rng, &profile, "erin");
        let signers = vec![SignerKey::new(&signer, None).unwrap()];
        let metadata = LiteralMetadata::default();
        let mut out = Vec::new();
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
        write(&mut rng, &mut out, plan, b"detached");

        let signatures = parse_signatures(&out[..]).unwrap();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].created(), Some(&timestamp::from_wire(1_700_000_100)));
        assert!(parse_signatures(&[0xCB, 0x01, 0x00][..]).is_err());
    }
}
