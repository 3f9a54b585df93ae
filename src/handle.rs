//! # Handles
//!
//! A [`Pgp`] value carries the selected profile and freezes validated parameters into
//! handles. Handles are immutable and may be shared between threads, every call draws
//! fresh randomness and session keys.
//!
//! ```
//! use pgp_handles::{Encoding, KeyGenerationParamsBuilder, EncryptionParamsBuilder,
//!     DecryptionParamsBuilder, Pgp};
//!
//! # fn main() -> pgp_handles::errors::Result<()> {
//! let pgp = Pgp::new();
//! let key = pgp
//!     .key_generation(KeyGenerationParamsBuilder::default().user_id("alice <alice@example.org>").build()?)?
//!     .generate_key()?;
//!
//! let encryption = pgp.encryption(
//!     EncryptionParamsBuilder::default().recipient(key.public_key().clone()).build()?,
//! )?;
//! let message = encryption.encrypt(b"hello")?;
//!
//! let decryption = pgp.decryption(DecryptionParamsBuilder::default().decryption_key(key).build()?)?;
//! let decrypted = decryption.decrypt(&message.to_bytes(), Encoding::Bytes)?;
//! assert_eq!(decrypted.bytes(), b"hello");
//! # Ok(())
//! # }
//! ```

use std::io::Write;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use log::debug;
use rand::{CryptoRng, Rng};

use crate::armor::{self, BlockType};
use crate::cleartext;
use crate::context::{SigningContext, VerificationContext};
use crate::errors::{Error, Result};
use crate::key::{generate, PrivateKey, PublicKey};
use crate::message::{
    parse_signatures, DecryptingReader, DecryptionKeys, EncryptingWriter, EncryptionPlan,
    LiteralMetadata, MessageReader, MessageWriter, PgpMessage, ReadPlan, SignerKey, SigningWriter,
    VerifiedData, VerifyingReader, WritePlan,
};
use crate::packet::PublicKeyPacket;
use crate::profile::{AlgorithmProfile, Profile, ProfileRegistry, SecurityLevel};
use crate::session_key::{write_key_packets, KeyPackets, SessionKey};
use crate::split::{Destination, Source, SplitReader, SplitWriter};
use crate::types::{timestamp, Encoding, Password};
use crate::verify::{VerificationPolicy, VerificationResult, VerifyTime};

/// Entry point: builds handles for the selected profile.
#[derive(Debug, Clone, Default)]
pub struct Pgp {
    profile: Profile,
}

impl Pgp {
    /// Uses the default profile.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: Profile) -> Self {
        debug!("using profile {}", profile.name());
        Pgp { profile }
    }

    /// Selects a profile by name, fails with [`Error::UnknownProfile`].
    pub fn from_registry(registry: &ProfileRegistry, name: &str) -> Result<Self> {
        let profile = registry.get(name).ok_or_else(|| Error::UnknownProfile {
            name: name.to_string(),
        })?;
        Ok(Self::with_profile(profile.clone()))
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn resolved(&self) -> AlgorithmProfile {
        self.profile.resolve(SecurityLevel::Standard)
    }

    pub fn encryption(&self, params: EncryptionParams) -> Result<EncryptionHandle> {
        EncryptionHandle::new(self.resolved(), params)
    }

    pub fn decryption(&self, params: DecryptionParams) -> Result<DecryptionHandle> {
        Ok(DecryptionHandle {
            profile: self.resolved(),
            params,
        })
    }

    pub fn sign(&self, params: SignParams) -> Result<SignHandle> {
        SignHandle::new(self.resolved(), params)
    }

    pub fn verify(&self, params: VerifyParams) -> Result<VerifyHandle> {
        Ok(VerifyHandle { params })
    }

    pub fn key_generation(&self, params: KeyGenerationParams) -> Result<KeyGenerationHandle> {
        Ok(KeyGenerationHandle {
            profile: self.profile.clone(),
            params,
        })
    }
}

/// Clears every key, reporting the first failure after all keys were cleared.
fn clear_keys(keys: &[PrivateKey]) -> Result<()> {
    let mut result = Ok(());
    for key in keys {
        if let Err(err) = key.clear_private_params() {
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}

fn check_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data).map_err(|_| Error::InvalidUtf8)?;
    Ok(())
}

fn resolve_signers(keys: &[PrivateKey], at: &DateTime<Utc>) -> Result<Vec<SignerKey>> {
    keys.iter().map(|key| SignerKey::new(key, Some(at))).collect()
}

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(error = "Error", validate = "Self::validate"))]
pub struct EncryptionParams {
    #[builder(default)]
    recipients: Vec<PublicKey>,
    #[builder(default)]
    passwords: Vec<Password>,
    /// Sign the message with these keys.
    #[builder(default)]
    signing_keys: Vec<PrivateKey>,
    #[builder(default, setter(strip_option))]
    signing_context: Option<SigningContext>,
    /// Use this session key instead of a random one.
    #[builder(default, setter(strip_option))]
    session_key: Option<SessionKey>,
    #[builder(default)]
    metadata: LiteralMetadata,
    /// Write the signature encrypted to the signature channel instead of inline.
    ///
    /// [`EncryptionHandle::encrypt`] provides that channel. A destination passed to
    /// [`EncryptionHandle::encrypting_writer`] needs one as well, see
    /// [`SplitWriter::with_signature`]. A plain sink is rejected with
    /// [`Error::Configuration`].
    #[builder(default)]
    detached_signature: bool,
    #[builder(default)]
    compress: bool,
    /// Write wildcard key ids instead of the recipient key ids.
    #[builder(default)]
    hidden_recipients: bool,
    /// Time for key selection and signature creation, the current time if unset.
    #[builder(default, setter(strip_option))]
    time: Option<DateTime<Utc>>,
}

impl EncryptionParamsBuilder {
    fn validate(&self) -> Result<()> {
        let recipients = self.recipients.as_ref().map_or(0, Vec::len);
        let passwords = self.passwords.as_ref().map_or(0, Vec::len);
        if recipients + passwords == 0 {
            return Err(Error::MissingRecipient);
        }
        let signers = self.signing_keys.as_ref().map_or(0, Vec::len);
        if self.detached_signature == Some(true) && signers == 0 {
            return Err(Error::Configuration {
                message: "detached signature requested without signing key".to_string(),
            });
        }
        Ok(())
    }

    pub fn recipient(&mut self, key: PublicKey) -> &mut Self {
        self.recipients.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn password<VALUE: Into<Password>>(&mut self, value: VALUE) -> &mut Self {
        self.passwords.get_or_insert_with(Vec::new).push(value.into());
        self
    }

    pub fn signing_key(&mut self, key: PrivateKey) -> &mut Self {
        self.signing_keys.get_or_insert_with(Vec::new).push(key);
        self
    }
}

/// Encrypts, and optionally signs, messages.
#[derive(Debug, Clone)]
pub struct EncryptionHandle {
    profile: AlgorithmProfile,
    params: EncryptionParams,
    recipients: Vec<PublicKeyPacket>,
    signers: Vec<SignerKey>,
}

impl EncryptionHandle {
    fn new(profile: AlgorithmProfile, params: EncryptionParams) -> Result<Self> {
        let at = params.time.unwrap_or_else(timestamp::now);
        let recipients = params
            .recipients
            .iter()
            .map(|key| key.encryption_key(Some(&at)).cloned())
            .collect::<Result<Vec<_>>>()?;
        let signers = resolve_signers(&params.signing_keys, &at)?;
        Ok(EncryptionHandle {
            profile,
            params,
            recipients,
            signers,
        })
    }

    pub fn profile(&self) -> &AlgorithmProfile {
        &self.profile
    }

    /// Encrypts `data` in memory.
    ///
    /// Key packets and data packets are kept apart, an encrypted detached signature is
    /// returned as a message of its own.
    pub fn encrypt(&self, data: impl AsRef<[u8]>) -> Result<PgpMessage> {
        let data = data.as_ref();
        if self.params.metadata.is_utf8 {
            check_utf8(data)?;
        }

        let mut keys = Vec::new();
        let mut body = Vec::new();
        let mut signature = Vec::new();
        {
            let mut destination = SplitWriter::key_and_data(&mut keys, &mut body);
            if self.params.detached_signature {
                destination = destination.with_signature(&mut signature);
            }
            let mut writer = self.encrypting_writer(destination, Encoding::Bytes)?;
            writer.write_all(data)?;
            writer.close()?;
        }

        Ok(PgpMessage::new(
            keys,
            body,
            self.params.detached_signature.then_some(signature),
            self.profile.armor_checksum(),
        ))
    }

    /// Streams an encrypted message into `destination`.
    ///
    /// Nothing is complete before [`MessageWriter::close`] is called.
    pub fn encrypting_writer<'a>(
        &self,
        destination: impl Destination<'a>,
        encoding: Encoding,
    ) -> Result<EncryptingWriter<'a>> {
        let plan = WritePlan {
            profile: &self.profile,
            encryption: Some(EncryptionPlan {
                recipients: self.recipients.iter().collect(),
                passwords: &self.params.passwords,
                session_key: self.params.session_key.as_ref(),
                hidden: self.params.hidden_recipients,
                compress: self.params.compress,
            }),
            signers: &self.signers,
            context: self.params.signing_context.as_ref(),
            detached: self.params.detached_signature,
            metadata: &self.params.metadata,
            signing_time: self.params.time.unwrap_or_else(timestamp::now),
            encoding,
        };
        MessageWriter::new(rand::thread_rng(), destination.into_channels(), plan)
    }

    /// Encrypts `session_key` to every recipient and password, without any data.
    pub fn encrypt_session_key(&self, session_key: &SessionKey) -> Result<Vec<u8>> {
        let recipients: Vec<_> = self.recipients.iter().collect();
        let mut out = Vec::new();
        write_key_packets(
            rand::thread_rng(),
            session_key,
            &recipients,
            &self.params.passwords,
            &self.profile,
            self.params.hidden_recipients,
            &mut out,
        )?;
        Ok(out)
    }

    /// Zeroes the secrets of the signing keys.
    pub fn clear_private_params(&self) -> Result<()> {
        clear_keys(&self.params.signing_keys)
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(error = "Error", validate = "Self::validate"))]
pub struct DecryptionParams {
    #[builder(default)]
    decryption_keys: Vec<PrivateKey>,
    #[builder(default)]
    passwords: Vec<Password>,
    /// Session keys tried before any key packet.
    #[builder(default)]
    session_keys: Vec<SessionKey>,
    /// Keys checking the signatures of decrypted messages.
    #[builder(default)]
    verification_keys: Vec<PublicKey>,
    #[builder(default, setter(strip_option))]
    verification_context: Option<VerificationContext>,
    #[builder(default)]
    verify_time: VerifyTime,
    /// Fail if the plaintext is not UTF-8.
    #[builder(default)]
    utf8: bool,
    #[builder(default)]
    retrieve_session_key: bool,
}

impl DecryptionParamsBuilder {
    fn validate(&self) -> Result<()> {
        let count = self.decryption_keys.as_ref().map_or(0, Vec::len)
            + self.passwords.as_ref().map_or(0, Vec::len)
            + self.session_keys.as_ref().map_or(0, Vec::len);
        if count == 0 {
            return Err(Error::Configuration {
                message: "decryption needs a key, a password or a session key".to_string(),
            });
        }
        Ok(())
    }

    pub fn decryption_key(&mut self, key: PrivateKey) -> &mut Self {
        self.decryption_keys.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn password<VALUE: Into<Password>>(&mut self, value: VALUE) -> &mut Self {
        self.passwords.get_or_insert_with(Vec::new).push(value.into());
        self
    }

    pub fn session_key(&mut self, key: SessionKey) -> &mut Self {
        self.session_keys.get_or_insert_with(Vec::new).push(key);
        self
    }

    pub fn verification_key(&mut self, key: PublicKey) -> &mut Self {
        self.verification_keys.get_or_insert_with(Vec::new).push(key);
        self
    }
}

/// Decrypts messages and verifies their signatures.
#[derive(Debug, Clone)]
pub struct DecryptionHandle {
    profile: AlgorithmProfile,
    params: DecryptionParams,
}

impl DecryptionHandle {
    pub fn profile(&self) -> &AlgorithmProfile {
        &self.profile
    }

    fn plan(&self, encoding: Encoding) -> ReadPlan<'_> {
        ReadPlan {
            decryption: Some(DecryptionKeys {
                keys: &self.params.decryption_keys,
                passwords: &self.params.passwords,
                session_keys: &self.params.session_keys,
            }),
            policy: VerificationPolicy {
                keys: &self.params.verification_keys,
                time: self.params.verify_time,
                context: self.params.verification_context.as_ref(),
            },
            encoding,
            utf8: self.params.utf8,
            retrieve_session_key: self.params.retrieve_session_key,
        }
    }

    pub fn decrypt(&self, message: &[u8], encoding: Encoding) -> Result<VerifiedData> {
        self.decrypting_reader(message, encoding)?.read_all()
    }

    /// Decrypts `message` and checks the encrypted detached `signature` against it.
    pub fn decrypt_detached(
        &self,
        message: &[u8],
        signature: &[u8],
        encoding: Encoding,
    ) -> Result<VerifiedData> {
        self.decrypting_reader(SplitReader::new(message).with_signature(signature), encoding)?
            .read_all()
    }

    /// Streams the plaintext of the message read from `source`.
    pub fn decrypting_reader<'a>(
        &'a self,
        source: impl Source<'a>,
        encoding: Encoding,
    ) -> Result<DecryptingReader<'a>> {
        MessageReader::new(source.into_inputs(), self.plan(encoding))
    }

    /// Recovers the session key from binary key packets.
    pub fn decrypt_session_key(&self, key_packets: &[u8]) -> Result<SessionKey> {
        let packets = KeyPackets::from_bytes(key_packets)?;
        if packets.is_empty() {
            return Err(Error::NoDecryptionKey);
        }
        packets.decrypt(&self.params.decryption_keys, &self.params.passwords, &[])
    }

    /// Zeroes the secrets of the decryption keys.
    pub fn clear_private_params(&self) -> Result<()> {
        clear_keys(&self.params.decryption_keys)
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(error = "Error", validate = "Self::validate"))]
pub struct SignParams {
    #[builder(default)]
    signing_keys: Vec<PrivateKey>,
    #[builder(default, setter(strip_option))]
    signing_context: Option<SigningContext>,
    /// Metadata of inline signed messages, `is_utf8` signs in text mode.
    #[builder(default)]
    metadata: LiteralMetadata,
    /// Produce only the signature instead of a signed message.
    #[builder(default)]
    detached: bool,
    /// Signature creation time, the current time if unset.
    #[builder(default, setter(strip_option))]
    signing_time: Option<DateTime<Utc>>,
}

impl SignParamsBuilder {
    fn validate(&self) -> Result<()> {
        if self.signing_keys.as_ref().map_or(true, Vec::is_empty) {
            return Err(Error::Configuration {
                message: "signing needs at least one key".to_string(),
            });
        }
        Ok(())
    }

    pub fn signing_key(&mut self, key: PrivateKey) -> &mut Self {
        self.signing_keys.get_or_insert_with(Vec::new).push(key);
        self
    }

    /// Sign in text mode, the data must be UTF-8.
    pub fn utf8(&mut self) -> &mut Self {
        self.metadata.get_or_insert_with(LiteralMetadata::default).is_utf8 = true;
        self
    }
}

/// Produces inline, detached and cleartext signatures.
#[derive(Debug, Clone)]
pub struct SignHandle {
    profile: AlgorithmProfile,
    params: SignParams,
    signers: Vec<SignerKey>,
}

impl SignHandle {
    fn new(profile: AlgorithmProfile, params: SignParams) -> Result<Self> {
        let at = params.signing_time.unwrap_or_else(timestamp::now);
        let signers = resolve_signers(&params.signing_keys, &at)?;
        Ok(SignHandle {
            profile,
            params,
            signers,
        })
    }

    pub fn profile(&self) -> &AlgorithmProfile {
        &self.profile
    }

    /// Signs `data`, returning a signed message or a detached signature.
    ///
    /// In text mode non UTF-8 data fails before anything is signed.
    pub fn sign(&self, data: &[u8], encoding: Encoding) -> Result<Vec<u8>> {
        if self.params.metadata.is_utf8 {
            check_utf8(data)?;
        }
        let mut out = Vec::new();
        {
            let mut writer = self.signing_writer(&mut out, encoding)?;
            writer.write_all(data)?;
            writer.close()?;
        }
        Ok(out)
    }

    pub fn sign_cleartext(&self, text: &str) -> Result<String> {
        cleartext::sign(
            rand::thread_rng(),
            text,
            &self.signers,
            &self.profile,
            self.params.signing_context.as_ref(),
            self.params.signing_time.unwrap_or_else(timestamp::now),
        )
    }

    /// Streams a signed message, or only the signature when detached, into `destination`.
    pub fn signing_writer<'a>(
        &self,
        destination: impl Destination<'a>,
        encoding: Encoding,
    ) -> Result<SigningWriter<'a>> {
        let plan = WritePlan {
            profile: &self.profile,
            encryption: None,
            signers: &self.signers,
            context: self.params.signing_context.as_ref(),
            detached: self.params.detached,
            metadata: &self.params.metadata,
            signing_time: self.params.signing_time.unwrap_or_else(timestamp::now),
            encoding,
        };
        MessageWriter::new(rand::thread_rng(), destination.into_channels(), plan)
    }

    pub fn clear_private_params(&self) -> Result<()> {
        clear_keys(&self.params.signing_keys)
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(error = "Error"))]
pub struct VerifyParams {
    #[builder(default)]
    verification_keys: Vec<PublicKey>,
    #[builder(default, setter(strip_option))]
    verification_context: Option<VerificationContext>,
    #[builder(default)]
    verify_time: VerifyTime,
    /// Fail if the signed data is not UTF-8.
    #[builder(default)]
    utf8: bool,
}

impl VerifyParamsBuilder {
    pub fn verification_key(&mut self, key: PublicKey) -> &mut Self {
        self.verification_keys.get_or_insert_with(Vec::new).push(key);
        self
    }
}

/// Verifies detached, inline and cleartext signatures.
#[derive(Debug, Clone)]
pub struct VerifyHandle {
    params: VerifyParams,
}

impl VerifyHandle {
    fn policy(&self) -> VerificationPolicy<'_> {
        VerificationPolicy {
            keys: &self.params.verification_keys,
            time: self.params.verify_time,
            context: self.params.verification_context.as_ref(),
        }
    }

    /// Verifies a detached `signature` over `data`.
    pub fn verify_detached(
        &self,
        data: &[u8],
        signature: &[u8],
        encoding: Encoding,
    ) -> Result<VerificationResult> {
        if self.params.utf8 {
            check_utf8(data)?;
        }
        let signatures = match encoding {
            Encoding::Bytes => parse_signatures(signature)?,
            Encoding::Armor => {
                let (typ, bytes) = armor::parse(signature)?;
                if typ != BlockType::Signature {
                    return Err(Error::InvalidArmor {
                        message: format!("expected a signature, found {}", typ),
                    });
                }
                parse_signatures(&bytes[..])?
            }
        };

        let policy = self.policy();
        let mut outcomes = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let mut hasher = signature.config.data_hasher()?;
            hasher.update(data);
            outcomes.push(policy.evaluate(signature, hasher));
        }
        Ok(VerificationResult::new(outcomes))
    }

    /// Verifies a signed message and returns its data.
    pub fn verify_inline(&self, message: &[u8], encoding: Encoding) -> Result<VerifiedData> {
        self.verifying_reader(message, encoding)?.read_all()
    }

    pub fn verify_cleartext(&self, message: &str) -> Result<VerifiedData> {
        cleartext::verify(message, &self.policy())
    }

    /// Streams the data of a signed message, verification is available at its end.
    pub fn verifying_reader<'a>(
        &'a self,
        source: impl Source<'a>,
        encoding: Encoding,
    ) -> Result<VerifyingReader<'a>> {
        let plan = ReadPlan {
            decryption: None,
            policy: self.policy(),
            encoding,
            utf8: self.params.utf8,
            retrieve_session_key: false,
        };
        MessageReader::new(source.into_inputs(), plan)
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(error = "Error", validate = "Self::validate"))]
pub struct KeyGenerationParams {
    #[builder(default)]
    user_ids: Vec<String>,
    #[builder(default)]
    security_level: SecurityLevel,
    /// Creation time of the key, the current time if unset.
    #[builder(default, setter(strip_option))]
    generation_time: Option<DateTime<Utc>>,
    /// Seconds the key is valid after creation, forever if unset.
    #[builder(default, setter(strip_option))]
    lifetime: Option<u32>,
}

impl KeyGenerationParamsBuilder {
    fn validate(&self) -> Result<()> {
        if let Some(user_ids) = &self.user_ids {
            if user_ids.iter().any(|id| id.trim().is_empty()) {
                return Err(Error::Configuration {
                    message: "empty user id".to_string(),
                });
            }
        }
        if self.lifetime == Some(Some(0)) {
            return Err(Error::Configuration {
                message: "key lifetime must not be zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn user_id<VALUE: Into<String>>(&mut self, value: VALUE) -> &mut Self {
        self.user_ids.get_or_insert_with(Vec::new).push(value.into());
        self
    }
}

/// Generates keys for the profile of the [`Pgp`] it was made from.
#[derive(Debug, Clone)]
pub struct KeyGenerationHandle {
    profile: Profile,
    params: KeyGenerationParams,
}

impl KeyGenerationHandle {
    pub fn generate_key(&self) -> Result<PrivateKey> {
        self.generate_key_with_security(self.params.security_level)
    }

    pub fn generate_key_with_security(&self, level: SecurityLevel) -> Result<PrivateKey> {
        self.generate_key_with_rng(rand::thread_rng(), level)
    }

    pub fn generate_key_with_rng<R: Rng + CryptoRng>(
        &self,
        rng: R,
        level: SecurityLevel,
    ) -> Result<PrivateKey> {
        let profile = self.profile.resolve(level);
        debug!(
            "generating {:?} key, profile {}",
            profile.key_algorithm, profile.name
        );
        generate(
            rng,
            &profile,
            &self.params.user_ids,
            self.params.generation_time.unwrap_or_else(timestamp::now),
            self.params.lifetime,
        )
    }
}
