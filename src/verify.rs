//! # Signature verification policy
//!
//! Every signature found in a message is evaluated on its own: cryptographic validity,
//! then the time policy, then the expected context. The per signature outcomes are
//! collected, in message order, into a [`VerificationResult`].

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use snafu::Snafu;

use crate::context::{VerificationContext, CONTEXT_NOTATION_NAME, CONTEXT_VERSION_NOTATION_NAME};
use crate::key::{ComponentKey, PublicKey};
use crate::packet::{Signature, SignatureHasher, SignatureType};
use crate::types::{timestamp, Fingerprint};

/// Status of a single signature, or of a whole verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SignatureStatus {
    #[display("OK")]
    Ok,
    #[display("SIGNATURE_NOT_SIGNED")]
    NotSigned,
    #[display("SIGNATURE_NO_VERIFIER")]
    NoVerifier,
    #[display("SIGNATURE_FAILED")]
    Failed,
    #[display("SIGNATURE_BAD_CONTEXT")]
    BadContext,
}

/// Why a signature did not verify. Carried as data, never returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("{status}: {message}"))]
pub struct SignatureVerificationError {
    pub status: SignatureStatus,
    pub message: String,
}

impl SignatureVerificationError {
    fn new(status: SignatureStatus, message: impl Into<String>) -> Self {
        SignatureVerificationError {
            status,
            message: message.into(),
        }
    }
}

/// The point in time signatures and keys are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyTime {
    #[default]
    Now,
    At(DateTime<Utc>),
    /// Skip all time checks.
    Disabled,
}

impl VerifyTime {
    pub(crate) fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            VerifyTime::Now => Some(timestamp::now()),
            VerifyTime::At(time) => Some(*time),
            VerifyTime::Disabled => None,
        }
    }
}

/// Evaluation of one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutcome {
    pub signature: Signature,
    pub status: SignatureStatus,
    pub error: Option<SignatureVerificationError>,
    /// The key that made the signature, if it is known.
    pub verifier: Option<Fingerprint>,
}

impl SignatureOutcome {
    /// The creation time embedded in the signature itself.
    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.signature.created().copied()
    }

    pub fn is_ok(&self) -> bool {
        self.status == SignatureStatus::Ok
    }
}

/// Outcomes of all signatures of a message, in message order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    outcomes: Vec<SignatureOutcome>,
}

impl VerificationResult {
    pub(crate) fn new(outcomes: Vec<SignatureOutcome>) -> Self {
        VerificationResult { outcomes }
    }

    /// `Ok` if any signature verified, else the status of the first signature.
    pub fn status(&self) -> SignatureStatus {
        match self.selected() {
            Some(outcome) => outcome.status,
            None => SignatureStatus::NotSigned,
        }
    }

    /// The error explaining [`Self::status`], `None` if a signature verified.
    pub fn signature_error(&self) -> Option<SignatureVerificationError> {
        match self.selected() {
            Some(outcome) => outcome.error.clone(),
            None => Some(SignatureVerificationError::new(
                SignatureStatus::NotSigned,
                "missing signature",
            )),
        }
    }

    pub fn signatures(&self) -> &[SignatureOutcome] {
        &self.outcomes
    }

    /// The first verified signature, or the first signature if none verified.
    pub fn selected(&self) -> Option<&SignatureOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.is_ok())
            .or_else(|| self.outcomes.first())
    }

    /// Creation time of the selected signature.
    pub fn signature_creation_time(&self) -> Option<DateTime<Utc>> {
        self.selected().and_then(SignatureOutcome::creation_time)
    }
}

/// Checks signatures against a set of keys, a time and an optional context.
#[derive(Debug, Clone)]
pub(crate) struct VerificationPolicy<'a> {
    pub keys: &'a [PublicKey],
    pub time: VerifyTime,
    pub context: Option<&'a VerificationContext>,
}

impl VerificationPolicy<'_> {
    /// Evaluates `signature` over the data already fed into `hasher`.
    pub fn evaluate(&self, signature: Signature, hasher: SignatureHasher) -> SignatureOutcome {
        let issuer = self.find_issuer(&signature);
        let verifier = issuer.map(|key| key.packet.fingerprint());
        let result = match issuer {
            None => Err(SignatureVerificationError::new(
                SignatureStatus::NoVerifier,
                format!(
                    "no verification key for issuer {}",
                    signature
                        .issuer_key_id()
                        .map_or_else(|| "unknown".to_string(), |id| id.to_string())
                ),
            )),
            Some(key) => self.check(&signature, hasher, key),
        };
        let (status, error) = match result {
            Ok(()) => (SignatureStatus::Ok, None),
            Err(err) => {
                warn!("signature rejected: {}", err);
                (err.status, Some(err))
            }
        };
        debug!("signature from {:?}: {}", verifier, status);
        SignatureOutcome {
            signature,
            status,
            error,
            verifier,
        }
    }

    fn find_issuer(&self, signature: &Signature) -> Option<ComponentKey<'_>> {
        self.keys
            .iter()
            .flat_map(PublicKey::components)
            .find(|key| signature.is_issued_by(key.packet))
    }

    fn check(
        &self,
        signature: &Signature,
        hasher: SignatureHasher,
        key: ComponentKey<'_>,
    ) -> Result<(), SignatureVerificationError> {
        let failed = |message: String| SignatureVerificationError::new(SignatureStatus::Failed, message);

        // cryptographic validity, terminal on failure
        if !matches!(signature.typ(), SignatureType::Binary | SignatureType::Text) {
            return Err(failed(format!("unexpected signature type {:?}", signature.typ())));
        }
        if !key.flags.can_sign() {
            return Err(failed("issuing key is not a signing key".to_string()));
        }
        if signature.has_unknown_critical_subpacket() {
            return Err(failed("unknown critical subpacket".to_string()));
        }
        signature
            .verify(key.packet, hasher)
            .map_err(|err| failed(err.to_string()))?;

        self.check_time(signature, &key)?;
        self.check_notations(signature)
    }

    fn check_time(
        &self,
        signature: &Signature,
        key: &ComponentKey<'_>,
    ) -> Result<(), SignatureVerificationError> {
        let Some(now) = self.time.resolve() else {
            return Ok(());
        };
        let failed = |message: &str| SignatureVerificationError::new(SignatureStatus::Failed, message);
        let Some(created) = signature.created() else {
            return Err(failed("signature without creation time"));
        };
        if now < *created {
            return Err(failed("signature created in the future"));
        }
        if created < key.packet.created_at() {
            return Err(failed("signature predates its key"));
        }
        if let Some(expires) = signature.signature_expiration_time() {
            if *created + Duration::seconds(i64::from(expires)) <= now {
                return Err(failed("signature expired"));
            }
        }
        if key.expires_at.is_some_and(|expires| expires <= now) {
            return Err(failed("signing key expired"));
        }
        Ok(())
    }

    fn check_notations(&self, signature: &Signature) -> Result<(), SignatureVerificationError> {
        let is_known = |name: &str| {
            self.context.is_some()
                && (name == CONTEXT_NOTATION_NAME || name == CONTEXT_VERSION_NOTATION_NAME)
        };
        if let Some((notation, _)) = signature
            .notations()
            .find(|(notation, critical)| *critical && !is_known(&notation.name))
        {
            return Err(SignatureVerificationError::new(
                SignatureStatus::Failed,
                format!("unknown critical notation {}", notation.name),
            ));
        }

        let Some(expected) = self.context else {
            return Ok(());
        };
        let bad_context = |message: &str| {
            SignatureVerificationError::new(SignatureStatus::BadContext, message)
        };
        let contexts: Vec<_> = signature
            .notations()
            .filter(|(notation, _)| notation.name == CONTEXT_NOTATION_NAME)
            .map(|(notation, _)| notation)
            .collect();
        match contexts.as_slice() {
            [] if expected.is_required_at(signature.created()) => {
                Err(bad_context("missing required context"))
            }
            [] => Ok(()),
            [context] if context.value == expected.value.as_bytes() => Ok(()),
            [_] => Err(bad_context("context does not match")),
            _ => Err(bad_context("multiple contexts")),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::context::SigningContext;
    use crate::key::{generate, PrivateKey};
    use crate::packet::{Notation, SignatureConfig, Subpacket, SubpacketData};
    use crate::profile::{self, SecurityLevel};

    const CREATED: u32 = 1_700_000_000;

    fn key(seed: u64) -> PrivateKey {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let profile = profile::resolve(profile::DEFAULT, SecurityLevel::Standard).unwrap();
        generate(
            &mut rng,
            &profile,
            &["test".to_string()],
            timestamp::from_wire(CREATED - 100),
            None,
        )
        .unwrap()
    }

    fn sign(key: &PrivateKey, data: &[u8], extra: Vec<Subpacket>) -> Signature {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        key.with_secret(|secret| {
            let mut config = SignatureConfig::from_key(
                &mut rng,
                secret.primary.public_key(),
                SignatureType::Binary,
                crate::crypto::hash::HashAlgorithm::Sha256,
                timestamp::from_wire(CREATED),
            )?;
            config.hashed_subpackets.extend(extra);
            let mut hasher = config.data_hasher()?;
            hasher.update(data);
            config.sign(&secret.primary, hasher)
        })
        .unwrap()
    }

    fn evaluate(
        keys: &[PublicKey],
        sig: &Signature,
        data: &[u8],
        context: Option<&VerificationContext>,
    ) -> SignatureOutcome {
        let policy = VerificationPolicy {
            keys,
            time: VerifyTime::At(timestamp::from_wire(CREATED + 10)),
            context,
        };
        let mut hasher = sig.config.data_hasher().unwrap();
        hasher.update(data);
        policy.evaluate(sig.clone(), hasher)
    }

    fn context(value: &str) -> Vec<Subpacket> {
        SigningContext::new(value, true).notations().to_vec()
    }

    #[test]
    fn ok_failed_no_verifier() {
        let alice = key(1);
        let bob = key(2);
        let keys = vec![alice.public_key().clone()];
        let sig = sign(&alice, b"hello", vec![]);

        let outcome = evaluate(&keys, &sig, b"hello", None);
        assert_eq!(outcome.status, SignatureStatus::Ok);
        assert_eq!(outcome.verifier, Some(alice.fingerprint()));
        assert_eq!(outcome.creation_time(), Some(timestamp::from_wire(CREATED)));

        let outcome = evaluate(&keys, &sig, b"hellO", None);
        assert_eq!(outcome.status, SignatureStatus::Failed);

        let outcome = evaluate(&[bob.public_key().clone()], &sig, b"hello", None);
        assert_eq!(outcome.status, SignatureStatus::NoVerifier);
    }

    #[test]
    fn time_policy() {
        let alice = key(1);
        let keys = vec![alice.public_key().clone()];
        let sig = sign(&alice, b"data", vec![]);
        let at = |time: VerifyTime| {
            let policy = VerificationPolicy {
                keys: &keys,
                time,
                context: None,
            };
            let mut hasher = sig.config.data_hasher().unwrap();
            hasher.update(b"data");
            policy.evaluate(sig.clone(), hasher).status
        };
        assert_eq!(
            at(VerifyTime::At(timestamp::from_wire(CREATED - 1))),
            SignatureStatus::Failed
        );
        assert_eq!(at(VerifyTime::Disabled), SignatureStatus::Ok);
        assert_eq!(at(VerifyTime::Now), SignatureStatus::Ok);
    }

    #[test]
    fn critical_context_without_verifier_context_fails() {
        let alice = key(1);
        let keys = vec![alice.public_key().clone()];
        let sig = sign(&alice, b"data", context("ctx"));
        assert_eq!(
            evaluate(&keys, &sig, b"data", None).status,
            SignatureStatus::Failed
        );

        let non_critical = sign(
            &alice,
            b"data",
            SigningContext::new("ctx", false).notations().to_vec(),
        );
        assert_eq!(
            evaluate(&keys, &non_critical, b"data", None).status,
            SignatureStatus::Ok
        );
    }

    #[test]
    fn unknown_critical_notation_fails() {
        let alice = key(1);
        let keys = vec![alice.public_key().clone()];
        let sig = sign(
            &alice,
            b"data",
            vec![Subpacket::critical(SubpacketData::Notation(Notation::new(
                "other@example.org",
                "x",
                true,
            )))],
        );
        let expected = VerificationContext::new("ctx", false);
        assert_eq!(
            evaluate(&keys, &sig, b"data", Some(&expected)).status,
            SignatureStatus::Failed
        );
    }

    #[test]
    fn context_truth_table() {
        let alice = key(1);
        let keys = vec![alice.public_key().clone()];
        let status = |extra: Vec<Subpacket>, expected: &VerificationContext| {
            let sig = sign(&alice, b"data", extra);
            evaluate(&keys, &sig, b"data", Some(expected)).status
        };

        let required = VerificationContext::new("ctx", true);
        let optional = VerificationContext::new("ctx", false);
        assert_eq!(status(context("ctx"), &required), SignatureStatus::Ok);
        assert_eq!(status(context("other"), &required), SignatureStatus::BadContext);
        assert_eq!(status(context("other"), &optional), SignatureStatus::BadContext);
        assert_eq!(status(vec![], &optional), SignatureStatus::Ok);
        assert_eq!(status(vec![], &required), SignatureStatus::BadContext);

        let mut double = context("ctx");
        double.extend(context("ctx"));
        assert_eq!(status(double, &required), SignatureStatus::BadContext);

        let grandfathered = required
            .clone()
            .required_after(timestamp::from_wire(CREATED + 1));
        assert_eq!(status(vec![], &grandfathered), SignatureStatus::Ok);
        let enforced = required.required_after(timestamp::from_wire(CREATED - 1));
        assert_eq!(status(vec![], &enforced), SignatureStatus::BadContext);
    }

    #[test]
    fn aggregation() {
        let alice = key(1);
        let bob = key(2);
        let keys = vec![alice.public_key().clone()];
        let good = evaluate(&keys, &sign(&alice, b"m", vec![]), b"m", None);
        let unknown = evaluate(&keys, &sign(&bob, b"m", vec![]), b"m", None);
        let bad = evaluate(&keys, &sign(&alice, b"x", vec![]), b"m", None);

        let result = VerificationResult::new(vec![unknown.clone(), good.clone()]);
        assert_eq!(result.status(), SignatureStatus::Ok);
        assert!(result.signature_error().is_none());
        assert_eq!(result.selected(), Some(&good));
        assert_eq!(result.signatures().len(), 2);

        let result = VerificationResult::new(vec![bad, unknown]);
        assert_eq!(result.status(), SignatureStatus::Failed);
        assert_eq!(
            result.signature_error().map(|e| e.status),
            Some(SignatureStatus::Failed)
        );

        let empty = VerificationResult::default();
        assert_eq!(empty.status(), SignatureStatus::NotSigned);
        assert_eq!(empty.signature_creation_time(), None);
    }
}
