//! # Cleartext signature framework
//!
//! Human readable signed text followed by an armored signature block.
//! Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-cleartext-signature-framewo>

use chrono::{DateTime, Utc};
use rand::{CryptoRng, Rng};

use crate::armor::{self, BlockType};
use crate::context::SigningContext;
use crate::errors::{Error, Result};
use crate::message::{parse_signatures, LiteralMetadata, SignerKey, VerifiedData};
use crate::normalize_lines::{canonicalize_cleartext, LineBreak, Normalized};
use crate::packet::{PacketTrait, Signature, SignatureType, SignatureVersion};
use crate::profile::AlgorithmProfile;
use crate::verify::{VerificationPolicy, VerificationResult};

const HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// A parsed cleartext signed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleartextMessage {
    /// The signed text, dash escaping removed, lines separated by `\n`.
    pub text: String,
    pub signatures: Vec<Signature>,
}

impl CleartextMessage {
    pub fn parse(input: &str) -> Result<Self> {
        let mut lines = input.split('\n').map(|line| line.trim_end_matches('\r'));
        if !lines.by_ref().any(|line| line.trim_end() == HEADER) {
            return Err(invalid("missing cleartext header"));
        }

        // armor headers, only `Hash` is defined and it is informational
        for line in lines.by_ref() {
            if line.trim().is_empty() {
                break;
            }
            if !line.starts_with("Hash:") {
                return Err(invalid(format!("unexpected cleartext header {:?}", line)));
            }
        }

        let mut text = Vec::new();
        let mut found = false;
        for line in lines.by_ref() {
            if line.trim_end() == SIGNATURE_HEADER {
                found = true;
                break;
            }
            text.push(line.strip_prefix("- ").unwrap_or(line));
        }
        if !found {
            return Err(invalid("missing signature block"));
        }

        let block = std::iter::once(SIGNATURE_HEADER)
            .chain(lines)
            .collect::<Vec<_>>()
            .join("\n");
        let (typ, bytes) = armor::parse(block.as_bytes())?;
        if typ != BlockType::Signature {
            return Err(invalid(format!("expected a signature block, found {}", typ)));
        }

        Ok(CleartextMessage {
            text: text.join("\n"),
            signatures: parse_signatures(&bytes[..])?,
        })
    }

    /// Writes the message, dash escaping the text.
    pub fn to_armored_string(&self, include_checksum: bool) -> Result<String> {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        let mut hashes: Vec<_> = self
            .signatures
            .iter()
            .filter(|sig| sig.version() == SignatureVersion::V4)
            .map(|sig| sig.hash_alg().to_string())
            .collect();
        hashes.sort();
        hashes.dedup();
        if !hashes.is_empty() {
            out.push_str(&format!("Hash: {}\n", hashes.join(",")));
        }
        out.push('\n');

        for line in cleartext_lines(&self.text) {
            if line.starts_with('-') {
                out.push_str("- ");
            }
            out.push_str(&line);
            out.push('\n');
        }

        let mut packets = Vec::new();
        for signature in &self.signatures {
            signature.to_writer_with_header(&mut packets)?;
        }
        let mut block = Vec::new();
        armor::write(&packets, BlockType::Signature, &mut block, include_checksum)?;
        out.push_str(std::str::from_utf8(&block).map_err(|_| Error::InvalidUtf8)?);
        Ok(out)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidArmor {
        message: message.into(),
    }
}

/// Lines of `text` with `\n` line endings and trailing whitespace removed.
fn cleartext_lines(text: &str) -> Vec<String> {
    let normalized: Vec<u8> = Normalized::new(text.bytes(), LineBreak::Lf).collect();
    String::from_utf8_lossy(&normalized)
        .split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']).to_string())
        .collect()
}

/// Signs `text` with every signer and returns the cleartext signed message.
pub(crate) fn sign<R: Rng + CryptoRng>(
    mut rng: R,
    text: &str,
    signers: &[SignerKey],
    profile: &AlgorithmProfile,
    context: Option<&SigningContext>,
    created: DateTime<Utc>,
) -> Result<String> {
    let canonical = canonicalize_cleartext(text);
    let mut signatures = Vec::with_capacity(signers.len());
    for signer in signers {
        let config = signer.config(
            &mut rng,
            SignatureType::Text,
            profile.signing_hash,
            created,
            context,
        )?;
        let mut hasher = config.data_hasher()?;
        hasher.update(&canonical);
        signatures.push(signer.sign(config, hasher)?);
    }
    let message = CleartextMessage {
        text: text.to_string(),
        signatures,
    };
    message.to_armored_string(profile.armor_checksum())
}

/// Verifies a cleartext signed message.
pub(crate) fn verify(input: &str, policy: &VerificationPolicy<'_>) -> Result<VerifiedData> {
    let message = CleartextMessage::parse(input)?;
    let canonical = canonicalize_cleartext(&message.text);
    let mut outcomes = Vec::with_capacity(message.signatures.len());
    for signature in message.signatures {
        let mut hasher = signature.config.data_hasher()?;
        hasher.update(&canonical);
        outcomes.push(policy.evaluate(signature, hasher));
    }
    Ok(VerifiedData {
        data: message.text.into_bytes(),
        metadata: LiteralMetadata::new("", true),
        result: VerificationResult::new(outcomes),
        session_key: None,
    })
}
