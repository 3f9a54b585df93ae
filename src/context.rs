//! # Signature contexts
//!
//! Binds an application defined context string into signatures through notations, and
//! describes which context a verifier expects.

use chrono::{DateTime, Utc};

use crate::packet::{Notation, Subpacket, SubpacketData};

/// Notation carrying the signature context.
pub const CONTEXT_NOTATION_NAME: &str = "context@proton.ch";
/// Notation recording the version of the context scheme.
pub const CONTEXT_VERSION_NOTATION_NAME: &str = "context-version@proton.ch";
const CONTEXT_VERSION: &str = "1";

/// Context attached to every signature produced by a sign handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub value: String,
    pub is_critical: bool,
}

impl SigningContext {
    pub fn new(value: impl Into<String>, is_critical: bool) -> Self {
        SigningContext {
            value: value.into(),
            is_critical,
        }
    }

    /// The two hashed subpackets added to a signature: the context and its version.
    pub fn notations(&self) -> [Subpacket; 2] {
        let context = SubpacketData::Notation(Notation::new(
            CONTEXT_NOTATION_NAME,
            self.value.as_bytes(),
            true,
        ));
        let version = SubpacketData::Notation(Notation::new(
            CONTEXT_VERSION_NOTATION_NAME,
            CONTEXT_VERSION.as_bytes(),
            true,
        ));
        [
            Subpacket {
                is_critical: self.is_critical,
                data: context,
            },
            Subpacket::regular(version),
        ]
    }
}

/// Context a verifier expects on signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationContext {
    pub value: String,
    pub is_required: bool,
    /// Signatures created before this time are accepted without a context.
    /// `None` requires the context on all signatures when `is_required` is set.
    pub required_after: Option<DateTime<Utc>>,
}

impl VerificationContext {
    pub fn new(value: impl Into<String>, is_required: bool) -> Self {
        VerificationContext {
            value: value.into(),
            is_required,
            required_after: None,
        }
    }

    /// Only require the context on signatures created at or after `time`.
    pub fn required_after(mut self, time: DateTime<Utc>) -> Self {
        self.required_after = Some(time);
        self
    }

    /// Whether a signature created at `created` must carry the context.
    pub fn is_required_at(&self, created: Option<&DateTime<Utc>>) -> bool {
        if !self.is_required {
            return false;
        }
        match (self.required_after, created) {
            (Some(cutoff), Some(created)) => *created >= cutoff,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::timestamp;

    #[test]
    fn signing_notations() {
        let [context, version] = SigningContext::new("test-context", true).notations();
        assert!(context.is_critical);
        assert!(!version.is_critical);
        match (context.data, version.data) {
            (SubpacketData::Notation(context), SubpacketData::Notation(version)) => {
                assert_eq!(context.name, CONTEXT_NOTATION_NAME);
                assert_eq!(context.value, b"test-context");
                assert!(context.readable);
                assert_eq!(version.name, CONTEXT_VERSION_NOTATION_NAME);
                assert_eq!(version.value, b"1");
            }
            other => panic!("unexpected subpackets {:?}", other),
        }
    }

    #[test]
    fn required_cutoff() {
        let cutoff = timestamp::from_wire(1_000);
        let ctx = VerificationContext::new("ctx", true).required_after(cutoff);
        assert!(!ctx.is_required_at(Some(&timestamp::from_wire(999))));
        assert!(ctx.is_required_at(Some(&timestamp::from_wire(1_000))));
        assert!(ctx.is_required_at(None));

        let optional = VerificationContext::new("ctx", false);
        assert!(!optional.is_required_at(Some(&timestamp::from_wire(5_000))));
    }
}
