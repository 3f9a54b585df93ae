//! # pgp-handles
//!
//! Configured handles for OpenPGP encryption, decryption, signing, verification and key
//! generation, on top of a streaming packet engine.
//!
//! Handles are built from validated parameters by a [`Pgp`] value that carries the
//! selected [`Profile`]. They are immutable and can be used many times:
//!
//! - [`EncryptionHandle`] encrypts to recipient keys and passwords, optionally signing,
//!   and can split key packets, data packets and detached signatures into separate outputs.
//! - [`DecryptionHandle`] decrypts and verifies the embedded signatures.
//! - [`SignHandle`] produces inline, detached and cleartext signatures.
//! - [`VerifyHandle`] checks them against keys, a point in time and a signature context.
//! - [`KeyGenerationHandle`] generates keys for the profile.

#![forbid(unsafe_code)]

pub mod errors;
pub mod types;

pub mod armor;
pub mod crypto;
pub mod normalize_lines;
pub mod packet;

pub mod cleartext;
pub mod context;
pub mod handle;
pub mod key;
pub mod message;
pub mod profile;
pub mod session_key;
pub mod split;
pub mod verify;

mod util;

pub use self::context::{SigningContext, VerificationContext};
pub use self::errors::{Error, ErrorKind, Result};
pub use self::handle::{
    DecryptionHandle, DecryptionParams, DecryptionParamsBuilder, EncryptionHandle,
    EncryptionParams, EncryptionParamsBuilder, KeyGenerationHandle, KeyGenerationParams,
    KeyGenerationParamsBuilder, Pgp, SignHandle, SignParams, SignParamsBuilder, VerifyHandle,
    VerifyParams, VerifyParamsBuilder,
};
pub use self::key::{PrivateKey, PublicKey};
pub use self::message::{
    DecryptingReader, EncryptingWriter, LiteralMetadata, MessageReader, MessageWriter, PgpMessage,
    SigningWriter, VerifiedData, VerifyingReader,
};
pub use self::profile::{AlgorithmProfile, Profile, ProfileRegistry, SecurityLevel};
pub use self::session_key::SessionKey;
pub use self::split::{Destination, Source, SplitReader, SplitWriter};
pub use self::types::{Encoding, Fingerprint, KeyId, Password};
pub use self::verify::{
    SignatureOutcome, SignatureStatus, SignatureVerificationError, VerificationResult, VerifyTime,
};
