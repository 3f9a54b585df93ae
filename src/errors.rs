use std::num::TryFromIntError;

use snafu::Snafu;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// Error types
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    // -- configuration
    #[snafu(display("invalid configuration: {message}"))]
    Configuration { message: String },
    #[snafu(display("unknown profile: {name}"))]
    UnknownProfile { name: String },
    #[snafu(display("no recipient key or password configured"))]
    MissingRecipient,

    // -- encoding
    #[snafu(display("input is not valid utf-8"))]
    InvalidUtf8,
    #[snafu(display("invalid armor: {message}"))]
    InvalidArmor { message: String },
    #[snafu(display("invalid crc24 checksum"))]
    InvalidChecksum,
    #[snafu(transparent)]
    Base64Decode { source: base64::DecodeError },
    #[snafu(display("invalid packet: {message}"))]
    InvalidPacket { message: String },

    // -- crypto operations
    /// Signals packet versions and algorithms we don't support.
    #[snafu(display("Unsupported: {message}"))]
    Unsupported { message: String },
    #[snafu(display("{message}"))]
    Message { message: String },
    #[snafu(display("no configured key, password or session key could decrypt the message"))]
    NoDecryptionKey,
    #[snafu(display("message integrity check failed"))]
    IntegrityCheck,
    #[snafu(display("AEAD authentication failed"))]
    Aead,
    #[snafu(display("invalid key length"))]
    InvalidKeyLength,
    #[snafu(transparent)]
    Rsa { source: rsa::errors::Error },
    #[snafu(transparent)]
    Ed25519 {
        source: ed25519_dalek::SignatureError,
    },
    #[snafu(transparent)]
    Argon2 { source: argon2::Error },
    #[snafu(transparent)]
    TryFromInt { source: TryFromIntError },

    // -- usage
    #[snafu(display("stream already closed"))]
    AlreadyClosed,
    #[snafu(display("private key material already cleared"))]
    AlreadyCleared,
    #[snafu(display("private key material has been cleared"))]
    PrivateParamsCleared,

    #[snafu(display("io error: {source}"))]
    Io { source: std::io::Error },
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or missing handle configuration, reported when a handle is built.
    Configuration,
    /// Malformed input: bad utf-8, armor or packet framing.
    Encoding,
    /// A primitive failed; retrying with the same input can not succeed.
    CryptoOperation,
    /// The caller misused an API, e.g. closed a stream twice.
    Usage,
    /// The underlying sink or source failed.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } | Error::UnknownProfile { .. } | Error::MissingRecipient => {
                ErrorKind::Configuration
            }
            Error::InvalidUtf8
            | Error::InvalidArmor { .. }
            | Error::InvalidChecksum
            | Error::Base64Decode { .. }
            | Error::InvalidPacket { .. } => ErrorKind::Encoding,
            Error::AlreadyClosed | Error::AlreadyCleared | Error::PrivateParamsCleared => {
                ErrorKind::Usage
            }
            Error::Io { .. } => ErrorKind::Io,
            _ => ErrorKind::CryptoOperation,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // Errors raised inside our own `Read`/`Write` impls travel through `io::Error`.
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(Ok(inner)) = err.into_inner().map(|inner| inner.downcast::<Error>()) {
                return *inner;
            }
            return Error::Message {
                message: "lost wrapped error".to_string(),
            };
        }
        Error::Io { source: err }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io { source } => source,
            err => std::io::Error::new(std::io::ErrorKind::Other, err),
        }
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Message { message: err }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Error {
        Error::Configuration {
            message: err.to_string(),
        }
    }
}

macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unsupported { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unsupported { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            $crate::errors::bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::errors::bail!($fmt, $($arg)+);
        }
    };
}

macro_rules! invalid_packet {
    ($e:expr) => {
        return Err($crate::errors::Error::InvalidPacket { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::InvalidPacket { message: format!($fmt, $($arg)+) })
    };
}

pub(crate) use {bail, ensure, format_err, invalid_packet, unsupported_err};
