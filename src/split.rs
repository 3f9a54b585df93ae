//! # Split output and input
//!
//! An encrypted message consists of session key packets, the encrypted data packet and,
//! for encrypted detached signatures, a second encrypted data packet holding the signature.
//! A [`Destination`] decides where each of these channels is written to, a [`Source`]
//! stitches split inputs back together.

use std::io::{self, Read, Write};

use crate::armor::{ArmorWriter, BlockType};

/// Output channels handed to the message writer.
pub struct Channels<'a> {
    pub main: Box<dyn Write + 'a>,
    pub keys: Option<Box<dyn Write + 'a>>,
    pub signature: Option<Box<dyn Write + 'a>>,
}

/// Where the parts of a message are written to.
///
/// Every writer is a destination with a single channel, [`SplitWriter`] provides separate
/// channels for key packets and detached signatures.
pub trait Destination<'a> {
    fn into_channels(self) -> Channels<'a>;
}

impl<'a, W: Write + 'a> Destination<'a> for W {
    fn into_channels(self) -> Channels<'a> {
        Channels {
            main: Box::new(self),
            keys: None,
            signature: None,
        }
    }
}

/// A destination with a main channel and optional key packet and signature channels.
pub struct SplitWriter<'a> {
    main: Box<dyn Write + 'a>,
    keys: Option<Box<dyn Write + 'a>>,
    signature: Option<Box<dyn Write + 'a>>,
}

impl<'a> SplitWriter<'a> {
    pub fn new(main: impl Write + 'a) -> Self {
        SplitWriter {
            main: Box::new(main),
            keys: None,
            signature: None,
        }
    }

    /// Session key packets go to `keys`, the encrypted data to `data`.
    pub fn key_and_data(keys: impl Write + 'a, data: impl Write + 'a) -> Self {
        Self::new(data).with_keys(keys)
    }

    /// The message goes to `main`, the detached signature to `signature`.
    pub fn detached_signature(main: impl Write + 'a, signature: impl Write + 'a) -> Self {
        Self::new(main).with_signature(signature)
    }

    pub fn with_keys(mut self, keys: impl Write + 'a) -> Self {
        self.keys = Some(Box::new(keys));
        self
    }

    pub fn with_signature(mut self, signature: impl Write + 'a) -> Self {
        self.signature = Some(Box::new(signature));
        self
    }
}

impl<'a> Destination<'a> for SplitWriter<'a> {
    fn into_channels(self) -> Channels<'a> {
        Channels {
            main: self.main,
            keys: self.keys,
            signature: self.signature,
        }
    }
}

/// Inputs handed to the message reader.
pub struct Inputs<'a> {
    pub main: Box<dyn Read + 'a>,
    pub keys: Option<Box<dyn Read + 'a>>,
    pub signature: Option<Box<dyn Read + 'a>>,
}

/// Where the parts of a message are read from, the inverse of [`Destination`].
pub trait Source<'a> {
    fn into_inputs(self) -> Inputs<'a>;
}

impl<'a, R: Read + 'a> Source<'a> for R {
    fn into_inputs(self) -> Inputs<'a> {
        Inputs {
            main: Box::new(self),
            keys: None,
            signature: None,
        }
    }
}

/// A source reading key packets, data packets and an encrypted signature separately.
pub struct SplitReader<'a> {
    main: Box<dyn Read + 'a>,
    keys: Option<Box<dyn Read + 'a>>,
    signature: Option<Box<dyn Read + 'a>>,
}

impl<'a> SplitReader<'a> {
    pub fn new(main: impl Read + 'a) -> Self {
        SplitReader {
            main: Box::new(main),
            keys: None,
            signature: None,
        }
    }

    pub fn key_and_data(keys: impl Read + 'a, data: impl Read + 'a) -> Self {
        Self::new(data).with_keys(keys)
    }

    pub fn with_keys(mut self, keys: impl Read + 'a) -> Self {
        self.keys = Some(Box::new(keys));
        self
    }

    pub fn with_signature(mut self, signature: impl Read + 'a) -> Self {
        self.signature = Some(Box::new(signature));
        self
    }
}

impl<'a> Source<'a> for SplitReader<'a> {
    fn into_inputs(self) -> Inputs<'a> {
        Inputs {
            main: self.main,
            keys: self.keys,
            signature: self.signature,
        }
    }
}

/// A single output channel, binary or armored.
pub enum ChannelWriter<'a> {
    Binary(Box<dyn Write + 'a>),
    Armored(ArmorWriter<Box<dyn Write + 'a>>),
}

impl<'a> ChannelWriter<'a> {
    pub fn new(inner: Box<dyn Write + 'a>, armor: Option<(BlockType, bool)>) -> io::Result<Self> {
        match armor {
            Some((typ, checksum)) => Ok(ChannelWriter::Armored(ArmorWriter::new(
                typ, checksum, inner,
            )?)),
            None => Ok(ChannelWriter::Binary(inner)),
        }
    }

    /// Writes the armor footer, if any, and flushes the sink.
    pub fn finish(self) -> io::Result<()> {
        let mut inner = match self {
            ChannelWriter::Binary(inner) => inner,
            ChannelWriter::Armored(armor) => armor.finish()?,
        };
        inner.flush()
    }
}

impl Write for ChannelWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ChannelWriter::Binary(inner) => inner.write(buf),
            ChannelWriter::Armored(armor) => armor.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ChannelWriter::Binary(inner) => inner.flush(),
            ChannelWriter::Armored(armor) => armor.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_writer_has_one_channel() {
        let mut out = Vec::new();
        {
            let channels = (&mut out).into_channels();
            assert!(channels.keys.is_none());
            assert!(channels.signature.is_none());
            let mut main = channels.main;
            main.write_all(b"abc").unwrap();
        }
        assert_eq!(out, b"abc");
    }

    #[test]
    fn split_channels() {
        let mut keys = Vec::new();
        let mut data = Vec::new();
        let mut sig = Vec::new();
        {
            let channels = SplitWriter::key_and_data(&mut keys, &mut data)
                .with_signature(&mut sig)
                .into_channels();
            let (mut main, mut k, mut s) = (
                channels.main,
                channels.keys.unwrap(),
                channels.signature.unwrap(),
            );
            main.write_all(b"data").unwrap();
            k.write_all(b"keys").unwrap();
            s.write_all(b"sig").unwrap();
        }
        assert_eq!(keys, b"keys");
        assert_eq!(data, b"data");
        assert_eq!(sig, b"sig");
    }

    #[test]
    fn armored_channel() {
        let mut out = Vec::new();
        let mut writer =
            ChannelWriter::new(Box::new(&mut out), Some((BlockType::Message, true))).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("-----BEGIN PGP MESSAGE-----"));
        assert!(text.trim_end().ends_with("-----END PGP MESSAGE-----"));
    }
}
