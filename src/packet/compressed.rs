use std::io::{self, BufRead, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use flate2::{bufread, write, Compression};
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::{unsupported_err, Result};
use crate::packet::PartialBodyWriter;
use crate::types::Tag;

/// Available compression algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-compression-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CompressionAlgorithm {
    Uncompressed = 0,
    ZIP = 1,
    ZLIB = 2,
    BZip2 = 3,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::ZLIB
    }
}

/// Streams a compressed data packet.
pub struct CompressedWriter<W: Write> {
    encoder: Encoder<W>,
}

enum Encoder<W: Write> {
    Zip(write::DeflateEncoder<PartialBodyWriter<W>>),
    Zlib(write::ZlibEncoder<PartialBodyWriter<W>>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(alg: CompressionAlgorithm, level: Option<u32>, inner: W) -> Result<Self> {
        let level = level.map(Compression::new).unwrap_or_default();
        debug!("compressing with {:?} at level {}", alg, level.level());

        let mut body = PartialBodyWriter::new(Tag::CompressedData, inner)?;
        body.write_u8(alg.into())?;
        let encoder = match alg {
            CompressionAlgorithm::ZIP => Encoder::Zip(write::DeflateEncoder::new(body, level)),
            CompressionAlgorithm::ZLIB => Encoder::Zlib(write::ZlibEncoder::new(body, level)),
            _ => unsupported_err!("compression algorithm {:?}", alg),
        };
        Ok(CompressedWriter { encoder })
    }

    pub fn finish(self) -> io::Result<W> {
        let body = match self.encoder {
            Encoder::Zip(enc) => enc.finish()?,
            Encoder::Zlib(enc) => enc.finish()?,
        };
        body.finish()
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.encoder {
            Encoder::Zip(enc) => enc.write(buf),
            Encoder::Zlib(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.encoder {
            Encoder::Zip(enc) => enc.flush(),
            Encoder::Zlib(enc) => enc.flush(),
        }
    }
}

/// Decompresses the body of a compressed data packet.
pub enum CompressionReader<R: BufRead> {
    Uncompressed(R),
    Zip(bufread::DeflateDecoder<R>),
    Zlib(bufread::ZlibDecoder<R>),
}

impl<R: BufRead> CompressionReader<R> {
    /// Reads the algorithm octet and sets up decompression of the rest of the body.
    pub fn new(mut body: R) -> Result<Self> {
        let alg = CompressionAlgorithm::from(body.read_u8()?);
        debug!("decompressing {:?}", alg);
        let reader = match alg {
            CompressionAlgorithm::Uncompressed => CompressionReader::Uncompressed(body),
            CompressionAlgorithm::ZIP => CompressionReader::Zip(bufread::DeflateDecoder::new(body)),
            CompressionAlgorithm::ZLIB => CompressionReader::Zlib(bufread::ZlibDecoder::new(body)),
            _ => unsupported_err!("compression algorithm {:?}", alg),
        };
        Ok(reader)
    }

    pub fn into_inner(self) -> R {
        match self {
            CompressionReader::Uncompressed(r) => r,
            CompressionReader::Zip(r) => r.into_inner(),
            CompressionReader::Zlib(r) => r.into_inner(),
        }
    }
}

impl<R: BufRead> Read for CompressionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            CompressionReader::Uncompressed(r) => r.read(buf),
            CompressionReader::Zip(r) => r.read(buf),
            CompressionReader::Zlib(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketBodyReader, PacketHeader};

    #[test]
    fn algorithm_ids() {
        assert_eq!(CompressionAlgorithm::default(), CompressionAlgorithm::ZLIB);
        assert_eq!(CompressionAlgorithm::from(1), CompressionAlgorithm::ZIP);
        assert_eq!(CompressionAlgorithm::from(110), CompressionAlgorithm::Other(110));
    }

    #[test]
    fn zlib_roundtrip() {
        let data = b"hello hello hello hello hello".repeat(100);
        let mut writer =
            CompressedWriter::new(CompressionAlgorithm::ZLIB, Some(6), Vec::new()).unwrap();
        writer.write_all(&data).unwrap();
        let encoded = writer.finish().unwrap();
        assert!(encoded.len() < data.len());

        let mut input = &encoded[..];
        let header = PacketHeader::try_from_reader(&mut input).unwrap().unwrap();
        assert_eq!(header.tag(), Tag::CompressedData);
        let body = PacketBodyReader::new(header, input);
        let mut reader = CompressionReader::new(body).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn bzip2_is_unsupported() {
        assert!(CompressedWriter::new(CompressionAlgorithm::BZip2, None, Vec::new()).is_err());
    }
}
