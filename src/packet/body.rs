use std::io::{self, BufRead, Read, Write};

use byteorder::WriteBytesExt;

use crate::packet::header::{read_new_length, PacketHeader};
use crate::types::{PacketLength, Tag};

/// Power of two used for partial body chunks.
const PARTIAL_POW: u32 = 13;
const PARTIAL_LEN: usize = 1 << PARTIAL_POW;

/// Streams a packet body of unknown length using partial body lengths.
///
/// Every full chunk is emitted as a partial body; [`PartialBodyWriter::finish`] writes the
/// remainder with a fixed length, which may be zero.
#[derive(derive_more::Debug)]
pub struct PartialBodyWriter<W: Write> {
    #[debug(skip)]
    inner: W,
    #[debug("{}", buffer.len())]
    buffer: Vec<u8>,
}

impl<W: Write> PartialBodyWriter<W> {
    pub fn new(tag: Tag, mut inner: W) -> io::Result<Self> {
        inner.write_u8(0b1100_0000 | u8::from(tag))?;
        Ok(PartialBodyWriter {
            inner,
            buffer: Vec::with_capacity(PARTIAL_LEN),
        })
    }

    pub fn finish(mut self) -> io::Result<W> {
        let len = u32::try_from(self.buffer.len())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        super::header::write_fixed_length(&mut self.inner, len)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(self.inner)
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for PartialBodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        // keep at least one octet back, so the final chunk is never a partial one
        while self.buffer.len() > PARTIAL_LEN {
            self.inner.write_u8(224 | PARTIAL_POW as u8)?;
            self.inner.write_all(&self.buffer[..PARTIAL_LEN])?;
            self.buffer.drain(..PARTIAL_LEN);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads exactly the body of one packet, following partial body lengths.
#[derive(derive_more::Debug)]
pub struct PacketBodyReader<R: BufRead> {
    #[debug(skip)]
    inner: R,
    remaining: usize,
    state: BodyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    /// The current chunk is the last one.
    Last,
    /// More chunks follow the current one.
    Partial,
    /// The body runs until the end of the stream.
    Indeterminate,
    Done,
}

impl<R: BufRead> PacketBodyReader<R> {
    pub fn new(header: PacketHeader, inner: R) -> Self {
        let (remaining, state) = match header.length() {
            PacketLength::Fixed(len) => (len as usize, BodyState::Last),
            PacketLength::Partial(len) => (len as usize, BodyState::Partial),
            PacketLength::Indeterminate => (0, BodyState::Indeterminate),
        };
        PacketBodyReader {
            inner,
            remaining,
            state,
        }
    }

    /// Returns the underlying reader, positioned after whatever has been consumed of the body.
    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn is_done(&self) -> bool {
        self.state == BodyState::Done
    }

    /// Reads and discards the rest of the body.
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    fn next_chunk(&mut self) -> io::Result<()> {
        while self.remaining == 0 {
            match self.state {
                BodyState::Last => {
                    self.state = BodyState::Done;
                    return Ok(());
                }
                BodyState::Partial => {
                    let mut olen = [0u8; 1];
                    self.inner.read_exact(&mut olen)?;
                    let length = read_new_length(olen[0], &mut self.inner)
                        .map_err(io::Error::from)?;
                    match length {
                        PacketLength::Fixed(len) => {
                            self.remaining = len as usize;
                            self.state = BodyState::Last;
                        }
                        PacketLength::Partial(len) => {
                            self.remaining = len as usize;
                        }
                        PacketLength::Indeterminate => unreachable!("not a new format length"),
                    }
                }
                BodyState::Indeterminate | BodyState::Done => return Ok(()),
            }
        }
        Ok(())
    }
}

impl<R: BufRead> BufRead for PacketBodyReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.next_chunk()?;
        match self.state {
            BodyState::Done => Ok(&[]),
            BodyState::Indeterminate => {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    self.state = BodyState::Done;
                }
                Ok(buf)
            }
            BodyState::Last | BodyState::Partial => {
                let remaining = self.remaining;
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "packet body truncated",
                    ));
                }
                let len = buf.len().min(remaining);
                Ok(&buf[..len])
            }
        }
    }

    fn consume(&mut self, amt: usize) {
        if self.state != BodyState::Indeterminate {
            self.remaining -= amt;
        }
        self.inner.consume(amt);
    }
}

impl<R: BufRead> Read for PacketBodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(data: &[u8], write_chunk: usize) -> Vec<u8> {
        let mut writer = PartialBodyWriter::new(Tag::LiteralData, Vec::new()).unwrap();
        for chunk in data.chunks(write_chunk.max(1)) {
            writer.write_all(chunk).unwrap();
        }
        let mut encoded = writer.finish().unwrap();
        encoded.extend_from_slice(b"trailer");

        let mut input = &encoded[..];
        let header = PacketHeader::try_from_reader(&mut input).unwrap().unwrap();
        assert_eq!(header.tag(), Tag::LiteralData);
        let mut body = PacketBodyReader::new(header, input);
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert!(body.is_done());

        let mut rest = Vec::new();
        body.into_inner().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"trailer");
        out
    }

    #[test]
    fn exact_chunk_boundaries() {
        for len in [0, 1, PARTIAL_LEN - 1, PARTIAL_LEN, PARTIAL_LEN + 1, 3 * PARTIAL_LEN] {
            let data = vec![0xAB; len];
            assert_eq!(roundtrip(&data, 1000), data);
        }
    }

    #[test]
    fn truncated_body() {
        let encoded = [0xCB, 0x05, 1, 2];
        let mut input = &encoded[..];
        let header = PacketHeader::try_from_reader(&mut input).unwrap().unwrap();
        let mut body = PacketBodyReader::new(header, input);
        let mut out = Vec::new();
        assert!(body.read_to_end(&mut out).is_err());
    }

    proptest! {
        #[test]
        fn any_chunking(data in proptest::collection::vec(any::<u8>(), 0..40_000), chunk in 1usize..10_000) {
            prop_assert_eq!(roundtrip(&data, chunk), data);
        }
    }
}
