use std::io::{self, Read};

use crate::errors::{Error, Result};

/// Streaming UTF-8 validation.
///
/// Input may be split at arbitrary positions, an incomplete trailing sequence is carried
/// over to the next call.
#[derive(Debug, Default)]
pub struct Utf8Checker {
    pending: Vec<u8>,
}

impl Utf8Checker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the next chunk of input.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        let mut data = data;
        if !self.pending.is_empty() {
            // complete the pending sequence first
            let needed = 4 - self.pending.len();
            let take = needed.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            match std::str::from_utf8(&self.pending) {
                Ok(_) => {
                    data = &data[take..];
                    self.pending.clear();
                }
                Err(err) if err.valid_up_to() > 0 => {
                    let used = err.valid_up_to() - (self.pending.len() - take);
                    data = &data[used..];
                    self.pending.clear();
                }
                Err(err) if err.error_len().is_some() => return Err(Error::InvalidUtf8),
                Err(_) => {
                    // still incomplete, all of `data` is buffered
                    return Ok(());
                }
            }
        }

        match std::str::from_utf8(data) {
            Ok(_) => Ok(()),
            Err(err) if err.error_len().is_none() => {
                self.pending
                    .extend_from_slice(&data[err.valid_up_to()..]);
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// Fails if the input ended inside a multi byte sequence.
    pub fn finish(&self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidUtf8)
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
pub(crate) fn fill_buffer<R: Read>(mut reader: R, buf: &mut [u8]) -> io::Result<usize> {
    let mut offset = 0;
    while offset < buf.len() {
        match reader.read(&mut buf[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn split_sequence() {
        let text = "grüße 🦀".as_bytes();
        for split in 0..text.len() {
            let mut checker = Utf8Checker::new();
            checker.update(&text[..split]).unwrap();
            checker.update(&text[split..]).unwrap();
            checker.finish().unwrap();
        }
    }

    #[test]
    fn rejects_invalid() {
        let mut checker = Utf8Checker::new();
        assert!(matches!(
            checker.update(&[b'a', 0xFF, b'b']),
            Err(Error::InvalidUtf8)
        ));

        let mut checker = Utf8Checker::new();
        checker.update(&[0xF0, 0x9F]).unwrap();
        assert!(checker.finish().is_err());
    }

    #[test]
    fn fill_buffer_short_input() {
        let mut buf = [0u8; 8];
        assert_eq!(fill_buffer(&b"abc"[..], &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    proptest! {
        #[test]
        fn chunked_matches_whole(data in proptest::collection::vec(any::<u8>(), 0..64), chunk in 1usize..8) {
            let expected = std::str::from_utf8(&data).is_ok();
            let mut checker = Utf8Checker::new();
            let mut ok = true;
            for part in data.chunks(chunk) {
                if checker.update(part).is_err() {
                    ok = false;
                    break;
                }
            }
            ok = ok && checker.finish().is_ok();
            prop_assert_eq!(ok, expected);
        }

        #[test]
        fn valid_text_always_passes(text in "\\PC*", chunk in 1usize..8) {
            let mut checker = Utf8Checker::new();
            for part in text.as_bytes().chunks(chunk) {
                checker.update(part).unwrap();
            }
            checker.finish().unwrap();
        }
    }
}
