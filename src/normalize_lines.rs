//! # Line ending normalization module
//!
//! Iterator and streaming helpers to normalize line endings, as needed for text signatures
//! and the cleartext signature framework.
//!
//! Based on <https://github.com/derekdreery/normalize-line-endings>.

use std::io::{self, Write};
use std::iter::Peekable;

/// Line break style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineBreak {
    Crlf,
    Lf,
}

impl AsRef<[u8]> for LineBreak {
    fn as_ref(&self) -> &[u8] {
        match self {
            LineBreak::Crlf => b"\r\n",
            LineBreak::Lf => b"\n",
        }
    }
}

/// This struct wraps an u8 iterator to normalize line endings.
///
/// `\r\n`, `\r` and `\n` are all treated as one line break.
pub struct Normalized<I>
where
    I: Iterator<Item = u8>,
{
    line_break: LineBreak,
    iter: Peekable<I>,
    prev_was_cr: bool,
}

impl<I: Iterator<Item = u8>> Normalized<I> {
    /// Take a u8 iterator and return similar iterator with normalized line endings
    ///
    /// # Example
    /// ```
    /// use pgp_handles::normalize_lines::{LineBreak, Normalized};
    ///
    /// let input = "This is a string \n with \r some \n\r\n random newlines\r\r\n\n";
    /// assert_eq!(
    ///     &String::from_utf8(Normalized::new(input.bytes(), LineBreak::Lf).collect()).unwrap(),
    ///     "This is a string \n with \n some \n\n random newlines\n\n\n"
    /// );
    /// ```
    pub fn new(iter: I, line_break: LineBreak) -> Normalized<I> {
        Normalized {
            iter: iter.peekable(),
            prev_was_cr: false,
            line_break,
        }
    }
}

impl<I: Iterator<Item = u8>> Iterator for Normalized<I> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        match self.iter.peek() {
            Some(b'\n') => match self.line_break {
                LineBreak::Lf => {
                    if self.prev_was_cr {
                        // we already inserted a \n
                        let _ = self.iter.next();
                    }
                    self.prev_was_cr = false;
                    self.iter.next()
                }
                LineBreak::Crlf => {
                    if self.prev_was_cr {
                        self.prev_was_cr = false;
                        self.iter.next()
                    } else {
                        self.prev_was_cr = true;
                        Some(b'\r')
                    }
                }
            },
            Some(b'\r') => match self.line_break {
                LineBreak::Lf => {
                    self.prev_was_cr = true;
                    let _ = self.iter.next();
                    Some(b'\n')
                }
                LineBreak::Crlf => {
                    if self.prev_was_cr {
                        self.prev_was_cr = false;
                        Some(b'\n')
                    } else {
                        self.prev_was_cr = true;
                        self.iter.next()
                    }
                }
            },
            _ => match self.line_break {
                LineBreak::Lf => {
                    self.prev_was_cr = false;
                    self.iter.next()
                }
                LineBreak::Crlf => {
                    let res = if self.prev_was_cr {
                        Some(b'\n')
                    } else {
                        self.iter.next()
                    };
                    self.prev_was_cr = false;
                    res
                }
            },
        }
    }
}

/// Incremental `\n` to `\r\n` conversion, carrying state across chunk boundaries.
///
/// Existing `\r\n` pairs are kept, a lone `\r` is passed through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrlfState {
    last_was_cr: bool,
}

impl CrlfState {
    /// Feeds `data`, handing normalized segments to `sink`.
    pub fn feed(&mut self, data: &[u8], mut sink: impl FnMut(&[u8])) {
        let mut start = 0;
        for (i, byte) in data.iter().enumerate() {
            if *byte == b'\n' && !self.last_was_cr {
                sink(&data[start..i]);
                sink(b"\r\n");
                start = i + 1;
            }
            self.last_was_cr = *byte == b'\r';
        }
        sink(&data[start..]);
    }
}

/// A writer converting `\n` line endings to `\r\n`.
#[derive(Debug)]
pub struct NormalizedWriter<W: Write> {
    inner: W,
    state: CrlfState,
}

impl<W: Write> NormalizedWriter<W> {
    pub fn new(inner: W) -> Self {
        NormalizedWriter {
            inner,
            state: CrlfState::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for NormalizedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut result = Ok(());
        let inner = &mut self.inner;
        self.state.feed(buf, |segment| {
            if result.is_ok() {
                result = inner.write_all(segment);
            }
        });
        result.map(|_| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Canonical form of a cleartext signed message: trailing whitespace removed from every
/// line, lines joined with `\r\n`, no line break after the last line.
pub fn canonicalize_cleartext(text: &str) -> Vec<u8> {
    let normalized: Vec<u8> = Normalized::new(text.bytes(), LineBreak::Lf).collect();
    let mut out = Vec::with_capacity(normalized.len() + normalized.len() / 32);
    for (i, line) in normalized.split(|b| *b == b'\n').enumerate() {
        if i > 0 {
            out.extend_from_slice(LineBreak::Crlf.as_ref());
        }
        let end = line
            .iter()
            .rposition(|b| !matches!(b, b' ' | b'\t'))
            .map_or(0, |pos| pos + 1);
        out.extend_from_slice(&line[..end]);
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn normalized_lf() {
        let input = "This is a string \n with \r some \n\r\n random newlines\r\r\n\n";
        assert_eq!(
            &String::from_utf8(Normalized::new(input.bytes(), LineBreak::Lf).collect()).unwrap(),
            "This is a string \n with \n some \n\n random newlines\n\n\n"
        );
    }

    #[test]
    fn normalized_crlf() {
        let input = "This is a string \n with \r some \n\r\n random newlines\r\r\n\n";
        assert_eq!(
            &String::from_utf8(Normalized::new(input.bytes(), LineBreak::Crlf).collect()).unwrap(),
            "This is a string \r\n with \r\n some \r\n\r\n random newlines\r\n\r\n\r\n"
        );
    }

    #[test]
    fn writer_keeps_crlf() {
        let mut writer = NormalizedWriter::new(Vec::new());
        writer.write_all(b"a\nb\r").unwrap();
        writer.write_all(b"\nc\rd\n").unwrap();
        assert_eq!(writer.into_inner(), b"a\r\nb\r\nc\rd\r\n");
    }

    #[test]
    fn cleartext() {
        assert_eq!(
            canonicalize_cleartext("hello \t\r\nworld  \n\nend\n"),
            b"hello\r\nworld\r\n\r\nend\r\n"
        );
        assert_eq!(canonicalize_cleartext("single"), b"single");
    }

    proptest! {
        #[test]
        fn chunking_does_not_matter(data in proptest::collection::vec(prop_oneof![Just(b'\r'), Just(b'\n'), Just(b'x')], 0..200), split in 0usize..200) {
            let split = split.min(data.len());
            let mut whole = NormalizedWriter::new(Vec::new());
            whole.write_all(&data).unwrap();

            let mut chunked = NormalizedWriter::new(Vec::new());
            chunked.write_all(&data[..split]).unwrap();
            chunked.write_all(&data[split..]).unwrap();

            prop_assert_eq!(whole.into_inner(), chunked.into_inner());
        }
    }
}
