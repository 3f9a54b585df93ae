use std::hash::Hasher;
use std::io::{self, BufRead, Read};

use base64::engine::{general_purpose::STANDARD, Engine as _};
use crc24::Crc24Hasher;
use log::debug;

use crate::armor::BlockType;
use crate::errors::{Error, Result};

/// Upper bound for a single armor line.
const MAX_LINE: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Body,
    Done,
}

/// Streaming decoder for ASCII armor.
#[derive(derive_more::Debug)]
pub struct Dearmor<R: BufRead> {
    #[debug(skip)]
    inner: R,
    typ: Option<BlockType>,
    headers: Vec<(String, String)>,
    state: State,
    #[debug(skip)]
    decoded: Vec<u8>,
    pos: usize,
    /// Base64 characters not yet forming a full quantum.
    #[debug(skip)]
    carry: String,
    #[debug(skip)]
    crc: Crc24Hasher,
    line: String,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidArmor {
        message: message.into(),
    }
}

impl<R: BufRead> Dearmor<R> {
    pub fn new(inner: R) -> Self {
        Dearmor {
            inner,
            typ: None,
            headers: Vec::new(),
            state: State::Header,
            decoded: Vec::new(),
            pos: 0,
            carry: String::new(),
            crc: Crc24Hasher::new(),
            line: String::new(),
        }
    }

    /// The block type, available once the header was read.
    pub fn typ(&self) -> Option<BlockType> {
        self.typ
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next line into `self.line`, without line ending. Returns `false` at EOF.
    fn next_line(&mut self) -> Result<bool> {
        self.line.clear();
        let read = (&mut self.inner).take(MAX_LINE).read_line(&mut self.line)?;
        if read == 0 {
            return Ok(false);
        }
        if !self.line.ends_with('\n') && read as u64 == MAX_LINE {
            return Err(invalid("line too long"));
        }
        let trimmed = self.line.trim_end().len();
        self.line.truncate(trimmed);
        Ok(true)
    }

    /// Reads the armor header line and the armor headers.
    pub fn read_header(&mut self) -> Result<BlockType> {
        if let Some(typ) = self.typ {
            return Ok(typ);
        }
        loop {
            if !self.next_line()? {
                return Err(invalid("missing armor header"));
            }
            if !self.line.trim().is_empty() {
                break;
            }
        }
        let label = self
            .line
            .trim()
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
            .ok_or_else(|| invalid("missing armor header"))?;
        let typ = BlockType::from_label(label)
            .ok_or_else(|| invalid(format!("unknown block type {label}")))?;
        debug!("armor block {}", typ);
        self.typ = Some(typ);

        while self.next_line()? {
            if self.line.is_empty() {
                break;
            }
            match self.line.split_once(": ") {
                Some((key, value)) => self.headers.push((key.to_string(), value.to_string())),
                None => {
                    // body without the separating blank line
                    let line = std::mem::take(&mut self.line);
                    self.state = State::Body;
                    self.body_line(&line)?;
                    return Ok(typ);
                }
            }
        }
        self.state = State::Body;
        Ok(typ)
    }

    fn body_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("-----END ") {
            let label = rest
                .strip_suffix("-----")
                .ok_or_else(|| invalid("invalid armor footer"))?;
            if BlockType::from_label(label) != self.typ {
                return Err(invalid("armor footer does not match header"));
            }
            self.flush_carry(true)?;
            self.state = State::Done;
            return Ok(());
        }
        if line.len() == 5 && line.starts_with('=') {
            self.flush_carry(true)?;
            let raw = STANDARD.decode(&line[1..])?;
            if raw.len() != 3 {
                return Err(invalid("invalid checksum line"));
            }
            let expected = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
            let actual = self.crc.finish() as u32;
            if expected != actual {
                return Err(Error::InvalidChecksum);
            }
            return Ok(());
        }
        self.carry.push_str(line);
        self.flush_carry(false)
    }

    fn flush_carry(&mut self, last: bool) -> Result<()> {
        let take = if last {
            self.carry.len()
        } else {
            self.carry.len() - self.carry.len() % 4
        };
        if take == 0 {
            return Ok(());
        }
        let decoded = STANDARD.decode(&self.carry[..take])?;
        self.crc.write(&decoded);
        self.decoded.extend_from_slice(&decoded);
        self.carry.drain(..take);
        Ok(())
    }

    fn fill(&mut self) -> Result<()> {
        self.decoded.clear();
        self.pos = 0;
        match self.state {
            State::Header => {
                self.read_header()?;
            }
            State::Body => {
                if !self.next_line()? {
                    return Err(invalid("missing armor footer"));
                }
                let line = std::mem::take(&mut self.line);
                self.body_line(&line)?;
                self.line = line;
            }
            State::Done => {}
        }
        Ok(())
    }
}

impl<R: BufRead> Read for Dearmor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.decoded.len() {
                let n = buf.len().min(self.decoded.len() - self.pos);
                buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.state == State::Done || buf.is_empty() {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}

/// Decodes a complete armored block.
pub fn parse(input: &[u8]) -> Result<(BlockType, Vec<u8>)> {
    let mut dearmor = Dearmor::new(input);
    let mut out = Vec::new();
    dearmor.read_to_end(&mut out)?;
    let typ = dearmor
        .typ()
        .ok_or_else(|| invalid("missing armor header"))?;
    Ok((typ, out))
}
