use std::hash::Hasher;
use std::io::{self, Write};

use base64::engine::{general_purpose, Engine as _};
use crc24::Crc24Hasher;

use crate::armor::BlockType;
use crate::errors::Result;

/// Raw octets per armored line, 64 base64 characters.
const LINE_OCTETS: usize = 48;

/// Streams ASCII armor.
///
/// [`ArmorWriter::finish`] writes the last line, the optional checksum and the footer.
#[derive(derive_more::Debug)]
pub struct ArmorWriter<W: Write> {
    #[debug(skip)]
    inner: W,
    typ: BlockType,
    #[debug(skip)]
    crc: Option<Crc24Hasher>,
    #[debug("{}", pending.len())]
    pending: Vec<u8>,
}

impl<W: Write> ArmorWriter<W> {
    pub fn new(typ: BlockType, include_checksum: bool, mut inner: W) -> io::Result<Self> {
        write!(inner, "-----BEGIN {typ}-----\n\n")?;
        Ok(ArmorWriter {
            inner,
            typ,
            crc: include_checksum.then(Crc24Hasher::new),
            pending: Vec::with_capacity(LINE_OCTETS * 2),
        })
    }

    fn write_line(&mut self, data: &[u8]) -> io::Result<()> {
        let line = general_purpose::STANDARD.encode(data);
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")
    }

    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.write_line(&rest)?;
        }
        if let Some(crc) = self.crc.take() {
            let crc = crc.finish() as u32;
            let crc_enc = general_purpose::STANDARD.encode(&crc.to_be_bytes()[1..]);
            writeln!(self.inner, "={crc_enc}")?;
        }
        writeln!(self.inner, "-----END {}-----", self.typ)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ArmorWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(crc) = self.crc.as_mut() {
            crc.write(buf);
        }
        self.pending.extend_from_slice(buf);
        let mut start = 0;
        while self.pending.len() - start >= LINE_OCTETS {
            let line = general_purpose::STANDARD.encode(&self.pending[start..start + LINE_OCTETS]);
            self.inner.write_all(line.as_bytes())?;
            self.inner.write_all(b"\n")?;
            start += LINE_OCTETS;
        }
        self.pending.drain(..start);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Armors `data` in one go.
pub fn write(data: &[u8], typ: BlockType, writer: &mut impl Write, include_checksum: bool) -> Result<()> {
    let mut armor = ArmorWriter::new(typ, include_checksum, writer)?;
    armor.write_all(data)?;
    armor.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn writes_no_doubleline() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        for i in (2..1024).step_by(7) {
            let buf: Vec<u8> = (0..i).map(|_| rng.gen()).collect();
            let mut dest = Vec::new();
            write(&buf, BlockType::Message, &mut dest, true).unwrap();

            let dest_str = std::str::from_utf8(&dest).unwrap();
            let lines = dest_str.lines().collect::<Vec<_>>();

            assert_eq!(lines[0], "-----BEGIN PGP MESSAGE-----");
            assert!(lines[1].is_empty());
            assert!(
                !lines[lines.len() - 3].is_empty(),
                "last line must not be empty"
            );
            assert_eq!(
                lines[lines.len() - 2].len(),
                5,
                "invalid checksum line: '{}'",
                lines[lines.len() - 2]
            );
            assert_eq!(lines[lines.len() - 1], "-----END PGP MESSAGE-----");
            assert!(lines.iter().all(|line| line.len() <= 64));
        }
    }

    #[test]
    fn writes_no_checksum() {
        let mut dest = Vec::new();
        write(&[1u8; 100], BlockType::Signature, &mut dest, false).unwrap();
        let dest_str = std::str::from_utf8(&dest).unwrap();
        assert!(!dest_str.contains("\n="));
        assert!(dest_str.ends_with("-----END PGP SIGNATURE-----\n"));
    }
}
