use std::io::{self, Read, Write};

use byteorder::{BigEndian, WriteBytesExt};
use hkdf::Hkdf;
use log::debug;
use rand::{CryptoRng, Rng};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::aead::{AeadAlgorithm, AeadConfig};
use crate::crypto::sym::{CfbDecryptor, CfbEncryptor, SymmetricKeyAlgorithm};
use crate::errors::{ensure, unsupported_err, Error, Result};
use crate::packet::PartialBodyWriter;
use crate::types::Tag;

const MDC_LEN: usize = 22;
const READ_CHUNK: usize = 8 * 1024;

/// The unencrypted header of a Symmetrically Encrypted Integrity Protected Data packet.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetrically-encrypted-and>
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum SeipdHeader {
    /// CFB encryption with a modification detection code.
    V1,
    /// Chunked AEAD encryption.
    V2 {
        sym_alg: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        chunk_size: u8,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 32],
    },
}

/// Key material and bookkeeping shared by the v2 writer and reader.
struct ChunkCipher {
    sym_alg: SymmetricKeyAlgorithm,
    aead: AeadAlgorithm,
    key: Zeroizing<Vec<u8>>,
    iv: Vec<u8>,
    info: [u8; 5],
    chunk_len: usize,
    index: u64,
    total: u64,
}

impl ChunkCipher {
    fn new(
        sym_alg: SymmetricKeyAlgorithm,
        aead: AeadAlgorithm,
        chunk_size: u8,
        salt: &[u8; 32],
        session_key: &[u8],
    ) -> Result<Self> {
        ensure!(sym_alg.is_supported(), "unsupported cipher {}", sym_alg);
        ensure!(
            session_key.len() == sym_alg.key_size(),
            "session key does not match {}",
            sym_alg
        );
        ensure!(chunk_size <= 16, "invalid AEAD chunk size {}", chunk_size);
        let info = [
            0xC0 | u8::from(Tag::SymEncryptedProtectedData),
            2,
            sym_alg.into(),
            aead.into(),
            chunk_size,
        ];
        let hk = Hkdf::<Sha256>::new(Some(&salt[..]), session_key);
        let mut okm = Zeroizing::new(vec![0u8; sym_alg.key_size() + aead.iv_size()]);
        hk.expand(&info, &mut okm)
            .map_err(|_| Error::InvalidKeyLength)?;
        let (key, iv) = okm.split_at(sym_alg.key_size());

        Ok(ChunkCipher {
            sym_alg,
            aead,
            key: Zeroizing::new(key.to_vec()),
            iv: iv.to_vec(),
            info,
            chunk_len: AeadConfig {
                algorithm: aead,
                chunk_size,
            }
            .chunk_len(),
            index: 0,
            total: 0,
        })
    }

    fn nonce(&self) -> Vec<u8> {
        let mut nonce = self.iv.clone();
        nonce.extend_from_slice(&self.index.to_be_bytes());
        nonce
    }

    fn final_aad(&self) -> Vec<u8> {
        let mut aad = self.info.to_vec();
        aad.extend_from_slice(&self.total.to_be_bytes());
        aad
    }

    fn encrypt_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let out = self
            .aead
            .encrypt(self.sym_alg, &self.key, &self.nonce(), &self.info, chunk)?;
        self.index += 1;
        self.total += chunk.len() as u64;
        Ok(out)
    }

    fn decrypt_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        let out = self
            .aead
            .decrypt(self.sym_alg, &self.key, &self.nonce(), &self.info, chunk)?;
        self.index += 1;
        self.total += out.len() as u64;
        Ok(out)
    }

    fn final_tag(&self) -> Result<Vec<u8>> {
        self.aead
            .encrypt(self.sym_alg, &self.key, &self.nonce(), &self.final_aad(), &[])
    }

    fn check_final_tag(&self, tag: &[u8]) -> Result<()> {
        self.aead
            .decrypt(self.sym_alg, &self.key, &self.nonce(), &self.final_aad(), tag)?;
        Ok(())
    }
}

enum WriterState {
    V1 {
        encryptor: CfbEncryptor,
        mdc: Sha1,
    },
    V2 {
        cipher: ChunkCipher,
        buffer: Zeroizing<Vec<u8>>,
    },
}

/// Streams an encrypted data packet, header and partial body framing included.
pub struct SeipdWriter<W: Write> {
    inner: PartialBodyWriter<W>,
    state: WriterState,
}

impl<W: Write> SeipdWriter<W> {
    /// Version 1: CFB with a random prefix and a trailing MDC.
    pub fn v1<R: Rng + CryptoRng>(
        mut rng: R,
        sym_alg: SymmetricKeyAlgorithm,
        session_key: &[u8],
        inner: W,
    ) -> Result<Self> {
        ensure!(
            session_key.len() == sym_alg.key_size(),
            "session key does not match {}",
            sym_alg
        );
        let mut inner = PartialBodyWriter::new(Tag::SymEncryptedProtectedData, inner)?;
        inner.write_u8(1)?;

        let bs = sym_alg.block_size();
        let iv = vec![0u8; bs];
        let mut encryptor = CfbEncryptor::new(sym_alg, session_key, &iv)?;
        let mut prefix = vec![0u8; bs + 2];
        rng.fill_bytes(&mut prefix[..bs]);
        prefix[bs] = prefix[bs - 2];
        prefix[bs + 1] = prefix[bs - 1];

        let mut mdc = Sha1::new();
        mdc.update(&prefix);
        encryptor.encrypt(&mut prefix);
        inner.write_all(&prefix)?;
        debug!("writing SEIPD v1 with {}", sym_alg);

        Ok(SeipdWriter {
            inner,
            state: WriterState::V1 { encryptor, mdc },
        })
    }

    /// Version 2: chunked AEAD keyed by HKDF over the session key and a random salt.
    pub fn v2<R: Rng + CryptoRng>(
        mut rng: R,
        sym_alg: SymmetricKeyAlgorithm,
        aead: AeadConfig,
        session_key: &[u8],
        inner: W,
    ) -> Result<Self> {
        let mut salt = [0u8; 32];
        rng.fill_bytes(&mut salt);
        let cipher = ChunkCipher::new(sym_alg, aead.algorithm, aead.chunk_size, &salt, session_key)?;

        let mut inner = PartialBodyWriter::new(Tag::SymEncryptedProtectedData, inner)?;
        inner.write_all(&[2, sym_alg.into(), aead.algorithm.into(), aead.chunk_size])?;
        inner.write_all(&salt)?;
        debug!(
            "writing SEIPD v2 with {} {:?}, chunk size {}",
            sym_alg, aead.algorithm, aead.chunk_size
        );

        Ok(SeipdWriter {
            inner,
            state: WriterState::V2 {
                cipher,
                buffer: Zeroizing::new(Vec::new()),
            },
        })
    }

    /// Writes the integrity trailer and closes the packet body.
    pub fn finish(mut self) -> io::Result<W> {
        match self.state {
            WriterState::V1 {
                mut encryptor,
                mut mdc,
            } => {
                mdc.update([0xD3, 0x14]);
                let mut trailer = vec![0xD3, 0x14];
                trailer.extend_from_slice(&mdc.finalize());
                encryptor.encrypt(&mut trailer);
                self.inner.write_all(&trailer)?;
            }
            WriterState::V2 {
                mut cipher,
                buffer,
            } => {
                if !buffer.is_empty() {
                    let out = cipher.encrypt_chunk(&buffer)?;
                    self.inner.write_all(&out)?;
                }
                let tag = cipher.final_tag()?;
                self.inner.write_all(&tag)?;
            }
        }
        self.inner.finish()
    }
}

impl<W: Write> Write for SeipdWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            WriterState::V1 { encryptor, mdc } => {
                mdc.update(buf);
                let mut data = buf.to_vec();
                encryptor.encrypt(&mut data);
                self.inner.write_all(&data)?;
            }
            WriterState::V2 { cipher, buffer } => {
                buffer.extend_from_slice(buf);
                let mut start = 0;
                while buffer.len() - start >= cipher.chunk_len {
                    let out = cipher.encrypt_chunk(&buffer[start..start + cipher.chunk_len])?;
                    self.inner.write_all(&out)?;
                    start += cipher.chunk_len;
                }
                buffer.drain(..start);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum ReaderState {
    V1 {
        decryptor: CfbDecryptor,
        mdc: Sha1,
        pending: Vec<u8>,
    },
    V2 {
        cipher: ChunkCipher,
        buffer: Vec<u8>,
    },
    Done,
}

/// Decrypts the body of an encrypted data packet.
///
/// Plaintext is released as it is authenticated; the integrity check of the whole packet
/// happens when the body is exhausted, reading to EOF reports a failed check as error.
pub struct SeipdReader<R: Read> {
    inner: R,
    header: SeipdHeader,
    state: ReaderState,
    out: Zeroizing<Vec<u8>>,
    out_pos: usize,
}

impl<R: Read> SeipdReader<R> {
    /// Reads the packet header and sets up decryption.
    ///
    /// `sym_alg` must be known for version 1 packets, version 2 packets carry their own.
    pub fn new(
        mut inner: R,
        session_key: &[u8],
        sym_alg: Option<SymmetricKeyAlgorithm>,
    ) -> Result<Self> {
        let mut version = [0u8; 1];
        inner.read_exact(&mut version)?;
        let (header, state) = match version[0] {
            1 => {
                let Some(sym_alg) = sym_alg else {
                    unsupported_err!("version 1 encrypted data without a symmetric algorithm");
                };
                ensure!(sym_alg.is_supported(), "unsupported cipher {}", sym_alg);
                ensure!(
                    session_key.len() == sym_alg.key_size(),
                    "session key does not match {}",
                    sym_alg
                );
                let bs = sym_alg.block_size();
                let iv = vec![0u8; bs];
                let mut decryptor = CfbDecryptor::new(sym_alg, session_key, &iv)?;
                let mut prefix = vec![0u8; bs + 2];
                inner.read_exact(&mut prefix)?;
                decryptor.decrypt(&mut prefix);
                if prefix[bs - 2..bs] != prefix[bs..] {
                    return Err(Error::IntegrityCheck);
                }
                let mut mdc = Sha1::new();
                mdc.update(&prefix);
                debug!("reading SEIPD v1 with {}", sym_alg);
                (
                    SeipdHeader::V1,
                    ReaderState::V1 {
                        decryptor,
                        mdc,
                        pending: Vec::new(),
                    },
                )
            }
            2 => {
                let mut fields = [0u8; 3];
                inner.read_exact(&mut fields)?;
                let mut salt = [0u8; 32];
                inner.read_exact(&mut salt)?;
                let sym_alg = SymmetricKeyAlgorithm::from(fields[0]);
                let aead = AeadAlgorithm::from(fields[1]);
                let chunk_size = fields[2];
                let cipher = ChunkCipher::new(sym_alg, aead, chunk_size, &salt, session_key)?;
                debug!(
                    "reading SEIPD v2 with {} {:?}, chunk size {}",
                    sym_alg, aead, chunk_size
                );
                (
                    SeipdHeader::V2 {
                        sym_alg,
                        aead,
                        chunk_size,
                        salt,
                    },
                    ReaderState::V2 {
                        cipher,
                        buffer: Vec::new(),
                    },
                )
            }
            v => unsupported_err!("SEIPD version {}", v),
        };

        Ok(SeipdReader {
            inner,
            header,
            state,
            out: Zeroizing::new(Vec::new()),
            out_pos: 0,
        })
    }

    pub fn header(&self) -> &SeipdHeader {
        &self.header
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads up to `limit` octets into `buf`, returns whether the source hit EOF.
    fn fill(inner: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        while buf.len() < limit {
            let want = (limit - buf.len()).min(READ_CHUNK);
            let read = inner.read(&mut chunk[..want])?;
            if read == 0 {
                return Ok(true);
            }
            buf.extend_from_slice(&chunk[..read]);
        }
        Ok(false)
    }

    /// Produces the next batch of plaintext into `self.out`.
    fn next_plaintext(&mut self) -> Result<()> {
        self.out.clear();
        self.out_pos = 0;
        match &mut self.state {
            ReaderState::V1 {
                decryptor,
                mdc,
                pending,
            } => {
                let start = pending.len();
                let eof = Self::fill(&mut self.inner, pending, start + READ_CHUNK)?;
                decryptor.decrypt(&mut pending[start..]);

                if pending.len() > MDC_LEN {
                    let release = pending.len() - MDC_LEN;
                    mdc.update(&pending[..release]);
                    self.out.extend_from_slice(&pending[..release]);
                    pending.drain(..release);
                }

                if eof {
                    if pending.len() != MDC_LEN || pending[..2] != [0xD3, 0x14] {
                        return Err(Error::IntegrityCheck);
                    }
                    mdc.update(&pending[..2]);
                    let digest = mdc.finalize_reset();
                    if !bool::from(digest[..].ct_eq(&pending[2..])) {
                        return Err(Error::IntegrityCheck);
                    }
                    self.state = ReaderState::Done;
                }
            }
            ReaderState::V2 { cipher, buffer } => {
                let tag_len = cipher.aead.tag_size();
                let limit = cipher.chunk_len + 2 * tag_len;
                let eof = Self::fill(&mut self.inner, buffer, limit)?;
                if !eof {
                    let chunk_end = cipher.chunk_len + tag_len;
                    let plain = cipher.decrypt_chunk(&buffer[..chunk_end])?;
                    self.out.extend_from_slice(&plain);
                    buffer.drain(..chunk_end);
                } else {
                    if buffer.len() < tag_len {
                        return Err(Error::IntegrityCheck);
                    }
                    let (chunk, tag) = buffer.split_at(buffer.len() - tag_len);
                    if !chunk.is_empty() {
                        if chunk.len() <= tag_len {
                            return Err(Error::IntegrityCheck);
                        }
                        let plain = cipher.decrypt_chunk(chunk)?;
                        self.out.extend_from_slice(&plain);
                    }
                    cipher.check_final_tag(tag)?;
                    self.state = ReaderState::Done;
                }
            }
            ReaderState::Done => {}
        }
        Ok(())
    }
}

impl<R: Read> Read for SeipdReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_pos < self.out.len() {
                let n = buf.len().min(self.out.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if matches!(self.state, ReaderState::Done) || buf.is_empty() {
                return Ok(0);
            }
            self.next_plaintext()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::packet::{PacketBodyReader, PacketHeader};

    fn encrypt(v2: bool, data: &[u8], key: &[u8], write_chunk: usize) -> Vec<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut writer = if v2 {
            let aead = AeadConfig {
                algorithm: AeadAlgorithm::Gcm,
                chunk_size: 0,
            };
            SeipdWriter::v2(&mut rng, SymmetricKeyAlgorithm::AES128, aead, key, Vec::new()).unwrap()
        } else {
            SeipdWriter::v1(&mut rng, SymmetricKeyAlgorithm::AES128, key, Vec::new()).unwrap()
        };
        for chunk in data.chunks(write_chunk.max(1)) {
            writer.write_all(chunk).unwrap();
        }
        writer.finish().unwrap()
    }

    fn decrypt(packet: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let mut input = packet;
        let header = PacketHeader::try_from_reader(&mut input)?.unwrap();
        assert_eq!(header.tag(), Tag::SymEncryptedProtectedData);
        let body = PacketBodyReader::new(header, input);
        let mut reader = SeipdReader::new(body, key, Some(SymmetricKeyAlgorithm::AES128))?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn empty_messages() {
        let key = [3u8; 16];
        for v2 in [false, true] {
            let packet = encrypt(v2, &[], &key, 1);
            assert_eq!(decrypt(&packet, &key).unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn tampering_is_detected() {
        let key = [3u8; 16];
        let data = vec![7u8; 300];
        for v2 in [false, true] {
            let mut packet = encrypt(v2, &data, &key, 50);
            let pos = packet.len() - 30;
            packet[pos] ^= 1;
            let err = decrypt(&packet, &key).unwrap_err();
            assert!(matches!(err, Error::IntegrityCheck | Error::Aead), "{err:?}");
        }
    }

    #[test]
    fn wrong_key() {
        let data = b"secret data".to_vec();
        for v2 in [false, true] {
            let packet = encrypt(v2, &data, &[3u8; 16], 4);
            assert!(decrypt(&packet, &[4u8; 16]).is_err());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn roundtrip(data in proptest::collection::vec(any::<u8>(), 0..3000), chunk in 1usize..700, v2: bool) {
            let key = [9u8; 16];
            let packet = encrypt(v2, &data, &key, chunk);
            prop_assert_eq!(decrypt(&packet, &key).unwrap(), data);
        }
    }
}
