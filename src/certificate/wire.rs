//! Binary encoding of certificate trails: little-endian `i32` only, see the module
//! documentation of [`crate::certificate`] for the layout.
//!
//! Every mutation is a 24 bytes record (tag + 5 fields) so that a reader never has to know
//! the tag before knowing the record size.

use std::io::{self, Read, Write};

use super::{
    Certificate, CertificateError, CertificateTrail, Hint, Mutation, Result, StableId, StableLit,
};

const TAG_REPLACE: i32 = 0;
const TAG_CREATE: i32 = 1;

/// Size in bytes of an encoded mutation.
pub const MUTATION_SIZE: usize = 24;
/// Size in bytes of an encoded hint.
pub const HINT_SIZE: usize = 12;

/// Upper bound for preallocation, counts come from untrusted input.
const MAX_PREALLOC: usize = 1 << 12;

fn encode_id(id: StableId) -> Result<i32> {
    if id.is_writable() {
        Ok(id.get() as i32)
    } else {
        Err(CertificateError::IdOutOfRange(id))
    }
}

fn encode_count(count: usize) -> Result<i32> {
    i32::try_from(count).map_err(|_| CertificateError::Decode(format!("count {} does not fit on 32 bits", count)))
}

/// Writes little-endian `i32`s through `write_all`, so that short writes are errors.
struct Encoder<W: Write> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    fn int(&mut self, value: i32) -> io::Result<()> {
        self.writer.write_all(&value.to_le_bytes())
    }

    fn record(&mut self, values: &[i32]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(4 * values.len());
        for value in values {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        self.writer.write_all(&buf)
    }

    fn mutation(&mut self, mutation: &Mutation) -> Result<()> {
        let record = match *mutation {
            Mutation::Replace {
                old_id,
                new_id,
                complement,
            } => [
                TAG_REPLACE,
                encode_id(old_id)?,
                encode_id(new_id)?,
                complement as i32,
                0,
                0,
            ],
            Mutation::Create { id, fanin0, fanin1 } => [
                TAG_CREATE,
                encode_id(id)?,
                encode_id(fanin0.0)?,
                fanin0.1 as i32,
                encode_id(fanin1.0)?,
                fanin1.1 as i32,
            ],
        };
        Ok(self.record(&record)?)
    }

    fn hint(&mut self, hint: &Hint) -> Result<()> {
        Ok(self.record(&[
            encode_id(hint.id)?,
            encode_id(hint.id_eq)?,
            hint.compl_eq as i32,
        ])?)
    }

    fn certificate(&mut self, certificate: &Certificate) -> Result<()> {
        self.int(encode_count(certificate.mutations().len())?)?;
        for mutation in certificate.mutations() {
            self.mutation(mutation)?;
        }
        self.int(encode_count(certificate.hints().len())?)?;
        for hint in certificate.hints() {
            self.hint(hint)?;
        }
        Ok(())
    }
}

struct Decoder<R: Read> {
    reader: R,
    offset: usize,
}

impl<R: Read> Decoder<R> {
    fn int(&mut self) -> Result<i32> {
        let mut bytes = [0u8; 4];
        self.reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                CertificateError::Decode(format!("truncated input at byte {}", self.offset))
            }
            _ => CertificateError::Io(e),
        })?;
        self.offset += 4;
        Ok(i32::from_le_bytes(bytes))
    }

    fn count(&mut self, what: &str) -> Result<usize> {
        let at = self.offset;
        let count = self.int()?;
        usize::try_from(count)
            .map_err(|_| CertificateError::Decode(format!("negative {} count {} at byte {}", what, count, at)))
    }

    fn id(&mut self) -> Result<StableId> {
        let at = self.offset;
        let id = self.int()?;
        u32::try_from(id)
            .map(StableId::new)
            .map_err(|_| CertificateError::Decode(format!("negative stable id {} at byte {}", id, at)))
    }

    fn flag(&mut self) -> Result<bool> {
        let at = self.offset;
        match self.int()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CertificateError::Decode(format!(
                "expected boolean at byte {}, got {}",
                at, other
            ))),
        }
    }

    fn lit(&mut self) -> Result<StableLit> {
        Ok((self.id()?, self.flag()?))
    }

    fn mutation(&mut self) -> Result<Mutation> {
        let at = self.offset;
        match self.int()? {
            TAG_REPLACE => {
                let mutation = Mutation::Replace {
                    old_id: self.id()?,
                    new_id: self.id()?,
                    complement: self.flag()?,
                };
                for _ in 0..2 {
                    let at = self.offset;
                    if self.int()? != 0 {
                        return Err(CertificateError::Decode(format!(
                            "nonzero padding at byte {}",
                            at
                        )));
                    }
                }
                Ok(mutation)
            }
            TAG_CREATE => Ok(Mutation::Create {
                id: self.id()?,
                fanin0: self.lit()?,
                fanin1: self.lit()?,
            }),
            tag => Err(CertificateError::Decode(format!(
                "unknown mutation tag {} at byte {}",
                tag, at
            ))),
        }
    }

    fn hint(&mut self) -> Result<Hint> {
        Ok(Hint {
            id: self.id()?,
            id_eq: self.id()?,
            compl_eq: self.flag()?,
        })
    }

    fn certificate(&mut self) -> Result<Certificate> {
        let n_mutations = self.count("mutation")?;
        let mut mutations = Vec::with_capacity(n_mutations.min(MAX_PREALLOC));
        for _ in 0..n_mutations {
            mutations.push(self.mutation()?);
        }
        let n_hints = self.count("hint")?;
        let mut hints = Vec::with_capacity(n_hints.min(MAX_PREALLOC));
        for _ in 0..n_hints {
            hints.push(self.hint()?);
        }
        Ok(Certificate::new(mutations, hints))
    }
}

impl Certificate {
    /// Writes this certificate alone (no trail count).
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        Encoder { writer }.certificate(self)
    }

    /// Reads one certificate (no trail count).
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        Decoder { reader, offset: 0 }.certificate()
    }
}

impl CertificateTrail {
    /// Writes the whole trail.
    ///
    /// Fails with [`CertificateError::IdOutOfRange`] if an id does not fit in an `i32`.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut encoder = Encoder { writer };
        encoder.int(encode_count(self.len())?)?;
        for certificate in self {
            encoder.certificate(certificate)?;
        }
        encoder.writer.flush()?;
        Ok(())
    }

    /// Reads a whole trail. Unknown tags, non boolean flags, nonzero padding, negative counts
    /// and truncated input are rejected.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut decoder = Decoder { reader, offset: 0 };
        let count = decoder.count("certificate")?;
        let mut trail = CertificateTrail::new();
        for _ in 0..count {
            trail.push(decoder.certificate()?);
        }
        Ok(trail)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Same as [`read_from`](CertificateTrail::read_from), but trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let trail = CertificateTrail::read_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(CertificateError::Decode(format!(
                "{} trailing bytes",
                reader.len()
            )));
        }
        Ok(trail)
    }
}
