//! Bit-packed nucleotide record stream.
//!
//! The internal interchange format for N-free sequences: each record is a
//! 32-bit little-endian base count followed by `ceil(len/4)` bytes packing
//! four bases per byte (A=00, C=01, G=10, T=11, first base in the low
//! bits). Ambiguous bases are not representable; writers reject them.

use crate::utils::seq::{base_to_bits, bits_to_base};
use anyhow::{anyhow, Result};
use std::io::{self, Read, Write};

pub struct NucleotideBitsWriter<W: Write> {
    out: W,
}

impl<W: Write> NucleotideBitsWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write(&mut self, seq: &[u8]) -> Result<()> {
        if seq.len() > u32::MAX as usize {
            return Err(anyhow!("sequence too long for a packed record"));
        }
        let mut packed = vec![0u8; seq.len().div_ceil(4)];
        for (i, &base) in seq.iter().enumerate() {
            let bits = base_to_bits(base)
                .ok_or_else(|| anyhow!("cannot pack ambiguous base {:?}", base as char))?;
            packed[i / 4] |= bits << ((i % 4) * 2);
        }
        self.out.write_all(&(seq.len() as u32).to_le_bytes())?;
        self.out.write_all(&packed)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub struct NucleotideBitsReader<R: Read> {
    input: R,
}

impl<R: Read> NucleotideBitsReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Next record, or `None` at a clean end of stream. A partial record
    /// is an error.
    pub fn next_seq(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match self.input.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut packed = vec![0u8; len.div_ceil(4)];
        self.input.read_exact(&mut packed)?;

        let mut seq = Vec::with_capacity(len);
        for i in 0..len {
            seq.push(bits_to_base(packed[i / 4] >> ((i % 4) * 2)));
        }
        Ok(Some(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut buf = Vec::new();
        {
            let mut writer = NucleotideBitsWriter::new(&mut buf);
            writer.write(b"ACGTACGTT").unwrap();
            writer.write(b"G").unwrap();
            writer.write(b"").unwrap();
        }
        // 4 + 3 bytes, 4 + 1, 4 + 0
        assert_eq!(buf.len(), 7 + 5 + 4);

        let mut reader = NucleotideBitsReader::new(buf.as_slice());
        assert_eq!(reader.next_seq().unwrap().unwrap(), b"ACGTACGTT");
        assert_eq!(reader.next_seq().unwrap().unwrap(), b"G");
        assert_eq!(reader.next_seq().unwrap().unwrap(), b"");
        assert!(reader.next_seq().unwrap().is_none());
    }

    #[test]
    fn test_rejects_ambiguous_bases() {
        let mut buf = Vec::new();
        let mut writer = NucleotideBitsWriter::new(&mut buf);
        assert!(writer.write(b"ACGN").is_err());
    }

    #[test]
    fn test_truncated_record_is_error() {
        let mut buf = Vec::new();
        {
            let mut writer = NucleotideBitsWriter::new(&mut buf);
            writer.write(b"ACGTACGT").unwrap();
        }
        buf.truncate(buf.len() - 1);
        let mut reader = NucleotideBitsReader::new(buf.as_slice());
        assert!(reader.next_seq().is_err());
    }
}
