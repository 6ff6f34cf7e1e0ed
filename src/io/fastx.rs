//! FASTA/FASTQ readers and writers.
//!
//! Readers auto-detect the record grammar from the first byte and gzip
//! from the file extension. Record names are normalized: everything after
//! the first whitespace is dropped, as is a trailing `/1` or `/2` mate
//! suffix.

use crate::utils::seq::reverse_complement;
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Recoverable per-source format problems. The population pipeline skips
/// the offending source and keeps going; everything else is fatal.
#[derive(Debug, Error)]
pub enum FastxError {
    #[error("{path}: not a FASTA or FASTQ file")]
    UnknownFormat { path: PathBuf },
    #[error("{path}: malformed record near line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One sequence record; quality is present for FASTQ input only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub name: String,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

impl SequenceRecord {
    /// Reverse-complement the sequence in place (and reverse the quality
    /// string with it).
    pub fn reverse_complement(&mut self) {
        self.seq = reverse_complement(&self.seq);
        if let Some(q) = &mut self.qual {
            q.reverse();
        }
    }
}

/// Strip comments and mate suffixes from a record name line.
fn normalize_name(line: &str) -> String {
    let name = line[1..].split_whitespace().next().unwrap_or("");
    let name = name
        .strip_suffix("/1")
        .or_else(|| name.strip_suffix("/2"))
        .unwrap_or(name);
    name.to_string()
}

fn open_decoded(path: &Path) -> Result<Box<dyn BufRead + Send>, FastxError> {
    let file = File::open(path).map_err(|source| FastxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_gz = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    Ok(if is_gz {
        Box::new(BufReader::with_capacity(
            1 << 16,
            MultiGzDecoder::new(file),
        ))
    } else {
        Box::new(BufReader::with_capacity(1 << 16, file))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Fasta,
    Fastq,
}

/// Streaming reader over one FASTA or FASTQ file.
pub struct FastxReader {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    grammar: Grammar,
    /// header line already consumed while scanning the previous record
    pending: Option<String>,
    line: u64,
}

impl FastxReader {
    pub fn open(path: &Path) -> Result<Self, FastxError> {
        let mut reader = open_decoded(path)?;
        // sniff the grammar from the first record marker
        let mut first = String::new();
        loop {
            first.clear();
            let n = reader.read_line(&mut first).map_err(|source| FastxError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 || !first.trim().is_empty() {
                break;
            }
        }
        let grammar = match first.chars().next() {
            Some('>') => Grammar::Fasta,
            Some('@') => Grammar::Fastq,
            _ => {
                return Err(FastxError::UnknownFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            grammar,
            pending: Some(first.trim_end().to_string()),
            line: 1,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed(&self, reason: impl Into<String>) -> FastxError {
        FastxError::Malformed {
            path: self.path.clone(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, FastxError> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        let n = self
            .reader
            .read_line(&mut buf)
            .map_err(|source| FastxError::Io {
                path: self.path.clone(),
                source,
            })?;
        if n == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(buf.trim_end().to_string()))
    }

    /// Next record, or `None` at end of input.
    pub fn next_record(&mut self) -> Result<Option<SequenceRecord>, FastxError> {
        match self.grammar {
            Grammar::Fasta => self.next_fasta(),
            Grammar::Fastq => self.next_fastq(),
        }
    }

    fn next_fasta(&mut self) -> Result<Option<SequenceRecord>, FastxError> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !header.starts_with('>') {
            return Err(self.malformed("expected '>' header"));
        }
        let name = normalize_name(&header);
        let mut seq = Vec::new();
        loop {
            match self.next_line()? {
                None => break,
                Some(line) if line.starts_with('>') => {
                    self.pending = Some(line);
                    break;
                }
                Some(line) => seq.extend_from_slice(line.trim().as_bytes()),
            }
        }
        Ok(Some(SequenceRecord {
            name,
            seq,
            qual: None,
        }))
    }

    fn next_fastq(&mut self) -> Result<Option<SequenceRecord>, FastxError> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !header.starts_with('@') {
            return Err(self.malformed("line 1 of a FASTQ record is expected to start with '@'"));
        }
        let seq = self
            .next_line()?
            .ok_or_else(|| self.malformed("truncated record: missing sequence line"))?;
        let plus = self
            .next_line()?
            .ok_or_else(|| self.malformed("truncated record: missing '+' line"))?;
        if !plus.starts_with('+') {
            return Err(self.malformed("line 3 of a FASTQ record is expected to start with '+'"));
        }
        let qual = self
            .next_line()?
            .ok_or_else(|| self.malformed("truncated record: missing quality line"))?;
        if qual.len() != seq.len() {
            return Err(self.malformed("quality length differs from sequence length"));
        }
        Ok(Some(SequenceRecord {
            name: normalize_name(&header),
            seq: seq.into_bytes(),
            qual: Some(qual.into_bytes()),
        }))
    }
}

/// Lock-step reader over a mate pair of FASTX files, with optional
/// per-side reverse-complementing so both mates face the fragment's
/// forward orientation.
pub struct PairedFastxReader {
    left: FastxReader,
    right: FastxReader,
    left_rc: bool,
    right_rc: bool,
}

impl PairedFastxReader {
    pub fn open(
        left_path: &Path,
        right_path: &Path,
        left_rc: bool,
        right_rc: bool,
    ) -> Result<Self, FastxError> {
        Ok(Self {
            left: FastxReader::open(left_path)?,
            right: FastxReader::open(right_path)?,
            left_rc,
            right_rc,
        })
    }

    /// Next mate pair; `None` when either file is exhausted. A name
    /// mismatch between mates is a format error.
    pub fn next_pair(
        &mut self,
    ) -> Result<Option<(SequenceRecord, SequenceRecord)>, FastxError> {
        let (left, right) = match (self.left.next_record()?, self.right.next_record()?) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(None),
        };
        if !left.name.is_empty() && !right.name.is_empty() && left.name != right.name {
            return Err(FastxError::Malformed {
                path: self.left.path().to_path_buf(),
                line: 0,
                reason: format!("mate name mismatch: {} vs {}", left.name, right.name),
            });
        }
        let mut left = left;
        let mut right = right;
        if self.left_rc {
            left.reverse_complement();
        }
        if self.right_rc {
            right.reverse_complement();
        }
        Ok(Some((left, right)))
    }
}

/// Buffered FASTA writer; `.gz` paths are gzip-compressed.
pub struct FastaWriter {
    out: Box<dyn Write + Send>,
}

impl FastaWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        let is_gz = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        let out: Box<dyn Write + Send> = if is_gz {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };
        Ok(Self { out })
    }

    /// In-memory writer for tests and pipelines that buffer output.
    pub fn from_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn write(&mut self, header: &str, seq: &[u8]) -> Result<()> {
        self.out.write_all(b">")?;
        self.out.write_all(header.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.write_all(seq)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_fasta_multi_line_records() {
        let f = write_temp(">r1 comment\nACGT\nACGT\n>r2\nTTTT\n", ".fa");
        let mut reader = FastxReader::open(f.path()).unwrap();
        let r1 = reader.next_record().unwrap().unwrap();
        assert_eq!(r1.name, "r1");
        assert_eq!(r1.seq, b"ACGTACGT");
        assert!(r1.qual.is_none());
        let r2 = reader.next_record().unwrap().unwrap();
        assert_eq!(r2.name, "r2");
        assert_eq!(r2.seq, b"TTTT");
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_fastq_records_and_mate_suffix() {
        let f = write_temp("@r1/1\nACGT\n+\nIIII\n@r2/1\nTTTT\n+\nIIII\n", ".fq");
        let mut reader = FastxReader::open(f.path()).unwrap();
        let r1 = reader.next_record().unwrap().unwrap();
        assert_eq!(r1.name, "r1");
        assert_eq!(r1.qual.as_deref(), Some(b"IIII".as_slice()));
        let r2 = reader.next_record().unwrap().unwrap();
        assert_eq!(r2.name, "r2");
    }

    #[test]
    fn test_fastq_bad_plus_line() {
        let f = write_temp("@r1\nACGT\nIIII\nIIII\n", ".fq");
        let mut reader = FastxReader::open(f.path()).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(FastxError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let f = write_temp("this is not sequence data\n", ".txt");
        assert!(matches!(
            FastxReader::open(f.path()),
            Err(FastxError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_paired_reader_orients_mates() {
        let left = write_temp("@p/1\nAAAA\n+\nIIII\n", ".fq");
        let right = write_temp("@p/2\nTTTC\n+\nIIII\n", ".fq");
        let mut pairs =
            PairedFastxReader::open(left.path(), right.path(), false, true).unwrap();
        let (l, r) = pairs.next_pair().unwrap().unwrap();
        assert_eq!(l.seq, b"AAAA");
        assert_eq!(r.seq, b"GAAA");
        assert!(pairs.next_pair().unwrap().is_none());
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fa.gz");
        let mut writer = FastaWriter::create(&path).unwrap();
        writer.write("t1 l=4 c=2", b"ACGT").unwrap();
        writer.finish().unwrap();

        let mut reader = FastxReader::open(&path).unwrap();
        let rec = reader.next_record().unwrap().unwrap();
        assert_eq!(rec.name, "t1");
        assert_eq!(rec.seq, b"ACGT");
    }
}
