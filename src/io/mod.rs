//! Sequence I/O: line-oriented FASTA/FASTQ records (plain or gzipped),
//! the internal 2-bit packed record stream, transcript emission, and the
//! fragment-length statistics side-file.

pub mod emit;
pub mod fastx;
pub mod nbits;
pub mod stats;

pub use emit::TranscriptWriter;
pub use fastx::{FastaWriter, FastxError, FastxReader, PairedFastxReader, SequenceRecord};
pub use nbits::{NucleotideBitsReader, NucleotideBitsWriter};
