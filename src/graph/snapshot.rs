//! On-disk graph snapshot.
//!
//! A populated graph serializes to a sidecar file: a fixed little-endian
//! header naming the filter geometry, then the raw filter payloads in
//! declared order. Membership and count queries against a reloaded graph
//! match the original bit-for-bit.

use super::debruijn::BloomDeBruijnGraph;
use crate::bloom::{BloomFilter, CountingBloomFilter, PairedKeysBloomFilter};
use std::io::{self, Read, Write};

const MAGIC: &[u8; 8] = b"RBGRAPH\0";
const VERSION: u32 = 1;

/// Identifies the hash-derivation scheme; a mismatch on load means the
/// snapshot was written by an incompatible build.
const HASH_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

const FLAG_STRANDED: u32 = 1 << 0;
const FLAG_HAS_PKBF: u32 = 1 << 1;
const FLAG_HAS_RPKBF: u32 = 1 << 2;

fn put_u32<W: Write>(out: &mut W, v: u32) -> io::Result<()> {
    out.write_all(&v.to_le_bytes())
}

fn put_u64<W: Write>(out: &mut W, v: u64) -> io::Result<()> {
    out.write_all(&v.to_le_bytes())
}

fn get_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn get_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn corrupt(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Serialize header and filter payloads.
pub fn write_snapshot<W: Write>(graph: &BloomDeBruijnGraph, out: &mut W) -> io::Result<()> {
    let mut flags = 0u32;
    if graph.stranded {
        flags |= FLAG_STRANDED;
    }
    if graph.pkbf.is_some() {
        flags |= FLAG_HAS_PKBF;
    }
    if graph.rpkbf.is_some() {
        flags |= FLAG_HAS_RPKBF;
    }
    let paired = graph.pkbf.as_ref().or(graph.rpkbf.as_ref());
    let n_pkbf = paired.map_or(0, |f| f.num_bits_each());
    let m_pkbf = paired.map_or(0, |f| f.num_hashes() as u32);

    out.write_all(MAGIC)?;
    put_u32(out, VERSION)?;
    put_u32(out, graph.k as u32)?;
    put_u32(out, flags)?;
    put_u64(out, graph.dbg.num_bits())?;
    put_u64(out, graph.cbf.num_counters())?;
    put_u64(out, n_pkbf)?;
    put_u32(out, graph.dbg.num_hashes() as u32)?;
    put_u32(out, graph.cbf.num_hashes() as u32)?;
    put_u32(out, m_pkbf)?;
    put_u64(out, HASH_SEED)?;
    put_u32(out, graph.d_read as u32)?;
    put_u32(out, graph.d_frag as u32)?;

    graph.dbg.write_payload(out)?;
    graph.cbf.write_payload(out)?;
    if let Some(pkbf) = &graph.pkbf {
        pkbf.write_payload(out)?;
    }
    if let Some(rpkbf) = &graph.rpkbf {
        rpkbf.write_payload(out)?;
    }
    Ok(())
}

/// Reload a graph from its snapshot.
pub fn read_snapshot<R: Read>(input: &mut R) -> io::Result<BloomDeBruijnGraph> {
    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt("bad snapshot magic"));
    }
    let version = get_u32(input)?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported snapshot version {version}")));
    }
    let k = get_u32(input)? as usize;
    let flags = get_u32(input)?;
    let n_dbg = get_u64(input)?;
    let n_cbf = get_u64(input)?;
    let n_pkbf = get_u64(input)?;
    let m_dbg = get_u32(input)? as usize;
    let m_cbf = get_u32(input)? as usize;
    let m_pkbf = get_u32(input)? as usize;
    let seed = get_u64(input)?;
    if seed != HASH_SEED {
        return Err(corrupt("snapshot written with an incompatible hash seed"));
    }
    let d_read = get_u32(input)? as usize;
    let d_frag = get_u32(input)? as usize;

    let dbg = BloomFilter::read_payload(n_dbg, m_dbg, input)?;
    let cbf = CountingBloomFilter::read_payload(n_cbf, m_cbf, input)?;
    let pkbf = if flags & FLAG_HAS_PKBF != 0 {
        Some(PairedKeysBloomFilter::read_payload(n_pkbf, m_pkbf, input)?)
    } else {
        None
    };
    let rpkbf = if flags & FLAG_HAS_RPKBF != 0 {
        Some(PairedKeysBloomFilter::read_payload(n_pkbf, m_pkbf, input)?)
    } else {
        None
    };

    Ok(BloomDeBruijnGraph {
        dbg,
        cbf,
        pkbf,
        rpkbf,
        k,
        stranded: flags & FLAG_STRANDED != 0,
        d_read,
        d_frag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::NtHashIterator;
    use crate::utils::configuration::GraphConfig;

    fn populated_graph() -> BloomDeBruijnGraph {
        let graph = BloomDeBruijnGraph::from_config(&GraphConfig {
            k: 5,
            num_hashes: 3,
            stranded: false,
            max_fpr: 0.01,
            expected_kmers: 5_000,
            d_read: 6,
            d_frag: 8,
            max_filter_bits: None,
        })
        .unwrap();
        let seq = b"ACGTGGTCAACGTTGCAAGTCCATGACGTATTGCAC";
        let kmers = graph.get_kmers(seq);
        for item in NtHashIterator::new(seq, 5) {
            graph.insert_hash(item.forward, item.reverse);
        }
        for pair in kmers.windows(7) {
            graph.insert_pair_read(
                (pair[0].forward, pair[0].reverse),
                (pair[6].forward, pair[6].reverse),
            );
        }
        graph
    }

    #[test]
    fn test_round_trip_preserves_queries() {
        let graph = populated_graph();
        let mut buf = Vec::new();
        write_snapshot(&graph, &mut buf).unwrap();
        let restored = read_snapshot(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.k(), graph.k());
        assert_eq!(restored.stranded(), graph.stranded());
        assert_eq!(restored.d_read(), graph.d_read());
        assert_eq!(restored.d_frag(), graph.d_frag());

        let seq = b"ACGTGGTCAACGTTGCAAGTCCATGACGTATTGCAC";
        let original = graph.get_kmers(seq);
        let reloaded = restored.get_kmers(seq);
        assert_eq!(original, reloaded);

        // held-out queries must agree bit-for-bit, hits and misses alike
        for probe in [b"AAAAA", b"CCCCC", b"GTGGT", b"TTTTT"] {
            let kmer = crate::graph::Kmer::from_bytes(probe).unwrap();
            assert_eq!(graph.contains(&kmer), restored.contains(&kmer));
            assert_eq!(graph.count(&kmer), restored.count(&kmer));
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        write_snapshot(&populated_graph(), &mut buf).unwrap();
        buf[0] = b'X';
        assert!(read_snapshot(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut buf = Vec::new();
        write_snapshot(&populated_graph(), &mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(read_snapshot(&mut buf.as_slice()).is_err());
    }
}
