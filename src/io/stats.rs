//! Fragment-length statistics side-file.
//!
//! Plain key-value text: one `key:<int>` line each for `min`, `Q1`, `M`,
//! `Q3`, and `max`, in that order.

use crate::utils::seq::LengthSummary;
use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, Write};

pub fn write_fragment_stats<W: Write>(summary: &LengthSummary, out: &mut W) -> Result<()> {
    writeln!(out, "min:{}", summary.min)?;
    writeln!(out, "Q1:{}", summary.q1)?;
    writeln!(out, "M:{}", summary.median)?;
    writeln!(out, "Q3:{}", summary.q3)?;
    writeln!(out, "max:{}", summary.max)?;
    Ok(())
}

pub fn read_fragment_stats<R: BufRead>(input: R) -> Result<LengthSummary> {
    let mut summary = LengthSummary::default();
    let mut seen = 0u8;
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("bad stats line: {line}"))?;
        let value: usize = value
            .trim()
            .parse()
            .with_context(|| format!("bad stats value in line: {line}"))?;
        match key.trim() {
            "min" => summary.min = value,
            "Q1" => summary.q1 = value,
            "M" => summary.median = value,
            "Q3" => summary.q3 = value,
            "max" => summary.max = value,
            other => return Err(anyhow!("unknown stats key: {other}")),
        }
        seen += 1;
    }
    if seen != 5 {
        return Err(anyhow!("expected 5 stats lines, found {seen}"));
    }
    Ok(summary)
}
