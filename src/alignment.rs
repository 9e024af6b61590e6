//! Alignment records from the short-read aligner and per-genome primer hits.

use crate::error::{PipelineError, Result, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const FLAG_UNMAPPED: u16 = 0x4;
pub const FLAG_REVERSE: u16 = 0x10;

const SAM_MANDATORY_FIELDS: usize = 11;
const EDIT_DISTANCE_TAG: &str = "NM:i:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_flag(flag: u16) -> Self {
        if flag & FLAG_REVERSE != 0 {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }
}

/// One SAM line, reduced to the fields primer hits need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub query: String,
    pub flag: u16,
    pub target: String,
    pub pos: usize,
    pub edit_distance: Option<u32>,
}

impl AlignmentRecord {
    pub fn is_unmapped(&self) -> bool {
        self.flag & FLAG_UNMAPPED != 0
    }

    pub fn from_sam_line(line: &str, line_no: usize) -> Result<Self> {
        let cols: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if cols.len() < SAM_MANDATORY_FIELDS {
            return Err(PipelineError::new(
                Stage::HitResolution,
                format!(
                    "SAM line {line_no} has {} fields, expected at least {SAM_MANDATORY_FIELDS}",
                    cols.len()
                ),
            ));
        }
        let flag = cols[1].parse::<u16>().map_err(|e| {
            PipelineError::new(
                Stage::HitResolution,
                format!("Invalid SAM flag '{}' at line {line_no}: {e}", cols[1]),
            )
        })?;
        let pos = cols[3].parse::<usize>().map_err(|e| {
            PipelineError::new(
                Stage::HitResolution,
                format!("Invalid SAM position '{}' at line {line_no}: {e}", cols[3]),
            )
        })?;
        let edit_distance = match cols[SAM_MANDATORY_FIELDS..]
            .iter()
            .find_map(|tag| tag.strip_prefix(EDIT_DISTANCE_TAG))
        {
            Some(raw) => Some(raw.parse::<u32>().map_err(|e| {
                PipelineError::new(
                    Stage::HitResolution,
                    format!("Invalid edit distance '{raw}' at line {line_no}: {e}"),
                )
            })?),
            None => None,
        };
        Ok(Self {
            query: cols[0].to_string(),
            flag,
            target: cols[2].to_string(),
            pos,
            edit_distance,
        })
    }
}

/// Parses aligner output, skipping `@` header lines.
pub fn parse_sam(text: &str) -> Result<Vec<AlignmentRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('@'))
        .map(|(i, line)| AlignmentRecord::from_sam_line(line, i + 1))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimerHit {
    pub primer_id: String,
    pub target: String,
    pub strand: Strand,
    /// 1-based leftmost position on the target.
    pub pos: usize,
    pub edit_distance: u32,
}

pub type HitMap = HashMap<String, PrimerHit>;

/// Maps primer id to its hit in one genome.
///
/// Unmapped records are dropped. When a primer has several records the last one
/// in input order is kept; there is no best-hit comparison.
pub fn resolve_hits<I>(records: I) -> Result<HitMap>
where
    I: IntoIterator<Item = AlignmentRecord>,
{
    let mut hits = HitMap::new();
    for record in records {
        if record.is_unmapped() {
            continue;
        }
        if record.pos == 0 {
            return Err(PipelineError::new(
                Stage::HitResolution,
                format!("Mapped record for '{}' has position 0", record.query),
            ));
        }
        let edit_distance = record.edit_distance.ok_or_else(|| {
            PipelineError::new(
                Stage::HitResolution,
                format!("Mapped record for '{}' lacks an NM tag", record.query),
            )
        })?;
        let hit = PrimerHit {
            primer_id: record.query.clone(),
            target: record.target,
            strand: Strand::from_flag(record.flag),
            pos: record.pos,
            edit_distance,
        };
        hits.insert(record.query, hit);
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAM: &str = "@SQ\tSN:chr1\tLN:5000\n\
@PG\tID:bwa\tPN:bwa\n\
0\t0\tchr1\t100\t37\t20M\t*\t0\t0\tACGTACGTACGTACGTACGT\t*\tXT:A:U\tNM:i:0\tX0:i:1\n\
1\t16\tchr1\t420\t37\t20M\t*\t0\t0\tACGTACGTACGTACGTACGT\t*\tXT:A:U\tNM:i:1\n\
2\t4\t*\t0\t0\t*\t*\t0\t0\tACGTACGTACGTACGTACGT\t*\n";

    #[test]
    fn test_parse_sam_skips_headers() {
        let records = parse_sam(SAM).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].query, "0");
        assert_eq!(records[0].edit_distance, Some(0));
        assert_eq!(records[1].flag, 16);
        assert!(records[2].is_unmapped());
        assert_eq!(records[2].edit_distance, None);
    }

    #[test]
    fn test_resolve_hits_strand_and_unmapped() {
        let hits = resolve_hits(parse_sam(SAM).unwrap()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits["0"].strand, Strand::Forward);
        assert_eq!(hits["0"].pos, 100);
        assert_eq!(hits["1"].strand, Strand::Reverse);
        assert_eq!(hits["1"].edit_distance, 1);
        assert!(!hits.contains_key("2"));
    }

    #[test]
    fn test_last_record_wins() {
        let sam = "7\t0\tchr1\t10\t0\t20M\t*\t0\t0\tA\t*\tNM:i:0\n\
7\t16\tchr2\t99\t0\t20M\t*\t0\t0\tA\t*\tNM:i:1\n";
        let hits = resolve_hits(parse_sam(sam).unwrap()).unwrap();
        assert_eq!(hits["7"].target, "chr2");
        assert_eq!(hits["7"].pos, 99);
        assert_eq!(hits["7"].strand, Strand::Reverse);
    }

    #[test]
    fn test_malformed_records_fail_fast() {
        let err = parse_sam("0\tzero\tchr1\t1\t0\t20M\t*\t0\t0\tA\t*\n").unwrap_err();
        assert_eq!(err.stage, Stage::HitResolution);
        assert!(parse_sam("0\t0\tchr1\n").is_err());
        assert!(parse_sam("0\t0\tchr1\t1\t0\t20M\t*\t0\t0\tA\t*\tNM:i:x\n").is_err());
        let missing_nm = parse_sam("0\t0\tchr1\t1\t0\t20M\t*\t0\t0\tA\t*\n").unwrap();
        assert!(resolve_hits(missing_nm).is_err());
    }
}
