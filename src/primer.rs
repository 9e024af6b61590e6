//! Primer and primer-pair value objects, pair enumeration and primer FASTA I/O.

use crate::{
    error::{PipelineError, Result, Stage},
    nucleotide::{normalize_primer_sequence, reverse_complement},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

pub const DEFAULT_LOCALE: &str = "-";
const MISSING_MELT: &str = "NA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primer {
    pub id: String,
    pub seq: String,
    /// Melting temperature; `None` until a feasibility check succeeded.
    pub melt: Option<f64>,
}

impl Primer {
    pub fn new(id: impl Into<String>, seq: impl Into<String>, melt: Option<f64>) -> Self {
        Self {
            id: id.into(),
            seq: seq.into(),
            melt,
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// The same primer read from the opposite strand, id suffixed with `rc`.
    pub fn reverse_complement(&self) -> Self {
        Self {
            id: format!("{}rc", self.id),
            seq: reverse_complement(&self.seq),
            melt: self.melt,
        }
    }
}

/// Statistics filled in once by the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairStats {
    pub nhits: usize,
    pub nseq: usize,
    pub length: f64,
    pub se: f64,
    pub info: f64,
    pub offhits: usize,
    pub offseqs: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerPair {
    pub pair_id: usize,
    /// First primer in generation order, not biological orientation.
    pub left: Primer,
    pub right: Primer,
    /// Pairwise feasibility penalty, lower is better.
    pub penalty: Option<f64>,
    pub locale: String,
    pub stats: PairStats,
}

impl PrimerPair {
    pub fn new(pair_id: usize, left: Primer, right: Primer) -> Self {
        Self {
            pair_id,
            left,
            right,
            penalty: None,
            locale: DEFAULT_LOCALE.to_string(),
            stats: PairStats::default(),
        }
    }

    /// True when the right primer is the exact reverse complement of the left one.
    pub fn is_reverse_complement_pair(&self) -> bool {
        reverse_complement(&self.left.seq) == self.right.seq
    }
}

/// Every unordered pair of distinct primers, numbered from 0 in (i, j), i < j order.
///
/// Calling this again on the same slice yields the same ids.
pub fn generate_pairs(primers: &[Primer]) -> impl Iterator<Item = PrimerPair> + '_ {
    primers
        .iter()
        .tuple_combinations()
        .enumerate()
        .map(|(pair_id, (left, right))| PrimerPair::new(pair_id, left.clone(), right.clone()))
}

/// Returns the shared primer length; products are sized with it.
pub fn ensure_uniform_length(primers: &[Primer]) -> Result<usize> {
    let first = primers
        .first()
        .ok_or_else(|| PipelineError::new(Stage::Input, "No primers to evaluate"))?;
    let primer_len = first.len();
    if let Some(other) = primers.iter().find(|p| p.len() != primer_len) {
        return Err(PipelineError::new(
            Stage::Input,
            format!(
                "Primers must all have the same length: '{}' has {} bases, '{}' has {}",
                first.id,
                primer_len,
                other.id,
                other.len()
            ),
        ));
    }
    Ok(primer_len)
}

fn melt_label(melt: Option<f64>) -> String {
    match melt {
        Some(v) => v.to_string(),
        None => MISSING_MELT.to_string(),
    }
}

/// Writes `>{id}_{melt}` records, the format `read_primers_fasta` accepts.
pub fn write_primers_fasta(primers: &[Primer], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        PipelineError::new(
            Stage::Io,
            format!("Could not create primer file '{}': {e}", path.display()),
        )
    })?;
    let mut writer = BufWriter::new(file);
    for primer in primers {
        writeln!(writer, ">{}_{}\n{}", primer.id, melt_label(primer.melt), primer.seq).map_err(
            |e| {
                PipelineError::new(
                    Stage::Io,
                    format!("Could not write primer file '{}': {e}", path.display()),
                )
            },
        )?;
    }
    writer.flush().map_err(|e| {
        PipelineError::new(
            Stage::Io,
            format!("Could not flush primer file '{}': {e}", path.display()),
        )
    })
}

/// Writes `>{id}` records so alignment query names equal primer ids.
pub fn write_alignment_fasta(primers: &[Primer], path: &Path) -> Result<()> {
    let mut text = String::new();
    for primer in primers {
        text.push('>');
        text.push_str(&primer.id);
        text.push('\n');
        text.push_str(&primer.seq);
        text.push('\n');
    }
    fs::write(path, text).map_err(|e| {
        PipelineError::new(
            Stage::Io,
            format!("Could not write alignment query file '{}': {e}", path.display()),
        )
    })
}

pub fn read_primers_fasta(path: &Path) -> Result<Vec<Primer>> {
    let text = fs::read_to_string(path).map_err(|e| {
        PipelineError::new(
            Stage::Io,
            format!("Could not read primer file '{}': {e}", path.display()),
        )
    })?;
    parse_primers_fasta(&text).map_err(|e| {
        PipelineError::new(e.stage, format!("{} ({})", e.message, path.display()))
    })
}

pub fn parse_primers_fasta(text: &str) -> Result<Vec<Primer>> {
    let mut primers = Vec::new();
    let mut header: Option<(usize, String, Option<f64>)> = None;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(raw) = line.strip_prefix('>') {
            if let Some((prev_line, id, _)) = header.take() {
                return Err(PipelineError::new(
                    Stage::Input,
                    format!("Primer '{id}' at line {} has no sequence", prev_line + 1),
                ));
            }
            let (id, melt) = raw.rsplit_once('_').ok_or_else(|| {
                PipelineError::new(
                    Stage::Input,
                    format!("Primer header '{raw}' at line {} is not 'id_melt'", line_no + 1),
                )
            })?;
            let melt = if melt == MISSING_MELT {
                None
            } else {
                Some(melt.parse::<f64>().map_err(|e| {
                    PipelineError::new(
                        Stage::Input,
                        format!(
                            "Invalid melting temperature '{melt}' at line {}: {e}",
                            line_no + 1
                        ),
                    )
                })?)
            };
            header = Some((line_no, id.to_string(), melt));
        } else {
            let (_, id, melt) = header.take().ok_or_else(|| {
                PipelineError::new(
                    Stage::Input,
                    format!("Sequence at line {} precedes any primer header", line_no + 1),
                )
            })?;
            let seq = normalize_primer_sequence(line)?;
            primers.push(Primer::new(id, seq, melt));
        }
    }
    if let Some((line_no, id, _)) = header {
        return Err(PipelineError::new(
            Stage::Input,
            format!("Primer '{id}' at line {} has no sequence", line_no + 1),
        ));
    }
    Ok(primers)
}
