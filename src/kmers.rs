//! Candidate k-mers: counting with the KMC suite and selecting from its dump.

use crate::{
    error::{PipelineError, Result, Stage},
    external::run_tool,
    tool_overrides::{DEFAULT_KMC_BIN, DEFAULT_KMC_DUMP_BIN, DEFAULT_KMC_TOOLS_BIN, ToolPaths},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

pub const DEFAULT_KMER_LEN: usize = 20;
pub const DEFAULT_SAMPLE_SEED: u64 = 0x9E3779B97F4A7C15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kmer {
    pub id: String,
    pub seq: String,
    pub freq: u64,
}

/// Parses a `kmc_dump` listing (`sequence<TAB>count`); ids are line indices.
pub fn parse_kmer_dump(text: &str) -> Result<Vec<Kmer>> {
    let mut kmers = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.trim().split('\t');
        let (Some(seq), Some(freq), None) = (cols.next(), cols.next(), cols.next()) else {
            return Err(PipelineError::new(
                Stage::Kmers,
                format!("k-mer line {} is not 'sequence<TAB>count'", i + 1),
            ));
        };
        let freq = freq.parse::<u64>().map_err(|e| {
            PipelineError::new(
                Stage::Kmers,
                format!("Invalid k-mer count '{freq}' at line {}: {e}", i + 1),
            )
        })?;
        kmers.push(Kmer {
            id: i.to_string(),
            seq: seq.to_ascii_uppercase(),
            freq,
        });
    }
    Ok(kmers)
}

pub fn read_kmer_dump(path: &Path) -> Result<Vec<Kmer>> {
    let text = fs::read_to_string(path).map_err(|e| {
        PipelineError::new(
            Stage::Kmers,
            format!("Could not read k-mer file '{}': {e}", path.display()),
        )
    })?;
    parse_kmer_dump(&text)
}

/// Keeps only k-mers seen at the highest frequency, in input order.
pub fn select_max_frequency(kmers: Vec<Kmer>) -> Vec<Kmer> {
    let Some(max_freq) = kmers.iter().map(|k| k.freq).max() else {
        return kmers;
    };
    kmers.into_iter().filter(|k| k.freq == max_freq).collect()
}

/// Deterministic sample of at most `max` k-mers; `max == 0` keeps all.
/// Chosen k-mers keep their input order.
pub fn subsample(kmers: Vec<Kmer>, max: usize, seed: u64) -> Vec<Kmer> {
    let total = kmers.len();
    if max == 0 || total <= max {
        return kmers;
    }
    let mut seen: HashSet<usize> = HashSet::with_capacity(max * 2);
    let mut state = seed;
    while seen.len() < max {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seen.insert(((state >> 33) as usize) % total);
    }
    kmers
        .into_iter()
        .enumerate()
        .filter(|(i, _)| seen.contains(i))
        .map(|(_, k)| k)
        .collect()
}

fn kmc_count_args(threads: usize, kmer_len: usize, input: &Path, db: &str, tmp: &Path) -> Vec<String> {
    vec![
        format!("-t{threads}"),
        format!("-k{kmer_len}"),
        "-ci1".to_string(),
        "-cx1".to_string(),
        "-cs8192".to_string(),
        "-fm".to_string(),
        input.to_string_lossy().into_owned(),
        db.to_string(),
        tmp.to_string_lossy().into_owned(),
    ]
}

fn kmc_simple_args(threads: usize, left: &str, right: &str, op: &str, out: &str) -> Vec<String> {
    vec![
        "-hp".to_string(),
        format!("-t{threads}"),
        "simple".to_string(),
        left.to_string(),
        right.to_string(),
        "-cx9999".to_string(),
        op.to_string(),
        out.to_string(),
        "-cs8192".to_string(),
    ]
}

fn replace_database(from: &str, to: &str) -> Result<()> {
    for ext in ["kmc_pre", "kmc_suf"] {
        let src = format!("{from}.{ext}");
        let dst = format!("{to}.{ext}");
        fs::rename(&src, &dst).map_err(|e| {
            PipelineError::new(
                Stage::Kmers,
                format!("Could not move k-mer database '{src}' to '{dst}': {e}"),
            )
        })?;
    }
    Ok(())
}

/// Reads the `total k-mers` line from `kmc_tools info`.
pub fn parse_kmc_info_total(output: &str) -> Result<u64> {
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "total k-mers" {
                return value.trim().parse::<u64>().map_err(|e| {
                    PipelineError::new(
                        Stage::Kmers,
                        format!("Invalid k-mer total '{}': {e}", value.trim()),
                    )
                });
            }
        }
    }
    Err(PipelineError::new(
        Stage::Kmers,
        "kmc_tools info did not report 'total k-mers'",
    ))
}

fn database_size(tools: &ToolPaths, db: &str) -> Result<u64> {
    let out = run_tool(
        Stage::Kmers,
        &tools.kmc_binary(DEFAULT_KMC_TOOLS_BIN),
        &["info".to_string(), db.to_string()],
        None,
    )?;
    parse_kmc_info_total(&out.stdout)
}

#[derive(Debug, Clone)]
pub struct KmcRun {
    pub dump_path: PathBuf,
    pub kmer_count: u64,
}

/// Builds the set of k-mers present in the foreground files minus those in any
/// background file, and dumps it to `{prefix}_ukmc.txt`.
pub fn run_kmc(
    tools: &ToolPaths,
    fg_files: &[PathBuf],
    bg_files: &[PathBuf],
    kmer_len: usize,
    prefix: &str,
    threads: usize,
) -> Result<KmcRun> {
    let (first, rest) = fg_files.split_first().ok_or_else(|| {
        PipelineError::new(Stage::Kmers, "No foreground sequence files to count")
    })?;
    let tmp = tempfile::tempdir().map_err(|e| {
        PipelineError::new(Stage::Kmers, format!("Could not create temp dir: {e}"))
    })?;
    let kmc = tools.kmc_binary(DEFAULT_KMC_BIN);
    let kmc_tools = tools.kmc_binary(DEFAULT_KMC_TOOLS_BIN);
    let db = format!("{prefix}_db");
    let current = format!("{prefix}_current");
    let next = format!("{prefix}_new");

    run_tool(
        Stage::Kmers,
        &kmc,
        &kmc_count_args(threads, kmer_len, first, &db, tmp.path()),
        None,
    )?;
    for fg_file in rest {
        info!(file = %fg_file.display(), "adding to k-mer database");
        run_tool(
            Stage::Kmers,
            &kmc,
            &kmc_count_args(threads, kmer_len, fg_file, &current, tmp.path()),
            None,
        )?;
        run_tool(
            Stage::Kmers,
            &kmc_tools,
            &kmc_simple_args(threads, &current, &db, "union", &next),
            None,
        )?;
        replace_database(&next, &db)?;
    }
    info!(kmers = database_size(tools, &db)?, "foreground k-mer database built");

    for bg_file in bg_files {
        run_tool(
            Stage::Kmers,
            &kmc,
            &kmc_count_args(threads, kmer_len, bg_file, &current, tmp.path()),
            None,
        )?;
        run_tool(
            Stage::Kmers,
            &kmc_tools,
            &kmc_simple_args(threads, &db, &current, "kmers_subtract", &next),
            None,
        )?;
        replace_database(&next, &db)?;
        info!(
            file = %bg_file.display(),
            kmers = database_size(tools, &db)?,
            "masked background k-mers"
        );
    }

    let kmer_count = database_size(tools, &db)?;
    let dump_path = PathBuf::from(format!("{prefix}_ukmc.txt"));
    run_tool(
        Stage::Kmers,
        &tools.kmc_binary(DEFAULT_KMC_DUMP_BIN),
        &[db, dump_path.to_string_lossy().into_owned()],
        None,
    )?;
    Ok(KmcRun {
        dump_path,
        kmer_count,
    })
}
