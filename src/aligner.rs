//! Short-read alignment of primers against one genome.

use crate::{
    alignment::{AlignmentRecord, parse_sam},
    error::{PipelineError, Result, Stage},
    external::run_tool,
};
use std::path::Path;
use tracing::debug;

/// Places every query of `primers_fasta` on `genome_fasta`, allowing at most one
/// mismatch, and reports the records as SAM would.
pub trait Aligner: Sync {
    fn align(&self, primers_fasta: &Path, genome_fasta: &Path) -> Result<Vec<AlignmentRecord>>;
}

/// `bwa index` + `bwa aln -n 1` + `bwa samse`.
#[derive(Debug, Clone)]
pub struct Bwa {
    executable: String,
}

impl Bwa {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Aligner for Bwa {
    fn align(&self, primers_fasta: &Path, genome_fasta: &Path) -> Result<Vec<AlignmentRecord>> {
        let stage = Stage::Alignment;
        let genome = path_arg(genome_fasta);
        let primers = path_arg(primers_fasta);
        let tmp = tempfile::tempdir().map_err(|e| {
            PipelineError::new(stage, format!("Could not create temp dir: {e}"))
        })?;
        let sai = path_arg(&tmp.path().join("primers.sai"));

        debug!(genome = %genome, "indexing genome");
        run_tool(stage, &self.executable, &["index".to_string(), genome.clone()], None)?;
        run_tool(
            stage,
            &self.executable,
            &[
                "aln".to_string(),
                "-n".to_string(),
                "1".to_string(),
                "-f".to_string(),
                sai.clone(),
                genome.clone(),
                primers.clone(),
            ],
            None,
        )?;
        let sam = run_tool(
            stage,
            &self.executable,
            &["samse".to_string(), genome, sai, primers],
            None,
        )?;
        parse_sam(&sam.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_bwa_is_fatal() {
        let bwa = Bwa::new("camplicon-no-such-bwa");
        let err = bwa
            .align(Path::new("primers.fasta"), Path::new("genome.fasta"))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Alignment);
        assert!(err.message.contains("camplicon-no-such-bwa"));
    }
}
