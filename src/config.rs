//! Run settings, optionally loaded from a JSON file and overridden from the command line.

use crate::{
    error::{PipelineError, Result, Stage},
    kmers::{DEFAULT_KMER_LEN, DEFAULT_SAMPLE_SEED},
    product::DEFAULT_MAX_PRODUCT_LENGTH,
    scoring::{BackgroundFilter, DEFAULT_MAX_LENGTH, DEFAULT_MIN_LENGTH, ScoringConfig},
    tool_overrides::ToolPaths,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_PREFIX: &str = "camplicon";
pub const DEFAULT_MAX_PRIMERS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub threads: usize,
    pub prefix: String,
    pub kmer_len: usize,
    /// Upper bound on k-mers sent to primer3; 0 keeps all of them.
    pub max_primers: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub background_filter: BackgroundFilter,
    pub max_product_length: usize,
    pub sample_seed: u64,
    pub primer3_config: Option<PathBuf>,
    pub bwa_bin: Option<String>,
    pub primer3_bin: Option<String>,
    pub kmc_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            prefix: DEFAULT_PREFIX.to_string(),
            kmer_len: DEFAULT_KMER_LEN,
            max_primers: DEFAULT_MAX_PRIMERS,
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            background_filter: BackgroundFilter::default(),
            max_product_length: DEFAULT_MAX_PRODUCT_LENGTH,
            sample_seed: DEFAULT_SAMPLE_SEED,
            primer3_config: None,
            bwa_bin: None,
            primer3_bin: None,
            kmc_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::new(
                Stage::Config,
                format!("Could not read config file '{}': {e}", path.display()),
            )
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::new(
                Stage::Config,
                format!("Could not parse config JSON '{}': {e}", path.display()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(PipelineError::new(Stage::Config, "threads must be at least 1"));
        }
        if self.kmer_len == 0 {
            return Err(PipelineError::new(Stage::Config, "kmer_len must be at least 1"));
        }
        if self.min_length >= self.max_length {
            return Err(PipelineError::new(
                Stage::Config,
                format!(
                    "min_length ({}) must be below max_length ({})",
                    self.min_length, self.max_length
                ),
            ));
        }
        Ok(())
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            min_length: self.min_length,
            max_length: self.max_length,
            background_filter: self.background_filter,
        }
    }

    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths::resolve(
            self.bwa_bin.as_deref(),
            self.primer3_bin.as_deref(),
            self.kmc_dir.as_deref().and_then(Path::to_str),
        )
    }

    pub fn output_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{suffix}", self.prefix))
    }
}
