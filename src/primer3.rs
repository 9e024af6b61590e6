//! Thermodynamic feasibility checks through `primer3_core` in `check_primers` mode.

use crate::{
    error::{PipelineError, Result, Stage},
    external::run_tool,
};
use std::{collections::HashMap, path::PathBuf};

/// Single and pairwise primer feasibility. `None` means the oligo (or pair)
/// was rejected.
pub trait PrimerEvaluator: Sync {
    /// Melting temperature of a feasible primer.
    fn check_primer(&self, seq: &str) -> Result<Option<f64>>;
    /// Penalty of a feasible pair, lower is better.
    fn check_pair(&self, left: &str, right: &str) -> Result<Option<f64>>;
}

#[derive(Debug, Clone)]
pub struct Primer3 {
    executable: String,
    config_dir: Option<PathBuf>,
}

impl Primer3 {
    pub fn new(executable: impl Into<String>, config_dir: Option<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config_dir,
        }
    }

    fn boulder_record(&self, id: &str, tags: &[(&str, &str)]) -> String {
        let mut record = format!("SEQUENCE_ID={id}\nPRIMER_TASK=check_primers\n");
        for (key, value) in tags {
            record.push_str(&format!("{key}={value}\n"));
        }
        if let Some(dir) = &self.config_dir {
            let mut dir = dir.to_string_lossy().into_owned();
            if !dir.ends_with('/') {
                dir.push('/');
            }
            record.push_str(&format!("PRIMER_THERMODYNAMIC_PARAMETERS_PATH={dir}\n"));
        }
        record.push_str("=\n");
        record
    }

    fn run(&self, stage: Stage, input: &str) -> Result<BoulderRecord> {
        let output = run_tool(stage, &self.executable, &[], Some(input))?;
        BoulderRecord::parse(stage, &output.stdout)
    }
}

impl PrimerEvaluator for Primer3 {
    fn check_primer(&self, seq: &str) -> Result<Option<f64>> {
        let stage = Stage::PrimerFeasibility;
        let record = self.run(stage, &self.boulder_record("kmer", &[("SEQUENCE_PRIMER", seq)]))?;
        if record.returned(stage, "PRIMER_LEFT_NUM_RETURNED")? == 0 {
            return Ok(None);
        }
        record.float(stage, "PRIMER_LEFT_0_TM").map(Some)
    }

    fn check_pair(&self, left: &str, right: &str) -> Result<Option<f64>> {
        let stage = Stage::PairFeasibility;
        let input = self.boulder_record(
            "primer_pair",
            &[("SEQUENCE_PRIMER", left), ("SEQUENCE_PRIMER_REVCOMP", right)],
        );
        let record = self.run(stage, &input)?;
        if record.returned(stage, "PRIMER_PAIR_NUM_RETURNED")? == 0 {
            return Ok(None);
        }
        record.float(stage, "PRIMER_PAIR_0_PENALTY").map(Some)
    }
}

/// One Boulder-IO record as printed by primer3: `KEY=VALUE` lines up to `=`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoulderRecord {
    tags: HashMap<String, String>,
}

impl BoulderRecord {
    pub fn parse(stage: Stage, text: &str) -> Result<Self> {
        let mut tags = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            if line == "=" {
                break;
            }
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PipelineError::new(
                    stage,
                    format!("primer3 output line {} is not KEY=VALUE: '{line}'", i + 1),
                )
            })?;
            tags.insert(key.to_string(), value.to_string());
        }
        if let Some(error) = tags.get("PRIMER_ERROR") {
            return Err(PipelineError::new(stage, format!("primer3 reported: {error}")));
        }
        Ok(Self { tags })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    fn required(&self, stage: Stage, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            PipelineError::new(stage, format!("primer3 output is missing {key}"))
        })
    }

    pub fn returned(&self, stage: Stage, key: &str) -> Result<usize> {
        let value = self.required(stage, key)?;
        value.trim().parse::<usize>().map_err(|e| {
            PipelineError::new(stage, format!("Invalid {key} '{value}': {e}"))
        })
    }

    pub fn float(&self, stage: Stage, key: &str) -> Result<f64> {
        let value = self.required(stage, key)?;
        value.trim().parse::<f64>().map_err(|e| {
            PipelineError::new(stage, format!("Invalid {key} '{value}': {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMER_OK: &str = "SEQUENCE_ID=kmer\nPRIMER_TASK=check_primers\n\
SEQUENCE_PRIMER=ACGTACGTACGTACGTACGT\nPRIMER_LEFT_NUM_RETURNED=1\n\
PRIMER_LEFT_0_PENALTY=1.2\nPRIMER_LEFT_0_TM=59.871\n=\n";

    const PAIR_REJECTED: &str = "SEQUENCE_ID=primer_pair\n\
PRIMER_PAIR_EXPLAIN=considered 1, high any compl 1, ok 0\n\
PRIMER_PAIR_NUM_RETURNED=0\n=\n";

    #[test]
    fn test_parses_melting_temperature() {
        let record = BoulderRecord::parse(Stage::PrimerFeasibility, PRIMER_OK).unwrap();
        assert_eq!(
            record
                .returned(Stage::PrimerFeasibility, "PRIMER_LEFT_NUM_RETURNED")
                .unwrap(),
            1
        );
        let tm = record.float(Stage::PrimerFeasibility, "PRIMER_LEFT_0_TM").unwrap();
        assert!((tm - 59.871).abs() < 1e-9);
    }

    #[test]
    fn test_values_may_contain_equals_and_commas() {
        let record = BoulderRecord::parse(Stage::PairFeasibility, PAIR_REJECTED).unwrap();
        assert_eq!(
            record.get("PRIMER_PAIR_EXPLAIN"),
            Some("considered 1, high any compl 1, ok 0")
        );
        assert_eq!(
            record
                .returned(Stage::PairFeasibility, "PRIMER_PAIR_NUM_RETURNED")
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_malformed_output_is_an_error() {
        let err = BoulderRecord::parse(Stage::PrimerFeasibility, "garbage\n=\n").unwrap_err();
        assert_eq!(err.stage, Stage::PrimerFeasibility);
        let record = BoulderRecord::parse(Stage::PrimerFeasibility, "PRIMER_LEFT_NUM_RETURNED=1\n=\n")
            .unwrap();
        assert!(record.float(Stage::PrimerFeasibility, "PRIMER_LEFT_0_TM").is_err());
        assert!(BoulderRecord::parse(Stage::PrimerFeasibility, "PRIMER_ERROR=bad path\n=\n").is_err());
    }

    #[test]
    fn test_boulder_record_carries_config_path() {
        let p3 = Primer3::new("primer3_core", Some(PathBuf::from("/opt/primer3_config")));
        let record = p3.boulder_record(
            "primer_pair",
            &[("SEQUENCE_PRIMER", "AAAA"), ("SEQUENCE_PRIMER_REVCOMP", "TTTT")],
        );
        assert_eq!(
            record,
            "SEQUENCE_ID=primer_pair\nPRIMER_TASK=check_primers\nSEQUENCE_PRIMER=AAAA\n\
SEQUENCE_PRIMER_REVCOMP=TTTT\nPRIMER_THERMODYNAMIC_PARAMETERS_PATH=/opt/primer3_config/\n=\n"
        );
        let bare = Primer3::new("primer3_core", None);
        assert!(!bare.boulder_record("kmer", &[]).contains("THERMODYNAMIC"));
    }
}
