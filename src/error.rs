use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Input,
    Config,
    Io,
    Kmers,
    PrimerFeasibility,
    PairFeasibility,
    Alignment,
    HitResolution,
    ProductSimulation,
    Scoring,
    Annotation,
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineError {
    pub stage: Stage,
    pub message: String,
}

impl PipelineError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.stage, self.message)
    }
}

impl Error for PipelineError {}

pub type Result<T> = std::result::Result<T, PipelineError>;
