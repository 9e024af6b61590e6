//! Resolution of external executables: explicit setting, then environment, then PATH.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const BWA_ENV_BIN: &str = "CAMPLICON_BWA_BIN";
pub const PRIMER3_ENV_BIN: &str = "CAMPLICON_PRIMER3_BIN";
pub const KMC_ENV_DIR: &str = "CAMPLICON_KMC_DIR";

pub const DEFAULT_BWA_BIN: &str = "bwa";
pub const DEFAULT_PRIMER3_BIN: &str = "primer3_core";
pub const DEFAULT_KMC_BIN: &str = "kmc";
pub const DEFAULT_KMC_TOOLS_BIN: &str = "kmc_tools";
pub const DEFAULT_KMC_DUMP_BIN: &str = "kmc_dump";

fn normalized_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn configured_or_env(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured.and_then(normalized_non_empty).or_else(|| {
        std::env::var(env_var)
            .ok()
            .and_then(|v| normalized_non_empty(&v))
    })
}

pub fn resolve_tool_executable(configured: Option<&str>, env_var: &str, default_bin: &str) -> String {
    configured_or_env(configured, env_var).unwrap_or_else(|| default_bin.to_string())
}

/// Executables for one run, resolved once and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub bwa: String,
    pub primer3: String,
    pub kmc_dir: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::resolve(None, None, None)
    }
}

impl ToolPaths {
    pub fn resolve(bwa: Option<&str>, primer3: Option<&str>, kmc_dir: Option<&str>) -> Self {
        Self {
            bwa: resolve_tool_executable(bwa, BWA_ENV_BIN, DEFAULT_BWA_BIN),
            primer3: resolve_tool_executable(primer3, PRIMER3_ENV_BIN, DEFAULT_PRIMER3_BIN),
            kmc_dir: configured_or_env(kmc_dir, KMC_ENV_DIR).map(PathBuf::from),
        }
    }

    /// A KMC suite binary, inside `kmc_dir` when one is configured.
    pub fn kmc_binary(&self, name: &str) -> String {
        match &self.kmc_dir {
            Some(dir) => Path::new(dir).join(name).to_string_lossy().into_owned(),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_setting_wins() {
        assert_eq!(
            resolve_tool_executable(Some(" /opt/bwa/bwa "), "CAMPLICON_TEST_UNSET_VAR", "bwa"),
            "/opt/bwa/bwa"
        );
        assert_eq!(
            resolve_tool_executable(Some("  "), "CAMPLICON_TEST_UNSET_VAR", "bwa"),
            "bwa"
        );
    }

    #[test]
    fn test_kmc_binaries_live_in_configured_dir() {
        let paths = ToolPaths {
            bwa: "bwa".to_string(),
            primer3: "primer3_core".to_string(),
            kmc_dir: Some(PathBuf::from("/opt/kmc/bin")),
        };
        assert_eq!(paths.kmc_binary(DEFAULT_KMC_DUMP_BIN), "/opt/kmc/bin/kmc_dump");
        let bare = ToolPaths {
            kmc_dir: None,
            ..paths
        };
        assert_eq!(bare.kmc_binary(DEFAULT_KMC_BIN), "kmc");
    }
}
