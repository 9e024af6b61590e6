//! Running external tools. A non-zero exit is always fatal; output of a failed
//! run is never interpreted.

use crate::error::{PipelineError, Result, Stage};
use std::{
    io::{ErrorKind, Write},
    process::{Command, Stdio},
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
}

pub fn run_tool(
    stage: Stage,
    executable: &str,
    args: &[String],
    stdin: Option<&str>,
) -> Result<ToolOutput> {
    debug!(executable, args = %args.join(" "), "running external tool");
    let mut child = Command::new(executable)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PipelineError::new(
                    stage,
                    format!("Could not find executable '{executable}'"),
                )
            } else {
                PipelineError::new(
                    stage,
                    format!(
                        "Could not run '{executable}' with args [{}]: {e}",
                        args.join(" ")
                    ),
                )
            }
        })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).map_err(|e| {
            PipelineError::new(stage, format!("Could not write input to '{executable}': {e}"))
        })?;
    }

    let output = child.wait_with_output().map_err(|e| {
        PipelineError::new(stage, format!("Could not wait for '{executable}': {e}"))
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(PipelineError::new(
            stage,
            format!(
                "{} {} failed (status={:?}, stderr='{}')",
                executable,
                args.join(" "),
                output.status.code(),
                stderr.trim()
            ),
        ));
    }
    if !stderr.trim().is_empty() {
        debug!(executable, stderr = %stderr.trim(), "external tool diagnostics");
    }
    Ok(ToolOutput { stdout })
}
