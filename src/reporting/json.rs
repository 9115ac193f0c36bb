//! # JSON Result Report / JSON 结果报告
//!
//! Machine-readable rendition of a run, written with `--result-json PATH`.
//!
//! 运行结果的机器可读形式，通过 `--result-json PATH` 写出。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::models::{EnvResult, FailureReason};

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Local>,
    pub config: String,
    pub success: bool,
    pub environments: Vec<EnvReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct EnvReport<'a> {
    pub name: &'a str,
    /// `passed`, `failed` or `skipped`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub ignored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub commands_run: usize,
    pub output: &'a str,
}

impl<'a> From<&'a EnvResult> for EnvReport<'a> {
    fn from(result: &'a EnvResult) -> Self {
        let status = match result {
            EnvResult::Passed { .. } => "passed",
            EnvResult::Failed { .. } => "failed",
            EnvResult::Skipped { .. } => "skipped",
        };
        Self {
            name: result.name(),
            status,
            reason: result.reason(),
            ignored: result.is_ignored_failure(),
            exit_code: result.exit_code(),
            duration_secs: result.duration().map(|d| d.as_secs_f64()),
            commands_run: result.commands_run(),
            output: result.output(),
        }
    }
}

pub fn build_report<'a>(results: &'a [EnvResult], config: &Path) -> RunReport<'a> {
    RunReport {
        generated_at: Local::now(),
        config: config.display().to_string(),
        success: results.iter().all(EnvResult::counts_as_success),
        environments: results.iter().map(EnvReport::from).collect(),
    }
}

/// Writes the JSON report to `output_path`.
pub fn generate_json_report(results: &[EnvResult], config: &Path, output_path: &Path) -> Result<()> {
    let report = build_report(results, config);
    let body = serde_json::to_string_pretty(&report)?;
    fs::write(output_path, body)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;
    Ok(())
}
