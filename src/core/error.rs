//! # Error Taxonomy / 错误分类
//!
//! Typed errors for the three stages of a run: loading the configuration,
//! composing environments from it, and executing a composed environment.
//! Application-level plumbing wraps these in `anyhow` with context.
//!
//! 运行三个阶段的类型化错误：加载配置、组合环境以及执行已组合的环境。

use std::path::PathBuf;
use thiserror::Error;

use crate::core::models::FailureReason;

/// The configuration file is malformed. Fatal: nothing runs.
/// 配置文件格式错误。致命错误：不会执行任何内容。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}:{line}: {message}", path.display())]
pub struct ConfigParseError {
    pub path: PathBuf,
    /// 1-based line number, 0 when the error is not tied to a line.
    pub line: usize,
    pub message: String,
}

impl ConfigParseError {
    pub fn new(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Errors raised while composing a single environment.
/// They prevent that environment from running but leave its siblings alone.
///
/// 组合单个环境时产生的错误。
/// 它们会阻止该环境运行，但不影响其他环境。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("undefined section [{0}]")]
    UndefinedSection(String),

    #[error("section [{section}] has no attribute '{attribute}'")]
    UndefinedAttribute { section: String, attribute: String },

    #[error("cyclic reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("invalid value for '{key}' in [{section}]: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },
}

/// Errors raised while executing a composed environment.
/// 执行已组合环境时产生的错误。
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("installing into '{env}' failed: {message}")]
    DependencyInstall {
        env: String,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("'{executable}' is not whitelisted for environment '{env}'")]
    ExternalNotWhitelisted { env: String, executable: String },

    #[error("command `{command}` {}", describe_exit(*code))]
    CommandFailure { command: String, code: Option<i32> },

    #[error("command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("environment '{env}' was cancelled")]
    Cancelled { env: String },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("preparing the context directory failed: {0}")]
    Context(#[source] anyhow::Error),
}

impl ExecError {
    /// The exit code to propagate for this failure, if one exists.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::CommandFailure { code, .. } => *code,
            ExecError::DependencyInstall { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// The reporting category of this failure.
    pub fn reason(&self) -> FailureReason {
        match self {
            ExecError::DependencyInstall { .. } | ExecError::Context(_) => {
                FailureReason::DependencyInstall
            }
            ExecError::ExternalNotWhitelisted { .. } => FailureReason::NotWhitelisted,
            ExecError::CommandFailure { .. } | ExecError::Spawn { .. } => {
                FailureReason::CommandFailed
            }
            ExecError::Timeout { .. } => FailureReason::Timeout,
            ExecError::Cancelled { .. } => FailureReason::Cancelled,
        }
    }

    /// Timeouts and cancellation end the environment immediately,
    /// whatever `ignore_errors` says.
    pub fn is_interruption(&self) -> bool {
        matches!(self, ExecError::Timeout { .. } | ExecError::Cancelled { .. })
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}
