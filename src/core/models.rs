//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the runner:
//! the composed `Environment`, the per-environment state machine, failure
//! reasons and the final `EnvResult` of one environment.
//!
//! 此模块定义了整个运行器中使用的核心数据结构：
//! 组合后的 `Environment`、每个环境的状态机、失败原因以及单个环境的最终结果。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infra::t;

/// A single command line of an environment, already split into arguments.
/// 环境中的单条命令行，已拆分为参数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    /// The line as written after substitution, for logs and reports.
    pub display: String,
    pub argv: Vec<String>,
    /// Declared with a leading `-`: a non-zero exit is not a failure.
    pub ignore_exit: bool,
}

impl CommandLine {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// A fully resolved environment. Immutable once composed.
///
/// 完全解析后的环境。组合完成后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub factors: BTreeSet<String>,
    /// The section the environment's own settings came from.
    pub section: String,
    pub description: Option<String>,
    /// Dependency specifiers, in declaration order.
    pub deps: Vec<String>,
    pub commands_pre: Vec<CommandLine>,
    pub commands: Vec<CommandLine>,
    pub commands_post: Vec<CommandLine>,
    /// Executable names, paths or globs allowed outside the context.
    pub whitelist_externals: Vec<String>,
    /// Variable names or globs forwarded from the invoking process.
    pub passenv: Vec<String>,
    pub setenv: BTreeMap<String, String>,
    pub changedir: PathBuf,
    /// Private context directory of this environment.
    pub envdir: PathBuf,
    /// Argument template creating the context; empty means no creation step.
    pub create_command: Vec<String>,
    /// Argument template containing `{packages}` and optionally `{opts}`.
    pub install_command: Vec<String>,
    pub skip_install: bool,
    pub usedevelop: bool,
    pub ignore_errors: bool,
    pub ignore_outcome: bool,
}

impl Environment {
    pub fn bin_dir(&self) -> PathBuf {
        self.envdir.join("bin")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.envdir.join("tmp")
    }

}

/// Lifecycle of one environment.
/// `Pending -> Installing -> Running -> {Passed | Failed}`; no retries.
///
/// 单个环境的生命周期。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvStatus {
    Pending,
    Installing,
    Running,
    Passed,
    Failed,
}

impl EnvStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EnvStatus::Passed | EnvStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    /// Any non-terminal state may fail; cancellation can strike at any time.
    pub fn can_transition_to(self, next: EnvStatus) -> bool {
        use EnvStatus::*;
        match (self, next) {
            (Pending, Installing) | (Installing, Running) | (Running, Passed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Enumerates the possible reasons for an environment failure.
/// This helps in categorizing errors for reporting and handling.
///
/// 枚举环境失败的可能原因，便于报告和处理时对错误分类。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum FailureReason {
    /// The environment could not be composed from the configuration.
    /// 无法根据配置组合环境。
    Composition,
    /// Creating the context or installing dependencies failed.
    /// 创建上下文或安装依赖失败。
    DependencyInstall,
    /// A command's executable lives outside the context and is not whitelisted.
    /// 命令的可执行文件不在上下文中且未被列入白名单。
    NotWhitelisted,
    /// A command exited with a non-zero code.
    /// 命令以非零退出码结束。
    CommandFailed,
    /// A command exceeded the per-command timeout.
    /// 命令超出了单条命令的超时时间。
    Timeout,
    /// The run was interrupted.
    /// 运行被中断。
    Cancelled,
    /// The runner itself crashed while handling the environment.
    /// 运行器在处理环境时自身崩溃。
    Internal,
}

/// Represents the final result of a single environment.
///
/// 表示单个环境的最终结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EnvResult {
    /// Every command passed.
    /// 所有命令均已通过。
    Passed {
        name: String,
        /// The complete captured output / 完整的捕获输出
        output: String,
        duration: Duration,
        commands_run: usize,
    },
    /// The environment failed for the given reason.
    /// 环境因给定原因失败。
    Failed {
        name: String,
        output: String,
        reason: FailureReason,
        /// Exit code of the failing command, when there is one.
        exit_code: Option<i32>,
        duration: Duration,
        /// `ignore_outcome` was set: reported, but not fatal to the run.
        ignored: bool,
        /// Commands started before the failure; zero when installing failed.
        commands_run: usize,
    },
    /// The environment never started because the run was aborted.
    /// 由于运行被中止，环境从未开始。
    Skipped { name: String },
}

impl EnvResult {
    /// Checks if a result is a failure that counts against the overall run.
    pub fn is_unexpected_failure(&self) -> bool {
        matches!(self, EnvResult::Failed { ignored: false, .. })
    }

    /// Whether the result lets the overall run succeed: a pass, or a failure
    /// reported under `ignore_outcome`. A skipped environment never ran, so it
    /// does not.
    ///
    /// 结果是否允许整体运行成功：通过，或在 `ignore_outcome` 下报告的失败。
    /// 被跳过的环境从未运行，因此不算成功。
    pub fn counts_as_success(&self) -> bool {
        matches!(
            self,
            EnvResult::Passed { .. } | EnvResult::Failed { ignored: true, .. }
        )
    }

    pub fn is_ignored_failure(&self) -> bool {
        matches!(self, EnvResult::Failed { ignored: true, .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, EnvResult::Failed { .. })
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, EnvResult::Passed { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            EnvResult::Passed { name, .. }
            | EnvResult::Failed { name, .. }
            | EnvResult::Skipped { name } => name,
        }
    }

    /// The terminal state this result corresponds to.
    pub fn status(&self) -> Option<EnvStatus> {
        match self {
            EnvResult::Passed { .. } => Some(EnvStatus::Passed),
            EnvResult::Failed { .. } => Some(EnvStatus::Failed),
            EnvResult::Skipped { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            EnvResult::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EnvResult::Failed { exit_code, .. } => *exit_code,
            EnvResult::Passed { .. } => Some(0),
            EnvResult::Skipped { .. } => None,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            EnvResult::Passed { output, .. } | EnvResult::Failed { output, .. } => output,
            EnvResult::Skipped { .. } => "",
        }
    }

    pub fn commands_run(&self) -> usize {
        match self {
            EnvResult::Passed { commands_run, .. } | EnvResult::Failed { commands_run, .. } => {
                *commands_run
            }
            EnvResult::Skipped { .. } => 0,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            EnvResult::Passed { duration, .. } | EnvResult::Failed { duration, .. } => {
                Some(*duration)
            }
            EnvResult::Skipped { .. } => None,
        }
    }

    /// Gets the status of the result as a localized string for display.
    /// 以本地化字符串形式获取结果状态以供显示。
    pub fn status_str(&self, locale: &str) -> String {
        match self {
            EnvResult::Passed { .. } => t!("report.status_passed", locale = locale).to_string(),
            EnvResult::Failed { reason, ignored, .. } => {
                if *ignored {
                    t!("report.status_ignored", locale = locale).to_string()
                } else {
                    match reason {
                        FailureReason::Timeout => {
                            t!("report.status_timeout", locale = locale).to_string()
                        }
                        FailureReason::Cancelled => {
                            t!("report.status_cancelled", locale = locale).to_string()
                        }
                        _ => t!("report.status_failed", locale = locale).to_string(),
                    }
                }
            }
            EnvResult::Skipped { .. } => t!("report.status_skipped", locale = locale).to_string(),
        }
    }

    /// Gets the CSS class for the HTML report.
    pub fn status_class(&self) -> &'static str {
        match self {
            EnvResult::Passed { .. } => "status-passed",
            EnvResult::Failed { ignored: true, .. } => "status-ignored",
            EnvResult::Failed {
                reason: FailureReason::Timeout | FailureReason::Cancelled,
                ..
            } => "status-interrupted",
            EnvResult::Failed { .. } => "status-failed",
            EnvResult::Skipped { .. } => "status-skipped",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureReason::Composition => "composition",
            FailureReason::DependencyInstall => "dependency-install",
            FailureReason::NotWhitelisted => "not-whitelisted",
            FailureReason::CommandFailed => "command-failed",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Internal => "internal-error",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_allows_only_forward_transitions() {
        use EnvStatus::*;
        assert!(Pending.can_transition_to(Installing));
        assert!(Installing.can_transition_to(Running));
        assert!(Running.can_transition_to(Passed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Installing.can_transition_to(Failed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Running));
        assert!(!Installing.can_transition_to(Passed));
        assert!(!Passed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Installing));
    }

    #[test]
    fn ignored_failures_are_not_unexpected() {
        let ignored = EnvResult::Failed {
            name: "lint".into(),
            output: String::new(),
            reason: FailureReason::CommandFailed,
            exit_code: Some(1),
            duration: Duration::ZERO,
            ignored: true,
            commands_run: 1,
        };
        assert!(ignored.is_failure());
        assert!(ignored.is_ignored_failure());
        assert!(!ignored.is_unexpected_failure());
        assert_eq!(ignored.status(), Some(EnvStatus::Failed));
        assert!(ignored.counts_as_success());
    }

    #[test]
    fn skipped_has_no_terminal_status() {
        let skipped = EnvResult::Skipped { name: "tests".into() };
        assert_eq!(skipped.name(), "tests");
        assert_eq!(skipped.status(), None);
        assert_eq!(skipped.duration(), None);
        assert!(!skipped.is_failure());
        assert!(!skipped.is_unexpected_failure());
        assert!(!skipped.counts_as_success());
    }

    #[test]
    fn internal_errors_have_their_own_label() {
        let crashed = EnvResult::Failed {
            name: "tests".into(),
            output: "environment task panicked\n".into(),
            reason: FailureReason::Internal,
            exit_code: None,
            duration: Duration::ZERO,
            ignored: false,
            commands_run: 0,
        };
        assert_eq!(FailureReason::Internal.to_string(), "internal-error");
        assert_ne!(crashed.reason(), Some(FailureReason::CommandFailed));
        assert!(crashed.is_unexpected_failure());
        assert!(!crashed.counts_as_success());
        assert_eq!(crashed.status_class(), "status-failed");
    }
}
