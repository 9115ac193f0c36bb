//! # Environment Execution Engine / 环境执行引擎
//!
//! Runs one composed environment through its lifecycle:
//! `Pending -> Installing -> Running -> {Passed | Failed}`.
//!
//! The install phase materializes the private context directory, runs the
//! creation command, installs dependencies and the package under test. The
//! run phase executes `commands_pre`, `commands` and `commands_post` strictly
//! in order, each inside the environment's sandbox.
//!
//! 运行单个已组合环境的完整生命周期。安装阶段准备私有上下文目录、
//! 执行创建命令并安装依赖与被测包；运行阶段在沙箱中按顺序执行命令。

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use colored::*;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::ExecError;
use crate::core::models::{CommandLine, EnvResult, EnvStatus, Environment, FailureReason};
use crate::infra::command::{run_captured, CapturedRun, Termination};
use crate::infra::fs::{self, ContextFingerprint};
use crate::infra::sandbox::{command_environment, ExternalPolicy, Verdict};
use crate::infra::t;

const PACKAGES_PLACEHOLDER: &str = "{packages}";
const OPTS_PLACEHOLDER: &str = "{opts}";

/// Settings shared by every environment of a run.
/// 一次运行中所有环境共享的设置。
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Discard existing contexts before installing.
    pub recreate: bool,
    /// Per-command wall time limit.
    pub timeout: Option<Duration>,
    /// Never install the package under test (`[tox] skipsdist`).
    pub skipsdist: bool,
    /// Directory of the package under test; install steps run here.
    pub package_root: PathBuf,
    /// Stream command output to stdout while capturing it.
    pub echo: bool,
}

/// Tracks the status of one environment and logs every transition.
struct Lifecycle<'a> {
    env: &'a str,
    status: EnvStatus,
}

impl<'a> Lifecycle<'a> {
    fn new(env: &'a str) -> Self {
        Self {
            env,
            status: EnvStatus::Pending,
        }
    }

    fn advance(&mut self, next: EnvStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.status,
            next
        );
        debug!(env = %self.env, from = ?self.status, to = ?next, "status transition");
        self.status = next;
    }
}

/// Executes a single environment and returns its final result.
///
/// Never returns an error: every failure is folded into
/// [`EnvResult::Failed`] with its reason, so siblings are never affected.
///
/// # Arguments
/// * `env` - The composed environment
/// * `opts` - Run-wide settings
/// * `cancel` - Global abort token
///
/// 执行单个环境并返回其最终结果。所有失败都会折叠为带原因的
/// [`EnvResult::Failed`]，因此不会影响其他环境。
pub async fn run_environment(
    env: &Environment,
    opts: &RunOptions,
    cancel: &CancellationToken,
) -> EnvResult {
    let start = Instant::now();
    let mut lifecycle = Lifecycle::new(&env.name);
    let mut runner = EnvRunner::new(env, opts, cancel);

    lifecycle.advance(EnvStatus::Installing);
    println!("{}", t!("run.env_installing", name = &env.name).blue());
    if let Err(error) = runner.install().await {
        lifecycle.advance(EnvStatus::Failed);
        return runner.into_failure(error, start.elapsed());
    }

    lifecycle.advance(EnvStatus::Running);
    let failure = runner.run_commands().await;
    let duration = start.elapsed();

    match failure {
        None => {
            lifecycle.advance(EnvStatus::Passed);
            println!(
                "{}",
                t!(
                    "run.env_passed",
                    name = &env.name,
                    duration = format!("{:.2}", duration.as_secs_f64())
                )
                .green()
            );
            EnvResult::Passed {
                name: env.name.clone(),
                output: runner.transcript,
                duration,
                commands_run: runner.commands_run,
            }
        }
        Some(error) => {
            lifecycle.advance(EnvStatus::Failed);
            runner.into_failure(error, duration)
        }
    }
}

struct EnvRunner<'a> {
    env: &'a Environment,
    opts: &'a RunOptions,
    cancel: &'a CancellationToken,
    policy: ExternalPolicy,
    vars: BTreeMap<String, String>,
    transcript: String,
    commands_run: usize,
}

impl<'a> EnvRunner<'a> {
    fn new(env: &'a Environment, opts: &'a RunOptions, cancel: &'a CancellationToken) -> Self {
        Self {
            env,
            opts,
            cancel,
            policy: ExternalPolicy::new(env),
            vars: command_environment(env, std::env::vars()),
            transcript: String::new(),
            commands_run: 0,
        }
    }

    fn into_failure(mut self, error: ExecError, duration: Duration) -> EnvResult {
        let reason = error.reason();
        let ignored = self.env.ignore_outcome && reason != FailureReason::Cancelled;

        self.transcript.push_str(&format!("{error}\n"));
        let line = t!(
            "run.env_failed",
            name = &self.env.name,
            reason = reason.to_string(),
            duration = format!("{:.2}", duration.as_secs_f64())
        );
        if ignored {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.red());
        }

        EnvResult::Failed {
            name: self.env.name.clone(),
            output: self.transcript,
            reason,
            exit_code: error.exit_code(),
            duration,
            ignored,
            commands_run: self.commands_run,
        }
    }

    /// Prepares the context and installs everything into it.
    async fn install(&mut self) -> Result<(), ExecError> {
        let context =
            fs::prepare_context(&self.env.envdir, self.opts.recreate).map_err(ExecError::Context)?;

        let fingerprint = ContextFingerprint {
            create_command: self.env.create_command.clone(),
            install_command: self.env.install_command.clone(),
            deps: self.env.deps.clone(),
        };

        if context.matches(&fingerprint) {
            info!(env = %self.env.name, "reusing existing context");
            println!("{}", t!("run.env_reusing", name = &self.env.name).dimmed());
        } else {
            fs::clear_fingerprint(&context.root);

            if !self.env.create_command.is_empty() {
                let argv = self.env.create_command.clone();
                self.install_step(argv).await?;
            }
            if !self.env.deps.is_empty() {
                let argv = install_argv(&self.env.install_command, &self.env.deps);
                self.install_step(argv).await?;
            }
            fs::write_fingerprint(&context.root, &fingerprint).map_err(ExecError::Context)?;
        }

        if !self.env.skip_install && !self.opts.skipsdist {
            let package = if self.env.usedevelop {
                vec!["-e".to_string(), ".".to_string()]
            } else {
                vec![".".to_string()]
            };
            let argv = install_argv(&self.env.install_command, &package);
            self.install_step(argv).await?;
        }
        Ok(())
    }

    async fn install_step(&mut self, argv: Vec<String>) -> Result<(), ExecError> {
        let display = shlex::try_join(argv.iter().map(String::as_str))
            .unwrap_or_else(|_| argv.join(" "));
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        let package_root = self.opts.package_root.clone();
        let run = self.spawn(OsStr::new(program), args, &package_root, &display).await;
        let run = run.map_err(|source| ExecError::DependencyInstall {
            env: self.env.name.clone(),
            message: format!("failed to spawn `{display}`: {source}"),
            exit_code: None,
        })?;

        match run.termination {
            Termination::Exited(Some(0)) => Ok(()),
            Termination::Exited(code) => Err(ExecError::DependencyInstall {
                env: self.env.name.clone(),
                message: format!("`{display}` failed"),
                exit_code: code,
            }),
            Termination::TimedOut => Err(self.timeout_error(&display)),
            Termination::Cancelled => Err(self.cancelled_error()),
        }
    }

    /// Runs pre, main and post commands. Returns the failure that decides
    /// the outcome, if any.
    async fn run_commands(&mut self) -> Option<ExecError> {
        let env = self.env;

        let mut failure = self.run_phase(&env.commands_pre).await;
        if failure.is_some() && !(env.ignore_errors && !is_interruption(&failure)) {
            return failure;
        }
        failure = merge(failure, self.run_phase(&env.commands).await);
        // Once `commands` started, post commands run whatever the outcome,
        // unless the run was interrupted.
        if !is_interruption(&failure) {
            failure = merge(failure, self.run_phase(&env.commands_post).await);
        }
        failure
    }

    /// Runs a list of commands in order. Stops at the first failure unless
    /// `ignore_errors` is set, and always stops on an interruption.
    async fn run_phase(&mut self, commands: &[CommandLine]) -> Option<ExecError> {
        let mut first: Option<ExecError> = None;
        for command in commands {
            match self.run_command(command).await {
                Ok(()) => {}
                Err(error) if error.is_interruption() => return Some(error),
                Err(error) => {
                    warn!(env = %self.env.name, command = %command, error = %error, "command failed");
                    if first.is_none() {
                        first = Some(error);
                    }
                    if !self.env.ignore_errors {
                        break;
                    }
                }
            }
        }
        first
    }

    async fn run_command(&mut self, command: &CommandLine) -> Result<(), ExecError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled_error());
        }

        let search_path = self.vars.get("PATH").map(String::as_str);
        let program = match self
            .policy
            .check(command.program(), &self.env.changedir, search_path)
        {
            Verdict::Managed(path) | Verdict::Whitelisted(path) => path,
            Verdict::Denied => {
                return Err(ExecError::ExternalNotWhitelisted {
                    env: self.env.name.clone(),
                    executable: command.program().to_string(),
                });
            }
        };

        println!(
            "{} {}",
            t!("run.command_prefix", name = &self.env.name).cyan(),
            command.display
        );
        self.commands_run += 1;

        let changedir = self.env.changedir.clone();
        let run = self
            .spawn(program.as_os_str(), &command.argv[1..], &changedir, &command.display)
            .await
            .map_err(|source| ExecError::Spawn {
                command: command.display.clone(),
                source,
            })?;

        match run.termination {
            Termination::Exited(Some(0)) => Ok(()),
            Termination::Exited(code) if command.ignore_exit => {
                debug!(env = %self.env.name, command = %command, ?code, "exit code ignored");
                Ok(())
            }
            Termination::Exited(code) => Err(ExecError::CommandFailure {
                command: command.display.clone(),
                code,
            }),
            Termination::TimedOut => Err(self.timeout_error(&command.display)),
            Termination::Cancelled => Err(self.cancelled_error()),
        }
    }

    /// Spawns one process inside the sandbox and appends its output to the
    /// transcript.
    async fn spawn(
        &mut self,
        program: &OsStr,
        args: &[String],
        cwd: &Path,
        shown: &str,
    ) -> std::io::Result<CapturedRun> {
        self.transcript.push_str(&format!("$ {shown}\n"));
        debug!(env = %self.env.name, cwd = %cwd.display(), command = %shown, "spawning");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .env_clear()
            .envs(&self.vars);

        let run = run_captured(cmd, self.opts.timeout, self.cancel, self.opts.echo).await?;
        debug!(env = %self.env.name, command = %shown, termination = ?run.termination, "finished");
        self.transcript.push_str(&run.output);
        Ok(run)
    }

    fn timeout_error(&self, display: &str) -> ExecError {
        ExecError::Timeout {
            command: display.to_string(),
            secs: self.opts.timeout.map(|d| d.as_secs()).unwrap_or_default(),
        }
    }

    fn cancelled_error(&self) -> ExecError {
        ExecError::Cancelled {
            env: self.env.name.clone(),
        }
    }
}

fn is_interruption(failure: &Option<ExecError>) -> bool {
    failure.as_ref().is_some_and(ExecError::is_interruption)
}

/// Keeps the first failure, unless a later one is an interruption.
fn merge(current: Option<ExecError>, next: Option<ExecError>) -> Option<ExecError> {
    match (current, next) {
        (_, Some(next)) if next.is_interruption() => Some(next),
        (Some(current), _) => Some(current),
        (None, next) => next,
    }
}

/// Fills an install command template: `{packages}` becomes the package
/// arguments, `{opts}` is dropped.
pub fn install_argv(template: &[String], packages: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(template.len() + packages.len());
    for arg in template {
        match arg.as_str() {
            PACKAGES_PLACEHOLDER => argv.extend(packages.iter().cloned()),
            OPTS_PLACEHOLDER => {}
            _ => argv.push(arg.clone()),
        }
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn install_template_is_filled() {
        let template = strings(&["pip", "install", "{opts}", "{packages}"]);
        assert_eq!(
            install_argv(&template, &strings(&["flake8", "pytest>=6"])),
            strings(&["pip", "install", "flake8", "pytest>=6"])
        );
        assert_eq!(
            install_argv(&template, &strings(&["-e", "."])),
            strings(&["pip", "install", "-e", "."])
        );
    }

    #[test]
    fn interruptions_win_the_merge() {
        let failed = || ExecError::CommandFailure {
            command: "false".into(),
            code: Some(1),
        };
        let timeout = ExecError::Timeout {
            command: "sleep 9".into(),
            secs: 1,
        };

        let kept = merge(Some(failed()), Some(failed())).unwrap();
        assert_eq!(kept.reason(), FailureReason::CommandFailed);

        let replaced = merge(Some(failed()), Some(timeout)).unwrap();
        assert_eq!(replaced.reason(), FailureReason::Timeout);

        assert!(merge(None, None).is_none());
    }
}
