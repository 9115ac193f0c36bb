//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it loads the configuration,
//! plans the selected environments and executes them through a bounded
//! worker pool, then reports.
//!
//! 此模块实现 `run` 命令：加载配置、规划所选环境，
//! 通过有界工作池执行它们，然后输出报告。

use anyhow::{Context, Result};
use colored::*;
use futures::{stream, StreamExt};
use std::{env, path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    core::{
        composer::CompositionContext,
        config::{self, ConfigFile},
        execution::{run_environment, RunOptions},
        models::{EnvResult, FailureReason},
        planner::{self, ExecutionPlan, PlannedEnv},
    },
    infra::t,
    reporting::{generate_html_report, generate_json_report, print_failure_details, print_summary},
};

/// Arguments of the `run` subcommand.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    /// Generative selection; falls back to `ENVMATRIX_ENV` and the envlist.
    pub envlist: Option<String>,
    pub parallel: usize,
    pub recreate: bool,
    pub timeout_secs: Option<u64>,
    pub html: Option<PathBuf>,
    pub result_json: Option<PathBuf>,
    /// Substituted for `{posargs}`.
    pub posargs: Vec<String>,
}

/// Executes the run command with the provided arguments.
///
/// # Returns
/// `Ok` when every selected environment passed or failed with
/// `ignore_outcome`; an error otherwise, which makes the process exit 1.
///
/// 执行 run 命令。当所有选中环境通过（或失败被忽略）时返回 `Ok`。
pub async fn execute(args: RunArgs, locale: &str) -> Result<()> {
    let config = config::load_config(&args.config)
        .with_context(|| t!("run.config_load_failed", locale = locale, path = args.config.display()))?;
    println!(
        "{}",
        t!("run.loaded_config", locale = locale, path = config.path.display())
    );
    if let Some(minversion) = &config.settings.minversion {
        debug!(minversion = %minversion, "minversion is informational only");
    }

    let env_selection = env::var(planner::ENV_SELECTION_VAR).ok();
    let names = planner::select_envs(&config, args.envlist.as_deref(), env_selection.as_deref());
    if names.is_empty() {
        println!("{}", t!("run.no_envs", locale = locale).yellow());
        return Ok(());
    }

    let ctx = CompositionContext::from_process(args.posargs.clone());
    let plan = planner::plan_execution(&config, &names, &ctx);
    println!(
        "{}",
        t!(
            "run.plan",
            locale = locale,
            count = plan.entries.len(),
            parallel = args.parallel
        )
        .bold()
    );

    let stop_token = setup_signal_handler(locale);
    let opts = RunOptions {
        recreate: args.recreate,
        timeout: args.timeout_secs.map(Duration::from_secs),
        skipsdist: config.settings.skipsdist,
        package_root: config.root.clone(),
        echo: args.parallel == 1,
    };

    let results = run_envs(plan, args.parallel, opts, stop_token, locale).await;

    print_summary(&results, locale);
    print_failure_details(&results, locale);
    write_reports(&args, &config, &results, locale);

    if !run_succeeded(&results) {
        let failed = results.iter().filter(|r| r.is_unexpected_failure()).count();
        let skipped = results
            .iter()
            .filter(|r| matches!(r, EnvResult::Skipped { .. }))
            .count();
        if skipped > 0 {
            anyhow::bail!(
                t!("run.aborted", locale = locale, failed = failed, skipped = skipped).to_string()
            );
        }
        anyhow::bail!(t!("run.failed", locale = locale, count = failed).to_string());
    }
    println!("\n{}", t!("run.all_passed", locale = locale).green().bold());
    Ok(())
}

fn write_reports(args: &RunArgs, config: &ConfigFile, results: &[EnvResult], locale: &str) {
    if let Some(report_path) = &args.html {
        println!(
            "\n{}",
            t!("report.generating_html", locale = locale, path = report_path.display())
        );
        if let Err(e) = generate_html_report(results, report_path, locale) {
            eprintln!("{} {:#}", t!("report.html_failed", locale = locale).red(), e);
        }
    }
    if let Some(report_path) = &args.result_json {
        if let Err(e) = generate_json_report(results, &config.path, report_path) {
            eprintln!("{} {:#}", t!("report.json_failed", locale = locale).red(), e);
        }
    }
}

/// The run succeeds only when every selected environment passed or failed
/// under `ignore_outcome`. Environments skipped by an abort count against it.
///
/// 仅当所有选中的环境都通过或在 `ignore_outcome` 下失败时运行才算成功。
/// 因中止而跳过的环境会导致运行失败。
pub fn run_succeeded(results: &[EnvResult]) -> bool {
    results.iter().all(EnvResult::counts_as_success)
}

/// Sets up a Ctrl-C handler that aborts the whole run.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    token
}

/// Runs the planned environments with at most `jobs` in flight.
/// Results come back in plan order.
///
/// 以最多 `jobs` 个并发执行计划中的环境，结果按计划顺序返回。
pub async fn run_envs(
    plan: ExecutionPlan,
    jobs: usize,
    opts: RunOptions,
    stop_token: CancellationToken,
    locale: &str,
) -> Vec<EnvResult> {
    let opts = Arc::new(opts);

    stream::iter(plan.entries.into_iter().map(|entry| {
        let opts = Arc::clone(&opts);
        let stop_token = stop_token.clone();
        let locale = locale.to_string();

        async move {
            match entry {
                PlannedEnv::Invalid { name, error } => {
                    println!(
                        "{}",
                        t!("run.composition_failed", locale = &locale, name = &name, error = error.to_string()).red()
                    );
                    EnvResult::Failed {
                        name,
                        output: format!("{error}\n"),
                        reason: FailureReason::Composition,
                        exit_code: None,
                        duration: Duration::ZERO,
                        ignored: false,
                        commands_run: 0,
                    }
                }
                PlannedEnv::Ready(env) => {
                    // Environments that never started are skipped, not failed.
                    if stop_token.is_cancelled() {
                        return EnvResult::Skipped { name: env.name.clone() };
                    }
                    let name = env.name.clone();
                    let handle = tokio::spawn(async move {
                        run_environment(&env, &opts, &stop_token).await
                    });
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => EnvResult::Failed {
                            name,
                            output: format!("internal error while running the environment: {e}\n"),
                            reason: FailureReason::Internal,
                            exit_code: None,
                            duration: Duration::ZERO,
                            ignored: false,
                            commands_run: 0,
                        },
                    }
                }
            }
        }
    }))
    .buffered(jobs.max(1))
    .collect::<Vec<EnvResult>>()
    .await
}
