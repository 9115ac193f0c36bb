//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints the per-environment summary after a run and the full
//! captured output of every environment that failed.
//!
//! 此模块在运行结束后打印每个环境的摘要，以及每个失败环境的完整捕获输出。

use colored::*;

use crate::core::models::EnvResult;
use crate::infra::t;

/// Prints a formatted summary of environment results to the console.
/// Displays a table with status, name, duration and exit code, using color
/// coding to highlight different statuses.
///
/// 在控制台打印格式化的环境结果摘要。
///
/// # Arguments / 参数
/// * `results` - Results in selection order / 按选择顺序排列的结果
/// * `locale` - The language locale to use for messages / 消息使用的语言区域
///
/// # Output Format / 输出格式
/// ```text
/// --- Summary ---
///   - Passed           | py36-lint                      |      1.23s |
///   - Failed           | py36-tests                     |      0.45s | exit 1
///   - Ignored Failure  | coverage                       |      2.10s | exit 2
///   - Skipped          | checksetup                     |        N/A |
/// ```
pub fn print_summary(results: &[EnvResult], locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for result in results {
        let status_str = result.status_str(locale);
        let duration_str = result
            .duration()
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());
        let detail = match result {
            EnvResult::Failed {
                exit_code: Some(code),
                ..
            } => t!("report.exit_code", locale = locale, code = code).to_string(),
            EnvResult::Failed { reason, .. } => reason.to_string(),
            _ => String::new(),
        };

        let status_colored = match result {
            EnvResult::Passed { .. } => status_str.green(),
            EnvResult::Failed { ignored: true, .. } => status_str.yellow(),
            EnvResult::Failed { .. } => status_str.red(),
            EnvResult::Skipped { .. } => status_str.dimmed(),
        };

        println!(
            "  - {:<18} | {:<30} | {:>10} | {}",
            status_colored,
            result.name(),
            duration_str,
            detail
        );
    }

    let passed = results.iter().filter(|r| r.is_passed()).count();
    let failed = results.iter().filter(|r| r.is_unexpected_failure()).count();
    let ignored = results.iter().filter(|r| r.is_ignored_failure()).count();
    let skipped = results.len() - passed - failed - ignored;
    let totals = t!(
        "report.totals",
        locale = locale,
        passed = passed,
        failed = failed,
        ignored = ignored,
        skipped = skipped
    );
    if failed == 0 {
        println!("\n{}", totals.green().bold());
    } else {
        println!("\n{}", totals.red().bold());
    }
}

/// Prints the full captured output of every failed environment.
/// Ignored failures are included: their output is just as useful.
///
/// 打印每个失败环境的完整捕获输出。被忽略的失败同样包含在内。
pub fn print_failure_details(results: &[EnvResult], locale: &str) {
    let failures: Vec<&EnvResult> = results.iter().filter(|r| r.is_failure()).collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("report.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, result) in failures.iter().enumerate() {
        let reason = result.reason().map(|r| r.to_string()).unwrap_or_default();
        println!(
            "[{}/{}] {} '{}' ({})",
            i + 1,
            failures.len(),
            t!("report.failure_header", locale = locale).red(),
            result.name().cyan(),
            reason
        );
        println!("\n--- {} ---\n", t!("report.output_log", locale = locale).yellow());
        println!("{}", result.output().trim_end());
        println!("\n{}", "-".repeat(80));
    }
}
