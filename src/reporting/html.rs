//! # HTML Reporting Module / HTML 报告模块
//!
//! Renders a self-contained HTML report with `maud`: summary counters, one
//! row per environment and a collapsible transcript for each failure.
//!
//! 使用 `maud` 渲染自包含的 HTML 报告：汇总计数、每个环境一行，
//! 以及每个失败环境可折叠的输出记录。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::core::models::EnvResult;
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2em; color: #222; }
h1 { font-weight: 600; }
.generated { color: #777; font-size: 0.9em; }
.summary-container { display: flex; gap: 1.5em; margin: 1.5em 0; }
.summary-item { display: flex; flex-direction: column; align-items: center; padding: 0.8em 1.4em; border-radius: 6px; background: #f5f5f5; }
.summary-item .count { font-size: 1.8em; font-weight: 700; }
.passed-text { color: #2e7d32; } .failed-text { color: #c62828; } .ignored-text { color: #b26a00; } .skipped-text { color: #757575; }
table { border-collapse: collapse; width: 100%; }
th, td { text-align: left; padding: 0.5em 0.8em; border-bottom: 1px solid #e0e0e0; vertical-align: top; }
.status-cell { display: inline-block; padding: 0.15em 0.6em; border-radius: 4px; font-weight: 600; }
.status-passed { background: #e8f5e9; color: #2e7d32; }
.status-failed { background: #ffebee; color: #c62828; }
.status-interrupted { background: #fce4ec; color: #ad1457; }
.status-ignored { background: #fff3e0; color: #b26a00; }
.status-skipped { background: #eeeeee; color: #616161; }
.output-toggle { cursor: pointer; color: #1565c0; font-size: 0.85em; margin-top: 0.3em; }
.output-content { background: #263238; color: #eceff1; padding: 1em; overflow-x: auto; white-space: pre-wrap; }
"#;

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = r#"
function toggleOutput(id) {
  var row = document.getElementById(id);
  row.style.display = row.style.display === 'none' ? 'table-row' : 'none';
}
"#;

/// Renders the report markup.
pub fn render_html_report(results: &[EnvResult], locale: &str) -> Markup {
    let passed = results.iter().filter(|r| r.is_passed()).count();
    let failed = results.iter().filter(|r| r.is_unexpected_failure()).count();
    let ignored = results.iter().filter(|r| r.is_ignored_failure()).count();
    let skipped = results.len() - passed - failed - ignored;
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string();

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale)) }
                p.generated { (t!("html_report.generated_at", locale = locale, time = generated)) }

                div.summary-container {
                    (summary_item(results.len(), "", &t!("html_report.summary.total", locale = locale)))
                    (summary_item(passed, "passed-text", &t!("html_report.summary.passed", locale = locale)))
                    (summary_item(failed, "failed-text", &t!("html_report.summary.failed", locale = locale)))
                    (summary_item(ignored, "ignored-text", &t!("html_report.summary.ignored", locale = locale)))
                    (summary_item(skipped, "skipped-text", &t!("html_report.summary.skipped", locale = locale)))
                }

                table {
                    thead {
                        tr {
                            th { (t!("html_report.table.header.name", locale = locale)) }
                            th { (t!("html_report.table.header.status", locale = locale)) }
                            th { (t!("html_report.table.header.reason", locale = locale)) }
                            th { (t!("html_report.table.header.exit_code", locale = locale)) }
                            th { (t!("html_report.table.header.commands", locale = locale)) }
                            th { (t!("html_report.table.header.duration", locale = locale)) }
                        }
                    }
                    tbody {
                        @for (i, result) in results.iter().enumerate() {
                            (result_rows(i, result, locale))
                        }
                    }
                }
                script { (PreEscaped(HTML_SCRIPT)) }
            }
        }
    }
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div.summary-item {
            span class=(format!("count {class}")) { (count) }
            span.label { (label) }
        }
    }
}

fn result_rows(index: usize, result: &EnvResult, locale: &str) -> Markup {
    let output_id = format!("output-{index}");
    let duration = result
        .duration()
        .map(|d| format!("{:.2}s", d.as_secs_f64()))
        .unwrap_or_else(|| "N/A".to_string());
    let reason = result.reason().map(|r| r.to_string()).unwrap_or_default();
    let exit_code = match result {
        EnvResult::Skipped { .. } => String::new(),
        other => other
            .exit_code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string()),
    };

    html! {
        tr {
            td { (result.name()) }
            td {
                div class=(format!("status-cell {}", result.status_class())) {
                    (result.status_str(locale))
                }
                @if result.is_failure() {
                    div.output-toggle onclick=(format!("toggleOutput('{output_id}')")) {
                        (t!("html_report.toggle_output", locale = locale))
                    }
                }
            }
            td { (reason) }
            td { (exit_code) }
            td { (result.commands_run()) }
            td { (duration) }
        }
        @if result.is_failure() {
            tr id=(output_id) style="display:none;" {
                td colspan="6" {
                    pre.output-content { (result.output()) }
                }
            }
        }
    }
}

/// Generates the HTML report and writes it to `output_path`.
///
/// 生成 HTML 报告并写入 `output_path`。
///
/// # Errors / 错误
/// Fails when the file cannot be written.
pub fn generate_html_report(results: &[EnvResult], output_path: &Path, locale: &str) -> Result<()> {
    let markup = render_html_report(results, locale);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report to {}", output_path.display()))?;
    Ok(())
}
