//! # envmatrix Library / envmatrix 库
//!
//! A configuration-driven runner that composes a matrix of isolated test
//! environments from shared fragments of a `tox.ini` style file and executes
//! each environment's command sequence.
//!
//! 一个配置驱动的运行器：从 `tox.ini` 风格文件中的共享片段组合出隔离的
//! 测试环境矩阵，并执行每个环境的命令序列。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration model, factor engine, composer, planner and executor
//! - `infra` - Process execution, sandboxing, context directories and logging
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 配置模型、因子引擎、组合器、计划器与执行器
//! - `infra` - 进程执行、沙箱、上下文目录与日志
//! - `reporting` - 控制台、HTML 与 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use crate::core::config;
pub use crate::core::execution;
pub use crate::core::models;

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");

/// Picks the UI locale: the requested one, else the system locale.
///
/// It attempts to match the full locale (e.g. "zh-CN"), then just the
/// language code (e.g. "en"), and finally falls back to "en".
///
/// 选择界面语言：优先使用请求的语言，否则使用系统语言。
pub fn resolve_locale(requested: Option<&str>) -> String {
    let locale = requested
        .map(str::to_string)
        .or_else(sys_locale::get_locale)
        .unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    if available_locales.contains(&locale.as_str()) {
        return locale;
    }
    locale
        .split(['-', '_'])
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}
