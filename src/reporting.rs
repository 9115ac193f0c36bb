//! # Reporting Module / 报告模块
//!
//! This module handles the display and export of run results: a colorful
//! console summary, a styled HTML report and a JSON result file.
//!
//! 此模块处理运行结果的显示与导出：彩色控制台摘要、样式化 HTML 报告和 JSON 结果文件。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary};
pub use html::generate_html_report;
pub use json::generate_json_report;
