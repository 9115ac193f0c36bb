//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for envmatrix:
//! process execution, the per-command sandbox, context directories on disk,
//! logging setup and i18n support.
//!
//! 此模块为 envmatrix 提供基础设施服务：
//! 进程执行、命令沙箱、磁盘上的上下文目录、日志初始化和国际化支持。

pub mod command;
pub mod fs;
pub mod logging;
pub mod sandbox;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
