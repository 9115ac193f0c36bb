//! # Core Module / 核心模块
//!
//! This module contains the core functionality of envmatrix: the
//! configuration model, the factor engine, environment composition,
//! planning and execution.
//!
//! 此模块包含 envmatrix 的核心功能：配置模型、因子引擎、环境组合、
//! 执行计划与执行。

pub mod composer;
pub mod config;
pub mod error;
pub mod execution;
pub mod factors;
pub mod ini;
pub mod models;
pub mod planner;
pub mod store;

// Re-exports
pub use composer::{Composer, CompositionContext};
pub use config::{load_config, ConfigFile};
pub use execution::{run_environment, RunOptions};
pub use models::{EnvResult, Environment};
