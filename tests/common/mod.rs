// Shared helpers for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use envmatrix::core::composer::{Composer, CompositionContext};
use envmatrix::core::config::{load_config, ConfigFile};
use envmatrix::core::execution::RunOptions;
use envmatrix::core::planner::{self, ExecutionPlan};
use envmatrix::models::Environment;

/// Header shared by test configurations. Nothing is ever created or
/// installed, so the tests need no interpreter on the machine.
///
/// 测试配置共享的头部。不创建也不安装任何东西，因此测试机器无需解释器。
pub const NO_INSTALL: &str = "\
[tox]
skipsdist = true

[testenv]
create_command =
whitelist_externals = sh
";

/// Creates a project directory containing a `tox.ini` with `body`.
/// 创建包含 `tox.ini` 的项目目录。
pub fn project(body: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("Failed to create temporary directory");
    let config = write_config(dir.path(), "tox.ini", body);
    (dir, config)
}

pub fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("Failed to write configuration file");
    path
}

pub fn load(path: &Path) -> ConfigFile {
    load_config(path).expect("Failed to load configuration")
}

/// Plans the given selection with no positional arguments.
pub fn plan(config: &ConfigFile, selection: &str) -> ExecutionPlan {
    let names = planner::select_envs(config, Some(selection), None);
    planner::plan_execution(config, &names, &CompositionContext::default())
}

/// Composes a single environment from the shared `[testenv]` section,
/// panicking when it cannot be composed.
pub fn compose(config: &ConfigFile, name: &str) -> Environment {
    let ctx = CompositionContext::default();
    Composer::new(config, &ctx)
        .compose(name)
        .unwrap_or_else(|error| panic!("cannot compose {name}: {error}"))
}

/// Quiet run options rooted at the configuration directory.
pub fn options(config: &ConfigFile) -> RunOptions {
    RunOptions {
        recreate: false,
        timeout: None,
        skipsdist: config.settings.skipsdist,
        package_root: config.root.clone(),
        echo: false,
    }
}
