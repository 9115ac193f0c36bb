//! # Show Command / 显示命令
//!
//! Prints the composed configuration of the selected environments, or the
//! composition error of each environment that cannot be composed.
//!
//! 打印所选环境组合后的配置，或无法组合的环境的错误。

use anyhow::{Context, Result};
use colored::*;
use std::fmt::Write;
use std::path::Path;

use crate::core::composer::CompositionContext;
use crate::core::config;
use crate::core::models::{CommandLine, Environment};
use crate::core::planner::{self, PlannedEnv};
use crate::infra::t;

/// Renders a composed environment in the dialect's own `key = value` form.
pub fn render_environment(env: &Environment) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[testenv:{}]", env.name);
    let mut line = |key: &str, value: String| {
        let _ = writeln!(out, "{key} = {value}");
    };

    line("section", env.section.clone());
    line(
        "factors",
        env.factors.iter().cloned().collect::<Vec<_>>().join(" "),
    );
    if let Some(description) = &env.description {
        line("description", description.clone());
    }
    line("envdir", env.envdir.display().to_string());
    line("changedir", env.changedir.display().to_string());
    line("create_command", env.create_command.join(" "));
    line("install_command", env.install_command.join(" "));
    line("deps", multiline(&env.deps));
    line("commands_pre", commands(&env.commands_pre));
    line("commands", commands(&env.commands));
    line("commands_post", commands(&env.commands_post));
    line("whitelist_externals", multiline(&env.whitelist_externals));
    line("passenv", multiline(&env.passenv));
    line(
        "setenv",
        multiline(
            &env.setenv
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>(),
        ),
    );
    line("skip_install", env.skip_install.to_string());
    line("usedevelop", env.usedevelop.to_string());
    line("ignore_errors", env.ignore_errors.to_string());
    line("ignore_outcome", env.ignore_outcome.to_string());
    out
}

fn multiline(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("\n    {item}"))
        .collect::<String>()
}

fn commands(lines: &[CommandLine]) -> String {
    lines
        .iter()
        .map(|c| {
            if c.ignore_exit {
                format!("\n    - {}", c.display)
            } else {
                format!("\n    {}", c.display)
            }
        })
        .collect::<String>()
}

pub fn execute(config_path: &Path, envlist: Option<&str>, locale: &str) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| t!("run.config_load_failed", locale = locale, path = config_path.display()))?;

    let env_selection = std::env::var(planner::ENV_SELECTION_VAR).ok();
    let names = planner::select_envs(&config, envlist, env_selection.as_deref());
    let plan = planner::plan_execution(&config, &names, &CompositionContext::from_process(vec![]));

    for entry in &plan.entries {
        match entry {
            PlannedEnv::Ready(env) => println!("{}", render_environment(env)),
            PlannedEnv::Invalid { name, error } => {
                println!(
                    "{}\n",
                    t!("show.composition_error", locale = locale, name = name, error = error.to_string()).red()
                );
            }
        }
    }

    let invalid = plan.invalid_count();
    if invalid > 0 {
        anyhow::bail!(t!("show.invalid_envs", locale = locale, count = invalid).to_string());
    }
    Ok(())
}
