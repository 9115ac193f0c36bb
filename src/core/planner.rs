//! # Execution Planner Module / 执行计划模块
//!
//! This module decides which environments a run covers and composes each of
//! them up front. A composition error marks only the affected environment;
//! the rest of the plan stays runnable.
//!
//! 此模块决定一次运行包含哪些环境，并预先组合每个环境。
//! 组合错误只影响对应环境，计划中的其他环境仍可运行。

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::core::composer::{Composer, CompositionContext};
use crate::core::config::{ConfigFile, ENV_SECTION_PREFIX};
use crate::core::error::ComposeError;
use crate::core::factors::{expand_envlist, factors_of, split_condition};
use crate::core::models::Environment;

/// Environment variable selecting environments when none are given on the
/// command line.
pub const ENV_SELECTION_VAR: &str = "ENVMATRIX_ENV";
/// Selection keyword meaning every configured environment.
pub const ALL_ENVS: &str = "ALL";

/// One selected environment, ready to run or not.
/// 一个被选中的环境，可能已就绪，也可能组合失败。
#[derive(Debug, Clone)]
pub enum PlannedEnv {
    Ready(Box<Environment>),
    Invalid { name: String, error: ComposeError },
}

impl PlannedEnv {
    pub fn name(&self) -> &str {
        match self {
            PlannedEnv::Ready(env) => &env.name,
            PlannedEnv::Invalid { name, .. } => name,
        }
    }
}

/// Represents a complete execution plan, in selection order.
/// 表示完整的执行计划，按选择顺序排列。
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub entries: Vec<PlannedEnv>,
}

impl ExecutionPlan {
    pub fn ready(&self) -> impl Iterator<Item = &Environment> {
        self.entries.iter().filter_map(|entry| match entry {
            PlannedEnv::Ready(env) => Some(env.as_ref()),
            PlannedEnv::Invalid { .. } => None,
        })
    }

    pub fn invalid_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, PlannedEnv::Invalid { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Chooses the environment names to run.
///
/// Priority: the command-line selection, then `ENVMATRIX_ENV`, then the
/// configured `envlist`, then every declared `[testenv:<name>]` section.
/// Selections are generative (`py{27,36}-lint`); `ALL` selects everything.
///
/// 选择要运行的环境名称。
pub fn select_envs(
    config: &ConfigFile,
    cli_selection: Option<&str>,
    env_selection: Option<&str>,
) -> Vec<String> {
    let raw = cli_selection
        .filter(|s| !s.trim().is_empty())
        .or(env_selection.filter(|s| !s.trim().is_empty()));

    match raw {
        Some(raw) => {
            let names = expand_envlist(raw);
            if names.iter().any(|n| n == ALL_ENVS) {
                config.all_envs()
            } else {
                names
            }
        }
        None if !config.settings.envlist.is_empty() => config.settings.envlist.clone(),
        None => config.declared_envs(),
    }
}

/// Factors the configuration knows about: those of envlist entries and
/// declared sections, plus every factor named by a condition.
fn known_factors(config: &ConfigFile) -> BTreeSet<String> {
    let mut known: BTreeSet<String> = config
        .all_envs()
        .iter()
        .flat_map(|name| factors_of(name))
        .collect();

    for (_, raw) in config.store.all_values() {
        for line in raw.lines() {
            if let Some((condition, _)) = split_condition(line.trim()) {
                known.extend(condition.factors().map(str::to_string));
            }
        }
    }
    known
}

/// Whether `name` resolves to a defined environment: it is listed, has its
/// own section, or is made only of known factors.
pub fn is_defined(config: &ConfigFile, name: &str, known: &BTreeSet<String>) -> bool {
    config.settings.envlist.iter().any(|n| n == name)
        || config
            .store
            .has_section(&format!("{ENV_SECTION_PREFIX}{name}"))
        || factors_of(name).iter().all(|f| known.contains(f))
}

/// Composes every selected environment.
///
/// # Arguments
/// * `config` - The loaded configuration
/// * `names` - Environment names, usually from [`select_envs`]
/// * `ctx` - Positional arguments and the process environment snapshot
///
/// # Returns
/// An `ExecutionPlan` in the order of `names`.
pub fn plan_execution(
    config: &ConfigFile,
    names: &[String],
    ctx: &CompositionContext,
) -> ExecutionPlan {
    let composer = Composer::new(config, ctx);
    let known = known_factors(config);

    let entries = names
        .iter()
        .map(|name| {
            if !is_defined(config, name, &known) {
                warn!(env = %name, "environment is not defined by the configuration");
                return PlannedEnv::Invalid {
                    name: name.clone(),
                    error: ComposeError::UndefinedSection(format!("{ENV_SECTION_PREFIX}{name}")),
                };
            }
            match composer.compose(name) {
                Ok(env) => {
                    debug!(env = %name, commands = env.commands.len(), "composed");
                    PlannedEnv::Ready(Box::new(env))
                }
                Err(error) => {
                    warn!(env = %name, error = %error, "composition failed");
                    PlannedEnv::Invalid {
                        name: name.clone(),
                        error,
                    }
                }
            }
        })
        .collect();

    ExecutionPlan { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const CONFIG: &str = "\
[tox]
envlist = copying,{py27,py36}-{lint,tests}

[testenv]
commands =
    lint: flake8
    tests: pytest
    coverage: coverage run

[testenv:copying]
commands = true

[testenv:broken]
commands = {[testenv:broken]commands}
";

    fn config(text: &str) -> ConfigFile {
        let sections = crate::core::ini::parse(Path::new("/p/tox.ini"), text).unwrap();
        ConfigFile::from_sections("/p/tox.ini", sections).unwrap()
    }

    #[test]
    fn selection_priority() {
        let cfg = config(CONFIG);
        assert_eq!(
            select_envs(&cfg, Some("py36-lint"), Some("copying")),
            vec!["py36-lint"]
        );
        assert_eq!(select_envs(&cfg, None, Some("copying")), vec!["copying"]);
        assert_eq!(select_envs(&cfg, Some(""), None), cfg.settings.envlist);
        assert_eq!(
            select_envs(&cfg, Some("py{27,36}-tests"), None),
            vec!["py27-tests", "py36-tests"]
        );
    }

    #[test]
    fn all_keyword_adds_declared_sections() {
        let cfg = config(CONFIG);
        let all = select_envs(&cfg, Some(ALL_ENVS), None);
        assert_eq!(all.first().map(String::as_str), Some("copying"));
        assert!(all.contains(&"broken".to_string()));
        assert_eq!(all.len(), cfg.settings.envlist.len() + 1);
    }

    #[test]
    fn without_envlist_declared_sections_are_used() {
        let cfg = config("[testenv:a]\ncommands = true\n[testenv:b]\ncommands = true\n");
        assert_eq!(select_envs(&cfg, None, None), vec!["a", "b"]);
    }

    #[test]
    fn plan_keeps_order_and_isolates_failures() {
        let cfg = config(CONFIG);
        let names: Vec<String> = ["py36-lint", "broken", "coverage", "py99-bogus"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let plan = plan_execution(&cfg, &names, &CompositionContext::default());

        let order: Vec<&str> = plan.entries.iter().map(PlannedEnv::name).collect();
        assert_eq!(order, vec!["py36-lint", "broken", "coverage", "py99-bogus"]);
        assert_eq!(plan.ready().count(), 2);
        assert_eq!(plan.invalid_count(), 2);

        match &plan.entries[1] {
            PlannedEnv::Invalid { error, .. } => {
                assert!(matches!(error, ComposeError::CyclicReference { .. }))
            }
            other => panic!("expected a composition failure, got {other:?}"),
        }
        match &plan.entries[3] {
            PlannedEnv::Invalid { error, .. } => assert_eq!(
                *error,
                ComposeError::UndefinedSection("testenv:py99-bogus".into())
            ),
            other => panic!("expected an undefined environment, got {other:?}"),
        }
    }

    #[test]
    fn condition_factors_define_environments() {
        let cfg = config(CONFIG);
        let known = known_factors(&cfg);
        assert!(is_defined(&cfg, "py27-coverage", &known));
        assert!(!is_defined(&cfg, "docs", &known));
    }
}
