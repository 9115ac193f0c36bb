//! # Init Command Module / 初始化命令模块
//!
//! Writes a starter `tox.ini`, either from defaults (`--non-interactive`)
//! or through a short `dialoguer` wizard asking for interpreters, roles and
//! whether the package under test is installed.
//!
//! 写出初始的 `tox.ini`：使用默认值（`--non-interactive`），
//! 或通过简短的 `dialoguer` 向导询问解释器、角色以及是否安装被测包。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, MultiSelect};
use std::fmt::Write;
use std::{fs, path::Path};

use crate::infra::t;

const INTERPRETERS: &[&str] = &["py38", "py39", "py310", "py311", "py312"];
const ROLES: &[&str] = &["lint", "tests", "coverage"];

/// Answers collected by the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarterOptions {
    pub interpreters: Vec<String>,
    pub roles: Vec<String>,
    pub skipsdist: bool,
}

impl Default for StarterOptions {
    fn default() -> Self {
        Self {
            interpreters: vec!["py311".into(), "py312".into()],
            roles: vec!["lint".into(), "tests".into()],
            skipsdist: false,
        }
    }
}

/// Renders the starter configuration.
pub fn render_starter(opts: &StarterOptions) -> String {
    let mut out = String::new();
    let envlist = match (opts.interpreters.len(), opts.roles.len()) {
        (_, 0) => opts.interpreters.join(","),
        (0, _) => opts.roles.join(","),
        _ => format!(
            "{{{}}}-{{{}}}",
            opts.interpreters.join(","),
            opts.roles.join(",")
        ),
    };

    let _ = writeln!(out, "[tox]");
    let _ = writeln!(out, "envlist = {envlist}");
    if opts.skipsdist {
        let _ = writeln!(out, "skipsdist = true");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[testenv]");
    let _ = writeln!(out, "passenv = CI");
    let _ = writeln!(out, "deps =");
    for role in &opts.roles {
        if let Some(dep) = role_dependency(role) {
            let _ = writeln!(out, "    {role}: {dep}");
        }
    }
    let _ = writeln!(out, "commands =");
    for role in &opts.roles {
        let _ = writeln!(out, "    {role}: {{[testenv:{role}]commands}}");
    }
    for role in &opts.roles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[testenv:{role}]");
        let _ = writeln!(out, "description = {}", role_description(role));
        let _ = writeln!(out, "commands = {}", role_command(role));
    }
    out
}

fn role_dependency(role: &str) -> Option<&'static str> {
    match role {
        "lint" => Some("flake8"),
        "tests" => Some("pytest"),
        "coverage" => Some("pytest-cov"),
        _ => None,
    }
}

fn role_description(role: &str) -> &'static str {
    match role {
        "lint" => "run static checks",
        "tests" => "run the test suite",
        "coverage" => "measure test coverage",
        _ => "",
    }
}

fn role_command(role: &str) -> &'static str {
    match role {
        "lint" => "flake8 {posargs}",
        "tests" => "pytest {posargs}",
        "coverage" => "pytest --cov {posargs}",
        _ => "true",
    }
}

/// Executes the init command.
///
/// # Arguments
/// * `path` - Where to write the configuration
/// * `non_interactive` - Use defaults without prompting
/// * `force` - Overwrite an existing file without asking
pub fn execute(path: &Path, non_interactive: bool, force: bool, locale: &str) -> Result<()> {
    let theme = ColorfulTheme::default();

    if path.exists() && !force {
        if non_interactive {
            println!("{}", t!("init.file_exists", locale = locale, path = path.display()).red());
            println!("{}", t!("init.use_force", locale = locale).yellow());
            return Ok(());
        }
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = locale, path = path.display()))
            .default(false)
            .interact()
            .context(t!("init.confirmation_failed", locale = locale).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = locale));
            return Ok(());
        }
    }

    let opts = if non_interactive {
        StarterOptions::default()
    } else {
        println!("\n{}", t!("init.wizard_welcome", locale = locale).cyan().bold());
        ask(&theme, locale)?
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", locale = locale, path = parent.display()).to_string()
        })?;
    }
    fs::write(path, render_starter(&opts))
        .with_context(|| t!("init.write_failed", locale = locale, path = path.display()).to_string())?;

    println!("{}", t!("init.success", locale = locale, path = path.display()).green());
    println!("{}", t!("init.next_steps", locale = locale));
    Ok(())
}

fn ask(theme: &ColorfulTheme, locale: &str) -> Result<StarterOptions> {
    let defaults = StarterOptions::default();

    let picked = MultiSelect::with_theme(theme)
        .with_prompt(t!("init.interpreters_prompt", locale = locale))
        .items(INTERPRETERS)
        .defaults(
            &INTERPRETERS
                .iter()
                .map(|i| defaults.interpreters.iter().any(|d| d == i))
                .collect::<Vec<_>>(),
        )
        .interact()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;
    let interpreters = picked.into_iter().map(|i| INTERPRETERS[i].to_string()).collect();

    let picked = MultiSelect::with_theme(theme)
        .with_prompt(t!("init.roles_prompt", locale = locale))
        .items(ROLES)
        .defaults(
            &ROLES
                .iter()
                .map(|r| defaults.roles.iter().any(|d| d == r))
                .collect::<Vec<_>>(),
        )
        .interact()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;
    let roles: Vec<String> = picked.into_iter().map(|i| ROLES[i].to_string()).collect();
    if roles.is_empty() {
        println!("{}", t!("init.no_roles_selected", locale = locale).yellow());
    }

    let skipsdist = Confirm::with_theme(theme)
        .with_prompt(t!("init.skipsdist_prompt", locale = locale))
        .default(false)
        .interact()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;

    Ok(StarterOptions {
        interpreters,
        roles,
        skipsdist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::composer::{Composer, CompositionContext};
    use crate::core::config::ConfigFile;

    #[test]
    fn starter_config_composes() {
        let text = render_starter(&StarterOptions::default());
        let sections = crate::core::ini::parse(Path::new("/p/tox.ini"), &text).unwrap();
        let cfg = ConfigFile::from_sections("/p/tox.ini", sections).unwrap();

        assert_eq!(
            cfg.settings.envlist,
            vec!["py311-lint", "py311-tests", "py312-lint", "py312-tests"]
        );
        let ctx = CompositionContext::default();
        let env = Composer::new(&cfg, &ctx).compose("py312-lint").unwrap();
        assert_eq!(env.deps, vec!["flake8"]);
        assert_eq!(env.commands[0].argv, vec!["flake8"]);
    }

    #[test]
    fn non_interactive_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tox.ini");
        fs::write(&path, "keep me").unwrap();

        execute(&path, true, false, "en").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");

        execute(&path, true, true, "en").unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("[tox]"));
    }
}
