//! # List Command / 列表命令
//!
//! Prints every configured environment with its description: the envlist
//! first, then additional `[testenv:<name>]` sections.

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use crate::core::config::{self, ConfigFile};
use crate::infra::t;

/// Lines to print, `(name, description)` grouped as default and additional.
pub fn listing(config: &ConfigFile) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let describe = |name: &String| {
        (
            name.clone(),
            config.description_of(name).unwrap_or_default(),
        )
    };
    let defaults = config.settings.envlist.iter().map(describe).collect();
    let additional = config
        .declared_envs()
        .iter()
        .filter(|name| !config.settings.envlist.contains(name))
        .map(describe)
        .collect();
    (defaults, additional)
}

pub fn execute(config_path: &Path, locale: &str) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| t!("run.config_load_failed", locale = locale, path = config_path.display()))?;
    let (defaults, additional) = listing(&config);

    let width = defaults
        .iter()
        .chain(additional.iter())
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);

    println!("{}", t!("list.default_envs", locale = locale).bold());
    for (name, description) in &defaults {
        println!("{} -> {}", format!("{name:<width$}").cyan(), description);
    }
    if !additional.is_empty() {
        println!("\n{}", t!("list.additional_envs", locale = locale).bold());
        for (name, description) in &additional {
            println!("{} -> {}", format!("{name:<width$}").cyan(), description);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_then_extra_sections() {
        let sections = crate::core::ini::parse(
            Path::new("/p/tox.ini"),
            "[tox]\nenvlist = lint,py36-tests\n[testenv:lint]\ndescription = static checks\n[testenv:docs]\ndescription = build docs\n",
        )
        .unwrap();
        let cfg = ConfigFile::from_sections("/p/tox.ini", sections).unwrap();

        let (defaults, additional) = listing(&cfg);
        assert_eq!(
            defaults,
            vec![
                ("lint".to_string(), "static checks".to_string()),
                ("py36-tests".to_string(), String::new()),
            ]
        );
        assert_eq!(additional, vec![("docs".to_string(), "build docs".to_string())]);
    }
}
