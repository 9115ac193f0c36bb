//! # Configuration Module / 配置模块
//!
//! Loads the declarative configuration into raw sections and exposes the
//! global `[tox]` settings. Two surface syntaxes map onto the same model:
//!
//! - the INI dialect (`tox.ini`), parsed by [`crate::core::ini`];
//! - a TOML rendition using the same section names as quoted table keys,
//!   selected by a `.toml` extension:
//!
//! ```toml
//! [tox]
//! envlist = ["py{27,36}-{lint,tests}", "coverage"]
//!
//! ["testenv:lint"]
//! commands = ["python setup.py lint", "flake8"]
//! ```
//!
//! 将声明式配置加载为原始 section，并提供全局 `[tox]` 设置。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::error::{ComposeError, ConfigParseError};
use crate::core::factors;
use crate::core::ini;
use crate::core::store::FragmentStore;
use crate::infra::fs as infra_fs;

/// Name of the global settings section.
pub const GLOBAL_SECTION: &str = "tox";
/// Name of the base environment section.
pub const BASE_SECTION: &str = "testenv";
/// Prefix of per-environment override sections.
pub const ENV_SECTION_PREFIX: &str = "testenv:";
/// Default working directory name, created beside the configuration file.
pub const DEFAULT_WORKDIR: &str = ".envmatrix";

/// One section exactly as declared: key to raw (possibly multi-line) value.
/// 声明时的原始 section：键到原始（可能多行）值的映射。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub name: String,
    /// Line of the section header, 0 for sources without line information.
    pub line: usize,
    pub values: BTreeMap<String, String>,
}

impl RawSection {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
            values: BTreeMap::new(),
        }
    }
}

/// Global settings from the `[tox]` section.
/// 来自 `[tox]` section 的全局设置。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalSettings {
    /// Expanded environment names, in declaration order.
    pub envlist: Vec<String>,
    /// When true, the package under test is never installed.
    pub skipsdist: bool,
    /// Working directory for environment contexts, absolute.
    pub workdir: PathBuf,
    pub minversion: Option<String>,
}

/// A loaded configuration file.
/// 已加载的配置文件。
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Absolute path of the configuration file.
    pub path: PathBuf,
    /// Directory containing the configuration file (`{toxinidir}`).
    pub root: PathBuf,
    pub settings: GlobalSettings,
    pub store: FragmentStore,
}

impl ConfigFile {
    /// Builds a configuration from already parsed sections.
    /// Used by the loaders and by tests that construct sections in memory.
    pub fn from_sections(
        path: impl Into<PathBuf>,
        sections: Vec<RawSection>,
    ) -> Result<Self, ConfigParseError> {
        let path = path.into();
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let store = FragmentStore::new(sections);
        let settings = read_global_settings(&path, &root, &store)?;
        Ok(Self {
            path,
            root,
            settings,
            store,
        })
    }

    /// Names of all declared `[testenv:<name>]` sections, in declaration order.
    pub fn declared_envs(&self) -> Vec<String> {
        self.store
            .section_names()
            .filter_map(|name| name.strip_prefix(ENV_SECTION_PREFIX))
            .map(str::to_string)
            .collect()
    }

    /// Every environment the configuration knows about: the envlist first,
    /// then declared sections that are not already part of it.
    pub fn all_envs(&self) -> Vec<String> {
        let mut names = self.settings.envlist.clone();
        for name in self.declared_envs() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Reads the description of an environment without composing it.
    pub fn description_of(&self, env: &str) -> Option<String> {
        let own = format!("{ENV_SECTION_PREFIX}{env}");
        self.store
            .raw(&own, "description")
            .or_else(|_| self.store.raw(BASE_SECTION, "description"))
            .ok()
            .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Loads and parses a configuration file. The syntax is chosen by extension.
/// 加载并解析配置文件。语法由扩展名决定。
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let path = infra_fs::absolute_path(path)?;
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading config file at {}", path.display()))?;

    let sections = if path.extension().and_then(|e| e.to_str()) == Some("toml") {
        parse_toml(&path, &text)?
    } else {
        ini::parse(&path, &text)?
    };
    debug!(path = %path.display(), sections = sections.len(), "configuration parsed");

    Ok(ConfigFile::from_sections(path, sections)?)
}

/// Parses the TOML rendition. Every top-level table becomes a section;
/// arrays of strings become newline-joined values.
fn parse_toml(path: &Path, text: &str) -> Result<Vec<RawSection>, ConfigParseError> {
    let table: toml::Table =
        toml::from_str(text).map_err(|e| ConfigParseError::new(path, 0, e.to_string()))?;

    let mut sections = Vec::with_capacity(table.len());
    for (name, value) in table {
        let toml::Value::Table(entries) = value else {
            return Err(ConfigParseError::new(
                path,
                0,
                format!("top-level key '{name}' must be a table"),
            ));
        };
        let mut section = RawSection::new(name.clone(), 0);
        for (key, value) in entries {
            let rendered = render_toml_value(&value).ok_or_else(|| {
                ConfigParseError::new(
                    path,
                    0,
                    format!("unsupported value for '{key}' in [{name}]"),
                )
            })?;
            section.values.insert(key.to_lowercase(), rendered);
        }
        sections.push(section);
    }
    Ok(sections)
}

fn render_toml_value(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.join("\n")),
        _ => None,
    }
}

fn read_global_settings(
    path: &Path,
    root: &Path,
    store: &FragmentStore,
) -> Result<GlobalSettings, ConfigParseError> {
    if !store.has_section(GLOBAL_SECTION) {
        return Ok(GlobalSettings {
            workdir: root.join(DEFAULT_WORKDIR),
            ..GlobalSettings::default()
        });
    }

    let envlist = store
        .raw(GLOBAL_SECTION, "envlist")
        .map(factors::expand_envlist)
        .unwrap_or_default();

    let skipsdist = match store.raw(GLOBAL_SECTION, "skipsdist") {
        Ok(raw) => parse_bool(raw).map_err(|e| as_parse_error(path, e, "skipsdist"))?,
        Err(_) => false,
    };

    let workdir = match store.raw(GLOBAL_SECTION, "toxworkdir") {
        Ok(raw) => {
            let expanded = shellexpand::tilde(raw.trim()).to_string();
            let candidate = PathBuf::from(expanded);
            if candidate.is_absolute() {
                candidate
            } else {
                root.join(candidate)
            }
        }
        Err(_) => root.join(DEFAULT_WORKDIR),
    };

    let minversion = store
        .raw(GLOBAL_SECTION, "minversion")
        .ok()
        .map(|v| v.trim().to_string());

    Ok(GlobalSettings {
        envlist,
        skipsdist,
        workdir,
        minversion,
    })
}

fn as_parse_error(path: &Path, err: ComposeError, key: &str) -> ConfigParseError {
    ConfigParseError::new(path, 0, format!("[{GLOBAL_SECTION}] {key}: {err}"))
}

/// Parses a boolean the way the INI dialect spells it.
/// 按 INI 方言的写法解析布尔值。
pub fn parse_bool(raw: &str) -> Result<bool, ComposeError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" | "" => Ok(false),
        other => Err(ComposeError::InvalidValue {
            section: String::new(),
            key: String::new(),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_ini_with_global_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "tox.ini",
            "[tox]\nenvlist = copying,py{27,36}-{lint,tests}\nskipsdist = True\n\n[testenv]\ncommands = true\n",
        );

        let cfg = load_config(&path).unwrap();
        assert_eq!(
            cfg.settings.envlist,
            vec!["copying", "py27-lint", "py27-tests", "py36-lint", "py36-tests"]
        );
        assert!(cfg.settings.skipsdist);
        assert!(cfg.settings.workdir.ends_with(DEFAULT_WORKDIR));
        assert_eq!(cfg.root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn loads_toml_rendition() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "envmatrix.toml",
            r#"
[tox]
envlist = ["py36-lint"]
skipsdist = true

["testenv:lint"]
commands = ["python setup.py lint", "flake8"]
skip_install = true
"#,
        );

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.settings.envlist, vec!["py36-lint"]);
        assert_eq!(
            cfg.store.raw("testenv:lint", "commands").unwrap(),
            "python setup.py lint\nflake8"
        );
        assert_eq!(cfg.store.raw("testenv:lint", "skip_install").unwrap(), "true");
        assert_eq!(cfg.declared_envs(), vec!["lint"]);
    }

    #[test]
    fn toml_rejects_nested_tables_as_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.toml", "[testenv]\ndeps = { a = 1 }\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported value") || format!("{err:#}").contains("unsupported value"));
    }

    #[test]
    fn invalid_skipsdist_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "tox.ini", "[tox]\nskipsdist = maybe\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn all_envs_appends_undeclared_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "tox.ini",
            "[tox]\nenvlist = lint\n[testenv:lint]\ndescription = run\n  linters\n[testenv:coverage]\ncommands = true\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.all_envs(), vec!["lint", "coverage"]);
        assert_eq!(cfg.description_of("lint").as_deref(), Some("run linters"));
        assert_eq!(cfg.description_of("coverage"), None);
    }

    #[test]
    fn parse_bool_accepts_ini_spellings() {
        for raw in ["True", "yes", "1", "ON"] {
            assert!(parse_bool(raw).unwrap());
        }
        for raw in ["False", "no", "0", "off"] {
            assert!(!parse_bool(raw).unwrap());
        }
        assert!(parse_bool("perhaps").is_err());
    }
}
