//! # Environment Composer / 环境组合器
//!
//! Turns an environment name into a concrete [`Environment`] by merging the
//! base `[testenv]` section with the environment's own `[testenv:<name>]`
//! section and resolving every list entry:
//!
//! - `<condition>: <literal>` is kept only when the condition matches the
//!   environment's factors, otherwise silently dropped;
//! - `{[testenv:<name>]<attribute>}` is replaced by the fully resolved list of
//!   that section's attribute, inlined at the point of reference;
//! - scalar placeholders (`{envname}`, `{posargs}`, `{env:KEY}`, ...) are
//!   substituted inside kept entries.
//!
//! References are walked as a graph with an explicit resolution stack, so a
//! chain that revisits a `(section, attribute)` pair fails with
//! [`ComposeError::CyclicReference`] instead of recursing forever.
//!
//! 通过合并基础 `[testenv]` 与环境自身的 `[testenv:<name>]` section，
//! 并解析每个列表条目，将环境名称转换为具体的 [`Environment`]。

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::config::{parse_bool, ConfigFile, BASE_SECTION, ENV_SECTION_PREFIX};
use crate::core::error::ComposeError;
use crate::core::factors::{factors_of, split_condition};
use crate::core::models::{CommandLine, Environment};

const DEFAULT_CREATE_COMMAND: &str = "{basepython} -m venv {envdir}";
const DEFAULT_INSTALL_COMMAND: &str = "{envbindir}{/}python -m pip install {opts} {packages}";

/// Inputs to composition that do not come from the configuration file.
/// 组合所需但不来自配置文件的输入。
#[derive(Debug, Clone, Default)]
pub struct CompositionContext {
    /// Positional arguments substituted for `{posargs}`.
    pub posargs: Vec<String>,
    /// Snapshot of the invoking process environment for `{env:KEY}`.
    pub environ: BTreeMap<String, String>,
}

impl CompositionContext {
    pub fn from_process(posargs: Vec<String>) -> Self {
        Self {
            posargs,
            environ: std::env::vars().collect(),
        }
    }
}

/// The environment being composed, as seen by substitutions.
struct Scope<'n> {
    name: &'n str,
    factors: BTreeSet<String>,
    envdir: PathBuf,
    basepython: String,
}

type Stack = Vec<(String, String)>;

/// Composes environments from a loaded configuration.
/// 根据已加载的配置组合环境。
pub struct Composer<'a> {
    config: &'a ConfigFile,
    ctx: &'a CompositionContext,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a ConfigFile, ctx: &'a CompositionContext) -> Self {
        Self { config, ctx }
    }

    /// Resolves one environment. Deterministic for a given store and context.
    /// 解析单个环境。对相同的存储和上下文结果确定。
    pub fn compose(&self, name: &str) -> Result<Environment, ComposeError> {
        let own = format!("{ENV_SECTION_PREFIX}{name}");
        let section = if self.config.store.has_section(&own) {
            own
        } else {
            BASE_SECTION.to_string()
        };

        let factors = factors_of(name);
        let mut scope = Scope {
            name,
            basepython: default_basepython(&factors),
            factors,
            envdir: self.config.settings.workdir.join(name),
        };
        if let Some(basepython) = self.scalar(&scope, &section, "basepython")? {
            scope.basepython = basepython;
        }
        debug!(env = name, section = %section, "composing environment");

        let deps = self.list(&scope, &section, "deps")?;
        warn_on_conflicting_deps(name, &deps);

        let commands_pre = self.commands(&scope, &section, "commands_pre")?;
        let commands = self.commands(&scope, &section, "commands")?;
        let commands_post = self.commands(&scope, &section, "commands_post")?;

        let mut whitelist_externals = self.words(&scope, &section, "whitelist_externals")?;
        whitelist_externals.extend(self.words(&scope, &section, "allowlist_externals")?);

        let passenv = self
            .list(&scope, &section, "passenv")?
            .iter()
            .flat_map(|entry| entry.split(|c: char| c.is_whitespace() || c == ','))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let setenv = self.setenv(&scope, &section)?;

        let changedir = match self.scalar(&scope, &section, "changedir")? {
            Some(dir) => absolutize(&self.config.root, &dir),
            None => self.config.root.clone(),
        };

        let create_command = match self.scalar(&scope, &section, "create_command")? {
            Some(raw) => self.argv(&section, "create_command", &raw)?,
            None => {
                let raw = self.expand_inline(&scope, DEFAULT_CREATE_COMMAND, &mut Vec::new())?;
                self.argv(&section, "create_command", &raw)?
            }
        };
        let install_command = match self.scalar(&scope, &section, "install_command")? {
            Some(raw) => self.argv(&section, "install_command", &raw)?,
            None => {
                let raw = self.expand_inline(&scope, DEFAULT_INSTALL_COMMAND, &mut Vec::new())?;
                self.argv(&section, "install_command", &raw)?
            }
        };
        if !install_command.iter().any(|arg| arg == "{packages}") {
            return Err(ComposeError::InvalidValue {
                section,
                key: "install_command".into(),
                message: "must contain the {packages} placeholder".into(),
            });
        }

        let description = self
            .scalar(&scope, &section, "description")?
            .filter(|d| !d.is_empty());
        let skip_install = self.flag(&scope, &section, "skip_install")?;
        let usedevelop = self.flag(&scope, &section, "usedevelop")?;
        let ignore_errors = self.flag(&scope, &section, "ignore_errors")?;
        let ignore_outcome = self.flag(&scope, &section, "ignore_outcome")?;

        Ok(Environment {
            name: name.to_string(),
            description,
            factors: scope.factors,
            envdir: scope.envdir,
            deps,
            commands_pre,
            commands,
            commands_post,
            whitelist_externals,
            passenv,
            setenv,
            changedir,
            create_command,
            install_command,
            skip_install,
            usedevelop,
            ignore_errors,
            ignore_outcome,
            section,
        })
    }

    /// Picks the section declaring `attribute`: the own section, else the base.
    fn source_of<'s>(&self, section: &'s str, attribute: &str) -> Option<&'s str> {
        let store = &self.config.store;
        if store.has_attribute(section, attribute) {
            Some(section)
        } else if store.has_attribute(BASE_SECTION, attribute) {
            Some(BASE_SECTION)
        } else {
            None
        }
    }

    /// Top-level resolution of a list attribute; absent attributes are empty.
    fn list(&self, scope: &Scope, section: &str, attribute: &str) -> Result<Vec<String>, ComposeError> {
        match self.source_of(section, attribute) {
            Some(source) => self.resolve_list(scope, source, attribute, &mut Vec::new()),
            None => Ok(Vec::new()),
        }
    }

    fn words(&self, scope: &Scope, section: &str, attribute: &str) -> Result<Vec<String>, ComposeError> {
        Ok(self
            .list(scope, section, attribute)?
            .iter()
            .flat_map(|entry| entry.split_whitespace())
            .map(str::to_string)
            .collect())
    }

    /// A single-valued attribute: its resolved entries joined by spaces.
    fn scalar(&self, scope: &Scope, section: &str, attribute: &str) -> Result<Option<String>, ComposeError> {
        if self.source_of(section, attribute).is_none() {
            return Ok(None);
        }
        Ok(Some(self.list(scope, section, attribute)?.join(" ")))
    }

    fn flag(&self, scope: &Scope, section: &str, attribute: &str) -> Result<bool, ComposeError> {
        match self.scalar(scope, section, attribute)? {
            Some(raw) => parse_bool(&raw).map_err(|err| match err {
                ComposeError::InvalidValue { message, .. } => ComposeError::InvalidValue {
                    section: section.to_string(),
                    key: attribute.to_string(),
                    message,
                },
                other => other,
            }),
            None => Ok(false),
        }
    }

    fn commands(&self, scope: &Scope, section: &str, attribute: &str) -> Result<Vec<CommandLine>, ComposeError> {
        let mut lines = Vec::new();
        for entry in self.list(scope, section, attribute)? {
            let (ignore_exit, body) = match entry.strip_prefix('-') {
                Some(rest) if rest.starts_with(char::is_whitespace) || !rest.starts_with('-') => {
                    (true, rest.trim_start())
                }
                _ => (false, entry.as_str()),
            };
            let argv = self.argv(section, attribute, body)?;
            if argv.is_empty() {
                continue;
            }
            lines.push(CommandLine {
                display: body.to_string(),
                argv,
                ignore_exit,
            });
        }
        Ok(lines)
    }

    fn argv(&self, section: &str, key: &str, raw: &str) -> Result<Vec<String>, ComposeError> {
        shlex::split(raw).ok_or_else(|| ComposeError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            message: format!("cannot split `{raw}` into arguments"),
        })
    }

    fn setenv(&self, scope: &Scope, section: &str) -> Result<BTreeMap<String, String>, ComposeError> {
        let mut vars = BTreeMap::new();
        for entry in self.list(scope, section, "setenv")? {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(ComposeError::InvalidValue {
                    section: section.to_string(),
                    key: "setenv".into(),
                    message: format!("expected KEY=VALUE, found '{entry}'"),
                });
            };
            vars.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(vars)
    }

    /// Resolves `section.attribute` with the factors of `scope`, inlining
    /// references recursively. `stack` holds the pairs currently being resolved.
    ///
    /// 使用 `scope` 的因子解析 `section.attribute`，递归内联引用。
    fn resolve_list(
        &self,
        scope: &Scope,
        section: &str,
        attribute: &str,
        stack: &mut Stack,
    ) -> Result<Vec<String>, ComposeError> {
        let key = (section.to_string(), attribute.to_string());
        if stack.contains(&key) {
            let mut chain: Vec<String> = stack.iter().map(|(s, a)| format!("[{s}]{a}")).collect();
            chain.push(format!("[{section}]{attribute}"));
            return Err(ComposeError::CyclicReference { chain });
        }

        let entries = self.config.store.get(section, attribute)?;
        stack.push(key);

        let mut resolved = Vec::with_capacity(entries.len());
        for entry in &entries {
            let body = match split_condition(entry) {
                Some((condition, rest)) if condition.matches(&scope.factors) => rest,
                Some(_) => continue,
                None => entry.as_str(),
            };

            if let Some((ref_section, ref_attribute)) = parse_reference(body) {
                let inlined = self.resolve_list(scope, ref_section, ref_attribute, stack)?;
                resolved.extend(inlined);
            } else {
                resolved.push(self.expand_inline(scope, body, stack)?);
            }
        }

        stack.pop();
        Ok(resolved)
    }

    /// Substitutes `{...}` placeholders inside one entry. Unknown placeholders
    /// are kept literally; `\{` and `\}` escape braces.
    fn expand_inline(&self, scope: &Scope, text: &str, stack: &mut Stack) -> Result<String, ComposeError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(pos) = rest.find(['{', '\\']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if let Some(escaped) = tail.strip_prefix('\\') {
                match escaped.chars().next() {
                    Some(c @ ('{' | '}')) => {
                        out.push(c);
                        rest = &escaped[1..];
                    }
                    _ => {
                        out.push('\\');
                        rest = escaped;
                    }
                }
                continue;
            }

            let Some(len) = matching_brace(tail) else {
                out.push_str(tail);
                rest = "";
                break;
            };
            let token = &tail[1..len];
            out.push_str(&self.substitute(scope, token, stack)?);
            rest = &tail[len + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn substitute(&self, scope: &Scope, token: &str, stack: &mut Stack) -> Result<String, ComposeError> {
        if let Some((section, attribute)) = parse_reference(&format!("{{{token}}}")) {
            return Ok(self.resolve_list(scope, section, attribute, stack)?.join(" "));
        }

        let (head, default) = match token.split_once(':') {
            Some((head, default)) => (head, Some(default)),
            None => (token, None),
        };

        let value = match (head, default) {
            ("posargs", default) => {
                if self.ctx.posargs.is_empty() {
                    default.unwrap_or_default().to_string()
                } else {
                    shlex::try_join(self.ctx.posargs.iter().map(String::as_str))
                        .unwrap_or_else(|_| self.ctx.posargs.join(" "))
                }
            }
            ("env", Some(spec)) => {
                let (var, fallback) = spec.split_once(':').unwrap_or((spec, ""));
                self.ctx
                    .environ
                    .get(var)
                    .cloned()
                    .unwrap_or_else(|| fallback.to_string())
            }
            ("envname", None) => scope.name.to_string(),
            ("envdir", None) => display_path(&scope.envdir),
            ("envbindir", None) => display_path(&scope.envdir.join("bin")),
            ("envtmpdir", None) => display_path(&scope.envdir.join("tmp")),
            ("toxinidir", None) => display_path(&self.config.root),
            ("toxworkdir", None) => display_path(&self.config.settings.workdir),
            ("basepython", None) => scope.basepython.clone(),
            ("/", None) => std::path::MAIN_SEPARATOR.to_string(),
            ("", Some("")) => if cfg!(windows) { ";" } else { ":" }.to_string(),
            _ => format!("{{{token}}}"),
        };
        Ok(value)
    }
}

/// Recognizes a whole-entry reference `{[section]attribute}`.
/// 识别完整条目形式的引用 `{[section]attribute}`。
pub fn parse_reference(entry: &str) -> Option<(&str, &str)> {
    let inner = entry.trim().strip_prefix("{[")?.strip_suffix('}')?;
    let (section, attribute) = inner.split_once(']')?;
    let section = section.trim();
    let valid_attribute =
        !attribute.is_empty() && attribute.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if section.is_empty() || section.contains(['{', '}', '[']) || !valid_attribute {
        return None;
    }
    Some((section, attribute))
}

/// Length up to the brace closing the one at index 0.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// `py27` -> `python2.7`, `py3` -> `python3`, `py310` -> `python3.10`.
fn default_basepython(factors: &BTreeSet<String>) -> String {
    for factor in factors {
        if let Some(digits) = factor.strip_prefix("py") {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                let (major, minor) = digits.split_at(1);
                return if minor.is_empty() {
                    format!("python{major}")
                } else {
                    format!("python{major}.{minor}")
                };
            }
        }
        if factor.starts_with("pypy") {
            return factor.clone();
        }
    }
    "python3".to_string()
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn absolutize(root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}

fn package_name(spec: &str) -> Option<String> {
    if spec.starts_with('-') || spec.contains("://") {
        return None;
    }
    let name: String = spec
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    (!name.is_empty()).then(|| name.to_lowercase().replace('_', "-"))
}

/// Conflicting specifiers for one package are passed through in declaration
/// order; which one wins is left to the installer.
fn warn_on_conflicting_deps(env: &str, deps: &[String]) {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for dep in deps {
        let Some(name) = package_name(dep) else { continue };
        match seen.get(&name) {
            Some(first) if *first != dep.as_str() => {
                warn!(env = %env, package = %name, first = %first, second = %dep, "conflicting dependency specifiers");
            }
            Some(_) => {}
            None => {
                seen.insert(name, dep);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RawSection;

    const IOTLAB_STYLE: &str = r#"
[tox]
envlist = copying,{py27,py36}-{lint,tests,cli},checksetup
skipsdist = true

[testenv]
whitelist_externals =
    tests:   {[testenv:tests]whitelist_externals}
    cli:     {[testenv:cli]whitelist_externals}
deps =
    -rtests_utils/test-requirements.txt
    checksetup: {[testenv:checksetup]deps}
passenv =
    integration: {[testenv:integration]passenv}
commands =
    tests:      {[testenv:tests]commands}
    lint:       {[testenv:lint]commands}
    cli:        {[testenv:cli]commands}
    checksetup: {[testenv:checksetup]commands}

[testenv:tests]
whitelist_externals = /bin/bash
commands = bash -exc "python setup.py tests {posargs}"

[testenv:lint]
commands = python setup.py lint
           flake8

[testenv:cli]
whitelist_externals = /bin/bash
commands = bash -exc "for i in *-cli; do $i --help >/dev/null; done"

[testenv:checksetup]
skip_install = True
deps = readme_renderer
commands = python setup.py check --strict --metadata --restructuredtext

[testenv:integration]
passenv = IOTLAB_TEST_*
    HOME
commands = python setup.py integration

[testenv:copying]
whitelist_externals = /bin/bash
skip_install = True
commands = bash -c 'grep -L "Copyright" iotlabcli/*.py | grep . && exit 1 || exit 0'
"#;

    fn config(text: &str) -> ConfigFile {
        let sections = crate::core::ini::parse(Path::new("/project/tox.ini"), text).unwrap();
        ConfigFile::from_sections("/project/tox.ini", sections).unwrap()
    }

    fn compose(cfg: &ConfigFile, name: &str) -> Result<Environment, ComposeError> {
        let ctx = CompositionContext::default();
        Composer::new(cfg, &ctx).compose(name)
    }

    fn displays(lines: &[CommandLine]) -> Vec<&str> {
        lines.iter().map(|c| c.display.as_str()).collect()
    }

    #[test]
    fn py36_lint_gets_exactly_the_lint_commands() {
        let cfg = config(IOTLAB_STYLE);
        let env = compose(&cfg, "py36-lint").unwrap();

        assert_eq!(displays(&env.commands), vec!["python setup.py lint", "flake8"]);
        assert_eq!(env.section, "testenv");
        assert_eq!(env.deps, vec!["-rtests_utils/test-requirements.txt"]);
        assert!(env.whitelist_externals.is_empty());
        assert!(env.passenv.is_empty());
    }

    #[test]
    fn factor_filters_pick_the_matching_fragments() {
        let cfg = config(IOTLAB_STYLE);
        let env = compose(&cfg, "py27-tests").unwrap();
        assert_eq!(
            displays(&env.commands),
            vec!["bash -exc \"python setup.py tests \""]
        );
        assert_eq!(env.whitelist_externals, vec!["/bin/bash"]);
        assert_eq!(env.create_command[0], "python2.7");
    }

    #[test]
    fn own_section_overrides_base_and_falls_back_per_key() {
        let cfg = config(IOTLAB_STYLE);
        let env = compose(&cfg, "checksetup").unwrap();
        assert_eq!(env.section, "testenv:checksetup");
        assert_eq!(env.deps, vec!["readme_renderer"]);
        assert!(env.skip_install);
        // whitelist_externals falls back to the base, whose entries are all filtered out
        assert!(env.whitelist_externals.is_empty());
    }

    #[test]
    fn passenv_splits_words() {
        let cfg = config(IOTLAB_STYLE);
        let env = compose(&cfg, "integration").unwrap();
        assert_eq!(env.passenv, vec!["IOTLAB_TEST_*", "HOME"]);
    }

    #[test]
    fn composition_is_deterministic() {
        let cfg = config(IOTLAB_STYLE);
        for name in cfg.all_envs() {
            assert_eq!(compose(&cfg, &name), compose(&cfg, &name), "{name}");
        }
    }

    #[test]
    fn every_envlist_entry_composes() {
        let cfg = config(IOTLAB_STYLE);
        for name in &cfg.settings.envlist {
            assert!(compose(&cfg, name).is_ok(), "{name}");
        }
    }

    #[test]
    fn reference_order_is_preserved_and_inlined_contiguously() {
        let cfg = config(
            "[testenv]\ncommands = echo first\n    {[testenv:a]commands}\n    echo last\n[testenv:a]\ncommands = echo a1\n    echo a2\n",
        );
        let env = compose(&cfg, "py36").unwrap();
        assert_eq!(
            displays(&env.commands),
            vec!["echo first", "echo a1", "echo a2", "echo last"]
        );
    }

    #[test]
    fn self_reference_is_cyclic() {
        let cfg = config("[testenv:a]\ncommands = {[testenv:a]commands}\n");
        let err = compose(&cfg, "a").unwrap_err();
        assert!(matches!(err, ComposeError::CyclicReference { .. }));
    }

    #[test]
    fn transitive_cycle_is_reported_with_its_chain() {
        let cfg = config(
            "[testenv:a]\ncommands = {[testenv:b]commands}\n[testenv:b]\ncommands = echo b\n    {[testenv:c]commands}\n[testenv:c]\ncommands = {[testenv:a]commands}\n",
        );
        match compose(&cfg, "a").unwrap_err() {
            ComposeError::CyclicReference { chain } => assert_eq!(
                chain,
                vec![
                    "[testenv:a]commands",
                    "[testenv:b]commands",
                    "[testenv:c]commands",
                    "[testenv:a]commands"
                ]
            ),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn filtered_out_reference_is_never_resolved() {
        let cfg = config("[testenv]\ncommands = missing: {[testenv:nowhere]commands}\n    echo ok\n");
        let env = compose(&cfg, "lint").unwrap();
        assert_eq!(displays(&env.commands), vec!["echo ok"]);
    }

    #[test]
    fn undefined_section_and_attribute_surface() {
        let cfg = config("[testenv]\ncommands = {[testenv:nowhere]commands}\n[testenv:b]\ndeps = x\n");
        assert_eq!(
            compose(&cfg, "py36").unwrap_err(),
            ComposeError::UndefinedSection("testenv:nowhere".into())
        );

        let cfg = config("[testenv]\ncommands = {[testenv:b]commands}\n[testenv:b]\ndeps = x\n");
        assert!(matches!(
            compose(&cfg, "py36").unwrap_err(),
            ComposeError::UndefinedAttribute { .. }
        ));
    }

    #[test]
    fn scalar_placeholders_are_substituted() {
        let cfg = config(
            "[testenv]\nsetenv = OUT = {envtmpdir}{/}out\ncommands = echo {envname} {toxinidir} {env:ENVMATRIX_TEST_UNSET:fallback} {unknown}\n    -false\n",
        );
        let ctx = CompositionContext {
            posargs: vec![],
            environ: BTreeMap::new(),
        };
        let env = Composer::new(&cfg, &ctx).compose("py36-tests").unwrap();

        assert_eq!(
            env.commands[0].argv,
            vec!["echo", "py36-tests", "/project", "fallback", "{unknown}"]
        );
        assert!(env.commands[1].ignore_exit);
        assert_eq!(env.commands[1].argv, vec!["false"]);
        assert!(env.setenv["OUT"].ends_with("py36-tests/tmp/out"));
    }

    #[test]
    fn posargs_use_default_or_given_arguments() {
        let cfg = config("[testenv]\ncommands = pytest {posargs:tests}\n");

        let env = compose(&cfg, "py36").unwrap();
        assert_eq!(env.commands[0].argv, vec!["pytest", "tests"]);

        let ctx = CompositionContext {
            posargs: vec!["-k".into(), "slow and fast".into()],
            environ: BTreeMap::new(),
        };
        let env = Composer::new(&cfg, &ctx).compose("py36").unwrap();
        assert_eq!(env.commands[0].argv, vec!["pytest", "-k", "slow and fast"]);
    }

    #[test]
    fn booleans_are_validated() {
        let cfg = config("[testenv]\nskip_install = sometimes\n");
        assert!(matches!(
            compose(&cfg, "py36").unwrap_err(),
            ComposeError::InvalidValue { ref key, .. } if key == "skip_install"
        ));
    }

    #[test]
    fn install_command_requires_packages_placeholder() {
        let cfg = config("[testenv]\ninstall_command = pip install\n");
        assert!(compose(&cfg, "py36").is_err());

        let cfg = config("[testenv]\ninstall_command = pip install {opts} {packages}\n");
        let env = compose(&cfg, "py36").unwrap();
        assert_eq!(env.install_command, vec!["pip", "install", "{opts}", "{packages}"]);
    }

    #[test]
    fn default_context_commands_follow_the_interpreter_factor() {
        let cfg = config("[testenv]\ncommands = true\n");
        let env = compose(&cfg, "py36-lint").unwrap();
        assert_eq!(env.create_command[0], "python3.6");
        assert!(env.install_command[0].ends_with("py36-lint/bin/python"));
    }

    #[test]
    fn empty_create_command_disables_creation() {
        let cfg = config("[testenv]\ncreate_command =\ncommands = true\n");
        assert!(compose(&cfg, "lint").unwrap().create_command.is_empty());
    }

    #[test]
    fn conditional_deps_are_filtered() {
        let cfg = config("[testenv]\ndeps = pytest\n    py27: mock\n    !py27: pytest-asyncio\n");
        assert_eq!(compose(&cfg, "py27").unwrap().deps, vec!["pytest", "mock"]);
        assert_eq!(
            compose(&cfg, "py36").unwrap().deps,
            vec!["pytest", "pytest-asyncio"]
        );
    }

    #[test]
    fn parse_reference_only_accepts_whole_entries() {
        assert_eq!(
            parse_reference("{[testenv:lint]commands}"),
            Some(("testenv:lint", "commands"))
        );
        assert_eq!(parse_reference("{[testenv]deps}"), Some(("testenv", "deps")));
        assert_eq!(parse_reference("echo {[testenv]deps}"), None);
        assert_eq!(parse_reference("{[testenv]}"), None);
    }

    #[test]
    fn package_names_are_normalized() {
        assert_eq!(package_name("Flake8>=3").as_deref(), Some("flake8"));
        assert_eq!(package_name("readme_renderer").as_deref(), Some("readme-renderer"));
        assert_eq!(package_name("-rreq.txt"), None);
    }

    #[test]
    fn sections_built_in_memory_compose_too() {
        let mut base = RawSection::new("testenv", 0);
        base.values.insert("commands".into(), "echo hi".into());
        let cfg = ConfigFile::from_sections("/tmp/x/tox.ini", vec![base]).unwrap();
        let env = compose(&cfg, "anything").unwrap();
        assert_eq!(env.commands[0].argv, vec!["echo", "hi"]);
    }
}
