//! # Sandbox Module / 沙箱模块
//!
//! Builds the process environment a command runs with and decides whether
//! its executable may run at all.
//!
//! - Variables: everything is cleared, then `passenv` matches (globs allowed)
//!   and a small always-forwarded set are copied from the invoking process,
//!   `PATH` is prefixed with the context's `bin/`, and `setenv` is applied last.
//! - Executables: a program resolving inside the context's `bin/` always runs;
//!   anything else must match `whitelist_externals` by name, path or glob.
//!   Literal paths are compared after resolving symlinks, so `/bin/bash`
//!   also admits `/usr/bin/bash` where `/bin` links to `/usr/bin`.
//!
//! 构建命令运行时的进程环境，并决定其可执行文件是否允许运行。

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::core::models::Environment;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Variables forwarded regardless of `passenv`.
const ALWAYS_FORWARDED: &[&str] = &[
    "HOME",
    "LANG",
    "LANGUAGE",
    "LC_*",
    "LD_LIBRARY_PATH",
    "TERM",
    "TMPDIR",
    "NO_COLOR",
    "FORCE_COLOR",
    "PIP_*",
    "REQUESTS_CA_BUNDLE",
    "SSL_CERT_FILE",
    "http_proxy",
    "https_proxy",
    "no_proxy",
];

static ALWAYS_FORWARDED_SET: Lazy<GlobSet> = Lazy::new(|| build_globset(ALWAYS_FORWARDED));

fn build_globset<S: AsRef<str>>(patterns: &[S]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern.as_ref()) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warn!(pattern = pattern.as_ref(), error = %err, "ignoring invalid pattern"),
        }
    }
    builder.build().unwrap_or_else(|err| {
        warn!(error = %err, "pattern set could not be built; nothing will match");
        GlobSet::empty()
    })
}

/// Computes the complete variable set for a command of `env`.
///
/// `parent` is the invoking process environment; passing it in keeps the
/// function pure and testable.
///
/// 计算 `env` 中命令的完整变量集合。
pub fn command_environment<I>(env: &Environment, parent: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let passenv = build_globset(&env.passenv);
    let mut vars = BTreeMap::new();
    let mut parent_path: Option<String> = None;

    for (key, value) in parent {
        if key == "PATH" {
            parent_path = Some(value);
            continue;
        }
        if ALWAYS_FORWARDED_SET.is_match(&key) || passenv.is_match(&key) {
            vars.insert(key, value);
        }
    }

    let mut paths: Vec<PathBuf> = vec![env.bin_dir()];
    if let Some(parent_path) = &parent_path {
        paths.extend(std::env::split_paths(parent_path));
    }
    let joined = std::env::join_paths(paths)
        .unwrap_or_else(|_| OsString::from(env.bin_dir().as_os_str()));
    vars.insert("PATH".into(), joined.to_string_lossy().into_owned());

    let envdir = env.envdir.to_string_lossy().into_owned();
    vars.insert("VIRTUAL_ENV".into(), envdir.clone());
    vars.insert("ENVMATRIX_ENV_NAME".into(), env.name.clone());
    vars.insert("ENVMATRIX_ENV_DIR".into(), envdir);
    vars.insert(
        "TMPDIR".into(),
        env.tmp_dir().to_string_lossy().into_owned(),
    );

    for (key, value) in &env.setenv {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

/// Decides which executables may run outside the context directory.
/// 决定哪些可执行文件可以在上下文目录之外运行。
#[derive(Debug, Clone)]
pub struct ExternalPolicy {
    bin_dir: PathBuf,
    names: Vec<String>,
    /// Canonical forms of the literal path entries that exist on disk.
    paths: Vec<PathBuf>,
    patterns: GlobSet,
}

/// Where a program was found and whether it may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Lives inside the context's `bin/`.
    Managed(PathBuf),
    /// Outside the context, but whitelisted.
    Whitelisted(PathBuf),
    Denied,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Verdict::Denied)
    }
}

impl ExternalPolicy {
    pub fn new(env: &Environment) -> Self {
        let (entries, names): (Vec<String>, Vec<String>) = env
            .whitelist_externals
            .iter()
            .cloned()
            .partition(|entry| entry.contains('/') || entry.contains('*'));
        let paths = entries
            .iter()
            .filter(|entry| !entry.contains(GLOB_META))
            .filter_map(|entry| std::fs::canonicalize(env.changedir.join(entry)).ok())
            .collect();
        Self {
            bin_dir: env.bin_dir(),
            names,
            paths,
            patterns: build_globset(&entries),
        }
    }

    /// Checks `program` as it would be spawned from `cwd` with `search_path`.
    pub fn check(&self, program: &str, cwd: &Path, search_path: Option<&str>) -> Verdict {
        let resolved = resolve_program(program, cwd, search_path);

        if let Some(path) = &resolved {
            if path.starts_with(&self.bin_dir) {
                return Verdict::Managed(path.clone());
            }
        }

        let canonical = resolved
            .as_ref()
            .and_then(|path| std::fs::canonicalize(path).ok());

        let by_name = self.names.iter().any(|name| name == program);
        let by_path = canonical
            .as_ref()
            .is_some_and(|path| self.paths.contains(path));
        let by_pattern = self.patterns.is_match(program)
            || resolved
                .iter()
                .chain(canonical.iter())
                .any(|path| self.patterns.is_match(path));

        if by_name || by_path || by_pattern {
            Verdict::Whitelisted(resolved.unwrap_or_else(|| PathBuf::from(program)))
        } else {
            Verdict::Denied
        }
    }
}

/// Resolves a program the way `execvp` would: paths containing a separator
/// are taken relative to `cwd`, bare names are searched along `search_path`.
pub fn resolve_program(program: &str, cwd: &Path, search_path: Option<&str>) -> Option<PathBuf> {
    if program.contains('/') {
        let candidate = cwd.join(program);
        return candidate.is_file().then_some(candidate);
    }
    std::env::split_paths(search_path?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;

    fn env_with(dir: &Path, whitelist: &[&str], passenv: &[&str]) -> Environment {
        Environment {
            name: "py36-tests".into(),
            factors: BTreeSet::new(),
            section: "testenv".into(),
            description: None,
            deps: vec![],
            commands_pre: vec![],
            commands: vec![],
            commands_post: vec![],
            whitelist_externals: whitelist.iter().map(|s| s.to_string()).collect(),
            passenv: passenv.iter().map(|s| s.to_string()).collect(),
            setenv: BTreeMap::from([("PYTHONHASHSEED".to_string(), "0".to_string())]),
            changedir: dir.to_path_buf(),
            envdir: dir.join("ctx"),
            create_command: vec![],
            install_command: vec!["{packages}".into()],
            skip_install: true,
            usedevelop: false,
            ignore_errors: false,
            ignore_outcome: false,
        }
    }

    fn parent(vars: &[(&str, &str)]) -> Vec<(String, String)> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn only_passenv_and_defaults_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_with(dir.path(), &[], &["IOTLAB_TEST_*", "CI"]);
        let vars = command_environment(
            &env,
            parent(&[
                ("IOTLAB_TEST_USER", "alice"),
                ("CI", "1"),
                ("SECRET_TOKEN", "x"),
                ("LANG", "C.UTF-8"),
                ("PATH", "/usr/bin:/bin"),
            ]),
        );

        assert_eq!(vars.get("IOTLAB_TEST_USER").map(String::as_str), Some("alice"));
        assert_eq!(vars.get("CI").map(String::as_str), Some("1"));
        assert_eq!(vars.get("LANG").map(String::as_str), Some("C.UTF-8"));
        assert!(!vars.contains_key("SECRET_TOKEN"));
        assert_eq!(vars["PYTHONHASHSEED"], "0");
        assert_eq!(vars["ENVMATRIX_ENV_NAME"], "py36-tests");

        let path = &vars["PATH"];
        assert!(path.starts_with(&env.bin_dir().to_string_lossy().into_owned()));
        assert!(path.ends_with("/usr/bin:/bin"));
    }

    #[test]
    fn programs_in_the_context_are_always_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_with(dir.path(), &[], &[]);
        fs::create_dir_all(env.bin_dir()).unwrap();
        fs::write(env.bin_dir().join("flake8"), "#!/bin/sh\n").unwrap();

        let policy = ExternalPolicy::new(&env);
        let search = env.bin_dir().to_string_lossy().into_owned();
        assert!(matches!(
            policy.check("flake8", dir.path(), Some(&search)),
            Verdict::Managed(_)
        ));
    }

    #[test]
    fn externals_need_a_whitelist_entry() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tools").join("bash");
        fs::create_dir_all(tool.parent().unwrap()).unwrap();
        fs::write(&tool, "").unwrap();
        let search = tool.parent().unwrap().to_string_lossy().into_owned();

        let denied = ExternalPolicy::new(&env_with(dir.path(), &[], &[]));
        assert_eq!(denied.check("bash", dir.path(), Some(&search)), Verdict::Denied);

        let by_name = ExternalPolicy::new(&env_with(dir.path(), &["bash"], &[]));
        assert!(by_name.check("bash", dir.path(), Some(&search)).is_allowed());

        let by_path =
            ExternalPolicy::new(&env_with(dir.path(), &[tool.to_str().unwrap()], &[]));
        assert_eq!(
            by_path.check("bash", dir.path(), Some(&search)),
            Verdict::Whitelisted(tool.clone())
        );

        let pattern = format!("{}/*", tool.parent().unwrap().display());
        let by_glob = ExternalPolicy::new(&env_with(dir.path(), &[pattern.as_str()], &[]));
        assert!(by_glob.check("bash", dir.path(), Some(&search)).is_allowed());
    }

    #[test]
    fn unresolvable_programs_are_denied_unless_named() {
        let dir = tempfile::tempdir().unwrap();
        let policy = ExternalPolicy::new(&env_with(dir.path(), &["make"], &[]));
        assert_eq!(policy.check("nope-404", dir.path(), Some("")), Verdict::Denied);
        assert_eq!(
            policy.check("make", dir.path(), Some("")),
            Verdict::Whitelisted(PathBuf::from("make"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn whitelisted_paths_match_through_symlinked_directories() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("usr-bin");
        let link = dir.path().join("bin");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("bash"), "").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        // `/bin/bash` whitelisted while PATH finds `/usr/bin/bash` first.
        let listed = link.join("bash");
        let policy = ExternalPolicy::new(&env_with(dir.path(), &[listed.to_str().unwrap()], &[]));
        let search = real.to_string_lossy().into_owned();
        assert_eq!(
            policy.check("bash", dir.path(), Some(&search)),
            Verdict::Whitelisted(real.join("bash"))
        );

        // And the other way round.
        let listed = real.join("bash");
        let policy = ExternalPolicy::new(&env_with(dir.path(), &[listed.to_str().unwrap()], &[]));
        let search = link.to_string_lossy().into_owned();
        assert!(policy.check("bash", dir.path(), Some(&search)).is_allowed());

        let elsewhere = dir.path().join("other").join("bash");
        let policy =
            ExternalPolicy::new(&env_with(dir.path(), &[elsewhere.to_str().unwrap()], &[]));
        assert_eq!(policy.check("bash", dir.path(), Some(&search)), Verdict::Denied);
    }
}
