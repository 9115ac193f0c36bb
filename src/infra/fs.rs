//! # File System Operations Module / 文件系统操作模块
//!
//! This module manages the private context directory of each environment:
//! creating or recreating it, cleaning its temporary directory, and recording
//! the fingerprint of what was installed so an unchanged context is reused.
//!
//! 此模块管理每个环境的私有上下文目录：创建或重建目录、清理其临时目录，
//! 并记录安装内容的指纹，以便复用未变化的上下文。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

const FINGERPRINT_FILE: &str = ".envmatrix-context.json";

/// What was installed into a context. A context is reused only when the
/// fingerprint of the next run is identical.
///
/// 上下文中安装的内容。仅当下次运行的指纹完全一致时才复用上下文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFingerprint {
    pub create_command: Vec<String>,
    pub install_command: Vec<String>,
    pub deps: Vec<String>,
}

/// An environment's context directory on disk.
#[derive(Debug, Clone)]
pub struct ContextDir {
    pub root: PathBuf,
    /// True when the directory was created or wiped by this call.
    pub fresh: bool,
}

impl ContextDir {
    pub fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn tmp(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Whether the recorded fingerprint equals `expected`.
    pub fn matches(&self, expected: &ContextFingerprint) -> bool {
        if self.fresh {
            return false;
        }
        read_fingerprint(&self.root)
            .map(|recorded| recorded == *expected)
            .unwrap_or(false)
    }
}

/// Creates the context directory of an environment, wiping it first when
/// `recreate` is set. `tmp/` is emptied on every call.
///
/// # Arguments
/// * `envdir` - The context directory, usually `<workdir>/<envname>`
/// * `recreate` - Discard any existing context first
pub fn prepare_context(envdir: &Path, recreate: bool) -> Result<ContextDir> {
    let mut fresh = !envdir.exists();

    if recreate && envdir.exists() {
        fs::remove_dir_all(envdir).with_context(|| {
            format!("Failed to remove old context directory: {}", envdir.display())
        })?;
        fresh = true;
    }

    let context = ContextDir {
        root: envdir.to_path_buf(),
        fresh,
    };

    fs::create_dir_all(context.bin())
        .with_context(|| format!("Failed to create {}", context.bin().display()))?;

    let tmp = context.tmp();
    if tmp.exists() {
        fs::remove_dir_all(&tmp)
            .with_context(|| format!("Failed to clean {}", tmp.display()))?;
    }
    fs::create_dir_all(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;

    debug!(path = %envdir.display(), fresh, "context directory ready");
    Ok(context)
}

/// Reads the recorded fingerprint, if any.
pub fn read_fingerprint(envdir: &Path) -> Option<ContextFingerprint> {
    let raw = fs::read_to_string(envdir.join(FINGERPRINT_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Records a fingerprint atomically: written to a temporary file in the
/// same directory, then renamed into place.
pub fn write_fingerprint(envdir: &Path, fingerprint: &ContextFingerprint) -> Result<()> {
    let mut file = NamedTempFile::new_in(envdir)
        .with_context(|| format!("Failed to create a temporary file in {}", envdir.display()))?;
    serde_json::to_writer_pretty(&mut file, fingerprint)?;
    file.flush()?;
    file.persist(envdir.join(FINGERPRINT_FILE))
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to record context fingerprint in {}", envdir.display()))?;
    Ok(())
}

/// Forgets the recorded fingerprint so the next run reinstalls.
pub fn clear_fingerprint(envdir: &Path) {
    let _ = fs::remove_file(envdir.join(FINGERPRINT_FILE));
}

/// Gets the absolute path from a potentially relative path.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}
