//! Turn a source directory into named inputs for sealing
//!
//! Names are `/`-separated paths relative to the root, so they restore to the
//! same layout on any platform. Only regular files are collected; symlinks and
//! non-UTF-8 names are skipped with a warning.

use std::path::{Path, PathBuf};

use sealbox_core::config::{RestoreConfig, VaultConfig};
use sealbox_core::{SealboxError, SealboxResult};
use tracing::{debug, warn};

/// Options for [`collect_inputs`].
#[derive(Debug, Clone, Default)]
pub struct CollectConfig {
    /// Descend into dot-directories and collect dotfiles
    pub include_hidden: bool,
    /// Glob patterns matched against each entry's file name
    pub exclude_patterns: Vec<String>,
    /// Directories never descended into (e.g. a vault living under the source)
    pub skip_dirs: Vec<PathBuf>,
}

impl CollectConfig {
    /// Build from the vault section, skipping the vault's own directories and
    /// the restore directory.
    pub fn from_vault(vault: &VaultConfig, restore: &RestoreConfig) -> Self {
        Self {
            include_hidden: vault.include_hidden,
            exclude_patterns: vault.exclude_patterns.clone(),
            skip_dirs: vec![
                vault.data_dir.clone(),
                vault.key_dir.clone(),
                restore.restore_dir.clone(),
            ],
        }
    }
}

/// Where an input's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// One item to seal: the name stored in its metadata plus its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealInput {
    pub name: String,
    pub source: InputSource,
}

impl SealInput {
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: InputSource::File(path.into()),
        }
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: InputSource::Bytes(data.into()),
        }
    }
}

/// Walk `root` and return its files in sorted (deterministic) order.
pub fn collect_inputs(root: &Path, config: &CollectConfig) -> SealboxResult<Vec<SealInput>> {
    let excludes = config
        .exclude_patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| SealboxError::Config(format!("invalid exclude pattern {p:?}: {e}")))
        })
        .collect::<SealboxResult<Vec<_>>>()?;

    // Compare canonical paths so `./vault` and `vault` are the same directory.
    let skip_dirs: Vec<PathBuf> = config
        .skip_dirs
        .iter()
        .filter_map(|d| std::fs::canonicalize(d).ok())
        .collect();

    let mut out = Vec::new();
    collect_inner(root, "", &mut out, config, &excludes, &skip_dirs)?;
    out.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(root = %root.display(), count = out.len(), "collected inputs");
    Ok(out)
}

fn collect_inner(
    dir: &Path,
    prefix: &str,
    out: &mut Vec<SealInput>,
    config: &CollectConfig,
    excludes: &[glob::Pattern],
    skip_dirs: &[PathBuf],
) -> SealboxResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_context(e, "reading dir", dir))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_context(e, "reading dir entry in", dir))?;
        let path = entry.path();

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = %path.display(), "skipping entry with non-UTF-8 name");
            continue;
        };

        if excludes.iter().any(|p| p.matches(&name)) {
            continue;
        }
        if name.starts_with('.') && !config.include_hidden {
            continue;
        }

        let file_type = entry
            .file_type()
            .map_err(|e| io_context(e, "stat", &path))?;
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        if file_type.is_dir() {
            let is_skipped = std::fs::canonicalize(&path)
                .map(|c| skip_dirs.contains(&c))
                .unwrap_or(false);
            if is_skipped {
                debug!(path = %path.display(), "skipping vault directory");
                continue;
            }
            collect_inner(&path, &relative, out, config, excludes, skip_dirs)?;
        } else if file_type.is_file() {
            out.push(SealInput::file(relative, path));
        } else {
            warn!(path = %path.display(), "skipping non-regular file");
        }
    }
    Ok(())
}

fn io_context(e: std::io::Error, action: &str, path: &Path) -> SealboxError {
    SealboxError::Io(std::io::Error::new(
        e.kind(),
        format!("{action} {}: {e}", path.display()),
    ))
}
