use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SealboxError, SealboxResult};

/// Top-level configuration (loaded from sealbox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealboxConfig {
    pub keys: KeysConfig,
    pub vault: VaultConfig,
    pub batch: BatchConfig,
    pub restore: RestoreConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// PEM public key used in encrypt mode
    pub public_key: Option<PathBuf>,
    /// PEM private key used by `-d` when no path is given on the command line
    pub private_key: Option<PathBuf>,
}

/// How the two halves of an envelope are laid out on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Ciphertext in `data_dir`, wrapped key in `key_dir`, same blob id
    #[default]
    Split,
    /// One bundle file per item in `data_dir`
    Bundle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory whose files are sealed in encrypt mode
    pub source_dir: PathBuf,
    /// Ciphertext (or bundle) blobs
    pub data_dir: PathBuf,
    /// Wrapped key blobs (split layout only)
    pub key_dir: PathBuf,
    pub layout: Layout,
    pub data_extension: String,
    pub key_extension: String,
    pub bundle_extension: String,
    /// Include dotfiles and dot-directories when collecting inputs
    pub include_hidden: bool,
    /// Glob patterns (matched against file names) to skip
    pub exclude_patterns: Vec<String>,
    /// Delete each source file once its envelope is stored
    pub remove_sources: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent items (0 = available parallelism)
    pub workers: usize,
    /// Timeout applied to every filesystem operation, in seconds
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Where decrypted files are written
    pub restore_dir: PathBuf,
    /// Replace files that already exist at the restore path
    pub overwrite: bool,
    /// Delete the envelope blobs once the restored file is in place
    pub remove_envelopes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("plain"),
            data_dir: PathBuf::from("vault/data"),
            key_dir: PathBuf::from("vault/keys"),
            layout: Layout::Split,
            data_extension: "sealed".into(),
            key_extension: "key".into(),
            bundle_extension: "sbx".into(),
            include_hidden: false,
            exclude_patterns: Vec::new(),
            remove_sources: false,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            io_timeout_secs: 30,
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            restore_dir: PathBuf::from("restored"),
            overwrite: false,
            remove_envelopes: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BatchConfig {
    /// Resolve `workers = 0` to the machine's available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

impl SealboxConfig {
    pub fn from_toml_str(s: &str) -> SealboxResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SealboxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the vault ambiguous or unusable.
    pub fn validate(&self) -> SealboxResult<()> {
        if self.batch.io_timeout_secs == 0 {
            return Err(SealboxError::Config(
                "batch.io_timeout_secs must be greater than zero".into(),
            ));
        }

        let exts = [
            ("vault.data_extension", &self.vault.data_extension),
            ("vault.key_extension", &self.vault.key_extension),
            ("vault.bundle_extension", &self.vault.bundle_extension),
        ];
        for (field, ext) in exts {
            if ext.is_empty() || ext.contains('.') || ext.contains('/') {
                return Err(SealboxError::Config(format!(
                    "{field} must be a bare extension without dots or slashes, got {ext:?}"
                )));
            }
        }
        // Bundles share data_dir with ciphertext blobs.
        if self.vault.data_extension == self.vault.bundle_extension {
            return Err(SealboxError::Config(
                "vault.data_extension and vault.bundle_extension must differ".into(),
            ));
        }
        if self.vault.layout == Layout::Split
            && self.vault.data_dir == self.vault.key_dir
            && self.vault.data_extension == self.vault.key_extension
        {
            return Err(SealboxError::Config(
                "data and key blobs would collide: use distinct directories or extensions".into(),
            ));
        }
        Ok(())
    }
}
