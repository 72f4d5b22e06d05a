//! sealbox: hybrid envelope encryption for a directory of files
//!
//! Usage:
//!   sealbox [-c sealbox.toml] -e [--public-key public.pem]
//!   sealbox [-c sealbox.toml] -d [private.pem]
//!
//! Encrypt seals every file under `vault.source_dir` into the vault. Sources
//! stay in place unless `--remove-sources` is given. Decrypt opens every
//! envelope in the vault into `restore.restore_dir`, using `keys.private_key`
//! when `-d` has no path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use sealbox_cli::logging::{init_logging, LogFormat};
use sealbox_core::config::Layout;
use sealbox_core::SealboxConfig;
use sealbox_crypto::{PrivateKey, PublicKey};
use sealbox_vault::{
    collect_inputs, BatchSummary, CollectConfig, DirectorySink, FsBlobStore, Outcome, Vault,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "sealbox",
    version,
    about = "Seal files with per-file AES keys wrapped to an RSA public key"
)]
struct Cli {
    /// Path to sealbox.toml configuration file
    #[arg(long, short = 'c', env = "SEALBOX_CONFIG", default_value = "sealbox.toml")]
    config: PathBuf,

    #[command(flatten)]
    mode: ModeArgs,

    #[command(flatten)]
    overrides: Overrides,

    /// Log level (trace, debug, info, warn, error) [default: from config, else info]
    #[arg(long, env = "SEALBOX_LOG")]
    log: Option<String>,

    /// Log format [default: from config, else text]
    #[arg(long, env = "SEALBOX_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ModeArgs {
    /// Encrypt every file under the source directory
    #[arg(short = 'e', long = "encrypt")]
    encrypt: bool,

    /// Decrypt every envelope in the vault with this private key
    /// [default: keys.private_key]
    #[arg(short = 'd', long = "decrypt", value_name = "PRIVATE_KEY", num_args = 0..=1)]
    decrypt: Option<Option<PathBuf>>,
}

/// Command-line overrides for config file values
#[derive(Args, Debug, Default)]
struct Overrides {
    /// PEM public key used to encrypt (overrides keys.public_key)
    #[arg(long, value_name = "PATH")]
    public_key: Option<PathBuf>,

    /// Directory to encrypt (overrides vault.source_dir)
    #[arg(long, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Ciphertext/bundle directory (overrides vault.data_dir)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Wrapped key directory (overrides vault.key_dir)
    #[arg(long, value_name = "DIR")]
    key_dir: Option<PathBuf>,

    /// Store each item as one bundle file instead of two blobs
    #[arg(long)]
    bundle: bool,

    /// Delete each source file once it is sealed
    #[arg(long)]
    remove_sources: bool,

    /// Restore directory (overrides restore.restore_dir)
    #[arg(long, value_name = "DIR")]
    restore_dir: Option<PathBuf>,

    /// Replace existing files when restoring
    #[arg(long)]
    overwrite: bool,

    /// Delete each envelope once its file is restored
    #[arg(long)]
    remove_envelopes: bool,

    /// Concurrent items (0 = available parallelism)
    #[arg(long, short = 'j')]
    workers: Option<usize>,
}

impl Overrides {
    fn apply(&self, config: &mut SealboxConfig) {
        if let Some(p) = &self.public_key {
            config.keys.public_key = Some(p.clone());
        }
        if let Some(d) = &self.source {
            config.vault.source_dir = d.clone();
        }
        if let Some(d) = &self.data_dir {
            config.vault.data_dir = d.clone();
        }
        if let Some(d) = &self.key_dir {
            config.vault.key_dir = d.clone();
        }
        if self.bundle {
            config.vault.layout = Layout::Bundle;
        }
        if self.remove_sources {
            config.vault.remove_sources = true;
        }
        if let Some(d) = &self.restore_dir {
            config.restore.restore_dir = d.clone();
        }
        if self.overwrite {
            config.restore.overwrite = true;
        }
        if self.remove_envelopes {
            config.restore.remove_envelopes = true;
        }
        if let Some(n) = self.workers {
            config.batch.workers = n;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Read before logging starts so [log] can configure it.
    let (mut config, found) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .or_else(|| LogFormat::from_config(&config.log.format))
        .unwrap_or(LogFormat::Text);
    init_logging(&level, format);

    if !found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    cli.overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        layout = ?config.vault.layout,
        "sealbox starting"
    );

    let summary = match (cli.mode.encrypt, &cli.mode.decrypt) {
        (true, _) => cmd_encrypt(&config).await?,
        (false, Some(path)) => {
            let key_path = private_key_path(path.as_deref(), &config)?;
            cmd_decrypt(&config, &key_path).await?
        }
        (false, None) => anyhow::bail!("one of -e or -d is required"),
    };
    print_summary(&summary);
    Ok(())
}

async fn load_config(path: &Path) -> Result<(SealboxConfig, bool)> {
    if !path.exists() {
        return Ok((SealboxConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = SealboxConfig::from_toml_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok((config, true))
}

/// The `-d` path, else `keys.private_key`.
fn private_key_path(arg: Option<&Path>, config: &SealboxConfig) -> Result<PathBuf> {
    arg.map(Path::to_path_buf)
        .or_else(|| config.keys.private_key.clone())
        .context(
            "no private key given\n\
             Pass a path to -d or set keys.private_key in the config file.",
        )
}

async fn read_pem(path: &Path, what: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {what}: {}", path.display()))
}

fn open_vault(config: &SealboxConfig) -> Vault<FsBlobStore> {
    let io_timeout = Duration::from_secs(config.batch.io_timeout_secs);
    Vault::new(
        FsBlobStore::new(&config.vault, io_timeout),
        config.vault.layout,
        &config.batch,
    )
}

async fn cmd_encrypt(config: &SealboxConfig) -> Result<BatchSummary> {
    let key_path = config.keys.public_key.as_deref().context(
        "no public key configured\n\
         Set keys.public_key in the config file or pass --public-key.",
    )?;
    let pem = read_pem(key_path, "public key").await?;
    let public = PublicKey::from_pem(&pem)
        .with_context(|| format!("parsing public key: {}", key_path.display()))?;
    info!(bits = public.bits(), key = %key_path.display(), "loaded public key");

    let source = &config.vault.source_dir;
    let collect = CollectConfig::from_vault(&config.vault, &config.restore);
    let inputs = tokio::task::spawn_blocking({
        let source = source.clone();
        move || collect_inputs(&source, &collect)
    })
    .await
    .context("input collection task failed")?
    .with_context(|| format!("collecting inputs from {}", source.display()))?;
    info!(count = inputs.len(), source = %source.display(), "collected inputs");

    let vault = open_vault(config);
    let summary = vault
        .seal_all(inputs, Arc::new(public), config.vault.remove_sources)
        .await
        .context("encryption aborted")?;
    Ok(summary)
}

async fn cmd_decrypt(config: &SealboxConfig, key_path: &Path) -> Result<BatchSummary> {
    let pem = read_pem(key_path, "private key").await?;
    let private = PrivateKey::from_pem(&pem)
        .with_context(|| format!("parsing private key: {}", key_path.display()))?;
    drop(pem);

    let io_timeout = Duration::from_secs(config.batch.io_timeout_secs);
    let sink = DirectorySink::from_config(&config.restore, io_timeout);
    info!(restore_dir = %sink.root().display(), "restoring");

    let vault = open_vault(config);
    let summary = vault
        .open_all(
            Arc::new(private),
            Arc::new(sink),
            config.restore.remove_envelopes,
        )
        .await
        .context("decryption aborted")?;
    Ok(summary)
}

fn print_summary(summary: &BatchSummary) {
    for report in &summary.reports {
        match &report.outcome {
            Outcome::Failed { .. } => eprintln!("{}: {}", report.item, report.outcome),
            _ => println!("{}: {}", report.item, report.outcome),
        }
    }
    println!(
        "{} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
}
