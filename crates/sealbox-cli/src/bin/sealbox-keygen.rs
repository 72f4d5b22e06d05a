//! sealbox-keygen: generate an RSA key pair for sealbox
//!
//! Writes `private.pem` (owner read/write only) and `public.pem` into the
//! output directory and prints the public key.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sealbox_cli::logging::{init_logging, LogFormat};
use sealbox_crypto::{generate_keypair, MIN_RSA_BITS};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sealbox-keygen", version, about = "Generate an RSA key pair for sealbox")]
struct Cli {
    /// RSA modulus size in bits
    #[arg(long, default_value_t = 2048)]
    bits: usize,

    /// Directory to write private.pem and public.pem into
    #[arg(long, short = 'o', default_value = ".")]
    out_dir: PathBuf,

    /// Replace existing key files
    #[arg(long)]
    force: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SEALBOX_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SEALBOX_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, cli.log_format);

    if cli.bits < MIN_RSA_BITS {
        anyhow::bail!("--bits must be at least {MIN_RSA_BITS}, got {}", cli.bits);
    }

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;
    let private_path = cli.out_dir.join("private.pem");
    let public_path = cli.out_dir.join("public.pem");
    if !cli.force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                anyhow::bail!(
                    "{} already exists (pass --force to replace it)",
                    path.display()
                );
            }
        }
    }

    info!(bits = cli.bits, "generating key pair");
    let private = generate_keypair(cli.bits).context("generating key pair")?;
    let private_pem = private.to_pem().context("encoding private key")?;
    let public_pem = private
        .public_key()
        .to_pem()
        .context("encoding public key")?;

    write_key_file(&private_path, private_pem.as_bytes(), true)?;
    write_key_file(&public_path, public_pem.as_bytes(), false)?;
    info!(
        private = %private_path.display(),
        public = %public_path.display(),
        "key pair written"
    );

    print!("{public_pem}");
    Ok(())
}

fn write_key_file(path: &Path, contents: &[u8], secret: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if secret { 0o600 } else { 0o644 });
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    // `mode` only applies on creation; tighten a replaced file too.
    #[cfg(unix)]
    if secret {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions on {}", path.display()))?;
    }

    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("writing {}", path.display()))
}
