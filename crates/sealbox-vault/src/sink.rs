//! Restore sinks: where decrypted items are written

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use sealbox_core::config::RestoreConfig;
use sealbox_core::{SealboxError, SealboxResult};
use sealbox_crypto::validate_name;

use crate::fs::{ensure_dir, write_atomic};

/// Destination for restored plaintext.
///
/// `restore` returns once the item is durably in place; callers rely on that
/// before removing the item's envelope.
pub trait RestoreSink: Send + Sync + 'static {
    /// Store `plaintext` under `name`, returning a human-readable location.
    fn restore(
        &self,
        name: &str,
        plaintext: &[u8],
    ) -> impl Future<Output = SealboxResult<String>> + Send;
}

/// Writes restored items under a directory, mirroring their names.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    overwrite: bool,
    io_timeout: Duration,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool, io_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            overwrite,
            io_timeout,
        }
    }

    pub fn from_config(restore: &RestoreConfig, io_timeout: Duration) -> Self {
        Self::new(restore.restore_dir.clone(), restore.overwrite, io_timeout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a name restores to. Names are re-checked here, not trusted.
    pub fn target_for(&self, name: &str) -> SealboxResult<PathBuf> {
        validate_name(name)?;
        let mut path = self.root.clone();
        path.extend(name.split('/'));
        Ok(path)
    }
}

impl RestoreSink for DirectorySink {
    async fn restore(&self, name: &str, plaintext: &[u8]) -> SealboxResult<String> {
        let target = self.target_for(name)?;
        if let Some(parent) = target.parent() {
            ensure_dir(parent, self.io_timeout).await?;
        }
        write_atomic(&target, plaintext, self.overwrite, self.io_timeout).await?;
        Ok(target.display().to_string())
    }
}

/// Collects restored items in memory, refusing duplicates.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything restored so far, keyed by name.
    pub fn items(&self) -> BTreeMap<String, Vec<u8>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RestoreSink for MemorySink {
    async fn restore(&self, name: &str, plaintext: &[u8]) -> SealboxResult<String> {
        validate_name(name)?;
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if items.contains_key(name) {
            return Err(SealboxError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{name} already restored"),
            )));
        }
        items.insert(name.to_string(), plaintext.to_vec());
        Ok(format!("memory:{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_directory_sink_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out"), false, TIMEOUT);

        let location = sink.restore("docs/deep/a.txt", b"hello").await.unwrap();
        let expected = tmp.path().join("out/docs/deep/a.txt");
        assert_eq!(location, expected.display().to_string());
        assert_eq!(std::fs::read(expected).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_directory_sink_refuses_overwrite_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"existing").unwrap();
        let sink = DirectorySink::new(tmp.path(), false, TIMEOUT);

        match sink.restore("a.txt", b"new").await {
            Err(SealboxError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn test_directory_sink_overwrite_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"existing").unwrap();
        let sink = DirectorySink::new(tmp.path(), true, TIMEOUT);

        sink.restore("a.txt", b"new").await.unwrap();
        assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_directory_sink_rejects_escaping_names() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out"), true, TIMEOUT);

        for name in ["../escape.txt", "/etc/passwd", "a/../../b"] {
            assert!(matches!(
                sink.restore(name, b"x").await,
                Err(SealboxError::MalformedMetadata(_))
            ));
        }
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_memory_sink_collects_and_refuses_duplicates() {
        let sink = MemorySink::new();
        sink.restore("a.txt", b"one").await.unwrap();
        assert!(sink.restore("a.txt", b"two").await.is_err());

        let items = sink.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items["a.txt"], b"one");
    }
}
