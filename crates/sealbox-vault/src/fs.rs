//! Filesystem blob store
//!
//! ```text
//! <data_dir>/<id>.<data_extension>     ciphertext   (split layout)
//! <key_dir>/<id>.<key_extension>       wrapped key  (split layout)
//! <data_dir>/<id>.<bundle_extension>   bundle       (bundle layout)
//! ```
//!
//! Writes go to a hidden `.<file>.tmp-<random>` sibling and are renamed into
//! place, so `list` and readers never observe a partial blob. Every operation
//! is bounded by `io_timeout`.

use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sealbox_core::config::VaultConfig;
use sealbox_core::{SealboxError, SealboxResult};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::store::{not_found, BlobId, BlobKind, BlobStore};

/// Run one I/O future under `limit`, tagging errors with `what`.
pub(crate) async fn timed<T>(
    limit: Duration,
    what: impl Display,
    fut: impl Future<Output = std::io::Result<T>>,
) -> SealboxResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SealboxError::Io(std::io::Error::new(
            e.kind(),
            format!("{what}: {e}"),
        ))),
        Err(_) => Err(SealboxError::timed_out(what)),
    }
}

/// Hidden temp sibling of `target`; never matches a listed extension.
fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix: u32 = rand::random();
    target.with_file_name(format!(".{name}.tmp-{suffix:08x}"))
}

/// Write `data` to `target` atomically.
///
/// With `overwrite == false` the final step is a hard link instead of a rename,
/// so an existing `target` fails with `AlreadyExists` rather than being replaced.
/// Returns once the parent directory entry is synced as well.
pub(crate) async fn write_atomic(
    target: &Path,
    data: &[u8],
    overwrite: bool,
    limit: Duration,
) -> SealboxResult<()> {
    let tmp = temp_path(target);

    let placed = async {
        timed(limit, format!("writing {}", tmp.display()), async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await
        })
        .await?;

        if overwrite {
            timed(
                limit,
                format!("renaming into {}", target.display()),
                tokio::fs::rename(&tmp, target),
            )
            .await
        } else {
            timed(
                limit,
                format!("linking into {}", target.display()),
                tokio::fs::hard_link(&tmp, target),
            )
            .await
        }
    }
    .await;

    // A linked temp is a second name for `target`; a failed one is debris.
    if !overwrite || placed.is_err() {
        remove_temp(&tmp, limit).await;
    }
    placed?;
    sync_parent(target, limit).await
}

/// Remove a temp file, logging rather than returning failures.
async fn remove_temp(tmp: &Path, limit: Duration) {
    match tokio::time::timeout(limit, tokio::fs::remove_file(tmp)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Ok(Err(e)) => warn!(path = %tmp.display(), "failed to clean up temp file: {e}"),
        Err(_) => warn!(path = %tmp.display(), "timed out cleaning up temp file"),
    }
}

/// Flush the directory entry for `target` so a rename or link survives a crash.
#[cfg(unix)]
async fn sync_parent(target: &Path, limit: Duration) -> SealboxResult<()> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    timed(limit, format!("syncing {}", dir.display()), async {
        tokio::fs::File::open(dir).await?.sync_all().await
    })
    .await
}

#[cfg(not(unix))]
async fn sync_parent(_target: &Path, _limit: Duration) -> SealboxResult<()> {
    Ok(())
}

/// Create `dir` and its parents.
pub(crate) async fn ensure_dir(dir: &Path, limit: Duration) -> SealboxResult<()> {
    timed(
        limit,
        format!("creating {}", dir.display()),
        tokio::fs::create_dir_all(dir),
    )
    .await
}

/// [`BlobStore`] over two local directories.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    data_dir: PathBuf,
    key_dir: PathBuf,
    data_extension: String,
    key_extension: String,
    bundle_extension: String,
    io_timeout: Duration,
}

impl FsBlobStore {
    pub fn new(vault: &VaultConfig, io_timeout: Duration) -> Self {
        Self {
            data_dir: vault.data_dir.clone(),
            key_dir: vault.key_dir.clone(),
            data_extension: vault.data_extension.clone(),
            key_extension: vault.key_extension.clone(),
            bundle_extension: vault.bundle_extension.clone(),
            io_timeout,
        }
    }

    fn location(&self, kind: BlobKind) -> (&Path, &str) {
        match kind {
            BlobKind::Ciphertext => (&self.data_dir, &self.data_extension),
            BlobKind::WrappedKey => (&self.key_dir, &self.key_extension),
            BlobKind::Bundle => (&self.data_dir, &self.bundle_extension),
        }
    }

    /// Path of the blob `(id, kind)`.
    pub fn path_for(&self, id: &BlobId, kind: BlobKind) -> PathBuf {
        let (dir, ext) = self.location(kind);
        dir.join(format!("{id}.{ext}"))
    }
}

impl BlobStore for FsBlobStore {
    async fn put(&self, id: &BlobId, kind: BlobKind, data: &[u8]) -> SealboxResult<()> {
        let (dir, _) = self.location(kind);
        ensure_dir(dir, self.io_timeout).await?;

        let path = self.path_for(id, kind);
        write_atomic(&path, data, true, self.io_timeout).await?;
        debug!(%id, %kind, path = %path.display(), bytes = data.len(), "stored blob");
        Ok(())
    }

    async fn get(&self, id: &BlobId, kind: BlobKind) -> SealboxResult<Vec<u8>> {
        let path = self.path_for(id, kind);
        match timed(
            self.io_timeout,
            format!("reading {}", path.display()),
            tokio::fs::read(&path),
        )
        .await
        {
            Err(SealboxError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(not_found(id, kind))
            }
            other => other,
        }
    }

    async fn contains(&self, id: &BlobId, kind: BlobKind) -> SealboxResult<bool> {
        let path = self.path_for(id, kind);
        timed(
            self.io_timeout,
            format!("checking {}", path.display()),
            tokio::fs::try_exists(&path),
        )
        .await
    }

    async fn list(&self, kind: BlobKind) -> SealboxResult<Vec<BlobId>> {
        let (dir, ext) = self.location(kind);
        let what = format!("listing {}", dir.display());

        let scan = async {
            let mut ids = Vec::new();
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                // Nothing stored yet
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                    continue;
                }
                match path.file_stem().and_then(|s| s.to_str()).and_then(BlobId::parse) {
                    Some(id) => ids.push(id),
                    None => debug!(path = %path.display(), "ignoring file with foreign name"),
                }
            }
            Ok::<_, std::io::Error>(ids)
        };

        let mut ids = timed(self.io_timeout, what, scan).await?;
        ids.sort();
        Ok(ids)
    }

    async fn remove(&self, id: &BlobId, kind: BlobKind) -> SealboxResult<()> {
        let path = self.path_for(id, kind);
        match tokio::time::timeout(self.io_timeout, tokio::fs::remove_file(&path)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Ok(Err(e)) => Err(SealboxError::Io(std::io::Error::new(
                e.kind(),
                format!("removing {}: {e}", path.display()),
            ))),
            Err(_) => Err(SealboxError::timed_out(format!(
                "removing {}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(root: &Path) -> FsBlobStore {
        let vault = VaultConfig {
            data_dir: root.join("data"),
            key_dir: root.join("keys"),
            ..VaultConfig::default()
        };
        FsBlobStore::new(&vault, Duration::from_secs(5))
    }

    #[test]
    fn test_path_layout() {
        let store = store_in(Path::new("/v"));
        let id: BlobId = "0123456789abcdef".parse().unwrap();

        assert_eq!(
            store.path_for(&id, BlobKind::Ciphertext),
            PathBuf::from("/v/data/0123456789abcdef.sealed")
        );
        assert_eq!(
            store.path_for(&id, BlobKind::WrappedKey),
            PathBuf::from("/v/keys/0123456789abcdef.key")
        );
        assert_eq!(
            store.path_for(&id, BlobKind::Bundle),
            PathBuf::from("/v/data/0123456789abcdef.sbx")
        );
    }

    #[tokio::test]
    async fn test_put_get_list_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let id = BlobId::generate().unwrap();

        store.put(&id, BlobKind::Ciphertext, b"sealed bytes").await.unwrap();
        assert_eq!(store.get(&id, BlobKind::Ciphertext).await.unwrap(), b"sealed bytes");
        assert!(store.contains(&id, BlobKind::Ciphertext).await.unwrap());
        assert_eq!(store.list(BlobKind::Ciphertext).await.unwrap(), vec![id.clone()]);
        // Bundles share data_dir but not the extension
        assert!(store.list(BlobKind::Bundle).await.unwrap().is_empty());

        store.remove(&id, BlobKind::Ciphertext).await.unwrap();
        assert!(!store.contains(&id, BlobKind::Ciphertext).await.unwrap());
        store.remove(&id, BlobKind::Ciphertext).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let id = BlobId::generate().unwrap();

        store.put(&id, BlobKind::WrappedKey, &[7u8; 256]).await.unwrap();
        store.put(&id, BlobKind::WrappedKey, &[8u8; 256]).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("keys"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{id}.key")]);
        assert_eq!(store.get(&id, BlobKind::WrappedKey).await.unwrap(), vec![8u8; 256]);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(&tmp.path().join("never-created"));
        assert!(store.list(BlobKind::WrappedKey).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let keys = tmp.path().join("keys");
        std::fs::create_dir_all(&keys).unwrap();
        std::fs::write(keys.join("notes.key"), b"x").unwrap();
        std::fs::write(keys.join(".0123456789abcdef.key.tmp-00000001"), b"x").unwrap();
        std::fs::write(keys.join("0123456789abcdef.txt"), b"x").unwrap();
        std::fs::create_dir(keys.join("fedcba9876543210.key")).unwrap();
        std::fs::write(keys.join("0123456789abcdef.key"), b"x").unwrap();

        assert_eq!(
            store.list(BlobKind::WrappedKey).await.unwrap(),
            vec!["0123456789abcdef".parse::<BlobId>().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let id = BlobId::generate().unwrap();
        match store.get(&id, BlobKind::Ciphertext).await {
            Err(SealboxError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_atomic_no_clobber() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("out.txt");
        let limit = Duration::from_secs(5);

        write_atomic(&target, b"first", false, limit).await.unwrap();
        match write_atomic(&target, b"second", false, limit).await {
            Err(SealboxError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        write_atomic(&target, b"third", true, limit).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"third");

        // The failed attempt cleaned up after itself
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_write_atomic_no_clobber_leaves_no_temp() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("restored.txt");

        write_atomic(&target, b"plain", false, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"plain");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_remove_temp_failure_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        // remove_file refuses directories, standing in for any cleanup failure
        let stuck = tmp.path().join(".out.txt.tmp-00000001");
        std::fs::create_dir(&stuck).unwrap();

        remove_temp(&stuck, Duration::from_secs(5)).await;
        assert!(stuck.is_dir());
        remove_temp(&tmp.path().join("absent"), Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_sync_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let limit = Duration::from_secs(5);
        sync_parent(&tmp.path().join("out.txt"), limit).await.unwrap();
        // A bare file name syncs the working directory
        sync_parent(Path::new("out.txt"), limit).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_parent_missing_dir_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = sync_parent(&tmp.path().join("absent/out.txt"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), sealbox_core::ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_timed_reports_timeout_as_io() {
        let err = timed(Duration::from_millis(10), "sleeping", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, std::io::Error>(())
        })
        .await
        .unwrap_err();
        match err {
            SealboxError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::TimedOut),
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }
}
