use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{ConfigProvider, UpstreamPointer};
use crate::error::PointerResult;

/// Pointer store keeping one JSON file per principal.
///
/// Files are named `pointer_<principal>.json` with the principal reduced to
/// `[A-Za-z0-9_-]`. On Unix the directory is owner-only (0700) and each file
/// is owner read/write (0600), since files may hold a credential.
pub struct FileConfigProvider {
    dir: PathBuf,
}

impl FileConfigProvider {
    /// Create the store, creating `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> PointerResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        restrict_permissions(&dir, 0o700).await?;
        Ok(Self { dir })
    }

    /// Directory holding pointer files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pointer_path(&self, principal: &str) -> PathBuf {
        let safe: String = principal
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        self.dir.join(format!("pointer_{}.json", safe))
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path, mode: u32) -> PointerResult<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path, _mode: u32) -> PointerResult<()> {
    Ok(())
}

/// Write `body` to `path`, creating the file owner-only so the credential is
/// never readable by others, even briefly.
async fn write_private(path: &Path, body: &[u8]) -> PointerResult<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    // Mode only applies on creation; tighten files that already existed.
    restrict_permissions(path, 0o600).await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(())
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn get(&self, principal: &str) -> PointerResult<Option<UpstreamPointer>> {
        let path = self.pointer_path(principal);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(pointer) => Ok(Some(pointer)),
            Err(e) => {
                // An unreadable pointer means the node acts as an authority.
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable pointer file"
                );
                Ok(None)
            }
        }
    }

    async fn set(&self, principal: &str, pointer: &UpstreamPointer) -> PointerResult<()> {
        let path = self.pointer_path(principal);
        let body = serde_json::to_vec_pretty(pointer)?;

        write_private(&path, &body).await?;

        info!(
            principal = %principal,
            upstream = %pointer.upstream_address,
            "Saved upstream pointer"
        );
        Ok(())
    }

    async fn delete(&self, principal: &str) -> PointerResult<()> {
        let path = self.pointer_path(principal);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(principal = %principal, "Deleted upstream pointer");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PointerError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_provider_roundtrip() {
        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("pointers"))
            .await
            .unwrap();

        assert!(provider.get("alice").await.unwrap().is_none());

        let pointer = UpstreamPointer::new("http://10.0.0.2:8888", Some("tok".into())).unwrap();
        provider.set("alice", &pointer).await.unwrap();
        assert_eq!(provider.get("alice").await.unwrap(), Some(pointer));

        provider.delete("alice").await.unwrap();
        assert!(provider.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_pointer_succeeds() {
        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path()).await.unwrap();
        assert!(provider.delete("nobody").await.is_ok());
    }

    #[tokio::test]
    async fn test_principal_is_sanitized() {
        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path()).await.unwrap();

        let path = provider.pointer_path("../../etc/passwd");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.file_name().unwrap(), "pointer_etcpasswd.json");
    }

    #[tokio::test]
    async fn test_corrupt_pointer_reads_as_absent() {
        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path()).await.unwrap();
        tokio::fs::write(provider.pointer_path("alice"), b"{not json")
            .await
            .unwrap();

        assert!(provider.get("alice").await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pointer_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path()).await.unwrap();
        let pointer = UpstreamPointer::new("http://host", Some("tok".into())).unwrap();
        provider.set("alice", &pointer).await.unwrap();

        let meta = std::fs::metadata(provider.pointer_path("alice")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_readable_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path()).await.unwrap();
        let path = provider.pointer_path("alice");
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let pointer = UpstreamPointer::new("http://host", Some("tok".into())).unwrap();
        provider.set("alice", &pointer).await.unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(provider.get("alice").await.unwrap(), Some(pointer));
    }

    #[tokio::test]
    async fn test_set_reports_write_failure() {
        let dir = tempdir().unwrap();
        let provider = FileConfigProvider::new(dir.path()).await.unwrap();
        std::fs::create_dir(provider.pointer_path("alice")).unwrap();

        let pointer = UpstreamPointer::new("http://host", Some("tok".into())).unwrap();
        let err = provider.set("alice", &pointer).await.unwrap_err();
        assert!(matches!(err, PointerError::Io(_)), "unexpected error: {:?}", err);
    }
}
