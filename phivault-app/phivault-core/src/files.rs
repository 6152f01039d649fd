//! File system capability used by file encryption.
//!
//! Size limits are enforced by the encryption service, not here.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub exists: bool,
    pub size: u64,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    async fn info(&self, path: &Path) -> Result<FileInfo>;
}

/// The local disk through `tokio::fs`. Written files are owner-only on Unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(path, bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }

    async fn info(&self, path: &Path) -> Result<FileInfo> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(FileInfo {
                exists: true,
                size: meta.len(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileInfo {
                exists: false,
                size: 0,
            }),
            Err(e) => Err(e.into()),
        }
    }
}
