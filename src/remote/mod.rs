//! Remote baseline object store.
//!
//! Unlike a generic cache backend trait used at a single call site known
//! at compile time, a remote baseline URL is only known at runtime
//! (`--diff-remote file:///...` or `s3://...`), so dispatch here is an enum
//! rather than a trait object — the same "duck-typed handle" pattern, just
//! resolved with a `match` instead of a vtable.

mod local;
mod s3;

use std::path::Path;

pub use local::LocalFsBackend;
pub use s3::S3Backend;

use crate::error::{EngineError, Result};

/// A baseline object under a remote prefix, as returned by `list_baselines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKey(pub String);

pub enum RemoteBackend {
    LocalFs(LocalFsBackend),
    S3(S3Backend),
}

impl RemoteBackend {
    /// Parses a `file://` or `s3://` URL and connects. S3 needs an async
    /// client bootstrap (credential resolution), so this is async even
    /// though the local backend doesn't need it.
    pub async fn connect(url: &str) -> Result<Self> {
        if let Some(root) = url.strip_prefix("file://") {
            return Ok(Self::LocalFs(LocalFsBackend::new(root)));
        }
        if let Some(rest) = url.strip_prefix("s3://") {
            return Ok(Self::S3(S3Backend::connect(rest).await?));
        }
        Err(EngineError::UnknownUrlScheme(url.to_string()))
    }

    /// Uploads `local_path` to `remote_key`, overwriting any existing
    /// object at that key.
    pub async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        match self {
            Self::LocalFs(b) => b.upload(local_path, remote_key).await,
            Self::S3(b) => b.upload(local_path, remote_key).await,
        }
    }

    /// Downloads `remote_key` to `local_path` if it is newer/different than
    /// what's already there. Returns `true` if bytes were actually
    /// (re)written. Returns `Err(NotFound)` if the remote key doesn't
    /// exist — callers on the selection path treat that as "no remote
    /// baseline yet" and continue rather than aborting.
    pub async fn download(&self, remote_key: &str, local_path: &Path) -> Result<bool> {
        match self {
            Self::LocalFs(b) => b.download(remote_key, local_path).await,
            Self::S3(b) => b.download(remote_key, local_path).await,
        }
    }

    /// Lists every baseline object under `prefix` (recursively).
    pub async fn list_baselines(&self, prefix: &str) -> Result<Vec<RemoteKey>> {
        match self {
            Self::LocalFs(b) => b.list_baselines(prefix).await,
            Self::S3(b) => b.list_baselines(prefix).await,
        }
    }

    /// Downloads every baseline under `prefix` into `local_dir`, preserving
    /// the relative key path. Used by worker-side controller setup to pull
    /// every shard's baseline before a merge.
    pub async fn download_all(&self, prefix: &str, local_dir: &Path) -> Result<Vec<std::path::PathBuf>> {
        let keys = self.list_baselines(prefix).await?;
        let mut downloaded = Vec::with_capacity(keys.len());
        for key in keys {
            let relative = key.0.strip_prefix(prefix).unwrap_or(&key.0).trim_start_matches('/');
            let local_path = local_dir.join(relative);
            if let Some(parent) = local_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            match self.download(&key.0, &local_path).await {
                Ok(_) => downloaded.push(local_path),
                Err(EngineError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(downloaded)
    }
}
