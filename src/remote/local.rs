//! `file://` remote backend: another directory on the same (or a mounted
//! network) filesystem, addressed as if it were a remote.
//!
//! Upload is a plain copy, download is skipped when the local copy's
//! mtime is already >= the remote's, and listing recurses the whole root
//! looking for `*.db` files.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::remote::RemoteKey;

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    pub async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        let dest = self.resolve(remote_key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest).await?;
        Ok(())
    }

    pub async fn download(&self, remote_key: &str, local_path: &Path) -> Result<bool> {
        let src = self.resolve(remote_key);
        let remote_meta = tokio::fs::metadata(&src).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotFound { key: remote_key.to_string() }
            } else {
                EngineError::FileUnreadable { path: src.clone(), source }
            }
        })?;

        if let Ok(local_meta) = tokio::fs::metadata(local_path).await {
            let remote_mtime = remote_meta.modified().ok();
            let local_mtime = local_meta.modified().ok();
            if let (Some(r), Some(l)) = (remote_mtime, local_mtime) {
                if l >= r {
                    return Ok(false);
                }
            }
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, local_path).await?;
        Ok(true)
    }

    pub async fn list_baselines(&self, prefix: &str) -> Result<Vec<RemoteKey>> {
        let root = self.resolve(prefix);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in jwalk::WalkDir::new(&root).follow_links(false) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&self.root) {
                keys.push(RemoteKey(rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")));
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(remote_dir.path());

        let src = local_dir.path().join("baseline.db");
        std::fs::write(&src, b"hello").unwrap();
        backend.upload(&src, "shard-0/baseline.db").await.unwrap();

        let dest = local_dir.path().join("downloaded.db");
        let wrote = backend.download("shard-0/baseline.db", &dest).await.unwrap();
        assert!(wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn download_skips_when_local_is_newer() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(remote_dir.path());

        std::fs::write(remote_dir.path().join("baseline.db"), b"old").unwrap();

        let dest = local_dir.path().join("baseline.db");
        std::fs::write(&dest, b"newer").unwrap();

        let wrote = backend.download("baseline.db", &dest).await.unwrap();
        assert!(!wrote);
        assert_eq!(std::fs::read(&dest).unwrap(), b"newer");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let remote_dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(remote_dir.path());
        let err = backend.download("nope.db", Path::new("/tmp/whatever.db")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_baselines_recurses() {
        let remote_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(remote_dir.path().join("shard-0")).unwrap();
        std::fs::write(remote_dir.path().join("shard-0/a.db"), b"x").unwrap();
        std::fs::write(remote_dir.path().join("b.db"), b"x").unwrap();
        std::fs::write(remote_dir.path().join("c.txt"), b"x").unwrap();

        let backend = LocalFsBackend::new(remote_dir.path());
        let mut keys: Vec<String> = backend.list_baselines("").await.unwrap().into_iter().map(|k| k.0).collect();
        keys.sort();
        assert_eq!(keys, vec!["b.db".to_string(), "shard-0/a.db".to_string()]);
    }
}
