use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

/// Storage for classifier artifacts and small state documents. Paths are
/// forward-slash separated keys relative to the store root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_bytes(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn put_bytes(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

pub type BlobStoreHandle = Arc<dyn BlobStore>;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != "..") {
            full.push(part);
        }
        full
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get_bytes(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let full = self.resolve(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Error reading blob {path}")),
        }
    }

    async fn put_bytes(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Error creating blob directory")?;
        }

        // Write-then-rename keeps readers from observing a half-written blob.
        let tmp = full.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .context(format!("Error writing blob {path}"))?;
        tokio::fs::rename(&tmp, &full)
            .await
            .context(format!("Error publishing blob {path}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let dir = std::env::temp_dir().join(format!("blob-test-{}", uuid::Uuid::new_v4()));
        let store = FsBlobStore::new(&dir);

        store.put_bytes("models/v1/test.json", b"{}").await.unwrap();
        let bytes = store.get_bytes("models/v1/test.json").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(b"{}".as_ref()));

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = std::env::temp_dir().join(format!("blob-test-{}", uuid::Uuid::new_v4()));
        let store = FsBlobStore::new(&dir);
        assert!(store.get_bytes("absent.json").await.unwrap().is_none());
    }
}
