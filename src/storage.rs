use std::path::PathBuf;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// URL under which a stored object is served to clients.
    fn public_url(&self, key: &str) -> String;
}

/// Stores objects as flat files under a dedicated directory. Keys are
/// generated filenames, never client input.
#[derive(Clone)]
pub struct FsStorage {
    root: PathBuf,
    public_base: String,
}

impl FsStorage {
    pub async fn new(root: impl Into<PathBuf>, public_base: &str) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create storage dir {}", root.display()))?;
        Ok(Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for FsStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        let path = self.root.join(key);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.root.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path(), "/static/profile_pics")
            .await
            .unwrap();

        storage
            .put_object("abc123.png", Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();
        let on_disk = std::fs::read(dir.path().join("abc123.png")).unwrap();
        assert_eq!(on_disk, b"png-bytes");

        storage.delete_object("abc123.png").await.unwrap();
        assert!(!dir.path().join("abc123.png").exists());
    }

    #[tokio::test]
    async fn delete_missing_object_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path(), "/static/profile_pics")
            .await
            .unwrap();
        storage.delete_object("never-written.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn public_url_joins_base_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path(), "/static/profile_pics/")
            .await
            .unwrap();
        assert_eq!(
            storage.public_url("abc.jpg"),
            "/static/profile_pics/abc.jpg"
        );
    }
}
