//! Filesystem blob store

use async_trait::async_trait;
use docsign_core::{BlobError, BlobReference, BlobStore};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    /// Map a blob path onto the root, refusing anything that could escape it
    fn locate(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(BlobError::Storage(format!("Invalid blob path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

fn storage_error(path: &str, err: std::io::Error) -> BlobError {
    match err.kind() {
        ErrorKind::NotFound => BlobError::NotFound(path.to_string()),
        _ => BlobError::Storage(format!("{}: {}", path, err)),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<BlobReference, BlobError> {
        let target = self.locate(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(path, e))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| storage_error(path, e))?;
        tracing::debug!(path, "Stored blob");
        Ok(BlobReference::new(path))
    }

    async fn resolve(&self, reference: &BlobReference) -> Result<String, BlobError> {
        let target = self.locate(reference.as_str())?;
        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{}", base, reference),
            None => format!("file://{}", target.display()),
        })
    }

    async fn fetch(&self, reference: &BlobReference) -> Result<Vec<u8>, BlobError> {
        let target = self.locate(reference.as_str())?;
        tokio::fs::read(&target)
            .await
            .map_err(|e| storage_error(reference.as_str(), e))
    }

    async fn delete(&self, reference: &BlobReference) -> Result<(), BlobError> {
        let target = self.locate(reference.as_str())?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(reference.as_str(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_fetch_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), None);

        let reference = store
            .upload("signed/req1/out.pdf", b"%PDF".to_vec())
            .await
            .unwrap();
        assert_eq!(reference.as_str(), "signed/req1/out.pdf");
        assert_eq!(store.fetch(&reference).await.unwrap(), b"%PDF".to_vec());

        store.delete(&reference).await.unwrap();
        assert_eq!(
            store.fetch(&reference).await.unwrap_err(),
            BlobError::NotFound("signed/req1/out.pdf".to_string())
        );
        // Deleting twice is fine
        store.delete(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), None);
        for path in ["../outside.pdf", "/etc/passwd", "a/../../b", ""] {
            assert!(store.upload(path, vec![1]).await.is_err(), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_resolve_with_public_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), Some("https://files.example.com/".to_string()));
        let url = store
            .resolve(&BlobReference::new("signed/req1/out.pdf"))
            .await
            .unwrap();
        assert_eq!(url, "https://files.example.com/signed/req1/out.pdf");
    }
}
