//! Object storage
//!
//! Site images are written through the [`ObjectStorage`] trait. The shipped
//! backend keeps objects on the local filesystem under `storage.path`, and
//! the router serves that directory at `/uploads`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use crate::config::StorageConfig;

/// Accepted image file extensions
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Rejected uploads
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File {0} is empty")]
    Empty(String),

    #[error("File {file} exceeds the maximum size of {max_mb} MB")]
    TooLarge { file: String, max_mb: u64 },

    #[error("File {file} has an unsupported type ({detail})")]
    InvalidType { file: String, detail: String },

    #[error("Storage error: {0}")]
    Io(#[from] anyhow::Error),
}

/// A file received from a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// File name without directory or extension
    pub fn stem(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// An object written by [`ObjectStorage::put_object`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Backend that stores image bytes
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<StoredObject>;

    /// Remove an object; a missing object is not an error
    async fn delete_object(&self, key: &str) -> Result<()>;

    fn public_url(&self, key: &str) -> String;
}

/// Check extension, MIME type and size of an image upload.
///
/// Returns the canonical extension for the object key.
pub fn validate_image(config: &StorageConfig, file: &UploadedFile) -> Result<&'static str, StorageError> {
    if file.data.is_empty() {
        return Err(StorageError::Empty(file.file_name.clone()));
    }
    if file.data.len() as u64 > config.max_file_size {
        return Err(StorageError::TooLarge {
            file: file.file_name.clone(),
            max_mb: config.max_file_size / 1024 / 1024,
        });
    }

    let extension = file.extension().unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(StorageError::InvalidType {
            file: file.file_name.clone(),
            detail: format!("extension '{}'", extension),
        });
    }
    if !config.is_type_allowed(&file.content_type) {
        return Err(StorageError::InvalidType {
            file: file.file_name.clone(),
            detail: file.content_type.clone(),
        });
    }

    config
        .get_extension(&file.content_type)
        .ok_or_else(|| StorageError::InvalidType {
            file: file.file_name.clone(),
            detail: file.content_type.clone(),
        })
}

/// Fresh object key of a site image
pub fn site_image_key(site_id: i64, extension: &str) -> String {
    format!("public/sites/{}/{}.{}", site_id, Uuid::new_v4(), extension)
}

/// Filesystem-backed storage
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.path.clone(), &config.public_base_url)
    }

    /// Create a boxed storage for use with dependency injection
    pub fn boxed(config: &StorageConfig) -> Arc<dyn ObjectStorage> {
        Arc::new(Self::from_config(config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path below the root, refusing `..` and absolute keys
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || key.is_empty() {
            anyhow::bail!("Invalid object key: {}", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write object {}", key))?;

        tracing::debug!("Stored {} ({} bytes, {})", key, data.len(), content_type);
        Ok(StoredObject {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete object {}", key)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(name: &str, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            data: vec![0xAB; len],
        }
    }

    #[test]
    fn test_validate_image() {
        let config = StorageConfig::default();

        assert_eq!(validate_image(&config, &file("a.JPEG", "image/jpeg", 10)).unwrap(), "jpg");
        assert_eq!(validate_image(&config, &file("b.webp", "image/webp", 10)).unwrap(), "webp");
        assert!(matches!(
            validate_image(&config, &file("c.png", "image/png", 0)),
            Err(StorageError::Empty(_))
        ));
        assert!(matches!(
            validate_image(&config, &file("d.gif", "image/gif", 10)),
            Err(StorageError::InvalidType { .. })
        ));
        assert!(matches!(
            validate_image(&config, &file("e.png", "application/pdf", 10)),
            Err(StorageError::InvalidType { .. })
        ));
        assert!(matches!(
            validate_image(&config, &file("f.png", "image/png", 5 * 1024 * 1024 + 1)),
            Err(StorageError::TooLarge { max_mb: 5, .. })
        ));
    }

    #[test]
    fn test_stem_and_key() {
        assert_eq!(file("fotos/Fachada norte.jpg", "image/jpeg", 1).stem(), Some("Fachada norte"));
        assert_eq!(file(".png", "image/png", 1).stem(), Some(".png"));

        let key = site_image_key(7, "png");
        assert!(key.starts_with("public/sites/7/"));
        assert!(key.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_local_put_and_delete() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads/");

        let stored = storage
            .put_object("public/sites/1/a.png", b"png-bytes", "image/png")
            .await
            .unwrap();
        assert_eq!(stored.url, "/uploads/public/sites/1/a.png");
        let on_disk = dir.path().join("public/sites/1/a.png");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"png-bytes");

        storage.delete_object("public/sites/1/a.png").await.unwrap();
        assert!(!on_disk.exists());
        // deleting twice is fine
        storage.delete_object("public/sites/1/a.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads");

        assert!(storage.put_object("../evil.png", b"x", "image/png").await.is_err());
        assert!(storage.put_object("/etc/evil.png", b"x", "image/png").await.is_err());
        assert!(storage.delete_object("").await.is_err());
    }
}
