//! Pluggable blob storage backends for intention assets.
//!
//! - **Filesystem**: Objects stored under a local directory
//! - **S3**: S3-compatible object storage (AWS S3, Cloudflare R2, MinIO)
//!
//! The backend is configured via `[storage]` in the config. Deletion is the
//! only operation the reconciler needs, and deleting a key that is already
//! gone counts as success on every backend.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;
#[cfg(feature = "s3-storage")]
use tracing::error;
use tracing::{debug, info, instrument};

#[cfg(feature = "s3-storage")]
use crate::config::S3StorageConfig;
use crate::config::{FilesystemStorageConfig, StorageConfig};

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobStorageError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type BlobStorageResult<T> = Result<T, BlobStorageError>;

/// Trait for pluggable blob storage backends.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Delete the object stored under `key`. An absent object is not an error.
    async fn delete(&self, key: &str) -> BlobStorageResult<()>;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}

/// Filesystem blob storage backend.
///
/// Objects are stored as `{base_path}/{key}`; keys may contain `/`.
pub struct FilesystemBlobStorage {
    base: PathBuf,
}

impl FilesystemBlobStorage {
    pub fn new(config: FilesystemStorageConfig) -> Self {
        Self {
            base: PathBuf::from(config.path),
        }
    }

    /// Resolve a key under the base directory, refusing anything that could escape it.
    fn object_path(&self, key: &str) -> BlobStorageResult<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(BlobStorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base.join(relative))
    }
}

#[async_trait]
impl BlobStorage for FilesystemBlobStorage {
    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> BlobStorageResult<()> {
        let path = self.object_path(key)?;
        debug!(path = %path.display(), "Deleting blob from filesystem");

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Blob already absent");
                Ok(())
            }
            Err(e) => Err(BlobStorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

/// S3-compatible object storage backend.
///
/// Requires the `s3-storage` feature.
#[cfg(feature = "s3-storage")]
pub struct S3BlobStorage {
    config: S3StorageConfig,
    client: aws_sdk_s3::Client,
}

#[cfg(feature = "s3-storage")]
impl S3BlobStorage {
    pub async fn new(config: S3StorageConfig) -> BlobStorageResult<Self> {
        info!(bucket = %config.bucket, "Initializing S3 blob storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = aws_credential_types::Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "intention-reaper-config",
                );
                sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
            }
            (None, None) => {}
            _ => {
                return Err(BlobStorageError::Config(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ));
            }
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self { config, client })
    }
}

#[cfg(feature = "s3-storage")]
#[async_trait]
impl BlobStorage for S3BlobStorage {
    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn delete(&self, key: &str) -> BlobStorageResult<()> {
        if key.is_empty() {
            return Err(BlobStorageError::InvalidKey(key.to_string()));
        }
        let object_key = self.config.object_key(key);
        debug!(key = %object_key, "Deleting blob from S3");

        // DeleteObject succeeds for keys that do not exist.
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, key = %object_key, "Failed to delete from S3");
                BlobStorageError::S3(e.to_string())
            })?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// Create a blob storage backend from configuration.
pub async fn create_blob_storage(config: &StorageConfig) -> BlobStorageResult<Arc<dyn BlobStorage>> {
    match config {
        StorageConfig::Filesystem(fs_config) => {
            info!(path = %fs_config.path, "Using filesystem blob storage backend");
            Ok(Arc::new(FilesystemBlobStorage::new(fs_config.clone())))
        }
        #[cfg(feature = "s3-storage")]
        StorageConfig::S3(s3_config) => {
            info!(bucket = %s3_config.bucket, "Using S3 blob storage backend");
            Ok(Arc::new(S3BlobStorage::new(s3_config.clone()).await?))
        }
        #[cfg(not(feature = "s3-storage"))]
        StorageConfig::S3(_) => Err(BlobStorageError::Config(
            "S3 blob storage backend requires the 's3-storage' feature. \
                Rebuild with: cargo build --features s3-storage"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn storage(dir: &TempDir) -> FilesystemBlobStorage {
        FilesystemBlobStorage::new(FilesystemStorageConfig {
            path: dir.path().to_string_lossy().to_string(),
        })
    }

    #[test]
    fn test_filesystem_object_path() {
        let storage = FilesystemBlobStorage::new(FilesystemStorageConfig {
            path: "/var/dedicart/blobs".to_string(),
        });
        assert_eq!(
            storage.object_path("temp/a/b.jpg").unwrap(),
            PathBuf::from("/var/dedicart/blobs/temp/a/b.jpg")
        );
    }

    #[rstest]
    #[case("")]
    #[case("../etc/passwd")]
    #[case("temp/../../etc/passwd")]
    #[case("/etc/passwd")]
    #[case("./temp/a.png")]
    fn test_filesystem_rejects_unsafe_keys(#[case] key: &str) {
        let storage = FilesystemBlobStorage::new(FilesystemStorageConfig {
            path: "/var/dedicart/blobs".to_string(),
        });
        assert!(
            matches!(
                storage.object_path(key),
                Err(BlobStorageError::InvalidKey(_))
            ),
            "key: {key:?}"
        );
    }

    #[tokio::test]
    async fn test_filesystem_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("temp/a");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.jpg"), b"jpeg").unwrap();

        storage(&dir).delete("temp/a/b.jpg").await.unwrap();

        assert!(!nested.join("b.jpg").exists());
    }

    #[tokio::test]
    async fn test_filesystem_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.delete("temp/never-existed.png").await.unwrap();
        storage.delete("temp/never-existed.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_delete_directory_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("temp")).unwrap();

        let result = storage(&dir).delete("temp").await;
        assert!(matches!(result, Err(BlobStorageError::Io(_))));
    }

    #[tokio::test]
    async fn test_create_filesystem_backend() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::Filesystem(FilesystemStorageConfig {
            path: dir.path().to_string_lossy().to_string(),
        });
        let storage = create_blob_storage(&config).await.unwrap();
        assert_eq!(storage.backend_name(), "filesystem");
    }

    #[test]
    fn test_backends_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FilesystemBlobStorage>();
        #[cfg(feature = "s3-storage")]
        assert_send_sync::<S3BlobStorage>();
    }
}
