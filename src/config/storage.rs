//! Blob storage configuration.
//!
//! Assets referenced by an intention (preview images, uploads, QR codes)
//! live in an object store. Deleting them is the only operation this job
//! performs against it.
//!
//! # Example Configuration
//!
//! ```toml
//! [storage]
//! type = "s3"
//! bucket = "dedicart-assets"
//! region = "auto"
//! endpoint = "https://<account-id>.r2.cloudflarestorage.com"
//! access_key_id = "${R2_ACCESS_KEY_ID}"
//! secret_access_key = "${R2_SECRET_ACCESS_KEY}"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Blob storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum StorageConfig {
    /// Objects stored as files under a local directory.
    Filesystem(FilesystemStorageConfig),

    /// S3-compatible object storage (AWS S3, Cloudflare R2, MinIO, ...).
    S3(S3StorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Filesystem(FilesystemStorageConfig {
            path: default_filesystem_path(),
        })
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StorageConfig::Filesystem(c) => c.validate(),
            StorageConfig::S3(c) => c.validate(),
        }
        .map_err(ConfigError::Validation)
    }
}

/// S3-compatible object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// Bucket name.
    pub bucket: String,

    /// Region. R2 accepts "auto".
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    /// Examples:
    /// - MinIO: "http://localhost:9000"
    /// - R2: "https://<account-id>.r2.cloudflarestorage.com"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Access key ID.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Secret access key.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO.
    #[serde(default)]
    pub force_path_style: bool,

    /// Prefix prepended to every resolved key.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "****"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "****"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl S3StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("S3 bucket name cannot be empty".to_string());
        }
        if self.region.is_none() && self.endpoint.is_none() {
            return Err("S3 requires either 'region' or 'endpoint' to be specified".to_string());
        }
        Ok(())
    }

    /// Full object key for a resolved storage key.
    pub fn object_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) if !prefix.trim_end_matches('/').is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), key)
            }
            _ => key.to_string(),
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct FilesystemStorageConfig {
    /// Base directory. Objects are stored as `{path}/{key}`.
    #[serde(default = "default_filesystem_path")]
    pub path: String,
}

impl FilesystemStorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("Filesystem storage path cannot be empty".to_string());
        }
        Ok(())
    }
}

fn default_filesystem_path() -> String {
    "./data/blobs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3(prefix: Option<&str>) -> S3StorageConfig {
        S3StorageConfig {
            bucket: "assets".into(),
            region: Some("auto".into()),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            key_prefix: prefix.map(String::from),
        }
    }

    #[test]
    fn test_object_key_with_prefix() {
        assert_eq!(s3(Some("prod/")).object_key("temp/a.png"), "prod/temp/a.png");
        assert_eq!(s3(Some("prod")).object_key("temp/a.png"), "prod/temp/a.png");
    }

    #[test]
    fn test_object_key_without_prefix() {
        assert_eq!(s3(None).object_key("temp/a.png"), "temp/a.png");
        assert_eq!(s3(Some("/")).object_key("temp/a.png"), "temp/a.png");
    }

    #[test]
    fn test_s3_requires_region_or_endpoint() {
        let mut config = s3(None);
        config.region = None;
        assert!(config.validate().is_err());
        config.endpoint = Some("http://localhost:9000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let mut config = s3(None);
        config.secret_access_key = Some("super-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("****"));
    }
}
