//! Test utilities shared across the berth workspace.

use berth_rs_protocol::{FilesystemProvider, MountConfig};
use std::path::PathBuf;

/// Filesystem collaborator handing out a canned mount config.
pub struct StaticFilesystem {
    id: String,
    provider: String,
    config: Option<MountConfig>,
}

impl StaticFilesystem {
    /// Local-directory filesystem backed by `base_path`.
    pub fn local(base_path: impl Into<PathBuf>) -> Self {
        Self {
            id: "fs-local".to_string(),
            provider: "local".to_string(),
            config: Some(MountConfig::Local {
                base_path: base_path.into(),
            }),
        }
    }

    /// S3 filesystem for `bucket` without credentials.
    pub fn s3(bucket: impl Into<String>) -> Self {
        Self {
            id: "fs-s3".to_string(),
            provider: "s3".to_string(),
            config: Some(MountConfig::S3 {
                bucket: bucket.into(),
                region: None,
                endpoint: None,
                access_key_id: None,
                secret_access_key: None,
            }),
        }
    }

    /// GCS filesystem for `bucket` without a key file.
    pub fn gcs(bucket: impl Into<String>) -> Self {
        Self {
            id: "fs-gcs".to_string(),
            provider: "gcs".to_string(),
            config: Some(MountConfig::Gcs {
                bucket: bucket.into(),
                key_file: None,
            }),
        }
    }

    /// Filesystem of a type the sandbox does not know how to mount.
    pub fn unsupported() -> Self {
        Self {
            id: "fs-unsupported".to_string(),
            provider: "unsupported".to_string(),
            config: Some(MountConfig::Other),
        }
    }

    /// Filesystem that declares no mount config at all.
    pub fn without_config() -> Self {
        Self {
            id: "fs-none".to_string(),
            provider: "none".to_string(),
            config: None,
        }
    }

    /// Override the reported filesystem id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl FilesystemProvider for StaticFilesystem {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn get_mount_config(&self) -> Option<MountConfig> {
        self.config.clone()
    }
}
