//! Shared types crossing the sandbox boundary: lifecycle states, mount
//! configuration, and the filesystem collaborator contract.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    /// Constructed but never started.
    Pending,
    /// Startup in progress.
    Starting,
    /// Ready to execute commands and mounts.
    Running,
    /// Teardown of a stoppable sandbox in progress.
    Stopping,
    /// Stopped; may be started again.
    Stopped,
    /// Final teardown in progress.
    Destroying,
    /// Terminal; the sandbox cannot be restarted.
    Destroyed,
    /// A lifecycle transition failed.
    Error,
}

impl SandboxStatus {
    /// Whether the sandbox can never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, SandboxStatus::Destroyed)
    }
}

/// Native isolation mechanism used to confine spawned processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationBackend {
    /// No OS-level confinement; commands run directly on the host.
    None,
    /// macOS Seatbelt via `sandbox-exec`.
    Seatbelt,
    /// Linux bubblewrap via `bwrap`.
    Bwrap,
}

/// Current state of a mount entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    /// Queued; the sandbox was not running when the mount was requested.
    Pending,
    /// Attach in progress.
    Mounting,
    /// Attached and usable.
    Mounted,
    /// Attach failed; not retried automatically.
    Error,
    /// The mount type is not handled by this sandbox.
    Unsupported,
    /// The mount tool (s3fs, gcsfuse) is missing on this host.
    Unavailable,
}

/// Mount configuration, tagged by backing filesystem type.
///
/// This is a closed union: unknown `type` values deserialize to
/// [`MountConfig::Other`] and surface as an unsupported mount rather than an
/// error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MountConfig {
    /// Symlink to a directory on the host.
    Local {
        /// Directory the mount resolves to.
        base_path: PathBuf,
    },
    /// S3 bucket attached through s3fs.
    S3 {
        /// Bucket name.
        bucket: String,
        /// AWS region, if not the default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        /// Custom endpoint URL for S3-compatible stores.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        /// Access key id; paired with `secret_access_key`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_key_id: Option<String>,
        /// Secret access key; paired with `access_key_id`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret_access_key: Option<String>,
    },
    /// GCS bucket attached through gcsfuse.
    Gcs {
        /// Bucket name.
        bucket: String,
        /// Service account key file passed to gcsfuse.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_file: Option<PathBuf>,
    },
    /// Any mount type this sandbox does not handle.
    #[serde(other)]
    Other,
}

impl MountConfig {
    /// Stable name of the mount type, used in logs and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            MountConfig::Local { .. } => "local",
            MountConfig::S3 { .. } => "s3",
            MountConfig::Gcs { .. } => "gcs",
            MountConfig::Other => "other",
        }
    }
}

/// Capabilities a sandbox implementation declares up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxCapabilities {
    /// Supports spawning and managing processes.
    pub processes: bool,
    /// Supports mounting external storage.
    pub mounts: bool,
}

/// Contract for the filesystem collaborator that backs a mount.
///
/// The sandbox never reads or writes file contents through this trait;
/// mounting operates purely at the host-filesystem level.
pub trait FilesystemProvider: Send + Sync {
    /// Stable identifier for the filesystem.
    fn id(&self) -> &str;
    /// Provider name (e.g. "local", "s3", "gcs").
    fn provider(&self) -> &str;
    /// Mount configuration, if this filesystem is mountable.
    fn get_mount_config(&self) -> Option<MountConfig>;
}
