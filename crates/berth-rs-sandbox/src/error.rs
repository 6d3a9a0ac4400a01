//! Sandbox error types.

use berth_rs_protocol::IsolationBackend;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors returned by the sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid sandbox or mount configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Virtual mount path failed validation.
    #[error("invalid mount path: {0}")]
    InvalidMountPath(String),
    /// The sandbox cannot serve the request in its current state.
    #[error("sandbox is not ready: {0}")]
    NotReady(String),
    /// Mount point exists but was not created by this system.
    #[error("mount point at {0} was not created by berth; refusing to modify it")]
    ForeignMount(PathBuf),
    /// Mount target already holds files that must not be hidden.
    #[error("mount target {0} already exists and is not empty")]
    MountTargetNotEmpty(PathBuf),
    /// The tool backing a mount type is missing on this host.
    #[error("{tool} is not installed; install it to enable this mount type")]
    MountToolNotFound {
        /// Name of the missing executable.
        tool: String,
    },
    /// Attaching or detaching a mount failed.
    #[error("mount operation failed: {0}")]
    MountFailed(String),
    /// The process already exited.
    #[error("process {0} is not running")]
    ProcessNotRunning(u32),
    /// The process has no writable stdin.
    #[error("process {0} has no writable stdin")]
    StdinUnavailable(u32),
    /// The requested isolation backend cannot run on this host.
    #[error("isolation backend {0:?} is not available on this host")]
    IsolationUnavailable(IsolationBackend),
    /// A concurrent lifecycle transition failed; the original error is shared
    /// with every caller that awaited it.
    #[error("lifecycle transition failed: {0}")]
    Transition(Arc<SandboxError>),
    /// Command execution failed before an exit code was available.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl SandboxError {
    /// Whether this error means a mount tool is absent rather than broken.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, SandboxError::MountToolNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::SandboxError;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn foreign_mount_names_the_cause() {
        let err = SandboxError::ForeignMount(PathBuf::from("/tmp/ws/data"));
        assert_eq!(err.to_string().contains("not created by berth"), true);
    }

    #[test]
    fn tool_not_found_mentions_installation() {
        let err = SandboxError::MountToolNotFound {
            tool: "s3fs".to_string(),
        };
        assert_eq!(err.to_string().contains("s3fs is not installed"), true);
        assert_eq!(err.is_tool_missing(), true);
    }
}
