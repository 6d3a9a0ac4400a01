//! Option and result types for sandbox execution and mounting.

use berth_rs_protocol::{IsolationBackend, SandboxCapabilities, SandboxStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::isolation::NativeSandboxConfig;

/// Callback invoked with chunks of process output as they arrive.
pub type OutputCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for constructing a [`crate::LocalSandbox`].
#[derive(Debug, Clone)]
pub struct LocalSandboxOptions {
    /// Sandbox identifier; a random id is generated when absent.
    pub id: Option<String>,
    /// Human-readable sandbox name.
    pub name: String,
    /// Absolute working directory; created on start.
    pub working_directory: PathBuf,
    /// Isolation backend; validated for availability at construction.
    pub isolation: IsolationBackend,
    /// Environment allow-list merged into every command. The host
    /// environment is not inherited unless the caller spreads it in here.
    pub env: BTreeMap<String, String>,
    /// Native isolation policy (network, extra read-write paths).
    pub native_sandbox: NativeSandboxConfig,
    /// Caller-supplied seatbelt profile path. When set, the file is loaded
    /// (or generated in place if absent) and never deleted on destroy.
    pub seatbelt_profile_path: Option<PathBuf>,
    /// Root for marker files and generated profiles. Defaults to a fixed
    /// shared directory under the system temp dir, outside any working
    /// directory.
    pub state_dir: Option<PathBuf>,
}

impl LocalSandboxOptions {
    /// Options for a sandbox rooted at `working_directory` with defaults.
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            name: "local-sandbox".to_string(),
            working_directory: working_directory.into(),
            isolation: IsolationBackend::None,
            env: BTreeMap::new(),
            native_sandbox: NativeSandboxConfig::default(),
            seatbelt_profile_path: None,
            state_dir: None,
        }
    }
}

/// Per-call options for command execution.
#[derive(Default, Clone)]
pub struct ExecuteOptions {
    /// Working directory; defaults to the sandbox working directory.
    pub cwd: Option<PathBuf>,
    /// Environment overrides; later sources win over the sandbox env.
    pub env: BTreeMap<String, String>,
    /// Wall-clock timeout; on expiry the whole process group receives
    /// SIGTERM and the exit code is reported as 124.
    pub timeout: Option<Duration>,
    /// Streaming stdout callback.
    pub on_stdout: Option<OutputCallback>,
    /// Streaming stderr callback.
    pub on_stderr: Option<OutputCallback>,
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("cwd", &self.cwd)
            .field("env_keys", &self.env.len())
            .field("timeout", &self.timeout)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .finish()
    }
}

/// Structured result of a command execution. Process failures are encoded
/// here rather than thrown, so callers always get an exit code.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// True when the command exited zero without being killed or timing out.
    pub success: bool,
    /// Exit code; 124 for timeout, 128 for signal termination without a
    /// numeric code, 1 for spawn-level failures.
    pub exit_code: i32,
    /// Accumulated stdout.
    pub stdout: String,
    /// Accumulated stderr.
    pub stderr: String,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// True when the process was killed via [`crate::ProcessHandle::kill`].
    pub killed: bool,
    /// True when the timeout expired before the process exited.
    pub timed_out: bool,
}

/// Result of a mount request.
#[derive(Debug, Clone)]
pub struct MountResult {
    /// Whether the mount is attached (or queued for attach on start).
    pub success: bool,
    /// The virtual mount path as requested.
    pub mount_path: String,
    /// Failure detail when `success` is false.
    pub error: Option<String>,
    /// True when the failure is a missing mount tool rather than an error;
    /// other access paths to the data may still work.
    pub unavailable: bool,
}

impl MountResult {
    /// Successful mount result for `mount_path`.
    pub fn ok(mount_path: impl Into<String>) -> Self {
        Self {
            success: true,
            mount_path: mount_path.into(),
            error: None,
            unavailable: false,
        }
    }

    /// Failed mount result carrying `error`.
    pub fn failed(mount_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            mount_path: mount_path.into(),
            error: Some(error.into()),
            unavailable: false,
        }
    }

    /// Failure caused by a missing mount tool.
    pub fn unavailable(mount_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            mount_path: mount_path.into(),
            error: Some(error.into()),
            unavailable: true,
        }
    }
}

/// Snapshot of a tracked process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    /// Process-group leader pid.
    pub pid: u32,
    /// Whether the process is still running.
    pub running: bool,
    /// Exit code once the process has finished.
    pub exit_code: Option<i32>,
}

/// Resource and policy snapshot reported by [`crate::Sandbox::get_info`].
#[derive(Debug, Clone)]
pub struct SandboxInfo {
    /// Sandbox identifier.
    pub id: String,
    /// Sandbox name.
    pub name: String,
    /// Provider name; always "local" for the local sandbox.
    pub provider: String,
    /// Current lifecycle status.
    pub status: SandboxStatus,
    /// Host working directory.
    pub working_directory: PathBuf,
    /// Host platform (`std::env::consts::OS`).
    pub platform: &'static str,
    /// Active isolation backend.
    pub isolation: IsolationBackend,
    /// Host logical CPU count.
    pub cpu_count: usize,
    /// Host physical memory in bytes, when detectable.
    pub memory_bytes: Option<u64>,
    /// Effective network policy; only reported when isolation is active.
    pub allow_network: Option<bool>,
    /// Read-write allow-list; only reported when isolation is active.
    pub read_write_paths: Option<Vec<PathBuf>>,
    /// Declared capabilities.
    pub capabilities: SandboxCapabilities,
}
