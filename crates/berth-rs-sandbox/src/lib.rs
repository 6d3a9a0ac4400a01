//! Local execution sandbox for agent runtimes.
//!
//! Runs arbitrary shell commands against an isolated working directory,
//! optionally confined by an OS-native sandbox (macOS seatbelt, Linux
//! bubblewrap), with a uniform lifecycle and the ability to mount external
//! storage (local directories, S3/GCS buckets) into that directory.
//!
//! ```no_run
//! use berth_rs_sandbox::{ExecuteOptions, LocalSandbox, LocalSandboxOptions};
//!
//! # async fn run() -> Result<(), berth_rs_sandbox::SandboxError> {
//! let sandbox = LocalSandbox::new(LocalSandboxOptions::new("/tmp/workspace"))?;
//! sandbox.start().await?;
//! let result = sandbox
//!     .execute_command("echo", &["hi".to_string()], ExecuteOptions::default())
//!     .await?;
//! assert_eq!(result.stdout, "hi\n");
//! sandbox.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod hash;
pub mod isolation;
pub mod lifecycle;
pub mod local;
mod mount;
pub mod process;
pub mod types;

pub use error::SandboxError;
pub use isolation::{
    NativeSandboxConfig, detect_isolation, generate_seatbelt_profile, is_isolation_available,
};
pub use lifecycle::LifecycleController;
pub use local::{LocalSandbox, Sandbox};
pub use process::{
    CommandWrapper, ProcessHandle, ProcessManager, SIGNAL_EXIT_CODE, TIMEOUT_EXIT_CODE,
    WrappedCommand,
};
pub use types::{
    CommandResult, ExecuteOptions, LocalSandboxOptions, MountResult, OutputCallback,
    ProcessStatus, SandboxInfo,
};

pub use berth_rs_protocol::{
    FilesystemProvider, IsolationBackend, MountConfig, MountState, SandboxCapabilities,
    SandboxStatus,
};
