//! The local sandbox: executes commands against a host working directory
//! under optional OS-native isolation, with external storage mounted into
//! the directory.

use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SandboxError;
use crate::isolation::{
    NativeSandboxConfig, WrapContext, generate_seatbelt_profile, is_isolation_available,
    profile_file_name, wrap_command,
};
use crate::lifecycle::LifecycleController;
use crate::mount::MountManager;
use crate::process::{CommandWrapper, ProcessHandle, ProcessManager, WrappedCommand};
use crate::types::{
    CommandResult, ExecuteOptions, LocalSandboxOptions, MountResult, ProcessStatus, SandboxInfo,
};
use berth_rs_protocol::{
    FilesystemProvider, IsolationBackend, MountState, SandboxCapabilities, SandboxStatus,
};

/// Uniform surface over sandbox implementations, so embedders can hold an
/// `Arc<dyn Sandbox>` without caring where execution happens.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Sandbox identifier.
    fn id(&self) -> &str;
    /// Human-readable name.
    fn name(&self) -> &str;
    /// Current lifecycle status.
    fn status(&self) -> SandboxStatus;
    /// Capabilities this implementation declares up front.
    fn capabilities(&self) -> SandboxCapabilities;
    /// Drive the sandbox to `running`.
    async fn start(&self) -> Result<(), SandboxError>;
    /// Drive the sandbox to `stopped`.
    async fn stop(&self) -> Result<(), SandboxError>;
    /// Tear the sandbox down; terminal.
    async fn destroy(&self) -> Result<(), SandboxError>;
    /// Execute a command to completion.
    async fn execute_command(
        &self,
        command: &str,
        args: &[String],
        options: ExecuteOptions,
    ) -> Result<CommandResult, SandboxError>;
    /// Attach a filesystem at a virtual path inside the working directory.
    async fn mount(
        &self,
        filesystem: &dyn FilesystemProvider,
        virtual_path: &str,
    ) -> Result<MountResult, SandboxError>;
    /// Detach the mount at a virtual path.
    async fn unmount(&self, virtual_path: &str) -> Result<MountResult, SandboxError>;
    /// Resource and policy snapshot.
    async fn get_info(&self) -> SandboxInfo;
}

/// Seatbelt profile tracked for the lifetime of the sandbox. The in-memory
/// `text` is authoritative (passed inline to `sandbox-exec`); the on-disk
/// copy is refreshed only by `start()`.
struct ProfileState {
    path: PathBuf,
    text: String,
    auto_generated: bool,
}

/// Isolation state shared between the sandbox and its command wrapper.
struct IsolationState {
    backend: IsolationBackend,
    working_directory: PathBuf,
    config: RwLock<NativeSandboxConfig>,
    profile: RwLock<Option<ProfileState>>,
}

/// [`CommandWrapper`] reading the shared isolation state live, so policy
/// changes apply to the very next spawn.
struct IsolationWrapper(Arc<IsolationState>);

impl CommandWrapper for IsolationWrapper {
    fn wrap(&self, command: &str) -> WrappedCommand {
        let config = self.0.config.read().clone();
        let profile = self.0.profile.read();
        wrap_command(
            command,
            &WrapContext {
                backend: self.0.backend,
                workspace_path: &self.0.working_directory,
                profile: profile.as_ref().map(|p| p.text.as_str()),
                config: &config,
            },
        )
    }
}

/// Sandbox provider running directly on the host.
pub struct LocalSandbox {
    inner: Arc<LocalSandboxInner>,
}

impl std::fmt::Debug for LocalSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSandbox")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

struct LocalSandboxInner {
    id: String,
    name: String,
    lifecycle: Arc<LifecycleController>,
    processes: ProcessManager,
    mounts: MountManager,
    isolation: Arc<IsolationState>,
    profile_dir: PathBuf,
    seatbelt_profile_path: Option<PathBuf>,
}

impl LocalSandbox {
    /// Build a sandbox from `options`, validating the isolation backend's
    /// availability up front so misconfiguration fails at construction.
    pub fn new(options: LocalSandboxOptions) -> Result<Self, SandboxError> {
        if !options.working_directory.is_absolute() {
            return Err(SandboxError::InvalidConfig(format!(
                "working directory must be absolute: {}",
                options.working_directory.display()
            )));
        }
        if !is_isolation_available(options.isolation) {
            return Err(SandboxError::IsolationUnavailable(options.isolation));
        }

        let state_dir = options
            .state_dir
            .unwrap_or_else(|| std::env::temp_dir().join("berth-sandbox"));
        let isolation = Arc::new(IsolationState {
            backend: options.isolation,
            working_directory: options.working_directory.clone(),
            config: RwLock::new(options.native_sandbox),
            profile: RwLock::new(None),
        });
        let processes = ProcessManager::new(
            options.working_directory.clone(),
            options.env,
            Arc::new(IsolationWrapper(Arc::clone(&isolation))),
        );
        let mounts = MountManager::new(options.working_directory, state_dir.join("mounts"));

        let id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(
            "sandbox created (id={id}, isolation={:?})",
            isolation.backend
        );
        Ok(Self {
            inner: Arc::new(LocalSandboxInner {
                id,
                name: options.name,
                lifecycle: LifecycleController::new(),
                processes,
                mounts,
                isolation,
                profile_dir: state_dir.join("profiles"),
                seatbelt_profile_path: options.seatbelt_profile_path,
            }),
        })
    }

    /// Sandbox identifier.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Sandbox name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SandboxStatus {
        self.inner.lifecycle.status()
    }

    /// The local sandbox always supports processes and mounts.
    pub fn capabilities(&self) -> SandboxCapabilities {
        SandboxCapabilities {
            processes: true,
            mounts: true,
        }
    }

    /// Drive the sandbox to `running`: create the working directory, prepare
    /// the seatbelt profile when applicable, then replay queued mounts.
    pub async fn start(&self) -> Result<(), SandboxError> {
        let op_inner = Arc::clone(&self.inner);
        let op = async move { op_inner.prepare().await }.boxed();
        let hook_inner = Arc::clone(&self.inner);
        let hook = async move { hook_inner.after_start().await }.boxed();
        self.inner.lifecycle.start(op, hook).await
    }

    /// Drive the sandbox to `stopped`, detaching every active mount
    /// best-effort first.
    pub async fn stop(&self) -> Result<(), SandboxError> {
        let inner = Arc::clone(&self.inner);
        let op = async move {
            inner.mounts.unmount_all().await;
            info!("sandbox stopped (id={})", inner.id);
            Ok(())
        }
        .boxed();
        self.inner.lifecycle.stop(op).await
    }

    /// Tear the sandbox down: kill every tracked process, detach mounts, and
    /// remove the auto-generated profile. Terminal.
    pub async fn destroy(&self) -> Result<(), SandboxError> {
        let inner = Arc::clone(&self.inner);
        let op = async move {
            inner.processes.kill_all();
            inner.mounts.unmount_all().await;
            inner.cleanup_profile().await;
            info!("sandbox destroyed (id={})", inner.id);
            Ok(())
        }
        .boxed();
        self.inner.lifecycle.destroy(op).await
    }

    /// Make sure the sandbox is usable for work.
    ///
    /// Fails when destroyed; is a no-op mid-teardown so operations like
    /// listing processes to kill are never blocked; otherwise starts the
    /// sandbox and verifies it actually reached `running`.
    pub async fn ensure_running(&self) -> Result<(), SandboxError> {
        match self.status() {
            SandboxStatus::Destroyed => {
                Err(SandboxError::NotReady("sandbox is destroyed".to_string()))
            }
            SandboxStatus::Running | SandboxStatus::Stopping | SandboxStatus::Destroying => Ok(()),
            _ => {
                self.start().await?;
                let status = self.status();
                if status == SandboxStatus::Running {
                    Ok(())
                } else {
                    Err(SandboxError::NotReady(format!(
                        "sandbox failed to reach running (status={status:?})"
                    )))
                }
            }
        }
    }

    /// Execute `command` with `args` to completion.
    ///
    /// Arguments are shell-quoted and appended; the command itself is passed
    /// through so callers can use shell syntax deliberately. Process
    /// failures are encoded in the result, never thrown.
    pub async fn execute_command(
        &self,
        command: &str,
        args: &[String],
        options: ExecuteOptions,
    ) -> Result<CommandResult, SandboxError> {
        self.ensure_running().await?;
        let command_line = if args.is_empty() {
            command.to_string()
        } else {
            format!("{command} {}", shell_words::join(args))
        };
        Ok(self.inner.processes.execute(&command_line, options).await)
    }

    /// Spawn `command` and return a handle for streaming interaction.
    pub async fn spawn(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<Arc<ProcessHandle>, SandboxError> {
        self.ensure_running().await?;
        self.inner.processes.spawn(command, options)
    }

    /// Look up a tracked process by pid.
    pub fn process(&self, pid: u32) -> Option<Arc<ProcessHandle>> {
        self.inner.processes.get(pid)
    }

    /// Snapshot every process this sandbox ever spawned.
    pub fn processes(&self) -> Vec<ProcessStatus> {
        self.inner.processes.list()
    }

    /// Attach `filesystem` at `virtual_path` inside the working directory.
    ///
    /// Before the sandbox is running the mount is validated and queued, then
    /// replayed once `running` is reached. A filesystem without a mount
    /// config is a terminal per-mount error, never retried.
    pub async fn mount(
        &self,
        filesystem: &dyn FilesystemProvider,
        virtual_path: &str,
    ) -> Result<MountResult, SandboxError> {
        crate::mount::validate_virtual_path(virtual_path)?;
        if self.status() == SandboxStatus::Destroyed {
            return Err(SandboxError::NotReady("sandbox is destroyed".to_string()));
        }

        let Some(config) = filesystem.get_mount_config() else {
            self.inner.mounts.record(virtual_path, MountState::Error);
            return Ok(MountResult::failed(
                virtual_path,
                format!(
                    "filesystem {} ({}) provides no mount config",
                    filesystem.id(),
                    filesystem.provider()
                ),
            ));
        };

        if self.status() != SandboxStatus::Running {
            return self.inner.mounts.queue_mount(virtual_path, &config);
        }

        let result = self.inner.mounts.mount(virtual_path, &config).await?;
        if result.success {
            self.inner.grant_mount_access(virtual_path);
        }
        Ok(result)
    }

    /// Detach the mount at `virtual_path`. Unmounting a path that was never
    /// mounted is a no-op success.
    pub async fn unmount(&self, virtual_path: &str) -> Result<MountResult, SandboxError> {
        self.inner.mounts.unmount(virtual_path).await
    }

    /// Current tracked state of the mount at `virtual_path`.
    pub fn mount_state(&self, virtual_path: &str) -> Option<MountState> {
        self.inner.mounts.state_of(virtual_path)
    }

    /// Wrap a shell command line the way [`Self::execute_command`] would.
    pub fn wrap_command_for_isolation(&self, command: &str) -> WrappedCommand {
        IsolationWrapper(Arc::clone(&self.inner.isolation)).wrap(command)
    }

    /// Resource and policy snapshot.
    pub async fn get_info(&self) -> SandboxInfo {
        let config = self.inner.isolation.config.read().clone();
        let isolated = self.inner.isolation.backend != IsolationBackend::None;
        SandboxInfo {
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            provider: "local".to_string(),
            status: self.status(),
            working_directory: self.inner.isolation.working_directory.clone(),
            platform: std::env::consts::OS,
            isolation: self.inner.isolation.backend,
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_bytes: detect_memory().await,
            allow_network: isolated.then_some(config.allow_network),
            read_write_paths: isolated.then(|| config.read_write_paths.clone()),
            capabilities: self.capabilities(),
        }
    }
}

impl LocalSandboxInner {
    /// Startup side effects, executed exactly once per lifecycle start.
    async fn prepare(&self) -> Result<(), SandboxError> {
        tokio::fs::create_dir_all(&self.isolation.working_directory).await?;
        if self.isolation.backend == IsolationBackend::Seatbelt {
            self.prepare_seatbelt_profile().await?;
        }
        info!(
            "sandbox started (id={}, isolation={:?}, working_dir={})",
            self.id,
            self.isolation.backend,
            self.isolation.working_directory.display()
        );
        Ok(())
    }

    /// Load or generate the seatbelt profile and publish it to the wrapper.
    ///
    /// A caller-supplied path is read if present, generated in place if not,
    /// and never deleted on destroy. Without one, the profile lands at a
    /// deterministic path under the shared profiles directory.
    async fn prepare_seatbelt_profile(&self) -> Result<(), SandboxError> {
        let config = self.isolation.config.read().clone();
        let working_directory = &self.isolation.working_directory;
        let (path, text, auto_generated) = match &self.seatbelt_profile_path {
            Some(path) => {
                let text = if path.exists() {
                    tokio::fs::read_to_string(path).await?
                } else {
                    let text = generate_seatbelt_profile(working_directory, &config);
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(path, &text).await?;
                    text
                };
                (path.clone(), text, false)
            }
            None => {
                let path = self
                    .profile_dir
                    .join(profile_file_name(working_directory, &config));
                let text = generate_seatbelt_profile(working_directory, &config);
                tokio::fs::create_dir_all(&self.profile_dir).await?;
                tokio::fs::write(&path, &text).await?;
                (path, text, true)
            }
        };
        debug!("seatbelt profile ready (path={})", path.display());
        *self.isolation.profile.write() = Some(ProfileState {
            path,
            text,
            auto_generated,
        });
        Ok(())
    }

    /// Post-start hook: attach mounts queued before the sandbox was running.
    /// Per-mount failures are recorded, never fatal to the start.
    async fn after_start(&self) {
        for (path, result) in self.mounts.replay_queued().await {
            if result.success {
                self.grant_mount_access(&path);
            }
        }
    }

    /// Open the isolation policy for a freshly mounted host path and refresh
    /// the in-memory seatbelt profile text.
    fn grant_mount_access(&self, virtual_path: &str) {
        let host_path = self.mounts.host_path_for(virtual_path);
        {
            let mut config = self.isolation.config.write();
            if config.read_write_paths.contains(&host_path) {
                return;
            }
            config.read_write_paths.push(host_path);
        }
        if self.isolation.backend == IsolationBackend::Seatbelt {
            let config = self.isolation.config.read().clone();
            let text = generate_seatbelt_profile(&self.isolation.working_directory, &config);
            if let Some(profile) = self.isolation.profile.write().as_mut() {
                profile.text = text;
            }
        }
    }

    /// Remove the profile file, but only when this sandbox generated it.
    async fn cleanup_profile(&self) {
        let profile = self.isolation.profile.write().take();
        let Some(profile) = profile else {
            return;
        };
        if !profile.auto_generated {
            return;
        }
        if let Err(err) = tokio::fs::remove_file(&profile.path).await {
            warn!(
                "profile cleanup failed (path={}, error={err})",
                profile.path.display()
            );
        }
        // Shared directory; still holding other sandboxes' profiles is fine.
        let _ = tokio::fs::remove_dir(&self.profile_dir).await;
    }
}

/// Total physical memory of the host, when detectable.
async fn detect_memory() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
        let line = meminfo
            .lines()
            .find_map(|line| line.strip_prefix("MemTotal:"))?;
        let kib: u64 = line.split_whitespace().next()?.parse().ok()?;
        Some(kib * 1024)
    }
    #[cfg(target_os = "macos")]
    {
        let output = tokio::process::Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .await
            .ok()?;
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn id(&self) -> &str {
        LocalSandbox::id(self)
    }

    fn name(&self) -> &str {
        LocalSandbox::name(self)
    }

    fn status(&self) -> SandboxStatus {
        LocalSandbox::status(self)
    }

    fn capabilities(&self) -> SandboxCapabilities {
        LocalSandbox::capabilities(self)
    }

    async fn start(&self) -> Result<(), SandboxError> {
        LocalSandbox::start(self).await
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        LocalSandbox::stop(self).await
    }

    async fn destroy(&self) -> Result<(), SandboxError> {
        LocalSandbox::destroy(self).await
    }

    async fn execute_command(
        &self,
        command: &str,
        args: &[String],
        options: ExecuteOptions,
    ) -> Result<CommandResult, SandboxError> {
        LocalSandbox::execute_command(self, command, args, options).await
    }

    async fn mount(
        &self,
        filesystem: &dyn FilesystemProvider,
        virtual_path: &str,
    ) -> Result<MountResult, SandboxError> {
        LocalSandbox::mount(self, filesystem, virtual_path).await
    }

    async fn unmount(&self, virtual_path: &str) -> Result<MountResult, SandboxError> {
        LocalSandbox::unmount(self, virtual_path).await
    }

    async fn get_info(&self) -> SandboxInfo {
        LocalSandbox::get_info(self).await
    }
}
