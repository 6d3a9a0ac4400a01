//! Process-group-aware command execution with timeout and kill semantics.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;

use crate::error::SandboxError;
use crate::types::{CommandResult, ExecuteOptions, OutputCallback, ProcessStatus};

/// Exit code reported when a command is cut off by its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Exit code reported when a process is terminated by a signal without a
/// numeric exit code.
pub const SIGNAL_EXIT_CODE: i32 = 128;

/// Default PATH passed to children; the host environment is never inherited.
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Grace period between the timeout SIGTERM and the follow-up SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Window granted to output readers after process exit before they are
/// abandoned; keeps `wait()` from hanging on orphans holding the pipes open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Executable plus argv produced by wrapping a shell command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments, including any embedded shell invocation.
    pub args: Vec<String>,
}

/// Wraps a shell command line for execution under the active isolation
/// backend. Implementations must read isolation config live so policy
/// changes take effect on the very next spawn.
pub trait CommandWrapper: Send + Sync {
    /// Wrap `command` into an executable and argv.
    fn wrap(&self, command: &str) -> WrappedCommand;
}

/// Spawns and tracks every process belonging to one sandbox.
pub struct ProcessManager {
    table: Mutex<HashMap<u32, Arc<ProcessHandle>>>,
    base_env: BTreeMap<String, String>,
    default_cwd: PathBuf,
    wrapper: Arc<dyn CommandWrapper>,
}

impl ProcessManager {
    /// Manager executing with `base_env` under `wrapper`, defaulting to
    /// `default_cwd`.
    pub fn new(
        default_cwd: PathBuf,
        base_env: BTreeMap<String, String>,
        wrapper: Arc<dyn CommandWrapper>,
    ) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            base_env,
            default_cwd,
            wrapper,
        }
    }

    /// Spawn `command` as a detached process-group leader.
    ///
    /// The command line is wrapped for isolation first; without isolation it
    /// runs through `sh -c` so the shell parses the string. The whole tree a
    /// command spawns can be signaled as one unit via the group.
    pub fn spawn(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<Arc<ProcessHandle>, SandboxError> {
        let wrapped = self.wrapper.wrap(command);
        let cwd = options
            .cwd
            .clone()
            .unwrap_or_else(|| self.default_cwd.clone());
        let env = self.resolve_env(&options.env);

        let mut cmd = Command::new(&wrapped.program);
        cmd.args(&wrapped.args);
        cmd.env_clear();
        cmd.envs(&env);
        cmd.current_dir(&cwd);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // New process group so the entire tree can be killed as a unit.
        cmd.process_group(0);
        cmd.kill_on_drop(false);

        let mut child = cmd.spawn().map_err(SandboxError::Io)?;
        let pid = child
            .id()
            .ok_or_else(|| SandboxError::ExecutionFailed("spawned process has no pid".to_string()))?;
        debug!(
            "process spawned (pid={}, program={}, has_timeout={})",
            pid,
            wrapped.program,
            options.timeout.is_some()
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (done_tx, done_rx) = watch::channel(false);
        let handle = Arc::new(ProcessHandle {
            pid,
            state: Mutex::new(HandleState::default()),
            stdin: tokio::sync::Mutex::new(stdin),
            done: done_rx,
        });
        self.table.lock().insert(pid, Arc::clone(&handle));

        tokio::spawn(drive_process(
            child,
            Arc::clone(&handle),
            stdout,
            stderr,
            options.on_stdout,
            options.on_stderr,
            options.timeout,
            done_tx,
        ));
        Ok(handle)
    }

    /// Execute `command` to completion, capturing output.
    ///
    /// Spawn-level failures are encoded in the result (`exit_code=1`) rather
    /// than returned as errors, so callers always get an exit code.
    pub async fn execute(&self, command: &str, options: ExecuteOptions) -> CommandResult {
        let started = Instant::now();
        let handle = match self.spawn(command, options) {
            Ok(handle) => handle,
            Err(err) => {
                warn!("spawn failed (error={err})");
                return CommandResult {
                    success: false,
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    killed: false,
                    timed_out: false,
                };
            }
        };
        let exit_code = handle.wait().await;
        let state = handle.state.lock();
        CommandResult {
            success: exit_code == 0 && !state.timed_out && !state.killed,
            exit_code,
            stdout: state.stdout.clone(),
            stderr: state.stderr.clone(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            killed: state.killed,
            timed_out: state.timed_out,
        }
    }

    /// Snapshot every handle ever spawned by this manager; exited processes
    /// are not pruned, so recently-finished work stays observable.
    pub fn list(&self) -> Vec<ProcessStatus> {
        let table = self.table.lock();
        let mut statuses: Vec<ProcessStatus> = table.values().map(|h| h.status()).collect();
        statuses.sort_by_key(|status| status.pid);
        statuses
    }

    /// Look up a handle by pid.
    pub fn get(&self, pid: u32) -> Option<Arc<ProcessHandle>> {
        self.table.lock().get(&pid).cloned()
    }

    /// Force-kill every live process group; used during destroy.
    pub fn kill_all(&self) {
        let handles: Vec<Arc<ProcessHandle>> = self.table.lock().values().cloned().collect();
        for handle in handles {
            if handle.kill() {
                info!("killed process during teardown (pid={})", handle.pid());
            }
        }
    }

    /// Merge the default PATH, the sandbox env, and per-call overrides.
    /// Later sources win.
    fn resolve_env(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), DEFAULT_PATH.to_string());
        for (key, value) in &self.base_env {
            env.insert(key.clone(), value.clone());
        }
        for (key, value) in overrides {
            env.insert(key.clone(), value.clone());
        }
        env
    }
}

/// One OS process group, owned by the manager that spawned it.
pub struct ProcessHandle {
    pid: u32,
    state: Mutex<HandleState>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct HandleState {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    killed: bool,
    timed_out: bool,
}

impl ProcessHandle {
    /// Process-group leader pid.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.state.lock().exit_code.is_none()
    }

    /// Exit code once the process has finished.
    pub fn exit_code(&self) -> Option<i32> {
        self.state.lock().exit_code
    }

    /// Accumulated stdout so far.
    pub fn stdout(&self) -> String {
        self.state.lock().stdout.clone()
    }

    /// Accumulated stderr so far.
    pub fn stderr(&self) -> String {
        self.state.lock().stderr.clone()
    }

    /// Whether the timeout expired before the process exited.
    pub fn timed_out(&self) -> bool {
        self.state.lock().timed_out
    }

    /// Snapshot for [`ProcessManager::list`].
    pub fn status(&self) -> ProcessStatus {
        let state = self.state.lock();
        ProcessStatus {
            pid: self.pid,
            running: state.exit_code.is_none(),
            exit_code: state.exit_code,
        }
    }

    /// Wait for the process to finish and return its exit code.
    pub async fn wait(&self) -> i32 {
        let mut done = self.done.clone();
        // The driver always publishes before dropping the sender; a closed
        // channel with the flag still false means the driver panicked.
        let _ = done.wait_for(|finished| *finished).await;
        self.state.lock().exit_code.unwrap_or(SIGNAL_EXIT_CODE)
    }

    /// Send SIGKILL to the whole process group, falling back to the leader.
    ///
    /// Returns `false` without signaling when the process already exited.
    pub fn kill(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.exit_code.is_some() {
                return false;
            }
            state.killed = true;
        }
        signal_group(self.pid, libc::SIGKILL);
        true
    }

    /// Write `data` to the child's stdin.
    pub async fn send_stdin(&self, data: &[u8]) -> Result<(), SandboxError> {
        if self.state.lock().exit_code.is_some() {
            return Err(SandboxError::ProcessNotRunning(self.pid));
        }
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(SandboxError::StdinUnavailable(self.pid));
        };
        stdin.write_all(data).await.map_err(SandboxError::Io)?;
        stdin.flush().await.map_err(SandboxError::Io)?;
        Ok(())
    }

    /// Close the child's stdin so pipeline-style commands see EOF.
    pub async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }
}

/// Signal the process group addressed by `-pid`; fall back to the leader
/// when the group is already gone.
fn signal_group(pid: u32, signal: i32) -> bool {
    let group = -(pid as i32);
    if unsafe { libc::kill(group, signal) } == 0 {
        return true;
    }
    unsafe { libc::kill(pid as i32, signal) == 0 }
}

/// Map an exit status to the reported code: the numeric code when present,
/// 128 when the process was terminated by a signal.
fn map_exit_status(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNAL_EXIT_CODE)
}

/// Drive one child to completion: stream output, race the timeout against
/// exit, and publish the final state.
#[allow(clippy::too_many_arguments)]
async fn drive_process(
    mut child: tokio::process::Child,
    handle: Arc<ProcessHandle>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    on_stdout: Option<OutputCallback>,
    on_stderr: Option<OutputCallback>,
    timeout: Option<Duration>,
    done_tx: watch::Sender<bool>,
) {
    let pid = handle.pid();
    let state = Arc::clone(&handle);
    let reader_state = Arc::clone(&handle);
    let readers = tokio::spawn(async move {
        let stdout_task = read_stream(stdout, {
            let state = Arc::clone(&reader_state);
            move |chunk| {
                state.state.lock().stdout.push_str(chunk);
                if let Some(cb) = &on_stdout {
                    cb(chunk);
                }
            }
        });
        let stderr_task = read_stream(stderr, {
            let state = Arc::clone(&reader_state);
            move |chunk| {
                state.state.lock().stderr.push_str(chunk);
                if let Some(cb) = &on_stderr {
                    cb(chunk);
                }
            }
        });
        tokio::join!(stdout_task, stderr_task);
    });

    // Race wall-clock timeout against process exit; whichever fires first
    // wins, and the loser's effect is a no-op.
    let (exit_code, timed_out) = match timeout {
        Some(duration) => {
            tokio::select! {
                status = child.wait() => (exit_status_code(status), false),
                _ = tokio::time::sleep(duration) => {
                    warn!("process timed out (pid={}, timeout_ms={})", pid, duration.as_millis());
                    signal_group(pid, libc::SIGTERM);
                    // SIGTERM may be ignored; escalate to SIGKILL after the
                    // grace period so the group cannot outlive the timeout.
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(TERM_GRACE) => {
                            signal_group(pid, libc::SIGKILL);
                            let _ = child.wait().await;
                        }
                    }
                    (TIMEOUT_EXIT_CODE, true)
                }
            }
        }
        None => (exit_status_code(child.wait().await), false),
    };

    // Let the readers drain buffered output, but do not wait on orphans
    // that inherited the pipes.
    let readers_done = tokio::select! {
        result = readers => result.is_ok(),
        _ = tokio::time::sleep(OUTPUT_DRAIN_GRACE) => false,
    };
    if !readers_done {
        debug!("abandoned output readers after exit (pid={pid})");
    }

    {
        let mut locked = state.state.lock();
        if timed_out {
            locked.timed_out = true;
            locked
                .stderr
                .push_str(&format!("command timed out after {}ms\n", timeout.map(|d| d.as_millis()).unwrap_or(0)));
        }
        locked.exit_code = Some(exit_code);
    }
    debug!("process finished (pid={pid}, exit_code={exit_code}, timed_out={timed_out})");
    let _ = done_tx.send(true);
}

/// Result of waiting on the child, flattened to an exit code.
fn exit_status_code(status: std::io::Result<std::process::ExitStatus>) -> i32 {
    match status {
        Ok(status) => map_exit_status(status),
        Err(err) => {
            warn!("process wait failed (error={err})");
            1
        }
    }
}

/// Read a child stream to EOF in chunks, feeding each chunk to `sink`.
async fn read_stream<R>(reader: Option<R>, sink: impl Fn(&str))
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = vec![0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => sink(&String::from_utf8_lossy(&chunk[..read])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CommandWrapper, ProcessManager, SIGNAL_EXIT_CODE, TIMEOUT_EXIT_CODE, WrappedCommand,
    };
    use crate::types::ExecuteOptions;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Wrapper matching the no-isolation backend: run through the shell.
    struct ShellWrapper;

    impl CommandWrapper for ShellWrapper {
        fn wrap(&self, command: &str) -> WrappedCommand {
            WrappedCommand {
                program: "/bin/sh".to_string(),
                args: vec!["-c".to_string(), command.to_string()],
            }
        }
    }

    fn manager(cwd: &std::path::Path) -> ProcessManager {
        ProcessManager::new(cwd.to_path_buf(), BTreeMap::new(), Arc::new(ShellWrapper))
    }

    #[tokio::test]
    async fn execute_captures_stdout_and_exit_code() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let result = manager
            .execute("printf hello", ExecuteOptions::default())
            .await;
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.success, true);
    }

    #[tokio::test]
    async fn execute_reports_nonzero_exit() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let result = manager.execute("exit 3", ExecuteOptions::default()).await;
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.success, false);
    }

    #[tokio::test]
    async fn timeout_maps_to_124_with_synthetic_stderr() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let mut options = ExecuteOptions::default();
        options.timeout = Some(Duration::from_millis(100));
        let result = manager.execute("sleep 5", options).await;
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(result.timed_out, true);
        assert_eq!(result.success, false);
        assert_eq!(result.stderr.contains("timed out"), true);
    }

    #[tokio::test]
    async fn fast_command_is_unaffected_by_timeout() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let mut options = ExecuteOptions::default();
        options.timeout = Some(Duration::from_secs(30));
        let result = manager.execute("printf done", options).await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.timed_out, false);
        assert_eq!(result.stdout, "done");
    }

    #[tokio::test]
    async fn timeout_kills_background_children() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let mut options = ExecuteOptions::default();
        options.timeout = Some(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let result = manager.execute("sleep 30 & sleep 30", options).await;
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        // The whole group dies with the leader; we must not wait for the
        // background sleep.
        assert_eq!(started.elapsed() < Duration::from_secs(10), true);
    }

    #[tokio::test]
    async fn kill_returns_false_after_exit() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let handle = manager
            .spawn("true", ExecuteOptions::default())
            .expect("spawn");
        handle.wait().await;
        assert_eq!(handle.kill(), false);
    }

    #[tokio::test]
    async fn kill_terminates_group_and_reports_signal_exit() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let handle = manager
            .spawn("sleep 30", ExecuteOptions::default())
            .expect("spawn");
        assert_eq!(handle.kill(), true);
        let exit = handle.wait().await;
        assert_eq!(exit, SIGNAL_EXIT_CODE);
        assert_eq!(handle.is_running(), false);
    }

    #[tokio::test]
    async fn send_stdin_feeds_the_child() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let handle = manager
            .spawn("head -n1", ExecuteOptions::default())
            .expect("spawn");
        handle.send_stdin(b"hello\n").await.expect("stdin");
        let exit = handle.wait().await;
        assert_eq!(exit, 0);
        assert_eq!(handle.stdout(), "hello\n");
    }

    #[tokio::test]
    async fn send_stdin_after_exit_fails() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let handle = manager
            .spawn("true", ExecuteOptions::default())
            .expect("spawn");
        handle.wait().await;
        let err = handle.send_stdin(b"late").await.expect_err("exited");
        assert_eq!(
            matches!(err, crate::error::SandboxError::ProcessNotRunning(_)),
            true
        );
    }

    #[tokio::test]
    async fn list_keeps_exited_processes() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let handle = manager
            .spawn("true", ExecuteOptions::default())
            .expect("spawn");
        handle.wait().await;
        let statuses = manager.list();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].running, false);
        assert_eq!(statuses[0].exit_code, Some(0));
    }

    #[tokio::test]
    async fn host_env_is_not_inherited() {
        let workspace = tempdir().expect("workspace");
        let mut base = BTreeMap::new();
        base.insert("SANDBOX_MARKER".to_string(), "yes".to_string());
        let manager =
            ProcessManager::new(workspace.path().to_path_buf(), base, Arc::new(ShellWrapper));
        let result = manager
            .execute("printf \"%s|%s\" \"$SANDBOX_MARKER\" \"$HOME\"", ExecuteOptions::default())
            .await;
        // The sandbox env is present; the host HOME is not.
        assert_eq!(result.stdout, "yes|");
    }

    #[tokio::test]
    async fn per_call_env_overrides_sandbox_env() {
        let workspace = tempdir().expect("workspace");
        let mut base = BTreeMap::new();
        base.insert("SANDBOX_MARKER".to_string(), "base".to_string());
        let manager =
            ProcessManager::new(workspace.path().to_path_buf(), base, Arc::new(ShellWrapper));
        let mut options = ExecuteOptions::default();
        options
            .env
            .insert("SANDBOX_MARKER".to_string(), "override".to_string());
        let result = manager.execute("printf \"$SANDBOX_MARKER\"", options).await;
        assert_eq!(result.stdout, "override");
    }

    #[tokio::test]
    async fn spawn_failure_is_a_structured_result() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let mut options = ExecuteOptions::default();
        options.cwd = Some(workspace.path().join("does-not-exist"));
        let result = manager.execute("true", options).await;
        assert_eq!(result.success, false);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr.is_empty(), false);
    }

    #[tokio::test]
    async fn streaming_callbacks_receive_chunks() {
        let workspace = tempdir().expect("workspace");
        let manager = manager(workspace.path());
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let mut options = ExecuteOptions::default();
        options.on_stdout = Some({
            let seen = Arc::clone(&seen);
            Arc::new(move |chunk: &str| seen.lock().push_str(chunk))
        });
        let result = manager.execute("printf streamed", options).await;
        assert_eq!(result.stdout, "streamed");
        assert_eq!(seen.lock().as_str(), "streamed");
    }
}
