//! Isolation backend selection, seatbelt profile generation, and native
//! command wrapping.

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::hash::short_hash;
use crate::process::WrappedCommand;
use berth_rs_protocol::IsolationBackend;

/// Policy fed into the native isolation backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeSandboxConfig {
    /// Whether confined processes may use the network.
    pub allow_network: bool,
    /// Paths writable in addition to the working directory. Mounting a
    /// filesystem appends its host path here.
    pub read_write_paths: Vec<PathBuf>,
}

/// Detect the native sandboxing mechanism available on this host.
pub fn detect_isolation() -> IsolationBackend {
    if cfg!(target_os = "macos") {
        return IsolationBackend::Seatbelt;
    }
    if cfg!(target_os = "linux") && which::which("bwrap").is_ok() {
        return IsolationBackend::Bwrap;
    }
    IsolationBackend::None
}

/// Authoritative availability check, used both for detection and for
/// constructor validation.
pub fn is_isolation_available(backend: IsolationBackend) -> bool {
    match backend {
        IsolationBackend::None => true,
        IsolationBackend::Seatbelt => cfg!(target_os = "macos"),
        IsolationBackend::Bwrap => {
            cfg!(target_os = "linux") && which::which("bwrap").is_ok()
        }
    }
}

/// Generate a seatbelt policy: deny everything, allow reads of the whole
/// filesystem, and restrict writes to the working directory, the configured
/// extra read-write paths, and standard temp locations.
pub fn generate_seatbelt_profile(working_directory: &Path, config: &NativeSandboxConfig) -> String {
    let mut profile = String::new();
    profile.push_str("(version 1)\n");
    profile.push_str("(deny default)\n");
    profile.push_str("(allow file-read*)\n");
    profile.push_str("(allow process-exec)\n");
    profile.push_str("(allow process-fork)\n");
    profile.push_str("(allow signal (target same-sandbox))\n");
    profile.push_str("(allow sysctl-read)\n");
    profile.push_str(&format!(
        "(allow file-write* (subpath \"{}\"))\n",
        working_directory.display()
    ));
    for path in &config.read_write_paths {
        profile.push_str(&format!(
            "(allow file-write* (subpath \"{}\"))\n",
            path.display()
        ));
    }
    for temp in ["/tmp", "/private/tmp", "/var/folders", "/private/var/folders", "/dev"] {
        profile.push_str(&format!("(allow file-write* (subpath \"{temp}\"))\n"));
    }
    if config.allow_network {
        profile.push_str("(allow network*)\n");
    }
    profile
}

/// Deterministic filename for a generated seatbelt profile, derived from the
/// working directory and the native config.
pub fn profile_file_name(working_directory: &Path, config: &NativeSandboxConfig) -> String {
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let fingerprint = short_hash(&format!("{}|{config_json}", working_directory.display()));
    format!("{fingerprint}.sb")
}

/// Everything needed to wrap one command for the active backend.
#[derive(Debug)]
pub struct WrapContext<'a> {
    /// Backend the command runs under.
    pub backend: IsolationBackend,
    /// Sandbox working directory.
    pub workspace_path: &'a Path,
    /// Current seatbelt profile text; regenerated in memory when the
    /// read-write allow-list changes.
    pub profile: Option<&'a str>,
    /// Native policy, read live on every wrap so a path added mid-session
    /// takes effect on the very next command.
    pub config: &'a NativeSandboxConfig,
}

/// Wrap a shell command line for execution under `ctx.backend`.
///
/// Without isolation the command runs through `sh -c` so the shell parses
/// the string; seatbelt passes the profile text inline; bwrap rebuilds its
/// argv from the current config on every call (no caching).
pub fn wrap_command(command: &str, ctx: &WrapContext<'_>) -> WrappedCommand {
    match ctx.backend {
        IsolationBackend::None => WrappedCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), command.to_string()],
        },
        IsolationBackend::Seatbelt => {
            let profile = match ctx.profile {
                Some(text) => text.to_string(),
                None => generate_seatbelt_profile(ctx.workspace_path, ctx.config),
            };
            WrappedCommand {
                program: "sandbox-exec".to_string(),
                args: vec![
                    "-p".to_string(),
                    profile,
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    command.to_string(),
                ],
            }
        }
        IsolationBackend::Bwrap => {
            let mut args: Vec<String> = vec![
                "--die-with-parent".to_string(),
                "--new-session".to_string(),
                "--unshare-ipc".to_string(),
                "--unshare-uts".to_string(),
                "--unshare-pid".to_string(),
                "--ro-bind".to_string(),
                "/".to_string(),
                "/".to_string(),
                "--proc".to_string(),
                "/proc".to_string(),
                "--dev".to_string(),
                "/dev".to_string(),
                "--tmpfs".to_string(),
                "/tmp".to_string(),
            ];
            if !ctx.config.allow_network {
                args.push("--unshare-net".to_string());
            }
            bind_if_exists(&mut args, "--bind", ctx.workspace_path, ctx.workspace_path);
            for path in &ctx.config.read_write_paths {
                bind_if_exists(&mut args, "--bind", path, path);
            }
            args.push("--chdir".to_string());
            args.push(ctx.workspace_path.display().to_string());
            args.push("--".to_string());
            args.push("/bin/sh".to_string());
            args.push("-c".to_string());
            args.push(command.to_string());
            debug!("bwrap argv built (args_len={})", args.len());
            WrappedCommand {
                program: "bwrap".to_string(),
                args,
            }
        }
    }
}

/// Add bind mount args if the source exists.
fn bind_if_exists(args: &mut Vec<String>, flag: &str, source: &Path, target: &Path) {
    if source.exists() {
        args.push(flag.to_string());
        args.push(source.display().to_string());
        args.push(target.display().to_string());
    }
}
