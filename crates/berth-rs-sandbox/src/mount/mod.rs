//! Mount attachment for sandbox working directories.
//!
//! Local mounts are symlinks into the working directory; bucket mounts go
//! through FUSE tools. Every mount this crate creates is recorded in a
//! marker file so a later session can tell its own mounts apart from
//! foreign ones and never touches the latter.

mod fuse;

pub(crate) use fuse::{is_mount_point, unmount_path};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::SandboxError;
use crate::hash::sha256_hex;
use crate::types::MountResult;
use berth_rs_protocol::{MountConfig, MountState};

/// Outcome of probing a host path before mounting onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExistingMount {
    /// Nothing is attached at the path.
    NotMounted,
    /// Our mount with an identical config is already attached.
    Matching,
    /// Our mount is attached but the config differs; remount required.
    Mismatched,
    /// Something is attached that we did not create.
    Foreign,
}

#[derive(Debug, Clone)]
struct MountEntry {
    state: MountState,
    host_path: PathBuf,
}

/// Tracks attached and queued mounts for one sandbox.
pub(crate) struct MountManager {
    working_directory: PathBuf,
    marker_dir: PathBuf,
    entries: parking_lot::Mutex<HashMap<String, MountEntry>>,
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    queued: parking_lot::Mutex<Vec<(String, MountConfig)>>,
}

impl MountManager {
    pub(crate) fn new(working_directory: PathBuf, marker_dir: PathBuf) -> Self {
        Self {
            working_directory,
            marker_dir,
            entries: parking_lot::Mutex::new(HashMap::new()),
            locks: parking_lot::Mutex::new(HashMap::new()),
            queued: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Host path backing a validated virtual mount path.
    pub(crate) fn host_path_for(&self, virtual_path: &str) -> PathBuf {
        self.working_directory.join(virtual_path.trim_start_matches('/'))
    }

    /// Queue a mount for replay once the sandbox starts. The path is
    /// validated eagerly so bad input fails at the call site.
    pub(crate) fn queue_mount(
        &self,
        virtual_path: &str,
        config: &MountConfig,
    ) -> Result<MountResult, SandboxError> {
        validate_virtual_path(virtual_path)?;
        self.queued
            .lock()
            .push((virtual_path.to_string(), config.clone()));
        debug!("mount queued until start (path={virtual_path})");
        Ok(MountResult::ok(virtual_path))
    }

    /// Attach queued mounts. Failures are reported per path, never fatal.
    pub(crate) async fn replay_queued(&self) -> Vec<(String, MountResult)> {
        let queued: Vec<(String, MountConfig)> = std::mem::take(&mut *self.queued.lock());
        let mut results = Vec::with_capacity(queued.len());
        for (path, config) in queued {
            let result = match self.mount(&path, &config).await {
                Ok(result) => result,
                Err(err) => MountResult::failed(&path, err.to_string()),
            };
            if !result.success {
                warn!(
                    "queued mount failed (path={path}, error={})",
                    result.error.as_deref().unwrap_or("unknown")
                );
            }
            results.push((path, result));
        }
        results
    }

    /// Attach `config` at `virtual_path` inside the working directory.
    ///
    /// Path validation failures are returned as errors; everything else is
    /// encoded in the [`MountResult`] so callers always learn the outcome
    /// per path. Matching mounts are left alone, mismatched mounts are
    /// remounted, foreign mounts are refused.
    pub(crate) async fn mount(
        &self,
        virtual_path: &str,
        config: &MountConfig,
    ) -> Result<MountResult, SandboxError> {
        validate_virtual_path(virtual_path)?;

        if matches!(config, MountConfig::Other) {
            self.record(virtual_path, MountState::Unsupported);
            return Ok(MountResult::failed(
                virtual_path,
                "unsupported mount type".to_string(),
            ));
        }

        let lock = self.lock_for(virtual_path);
        let _guard = lock.lock().await;

        let host_path = self.host_path_for(virtual_path);
        self.record(virtual_path, MountState::Mounting);

        match self.check_existing_mount(&host_path, config).await {
            ExistingMount::Matching => {
                debug!("mount already attached (path={virtual_path})");
                self.record(virtual_path, MountState::Mounted);
                return Ok(MountResult::ok(virtual_path));
            }
            ExistingMount::Foreign => {
                self.record(virtual_path, MountState::Error);
                return Ok(MountResult::failed(
                    virtual_path,
                    SandboxError::ForeignMount(host_path).to_string(),
                ));
            }
            ExistingMount::Mismatched => {
                info!("config changed, remounting (path={virtual_path})");
                if let Err(err) = self.detach(&host_path).await {
                    self.record(virtual_path, MountState::Error);
                    return Ok(MountResult::failed(virtual_path, err.to_string()));
                }
            }
            ExistingMount::NotMounted => {}
        }

        match self.attach(&host_path, config).await {
            Ok(()) => {
                if let Err(err) = self.write_marker(&host_path, config).await {
                    // Without the marker the next ownership probe would
                    // judge our own mount foreign; undo the attach instead
                    // of reporting success.
                    warn!(
                        "marker write failed (path={}, error={err})",
                        host_path.display()
                    );
                    let _ = self.detach(&host_path).await;
                    self.record(virtual_path, MountState::Error);
                    return Ok(MountResult::failed(
                        virtual_path,
                        format!("failed to record mount ownership: {err}"),
                    ));
                }
                self.record(virtual_path, MountState::Mounted);
                info!("mounted (path={virtual_path}, type={})", config.type_name());
                Ok(MountResult::ok(virtual_path))
            }
            Err(err) if err.is_tool_missing() => {
                self.record(virtual_path, MountState::Unavailable);
                Ok(MountResult::unavailable(virtual_path, err.to_string()))
            }
            Err(err) => {
                self.record(virtual_path, MountState::Error);
                Ok(MountResult::failed(virtual_path, err.to_string()))
            }
        }
    }

    /// Detach the mount at `virtual_path`. Detaching a path that was never
    /// mounted is a no-op success.
    pub(crate) async fn unmount(&self, virtual_path: &str) -> Result<MountResult, SandboxError> {
        validate_virtual_path(virtual_path)?;

        let lock = self.lock_for(virtual_path);
        let _guard = lock.lock().await;

        let host_path = self.host_path_for(virtual_path);
        let attached =
            host_path.is_symlink() || is_mount_point(&host_path).await;
        if !attached {
            self.entries.lock().remove(virtual_path);
            self.delete_marker(&host_path).await;
            return Ok(MountResult::ok(virtual_path));
        }

        match self.detach(&host_path).await {
            Ok(()) => {
                self.entries.lock().remove(virtual_path);
                info!("unmounted (path={virtual_path})");
                Ok(MountResult::ok(virtual_path))
            }
            Err(err) => Ok(MountResult::failed(virtual_path, err.to_string())),
        }
    }

    /// Detach every tracked mount. Used on stop and destroy; failures are
    /// logged and skipped.
    pub(crate) async fn unmount_all(&self) {
        let paths: Vec<String> = self.entries.lock().keys().cloned().collect();
        for path in paths {
            match self.unmount(&path).await {
                Ok(result) if !result.success => warn!(
                    "unmount failed (path={path}, error={})",
                    result.error.as_deref().unwrap_or("unknown")
                ),
                Ok(_) => {}
                Err(err) => warn!("unmount failed (path={path}, error={err})"),
            }
        }
    }

    /// Current state of the mount at `virtual_path`, if tracked.
    pub(crate) fn state_of(&self, virtual_path: &str) -> Option<MountState> {
        self.entries.lock().get(virtual_path).map(|e| e.state)
    }

    /// Host paths of currently attached mounts.
    pub(crate) fn mounted_host_paths(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .values()
            .filter(|e| e.state == MountState::Mounted)
            .map(|e| e.host_path.clone())
            .collect()
    }

    /// Record the tracked state for a virtual path. Also used by the owning
    /// sandbox when a filesystem collaborator provides no config at all.
    pub(crate) fn record(&self, virtual_path: &str, state: MountState) {
        let host_path = self.host_path_for(virtual_path);
        self.entries
            .lock()
            .insert(virtual_path.to_string(), MountEntry { state, host_path });
    }

    fn lock_for(&self, virtual_path: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(virtual_path.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Probe what is attached at `host_path` and whether it is ours.
    async fn check_existing_mount(
        &self,
        host_path: &Path,
        config: &MountConfig,
    ) -> ExistingMount {
        if host_path.is_symlink() {
            if let MountConfig::Local { base_path } = config {
                let target = tokio::fs::read_link(host_path).await.ok();
                if target.as_deref() == Some(base_path.as_path()) {
                    return ExistingMount::Matching;
                }
                // A symlink we left behind with a stale target is ours to
                // replace; anything unmarked belongs to someone else.
                return if self.read_marker(host_path).await.is_some() {
                    ExistingMount::Mismatched
                } else {
                    ExistingMount::Foreign
                };
            }
            return self.probe_marker(host_path, config).await;
        }

        if is_mount_point(host_path).await {
            return self.probe_marker(host_path, config).await;
        }

        ExistingMount::NotMounted
    }

    /// Resolve ownership from the marker file alone: same config hash means
    /// ours and current, a different hash means ours and stale, no marker
    /// means foreign.
    async fn probe_marker(&self, host_path: &Path, config: &MountConfig) -> ExistingMount {
        match self.read_marker(host_path).await {
            Some(marker_hash) if marker_hash == config_hash(config) => ExistingMount::Matching,
            Some(_) => ExistingMount::Mismatched,
            None => ExistingMount::Foreign,
        }
    }

    /// Perform the actual attach at a path known to be unoccupied. A
    /// directory created for a FUSE attach is removed again (best-effort)
    /// when the attach fails.
    async fn attach(&self, host_path: &Path, config: &MountConfig) -> Result<(), SandboxError> {
        if let Some(parent) = host_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if host_path.is_dir() {
            let mut dir = tokio::fs::read_dir(host_path).await?;
            if dir.next_entry().await?.is_some() {
                return Err(SandboxError::MountTargetNotEmpty(host_path.to_path_buf()));
            }
        }

        match config {
            MountConfig::Local { base_path } => {
                if !base_path.exists() {
                    return Err(SandboxError::MountFailed(format!(
                        "base path does not exist: {}",
                        base_path.display()
                    )));
                }
                if host_path.is_dir() {
                    tokio::fs::remove_dir(host_path).await?;
                }
                #[cfg(unix)]
                tokio::fs::symlink(base_path, host_path).await?;
                Ok(())
            }
            MountConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
            } => {
                let created = !host_path.exists();
                tokio::fs::create_dir_all(host_path).await?;
                let attached = fuse::mount_s3(
                    bucket,
                    region.as_deref(),
                    endpoint.as_deref(),
                    access_key_id.as_deref(),
                    secret_access_key.as_deref(),
                    host_path,
                    &self.marker_dir,
                )
                .await;
                if attached.is_err() && created {
                    let _ = tokio::fs::remove_dir(host_path).await;
                }
                attached
            }
            MountConfig::Gcs { bucket, key_file } => {
                let created = !host_path.exists();
                tokio::fs::create_dir_all(host_path).await?;
                let attached = fuse::mount_gcs(bucket, key_file.as_deref(), host_path).await;
                if attached.is_err() && created {
                    let _ = tokio::fs::remove_dir(host_path).await;
                }
                attached
            }
            MountConfig::Other => Err(SandboxError::MountFailed(
                "unsupported mount type".to_string(),
            )),
        }
    }

    /// Detach whatever is at `host_path`. The marker is deleted even when
    /// the unmount itself fails, so a wedged mount is not mistaken for ours
    /// forever.
    async fn detach(&self, host_path: &Path) -> Result<(), SandboxError> {
        let result = if host_path.is_symlink() {
            tokio::fs::remove_file(host_path)
                .await
                .map_err(SandboxError::from)
        } else if is_mount_point(host_path).await {
            unmount_path(host_path).await
        } else {
            Ok(())
        };
        self.delete_marker(host_path).await;
        result
    }

    fn marker_path(&self, host_path: &Path) -> PathBuf {
        self.marker_dir
            .join(sha256_hex(&host_path.display().to_string()))
    }

    async fn write_marker(&self, host_path: &Path, config: &MountConfig) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.marker_dir).await?;
        let contents = format!("{}|{}", host_path.display(), config_hash(config));
        tokio::fs::write(self.marker_path(host_path), contents).await
    }

    /// Read the config hash recorded for `host_path`, if a marker exists.
    async fn read_marker(&self, host_path: &Path) -> Option<String> {
        let contents = tokio::fs::read_to_string(self.marker_path(host_path))
            .await
            .ok()?;
        let (recorded_path, hash) = contents.rsplit_once('|')?;
        if recorded_path == host_path.display().to_string() {
            Some(hash.to_string())
        } else {
            None
        }
    }

    async fn delete_marker(&self, host_path: &Path) {
        let _ = tokio::fs::remove_file(self.marker_path(host_path)).await;
    }
}

/// Validate a virtual mount path: absolute, a conservative character set,
/// and no `.` or `..` segments.
pub(crate) fn validate_virtual_path(path: &str) -> Result<(), SandboxError> {
    if !path.starts_with('/') {
        return Err(SandboxError::InvalidMountPath(format!(
            "mount path must be absolute: {path}"
        )));
    }
    let valid_chars = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'));
    if !valid_chars {
        return Err(SandboxError::InvalidMountPath(format!(
            "mount path contains invalid characters: {path}"
        )));
    }
    for segment in path.trim_start_matches('/').split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(SandboxError::InvalidMountPath(format!(
                "mount path contains invalid segment: {path}"
            )));
        }
    }
    Ok(())
}

/// Stable fingerprint of a mount config, recorded in marker files.
fn config_hash(config: &MountConfig) -> String {
    sha256_hex(&serde_json::to_string(config).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{MountManager, validate_virtual_path};
    use crate::error::SandboxError;
    use berth_rs_protocol::{MountConfig, MountState};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn manager(workspace: &std::path::Path, state: &std::path::Path) -> MountManager {
        MountManager::new(workspace.to_path_buf(), state.join("mounts"))
    }

    #[test]
    fn virtual_paths_are_validated() {
        assert!(validate_virtual_path("/data").is_ok());
        assert!(validate_virtual_path("/data/sub-dir_1.0").is_ok());
        for bad in ["data", "/a/../b", "/a/./b", "/a//b", "/a b", "/a\tb", "/"] {
            assert!(
                matches!(
                    validate_virtual_path(bad),
                    Err(SandboxError::InvalidMountPath(_))
                ),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn local_mount_creates_symlink_and_marker() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let source = tempdir().expect("source");
        tokio::fs::write(source.path().join("file.txt"), b"hello")
            .await
            .expect("write");

        let manager = manager(workspace.path(), state.path());
        let config = MountConfig::Local {
            base_path: source.path().to_path_buf(),
        };
        let result = manager.mount("/data", &config).await.expect("mount");
        assert_eq!(result.success, true);
        assert_eq!(manager.state_of("/data"), Some(MountState::Mounted));

        let host_path = manager.host_path_for("/data");
        assert_eq!(host_path.is_symlink(), true);
        let through = tokio::fs::read_to_string(host_path.join("file.txt"))
            .await
            .expect("read through symlink");
        assert_eq!(through, "hello");
        assert_eq!(manager.read_marker(&host_path).await.is_some(), true);
    }

    #[tokio::test]
    async fn matching_remount_is_idempotent() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let source = tempdir().expect("source");

        let manager = manager(workspace.path(), state.path());
        let config = MountConfig::Local {
            base_path: source.path().to_path_buf(),
        };
        assert_eq!(manager.mount("/data", &config).await.expect("first").success, true);
        assert_eq!(manager.mount("/data", &config).await.expect("second").success, true);
    }

    #[tokio::test]
    async fn mismatched_local_mount_is_remounted() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let first = tempdir().expect("first source");
        let second = tempdir().expect("second source");

        let manager = manager(workspace.path(), state.path());
        let old = MountConfig::Local {
            base_path: first.path().to_path_buf(),
        };
        let new = MountConfig::Local {
            base_path: second.path().to_path_buf(),
        };
        assert_eq!(manager.mount("/data", &old).await.expect("first").success, true);
        assert_eq!(manager.mount("/data", &new).await.expect("remount").success, true);

        let target = tokio::fs::read_link(manager.host_path_for("/data"))
            .await
            .expect("read link");
        assert_eq!(target, second.path());
    }

    #[tokio::test]
    async fn foreign_symlink_is_refused() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let theirs = tempdir().expect("their source");
        let ours = tempdir().expect("our source");

        let manager = manager(workspace.path(), state.path());
        let host_path = manager.host_path_for("/data");
        tokio::fs::symlink(theirs.path(), &host_path)
            .await
            .expect("foreign symlink");

        let config = MountConfig::Local {
            base_path: ours.path().to_path_buf(),
        };
        let result = manager.mount("/data", &config).await.expect("mount");
        assert_eq!(result.success, false);
        assert_eq!(
            result.error.expect("error").contains("was not created by berth"),
            true
        );
        // The foreign link is untouched.
        let target = tokio::fs::read_link(&host_path).await.expect("read link");
        assert_eq!(target, theirs.path());
    }

    #[tokio::test]
    async fn non_empty_target_is_refused() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let source = tempdir().expect("source");

        let manager = manager(workspace.path(), state.path());
        let host_path = manager.host_path_for("/data");
        tokio::fs::create_dir_all(&host_path).await.expect("mkdir");
        tokio::fs::write(host_path.join("keep.txt"), b"precious")
            .await
            .expect("write");

        let config = MountConfig::Local {
            base_path: source.path().to_path_buf(),
        };
        let result = manager.mount("/data", &config).await.expect("mount");
        assert_eq!(result.success, false);
        assert_eq!(result.error.expect("error").contains("not empty"), true);
        let kept = tokio::fs::read_to_string(host_path.join("keep.txt"))
            .await
            .expect("still there");
        assert_eq!(kept, "precious");
    }

    #[tokio::test]
    async fn unmount_removes_symlink_but_not_target() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let source = tempdir().expect("source");
        tokio::fs::write(source.path().join("file.txt"), b"hello")
            .await
            .expect("write");

        let manager = manager(workspace.path(), state.path());
        let config = MountConfig::Local {
            base_path: source.path().to_path_buf(),
        };
        manager.mount("/data", &config).await.expect("mount");
        let result = manager.unmount("/data").await.expect("unmount");
        assert_eq!(result.success, true);

        assert_eq!(manager.host_path_for("/data").exists(), false);
        assert_eq!(source.path().join("file.txt").exists(), true);
        assert_eq!(manager.state_of("/data"), None);
    }

    #[tokio::test]
    async fn unmounting_an_unmounted_path_is_a_noop() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let manager = manager(workspace.path(), state.path());
        let result = manager.unmount("/never").await.expect("unmount");
        assert_eq!(result.success, true);
    }

    #[tokio::test]
    async fn unsupported_mount_type_is_reported() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let manager = manager(workspace.path(), state.path());
        let result = manager
            .mount("/data", &MountConfig::Other)
            .await
            .expect("mount");
        assert_eq!(result.success, false);
        assert_eq!(manager.state_of("/data"), Some(MountState::Unsupported));
    }

    #[tokio::test]
    async fn missing_fuse_tool_reports_unavailable() {
        if which::which("s3fs").is_ok() {
            return;
        }
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let manager = manager(workspace.path(), state.path());
        let config = MountConfig::S3 {
            bucket: "my-bucket".to_string(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        };
        let result = manager.mount("/s3", &config).await.expect("mount");
        assert_eq!(result.success, false);
        assert_eq!(result.unavailable, true);
        assert_eq!(
            result.error.expect("error").contains("is not installed"),
            true
        );
        assert_eq!(manager.state_of("/s3"), Some(MountState::Unavailable));
        // The directory created for the attach is cleaned up again.
        assert_eq!(manager.host_path_for("/s3").exists(), false);
    }

    #[tokio::test]
    async fn failed_fuse_mount_keeps_a_preexisting_directory() {
        if which::which("s3fs").is_ok() {
            return;
        }
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let manager = manager(workspace.path(), state.path());
        let host_path = manager.host_path_for("/s3");
        tokio::fs::create_dir_all(&host_path).await.expect("mkdir");

        let config = MountConfig::S3 {
            bucket: "my-bucket".to_string(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        };
        let result = manager.mount("/s3", &config).await.expect("mount");
        assert_eq!(result.success, false);
        // Only a directory this attempt created may be removed.
        assert_eq!(host_path.is_dir(), true);
    }

    #[tokio::test]
    async fn marked_symlink_matches_non_local_config() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let source = tempdir().expect("source");

        let manager = manager(workspace.path(), state.path());
        let host_path = manager.host_path_for("/s3");
        tokio::fs::symlink(source.path(), &host_path)
            .await
            .expect("symlink");
        let config = MountConfig::S3 {
            bucket: "my-bucket".to_string(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        };
        manager
            .write_marker(&host_path, &config)
            .await
            .expect("marker");

        // An identical config hash resolves to ours-and-current, so the
        // re-mount succeeds without touching the attach tools at all.
        let result = manager.mount("/s3", &config).await.expect("mount");
        assert_eq!(result.success, true);
        assert_eq!(manager.state_of("/s3"), Some(MountState::Mounted));

        let changed = MountConfig::S3 {
            bucket: "other-bucket".to_string(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        };
        assert_eq!(
            manager.check_existing_mount(&host_path, &changed).await,
            super::ExistingMount::Mismatched
        );
    }

    #[tokio::test]
    async fn failed_marker_write_fails_the_mount() {
        let workspace = tempdir().expect("workspace");
        let state = tempdir().expect("state");
        let source = tempdir().expect("source");
        // Occupy the marker directory path with a file so marker writes
        // cannot succeed.
        std::fs::write(state.path().join("mounts"), b"blocked").expect("block marker dir");

        let manager = manager(workspace.path(), state.path());
        let config = MountConfig::Local {
            base_path: source.path().to_path_buf(),
        };
        let result = manager.mount("/data", &config).await.expect("mount");
        assert_eq!(result.success, false);
        assert_eq!(
            result.error.expect("error").contains("mount ownership"),
            true
        );
        assert_eq!(manager.state_of("/data"), Some(MountState::Error));
        // The unrecorded attach was rolled back.
        assert_eq!(manager.host_path_for("/data").is_symlink(), false);
    }
}
