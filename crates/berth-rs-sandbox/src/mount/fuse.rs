//! FUSE tool plumbing: mountpoint probing, unmount fallback chains, and the
//! s3fs / gcsfuse invocations behind bucket mounts.

use log::{debug, warn};
use std::path::Path;
use tokio::process::Command;

use crate::error::SandboxError;

/// Check whether `path` is an active OS mount point.
///
/// On Linux the mount table is read directly; elsewhere (and as a fallback)
/// the `mount` listing is scanned.
pub async fn is_mount_point(path: &Path) -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(table) = tokio::fs::read_to_string("/proc/self/mounts").await {
            let needle = escape_mount_entry(path);
            return table
                .lines()
                .filter_map(|line| line.split_whitespace().nth(1))
                .any(|target| target == needle);
        }
    }
    match Command::new("mount").output().await {
        Ok(output) => {
            let listing = String::from_utf8_lossy(&output.stdout);
            let needle = format!(" on {} ", path.display());
            listing.lines().any(|line| line.contains(&needle))
        }
        Err(err) => {
            warn!("mount listing failed (error={err})");
            false
        }
    }
}

/// Encode a path the way the kernel mount table does.
#[cfg(target_os = "linux")]
fn escape_mount_entry(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\134")
        .replace(' ', "\\040")
        .replace('\t', "\\011")
        .replace('\n', "\\012")
}

/// Unmount `path`, walking the platform's fallback chain until one tool
/// succeeds. Returns the last tool's stderr when every attempt fails.
pub async fn unmount_path(path: &Path) -> Result<(), SandboxError> {
    let target = path.display().to_string();
    let attempts: &[(&str, &[&str])] = if cfg!(target_os = "macos") {
        &[("umount", &[]), ("diskutil", &["unmount"])]
    } else {
        &[("fusermount", &["-u"]), ("umount", &[]), ("umount", &["-l"])]
    };

    let mut last_error = String::new();
    for (tool, flags) in attempts {
        if which::which(tool).is_err() {
            continue;
        }
        let output = Command::new(tool)
            .args(*flags)
            .arg(&target)
            .output()
            .await?;
        if output.status.success() {
            debug!("unmounted (path={target}, tool={tool})");
            return Ok(());
        }
        last_error = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("unmount attempt failed (path={target}, tool={tool}, error={last_error})");
    }

    Err(SandboxError::MountFailed(format!(
        "failed to unmount {target}: {last_error}"
    )))
}

/// Validate a bucket name before handing it to a mount tool.
pub fn validate_bucket_name(bucket: &str) -> Result<(), SandboxError> {
    let valid = !bucket.is_empty()
        && bucket.len() <= 222
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
        && bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket.ends_with(|c: char| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(SandboxError::InvalidConfig(format!(
            "invalid bucket name: {bucket}"
        )))
    }
}

/// Mount an S3 bucket at `host_path` with s3fs.
///
/// Credentials, when provided inline, are written to a passwd file under
/// `state_dir` with owner-only permissions and referenced by path.
pub async fn mount_s3(
    bucket: &str,
    region: Option<&str>,
    endpoint: Option<&str>,
    access_key_id: Option<&str>,
    secret_access_key: Option<&str>,
    host_path: &Path,
    state_dir: &Path,
) -> Result<(), SandboxError> {
    which::which("s3fs").map_err(|_| SandboxError::MountToolNotFound {
        tool: "s3fs".to_string(),
    })?;
    validate_bucket_name(bucket)?;

    let mut command = Command::new("s3fs");
    command.arg(bucket).arg(host_path);

    if let (Some(key), Some(secret)) = (access_key_id, secret_access_key) {
        let passwd_path = state_dir.join(format!(
            "s3fs-passwd-{}",
            crate::hash::short_hash(&format!("{bucket}|{key}"))
        ));
        tokio::fs::create_dir_all(state_dir).await?;
        tokio::fs::write(&passwd_path, format!("{key}:{secret}\n")).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&passwd_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        command.arg("-o").arg(format!("passwd_file={}", passwd_path.display()));
    }
    if let Some(region) = region {
        command.arg("-o").arg(format!("endpoint={region}"));
    }
    if let Some(endpoint) = endpoint {
        command.arg("-o").arg(format!("url={endpoint}"));
        command.arg("-o").arg("use_path_request_style");
    }

    let output = command.output().await?;
    if output.status.success() {
        debug!("s3 bucket mounted (bucket={bucket}, path={})", host_path.display());
        Ok(())
    } else {
        Err(SandboxError::MountFailed(format!(
            "s3fs failed for bucket {bucket}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Mount a GCS bucket at `host_path` with gcsfuse.
pub async fn mount_gcs(
    bucket: &str,
    key_file: Option<&Path>,
    host_path: &Path,
) -> Result<(), SandboxError> {
    which::which("gcsfuse").map_err(|_| SandboxError::MountToolNotFound {
        tool: "gcsfuse".to_string(),
    })?;
    validate_bucket_name(bucket)?;

    let mut command = Command::new("gcsfuse");
    if let Some(key_file) = key_file {
        command.arg("--key-file").arg(key_file);
    }
    command.arg(bucket).arg(host_path);

    let output = command.output().await?;
    if output.status.success() {
        debug!("gcs bucket mounted (bucket={bucket}, path={})", host_path.display());
        Ok(())
    } else {
        Err(SandboxError::MountFailed(format!(
            "gcsfuse failed for bucket {bucket}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{is_mount_point, validate_bucket_name};
    use crate::error::SandboxError;
    use tempfile::tempdir;

    #[test]
    fn bucket_names_are_validated() {
        assert!(validate_bucket_name("my-data.bucket_01").is_ok());
        assert!(matches!(
            validate_bucket_name(""),
            Err(SandboxError::InvalidConfig(_))
        ));
        assert!(matches!(
            validate_bucket_name("Bad Bucket"),
            Err(SandboxError::InvalidConfig(_))
        ));
        assert!(matches!(
            validate_bucket_name("-leading"),
            Err(SandboxError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn plain_directory_is_not_a_mount_point() {
        let dir = tempdir().expect("tempdir");
        assert!(!is_mount_point(dir.path()).await);
    }

    #[tokio::test]
    async fn filesystem_root_is_a_mount_point() {
        assert!(is_mount_point(std::path::Path::new("/")).await);
    }
}
