//! Atomic file writes
//!
//! Content goes to a sibling `.tmp` file which is then renamed over the
//! target, so a crash leaves either the old file or the new one.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Atomically replace `path` with `content`
///
/// When `private` is set the file ends up with mode 0600 on unix.
pub fn atomic_write(path: &Path, content: &[u8], private: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = tmp_path_for(path);
    // a leftover tmp file would keep its old mode through the rename
    match std::fs::remove_file(&tmp_path) {
        Ok(()) => debug!(path = %tmp_path.display(), "Removed stale temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(e),
    }

    write_synced(&tmp_path, content, private).map_err(|e| {
        error!(path = %tmp_path.display(), error = %e, "Failed to write temp file");
        let _ = std::fs::remove_file(&tmp_path);
        e
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        error!(
            from = %tmp_path.display(),
            to = %path.display(),
            error = %e,
            "Failed to rename temp file"
        );
        let _ = std::fs::remove_file(&tmp_path);
        e
    })?;

    sync_parent(path)
}

fn write_synced(path: &Path, content: &[u8], private: bool) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if private {
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
    }
    file.write_all(content)?;
    file.sync_all()
}

/// Persist the rename itself
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(".tmp");
    path.with_file_name(name)
}
