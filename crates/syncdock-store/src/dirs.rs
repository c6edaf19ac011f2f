use crate::StoreError;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Make sure `dir` exists with permission bits `mode`.
///
/// Missing ancestors are created. An existing directory is accepted
/// whatever its mode, and then corrected. Failing to read the directory back
/// or to change its mode is logged and tolerated: some filesystems support
/// neither, and whatever consumes the directory next will report a real
/// problem.
pub fn ensure_dir(dir: &Path, mode: u32) -> Result<(), StoreError> {
    create_all(dir, mode)?;

    match fs::metadata(dir) {
        Ok(meta) => correct_mode(dir, &meta, mode),
        Err(e) => {
            debug!("cannot stat {} after creating it: {e}", dir.display());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_all(dir: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_all(dir: &Path, _mode: u32) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(unix)]
fn correct_mode(dir: &Path, meta: &fs::Metadata, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let current = meta.permissions().mode() & 0o777;
    if current != mode {
        debug!(
            "correcting mode of {} from {current:o} to {mode:o}",
            dir.display()
        );
        if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(mode)) {
            warn!("failed to set mode {mode:o} on {}: {e}", dir.display());
        }
    }
}

#[cfg(not(unix))]
fn correct_mode(_dir: &Path, _meta: &fs::Metadata, _mode: u32) {}
