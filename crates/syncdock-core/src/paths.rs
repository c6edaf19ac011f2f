use crate::CoreError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use syncdock_store::{Location, LocationSet};

/// Turn a caller-supplied directory into an absolute path.
///
/// Empty input means "no override" and yields `None`. A leading `~` is
/// expanded against `HOME`; anything still relative is joined onto the
/// current working directory.
pub fn resolve_dir(raw: &str) -> Result<Option<PathBuf>, CoreError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let expanded = expand_tilde(raw)?;
    if expanded.is_absolute() {
        return Ok(Some(expanded));
    }
    let cwd = std::env::current_dir().map_err(|e| CoreError::Path {
        path: raw.to_owned(),
        reason: format!("cannot read working directory: {e}"),
    })?;
    Ok(Some(cwd.join(expanded)))
}

fn expand_tilde(raw: &str) -> Result<PathBuf, CoreError> {
    expand_tilde_with(raw, std::env::var_os("HOME"))
}

fn expand_tilde_with(raw: &str, home: Option<OsString>) -> Result<PathBuf, CoreError> {
    let rest = match raw.strip_prefix('~') {
        Some("") => "",
        Some(rest) => match rest.strip_prefix('/') {
            Some(rest) => rest,
            None => return Ok(PathBuf::from(raw)),
        },
        None => return Ok(PathBuf::from(raw)),
    };
    let home = home
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CoreError::Path {
            path: raw.to_owned(),
            reason: "HOME is not set".to_owned(),
        })?;
    Ok(Path::new(&home).join(rest))
}

/// Apply config/data directory overrides to `locations`.
///
/// Both overrides are resolved before anything is written, so on error the
/// set is left exactly as it was.
pub fn apply_overrides(
    locations: &mut LocationSet,
    config_dir: &str,
    data_dir: &str,
) -> Result<(), CoreError> {
    let config = resolve_dir(config_dir)?;
    let data = resolve_dir(data_dir)?;

    let mut next = locations.clone();
    if let Some(dir) = config {
        next.set_base_dir(Location::ConfigBaseDir, &dir)?;
    }
    if let Some(dir) = data {
        next.set_base_dir(Location::DataBaseDir, &dir)?;
    }
    *locations = next;
    Ok(())
}
