use crate::error::{Result, RotalogError};
use chrono::{DateTime, TimeZone};
use std::path::{Component, Path, PathBuf};

/// strftime pattern of the suffix appended to physical log files
pub const TIME_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

const LOG_EXTENSION: &str = ".log";

/// Format `now` as a 14-digit `YYYYMMDDHHMMSS` suffix
pub fn time_suffix<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(TIME_SUFFIX_FORMAT).to_string()
}

/// Name of the physical file backing `logical` at time `now`
///
/// `/var/log/app.log` at 2024-01-02 03:04:05 becomes `app-20240102030405.log`.
pub fn physical_name<Tz: TimeZone>(logical: &Path, now: &DateTime<Tz>) -> Result<String>
where
    Tz::Offset: std::fmt::Display,
{
    let filename = logical
        .file_name()
        .ok_or_else(|| {
            RotalogError::InvalidPath(format!("{} has no file name", logical.display()))
        })?
        .to_string_lossy();
    let base = filename.strip_suffix(LOG_EXTENSION).unwrap_or(&*filename);

    Ok(format!("{}-{}{}", base, time_suffix(now), LOG_EXTENSION))
}

/// Make `path` absolute and remove `.` and `..` components lexically
pub fn absolute_clean(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(RotalogError::InvalidPath(
            "path to logfile is required".to_string(),
        ));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    Ok(cleaned)
}
