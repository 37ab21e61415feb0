//! Local configuration file helpers.
//!
//! One file per application at `<conf_dir>/<app>.conf`. Replacement is
//! backup-then-write: the old file is renamed with a unix-epoch suffix,
//! then the new content lands via temp-file + rename so the fresh file
//! appears atomically.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::AgentError;

const CONF_MODE: u32 = 0o640;

/// Path of the config file for `app_name`.
pub fn conf_path(conf_dir: &Path, app_name: &str) -> PathBuf {
    conf_dir.join(format!("{app_name}.conf"))
}

/// Whether `path` exists. The path must be absolute.
pub fn exists(path: &Path) -> Result<bool, AgentError> {
    ensure_absolute(path)?;
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read the whole file as UTF-8 text.
pub fn read(path: &Path) -> Result<String, AgentError> {
    ensure_absolute(path)?;
    Ok(fs::read_to_string(path)?)
}

/// Write `content`, creating the file with mode 0640. The content is
/// staged in a sibling temp file and renamed into place.
pub fn write(path: &Path, content: &str) -> Result<(), AgentError> {
    ensure_absolute(path)?;
    let tmp = path.with_extension("conf.tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(CONF_MODE)
        .open(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Rename `path` to `<path>.<unix-epoch-seconds>` and return the backup
/// path.
pub fn backup(path: &Path) -> Result<PathBuf, AgentError> {
    if !exists(path)? {
        return Err(AgentError::FileIo(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("cannot back up missing file {}", path.display()),
        )));
    }
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut backup_path = path.as_os_str().to_owned();
    backup_path.push(format!(".{epoch}"));
    let backup_path = PathBuf::from(backup_path);
    fs::rename(path, &backup_path)?;
    Ok(backup_path)
}

/// Content equality by sha256 digest. Empty equals empty.
pub fn content_eq(a: &str, b: &str) -> bool {
    if a.is_empty() && b.is_empty() {
        return true;
    }
    content_hash(a) == content_hash(b)
}

/// Hex sha256 digest of `content`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)
}

fn ensure_absolute(path: &Path) -> Result<(), AgentError> {
    if !path.is_absolute() {
        return Err(AgentError::InvalidParameter(format!(
            "file path must be absolute: {}",
            path.display()
        )));
    }
    Ok(())
}
