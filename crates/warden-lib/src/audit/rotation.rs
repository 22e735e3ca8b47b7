//! Size-based rotation of the primary log file

use crate::error::AuditError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const ROTATED_PREFIX: &str = "warden-";
const ROTATED_SUFFIX: &str = ".log";

/// Rotate `log_path` if it has grown past `max_bytes`, then keep only the
/// newest `keep` rotated files. Returns the rotated file, if any.
pub(crate) async fn rotate_if_needed(
    dir: &Path,
    log_path: &Path,
    max_bytes: u64,
    keep: usize,
) -> Result<Option<PathBuf>, AuditError> {
    let size = match fs::metadata(log_path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AuditError::io(log_path, e)),
    };
    if size <= max_bytes {
        return Ok(None);
    }

    let target = free_rotated_name(dir, Utc::now()).await;
    fs::rename(log_path, &target)
        .await
        .map_err(|e| AuditError::io(log_path, e))?;
    info!(from = %log_path.display(), to = %target.display(), size, "Rotated audit log");

    for removed in prune_rotated(dir, keep).await? {
        debug!(path = %removed.display(), "Deleted old rotated log");
    }

    Ok(Some(target))
}

/// Rotated logs in `dir`, oldest first
pub(crate) async fn list_rotated(dir: &Path) -> Result<Vec<PathBuf>, AuditError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AuditError::io(dir, e)),
    };

    let mut rotated = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| AuditError::io(dir, e))? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(ROTATED_PREFIX) && name.ends_with(ROTATED_SUFFIX) {
            rotated.push(entry.path());
        }
    }

    // Timestamp suffixes sort chronologically.
    rotated.sort();
    Ok(rotated)
}

async fn prune_rotated(dir: &Path, keep: usize) -> Result<Vec<PathBuf>, AuditError> {
    let rotated = list_rotated(dir).await?;
    let excess = rotated.len().saturating_sub(keep);

    let mut removed = Vec::with_capacity(excess);
    for path in rotated.into_iter().take(excess) {
        fs::remove_file(&path)
            .await
            .map_err(|e| AuditError::io(&path, e))?;
        removed.push(path);
    }
    Ok(removed)
}

fn rotated_name(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "{}{}{}",
        ROTATED_PREFIX,
        at.format("%Y%m%d-%H%M%S%3f"),
        ROTATED_SUFFIX
    ))
}

/// First unused rotated name at or after `at`, stepping by a millisecond
async fn free_rotated_name(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut at = at;
    loop {
        let candidate = rotated_name(dir, at);
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        at += ChronoDuration::milliseconds(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_rotated_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = rotated_name(Path::new("/data"), at);
        assert_eq!(name, PathBuf::from("/data/warden-20240309-140507000.log"));
    }

    #[tokio::test]
    async fn test_small_file_is_not_rotated() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("warden.log");
        std::fs::write(&log, "short\n").unwrap();

        let rotated = rotate_if_needed(dir.path(), &log, 1024, 10).await.unwrap();
        assert!(rotated.is_none());
        assert!(log.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("warden.log");
        assert!(rotate_if_needed(dir.path(), &log, 0, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_millisecond_rotations_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        std::fs::write(rotated_name(dir.path(), at), "").unwrap();

        let next = free_rotated_name(dir.path(), at).await;
        assert_eq!(next, dir.path().join("warden-20240101-000000001.log"));
    }

    #[tokio::test]
    async fn test_list_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("warden.log"), "").unwrap();
        std::fs::write(dir.path().join("metrics.json"), "{}").unwrap();
        std::fs::write(dir.path().join("warden-20240102-000000000.log"), "").unwrap();
        std::fs::write(dir.path().join("warden-20240101-000000000.log"), "").unwrap();

        let rotated = list_rotated(dir.path()).await.unwrap();
        assert_eq!(rotated.len(), 2);
        assert!(rotated[0].ends_with("warden-20240101-000000000.log"));
    }
}
