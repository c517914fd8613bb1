//! Utility functions for hashing, log truncation and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Content hashing for stable item ids and proxy offsets
//! - String truncation for logging
//! - Atomic file replacement for every persisted JSON file
//! - File system validation for the state directory

use sha2::{Digest, Sha256};
use std::error::Error;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Hex-encoded SHA-256 prefix (16 hex chars) of `input`.
///
/// Used as the stable [`CandidateItem`](crate::models::CandidateItem) id.
pub fn stable_id(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Deterministic index in `0..len` derived from `key`.
///
/// Returns 0 for an empty range.
pub fn stable_offset(key: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) % len as u64) as usize
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` characters with an ellipsis and
/// a dropped-character count appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}…(+{} chars)", head, count - max)
    }
}

/// A file written next to its target but not yet renamed over it.
///
/// Dropping a `StagedFile` without calling [`StagedFile::commit`] leaves the
/// target untouched; the temp file is removed on a best-effort basis.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Atomically replace the target with the staged content.
    pub async fn commit(mut self) -> std::io::Result<()> {
        fs::rename(&self.temp, &self.target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = stdfs::remove_file(&self.temp);
        }
    }
}

/// Write `bytes` to a temp file in the target's directory and fsync it.
pub async fn stage_file(target: &Path, bytes: &[u8]) -> std::io::Result<StagedFile> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let temp = target.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let mut file = fs::File::create(&temp).await?;
    let staged = StagedFile {
        temp,
        target: target.to_path_buf(),
        committed: false,
    };
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(staged)
}

/// Stage then rename: readers never observe a half-written file.
#[instrument(level = "debug", skip_all, fields(path = %target.display()))]
pub async fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let staged = stage_file(target, bytes).await?;
    staged.commit().await?;
    debug!(bytes = bytes.len(), "Atomically replaced file");
    Ok(())
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if missing, then creates and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("State directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 chars)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "ракета".repeat(10);
        let result = truncate_for_log(&s, 3);
        assert!(result.starts_with("рак"));
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        assert_eq!(stable_id("https://x.com/a"), stable_id("https://x.com/a"));
        assert_ne!(stable_id("https://x.com/a"), stable_id("https://x.com/b"));
        assert_eq!(stable_id("abc").len(), 16);
    }

    #[test]
    fn test_stable_offset_in_range() {
        for key in ["idf", "centcom", "sentdefender", "x"] {
            let o = stable_offset(key, 7);
            assert!(o < 7);
            assert_eq!(o, stable_offset(key, 7));
        }
        assert_eq!(stable_offset("any", 0), 0);
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("state.json");
        write_atomic(&target, b"[1]").await.unwrap();
        write_atomic(&target, b"[1,2]").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"[1,2]");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_stage_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("state.json");
        std::fs::write(&target, b"{\"before\":true}").unwrap();

        let staged = stage_file(&target, b"{\"after\":").await.unwrap();
        // crash before rename
        drop(staged);

        assert_eq!(std::fs::read(&target).unwrap(), b"{\"before\":true}");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
