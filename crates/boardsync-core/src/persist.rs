//! Whole-file replacement shared by the store and the caches.

use std::path::Path;

/// Write `contents` to `temp`, then rename it over `path`.
///
/// Readers see either the old file or the new one. On any failure the temp
/// file is removed before the error is returned.
pub(crate) async fn replace_file(temp: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let result = match tokio::fs::write(temp, contents).await {
        Ok(()) => tokio::fs::rename(temp, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(temp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replace_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");
        let temp = dir.path().join("record.json.tmp");
        replace_file(&temp, &path, b"one").await.unwrap();
        replace_file(&temp, &path, b"two").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"x").unwrap();
        let temp = dir.path().join("record.json.tmp");

        assert!(replace_file(&temp, &path, b"data").await.is_err());
        assert!(std::fs::symlink_metadata(&temp).is_err());
        assert!(path.is_dir());
    }

    /// A temp path that points at /dev/full fails mid-write with ENOSPC.
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_write_removes_temp() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");
        let temp = dir.path().join("record.json.tmp");
        std::os::unix::fs::symlink("/dev/full", &temp).unwrap();

        let err = replace_file(&temp, &path, b"data").await.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(28));
        assert!(std::fs::symlink_metadata(&temp).is_err());
        assert!(!path.exists());
    }
}
