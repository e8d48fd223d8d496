//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::ReleaseError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), ReleaseError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    /// Recursively find files whose extension matches `extension` (case-insensitive)
    pub async fn find_files(&self, extension: &str) -> Result<Vec<PathBuf>, ReleaseError> {
        let mut found = Vec::new();
        let mut pending = vec![self.path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
                {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    /// Copy the whole tree into `target`, overwriting files that already exist there
    pub async fn copy_into(&self, target: &Dir) -> Result<u64, ReleaseError> {
        let mut copied = 0;
        let mut pending = vec![(self.path.clone(), target.path.clone())];

        while let Some((from, to)) = pending.pop() {
            fs::create_dir_all(&to).await?;
            let mut entries = fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                let destination = to.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), destination));
                } else {
                    fs::copy(entry.path(), &destination).await?;
                    copied += 1;
                }
            }
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_into_overwrites_and_recurses() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Dir::new(tmp.path().join("src"));
        let target = Dir::new(tmp.path().join("dst"));

        source.file("icon.png").write_string("new-icon").await.unwrap();
        source.subdir("values").file("colors.xml").write_string("<resources/>").await.unwrap();
        target.file("icon.png").write_string("old-icon").await.unwrap();
        target.file("keep.txt").write_string("kept").await.unwrap();

        let copied = source.copy_into(&target).await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(target.file("icon.png").read_string().await.unwrap(), "new-icon");
        assert!(target.subdir("values").file("colors.xml").exists().await);
        assert!(target.file("keep.txt").exists().await);
    }

    #[tokio::test]
    async fn test_find_files_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Dir::new(tmp.path());

        root.subdir("bin").file("App-Signed.APK").write_string("x").await.unwrap();
        root.file("build.log").write_string("x").await.unwrap();

        let found = root.find_files("apk").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("bin/App-Signed.APK"));
    }
}
