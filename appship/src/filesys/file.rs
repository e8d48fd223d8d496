//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::ReleaseError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component, if any
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, ReleaseError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file contents as bytes
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ReleaseError> {
        Ok(fs::read(&self.path).await?)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ReleaseError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write string to file
    pub async fn write_string(&self, contents: &str) -> Result<(), ReleaseError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Atomic write using a temporary sibling file
    pub async fn write_atomic(&self, contents: &str) -> Result<(), ReleaseError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Copy this file into `dir`, keeping its name
    pub async fn copy_into(&self, dir: &Path) -> Result<File, ReleaseError> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| ReleaseError::NotFound(format!("No file name in {}", self.path.display())))?;
        fs::create_dir_all(dir).await?;
        let target = dir.join(name);
        fs::copy(&self.path, &target).await?;
        Ok(File::new(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_json() {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::new(tmp.path().join("nested").join("config.json"));

        assert!(!file.exists().await);
        file.write_string(r#"{"name":"App"}"#).await.unwrap();

        let value: serde_json::Value = file.read_json().await.unwrap();
        assert_eq!(value["name"], "App");
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::new(tmp.path().join("Info.plist"));

        file.write_string("old").await.unwrap();
        file.write_atomic("new").await.unwrap();

        assert_eq!(file.read_string().await.unwrap(), "new");
        assert!(!tmp.path().join("Info.tmp").exists());
    }
}
