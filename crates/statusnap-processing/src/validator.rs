//! Post-encode sanity check. Existence and size only, no container parsing.

use statusnap_core::OutputArtifact;
use std::path::Path;
use tokio::fs;

pub const DEFAULT_MIN_OUTPUT_BYTES: u64 = 1000;

#[derive(Debug, Clone, Copy)]
pub struct OutputValidator {
    min_bytes: u64,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OUTPUT_BYTES)
    }
}

impl OutputValidator {
    /// A floor of zero still rejects empty files.
    pub fn new(min_bytes: u64) -> Self {
        Self {
            min_bytes: min_bytes.max(1),
        }
    }

    pub async fn validate(&self, path: &Path) -> OutputArtifact {
        let size_bytes = match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => 0,
            Err(e) => {
                tracing::debug!(error = %e, path = %path.display(), "Encoder output missing");
                0
            }
        };

        let valid = size_bytes >= self.min_bytes;
        if !valid {
            tracing::warn!(
                path = %path.display(),
                size_bytes,
                min_bytes = self.min_bytes,
                "Encoder output failed validation"
            );
        }

        OutputArtifact {
            path: path.to_path_buf(),
            size_bytes,
            valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = OutputValidator::default()
            .validate(&temp_dir.path().join("missing.mp4"))
            .await;
        assert!(!artifact.valid);
        assert_eq!(artifact.size_bytes, 0);
    }

    #[tokio::test]
    async fn test_small_file_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiny.mp4");
        tokio::fs::write(&path, vec![0u8; 999]).await.unwrap();

        let artifact = OutputValidator::default().validate(&path).await;
        assert!(!artifact.valid);
        assert_eq!(artifact.size_bytes, 999);
    }

    #[tokio::test]
    async fn test_file_at_minimum_is_valid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ok.mp4");
        tokio::fs::write(&path, vec![0u8; 1000]).await.unwrap();

        let artifact = OutputValidator::default().validate(&path).await;
        assert!(artifact.valid);
        assert_eq!(artifact.path, path);
    }

    #[tokio::test]
    async fn test_zero_minimum_still_rejects_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.mp4");
        tokio::fs::write(&path, b"").await.unwrap();

        assert!(!OutputValidator::new(0).validate(&path).await.valid);
    }

    #[tokio::test]
    async fn test_directory_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!OutputValidator::new(1).validate(temp_dir.path()).await.valid);
    }
}
