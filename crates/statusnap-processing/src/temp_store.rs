//! Temporary file bookkeeping for uploads, intermediate encodes and final outputs.
//!
//! Every path handed out is unique (millisecond timestamp plus a random suffix), so
//! concurrent requests never collide and each job exclusively owns what it allocates.
//! Deletion is best-effort: failures are logged and never propagated.

use chrono::Utc;
use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::fs;
use uuid::Uuid;

const OUTPUT_PREFIX: &str = "StatusSnap";

/// What a temp path is used for; decides its directory and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Raw bytes received from the client.
    Upload,
    /// Encoder output that still has to pass through another step.
    Intermediate,
    /// Deliverable artifact served from the download route.
    Output,
}

/// Build a unique file name from a prefix, the current time and a random suffix.
pub fn unique_file_name(prefix: &str, extension: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}{}",
        prefix,
        Utc::now().timestamp_millis(),
        &suffix[..8],
        extension
    )
}

/// Clones share the set of held paths.
#[derive(Debug, Clone)]
pub struct TempFileStore {
    upload_dir: PathBuf,
    work_dir: PathBuf,
    output_dir: PathBuf,
    /// Paths owned by a job in progress; never swept.
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl TempFileStore {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Store rooted at a single directory with `uploads/`, `work/` and `output/` inside.
    pub fn rooted_at(root: &Path) -> Self {
        Self::new(root.join("uploads"), root.join("work"), root.join("output"))
    }

    /// Create all working directories. Safe to call repeatedly and concurrently.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        for dir in self.dirs() {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn dirs(&self) -> [&Path; 3] {
        [&self.upload_dir, &self.work_dir, &self.output_dir]
    }

    fn held_paths(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Protect a path from [`sweep_stale`](Self::sweep_stale) until it is released or
    /// [`unhold`](Self::unhold) is called.
    pub fn hold(&self, path: &Path) {
        self.held_paths().insert(path.to_path_buf());
    }

    pub fn unhold(&self, path: &Path) {
        self.held_paths().remove(path);
    }

    pub fn is_held(&self, path: &Path) -> bool {
        self.held_paths().contains(path)
    }

    /// Allocate a fresh, unused path for the given kind. Nothing is created on disk.
    pub fn allocate(&self, kind: FileKind) -> PathBuf {
        match kind {
            FileKind::Upload => self.upload_dir.join(unique_file_name("upload", ".bin")),
            FileKind::Intermediate => self.work_dir.join(unique_file_name("encode", ".mp4")),
            FileKind::Output => self.output_dir.join(unique_file_name(OUTPUT_PREFIX, ".mp4")),
        }
    }

    /// Delete a file if it exists and drop any hold on it. Returns whether a file was removed.
    pub async fn release(&self, path: &Path) -> bool {
        self.unhold(path);
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Released temp file");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to delete temp file"
                );
                false
            }
        }
    }

    /// Map a client-supplied download name to a path inside the output directory.
    ///
    /// Only a single normal path component is accepted, so `..`, absolute paths and
    /// nested names never resolve.
    pub fn resolve_output(&self, file_name: &str) -> Option<PathBuf> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return None;
        }

        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Some(self.output_dir.join(name)),
            _ => None,
        }
    }

    /// Delete files older than `max_age` from every working directory, skipping held paths.
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0usize;

        for dir in self.dirs() {
            let mut entries = match fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(error = %e, dir = %dir.display(), "Failed to list temp directory");
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, dir = %dir.display(), "Failed to read directory entry");
                        break;
                    }
                };

                let Ok(metadata) = entry.metadata().await else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }

                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();

                let path = entry.path();
                if self.is_held(&path) {
                    continue;
                }
                if age >= max_age && self.release(&path).await {
                    removed += 1;
                }
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_unique_file_name_shape() {
        let name = unique_file_name("StatusSnap", ".mp4");
        assert!(name.starts_with("StatusSnap-"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.split('-').count(), 3);
    }

    #[test]
    fn test_allocate_never_collides() {
        let store = TempFileStore::rooted_at(Path::new("/tmp/statusnap-test"));
        let paths: HashSet<PathBuf> = (0..1000).map(|_| store.allocate(FileKind::Output)).collect();
        assert_eq!(paths.len(), 1000);
    }

    #[test]
    fn test_allocate_uses_kind_directory() {
        let store = TempFileStore::new("/u", "/w", "/o");
        assert!(store.allocate(FileKind::Upload).starts_with("/u"));
        assert!(store.allocate(FileKind::Intermediate).starts_with("/w"));
        let output = store.allocate(FileKind::Output);
        assert!(output.starts_with("/o"));
        assert!(output
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("StatusSnap-")));
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = TempFileStore::rooted_at(temp_dir.path());

        store.ensure_dirs().await.unwrap();
        store.ensure_dirs().await.unwrap();

        assert!(temp_dir.path().join("uploads").is_dir());
        assert!(temp_dir.path().join("work").is_dir());
        assert!(temp_dir.path().join("output").is_dir());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = TempFileStore::rooted_at(temp_dir.path());
        store.ensure_dirs().await.unwrap();

        let path = store.allocate(FileKind::Upload);
        tokio::fs::write(&path, b"data").await.unwrap();

        assert!(store.release(&path).await);
        assert!(!path.exists());
        assert!(!store.release(&path).await);
    }

    #[test]
    fn test_resolve_output_rejects_traversal() {
        let store = TempFileStore::new("/u", "/w", "/o");
        assert_eq!(
            store.resolve_output("StatusSnap-1-abcd.mp4"),
            Some(PathBuf::from("/o/StatusSnap-1-abcd.mp4"))
        );
        assert_eq!(store.resolve_output(""), None);
        assert_eq!(store.resolve_output(".."), None);
        assert_eq!(store.resolve_output("../etc/passwd"), None);
        assert_eq!(store.resolve_output("/etc/passwd"), None);
        assert_eq!(store.resolve_output("a/b.mp4"), None);
        assert_eq!(store.resolve_output("..\\secret"), None);
    }

    #[tokio::test]
    async fn test_sweep_stale_removes_old_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let store = TempFileStore::rooted_at(temp_dir.path());
        store.ensure_dirs().await.unwrap();

        let upload = store.allocate(FileKind::Upload);
        let output = store.allocate(FileKind::Output);
        tokio::fs::write(&upload, b"a").await.unwrap();
        tokio::fs::write(&output, b"b").await.unwrap();

        assert_eq!(store.sweep_stale(Duration::from_secs(3600)).await, 0);
        assert!(upload.exists());

        assert_eq!(store.sweep_stale(Duration::ZERO).await, 2);
        assert!(!upload.exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_sweep_skips_held_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = TempFileStore::rooted_at(temp_dir.path());
        store.ensure_dirs().await.unwrap();

        let in_flight = store.allocate(FileKind::Upload);
        let abandoned = store.allocate(FileKind::Output);
        tokio::fs::write(&in_flight, b"a").await.unwrap();
        tokio::fs::write(&abandoned, b"b").await.unwrap();
        store.clone().hold(&in_flight);

        assert_eq!(store.sweep_stale(Duration::ZERO).await, 1);
        assert!(in_flight.exists());
        assert!(!abandoned.exists());

        assert!(store.release(&in_flight).await);
        assert!(!store.is_held(&in_flight));
    }
}
