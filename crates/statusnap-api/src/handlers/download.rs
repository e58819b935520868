//! Artifact download. The file is deleted a grace period after its response body was
//! streamed completely.

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use futures::StreamExt;
use statusnap_core::AppError;
use statusnap_processing::TempFileStore;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Schedules deletion of a delivered artifact when dropped, once the whole file was sent.
///
/// Carried inside the response body stream. A HEAD request or an aborted download drops it
/// early; the artifact then stays for another attempt and the janitor removes it later.
struct ReleaseAfterDownload {
    store: TempFileStore,
    path: PathBuf,
    grace: Duration,
    size_bytes: u64,
    sent_bytes: u64,
}

impl ReleaseAfterDownload {
    fn record(&mut self, chunk: &io::Result<Bytes>) {
        if let Ok(bytes) = chunk {
            self.sent_bytes += bytes.len() as u64;
        }
    }

    fn completed(&self) -> bool {
        self.sent_bytes >= self.size_bytes
    }
}

impl Drop for ReleaseAfterDownload {
    fn drop(&mut self) {
        if !self.completed() {
            tracing::debug!(
                path = %self.path.display(),
                sent_bytes = self.sent_bytes,
                size_bytes = self.size_bytes,
                "Download incomplete, keeping artifact"
            );
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path = %self.path.display(), "No runtime to schedule artifact cleanup");
            return;
        };

        let store = self.store.clone();
        let path = std::mem::take(&mut self.path);
        let grace = self.grace;
        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            if store.release(&path).await {
                tracing::debug!(path = %path.display(), "Downloaded artifact removed");
            }
        });
    }
}

#[tracing::instrument(skip(state), fields(operation = "download"))]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let path = state
        .store
        .resolve_output(&filename)
        .ok_or_else(|| AppError::NotFound(format!("Rejected download name: {}", filename)))?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            AppError::NotFound(format!("Artifact not found: {}", filename))
        } else {
            AppError::Internal(format!("Failed to open artifact: {}", e))
        }
    })?;
    let size_bytes = file.metadata().await.map_err(AppError::from)?.len();

    tracing::debug!(path = %path.display(), size_bytes, "Streaming artifact");

    let mut guard = ReleaseAfterDownload {
        store: state.store.clone(),
        path,
        grace: state.config.download_grace(),
        size_bytes,
        sent_bytes: 0,
    };
    let body_stream = ReaderStream::new(file).map(move |chunk| {
        guard.record(&chunk);
        chunk
    });

    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, size_bytes)
        .header(header::CONTENT_DISPOSITION, content_disposition.as_str())
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statusnap_processing::FileKind;
    use tempfile::TempDir;

    async fn artifact(store: &TempFileStore) -> PathBuf {
        store.ensure_dirs().await.unwrap();
        let path = store.allocate(FileKind::Output);
        tokio::fs::write(&path, vec![7u8; 2048]).await.unwrap();
        path
    }

    fn release_guard(store: &TempFileStore, path: &std::path::Path) -> ReleaseAfterDownload {
        ReleaseAfterDownload {
            store: store.clone(),
            path: path.to_path_buf(),
            grace: Duration::ZERO,
            size_bytes: 2048,
            sent_bytes: 0,
        }
    }

    #[tokio::test]
    async fn test_complete_download_releases_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = TempFileStore::rooted_at(temp_dir.path());
        let path = artifact(&store).await;

        let mut guard = release_guard(&store, &path);
        guard.record(&Ok(Bytes::from(vec![0u8; 2048])));
        drop(guard);

        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_partial_download_keeps_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = TempFileStore::rooted_at(temp_dir.path());
        let path = artifact(&store).await;

        let mut guard = release_guard(&store, &path);
        guard.record(&Ok(Bytes::from(vec![0u8; 1024])));
        guard.record(&Err(io::Error::other("connection reset")));
        drop(guard);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(path.exists());
    }
}
