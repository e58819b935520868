//! Upload form submission: receive the video, run the pipeline, render the result page.

use crate::error::HttpAppError;
use crate::state::AppState;
use crate::views::Page;
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::Html,
};
use statusnap_core::{AppError, ProfileName, TrimWindow, UploadRequest};
use statusnap_processing::FileKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Raw form fields, before validation.
#[derive(Debug, Default)]
struct UploadForm {
    source: Option<PathBuf>,
    resolution: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

impl UploadForm {
    fn into_request(self) -> Result<UploadRequest, AppError> {
        let source = self.source.ok_or(AppError::EmptyInput)?;
        let trim = TrimWindow::from_bounds(
            parse_seconds("start", self.start.as_deref())?,
            parse_seconds("end", self.end.as_deref())?,
        )?;

        let profile = ProfileName::from_request(self.resolution.as_deref());
        Ok(UploadRequest::new(source, profile).with_trim(trim))
    }
}

#[tracing::instrument(
    skip(state, multipart),
    fields(request_id = %Uuid::new_v4(), operation = "process_video")
)]
pub async fn process_video(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, HttpAppError> {
    let multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Request is not a multipart upload");
        AppError::EmptyInput
    })?;

    let form = receive_form(&state, multipart).await?;
    let source = form.source.clone();

    let request = match form.into_request() {
        Ok(request) => request,
        Err(e) => {
            if let Some(path) = source {
                state.store.release(&path).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        profile = %request.profile,
        trim = ?request.trim,
        "Processing upload"
    );

    let artifact = state.orchestrator.process(request).await?;
    let file_name = artifact
        .file_name()
        .ok_or_else(|| AppError::Internal("artifact path has no file name".to_string()))?;

    if artifact.exceeds(state.config.size_warning_bytes) {
        tracing::warn!(
            size_bytes = artifact.size_bytes,
            limit_bytes = state.config.size_warning_bytes,
            "Output exceeds the WhatsApp status size limit"
        );
    }

    let page = Page::delivered(&artifact, file_name, state.config.size_warning_bytes)
        .with_limits(state.form_limits());
    Ok(Html(page.render()))
}

/// Read all form fields, streaming the video to a fresh upload path.
/// On error, a partially written upload is released before returning.
async fn receive_form(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    if let Err(e) = read_fields(state, &mut multipart, &mut form).await {
        if let Some(path) = form.source.take() {
            state.store.release(&path).await;
        }
        return Err(e);
    }

    Ok(form)
}

async fn read_fields(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), AppError> {
    let max_bytes = state.config.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        match field_name.as_str() {
            "video" => {
                if form.source.is_some() {
                    return Err(AppError::InvalidInput(
                        "Please upload a single video.".to_string(),
                    ));
                }
                let path = state.store.allocate(FileKind::Upload);
                form.source = Some(path.clone());

                let size_bytes = save_field(field, &path, max_bytes).await?;
                tracing::debug!(size_bytes, path = %path.display(), "Upload received");
            }
            "resolution" => form.resolution = Some(read_text(field, max_bytes).await?),
            "start" => form.start = Some(read_text(field, max_bytes).await?),
            "end" => form.end = Some(read_text(field, max_bytes).await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(())
}

async fn save_field(mut field: Field<'_>, path: &Path, max_bytes: u64) -> Result<u64, AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(too_large(max_bytes));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn read_text(field: Field<'_>, max_bytes: u64) -> Result<String, AppError> {
    field.text().await.map_err(|e| multipart_error(e, max_bytes))
}

fn multipart_error(err: MultipartError, max_bytes: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large(max_bytes);
    }
    tracing::debug!(error = %err.body_text(), "Failed to read multipart body");
    AppError::InvalidInput("The upload could not be read. Try again!".to_string())
}

fn too_large(max_bytes: u64) -> AppError {
    AppError::PayloadTooLarge(format!(
        "Video is too large. The limit is {} MB.",
        max_bytes / 1024 / 1024
    ))
}

/// Parse an optional seconds field. Blank values count as absent.
fn parse_seconds(name: &str, value: Option<&str>) -> Result<Option<f64>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|_| AppError::InvalidInput(format!("Invalid {} time: {}", name, v))),
    }
}
