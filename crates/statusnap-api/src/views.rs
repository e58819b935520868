//! HTML page rendering with Handlebars
//!
//! Every response of the form flow (initial form, success, size warning, error) is the same
//! page with a different notice. The template is compiled into the binary and registered
//! once; Handlebars escapes all interpolated values.

use handlebars::Handlebars;
use serde::Serialize;
use statusnap_core::{Config, OutputArtifact};
use std::sync::OnceLock;

const INDEX_TEMPLATE_NAME: &str = "index";
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html.hbs");

/// Served if the template itself fails to render.
const FALLBACK_PAGE: &str =
    "<!DOCTYPE html><html><body><p>Error processing video. Try again!</p></body></html>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Notice {
    Success,
    Warning,
    Error,
}

/// Upload limits shown under the form.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormLimits {
    pub max_upload_mb: u64,
    pub max_duration_secs: u32,
}

impl From<&Config> for FormLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_upload_mb: config.max_upload_mb(),
            max_duration_secs: config.max_output_duration_secs,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub notice: Option<Notice>,
    pub message: Option<String>,
    pub download_url: Option<String>,
    pub file_name: Option<String>,
    pub size_mb: Option<String>,
    pub limits: Option<FormLimits>,
}

impl Page {
    /// The bare upload form.
    pub fn form(limits: FormLimits) -> Self {
        Self {
            limits: Some(limits),
            ..Default::default()
        }
    }

    /// Result page for a delivered artifact. Artifacts above `warning_bytes` still get
    /// their download link, with a size warning instead of the success message.
    pub fn delivered(artifact: &OutputArtifact, file_name: &str, warning_bytes: u64) -> Self {
        let size_mb = format!("{:.2}", artifact.size_mb());
        let (notice, message) = if artifact.exceeds(warning_bytes) {
            (
                Notice::Warning,
                format!(
                    "File size ({}MB) is large. WhatsApp may compress it further.",
                    size_mb
                ),
            )
        } else {
            (Notice::Success, "Video processed successfully!".to_string())
        };

        Self {
            notice: Some(notice),
            message: Some(message),
            download_url: Some(format!("/download/{}", file_name)),
            file_name: Some(file_name.to_string()),
            size_mb: Some(size_mb),
            limits: None,
        }
    }

    /// Error page: the form again with a plain-language message and no link.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            notice: Some(Notice::Error),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, limits: FormLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn render(&self) -> String {
        match registry().render(INDEX_TEMPLATE_NAME, self) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render page");
                FALLBACK_PAGE.to_string()
            }
        }
    }
}

fn registry() -> &'static Handlebars<'static> {
    static REGISTRY: OnceLock<Handlebars<'static>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut handlebars = Handlebars::new();
        if let Err(e) = handlebars.register_template_string(INDEX_TEMPLATE_NAME, INDEX_TEMPLATE) {
            tracing::error!(error = %e, "Failed to register page template");
        }
        handlebars
    })
}
