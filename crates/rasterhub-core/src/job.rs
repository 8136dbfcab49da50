// this_file: crates/rasterhub-core/src/job.rs

//! Job-spec wire protocol.
//!
//! A job-spec document is one JSON object holding a version and a list of
//! jobs. The backend answers with one [`JobResult`] JSON line per job, in
//! any order, correlated by id.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{RenderError, Result};
use crate::limits::{
    sanitize_path, validate_text_input, SecurityError, MAX_CANVAS_DIMENSION, MAX_FONT_SIZE_PX,
    MAX_JOBS_PER_SPEC, MAX_JSON_SIZE,
};
use crate::PROTOCOL_VERSION;

/// Complete job-spec document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Protocol version (must be "1.0")
    pub version: String,
    pub jobs: Vec<Job>,
}

/// Single rendering job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique within the document; echoed back in the result
    pub id: String,
    pub font: FontConfig,
    pub text: TextConfig,
    pub rendering: RenderingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontConfig {
    pub path: Utf8PathBuf,
    /// Font size in pixels per em
    pub size: f32,
    /// Axis tag → user-space value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variations: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    pub content: String,
    /// ISO 15924 script tag, e.g. "Latn"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// "ltr", "rtl", "ttb" or "btt"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// BCP 47 language tag, e.g. "en"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Feature toggles such as "liga=0" or "-kern"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    /// Extra advance per glyph in thousandths of an em
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tracking: f32,
}

fn is_zero(v: &f32) -> bool {
    *v == 0.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderingConfig {
    /// "pgm" or "png"
    #[serde(default = "default_format")]
    pub format: String,
    /// "base64"
    #[serde(default = "default_encoding")]
    pub encoding: String,
    pub width: u32,
    pub height: u32,
}

fn default_format() -> String {
    "pgm".to_string()
}

fn default_encoding() -> String {
    "base64".to_string()
}

/// One result line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    /// "success" or "error"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering: Option<RenderingOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timing: TimingInfo,
}

/// Encoded image carried by a successful result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderingOutput {
    pub format: String,
    pub encoding: String,
    /// Base64 payload: raw pixels or a full image file
    #[serde(default, alias = "pgm_base64", skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Path of an image file written by the backend instead of inline data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Inked region as (x, y, w, h)
    #[serde(default)]
    pub actual_bbox: (u32, u32, u32, u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingInfo {
    pub shape_ms: f64,
    pub render_ms: f64,
    pub total_ms: f64,
}

impl JobSpec {
    /// Parse and validate the header of a job-spec document.
    ///
    /// Oversized input, malformed JSON, missing or mistyped fields and
    /// header violations are fatal;
    /// per-job problems are left for [`Job::validate`] so they can turn into
    /// error results.
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() > MAX_JSON_SIZE {
            return Err(ValidationError::InputTooLarge {
                size: input.len(),
                max: MAX_JSON_SIZE,
            }
            .into());
        }
        let value: serde_json::Value = serde_json::from_str(input)?;
        let spec: JobSpec = serde_json::from_value(value)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        spec.validate_header()?;
        Ok(spec)
    }

    /// Version and job count.
    pub fn validate_header(&self) -> std::result::Result<(), ValidationError> {
        if self.version != PROTOCOL_VERSION {
            return Err(ValidationError::UnsupportedVersion(self.version.clone()));
        }
        if self.jobs.is_empty() {
            return Err(ValidationError::EmptyJobList);
        }
        if self.jobs.len() > MAX_JOBS_PER_SPEC {
            return Err(ValidationError::TooManyJobs {
                count: self.jobs.len(),
                max: MAX_JOBS_PER_SPEC,
            });
        }
        Ok(())
    }

    /// Header plus every job.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.validate_header()?;
        self.jobs.iter().try_for_each(Job::validate)
    }
}

impl Job {
    /// Parse one job. Bad syntax is [`RenderError::InvalidJson`]; a
    /// well-formed value of the wrong shape is a schema error.
    pub fn parse(input: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        serde_json::from_value(value)
            .map_err(|e| ValidationError::Malformed(e.to_string()).into())
    }

    /// Per-job checks. A failure here becomes an error result for this job only.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyJobId);
        }
        let size = self.font.size;
        if !size.is_finite() || size <= 0.0 || size > MAX_FONT_SIZE_PX {
            return Err(ValidationError::InvalidFontSize(size));
        }
        if self.text.content.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        validate_text_input(&self.text.content)?;

        let (w, h) = (self.rendering.width, self.rendering.height);
        if w == 0 || h == 0 || w > MAX_CANVAS_DIMENSION || h > MAX_CANVAS_DIMENSION {
            return Err(ValidationError::InvalidCanvasDimensions {
                width: w,
                height: h,
            });
        }
        if !matches!(self.rendering.format.as_str(), "pgm" | "png") {
            return Err(ValidationError::InvalidFormat(self.rendering.format.clone()));
        }
        if self.rendering.encoding != "base64" {
            return Err(ValidationError::InvalidEncoding(
                self.rendering.encoding.clone(),
            ));
        }
        if let Some(direction) = &self.text.direction {
            if !matches!(direction.as_str(), "ltr" | "rtl" | "ttb" | "btt") {
                return Err(ValidationError::InvalidDirection(direction.clone()));
            }
        }
        Ok(())
    }

    /// Resolve the font path, optionally confined to `base_dir`.
    pub fn sanitize_font_path(
        &self,
        base_dir: Option<&Utf8Path>,
    ) -> std::result::Result<Utf8PathBuf, SecurityError> {
        sanitize_path(&self.font.path, base_dir)
    }
}

impl JobResult {
    pub fn success(id: impl Into<String>, rendering: RenderingOutput, timing: TimingInfo) -> Self {
        Self {
            id: id.into(),
            status: "success".to_string(),
            rendering: Some(rendering),
            error: None,
            timing,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: "error".to_string(),
            rendering: None,
            error: Some(message.into()),
            timing: TimingInfo::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Serialise as a single JSONL line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RenderError::InvalidJson(e.to_string()))
    }
}

/// Job-spec validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported version: {0}, expected '1.0'")]
    UnsupportedVersion(String),

    #[error("Jobs array is empty")]
    EmptyJobList,

    /// Well-formed JSON whose shape is not a job spec (missing or mistyped fields).
    #[error("Malformed job spec: {0}")]
    Malformed(String),

    #[error("Too many jobs: {count} (max: {max})")]
    TooManyJobs { count: usize, max: usize },

    #[error("Input too large: {size} bytes (max: {max})")]
    InputTooLarge { size: usize, max: usize },

    #[error("Job ID is empty")]
    EmptyJobId,

    #[error("Invalid font size: {0}")]
    InvalidFontSize(f32),

    #[error("Text content is empty")]
    EmptyText,

    #[error("Invalid canvas dimensions: {width}x{height}")]
    InvalidCanvasDimensions { width: u32, height: u32 },

    #[error("Invalid output format: {0} (must be pgm or png)")]
    InvalidFormat(String),

    #[error("Invalid encoding: {0} (must be base64)")]
    InvalidEncoding(String),

    #[error("Invalid text direction: {0}")]
    InvalidDirection(String),

    #[error("Security validation failed: {0}")]
    Security(#[from] SecurityError),
}
