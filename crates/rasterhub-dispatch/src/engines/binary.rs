// this_file: crates/rasterhub-dispatch/src/engines/binary.rs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rasterhub_core::codec::decode_rendering;
use rasterhub_core::engine::{
    check_font_readable, format_features, validate_geometry, validate_text,
};
use rasterhub_core::{
    Bitmap, EngineSettings, FeatureMap, FontConfig, Job, JobResult, JobSpec, RenderEngine,
    RenderError, RenderingConfig, Result, TextConfig, VariationMap, PROTOCOL_VERSION,
};
use serde_json::Value;

use crate::select::BINARY;
use crate::transport::{ChunkTransport, SubprocessTransport};

/// One `rasterhub batch` subprocess per render.
///
/// The backend writes a PNG into a scratch directory that is removed when
/// the render returns, whatever the outcome.
pub struct BinaryEngine {
    settings: EngineSettings,
    program: Option<PathBuf>,
    cache_size: usize,
    timeout: Duration,
}

impl BinaryEngine {
    pub fn new(
        settings: &EngineSettings,
        program: impl Into<PathBuf>,
        cache_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings: settings.clone(),
            program: Some(program.into()),
            cache_size,
            timeout,
        })
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    fn job_for(&self, id: &str, text: &str) -> Job {
        Job {
            id: id.to_string(),
            font: FontConfig {
                path: self.settings.font_path.clone(),
                size: self.settings.font_size,
                variations: self.settings.variations.clone().unwrap_or_default(),
            },
            text: TextConfig {
                content: text.to_string(),
                script: Some("Latn".into()),
                direction: Some("ltr".into()),
                language: Some("en".into()),
                features: format_features(&self.settings.features),
                tracking: self.settings.tracking,
            },
            rendering: RenderingConfig {
                format: "png".into(),
                encoding: "base64".into(),
                width: self.settings.width,
                height: self.settings.height,
            },
        }
    }
}

fn job_id(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("render_{:08x}", hasher.finish() & 0xFFFF_FFFF)
}

/// Pick our line out of the backend output, skipping log noise.
fn find_result(output: &str, id: &str) -> Option<JobResult> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter(|v| v.get("id").and_then(Value::as_str) == Some(id))
        .find_map(|v| serde_json::from_value::<JobResult>(v).ok())
}

impl RenderEngine for BinaryEngine {
    fn name(&self) -> &'static str {
        BINARY
    }

    fn render(&mut self, text: &str) -> Result<Bitmap> {
        validate_text(text)?;
        self.settings.validate()?;
        check_font_readable(&self.settings.font_path)?;
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| RenderError::unavailable(BINARY, "engine has been closed"))?;

        let scratch = tempfile::Builder::new()
            .prefix("rasterhub_render_")
            .tempdir()?;
        let id = job_id(text);
        let spec = JobSpec {
            version: PROTOCOL_VERSION.to_string(),
            jobs: vec![self.job_for(&id, text)],
        };
        let transport = SubprocessTransport::batch(program, self.cache_size, self.timeout)
            .arg(format!("--output-dir={}", scratch.path().display()));
        let output = transport.run_chunk(&serde_json::to_string(&spec)?)?;

        let result = find_result(&output, &id)
            .ok_or_else(|| RenderError::Transport(format!("backend output is missing job {id}")))?;
        if !result.is_success() {
            let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(RenderError::font_load(self.settings.font_path.as_str(), reason));
        }
        let rendering = result
            .rendering
            .ok_or_else(|| RenderError::Decode(format!("job {id} carries no image")))?;
        let bitmap = decode_rendering(&rendering)?;
        bitmap.ensure_shape(self.settings.width, self.settings.height)?;
        Ok(bitmap)
    }

    fn update_dimensions(&mut self, width: u32, height: u32, font_size: f32) -> Result<()> {
        validate_geometry(width, height, font_size)?;
        self.settings.width = width;
        self.settings.height = height;
        self.settings.font_size = font_size;
        Ok(())
    }

    fn update_tracking(&mut self, tracking: f32) -> Result<()> {
        if !tracking.is_finite() {
            return Err(RenderError::InvalidInput(format!(
                "tracking must be finite, got {tracking}"
            )));
        }
        self.settings.tracking = tracking;
        Ok(())
    }

    fn set_features(&mut self, features: &FeatureMap) -> Result<()> {
        self.settings.features = features.clone();
        Ok(())
    }

    fn update_instance_coordinates(&mut self, coords: Option<&VariationMap>) -> Result<()> {
        self.settings.variations = coords.filter(|c| !c.is_empty()).cloned();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.program = None;
        Ok(())
    }
}
