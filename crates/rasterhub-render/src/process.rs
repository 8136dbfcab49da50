// this_file: crates/rasterhub-render/src/process.rs

//! Turning one job into one result.
//!
//! Every failure inside a job is caught here and reported as an error
//! result carrying the job id, so a bad font never sinks its neighbours.

use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rasterhub_core::codec::encode_rendering;
use rasterhub_core::engine::{check_font_readable, parse_features, validate_text, VariationMap};
use rasterhub_core::{
    Bitmap, EngineSettings, Job, JobResult, RenderError, Result, TimingInfo,
};

use crate::font_cache::FontLoader;
use crate::raster::rasterize;
use crate::shaping::{shape_text, TextHints};

/// Knobs shared by every job processed through one loader.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Relative font paths resolve here, and absolute ones must stay inside it
    pub base_dir: Option<Utf8PathBuf>,
    /// Per-job budget, checked between stages
    pub timeout: Option<Duration>,
}

struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    fn check(&self, stage: &str) -> Result<()> {
        match self.budget {
            Some(budget) if self.start.elapsed() > budget => Err(RenderError::InvalidInput(
                format!("job exceeded {}ms budget during {stage}", budget.as_millis()),
            )),
            _ => Ok(()),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Shape and rasterize `text` with the loader's cached font.
pub fn render_text(
    loader: &FontLoader,
    settings: &EngineSettings,
    text: &str,
    hints: &TextHints,
) -> Result<(Bitmap, TimingInfo)> {
    render_with_deadline(loader, settings, text, hints, &Deadline::new(None))
}

fn render_with_deadline(
    loader: &FontLoader,
    settings: &EngineSettings,
    text: &str,
    hints: &TextHints,
    deadline: &Deadline,
) -> Result<(Bitmap, TimingInfo)> {
    validate_text(text)?;
    settings.validate()?;
    check_font_readable(&settings.font_path)?;

    let empty = VariationMap::new();
    let coords = settings.variations.as_ref().unwrap_or(&empty);
    let font = loader.load(&settings.font_path, coords)?;
    deadline.check("font loading")?;

    let shape_start = Instant::now();
    let shaped = shape_text(&font, text, settings.font_size, &settings.features, hints)?;
    let shape_ms = millis(shape_start.elapsed());
    deadline.check("shaping")?;

    let render_start = Instant::now();
    let bitmap = rasterize(
        &font,
        &shaped,
        settings.width,
        settings.height,
        settings.font_size,
        settings.tracking_px(),
    )?;
    let render_ms = millis(render_start.elapsed());
    deadline.check("rasterization")?;

    bitmap.ensure_shape(settings.width, settings.height)?;
    Ok((
        bitmap,
        TimingInfo {
            shape_ms,
            render_ms,
            total_ms: millis(deadline.start.elapsed()),
        },
    ))
}

/// Build engine settings and hints from a validated job.
pub fn job_settings(job: &Job, options: &ProcessOptions) -> Result<(EngineSettings, TextHints)> {
    job.validate()?;
    let font_path = job.sanitize_font_path(options.base_dir.as_deref())?;
    let features = parse_features(&job.text.features)?;

    let mut settings = EngineSettings::new(
        font_path,
        job.rendering.width,
        job.rendering.height,
        job.font.size,
    )
    .with_features(features)
    .with_tracking(job.text.tracking);
    if !job.font.variations.is_empty() {
        settings = settings.with_variations(job.font.variations.clone());
    }

    let hints = TextHints {
        script: job.text.script.clone(),
        direction: job.text.direction.clone(),
        language: job.text.language.clone(),
    };
    Ok((settings, hints))
}

/// Process one job; never fails, errors become error results.
pub fn process_job(job: &Job, loader: &FontLoader, options: &ProcessOptions) -> JobResult {
    match try_process(job, loader, options) {
        Ok(result) => result,
        Err(e) => {
            log::debug!("Job {} failed: {}", job.id, e);
            JobResult::error(&job.id, e.to_string())
        }
    }
}

fn try_process(job: &Job, loader: &FontLoader, options: &ProcessOptions) -> Result<JobResult> {
    let deadline = Deadline::new(options.timeout);
    let (settings, hints) = job_settings(job, options)?;
    let (bitmap, timing) =
        render_with_deadline(loader, &settings, &job.text.content, &hints, &deadline)?;
    let rendering = encode_rendering(&bitmap, &job.rendering.format)?;
    Ok(JobResult::success(&job.id, rendering, timing))
}
