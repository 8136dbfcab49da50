//! Render command: one text through the engine pool into an image file.

use anyhow::{Context, Result};
use rasterhub_core::codec::{encode_pgm, encode_png};
use rasterhub_core::engine::parse_features;
use rasterhub_core::{EngineSettings, RenderEngine};
use rasterhub_dispatch::default_pool;

use super::parse_variations;
use crate::cli::RenderArgs;

pub fn run(args: &RenderArgs) -> Result<()> {
    let mut settings = EngineSettings::new(args.font.clone(), args.width, args.height, args.size)
        .with_features(parse_features(&args.features)?)
        .with_tracking(args.tracking);
    let variations = parse_variations(&args.variations)?;
    if !variations.is_empty() {
        settings = settings.with_variations(variations);
    }

    let engine = default_pool().acquire_with_fallback(&args.engine, &settings)?;
    let mut engine = engine.lock();
    engine.update_instance_coordinates(settings.variations.as_ref())?;
    log::debug!("Rendering with '{}'", engine.name());
    let bitmap = engine.render(&args.text)?;

    let bytes = match args.output.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("png") => encode_png(&bitmap)?,
        _ => encode_pgm(&bitmap),
    };
    std::fs::write(&args.output, bytes).with_context(|| format!("writing {}", args.output))?;

    let (x, y, w, h) = bitmap.bounding_box();
    eprintln!(
        "Rendered {}x{} with {} (ink box {}x{} at {},{}) to {}",
        bitmap.width(),
        bitmap.height(),
        engine.name(),
        w,
        h,
        x,
        y,
        args.output
    );
    Ok(())
}
