// this_file: crates/rasterhub-dispatch/src/engines/harfrust.rs

use rasterhub_core::engine::{check_font_readable, validate_geometry, validate_text};
use rasterhub_core::{
    Bitmap, EngineSettings, FeatureMap, RenderEngine, RenderError, Result, VariationMap,
};
use rasterhub_render::{render_text, FontLoader, TextHints};

use crate::select::HARFRUST;

/// Few entries: one engine serves one font at a handful of coordinates.
const LOADER_CAPACITY: usize = 8;

/// harfrust shaping and zeno rasterization on a private font cache.
pub struct HarfrustEngine {
    settings: EngineSettings,
    loader: Option<FontLoader>,
}

impl HarfrustEngine {
    /// Validates geometry and loads the font once so a bad font fails here.
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        check_font_readable(&settings.font_path)?;
        let loader = FontLoader::new(LOADER_CAPACITY);
        loader.load(
            &settings.font_path,
            settings.variations.as_ref().unwrap_or(&VariationMap::new()),
        )?;
        Ok(Self {
            settings: settings.clone(),
            loader: Some(loader),
        })
    }

    fn loader(&self) -> Result<&FontLoader> {
        self.loader
            .as_ref()
            .ok_or_else(|| RenderError::unavailable(HARFRUST, "engine has been closed"))
    }
}

impl RenderEngine for HarfrustEngine {
    fn name(&self) -> &'static str {
        HARFRUST
    }

    fn render(&mut self, text: &str) -> Result<Bitmap> {
        validate_text(text)?;
        let (bitmap, timing) =
            render_text(self.loader()?, &self.settings, text, &TextHints::latin())?;
        log::trace!("harfrust render took {:.2}ms", timing.total_ms);
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

    /// Unknown axes are rejected now rather than on the next render.
    fn update_instance_coordinates(&mut self, coords: Option<&VariationMap>) -> Result<()> {
        let coords = coords.filter(|c| !c.is_empty());
        if let Some(coords) = coords {
            self.loader()?.load(&self.settings.font_path, coords)?;
        }
        self.settings.variations = coords.cloned();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(loader) = self.loader.take() {
            loader.clear();
        }
        Ok(())
    }
}
