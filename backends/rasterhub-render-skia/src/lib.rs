//! Skia engine: glyph outlines filled by tiny-skia
//!
//! Layout is cmap-only: characters map through the cmap, pens
//! advance by the glyph's advance width, and the whole run is filled as one
//! winding path. No shaping, so OpenType features are accepted but unused.

use std::sync::Arc;

use rasterhub_core::engine::{
    check_font_readable, validate_geometry, validate_text, FeatureMap, VariationMap,
};
use rasterhub_core::{Bitmap, EngineSettings, RenderEngine, RenderError, Result, BASELINE_RATIO};
use read_fonts::{FileRef, TableProvider};
use skrifa::instance::{Location, Size};
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::MetadataProvider;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

/// Engine name in the registry.
pub const NAME: &str = "skia";

/// Left margin of the pen, in pixels.
const ORIGIN_X: f32 = 10.0;

/// tiny-skia is pure Rust, so the engine is always available.
pub fn is_available() -> bool {
    true
}

/// Outline-filling engine backed by tiny-skia
pub struct SkiaEngine {
    settings: EngineSettings,
    data: Option<Arc<[u8]>>,
    location: Location,
}

impl SkiaEngine {
    /// Read the font and validate geometry; fails with `FontLoad` for unreadable fonts.
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        check_font_readable(&settings.font_path)?;
        let path = settings.font_path.as_str();

        let data: Arc<[u8]> = std::fs::read(settings.font_path.as_std_path())
            .map_err(|e| RenderError::font_load(path, e))?
            .into();
        FileRef::new(&data).map_err(|e| RenderError::font_load(path, e))?;
        let font =
            skrifa::FontRef::from_index(&data, 0).map_err(|e| RenderError::font_load(path, e))?;
        font.head()
            .map_err(|e| RenderError::font_load(path, format!("missing head table: {e}")))?;

        let location = build_location(&font, settings.variations.as_ref());
        log::debug!("Skia engine ready for {}", path);

        Ok(Self {
            settings: settings.clone(),
            data: Some(data),
            location,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn data(&self) -> Result<&[u8]> {
        self.data
            .as_deref()
            .ok_or_else(|| RenderError::unavailable(NAME, "engine has been closed"))
    }
}

fn build_location(font: &skrifa::FontRef<'_>, variations: Option<&VariationMap>) -> Location {
    match variations {
        Some(coords) if !coords.is_empty() => {
            let settings: Vec<(&str, f32)> =
                coords.iter().map(|(tag, v)| (tag.as_str(), *v)).collect();
            font.axes().location(settings)
        }
        _ => Location::default(),
    }
}

/// Feeds skrifa outlines into a tiny-skia path, placing each glyph on the canvas.
struct SkiaPen {
    builder: PathBuilder,
    origin_x: f32,
    baseline_y: f32,
}

impl SkiaPen {
    fn pt(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x, self.baseline_y - y)
    }
}

impl OutlinePen for SkiaPen {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.pt(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        let (cx, cy) = self.pt(cx, cy);
        let (x, y) = self.pt(x, y);
        self.builder.quad_to(cx, cy, x, y);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        let (cx0, cy0) = self.pt(cx0, cy0);
        let (cx1, cy1) = self.pt(cx1, cy1);
        let (x, y) = self.pt(x, y);
        self.builder.cubic_to(cx0, cy0, cx1, cy1, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Fill `builder`'s path onto a fresh canvas and keep the alpha channel.
fn fill_to_bitmap(builder: PathBuilder, width: u32, height: u32) -> Result<Bitmap> {
    let mut bitmap = Bitmap::new(width, height)?;
    // An empty builder (spaces only) yields no path.
    let Some(path) = builder.finish() else {
        return Ok(bitmap);
    };

    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        RenderError::InvalidGeometry(format!("cannot allocate {width}x{height} pixmap"))
    })?;
    let paint = Paint {
        anti_alias: true,
        ..Default::default()
    };
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

    for (dst, px) in bitmap
        .pixels_mut()
        .iter_mut()
        .zip(pixmap.data().chunks_exact(4))
    {
        *dst = px[3];
    }
    Ok(bitmap)
}

impl RenderEngine for SkiaEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn render(&mut self, text: &str) -> Result<Bitmap> {
        validate_text(text)?;
        let data = self.data()?;
        let path = self.settings.font_path.as_str();
        let font =
            skrifa::FontRef::from_index(data, 0).map_err(|e| RenderError::font_load(path, e))?;

        let size = Size::new(self.settings.font_size);
        let coords = self.location.coords();
        let charmap = font.charmap();
        let metrics = font.glyph_metrics(size, coords);
        let outlines = font.outline_glyphs();
        let tracking_px = self.settings.tracking_px();

        let mut pen = SkiaPen {
            builder: PathBuilder::new(),
            origin_x: ORIGIN_X,
            baseline_y: self.settings.height as f32 * BASELINE_RATIO,
        };

        for ch in text.chars() {
            let gid = charmap.map(ch).unwrap_or(skrifa::GlyphId::NOTDEF);
            if let Some(glyph) = outlines.get(gid) {
                glyph
                    .draw(DrawSettings::unhinted(size, coords), &mut pen)
                    .map_err(|e| RenderError::font_load(path, format!("glyph {}: {e}", gid.to_u32())))?;
            }
            pen.origin_x += metrics.advance_width(gid).unwrap_or(0.0) + tracking_px;
        }

        let bitmap = fill_to_bitmap(pen.builder, self.settings.width, self.settings.height)?;
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
        if !features.is_empty() {
            log::debug!("Skia engine ignores OpenType features: {:?}", features);
        }
        self.settings.features = features.clone();
        Ok(())
    }

    fn update_instance_coordinates(&mut self, coords: Option<&VariationMap>) -> Result<()> {
        let data = Arc::clone(
            self.data
                .as_ref()
                .ok_or_else(|| RenderError::unavailable(NAME, "engine has been closed"))?,
        );
        let font = skrifa::FontRef::from_index(&data, 0)
            .map_err(|e| RenderError::font_load(self.settings.font_path.as_str(), e))?;
        self.location = build_location(&font, coords);
        self.settings.variations = coords.cloned();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.data = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_font() {
        let settings = EngineSettings::new("/nonexistent/font.ttf", 64, 32, 24.0);
        match SkiaEngine::new(&settings) {
            Err(RenderError::FontLoad { path, .. }) => assert_eq!(path, "/nonexistent/font.ttf"),
            other => panic!("expected FontLoad, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_geometry_checked_before_font() {
        let settings = EngineSettings::new("/nonexistent/font.ttf", 0, 32, 24.0);
        assert!(matches!(
            SkiaEngine::new(&settings),
            Err(RenderError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_garbage_font() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a font at all").unwrap();
        let settings = EngineSettings::new(file.path().to_str().unwrap(), 64, 32, 24.0);
        assert!(matches!(
            SkiaEngine::new(&settings),
            Err(RenderError::FontLoad { .. })
        ));
    }

    #[test]
    fn test_fill_square() {
        let mut pen = SkiaPen {
            builder: PathBuilder::new(),
            origin_x: 2.0,
            baseline_y: 8.0,
        };
        pen.move_to(0.0, 0.0);
        pen.line_to(6.0, 0.0);
        pen.line_to(6.0, 6.0);
        pen.line_to(0.0, 6.0);
        pen.close();

        let bitmap = fill_to_bitmap(pen.builder, 10, 10).unwrap();
        assert_eq!(bitmap.shape(), (10, 10));
        assert_eq!(bitmap.get(5, 5), Some(255));
        assert_eq!(bitmap.get(0, 0), Some(0));
        assert_eq!(bitmap.get(9, 9), Some(0));
    }

    #[test]
    fn test_empty_path_is_blank() {
        let bitmap = fill_to_bitmap(PathBuilder::new(), 4, 4).unwrap();
        assert!(bitmap.is_blank());
    }
}
