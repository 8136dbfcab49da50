//! Glyph rasterization with zeno
//!
//! All outlines of a run are collected into one SVG path in canvas pixel
//! space (y down, baseline at [`BASELINE_RATIO`] of the height) and filled in
//! a single pass, so overlapping glyphs accumulate coverage correctly.

use rasterhub_core::{Bitmap, RenderError, Result, BASELINE_RATIO};
use skrifa::instance::Size;
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::{GlyphId, MetadataProvider};
use zeno::Mask;

use crate::font_cache::LoadedFont;
use crate::shaping::ShapedText;

/// Builds an SVG path string, translating and flipping each point into canvas space.
struct CanvasPen {
    commands: String,
    origin_x: f32,
    baseline_y: f32,
}

impl CanvasPen {
    fn new() -> Self {
        Self {
            commands: String::new(),
            origin_x: 0.0,
            baseline_y: 0.0,
        }
    }

    fn place(&mut self, origin_x: f32, baseline_y: f32) {
        self.origin_x = origin_x;
        self.baseline_y = baseline_y;
    }

    fn pt(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x, self.baseline_y - y)
    }

    fn push(&mut self, cmd: char, points: &[(f32, f32)]) {
        use std::fmt::Write;
        self.commands.push(cmd);
        for (x, y) in points {
            let _ = write!(self.commands, " {:.3},{:.3}", x, y);
        }
        self.commands.push(' ');
    }
}

impl OutlinePen for CanvasPen {
    fn move_to(&mut self, x: f32, y: f32) {
        let p = self.pt(x, y);
        self.push('M', &[p]);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.pt(x, y);
        self.push('L', &[p]);
    }

    fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        let (c, p) = (self.pt(cx, cy), self.pt(x, y));
        self.push('Q', &[c, p]);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        let (c0, c1, p) = (self.pt(cx0, cy0), self.pt(cx1, cy1), self.pt(x, y));
        self.push('C', &[c0, c1, p]);
    }

    fn close(&mut self) {
        self.commands.push_str("Z ");
    }
}

/// Rasterize shaped glyphs onto a `width` × `height` canvas.
///
/// `tracking_px` is added after every glyph along the writing direction.
pub fn rasterize(
    font: &LoadedFont,
    shaped: &ShapedText,
    width: u32,
    height: u32,
    font_size: f32,
    tracking_px: f32,
) -> Result<Bitmap> {
    let mut bitmap = Bitmap::new(width, height)?;
    if shaped.glyphs.is_empty() {
        return Ok(bitmap);
    }

    let font_ref = font.font_ref()?;
    let location = font.location()?;
    let outlines = font_ref.outline_glyphs();
    let size = Size::new(font_size);

    let mut pen = CanvasPen::new();
    // Vertical runs hang from the top edge, centred horizontally.
    let (baseline, mut pen_x) = if shaped.vertical {
        (0.0, width as f32 / 2.0)
    } else {
        (height as f32 * BASELINE_RATIO, 0.0)
    };
    let mut pen_y = 0.0f32;

    for glyph in &shaped.glyphs {
        match outlines.get(GlyphId::new(glyph.glyph_id)) {
            Some(outline) => {
                pen.place(pen_x + glyph.x_offset, baseline - pen_y - glyph.y_offset);
                let settings = DrawSettings::unhinted(size, location.coords());
                outline.draw(settings, &mut pen).map_err(|e| {
                    RenderError::font_load(
                        font.path().as_str(),
                        format!("cannot draw glyph {}: {e}", glyph.glyph_id),
                    )
                })?;
            }
            None => log::warn!("Glyph {} missing from {}", glyph.glyph_id, font.path()),
        }

        if shaped.vertical {
            pen_y += glyph.y_advance - tracking_px;
        } else {
            pen_x += glyph.x_advance + tracking_px;
        }
    }

    if pen.commands.is_empty() {
        return Ok(bitmap);
    }

    Mask::new(pen.commands.as_str())
        .size(width, height)
        .render_into(bitmap.pixels_mut(), None);

    Ok(bitmap)
}
