//! Text shaping with harfrust
//!
//! Positions come back already scaled to pixels so the rasterizer never has
//! to think about units per em.

use std::str::FromStr;

use harfrust::{
    Direction, Feature, FontRef as HrFontRef, Language, Script, ShaperData, ShaperInstance, Tag,
    UnicodeBuffer, Variation,
};
use rasterhub_core::engine::{tag_bytes, FeatureMap};
use rasterhub_core::{RenderError, Result};

use crate::font_cache::LoadedFont;

/// Script, direction and language hints for one shaping call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextHints {
    pub script: Option<String>,
    pub direction: Option<String>,
    pub language: Option<String>,
}

impl TextHints {
    /// Latin, left to right, English.
    pub fn latin() -> Self {
        Self {
            script: Some("Latn".into()),
            direction: Some("ltr".into()),
            language: Some("en".into()),
        }
    }
}

/// One glyph, positioned in pixels relative to the pen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedGlyph {
    pub glyph_id: u32,
    pub cluster: u32,
    pub x_advance: f32,
    pub y_advance: f32,
    pub x_offset: f32,
    pub y_offset: f32,
}

/// Shaping output plus the total pen advance.
#[derive(Debug, Clone, Default)]
pub struct ShapedText {
    pub glyphs: Vec<ShapedGlyph>,
    pub advance: f32,
    pub vertical: bool,
}

fn parse_direction(direction: Option<&str>) -> Result<Direction> {
    match direction.unwrap_or("ltr") {
        "ltr" => Ok(Direction::LeftToRight),
        "rtl" => Ok(Direction::RightToLeft),
        "ttb" => Ok(Direction::TopToBottom),
        "btt" => Ok(Direction::BottomToTop),
        other => Err(RenderError::InvalidInput(format!(
            "unknown text direction '{other}'"
        ))),
    }
}

/// Shape `text` at `font_size` pixels per em.
pub fn shape_text(
    font: &LoadedFont,
    text: &str,
    font_size: f32,
    features: &FeatureMap,
    hints: &TextHints,
) -> Result<ShapedText> {
    let direction = parse_direction(hints.direction.as_deref())?;
    if text.is_empty() {
        return Ok(ShapedText::default());
    }

    let hr_font = HrFontRef::from_index(font.data(), font.index())
        .map_err(|e| RenderError::font_load(font.path().as_str(), e))?;
    let shaper_data = ShaperData::new(&hr_font);

    let instance = if font.coordinates().is_empty() {
        None
    } else {
        let variations: Vec<Variation> = font
            .coordinates()
            .iter()
            .map(|(tag, value)| Variation {
                tag: Tag::new(&tag_bytes(tag)),
                value: *value,
            })
            .collect();
        Some(ShaperInstance::from_variations(&hr_font, variations))
    };

    let shaper = shaper_data
        .shaper(&hr_font)
        .instance(instance.as_ref())
        .point_size(Some(font_size))
        .build();

    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.set_direction(direction);
    if let Some(lang) = hints.language.as_deref() {
        match Language::from_str(lang) {
            Ok(language) => buffer.set_language(language),
            Err(_) => log::warn!("Ignoring unparseable language tag '{}'", lang),
        }
    }
    if let Some(script) = hints.script.as_deref() {
        match Script::from_iso15924_tag(Tag::new(&tag_bytes(script))) {
            Some(script) => buffer.set_script(script),
            None => log::warn!("Ignoring unknown script tag '{}'", script),
        }
    }

    let features: Vec<Feature> = features
        .iter()
        .map(|(tag, value)| Feature {
            tag: Tag::new(&tag_bytes(tag)),
            value: *value,
            start: 0,
            end: u32::MAX,
        })
        .collect();

    let output = shaper.shape(buffer, &features);

    let scale = font_size / f32::from(font.units_per_em().max(1));
    let vertical = matches!(direction, Direction::TopToBottom | Direction::BottomToTop);
    let mut advance = 0.0;
    let glyphs = output
        .glyph_infos()
        .iter()
        .zip(output.glyph_positions())
        .map(|(info, pos)| {
            let glyph = ShapedGlyph {
                glyph_id: info.glyph_id,
                cluster: info.cluster,
                x_advance: pos.x_advance as f32 * scale,
                y_advance: pos.y_advance as f32 * scale,
                x_offset: pos.x_offset as f32 * scale,
                y_offset: pos.y_offset as f32 * scale,
            };
            advance += if vertical {
                glyph.y_advance.abs()
            } else {
                glyph.x_advance
            };
            glyph
        })
        .collect();

    Ok(ShapedText {
        glyphs,
        advance,
        vertical,
    })
}
