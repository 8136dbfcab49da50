//! The contract every rendering engine honours
//!
//! Engines are interchangeable: the dispatcher picks one by name, the pool
//! keeps instances warm, and callers only ever see [`Bitmap`]s of the exact
//! size they asked for.
//!
//! ```ignore
//! struct Blank { settings: EngineSettings }
//!
//! impl RenderEngine for Blank {
//!     fn name(&self) -> &'static str { "blank" }
//!
//!     fn render(&mut self, text: &str) -> Result<Bitmap> {
//!         validate_text(text)?;
//!         Bitmap::new(self.settings.width, self.settings.height)
//!     }
//!     // ...
//! }
//! ```

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::bitmap::Bitmap;
use crate::error::{RenderError, Result};
use crate::limits::{MAX_CANVAS_DIMENSION, MAX_FONT_SIZE_PX, MAX_TEXT_LENGTH};

/// OpenType feature toggles, tag → value. Sorted so it can take part in keys.
pub type FeatureMap = BTreeMap<String, u32>;

/// Variation axis coordinates in user space, tag → value.
pub type VariationMap = BTreeMap<String, f32>;

/// Everything needed to construct an engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub font_path: Utf8PathBuf,
    pub width: u32,
    pub height: u32,
    /// Font size in pixels per em
    pub font_size: f32,
    pub features: FeatureMap,
    /// Extra advance per glyph, in thousandths of an em
    pub tracking: f32,
    pub variations: Option<VariationMap>,
}

impl EngineSettings {
    pub fn new(font_path: impl Into<Utf8PathBuf>, width: u32, height: u32, font_size: f32) -> Self {
        Self {
            font_path: font_path.into(),
            width,
            height,
            font_size,
            features: FeatureMap::new(),
            tracking: 0.0,
            variations: None,
        }
    }

    pub fn with_features(mut self, features: FeatureMap) -> Self {
        self.features = features;
        self
    }

    pub fn with_tracking(mut self, tracking: f32) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn with_variations(mut self, variations: VariationMap) -> Self {
        self.variations = Some(variations);
        self
    }

    /// Geometry checks, run before any engine touches the font.
    pub fn validate(&self) -> Result<()> {
        validate_geometry(self.width, self.height, self.font_size)?;
        if !self.tracking.is_finite() {
            return Err(RenderError::InvalidInput(format!(
                "tracking must be finite, got {}",
                self.tracking
            )));
        }
        Ok(())
    }

    /// Tracking converted to pixels at the current font size.
    pub fn tracking_px(&self) -> f32 {
        self.tracking / 1000.0 * self.font_size
    }
}

/// A text-to-bitmap renderer
///
/// Instances are long-lived: the pool hands the same instance out again and
/// mutates it in place through the `update_*` methods instead of rebuilding.
pub trait RenderEngine: Send {
    /// Registry name, used in logs and error messages
    fn name(&self) -> &'static str;

    /// Render `text` into a bitmap of exactly the configured size
    ///
    /// Empty text is rejected with [`RenderError::InvalidInput`] before any
    /// external work happens.
    fn render(&mut self, text: &str) -> Result<Bitmap>;

    /// Change canvas size and font size
    fn update_dimensions(&mut self, width: u32, height: u32, font_size: f32) -> Result<()>;

    /// Change tracking (thousandths of an em)
    fn update_tracking(&mut self, tracking: f32) -> Result<()>;

    /// Replace the feature set
    fn set_features(&mut self, features: &FeatureMap) -> Result<()>;

    /// Apply variation coordinates in place; `None` restores the default instance
    fn update_instance_coordinates(&mut self, coords: Option<&VariationMap>) -> Result<()>;

    /// Release external resources. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Reject empty or oversized text.
pub fn validate_text(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(RenderError::InvalidInput("text must not be empty".into()));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(RenderError::InvalidInput(format!(
            "text too long: {} bytes (max: {})",
            text.len(),
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Reject non-positive or absurd canvas and font sizes.
pub fn validate_geometry(width: u32, height: u32, font_size: f32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidGeometry(format!(
            "width and height must be positive, got {}x{}",
            width, height
        )));
    }
    if width > MAX_CANVAS_DIMENSION || height > MAX_CANVAS_DIMENSION {
        return Err(RenderError::InvalidGeometry(format!(
            "canvas {}x{} exceeds {} pixels per side",
            width, height, MAX_CANVAS_DIMENSION
        )));
    }
    if !font_size.is_finite() || font_size <= 0.0 || font_size > MAX_FONT_SIZE_PX {
        return Err(RenderError::InvalidGeometry(format!(
            "font size must be in (0, {}], got {}",
            MAX_FONT_SIZE_PX, font_size
        )));
    }
    Ok(())
}

/// Fail with [`RenderError::FontLoad`] unless `path` is a readable file.
pub fn check_font_readable(path: &Utf8Path) -> Result<()> {
    let meta = std::fs::metadata(path.as_std_path())
        .map_err(|e| RenderError::font_load(path.as_str(), e))?;
    if !meta.is_file() {
        return Err(RenderError::font_load(path.as_str(), "not a regular file"));
    }
    Ok(())
}

/// Parse a feature toggle such as `liga`, `-kern`, `+smcp` or `ss01=2`.
pub fn parse_feature(spec: &str) -> Result<(String, u32)> {
    let spec = spec.trim();
    let (tag, value) = if let Some(rest) = spec.strip_prefix('-') {
        (rest, 0)
    } else if let Some(rest) = spec.strip_prefix('+') {
        (rest, 1)
    } else if let Some((tag, value)) = spec.split_once('=') {
        let value = match value.trim() {
            "on" | "true" => 1,
            "off" | "false" => 0,
            v => v
                .parse::<u32>()
                .map_err(|_| RenderError::InvalidInput(format!("bad feature value in '{spec}'")))?,
        };
        (tag.trim(), value)
    } else {
        (spec, 1)
    };

    if tag.is_empty() || tag.len() > 4 || !tag.is_ascii() {
        return Err(RenderError::InvalidInput(format!(
            "feature tag must be 1-4 ASCII characters, got '{tag}'"
        )));
    }
    Ok((tag.to_string(), value))
}

/// Parse a list of feature toggles into a map; later entries win.
pub fn parse_features<S: AsRef<str>>(specs: &[S]) -> Result<FeatureMap> {
    specs
        .iter()
        .map(|s| parse_feature(s.as_ref()))
        .collect::<Result<FeatureMap>>()
}

/// Render a feature map back into `tag=value` strings.
pub fn format_features(features: &FeatureMap) -> Vec<String> {
    features
        .iter()
        .map(|(tag, value)| format!("{tag}={value}"))
        .collect()
}

/// Pad a tag to the 4 bytes OpenType expects.
pub fn tag_bytes(tag: &str) -> [u8; 4] {
    let mut bytes = [b' '; 4];
    for (slot, b) in bytes.iter_mut().zip(tag.bytes()) {
        *slot = b;
    }
    bytes
}
