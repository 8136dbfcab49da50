// this_file: crates/rasterhub-dispatch/src/engines/session.rs

use std::sync::Arc;

use rasterhub_core::engine::{check_font_readable, validate_geometry, validate_text};
use rasterhub_core::{
    Bitmap, EngineSettings, FeatureMap, RenderEngine, RenderError, Result, VariationMap,
};
use rasterhub_render::{StreamingSession, TextHints};

use crate::select::SESSION;
use crate::shared;

/// Renders in-process through the shared streaming session.
///
/// Closing the engine releases its handle only; the session itself lives
/// until the pool is cleared. An engine built on the shared session picks
/// up the replacement when [`shared::init`] or [`shared::teardown`] closes
/// the one it holds.
pub struct SessionEngine {
    settings: EngineSettings,
    session: Option<Arc<StreamingSession>>,
    follows_shared: bool,
}

impl SessionEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings: settings.clone(),
            session: Some(shared::get_or_init()?),
            follows_shared: true,
        })
    }

    /// Engine on an explicit session instead of the shared one.
    pub fn with_session(settings: &EngineSettings, session: Arc<StreamingSession>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings: settings.clone(),
            session: Some(session),
            follows_shared: false,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Session to render on. An explicit session is used as given, closed or not.
    fn live_session(&mut self) -> Result<Arc<StreamingSession>> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| RenderError::unavailable(SESSION, "engine has been closed"))?;
        if !(self.follows_shared && session.is_closed()) {
            return Ok(Arc::clone(session));
        }
        let current = shared::get_or_init()?;
        log::debug!("Shared session was replaced; re-attaching session engine");
        self.session = Some(Arc::clone(&current));
        Ok(current)
    }
}

impl RenderEngine for SessionEngine {
    fn name(&self) -> &'static str {
        SESSION
    }

    fn render(&mut self, text: &str) -> Result<Bitmap> {
        validate_text(text)?;
        self.settings.validate()?;
        let session = self.live_session()?;
        check_font_readable(&self.settings.font_path)?;

        let bitmap = session.render_to_array(&self.settings, text, &TextHints::latin())?;
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
        self.settings = self.settings.clone().with_tracking(tracking);
        self.settings.validate()
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
        self.session = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_before_session() {
        let session = Arc::new(StreamingSession::open(4).unwrap());
        let settings = EngineSettings::new("/nonexistent/font.ttf", 64, 32, 24.0);
        let mut engine = SessionEngine::with_session(&settings, Arc::clone(&session)).unwrap();

        assert!(matches!(engine.render(""), Err(RenderError::InvalidInput(_))));
        match engine.render("A") {
            Err(RenderError::FontLoad { path, .. }) => assert_eq!(path, "/nonexistent/font.ttf"),
            other => panic!("expected FontLoad, got {other:?}"),
        }
        assert!(matches!(
            engine.update_dimensions(0, 32, 24.0),
            Err(RenderError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_closed_session_surfaces() {
        let session = Arc::new(StreamingSession::open(4).unwrap());
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let settings = EngineSettings::new(path, 64, 32, 24.0);
        let mut engine = SessionEngine::with_session(&settings, Arc::clone(&session)).unwrap();

        session.close();
        assert!(matches!(engine.render("A"), Err(RenderError::SessionClosed)));

        engine.close().unwrap();
        engine.close().unwrap();
        assert!(matches!(
            engine.render("A"),
            Err(RenderError::EngineUnavailable { .. })
        ));
    }
}
