// this_file: crates/rasterhub-render/src/session.rs

//! Persistent streaming session.
//!
//! A session keeps one font cache alive across many renders. Once closed it
//! stays closed: every further render, resize or warm-up fails with
//! [`RenderError::SessionClosed`].

use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8Path;
use rasterhub_core::engine::VariationMap;
use rasterhub_core::{Bitmap, EngineSettings, Job, RenderError, Result};

use crate::font_cache::{CacheStats, FontLoader, DEFAULT_CACHE_SIZE};
use crate::process::{process_job, render_text, ProcessOptions};
use crate::shaping::TextHints;

/// Long-lived renderer with a resizable font cache.
pub struct StreamingSession {
    loader: FontLoader,
    options: ProcessOptions,
    closed: AtomicBool,
}

impl StreamingSession {
    /// Open a session caching up to `cache_size` font instances.
    pub fn open(cache_size: usize) -> Result<Self> {
        Self::with_options(cache_size, ProcessOptions::default())
    }

    pub fn with_options(cache_size: usize, options: ProcessOptions) -> Result<Self> {
        if cache_size == 0 {
            return Err(RenderError::InvalidInput(
                "cache size must be at least 1".into(),
            ));
        }
        log::debug!("Opening streaming session with cache size {}", cache_size);
        Ok(Self {
            loader: FontLoader::new(cache_size),
            options,
            closed: AtomicBool::new(false),
        })
    }

    /// Open a session, run `f`, and close the session on every exit path.
    pub fn scoped<T>(cache_size: usize, f: impl FnOnce(&StreamingSession) -> T) -> Result<T> {
        let session = Self::open(cache_size)?;
        let out = f(&session);
        session.close();
        Ok(out)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderError::SessionClosed);
        }
        Ok(())
    }

    /// Render one job given as JSON and return its result as one JSON line.
    ///
    /// Malformed JSON and a job missing required fields are errors; a
    /// complete job that fails comes back as an error result.
    pub fn render(&self, job_json: &str) -> Result<String> {
        self.ensure_open()?;
        let job = Job::parse(job_json)?;
        process_job(&job, &self.loader, &self.options).to_json_line()
    }

    /// Typed fast path: render straight to a bitmap.
    pub fn render_to_array(
        &self,
        settings: &EngineSettings,
        text: &str,
        hints: &TextHints,
    ) -> Result<Bitmap> {
        self.ensure_open()?;
        render_text(&self.loader, settings, text, hints).map(|(bitmap, _)| bitmap)
    }

    /// Confirm the session is usable. Needs no font.
    pub fn warm_up(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(true)
    }

    /// Preload `font_path` into the cache, optionally rendering `text` once.
    pub fn warm_up_font(&self, font_path: &Utf8Path, text: Option<&str>) -> Result<bool> {
        self.ensure_open()?;
        let font = self.loader.load(font_path, &VariationMap::new())?;
        if let Some(text) = text {
            let settings = EngineSettings::new(font_path, 64, 64, 32.0);
            render_text(&self.loader, &settings, text, &TextHints::default())?;
        }
        log::debug!("Warmed up {}", font.path());
        Ok(true)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.loader.stats()
    }

    /// Resize the font cache in place; shrinking evicts least-recently-used fonts.
    pub fn set_cache_size(&self, cache_size: usize) -> Result<()> {
        self.ensure_open()?;
        self.loader.resize(cache_size)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release cached fonts. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.loader.clear();
        log::debug!("Streaming session closed");
    }
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self {
            loader: FontLoader::new(DEFAULT_CACHE_SIZE),
            options: ProcessOptions::default(),
            closed: AtomicBool::new(false),
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        let session = StreamingSession::default();
        assert_eq!(session.cache_stats().capacity, DEFAULT_CACHE_SIZE);
        assert_eq!(session.cache_stats().entries, 0);
    }

    #[test]
    fn test_zero_cache_rejected() {
        assert!(matches!(
            StreamingSession::open(0),
            Err(RenderError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_resize_live() {
        let session = StreamingSession::open(128).unwrap();
        session.set_cache_size(64).unwrap();
        assert_eq!(session.cache_stats().capacity, 64);
        assert!(session.set_cache_size(0).is_err());
    }

    #[test]
    fn test_invalid_json() {
        let session = StreamingSession::open(8).unwrap();
        assert!(matches!(
            session.render("{not json"),
            Err(RenderError::InvalidJson(_))
        ));
        assert!(matches!(
            session.render(r#"{"id":"j1","text":{"content":"A"}}"#),
            Err(RenderError::Schema(_))
        ));
    }

    #[test]
    fn test_closed_session_rejects_everything() {
        let session = StreamingSession::open(8).unwrap();
        assert!(session.warm_up().unwrap());
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(session.warm_up(), Err(RenderError::SessionClosed)));
        assert!(matches!(
            session.render("{}"),
            Err(RenderError::SessionClosed)
        ));
        assert!(matches!(
            session.set_cache_size(4),
            Err(RenderError::SessionClosed)
        ));
        let settings = EngineSettings::new("/nonexistent/font.ttf", 8, 8, 8.0);
        assert!(matches!(
            session.render_to_array(&settings, "A", &TextHints::default()),
            Err(RenderError::SessionClosed)
        ));
    }

    #[test]
    fn test_scoped_closes() {
        let stats = StreamingSession::scoped(16, |s| {
            assert!(!s.is_closed());
            s.cache_stats()
        })
        .unwrap();
        assert_eq!(stats.capacity, 16);
    }
}
