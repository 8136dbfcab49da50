// this_file: crates/rasterhub-render/src/font_cache.rs

//! Font loading, variation handling, and an LRU cache of loaded instances.
//!
//! An entry is keyed by path plus the applied coordinates, so two jobs that
//! ask for different weights of the same file get separate entries.

use std::num::NonZeroUsize;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use lru::LruCache;
use parking_lot::Mutex;
use rasterhub_core::engine::VariationMap;
use rasterhub_core::limits::validate_font_file_size;
use rasterhub_core::{RenderError, Result};
use read_fonts::{FileRef, TableProvider};
use skrifa::MetadataProvider;

/// Default number of cached font instances.
pub const DEFAULT_CACHE_SIZE: usize = 512;

/// Cache occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub capacity: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct FontKey {
    path: Utf8PathBuf,
    /// (axis, f32::to_bits), sorted by axis
    coordinates: Vec<(String, u32)>,
}

impl FontKey {
    fn new(path: &Utf8Path, coordinates: &VariationMap) -> Self {
        Self {
            path: path.to_path_buf(),
            coordinates: coordinates
                .iter()
                .map(|(axis, value)| (axis.clone(), value.to_bits()))
                .collect(),
        }
    }
}

/// A parsed font file with its variation coordinates resolved.
#[derive(Debug)]
pub struct LoadedFont {
    path: Utf8PathBuf,
    data: Arc<[u8]>,
    index: u32,
    units_per_em: u16,
    coordinates: VariationMap,
}

impl LoadedFont {
    /// Read and parse `path`, clamping `coordinates` to the font's axes.
    ///
    /// Unknown axes are an error; static fonts ignore coordinates.
    pub fn open(path: &Utf8Path, coordinates: &VariationMap) -> Result<Self> {
        let meta = std::fs::metadata(path.as_std_path())
            .map_err(|e| RenderError::font_load(path.as_str(), e))?;
        validate_font_file_size(meta.len()).map_err(|e| RenderError::font_load(path.as_str(), e))?;

        let data: Arc<[u8]> = std::fs::read(path.as_std_path())
            .map_err(|e| RenderError::font_load(path.as_str(), e))?
            .into();

        let index = match FileRef::new(&data)
            .map_err(|e| RenderError::font_load(path.as_str(), format!("not a font file: {e}")))?
        {
            FileRef::Font(_) => 0,
            FileRef::Collection(collection) => {
                if collection.len() == 0 {
                    return Err(RenderError::font_load(path.as_str(), "empty font collection"));
                }
                0
            }
        };

        let font = skrifa::FontRef::from_index(&data, index)
            .map_err(|e| RenderError::font_load(path.as_str(), e))?;
        let units_per_em = font
            .head()
            .map_err(|e| RenderError::font_load(path.as_str(), format!("missing head table: {e}")))?
            .units_per_em();
        let coordinates = resolve_coordinates(&font, path, coordinates)?;

        Ok(Self {
            path: path.to_path_buf(),
            data,
            index,
            units_per_em,
            coordinates,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Coordinates after clamping (may differ from what was requested).
    pub fn coordinates(&self) -> &VariationMap {
        &self.coordinates
    }

    pub fn font_ref(&self) -> Result<skrifa::FontRef<'_>> {
        skrifa::FontRef::from_index(&self.data, self.index)
            .map_err(|e| RenderError::font_load(self.path.as_str(), e))
    }

    /// Normalized design-space location for outline extraction.
    pub fn location(&self) -> Result<skrifa::instance::Location> {
        let font = self.font_ref()?;
        if self.coordinates.is_empty() {
            return Ok(skrifa::instance::Location::default());
        }
        let settings: Vec<(&str, f32)> = self
            .coordinates
            .iter()
            .map(|(tag, value)| (tag.as_str(), *value))
            .collect();
        Ok(font.axes().location(settings))
    }
}

fn resolve_coordinates(
    font: &skrifa::FontRef<'_>,
    path: &Utf8Path,
    requested: &VariationMap,
) -> Result<VariationMap> {
    if requested.is_empty() {
        return Ok(VariationMap::new());
    }

    let axes: Vec<(String, f32, f32)> = font
        .axes()
        .iter()
        .map(|axis| (axis.tag().to_string(), axis.min_value(), axis.max_value()))
        .collect();

    if axes.is_empty() {
        log::warn!("Font {} is static; ignoring variation coordinates", path);
        return Ok(VariationMap::new());
    }

    let mut resolved = VariationMap::new();
    for (tag, value) in requested {
        let Some((_, min, max)) = axes.iter().find(|(t, _, _)| t == tag) else {
            let known: Vec<&str> = axes.iter().map(|(t, _, _)| t.as_str()).collect();
            return Err(RenderError::font_load(
                path.as_str(),
                format!("unknown variation axis '{tag}' (font has: {})", known.join(", ")),
            ));
        };
        let clamped = value.clamp(*min, *max);
        if (clamped - value).abs() > 0.001 {
            log::warn!(
                "Axis '{}' of {} clamped from {} to {} (bounds: [{}, {}])",
                tag,
                path,
                value,
                clamped,
                min,
                max
            );
        }
        resolved.insert(tag.clone(), clamped);
    }
    Ok(resolved)
}

/// LRU cache of [`LoadedFont`]s shared across jobs.
pub struct FontLoader {
    cache: Mutex<LruCache<FontKey, Arc<LoadedFont>>>,
}

impl FontLoader {
    /// Create a loader holding at most `capacity` instances (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return a cached instance or load it from disk.
    pub fn load(&self, path: &Utf8Path, coordinates: &VariationMap) -> Result<Arc<LoadedFont>> {
        let key = FontKey::new(path, coordinates);
        if let Some(font) = self.cache.lock().get(&key) {
            log::debug!("Font cache hit: {}", path);
            return Ok(Arc::clone(font));
        }

        // Parse outside the lock; a racing loader at worst parses twice.
        log::debug!("Font cache miss: {}", path);
        let font = Arc::new(LoadedFont::open(path, coordinates)?);
        if let Some((evicted, _)) = self.cache.lock().push(key.clone(), Arc::clone(&font)) {
            if evicted != key {
                log::debug!("Font cache evicted: {}", evicted.path);
            }
        }
        Ok(font)
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            capacity: cache.cap().get(),
            entries: cache.len(),
        }
    }

    /// Change capacity in place; shrinking drops least-recently-used entries.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| RenderError::InvalidInput("cache size must be at least 1".into()))?;
        self.cache.lock().resize(capacity);
        log::debug!("Font cache resized to {}", capacity);
        Ok(())
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl Default for FontLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_new() {
        let loader = FontLoader::new(512);
        assert_eq!(
            loader.stats(),
            CacheStats {
                capacity: 512,
                entries: 0
            }
        );
    }

    #[test]
    fn test_minimum_capacity() {
        assert_eq!(FontLoader::new(0).stats().capacity, 1);
    }

    #[test]
    fn test_resize() {
        let loader = FontLoader::new(128);
        loader.resize(64).unwrap();
        assert_eq!(loader.stats().capacity, 64);
        assert!(matches!(loader.resize(0), Err(RenderError::InvalidInput(_))));
        assert_eq!(loader.stats().capacity, 64);
    }

    #[test]
    fn test_missing_font_reports_path() {
        let loader = FontLoader::default();
        let err = loader
            .load(Utf8Path::new("/nonexistent/font.ttf"), &VariationMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/font.ttf"));
        assert_eq!(loader.stats().entries, 0);
    }

    #[test]
    fn test_garbage_file_is_font_load_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"definitely not a font").unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();

        let err = FontLoader::default()
            .load(path, &VariationMap::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::FontLoad { .. }));
    }
}
