// this_file: crates/rasterhub-dispatch/src/pool.rs

//! Bounded pool of engine instances
//!
//! Instances are keyed by engine, font, canvas, size, features and tracking.
//! Variation coordinates are not part of the key: a hit reuses the instance
//! and moves it to the new coordinates in place. When the pool overflows the
//! least-recently-used instance is evicted and closed.

use std::num::NonZeroUsize;
use std::sync::Arc;

use camino::Utf8PathBuf;
use lru::LruCache;
use parking_lot::Mutex;
use rasterhub_core::{EngineSettings, RenderEngine, RenderError, Result};

use crate::registry::Registry;
use crate::select::{default_engine, native_order, AUTO};

/// Pooled engine handle.
pub type SharedEngine<E> = Arc<Mutex<E>>;

/// Identity of a pooled instance. Floats are keyed by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub engine: String,
    pub font_path: Utf8PathBuf,
    pub width: u32,
    pub height: u32,
    font_size_bits: u32,
    pub features: Vec<(String, u32)>,
    tracking_bits: u32,
}

impl PoolKey {
    pub fn new(engine: &str, settings: &EngineSettings) -> Self {
        Self {
            engine: engine.to_string(),
            font_path: settings.font_path.clone(),
            width: settings.width,
            height: settings.height,
            font_size_bits: settings.font_size.to_bits(),
            // FeatureMap is ordered, so this is already sorted by tag
            features: settings
                .features
                .iter()
                .map(|(tag, value)| (tag.clone(), *value))
                .collect(),
            tracking_bits: settings.tracking.to_bits(),
        }
    }

    pub fn font_size(&self) -> f32 {
        f32::from_bits(self.font_size_bits)
    }

    pub fn tracking(&self) -> f32 {
        f32::from_bits(self.tracking_bits)
    }
}

type ClearHook = Box<dyn Fn() + Send + Sync>;

/// LRU pool of engine instances built through a [`Registry`].
pub struct InstancePool<E> {
    registry: Arc<Registry<E>>,
    entries: Mutex<LruCache<PoolKey, SharedEngine<E>>>,
    on_clear: Option<ClearHook>,
}

fn close_quietly<E: RenderEngine>(engine: &SharedEngine<E>) {
    let mut engine = engine.lock();
    if let Err(e) = engine.close() {
        log::debug!("Ignoring close failure of '{}': {}", engine.name(), e);
    }
}

/// Apply `settings` to a reused instance. Failures are logged, never raised.
fn refresh<E: RenderEngine>(engine: &SharedEngine<E>, settings: &EngineSettings) {
    let mut engine = engine.lock();
    let name = engine.name();
    let steps = [
        engine.update_dimensions(settings.width, settings.height, settings.font_size),
        engine.update_tracking(settings.tracking),
        engine.set_features(&settings.features),
        engine.update_instance_coordinates(settings.variations.as_ref()),
    ];
    for err in steps.into_iter().filter_map(|r| r.err()) {
        log::warn!("Ignoring update failure on pooled '{}': {}", name, err);
    }
}

impl<E: RenderEngine> InstancePool<E> {
    pub fn new(registry: Registry<E>, capacity: usize) -> Self {
        Self::with_registry(Arc::new(registry), capacity)
    }

    pub fn with_registry(registry: Arc<Registry<E>>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            entries: Mutex::new(LruCache::new(capacity)),
            on_clear: None,
        }
    }

    /// Run `hook` after every [`clear`](Self::clear).
    pub fn on_clear(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_clear = Some(Box::new(hook));
        self
    }

    pub fn registry(&self) -> &Registry<E> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Pooled instance of `engine` for `settings`, built on first use.
    ///
    /// `"auto"` resolves through [`default_engine`]. Unknown or unavailable
    /// engines fail with [`RenderError::EngineUnavailable`]; constructor
    /// errors pass through unchanged.
    ///
    /// The returned handle is shared with every caller using the same key,
    /// and variation coordinates are not part of that key. Another thread may
    /// move the instance to its own coordinates before this caller locks it.
    /// Use [`with_engine`](Self::with_engine) to render at the requested
    /// coordinates.
    pub fn acquire(&self, engine: &str, settings: &EngineSettings) -> Result<SharedEngine<E>> {
        let name = if engine.eq_ignore_ascii_case(AUTO) {
            default_engine(&self.registry)?
        } else {
            engine.to_ascii_lowercase()
        };
        let descriptor = self
            .registry
            .get(&name)
            .ok_or_else(|| RenderError::unavailable(&name, "unknown renderer engine"))?;
        if !descriptor.is_available() {
            return Err(RenderError::unavailable(
                &name,
                "not available on this system",
            ));
        }

        let key = PoolKey::new(&name, settings);
        let mut entries = self.entries.lock();

        if let Some(found) = entries.get(&key) {
            let found = Arc::clone(found);
            drop(entries);
            log::debug!("Pool hit for '{}' on {}", name, settings.font_path);
            refresh(&found, settings);
            return Ok(found);
        }

        log::debug!("Pool miss for '{}' on {}", name, settings.font_path);
        let shared = Arc::new(Mutex::new(descriptor.construct(settings)?));
        let evicted = entries.push(key.clone(), Arc::clone(&shared));
        drop(entries);

        if let Some((old_key, old)) = evicted.filter(|(k, _)| *k != key) {
            log::debug!("Evicting '{}' for {}", old_key.engine, old_key.font_path);
            close_quietly(&old);
        }
        Ok(shared)
    }

    /// Acquire `engine` and run `f` on it under its lock, after moving it to
    /// the coordinates in `settings` under that same lock.
    pub fn with_engine<T>(
        &self,
        engine: &str,
        settings: &EngineSettings,
        f: impl FnOnce(&mut E) -> Result<T>,
    ) -> Result<T> {
        let shared = self.acquire(engine, settings)?;
        let mut locked = shared.lock();
        locked.update_instance_coordinates(settings.variations.as_ref())?;
        f(&mut locked)
    }

    /// Like [`acquire`](Self::acquire), but walks the fallback order when
    /// the requested engine cannot be built.
    ///
    /// Order: the requested engine (or the default for `"auto"`), then the
    /// platform's native engines, then any other available engine.
    /// Geometry is validated up front; after that per-engine failures are
    /// logged and skipped.
    pub fn acquire_with_fallback(
        &self,
        engine: &str,
        settings: &EngineSettings,
    ) -> Result<SharedEngine<E>> {
        settings.validate()?;

        let mut tried: Vec<String> = Vec::new();
        let first = if engine.eq_ignore_ascii_case(AUTO) {
            default_engine(&self.registry).ok()
        } else {
            Some(engine.to_ascii_lowercase())
        };
        if let Some(first) = first {
            match self.acquire(&first, settings) {
                Ok(found) => return Ok(found),
                Err(e) => log::warn!("Renderer {} failed: {}, trying alternatives", first, e),
            }
            tried.push(first);
        }

        let available = self.registry.available();
        let native = native_order();
        let candidates = native
            .iter()
            .map(|n| n.to_string())
            .filter(|n| available.contains(n))
            .chain(
                available
                    .iter()
                    .filter(|n| !native.contains(&n.as_str()))
                    .cloned(),
            );

        for candidate in candidates {
            if tried.contains(&candidate) {
                continue;
            }
            match self.acquire(&candidate, settings) {
                Ok(found) => return Ok(found),
                Err(e) => log::debug!("Fallback renderer {} failed: {}", candidate, e),
            }
            tried.push(candidate);
        }

        log::error!(
            "No renderer could be initialised for font {}",
            settings.font_path
        );
        Err(RenderError::NoEngineAvailable)
    }

    /// Close and drop every pooled instance, then run the clear hook.
    pub fn clear(&self) {
        let drained: Vec<SharedEngine<E>> = {
            let mut entries = self.entries.lock();
            let drained = entries.iter().map(|(_, v)| Arc::clone(v)).collect();
            entries.clear();
            drained
        };
        log::debug!("Clearing {} pooled instance(s)", drained.len());
        for engine in &drained {
            close_quietly(engine);
        }
        if let Some(hook) = &self.on_clear {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasterhub_core::engine::{FeatureMap, VariationMap};
    use rasterhub_core::Bitmap;

    struct Stub;

    impl RenderEngine for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn render(&mut self, _text: &str) -> Result<Bitmap> {
            Bitmap::new(1, 1)
        }
        fn update_dimensions(&mut self, _w: u32, _h: u32, _s: f32) -> Result<()> {
            Ok(())
        }
        fn update_tracking(&mut self, _t: f32) -> Result<()> {
            Ok(())
        }
        fn set_features(&mut self, _f: &FeatureMap) -> Result<()> {
            Ok(())
        }
        fn update_instance_coordinates(&mut self, _c: Option<&VariationMap>) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_key_ignores_variations() {
        let base = EngineSettings::new("/f.ttf", 100, 50, 24.0);
        let varied = base.clone().with_variations(VariationMap::from([("wght".into(), 700.0)]));
        assert_eq!(PoolKey::new("skia", &base), PoolKey::new("skia", &varied));
    }

    #[test]
    fn test_key_tracks_geometry_and_features() {
        let base = EngineSettings::new("/f.ttf", 100, 50, 24.0);
        let key = PoolKey::new("skia", &base);
        assert_ne!(key, PoolKey::new("harfrust", &base));
        assert_ne!(key, PoolKey::new("skia", &base.clone().with_tracking(10.0)));
        let mut bigger = base.clone();
        bigger.font_size = 25.0;
        assert_ne!(key, PoolKey::new("skia", &bigger));
        let liga = base.clone().with_features(FeatureMap::from([("liga".into(), 0)]));
        assert_ne!(key, PoolKey::new("skia", &liga));
        assert_eq!(key.font_size(), 24.0);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let pool: InstancePool<Stub> = InstancePool::new(Registry::new(), 0);
        assert_eq!(pool.capacity(), 1);
        assert!(pool.is_empty());
    }
}
