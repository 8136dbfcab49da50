//! Instance pool behaviour with a counting stand-in engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rasterhub_core::{
    Bitmap, EngineSettings, FeatureMap, RenderEngine, RenderError, Result, VariationMap,
};
use rasterhub_dispatch::{EngineDescriptor, InstancePool, Registry};

#[derive(Debug, Default)]
struct Counters {
    built: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug)]
struct Counting {
    settings: EngineSettings,
    counters: Arc<Counters>,
    fail_updates: bool,
}

impl RenderEngine for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn render(&mut self, text: &str) -> Result<Bitmap> {
        if text.is_empty() {
            return Err(RenderError::InvalidInput("text must not be empty".into()));
        }
        Bitmap::new(self.settings.width, self.settings.height)
    }

    fn update_dimensions(&mut self, width: u32, height: u32, font_size: f32) -> Result<()> {
        if self.fail_updates {
            return Err(RenderError::InvalidInput("refusing update".into()));
        }
        self.settings.width = width;
        self.settings.height = height;
        self.settings.font_size = font_size;
        Ok(())
    }

    fn update_tracking(&mut self, tracking: f32) -> Result<()> {
        self.settings.tracking = tracking;
        Ok(())
    }

    fn set_features(&mut self, features: &FeatureMap) -> Result<()> {
        self.settings.features = features.clone();
        Ok(())
    }

    fn update_instance_coordinates(&mut self, coords: Option<&VariationMap>) -> Result<()> {
        self.settings.variations = coords.cloned();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Err(RenderError::InvalidInput("close always complains".into()))
    }
}

fn pool(capacity: usize, fail_updates: bool) -> (InstancePool<Counting>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let for_ctor = Arc::clone(&counters);
    let registry = Registry::new()
        .with(EngineDescriptor::new("counting", || true, move |settings: &EngineSettings| {
            settings.validate()?;
            for_ctor.built.fetch_add(1, Ordering::SeqCst);
            Ok(Counting {
                settings: settings.clone(),
                counters: Arc::clone(&for_ctor),
                fail_updates,
            })
        }))
        .with(EngineDescriptor::new("offline", || false, |_: &EngineSettings| {
            Err(RenderError::unavailable("offline", "never built"))
        }));
    (InstancePool::new(registry, capacity), counters)
}

fn settings(width: u32) -> EngineSettings {
    EngineSettings::new("/fonts/Test.ttf", width, 50, 24.0)
}

#[test]
fn variation_change_reuses_instance() {
    let (pool, counters) = pool(8, false);
    let light = settings(100).with_variations(VariationMap::from([("wght".into(), 300.0)]));
    let bold = settings(100).with_variations(VariationMap::from([("wght".into(), 700.0)]));

    let first = pool.acquire("counting", &light).unwrap();
    let second = pool.acquire("counting", &bold).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    let coords = second.lock().settings.variations.clone().unwrap();
    assert_eq!(coords.get("wght"), Some(&700.0));
}

#[test]
fn geometry_features_and_tracking_split_entries() {
    let (pool, counters) = pool(8, false);
    let base = pool.acquire("counting", &settings(100)).unwrap();

    let wider = pool.acquire("counting", &settings(120)).unwrap();
    let mut bigger_settings = settings(100);
    bigger_settings.font_size = 30.0;
    let bigger = pool.acquire("counting", &bigger_settings).unwrap();
    let tracked = pool
        .acquire("counting", &settings(100).with_tracking(25.0))
        .unwrap();
    let no_liga = pool
        .acquire(
            "counting",
            &settings(100).with_features(FeatureMap::from([("liga".into(), 0)])),
        )
        .unwrap();

    for other in [&wider, &bigger, &tracked, &no_liga] {
        assert!(!Arc::ptr_eq(&base, other));
    }
    assert_eq!(pool.len(), 5);
    assert_eq!(counters.built.load(Ordering::SeqCst), 5);
}

#[test]
fn lru_eviction_closes_oldest() {
    let (pool, counters) = pool(2, false);
    let a = pool.acquire("counting", &settings(10)).unwrap();
    let _b = pool.acquire("counting", &settings(20)).unwrap();

    // Touch A so B becomes the least recently used entry.
    let a_again = pool.acquire("counting", &settings(10)).unwrap();
    assert!(Arc::ptr_eq(&a, &a_again));

    let _c = pool.acquire("counting", &settings(30)).unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    // A survived, B was evicted and must be rebuilt.
    let built_before = counters.built.load(Ordering::SeqCst);
    assert!(Arc::ptr_eq(&a, &pool.acquire("counting", &settings(10)).unwrap()));
    assert_eq!(counters.built.load(Ordering::SeqCst), built_before);
    pool.acquire("counting", &settings(20)).unwrap();
    assert_eq!(counters.built.load(Ordering::SeqCst), built_before + 1);
    assert!(pool.len() <= 2);
}

#[test]
fn occupancy_never_exceeds_capacity() {
    let (pool, counters) = pool(4, false);
    for width in 1..=20 {
        pool.acquire("counting", &settings(width)).unwrap();
        assert!(pool.len() <= 4);
    }
    assert_eq!(counters.closed.load(Ordering::SeqCst), 16);
}

#[test]
fn failing_updates_are_swallowed_on_hit() {
    let (pool, _) = pool(4, true);
    let first = pool.acquire("counting", &settings(100)).unwrap();
    let second = pool.acquire("counting", &settings(100)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn constructor_errors_propagate_unchanged() {
    let (pool, counters) = pool(4, false);
    let err = pool.acquire("counting", &settings(0)).unwrap_err();
    assert!(matches!(err, RenderError::InvalidGeometry(_)));
    assert_eq!(counters.built.load(Ordering::SeqCst), 0);
    assert!(pool.is_empty());
}

#[test]
fn unknown_and_unavailable_engines() {
    let (pool, _) = pool(4, false);
    assert!(matches!(
        pool.acquire("nope", &settings(10)),
        Err(RenderError::EngineUnavailable { .. })
    ));
    assert!(matches!(
        pool.acquire("offline", &settings(10)),
        Err(RenderError::EngineUnavailable { .. })
    ));
}

#[test]
fn auto_and_fallback_resolve_to_available_engine() {
    let (pool, _) = pool(4, false);
    let auto = pool.acquire("auto", &settings(10)).unwrap();
    assert_eq!(auto.lock().name(), "counting");

    let fallback = pool.acquire_with_fallback("offline", &settings(10)).unwrap();
    assert!(Arc::ptr_eq(&auto, &fallback));
}

#[test]
fn fallback_validates_geometry_first() {
    let (pool, _) = pool(4, false);
    assert!(matches!(
        pool.acquire_with_fallback("counting", &settings(0)),
        Err(RenderError::InvalidGeometry(_))
    ));
}

#[test]
fn fallback_exhaustion_is_no_engine() {
    let registry: Registry<Counting> = Registry::new().with(EngineDescriptor::new(
        "broken",
        || true,
        |_: &EngineSettings| Err(RenderError::font_load("/fonts/Test.ttf", "corrupt")),
    ));
    let pool = InstancePool::new(registry, 4);
    assert!(matches!(
        pool.acquire_with_fallback("auto", &settings(10)),
        Err(RenderError::NoEngineAvailable)
    ));
}

#[test]
fn clear_closes_everything_and_runs_hook() {
    let hook_runs = Arc::new(AtomicUsize::new(0));
    let (pool, counters) = pool(8, false);
    let hook_counter = Arc::clone(&hook_runs);
    let pool = pool.on_clear(move || {
        hook_counter.fetch_add(1, Ordering::SeqCst);
    });

    for width in [10, 20, 30] {
        pool.acquire("counting", &settings(width)).unwrap();
    }
    pool.clear();

    assert!(pool.is_empty());
    assert_eq!(counters.closed.load(Ordering::SeqCst), 3);
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);

    pool.acquire("counting", &settings(10)).unwrap();
    assert_eq!(counters.built.load(Ordering::SeqCst), 4);
}

#[test]
fn concurrent_acquire_builds_once_per_key() {
    let (pool, counters) = pool(8, false);
    let pool = Arc::new(pool);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let engine = pool.acquire("counting", &settings(64)).unwrap();
                let bitmap = engine.lock().render("x").unwrap();
                bitmap.shape()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), (50, 64));
    }
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
}

#[test]
fn with_engine_renders_at_the_callers_coordinates() {
    let (pool, counters) = pool(8, false);
    let pool = Arc::new(pool);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let weight = 100.0 * (i + 1) as f32;
                let wanted = settings(64).with_variations(VariationMap::from([("wght".into(), weight)]));
                for _ in 0..50 {
                    let seen = pool
                        .with_engine("counting", &wanted, |engine| {
                            engine.render("x")?;
                            Ok(engine.settings.variations.clone())
                        })
                        .unwrap();
                    assert_eq!(seen.unwrap().get("wght"), Some(&weight));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
}

#[test]
fn with_engine_clears_coordinates_when_none_requested() {
    let (pool, _) = pool(8, false);
    let bold = settings(64).with_variations(VariationMap::from([("wght".into(), 700.0)]));
    pool.acquire("counting", &bold).unwrap();

    let seen = pool
        .with_engine("counting", &settings(64), |engine| Ok(engine.settings.variations.clone()))
        .unwrap();
    assert!(seen.is_none());
}
