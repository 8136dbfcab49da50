// this_file: crates/rasterhub-dispatch/src/engines/mod.rs

//! The closed set of engines and the default registry.

mod binary;
mod harfrust;
mod session;

use std::sync::OnceLock;

use rasterhub_core::{Bitmap, FeatureMap, RenderEngine, RenderError, Result, VariationMap};
use rasterhub_render_skia::SkiaEngine;

pub use binary::BinaryEngine;
pub use harfrust::HarfrustEngine;
pub use session::SessionEngine;

use crate::config::{self, DispatchConfig};
use crate::pool::InstancePool;
use crate::registry::{EngineDescriptor, Registry};
use crate::select::{BINARY, HARFRUST, SESSION, SKIA};
use crate::{discovery, shared};

/// Every engine the dispatcher can hand out.
pub enum Engine {
    Session(SessionEngine),
    Binary(BinaryEngine),
    Harfrust(HarfrustEngine),
    Skia(SkiaEngine),
    /// Host-provided engine, e.g. a platform text stack registered as `coretext`
    External(Box<dyn RenderEngine>),
}

impl Engine {
    fn inner(&mut self) -> &mut dyn RenderEngine {
        match self {
            Engine::Session(e) => e,
            Engine::Binary(e) => e,
            Engine::Harfrust(e) => e,
            Engine::Skia(e) => e,
            Engine::External(e) => e.as_mut(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Engine::Session(_) => SESSION,
            Engine::Binary(_) => BINARY,
            Engine::Harfrust(_) => HARFRUST,
            Engine::Skia(_) => SKIA,
            Engine::External(e) => e.name(),
        };
        f.debug_tuple("Engine").field(&variant).finish()
    }
}

impl RenderEngine for Engine {
    fn name(&self) -> &'static str {
        match self {
            Engine::Session(e) => e.name(),
            Engine::Binary(e) => e.name(),
            Engine::Harfrust(e) => e.name(),
            Engine::Skia(e) => e.name(),
            Engine::External(e) => e.name(),
        }
    }

    fn render(&mut self, text: &str) -> Result<Bitmap> {
        self.inner().render(text)
    }

    fn update_dimensions(&mut self, width: u32, height: u32, font_size: f32) -> Result<()> {
        self.inner().update_dimensions(width, height, font_size)
    }

    fn update_tracking(&mut self, tracking: f32) -> Result<()> {
        self.inner().update_tracking(tracking)
    }

    fn set_features(&mut self, features: &FeatureMap) -> Result<()> {
        self.inner().set_features(features)
    }

    fn update_instance_coordinates(&mut self, coords: Option<&VariationMap>) -> Result<()> {
        self.inner().update_instance_coordinates(coords)
    }

    fn close(&mut self) -> Result<()> {
        self.inner().close()
    }
}

/// Registry of the built-in engines under `config`.
///
/// There is no built-in `coretext` entry; a host registers its platform
/// engine as [`Engine::External`] through [`Registry::register`].
pub fn registry_with(config: &DispatchConfig) -> Registry<Engine> {
    let session_enabled = config.session_enabled;
    let binary_override = config.binary.clone();
    let call_timeout = config.call_timeout;
    let cache_size = config.cache_size;

    let locate = move || {
        let cwd = std::env::current_dir().unwrap_or_default();
        let path_var = std::env::var_os("PATH");
        discovery::resolve_binary(binary_override.as_deref(), &cwd, path_var.as_deref())
    };
    let probe_locate = locate.clone();

    Registry::new()
        .with(EngineDescriptor::new(
            SESSION,
            move || session_enabled,
            |settings| SessionEngine::new(settings).map(Engine::Session),
        ))
        .with(EngineDescriptor::new(
            BINARY,
            move || probe_locate().is_some(),
            move |settings| {
                let program = locate().ok_or_else(|| {
                    RenderError::unavailable(
                        BINARY,
                        format!(
                            "rasterhub binary not found; searched: {}",
                            discovery::searched_locations().join("; ")
                        ),
                    )
                })?;
                BinaryEngine::new(settings, program, cache_size, call_timeout).map(Engine::Binary)
            },
        ))
        .with(EngineDescriptor::new(
            SKIA,
            rasterhub_render_skia::is_available,
            |settings| SkiaEngine::new(settings).map(Engine::Skia),
        ))
        .with(EngineDescriptor::new(
            HARFRUST,
            || true,
            |settings| HarfrustEngine::new(settings).map(Engine::Harfrust),
        ))
}

/// Registry of the built-in engines under the global configuration.
pub fn default_registry() -> Registry<Engine> {
    registry_with(config::global())
}

static POOL: OnceLock<InstancePool<Engine>> = OnceLock::new();

/// Process-wide instance pool. Clearing it also tears down the shared session.
pub fn default_pool() -> &'static InstancePool<Engine> {
    POOL.get_or_init(|| {
        InstancePool::new(default_registry(), config::global().pool_capacity)
            .on_clear(shared::teardown)
    })
}
