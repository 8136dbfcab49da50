// this_file: crates/rasterhub-dispatch/src/select.rs

//! Engine selection policy
//!
//! `auto` prefers the external engines (`session`, then `binary`) and then
//! walks the platform's native order. An explicit preference is honoured
//! only when that engine is available; otherwise selection quietly falls
//! back to the default.
//!
//! `coretext` has no built-in engine. It takes part in selection only when a
//! host registers one (as [`Engine::External`](crate::Engine::External)), so
//! with the default registry `skia` leads the native order on macOS too.

use std::time::{Duration, Instant};

use camino::Utf8Path;
use rasterhub_core::{EngineSettings, RenderEngine, RenderError, Result};

use crate::pool::InstancePool;
use crate::registry::Registry;

pub const AUTO: &str = "auto";
pub const SESSION: &str = "session";
pub const BINARY: &str = "binary";
pub const SKIA: &str = "skia";
pub const HARFRUST: &str = "harfrust";
pub const CORETEXT: &str = "coretext";

/// Engines that run the `rasterhub` renderer rather than a native stack.
pub const EXTERNAL_ENGINES: [&str; 2] = [SESSION, BINARY];

/// Native engines in platform preference order.
///
/// Names that are not registered are skipped by every caller.
pub fn native_order() -> [&'static str; 3] {
    if cfg!(target_os = "macos") {
        [CORETEXT, SKIA, HARFRUST]
    } else {
        [SKIA, HARFRUST, CORETEXT]
    }
}

/// Full `auto` preference order: external engines first, then native ones.
pub fn preference_order() -> Vec<&'static str> {
    EXTERNAL_ENGINES
        .iter()
        .copied()
        .chain(native_order())
        .collect()
}

/// Pick from `available` (registration order) by preference, else the first one.
fn choose(available: &[String]) -> Result<String> {
    preference_order()
        .into_iter()
        .find(|name| available.iter().any(|a| a == name))
        .map(str::to_string)
        .or_else(|| available.first().cloned())
        .ok_or(RenderError::NoEngineAvailable)
}

/// Best available engine under the default policy.
pub fn default_engine<E>(registry: &Registry<E>) -> Result<String> {
    choose(&registry.available())
}

/// Knobs for [`resolve_engine`].
#[derive(Debug, Clone)]
pub struct SelectionOptions {
    /// Engine to use when available; `None` or `"auto"` means the default
    pub prefer: Option<String>,
    /// Fail unless `session` or `binary` is available
    pub require_external: bool,
    /// Fail unless `session` is available
    pub require_session: bool,
    /// When false, `session` and `binary` are never selected
    pub allow_external: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            prefer: None,
            require_external: false,
            require_session: false,
            allow_external: true,
        }
    }
}

impl SelectionOptions {
    pub fn prefer(name: impl Into<String>) -> Self {
        Self {
            prefer: Some(name.into()),
            ..Self::default()
        }
    }

    /// Native engines only.
    pub fn native_only() -> Self {
        Self {
            allow_external: false,
            ..Self::default()
        }
    }
}

/// Resolve an engine name under `options`.
pub fn resolve_engine<E>(registry: &Registry<E>, options: &SelectionOptions) -> Result<String> {
    let mut available = registry.available();

    if !options.allow_external {
        if options.require_external || options.require_session {
            return Err(RenderError::unavailable(
                SESSION,
                "external engines were requested but are disabled",
            ));
        }
        available.retain(|name| !EXTERNAL_ENGINES.contains(&name.as_str()));
    }

    let has = |name: &str| available.iter().any(|a| a == name);
    if options.require_session && !has(SESSION) {
        return Err(RenderError::unavailable(SESSION, "required but not available"));
    }
    if options.require_external && !has(SESSION) && !has(BINARY) {
        return Err(RenderError::unavailable(
            "session/binary",
            "an external engine is required but none is available",
        ));
    }

    if let Some(prefer) = options
        .prefer
        .as_deref()
        .filter(|p| !p.eq_ignore_ascii_case(AUTO))
    {
        let prefer = prefer.to_ascii_lowercase();
        if has(&prefer) {
            return Ok(prefer);
        }
        log::debug!("Preferred engine '{}' unavailable, using default", prefer);
    }

    choose(&available)
}

/// Available engine names joined by ", ", or `"none"`.
pub fn describe_available_engines<E>(registry: &Registry<E>) -> String {
    let available = registry.available();
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

/// Outcome of [`validate_engine_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCheck {
    pub ok: bool,
    pub message: String,
}

impl EngineCheck {
    fn new(ok: bool, message: impl Into<String>) -> Self {
        Self {
            ok,
            message: message.into(),
        }
    }
}

/// Check whether `requested` (an engine name or `auto`) can be used here.
pub fn validate_engine_request<E>(registry: &Registry<E>, requested: &str) -> EngineCheck {
    let available = registry.available();
    if available.is_empty() {
        return EngineCheck::new(false, "No renderer engines are available on this system");
    }
    let listing = available.join(", ");

    if requested.eq_ignore_ascii_case(AUTO) {
        return match choose(&available) {
            Ok(name) => EngineCheck::new(true, format!("Auto mode will use: {name}")),
            Err(e) => EngineCheck::new(false, e.to_string()),
        };
    }

    let requested = requested.to_ascii_lowercase();
    if !registry.contains(&requested) {
        return EngineCheck::new(
            false,
            format!("Unknown renderer '{requested}'. Available: {listing}"),
        );
    }
    if !available.contains(&requested) {
        return EngineCheck::new(
            false,
            format!("Renderer '{requested}' is not available. Available: {listing}"),
        );
    }
    EngineCheck::new(true, format!("Renderer '{requested}' is available"))
}

/// Timing of one engine in [`benchmark_engines`].
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub engine: String,
    pub iterations: u32,
    pub elapsed: Duration,
}

impl BenchmarkResult {
    pub fn per_iteration_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0 / f64::from(self.iterations.max(1))
    }
}

/// Canvas used by benchmarks unless the caller supplies one.
pub fn benchmark_settings(font_path: &Utf8Path) -> EngineSettings {
    EngineSettings::new(font_path, 1200, 200, 72.0)
}

/// Render `text` `iterations` times on each engine, fastest first.
///
/// `engines` defaults to every available engine. Engines that turn out to be
/// unavailable are skipped; render failures abort the benchmark.
pub fn benchmark_engines<E: RenderEngine>(
    pool: &InstancePool<E>,
    text: &str,
    settings: &EngineSettings,
    engines: Option<&[&str]>,
    iterations: u32,
) -> Result<Vec<BenchmarkResult>> {
    if iterations == 0 {
        return Err(RenderError::InvalidInput(
            "iterations must be positive".into(),
        ));
    }
    let selected: Vec<String> = match engines {
        Some(names) if !names.is_empty() => names.iter().map(|n| n.to_string()).collect(),
        _ => pool.registry().available(),
    };

    let mut results = Vec::with_capacity(selected.len());
    for name in selected {
        let engine = match pool.acquire(&name, settings) {
            Ok(engine) => engine,
            Err(RenderError::EngineUnavailable { reason, .. }) => {
                log::debug!("Skipping '{}' in benchmark: {}", name, reason);
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut engine = engine.lock();
        let start = Instant::now();
        for _ in 0..iterations {
            engine.render(text)?;
        }
        let elapsed = start.elapsed();
        log::debug!("Benchmark {}: {:?} for {} iterations", name, elapsed, iterations);
        results.push(BenchmarkResult {
            engine: name,
            iterations,
            elapsed,
        });
    }

    results.sort_by(|a, b| a.per_iteration_ms().total_cmp(&b.per_iteration_ms()));
    Ok(results)
}
