//! Engine selection, instance pooling and batch dispatch for rasterhub
//!
//! ```no_run
//! use rasterhub_core::{EngineSettings, RenderEngine};
//! use rasterhub_dispatch::engines::default_pool;
//!
//! # fn main() -> rasterhub_core::Result<()> {
//! let settings = EngineSettings::new("fonts/Inter.ttf", 600, 120, 72.0);
//! let engine = default_pool().acquire_with_fallback("auto", &settings)?;
//! let bitmap = engine.lock().render("Hello")?;
//! assert_eq!(bitmap.shape(), (120, 600));
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod discovery;
pub mod engines;
pub mod pool;
pub mod registry;
pub mod select;
pub mod shared;
pub mod transport;

pub use batch::{group_by_geometry, BatchRunner, Geometry, JobOutcome, RenderRequest};
pub use config::DispatchConfig;
pub use engines::{default_pool, default_registry, Engine};
pub use pool::{InstancePool, PoolKey, SharedEngine};
pub use registry::{EngineDescriptor, Registry};
pub use select::{
    benchmark_engines, default_engine, describe_available_engines, resolve_engine,
    validate_engine_request, BenchmarkResult, EngineCheck, SelectionOptions,
};
pub use transport::{ChunkTransport, InProcessTransport, SubprocessTransport};
