//! In-process renderer for rasterhub
//!
//! Loads fonts through an LRU cache, shapes with harfrust, rasterizes with
//! zeno and packages the result as a job result line. The same machinery
//! backs the `rasterhub` binary, the streaming session and the `harfrust`
//! engine.

pub mod font_cache;
pub mod process;
pub mod raster;
pub mod session;
pub mod shaping;

pub use font_cache::{CacheStats, FontLoader, LoadedFont, DEFAULT_CACHE_SIZE};
pub use process::{job_settings, process_job, render_text, ProcessOptions};
pub use session::StreamingSession;
pub use shaping::{shape_text, ShapedGlyph, ShapedText, TextHints};
