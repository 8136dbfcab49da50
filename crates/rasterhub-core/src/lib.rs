//! Rasterhub core: the pieces every engine and dispatcher agrees on.
//!
//! - [`Bitmap`]: the grayscale canvas every engine returns
//! - [`RenderEngine`]: the contract each rendering engine implements
//! - [`job`]: the job-spec wire protocol shared by the batch and stream modes
//! - [`codec`]: PGM/PNG payload encoding and decoding
//! - [`limits`]: input size limits and font path sanitisation

pub mod bitmap;
pub mod codec;
pub mod engine;
pub mod error;
pub mod job;
pub mod limits;

pub use bitmap::Bitmap;
pub use engine::{EngineSettings, FeatureMap, RenderEngine, VariationMap};
pub use error::{RenderError, Result};
pub use job::{
    FontConfig, Job, JobResult, JobSpec, RenderingConfig, RenderingOutput, TextConfig, TimingInfo,
    ValidationError,
};
pub use limits::SecurityError;

/// Fraction of the canvas height at which the text baseline sits.
pub const BASELINE_RATIO: f32 = 0.75;

/// Protocol version accepted in job-spec documents.
pub const PROTOCOL_VERSION: &str = "1.0";
