pub mod batch;
pub mod engines;
pub mod render;
pub mod render_batch;
pub mod stream;
pub mod validate;

use std::time::Duration;

use anyhow::{Context, Result};
use rasterhub_core::VariationMap;
use rasterhub_render::ProcessOptions;

use crate::cli::JobOptions;

impl JobOptions {
    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            base_dir: self.base_dir.clone(),
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Parse `wght=700` style axis settings.
pub fn parse_variations(specs: &[String]) -> Result<VariationMap> {
    specs
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|spec| {
            let (tag, value) = spec
                .split_once('=')
                .with_context(|| format!("variation '{spec}' must look like tag=value"))?;
            let value: f32 = value
                .trim()
                .parse()
                .with_context(|| format!("bad value in variation '{spec}'"))?;
            Ok((tag.trim().to_string(), value))
        })
        .collect()
}
