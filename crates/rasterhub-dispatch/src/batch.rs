// this_file: crates/rasterhub-dispatch/src/batch.rs

//! Batch dispatch through the job-spec protocol
//!
//! Requests are split into chunks, each chunk becomes one job-spec document,
//! and chunks run concurrently on a small rayon pool. Result lines come back
//! in any order and are matched to requests by id only.
//!
//! A failed job is reported in its own slot of the output map. Transport
//! failures and requests that never got an answer fail the whole batch.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use camino::Utf8PathBuf;
use rasterhub_core::codec::decode_rendering;
use rasterhub_core::engine::{validate_geometry, validate_text, VariationMap};
use rasterhub_core::{
    Bitmap, FontConfig, Job, JobResult, JobSpec, RenderError, RenderingConfig, Result, TextConfig,
    PROTOCOL_VERSION,
};
use rasterhub_render::StreamingSession;
use rayon::prelude::*;
use serde_json::Value;

use crate::config::DispatchConfig;
use crate::discovery::{resolve_binary, searched_locations};
use crate::select::BINARY;
use crate::transport::{ChunkTransport, InProcessTransport, SubprocessTransport};

/// One text to render; font and variations are shared by the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Unique within a batch
    pub id: String,
    pub text: String,
    pub width: u32,
    pub height: u32,
    pub font_size: f32,
    pub script: Option<String>,
    pub direction: Option<String>,
    pub language: Option<String>,
}

impl RenderRequest {
    /// Request with Latin, left-to-right, English hints.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        width: u32,
        height: u32,
        font_size: f32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            width,
            height,
            font_size,
            script: Some("Latn".into()),
            direction: Some("ltr".into()),
            language: Some("en".into()),
        }
    }

    pub fn with_hints(
        mut self,
        script: Option<&str>,
        direction: Option<&str>,
        language: Option<&str>,
    ) -> Self {
        self.script = script.map(str::to_string);
        self.direction = direction.map(str::to_string);
        self.language = language.map(str::to_string);
        self
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            width: self.width,
            height: self.height,
            font_size_bits: self.font_size.to_bits(),
        }
    }
}

/// Canvas and size shared by a group of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    font_size_bits: u32,
}

impl Geometry {
    pub fn font_size(&self) -> f32 {
        f32::from_bits(self.font_size_bits)
    }
}

/// A rendered bitmap or the job's error message.
pub type JobOutcome = std::result::Result<Bitmap, String>;

/// Dispatches batches of [`RenderRequest`]s to a backend.
pub struct BatchRunner {
    font_path: Utf8PathBuf,
    variations: VariationMap,
    config: DispatchConfig,
    transport: Arc<dyn ChunkTransport>,
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("font_path", &self.font_path)
            .field("variations", &self.variations)
            .field("chunk_size", &self.config.chunk_size)
            .finish_non_exhaustive()
    }
}

impl BatchRunner {
    /// Runner backed by the `rasterhub` binary.
    ///
    /// Fails with [`RenderError::EngineUnavailable`] when no binary can be found.
    pub fn new(
        font_path: impl Into<Utf8PathBuf>,
        variations: Option<VariationMap>,
        config: DispatchConfig,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let path_var = std::env::var_os("PATH");
        let binary = resolve_binary(config.binary.as_deref(), &cwd, path_var.as_deref())
            .ok_or_else(|| {
                RenderError::unavailable(
                    BINARY,
                    format!(
                        "rasterhub binary not found for batch rendering; searched: {}",
                        searched_locations().join("; ")
                    ),
                )
            })?;
        log::debug!("Batch runner using {}", binary.display());
        let transport =
            SubprocessTransport::batch(binary, config.cache_size, config.chunk_timeout);
        Ok(Self::with_transport(
            font_path,
            variations,
            config,
            Arc::new(transport),
        ))
    }

    /// Runner that renders in this process on `session`.
    pub fn in_process(
        font_path: impl Into<Utf8PathBuf>,
        variations: Option<VariationMap>,
        config: DispatchConfig,
        session: Arc<StreamingSession>,
    ) -> Self {
        Self::with_transport(
            font_path,
            variations,
            config,
            Arc::new(InProcessTransport::new(session)),
        )
    }

    pub fn with_transport(
        font_path: impl Into<Utf8PathBuf>,
        variations: Option<VariationMap>,
        config: DispatchConfig,
        transport: Arc<dyn ChunkTransport>,
    ) -> Self {
        Self {
            font_path: font_path.into(),
            variations: variations.unwrap_or_default(),
            config: config.normalized(),
            transport,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn job_for(&self, request: &RenderRequest) -> Job {
        Job {
            id: request.id.clone(),
            font: FontConfig {
                path: self.font_path.clone(),
                size: request.font_size,
                variations: self.variations.clone(),
            },
            text: TextConfig {
                content: request.text.clone(),
                script: request.script.clone(),
                direction: request.direction.clone(),
                language: request.language.clone(),
                features: Vec::new(),
                tracking: 0.0,
            },
            rendering: RenderingConfig {
                format: "pgm".into(),
                encoding: "base64".into(),
                width: request.width,
                height: request.height,
            },
        }
    }

    /// Render every request; the map holds exactly one entry per request id.
    pub fn render_requests(
        &self,
        requests: &[RenderRequest],
    ) -> Result<HashMap<String, JobOutcome>> {
        if requests.is_empty() {
            return Ok(HashMap::new());
        }
        check_requests(requests)?;

        let chunks: Vec<&[RenderRequest]> = requests.chunks(self.config.chunk_size).collect();
        let workers = chunks.len().min(self.config.max_workers).max(1);
        log::debug!(
            "Dispatching {} request(s) in {} chunk(s) on {} worker(s)",
            requests.len(),
            chunks.len(),
            workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| RenderError::Transport(format!("cannot start worker pool: {e}")))?;
        let per_chunk: Vec<HashMap<String, JobOutcome>> = pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| self.run_chunk(chunk))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut results: HashMap<String, JobOutcome> = HashMap::with_capacity(requests.len());
        for chunk in per_chunk {
            results.extend(chunk);
        }

        let missing: Vec<String> = requests
            .iter()
            .filter(|r| !results.contains_key(&r.id))
            .map(|r| r.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(RenderError::MissingResults { ids: missing });
        }
        Ok(results)
    }

    /// Like [`render_requests`](Self::render_requests), in request order.
    pub fn render_in_order(&self, requests: &[RenderRequest]) -> Result<Vec<JobOutcome>> {
        let mut results = self.render_requests(requests)?;
        requests
            .iter()
            .map(|r| {
                results
                    .remove(&r.id)
                    .ok_or_else(|| RenderError::MissingResults {
                        ids: vec![r.id.clone()],
                    })
            })
            .collect()
    }

    fn run_chunk(&self, chunk: &[RenderRequest]) -> Result<HashMap<String, JobOutcome>> {
        let spec = JobSpec {
            version: PROTOCOL_VERSION.to_string(),
            jobs: chunk.iter().map(|r| self.job_for(r)).collect(),
        };
        let payload = serde_json::to_string(&spec)?;
        let output = self.transport.run_chunk(&payload)?;
        Ok(correlate(&output, chunk))
    }
}

/// Ids must be unique and every request must pass geometry and text checks
/// before anything is sent.
fn check_requests(requests: &[RenderRequest]) -> Result<()> {
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if request.id.is_empty() {
            return Err(RenderError::InvalidInput("request id must not be empty".into()));
        }
        if !seen.insert(request.id.as_str()) {
            return Err(RenderError::InvalidInput(format!(
                "duplicate request id: {}",
                request.id
            )));
        }
        validate_text(&request.text)?;
        validate_geometry(request.width, request.height, request.font_size)?;
    }
    Ok(())
}

/// Match result lines to `chunk` by id.
///
/// Lines that cannot be attributed to a job are skipped. Attributable lines
/// with an error status or an unusable payload become job errors.
pub fn correlate(output: &str, chunk: &[RenderRequest]) -> HashMap<String, JobOutcome> {
    let expected: HashMap<&str, &RenderRequest> =
        chunk.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut results = HashMap::with_capacity(chunk.len());

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            log::debug!("Skipping non-JSON backend output: {}", truncate(line));
            continue;
        };
        let Some(id) = value.get("id").and_then(Value::as_str).map(str::to_string) else {
            log::debug!("Skipping backend line without id: {}", truncate(line));
            continue;
        };
        let Some(request) = expected.get(id.as_str()) else {
            log::warn!("Ignoring result for unknown job id {}", id);
            continue;
        };
        if results.contains_key(&id) {
            log::warn!("Ignoring duplicate result for job {}", id);
            continue;
        }
        let outcome = outcome_of(value, request);
        results.insert(id, outcome);
    }
    results
}

fn outcome_of(value: Value, request: &RenderRequest) -> JobOutcome {
    let result: JobResult =
        serde_json::from_value(value).map_err(|e| format!("malformed result: {e}"))?;
    if !result.is_success() {
        return Err(result.error.unwrap_or_else(|| "unknown error".to_string()));
    }
    let rendering = result
        .rendering
        .ok_or_else(|| format!("job {} missing image data", request.id))?;
    let bitmap = decode_rendering(&rendering).map_err(|e| e.to_string())?;
    bitmap
        .ensure_shape(request.width, request.height)
        .map_err(|e| e.to_string())?;
    Ok(bitmap)
}

fn truncate(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Render `requests` and group the bitmaps by geometry, then by text.
///
/// Failed jobs are logged and left out.
pub fn group_by_geometry(
    runner: &BatchRunner,
    requests: &[RenderRequest],
) -> Result<HashMap<Geometry, HashMap<String, Bitmap>>> {
    let outcomes = runner.render_requests(requests)?;
    let mut grouped: HashMap<Geometry, HashMap<String, Bitmap>> = HashMap::new();
    for request in requests {
        match outcomes.get(&request.id) {
            Some(Ok(bitmap)) => {
                grouped
                    .entry(request.geometry())
                    .or_default()
                    .insert(request.text.clone(), bitmap.clone());
            }
            Some(Err(e)) => log::warn!("Job {} failed: {}", request.id, e),
            None => {}
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasterhub_core::codec::encode_rendering;
    use rasterhub_core::TimingInfo;

    fn ok_line(id: &str, w: u32, h: u32) -> String {
        let bitmap = Bitmap::new(w, h).unwrap();
        let rendering = encode_rendering(&bitmap, "pgm").unwrap();
        JobResult::success(id, rendering, TimingInfo::default())
            .to_json_line()
            .unwrap()
    }

    #[test]
    fn test_correlate_by_id_any_order() {
        let chunk = vec![
            RenderRequest::new("a", "A", 4, 2, 8.0),
            RenderRequest::new("b", "B", 4, 2, 8.0),
        ];
        let output = format!("{}\n{}\n", ok_line("b", 4, 2), ok_line("a", 4, 2));
        let results = correlate(&output, &chunk);
        assert_eq!(results.len(), 2);
        assert_eq!(results["a"].as_ref().unwrap().shape(), (2, 4));
    }

    #[test]
    fn test_correlate_skips_noise_and_strangers() {
        let chunk = vec![RenderRequest::new("a", "A", 4, 2, 8.0)];
        let output = format!(
            "warming up\n[1,2]\n{{\"no_id\":true}}\n{}\n{}\n{}\n",
            ok_line("zzz", 4, 2),
            JobResult::error("a", "first").to_json_line().unwrap(),
            ok_line("a", 4, 2),
        );
        let results = correlate(&output, &chunk);
        assert_eq!(results.len(), 1);
        assert_eq!(results["a"], Err("first".to_string()));
    }

    #[test]
    fn test_bad_payload_is_job_error() {
        let chunk = vec![
            RenderRequest::new("short", "A", 4, 2, 8.0),
            RenderRequest::new("nodata", "A", 4, 2, 8.0),
            RenderRequest::new("resized", "A", 4, 2, 8.0),
        ];
        let output = [
            r#"{"id":"short","status":"success","rendering":{"format":"pgm","encoding":"base64","data":"AAAA","width":4,"height":2}}"#.to_string(),
            r#"{"id":"nodata","status":"success"}"#.to_string(),
            ok_line("resized", 8, 2),
        ]
        .join("\n");
        let results = correlate(&output, &chunk);
        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.is_err()));
        assert!(results["nodata"].as_ref().unwrap_err().contains("missing image data"));
    }

    #[test]
    fn test_check_requests() {
        let ok = RenderRequest::new("a", "A", 4, 2, 8.0);
        assert!(check_requests(&[ok.clone()]).is_ok());
        assert!(matches!(
            check_requests(&[ok.clone(), ok.clone()]),
            Err(RenderError::InvalidInput(_))
        ));
        let mut flat = ok.clone();
        flat.height = 0;
        assert!(matches!(
            check_requests(&[flat]),
            Err(RenderError::InvalidGeometry(_))
        ));
        let mut empty = ok;
        empty.text.clear();
        assert!(matches!(
            check_requests(&[empty]),
            Err(RenderError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_request_defaults() {
        let request = RenderRequest::new("a", "A", 4, 2, 8.0);
        assert_eq!(request.script.as_deref(), Some("Latn"));
        assert_eq!(request.direction.as_deref(), Some("ltr"));
        assert_eq!(request.language.as_deref(), Some("en"));
        assert_eq!(request.geometry().font_size(), 8.0);
    }
}
