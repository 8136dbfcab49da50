//! Batch dispatch against scripted transports.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rasterhub_core::codec::encode_rendering;
use rasterhub_core::{Bitmap, JobResult, JobSpec, RenderError, Result, TimingInfo};
use rasterhub_dispatch::{
    group_by_geometry, BatchRunner, ChunkTransport, DispatchConfig, RenderRequest,
};

/// Answers every job, reversed, with a bitmap whose first pixel encodes the job index.
/// Jobs whose font path contains "missing" fail with an error naming the path.
#[derive(Default)]
struct ScriptedBackend {
    calls: AtomicUsize,
    chunk_sizes: Mutex<Vec<usize>>,
    drop_ids: HashSet<String>,
    noise: bool,
}

impl ChunkTransport for ScriptedBackend {
    fn run_chunk(&self, spec_json: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spec = JobSpec::parse(spec_json)?;
        self.chunk_sizes.lock().push(spec.jobs.len());

        let mut lines = Vec::new();
        if self.noise {
            lines.push("rasterhub: cache warmed".to_string());
        }
        for job in spec.jobs.iter().rev() {
            if self.drop_ids.contains(&job.id) {
                continue;
            }
            if job.font.path.as_str().contains("missing") {
                lines.push(
                    JobResult::error(&job.id, format!("Failed to load font {}", job.font.path))
                        .to_json_line()?,
                );
                continue;
            }
            let mut bitmap = Bitmap::new(job.rendering.width, job.rendering.height)?;
            bitmap.pixels_mut()[0] = (job.text.content.len() % 256) as u8;
            let rendering = encode_rendering(&bitmap, &job.rendering.format)?;
            lines.push(JobResult::success(&job.id, rendering, TimingInfo::default()).to_json_line()?);
        }
        Ok(lines.join("\n"))
    }
}

struct BrokenBackend;

impl ChunkTransport for BrokenBackend {
    fn run_chunk(&self, _spec_json: &str) -> Result<String> {
        Err(RenderError::Transport("rasterhub exited with 101: panicked".into()))
    }
}

fn runner(font: &str, backend: Arc<dyn ChunkTransport>, chunk_size: usize) -> BatchRunner {
    let config = DispatchConfig::default()
        .with_chunk_size(chunk_size)
        .with_max_workers(3);
    BatchRunner::with_transport(font, None, config, backend)
}

fn requests(n: usize) -> Vec<RenderRequest> {
    (0..n)
        .map(|i| RenderRequest::new(format!("job-{i}"), "x".repeat(i % 7 + 1), 16, 8, 12.0))
        .collect()
}

#[test]
fn every_request_gets_exactly_one_result() {
    let backend = Arc::new(ScriptedBackend::default());
    let runner = runner("/fonts/Test.ttf", backend.clone(), 4);
    let reqs = requests(10);

    let results = runner.render_requests(&reqs).unwrap();

    assert_eq!(results.len(), 10);
    for req in &reqs {
        let bitmap = results[&req.id].as_ref().unwrap();
        assert_eq!(bitmap.shape(), (8, 16));
        assert_eq!(bitmap.pixels()[0] as usize, req.text.len());
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    let mut sizes = backend.chunk_sizes.lock().clone();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 4, 4]);
}

#[test]
fn partial_failure_is_isolated() {
    let backend: Arc<dyn ChunkTransport> = Arc::new(ScriptedBackend::default());
    let bad = runner("/nonexistent/missing.ttf", Arc::clone(&backend), 16);
    let good = runner("/fonts/Test.ttf", backend, 16);
    let reqs = requests(1);

    let failed = bad.render_in_order(&reqs).unwrap();
    let message = failed[0].as_ref().unwrap_err();
    assert!(message.contains("/nonexistent/missing.ttf"), "{message}");

    let ok = good.render_in_order(&reqs).unwrap();
    assert!(ok[0].is_ok());
}

#[test]
fn mixed_outcomes_in_one_chunk() {
    struct HalfBroken;
    impl ChunkTransport for HalfBroken {
        fn run_chunk(&self, spec_json: &str) -> Result<String> {
            let spec = JobSpec::parse(spec_json)?;
            let mut lines = Vec::new();
            for (i, job) in spec.jobs.iter().enumerate() {
                if i % 2 == 0 {
                    lines.push(JobResult::error(&job.id, "Failed to load font /nonexistent/font.ttf").to_json_line()?);
                } else {
                    let bitmap = Bitmap::new(job.rendering.width, job.rendering.height)?;
                    let rendering = encode_rendering(&bitmap, "pgm")?;
                    lines.push(JobResult::success(&job.id, rendering, TimingInfo::default()).to_json_line()?);
                }
            }
            Ok(lines.join("\n"))
        }
    }

    let runner = runner("/fonts/Test.ttf", Arc::new(HalfBroken), 64);
    let outcomes = runner.render_in_order(&requests(6)).unwrap();
    assert_eq!(outcomes.len(), 6);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.is_ok(), i % 2 == 1);
    }
}

#[test]
fn missing_results_are_fatal() {
    let backend = Arc::new(ScriptedBackend {
        drop_ids: HashSet::from(["job-3".to_string(), "job-5".to_string()]),
        ..Default::default()
    });
    let runner = runner("/fonts/Test.ttf", backend, 4);

    match runner.render_requests(&requests(8)) {
        Err(RenderError::MissingResults { mut ids }) => {
            ids.sort();
            assert_eq!(ids, vec!["job-3".to_string(), "job-5".to_string()]);
        }
        other => panic!("expected MissingResults, got {:?}", other.map(|m| m.len())),
    }
}

#[test]
fn stray_output_is_ignored() {
    let backend = Arc::new(ScriptedBackend {
        noise: true,
        ..Default::default()
    });
    let runner = runner("/fonts/Test.ttf", backend, 3);
    let results = runner.render_requests(&requests(5)).unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.values().all(|r| r.is_ok()));
}

#[test]
fn transport_failure_aborts_batch() {
    let runner = runner("/fonts/Test.ttf", Arc::new(BrokenBackend), 2);
    let err = runner.render_requests(&requests(4)).unwrap_err();
    assert!(matches!(err, RenderError::Transport(ref m) if m.contains("101")));
    assert!(err.is_fatal());
}

#[test]
fn invalid_requests_never_reach_backend() {
    let backend = Arc::new(ScriptedBackend::default());
    let runner = runner("/fonts/Test.ttf", backend.clone(), 4);

    let mut dup = requests(2);
    dup[1].id = dup[0].id.clone();
    assert!(matches!(
        runner.render_requests(&dup),
        Err(RenderError::InvalidInput(_))
    ));

    let mut zero = requests(2);
    zero[1].width = 0;
    assert!(matches!(
        runner.render_requests(&zero),
        Err(RenderError::InvalidGeometry(_))
    ));

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(runner.render_requests(&[]).unwrap().is_empty());
}

#[test]
fn grouping_by_geometry_then_text() {
    let backend = Arc::new(ScriptedBackend::default());
    let runner = runner("/fonts/Test.ttf", backend, 8);
    let reqs = vec![
        RenderRequest::new("a", "Hi", 16, 8, 12.0),
        RenderRequest::new("b", "Ho", 16, 8, 12.0),
        RenderRequest::new("c", "Hi", 32, 8, 12.0),
    ];

    let grouped = group_by_geometry(&runner, &reqs).unwrap();
    assert_eq!(grouped.len(), 2);
    let small = &grouped[&reqs[0].geometry()];
    assert_eq!(small.len(), 2);
    assert!(small.contains_key("Hi") && small.contains_key("Ho"));
    assert_eq!(grouped[&reqs[2].geometry()]["Hi"].shape(), (8, 32));
}

#[test]
fn missing_binary_makes_runner_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = DispatchConfig::default().with_binary(dir.path().join("no-such-binary"));
    // cwd and PATH may still provide a binary; only assert the error kind when none is found.
    match BatchRunner::new("/fonts/Test.ttf", None, config) {
        Ok(_) => {}
        Err(e) => assert!(matches!(e, RenderError::EngineUnavailable { .. })),
    }
}
