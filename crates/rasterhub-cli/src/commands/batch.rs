//! Batch command: one job-spec document in, one JSONL result line per job out.
//!
//! A document that fails to parse, has the wrong version or carries no jobs
//! is fatal. Everything that goes wrong inside a job becomes that job's
//! error line, in input order. Jobs run one after another unless `--jobs`
//! asks for a worker pool.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rasterhub_core::codec::decode_base64;
use rasterhub_core::{Job, JobResult, JobSpec, RenderError};
use rasterhub_render::{process_job, FontLoader};
use rayon::prelude::*;

use crate::cli::BatchArgs;

pub fn run(args: &BatchArgs) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("reading job spec from stdin")?;
    let spec = JobSpec::parse(&input)?;
    log::debug!("Processing {} job(s)", spec.jobs.len());

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {dir}"))?;
    }

    let loader = FontLoader::new(args.options.cache_size.max(1));
    let options = args.options.process_options();
    let results = run_jobs(&spec.jobs, args.jobs, |job| {
        let result = process_job(job, &loader, &options);
        match &args.output_dir {
            Some(dir) => spill_to_file(result, dir),
            None => result,
        }
    })?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for result in &results {
        writeln!(out, "{}", result.to_json_line()?)?;
    }
    out.flush()?;

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        log::info!("{} of {} job(s) failed", failed, results.len());
    }
    Ok(())
}

/// Apply `render` to every job, keeping input order.
///
/// Without `threads` the jobs run sequentially on the calling thread.
fn run_jobs<F>(jobs: &[Job], threads: Option<usize>, render: F) -> Result<Vec<JobResult>>
where
    F: Fn(&Job) -> JobResult + Sync,
{
    let Some(threads) = threads else {
        return Ok(jobs.iter().map(render).collect());
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .context("building worker pool")?;
    Ok(pool.install(|| jobs.par_iter().map(&render).collect()))
}

/// File-system friendly version of a job id.
pub fn file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "job".to_string()
    } else {
        stem
    }
}

/// Move a successful result's image into `dir` and point `identifier` at it.
fn spill_to_file(result: JobResult, dir: &Utf8Path) -> JobResult {
    if !result.is_success() {
        return result;
    }
    let id = result.id.clone();
    match write_image(result, dir) {
        Ok(result) => result,
        Err(e) => {
            log::debug!("Job {} could not be written: {}", id, e);
            JobResult::error(id, e.to_string())
        }
    }
}

fn write_image(mut result: JobResult, dir: &Utf8Path) -> rasterhub_core::Result<JobResult> {
    let rendering = result
        .rendering
        .as_mut()
        .ok_or_else(|| RenderError::Decode(format!("job {} carries no image", result.id)))?;
    let data = rendering
        .data
        .take()
        .ok_or_else(|| RenderError::Decode(format!("job {} carries no image data", result.id)))?;
    let path: Utf8PathBuf = dir.join(format!("{}.{}", file_stem(&result.id), rendering.format));
    std::fs::write(&path, decode_base64(&data)?)?;
    rendering.identifier = Some(path.into_string());
    Ok(result)
}
