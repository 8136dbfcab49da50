//! Validate command: parse a job-spec file and check every job without rendering.

use anyhow::{bail, Context, Result};
use rasterhub_core::JobSpec;

use crate::cli::ValidateArgs;

pub fn run(args: &ValidateArgs) -> Result<()> {
    let input = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file))?;
    let spec = JobSpec::parse(&input).with_context(|| format!("{} is not a valid job spec", args.file))?;

    let problems: Vec<String> = spec
        .jobs
        .iter()
        .filter_map(|job| job.validate().err().map(|e| format!("job '{}': {}", job.id, e)))
        .collect();

    if problems.is_empty() {
        println!("{}: {} job(s), all valid", args.file, spec.jobs.len());
        return Ok(());
    }
    for problem in &problems {
        println!("{problem}");
    }
    bail!(
        "{} of {} job(s) in {} are invalid",
        problems.len(),
        spec.jobs.len(),
        args.file
    )
}
