//! Stream command: one job per stdin line, one result line per job, flushed
//! as soon as it is ready.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use rasterhub_core::JobResult;
use rasterhub_render::StreamingSession;
use serde_json::Value;

use crate::cli::StreamArgs;

pub fn run(args: &StreamArgs) -> Result<()> {
    let session = StreamingSession::with_options(
        args.options.cache_size,
        args.options.process_options(),
    )?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut handled = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        writeln!(out, "{}", answer(&session, line)?)?;
        out.flush()?;
        handled += 1;
    }

    log::debug!("Stream finished after {} job(s)", handled);
    session.close();
    Ok(())
}

/// Result line for one input line; unreadable input becomes an error line.
fn answer(session: &StreamingSession, line: &str) -> rasterhub_core::Result<String> {
    match session.render(line) {
        Ok(result) => Ok(result),
        Err(e) => {
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            log::warn!("Rejected stream input: {}", e);
            JobResult::error(id, e.to_string()).to_json_line()
        }
    }
}
