// this_file: crates/rasterhub-dispatch/src/transport.rs

//! Moving one job-spec document to a backend and its result lines back.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rasterhub_core::{JobSpec, RenderError, Result};
use rasterhub_render::StreamingSession;

/// Runs one chunk: a job-spec JSON document in, result lines out.
///
/// Any error returned here is fatal for the whole batch.
pub trait ChunkTransport: Send + Sync {
    fn run_chunk(&self, spec_json: &str) -> Result<String>;
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runs `program args...` once per chunk, feeding the job spec on stdin.
#[derive(Debug, Clone)]
pub struct SubprocessTransport {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessTransport {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// `rasterhub batch --cache-size=N`
    pub fn batch(program: impl Into<PathBuf>, cache_size: usize, timeout: Duration) -> Self {
        Self::new(program, timeout).arg("batch").arg(format!("--cache-size={cache_size}"))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Kills and reaps the child unless it already exited.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn wait_until(&mut self, deadline: Instant) -> Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.reaped = true;
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl ChunkTransport for SubprocessTransport {
    fn run_chunk(&self, spec_json: &str) -> Result<String> {
        let started = Instant::now();
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RenderError::Transport(format!(
                    "failed to start {}: {e}",
                    self.program.display()
                ))
            })?;
        let mut guard = ChildGuard {
            child,
            reaped: false,
        };

        let stdout = guard.child.stdout.take().map(drain);
        let stderr = guard.child.stderr.take().map(drain);
        let writer = guard.child.stdin.take().map(|mut stdin| {
            let payload = spec_json.as_bytes().to_vec();
            // Dropping stdin at the end closes the pipe and starts the backend.
            thread::spawn(move || stdin.write_all(&payload))
        });

        let status = guard.wait_until(started + self.timeout)?;
        let Some(status) = status else {
            drop(guard);
            return Err(RenderError::Transport(format!(
                "{} timed out after {}s",
                self.program.display(),
                self.timeout.as_secs_f32()
            )));
        };

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    log::debug!("Writing job spec to backend failed: {}", e);
                }
                _ => {}
            }
        }
        let stdout = join_output(stdout);
        let stderr = join_output(stderr);

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(RenderError::Transport(format!(
                "{} exited with {}: {}",
                self.program.display(),
                code,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        log::debug!(
            "Backend chunk finished in {:.1}ms ({} bytes)",
            started.elapsed().as_secs_f64() * 1000.0,
            stdout.len()
        );
        String::from_utf8(stdout)
            .map_err(|e| RenderError::Transport(format!("backend output is not UTF-8: {e}")))
    }
}

/// Runs chunks on an in-process [`StreamingSession`].
pub struct InProcessTransport {
    session: Arc<StreamingSession>,
}

impl InProcessTransport {
    pub fn new(session: Arc<StreamingSession>) -> Self {
        Self { session }
    }
}

impl ChunkTransport for InProcessTransport {
    fn run_chunk(&self, spec_json: &str) -> Result<String> {
        let spec = JobSpec::parse(spec_json)?;
        let mut out = String::new();
        for job in &spec.jobs {
            let line = self.session.render(&serde_json::to_string(job)?)?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}
