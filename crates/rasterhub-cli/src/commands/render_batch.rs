//! Render-batch command: a JSONL file of requests through the batch dispatcher.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use rasterhub_core::codec::encode_pgm;
use rasterhub_dispatch::{BatchRunner, DispatchConfig, RenderRequest};
use rasterhub_render::StreamingSession;
use serde::{Deserialize, Serialize};

use super::batch::file_stem;
use super::parse_variations;
use crate::cli::RenderBatchArgs;

#[derive(Debug, Deserialize)]
struct RequestLine {
    id: String,
    text: String,
    width: u32,
    height: u32,
    font_size: f32,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

impl From<RequestLine> for RenderRequest {
    fn from(line: RequestLine) -> Self {
        let request = RenderRequest::new(line.id, line.text, line.width, line.height, line.font_size);
        if line.script.is_none() && line.direction.is_none() && line.language.is_none() {
            return request;
        }
        request.with_hints(
            line.script.as_deref(),
            line.direction.as_deref(),
            line.language.as_deref(),
        )
    }
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    id: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ink: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn read_requests(path: &Utf8Path) -> Result<Vec<RenderRequest>> {
    let input = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<RequestLine>(line)
                .map(RenderRequest::from)
                .with_context(|| format!("{path}:{}: malformed request", n + 1))
        })
        .collect()
}

pub fn run(args: &RenderBatchArgs) -> Result<()> {
    let requests = read_requests(&args.input)?;
    let variations = parse_variations(&args.variations)?;
    let variations = (!variations.is_empty()).then_some(variations);

    let mut config = DispatchConfig::from_env();
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }
    if let Some(workers) = args.workers {
        config = config.with_max_workers(workers);
    }

    let runner = if args.in_process {
        let session = Arc::new(StreamingSession::open(config.cache_size)?);
        BatchRunner::in_process(args.font.clone(), variations, config, session)
    } else {
        BatchRunner::new(args.font.clone(), variations, config)?
    };
    log::debug!("Dispatching {} request(s) via {:?}", requests.len(), runner);

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {dir}"))?;
    }

    let outcomes = runner.render_in_order(&requests)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (request, outcome) in requests.iter().zip(&outcomes) {
        let summary = match outcome {
            Ok(bitmap) => {
                let file = match &args.output_dir {
                    Some(dir) => {
                        let path = dir.join(format!("{}.pgm", file_stem(&request.id)));
                        std::fs::write(&path, encode_pgm(bitmap))
                            .with_context(|| format!("writing {path}"))?;
                        Some(path.into_string())
                    }
                    None => None,
                };
                Summary {
                    id: &request.id,
                    status: "success",
                    width: Some(bitmap.width()),
                    height: Some(bitmap.height()),
                    ink: Some(bitmap.ink()),
                    file,
                    error: None,
                }
            }
            Err(message) => Summary {
                id: &request.id,
                status: "error",
                width: None,
                height: None,
                ink: None,
                file: None,
                error: Some(message.as_str()),
            },
        };
        writeln!(out, "{}", serde_json::to_string(&summary)?)?;
    }
    out.flush()?;
    Ok(())
}
