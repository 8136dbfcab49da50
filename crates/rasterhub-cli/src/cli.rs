//! CLI argument definitions using Clap v4

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Rasterhub - batch text rasterization for font analysis pipelines
#[derive(Parser, Debug)]
#[command(name = "rasterhub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read one job-spec document from stdin and write one result line per job
    Batch(BatchArgs),

    /// Read one job per stdin line and answer each immediately
    Stream(StreamArgs),

    /// Check a job-spec file without rendering it
    Validate(ValidateArgs),

    /// Report engine availability and the default choice
    Engines(EnginesArgs),

    /// Render one text to a PGM or PNG file
    #[command(alias = "r")]
    Render(Box<RenderArgs>),

    /// Render a JSONL file of requests through the batch dispatcher
    RenderBatch(RenderBatchArgs),
}

/// Options shared by `batch` and `stream`.
#[derive(Parser, Debug, Clone)]
pub struct JobOptions {
    /// Font instances kept in the cache
    #[arg(long = "cache-size", default_value_t = rasterhub_render::DEFAULT_CACHE_SIZE)]
    pub cache_size: usize,

    /// Resolve relative font paths here and refuse paths outside it
    #[arg(long = "base-dir")]
    pub base_dir: Option<Utf8PathBuf>,

    /// Per-job time budget in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub options: JobOptions,

    /// Render jobs on this many worker threads (default: one job at a time)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Write images here and report file names instead of inline data
    #[arg(long = "output-dir")]
    pub output_dir: Option<Utf8PathBuf>,
}

#[derive(Parser, Debug)]
pub struct StreamArgs {
    #[command(flatten)]
    pub options: JobOptions,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Job-spec JSON file
    pub file: Utf8PathBuf,
}

#[derive(Parser, Debug)]
pub struct EnginesArgs {
    /// Check whether this engine can be used
    #[arg(long)]
    pub check: Option<String>,

    /// Benchmark available engines with this font
    #[arg(long = "bench-font")]
    pub bench_font: Option<Utf8PathBuf>,

    /// Iterations per engine when benchmarking
    #[arg(long, default_value_t = 10)]
    pub iterations: u32,
}

#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Text to render
    pub text: String,

    /// Font file path (.ttf, .otf, .ttc, .otc)
    #[arg(short = 'f', long = "font")]
    pub font: Utf8PathBuf,

    /// Output file; `.png` selects PNG, anything else PGM
    #[arg(short = 'o', long = "output")]
    pub output: Utf8PathBuf,

    /// Engine name or `auto`
    #[arg(short = 'e', long = "engine", default_value = "auto")]
    pub engine: String,

    /// Canvas width in pixels
    #[arg(short = 'W', long = "width", default_value_t = 600)]
    pub width: u32,

    /// Canvas height in pixels
    #[arg(short = 'H', long = "height", default_value_t = 120)]
    pub height: u32,

    /// Font size in pixels
    #[arg(short = 's', long = "size", default_value_t = 72.0)]
    pub size: f32,

    /// Letter spacing in thousandths of an em
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub tracking: f32,

    /// Feature toggles such as `liga=0,kern`
    #[arg(short = 'F', long = "features", value_delimiter = ',')]
    pub features: Vec<String>,

    /// Variation coordinates such as `wght=700,wdth=85`
    #[arg(long = "variations", value_delimiter = ',')]
    pub variations: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct RenderBatchArgs {
    /// Font file shared by every request
    #[arg(short = 'f', long = "font")]
    pub font: Utf8PathBuf,

    /// JSONL file with one request per line
    #[arg(short = 'i', long = "input")]
    pub input: Utf8PathBuf,

    /// Variation coordinates such as `wght=700`
    #[arg(long = "variations", value_delimiter = ',')]
    pub variations: Vec<String>,

    /// Render in this process instead of spawning the binary
    #[arg(long = "in-process")]
    pub in_process: bool,

    /// Requests per job-spec document
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,

    /// Concurrent chunks
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Write one PGM per successful request here
    #[arg(long = "output-dir")]
    pub output_dir: Option<Utf8PathBuf>,
}
