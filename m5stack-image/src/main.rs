mod config;
mod convert;
mod dither;
mod enhance;
mod error;
mod header;
mod pipeline;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use config::{Config, DitherMode, Expansion};
use convert::Targets;

#[derive(Parser, Debug)]
#[command(name = "m5stack-image")]
#[command(about = "Convert images into RGB565 C headers for M5Stack LCD firmware")]
struct Cli {
    /// Input image, or a glob pattern matching several images
    input: String,

    /// Output header path (single input only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for generated headers when several inputs match
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Canvas width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Array name in the generated header
    #[arg(short, long)]
    name: Option<String>,

    /// Gamma; values above 1 brighten midtones
    #[arg(short, long)]
    gamma: Option<f32>,

    /// Skip contrast/brightness/color/sharpness and denoise passes
    #[arg(long)]
    no_enhance: bool,

    /// Keep sources smaller than the canvas at native size
    #[arg(long)]
    no_upscale: bool,

    #[arg(long, value_enum)]
    dither: Option<CliDither>,

    /// Error reference used while dithering
    #[arg(long, value_enum)]
    expansion: Option<CliExpansion>,

    /// Also write a PNG preview of the quantized result (a directory when several inputs match)
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Maximum files converted at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// TOML config file (defaults to ./m5stack-image.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" or "m5stack_image=trace"
    #[arg(long)]
    log: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliDither {
    FloydSteinberg,
    None,
}

impl From<CliDither> for DitherMode {
    fn from(value: CliDither) -> Self {
        match value {
            CliDither::FloydSteinberg => DitherMode::FloydSteinberg,
            CliDither::None => DitherMode::None,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CliExpansion {
    FullRange,
    BitShift,
}

impl From<CliExpansion> for Expansion {
    fn from(value: CliExpansion) -> Self {
        match value {
            CliExpansion::FullRange => Expansion::FullRange,
            CliExpansion::BitShift => Expansion::BitShift,
        }
    }
}

impl Cli {
    /// Layer command line flags over values from the config file.
    fn apply(&self, cfg: &mut Config) {
        if let Some(w) = self.width {
            cfg.output.width = w;
        }
        if let Some(h) = self.height {
            cfg.output.height = h;
        }
        if let Some(name) = &self.name {
            cfg.output.variable_name = name.clone();
        }
        if self.no_upscale {
            cfg.output.upscale = false;
        }
        if let Some(g) = self.gamma {
            cfg.tone.gamma = g;
        }
        if self.no_enhance {
            cfg.enhance.enabled = false;
        }
        if let Some(d) = self.dither {
            cfg.dither.mode = d.into();
        }
        if let Some(e) = self.expansion {
            cfg.dither.expansion = e.into();
        }
    }

    fn targets(&self) -> Targets {
        Targets {
            output: self.output.clone(),
            out_dir: self.out_dir.clone(),
            preview: self.preview.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Load config first so we can honor logging.filter directive.
    let mut cfg = Config::load(cli.config.as_deref()).await?;
    let filter_directive = cli
        .log
        .clone()
        .or_else(|| cfg.logging.as_ref().and_then(|l| l.filter.clone()))
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,m5stack_image=debug".to_string());
    fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr)
        .init();

    cli.apply(&mut cfg);
    cfg.validate()?;
    tracing::debug!(config = ?cfg, "effective configuration");

    let inputs = source::expand_inputs(&cli.input)?;
    let jobs = convert::plan(inputs, &cli.targets(), &cfg.output.variable_name)?;
    let concurrency = cli.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    convert::convert_all(jobs, Arc::new(cfg), concurrency).await
}
