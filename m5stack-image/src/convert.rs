use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::dither::PackedRaster;
use crate::error::ConvertError;
use crate::header::{self, guard_name, sanitize_identifier};
use crate::{pipeline, source};

/// Default header path for a single conversion.
pub const DEFAULT_OUTPUT_PATH: &str = "m5stack_image.h";

/// One input file and everything written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub variable_name: String,
    pub preview: Option<PathBuf>,
}

/// Where outputs go, as requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub output: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub preview: Option<PathBuf>,
}

/// Turn resolved inputs into jobs.
///
/// A single input honors `output`/`preview` as file paths. Several inputs each get
/// `<out_dir>/<stem>.h`, a `<stem>_<variable_name>` array and, if requested,
/// `<preview>/<stem>.png`.
pub fn plan(inputs: Vec<PathBuf>, targets: &Targets, variable_name: &str) -> Result<Vec<Job>> {
    if let [input] = inputs.as_slice() {
        let output = match (&targets.output, &targets.out_dir) {
            (Some(o), None) => o.clone(),
            (Some(_), Some(_)) => bail!("--output and --out-dir cannot be combined"),
            (None, Some(dir)) => dir.join(DEFAULT_OUTPUT_PATH),
            (None, None) => PathBuf::from(DEFAULT_OUTPUT_PATH),
        };
        return Ok(vec![Job {
            input: input.clone(),
            output,
            variable_name: variable_name.to_string(),
            preview: targets.preview.clone(),
        }]);
    }
    if targets.output.is_some() {
        bail!(
            "--output names a single file but {} inputs matched; use --out-dir instead",
            inputs.len()
        );
    }
    let out_dir = targets.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut jobs: Vec<Job> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("input {} has no file name", input.display()))?;
        let output = out_dir.join(format!("{stem}.h"));
        let array = format!("{}_{variable_name}", sanitize_identifier(&stem));
        let guard = guard_name(&output);
        for planned in &jobs {
            if planned.output == output {
                bail!("two inputs would both write {}", output.display());
            }
            // both headers end up in one firmware build, so symbols and guards must differ
            if planned.variable_name == array || guard_name(&planned.output) == guard {
                bail!(
                    "{} and {} map to the same C identifiers ({array}, {guard}_H)",
                    planned.input.display(),
                    input.display()
                );
            }
        }
        jobs.push(Job {
            output,
            variable_name: array,
            preview: targets.preview.as_ref().map(|dir| dir.join(format!("{stem}.png"))),
            input,
        });
    }
    Ok(jobs)
}

fn save_preview(raster: &PackedRaster, path: &Path) -> Result<(), ConvertError> {
    raster
        .to_rgb_image()
        .save(path)
        .map_err(|source| ConvertError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

/// Decode, process and emit a single job. The pixel work runs on a blocking worker.
pub async fn convert(job: Job, cfg: Arc<Config>) -> Result<()> {
    let worker_job = job.clone();
    let raster = tokio::task::spawn_blocking(move || -> Result<PackedRaster, ConvertError> {
        let src = source::load(&worker_job.input)?;
        let raster = pipeline::process(src, &cfg)?;
        if let Some(preview) = &worker_job.preview {
            match save_preview(&raster, preview) {
                Ok(()) => tracing::debug!(path = %preview.display(), "wrote preview png"),
                Err(e) => tracing::warn!(error = %e, "preview not written"),
            }
        }
        Ok(raster)
    })
    .await
    .context("conversion worker panicked")?
    .with_context(|| format!("converting {}", job.input.display()))?;

    header::emit(&raster, &job.output, &job.variable_name)
        .await
        .with_context(|| format!("converting {}", job.input.display()))?;
    tracing::info!(
        input = %job.input.display(),
        output = %job.output.display(),
        width = raster.width(),
        height = raster.height(),
        pixels = raster.pixels().len(),
        "conversion complete"
    );
    Ok(())
}

/// Run all jobs with at most `concurrency` in flight. Every job runs even if others fail.
pub async fn convert_all(jobs: Vec<Job>, cfg: Arc<Config>, concurrency: usize) -> Result<()> {
    let total = jobs.len();
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();
    for job in jobs {
        let permits = permits.clone();
        let cfg = cfg.clone();
        set.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            convert(job, cfg).await
        });
    }
    let mut failed = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                let chain = format!("{e:#}");
                tracing::error!(error = %chain, "conversion failed");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "conversion task aborted");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {total} conversions failed");
    }
    Ok(())
}
