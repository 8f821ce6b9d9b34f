use std::path::{Path, PathBuf};

use adaptive_enhance::{
    color_correct, contrast_enhance, float_to_rgb8, lab, DegeneratePolicy, LaccOptions,
    LaceOptions,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use image::RgbImage;
use tracing::{error, info};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "adaptive-enhance")]
#[command(about = "Apply local adaptive color correction and contrast enhancement to images", long_about = None)]
struct Cli {
    #[arg(help = "Input image file or directory of images")]
    input: PathBuf,

    #[arg(help = "Output image file, or output directory when INPUT is a directory")]
    output: PathBuf,

    /// Which stages to run
    #[arg(long, value_enum, default_value = "both")]
    stage: Stage,

    /// Stop channel balancing once the summed mean deviation is at most this value
    #[arg(long, default_value_t = 1e-2)]
    stop_criterion: f64,

    /// Side of the Gaussian kernel used to extract the detail layer (odd)
    #[arg(long, default_value_t = 25)]
    noise_kernel_size: usize,

    /// Standard deviation of the detail-layer Gaussian
    #[arg(long, default_value_t = 1.0)]
    noise_std: f32,

    /// Upper bound on channel balancing iterations (derived per image when omitted)
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Fail on a constant reference channel instead of skipping its rescale
    #[arg(long, default_value_t = false)]
    reject_degenerate: bool,

    /// Side of the block used for local statistics and guided filtering (odd)
    #[arg(long, default_value_t = 25)]
    block_size: usize,

    /// Guided-filter regularization; larger values smooth more
    #[arg(long, default_value_t = 1e-2)]
    epsilon: f32,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Stage {
    Both,
    Lacc,
    Lace,
}

impl Cli {
    fn lacc_options(&self) -> LaccOptions {
        LaccOptions {
            stop_criterion: self.stop_criterion,
            noise_kernel_size: self.noise_kernel_size,
            noise_std: self.noise_std,
            max_iterations: self.max_iterations,
            degenerate_policy: if self.reject_degenerate {
                DegeneratePolicy::Reject
            } else {
                DegeneratePolicy::Identity
            },
        }
    }

    fn lace_options(&self) -> LaceOptions {
        LaceOptions {
            block_size: self.block_size,
            epsilon: self.epsilon,
        }
    }
}

fn process_file(input: &Path, output: &Path, cli: &Cli) -> Result<()> {
    let image = image::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    info!(path = %input.display(), width = image.width(), height = image.height(), "processing");

    let lacc = cli.lacc_options();
    let lace = cli.lace_options();

    let rgb = match cli.stage {
        Stage::Both => {
            let corrected = color_correct(&image, &lacc)?;
            let enhanced = contrast_enhance(&lab::rgb_to_lab(&corrected), &lace)?;
            lab::lab_to_rgb(&enhanced)
        }
        Stage::Lacc => color_correct(&image, &lacc)?,
        Stage::Lace => {
            let rgb = image.to_rgb32f();
            let enhanced = contrast_enhance(&lab::rgb_to_lab(&rgb), &lace)?;
            lab::lab_to_rgb(&enhanced)
        }
    };

    let result: RgbImage = float_to_rgb8(&rgb);
    result
        .save(output)
        .with_context(|| format!("failed to save {}", output.display()))?;
    info!(path = %output.display(), "saved result");
    Ok(())
}

fn process_directory(input: &Path, output: &Path, cli: &Cli) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let mut processed = 0usize;
    let mut failed = 0usize;

    for entry in WalkDir::new(input).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to read {}", input.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let target = output.join(entry.file_name());
        match process_file(entry.path(), &target, cli) {
            Ok(()) => processed += 1,
            Err(err) => {
                error!(path = %entry.path().display(), "{err:#}");
                failed += 1;
            }
        }
    }

    info!(processed, failed, "finished directory");
    if failed > 0 {
        bail!("{failed} of {} images failed", processed + failed);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(threads) = cli.threads {
        #[cfg(feature = "rayon")]
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;

        #[cfg(not(feature = "rayon"))]
        tracing::warn!(threads, "built without rayon, running single-threaded");
    }

    // fail fast on bad options before touching any file
    cli.lacc_options().validate()?;
    cli.lace_options().validate()?;

    if cli.input.is_dir() {
        process_directory(&cli.input, &cli.output, &cli)
    } else {
        process_file(&cli.input, &cli.output, &cli)
    }
}
