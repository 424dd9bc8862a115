use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use faceblur_core::blurring::infrastructure::cpu_rectangular_blurrer::CpuRectangularBlurrer;
use faceblur_core::detection::domain::face_detector::FaceDetector;
use faceblur_core::detection::infrastructure::cascade_face_detector::CascadeFaceDetector;
use faceblur_core::detection::infrastructure::haar_cascade::HaarCascade;
use faceblur_core::pipeline::blur_frame_use_case::{BlurFrameUseCase, FrameOutcome};
use faceblur_core::service::frame_codec;
use faceblur_core::service::frame_service::FrameService;
use faceblur_core::shared::blur_strength::BlurStrength;
use faceblur_core::shared::cascade_resolver;
use faceblur_core::shared::constants::{
    CASCADE_NAME, CASCADE_URL, DEFAULT_BLUR_STRENGTH, IMAGE_EXTENSIONS,
};

/// Detect faces in webcam frames and blur them.
#[derive(Parser)]
#[command(name = "faceblur")]
struct Cli {
    /// Input image file (omit with --serve).
    input: Option<PathBuf>,

    /// Output image file (omit with --serve).
    output: Option<PathBuf>,

    /// Gaussian blur kernel size; clamped to 1-51 and rounded up to odd.
    #[arg(long, default_value_t = i64::from(DEFAULT_BLUR_STRENGTH), allow_negative_numbers = true)]
    blur: i64,

    /// Haar cascade XML file (downloaded to the cache when omitted).
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Directory holding a bundled cascade, checked before downloading.
    #[arg(long, conflicts_with = "cascade")]
    cascade_dir: Option<PathBuf>,

    /// Answer line-delimited JSON requests from stdin on stdout.
    #[arg(long)]
    serve: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let strength = Arc::new(BlurStrength::new(cli.blur));
    let use_case = BlurFrameUseCase::new(
        build_detector(cli.cascade.as_deref(), cli.cascade_dir.as_deref())?,
        Box::new(CpuRectangularBlurrer::new()),
        strength,
    );

    match (cli.input, cli.output) {
        (Some(input), Some(output)) if !cli.serve => run_image_blur(&input, &output, &use_case),
        _ => run_serve(FrameService::new(use_case)),
    }
}

fn run_image_blur(
    input: &Path,
    output: &Path,
    use_case: &BlurFrameUseCase,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(input)?;
    let frame = frame_codec::decode_image_bytes(&bytes)?;

    let outcome = use_case.execute(frame);
    if let FrameOutcome::Unmodified { reason, .. } = &outcome {
        log::warn!("Writing {} unmodified: {reason}", input.display());
    }
    let faces = outcome.face_count();

    frame_codec::frame_to_rgb_image(outcome.into_frame())?.save(output)?;
    log::info!(
        "Blurred {faces} faces, output written to {}",
        output.display()
    );
    Ok(())
}

fn run_serve(service: FrameService) -> Result<(), Box<dyn std::error::Error>> {
    log::info!(
        "Serving requests on stdin (blur strength {})",
        service.blur_strength()
    );
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        writeln!(stdout, "{}", service.handle_line(&line))?;
        stdout.flush()?;
    }
    Ok(())
}

fn build_detector(
    cascade: Option<&Path>,
    cascade_dir: Option<&Path>,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let path = match cascade {
        Some(path) => path.to_path_buf(),
        None => {
            log::info!("Resolving cascade: {CASCADE_NAME}");
            let progress = DownloadProgress::default();
            let resolved = cascade_resolver::resolve(
                CASCADE_NAME,
                CASCADE_URL,
                cascade_dir,
                Some(progress.callback()),
            );
            progress.finish();
            resolved?
        }
    };
    let cascade = HaarCascade::load(&path)?;
    Ok(Box::new(CascadeFaceDetector::new(cascade)))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(cascade) = &cli.cascade {
        if !cascade.exists() {
            return Err(format!("Cascade file not found: {}", cascade.display()).into());
        }
    }
    if let Some(dir) = &cli.cascade_dir {
        if !dir.is_dir() {
            return Err(format!("Cascade directory not found: {}", dir.display()).into());
        }
    }
    if cli.serve {
        if cli.input.is_some() || cli.output.is_some() {
            return Err("--serve does not take input or output files".into());
        }
        return Ok(());
    }
    let (Some(input), Some(output)) = (&cli.input, &cli.output) else {
        return Err("Input and output files are required unless --serve is used".into());
    };
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    if !is_image(output) {
        return Err(format!(
            "Output must be an image file ({}), got {}",
            IMAGE_EXTENSIONS.join(", "),
            output.display()
        )
        .into());
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Single-line download progress on stderr, terminated once the download
/// is over so later log output starts on a fresh line.
#[derive(Default)]
struct DownloadProgress {
    shown: Arc<AtomicBool>,
}

impl DownloadProgress {
    fn callback(&self) -> cascade_resolver::ProgressFn {
        let shown = Arc::clone(&self.shown);
        Box::new(move |downloaded, total| {
            shown.store(true, Ordering::Relaxed);
            eprint!("\r{}", progress_text(downloaded, total));
        })
    }

    /// Ends the progress line if anything was printed; returns whether it did.
    fn finish(&self) -> bool {
        let shown = self.shown.swap(false, Ordering::Relaxed);
        if shown {
            eprintln!();
        }
        shown
    }
}

fn progress_text(downloaded: u64, total: u64) -> String {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        format!("Downloading face cascade... {pct}%")
    } else {
        format!("Downloading face cascade... {downloaded} bytes")
    }
}
