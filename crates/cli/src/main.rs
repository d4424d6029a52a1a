use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde::Serialize;

use phonewatch_core::detection::domain::detection::DetectionReport;
use phonewatch_core::detection::domain::detection_filter::DetectionFilter;
use phonewatch_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE_FLOOR,
};
use phonewatch_core::pipeline::detect_phones_use_case::DetectPhonesUseCase;
use phonewatch_core::shared::constants::{
    BUNDLED_MODEL_DIR, DEFAULT_CONFIDENCE, IMAGE_EXTENSIONS, TARGET_LABEL, YOLO_MODEL_NAME,
};
use phonewatch_core::shared::model_resolver::{self, ModelSource};

/// Cell phone detection for image files. Prints one JSON line per image.
#[derive(Parser)]
#[command(name = "phonewatch")]
struct Cli {
    /// Input image files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Path to a YOLO ONNX model. Skips cache lookup and download.
    #[arg(long, env = "PHONEWATCH_MODEL")]
    model: Option<PathBuf>,

    /// Directory searched for a bundled model.
    #[arg(long, default_value = BUNDLED_MODEL_DIR)]
    model_dir: PathBuf,

    /// URL to download the model from when it is not found locally.
    #[arg(long, env = "PHONEWATCH_MODEL_URL")]
    model_url: Option<String>,

    /// Minimum confidence (exclusive) for a detection to be reported.
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f32,

    /// Class label to report.
    #[arg(long, default_value = TARGET_LABEL)]
    label: String,
}

#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    #[serde(flatten)]
    report: &'a DetectionReport,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(0) => {}
        Ok(failed) => {
            eprintln!("{failed} file(s) could not be processed");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns the number of inputs that failed.
fn run() -> Result<usize, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let use_case = build_use_case(&cli)?;
    let mut failed = 0;
    for input in &cli.inputs {
        if !is_image(input) {
            log::warn!("{} has no known image extension", input.display());
        }
        match process_file(&use_case, input) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                eprintln!("{}: {e}", input.display());
                failed += 1;
            }
        }
    }
    Ok(failed)
}

fn process_file(
    use_case: &DetectPhonesUseCase,
    path: &Path,
) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let report = use_case.execute_bytes(&bytes)?;
    let line = serde_json::to_string(&FileReport {
        file: path.display().to_string(),
        report: &report,
    })?;
    Ok(line)
}

fn build_use_case(cli: &Cli) -> Result<DetectPhonesUseCase, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        &ModelSource {
            path: cli.model.as_deref(),
            name: YOLO_MODEL_NAME,
            bundled_dir: Some(cli.model_dir.as_path()),
            url: cli.model_url.as_deref(),
        },
        Some(Box::new(download_progress)),
    )?;

    let detector = OnnxYoloDetector::new(&model_path)?
        .with_confidence_floor(cli.confidence.min(DEFAULT_CONFIDENCE_FLOOR));
    let filter = DetectionFilter::new(cli.label.clone(), cli.confidence);
    Ok(DetectPhonesUseCase::new(Box::new(detector), filter))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(missing) = cli.inputs.iter().find(|p| !p.exists()) {
        return Err(format!("Input file not found: {}", missing.display()).into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.label.trim().is_empty() {
        return Err("Label must not be empty".into());
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}
