mod error;
mod routes;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use phonewatch_core::detection::domain::detection_filter::DetectionFilter;
use phonewatch_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE_FLOOR,
};
use phonewatch_core::pipeline::detect_phones_use_case::DetectPhonesUseCase;
use phonewatch_core::shared::constants::{
    BUNDLED_MODEL_DIR, DEFAULT_CONFIDENCE, DEFAULT_HOST, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT,
    TARGET_LABEL, YOLO_MODEL_NAME,
};
use phonewatch_core::shared::model_resolver::{self, ModelSource};

use crate::routes::{router, AppState};

/// Serves cell phone detection over HTTP.
#[derive(Parser)]
#[command(name = "phonewatch-server")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "PHONEWATCH_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "PHONEWATCH_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to a YOLO ONNX model. Skips cache lookup and download.
    #[arg(long, env = "PHONEWATCH_MODEL")]
    model: Option<PathBuf>,

    /// Directory searched for a bundled model.
    #[arg(long, env = "PHONEWATCH_MODEL_DIR", default_value = BUNDLED_MODEL_DIR)]
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

    /// Largest accepted request body, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,
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

    // The model must be ready before the listener binds. Resolution may
    // block on a download, so it runs ahead of the async runtime.
    let (use_case, model_name) = build_use_case(&cli)?;
    let state = AppState {
        use_case: Arc::new(use_case),
        model_name: Arc::from(model_name),
    };
    let app = router(state, cli.max_upload_bytes);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = bind(&cli.host, cli.port).await?;
        log::info!("Listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        log::info!("Server stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Binds `host:port`. Hostnames resolve through the system resolver and
/// IPv6 literals are accepted bare (`::`).
async fn bind(host: &str, port: u16) -> std::io::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((host, port)).await
}

fn build_use_case(cli: &Cli) -> Result<(DetectPhonesUseCase, String), Box<dyn std::error::Error>> {
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

    let model_name = model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| model_path.display().to_string());

    Ok((DetectPhonesUseCase::new(Box::new(detector), filter), model_name))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
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
    if cli.max_upload_bytes == 0 {
        return Err("Max upload bytes must be positive".into());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        log::info!("Downloading detection model... {pct}%");
    } else {
        log::info!("Downloading detection model... {downloaded} bytes");
    }
}
