use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pantry_core::{to_create_requests, Lexicon, NewInventoryItem, ParseResult};
use pantry_ocr::{MockRecognizer, OcrBackend, PipelineConfig, ReceiptPipeline};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const TRACING_TARGET_STARTUP: &str = "pantry_scan::startup";
pub const TRACING_TARGET_SCAN: &str = "pantry_scan::scan";

type Pipeline = ReceiptPipeline<Box<dyn OcrBackend>>;

/// Scan receipt images and print the purchased items as JSON.
#[derive(Debug, Parser)]
#[command(name = "pantry-scan", version, about)]
struct Cli {
    /// Pipeline configuration (TOML).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Lexicon override (TOML); takes precedence over the config's `lexicon_path`.
    #[arg(long, value_name = "FILE")]
    lexicon: Option<PathBuf>,

    /// Per-image time limit.
    #[arg(long, value_name = "N", default_value_t = 60)]
    timeout_secs: u64,

    /// Images scanned at once.
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Use this text as the OCR output for every image instead of running an engine.
    #[arg(long, value_name = "FILE")]
    text: Option<PathBuf>,

    /// Emit inventory create-requests instead of parsed items.
    #[arg(long)]
    inventory: bool,

    /// Receipt images (JPEG, PNG, ...).
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

/// One line of output per input image.
#[derive(Debug, Serialize)]
struct ScanReport {
    file: String,
    #[serde(flatten)]
    outcome: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Items(ParseResult),
    Inventory(Vec<NewInventoryItem>),
    Error(String),
}

impl Outcome {
    fn from_result(result: ParseResult, inventory: bool) -> Self {
        if inventory {
            Outcome::Inventory(to_create_requests(&result))
        } else {
            Outcome::Items(result)
        }
    }
}

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(target: TRACING_TARGET_STARTUP, error = %error, "scan aborted");
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing();
    tracing::debug!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        features = ?enabled_features(),
        "starting pantry-scan"
    );

    let (config, lexicon) = load_settings(&cli)?;
    let backend = create_backend(&cli, &config)?;
    let pipeline = Arc::new(ReceiptPipeline::with_config(backend, &config, &lexicon));

    let reports = scan_all(pipeline, &cli).await;
    let failed = reports.iter().filter(|r| matches!(r.outcome, Outcome::Error(_))).count();

    let json = serde_json::to_string_pretty(&reports).context("failed to serialize scan results")?;
    println!("{json}");

    tracing::info!(
        target: TRACING_TARGET_SCAN,
        images = reports.len(),
        failed,
        "scan finished"
    );
    Ok(())
}

/// Initializes tracing with environment-based filtering. Logs go to stderr;
/// stdout carries only the JSON result.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(cli: &Cli) -> anyhow::Result<(PipelineConfig, Lexicon)> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("invalid configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(path) = &cli.lexicon {
        config.lexicon_path = Some(path.clone());
    }
    let lexicon = config.load_lexicon().context("invalid lexicon")?;
    Ok((config, lexicon))
}

fn create_backend(cli: &Cli, config: &PipelineConfig) -> anyhow::Result<Box<dyn OcrBackend>> {
    match &cli.text {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Box::new(MockRecognizer::new(text)))
        }
        None => engine(config),
    }
}

#[cfg(feature = "tesseract")]
fn engine(config: &PipelineConfig) -> anyhow::Result<Box<dyn OcrBackend>> {
    Ok(Box::new(pantry_ocr::TesseractRecognizer::new(config.ocr.clone())))
}

#[cfg(not(feature = "tesseract"))]
fn engine(_config: &PipelineConfig) -> anyhow::Result<Box<dyn OcrBackend>> {
    Err(pantry_ocr::OcrError::NotAvailable).context("no OCR engine built in; pass --text FILE")
}

/// Scan every image concurrently. Reports come back in argument order.
async fn scan_all(pipeline: Arc<Pipeline>, cli: &Cli) -> Vec<ScanReport> {
    let jobs = cli
        .jobs
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .max(1);
    let permits = Arc::new(Semaphore::new(jobs));
    let limit = Duration::from_secs(cli.timeout_secs);

    let tasks: Vec<_> = cli
        .images
        .iter()
        .map(|path| {
            let pipeline = Arc::clone(&pipeline);
            let permits = Arc::clone(&permits);
            let path = path.clone();
            let inventory = cli.inventory;
            tokio::spawn(async move {
                let permit = permits.acquire_owned().await.ok();
                scan_one(pipeline, path, limit, inventory, permit).await
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(tasks.len());
    for (task, path) in tasks.into_iter().zip(&cli.images) {
        let report = task.await.unwrap_or_else(|e| ScanReport {
            file: path.display().to_string(),
            outcome: Outcome::Error(format!("scan task failed: {e}")),
        });
        reports.push(report);
    }
    reports
}

/// The pipeline itself has no deadline; an image that overruns is reported
/// as failed while its blocking task runs to completion in the background.
/// The job slot is held by the blocking task, not by this report.
async fn scan_one(
    pipeline: Arc<Pipeline>,
    path: PathBuf,
    limit: Duration,
    inventory: bool,
    permit: Option<OwnedSemaphorePermit>,
) -> ScanReport {
    let file = path.display().to_string();
    let job = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        pipeline.process_file(&path)
    });

    let outcome = match tokio::time::timeout(limit, job).await {
        Ok(Ok(Ok(result))) => Outcome::from_result(result, inventory),
        Ok(Ok(Err(e))) => {
            tracing::warn!(target: TRACING_TARGET_SCAN, file = %file, error = %e, "scan failed");
            Outcome::Error(e.to_string())
        }
        Ok(Err(e)) => Outcome::Error(format!("scan task failed: {e}")),
        Err(_) => {
            tracing::warn!(target: TRACING_TARGET_SCAN, file = %file, secs = limit.as_secs(), "scan timed out");
            Outcome::Error(format!("timed out after {}s", limit.as_secs()))
        }
    };

    ScanReport { file, outcome }
}

fn enabled_features() -> Vec<&'static str> {
    [cfg!(feature = "tesseract").then_some("tesseract")]
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use pantry_core::ParsedItem;
    use pantry_ocr::OcrError;
    use std::ffi::OsStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item() -> ParsedItem {
        ParsedItem::new("우유", 2, Some("개".into()), Some(3000)).unwrap()
    }

    #[test]
    fn cli_parses_flags_and_images() {
        let cli = Cli::try_parse_from([
            "pantry-scan",
            "--timeout-secs",
            "5",
            "--inventory",
            "a.jpg",
            "b.png",
        ])
        .unwrap();
        assert_eq!(cli.timeout_secs, 5);
        assert!(cli.inventory);
        assert_eq!(cli.images, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
    }

    #[test]
    fn cli_requires_an_image() {
        assert!(Cli::try_parse_from(["pantry-scan"]).is_err());
    }

    #[test]
    fn report_serializes_items_or_error() {
        let ok = ScanReport {
            file: "r.jpg".into(),
            outcome: Outcome::from_result(ParseResult::new(vec![item()]), false),
        };
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["file"], "r.jpg");
        assert_eq!(value["items"][0]["name"], "우유");
        assert_eq!(value["items"][0]["price"], 3000);

        let err = ScanReport { file: "x.jpg".into(), outcome: Outcome::Error("boom".into()) };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "boom");
        assert!(value.get("items").is_none());
    }

    #[test]
    fn inventory_outcome_marks_origin() {
        let outcome = Outcome::from_result(ParseResult::new(vec![item()]), true);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["inventory"][0]["origin"], "receipt_scan");
        assert_eq!(value["inventory"][0]["quantity"], 2);
    }

    #[test]
    fn text_file_feeds_mock_backend() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("ocr.txt");
        std::fs::write(&text, "우유 2개 3,000원\n").unwrap();
        let cli = Cli::try_parse_from([
            OsStr::new("pantry-scan"),
            OsStr::new("--text"),
            text.as_os_str(),
            OsStr::new("r.jpg"),
        ])
        .unwrap();

        let (config, lexicon) = load_settings(&cli).unwrap();
        let backend = create_backend(&cli, &config).unwrap();
        assert_eq!(backend.name(), "mock");
        let pipeline = ReceiptPipeline::with_config(backend, &config, &lexicon);
        assert_eq!(pipeline.process_text("우유 2개 3,000원").len(), 1);
    }

    #[tokio::test]
    async fn unreadable_files_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"not an image").unwrap();
        let missing = dir.path().join("missing.png");

        let backend: Box<dyn OcrBackend> = Box::new(MockRecognizer::new(""));
        let pipeline: Arc<Pipeline> = Arc::new(ReceiptPipeline::new(backend));
        let cli = Cli::try_parse_from([OsStr::new("pantry-scan"), garbage.as_os_str(), missing.as_os_str()])
            .unwrap();

        let reports = scan_all(pipeline, &cli).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| matches!(r.outcome, Outcome::Error(_))));
        assert!(reports[0].file.ends_with("garbage.jpg"));
    }

    /// Sleeps inside OCR and remembers how many calls overlapped.
    #[derive(Default)]
    struct SlowRecognizer {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl OcrBackend for SlowRecognizer {
        fn name(&self) -> &str {
            "slow"
        }

        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn timed_out_scan_keeps_its_job_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for name in ["a.png", "b.png"] {
            let path = dir.path().join(name);
            DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([255])))
                .save(&path)
                .unwrap();
            paths.push(path);
        }

        let slow = Arc::new(SlowRecognizer::default());
        let backend: Box<dyn OcrBackend> = Box::new(Arc::clone(&slow));
        let pipeline: Arc<Pipeline> = Arc::new(ReceiptPipeline::new(backend));
        let cli = Cli::try_parse_from([
            OsStr::new("pantry-scan"),
            OsStr::new("--jobs"),
            OsStr::new("1"),
            OsStr::new("--timeout-secs"),
            OsStr::new("0"),
            paths[0].as_os_str(),
            paths[1].as_os_str(),
        ])
        .unwrap();

        let reports = scan_all(pipeline, &cli).await;
        assert!(reports.iter().all(|r| matches!(&r.outcome, Outcome::Error(e) if e.starts_with("timed out"))));

        // Let the abandoned OCR calls finish.
        while slow.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    }
}
