//! GateScan - student ID card scan pipeline
//!
//! Reads a photographed ID card, runs OCR through a bounded engine pool,
//! and parses the recognized text into name, branch, and student ID.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gate_scan::config::{self, AppConfig};
use gate_scan::engine::{create_engine, EngineFactory, EnginePool};
use gate_scan::scan::{ScanOutcome, ScanResponse, Scanner};
use gate_scan::storage::{self, MemoryStore, RecordStore};

/// GateScan - ID card scanner
#[derive(Parser, Debug)]
#[command(name = "gate-scan")]
#[command(about = "Scan a student ID card image and extract structured fields")]
struct Args {
    /// Path to the ID card image (PNG or JPEG)
    image: PathBuf,

    /// Path to a TOML config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured pool size
    #[arg(long)]
    pool_size: Option<usize>,

    /// Print the raw JSON response body
    #[arg(long)]
    json: bool,

    /// Confirm a successful scan and store the verified record
    #[arg(long)]
    confirm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = load_or_create_config(args.config.as_deref())?;
    if let Some(size) = args.pool_size {
        config.pool.size = size;
    }

    info!(
        "GateScan starting (backend: {:?}, pool size: {})",
        config.engine.backend, config.pool.size
    );

    let backend = config.engine.backend;
    let engine_settings = config.engine_settings();
    let factory: EngineFactory = Arc::new(move || create_engine(backend, &engine_settings));

    let pool = EnginePool::initialize(factory, config.pool_settings()).await;
    let scanner = Scanner::new(pool.clone(), config.scan_settings());
    info!("Scan service ready: {}", scanner.is_ready());

    let payload = read_image_payload(&args.image)?;
    let outcome = scanner.scan(&payload).await;

    let exit_code = report_outcome(&outcome, args.json)?;

    if args.confirm {
        if let ScanOutcome::Success(fields) = &outcome {
            let store = MemoryStore::new();
            let record = store
                .create(fields.clone())
                .await
                .context("failed to store confirmed record")?;
            info!(
                "Stored verified record {} for student {}",
                record.id, record.student_id
            );
        }
    }

    pool.shutdown(config.drain_timeout()).await;
    info!("GateScan shutdown complete");

    std::process::exit(exit_code)
}

/// Load configuration from file or create default
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Read an image file and wrap it as a data-URI scan payload
fn read_image_payload(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;

    let subtype = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "jpeg",
        Some("bmp") => "bmp",
        _ => "png",
    };

    Ok(format!(
        "data:image/{subtype};base64,{}",
        BASE64.encode(&bytes)
    ))
}

/// Print the outcome the way the HTTP layer would serialize it
fn report_outcome(outcome: &ScanOutcome, json: bool) -> Result<i32> {
    match outcome {
        ScanOutcome::Success(fields) => {
            if json {
                let response = ScanResponse::from(fields.clone());
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("name:      {}", fields.name);
                println!("branch:    {}", fields.branch);
                println!("studentId: {}", fields.student_id);
            }
            Ok(0)
        }
        other => {
            let message = other.client_message().unwrap_or("scan failed");
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "error": message }))?
                );
            } else {
                eprintln!("scan failed ({}): {}", other.status_code(), message);
            }
            Ok(1)
        }
    }
}
