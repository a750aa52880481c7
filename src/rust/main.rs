use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use lungscan::web::{self, AppState, SessionStore};
use lungscan::{AppConfig, Classifier, ModelConfig, ScanImage};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the model and serve the web interface and JSON API
    Serve(AppConfig),
    /// Classify one or more scans from disk
    Classify {
        #[command(flatten)]
        model: ModelConfig,

        /// Scans to classify (png, jpg or jpeg)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

/// Loads the model or aborts: nothing can be served without it.
fn build_classifier(config: &ModelConfig) -> anyhow::Result<Classifier> {
    let start_time = Instant::now();
    let loader = config.model_loader();
    let model = loader
        .load()
        .with_context(|| format!("Failed to load model from {:?}", config.model_path))?;
    info!("=== Model loaded (took {:.2?}) ===", start_time.elapsed());

    Ok(Classifier::new(model).with_input_size(config.input_width, config.input_height))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let classifier = build_classifier(&config.model)?;
    let addr = config.bind_addr().context("Invalid bind address")?;
    let sessions = SessionStore::with_limits(config.max_sessions, config.session_ttl());
    let app = web::router(AppState::with_sessions(classifier, sessions), config.body_limit);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn classify(model: &ModelConfig, images: &[PathBuf]) -> anyhow::Result<()> {
    let classifier = build_classifier(model)?;

    info!("=== Running Classifications ({} inputs) ===", images.len());
    let classify_start = Instant::now();
    let mut failures = 0;

    for (i, path) in images.iter().enumerate() {
        info!("Scan {}/{}: {:?}", i + 1, images.len(), path);
        let result = ScanImage::open(path).and_then(|image| {
            let prediction = classifier.classify(&image)?;
            Ok((image, prediction))
        });

        match result {
            Ok((image, prediction)) => {
                let meta = image.metadata();
                let mut scores: Vec<_> = prediction.scores().collect();
                scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

                println!("\n{}", path.display());
                println!("  Image: {} {} {}x{}", meta.format, meta.mode, meta.width, meta.height);
                println!("  Prediction: {} ({:.2}%)", prediction.label, prediction.confidence);
                println!("  Class probabilities (sorted):");
                for (label, score) in scores {
                    println!("    {}: {:.1}%", label, score * 100.0);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("\n{}: {}", path.display(), e);
                if e.is_bad_input() {
                    eprintln!("  Please provide a readable png, jpg or jpeg scan.");
                }
            }
        }
    }

    info!("Classification time: {:.2?}", classify_start.elapsed());
    if failures > 0 {
        anyhow::bail!("{} of {} scans could not be classified", failures, images.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Serve(config) => serve(config).await,
        Command::Classify { model, images } => classify(&model, &images),
    }
}
