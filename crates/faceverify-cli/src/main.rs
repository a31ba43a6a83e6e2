use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceverify_core::{DistanceMetric, OnnxVerifier, Verifier, ARCFACE_MODEL_NAME};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "faceverify", about = "Offline face verification and detection diagnostics")]
struct Cli {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true, env = "FACEVERIFY_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two image files and print the verification result
    Verify {
        img1: PathBuf,
        img2: PathBuf,
        /// cosine, euclidean or euclidean_l2
        #[arg(long, default_value_t = DistanceMetric::Cosine)]
        metric: DistanceMetric,
        /// Decision cutoff (defaults to the metric's ArcFace threshold)
        #[arg(long)]
        threshold: Option<f32>,
        /// Fail when no face is found instead of embedding the whole image
        #[arg(long)]
        enforce_detection: bool,
    },
    /// List faces detected in an image file
    Detect { image: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.unwrap_or_else(faceverify_core::default_model_dir);

    match cli.command {
        Commands::Verify {
            img1,
            img2,
            metric,
            threshold,
            enforce_detection,
        } => {
            let mut verifier = load(&model_dir, metric, threshold)?;
            let result = verifier.verify(&img1, &img2, ARCFACE_MODEL_NAME, enforce_detection)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Detect { image } => {
            let mut verifier = load(&model_dir, DistanceMetric::default(), None)?;
            let faces = verifier.detect(&image)?;
            println!("{}", serde_json::to_string_pretty(&faces)?);
            if faces.is_empty() {
                eprintln!("no face detected in {}", image.display());
            }
        }
    }

    Ok(())
}

fn load(model_dir: &std::path::Path, metric: DistanceMetric, threshold: Option<f32>) -> Result<OnnxVerifier> {
    OnnxVerifier::load(model_dir, metric, threshold)
        .with_context(|| format!("loading models from {}", model_dir.display()))
}
