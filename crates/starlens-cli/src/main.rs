use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use starlens_core::pipeline::DEFAULT_TOP_K;
use starlens_core::{
    preprocess, CascadeLocator, CascadeParams, FaceLocator, LabelCatalog, OnnxClassifier, Pipeline,
};

#[derive(Parser)]
#[command(name = "starlens", about = "starlens offline classification tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the face in an image file
    Predict {
        /// Image to classify
        image: PathBuf,
        #[command(flatten)]
        artifacts: Artifacts,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the labels in a label map
    Labels {
        /// JSON label map
        #[arg(long, default_value = "label_map.json")]
        labels: PathBuf,
    },
    /// Print the face regions found in an image file
    Detect {
        /// Image to scan
        image: PathBuf,
        /// SeetaFace cascade parameter file
        #[arg(long, default_value = "models/seeta_fd_frontal_v1.0.bin")]
        cascade: PathBuf,
        #[command(flatten)]
        detector: DetectorArgs,
    },
}

#[derive(Args)]
struct Artifacts {
    /// JSON label map
    #[arg(long, default_value = "label_map.json")]
    labels: PathBuf,
    /// SeetaFace cascade parameter file
    #[arg(long, default_value = "models/seeta_fd_frontal_v1.0.bin")]
    cascade: PathBuf,
    /// ONNX classifier
    #[arg(long, default_value = "models/cnn_face_model.onnx")]
    model: PathBuf,
    /// ONNX Runtime intra-op threads
    #[arg(long, default_value_t = 2)]
    threads: usize,
    /// Number of ranked predictions to show
    #[arg(
        long,
        default_value_t = DEFAULT_TOP_K,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    top_k: usize,
    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args)]
struct DetectorArgs {
    /// Image pyramid downscale ratio per pass
    #[arg(long, default_value_t = 1.1)]
    scale_factor: f32,
    /// Smallest face edge in pixels (>= 20)
    #[arg(long, default_value_t = 20)]
    min_face_size: u32,
    /// Minimum cascade score to accept a face
    #[arg(long, default_value_t = 2.0)]
    score_threshold: f64,
}

impl DetectorArgs {
    fn params(&self) -> CascadeParams {
        CascadeParams {
            scale_factor: self.scale_factor,
            min_face_size: self.min_face_size,
            score_threshold: self.score_threshold,
            ..CascadeParams::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict { image, artifacts, json } => predict(&image, &artifacts, json),
        Commands::Labels { labels } => {
            let catalog = LabelCatalog::load(&labels)?;
            for (index, name) in catalog.names().iter().enumerate() {
                println!("{index:>4}  {name}");
            }
            println!("{} labels", catalog.len());
            Ok(())
        }
        Commands::Detect { image: path, cascade, detector } => {
            let locator = CascadeLocator::load(&cascade, detector.params())?;
            let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let img = preprocess::decode(&bytes)?;
            let gray = image::imageops::grayscale(&img);
            let faces = locator.locate(&gray);
            if faces.is_empty() {
                println!("no faces found ({}x{})", img.width(), img.height());
            }
            for (i, face) in faces.iter().enumerate() {
                println!("face {i}: x={} y={} w={} h={}", face.x, face.y, face.width, face.height);
            }
            Ok(())
        }
    }
}

fn predict(image: &Path, artifacts: &Artifacts, json: bool) -> Result<()> {
    let catalog = Arc::new(LabelCatalog::load(&artifacts.labels)?);
    let locator = CascadeLocator::load(&artifacts.cascade, artifacts.detector.params())?;
    let classifier = OnnxClassifier::load(&artifacts.model, catalog.len(), artifacts.threads)?;
    let mut pipeline = Pipeline::new(catalog, Box::new(locator), Box::new(classifier))
        .with_top_k(artifacts.top_k);

    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let prediction = pipeline.predict(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    println!(
        "{} ({:.2}%), class {}, {}",
        prediction.label,
        prediction.confidence * 100.0,
        prediction.class_index,
        if prediction.face_detected { "face detected" } else { "no face, center crop" }
    );
    for (rank, entry) in prediction.top.iter().enumerate() {
        println!("  {}. {:<32} {:.4}", rank + 1, entry.label, entry.confidence);
    }
    Ok(())
}
