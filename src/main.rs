//! Batch heatmap generation over a directory of videos.

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use deepfake_saliency::{
    api::prediction_api::{RunnerConfig, run_directory},
    ml::{
        classifier::{GuidedBackward, sequential::SequentialClassifier},
        error::MlResult,
        face::detect::YoloFaceDetector,
        pipeline::HeatmapPipeline,
        runtime::{ModelPaths, PipelineConfig, Precision},
    },
};

fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "deepfake_saliency=info,ort=warn".into());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    let root_dir = std::env::args().nth(1).map(PathBuf::from);
    if let Err(e) = run(root_dir) {
        error!("run failed: {e}");
        std::process::exit(1);
    }
}

fn run(root_dir: Option<PathBuf>) -> MlResult<()> {
    let config = PipelineConfig::from_env()?;
    let models = ModelPaths::from_env()?;
    let runner = RunnerConfig::from_env(root_dir);
    info!(?config, root = %runner.root_dir.display(), "starting");

    let detector = YoloFaceDetector::new(&models.face_detection, &config.provider_policy())?;
    let mut classifier = SequentialClassifier::load(&models.classifier_weights)?;
    if config.precision == Precision::Half {
        classifier = classifier.into_half();
    }
    let classifier: Box<dyn GuidedBackward> = Box::new(classifier);

    let mut pipeline = HeatmapPipeline::new(config, Box::new(detector), classifier)?;
    let summary = run_directory(&mut pipeline, &runner)?;
    info!(
        videos = summary.ledger.processed(),
        correct = summary.ledger.correct(),
        results = %summary.result_file.display(),
        "done"
    );
    Ok(())
}
