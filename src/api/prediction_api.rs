use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    api::result_ledger::{DEFAULT_KLASS, ResultLedger},
    ml::{
        error::MlResult,
        pipeline::{HeatmapPipeline, VideoReport},
        types::Label,
    },
    video::is_video,
};

pub const DEFAULT_ROOT_DIR: &str = "sample_prediction_data";

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub root_dir: PathBuf,
    pub result_dir: PathBuf,
    pub dataset: String,
    pub net: String,
    pub klass: String,
    /// Ground truth shared by every video in the run, when known.
    pub correct_label: Option<Label>,
    pub compression: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            result_dir: PathBuf::from("result"),
            dataset: "other".to_string(),
            net: "genconvit".to_string(),
            klass: DEFAULT_KLASS.to_string(),
            correct_label: None,
            compression: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_env(root_dir: Option<PathBuf>) -> Self {
        let defaults = Self::default();
        Self {
            root_dir: root_dir.unwrap_or(defaults.root_dir),
            result_dir: std::env::var("DFX_RESULT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.result_dir),
            dataset: std::env::var("DFX_DATASET").unwrap_or(defaults.dataset),
            net: std::env::var("DFX_NET").unwrap_or(defaults.net),
            ..defaults
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub ledger: ResultLedger,
    pub result_file: PathBuf,
}

/// Files directly under `root` that look like videos, sorted by name.
pub fn list_videos(root: &Path) -> MlResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if is_video(&path) {
            paths.push(path);
        } else {
            info!(path = %path.display(), "skipping non-video");
        }
    }
    paths.sort();
    Ok(paths)
}

/// Processes `videos` in order with a running counter starting at 1 and
/// collects the verdicts.
pub fn run_videos<F>(
    videos: &[PathBuf],
    config: &RunnerConfig,
    mut process: F,
) -> MlResult<ResultLedger>
where
    F: FnMut(&Path, usize) -> MlResult<VideoReport>,
{
    let mut ledger = ResultLedger::new();
    for (offset, path) in videos.iter().enumerate() {
        let counter = offset + 1;
        info!(counter, path = %path.display(), "processing video");
        let report = process(path, counter)?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        ledger.record(
            name,
            report.prediction,
            &config.klass,
            config.correct_label,
            config.compression.clone(),
        );
        if config.correct_label.is_some() {
            info!(correct = ledger.correct(), processed = ledger.processed(), "accuracy");
        }
    }
    Ok(ledger)
}

/// Runs the pipeline over every video in `config.root_dir` and writes the
/// result ledger.
pub fn run_directory(
    pipeline: &mut HeatmapPipeline,
    config: &RunnerConfig,
) -> MlResult<RunSummary> {
    let videos = list_videos(&config.root_dir)?;
    let ledger = run_videos(&videos, config, |path, counter| {
        pipeline.process_file(path, counter)
    })?;
    info!(
        videos = ledger.processed(),
        correct = ledger.correct(),
        "finished"
    );

    let result_file = ledger.write(
        &config.result_dir,
        &config.dataset,
        &config.net,
        chrono::Local::now(),
    )?;
    info!(path = %result_file.display(), "wrote results");
    Ok(RunSummary {
        ledger,
        result_file,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{RunnerConfig, list_videos, run_videos};
    use crate::ml::{
        error::MlError,
        pipeline::VideoReport,
        types::{Label, Prediction},
    };

    #[test]
    fn only_videos_are_listed_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.MP4", "a.avi", "notes.txt", "c.mov"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.mp4")).unwrap();

        let videos = list_videos(dir.path()).unwrap();

        let names: Vec<_> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.avi", "b.MP4", "c.mov"]);
    }

    #[test]
    fn counter_starts_at_one_and_results_follow_input_order() {
        let videos = vec![PathBuf::from("x/one.mp4"), PathBuf::from("x/two.mp4")];
        let config = RunnerConfig {
            klass: "DFDC".to_string(),
            correct_label: Some(Label::Fake),
            ..RunnerConfig::default()
        };
        let mut seen = Vec::new();

        let ledger = run_videos(&videos, &config, |path, counter| {
            seen.push(counter);
            let label = if path.ends_with("one.mp4") {
                Label::Fake
            } else {
                Label::Real
            };
            Ok(VideoReport {
                prediction: Prediction {
                    label,
                    probability: 0.75,
                },
                faces: 1,
                heatmaps: Vec::new(),
            })
        })
        .unwrap();

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(ledger.records()[0].name, "one.mp4");
        assert_eq!(ledger.records()[1].klass, "dfdc");
        assert_eq!(ledger.correct(), 1);
    }

    #[test]
    fn a_failing_video_stops_the_run() {
        let videos = vec![PathBuf::from("bad.mp4")];
        let result = run_videos(&videos, &RunnerConfig::default(), |_, _| {
            Err(MlError::Video("corrupt stream".to_string()))
        });
        assert!(result.is_err());
    }
}
