use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::ml::{
    error::MlResult,
    types::{Label, Prediction},
};

pub const DEFAULT_KLASS: &str = "uncategorized";

/// One processed video.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRecord {
    pub name: String,
    pub prediction: Prediction,
    pub klass: String,
    pub correct_label: Option<Label>,
    pub compression: Option<String>,
}

/// Column-per-field layout of the result file. `correct_label` and
/// `compression` only hold entries for videos that had one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoColumns {
    pub name: Vec<String>,
    pub pred: Vec<f32>,
    pub klass: Vec<String>,
    pub pred_label: Vec<Label>,
    pub correct_label: Vec<Label>,
    pub compression: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerFile {
    pub video: VideoColumns,
}

/// Results of a batch run, in processing order.
#[derive(Clone, Debug, Default)]
pub struct ResultLedger {
    records: Vec<PredictionRecord>,
    correct: usize,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. `klass` is stored lowercased, and a supplied
    /// ground-truth label that matches the prediction counts as correct.
    pub fn record(
        &mut self,
        name: impl Into<String>,
        prediction: Prediction,
        klass: &str,
        correct_label: Option<Label>,
        compression: Option<String>,
    ) {
        if correct_label == Some(prediction.label) {
            self.correct += 1;
        }
        self.records.push(PredictionRecord {
            name: name.into(),
            prediction,
            klass: klass.to_lowercase(),
            correct_label,
            compression,
        });
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn processed(&self) -> usize {
        self.records.len()
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn to_file(&self) -> LedgerFile {
        let mut video = VideoColumns::default();
        for record in &self.records {
            video.name.push(record.name.clone());
            video.pred.push(record.prediction.probability);
            video.klass.push(record.klass.clone());
            video.pred_label.push(record.prediction.label);
            if let Some(label) = record.correct_label {
                video.correct_label.push(label);
            }
            if let Some(compression) = &record.compression {
                video.compression.push(compression.clone());
            }
        }
        LedgerFile { video }
    }

    /// Writes the ledger to
    /// `{result_dir}/prediction_gb_{dataset}_{net}_{YYYYmmdd_HHMMSS}.json`.
    pub fn write(
        &self,
        result_dir: &Path,
        dataset: &str,
        net: &str,
        now: DateTime<Local>,
    ) -> MlResult<PathBuf> {
        fs::create_dir_all(result_dir)?;
        let path = result_dir.join(result_file_name(dataset, net, now));
        let json = serde_json::to_vec(&self.to_file())?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

pub fn result_file_name(dataset: &str, net: &str, now: DateTime<Local>) -> String {
    format!(
        "prediction_gb_{dataset}_{net}_{}.json",
        now.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::{LedgerFile, ResultLedger, result_file_name};
    use crate::ml::types::{Label, Prediction};

    fn fake(probability: f32) -> Prediction {
        Prediction {
            label: Label::Fake,
            probability,
        }
    }

    #[test]
    fn records_are_laid_out_by_column() {
        let mut ledger = ResultLedger::new();
        ledger.record("a.mp4", fake(0.9), "Celeb-DF", Some(Label::Fake), None);
        ledger.record("b.mp4", Prediction::no_faces(), "uncategorized", None, Some("c23".into()));

        let json = serde_json::to_value(ledger.to_file()).unwrap();

        assert_eq!(json["video"]["name"], serde_json::json!(["a.mp4", "b.mp4"]));
        assert_eq!(json["video"]["klass"], serde_json::json!(["celeb-df", "uncategorized"]));
        assert_eq!(json["video"]["pred_label"], serde_json::json!(["FAKE", "REAL"]));
        assert_eq!(json["video"]["correct_label"], serde_json::json!(["FAKE"]));
        assert_eq!(json["video"]["compression"], serde_json::json!(["c23"]));
        assert_eq!(json["video"]["pred"][1], serde_json::json!(0.5));
    }

    #[test]
    fn matching_ground_truth_counts_as_correct() {
        let mut ledger = ResultLedger::new();
        ledger.record("a.mp4", fake(0.9), "x", Some(Label::Fake), None);
        ledger.record("b.mp4", fake(0.7), "x", Some(Label::Real), None);
        ledger.record("c.mp4", fake(0.6), "x", None, None);

        assert_eq!(ledger.processed(), 3);
        assert_eq!(ledger.correct(), 1);
    }

    #[test]
    fn result_file_is_named_after_dataset_net_and_time() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            result_file_name("other", "genconvit", now),
            "prediction_gb_other_genconvit_20240309_140507.json"
        );
    }

    #[test]
    fn write_creates_the_result_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ResultLedger::new();
        ledger.record("a.mp4", fake(0.8), "uncategorized", None, None);
        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let path = ledger
            .write(&dir.path().join("result"), "other", "genconvit", now)
            .unwrap();

        let parsed: LedgerFile =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed, ledger.to_file());
    }
}
