//! Run report emitted after a complete load / export / reload / infer sequence

use crate::types::detection::InferenceResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Outcome of one full run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier
    pub run_id: String,

    /// Run start timestamp
    pub started_at: DateTime<Utc>,

    /// Weights file the run started from
    pub weights: PathBuf,

    /// Exported interchange artifact that was reloaded
    pub artifact: PathBuf,

    /// Image source description
    pub source: String,

    pub result: InferenceResult,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        weights: PathBuf,
        artifact: PathBuf,
        source: String,
        result: InferenceResult,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            weights,
            artifact,
            source,
            result,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json() {
        let report = RunReport::new(
            Utc::now(),
            PathBuf::from("model.pt"),
            PathBuf::from("model.onnx"),
            "https://ultralytics.com/images/bus.jpg".to_string(),
            InferenceResult::new(810, 1080, Vec::new()),
        );

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["artifact"], "model.onnx");
        assert_eq!(json["result"]["image_width"], 810);
        assert_eq!(json["run_id"].as_str().unwrap().len(), 36);
    }
}
