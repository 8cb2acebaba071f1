//! Load / export / reload / infer sequence

use crate::error::{Result, RunnerError};
use crate::framework::DetectionFramework;
use crate::metrics::{RunMetrics, Stage};
use crate::models::format::ExportFormat;
use crate::types::detection::InferenceResult;
use crate::types::report::RunReport;
use crate::types::source::ImageSource;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Drives a [`DetectionFramework`] through the round trip.
///
/// Steps run strictly in order and the first failure aborts the run; the
/// exported artifact is always reloaded from the path the export returned.
pub struct InferenceRunner<F: DetectionFramework> {
    framework: F,
    metrics: RunMetrics,
}

impl<F: DetectionFramework> InferenceRunner<F> {
    pub fn new(framework: F) -> Self {
        Self {
            framework,
            metrics: RunMetrics::new(),
        }
    }

    pub fn framework(&self) -> &F {
        &self.framework
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Load a weights file or exported artifact
    pub fn load_model(&self, path: &Path) -> Result<F::Handle> {
        self.framework.load(path)
    }

    /// Export a handle, returning the artifact path
    pub fn export_model(&self, handle: &F::Handle, format: ExportFormat) -> Result<PathBuf> {
        self.framework.export(handle, format)
    }

    /// Run inference on one image source
    pub fn infer(&self, handle: &mut F::Handle, source: &ImageSource) -> Result<InferenceResult> {
        self.framework.infer(handle, source)
    }

    /// Full sequence: load `weights`, export to `format`, reload the artifact, infer on `source`
    pub fn run(&self, weights: &Path, format: &str, source: &ImageSource) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            weights = %weights.display(),
            format = %format,
            source = %source,
            "Starting round trip"
        );

        let handle = self.timed(Stage::Load, || self.load_model(weights))?;

        let artifact = self.timed(Stage::Export, || {
            let format: ExportFormat = format
                .parse()
                .map_err(|reason: String| RunnerError::export(weights, reason))?;
            self.export_model(&handle, format)
        })?;
        drop(handle);

        let mut reloaded = self.timed(Stage::Reload, || self.load_model(&artifact))?;

        let result = self.timed(Stage::Infer, || self.infer(&mut reloaded, source))?;
        self.metrics.record_result(&result);

        info!(
            artifact = %artifact.display(),
            detections = result.len(),
            summary = %result.summary(),
            total_ms = format!("{:.1}", result.speed.total_ms()),
            "Round trip complete"
        );

        Ok(RunReport::new(
            started_at,
            weights.to_path_buf(),
            artifact,
            source.describe(),
            result,
        ))
    }

    fn timed<T>(&self, stage: Stage, step: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let outcome = step();
        self.metrics
            .record_stage(stage, start.elapsed(), outcome.is_ok());

        if let Err(e) = &outcome {
            error!(stage = %stage, kind = e.kind(), error = %e, "Round trip aborted");
        }
        outcome
    }
}
