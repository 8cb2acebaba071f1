//! Stage timing and detection statistics for a round-trip run.

use crate::types::detection::InferenceResult;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Steps of the load / export / reload / infer sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Export,
    Reload,
    Infer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Export => "export",
            Stage::Reload => "reload",
            Stage::Infer => "infer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duration of one completed or failed stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration: Duration,
    pub ok: bool,
}

/// Metrics collector for one run
pub struct RunMetrics {
    /// Stages in the order they ran
    stages: RwLock<Vec<StageTiming>>,
    /// Total detections produced
    pub detections: AtomicU64,
    /// Confidence distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            stages: RwLock::new(Vec::with_capacity(4)),
            detections: AtomicU64::new(0),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a stage outcome
    pub fn record_stage(&self, stage: Stage, duration: Duration, ok: bool) {
        if let Ok(mut stages) = self.stages.write() {
            stages.push(StageTiming {
                stage,
                duration,
                ok,
            });
        }
    }

    /// Record the detections of an inference result
    pub fn record_result(&self, result: &InferenceResult) {
        self.detections
            .fetch_add(result.detections.len() as u64, Ordering::Relaxed);

        if let Ok(mut buckets) = self.score_buckets.write() {
            for det in &result.detections {
                let bucket = (det.confidence.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
                buckets[bucket] += 1;
            }
        }
    }

    pub fn get_stages(&self) -> Vec<StageTiming> {
        self.stages.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Duration of the first recorded run of `stage`
    pub fn stage_duration(&self, stage: Stage) -> Option<Duration> {
        self.get_stages()
            .into_iter()
            .find(|t| t.stage == stage)
            .map(|t| t.duration)
    }

    /// Stage that failed, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.get_stages().into_iter().find(|t| !t.ok).map(|t| t.stage)
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let stages = self.get_stages();
        let detections = self.detections.load(Ordering::Relaxed);
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              DETECTION ROUND TRIP - RUN SUMMARY              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        for timing in &stages {
            info!(
                "║ {:<8} {:>10.1} ms  {:<40}║",
                timing.stage.as_str(),
                timing.duration.as_secs_f64() * 1000.0,
                if timing.ok { "ok" } else { "FAILED" }
            );
        }
        info!(
            "║ Total elapsed: {:>8.1} ms  │  Detections: {:>6}           ║",
            self.elapsed().as_secs_f64() * 1000.0,
            detections
        );

        if detections > 0 {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Confidence Distribution:                                     ║");
            for (i, &count) in score_dist.iter().enumerate() {
                if count == 0 {
                    continue;
                }
                let pct = (count as f64 / detections as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!(
                    "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::detection::{BoundingBox, Detection};

    fn det(confidence: f32) -> Detection {
        Detection {
            class_id: 0,
            label: "person".to_string(),
            confidence,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_stage_recording() {
        let metrics = RunMetrics::new();
        metrics.record_stage(Stage::Load, Duration::from_millis(5), true);
        metrics.record_stage(Stage::Export, Duration::from_millis(50), false);

        assert_eq!(metrics.get_stages().len(), 2);
        assert_eq!(metrics.stage_duration(Stage::Export), Some(Duration::from_millis(50)));
        assert_eq!(metrics.stage_duration(Stage::Infer), None);
        assert_eq!(metrics.failed_stage(), Some(Stage::Export));
    }

    #[test]
    fn test_score_buckets() {
        let metrics = RunMetrics::new();
        let result = InferenceResult::new(10, 10, vec![det(0.05), det(0.93), det(1.0)]);
        metrics.record_result(&result);

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 2);
        assert_eq!(metrics.detections.load(Ordering::Relaxed), 3);
    }
}
