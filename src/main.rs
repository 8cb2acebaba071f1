//! Detection Round Trip - Main Entry Point
//!
//! Loads the configured weights, exports them to ONNX, reloads the exported
//! graph and runs one inference call, printing the run report as JSON.

use anyhow::{Context, Result};
use detection_roundtrip::{
    config::{AppConfig, LoggingConfig},
    framework::OnnxFramework,
    runner::InferenceRunner,
    types::source::ImageSource,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load_or_default()?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!("Starting detection round trip");
    info!(
        weights = %config.model.weights.display(),
        format = %config.model.export_format,
        source = %config.inference.source,
        "Configuration loaded successfully"
    );
    info!(
        "Thresholds: conf={:.2}, iou={:.2}, max_det={}",
        config.inference.conf_threshold,
        config.inference.iou_threshold,
        config.inference.max_detections
    );

    let framework = OnnxFramework::from_config(&config)?;
    let runner = InferenceRunner::new(framework);

    let source = ImageSource::from(config.inference.source.as_str());
    let outcome = runner.run(&config.model.weights, &config.model.export_format, &source);

    runner.metrics().print_summary();

    let report = outcome.context("Round trip failed")?;
    info!(run_id = %report.run_id, "{}", report.result.summary());
    println!("{}", report.to_json()?);

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("detection_roundtrip={}", logging.level)
            .parse()
            .context("Invalid log level")?,
    );

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    Ok(())
}
