//! Configuration management for the detection round trip

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Pretrained weights file to start from
    pub weights: PathBuf,
    /// Interchange format identifier to export to
    #[serde(default = "default_export_format")]
    pub export_format: String,
}

fn default_export_format() -> String {
    "onnx".to_string()
}

/// External exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Exporter program invoked for native weights
    #[serde(default = "default_export_program")]
    pub program: String,
    /// Arguments; `{weights}`, `{format}`, `{imgsz}`, `{output}` are substituted
    #[serde(default = "default_export_args")]
    pub args: Vec<String>,
    /// Square input size baked into the exported graph
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
}

fn default_export_program() -> String {
    "yolo".to_string()
}

fn default_export_args() -> Vec<String> {
    vec![
        "export".to_string(),
        "model={weights}".to_string(),
        "format={format}".to_string(),
        "imgsz={imgsz}".to_string(),
    ]
}

fn default_imgsz() -> u32 {
    640
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            program: default_export_program(),
            args: default_export_args(),
            imgsz: default_imgsz(),
        }
    }
}

/// Inference configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Image source: http(s) URL or local path
    #[serde(default = "default_source")]
    pub source: String,
    /// Minimum confidence for a detection to be kept
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    /// IoU above which same-class boxes are suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Maximum detections returned per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_source() -> String {
    "https://ultralytics.com/images/bus.jpg".to_string()
}

fn default_conf_threshold() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_max_detections() -> usize {
    300
}

fn default_onnx_threads() -> usize {
    1
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            conf_threshold: default_conf_threshold(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            onnx_threads: default_onnx_threads(),
        }
    }
}

/// Remote image fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// User agent sent with image requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds; unset means no timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from the default path, or built-in defaults when absent
    pub fn load_or_default() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load()
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                weights: PathBuf::from("./yolo11x.pt"),
                export_format: default_export_format(),
            },
            export: ExportConfig::default(),
            inference: InferenceConfig::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.weights, PathBuf::from("./yolo11x.pt"));
        assert_eq!(config.model.export_format, "onnx");
        assert_eq!(config.inference.source, "https://ultralytics.com/images/bus.jpg");
        assert_eq!(config.inference.conf_threshold, 0.25);
        assert_eq!(config.inference.iou_threshold, 0.7);
        assert_eq!(config.export.imgsz, 640);
        assert!(config.fetch.timeout_secs.is_none());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[model]\nweights = \"weights/model.pt\"\n\n[inference]\nconf_threshold = 0.4"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.weights, PathBuf::from("weights/model.pt"));
        assert_eq!(config.model.export_format, "onnx");
        assert!((config.inference.conf_threshold - 0.4).abs() < 1e-6);
        assert_eq!(config.inference.max_detections, 300);
        assert_eq!(config.export.program, "yolo");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_model_section_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        assert!(AppConfig::load_from_path(file.path()).is_err());
    }
}
