//! Detection Round Trip Library
//!
//! Loads a pretrained object-detection model, exports it to an interchange
//! format, reloads the exported artifact and runs inference on one image.

pub mod config;
pub mod error;
pub mod fetch;
pub mod framework;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod runner;
pub mod types;

pub use config::AppConfig;
pub use error::RunnerError;
pub use fetch::ImageFetcher;
pub use framework::{DetectionFramework, OnnxFramework};
pub use models::format::ExportFormat;
pub use models::loader::ModelHandle;
pub use runner::InferenceRunner;
pub use types::{detection::InferenceResult, report::RunReport, source::ImageSource};
