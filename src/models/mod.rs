//! Model loading, export and inference components

pub mod exporter;
pub mod format;
pub mod inference;
pub mod loader;
pub mod postprocess;

pub use exporter::ModelExporter;
pub use format::{ExportFormat, ModelFormat};
pub use inference::DetectionEngine;
pub use loader::{ModelHandle, ModelLoader};
