//! Capability surface of the detection framework used by the runner

use crate::config::AppConfig;
use crate::error::Result;
use crate::fetch::ImageFetcher;
use crate::models::exporter::ModelExporter;
use crate::models::format::ExportFormat;
use crate::models::inference::DetectionEngine;
use crate::models::loader::{ModelHandle, ModelLoader};
use crate::types::detection::InferenceResult;
use crate::types::source::ImageSource;
use std::path::{Path, PathBuf};

/// Load / export / infer capabilities of a detection framework.
///
/// [`crate::runner::InferenceRunner`] only talks to a framework through
/// this trait, so any backend exposing the same operations can be plugged in.
pub trait DetectionFramework {
    type Handle;

    /// Load a model file into an in-memory handle
    fn load(&self, path: &Path) -> Result<Self::Handle>;

    /// Serialize a handle to `format`, returning the artifact path
    fn export(&self, handle: &Self::Handle, format: ExportFormat) -> Result<PathBuf>;

    /// Run the handle on one image source
    fn infer(&self, handle: &mut Self::Handle, source: &ImageSource) -> Result<InferenceResult>;
}

/// ONNX Runtime backed framework
pub struct OnnxFramework {
    loader: ModelLoader,
    exporter: ModelExporter,
    engine: DetectionEngine,
    fetcher: ImageFetcher,
}

impl OnnxFramework {
    pub fn new(
        loader: ModelLoader,
        exporter: ModelExporter,
        engine: DetectionEngine,
        fetcher: ImageFetcher,
    ) -> Self {
        Self {
            loader,
            exporter,
            engine,
            fetcher,
        }
    }

    /// Create the framework from configuration, initializing ONNX Runtime
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let loader = ModelLoader::with_threads(config.inference.onnx_threads)?
            .with_default_imgsz(config.export.imgsz);
        Ok(Self::new(
            loader,
            ModelExporter::from_config(&config.export),
            DetectionEngine::from_config(&config.inference),
            ImageFetcher::new(&config.fetch)?,
        ))
    }
}

impl DetectionFramework for OnnxFramework {
    type Handle = ModelHandle;

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        self.loader.load(path)
    }

    fn export(&self, handle: &ModelHandle, format: ExportFormat) -> Result<PathBuf> {
        self.exporter.export(handle, format)
    }

    fn infer(&self, handle: &mut ModelHandle, source: &ImageSource) -> Result<InferenceResult> {
        DetectionEngine::ensure_runnable(handle)?;
        let image = self.fetcher.fetch(source)?;
        self.engine.detect_with_handle(handle, &image)
    }
}
