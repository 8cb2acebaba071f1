//! Model file formats and artifact path derivation

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Format of a model file on disk, recognized by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// Native PyTorch checkpoint (zip container)
    PyTorch,
    /// ONNX interchange graph
    Onnx,
    /// TorchScript archive
    TorchScript,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pt" | "pth" => Some(ModelFormat::PyTorch),
            "onnx" => Some(ModelFormat::Onnx),
            "torchscript" => Some(ModelFormat::TorchScript),
            _ => None,
        }
    }
}

/// Interchange formats a handle can be exported to and reloaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Onnx,
}

impl ExportFormat {
    /// Identifier passed to the exporter
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Onnx => "onnx",
        }
    }

    /// Conventional file extension of the artifact
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Onnx => "onnx",
        }
    }

    pub fn model_format(&self) -> ModelFormat {
        match self {
            ExportFormat::Onnx => ModelFormat::Onnx,
        }
    }

    /// Artifact path for a source model: same directory and base name, format extension
    pub fn artifact_path(&self, source: &Path) -> PathBuf {
        source.with_extension(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(ExportFormat::Onnx),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_from_base_name() {
        assert_eq!(
            ExportFormat::Onnx.artifact_path(Path::new("model.pt")),
            PathBuf::from("model.onnx")
        );
        assert_eq!(
            ExportFormat::Onnx.artifact_path(Path::new("./weights/yolo11x.pt")),
            PathBuf::from("./weights/yolo11x.onnx")
        );
    }

    #[test]
    fn test_parse_export_format() {
        assert_eq!("onnx".parse::<ExportFormat>(), Ok(ExportFormat::Onnx));
        assert_eq!(" ONNX ".parse::<ExportFormat>(), Ok(ExportFormat::Onnx));
        assert!("coreml".parse::<ExportFormat>().is_err());
        // TorchScript archives cannot be reloaded for inference
        assert!("torchscript".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_model_format_from_path() {
        assert_eq!(ModelFormat::from_path(Path::new("a/b.pt")), Some(ModelFormat::PyTorch));
        assert_eq!(ModelFormat::from_path(Path::new("b.ONNX")), Some(ModelFormat::Onnx));
        assert_eq!(ModelFormat::from_path(Path::new("b.tflite")), None);
        assert_eq!(ModelFormat::from_path(Path::new("noext")), None);
    }
}
