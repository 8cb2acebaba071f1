//! Error taxonomy for the load / export / reload / infer sequence

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the inference runner and its framework.
///
/// None of these are recovered from: the first one aborts the run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Weights or exported artifact missing, corrupt or of an unsupported format
    #[error("failed to load model from {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    /// Unsupported target format, exporter failure or unwritable artifact
    #[error("failed to export model to {}: {reason}", .path.display())]
    Export { path: PathBuf, reason: String },

    /// Image source unreachable or unreadable
    #[error("failed to fetch image from {source_desc}: {reason}")]
    Fetch { source_desc: String, reason: String },

    /// Model handle cannot run inference or the image is undecodable
    #[error("inference failed: {0}")]
    Inference(String),
}

impl RunnerError {
    pub fn load(path: &Path, reason: impl ToString) -> Self {
        RunnerError::Load {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn export(path: &Path, reason: impl ToString) -> Self {
        RunnerError::Export {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(source_desc: impl Into<String>, reason: impl ToString) -> Self {
        RunnerError::Fetch {
            source_desc: source_desc.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(reason: impl ToString) -> Self {
        RunnerError::Inference(reason.to_string())
    }

    /// Short name of the failing step, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RunnerError::Load { .. } => "load",
            RunnerError::Export { .. } => "export",
            RunnerError::Fetch { .. } => "fetch",
            RunnerError::Inference(_) => "inference",
        }
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;
