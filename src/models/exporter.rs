//! Model export to interchange formats
//!
//! Native checkpoints are handed to an external exporter process; graphs
//! already in the target format are copied to the derived artifact path.

use crate::config::ExportConfig;
use crate::error::{Result, RunnerError};
use crate::models::format::{ExportFormat, ModelFormat};
use crate::models::loader::ModelHandle;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Lines of exporter stderr kept in error messages
const STDERR_TAIL_LINES: usize = 5;

/// Exports model handles to interchange artifacts
#[derive(Debug, Clone)]
pub struct ModelExporter {
    /// Exporter program for native weights
    program: String,
    /// Argument templates
    args: Vec<String>,
    imgsz: u32,
}

impl ModelExporter {
    pub fn new(program: impl Into<String>, args: Vec<String>, imgsz: u32) -> Self {
        Self {
            program: program.into(),
            args,
            imgsz,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.imgsz)
    }

    /// Export a loaded handle; returns the artifact path
    pub fn export(&self, handle: &ModelHandle, format: ExportFormat) -> Result<PathBuf> {
        self.export_file(handle.path(), handle.format(), format)
    }

    /// Export the model stored at `source` (in `source_format`) to `format`
    pub fn export_file(
        &self,
        source: &Path,
        source_format: ModelFormat,
        format: ExportFormat,
    ) -> Result<PathBuf> {
        let target = format.artifact_path(source);

        info!(
            source = %source.display(),
            target = %target.display(),
            format = %format,
            "Exporting model"
        );

        if source_format == format.model_format() {
            if target != source {
                fs::copy(source, &target).map_err(|e| RunnerError::export(&target, e))?;
            }
        } else if source_format == ModelFormat::PyTorch {
            remove_stale(&target)?;
            self.run_exporter(source, format, &target)?;
        } else {
            return Err(RunnerError::export(
                &target,
                format!("cannot convert a {:?} model to {}", source_format, format),
            ));
        }

        let size_bytes = verify_artifact(&target)?;
        info!(artifact = %target.display(), size_bytes, "Export complete");
        Ok(target)
    }

    /// Substitute `{weights}`, `{format}`, `{imgsz}` and `{output}` in the argument templates
    pub fn render_args(&self, source: &Path, format: ExportFormat, target: &Path) -> Vec<String> {
        let weights = source.display().to_string();
        let output = target.display().to_string();
        let imgsz = self.imgsz.to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{weights}", &weights)
                    .replace("{format}", format.as_str())
                    .replace("{imgsz}", &imgsz)
                    .replace("{output}", &output)
            })
            .collect()
    }

    fn run_exporter(&self, source: &Path, format: ExportFormat, target: &Path) -> Result<()> {
        let args = self.render_args(source, format, target);
        debug!(program = %self.program, args = ?args, "Running exporter");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| {
                RunnerError::export(target, format!("failed to launch exporter '{}': {}", self.program, e))
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(exporter = %self.program, "{}", line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(exporter = %self.program, stream = "stderr", "{}", line);
        }

        if !output.status.success() {
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(RunnerError::export(
                target,
                format!("exporter '{}' exited with {}: {}", self.program, output.status, tail),
            ));
        }

        Ok(())
    }
}

impl Default for ModelExporter {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// Remove an artifact left over from an earlier run so it cannot be mistaken for fresh output
fn remove_stale(target: &Path) -> Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {
            warn!(artifact = %target.display(), "Overwriting existing artifact");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RunnerError::export(target, format!("cannot replace existing file: {}", e))),
    }
}

/// The artifact must exist and be non-empty before it can be reloaded
fn verify_artifact(target: &Path) -> Result<u64> {
    let meta = fs::metadata(target)
        .map_err(|e| RunnerError::export(target, format!("exporter did not produce the artifact: {}", e)))?;
    if meta.len() == 0 {
        return Err(RunnerError::export(target, "artifact is empty"));
    }
    Ok(meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_exporter(script: &str) -> ModelExporter {
        ModelExporter::new("sh", vec!["-c".to_string(), script.to_string()], 640)
    }

    fn write_weights(dir: &Path) -> PathBuf {
        let weights = dir.join("model.pt");
        fs::write(&weights, b"PK\x03\x04weights").unwrap();
        weights
    }

    #[test]
    fn test_render_args() {
        let exporter = ModelExporter::default();
        let args = exporter.render_args(
            Path::new("w/yolo11x.pt"),
            ExportFormat::Onnx,
            Path::new("w/yolo11x.onnx"),
        );
        assert_eq!(
            args,
            vec!["export", "model=w/yolo11x.pt", "format=onnx", "imgsz=640"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_native_export_writes_derived_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let weights = write_weights(dir.path());

        let artifact = shell_exporter("printf graph > '{output}'")
            .export_file(&weights, ModelFormat::PyTorch, ExportFormat::Onnx)
            .unwrap();

        assert_eq!(artifact, dir.path().join("model.onnx"));
        assert_eq!(fs::read(&artifact).unwrap(), b"graph");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_exporter_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let weights = write_weights(dir.path());

        let err = shell_exporter("echo 'unsupported opset' >&2; exit 3")
            .export_file(&weights, ModelFormat::PyTorch, ExportFormat::Onnx)
            .unwrap_err();

        assert!(matches!(err, RunnerError::Export { .. }));
        assert!(err.to_string().contains("unsupported opset"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_artifact_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let weights = write_weights(dir.path());
        fs::write(dir.path().join("model.onnx"), b"old graph").unwrap();

        // Exporter succeeds without writing anything
        let err = shell_exporter("true")
            .export_file(&weights, ModelFormat::PyTorch, ExportFormat::Onnx)
            .unwrap_err();

        assert!(err.to_string().contains("did not produce"));
        assert!(!dir.path().join("model.onnx").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_artifact_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let weights = write_weights(dir.path());

        let err = shell_exporter(": > '{output}'")
            .export_file(&weights, ModelFormat::PyTorch, ExportFormat::Onnx)
            .unwrap_err();
        assert!(err.to_string().contains("artifact is empty"));
    }

    #[test]
    fn test_missing_exporter_program() {
        let dir = tempfile::tempdir().unwrap();
        let weights = write_weights(dir.path());

        let err = ModelExporter::new("definitely-not-an-exporter-binary", Vec::new(), 640)
            .export_file(&weights, ModelFormat::PyTorch, ExportFormat::Onnx)
            .unwrap_err();
        assert!(err.to_string().contains("failed to launch exporter"));
    }

    #[test]
    fn test_interchange_source_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("model.onnx");
        fs::write(&graph, b"graph bytes").unwrap();

        // Same format, same path: nothing to do
        let artifact = ModelExporter::default()
            .export_file(&graph, ModelFormat::Onnx, ExportFormat::Onnx)
            .unwrap();
        assert_eq!(artifact, graph);
        assert_eq!(fs::read(&artifact).unwrap(), b"graph bytes");
    }

    #[test]
    fn test_torchscript_source_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("model.torchscript");
        fs::write(&archive, b"PK\x03\x04archive").unwrap();

        let err = ModelExporter::default()
            .export_file(&archive, ModelFormat::TorchScript, ExportFormat::Onnx)
            .unwrap_err();
        assert!(matches!(err, RunnerError::Export { .. }));
    }
}
