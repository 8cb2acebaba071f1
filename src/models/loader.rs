//! Model loader for native weights and ONNX artifacts

use crate::error::{Result, RunnerError};
use crate::models::format::ModelFormat;
use anyhow::Context;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Zip local-file header; PyTorch and TorchScript archives start with it
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
/// Pickle protocol opcode used by legacy (non-zip) PyTorch checkpoints
const PICKLE_PROTO: u8 = 0x80;
/// Largest class id accepted from a graph's `names` table
const MAX_CLASS_ID: usize = 10_000;

/// Metadata embedded in an exported detection graph
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    /// Class names indexed by class id
    pub names: Vec<String>,
    /// Network input size as (height, width)
    pub imgsz: (u32, u32),
    pub stride: Option<u32>,
    pub task: Option<String>,
    pub description: Option<String>,
}

impl ModelMetadata {
    pub fn with_imgsz(imgsz: u32) -> Self {
        Self {
            names: Vec::new(),
            imgsz: (imgsz, imgsz),
            stride: None,
            task: None,
            description: None,
        }
    }

    /// Label for a class id, `class_<id>` when the model carries no name for it
    pub fn label(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

/// Native weights file; exportable, not directly runnable
#[derive(Debug, Clone)]
pub struct NativeModel {
    pub name: String,
    pub path: PathBuf,
    pub format: ModelFormat,
}

/// Loaded ONNX model with metadata
pub struct OnnxModel {
    /// Model name (file stem)
    pub name: String,
    pub path: PathBuf,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for the detection head
    pub output_name: String,
    pub metadata: ModelMetadata,
}

/// In-memory model handle returned by [`ModelLoader::load`]
pub enum ModelHandle {
    Native(NativeModel),
    Onnx(OnnxModel),
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        match self {
            ModelHandle::Native(m) => &m.name,
            ModelHandle::Onnx(m) => &m.name,
        }
    }

    /// File the handle was loaded from
    pub fn path(&self) -> &Path {
        match self {
            ModelHandle::Native(m) => &m.path,
            ModelHandle::Onnx(m) => &m.path,
        }
    }

    pub fn format(&self) -> ModelFormat {
        match self {
            ModelHandle::Native(m) => m.format,
            ModelHandle::Onnx(_) => ModelFormat::Onnx,
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelHandle::Native(m) => f.debug_tuple("Native").field(m).finish(),
            ModelHandle::Onnx(m) => f
                .debug_struct("Onnx")
                .field("name", &m.name)
                .field("path", &m.path)
                .field("input_name", &m.input_name)
                .field("output_name", &m.output_name)
                .field("metadata", &m.metadata)
                .finish(),
        }
    }
}

/// Loader for model files
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
    /// Input size assumed when the graph carries no `imgsz` metadata
    default_imgsz: u32,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> anyhow::Result<Self> {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> anyhow::Result<Self> {
        ort::init()
            .commit()
            .context("Failed to initialize ONNX Runtime")?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self {
            onnx_threads,
            default_imgsz: 640,
        })
    }

    pub fn with_default_imgsz(mut self, imgsz: u32) -> Self {
        self.default_imgsz = imgsz;
        self
    }

    /// Load a model file, dispatching on its extension
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ModelHandle> {
        let path = path.as_ref();

        let meta = fs::metadata(path).map_err(|e| RunnerError::load(path, e))?;
        if !meta.is_file() {
            return Err(RunnerError::load(path, "not a regular file"));
        }
        if meta.len() == 0 {
            return Err(RunnerError::load(path, "file is empty"));
        }

        match ModelFormat::from_path(path) {
            Some(ModelFormat::Onnx) => self.load_onnx(path).map(ModelHandle::Onnx),
            Some(format) => load_native(path, format, meta.len()).map(ModelHandle::Native),
            None => Err(RunnerError::load(path, "unsupported model format")),
        }
    }

    /// Load a single ONNX model from file
    pub fn load_onnx(&self, path: &Path) -> Result<OnnxModel> {
        let name = model_name(path);

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = self
            .build_session(path)
            .map_err(|e| RunnerError::load(path, format!("{:#}", e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| RunnerError::load(path, "graph has no inputs"))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| RunnerError::load(path, "graph has no outputs"))?;

        let metadata = self.read_metadata(&session);

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            classes = metadata.names.len(),
            imgsz = ?metadata.imgsz,
            task = ?metadata.task,
            "Model loaded successfully"
        );

        Ok(OnnxModel {
            name,
            path: path.to_path_buf(),
            session,
            input_name,
            output_name,
            metadata,
        })
    }

    fn build_session(&self, path: &Path) -> anyhow::Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)?;
        Ok(session)
    }

    /// Read detection metadata from the graph's custom metadata map
    fn read_metadata(&self, session: &Session) -> ModelMetadata {
        let mut metadata = ModelMetadata::with_imgsz(self.default_imgsz);

        let model_meta = match session.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "Model metadata unavailable, using defaults");
                return metadata;
            }
        };
        let custom = |key: &str| model_meta.custom(key).ok().flatten();

        if let Some(names) = custom("names").as_deref().and_then(parse_names) {
            metadata.names = names;
        }
        if let Some(imgsz) = custom("imgsz").as_deref().and_then(parse_imgsz) {
            metadata.imgsz = imgsz;
        }
        metadata.stride = custom("stride").and_then(|s| s.trim().parse().ok());
        metadata.task = custom("task");
        metadata.description = custom("description");

        metadata
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self {
            onnx_threads: 1,
            default_imgsz: 640,
        }
    }
}

/// Validate a native weights file by its container signature
fn load_native(path: &Path, format: ModelFormat, size_bytes: u64) -> Result<NativeModel> {
    let mut header = [0u8; 4];
    let mut file = fs::File::open(path).map_err(|e| RunnerError::load(path, e))?;
    let read = file
        .read(&mut header)
        .map_err(|e| RunnerError::load(path, e))?;

    let recognized = (read == 4 && header == ZIP_MAGIC) || (read >= 1 && header[0] == PICKLE_PROTO);
    if !recognized {
        return Err(RunnerError::load(
            path,
            format!("not a recognized {:?} checkpoint", format),
        ));
    }

    let name = model_name(path);
    info!(model = %name, path = %path.display(), format = ?format, size_bytes, "Native weights loaded");

    Ok(NativeModel {
        name,
        path: path.to_path_buf(),
        format,
    })
}

fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

/// Parse a class-name table written as a dict literal: `{0: 'person', 1: 'bicycle'}`
pub fn parse_names(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut rest = body.trim_start();

    while !rest.is_empty() {
        let colon = rest.find(':')?;
        let key = rest[..colon].trim().trim_matches(|c| c == '\'' || c == '"');
        let id: usize = key.parse().ok()?;
        if id > MAX_CLASS_ID {
            return None;
        }

        let value = rest[colon + 1..].trim_start();
        let quote = value.chars().next()?;
        if quote != '\'' && quote != '"' {
            return None;
        }
        let end = value[1..].find(quote)? + 1;
        entries.push((id, value[1..end].to_string()));

        rest = value[end + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    let len = entries
        .iter()
        .filter_map(|(id, _)| id.checked_add(1))
        .max()
        .unwrap_or(0);
    let mut names: Vec<String> = (0..len).map(|i| format!("class_{}", i)).collect();
    for (id, name) in entries {
        if let Some(slot) = names.get_mut(id) {
            *slot = name;
        }
    }
    Some(names)
}

/// Parse `[640, 640]` or `640` into (height, width)
pub fn parse_imgsz(raw: &str) -> Option<(u32, u32)> {
    let body = raw.trim().trim_start_matches(['[', '(']).trim_end_matches([']', ')']);
    let dims: Vec<u32> = body
        .split(',')
        .map(|d| d.trim().parse().ok())
        .collect::<Option<_>>()?;
    match dims.as_slice() {
        [s] => Some((*s, *s)),
        [h, w] => Some((*h, *w)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn test_parse_names() {
        let names = parse_names("{0: 'person', 1: 'bicycle', 2: \"traffic light\"}").unwrap();
        assert_eq!(names, vec!["person", "bicycle", "traffic light"]);

        let sparse = parse_names("{0: 'a', 2: 'c'}").unwrap();
        assert_eq!(sparse, vec!["a", "class_1", "c"]);

        assert_eq!(parse_names("{}"), Some(Vec::new()));
        assert_eq!(parse_names("person, bicycle"), None);
    }

    #[test]
    fn test_parse_names_rejects_out_of_range_ids() {
        assert_eq!(parse_names("{18446744073709551615: 'x'}"), None);
        assert_eq!(parse_names("{0: 'a', 4000000000000: 'b'}"), None);
        assert_eq!(parse_names("{99999999999999999999999: 'x'}"), None);
        assert_eq!(parse_names("{10000: 'last'}").map(|n| n.len()), Some(10_001));
    }

    #[test]
    fn test_parse_imgsz() {
        assert_eq!(parse_imgsz("[640, 640]"), Some((640, 640)));
        assert_eq!(parse_imgsz("[384, 640]"), Some((384, 640)));
        assert_eq!(parse_imgsz("320"), Some((320, 320)));
        assert_eq!(parse_imgsz("[a, b]"), None);
    }

    #[test]
    fn test_metadata_label_fallback() {
        let mut metadata = ModelMetadata::with_imgsz(640);
        metadata.names = vec!["person".to_string()];
        assert_eq!(metadata.label(0), "person");
        assert_eq!(metadata.label(7), "class_7");
    }

    #[test]
    fn test_load_native_zip_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pt");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"PK\x03\x04rest-of-archive").unwrap();

        let handle = ModelLoader::default().load(&path).unwrap();
        assert_eq!(handle.name(), "model");
        assert_eq!(handle.format(), ModelFormat::PyTorch);
        assert_eq!(handle.path(), path.as_path());
    }

    #[test]
    fn test_load_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelLoader::default()
            .load(dir.path().join("missing.pt"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Load { .. }));
    }

    #[test]
    fn test_load_rejects_empty_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.pt");
        fs::File::create(&empty).unwrap();
        assert!(matches!(
            ModelLoader::default().load(&empty),
            Err(RunnerError::Load { .. })
        ));

        let corrupt = dir.path().join("corrupt.pt");
        fs::write(&corrupt, b"definitely not a checkpoint").unwrap();
        assert!(matches!(
            ModelLoader::default().load(&corrupt),
            Err(RunnerError::Load { .. })
        ));
    }

    #[test]
    fn test_load_corrupt_onnx_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        fs::write(&path, b"this is not a protobuf graph").unwrap();

        let err = ModelLoader::default().load(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Load { .. }));
        assert_eq!(err.kind(), "load");
    }

    #[test]
    fn test_load_onnx_reads_graph_metadata() {
        let handle = ModelLoader::default()
            .load(fixture("tiny_detect.onnx"))
            .unwrap();
        assert_eq!(handle.name(), "tiny_detect");
        assert_eq!(handle.format(), ModelFormat::Onnx);

        let ModelHandle::Onnx(model) = handle else {
            panic!("expected an ONNX handle");
        };
        assert_eq!(model.input_name, "images");
        assert_eq!(model.output_name, "output0");
        assert_eq!(model.metadata.names, vec!["person", "bus"]);
        assert_eq!(model.metadata.imgsz, (32, 32));
        assert_eq!(model.metadata.stride, Some(32));
        assert_eq!(model.metadata.task.as_deref(), Some("detect"));
    }

    #[test]
    fn test_load_onnx_without_metadata_uses_defaults() {
        let handle = ModelLoader::default()
            .with_default_imgsz(320)
            .load(fixture("tiny_detect_bare.onnx"))
            .unwrap();

        let ModelHandle::Onnx(model) = handle else {
            panic!("expected an ONNX handle");
        };
        assert!(model.metadata.names.is_empty());
        assert_eq!(model.metadata.imgsz, (320, 320));
        assert_eq!(model.metadata.stride, None);
        assert_eq!(model.metadata.label(1), "class_1");
    }

    #[test]
    fn test_runtime_init_is_not_a_step_error() {
        let loader: anyhow::Result<ModelLoader> = ModelLoader::with_threads(2);
        let handle = loader.unwrap().load(fixture("tiny_detect.onnx")).unwrap();
        assert_eq!(handle.format(), ModelFormat::Onnx);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.tflite");
        fs::write(&path, b"PK\x03\x04").unwrap();

        let err = ModelLoader::default().load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported model format"));
    }
}
