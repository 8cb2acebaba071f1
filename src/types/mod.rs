//! Type definitions for the detection round trip

pub mod detection;
pub mod report;
pub mod source;

pub use detection::{BoundingBox, Detection, InferenceResult, SpeedStats};
pub use report::RunReport;
pub use source::ImageSource;
