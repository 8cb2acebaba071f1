//! Image source descriptions

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the image to run inference on comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote http(s) resource fetched with one GET
    Url(String),
    /// Local file
    Path(PathBuf),
    /// Encoded image already in memory
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, ImageSource::Url(_))
    }

    /// Description used in logs and error messages
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

impl FromStr for ImageSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(ImageSource::Url(trimmed.to_string()))
        } else {
            Ok(ImageSource::Path(PathBuf::from(trimmed)))
        }
    }
}

impl From<&str> for ImageSource {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(source) => source,
            Err(never) => match never {},
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
