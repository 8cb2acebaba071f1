//! Image fetching and decoding for inference sources

use crate::config::FetchConfig;
use crate::error::{Result, RunnerError};
use crate::types::source::ImageSource;
use image::DynamicImage;
use reqwest::blocking::Client;
use std::fs;
use std::time::Duration;
use tracing::{debug, info};

/// Resolves an [`ImageSource`] into a decoded image
pub struct ImageFetcher {
    client: Client,
}

impl ImageFetcher {
    /// Create a new fetcher from configuration
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        } else {
            builder = builder.timeout(None::<Duration>);
        }
        let client = builder
            .build()
            .map_err(|e| RunnerError::fetch("http client", e))?;
        Ok(Self { client })
    }

    /// Read the raw encoded bytes behind a source
    pub fn fetch_bytes(&self, source: &ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Url(url) => self.fetch_url(url),
            ImageSource::Path(path) => {
                let bytes = fs::read(path).map_err(|e| RunnerError::fetch(source.describe(), e))?;
                debug!(path = %path.display(), bytes = bytes.len(), "Read image from disk");
                Ok(bytes)
            }
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    /// Fetch and decode a source
    pub fn fetch(&self, source: &ImageSource) -> Result<DynamicImage> {
        let bytes = self.fetch_bytes(source)?;
        decode_image(&bytes, &source.describe())
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        info!(url = %url, "Fetching remote image");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| RunnerError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RunnerError::fetch(url, format!("HTTP status {}", status)));
        }

        let bytes = response.bytes().map_err(|e| RunnerError::fetch(url, e))?;
        debug!(url = %url, bytes = bytes.len(), "Remote image downloaded");
        Ok(bytes.to_vec())
    }
}

/// Decode encoded image bytes; undecodable data is an inference error
pub fn decode_image(bytes: &[u8], description: &str) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| RunnerError::inference(format!("cannot decode image {}: {}", description, e)))
}
