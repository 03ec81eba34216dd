//! Image download, validation and cover-art encoding.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader};
use std::collections::HashMap;
use thiserror::Error;

/// Allowed formats for downloaded generation results.
pub const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Maximum download size for a generated image (10MB).
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Maximum bounding dimension for stored cover images.
pub const COVER_MAX_DIMENSION: u32 = 512;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to fetch image: {0}")]
    FetchFailed(String),

    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported or undetectable image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),
}

/// Trait for fetching raw bytes over HTTP, enabling mockability in tests.
#[async_trait]
pub trait HttpFetcher: Send + Sync + std::fmt::Debug {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// Production fetcher backed by reqwest.
#[derive(Debug, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::FetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::FetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::FetchFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Mock fetcher for testing.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<Vec<u8>, String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), Ok(bytes));
        self
    }

    pub fn with_error(mut self, url: &str, error: &str) -> Self {
        self.responses.insert(url.to_string(), Err(error.to_string()));
        self
    }
}

#[async_trait]
impl HttpFetcher for MockFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        match self.responses.get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(e)) => Err(ImageError::FetchFailed(e.clone())),
            None => Err(ImageError::FetchFailed(format!(
                "No mock response for URL: {}",
                url
            ))),
        }
    }
}

/// Validate raw bytes: size ceiling plus allowed, detectable format.
pub fn validate_image(data: &[u8]) -> Result<ImageFormat, ImageError> {
    if data.len() > MAX_FILE_SIZE {
        return Err(ImageError::TooLarge {
            size: data.len(),
            max: MAX_FILE_SIZE,
        });
    }

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let format = reader.format().ok_or(ImageError::UnsupportedFormat)?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(ImageError::UnsupportedFormat);
    }
    Ok(format)
}

/// Re-encode a downloaded image as a cover: validate, decode, shrink to fit
/// within `max_dimension` preserving aspect ratio, encode as JPEG at the
/// given quality.
pub fn encode_cover(data: &[u8], max_dimension: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    validate_image(data)?;

    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?
        .decode()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    // thumbnail() preserves aspect ratio and never upscales.
    let resized = img.thumbnail(max_dimension, max_dimension);

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    resized
        .write_with_encoder(encoder)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;

    Ok(buf)
}
