use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use super::state::SelectedFile;
use crate::constants::{FILE_FIELD, QUALITY_FIELD};
use crate::error::UploadError;
use crate::settings::Settings;

/// Raw response body of one upload, chunked however the network delivered it
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, UploadError>> + Send>>;

/// Sends one file to the compression service and hands back its response body.
///
/// A non-success status or a failed handshake is an error here; failures while
/// reading the body surface as error items of the returned stream.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn upload(&self, file: &SelectedFile, quality: u8) -> Result<ChunkStream, UploadError>;
}

/// `multipart/form-data` POST to the compression endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, UploadError> {
        Self::new(
            settings.endpoint.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn upload(&self, file: &SelectedFile, quality: u8) -> Result<ChunkStream, UploadError> {
        let bytes = file.read_bytes().await.map_err(|source| UploadError::Io {
            path: file
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| file.name().to_string()),
            source,
        })?;
        let length = bytes.len() as u64;

        let part = Part::stream_with_length(bytes, length)
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())?;
        let form = Form::new()
            .part(FILE_FIELD, part)
            .text(QUALITY_FIELD, quality.to_string());

        debug!(file = file.name(), endpoint = %self.endpoint, "Posting upload");
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(UploadError::from));
        Ok(Box::pin(chunks))
    }
}
