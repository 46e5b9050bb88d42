use image::ImageReader;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Cursor;
use tracing::debug;

use crate::client::state::CompressionResult;

/// Details shown next to a result card: what the original looks like locally,
/// merged with what the service reported about it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInsights {
    pub file_name: String,
    pub file_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<String>,
    pub color_mode: Option<String>,
    pub format: Option<String>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub space_saved_percent: f64,
    pub extra: Map<String, Value>,
}

impl ImageInsights {
    /// Reads the original's bytes to probe its dimensions, then merges
    pub async fn gather(result: &CompressionResult) -> Self {
        let dimensions = match result.source_file.read_bytes().await {
            Ok(bytes) => probe_dimensions(&bytes),
            Err(e) => {
                debug!(file = result.source_file.name(), error = %e, "Original no longer readable");
                None
            }
        };
        Self::from_parts(result, dimensions)
    }

    /// Values from the service's `image_analysis` take precedence over local ones
    pub fn from_parts(result: &CompressionResult, local_dimensions: Option<(u32, u32)>) -> Self {
        let analysis = &result.image_analysis;
        let width = analysis.width.or(local_dimensions.map(|(w, _)| w));
        let height = analysis.height.or(local_dimensions.map(|(_, h)| h));

        let aspect_ratio = match (width, height) {
            (Some(w), Some(h)) if h > 0 => Some(format!("{:.2}", w as f64 / h as f64)),
            _ => None,
        };

        let file_type = result.source_file.mime_type().to_string();
        let format = analysis.format.clone().or_else(|| format_label(&file_type));

        Self {
            file_name: result.source_file.name().to_string(),
            file_type,
            width,
            height,
            aspect_ratio,
            color_mode: analysis.color_mode.clone(),
            format,
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            space_saved_percent: result.space_saved_percent(),
            extra: analysis.extra.clone(),
        }
    }
}

/// Width and height from the image header, `None` for undecodable data
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

// "image/jpeg" -> "JPEG"
fn format_label(mime_type: &str) -> Option<String> {
    mime_type
        .split_once('/')
        .map(|(_, subtype)| subtype.to_uppercase())
        .filter(|s| !s.is_empty())
}
