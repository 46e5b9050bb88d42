use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::state::ImageAnalysis;
use crate::error::MalformedEventError;

/// Status discriminator values with a dedicated meaning
pub const STATUS_PROGRESS: &str = "progress";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_COMPLETED: &str = "completed";

/// One decoded record of a file's response stream
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Progress { percent: Option<u8> },
    /// Any other status value. Handled as an intermediate progress update.
    Unrecognized { status: String, percent: Option<u8> },
    Error { message: String },
    Completed(CompletedEvent),
}

impl StatusEvent {
    /// `Some(percent)` for intermediate updates, `None` for terminal records
    pub fn progress(&self) -> Option<Option<u8>> {
        match self {
            Self::Progress { percent } | Self::Unrecognized { percent, .. } => Some(*percent),
            Self::Error { .. } | Self::Completed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletedEvent {
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    /// Kept raw; the encoder validates that `data` is a byte array
    #[serde(default)]
    pub compressed_image: Option<Value>,
    #[serde(default)]
    pub image_analysis: Option<ImageAnalysis>,
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// Parses one text record into a [`StatusEvent`]
pub fn parse_record(record: &str) -> Result<StatusEvent, MalformedEventError> {
    let malformed = |source| MalformedEventError {
        record: record.to_string(),
        source,
    };

    let Envelope { status, fields } = serde_json::from_str(record).map_err(malformed)?;

    let event = match status.as_str() {
        STATUS_COMPLETED => {
            let completed = serde_json::from_value(Value::Object(fields)).map_err(malformed)?;
            StatusEvent::Completed(completed)
        }
        STATUS_ERROR => StatusEvent::Error {
            message: error_message(&fields),
        },
        STATUS_PROGRESS => StatusEvent::Progress {
            percent: progress_percent(&fields),
        },
        _ => StatusEvent::Unrecognized {
            percent: progress_percent(&fields),
            status,
        },
    };
    Ok(event)
}

fn progress_percent(fields: &Map<String, Value>) -> Option<u8> {
    fields
        .get("progress")
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 100.0).round() as u8)
}

// FastAPI reports failures under `detail`
fn error_message(fields: &Map<String, Value>) -> String {
    fields
        .get("message")
        .or_else(|| fields.get("detail"))
        .and_then(Value::as_str)
        .unwrap_or("unknown service error")
        .to_string()
}

/// Notifications published to the presentation layer while a batch runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum BatchEvent {
    FileStarted {
        file_name: String,
        index: usize,
        total: usize,
    },
    Progress {
        file_name: String,
        percent: u8,
    },
    FileFailed {
        file_name: String,
        message: String,
    },
    FileCompleted {
        file_name: String,
        original_size: u64,
        compressed_size: u64,
        compression_ratio: f64,
    },
    BatchFinished {
        succeeded: usize,
        failed: usize,
    },
}
