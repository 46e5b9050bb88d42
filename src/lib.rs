//! Client for a remote image compression service.
//!
//! Files are uploaded one at a time; each response body is a newline-delimited
//! JSON status stream that is decoded incrementally into progress updates,
//! service errors and a final result carrying the compressed image.

pub mod client;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod insights;
pub mod settings;
pub mod utils;

pub use client::events::{BatchEvent, StatusEvent};
pub use client::progress::{ProgressSnapshot, ProgressTracker};
pub use client::state::{BatchOutcome, CompressionResult, ImageAnalysis, PendingBatch, SelectedFile};
pub use client::transport::{HttpTransport, Transport};
pub use client::Orchestrator;
pub use error::{ErrorKind, FileError, SelectionError, UploadError};
pub use settings::Settings;
