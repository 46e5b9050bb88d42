use thiserror::Error;

/// Rejections raised while building the pending batch, before any upload
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Maximum {limit} images can be selected ({current} already selected, {requested} more requested)")]
    LimitExceeded {
        limit: usize,
        current: usize,
        requested: usize,
    },

    #[error("Cannot select {path}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No file at index {index} (batch holds {len})")]
    NoSuchIndex { index: usize, len: usize },
}

/// The `compressed_image.data` payload could not be turned into base64
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("compressed image payload has no data field")]
    MissingData,

    #[error("compressed image data is not a byte array")]
    NotByteArray,

    #[error("compressed image data holds a non-byte value at index {index}")]
    InvalidByte { index: usize },
}

/// A stream record that is not a decodable status object
#[derive(Error, Debug)]
#[error("malformed status record: {source}")]
pub struct MalformedEventError {
    pub record: String,
    #[source]
    pub source: serde_json::Error,
}

/// Everything that can go wrong for one file of a batch. None of these stop
/// the remaining files from being processed.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16, body: String },

    #[error(transparent)]
    MalformedEvent(#[from] MalformedEventError),

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("{0}")]
    ServiceReported(String),

    #[error("cannot read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of an [`UploadError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    MalformedEvent,
    Encoding,
    ServiceReported,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::HttpStatus { .. } | Self::Io { .. } => ErrorKind::Transport,
            Self::MalformedEvent(_) => ErrorKind::MalformedEvent,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::ServiceReported(_) => ErrorKind::ServiceReported,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// An [`UploadError`] attributed to the file it happened for
#[derive(Error, Debug)]
#[error("{file_name}: {error}")]
pub struct FileError {
    pub file_name: String,
    #[source]
    pub error: UploadError,
}

impl FileError {
    pub fn new(file_name: impl Into<String>, error: UploadError) -> Self {
        Self {
            file_name: file_name.into(),
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
