// Service configuration
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/compress";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// Batch limits
pub const MAX_BATCH_FILES: usize = 5;

// Quality factor, sent as the `quality_factor` form field
pub const DEFAULT_QUALITY: u8 = 10;
pub const QUALITY_MIN: u8 = 1;
pub const QUALITY_MAX: u8 = 50;

// Multipart form field names expected by the service
pub const FILE_FIELD: &str = "file";
pub const QUALITY_FIELD: &str = "quality_factor";

// Downloaded results are written as `compressed_<original name>`
pub const RESULT_FILE_PREFIX: &str = "compressed_";

// Capacity of the broadcast channel carrying batch events
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
