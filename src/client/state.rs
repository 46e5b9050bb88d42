use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::constants::{MAX_BATCH_FILES, RESULT_FILE_PREFIX};
use crate::encoder;
use crate::error::{FileError, SelectionError};
use crate::utils::get_mime_type;

/// The service always answers with a JPEG rendition
pub const RESULT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq)]
enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A user-chosen image. Metadata is captured at selection time, the bytes are
/// only read when the file is uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    name: String,
    size: u64,
    mime_type: String,
    source: FileSource,
}

impl SelectedFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SelectionError> {
        let path = path.as_ref();
        let unreadable = |source| SelectionError::Unreadable {
            path: path.display().to_string(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(unreadable(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: get_mime_type(path).to_string(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            mime_type: mime_type.into(),
            source: FileSource::Memory(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(path) => Some(path),
            FileSource::Memory(_) => None,
        }
    }

    pub async fn read_bytes(&self) -> std::io::Result<Bytes> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await.map(Bytes::from),
            FileSource::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Files waiting to be submitted, capped at [`MAX_BATCH_FILES`]
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    files: Vec<SelectedFile>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds all files or none of them
    pub fn add_files(&mut self, files: Vec<SelectedFile>) -> Result<(), SelectionError> {
        if self.files.len() + files.len() > MAX_BATCH_FILES {
            return Err(SelectionError::LimitExceeded {
                limit: MAX_BATCH_FILES,
                current: self.files.len(),
                requested: files.len(),
            });
        }
        self.files.extend(files);
        Ok(())
    }

    pub fn add(&mut self, file: SelectedFile) -> Result<(), SelectionError> {
        self.add_files(vec![file])
    }

    pub fn remove(&mut self, index: usize) -> Result<SelectedFile, SelectionError> {
        if index >= self.files.len() {
            return Err(SelectionError::NoSuchIndex {
                index,
                len: self.files.len(),
            });
        }
        Ok(self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Image metadata reported by the service. Keys beyond the known ones are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub source_file: SelectedFile,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub compressed_image_base64: String,
    pub image_analysis: ImageAnalysis,
}

impl CompressionResult {
    /// Share of the original size removed, in percent
    pub fn space_saved_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size as f64 - self.compressed_size as f64) / self.original_size as f64 * 100.0
    }

    /// Compressed size as a fraction of the original (0.25 = a quarter of the size)
    pub fn size_fraction(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", RESULT_MIME_TYPE, self.compressed_image_base64)
    }

    pub fn decoded_image(&self) -> Result<Vec<u8>, base64::DecodeError> {
        encoder::decode(&self.compressed_image_base64)
    }

    pub fn download_name(&self) -> String {
        format!("{}{}", RESULT_FILE_PREFIX, self.source_file.name())
    }

    /// Writes the compressed image into `dir` as `compressed_<original name>`
    pub async fn save_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let bytes = self
            .decoded_image()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(self.download_name());
        tokio::fs::write(&target, bytes).await?;
        Ok(target)
    }
}

/// What one batch produced. Failed files only appear in `errors`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<CompressionResult>,
    pub errors: Vec<FileError>,
}

impl BatchOutcome {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn failed_files(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.errors.iter().map(|e| e.file_name.as_str()).collect();
        names.dedup();
        names
    }
}
