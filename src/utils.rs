use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "ImageCompressor";

/// Returns the cross-platform directory for application data
pub fn get_app_data_dir() -> PathBuf {
    app_data_dir_from(std::env::consts::OS, |key| std::env::var(key).ok())
}

// Resolves the data dir for `os` using `var` for environment lookups
fn app_data_dir_from(os: &str, var: impl Fn(&str) -> Option<String>) -> PathBuf {
    let home = || PathBuf::from(var("HOME").unwrap_or_else(|| ".".to_string()));
    let base = match os {
        "macos" => home().join("Library").join("Application Support"),
        "windows" => var("APPDATA").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        _ => var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home().join(".local").join("share")),
    };
    base.join(APP_DIR_NAME)
}

/// Returns the path to the application configuration file
pub fn get_config_path() -> PathBuf {
    let mut config_dir = get_app_data_dir();
    config_dir.push("compressor.ini");
    config_dir
}

/// Simple MIME type detection based on file extension
pub fn get_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("heic") | Some("heif") => "image/heic",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Formats a byte count as kilobytes with two decimals, e.g. `"12.50 KB"`
pub fn format_size_kb(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}
