use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_ENDPOINT, DEFAULT_QUALITY, DEFAULT_REQUEST_TIMEOUT_SECS, QUALITY_MAX, QUALITY_MIN,
};
use crate::utils::get_config_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub endpoint: String,
    pub quality: u8,
    pub quality_min: u8,
    pub quality_max: u8,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub save_results: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            quality: DEFAULT_QUALITY,
            quality_min: QUALITY_MIN,
            quality_max: QUALITY_MAX,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            output_dir: None,
            save_results: false,
        }
    }
}

impl Settings {
    /// Loads settings from the per-user config file, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        Ok(Self::parse(&content))
    }

    /// Parses `key = value` lines. Unknown keys are ignored and values that
    /// fail to parse keep their default.
    pub fn parse(content: &str) -> Self {
        let mut settings = Settings::default();
        let mut config_map = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config_map.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
            }
        }

        if let Some(endpoint) = config_map.get("endpoint") {
            if !endpoint.is_empty() {
                settings.endpoint = endpoint.clone();
            }
        }
        if let Some(quality) = config_map.get("quality").and_then(|v| v.parse::<u8>().ok()) {
            settings.quality = quality;
        }
        if let Some(min) = config_map.get("quality_min").and_then(|v| v.parse::<u8>().ok()) {
            settings.quality_min = min;
        }
        if let Some(max) = config_map.get("quality_max").and_then(|v| v.parse::<u8>().ok()) {
            settings.quality_max = max;
        }
        if let Some(timeout) = config_map
            .get("request_timeout_secs")
            .and_then(|v| v.parse::<u64>().ok())
        {
            settings.request_timeout_secs = timeout;
        }
        if let Some(dir) = config_map.get("output_dir") {
            if !dir.is_empty() {
                settings.output_dir = Some(dir.clone());
            }
        }
        if let Some(save) = config_map.get("save_results").and_then(|v| v.parse::<bool>().ok()) {
            settings.save_results = save;
        }

        settings
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Creating config directory")?;
        }

        let mut content = String::new();
        content.push_str("# Image Compressor Configuration File\n");
        content.push_str(&format!("endpoint = \"{}\"\n", self.endpoint));
        content.push_str(&format!("quality = {}\n", self.quality));
        content.push_str(&format!("quality_min = {}\n", self.quality_min));
        content.push_str(&format!("quality_max = {}\n", self.quality_max));
        content.push_str(&format!("request_timeout_secs = {}\n", self.request_timeout_secs));
        if let Some(ref output_dir) = self.output_dir {
            content.push_str(&format!("output_dir = \"{}\"\n", output_dir));
        }
        content.push_str(&format!("save_results = {}\n", self.save_results));

        std::fs::write(config_path, content).context("Failed to write to config file")?;
        Ok(())
    }

    /// Rejects a quality factor outside the configured slider range
    pub fn validate_quality(&self, quality: u8) -> Result<u8> {
        if quality < self.quality_min || quality > self.quality_max {
            bail!(
                "Quality {} is outside the allowed range {}-{}",
                quality,
                self.quality_min,
                self.quality_max
            );
        }
        Ok(quality)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_dir.as_ref().map(PathBuf::from)
    }

    pub fn config_path() -> PathBuf {
        get_config_path()
    }
}
