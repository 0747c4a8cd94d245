//! Scanner configuration.
//!
//! Loaded from a TOML file; every section and field is optional and falls
//! back to its default. Command-line flags are merged on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureConstraints;
use crate::detect::VisionOptions;
use crate::error::ScanfuseError;
use crate::geometry::Dimensions;
use crate::pipeline::PipelineSettings;
use crate::reference::DEFAULT_CONFIRMED_TOKEN;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanfuseConfig {
    pub pipeline: PipelineConfig,
    pub capture: CaptureConstraints,
    pub display: DisplayConfig,
    pub vision: VisionConfig,
    pub barcode: BarcodeConfig,
    pub store: StoreConfig,
    pub verification: VerificationConfig,
    pub logging: LoggingConfig,
}

/// Loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay after a processed frame, in milliseconds.
    pub frame_delay_ms: u64,

    /// Delay after a skipped tick, in milliseconds.
    pub idle_delay_ms: u64,

    /// JPEG quality used when a frame is sent to the vision service.
    pub jpeg_quality: u8,

    /// Stop after this many capture attempts, failed ones included.
    pub max_frames: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_delay_ms: 30,
            idle_delay_ms: 16,
            jpeg_quality: 80,
            max_frames: None,
        }
    }
}

/// Displayed viewport size. Unset means boxes are drawn at source size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl DisplayConfig {
    pub fn dimensions(&self) -> Option<Dimensions> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(Dimensions::new(w as f64, h as f64)),
            _ => None,
        }
    }
}

/// Remote vision-annotation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    pub endpoint: String,

    /// API key; the detector is skipped when empty.
    pub api_key: Option<String>,

    /// Minimum object score.
    pub object_threshold: f32,
    pub max_results: u32,

    /// Draw boxes around recognized words.
    pub text_regions: bool,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        let options = VisionOptions::default();
        Self {
            enabled: true,
            endpoint: options.endpoint,
            api_key: None,
            object_threshold: options.object_threshold,
            max_results: options.max_results,
            text_regions: options.text_regions,
            timeout_secs: options.timeout.as_secs(),
        }
    }
}

/// Local barcode decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeConfig {
    pub enabled: bool,

    /// Symbology tags to keep; empty keeps all.
    pub formats: Vec<String>,
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            formats: Vec::new(),
        }
    }
}

/// Reference/reporting store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Web script URL; store features are disabled when unset.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 20,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Text and reference verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Phrase announced when it appears in the recognized text.
    pub phrase: String,

    /// Reference flag value that confirms an entry.
    pub confirmed_token: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            phrase: "paracetamol 500mg".to_string(),
            confirmed_token: DEFAULT_CONFIRMED_TOKEN.to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub display: Option<Dimensions>,
    pub api_key: Option<String>,
    pub store_url: Option<String>,
    pub log_level: Option<String>,
    pub max_frames: Option<u64>,
}

impl ScanfuseConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ScanfuseError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ScanfuseError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content).map_err(|source| ScanfuseError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ScanfuseError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn merge_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(display) = overrides.display {
            self.display.width = Some(display.width as u32);
            self.display.height = Some(display.height as u32);
        }
        if let Some(ref key) = overrides.api_key {
            self.vision.api_key = Some(key.clone());
        }
        if let Some(ref url) = overrides.store_url {
            self.store.url = Some(url.clone());
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
        if overrides.max_frames.is_some() {
            self.pipeline.max_frames = overrides.max_frames;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ScanfuseError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!("invalid log level: {}", self.logging.level)));
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(invalid(format!("invalid log format: {}", self.logging.format)));
        }

        if !(1..=100).contains(&self.pipeline.jpeg_quality) {
            return Err(invalid(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.pipeline.jpeg_quality
            )));
        }

        if !(0.0..=1.0).contains(&self.vision.object_threshold) {
            return Err(invalid(format!(
                "object_threshold must be between 0 and 1, got {}",
                self.vision.object_threshold
            )));
        }

        if self.display.width == Some(0) || self.display.height == Some(0) {
            return Err(invalid("display dimensions must be non-zero".to_string()));
        }
        if self.display.width.is_some() != self.display.height.is_some() {
            return Err(invalid(
                "display width and height must be set together".to_string(),
            ));
        }

        if self.vision.enabled && self.vision.endpoint.trim().is_empty() {
            return Err(invalid("vision endpoint is empty".to_string()));
        }

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            frame_delay: Duration::from_millis(self.pipeline.frame_delay_ms),
            idle_delay: Duration::from_millis(self.pipeline.idle_delay_ms),
            max_frames: self.pipeline.max_frames,
            display: self.display.dimensions(),
            constraints: self.capture.clone(),
            verification_phrase: self.verification.phrase.clone(),
        }
    }

    /// Vision detector options, or `None` when the detector is disabled or
    /// has no key.
    pub fn vision_options(&self) -> Option<VisionOptions> {
        if !self.vision.enabled {
            return None;
        }
        let api_key = self.vision.api_key.as_deref()?.trim();
        if api_key.is_empty() {
            return None;
        }
        Some(VisionOptions {
            endpoint: self.vision.endpoint.clone(),
            api_key: api_key.to_string(),
            object_threshold: self.vision.object_threshold,
            max_results: self.vision.max_results,
            text_regions: self.vision.text_regions,
            jpeg_quality: self.pipeline.jpeg_quality,
            timeout: Duration::from_secs(self.vision.timeout_secs),
        })
    }

    /// Renders the configuration as TOML with the API key masked.
    pub fn to_toml_redacted(&self) -> Result<String, ScanfuseError> {
        let mut shown = self.clone();
        if shown.vision.api_key.is_some() {
            shown.vision.api_key = Some("<redacted>".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

fn invalid(message: String) -> ScanfuseError {
    ScanfuseError::InvalidConfig(message)
}
