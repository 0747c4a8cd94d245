use std::path::PathBuf;
use thiserror::Error;

/// The main error type for scanfuse operations.
#[derive(Debug, Error)]
pub enum ScanfuseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse reference table from {path}: {source}")]
    ReferenceParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// A detector's localization payload could not be turned into a box.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),
}

/// Failures of the capture device provider.
///
/// Only these halt a scanning session: without a stream no frames can be
/// produced.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("camera access denied")]
    PermissionDenied,

    #[error("no camera found")]
    NoDevice,

    #[error("camera does not support the requested constraints: {0}")]
    UnsupportedConstraints(String),

    #[error("capture fault: {0}")]
    Fault(String),
}

/// Failures of a single detector invocation.
///
/// The pipeline never propagates these: each one becomes an empty result
/// for that detector plus one notification.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectorError {
    #[error("{detector} failed: {message}")]
    Failure { detector: String, message: String },

    #[error("Vision API HTTP Error ({status}): {message}")]
    ServiceHttp { status: u16, message: String },

    #[error("Vision API Data Error: {0}")]
    ServiceData(String),
}

impl DetectorError {
    pub fn failure(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            detector: detector.into(),
            message: message.into(),
        }
    }
}

/// Failures of the reference/reporting store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("reference store URL not configured")]
    NotConfigured,

    #[error("reference store unavailable: {0}")]
    Unavailable(String),

    #[error("request failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Rejected(String),

    #[error("unexpected store response: {0}")]
    Decode(String),
}
