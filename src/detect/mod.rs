//! Detectors and their raw results.
//!
//! Every detector takes a [`Frame`] and answers with a [`DetectorReport`]
//! of raw detections in the detector's own localization encoding. Nothing
//! here knows about viewports, classification or deduplication; that is
//! the pipeline's job.

pub mod barcode;
pub mod vision;

pub use barcode::{
    BarcodeDecoder, BarcodeDetector, BarcodeResult, RawLocalization, RawPoint, SidecarDecoder,
};
pub use vision::{parse_annotate_response, VisionDetector, VisionOptions};

use futures::future::BoxFuture;
use serde::Serialize;

use crate::capture::Frame;
use crate::error::DetectorError;
use crate::geometry::Localization;

/// What a raw detection is.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionKind {
    /// A decoded barcode; `format` is the decoder's symbology tag.
    Barcode { format: String },
    /// A localized object class.
    Object,
    /// A recognized word or phrase.
    Text,
}

/// One detector result, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    /// Barcode payload, object class name, or recognized text.
    pub value: String,
    pub kind: DetectionKind,
    /// `None` when the detector reported no location at all.
    pub localization: Option<Localization>,
    pub confidence: Option<f32>,
}

impl RawDetection {
    pub fn barcode(
        value: impl Into<String>,
        format: impl Into<String>,
        localization: Option<Localization>,
    ) -> Self {
        Self {
            value: value.into(),
            kind: DetectionKind::Barcode {
                format: format.into(),
            },
            localization,
            confidence: None,
        }
    }

    pub fn object(value: impl Into<String>, score: f32, localization: Localization) -> Self {
        Self {
            value: value.into(),
            kind: DetectionKind::Object,
            localization: Some(localization),
            confidence: Some(score),
        }
    }

    pub fn text(value: impl Into<String>, localization: Localization) -> Self {
        Self {
            value: value.into(),
            kind: DetectionKind::Text,
            localization: Some(localization),
            confidence: None,
        }
    }
}

/// Everything one detector produced for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectorReport {
    pub detections: Vec<RawDetection>,
    /// Recognized text fragments in reading order.
    pub text_fragments: Vec<String>,
    /// The detector's full recognized text block, if it produced one.
    pub full_text: Option<String>,
}

impl DetectorReport {
    pub fn from_detections(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.text_fragments.is_empty()
    }
}

/// A source of detections.
///
/// Implementations may fail freely; the pipeline isolates each call and
/// substitutes an empty report.
pub trait Detector: Send + Sync {
    /// Short name used in logs and notifications.
    fn name(&self) -> &str;

    /// Whether a successful report counts as a text reading, even one
    /// that found no text.
    fn reads_text(&self) -> bool {
        false
    }

    fn detect<'a>(&'a self, frame: &'a Frame)
        -> BoxFuture<'a, Result<DetectorReport, DetectorError>>;
}
