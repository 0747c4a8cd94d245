//! Local barcode detection.
//!
//! The decoder itself is a collaborator behind [`BarcodeDecoder`]; this
//! module adapts its raw result shape into [`RawDetection`]s.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use tracing::debug;

use super::{DetectorReport, Detector, RawDetection};
use crate::capture::Frame;
use crate::error::DetectorError;
use crate::geometry::{Coord, CornerScalars, Localization, Pixel, QUAD_VERTICES};

/// One entry of a decoder point list. Either axis may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct RawPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl RawPoint {
    fn coord(self) -> Option<Coord<Pixel>> {
        Some(Coord::new(self.x?, self.y?))
    }
}

/// Location block of a decoder result.
///
/// Decoders fill either `points` or the eight `x1..y4` scalars, sometimes
/// both, sometimes only part of one.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawLocalization {
    #[serde(default)]
    pub points: Option<Vec<RawPoint>>,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub x3: Option<f64>,
    pub y3: Option<f64>,
    pub x4: Option<f64>,
    pub y4: Option<f64>,
}

impl RawLocalization {
    /// Picks the encoding to trust.
    ///
    /// A complete four-point list wins, then a complete set of corner
    /// scalars. Anything else is passed on with its incomplete points
    /// dropped, so the normalizer reports it as malformed.
    pub fn into_localization(self) -> Localization {
        let corners = self.corners();
        let points: Vec<Coord<Pixel>> = self
            .points
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawPoint::coord)
            .collect();
        match corners {
            _ if points.len() == QUAD_VERTICES => Localization::Points(points),
            Some(corners) => Localization::Corners(corners),
            None => Localization::Points(points),
        }
    }

    fn corners(&self) -> Option<CornerScalars> {
        Some(CornerScalars {
            x1: self.x1?,
            y1: self.y1?,
            x2: self.x2?,
            y2: self.y2?,
            x3: self.x3?,
            y3: self.y3?,
            x4: self.x4?,
            y4: self.y4?,
        })
    }
}

/// One decoder result, in the decoder's wire shape.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeResult {
    pub barcode_text: String,
    #[serde(default)]
    pub barcode_format_string: String,
    #[serde(default)]
    pub localization_result: Option<RawLocalization>,
}

impl From<BarcodeResult> for RawDetection {
    fn from(result: BarcodeResult) -> Self {
        RawDetection::barcode(
            result.barcode_text,
            result.barcode_format_string,
            result
                .localization_result
                .map(RawLocalization::into_localization),
        )
    }
}

/// A local barcode decoder.
///
/// Called several times a second; must not hold state between frames.
pub trait BarcodeDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Result<Vec<BarcodeResult>, DetectorError>;
}

/// Adapts a [`BarcodeDecoder`] into a pipeline [`Detector`].
pub struct BarcodeDetector<D> {
    decoder: D,
    formats: Vec<String>,
}

impl<D: BarcodeDecoder> BarcodeDetector<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            formats: Vec::new(),
        }
    }

    /// Keeps only results whose format tag matches one of `formats`
    /// (case-insensitive). An empty list keeps everything.
    pub fn with_formats(mut self, formats: Vec<String>) -> Self {
        self.formats = formats;
        self
    }

    fn accepts(&self, format: &str) -> bool {
        self.formats.is_empty() || self.formats.iter().any(|f| f.eq_ignore_ascii_case(format))
    }
}

impl<D: BarcodeDecoder> Detector for BarcodeDetector<D> {
    fn name(&self) -> &str {
        "barcode"
    }

    fn detect<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<DetectorReport, DetectorError>> {
        async move {
            let results = self.decoder.decode(frame)?;
            let detections: Vec<RawDetection> = results
                .into_iter()
                .filter(|r| self.accepts(&r.barcode_format_string))
                .map(RawDetection::from)
                .collect();
            debug!(frame = frame.index(), count = detections.len(), "barcodes decoded");
            Ok(DetectorReport::from_detections(detections))
        }
        .boxed()
    }
}

/// Reads decoder results recorded next to replayed frames.
///
/// For a frame replayed from `shelf_01.jpg` the results live in
/// `shelf_01.jpg.barcodes.json` as a JSON array of [`BarcodeResult`]. A
/// frame without a sidecar decodes to nothing.
#[derive(Clone, Debug, Default)]
pub struct SidecarDecoder;

impl SidecarDecoder {
    pub const SUFFIX: &'static str = ".barcodes.json";

    pub fn sidecar_path(frame: &Frame) -> Option<PathBuf> {
        let origin = frame.origin()?;
        let mut name = origin.file_name()?.to_os_string();
        name.push(Self::SUFFIX);
        Some(origin.with_file_name(name))
    }
}

impl BarcodeDecoder for SidecarDecoder {
    fn decode(&self, frame: &Frame) -> Result<Vec<BarcodeResult>, DetectorError> {
        let Some(path) = Self::sidecar_path(frame) else {
            return Ok(Vec::new());
        };
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .map_err(|e| DetectorError::failure("barcode", format!("{}: {e}", path.display())))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DetectorError::failure("barcode", format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeometryError;
    use crate::geometry::{normalize, Dimensions};
    use image::RgbImage;

    #[test]
    fn test_point_list_takes_precedence() {
        let raw: RawLocalization = serde_json::from_str(
            r#"{"points": [{"x":1,"y":1},{"x":5,"y":1},{"x":5,"y":4},{"x":1,"y":4}],
                "x1": 100, "y1": 100, "x2": 200, "y2": 100,
                "x3": 200, "y3": 200, "x4": 100, "y4": 200}"#,
        )
        .unwrap();
        assert!(matches!(raw.into_localization(), Localization::Points(_)));
    }

    #[test]
    fn test_corners_used_when_point_list_is_short() {
        let raw: RawLocalization = serde_json::from_str(
            r#"{"points": [{"x":1,"y":1}],
                "x1": 0, "y1": 0, "x2": 10, "y2": 0, "x3": 10, "y3": 10, "x4": 0, "y4": 10}"#,
        )
        .unwrap();
        assert!(matches!(raw.into_localization(), Localization::Corners(_)));
    }

    #[test]
    fn test_point_missing_an_axis_is_malformed() {
        let raw: RawLocalization = serde_json::from_str(
            r#"{"points": [{"x":0,"y":0},{"x":10,"y":0},{"x":10},{"x":0,"y":10}]}"#,
        )
        .unwrap();
        let loc = raw.into_localization();
        assert!(matches!(
            normalize(&loc, Dimensions::default()),
            Err(GeometryError::MalformedGeometry(_))
        ));
    }

    #[test]
    fn test_incomplete_points_fall_back_to_corners() {
        let raw: RawLocalization = serde_json::from_str(
            r#"{"points": [{"x":0,"y":0},{"x":10,"y":0},{"y":10},{"x":0,"y":10}],
                "x1": 0, "y1": 0, "x2": 10, "y2": 0, "x3": 10, "y3": 10, "x4": 0, "y4": 10}"#,
        )
        .unwrap();
        assert!(matches!(raw.into_localization(), Localization::Corners(_)));
    }

    #[test]
    fn test_partial_corners_fail_in_normalizer() {
        let raw: RawLocalization =
            serde_json::from_str(r#"{"x1": 0, "y1": 0, "x2": 10, "y2": 0}"#).unwrap();
        let loc = raw.into_localization();
        assert!(normalize(&loc, Dimensions::default()).is_err());
    }

    #[test]
    fn test_result_without_location_has_none() {
        let result: BarcodeResult =
            serde_json::from_str(r#"{"barcodeText": "A1", "barcodeFormatString": "EAN_13"}"#)
                .unwrap();
        let detection = RawDetection::from(result);
        assert_eq!(detection.value, "A1");
        assert!(detection.localization.is_none());
    }

    struct Fixed(Vec<BarcodeResult>);

    impl BarcodeDecoder for Fixed {
        fn decode(&self, _frame: &Frame) -> Result<Vec<BarcodeResult>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn result(text: &str, format: &str) -> BarcodeResult {
        BarcodeResult {
            barcode_text: text.to_string(),
            barcode_format_string: format.to_string(),
            localization_result: None,
        }
    }

    #[tokio::test]
    async fn test_format_filter() {
        let detector = BarcodeDetector::new(Fixed(vec![
            result("A1", "EAN_13"),
            result("B2", "QR_CODE"),
            result("C3", "DataMatrix"),
        ]))
        .with_formats(vec!["ean_13".into(), "DATAMATRIX".into()]);
        let frame = Frame::new(0, RgbImage::new(2, 2));
        let report = detector.detect(&frame).await.unwrap();
        let values: Vec<&str> = report.detections.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(values, vec!["A1", "C3"]);
    }

    #[test]
    fn test_sidecar_decoder_reads_adjacent_file() {
        let temp = tempfile::tempdir().unwrap();
        let frame_path = temp.path().join("shelf.png");
        std::fs::write(
            temp.path().join("shelf.png.barcodes.json"),
            r#"[{"barcodeText": "A1", "barcodeFormatString": "EAN_13"}]"#,
        )
        .unwrap();
        let frame = Frame::new(0, RgbImage::new(2, 2)).with_origin(&frame_path);
        let results = SidecarDecoder.decode(&frame).unwrap();
        assert_eq!(results.len(), 1);

        let bare = Frame::new(1, RgbImage::new(2, 2));
        assert!(SidecarDecoder.decode(&bare).unwrap().is_empty());
    }

    #[test]
    fn test_sidecar_decoder_reports_bad_json() {
        let temp = tempfile::tempdir().unwrap();
        let frame_path = temp.path().join("shelf.png");
        std::fs::write(temp.path().join("shelf.png.barcodes.json"), "not json").unwrap();
        let frame = Frame::new(0, RgbImage::new(2, 2)).with_origin(&frame_path);
        assert!(matches!(
            SidecarDecoder.decode(&frame),
            Err(DetectorError::Failure { .. })
        ));
    }
}
