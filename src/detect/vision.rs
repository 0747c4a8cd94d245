//! Remote vision-annotation detection.
//!
//! One `images:annotate` request per frame asks for object localization
//! and document text. Objects come back with fractional vertices; text
//! comes back either as a full document tree or as a flat annotation list.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ureq::Agent;

use super::{Detector, DetectorReport, RawDetection};
use crate::capture::Frame;
use crate::error::DetectorError;
use crate::geometry::{Coord, Localization, Normalized, Pixel, QUAD_VERTICES};

const UNKNOWN_ERROR: &str = "Unknown Vision API error";

/// Tunables for the vision detector.
#[derive(Clone, Debug, PartialEq)]
pub struct VisionOptions {
    pub endpoint: String,
    pub api_key: String,
    /// Objects scoring below this are dropped.
    pub object_threshold: f32,
    pub max_results: u32,
    /// Emit a text annotation per recognized word.
    pub text_regions: bool,
    pub jpeg_quality: u8,
    pub timeout: Duration,
}

impl Default for VisionOptions {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            api_key: String::new(),
            object_threshold: 0.30,
            max_results: 10,
            text_regions: false,
            jpeg_quality: 80,
            timeout: Duration::from_secs(15),
        }
    }
}

// ---- request ----

#[derive(Serialize)]
struct AnnotateBatchRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent<'a>,
    features: [Feature; 2],
}

#[derive(Serialize)]
struct ImageContent<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

fn request_body(image_base64: &str, max_results: u32) -> Result<String, serde_json::Error> {
    serde_json::to_string(&AnnotateBatchRequest {
        requests: [AnnotateImageRequest {
            image: ImageContent {
                content: image_base64,
            },
            features: [
                Feature {
                    kind: "OBJECT_LOCALIZATION",
                    max_results: Some(max_results),
                },
                Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                    max_results: None,
                },
            ],
        }],
    })
}

// ---- response ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateBatchResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    localized_object_annotations: Vec<LocalizedObject>,
    #[serde(default)]
    full_text_annotation: Option<TextDocument>,
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalizedObject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    bounding_poly: BoundingPoly,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
    #[serde(default)]
    normalized_vertices: Vec<Vertex>,
}

/// The service omits zero-valued fields, so both axes default.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

impl Vertex {
    fn into_coords<TSpace>(vertices: Vec<Vertex>) -> Vec<Coord<TSpace>> {
        vertices.into_iter().map(|v| Coord::new(v.x, v.y)).collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct TextDocument {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Default, Deserialize)]
struct Block {
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Default, Deserialize)]
struct Paragraph {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Word {
    #[serde(default)]
    symbols: Vec<Symbol>,
    #[serde(default)]
    bounding_box: Option<BoundingPoly>,
}

#[derive(Debug, Default, Deserialize)]
struct Symbol {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

impl Word {
    fn text(&self) -> String {
        self.symbols
            .iter()
            .map(|s| s.text.as_str())
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Parses a successful `images:annotate` body into a detector report.
///
/// # Errors
/// [`DetectorError::ServiceData`] when the body is not the expected JSON
/// or carries an error payload instead of a result.
pub fn parse_annotate_response(
    body: &str,
    options: &VisionOptions,
) -> Result<DetectorReport, DetectorError> {
    let batch: AnnotateBatchResponse = serde_json::from_str(body)
        .map_err(|e| DetectorError::ServiceData(format!("invalid response: {e}")))?;

    match batch.responses.into_iter().next() {
        Some(response) => match response.error {
            Some(status) => Err(DetectorError::ServiceData(status_message(status))),
            None => Ok(interpret(response, options)),
        },
        None => match batch.error {
            Some(status) => Err(DetectorError::ServiceData(status_message(status))),
            None => Ok(DetectorReport::default()),
        },
    }
}

/// Extracts the error message of a non-2xx body.
fn http_error_message(body: &str) -> String {
    serde_json::from_str::<AnnotateBatchResponse>(body)
        .ok()
        .and_then(|b| b.error)
        .map(status_message)
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

fn status_message(status: Status) -> String {
    if status.message.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        status.message
    }
}

fn interpret(response: AnnotateImageResponse, options: &VisionOptions) -> DetectorReport {
    let mut report = DetectorReport::default();

    for object in response.localized_object_annotations {
        if object.score < options.object_threshold {
            continue;
        }
        debug!(name = %object.name, score = object.score, "object localized");
        report.detections.push(RawDetection::object(
            object.name,
            object.score,
            Localization::NormalizedVertices(Vertex::into_coords(
                object.bounding_poly.normalized_vertices,
            )),
        ));
    }

    match response.full_text_annotation {
        Some(document) if !document.text.is_empty() => {
            let words = document
                .pages
                .into_iter()
                .flat_map(|p| p.blocks)
                .flat_map(|b| b.paragraphs)
                .flat_map(|p| p.words);
            for word in words {
                let text = word.text();
                if text.is_empty() {
                    continue;
                }
                if options.text_regions {
                    if let Some(poly) = word.bounding_box {
                        report.detections.push(text_detection(&text, poly));
                    }
                }
                report.text_fragments.push(text);
            }
            report.full_text = Some(document.text);
        }
        _ if !response.text_annotations.is_empty() => {
            report.full_text = Some(response.text_annotations[0].description.clone());
            // The first entry is the whole block; the rest are single words.
            for (i, annotation) in response.text_annotations.into_iter().enumerate() {
                let text = annotation.description.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                if options.text_regions && i > 0 {
                    if let Some(poly) = annotation.bounding_poly {
                        report.detections.push(text_detection(&text, poly));
                    }
                }
                report.text_fragments.push(text);
            }
        }
        _ => {}
    }

    report
}

fn text_detection(text: &str, poly: BoundingPoly) -> RawDetection {
    let pixel_box = poly.vertices.len() == QUAD_VERTICES || poly.normalized_vertices.is_empty();
    let localization = if pixel_box {
        Localization::Points(Vertex::into_coords::<Pixel>(poly.vertices))
    } else {
        Localization::NormalizedVertices(Vertex::into_coords::<Normalized>(
            poly.normalized_vertices,
        ))
    };
    RawDetection::text(text, localization)
}

/// Detector backed by the remote vision-annotation service.
#[derive(Clone)]
pub struct VisionDetector {
    agent: Agent,
    options: VisionOptions,
}

impl VisionDetector {
    pub fn new(options: VisionOptions) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(options.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: Agent::new_with_config(config),
            options,
        }
    }

    pub fn options(&self) -> &VisionOptions {
        &self.options
    }

    fn annotate_blocking(&self, body: String) -> Result<DetectorReport, DetectorError> {
        let mut response = self
            .agent
            .post(&self.options.endpoint)
            .query("key", &self.options.api_key)
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|e| DetectorError::failure("vision", e.to_string()))?;
        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| DetectorError::failure("vision", e.to_string()))?;
        if !status.is_success() {
            return Err(DetectorError::ServiceHttp {
                status: status.as_u16(),
                message: http_error_message(&text),
            });
        }
        parse_annotate_response(&text, &self.options)
    }
}

impl Detector for VisionDetector {
    fn name(&self) -> &str {
        "vision"
    }

    fn reads_text(&self) -> bool {
        true
    }

    fn detect<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<DetectorReport, DetectorError>> {
        async move {
            let jpeg = frame
                .encode_jpeg(self.options.jpeg_quality)
                .map_err(|e| DetectorError::failure("vision", format!("encode frame: {e}")))?;
            let body = request_body(&BASE64.encode(jpeg), self.options.max_results)
                .map_err(|e| DetectorError::failure("vision", e.to_string()))?;
            let detector = self.clone();
            tokio::task::spawn_blocking(move || detector.annotate_blocking(body))
                .await
                .map_err(|e| DetectorError::failure("vision", e.to_string()))?
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionKind;

    fn options() -> VisionOptions {
        VisionOptions::default()
    }

    #[test]
    fn test_request_shape() {
        let body: serde_json::Value =
            serde_json::from_str(&request_body("QUJD", 10).unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "requests": [{
                    "image": {"content": "QUJD"},
                    "features": [
                        {"type": "OBJECT_LOCALIZATION", "maxResults": 10},
                        {"type": "DOCUMENT_TEXT_DETECTION"}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_objects_below_threshold_are_dropped() {
        let body = r#"{"responses": [{"localizedObjectAnnotations": [
            {"name": "Bottle", "score": 0.91, "boundingPoly": {"normalizedVertices": [
                {"y": 0.1}, {"x": 0.4, "y": 0.1},
                {"x": 0.4, "y": 0.5}, {"y": 0.5}]}},
            {"name": "Box", "score": 0.12, "boundingPoly": {"normalizedVertices": []}}
        ]}]}"#;
        let report = parse_annotate_response(body, &options()).unwrap();
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].value, "Bottle");
        assert_eq!(report.detections[0].kind, DetectionKind::Object);
        let Some(Localization::NormalizedVertices(ref vertices)) = report.detections[0].localization
        else {
            panic!("expected normalized vertices");
        };
        assert_eq!(vertices.len(), 4);
        // Omitted axes are zero.
        assert_eq!((vertices[0].x, vertices[0].y), (0.0, 0.1));
        assert_eq!((vertices[3].x, vertices[3].y), (0.0, 0.5));
    }

    #[test]
    fn test_full_text_words_join_symbols() {
        let body = r#"{"responses": [{"fullTextAnnotation": {
            "text": "Paracetamol 500mg\n",
            "pages": [{"blocks": [{"paragraphs": [{"words": [
                {"symbols": [{"text": "Para"}, {"text": "cetamol"}]},
                {"symbols": [{"text": "500"}, {"text": "mg"}]}
            ]}]}]}]
        }, "textAnnotations": [{"description": "ignored"}]}]}"#;
        let report = parse_annotate_response(body, &options()).unwrap();
        assert_eq!(report.text_fragments, vec!["Paracetamol", "500mg"]);
        assert_eq!(report.full_text.as_deref(), Some("Paracetamol 500mg\n"));
        assert!(report.detections.is_empty());
    }

    #[test]
    fn test_flat_text_annotations_fallback() {
        let body = r#"{"responses": [{"textAnnotations": [
            {"description": "Lot 42\nExp 2027 "},
            {"description": " Lot"},
            {"description": "42"}
        ]}]}"#;
        let report = parse_annotate_response(body, &options()).unwrap();
        assert_eq!(report.text_fragments, vec!["Lot 42\nExp 2027", "Lot", "42"]);
    }

    #[test]
    fn test_text_regions_use_word_boxes() {
        let body = r#"{"responses": [{"fullTextAnnotation": {
            "text": "Lot",
            "pages": [{"blocks": [{"paragraphs": [{"words": [
                {"symbols": [{"text": "Lot"}], "boundingBox": {"vertices": [
                    {"x": 10, "y": 10}, {"x": 40, "y": 10},
                    {"x": 40, "y": 20}, {"x": 10, "y": 20}]}}
            ]}]}]}]
        }}]}"#;
        let opts = VisionOptions {
            text_regions: true,
            ..options()
        };
        let report = parse_annotate_response(body, &opts).unwrap();
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].kind, DetectionKind::Text);
        assert!(matches!(
            report.detections[0].localization,
            Some(Localization::Points(_))
        ));
    }

    #[test]
    fn test_error_payloads_are_service_data_errors() {
        let top = r#"{"error": {"code": 403, "message": "API key not valid"}}"#;
        assert_eq!(
            parse_annotate_response(top, &options()),
            Err(DetectorError::ServiceData("API key not valid".into()))
        );
        let inner = r#"{"responses": [{"error": {"message": "Bad image data."}}]}"#;
        assert_eq!(
            parse_annotate_response(inner, &options()),
            Err(DetectorError::ServiceData("Bad image data.".into()))
        );
    }

    #[test]
    fn test_garbage_is_service_data_error() {
        assert!(matches!(
            parse_annotate_response("<html>", &options()),
            Err(DetectorError::ServiceData(_))
        ));
    }

    #[test]
    fn test_http_error_message_fallback() {
        assert_eq!(
            http_error_message(r#"{"error": {"message": "quota exceeded"}}"#),
            "quota exceeded"
        );
        assert_eq!(http_error_message(""), UNKNOWN_ERROR);
    }

    #[test]
    fn test_empty_responses_mean_nothing_found() {
        let report = parse_annotate_response(r#"{"responses": [{}]}"#, &options()).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.full_text, None);
    }
}
