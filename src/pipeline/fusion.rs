//! Per-frame merge of detector reports into overlay annotations.

use serde::Serialize;
use tracing::{debug, warn};

use crate::detect::{DetectionKind, RawDetection};
use crate::error::DetectorError;
use crate::geometry::{normalize, ViewportBox, ViewportMapper};
use crate::notify::Severity;
use crate::reference::{is_non_reported, Classification, ReferenceTable};
use crate::session::{ColorAssignment, SessionState};

/// Box color for a barcode that is confirmed, or cleared by verification.
pub const CONFIRMED_COLOR: &str = "limegreen";
/// Box color for any other barcode.
pub const FLAGGED_COLOR: &str = "red";
/// Box color for recognized text regions.
pub const TEXT_COLOR: &str = "gold";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Barcode,
    Object,
    Text,
}

/// One overlay box, in viewport pixels.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub value: String,
    pub bbox: ViewportBox,
    /// Only barcodes are classified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Set when the last verification listed this identifier.
    pub flagged_non_reported: bool,
    pub color: String,
}

/// First sighting of an identifier within the session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sighting {
    pub identifier: String,
    pub format: String,
    pub classification: Classification,
}

impl Sighting {
    pub fn message(&self) -> String {
        format!("Barcode: {} ({})", self.identifier, self.format)
    }

    pub fn severity(&self) -> Severity {
        match self.classification {
            Classification::Confirmed => Severity::Success,
            Classification::KnownUnconfirmed => Severity::Caution,
            Classification::Unknown => Severity::Error,
        }
    }
}

/// Everything the pipeline produced for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameResult {
    pub frame_index: u64,
    /// The complete overlay for this frame, in detector order.
    pub annotations: Vec<Annotation>,
    pub sightings: Vec<Sighting>,
    /// Text recognized in this frame, empty when none was.
    pub text_fragments: Vec<String>,
    /// Full recognized text block of this frame.
    pub full_text: Option<String>,
    /// True when this frame read text and the session text held the
    /// verification phrase.
    pub phrase_verified: bool,
    #[serde(skip)]
    pub failures: Vec<(String, DetectorError)>,
}

/// Merges settled detector reports for one frame.
pub struct Fusion<'a> {
    mapper: ViewportMapper,
    reference: &'a ReferenceTable,
    colors: &'a mut ColorAssignment,
    session: &'a mut SessionState,
}

impl<'a> Fusion<'a> {
    pub fn new(
        mapper: ViewportMapper,
        reference: &'a ReferenceTable,
        colors: &'a mut ColorAssignment,
        session: &'a mut SessionState,
    ) -> Self {
        Self {
            mapper,
            reference,
            colors,
            session,
        }
    }

    /// Folds one detector's detections into `result`.
    ///
    /// A detection without any location is dropped before deduplication.
    /// One whose vertices are present but malformed is still counted and
    /// announced, it just draws nothing.
    pub fn absorb(&mut self, result: &mut FrameResult, detections: Vec<RawDetection>) {
        for detection in detections {
            if detection.localization.is_none() {
                debug!(value = %detection.value, "detection without location skipped");
                continue;
            }
            let classification = match &detection.kind {
                DetectionKind::Barcode { format } => {
                    let classification = self.reference.classify(&detection.value);
                    if self.session.observe(&detection.value) {
                        result.sightings.push(Sighting {
                            identifier: detection.value.clone(),
                            format: format.clone(),
                            classification,
                        });
                    }
                    Some(classification)
                }
                DetectionKind::Object | DetectionKind::Text => None,
            };
            if let Some(annotation) = self.annotate(detection, classification) {
                result.annotations.push(annotation);
            }
        }
    }

    fn annotate(
        &mut self,
        detection: RawDetection,
        classification: Option<Classification>,
    ) -> Option<Annotation> {
        let localization = detection.localization.as_ref()?;
        let extent = match normalize(localization, self.mapper.displayed()) {
            Ok(Some(extent)) => extent,
            Ok(None) => return None,
            Err(err) => {
                warn!(value = %detection.value, error = %err, "detection skipped");
                return None;
            }
        };
        let bbox = self.mapper.place(extent);

        let (kind, color) = match detection.kind {
            DetectionKind::Barcode { .. } => {
                let color = if classification == Some(Classification::Confirmed) {
                    CONFIRMED_COLOR
                } else {
                    FLAGGED_COLOR
                };
                (AnnotationKind::Barcode, color)
            }
            DetectionKind::Object => {
                (AnnotationKind::Object, self.colors.color_for(&detection.value))
            }
            DetectionKind::Text => (AnnotationKind::Text, TEXT_COLOR),
        };

        Some(Annotation {
            kind,
            value: detection.value,
            bbox,
            classification,
            flagged_non_reported: false,
            color: color.to_string(),
        })
    }
}

/// Recolors rendered barcode boxes after a verification.
///
/// Listed identifiers are flagged red; every other barcode box is shown
/// as cleared. Returns the number of flagged boxes.
pub fn apply_verification(annotations: &mut [Annotation], non_reported: &[String]) -> usize {
    let mut flagged = 0;
    for annotation in annotations
        .iter_mut()
        .filter(|a| a.kind == AnnotationKind::Barcode)
    {
        annotation.flagged_non_reported = is_non_reported(&annotation.value, non_reported);
        if annotation.flagged_non_reported {
            annotation.color = FLAGGED_COLOR.to_string();
            flagged += 1;
        } else {
            annotation.color = CONFIRMED_COLOR.to_string();
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Coord, Dimensions, Localization};
    use crate::reference::ReferenceEntry;

    fn square(x: f64, y: f64, side: f64) -> Localization {
        Localization::Points(vec![
            Coord::new(x, y),
            Coord::new(x + side, y),
            Coord::new(x + side, y + side),
            Coord::new(x, y + side),
        ])
    }

    fn table() -> ReferenceTable {
        ReferenceTable::new(vec![
            ReferenceEntry::new("A1").with_reported("YES"),
            ReferenceEntry::new("B2").with_reported("no"),
        ])
    }

    #[test]
    fn test_confirmed_barcode_is_scaled_and_colored() {
        let reference = table();
        let mut colors = ColorAssignment::new();
        let mut session = SessionState::new();
        let mapper = ViewportMapper::new(
            Dimensions::new(200.0, 200.0),
            Dimensions::new(100.0, 100.0),
        );
        let mut result = FrameResult::default();
        Fusion::new(mapper, &reference, &mut colors, &mut session).absorb(
            &mut result,
            vec![RawDetection::barcode("A1", "EAN_13", Some(square(0.0, 0.0, 10.0)))],
        );

        let annotation = &result.annotations[0];
        assert_eq!(annotation.classification, Some(Classification::Confirmed));
        assert_eq!(annotation.bbox.to_xywh(), (0.0, 0.0, 20.0, 20.0));
        assert_eq!(annotation.color, CONFIRMED_COLOR);
        assert_eq!(result.sightings[0].severity(), Severity::Success);
    }

    #[test]
    fn test_repeat_sighting_renders_without_announcing() {
        let reference = table();
        let mut colors = ColorAssignment::new();
        let mut session = SessionState::new();
        let mapper = ViewportMapper::identity(Dimensions::new(100.0, 100.0));

        for expected_sightings in [1, 0] {
            let mut result = FrameResult::default();
            Fusion::new(mapper, &reference, &mut colors, &mut session).absorb(
                &mut result,
                vec![RawDetection::barcode("B2", "QR_CODE", Some(square(5.0, 5.0, 5.0)))],
            );
            assert_eq!(result.annotations.len(), 1);
            assert_eq!(result.sightings.len(), expected_sightings);
        }
        assert_eq!(session.seen_identifiers(), &["B2"]);
    }

    #[test]
    fn test_unlocated_barcode_is_skipped_entirely() {
        let reference = table();
        let mut colors = ColorAssignment::new();
        let mut session = SessionState::new();
        let mapper = ViewportMapper::identity(Dimensions::new(100.0, 100.0));
        let mut result = FrameResult::default();
        Fusion::new(mapper, &reference, &mut colors, &mut session).absorb(
            &mut result,
            vec![
                RawDetection::barcode("NOLOC", "EAN_13", None),
                RawDetection::barcode("A1", "EAN_13", Some(square(0.0, 0.0, 10.0))),
            ],
        );
        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.sightings.len(), 1);
        assert_eq!(result.sightings[0].identifier, "A1");
        assert!(!session.has_seen("NOLOC"));
        assert_eq!(session.seen_identifiers(), &["A1"]);
    }

    #[test]
    fn test_malformed_and_degenerate_barcodes_are_announced_but_not_drawn() {
        let reference = table();
        let mut colors = ColorAssignment::new();
        let mut session = SessionState::new();
        let mapper = ViewportMapper::identity(Dimensions::new(100.0, 100.0));
        let mut result = FrameResult::default();
        Fusion::new(mapper, &reference, &mut colors, &mut session).absorb(
            &mut result,
            vec![
                RawDetection::barcode("A1", "EAN_13", Some(square(3.0, 3.0, 0.0))),
                RawDetection::barcode("C3", "EAN_13", Some(Localization::Points(vec![]))),
            ],
        );
        assert!(result.annotations.is_empty());
        assert_eq!(result.sightings.len(), 2);
        assert_eq!(result.sightings[0].severity(), Severity::Success);
        assert_eq!(result.sightings[1].severity(), Severity::Error);
    }

    #[test]
    fn test_objects_use_fractional_vertices_and_class_colors() {
        let reference = table();
        let mut colors = ColorAssignment::new();
        let mut session = SessionState::new();
        let mapper = ViewportMapper::new(
            Dimensions::new(400.0, 200.0),
            Dimensions::new(100.0, 100.0),
        );
        let vertices = Localization::NormalizedVertices(vec![
            Coord::new(0.25, 0.5),
            Coord::new(0.5, 0.5),
            Coord::new(0.5, 1.0),
            Coord::new(0.25, 1.0),
        ]);
        let mut result = FrameResult::default();
        Fusion::new(mapper, &reference, &mut colors, &mut session).absorb(
            &mut result,
            vec![RawDetection::object("Bottle", 0.9, vertices)],
        );
        let annotation = &result.annotations[0];
        assert_eq!(annotation.kind, AnnotationKind::Object);
        assert_eq!(annotation.classification, None);
        assert_eq!(annotation.bbox.to_xywh(), (100.0, 100.0, 100.0, 100.0));
        assert_eq!(annotation.color, colors.color_for("bottle"));
        assert!(session.seen_identifiers().is_empty());
    }

    #[test]
    fn test_verification_flags_prefix_matches_and_clears_others() {
        let reference = table();
        let mut colors = ColorAssignment::new();
        let mut session = SessionState::new();
        let mapper = ViewportMapper::identity(Dimensions::new(100.0, 100.0));
        let mut result = FrameResult::default();
        Fusion::new(mapper, &reference, &mut colors, &mut session).absorb(
            &mut result,
            vec![
                RawDetection::barcode("A1", "EAN_13", Some(square(0.0, 0.0, 10.0))),
                RawDetection::barcode("B2", "EAN_13", Some(square(20.0, 0.0, 10.0))),
            ],
        );

        let flagged = apply_verification(&mut result.annotations, &["A1 (Widget)".to_string()]);
        assert_eq!(flagged, 1);
        assert!(result.annotations[0].flagged_non_reported);
        assert_eq!(result.annotations[0].color, FLAGGED_COLOR);
        assert!(!result.annotations[1].flagged_non_reported);
        assert_eq!(result.annotations[1].color, CONFIRMED_COLOR);
    }
}
