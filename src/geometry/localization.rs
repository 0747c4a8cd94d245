//! Detector localization encodings and their reduction to a single box.
//!
//! The two detectors describe where something is in unrelated ways. The
//! barcode decoder reports corner points in source pixels, either as a
//! point list or as eight named scalars; the vision service reports
//! fractional vertices. Each encoding is one [`Localization`] variant with
//! its own extraction rule, so callers never probe for field presence.

use super::bbox::BBoxXYXY;
use super::coord::Coord;
use super::space::{Normalized, Pixel, Viewport};
use super::viewport::Dimensions;
use crate::error::GeometryError;

/// Number of vertices every encoding must provide.
pub const QUAD_VERTICES: usize = 4;

/// Four corners given as named scalars (x1, y1) .. (x4, y4).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerScalars {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub x3: f64,
    pub y3: f64,
    pub x4: f64,
    pub y4: f64,
}

impl CornerScalars {
    pub fn points(&self) -> [Coord<Pixel>; QUAD_VERTICES] {
        [
            Coord::new(self.x1, self.y1),
            Coord::new(self.x2, self.y2),
            Coord::new(self.x3, self.y3),
            Coord::new(self.x4, self.y4),
        ]
    }
}

/// Where a detection sits in the captured frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Localization {
    /// An explicit point list in source pixels. Must hold four points.
    Points(Vec<Coord<Pixel>>),
    /// Four named corner scalars in source pixels.
    Corners(CornerScalars),
    /// Fractional vertices, scaled by the displayed dimensions.
    NormalizedVertices(Vec<Coord<Normalized>>),
}

/// A box produced by the normalizer, tagged with the space it landed in.
///
/// Pixel encodings land in source space and still need viewport mapping.
/// Fractional vertices are multiplied by the displayed dimensions, so they
/// land directly in viewport space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Extent {
    Source(BBoxXYXY<Pixel>),
    Displayed(BBoxXYXY<Viewport>),
}

impl Extent {
    pub fn has_area(&self) -> bool {
        match self {
            Extent::Source(b) => b.has_area(),
            Extent::Displayed(b) => b.has_area(),
        }
    }
}

/// Reduces a localization to its tight axis-aligned bounding box.
///
/// Returns `Ok(None)` when the box has zero width or height: such boxes
/// are suppressed and never reach the viewport mapper. `displayed` is only
/// read for [`Localization::NormalizedVertices`].
///
/// # Errors
/// [`GeometryError::MalformedGeometry`] when a point list does not hold
/// exactly four vertices or a coordinate is not finite.
pub fn normalize(
    localization: &Localization,
    displayed: Dimensions,
) -> Result<Option<Extent>, GeometryError> {
    let extent = match localization {
        Localization::Points(points) => {
            check_vertex_count("point list", points.len())?;
            Extent::Source(tight_bound(points)?)
        }
        Localization::Corners(corners) => Extent::Source(tight_bound(&corners.points())?),
        Localization::NormalizedVertices(vertices) => {
            check_vertex_count("normalized vertices", vertices.len())?;
            let scaled: Vec<Coord<Viewport>> = vertices
                .iter()
                .map(|v| v.scale_into(displayed.width, displayed.height))
                .collect();
            Extent::Displayed(tight_bound(&scaled)?)
        }
    };

    if extent.has_area() {
        Ok(Some(extent))
    } else {
        Ok(None)
    }
}

fn check_vertex_count(what: &str, found: usize) -> Result<(), GeometryError> {
    if found == QUAD_VERTICES {
        Ok(())
    } else {
        Err(GeometryError::MalformedGeometry(format!(
            "{what} has {found} vertices, expected {QUAD_VERTICES}"
        )))
    }
}

fn tight_bound<TSpace>(points: &[Coord<TSpace>]) -> Result<BBoxXYXY<TSpace>, GeometryError> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(GeometryError::MalformedGeometry(
            "non-finite vertex coordinate".to_string(),
        ));
    }
    BBoxXYXY::enclosing(points)
        .ok_or_else(|| GeometryError::MalformedGeometry("no vertices".to_string()))
}
