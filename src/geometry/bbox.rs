//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};

use super::coord::Coord;

/// An axis-aligned bounding box stored as (xmin, ymin, xmax, ymax).
///
/// The `TSpace` parameter records which coordinate space the box is in.
/// Detectors report in [`Pixel`](super::Pixel) space and overlays are
/// drawn in [`Viewport`](super::Viewport) space; the only way between the
/// two is the [`ViewportMapper`](super::ViewportMapper).
///
/// Serialized as `{min_x, min_y, width, height}`, the shape the overlay
/// renderer consumes.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    pub min: Coord<TSpace>,
    pub max: Coord<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    #[inline]
    pub fn new(min: Coord<TSpace>, max: Coord<TSpace>) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            min: Coord::new(xmin, ymin),
            max: Coord::new(xmax, ymax),
        }
    }

    /// Builds a box from its top-left corner and size.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_xyxy(x, y, x + width, y + height)
    }

    /// Returns the tightest box enclosing every point, or `None` for an
    /// empty slice.
    pub fn enclosing(points: &[Coord<TSpace>]) -> Option<Self> {
        let first = points.first()?;
        let mut xmin = first.x;
        let mut ymin = first.y;
        let mut xmax = first.x;
        let mut ymax = first.y;
        for p in &points[1..] {
            xmin = xmin.min(p.x);
            ymin = ymin.min(p.y);
            xmax = xmax.max(p.x);
            ymax = ymax.max(p.y);
        }
        Some(Self::from_xyxy(xmin, ymin, xmax, ymax))
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.min.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.min.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.max.x
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.max.y
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Returns true when both sides are strictly positive.
    ///
    /// Degenerate boxes (a line or a point) are never drawn.
    #[inline]
    pub fn has_area(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }

    /// Returns (x, y, width, height).
    #[inline]
    pub fn to_xywh(&self) -> (f64, f64, f64, f64) {
        (self.xmin(), self.ymin(), self.width(), self.height())
    }

    /// Scales both corners per axis into another coordinate space.
    #[inline]
    pub fn scale_into<TOther>(&self, sx: f64, sy: f64) -> BBoxXYXY<TOther> {
        BBoxXYXY::new(self.min.scale_into(sx, sy), self.max.scale_into(sx, sy))
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBox")
            .field("min_x", &self.min.x)
            .field("min_y", &self.min.y)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl<TSpace> Default for BBoxXYXY<TSpace> {
    fn default() -> Self {
        Self::from_xyxy(0.0, 0.0, 0.0, 0.0)
    }
}

impl<TSpace> Serialize for BBoxXYXY<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BBox", 4)?;
        state.serialize_field("min_x", &self.min.x)?;
        state.serialize_field("min_y", &self.min.y)?;
        state.serialize_field("width", &self.width())?;
        state.serialize_field("height", &self.height())?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for BBoxXYXY<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct BBoxData {
            min_x: f64,
            min_y: f64,
            width: f64,
            height: f64,
        }
        let data = BBoxData::deserialize(deserializer)?;
        Ok(BBoxXYXY::from_xywh(
            data.min_x,
            data.min_y,
            data.width,
            data.height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Pixel, Viewport};

    #[test]
    fn test_bbox_from_xywh() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xywh(10.0, 20.0, 90.0, 60.0);
        assert_eq!(bbox.xmax(), 100.0);
        assert_eq!(bbox.ymax(), 80.0);
        assert_eq!(bbox.width() * bbox.height(), 5400.0);
    }

    #[test]
    fn test_enclosing_is_tight() {
        let points: Vec<Coord<Pixel>> = vec![
            Coord::new(12.0, 3.0),
            Coord::new(40.0, 9.0),
            Coord::new(38.0, 30.0),
            Coord::new(10.0, 25.0),
        ];
        let bbox = BBoxXYXY::enclosing(&points).unwrap();
        assert_eq!(bbox.to_xywh(), (10.0, 3.0, 30.0, 27.0));
    }

    #[test]
    fn test_enclosing_empty_is_none() {
        assert!(BBoxXYXY::<Pixel>::enclosing(&[]).is_none());
    }

    #[test]
    fn test_has_area_rejects_degenerate_boxes() {
        assert!(BBoxXYXY::<Pixel>::from_xyxy(0.0, 0.0, 1.0, 1.0).has_area());
        assert!(!BBoxXYXY::<Pixel>::from_xyxy(5.0, 0.0, 5.0, 10.0).has_area());
        assert!(!BBoxXYXY::<Pixel>::from_xyxy(0.0, 7.0, 10.0, 7.0).has_area());
    }

    #[test]
    fn test_serializes_as_origin_and_size() {
        let bbox: BBoxXYXY<Viewport> = BBoxXYXY::from_xyxy(4.0, 6.0, 24.0, 16.0);
        let json = serde_json::to_value(bbox).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"min_x": 4.0, "min_y": 6.0, "width": 20.0, "height": 10.0})
        );
        let back: BBoxXYXY<Viewport> = serde_json::from_value(json).unwrap();
        assert_eq!(back, bbox);
    }
}
