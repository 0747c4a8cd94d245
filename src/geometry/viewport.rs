//! Source-image to displayed-viewport rescaling.

use serde::{Deserialize, Serialize};

use super::bbox::BBoxXYXY;
use super::localization::Extent;
use super::space::{Pixel, Viewport};

/// A width/height pair in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    #[inline]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when either side is zero (or negative).
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Per-axis scale factor from source pixels to displayed pixels.
///
/// Falls back to 1 when either side is zero or unknown.
#[inline]
pub fn axis_scale(displayed: f64, source: f64) -> f64 {
    if displayed > 0.0 && source > 0.0 {
        displayed / source
    } else {
        1.0
    }
}

/// Rescales source-pixel boxes into the displayed viewport.
///
/// X and Y are scaled independently. When the displayed and source aspect
/// ratios differ the boxes stretch with the video element's own
/// letterboxing; that is what lines them up with the picture on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportMapper {
    displayed: Dimensions,
    scale_x: f64,
    scale_y: f64,
}

impl ViewportMapper {
    pub fn new(displayed: Dimensions, source: Dimensions) -> Self {
        Self {
            displayed,
            scale_x: axis_scale(displayed.width, source.width),
            scale_y: axis_scale(displayed.height, source.height),
        }
    }

    /// A mapper whose displayed size equals the source size.
    pub fn identity(source: Dimensions) -> Self {
        Self::new(source, source)
    }

    #[inline]
    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    #[inline]
    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    #[inline]
    pub fn displayed(&self) -> Dimensions {
        self.displayed
    }

    pub fn map(&self, bbox: &BBoxXYXY<Pixel>) -> BBoxXYXY<Viewport> {
        bbox.scale_into(self.scale_x, self.scale_y)
    }

    /// Brings a normalizer result into viewport space.
    pub fn place(&self, extent: Extent) -> BBoxXYXY<Viewport> {
        match extent {
            Extent::Source(bbox) => self.map(&bbox),
            Extent::Displayed(bbox) => bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_source_width_means_unit_scale() {
        let mapper = ViewportMapper::new(
            Dimensions::new(640.0, 480.0),
            Dimensions::new(0.0, 240.0),
        );
        assert_eq!(mapper.scale_x(), 1.0);
        assert_eq!(mapper.scale_y(), 2.0);
    }

    #[test]
    fn test_unknown_displayed_size_means_unit_scale() {
        let mapper = ViewportMapper::new(Dimensions::default(), Dimensions::new(1280.0, 720.0));
        assert_eq!((mapper.scale_x(), mapper.scale_y()), (1.0, 1.0));
    }

    #[test]
    fn test_axes_scale_independently() {
        let mapper = ViewportMapper::new(
            Dimensions::new(200.0, 50.0),
            Dimensions::new(100.0, 100.0),
        );
        let mapped = mapper.map(&BBoxXYXY::from_xywh(10.0, 10.0, 20.0, 20.0));
        assert_eq!(mapped.to_xywh(), (20.0, 5.0, 40.0, 10.0));
    }

    #[test]
    fn test_displayed_extent_passes_through() {
        let mapper = ViewportMapper::new(
            Dimensions::new(200.0, 200.0),
            Dimensions::new(100.0, 100.0),
        );
        let bbox: BBoxXYXY<Viewport> = BBoxXYXY::from_xywh(1.0, 2.0, 3.0, 4.0);
        assert_eq!(mapper.place(Extent::Displayed(bbox)), bbox);
    }
}
