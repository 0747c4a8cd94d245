//! Coordinate space marker types.
//!
//! These are zero-sized types used as type parameters so that a box in
//! source-image pixels can never be handed to the renderer by mistake.

use std::fmt;

/// Marker for source-image pixel coordinates.
///
/// This is the space the barcode decoder reports in: (0, 0) is the
/// top-left corner of the captured frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker for fractional coordinates (0.0 to 1.0) relative to a
/// reference dimension.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

/// Marker for displayed-viewport pixel coordinates.
///
/// Overlay annotations live here. The viewport may have a different size
/// and aspect ratio than the captured frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewport {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Viewport {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
