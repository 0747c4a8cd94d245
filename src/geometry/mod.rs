//! Geometry for detections and overlays.
//!
//! Detector results arrive in several localization encodings and in
//! source-image pixels; overlays are drawn in displayed-viewport pixels.
//! This module turns the former into the latter.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: Marker types keep source pixels, fractions and
//!    viewport pixels apart at compile time.
//!
//! 2. **One Rule Per Encoding**: Each localization encoding is a variant of
//!    [`Localization`] with its own extraction rule.
//!
//! 3. **Suppress, Don't Fail**: Degenerate boxes are dropped quietly; only
//!    missing or partial vertex data is an error.
//!
//! # Example
//!
//! ```
//! use scanfuse::geometry::{normalize, Coord, Dimensions, Localization, ViewportMapper};
//!
//! let loc = Localization::Points(vec![
//!     Coord::new(0.0, 0.0),
//!     Coord::new(10.0, 0.0),
//!     Coord::new(10.0, 10.0),
//!     Coord::new(0.0, 10.0),
//! ]);
//! let mapper = ViewportMapper::new(Dimensions::new(200.0, 200.0), Dimensions::new(100.0, 100.0));
//! let extent = normalize(&loc, mapper.displayed()).unwrap().unwrap();
//! assert_eq!(mapper.place(extent).to_xywh(), (0.0, 0.0, 20.0, 20.0));
//! ```

mod bbox;
mod coord;
mod localization;
mod space;
mod viewport;

pub use bbox::BBoxXYXY;
pub use coord::Coord;
pub use localization::{normalize, CornerScalars, Extent, Localization, QUAD_VERTICES};
pub use space::{Normalized, Pixel, Viewport};
pub use viewport::{axis_scale, Dimensions, ViewportMapper};

/// A box in source-image pixel space.
pub type SourceBox = BBoxXYXY<Pixel>;

/// A box in displayed-viewport pixel space.
pub type ViewportBox = BBoxXYXY<Viewport>;
