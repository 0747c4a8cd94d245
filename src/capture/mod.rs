//! Camera capture abstraction.
//!
//! A [`CaptureProvider`] hands out at most one [`CaptureStream`] at a
//! time; the pipeline owns it through a [`StreamGuard`] so the device is
//! released on every exit path.

mod replay;

pub use replay::{DirectoryCapture, DirectoryStream};

use std::path::PathBuf;

use futures::future::BoxFuture;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CaptureError;
use crate::geometry::Dimensions;

/// Which camera to prefer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    #[default]
    Environment,
    User,
}

/// What the pipeline asks of the device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// Readiness of an acquired feed, checked before every capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    Ready,
    /// Metadata not available yet; dimensions are unknown.
    Warming,
    Paused,
    Ended,
}

/// One still image taken from the feed.
#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    image: RgbImage,
    origin: Option<PathBuf>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// File the frame was replayed from, if any.
    pub fn origin(&self) -> Option<&std::path::Path> {
        self.origin.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width() as f64, self.height() as f64)
    }

    /// Encodes the frame as JPEG at `quality` (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode_image(&self.image)?;
        Ok(buf)
    }
}

/// An acquired camera stream.
pub trait CaptureStream: Send {
    /// Suspends until the stream has metadata and is playing.
    fn wait_ready(&mut self) -> BoxFuture<'_, Result<(), CaptureError>>;

    fn state(&self) -> FeedState;

    /// Source dimensions, zero while warming up.
    fn dimensions(&self) -> Dimensions;

    /// Takes one still image.
    fn grab(&mut self) -> Result<Frame, CaptureError>;

    /// Stops the device. Must be safe to call more than once.
    fn release(&mut self);
}

/// Hands out camera streams.
pub trait CaptureProvider: Send + Sync {
    fn acquire<'a>(
        &'a self,
        constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureStream>, CaptureError>>;
}

/// Owns the session's single capture stream and releases it on drop.
#[derive(Default)]
pub struct StreamGuard {
    stream: Option<Box<dyn CaptureStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn stream_mut(&mut self) -> Option<&mut (dyn CaptureStream + 'static)> {
        self.stream.as_deref_mut()
    }

    /// Releases the held stream. Returns false when nothing was held.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.release();
                debug!("capture stream released");
                true
            }
            None => false,
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}
