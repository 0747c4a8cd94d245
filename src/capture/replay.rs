//! Replays a directory of still images as a camera feed.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{CaptureConstraints, CaptureProvider, CaptureStream, FeedState, Frame};
use crate::error::CaptureError;
use crate::geometry::Dimensions;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// A capture provider backed by image files, sorted by path.
#[derive(Clone, Debug)]
pub struct DirectoryCapture {
    root: PathBuf,
    looping: bool,
}

impl DirectoryCapture {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            looping: false,
        }
    }

    /// Restart from the first frame after the last one instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Lists the frame files the feed would replay.
    pub fn frame_paths(&self) -> Result<Vec<PathBuf>, CaptureError> {
        if !self.root.is_dir() {
            return Err(CaptureError::NoDevice);
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_frame_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CaptureProvider for DirectoryCapture {
    fn acquire<'a>(
        &'a self,
        constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureStream>, CaptureError>> {
        async move {
            let paths = self.frame_paths()?;
            if paths.is_empty() {
                return Err(CaptureError::NoDevice);
            }
            info!(
                root = %self.root.display(),
                frames = paths.len(),
                facing = ?constraints.facing,
                "replay feed acquired"
            );
            Ok(Box::new(DirectoryStream::new(paths, self.looping)) as Box<dyn CaptureStream>)
        }
        .boxed()
    }
}

/// The stream handed out by [`DirectoryCapture`].
#[derive(Debug)]
pub struct DirectoryStream {
    paths: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    dimensions: Dimensions,
    released: bool,
}

impl DirectoryStream {
    fn new(paths: Vec<PathBuf>, looping: bool) -> Self {
        Self {
            paths,
            cursor: 0,
            looping,
            dimensions: Dimensions::default(),
            released: false,
        }
    }
}

impl CaptureStream for DirectoryStream {
    fn wait_ready(&mut self) -> BoxFuture<'_, Result<(), CaptureError>> {
        async move {
            let first = self.paths.first().ok_or(CaptureError::NoDevice)?;
            let (w, h) = image::image_dimensions(first)
                .map_err(|e| CaptureError::Fault(format!("{}: {e}", first.display())))?;
            self.dimensions = Dimensions::new(w as f64, h as f64);
            Ok(())
        }
        .boxed()
    }

    fn state(&self) -> FeedState {
        if self.released || (!self.looping && self.cursor >= self.paths.len()) {
            FeedState::Ended
        } else if self.dimensions.is_empty() {
            FeedState::Warming
        } else {
            FeedState::Ready
        }
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if self.paths.is_empty() {
            return Err(CaptureError::NoDevice);
        }
        let index = self.cursor;
        // An unreadable file still consumes its slot.
        self.cursor += 1;
        let path = &self.paths[index % self.paths.len()];
        let image = image::open(path)
            .map_err(|e| CaptureError::Fault(format!("{}: {e}", path.display())))?
            .to_rgb8();
        debug!(frame = index, path = %path.display(), "frame grabbed");
        self.dimensions = Dimensions::new(image.width() as f64, image.height() as f64);
        Ok(Frame::new(index as u64, image).with_origin(path.clone()))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
