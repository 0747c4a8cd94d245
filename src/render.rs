//! Overlay renderers.
//!
//! A renderer only ever sees whole frames: [`Renderer::replace`] swaps the
//! previous overlay for a new one, [`Renderer::clear`] empties it.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::pipeline::Annotation;

pub trait Renderer: Send {
    /// Replaces the entire overlay with `annotations`.
    fn replace(&mut self, frame_index: u64, annotations: &[Annotation]) -> io::Result<()>;

    fn clear(&mut self) -> io::Result<()>;
}

/// What a [`MemoryOverlay`] has been asked to show.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlaySnapshot {
    pub frame_index: Option<u64>,
    pub annotations: Vec<Annotation>,
    pub replaces: usize,
    pub clears: usize,
}

/// Keeps the current overlay in memory. Clones share the same overlay.
#[derive(Clone, Debug, Default)]
pub struct MemoryOverlay {
    inner: Arc<Mutex<OverlaySnapshot>>,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        match self.inner.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut OverlaySnapshot)) {
        match self.inner.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Renderer for MemoryOverlay {
    fn replace(&mut self, frame_index: u64, annotations: &[Annotation]) -> io::Result<()> {
        self.with_state(|state| {
            state.frame_index = Some(frame_index);
            state.annotations = annotations.to_vec();
            state.replaces += 1;
        });
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.with_state(|state| {
            state.annotations.clear();
            state.clears += 1;
        });
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OverlayEvent<'a> {
    Replace {
        frame: u64,
        annotations: &'a [Annotation],
    },
    Clear,
}

/// Writes every overlay change as one JSON line.
pub struct JsonLinesRenderer<W> {
    out: W,
}

impl<W: Write + Send> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_event(&mut self, event: &OverlayEvent<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, event).map_err(io::Error::other)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write + Send> Renderer for JsonLinesRenderer<W> {
    fn replace(&mut self, frame_index: u64, annotations: &[Annotation]) -> io::Result<()> {
        self.write_event(&OverlayEvent::Replace {
            frame: frame_index,
            annotations,
        })
    }

    fn clear(&mut self) -> io::Result<()> {
        self.write_event(&OverlayEvent::Clear)
    }
}

/// Renders nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn replace(&mut self, _frame_index: u64, _annotations: &[Annotation]) -> io::Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        Ok(())
    }
}
