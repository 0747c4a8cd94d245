//! The per-frame detection-fusion loop.
//!
//! A [`Scanner`] owns everything a scanning session touches: the capture
//! stream, the detectors, the reference table, session state and the
//! overlay. Each tick captures one frame, fans it out to every detector
//! concurrently, waits for all of them to settle and swaps the merged
//! overlay in as one unit.
//!
//! Cancellation is cooperative. A [`StopHandle`] raises a flag that is
//! checked at tick boundaries; a tick already in flight runs to the end of
//! its detector calls and its results are then dropped.

mod fusion;

pub use fusion::{
    apply_verification, Annotation, AnnotationKind, FrameResult, Fusion, Sighting,
    CONFIRMED_COLOR, FLAGGED_COLOR, TEXT_COLOR,
};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capture::{CaptureConstraints, CaptureProvider, FeedState, StreamGuard};
use crate::detect::Detector;
use crate::error::{CaptureError, ScanfuseError};
use crate::geometry::{Dimensions, ViewportMapper};
use crate::notify::{Notification, Notifier, Severity};
use crate::reference::{ReferenceStore, ReferenceTable, VerificationOutcome};
use crate::render::Renderer;
use crate::session::{ColorAssignment, SessionState};

/// Where the pipeline is within a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    AwaitingDetectors,
    Merging,
    /// Stopped, or failed to acquire the capture device.
    Aborted,
}

/// Timing and geometry knobs of the loop.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Delay after a processed frame.
    pub frame_delay: Duration,
    /// Delay after a tick skipped because the feed was not ready.
    pub idle_delay: Duration,
    /// Stop by itself after this many capture attempts.
    pub max_frames: Option<u64>,
    /// Displayed viewport size; `None` draws at source size.
    pub display: Option<Dimensions>,
    pub constraints: CaptureConstraints,
    /// Phrase whose appearance in the session text is announced.
    pub verification_phrase: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_delay: Duration::from_millis(30),
            idle_delay: Duration::from_millis(16),
            max_frames: None,
            display: None,
            constraints: CaptureConstraints::default(),
            verification_phrase: "paracetamol 500mg".to_string(),
        }
    }
}

/// What a single tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// A frame went through the whole pipeline.
    Processed(FrameResult),
    /// The feed was not ready; nothing was captured.
    NotReady,
    /// A stop arrived while detectors were running; their results were dropped.
    Discarded,
    /// No session is running.
    Inactive,
}

/// Requests a stop from outside the loop.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The scanning pipeline.
pub struct Scanner {
    provider: Arc<dyn CaptureProvider>,
    detectors: Vec<Arc<dyn Detector>>,
    reference: ReferenceTable,
    store: Option<Arc<dyn ReferenceStore>>,
    colors: ColorAssignment,
    session: SessionState,
    stream: StreamGuard,
    renderer: Box<dyn Renderer>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
    state: PipelineState,
    scanning: bool,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    overlay: Vec<Annotation>,
    overlay_frame: u64,
    frames_processed: u64,
    captures: u64,
    next_frame: u64,
}

impl Scanner {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        renderer: Box<dyn Renderer>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            provider,
            detectors: Vec::new(),
            reference: ReferenceTable::default(),
            store: None,
            colors: ColorAssignment::new(),
            session: SessionState::new(),
            stream: StreamGuard::default(),
            renderer,
            notifier,
            settings,
            state: PipelineState::Idle,
            scanning: false,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            overlay: Vec::new(),
            overlay_frame: 0,
            frames_processed: 0,
            captures: 0,
            next_frame: 0,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_reference(mut self, reference: ReferenceTable) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ReferenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn reference(&self) -> &ReferenceTable {
        &self.reference
    }

    /// The annotations currently on screen.
    pub fn overlay(&self) -> &[Annotation] {
        &self.overlay
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Capture attempts, failed ones included, are what `max_frames` counts.
    fn reached_frame_limit(&self) -> bool {
        self.settings
            .max_frames
            .is_some_and(|max| self.captures >= max)
    }

    /// Starts a session. Does nothing if one is already running.
    ///
    /// Clears the session state, releases any stream still held and
    /// acquires a fresh one.
    ///
    /// # Errors
    /// Returns the capture failure when the device cannot be acquired or
    /// never becomes ready. The pipeline is then [`PipelineState::Aborted`].
    pub async fn start(&mut self) -> Result<(), ScanfuseError> {
        if self.scanning {
            debug!("start ignored, already scanning");
            return Ok(());
        }
        self.stop_tx.send_replace(false);
        self.scanning = true;
        self.session.clear();
        self.overlay.clear();
        self.frames_processed = 0;
        self.captures = 0;
        self.notify(Notification::info("Scanning started..."));
        info!("scanning session started");

        self.stream.release();
        self.notify(Notification::info(
            "Requesting camera access... Please grant permissions.",
        ));
        let acquired = self.provider.acquire(&self.settings.constraints).await;
        let stream = match acquired {
            Ok(stream) => stream,
            Err(err) => return Err(self.abort(err)),
        };
        self.stream = StreamGuard::new(stream);

        let ready = match self.stream.stream_mut() {
            Some(stream) => stream.wait_ready().await,
            None => Err(CaptureError::NoDevice),
        };
        if let Err(err) = ready {
            return Err(self.abort(err));
        }

        self.state = PipelineState::Idle;
        self.notify(Notification::info("Camera ready."));
        Ok(())
    }

    fn abort(&mut self, err: CaptureError) -> ScanfuseError {
        warn!(error = %err, "capture acquisition failed");
        let message = match &err {
            CaptureError::PermissionDenied => {
                "Camera access denied. Grant permissions and try again.".to_string()
            }
            CaptureError::NoDevice => "No camera found.".to_string(),
            other => format!("Error accessing camera: {other}"),
        };
        self.notify(Notification::error(message));
        self.scanning = false;
        self.stream.release();
        self.state = PipelineState::Aborted;
        err.into()
    }

    /// Stops the session. Returns false when no session was running.
    ///
    /// Releases the capture stream and clears the overlay. The session
    /// state is kept so its identifiers can still be submitted or
    /// verified; the next [`Scanner::start`] clears it.
    pub fn stop(&mut self) -> bool {
        self.stop_tx.send_replace(true);
        if !self.scanning {
            return false;
        }
        self.scanning = false;
        self.stream.release();
        self.overlay.clear();
        if let Err(err) = self.renderer.clear() {
            warn!(error = %err, "overlay clear failed");
        }
        self.state = PipelineState::Aborted;
        self.notify(Notification::info("Scanning stopped."));
        info!(frames = self.frames_processed, "scanning session stopped");
        true
    }

    /// Runs one pipeline iteration.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.stop_requested() {
            self.stop();
            return TickOutcome::Inactive;
        }
        if !self.scanning {
            return TickOutcome::Inactive;
        }
        let Some(stream) = self.stream.stream_mut() else {
            return TickOutcome::Inactive;
        };

        let feed = stream.state();
        if feed != FeedState::Ready || stream.dimensions().is_empty() {
            debug!(?feed, "feed not ready, skipping tick");
            return TickOutcome::NotReady;
        }

        self.state = PipelineState::Capturing;
        self.captures += 1;
        let frame = match stream.grab() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "frame capture failed");
                self.notify(Notification::error(format!("Frame capture failed: {err}")));
                self.state = PipelineState::Idle;
                if self.reached_frame_limit() {
                    self.stop();
                }
                return TickOutcome::NotReady;
            }
        };
        let frame_index = self.next_frame;
        self.next_frame += 1;

        self.state = PipelineState::AwaitingDetectors;
        let settled = join_all(self.detectors.iter().map(|detector| {
            let frame = &frame;
            async move {
                let outcome = detector.detect(frame).await;
                (detector.name().to_string(), detector.reads_text(), outcome)
            }
        }))
        .await;
        debug!(frame = frame_index, detectors = settled.len(), "detectors settled");

        if self.stop_requested() {
            debug!(frame = frame_index, "stopped during flight, discarding results");
            self.stop();
            return TickOutcome::Discarded;
        }

        self.state = PipelineState::Merging;
        let source = frame.dimensions();
        let displayed = self.settings.display.unwrap_or(source);
        let mapper = ViewportMapper::new(displayed, source);

        let mut result = FrameResult {
            frame_index,
            ..Default::default()
        };
        let mut text_fragments = Vec::new();
        let mut text_read = false;
        {
            let mut fusion =
                Fusion::new(mapper, &self.reference, &mut self.colors, &mut self.session);
            for (name, reads_text, outcome) in settled {
                match outcome {
                    Ok(report) => {
                        text_read |= reads_text;
                        fusion.absorb(&mut result, report.detections);
                        text_fragments.extend(report.text_fragments);
                        if report.full_text.is_some() {
                            result.full_text = report.full_text;
                        }
                    }
                    Err(err) => {
                        warn!(detector = %name, error = %err, "detector failed");
                        result.failures.push((name, err));
                    }
                }
            }
        }
        result.text_fragments = text_fragments.clone();
        self.session.replace_text(text_fragments);
        // Every text reading rechecks the retained buffer, new text or not.
        result.phrase_verified =
            text_read && self.session.text_contains(&self.settings.verification_phrase);

        if let Err(err) = self.renderer.replace(frame_index, &result.annotations) {
            warn!(error = %err, "overlay replace failed");
        }
        self.overlay = result.annotations.clone();
        self.overlay_frame = frame_index;

        for (_, err) in &result.failures {
            self.notify(Notification::error(err.to_string()));
        }
        for sighting in &result.sightings {
            self.notify(Notification::new(sighting.message(), sighting.severity()));
        }
        if result.phrase_verified {
            self.notify(Notification::new(
                format!(
                    "VERIFIED (OCR Text): Found \"{}\"",
                    self.settings.verification_phrase
                ),
                Severity::Verified,
            ));
        }

        self.frames_processed += 1;
        self.state = PipelineState::Idle;
        debug!(
            frame = frame_index,
            annotations = result.annotations.len(),
            sightings = result.sightings.len(),
            "frame merged"
        );

        if self.reached_frame_limit() {
            self.stop();
        }
        TickOutcome::Processed(result)
    }

    /// Starts a session and ticks until it stops.
    ///
    /// Returns the number of frames processed.
    pub async fn run(&mut self) -> Result<u64, ScanfuseError> {
        self.start().await?;
        let mut stop_rx = self.stop_rx.clone();
        // The reset in `start` must not count as a stop notification.
        stop_rx.borrow_and_update();
        while self.scanning {
            let delay = match self.tick().await {
                TickOutcome::Processed(_) => self.settings.frame_delay,
                TickOutcome::NotReady => self.settings.idle_delay,
                TickOutcome::Discarded | TickOutcome::Inactive => break,
            };
            if !self.scanning {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => {}
            }
        }
        Ok(self.frames_processed)
    }

    /// Re-fetches the reference table from the store.
    ///
    /// A failed fetch leaves the table empty. Returns the new entry count.
    pub async fn refresh_reference(&mut self) -> usize {
        let Some(store) = self.store.clone() else {
            self.notify(Notification::warning(
                "Reference store URL not configured. Reference features disabled.",
            ));
            return self.reference.len();
        };
        match store.fetch_all().await {
            Ok(entries) => {
                self.reference.replace(entries);
                self.notify(Notification::info(format!(
                    "Reference data loaded successfully ({} items)",
                    self.reference.len()
                )));
            }
            Err(err) => {
                warn!(error = %err, "reference fetch failed");
                self.reference.replace(Vec::new());
                self.notify(Notification::error(format!(
                    "Error fetching reference data: {err}"
                )));
            }
        }
        self.reference.len()
    }

    /// Sends the session's identifiers to the store under `session_key`.
    ///
    /// Returns true when the store accepted them.
    pub async fn submit(&mut self, session_key: &str) -> bool {
        let session_key = session_key.trim();
        let identifiers = self.session.seen_identifiers().to_vec();
        if identifiers.is_empty() {
            self.notify(Notification::warning("No barcodes detected to send."));
            return false;
        }
        if session_key.is_empty() {
            self.notify(Notification::warning("Please enter a session key."));
            return false;
        }
        let Some(store) = self.store.clone() else {
            self.notify(Notification::error(
                "Reference store URL not configured for sending.",
            ));
            return false;
        };

        self.notify(Notification::info(format!(
            "Sending {} barcodes for session {session_key}...",
            identifiers.len()
        )));
        match store.submit_identifiers(session_key, &identifiers).await {
            Ok(()) => {
                self.notify(Notification::info(format!(
                    "Barcodes for session {session_key} sent."
                )));
                true
            }
            Err(err) => {
                warn!(error = %err, "submission failed");
                self.notify(Notification::error(format!("Error sending barcodes: {err}")));
                false
            }
        }
    }

    /// Asks the store which of the session's items are not reported and
    /// recolors the current overlay accordingly.
    pub async fn verify(&mut self, session_key: &str) -> Option<VerificationOutcome> {
        let session_key = session_key.trim();
        if session_key.is_empty() {
            self.notify(Notification::warning("Please enter a session key to verify."));
            return None;
        }
        let Some(store) = self.store.clone() else {
            self.notify(Notification::error(
                "Reference store URL not configured for verification.",
            ));
            return None;
        };

        self.notify(Notification::info(format!(
            "Verifying items for session {session_key}..."
        )));
        let outcome = match store.verify(session_key).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "verification failed");
                self.notify(Notification::error(format!("Error verifying items: {err}")));
                return None;
            }
        };

        if !outcome.message.is_empty() {
            self.notify(Notification::info(outcome.message.clone()));
        }
        if outcome.all_reported() {
            self.notify(Notification::success(
                "All scanned items for this session are reported or found.",
            ));
        } else {
            self.notify(Notification::warning(format!(
                "Non-Reported/Not Found: {}",
                outcome.non_reported.join(", ")
            )));
        }

        let flagged = apply_verification(&mut self.overlay, &outcome.non_reported);
        if !self.overlay.is_empty() {
            if let Err(err) = self.renderer.replace(self.overlay_frame, &self.overlay) {
                warn!(error = %err, "overlay replace failed");
            }
        }
        info!(flagged, "verification applied");
        self.session.set_last_verification(outcome.clone());
        Some(outcome)
    }
}
