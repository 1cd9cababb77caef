//! Capture-detect-render loop
//!
//! [`DetectionLoop`] owns the [`Session`] and drives one frame per tick:
//! read a frame, mirror it, run the detector, keep detections above the
//! display cutoff, draw them, hand the frame and the results listing to a
//! [`DisplaySurface`], then ask the [`Scheduler`] for the next tick.
//!
//! Ticks never overlap. `stop` takes effect at the start of the next tick.

pub mod scheduler;
pub mod session;

pub use scheduler::{FrameTimer, Scheduler};
pub use session::Session;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::camera::CameraProvider;
use crate::config::{DetectorSettings, DISPLAY_CUTOFF};
use crate::error::{CameraError, DetectionError, UnknownLabel};
use crate::frame::DisplayFrame;
use crate::ml::{Detection, Detector, LabelTable, RawDetection, UNKNOWN_LABEL};
use crate::overlay::{self, OverlayStyle};

/// Receives the output of every rendered tick
pub trait DisplaySurface {
    /// Annotated, mirrored frame
    fn show_frame(&mut self, frame: DisplayFrame);
    /// One line per displayed detection
    fn show_results(&mut self, lines: &[String]);
    /// Frames per second of the last tick
    fn show_fps(&mut self, fps: f32);
}

/// Detections of one frame that passed the display filter, in model order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionFrameResult {
    pub detections: Vec<Detection>,
}

impl DetectionFrameResult {
    /// Results panel lines, e.g. `Letter A: 0.91`
    pub fn listing(&self) -> Vec<String> {
        self.detections.iter().map(format_result_line).collect()
    }
}

pub fn format_result_line(detection: &Detection) -> String {
    format!("Letter {}: {:.2}", detection.label, detection.confidence)
}

/// Keep detections at or above `cutoff` and resolve their labels.
///
/// Class ids missing from `labels` are shown as [`UNKNOWN_LABEL`] and
/// reported through `on_unknown`.
pub fn filter_detections(
    raw: Vec<RawDetection>,
    labels: &LabelTable,
    cutoff: f32,
    mut on_unknown: impl FnMut(UnknownLabel),
) -> DetectionFrameResult {
    let detections = raw
        .into_iter()
        .filter(|d| d.confidence >= cutoff)
        .map(|d| {
            let label = match labels.resolve(d.class_id) {
                Ok(label) => label.to_string(),
                Err(unknown) => {
                    on_unknown(unknown);
                    UNKNOWN_LABEL.to_string()
                }
            };
            Detection {
                label,
                confidence: d.confidence,
                bbox: d.bbox,
            }
        })
        .collect();

    DetectionFrameResult { detections }
}

/// What a call to [`DetectionLoop::tick`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session is stopped; nothing was read and no tick was scheduled
    Idle,
    /// No frame could be read; the next tick is scheduled
    FrameSkipped,
    /// A frame was displayed with this many detections
    Rendered { detections: usize },
}

/// The capture-detect-render loop
pub struct DetectionLoop<P, D, S> {
    session: Session,
    cameras: P,
    detector: D,
    scheduler: S,
    tick_delay: Duration,
    style: OverlayStyle,
    fps: f32,
    reported_unknown: HashSet<usize>,
}

impl<P, D, S> DetectionLoop<P, D, S>
where
    P: CameraProvider,
    D: Detector,
    S: Scheduler,
{
    pub fn new(cameras: P, detector: D, scheduler: S, settings: &DetectorSettings) -> Self {
        Self {
            session: Session::new(settings.confidence_threshold),
            cameras,
            detector,
            scheduler,
            tick_delay: settings.tick_delay(),
            style: OverlayStyle::default(),
            fps: 0.0,
            reported_unknown: HashSet::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Open the camera and begin ticking. Does nothing if already running.
    ///
    /// On failure the session stays idle and no tick is scheduled.
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.session.is_running() {
            return Ok(());
        }

        self.session.acquire_camera(&mut self.cameras)?;
        self.session.set_running(true);
        self.scheduler.schedule_after(Duration::ZERO);
        log::info!(
            "Detection started (threshold {:.2})",
            self.session.confidence_threshold()
        );
        Ok(())
    }

    /// Stop ticking and release the camera. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let was_running = self.session.is_running();
        self.session.set_running(false);
        self.scheduler.cancel();
        let released = self.session.release_camera();

        if was_running || released {
            log::info!("Detection stopped");
        }
    }

    /// Start if idle, stop if running. Returns whether the loop is now running.
    pub fn toggle(&mut self) -> Result<bool, CameraError> {
        if self.session.is_running() {
            self.stop();
        } else {
            self.start()?;
        }
        Ok(self.session.is_running())
    }

    /// Run one iteration of the loop.
    ///
    /// Frame read failures are logged and skipped. Detection failures abort
    /// this tick and are returned, but the next tick is still scheduled.
    pub fn tick(&mut self, display: &mut impl DisplaySurface) -> Result<TickOutcome, DetectionError> {
        if !self.session.is_running() {
            return Ok(TickOutcome::Idle);
        }

        let outcome = self.render_frame(display);
        self.scheduler.schedule_after(self.tick_delay);
        outcome
    }

    fn render_frame(&mut self, display: &mut impl DisplaySurface) -> Result<TickOutcome, DetectionError> {
        let started = Instant::now();

        let Some(camera) = self.session.camera_mut() else {
            log::warn!("Detection running without a camera, skipping tick");
            return Ok(TickOutcome::FrameSkipped);
        };

        let mut frame = match camera.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("{}", e);
                return Ok(TickOutcome::FrameSkipped);
            }
        };

        frame.mirror();

        let raw = self
            .detector
            .predict(&frame, self.session.confidence_threshold())?;

        let reported_unknown = &mut self.reported_unknown;
        let result = filter_detections(raw, self.detector.labels(), DISPLAY_CUTOFF, |unknown| {
            if reported_unknown.insert(unknown.0) {
                log::warn!("{}, showing \"{}\"", unknown, UNKNOWN_LABEL);
            }
        });

        overlay::annotate(&mut frame, &result.detections, &self.style);

        display.show_frame(frame.to_display());
        display.show_results(&result.listing());

        let elapsed = started.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            self.fps = 1.0 / elapsed;
        }
        display.show_fps(self.fps);

        Ok(TickOutcome::Rendered {
            detections: result.detections.len(),
        })
    }
}
