//! Detection session state

use crate::camera::{CameraProvider, FrameSource};
use crate::config::{clamp_unit, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::error::CameraError;

/// Run state shared across ticks.
///
/// Holds at most one open camera. Releasing the camera drops its handle, so a
/// session that goes out of scope frees the device as well.
pub struct Session {
    running: bool,
    camera: Option<Box<dyn FrameSource>>,
    confidence_threshold: f32,
}

impl Session {
    /// Idle session without a camera
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            running: false,
            camera: None,
            confidence_threshold: clamp_unit(confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    /// Inference threshold passed to the detector (0.0 - 1.0)
    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Set the inference threshold, clamped into [0, 1]
    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.confidence_threshold = clamp_unit(threshold, self.confidence_threshold);
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Open the camera unless one is already open
    pub(crate) fn acquire_camera(&mut self, provider: &mut dyn CameraProvider) -> Result<(), CameraError> {
        if self.camera.is_none() {
            self.camera = Some(provider.open()?);
        }
        Ok(())
    }

    /// Drop the camera handle; returns whether one was open
    pub(crate) fn release_camera(&mut self) -> bool {
        self.camera.take().is_some()
    }

    pub(crate) fn camera_mut(&mut self) -> Option<&mut (dyn FrameSource + 'static)> {
        self.camera.as_deref_mut()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}
