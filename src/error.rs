//! Error types
//!
//! Each concern gets its own error enum so callers can decide how severe a
//! failure is: camera open failures abort `start`, frame read failures are
//! swallowed by the loop, detection failures abort a single tick.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the camera layer.
#[derive(Error, Debug)]
pub enum CameraError {
    /// The capture device could not be opened.
    #[error("Could not open camera {index}: {reason}")]
    Unavailable { index: u32, reason: String },
    /// A single frame could not be read or decoded.
    #[error("Failed to read camera frame: {0}")]
    FrameRead(String),
}

/// Errors raised while running detection on a frame.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// The frame cannot be fed to the model (zero-sized, wrong layout).
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    /// ONNX Runtime failed while running the model.
    #[error("Inference failed: {0}")]
    Inference(String),
    /// The model output does not have the expected shape.
    #[error("Unexpected model output: {0}")]
    Model(String),
}

impl From<ort::Error> for DetectionError {
    fn from(e: ort::Error) -> Self {
        DetectionError::Inference(e.to_string())
    }
}

/// A class id that is missing from the model's label table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No label for class id {0}")]
pub struct UnknownLabel(pub usize);

/// Settings file errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that stop the application from starting.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("Failed to read labels file {path}: {reason}")]
    Labels { path: PathBuf, reason: String },
    #[error("Graphics initialization failed: {0}")]
    Graphics(String),
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}
