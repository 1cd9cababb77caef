//! ML inference module
//!
//! Detection is delegated to a pretrained YOLO model. The rest of the crate
//! talks to it through the [`Detector`] trait: a frame and a confidence
//! threshold go in, raw detections come out, and [`Detector::labels`] maps
//! their class ids to letters.

pub mod labels;
pub mod yolo;

pub use labels::{LabelTable, UNKNOWN_LABEL};
pub use yolo::{OnnxDetector, YoloParams};

use crate::error::DetectionError;
use crate::frame::Frame;

/// Axis-aligned box in integer pixel coordinates of the frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// One model output before the display filter
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detection that passed the display filter, with its class id resolved to
/// a label
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Object detector backed by a pretrained model
pub trait Detector {
    /// Run the model on `frame`, returning detections whose confidence is
    /// above `confidence_threshold`.
    fn predict(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>, DetectionError>;

    /// Class id to label mapping supplied by the model
    fn labels(&self) -> &LabelTable;
}
