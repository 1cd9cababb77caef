//! ASL Detector - webcam hand-sign letter detection
//!
//! Captures frames from the default camera, mirrors them, runs a YOLO model
//! exported to ONNX on each one and shows the annotated video together with
//! the letters detected above a fixed display cutoff.

pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod ml;
pub mod overlay;
pub mod pipeline;

pub use app::App;
