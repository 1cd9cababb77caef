//! Camera capture module
//!
//! The detection loop only sees two seams: a [`CameraProvider`] that opens the
//! device and the [`FrameSource`] it hands back. Dropping the frame source
//! releases the device, so the camera is freed on every exit path.
//!
//! [`NokhwaCameraProvider`] is the default implementation, backed by nokhwa.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use crate::error::CameraError;
use crate::frame::Frame;

/// An open capture device that yields frames on demand
pub trait FrameSource {
    /// Read the next frame, blocking until the driver delivers one.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Opens capture devices
pub trait CameraProvider {
    /// Open the device. The returned handle owns it until dropped.
    fn open(&mut self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(camera_list) => camera_list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Opens the system camera at a fixed index through nokhwa
pub struct NokhwaCameraProvider {
    camera_index: u32,
}

impl NokhwaCameraProvider {
    pub fn new(camera_index: u32) -> Self {
        Self { camera_index }
    }

    /// Try progressively less specific formats until the driver accepts one
    fn open_camera(camera_index: u32) -> Result<Camera, CameraError> {
        let index = CameraIndex::Index(camera_index);

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        match Camera::new(index.clone(), requested) {
            Ok(c) => return Ok(c),
            Err(e) => log::warn!("Failed to open camera with highest resolution: {:?}", e),
        }

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(640, 480),
        ));
        match Camera::new(index.clone(), requested) {
            Ok(c) => return Ok(c),
            Err(e) => log::warn!("Failed with HighestResolution: {:?}", e),
        }

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        Camera::new(index, requested).map_err(|e| CameraError::Unavailable {
            index: camera_index,
            reason: e.to_string(),
        })
    }
}

impl Default for NokhwaCameraProvider {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CameraProvider for NokhwaCameraProvider {
    fn open(&mut self) -> Result<Box<dyn FrameSource>, CameraError> {
        let mut camera = Self::open_camera(self.camera_index)?;

        camera.open_stream().map_err(|e| CameraError::Unavailable {
            index: self.camera_index,
            reason: format!("failed to open stream: {}", e),
        })?;

        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Box::new(NokhwaCamera { camera }))
    }
}

/// Open nokhwa camera stream; the stream is stopped on drop
struct NokhwaCamera {
    camera: Camera,
}

impl FrameSource for NokhwaCamera {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::FrameRead(e.to_string()))?;
        let resolution = buffer.resolution();
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::FrameRead(format!("decode: {}", e)))?;

        Frame::from_rgb(resolution.width(), resolution.height(), image.into_raw()).ok_or_else(|| {
            CameraError::FrameRead(format!(
                "decoded buffer does not match {}x{}",
                resolution.width(),
                resolution.height()
            ))
        })
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
        log::info!("Camera released");
    }
}
