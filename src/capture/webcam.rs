//! Auxiliary camera capture using nokhwa
//!
//! Concrete `VideoCapture` for the ground camera. Frames are decoded to
//! RGBA so they ride the same pipeline as every other source.

use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use crate::capture::traits::{CaptureError, VideoCapture, VideoFrame};

/// List the human-readable names of the cameras nokhwa can see.
pub fn camera_names() -> Vec<String> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| info.human_name().to_string())
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate cameras: {e}");
            Vec::new()
        }
    }
}

/// A webcam capture handle.
///
/// Opened eagerly so a missing device fails session start rather than
/// silently producing an empty stream.
pub struct WebcamCapture {
    camera: Camera,
}

impl WebcamCapture {
    /// Open a camera by index (`None` = first camera) and start its stream.
    pub fn open(index: Option<u32>) -> Result<Self, CaptureError> {
        let index = CameraIndex::Index(index.unwrap_or(0));
        let format =
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index.clone(), format)
            .map_err(|e| CaptureError::Unavailable(format!("camera {index:?}: {e}")))?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::Unavailable(format!("camera stream: {e}")))?;

        let fmt = camera.camera_format();
        tracing::info!(
            width = fmt.resolution().width(),
            height = fmt.resolution().height(),
            fps = fmt.frame_rate(),
            "webcam opened"
        );

        Ok(Self { camera })
    }
}

impl VideoCapture for WebcamCapture {
    fn read_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbAFormat>()
            .map_err(|e| CaptureError::Read(format!("decode: {e}")))?;

        let (width, height) = (decoded.width(), decoded.height());
        Ok(VideoFrame {
            width,
            height,
            data: decoded.into_raw(),
        })
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("error stopping camera stream: {e}");
        }
    }
}
