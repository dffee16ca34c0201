//! Capture trait definitions
//!
//! Device-agnostic traits and frame types for capture sources. The core
//! never talks to hardware directly; it drives whatever implements
//! `VideoCapture` and the device probe tables.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::StreamKind;

/// Errors surfaced by a capture handle.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("frame read failed: {0}")]
    Read(String),

    #[error("capture stream ended")]
    Ended,
}

/// One video frame: RGBA pixels, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// A solid-color frame.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Expected byte length for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        (self.width * self.height * 4) as usize
    }
}

/// A blocking video capture handle.
///
/// `read_frame` blocks until the device delivers the next frame or fails;
/// the device controls the pacing. Dropping the handle releases the device.
pub trait VideoCapture: Send {
    fn read_frame(&mut self) -> Result<VideoFrame, CaptureError>;
}

/// Read-only configuration of one stream source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    pub kind: StreamKind,
    pub target_rate_hz: f64,
}

impl StreamConfig {
    pub fn new(kind: StreamKind, target_rate_hz: f64) -> Self {
        Self {
            kind,
            target_rate_hz,
        }
    }

    /// The interval between two retained items at the target rate.
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.target_rate_hz)
    }
}
