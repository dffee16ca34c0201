//! Capture sources
//!
//! One source per raw input: the vehicle's video feed, the auxiliary
//! ground camera, and the telemetry poller. Each owns a dedicated thread
//! and fans captured items out to its registered consumers.

pub mod source;
pub mod telemetry;
pub mod traits;

#[cfg(feature = "webcam")]
pub mod webcam;

pub use source::VideoSource;
pub use telemetry::{FieldProbe, TelemetrySample, TelemetrySchema, TelemetrySource};
pub use traits::{CaptureError, StreamConfig, VideoCapture, VideoFrame};

#[cfg(feature = "webcam")]
pub use webcam::WebcamCapture;
