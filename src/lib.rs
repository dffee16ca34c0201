//! Flightscope - synchronized multi-stream flight capture, made simple.
//!
//! A vehicle emits a live video feed and a telemetry stream at independent,
//! jittery rates; an auxiliary ground camera emits a second video feed.
//! Flightscope captures all three concurrently on dedicated threads,
//! persists each stream incrementally, fans items out live to attached
//! consumers, and merges everything into one time-aligned composite video
//! when the session ends.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use flightscope::sim::{ScriptedDrone, SyntheticCamera, SCRIPTED_PROBES};
//! use flightscope::{FlightSession, SessionConfig};
//!
//! # fn main() -> Result<(), flightscope::SessionError> {
//! let session = FlightSession::new(
//!     ScriptedDrone::new(),
//!     Box::new(SyntheticCamera::new(640, 480, 30.0)),
//!     SCRIPTED_PROBES,
//!     SessionConfig::new("flights"),
//! );
//!
//! let report = session.fly(|flight| {
//!     flight.issue_command("takeoff")?;
//!     flight.issue_command("up 50")?;
//!     flight.land()?;
//!     Ok(())
//! })?;
//!
//! println!(
//!     "recorded {} vehicle frames into {}",
//!     report.vehicle_frames,
//!     report.directory.display()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! Failure isolation: a capture source that dies ends its own stream with
//! a sentinel and degrades that stream's artifacts; sibling streams and the
//! session itself keep going. Only a failure to reach `Active` at all is
//! surfaced as a session error.

pub mod capture;
pub mod combine;
pub mod device;
pub mod media;
pub mod recorder;
pub mod sim;
pub mod stream;

pub use capture::{
    CaptureError, FieldProbe, StreamConfig, TelemetrySample, TelemetrySchema, TelemetrySource,
    VideoCapture, VideoFrame, VideoSource,
};
pub use combine::{CombineError, CombineReport, Combiner};
pub use device::{CommandTap, DeviceError, Drone};
pub use recorder::{
    ActiveFlight, FlightReport, FlightSession, SessionConfig, SessionError, SessionEvent,
    SessionState,
};
pub use stream::{SessionContext, ShutdownFlag, Stamped, StreamEvent, StreamKind};
