//! Device capability surface
//!
//! What a session needs from the vehicle: a control link, armed video
//! streaming, and a command dispatch path. The wire protocol behind these
//! calls is out of scope; implementations wrap whatever transport the
//! vehicle speaks.

pub mod command;

pub use command::CommandTap;

use thiserror::Error;

use crate::capture::traits::VideoCapture;

/// Errors surfaced by device operations.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device connection failed: {0}")]
    Connect(String),

    #[error("video streaming unavailable: {0}")]
    Stream(String),

    #[error("command rejected: {0}")]
    Command(String),
}

/// The vehicle as the session sees it.
///
/// The handle is exclusively owned by the active session for its whole
/// lifetime; `release` is called on every session exit path.
pub trait Drone: Send + Sync {
    /// Establish the control link. Called once during session start.
    fn connect(&self) -> Result<(), DeviceError>;

    /// Arm video streaming and hand out the capture side.
    fn stream_on(&self) -> Result<Box<dyn VideoCapture>, DeviceError>;

    /// Send one raw command string to the vehicle.
    fn dispatch(&self, command: &str) -> Result<(), DeviceError>;

    /// Command string for a normal landing.
    fn land_command(&self) -> &'static str {
        "land"
    }

    /// Command string for an interrupt-priority halt.
    fn emergency_command(&self) -> &'static str {
        "emergency"
    }

    /// Drop the control link.
    fn release(&self);
}
