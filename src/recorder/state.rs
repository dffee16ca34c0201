//! Session state and reporting types
//!
//! Defines the flight-session state machine, its configuration, the
//! lifecycle events broadcast to observers, and the report persisted at
//! the end of a session.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::device::DeviceError;

/// Current state of a flight session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session in progress.
    Idle,
    /// Acquiring the device and spinning up sources.
    Starting,
    /// Live handle available; streams are recording.
    Active,
    /// Cancellation set; joining workers and combining.
    Stopping,
    /// An unrecoverable error occurred; cleanup still runs.
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events emitted during a session's lifecycle.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session entered `Starting`.
    Started,
    /// Warm-up finished; the live handle is usable.
    Active,
    /// Shutdown began.
    Stopping,
    /// Cleanup finished; the session is back to `Idle`.
    Stopped,
    /// Error occurred.
    Error(String),
}

/// Configuration for starting a flight session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Directory under which the per-session directory is created.
    pub output_dir: PathBuf,

    /// Target rate for both video streams.
    pub video_rate_hz: f64,

    /// Telemetry polling rate.
    pub telemetry_rate_hz: f64,

    /// Output rate of the combined artifact.
    pub combined_rate_hz: f64,

    /// Pause between arming the streams and declaring the session active;
    /// capture needs a moment before the first frames become available.
    pub warmup: Duration,
}

impl SessionConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("flights"),
            video_rate_hz: 30.0,
            telemetry_rate_hz: 30.0,
            combined_rate_hz: 30.0,
            warmup: Duration::from_secs(5),
        }
    }
}

/// Result of a completed flight session, persisted as `session.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightReport {
    pub id: Uuid,

    /// The per-session output directory.
    pub directory: PathBuf,

    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,

    /// Seconds from epoch creation to shutdown completion.
    pub duration_s: f64,

    /// Items each stream delivered past rate limiting.
    pub vehicle_frames: usize,
    pub camera_frames: usize,
    pub telemetry_samples: usize,

    /// Files actually created (streams that produced nothing leave none).
    pub artifacts: Vec<PathBuf>,

    /// The combined artifact, if all three inputs were present and the
    /// encoder succeeded.
    pub combined: Option<PathBuf>,
}

/// Session-level failures.
///
/// Per-stream capture failures are *not* session errors; they degrade that
/// stream's artifacts and the session completes normally.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("flight aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = SessionConfig::default();
        assert!(config.video_rate_hz > 0.0);
        assert!(config.telemetry_rate_hz > 0.0);
        assert_eq!(config.output_dir, PathBuf::from("flights"));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = SessionConfig::new("/tmp/flights");
        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.output_dir, config.output_dir);
        assert_eq!(back.warmup, config.warmup);
    }
}
