//! Synthetic devices
//!
//! Hardware-free implementations of the capture and device traits, used by
//! the integration tests and for running the pipeline without a vehicle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::capture::telemetry::FieldProbe;
use crate::capture::traits::{CaptureError, VideoCapture, VideoFrame};
use crate::device::{DeviceError, Drone};

/// A camera that synthesizes frames at a fixed native pace.
///
/// `read_frame` blocks for one native period per call, like a real device
/// delivering frames at its own rate.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    pace: Duration,
    frames: u64,
    fail_after: Option<u64>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, native_rate_hz: f64) -> Self {
        Self {
            width,
            height,
            pace: Duration::from_secs_f64(1.0 / native_rate_hz),
            frames: 0,
            fail_after: None,
        }
    }

    /// Make the camera fail after delivering `frames` frames, to exercise
    /// the soft-failure path.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl VideoCapture for SyntheticCamera {
    fn read_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        if let Some(limit) = self.fail_after {
            if self.frames >= limit {
                return Err(CaptureError::Ended);
            }
        }
        std::thread::sleep(self.pace);
        self.frames += 1;
        // A slowly shifting solid color, so consecutive frames differ.
        let shade = (self.frames % 256) as u8;
        Ok(VideoFrame::filled(
            self.width,
            self.height,
            [shade, 128, 255 - shade, 255],
        ))
    }
}

#[derive(Debug)]
struct DroneState {
    connected: bool,
    streaming: bool,
    height_cm: f64,
    battery: f64,
    yaw_degrees: f64,
    dispatched: Vec<String>,
    powered_on: Instant,
}

/// A scripted stand-in for the vehicle.
///
/// Commands are accepted, recorded, and applied as trivial state changes
/// so telemetry moves in response to the flight script.
pub struct ScriptedDrone {
    state: Arc<Mutex<DroneState>>,
    video_width: u32,
    video_height: u32,
    video_rate_hz: f64,
}

impl ScriptedDrone {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DroneState {
                connected: false,
                streaming: false,
                height_cm: 0.0,
                battery: 100.0,
                yaw_degrees: 0.0,
                dispatched: Vec::new(),
                powered_on: Instant::now(),
            })),
            video_width: 320,
            video_height: 240,
            video_rate_hz: 60.0,
        }
    }

    /// Override the synthesized onboard video format.
    pub fn with_video(mut self, width: u32, height: u32, native_rate_hz: f64) -> Self {
        self.video_width = width;
        self.video_height = height;
        self.video_rate_hz = native_rate_hz;
        self
    }

    /// Every command the drone has accepted, in dispatch order.
    pub fn dispatched(&self) -> Vec<String> {
        self.state.lock().dispatched.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn read(&self, f: impl FnOnce(&DroneState) -> f64) -> Option<f64> {
        let state = self.state.lock();
        state.connected.then(|| f(&state))
    }
}

impl Default for ScriptedDrone {
    fn default() -> Self {
        Self::new()
    }
}

impl Drone for ScriptedDrone {
    fn connect(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.connected = true;
        state.powered_on = Instant::now();
        Ok(())
    }

    fn stream_on(&self) -> Result<Box<dyn VideoCapture>, DeviceError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(DeviceError::Stream("not connected".into()));
        }
        state.streaming = true;
        Ok(Box::new(SyntheticCamera::new(
            self.video_width,
            self.video_height,
            self.video_rate_hz,
        )))
    }

    fn dispatch(&self, command: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(DeviceError::Command("not connected".into()));
        }
        state.dispatched.push(command.to_string());
        state.battery = (state.battery - 0.1).max(0.0);

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("takeoff"), _) => state.height_cm = 80.0,
            (Some("land"), _) | (Some("emergency"), _) => state.height_cm = 0.0,
            (Some("up"), Some(n)) => state.height_cm += n.parse().unwrap_or(0.0),
            (Some("down"), Some(n)) => {
                state.height_cm = (state.height_cm - n.parse().unwrap_or(0.0)).max(0.0)
            }
            (Some("cw"), Some(n)) => state.yaw_degrees += n.parse().unwrap_or(0.0),
            (Some("ccw"), Some(n)) => state.yaw_degrees -= n.parse().unwrap_or(0.0),
            _ => {}
        }
        Ok(())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.streaming = false;
        state.connected = false;
    }
}

/// The scripted drone's telemetry capability set, mirroring a small flight
/// controller's accessors.
pub static SCRIPTED_PROBES: &[FieldProbe<ScriptedDrone>] = &[
    FieldProbe {
        name: "acceleration_x",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "acceleration_y",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "acceleration_z",
        read: |_| Some(-9.8),
    },
    FieldProbe {
        name: "barometer",
        read: |d| d.read(|s| s.height_cm / 100.0),
    },
    FieldProbe {
        name: "battery",
        read: |d| d.read(|s| s.battery),
    },
    FieldProbe {
        name: "flight_time",
        read: |d| d.read(|s| s.powered_on.elapsed().as_secs_f64()),
    },
    FieldProbe {
        name: "height_cm",
        read: |d| d.read(|s| s.height_cm),
    },
    FieldProbe {
        name: "to_floor_cm",
        read: |d| d.read(|s| s.height_cm),
    },
    FieldProbe {
        name: "pitch_degrees",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "roll_degrees",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "speed_x",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "speed_y",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "speed_z",
        read: |_| Some(0.0),
    },
    FieldProbe {
        name: "temperature_c",
        read: |_| Some(42.0),
    },
    FieldProbe {
        name: "yaw_degrees",
        read: |d| d.read(|s| s.yaw_degrees),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_fails_after_the_configured_frame_count() {
        let mut camera = SyntheticCamera::new(8, 8, 1000.0).fail_after(2);
        assert!(camera.read_frame().is_ok());
        assert!(camera.read_frame().is_ok());
        assert!(camera.read_frame().is_err());
    }

    #[test]
    fn commands_move_the_scripted_state() {
        let drone = ScriptedDrone::new();
        drone.connect().unwrap();
        drone.dispatch("takeoff").unwrap();
        drone.dispatch("up 50").unwrap();

        let height = SCRIPTED_PROBES
            .iter()
            .find(|p| p.name == "height_cm")
            .map(|p| (p.read)(&drone))
            .unwrap();
        assert_eq!(height, Some(130.0));
        assert_eq!(drone.dispatched(), vec!["takeoff", "up 50"]);
    }

    #[test]
    fn probes_read_none_while_disconnected() {
        let drone = ScriptedDrone::new();
        let battery = SCRIPTED_PROBES
            .iter()
            .find(|p| p.name == "battery")
            .map(|p| (p.read)(&drone))
            .unwrap();
        assert_eq!(battery, None);
    }
}
