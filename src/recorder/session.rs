//! Flight session orchestration
//!
//! Wires the whole topology together: acquires the device, starts every
//! source with its accumulator, writer and live taps bound to one shared
//! epoch and cancellation flag, warms up, hands the caller a live handle,
//! and on exit performs the ordered shutdown that ends with the combined
//! artifact. Normal completion, commanded stop, emergency and caller
//! errors all converge on the identical cleanup path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::capture::source::VideoSource;
use crate::capture::telemetry::{
    FieldProbe, TelemetrySample, TelemetrySchema, TelemetrySource,
};
use crate::capture::traits::{StreamConfig, VideoCapture, VideoFrame};
use crate::combine::Combiner;
use crate::device::{CommandTap, DeviceError, Drone};
use crate::recorder::accumulator::Accumulator;
use crate::recorder::state::{FlightReport, SessionConfig, SessionError, SessionEvent, SessionState};
use crate::recorder::writer::{self, WriterHandle};
use crate::stream::{SessionContext, StreamEvent, StreamKind};

/// File names inside the per-session directory.
const VEHICLE_VIDEO: &str = "vehicle.mp4";
const CAMERA_VIDEO: &str = "camera.mp4";
const TELEMETRY_TABLE: &str = "telemetry.csv";
const COMBINED_VIDEO: &str = "combined.mp4";
const SUMMARY: &str = "session.json";

type VideoTap = crossbeam_channel::Sender<StreamEvent<VideoFrame>>;
type TelemetryTap = crossbeam_channel::Sender<StreamEvent<TelemetrySample>>;

/// A flight session before takeoff.
///
/// Live consumers and event subscribers register here; `start` (or the
/// scope-managed `fly`) consumes the session, so all registration happens
/// before any source thread runs. One session records one flight; there is
/// no cross-session reuse.
pub struct FlightSession<D: Drone + 'static> {
    device: Arc<D>,
    aux_capture: Box<dyn VideoCapture>,
    probes: &'static [FieldProbe<D>],
    config: SessionConfig,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    vehicle_taps: Vec<VideoTap>,
    camera_taps: Vec<VideoTap>,
    telemetry_taps: Vec<TelemetryTap>,
}

impl<D: Drone + 'static> FlightSession<D> {
    pub fn new(
        device: D,
        aux_capture: Box<dyn VideoCapture>,
        probes: &'static [FieldProbe<D>],
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            device: Arc::new(device),
            aux_capture,
            probes,
            config,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            events,
            vehicle_taps: Vec::new(),
            camera_taps: Vec::new(),
            telemetry_taps: Vec::new(),
        }
    }

    /// Current state of the session machine.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Attach a live consumer to the vehicle video feed.
    pub fn tap_vehicle_video(&mut self) -> Receiver<StreamEvent<VideoFrame>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.vehicle_taps.push(tx);
        rx
    }

    /// Attach a live consumer to the ground-camera feed.
    pub fn tap_camera_video(&mut self) -> Receiver<StreamEvent<VideoFrame>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.camera_taps.push(tx);
        rx
    }

    /// Attach a live consumer to the telemetry stream.
    pub fn tap_telemetry(&mut self) -> Receiver<StreamEvent<TelemetrySample>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.telemetry_taps.push(tx);
        rx
    }

    /// Run the `Starting` sequence and hand back the live flight handle.
    ///
    /// A failure here is the one outright session failure: whatever was
    /// started is torn down and the device is released before returning.
    pub fn start(self) -> Result<ActiveFlight<D>, SessionError> {
        let Self {
            device,
            aux_capture,
            probes,
            config,
            state,
            events,
            vehicle_taps,
            camera_taps,
            telemetry_taps,
        } = self;

        *state.write() = SessionState::Starting;
        let _ = events.send(SessionEvent::Started);

        let id = Uuid::new_v4();
        let directory = config.output_dir.join(format!("flight-{id}"));
        tracing::info!(%id, directory = ?directory, "starting flight session");

        if let Err(e) = std::fs::create_dir_all(&directory) {
            *state.write() = SessionState::Failed;
            let _ = events.send(SessionEvent::Error(e.to_string()));
            return Err(e.into());
        }

        if let Err(e) = device.connect() {
            *state.write() = SessionState::Failed;
            let _ = events.send(SessionEvent::Error(e.to_string()));
            return Err(e.into());
        }

        let vehicle_capture = match device.stream_on() {
            Ok(capture) => capture,
            Err(e) => {
                device.release();
                *state.write() = SessionState::Failed;
                let _ = events.send(SessionEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };

        // Shared epoch and cancellation for every component.
        let ctx = SessionContext::new();
        let tap = CommandTap::new();
        let started_at = Utc::now();

        // Vehicle video: accumulator + writer + live taps.
        let mut vehicle = VideoSource::new(
            StreamConfig::new(StreamKind::Vehicle, config.video_rate_hz),
            vehicle_capture,
        );
        let vehicle_acc = Accumulator::spawn(StreamKind::Vehicle, vehicle.attach());
        let vehicle_writer = writer::spawn_video_writer(
            StreamKind::Vehicle,
            vehicle.attach(),
            directory.join(VEHICLE_VIDEO),
            config.video_rate_hz,
        );
        for tx in vehicle_taps {
            vehicle.attach_sender(tx);
        }

        // Ground camera.
        let mut camera = VideoSource::new(
            StreamConfig::new(StreamKind::Camera, config.video_rate_hz),
            aux_capture,
        );
        let camera_acc = Accumulator::spawn(StreamKind::Camera, camera.attach());
        let camera_writer = writer::spawn_video_writer(
            StreamKind::Camera,
            camera.attach(),
            directory.join(CAMERA_VIDEO),
            config.video_rate_hz,
        );
        for tx in camera_taps {
            camera.attach_sender(tx);
        }

        // Telemetry.
        let mut telemetry = TelemetrySource::new(
            StreamConfig::new(StreamKind::Telemetry, config.telemetry_rate_hz),
            device.clone(),
            probes,
            tap.clone(),
        );
        let schema = telemetry.schema();
        let telemetry_acc = Accumulator::spawn(StreamKind::Telemetry, telemetry.attach());
        let telemetry_writer = writer::spawn_telemetry_writer(
            telemetry.attach(),
            directory.join(TELEMETRY_TABLE),
            schema.clone(),
        );
        for tx in telemetry_taps {
            telemetry.attach_sender(tx);
        }

        let sources = vec![
            vehicle.spawn(ctx.clone()),
            camera.spawn(ctx.clone()),
            telemetry.spawn(ctx.clone()),
        ];

        // Give capture some time to deliver its first frames.
        std::thread::sleep(config.warmup);

        *state.write() = SessionState::Active;
        let _ = events.send(SessionEvent::Active);
        tracing::info!(%id, "flight session active");

        Ok(ActiveFlight {
            id,
            directory,
            started_at,
            device,
            tap,
            ctx,
            state,
            events,
            config,
            schema,
            shutdown_requested: AtomicBool::new(false),
            workers: Some(Workers {
                sources,
                vehicle_acc,
                camera_acc,
                telemetry_acc,
                writers: vec![vehicle_writer, camera_writer, telemetry_writer],
            }),
        })
    }

    /// Scope-managed flight: start, run caller code against the live
    /// handle, and converge normal and error completion on the same
    /// shutdown. A caller error is reported as a failed session after
    /// cleanup has run.
    pub fn fly<F>(self, f: F) -> Result<FlightReport, SessionError>
    where
        F: FnOnce(&ActiveFlight<D>) -> Result<(), SessionError>,
    {
        let flight = self.start()?;
        match f(&flight) {
            Ok(()) => flight.finish(),
            Err(e) => {
                tracing::error!(error = %e, "caller code failed mid-flight");
                flight.mark_failed(&e);
                let _ = flight.finish();
                Err(e)
            }
        }
    }
}

struct Workers {
    sources: Vec<JoinHandle<()>>,
    vehicle_acc: Accumulator<VideoFrame>,
    camera_acc: Accumulator<VideoFrame>,
    telemetry_acc: Accumulator<TelemetrySample>,
    writers: Vec<WriterHandle>,
}

/// The live handle held by the caller while the session is `Active`.
///
/// Dropping the handle without calling `finish` runs the same shutdown, so
/// cleanup is guaranteed on panic and early-scope-exit paths.
pub struct ActiveFlight<D: Drone + 'static> {
    id: Uuid,
    directory: PathBuf,
    started_at: DateTime<Utc>,
    device: Arc<D>,
    tap: CommandTap,
    ctx: SessionContext,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    config: SessionConfig,
    schema: TelemetrySchema,
    shutdown_requested: AtomicBool,
    workers: Option<Workers>,
}

impl<D: Drone + 'static> ActiveFlight<D> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The per-session output directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Send one command to the vehicle.
    ///
    /// The command string is recorded into the pending slot first, so the
    /// telemetry stream tags it into its next sample.
    pub fn issue_command(&self, command: &str) -> Result<(), DeviceError> {
        tracing::info!(command, "dispatching vehicle command");
        self.tap.record(command);
        self.device.dispatch(command)
    }

    /// Request a normal landing and mark the session for shutdown.
    pub fn land(&self) -> Result<(), DeviceError> {
        let result = self.issue_command(self.device.land_command());
        self.request_shutdown();
        result
    }

    /// Interrupt-priority halt; marks the session for shutdown.
    pub fn emergency_stop(&self) -> Result<(), DeviceError> {
        let result = self.issue_command(self.device.emergency_command());
        self.request_shutdown();
        result
    }

    /// Whether a landing or emergency stop asked for shutdown.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    fn mark_failed(&self, error: &SessionError) {
        *self.state.write() = SessionState::Failed;
        let _ = self.events.send(SessionEvent::Error(error.to_string()));
    }

    /// Graceful stop: request a landing, then run the full shutdown.
    pub fn stop(self) -> Result<FlightReport, SessionError> {
        if let Err(e) = self.land() {
            tracing::warn!(error = %e, "landing command failed during stop");
        }
        self.finish()
    }

    /// Run the `Stopping` sequence and return the session report.
    pub fn finish(mut self) -> Result<FlightReport, SessionError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<FlightReport, SessionError> {
        let Some(workers) = self.workers.take() else {
            return Err(SessionError::Aborted("session already finished".into()));
        };

        *self.state.write() = SessionState::Stopping;
        let _ = self.events.send(SessionEvent::Stopping);
        tracing::info!(id = %self.id, "stopping flight session");

        // One-shot cancellation; sentinel propagation does the rest.
        self.ctx.cancel();

        // All sources must be down before the histories are read.
        for source in workers.sources {
            if source.join().is_err() {
                tracing::error!("source thread panicked during shutdown");
            }
        }

        let vehicle_history = workers.vehicle_acc.join();
        let camera_history = workers.camera_acc.join();
        let telemetry_history = workers.telemetry_acc.join();

        let mut artifacts = Vec::new();
        for writer in workers.writers {
            let kind = writer.kind();
            match writer.join() {
                Ok(report) => {
                    if let Some(artifact) = report.artifact {
                        artifacts.push(artifact);
                    }
                }
                Err(e) => {
                    // A dead artifact degrades one stream, not the session.
                    tracing::warn!(stream = %kind, error = %e, "stream writer failed");
                }
            }
        }

        // Synchronous batch merge of the recorded histories.
        let combiner = Combiner::new(
            self.directory.join(COMBINED_VIDEO),
            self.config.combined_rate_hz,
        );
        let combined = match combiner.run(
            &vehicle_history,
            &camera_history,
            &telemetry_history,
            &self.schema,
        ) {
            Ok(report) => {
                artifacts.push(report.artifact.clone());
                Some(report.artifact)
            }
            Err(e) => {
                tracing::warn!(error = %e, "combined artifact skipped");
                None
            }
        };

        self.device.release();

        let ended_at = Utc::now();
        let report = FlightReport {
            id: self.id,
            directory: self.directory.clone(),
            started_at: self.started_at,
            ended_at,
            duration_s: self.ctx.elapsed(),
            vehicle_frames: vehicle_history.len(),
            camera_frames: camera_history.len(),
            telemetry_samples: telemetry_history.len(),
            artifacts,
            combined,
        };
        persist_summary(&self.directory, &report);

        *self.state.write() = SessionState::Idle;
        let _ = self.events.send(SessionEvent::Stopped);
        tracing::info!(
            id = %self.id,
            duration_s = report.duration_s,
            vehicle_frames = report.vehicle_frames,
            camera_frames = report.camera_frames,
            telemetry_samples = report.telemetry_samples,
            "flight session finished"
        );

        Ok(report)
    }
}

impl<D: Drone + 'static> Drop for ActiveFlight<D> {
    fn drop(&mut self) {
        if self.workers.is_some() {
            tracing::warn!(
                id = %self.id,
                "flight handle dropped without finish(), running shutdown"
            );
            let _ = self.shutdown();
        }
    }
}

/// Best-effort persistence of the session summary; the in-memory report
/// stays authoritative if the write fails.
fn persist_summary(directory: &Path, report: &FlightReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => {
            if let Err(e) = std::fs::write(directory.join(SUMMARY), json) {
                tracing::warn!(error = %e, "failed to write session summary");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize session summary"),
    }
}
