//! Telemetry stream source
//!
//! Polls a fixed, ordered set of named scalar accessors on the device at a
//! fixed rate, producing one sample per tick. Outgoing vehicle commands are
//! tagged into the stream through the session's `CommandTap`.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use crate::capture::traits::StreamConfig;
use crate::device::CommandTap;
use crate::stream::{Outputs, SessionContext, Stamped, StreamEvent};

/// One named scalar accessor on a device.
///
/// Probe tables are static data, so a session's telemetry schema is
/// inspectable without touching hardware.
pub struct FieldProbe<D: ?Sized> {
    pub name: &'static str,
    pub read: fn(&D) -> Option<f64>,
}

impl<D: ?Sized> Clone for FieldProbe<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: ?Sized> Copy for FieldProbe<D> {}

impl<D: ?Sized> std::fmt::Debug for FieldProbe<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldProbe").field("name", &self.name).finish()
    }
}

/// The ordered field layout of a session's telemetry stream.
///
/// Fixed for the session lifetime; used both while sampling and as the
/// persisted file's header.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySchema {
    names: Vec<&'static str>,
}

impl TelemetrySchema {
    pub fn from_probes<D: ?Sized>(probes: &[FieldProbe<D>]) -> Self {
        Self {
            names: probes.iter().map(|p| p.name).collect(),
        }
    }

    /// The probe names, in declared order.
    pub fn field_names(&self) -> &[&'static str] {
        &self.names
    }

    /// The persisted column order: time first, command last.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(self.names.len() + 2);
        columns.push("time_s");
        columns.extend_from_slice(&self.names);
        columns.push("command");
        columns
    }
}

/// One telemetry reading.
///
/// `values` is parallel to the session schema's field order. `command`
/// carries at most the single most recent command dispatched since the
/// previous tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub values: Vec<Option<f64>>,
    pub command: Option<String>,
}

/// A fixed-rate poller over a device's probe table.
pub struct TelemetrySource<D: 'static> {
    config: StreamConfig,
    device: Arc<D>,
    probes: &'static [FieldProbe<D>],
    tap: CommandTap,
    outputs: Outputs<TelemetrySample>,
}

impl<D: Send + Sync + 'static> TelemetrySource<D> {
    pub fn new(
        config: StreamConfig,
        device: Arc<D>,
        probes: &'static [FieldProbe<D>],
        tap: CommandTap,
    ) -> Self {
        Self {
            config,
            device,
            probes,
            tap,
            outputs: Outputs::new(),
        }
    }

    pub fn schema(&self) -> TelemetrySchema {
        TelemetrySchema::from_probes(self.probes)
    }

    pub fn attach(&mut self) -> Receiver<StreamEvent<TelemetrySample>> {
        self.outputs.attach()
    }

    pub fn attach_sender(&mut self, tx: Sender<StreamEvent<TelemetrySample>>) {
        self.outputs.attach_sender(tx);
    }

    /// Start the polling thread.
    pub fn spawn(self, ctx: SessionContext) -> JoinHandle<()> {
        std::thread::spawn(move || self.run(ctx))
    }

    fn run(mut self, ctx: SessionContext) {
        let period = self.config.period();
        let mut samples = 0u64;

        tracing::info!(
            stream = %self.config.kind,
            rate_hz = self.config.target_rate_hz,
            fields = self.probes.len(),
            "telemetry source started"
        );

        while !ctx.is_cancelled() {
            let tick = Instant::now();

            let values = self
                .probes
                .iter()
                .map(|probe| (probe.read)(self.device.as_ref()))
                .collect();
            let command = self.tap.take();

            self.outputs
                .send(Stamped::new(TelemetrySample { values, command }, ctx.elapsed()));
            samples += 1;

            // Sleep out the remainder of the tick.
            let spent = tick.elapsed();
            if spent < period {
                std::thread::sleep(period - spent);
            }
        }

        self.outputs.finish();
        tracing::info!(stream = %self.config.kind, samples, "telemetry source stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamKind;

    struct FakeDevice {
        battery: f64,
    }

    static PROBES: &[FieldProbe<FakeDevice>] = &[
        FieldProbe {
            name: "battery",
            read: |d| Some(d.battery),
        },
        FieldProbe {
            name: "height_cm",
            read: |_| None,
        },
    ];

    #[test]
    fn schema_columns_wrap_probe_names() {
        let schema = TelemetrySchema::from_probes(PROBES);
        assert_eq!(schema.field_names(), &["battery", "height_cm"]);
        assert_eq!(schema.columns(), vec!["time_s", "battery", "height_cm", "command"]);
    }

    #[test]
    fn samples_follow_probe_order_and_carry_commands() {
        let tap = CommandTap::new();
        let mut source = TelemetrySource::new(
            StreamConfig::new(StreamKind::Telemetry, 200.0),
            Arc::new(FakeDevice { battery: 87.0 }),
            PROBES,
            tap.clone(),
        );
        let rx = source.attach();

        let ctx = SessionContext::new();
        tap.record("takeoff");
        tap.record("up 50");
        let handle = source.spawn(ctx.clone());

        // Let a few ticks elapse, then stop.
        std::thread::sleep(std::time::Duration::from_millis(30));
        ctx.cancel();
        handle.join().unwrap();

        let mut samples = Vec::new();
        while let Ok(ev) = rx.recv() {
            match ev {
                StreamEvent::Frame(item) => samples.push(item),
                StreamEvent::Eos => break,
            }
        }

        assert!(!samples.is_empty());
        assert_eq!(samples[0].payload.values, vec![Some(87.0), None]);
        // Only the most recent pre-tick command is reported.
        assert_eq!(samples[0].payload.command.as_deref(), Some("up 50"));
        assert!(samples[1..].iter().all(|s| s.payload.command.is_none()));
        for pair in samples.windows(2) {
            assert!(pair[1].t_rel >= pair[0].t_rel);
        }
    }
}
