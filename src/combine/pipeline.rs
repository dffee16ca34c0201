//! Post-session composition
//!
//! Merges the three accumulated histories into one fixed-rate composite
//! video: vehicle frame on top, ground-camera frame below, telemetry text
//! in the padding beside the narrower frame. Streams are multiplexed with
//! a nearest-past-sample policy; no interpolation is performed.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::capture::telemetry::{TelemetrySample, TelemetrySchema};
use crate::capture::traits::VideoFrame;
use crate::media::ffmpeg::{FfmpegEncoder, FrameEncoder, MediaError};
use crate::media::overlay::{self, OVERLAY_YELLOW};
use crate::stream::{Stamped, StreamKind};

const MARGIN: u32 = 50;
const TEXT_SCALE: u32 = 2;
const STAMP_SCALE: u32 = 3;

/// Combine failures. None of these leave a partial artifact behind.
#[derive(Error, Debug)]
pub enum CombineError {
    /// A combined artifact with missing inputs is worse than no artifact.
    #[error("missing {0} history, nothing to combine")]
    MissingInput(StreamKind),

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// What the combiner produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineReport {
    pub artifact: PathBuf,
    pub frames: u64,
    /// Seconds between the earliest and latest video timestamps.
    pub span_s: f64,
}

/// Post-session batch merge of the recorded histories.
pub struct Combiner {
    output: PathBuf,
    output_rate_hz: f64,
}

impl Combiner {
    pub fn new(output: impl Into<PathBuf>, output_rate_hz: f64) -> Self {
        Self {
            output: output.into(),
            output_rate_hz,
        }
    }

    /// Produce the composite artifact.
    pub fn run(
        &self,
        vehicle: &[Stamped<VideoFrame>],
        camera: &[Stamped<VideoFrame>],
        telemetry: &[Stamped<TelemetrySample>],
        schema: &TelemetrySchema,
    ) -> Result<CombineReport, CombineError> {
        self.run_with(vehicle, camera, telemetry, schema, |width, height| {
            FfmpegEncoder::create(&self.output, width, height, self.output_rate_hz)
        })
    }

    fn run_with<E, F>(
        &self,
        vehicle: &[Stamped<VideoFrame>],
        camera: &[Stamped<VideoFrame>],
        telemetry: &[Stamped<TelemetrySample>],
        schema: &TelemetrySchema,
        open: F,
    ) -> Result<CombineReport, CombineError>
    where
        E: FrameEncoder,
        F: FnOnce(u32, u32) -> Result<E, MediaError>,
    {
        if vehicle.is_empty() {
            return Err(CombineError::MissingInput(StreamKind::Vehicle));
        }
        if camera.is_empty() {
            return Err(CombineError::MissingInput(StreamKind::Camera));
        }
        if telemetry.is_empty() {
            return Err(CombineError::MissingInput(StreamKind::Telemetry));
        }

        // The global window spans the two video histories; telemetry is
        // held to whatever sample is nearest in the past.
        let start = vehicle[0].t_rel.min(camera[0].t_rel);
        let stop = vehicle[vehicle.len() - 1]
            .t_rel
            .max(camera[camera.len() - 1].t_rel);
        let step = 1.0 / self.output_rate_hz;
        let ticks = ((stop - start) * self.output_rate_hz).floor() as u64;

        // Canvas: wider frame's width, both heights stacked.
        let top = &vehicle[0].payload;
        let bottom = &camera[0].payload;
        let canvas_width = top.width.max(bottom.width);
        let canvas_height = top.height + bottom.height;

        tracing::info!(
            output = ?self.output,
            frames = ticks + 1,
            span_s = stop - start,
            width = canvas_width,
            height = canvas_height,
            "combining recorded streams"
        );

        let mut encoder = open(canvas_width, canvas_height)?;
        let (mut iv, mut ic, mut it) = (0usize, 0usize, 0usize);

        for k in 0..=ticks {
            let t = start + k as f64 * step;
            iv = advance(vehicle, iv, t);
            ic = advance(camera, ic, t);
            it = advance(telemetry, it, t);

            let frame = compose(
                &vehicle[iv],
                &camera[ic],
                &telemetry[it],
                schema,
                canvas_width,
                canvas_height,
            );
            encoder.write_frame(&frame)?;
        }

        encoder.finish()?;
        Ok(CombineReport {
            artifact: self.output.clone(),
            frames: ticks + 1,
            span_s: stop - start,
        })
    }
}

/// Advance a cursor to the most recent element at or before `t`.
///
/// Never moves past the last element and never backwards, so boundary
/// ticks clamp to the first/last observation.
fn advance<T>(history: &[Stamped<T>], mut idx: usize, t: f64) -> usize {
    while idx + 1 < history.len() && history[idx + 1].t_rel < t {
        idx += 1;
    }
    idx
}

fn compose(
    vehicle: &Stamped<VideoFrame>,
    camera: &Stamped<VideoFrame>,
    telemetry: &Stamped<TelemetrySample>,
    schema: &TelemetrySchema,
    canvas_width: u32,
    canvas_height: u32,
) -> VideoFrame {
    let mut canvas = VideoFrame::filled(canvas_width, canvas_height, [0, 0, 0, 255]);
    let top = &vehicle.payload;
    let bottom = &camera.payload;

    overlay::blit(&mut canvas, top, 0, 0);
    overlay::blit(&mut canvas, bottom, 0, top.height);

    // Each region shows its own source frame's capture time.
    overlay::draw_text(
        &mut canvas,
        &format!("{:.2}", vehicle.t_rel),
        MARGIN,
        MARGIN,
        STAMP_SCALE,
        OVERLAY_YELLOW,
    );
    overlay::draw_text(
        &mut canvas,
        &format!("{:.2}", camera.t_rel),
        MARGIN,
        top.height + MARGIN,
        STAMP_SCALE,
        OVERLAY_YELLOW,
    );

    // The telemetry block lands in the padding beside the narrower frame.
    let (text_x, mut text_y) = if top.width < canvas_width {
        (top.width + MARGIN, MARGIN)
    } else if bottom.width < canvas_width {
        (bottom.width + MARGIN, top.height + MARGIN)
    } else {
        (MARGIN, MARGIN + overlay::line_height(STAMP_SCALE))
    };

    for (name, value) in schema.field_names().iter().zip(&telemetry.payload.values) {
        let line = match value {
            Some(v) => format!("{name}: {v:.1}"),
            None => format!("{name}: -"),
        };
        overlay::draw_text(&mut canvas, &line, text_x, text_y, TEXT_SCALE, OVERLAY_YELLOW);
        text_y += overlay::line_height(TEXT_SCALE);
    }
    if let Some(command) = &telemetry.payload.command {
        overlay::draw_text(
            &mut canvas,
            &format!("cmd: {command}"),
            text_x,
            text_y,
            TEXT_SCALE,
            OVERLAY_YELLOW,
        );
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::telemetry::FieldProbe;
    use std::sync::Arc;

    struct Probe;
    static PROBES: &[FieldProbe<Probe>] = &[FieldProbe {
        name: "height_cm",
        read: |_| Some(1.0),
    }];

    fn schema() -> TelemetrySchema {
        TelemetrySchema::from_probes(PROBES)
    }

    fn video_history(times: &[f64], width: u32, height: u32) -> Vec<Stamped<VideoFrame>> {
        times
            .iter()
            .map(|&t| Stamped::new(VideoFrame::filled(width, height, [10, 10, 10, 255]), t))
            .collect()
    }

    fn telemetry_history(times: &[f64]) -> Vec<Stamped<TelemetrySample>> {
        times
            .iter()
            .map(|&t| {
                Stamped::new(
                    TelemetrySample {
                        values: vec![Some(t * 10.0)],
                        command: None,
                    },
                    t,
                )
            })
            .collect()
    }

    /// Run the combiner into a shared in-memory encoder.
    fn run_combiner(
        vehicle: &[Stamped<VideoFrame>],
        camera: &[Stamped<VideoFrame>],
        telemetry: &[Stamped<TelemetrySample>],
        rate: f64,
    ) -> Result<(CombineReport, Vec<VideoFrame>), CombineError> {
        let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = frames.clone();

        struct SharedEncoder(Arc<parking_lot::Mutex<Vec<VideoFrame>>>);
        impl FrameEncoder for SharedEncoder {
            fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), MediaError> {
                self.0.lock().push(frame.clone());
                Ok(())
            }
            fn finish(&mut self) -> Result<(), MediaError> {
                Ok(())
            }
        }

        let combiner = Combiner::new("combined.mp4", rate);
        let report = combiner.run_with(vehicle, camera, telemetry, &schema(), move |_, _| {
            Ok(SharedEncoder(sink))
        })?;
        let frames = Arc::try_unwrap(frames)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        Ok((report, frames))
    }

    #[test]
    fn frame_count_matches_the_window_and_rate() {
        // Vehicle spans 0..2s, camera 0.5..1.5s: window is 2s.
        let vehicle = video_history(&[0.0, 1.0, 2.0], 32, 24);
        let camera = video_history(&[0.5, 1.5], 64, 48);
        let telemetry = telemetry_history(&[0.0, 1.0]);

        let (report, frames) = run_combiner(&vehicle, &camera, &telemetry, 10.0).unwrap();
        // floor((2.0 - 0.0) * 10) + 1
        assert_eq!(report.frames, 21);
        assert_eq!(frames.len(), 21);
        // Canvas: wider width, stacked heights.
        assert_eq!(frames[0].width, 64);
        assert_eq!(frames[0].height, 72);
    }

    #[test]
    fn cursor_selects_the_nearest_past_sample() {
        let history = telemetry_history(&[0.0, 5.0, 10.0]);
        let mut idx = 0;
        idx = advance(&history, idx, 7.0);
        assert_eq!(history[idx].t_rel, 5.0);

        // Cursors only move forward and clamp at the end.
        idx = advance(&history, idx, 100.0);
        assert_eq!(history[idx].t_rel, 10.0);
        idx = advance(&history, idx, 0.0);
        assert_eq!(history[idx].t_rel, 10.0);
    }

    #[test]
    fn boundary_ticks_clamp_to_first_and_last() {
        let history = video_history(&[1.0, 2.0], 8, 8);
        // A tick before the first sample stays on index 0.
        assert_eq!(advance(&history, 0, 0.25), 0);
    }

    #[test]
    fn any_empty_history_aborts_without_output() {
        let vehicle = video_history(&[0.0, 1.0], 32, 24);
        let camera = video_history(&[0.0, 1.0], 32, 24);
        let telemetry = telemetry_history(&[0.0]);

        let err = run_combiner(&[], &camera, &telemetry, 30.0).unwrap_err();
        assert!(matches!(err, CombineError::MissingInput(StreamKind::Vehicle)));

        let err = run_combiner(&vehicle, &[], &telemetry, 30.0).unwrap_err();
        assert!(matches!(err, CombineError::MissingInput(StreamKind::Camera)));

        let err = run_combiner(&vehicle, &camera, &[], 30.0).unwrap_err();
        assert!(matches!(err, CombineError::MissingInput(StreamKind::Telemetry)));
    }

    #[test]
    fn single_frame_histories_produce_one_output_frame() {
        let vehicle = video_history(&[1.0], 16, 16);
        let camera = video_history(&[1.0], 16, 16);
        let telemetry = telemetry_history(&[1.0]);

        let (report, frames) = run_combiner(&vehicle, &camera, &telemetry, 30.0).unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(report.span_s, 0.0);
    }
}
