//! Video stream source
//!
//! One dedicated thread per video input. The loop takes one blocking read
//! from the capture handle per iteration, rate-limits by discarding frames
//! that arrive early, stamps retained frames against the session epoch and
//! fans them out to every attached consumer.

use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::traits::{StreamConfig, VideoCapture, VideoFrame};
use crate::stream::{Outputs, SessionContext, Stamped, StreamEvent};

/// A capture-driven producer of timestamped video frames.
///
/// Consumers attach before `spawn`; the type system enforces this because
/// `spawn` consumes the source.
pub struct VideoSource {
    config: StreamConfig,
    capture: Box<dyn VideoCapture>,
    outputs: Outputs<VideoFrame>,
}

impl VideoSource {
    pub fn new(config: StreamConfig, capture: Box<dyn VideoCapture>) -> Self {
        Self {
            config,
            capture,
            outputs: Outputs::new(),
        }
    }

    /// Attach a consumer and get its channel.
    pub fn attach(&mut self) -> Receiver<StreamEvent<VideoFrame>> {
        self.outputs.attach()
    }

    /// Attach a consumer that already holds the receiving end (live taps).
    pub fn attach_sender(&mut self, tx: Sender<StreamEvent<VideoFrame>>) {
        self.outputs.attach_sender(tx);
    }

    /// Start the capture thread.
    pub fn spawn(self, ctx: SessionContext) -> JoinHandle<()> {
        std::thread::spawn(move || self.run(ctx))
    }

    fn run(mut self, ctx: SessionContext) {
        let kind = self.config.kind;
        let period = self.config.period();
        let mut next_due = Instant::now() + period;
        let mut delivered = 0u64;
        let mut dropped = 0u64;

        tracing::info!(
            stream = %kind,
            rate_hz = self.config.target_rate_hz,
            consumers = self.outputs.consumer_count(),
            "video source started"
        );

        while !ctx.is_cancelled() {
            let frame = match self.capture.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    // Soft failure: this stream ends, siblings keep running.
                    tracing::warn!(stream = %kind, error = %e, "capture read failed, stopping stream");
                    break;
                }
            };

            let now = Instant::now();
            if now < next_due {
                // Rate limiting by dropping, not by sleeping.
                dropped += 1;
                continue;
            }
            next_due = now + period;

            self.outputs.send(Stamped::new(frame, ctx.elapsed()));
            delivered += 1;
        }

        self.outputs.finish();
        tracing::info!(
            stream = %kind,
            delivered,
            dropped,
            "video source stopped"
        );
        // The capture handle is dropped here, releasing the device on
        // every exit path.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::CaptureError;
    use crate::stream::StreamKind;
    use std::time::Duration;

    /// Delivers solid frames at a fixed native pace, failing after a limit.
    struct PacedCapture {
        frames_left: u32,
        pace: Duration,
    }

    impl VideoCapture for PacedCapture {
        fn read_frame(&mut self) -> Result<VideoFrame, CaptureError> {
            if self.frames_left == 0 {
                return Err(CaptureError::Ended);
            }
            self.frames_left -= 1;
            std::thread::sleep(self.pace);
            Ok(VideoFrame::filled(8, 8, [9, 9, 9, 255]))
        }
    }

    fn drain(rx: Receiver<StreamEvent<VideoFrame>>) -> Vec<Stamped<VideoFrame>> {
        let mut items = Vec::new();
        while let Ok(ev) = rx.recv() {
            match ev {
                StreamEvent::Frame(item) => items.push(item),
                StreamEvent::Eos => break,
            }
        }
        items
    }

    #[test]
    fn read_failure_ends_stream_with_sentinel() {
        let capture = PacedCapture {
            frames_left: 3,
            pace: Duration::from_millis(1),
        };
        let mut source = VideoSource::new(
            StreamConfig::new(StreamKind::Vehicle, 1000.0),
            Box::new(capture),
        );
        let rx = source.attach();
        let handle = source.spawn(SessionContext::new());

        let items = drain(rx);
        handle.join().unwrap();
        assert!(items.len() <= 3);
    }

    #[test]
    fn timestamps_are_non_decreasing_and_fanout_matches() {
        let capture = PacedCapture {
            frames_left: 20,
            pace: Duration::from_millis(2),
        };
        let mut source = VideoSource::new(
            StreamConfig::new(StreamKind::Camera, 1000.0),
            Box::new(capture),
        );
        let a = source.attach();
        let b = source.attach();
        let handle = source.spawn(SessionContext::new());

        let got_a = drain(a);
        let got_b = drain(b);
        handle.join().unwrap();

        assert_eq!(got_a, got_b);
        for pair in got_a.windows(2) {
            assert!(pair[1].t_rel >= pair[0].t_rel);
        }
    }

    #[test]
    fn early_frames_are_dropped_to_hold_the_target_rate() {
        // Native pace ~2ms (500 Hz), target 50 Hz over ~100ms of frames.
        let capture = PacedCapture {
            frames_left: 50,
            pace: Duration::from_millis(2),
        };
        let mut source = VideoSource::new(
            StreamConfig::new(StreamKind::Vehicle, 50.0),
            Box::new(capture),
        );
        let rx = source.attach();
        let handle = source.spawn(SessionContext::new());

        let items = drain(rx);
        handle.join().unwrap();
        // 50 reads at 500 Hz span ~100ms; at 50 Hz that is ~5 retained
        // frames. Leave generous slack for scheduler jitter.
        assert!(items.len() < 20, "expected heavy dropping, got {}", items.len());
    }
}
