//! Stream channels and fan-out
//!
//! Every source delivers each logical item to N independently-draining
//! consumer channels; the end-of-stream sentinel travels through the same
//! channels, so a consumer can never be left blocked after its producer
//! terminates.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// A payload stamped with seconds elapsed since the session epoch.
///
/// `t_rel` is relative time, not wall clock. Within one stream consecutive
/// values are non-decreasing; across streams no ordering holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub payload: T,
    pub t_rel: f64,
}

impl<T> Stamped<T> {
    pub fn new(payload: T, t_rel: f64) -> Self {
        Self { payload, t_rel }
    }
}

/// One item on a stream channel.
#[derive(Debug, Clone)]
pub enum StreamEvent<T> {
    /// A captured item.
    Frame(Stamped<T>),
    /// End of stream, pushed exactly once per channel after the producing
    /// source terminates (normally or on failure).
    Eos,
}

/// Which of the session's streams an item or diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// The vehicle's onboard video feed.
    Vehicle,
    /// The auxiliary ground camera.
    Camera,
    /// The telemetry poller.
    Telemetry,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Vehicle => "vehicle",
            StreamKind::Camera => "camera",
            StreamKind::Telemetry => "telemetry",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fan-out side of a source.
///
/// Consumers attach before the source starts; each gets its own channel and
/// a clone of every logical item. Sends never block (channels are
/// unbounded), so a slow consumer cannot stall the capture loop.
pub struct Outputs<T> {
    senders: Vec<Sender<StreamEvent<T>>>,
    finished: bool,
}

impl<T: Clone> Outputs<T> {
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
            finished: false,
        }
    }

    /// Attach a new consumer and hand back its receiving end.
    pub fn attach(&mut self) -> Receiver<StreamEvent<T>> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    /// Attach a consumer that already holds the receiving end.
    pub fn attach_sender(&mut self, tx: Sender<StreamEvent<T>>) {
        self.senders.push(tx);
    }

    pub fn consumer_count(&self) -> usize {
        self.senders.len()
    }

    /// Deliver one item to every attached consumer.
    pub fn send(&self, item: Stamped<T>) {
        for tx in &self.senders {
            if tx.send(StreamEvent::Frame(item.clone())).is_err() {
                tracing::debug!("stream consumer went away, dropping item");
            }
        }
    }

    /// Push the sentinel to every channel. Safe to call once; later calls
    /// (including the one from `Drop`) are no-ops.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        for tx in &self.senders {
            let _ = tx.send(StreamEvent::Eos);
        }
    }
}

impl<T: Clone> Default for Outputs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Outputs<T> {
    fn drop(&mut self) {
        // A loop that exits without finishing (early return, panic unwind)
        // must still release its consumers.
        if !self.finished {
            for tx in &self.senders {
                let _ = tx.send(StreamEvent::Eos);
            }
        }
    }
}
