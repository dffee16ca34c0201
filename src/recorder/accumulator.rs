//! In-memory stream history
//!
//! Drains one channel into an append-only ordered history until the
//! sentinel arrives. Purely a buffering sink; the history becomes
//! available to the combiner once the thread is joined, so no lock guards
//! the vector.

use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::stream::{Stamped, StreamEvent, StreamKind};

/// A channel-draining history sink running on its own thread.
pub struct Accumulator<T> {
    kind: StreamKind,
    handle: JoinHandle<Vec<Stamped<T>>>,
}

impl<T: Send + 'static> Accumulator<T> {
    pub fn spawn(kind: StreamKind, rx: Receiver<StreamEvent<T>>) -> Self {
        let handle = std::thread::spawn(move || {
            let mut history = Vec::new();
            loop {
                match rx.recv() {
                    Ok(StreamEvent::Frame(item)) => history.push(item),
                    // A disconnected channel counts as end of stream.
                    Ok(StreamEvent::Eos) | Err(_) => break,
                }
            }
            tracing::debug!(stream = %kind, items = history.len(), "history complete");
            history
        });
        Self { kind, handle }
    }

    /// Wait for the sentinel and take ownership of the history.
    pub fn join(self) -> Vec<Stamped<T>> {
        match self.handle.join() {
            Ok(history) => history,
            Err(_) => {
                tracing::error!(stream = %self.kind, "accumulator thread panicked, history lost");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn preserves_arrival_order_until_sentinel() {
        let (tx, rx) = unbounded();
        let acc = Accumulator::spawn(StreamKind::Telemetry, rx);

        for i in 0..5u32 {
            tx.send(StreamEvent::Frame(Stamped::new(i, i as f64 * 0.1)))
                .unwrap();
        }
        tx.send(StreamEvent::Eos).unwrap();
        // Anything after the sentinel must not be recorded.
        let _ = tx.send(StreamEvent::Frame(Stamped::new(99, 9.9)));

        let history = acc.join();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].payload, 0);
        assert_eq!(history[4].payload, 4);
        for pair in history.windows(2) {
            assert!(pair[1].t_rel >= pair[0].t_rel);
        }
    }

    #[test]
    fn disconnected_channel_terminates_the_sink() {
        let (tx, rx) = unbounded();
        let acc = Accumulator::spawn(StreamKind::Vehicle, rx);
        tx.send(StreamEvent::Frame(Stamped::new(1u8, 0.0))).unwrap();
        drop(tx);
        assert_eq!(acc.join().len(), 1);
    }
}
