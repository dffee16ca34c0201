//! Pending-command slot
//!
//! The session's dispatch path records every outgoing command string here
//! so the telemetry stream can tag it into the next sample.

use std::sync::Arc;

use parking_lot::Mutex;

/// Single-writer (the session command API), single-reader (the telemetry
/// tick) pending-command slot.
///
/// Each `take` keeps only the most recently recorded command and discards
/// anything older queued in the same tick interval, so a sample reports at
/// most one command. This mirrors the flight log's historical behavior and
/// is deliberately not an audit trail.
#[derive(Debug, Clone, Default)]
pub struct CommandTap {
    pending: Arc<Mutex<Vec<String>>>,
}

impl CommandTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outgoing command.
    pub fn record(&self, command: &str) {
        self.pending.lock().push(command.to_string());
    }

    /// Pop the most recent pending command, dropping the rest.
    pub fn take(&self) -> Option<String> {
        let mut pending = self.pending.lock();
        let latest = pending.pop();
        pending.clear();
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_keeps_only_the_most_recent() {
        let tap = CommandTap::new();
        tap.record("takeoff");
        tap.record("up 50");
        tap.record("cw 90");

        assert_eq!(tap.take().as_deref(), Some("cw 90"));
        // The two older commands were discarded, not deferred.
        assert_eq!(tap.take(), None);
    }

    #[test]
    fn empty_slot_yields_none() {
        let tap = CommandTap::new();
        assert_eq!(tap.take(), None);
        tap.record("land");
        assert_eq!(tap.take().as_deref(), Some("land"));
        assert_eq!(tap.take(), None);
    }
}
