//! Stream plumbing shared by sources and sinks
//!
//! Defines the timestamped item wrapper, the end-of-stream sentinel, the
//! fan-out used by every source, and the session-owned context (epoch +
//! cancellation) passed to every component at construction.

pub mod channel;
pub mod context;

pub use channel::{Outputs, Stamped, StreamEvent, StreamKind};
pub use context::{SessionContext, ShutdownFlag};
