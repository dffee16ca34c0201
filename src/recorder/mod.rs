//! Recording system module
//!
//! Implements the session side of the architecture:
//! - Accumulators buffering per-stream histories for the combiner
//! - Writers persisting each stream incrementally
//! - FlightSession orchestrating lifecycle, shutdown and the final merge

pub mod accumulator;
pub mod session;
pub mod state;
pub mod writer;

pub use accumulator::Accumulator;
pub use session::{ActiveFlight, FlightSession};
pub use state::{FlightReport, SessionConfig, SessionError, SessionEvent, SessionState};
pub use writer::{spawn_telemetry_writer, spawn_video_writer, WriteError, WriteReport, WriterHandle};
