//! Core engine - PTY processes, output pumping, build supervision

mod events;
mod pty;
mod pump;
mod supervisor;

pub use events::{BuildEvent, EventSink, PumpOutcome};
pub use pty::{ExitWatch, OutputReader, ProcessHandle};
pub use pump::{OutputPump, CHUNK_SIZE};
pub use supervisor::{ProcessSupervisor, SupervisorState};
