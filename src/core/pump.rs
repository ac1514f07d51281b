//! Output pump - drains a process stream and forwards decoded text in order
//!
//! Reads are bounded at [`CHUNK_SIZE`]. A read that fills the whole chunk is
//! not decoded yet since more data is likely pending. An incomplete UTF-8
//! sequence at the end of the buffer is carried into the next read, so a
//! character split across reads still decodes cleanly.

use super::events::{BuildEvent, EventSink, PumpOutcome};
use crate::error::BuildError;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Upper bound of a single read
pub const CHUNK_SIZE: usize = 8192;

/// Result of one read from the stream
#[derive(Debug)]
enum ReadStatus {
    /// Bytes were appended; `full` when the whole chunk was filled
    Data { full: bool },
    /// Clean end of stream
    End,
    /// Read error; handled exactly like `End`
    Failed(std::io::Error),
}

/// Drains one build's output stream
pub struct OutputPump<R> {
    build_id: u64,
    reader: R,
    killed: Arc<AtomicBool>,
    out: Vec<u8>,
}

impl<R: Read> OutputPump<R> {
    pub fn new(build_id: u64, reader: R, killed: Arc<AtomicBool>) -> Self {
        Self {
            build_id,
            reader,
            killed,
            out: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    /// Run until end of stream or a decode failure. Blocks on reads.
    ///
    /// After a clean end of stream `exit_status` is called on this thread to
    /// collect the process exit code for the `Closed` event.
    pub fn run<S, F>(mut self, sink: &mut S, exit_status: F) -> PumpOutcome
    where
        S: EventSink,
        F: FnOnce() -> Option<u32>,
    {
        log::debug!("Build {} output pump starting", self.build_id);

        let outcome = loop {
            match self.read_chunk() {
                ReadStatus::Data { full: true } => continue,
                ReadStatus::Data { full: false } => {
                    if let Err(e) = self.forward_decoded(sink) {
                        break self.fail(sink, e);
                    }
                }
                status @ (ReadStatus::End | ReadStatus::Failed(_)) => {
                    if let ReadStatus::Failed(e) = status {
                        // A PTY master reports EIO once the child side is gone
                        log::debug!("Build {} read ended with error: {}", self.build_id, e);
                    }
                    if let Err(e) = self.forward_decoded(sink) {
                        break self.fail(sink, e);
                    }
                    if !self.out.is_empty() {
                        let e = BuildError::Decode(format!(
                            "incomplete utf-8 sequence of {} bytes at end of stream",
                            self.out.len()
                        ));
                        break self.fail(sink, e);
                    }
                    break self.close(sink, exit_status);
                }
            }
        };

        log::debug!("Build {} output pump completed: {}", self.build_id, outcome);
        outcome
    }

    fn read_chunk(&mut self) -> ReadStatus {
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return ReadStatus::End,
                Ok(n) => {
                    self.out.extend_from_slice(&buf[..n]);
                    return ReadStatus::Data {
                        full: n == CHUNK_SIZE,
                    };
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return ReadStatus::Failed(e),
            }
        }
    }

    /// Forward the longest valid prefix of `out`, keeping an incomplete tail
    fn forward_decoded<S: EventSink>(&mut self, sink: &mut S) -> Result<(), BuildError> {
        if self.out.is_empty() {
            return Ok(());
        }

        let valid = match std::str::from_utf8(&self.out) {
            Ok(_) => self.out.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(BuildError::Decode(e.to_string())),
        };

        if valid > 0 {
            let rest = self.out.split_off(valid);
            let bytes = std::mem::replace(&mut self.out, rest);
            // Validated above
            let text = String::from_utf8(bytes).map_err(|e| BuildError::Decode(e.to_string()))?;
            sink.emit(BuildEvent::Output {
                build_id: self.build_id,
                text,
            });
        }
        Ok(())
    }

    fn fail<S: EventSink>(&mut self, sink: &mut S, err: BuildError) -> PumpOutcome {
        log::warn!("Build {} output rejected: {}", self.build_id, err);
        self.out.clear();
        sink.emit(BuildEvent::Output {
            build_id: self.build_id,
            text: err.to_string(),
        });
        // The process may still be writing; the supervisor deals with it
        sink.emit(BuildEvent::Closed {
            build_id: self.build_id,
            outcome: PumpOutcome::DecodeFailed,
            exit_code: None,
        });
        PumpOutcome::DecodeFailed
    }

    fn close<S, F>(&mut self, sink: &mut S, exit_status: F) -> PumpOutcome
    where
        S: EventSink,
        F: FnOnce() -> Option<u32>,
    {
        let outcome = if self.killed.load(Ordering::SeqCst) {
            PumpOutcome::Cancelled
        } else {
            PumpOutcome::Finished
        };
        sink.emit(BuildEvent::Output {
            build_id: self.build_id,
            text: format!("\n[{}]", outcome),
        });
        sink.emit(BuildEvent::Closed {
            build_id: self.build_id,
            outcome,
            exit_code: exit_status(),
        });
        outcome
    }
}
