//! Build events - the single ordered queue between the pump and the console

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// How a build's output stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PumpOutcome {
    Finished,
    Cancelled,
    DecodeFailed,
}

impl fmt::Display for PumpOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "Finished"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::DecodeFailed => write!(f, "Decode failed"),
        }
    }
}

/// Event sent from a build's pump to whoever owns the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Output { build_id: u64, text: String },
    /// Always the last event of a build. `exit_code` is `None` when the
    /// process was still running, or not waited for, when its stream ended.
    Closed {
        build_id: u64,
        outcome: PumpOutcome,
        exit_code: Option<u32>,
    },
}

impl BuildEvent {
    pub fn build_id(&self) -> u64 {
        match self {
            Self::Output { build_id, .. } | Self::Closed { build_id, .. } => *build_id,
        }
    }
}

/// Destination for pump events, delivered in submission order
pub trait EventSink {
    fn emit(&mut self, event: BuildEvent);
}

impl EventSink for mpsc::UnboundedSender<BuildEvent> {
    fn emit(&mut self, event: BuildEvent) {
        if self.send(event).is_err() {
            log::debug!("Event receiver dropped, discarding build output");
        }
    }
}

impl EventSink for Vec<BuildEvent> {
    fn emit(&mut self, event: BuildEvent) {
        self.push(event);
    }
}
