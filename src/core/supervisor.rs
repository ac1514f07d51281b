//! Process supervisor - owns the one build process a session may run
//!
//! Every build gets a dedicated reader thread that runs its [`OutputPump`];
//! all pumps feed the same event channel, tagged with their build id.

use super::events::{BuildEvent, PumpOutcome};
use super::pty::ProcessHandle;
use super::pump::OutputPump;
use crate::error::BuildError;
use std::fmt;
use tokio::sync::mpsc;

/// Lifecycle of the supervised build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Runs at most one build process at a time
pub struct ProcessSupervisor {
    active: Option<ProcessHandle>,
    // Finished builds whose process outlived its output stream
    lingering: Vec<ProcessHandle>,
    state: SupervisorState,
    last_build_id: u64,
    event_tx: mpsc::UnboundedSender<BuildEvent>,
}

impl ProcessSupervisor {
    /// Create a supervisor and the receiving end of its event queue
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        (
            Self {
                active: None,
                lingering: Vec::new(),
                state: SupervisorState::Idle,
                last_build_id: 0,
                event_tx: tx,
            },
            rx,
        )
    }

    /// Terminate any previous build, then spawn `argv` and start pumping
    /// its output. Returns the new build id.
    pub fn start(&mut self, argv: &[String]) -> Result<u64, BuildError> {
        self.terminate_active();
        self.reap_lingering();
        self.state = SupervisorState::Idle;

        self.last_build_id += 1;
        let build_id = self.last_build_id;

        let (mut handle, reader) = ProcessHandle::spawn(build_id, argv)?;
        let pump = OutputPump::new(build_id, reader, handle.killed_flag());
        let exit_watch = handle.exit_watch();
        let mut event_tx = self.event_tx.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("build-{}-output", build_id))
            .spawn(move || {
                pump.run(&mut event_tx, || exit_watch.wait());
            });

        if let Err(e) = spawned {
            handle.terminate();
            return Err(BuildError::spawn(argv, e));
        }

        self.active = Some(handle);
        self.state = SupervisorState::Running;
        Ok(build_id)
    }

    /// Ask the running build to stop. The pump reports `Cancelled` once the
    /// stream closes.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.as_mut() {
            log::info!("Cancelling build {}", handle.build_id);
            handle.request_termination();
        }
    }

    /// True while a build exists whose exit has not been observed
    pub fn is_running(&mut self) -> bool {
        self.reap_lingering();
        self.active
            .as_mut()
            .map(|handle| !handle.has_exited())
            .unwrap_or(false)
    }

    /// Record the end of a build's stream. Returns the exit code when known.
    ///
    /// `exit_code` comes from the reader thread. Without it the process is
    /// polled once; a process still running is hung up and reaped later.
    pub fn finish(
        &mut self,
        build_id: u64,
        outcome: PumpOutcome,
        exit_code: Option<u32>,
    ) -> Option<u32> {
        if self.active_build() != Some(build_id) {
            return None;
        }
        let mut handle = self.active.take()?;
        let exit_code = exit_code.or_else(|| handle.poll_exit());

        self.state = match outcome {
            PumpOutcome::Cancelled => SupervisorState::Cancelled,
            PumpOutcome::Finished | PumpOutcome::DecodeFailed => SupervisorState::Completed,
        };
        log::info!(
            "Build {} {} (exit: {:?})",
            build_id,
            self.state,
            exit_code
        );

        if exit_code.is_none() {
            handle.hang_up();
            self.lingering.push(handle);
        }
        exit_code
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Build id of the active process, if any
    pub fn active_build(&self) -> Option<u64> {
        self.active.as_ref().map(|h| h.build_id)
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.active.as_ref().and_then(|h| h.process_id())
    }

    /// Kill and reap the active build and any lingering process
    pub fn shutdown(&mut self) {
        self.terminate_active();
        for mut handle in self.lingering.drain(..) {
            handle.terminate();
        }
    }

    fn terminate_active(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.terminate();
            self.state = SupervisorState::Cancelled;
        }
    }

    fn reap_lingering(&mut self) {
        self.lingering.retain_mut(|handle| !handle.has_exited());
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
