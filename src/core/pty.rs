//! PTY process handle - spawn a build and control its lifetime
//!
//! The child runs on a pseudo-terminal so stdout and stderr arrive merged,
//! in the order the process wrote them.

use crate::error::BuildError;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const REAP_GRACE: Duration = Duration::from_millis(500);
const REAP_POLL: Duration = Duration::from_millis(10);

/// Output stream of a spawned process
pub type OutputReader = Box<dyn Read + Send>;

/// The child and its exit code once observed
struct ChildState {
    child: Box<dyn Child + Send + Sync>,
    exit_code: Option<u32>,
}

impl ChildState {
    /// Exit code if the process has exited. Never blocks.
    fn poll(&mut self, build_id: u64) -> Option<u32> {
        if self.exit_code.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit_code = Some(status.exit_code()),
                Ok(None) => {}
                Err(e) => log::warn!("Build {} status unavailable: {}", build_id, e),
            }
        }
        self.exit_code
    }
}

type SharedChild = Arc<Mutex<ChildState>>;

fn lock(child: &SharedChild) -> MutexGuard<'_, ChildState> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Waits for a build's exit status off the controlling thread
#[derive(Clone)]
pub struct ExitWatch {
    build_id: u64,
    child: SharedChild,
}

impl ExitWatch {
    /// Poll for the exit status once the output stream has closed.
    ///
    /// The terminal closes slightly before the exit status becomes available,
    /// so this retries for a short grace period. Returns `None` for a process
    /// that closed its output but kept running.
    pub fn wait(&self) -> Option<u32> {
        let deadline = Instant::now() + REAP_GRACE;
        loop {
            if let Some(code) = lock(&self.child).poll(self.build_id) {
                return Some(code);
            }
            if Instant::now() >= deadline {
                log::debug!("Build {} still running after its output closed", self.build_id);
                return None;
            }
            std::thread::sleep(REAP_POLL);
        }
    }
}

/// Handle for a single running build process
pub struct ProcessHandle {
    pub build_id: u64,
    pid: Option<u32>,
    child: SharedChild,
    killer: Box<dyn ChildKiller + Send + Sync>,
    // Dropping the master hangs up the child, so it lives as long as the handle
    _master: Box<dyn MasterPty + Send>,
    killed: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Spawn `argv` on a fresh PTY, returning the handle and its output stream
    pub fn spawn(build_id: u64, argv: &[String]) -> Result<(Self, OutputReader), BuildError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(BuildError::spawn(argv, "empty command"));
        };

        log::info!("Spawning build {}: {}", build_id, argv.join(" "));

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        // Plain text only: the console does not interpret escape sequences
        cmd.env("TERM", "dumb");
        cmd.env("NO_COLOR", "1");

        let pty_size = PtySize {
            rows: 24,
            cols: 160,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = native_pty_system()
            .openpty(pty_size)
            .map_err(|e| BuildError::spawn(argv, e))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BuildError::spawn(argv, e))?;
        drop(pair.slave); // EOF on the master once the child side closes

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BuildError::spawn(argv, e))?;

        let killer = child.clone_killer();
        let pid = child.process_id();

        Ok((
            Self {
                build_id,
                pid,
                child: Arc::new(Mutex::new(ChildState {
                    child,
                    exit_code: None,
                })),
                killer,
                _master: pair.master,
                killed: Arc::new(AtomicBool::new(false)),
            },
            reader,
        ))
    }

    /// Shared cancellation flag, read by the output pump at end of stream
    pub fn killed_flag(&self) -> Arc<AtomicBool> {
        self.killed.clone()
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status watcher for the reader thread
    pub fn exit_watch(&self) -> ExitWatch {
        ExitWatch {
            build_id: self.build_id,
            child: self.child.clone(),
        }
    }

    /// Mark as killed and signal the process. Returns without waiting.
    pub fn request_termination(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        if let Err(e) = self.killer.kill() {
            // Already gone
            log::debug!("Build {} termination signal failed: {}", self.build_id, e);
        }
    }

    /// Signal a process that outlived its output. Unlike
    /// [`request_termination`](Self::request_termination) this is not a
    /// cancellation, so the killed flag is left alone.
    pub fn hang_up(&mut self) {
        if let Err(e) = self.killer.kill() {
            log::debug!("Build {} hang up failed: {}", self.build_id, e);
        }
    }

    /// Kill and reap the process. A process that already exited is fine.
    pub fn terminate(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        let mut state = lock(&self.child);
        if state.poll(self.build_id).is_some() {
            return;
        }

        if let Err(e) = state.child.kill() {
            log::debug!("Build {} kill failed: {}", self.build_id, e);
        }
        match state.child.wait() {
            Ok(status) => state.exit_code = Some(status.exit_code()),
            Err(e) => log::warn!("Build {} could not be reaped: {}", self.build_id, e),
        }
        log::info!("Terminated build {}", self.build_id);
    }

    /// Exit code if the process has exited. Never blocks.
    pub fn poll_exit(&mut self) -> Option<u32> {
        lock(&self.child).poll(self.build_id)
    }

    pub fn has_exited(&mut self) -> bool {
        self.poll_exit().is_some()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("build_id", &self.build_id)
            .field("pid", &self.pid)
            .field("killed", &self.was_killed())
            .field("exit_code", &lock(&self.child).exit_code)
            .finish()
    }
}
