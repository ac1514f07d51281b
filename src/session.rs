//! Build session - everything one launcher window owns
//!
//! Holds the target catalog, the supervisor with its single build process,
//! the console of the current build and the persisted selection/history.
//! Build events are applied here, on whichever thread owns the session.

use crate::catalog::{
    BuildTarget, CatalogEntry, CommandSource, Selection, TargetCatalog, TargetSource,
};
use crate::command::CommandBuilder;
use crate::config::Config;
use crate::console::Console;
use crate::core::{BuildEvent, ProcessSupervisor, PumpOutcome};
use crate::error::BuildError;
use crate::indexer::{DiagnosticCounts, DiagnosticRegion, ErrorIndexer};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

const MAX_RUNS: usize = 50;

/// A single build run, as remembered across launches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRun {
    pub target: String,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub outcome: Option<PumpOutcome>,
    pub exit_code: Option<u32>,
    #[serde(default)]
    pub diagnostics: DiagnosticCounts,
}

/// Persisted session state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub last_target: Option<String>,
    #[serde(default)]
    pub runs: Vec<BuildRun>,
}

impl SessionState {
    /// Load state, falling back to empty state when missing or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str(&content)?))
        {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Ignoring unreadable session state {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn start_run(&mut self, target: &str) {
        self.runs.push(BuildRun {
            target: target.to_string(),
            started: Utc::now(),
            ended: None,
            outcome: None,
            exit_code: None,
            diagnostics: DiagnosticCounts::default(),
        });

        if self.runs.len() > MAX_RUNS {
            let excess = self.runs.len() - MAX_RUNS;
            self.runs.drain(..excess);
        }
    }

    fn end_run(&mut self, outcome: PumpOutcome, exit_code: Option<u32>, counts: DiagnosticCounts) {
        if let Some(run) = self.runs.last_mut() {
            run.ended = Some(Utc::now());
            run.outcome = Some(outcome);
            run.exit_code = exit_code;
            run.diagnostics = counts;
        }
    }
}

/// What happened when an entry was picked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Started { build_id: u64, target: BuildTarget },
    Recomputed(Vec<CatalogEntry>),
}

/// Summary of a completed build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub build_id: u64,
    pub target: String,
    pub outcome: PumpOutcome,
    pub exit_code: Option<u32>,
    pub counts: DiagnosticCounts,
}

impl BuildSummary {
    /// A clean finish with no error diagnostics
    pub fn succeeded(&self) -> bool {
        self.outcome == PumpOutcome::Finished && self.counts.errors == 0
    }
}

#[derive(Debug, Clone)]
struct CurrentBuild {
    build_id: u64,
    target: String,
}

/// The explicit session object passed to every operation
pub struct BuildSession {
    config: Config,
    commands: CommandBuilder,
    catalog: TargetCatalog,
    supervisor: ProcessSupervisor,
    indexer: ErrorIndexer,
    console: Console,
    current: Option<CurrentBuild>,
    diagnostics: Vec<DiagnosticRegion>,
    state: SessionState,
    state_path: PathBuf,
}

impl BuildSession {
    /// Session that discovers targets with the configured discovery command
    pub fn new(config: Config) -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let source = CommandSource::new(&CommandBuilder::new(&config));
        Self::with_source(config, Box::new(source))
    }

    pub fn with_source(
        config: Config,
        source: Box<dyn TargetSource>,
    ) -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let (supervisor, event_rx) = ProcessSupervisor::new();
        let state_path = config.state_path();
        let indexer = if config.diagnostics.ignore_severity_case {
            ErrorIndexer::ignoring_severity_case()
        } else {
            ErrorIndexer::new()
        };

        let session = Self {
            commands: CommandBuilder::new(&config),
            catalog: TargetCatalog::new(config.cache_path(), source),
            supervisor,
            indexer,
            console: Self::fresh_console(&config),
            current: None,
            diagnostics: Vec::new(),
            state: SessionState::load(&state_path),
            state_path,
            config,
        };

        (session, event_rx)
    }

    /// Catalog entries, sentinel last
    pub fn targets(&mut self) -> Result<Vec<CatalogEntry>, BuildError> {
        Ok(self.catalog.list()?.to_vec())
    }

    /// Force rediscovery of the target list
    pub fn recompute_targets(&mut self) -> Result<Vec<CatalogEntry>, BuildError> {
        self.catalog.invalidate()?;
        self.targets()
    }

    /// Position of the previously selected target in the current list
    pub fn last_selected_index(&mut self) -> Option<usize> {
        let last = self.state.last_target.clone()?;
        let entries = self.catalog.list().ok()?;
        entries.iter().position(|entry| match entry {
            CatalogEntry::Target(target) => target.name == last,
            CatalogEntry::Recompute => false,
        })
    }

    /// Act on a picked entry: build it, or recompute for the sentinel
    pub fn select(&mut self, index: usize) -> Result<SelectOutcome, BuildError> {
        match self.catalog.select(index)? {
            Selection::Build(target) => {
                let build_id = self.start_build(&target)?;
                Ok(SelectOutcome::Started { build_id, target })
            }
            Selection::Recomputed(entries) => Ok(SelectOutcome::Recomputed(entries)),
        }
    }

    /// Start a build of `target`, replacing any build still running
    pub fn start_build(&mut self, target: &BuildTarget) -> Result<u64, BuildError> {
        self.console = Self::fresh_console(&self.config);
        self.diagnostics.clear();
        self.current = None;

        self.state.last_target = Some(target.name.clone());
        self.console.write(&format!("Starting build for {}\n", target.name));

        let argv = self.commands.build_argv(target);
        match self.supervisor.start(&argv) {
            Ok(build_id) => {
                log::info!(
                    "Build {} of {} running as pid {:?}",
                    build_id,
                    target.name,
                    self.supervisor.active_pid()
                );
                self.current = Some(CurrentBuild {
                    build_id,
                    target: target.name.clone(),
                });
                self.state.start_run(&target.name);
                self.save_state();
                Ok(build_id)
            }
            Err(e) => {
                log::error!("Build of {} could not start: {}", target.name, e);
                self.console.write(&format!("{}\n", e));
                self.console.flush();
                self.save_state();
                Err(e)
            }
        }
    }

    /// Request cancellation of the running build; returns immediately
    pub fn cancel(&mut self) {
        self.supervisor.cancel();
    }

    pub fn is_running(&mut self) -> bool {
        self.supervisor.is_running()
    }

    /// Apply one event from the pump. Events of replaced builds are dropped.
    /// Returns a summary when the current build's stream closes.
    pub fn apply(&mut self, event: BuildEvent) -> Option<BuildSummary> {
        let current = self.current.as_ref()?;
        if event.build_id() != current.build_id {
            log::debug!("Dropping event from stale build {}", event.build_id());
            return None;
        }

        match event {
            BuildEvent::Output { text, .. } => {
                self.console.write(&text);
                None
            }
            BuildEvent::Closed {
                build_id,
                outcome,
                exit_code,
            } => {
                let target = current.target.clone();
                self.console.flush();
                let exit_code = self.supervisor.finish(build_id, outcome, exit_code);
                self.diagnostics = self.indexer.index(&self.console);
                let counts = DiagnosticCounts::from_regions(&self.diagnostics);

                self.state.end_run(outcome, exit_code, counts);
                self.save_state();
                self.current = None;

                Some(BuildSummary {
                    build_id,
                    target,
                    outcome,
                    exit_code,
                    counts,
                })
            }
        }
    }

    /// Build id whose events are currently being applied
    pub fn current_build(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.build_id)
    }

    pub fn current_target(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.target.as_str())
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Diagnostics of the last completed build
    pub fn diagnostics(&self) -> &[DiagnosticRegion] {
        &self.diagnostics
    }

    pub fn history(&self) -> &[BuildRun] {
        &self.state.runs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Kill any running build
    pub fn shutdown(&mut self) {
        self.supervisor.shutdown();
        self.current = None;
    }

    fn fresh_console(config: &Config) -> Console {
        Console::for_build(&config.sandbox.mapped_path, &config.sandbox.host_path)
    }

    fn save_state(&self) {
        if let Err(e) = self.state.save(&self.state_path) {
            log::warn!("Failed to save session state: {}", e);
        }
    }
}
