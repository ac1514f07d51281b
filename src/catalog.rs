//! Target catalog - discovers, caches and hands out build targets

use crate::command::CommandBuilder;
use crate::error::BuildError;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// Label of the sentinel entry that forces rediscovery
pub const RECOMPUTE_LABEL: &str = "RE-COMPUTE";
const RECOMPUTE_NOTE: &str = "Re-compute build targets";
const NOGLOB_MARKER: &str = " (NOGLOB";

/// A buildable unit recognized by the build tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Trigger string passed to the build tool
    pub name: String,
    pub annotation: Option<String>,
}

impl BuildTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
        }
    }

    /// Parse a catalog line, splitting off a `(NOGLOB ...)` annotation
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (name, annotation) = match raw.split_once(NOGLOB_MARKER) {
            Some((trigger, rest)) => (trigger.trim(), Some(format!("({}", rest.trim_start()))),
            None => (raw, None),
        };

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            annotation,
        })
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.annotation {
            Some(note) => write!(f, "{} {}", self.name, note),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One row of the selection list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    Target(BuildTarget),
    Recompute,
}

impl CatalogEntry {
    pub fn label(&self) -> &str {
        match self {
            Self::Target(target) => &target.name,
            Self::Recompute => RECOMPUTE_LABEL,
        }
    }

    pub fn annotation(&self) -> Option<&str> {
        match self {
            Self::Target(target) => target.annotation.as_deref(),
            Self::Recompute => Some(RECOMPUTE_NOTE),
        }
    }
}

/// Outcome of picking an entry from the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Build(BuildTarget),
    /// The sentinel was picked; holds the freshly discovered list
    Recomputed(Vec<CatalogEntry>),
}

/// Where raw target lines come from when the cache is empty
pub trait TargetSource: Send {
    fn discover(&self) -> Result<Vec<String>, BuildError>;
}

/// Runs the discovery invocation through the sandbox exec wrapper
pub struct CommandSource {
    argv: Vec<String>,
}

impl CommandSource {
    pub fn new(commands: &CommandBuilder) -> Self {
        Self {
            argv: commands.discovery_argv(),
        }
    }
}

impl TargetSource for CommandSource {
    fn discover(&self) -> Result<Vec<String>, BuildError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(BuildError::Discovery("empty discovery command".to_string()));
        };

        log::info!("Discovering build targets");
        log::debug!("Discovery command: {}", self.argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| BuildError::spawn(&self.argv, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::Discovery(format!(
                "{} ({})",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| BuildError::Discovery(format!("output is not utf-8: {}", e)))?;

        Ok(stdout.split('\n').map(str::to_string).collect())
    }
}

/// Cached list of build targets backed by a plain text file
pub struct TargetCatalog {
    cache_path: PathBuf,
    source: Box<dyn TargetSource>,
    entries: Option<Vec<CatalogEntry>>,
}

impl TargetCatalog {
    pub fn new(cache_path: impl Into<PathBuf>, source: Box<dyn TargetSource>) -> Self {
        Self {
            cache_path: cache_path.into(),
            source,
            entries: None,
        }
    }

    /// All targets followed by the recompute sentinel
    pub fn list(&mut self) -> Result<&[CatalogEntry], BuildError> {
        if self.entries.is_none() {
            if !self.cache_path.exists() {
                self.recompute()?;
            }

            let content = fs::read_to_string(&self.cache_path)?;
            let mut entries: Vec<CatalogEntry> = content
                .lines()
                .filter_map(BuildTarget::parse)
                .map(CatalogEntry::Target)
                .collect();

            log::info!("Loaded {} build targets", entries.len());
            entries.push(CatalogEntry::Recompute);
            self.entries = Some(entries);
        }

        Ok(self.entries.as_deref().unwrap_or_default())
    }

    /// Drop the cache so the next `list()` runs discovery again
    pub fn invalidate(&mut self) -> Result<(), BuildError> {
        self.entries = None;
        match fs::remove_file(&self.cache_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a picked row; the sentinel triggers rediscovery
    pub fn select(&mut self, index: usize) -> Result<Selection, BuildError> {
        let entry = self
            .list()?
            .get(index)
            .cloned()
            .ok_or(BuildError::NoSuchEntry(index))?;

        match entry {
            CatalogEntry::Target(target) => Ok(Selection::Build(target)),
            CatalogEntry::Recompute => {
                self.invalidate()?;
                Ok(Selection::Recomputed(self.list()?.to_vec()))
            }
        }
    }

    fn recompute(&self) -> Result<(), BuildError> {
        let lines = self.source.discover()?;

        if let Some(dir) = self.cache_path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut content = String::new();
        for line in &lines {
            content.push_str(line.trim_end_matches('\r'));
            content.push('\n');
        }
        fs::write(&self.cache_path, content)?;

        log::info!(
            "Cached {} target lines at {}",
            lines.len(),
            self.cache_path.display()
        );
        Ok(())
    }
}
