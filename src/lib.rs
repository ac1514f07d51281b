//! buildpane - interactive build-target launcher
//!
//! Runs a build tool inside a sandbox through a pseudo-terminal, streams its
//! output into a console buffer and indexes compiler diagnostics so they can
//! be navigated once the build ends.

pub mod app;
pub mod catalog;
pub mod command;
pub mod config;
pub mod console;
pub mod core;
pub mod error;
pub mod indexer;
pub mod session;
pub mod ui;

// Re-exports
pub use app::App;
pub use catalog::{BuildTarget, CatalogEntry, TargetCatalog, TargetSource};
pub use config::Config;
pub use console::{Console, Span};
pub use core::{BuildEvent, ProcessSupervisor, PumpOutcome};
pub use error::BuildError;
pub use indexer::{DiagnosticRegion, ErrorIndexer};
pub use session::{BuildSession, BuildSummary, SelectOutcome};

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
