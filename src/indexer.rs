//! Diagnostic indexer - finds compiler error/warning lines in console text
//!
//! Lines look like `INFO <path>:<line>:<col>: [fatal ]<error|warning>: <message>`.
//! Anything else is simply not indexed.

use crate::console::{Console, Span};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Region category that diagnostic lines are tagged with
pub const ERRORS_CATEGORY: &str = "errors";

const DIAGNOSTIC_PATTERN: &str =
    r"^INFO *(.*[^:]):(\d+):(\d+): (?:(fatal) )?(error|warning): (.+)$";
const DIAGNOSTIC_PATTERN_ANY_CASE: &str =
    r"^INFO *(.*[^:]):(\d+):(\d+): (?:(fatal) )?((?i:error|warning)): (.+)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// One parsed diagnostic line and where it sits in the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRegion {
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub fatal: bool,
    pub message: String,
    pub span: Span,
}

impl DiagnosticRegion {
    /// Relative paths are taken relative to the build's result directory
    pub fn resolve(&self, base_dir: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

/// Error and warning totals for a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    pub errors: usize,
    pub warnings: usize,
}

impl DiagnosticCounts {
    pub fn from_regions(regions: &[DiagnosticRegion]) -> Self {
        regions.iter().fold(Self::default(), |mut counts, region| {
            match region.severity {
                Severity::Error => counts.errors += 1,
                Severity::Warning => counts.warnings += 1,
            }
            counts
        })
    }
}

/// Scans finished console output for diagnostic lines
pub struct ErrorIndexer {
    pattern: Regex,
}

impl ErrorIndexer {
    /// Case-sensitive `error`/`warning` matching
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(DIAGNOSTIC_PATTERN).expect("diagnostic pattern is valid"),
        }
    }

    /// Accepts `Error:`, `WARNING:` and other casings of the severity token
    pub fn ignoring_severity_case() -> Self {
        Self {
            pattern: Regex::new(DIAGNOSTIC_PATTERN_ANY_CASE)
                .expect("diagnostic pattern is valid"),
        }
    }

    /// Every diagnostic line in `text`, in order
    pub fn scan(&self, text: &str) -> Vec<DiagnosticRegion> {
        let mut regions = Vec::new();
        let mut offset = 0;

        for raw in text.split_inclusive('\n') {
            let start = offset;
            offset += raw.len();

            let line = raw.trim_end_matches('\n').trim_end_matches('\r');
            if let Some(region) = self.parse_line(line, start) {
                regions.push(region);
            }
        }

        regions
    }

    /// Scan the console and tag diagnostic lines under [`ERRORS_CATEGORY`]
    pub fn index(&self, console: &Console) -> Vec<DiagnosticRegion> {
        let regions = self.scan(&console.text());
        console.set_regions(ERRORS_CATEGORY, regions.iter().map(|r| r.span).collect());

        log::info!("Indexed {} diagnostic lines", regions.len());
        regions
    }

    fn parse_line(&self, line: &str, start: usize) -> Option<DiagnosticRegion> {
        let caps = self.pattern.captures(line)?;

        let severity = if caps[5].eq_ignore_ascii_case("error") {
            Severity::Error
        } else {
            Severity::Warning
        };

        Some(DiagnosticRegion {
            path: caps[1].to_string(),
            line: caps[2].parse().ok()?,
            column: caps[3].parse().ok()?,
            severity,
            fatal: caps.get(4).is_some(),
            message: caps[6].to_string(),
            span: Span::new(start, start + line.len()),
        })
    }
}

impl Default for ErrorIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// First span starting after `offset`, wrapping to the first one
pub fn next_after(spans: &[Span], offset: usize) -> Option<Span> {
    spans
        .iter()
        .find(|span| span.start > offset)
        .or_else(|| spans.first())
        .copied()
}

/// Last span starting before `offset`, wrapping to the last one
pub fn previous_before(spans: &[Span], offset: usize) -> Option<Span> {
    spans
        .iter()
        .rev()
        .find(|span| span.start < offset)
        .or_else(|| spans.last())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "Starting build for linux-x64-light\n\
        INFO Compiling src/foo.cc\n\
        INFO src/foo.cc:12:5: error: bad thing\n\
        INFO   src/bar.cc:1:1: warning: meh\r\n\
        \n[Finished]";

    #[test]
    fn test_two_diagnostics() {
        let regions = ErrorIndexer::new().scan(OUTPUT);
        assert_eq!(regions.len(), 2);

        let error = &regions[0];
        assert_eq!(error.path, "src/foo.cc");
        assert_eq!((error.line, error.column), (12, 5));
        assert_eq!(error.severity, Severity::Error);
        assert!(!error.fatal);
        assert_eq!(error.message, "bad thing");
        assert_eq!(
            &OUTPUT[error.span.start..error.span.end],
            "INFO src/foo.cc:12:5: error: bad thing"
        );

        let warning = &regions[1];
        assert_eq!(warning.path, "src/bar.cc");
        assert_eq!((warning.line, warning.column), (1, 1));
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(
            &OUTPUT[warning.span.start..warning.span.end],
            "INFO   src/bar.cc:1:1: warning: meh"
        );

        let counts = DiagnosticCounts::from_regions(&regions);
        assert_eq!(counts, DiagnosticCounts { errors: 1, warnings: 1 });
    }

    #[test]
    fn test_clean_build_has_no_regions() {
        let regions = ErrorIndexer::new().scan("INFO all good\n\n[Finished]");
        assert!(regions.is_empty());
        assert!(ErrorIndexer::new().scan("").is_empty());
    }

    #[test]
    fn test_fatal_error() {
        let regions = ErrorIndexer::new()
            .scan("INFO /host/chip/src/a.h:3:10: fatal error: 'b.h' file not found");
        assert_eq!(regions.len(), 1);
        assert!(regions[0].fatal);
        assert_eq!(regions[0].severity, Severity::Error);
        assert_eq!(regions[0].message, "'b.h' file not found");
    }

    #[test]
    fn test_case_sensitive_by_default() {
        let line = "INFO src/a.cc:1:2: Error: shouty";
        assert!(ErrorIndexer::new().scan(line).is_empty());

        let regions = ErrorIndexer::ignoring_severity_case().scan(line);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].severity, Severity::Error);
    }

    #[test]
    fn test_near_misses_are_ignored() {
        let text = "src/a.cc:1:2: error: no INFO prefix\n\
                    INFO src/a.cc:1: error: no column\n\
                    INFO src/a.cc:x:2: error: bad line\n\
                    INFO src/a.cc:1:2: note: not a severity\n";
        assert!(ErrorIndexer::new().scan(text).is_empty());
    }

    #[test]
    fn test_index_tags_console() {
        let console = Console::default();
        console.write(OUTPUT);

        let regions = ErrorIndexer::new().index(&console);
        let spans = console.regions(ERRORS_CATEGORY);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans, regions.iter().map(|r| r.span).collect::<Vec<_>>());
    }

    #[test]
    fn test_resolve_relative_path() {
        let region = &ErrorIndexer::new().scan("INFO ../../src/foo.cc:12:5: error: bad")[0];
        assert_eq!(
            region.resolve(Path::new("/home/dev/chip/out/fake")),
            PathBuf::from("/home/dev/chip/out/fake/../../src/foo.cc")
        );

        let absolute = &ErrorIndexer::new().scan("INFO /abs/x.cc:1:1: warning: w")[0];
        assert_eq!(absolute.resolve(Path::new("/base")), PathBuf::from("/abs/x.cc"));
    }

    #[test]
    fn test_navigation_wraps() {
        let spans = vec![Span::new(10, 20), Span::new(30, 40), Span::new(50, 60)];

        assert_eq!(next_after(&spans, 0), Some(spans[0]));
        assert_eq!(next_after(&spans, 10), Some(spans[1]));
        assert_eq!(next_after(&spans, 50), Some(spans[0]));

        assert_eq!(previous_before(&spans, 50), Some(spans[1]));
        assert_eq!(previous_before(&spans, 10), Some(spans[2]));

        assert_eq!(next_after(&[], 0), None);
        assert_eq!(previous_before(&[], 0), None);
    }
}
