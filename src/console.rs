//! Console - append-only build output with tagged regions
//!
//! Every mutation takes the same lock for the whole call. The buffer stays
//! read-only except while streamed text is being appended, so manual edits
//! never interleave with build output.

use crate::error::BuildError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Byte range `[start, end)` within the console text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Text substitution applied to streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub needle: String,
    pub replacement: String,
}

impl Rewrite {
    pub fn new(needle: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            replacement: replacement.into(),
        }
    }
}

#[derive(Debug)]
struct ConsoleBuffer {
    text: String,
    // Byte offset where each line begins; always starts with 0
    line_starts: Vec<usize>,
    read_only: bool,
    regions: BTreeMap<String, Vec<Span>>,
    // Tail that may still turn into a rewrite match
    pending: String,
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self {
            text: String::new(),
            line_starts: vec![0],
            read_only: false,
            regions: BTreeMap::new(),
            pending: String::new(),
        }
    }
}

impl ConsoleBuffer {
    fn append(&mut self, text: &str) {
        let base = self.text.len();
        self.line_starts
            .extend(text.match_indices('\n').map(|(i, _)| base + i + 1));
        self.text.push_str(text);
    }

    /// Same count as `str::lines`: a trailing newline does not open a line
    fn line_count(&self) -> usize {
        if self.text.ends_with('\n') || self.text.is_empty() {
            self.line_starts.len() - 1
        } else {
            self.line_starts.len()
        }
    }

    /// Line `index` without its newline
    fn line(&self, index: usize) -> &str {
        let start = self.line_starts[index];
        let end = self
            .line_starts
            .get(index + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        &self.text[start..end]
    }
}

/// Shared handle to one build's console buffer
#[derive(Debug, Clone)]
pub struct Console {
    inner: Arc<Mutex<ConsoleBuffer>>,
    rewrites: Arc<Vec<Rewrite>>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Console {
    pub fn new(rewrites: Vec<Rewrite>) -> Self {
        let buffer = ConsoleBuffer {
            read_only: true,
            ..ConsoleBuffer::default()
        };
        Self {
            inner: Arc::new(Mutex::new(buffer)),
            rewrites: Arc::new(rewrites),
        }
    }

    /// Console for PTY output: folds `\r\n` and maps sandbox paths to host paths
    pub fn for_build(sandbox_path: &str, host_path: &str) -> Self {
        let mut rewrites = vec![Rewrite::new("\r\n", "\n")];
        if !sandbox_path.is_empty() && sandbox_path != host_path {
            rewrites.push(Rewrite::new(sandbox_path, host_path));
        }
        Self::new(rewrites)
    }

    /// Append streamed text
    pub fn write(&self, text: &str) {
        let mut buf = self.lock();
        buf.read_only = false;

        let mut input = std::mem::take(&mut buf.pending);
        input.push_str(text);
        let (ready, held) = apply_rewrites(&input, &self.rewrites);
        buf.append(&ready);
        buf.pending = input[held..].to_string();

        buf.read_only = true;
    }

    /// Append any held-back tail verbatim; call once the stream has ended
    pub fn flush(&self) {
        let mut buf = self.lock();
        if buf.pending.is_empty() {
            return;
        }
        let was_read_only = buf.read_only;
        buf.read_only = false;
        let pending = std::mem::take(&mut buf.pending);
        buf.append(&pending);
        buf.read_only = was_read_only;
    }

    /// Manual edit at the end of the buffer; rejected while read-only
    pub fn insert(&self, text: &str) -> Result<(), BuildError> {
        let mut buf = self.lock();
        if buf.read_only {
            return Err(BuildError::ReadOnly);
        }
        buf.append(text);
        Ok(())
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.lock().read_only
    }

    /// Add spans under `category`, keeping them sorted and unique
    pub fn add_regions(&self, category: &str, spans: impl IntoIterator<Item = Span>) {
        let mut buf = self.lock();
        let entry = buf.regions.entry(category.to_string()).or_default();
        entry.extend(spans);
        entry.sort();
        entry.dedup();
    }

    /// Replace every span under `category`
    pub fn set_regions(&self, category: &str, spans: Vec<Span>) {
        let mut buf = self.lock();
        if spans.is_empty() {
            buf.regions.remove(category);
        } else {
            buf.regions.insert(category.to_string(), spans);
        }
    }

    pub fn regions(&self, category: &str) -> Vec<Span> {
        self.lock()
            .regions
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    /// Text appended at or after byte `offset`
    pub fn text_from(&self, offset: usize) -> String {
        self.lock().text.get(offset..).unwrap_or_default().to_string()
    }

    pub fn len(&self) -> usize {
        self.lock().text.len()
    }

    pub fn line_count(&self) -> usize {
        self.lock().line_count()
    }

    /// Up to `count` lines starting at line `first`, each with the byte
    /// offset where it begins
    pub fn lines(&self, first: usize, count: usize) -> Vec<(usize, String)> {
        let buf = self.lock();
        let end = buf.line_count().min(first.saturating_add(count));
        (first..end)
            .map(|index| (buf.line_starts[index], buf.line(index).to_string()))
            .collect()
    }

    /// Index of the line holding byte `offset`
    pub fn line_at(&self, offset: usize) -> usize {
        self.lock().line_starts.partition_point(|&start| start <= offset) - 1
    }

    pub fn is_empty(&self) -> bool {
        self.lock().text.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleBuffer> {
        // A writer that panicked mid-append leaves valid UTF-8 behind
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rewrite `input`, stopping at a tail that is a proper prefix of some needle.
/// Returns the rewritten text and the byte offset where the held tail starts.
fn apply_rewrites(input: &str, rewrites: &[Rewrite]) -> (String, usize) {
    if rewrites.is_empty() {
        return (input.to_string(), input.len());
    }

    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    'scan: while i < input.len() {
        let rest = &input[i..];

        for rewrite in rewrites {
            if rest.starts_with(rewrite.needle.as_str()) {
                out.push_str(&rewrite.replacement);
                i += rewrite.needle.len();
                continue 'scan;
            }
        }

        let partial = rewrites
            .iter()
            .any(|r| rest.len() < r.needle.len() && r.needle.starts_with(rest));
        if partial {
            return (out, i);
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        out.push(c);
        i += c.len_utf8();
    }

    (out, input.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn build_console() -> Console {
        Console::for_build("/workspace/", "/home/dev/chip/")
    }

    #[test]
    fn test_write_appends_and_rewrites_paths() {
        let console = build_console();
        console.write("INFO /workspace/src/foo.cc:1:2: error: x\r\n");
        assert_eq!(console.text(), "INFO /home/dev/chip/src/foo.cc:1:2: error: x\n");
        assert!(console.is_read_only());
    }

    #[test]
    fn test_prefix_split_across_writes() {
        let console = build_console();
        console.write("see /work");
        assert_eq!(console.text(), "see ");

        console.write("space/a.cc\r");
        assert_eq!(console.text(), "see /home/dev/chip/a.cc");

        console.write("\nnext");
        assert_eq!(console.text(), "see /home/dev/chip/a.cc\nnext");
    }

    #[test]
    fn test_flush_releases_held_tail() {
        let console = build_console();
        console.write("ends with /wo");
        console.flush();
        assert_eq!(console.text(), "ends with /wo");
        assert!(console.is_read_only());
    }

    #[test]
    fn test_non_match_is_not_held() {
        let console = build_console();
        console.write("/workshop/x");
        assert_eq!(console.text(), "/workshop/x");
    }

    #[test]
    fn test_manual_insert_rejected_while_read_only() {
        let console = Console::default();
        console.write("streamed");
        assert!(matches!(console.insert("typed"), Err(BuildError::ReadOnly)));

        console.set_read_only(false);
        console.insert(" typed").unwrap();
        assert_eq!(console.text(), "streamed typed");
    }

    #[test]
    fn test_regions_by_category() {
        let console = Console::default();
        console.add_regions("errors", vec![Span::new(10, 20), Span::new(0, 5)]);
        console.add_regions("errors", vec![Span::new(0, 5)]);
        assert_eq!(console.regions("errors"), vec![Span::new(0, 5), Span::new(10, 20)]);
        assert!(console.regions("warnings").is_empty());

        console.set_regions("errors", vec![Span::new(1, 2)]);
        assert_eq!(console.regions("errors"), vec![Span::new(1, 2)]);

        console.set_regions("errors", vec![]);
        assert!(console.regions("errors").is_empty());
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() {
        let console = Console::default();
        let line_a = format!("{}\n", "a".repeat(200));
        let line_b = format!("{}\n", "b".repeat(200));

        let handles: Vec<_> = [line_a.clone(), line_b.clone()]
            .into_iter()
            .map(|line| {
                let console = console.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        console.write(&line);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let text = console.text();
        assert_eq!(text.lines().count(), 200);
        assert_eq!(console.line_count(), 200);
        assert!(text
            .lines()
            .all(|l| l == line_a.trim_end() || l == line_b.trim_end()));
    }

    #[test]
    fn test_line_index_follows_writes() {
        let console = build_console();
        assert_eq!(console.line_count(), 0);
        assert!(console.lines(0, 10).is_empty());

        console.write("first\r\nsec");
        console.write("ond\r\nthird");
        assert_eq!(console.line_count(), 3);
        assert_eq!(console.line_count(), console.text().lines().count());

        assert_eq!(
            console.lines(1, 5),
            vec![(6, "second".to_string()), (13, "third".to_string())]
        );
        assert_eq!(console.line_at(0), 0);
        assert_eq!(console.line_at(5), 0);
        assert_eq!(console.line_at(6), 1);
        assert_eq!(console.line_at(15), 2);

        console.write("\n");
        assert_eq!(console.line_count(), 3);
        console.write("\n");
        assert_eq!(console.line_count(), 4);
        assert_eq!(console.lines(3, 1), vec![(19, String::new())]);
    }

    #[test]
    fn test_text_from_offset() {
        let console = build_console();
        console.write("one\n");
        let printed = console.len();
        console.write("two /workspace/x\n");

        assert_eq!(console.text_from(printed), "two /home/dev/chip/x\n");
        assert_eq!(console.text_from(console.len()), "");
        assert_eq!(console.text_from(console.len() + 10), "");
    }

    #[test]
    fn test_span_helpers() {
        let span = Span::new(3, 7);
        assert_eq!(span.len(), 4);
        assert!(span.contains(3));
        assert!(!span.contains(7));
        assert!(Span::new(2, 2).is_empty());
    }
}
