//! Source registry and provider abstraction for filesystem-independent
//! compilation.
//!
//! A [`SourceSet`] owns the text of every file that participates in one
//! compile invocation and hands out [`FileId`]s. Diagnostics and source
//! mappings refer to files by id; the renderer asks the set for line text
//! when drawing code frames.
//!
//! The [`SourceProvider`] trait abstracts import I/O so the compiler can
//! work without `std::fs` -- imports are read once at the loading boundary
//! and become snapshot text inside the set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Index of a file within a [`SourceSet`]. Ids are dense and start at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

struct SourceFile {
    name: String,
    text: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
}

/// All source text belonging to one compile invocation.
///
/// Created fresh per `compile()`/`check()` call; never shared across
/// invocations.
#[derive(Default)]
pub struct SourceSet {
    files: Vec<SourceFile>,
}

impl SourceSet {
    pub fn new() -> Self {
        SourceSet { files: Vec::new() }
    }

    /// Register a file and return its id.
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let text = text.into();
        let mut line_starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        self.files.push(SourceFile {
            name: name.into(),
            text,
            line_starts,
        });
        FileId(self.files.len() as u32 - 1)
    }

    /// Find a previously registered file by name.
    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.files
            .iter()
            .position(|f| f.name == name)
            .map(|i| FileId(i as u32))
    }

    pub fn name(&self, id: FileId) -> &str {
        &self.files[id.0 as usize].name
    }

    pub fn text(&self, id: FileId) -> &str {
        &self.files[id.0 as usize].text
    }

    /// Number of lines in the file (a trailing newline does not start a
    /// new countable line).
    pub fn line_count(&self, id: FileId) -> u32 {
        let f = &self.files[id.0 as usize];
        let mut n = f.line_starts.len() as u32;
        if let Some(&last) = f.line_starts.last() {
            if last >= f.text.len() && n > 1 {
                n -= 1;
            }
        }
        n
    }

    /// Text of the given 1-based line, without the trailing newline.
    pub fn line(&self, id: FileId, line: u32) -> Option<&str> {
        let f = &self.files[id.0 as usize];
        let idx = line.checked_sub(1)? as usize;
        let start = *f.line_starts.get(idx)?;
        let end = f
            .line_starts
            .get(idx + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(f.text.len());
        f.text.get(start..end)
    }
}

// ──────────────────────────────────────────────
// Providers
// ──────────────────────────────────────────────

/// Trait that abstracts import I/O for the loading boundary.
///
/// Implementations provide source text reading and import path
/// resolution. [`FileSystemProvider`] delegates to `std::fs`;
/// [`InMemoryProvider`] backs tests; [`EmptyProvider`] is used by
/// single-source compiles, where every import is unresolvable.
pub trait SourceProvider {
    /// Read the source text for a given path.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Resolve a relative import path against a base directory.
    fn resolve_import(&self, base: &Path, import: &str) -> PathBuf {
        base.join(import)
    }
}

/// Default filesystem-backed provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }
}

/// In-memory provider for tests and embedding.
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new(files: HashMap<PathBuf, String>) -> Self {
        Self { files }
    }

    /// Resolve `.` and `..` components without touching the filesystem.
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => {
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                other => components.push(other),
            }
        }
        components.iter().collect()
    }
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = Self::normalize_path(path);
        self.files.get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }

    fn resolve_import(&self, base: &Path, import: &str) -> PathBuf {
        Self::normalize_path(&base.join(import))
    }
}

/// Provider that resolves nothing. Single-source `compile()` uses this,
/// so any `import` statement reports a missing-file diagnostic instead
/// of touching the filesystem.
pub struct EmptyProvider;

impl SourceProvider for EmptyProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no provider for '{}'", path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup_is_one_based() {
        let mut set = SourceSet::new();
        let id = set.add("a.weave", "first\nsecond\nthird");
        assert_eq!(set.line(id, 1), Some("first"));
        assert_eq!(set.line(id, 2), Some("second"));
        assert_eq!(set.line(id, 3), Some("third"));
        assert_eq!(set.line(id, 4), None);
        assert_eq!(set.line_count(id), 3);
    }

    #[test]
    fn trailing_newline_does_not_add_a_line() {
        let mut set = SourceSet::new();
        let id = set.add("a.weave", "one\ntwo\n");
        assert_eq!(set.line_count(id), 2);
        assert_eq!(set.line(id, 2), Some("two"));
    }

    #[test]
    fn lookup_by_name() {
        let mut set = SourceSet::new();
        let a = set.add("a.weave", "");
        let b = set.add("b.weave", "");
        assert_eq!(set.lookup("a.weave"), Some(a));
        assert_eq!(set.lookup("b.weave"), Some(b));
        assert_eq!(set.lookup("c.weave"), None);
    }

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        let normalized = InMemoryProvider::normalize_path(p);
        assert_eq!(normalized, PathBuf::from("/a/c/d"));
    }

    #[test]
    fn in_memory_read_source_found() {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/main.weave"), "model m = \"x\"".to_string());
        let provider = InMemoryProvider::new(files);
        let content = provider.read_source(Path::new("/main.weave")).unwrap();
        assert_eq!(content, "model m = \"x\"");
    }

    #[test]
    fn empty_provider_always_misses() {
        let err = EmptyProvider
            .read_source(Path::new("lib.weave"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
