//! Bidirectional source mapping between generated listing positions
//! and original source positions.
//!
//! Every emitted statement records at least one entry, and every
//! entry's original position lies within the bounds of its source file
//! -- the generator enforces both before returning.

use serde::Serialize;

/// One mapping entry: (generated line, generated column) back to the
/// original file, line and column. Generated positions are 1-based
/// lines into the canonical listing produced by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMapping {
    pub generated_line: u32,
    pub generated_col: u32,
    pub file: String,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

/// Ordered mapping table. Entries are pushed in emission order, which
/// is ascending (generated_line, generated_col).
#[derive(Debug, Default, Serialize)]
pub struct SourceMap {
    entries: Vec<SourceMapping>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    pub fn push(&mut self, entry: SourceMapping) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SourceMapping] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Translate a generated position to the original source. Picks the
    /// entry on the matching line with the greatest column at or before
    /// the query column; a query left of every entry on the line still
    /// resolves to that line's first entry.
    pub fn translate(&self, generated_line: u32, generated_col: u32) -> Option<OriginalPosition> {
        let mut on_line = self
            .entries
            .iter()
            .filter(|e| e.generated_line == generated_line);
        let first = on_line.next()?;
        let mut best = first;
        for entry in on_line {
            if entry.generated_col <= generated_col && entry.generated_col >= best.generated_col {
                best = entry;
            }
        }
        Some(OriginalPosition {
            file: best.file.clone(),
            line: best.line,
            col: best.col,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(gline: u32, gcol: u32, line: u32) -> SourceMapping {
        SourceMapping {
            generated_line: gline,
            generated_col: gcol,
            file: "main.weave".into(),
            line,
            col: 1,
        }
    }

    #[test]
    fn translate_exact_line() {
        let mut map = SourceMap::new();
        map.push(entry(3, 3, 14));
        let pos = map.translate(3, 3).unwrap();
        assert_eq!(pos.line, 14);
        assert_eq!(pos.file, "main.weave");
    }

    #[test]
    fn translate_picks_greatest_col_at_or_before() {
        let mut map = SourceMap::new();
        map.push(entry(3, 1, 10));
        map.push(entry(3, 20, 11));
        assert_eq!(map.translate(3, 5).unwrap().line, 10);
        assert_eq!(map.translate(3, 25).unwrap().line, 11);
    }

    #[test]
    fn translate_unknown_line_is_none() {
        let map = SourceMap::new();
        assert!(map.translate(99, 1).is_none());
    }
}
