//! Byte offset to line/column resolution.

use serde::{Deserialize, Serialize};

use crate::Span;

/// A 1-based line and character column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Line number, starting at 1.
    pub line: usize,
    /// Character column, starting at 1.
    pub column: usize,
}

/// Line start offsets of one source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineIndex {
    starts: Vec<usize>,
    #[serde(skip)]
    text: String,
}

impl LineIndex {
    /// Index the lines of `source`.
    pub fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            starts,
            text: source.to_string(),
        }
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Resolve a byte offset. Offsets past the end clamp to the last position.
    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        let start = self.starts[line - 1];
        let column = self
            .text
            .get(start..offset)
            .map_or(offset - start, |prefix| prefix.chars().count())
            + 1;
        Location { line, column }
    }

    /// Resolve the start of a span.
    pub fn locate(&self, span: Span) -> Location {
        self.location(span.start)
    }
}
