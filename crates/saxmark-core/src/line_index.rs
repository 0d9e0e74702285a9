use crate::span::Span;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum LineIndexError {
    #[error("offset {offset} is outside the indexed source (length {source_len})")]
    OutOfRange { offset: usize, source_len: usize },
}

/// Lookup table from absolute byte offsets to the lines containing them.
///
/// Holds one interval per line, with the trailing newline attached to the
/// line it terminates. The intervals are strictly increasing and contiguous,
/// covering the whole source without gaps, which is what makes the binary
/// search in `line_containing` valid.
#[derive(Clone, Debug)]
pub struct LineIndex {
    source_len: usize,
    lines: Vec<Span>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                lines.push(Span::new(start, idx + 1));
                start = idx + 1;
            }
        }
        if start < source.len() {
            lines.push(Span::new(start, source.len()));
        }
        Self {
            source_len: source.len(),
            lines,
        }
    }

    pub fn count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_at(&self, index: usize) -> Option<Span> {
        self.lines.get(index).copied()
    }

    /// Index of the line whose interval contains `offset`.
    pub fn line_index_containing(&self, offset: usize) -> Result<usize, LineIndexError> {
        if offset >= self.source_len {
            return Err(LineIndexError::OutOfRange {
                offset,
                source_len: self.source_len,
            });
        }
        Ok(self.lines.partition_point(|line| line.end <= offset))
    }

    /// The interval of the line containing `offset`.
    pub fn line_containing(&self, offset: usize) -> Result<Span, LineIndexError> {
        let index = self.line_index_containing(offset)?;
        Ok(self.lines[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = Span> + '_ {
        self.lines.iter().copied()
    }
}
