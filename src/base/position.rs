/// Position tracking for source locations
///
/// Converts byte offsets produced by the lexer into the line/column pairs used
/// in diagnostics and parse errors.
use serde::Serialize;
use text_size::TextSize;

/// A position in source code (0-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl LineCol {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for LineCol {
    /// Displayed 1-indexed, the way compilers report locations.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

/// Maps byte offsets to line/column positions for one source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    /// Byte offset of the first character of every line.
    line_starts: Vec<TextSize>,
    len: TextSize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::new(0)];
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(TextSize::new(offset as u32 + 1));
            }
        }
        Self {
            line_starts,
            len: TextSize::of(text),
        }
    }

    /// Line/column of `offset`; offsets past the end clamp to the end.
    pub fn line_col(&self, offset: TextSize) -> LineCol {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let col = offset - self.line_starts[line];
        LineCol::new(line as u32, col.into())
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_first_line() {
        let index = LineIndex::new("class A {};");
        assert_eq!(index.line_col(TextSize::new(6)), LineCol::new(0, 6));
    }

    #[test]
    fn test_line_col_after_newlines() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line_col(TextSize::new(0)), LineCol::new(0, 0));
        assert_eq!(index.line_col(TextSize::new(2)), LineCol::new(1, 0));
        assert_eq!(index.line_col(TextSize::new(3)), LineCol::new(1, 1));
        assert_eq!(index.line_col(TextSize::new(5)), LineCol::new(2, 0));
        assert_eq!(index.line_col(TextSize::new(6)), LineCol::new(3, 0));
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_line_col_clamps() {
        let index = LineIndex::new("ab");
        assert_eq!(index.line_col(TextSize::new(99)), LineCol::new(0, 2));
    }

    #[test]
    fn test_display_is_one_indexed() {
        assert_eq!(LineCol::new(0, 4).to_string(), "1:5");
    }
}
