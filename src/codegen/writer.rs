//! Indented line writer for generated source.

use std::fmt::Write;

#[derive(Debug, Default)]
pub(super) struct SourceWriter {
    output: String,
    indent_level: usize,
}

impl SourceWriter {
    pub(super) fn new() -> Self {
        Self::default()
    }

    fn indent(&self) -> String {
        "    ".repeat(self.indent_level)
    }

    pub(super) fn write_line(&mut self, text: &str) {
        if text.is_empty() {
            self.write_blank_line();
            return;
        }
        let indent = self.indent();
        let _ = writeln!(self.output, "{}{}", indent, text);
    }

    pub(super) fn write_blank_line(&mut self) {
        self.output.push('\n');
    }

    /// Copy `text` verbatim, one line at a time, at the current indent.
    pub(super) fn write_block(&mut self, text: &str) {
        for line in text.lines() {
            self.write_line(line);
        }
    }

    /// Write `header {` and indent.
    pub(super) fn open(&mut self, header: &str) {
        if header.is_empty() {
            self.write_line("{");
        } else {
            self.write_line(&format!("{header} {{"));
        }
        self.indent_level += 1;
    }

    /// Dedent and write `}` followed by `suffix`.
    pub(super) fn close(&mut self, suffix: &str) {
        self.indent_level = self.indent_level.saturating_sub(1);
        self.write_line(&format!("}}{suffix}"));
    }

    pub(super) fn finish(self) -> String {
        self.output
    }
}
