//! Declaration-level C++ frontend
//!
//! The model builder sees the frontend only through the [`Frontend`] trait:
//! a source path plus compiler flags in, a navigable tree plus diagnostics
//! out. The built-in [`CxxFrontend`] is the rust-analyzer approach applied
//! to the subset of C++ that bindings need:
//!
//! ```text
//! Source Text
//!     ↓
//! Lexer (logos) → Tokens with SyntaxKind
//!     ↓
//! Preprocessor → includes spliced, macros expanded, origins kept
//!     ↓
//! Parser → GreenNode tree (immutable, cheap to clone)
//!     ↓
//! AST layer → Typed wrappers over SyntaxNode
//! ```

pub mod ast;
mod lexer;
mod parser;
mod preprocess;
mod source;
mod syntax_kind;

use rowan::GreenNode;
use std::path::Path;
use tracing::debug;

use crate::diagnostics::{Diagnostic, Location};
use crate::error::ParseError;

pub use ast::AstNode;
pub use lexer::{Lexer, Token, tokenize};
pub use parser::{OriginMap, Parse, SyntaxError, parse};
pub use preprocess::{
    FileId, Origin, PpToken, Preprocessed, Preprocessor, PreprocessorConfig, SourceFile,
};
pub use source::{FsSource, MemorySource, SourceProvider, normalize};
pub use syntax_kind::{CxxLanguage, SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};

/// Re-export rowan types for convenience
pub use rowan::{TextRange, TextSize};

/// Turns a source file and compiler flags into a [`ParsedUnit`].
pub trait Frontend: Send + Sync {
    /// Parse `path`. Fails when the file cannot be read or does not parse.
    fn parse(&self, path: &Path, flags: &[String]) -> Result<ParsedUnit, ParseError>;

    /// Whether `path` can be parsed at all.
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// One parsed translation unit: the tree of the main file with every
/// quoted include spliced in.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    green: GreenNode,
    origins: OriginMap,
    files: Vec<SourceFile>,
    system_includes: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ParsedUnit {
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// The typed root node.
    pub fn root(&self) -> Option<ast::SourceFile> {
        ast::SourceFile::cast(self.syntax())
    }

    /// Every file read, the main file first.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn main_file(&self) -> Option<&Path> {
        self.files.first().map(|f| f.path.as_path())
    }

    /// `<...>` includes, in first-seen order.
    pub fn system_includes(&self) -> &[String] {
        &self.system_includes
    }

    /// Warnings collected while preprocessing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The file a tree offset was read from.
    pub fn file_of(&self, offset: TextSize) -> Option<&Path> {
        let origin = self.origins.lookup(offset)?;
        self.files
            .get(origin.file.0 as usize)
            .map(|f| f.path.as_path())
    }

    /// Source location of a tree offset.
    pub fn location(&self, offset: TextSize) -> Option<Location> {
        let origin = self.origins.lookup(offset)?;
        locate(&self.files, origin)
    }
}

fn locate(files: &[SourceFile], origin: Origin) -> Option<Location> {
    let file = files.get(origin.file.0 as usize)?;
    Some(Location::new(&file.path, file.line_index.line_col(origin.offset)))
}

/// The built-in frontend.
#[derive(Debug, Clone, Default)]
pub struct CxxFrontend<S = FsSource> {
    source: S,
}

impl CxxFrontend {
    /// A frontend reading from the filesystem.
    pub fn new() -> Self {
        Self { source: FsSource }
    }
}

impl<S: SourceProvider> CxxFrontend<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: SourceProvider> Frontend for CxxFrontend<S> {
    fn parse(&self, path: &Path, flags: &[String]) -> Result<ParsedUnit, ParseError> {
        let config = PreprocessorConfig::from_flags(flags);
        let preprocessed = Preprocessor::new(&self.source, &config).run(path)?;
        if let Some(error) = preprocessed
            .diagnostics
            .iter()
            .find(|d| d.severity.is_error())
        {
            return Err(ParseError::new(
                error.message.to_string(),
                error.location.clone(),
            ));
        }

        let parse = parser::parse(&preprocessed.tokens);
        if let Some(error) = parse.errors.first() {
            let location = error.origin.and_then(|o| locate(&preprocessed.files, o));
            return Err(ParseError::new(error.message.clone(), location));
        }
        debug!(
            path = %path.display(),
            files = preprocessed.files.len(),
            "parsed translation unit"
        );

        Ok(ParsedUnit {
            green: parse.green,
            origins: parse.origins,
            files: preprocessed.files,
            system_includes: preprocessed.system_includes,
            diagnostics: preprocessed.diagnostics,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.source.exists(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::LineCol;

    #[test]
    fn test_parse_reports_location_of_syntax_error() {
        let source = MemorySource::new()
            .with_file("main.h", "#include \"a.h\"\nint x;\n")
            .with_file("a.h", "class A {\n  int y\n};\n");
        let frontend = CxxFrontend::with_source(source);
        let err = frontend.parse(Path::new("main.h"), &[]).unwrap_err();
        let location = err.location.unwrap();
        assert_eq!(location.file, Path::new("a.h"));
        assert_eq!(location.position, LineCol::new(2, 0));
    }

    #[test]
    fn test_parsed_unit_maps_offsets_back_to_files() {
        let source = MemorySource::new()
            .with_file("main.h", "#include \"a.h\"\nint x;\n")
            .with_file("a.h", "int y;\n");
        let frontend = CxxFrontend::with_source(source);
        let unit = frontend.parse(Path::new("main.h"), &[]).unwrap();
        assert_eq!(unit.main_file(), Some(Path::new("main.h")));

        let text = unit.syntax().text().to_string();
        let x = TextSize::new(text.find('x').unwrap() as u32);
        let y = TextSize::new(text.find('y').unwrap() as u32);
        assert_eq!(unit.file_of(x), Some(Path::new("main.h")));
        assert_eq!(unit.file_of(y), Some(Path::new("a.h")));
        assert_eq!(unit.location(x).unwrap().position, LineCol::new(1, 4));
        assert!(frontend.exists(Path::new("a.h")));
        assert!(!frontend.exists(Path::new("b.h")));
    }
}
