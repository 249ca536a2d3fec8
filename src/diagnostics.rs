//! Non-fatal findings collected while building the model.
//!
//! The frontend and the model builder record what they skipped or could not
//! interpret here instead of aborting. Fatal conditions are reported through
//! the error types in [`crate::error`].

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::base::LineCol;

// ============================================================================
// DIAGNOSTIC TYPES
// ============================================================================

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

/// A source location: file plus 0-indexed line/column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub file: PathBuf,
    pub position: LineCol,
}

impl Location {
    pub fn new(file: impl AsRef<Path>, position: LineCol) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            position,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.position)
    }
}

/// A diagnostic message with optional location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: Severity,
    /// Diagnostic code (e.g., "W0201").
    pub code: Option<Arc<str>>,
    /// The diagnostic message.
    pub message: Arc<str>,
    /// Where the finding was made, if known.
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<Arc<str>>) -> Self {
        Self {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<Arc<str>>) -> Self {
        Self {
            severity: Severity::Warning,
            code: None,
            message: message.into(),
            location: None,
        }
    }

    /// Set the diagnostic code.
    pub fn with_code(mut self, code: impl Into<Arc<str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set the location.
    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{}", self.severity.as_str())?;
        if let Some(code) = &self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

// ============================================================================
// DIAGNOSTIC CODES
// ============================================================================

/// Standard diagnostic codes.
///
/// ## Code Ranges
///
/// - **E01xx**: Frontend errors (lexing, preprocessing, syntax)
/// - **W01xx**: Frontend warnings (ignored directives, unsupported macros)
/// - **W02xx**: Model builder warnings (skipped constructs)
/// - **W03xx**: Export directive warnings
pub mod codes {
    /// Invalid character in source.
    pub const INVALID_TOKEN: &str = "E0101";
    /// Syntax error in a declaration.
    pub const SYNTAX_ERROR: &str = "E0102";
    /// Quoted include could not be resolved.
    pub const MISSING_INCLUDE: &str = "E0103";
    /// `#error` directive in an active region.
    pub const ERROR_DIRECTIVE: &str = "E0104";
    /// Unbalanced conditional directive.
    pub const UNBALANCED_CONDITIONAL: &str = "E0105";

    /// Preprocessor directive not understood; ignored.
    pub const IGNORED_DIRECTIVE: &str = "W0101";
    /// Function-like macro; never expanded.
    pub const FUNCTION_MACRO: &str = "W0102";

    /// Declaration kind not supported for export (enum, union, friend, ...).
    pub const UNSUPPORTED_DECLARATION: &str = "W0201";
    /// Member template inside a class; not exported.
    pub const MEMBER_TEMPLATE: &str = "W0202";
    /// Operator overload; not exported.
    pub const OPERATOR_OVERLOAD: &str = "W0203";
    /// Specialization or instantiation of an unknown template.
    pub const UNKNOWN_TEMPLATE: &str = "W0204";
    /// Template alias; not supported.
    pub const TEMPLATE_ALIAS: &str = "W0205";

    /// Malformed `// pxx ::` directive.
    pub const MALFORMED_DIRECTIVE: &str = "W0301";
    /// `instance(...)` with the wrong number of arguments.
    pub const INSTANCE_ARITY: &str = "W0302";
}
