//! Error types for every pipeline stage.
//!
//! Each layer reports through its own enum; [`Error`] wraps them all for
//! callers that drive the whole pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::diagnostics::Location;

/// The frontend could not produce a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default())]
pub struct ParseError {
    /// Diagnostic text.
    pub message: String,
    /// Offending source location, when known.
    pub location: Option<Location>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Errors of the export policy resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// A class requested by name does not exist in the translation unit.
    #[error("unknown export target `{name}`: no such class in the translation unit")]
    UnknownExportTarget { name: String },
}

/// Errors of the marshaling rule registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// No rule is registered for the type.
    #[error("unsupported type `{ty}`: no marshaling rule is registered")]
    UnsupportedType { ty: String },
}

impl MarshalError {
    pub fn unsupported(ty: impl Into<String>) -> Self {
        Self::UnsupportedType { ty: ty.into() }
    }
}

/// Errors of the code generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// An entity uses a type without a marshaling rule.
    #[error("cannot render `{entity}`: no marshaling rule for type `{ty}`")]
    UnrenderableEntity { entity: String, ty: String },

    /// The export model could not be serialized in diagnostics mode.
    #[error("cannot serialize the export model: {0}")]
    Serialize(String),
}

impl RenderError {
    pub fn unrenderable(entity: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::UnrenderableEntity {
            entity: entity.into(),
            ty: ty.into(),
        }
    }
}

/// Errors of instantiation dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Two catalogue entries match at the same specificity.
    #[error(
        "ambiguous call to `{name}`: instantiations {} match equally well",
        .candidates.join(", ")
    )]
    AmbiguousInstantiation {
        name: String,
        candidates: Vec<String>,
    },

    /// No catalogue entry matches the call.
    #[error("no instantiation of `{name}` matches arguments ({descriptor})")]
    NoMatchingInstantiation { name: String, descriptor: String },
}

/// Errors converting between host and native values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Array rank or a dimension length differs from the native type's shape.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Numeric value does not fit the native type.
    #[error("value {value} is out of range for `{target}`")]
    Range { value: String, target: String },

    /// Host value has the wrong kind altogether.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Write to a const field.
    #[error("attribute `{name}` is read-only")]
    ReadOnly { name: String },
}

impl ConversionError {
    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn range(value: impl ToString, target: impl Into<String>) -> Self {
        Self::Range {
            value: value.to_string(),
            target: target.into(),
        }
    }

    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Errors raised by bound objects at call time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("`{class}` has no attribute `{name}`")]
    UnknownAttribute { class: String, name: String },

    #[error("object of class `{class}` has already been destroyed")]
    Destroyed { class: String },
}

/// Invocation failures detected before any stage runs.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("input file `{}` does not exist", .0.display())]
    MissingInput(PathBuf),

    #[error("output directory `{}` does not exist", .0.display())]
    MissingOutputDirectory(PathBuf),

    #[error("`{0}` is not a valid module name")]
    InvalidModuleName(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("cannot write `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any pipeline failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::LineCol;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(
            "'missing.h' file not found",
            Some(Location::new("a.h", LineCol::new(0, 9))),
        );
        assert_eq!(err.to_string(), "a.h:1:10: 'missing.h' file not found");
        assert_eq!(ParseError::new("boom", None).to_string(), "boom");
    }

    #[test]
    fn test_dispatch_errors_are_distinct() {
        let ambiguous = DispatchError::AmbiguousInstantiation {
            name: "sum".into(),
            candidates: vec!["sum<float, 3>".into(), "sum<double, 3>".into()],
        };
        assert_eq!(
            ambiguous.to_string(),
            "ambiguous call to `sum`: instantiations sum<float, 3>, sum<double, 3> match equally well"
        );
        let wrapped: Error = ambiguous.into();
        assert!(matches!(
            wrapped,
            Error::Dispatch(DispatchError::AmbiguousInstantiation { .. })
        ));
    }
}
