//! # pxx
//!
//! Automatic generation of Python binding modules from C++ source files.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! pipeline    → Invocation/Settings, run, batch runs, output writing
//!   ↓
//! codegen     → pybind11 module generator, runtime prelude
//!   ↓
//! runtime     → Host values, bound classes and dispatchers
//!   ↓
//! marshal     → MarshalRule registry, host⇄native converters, object handles
//! instantiate → Instantiation catalogues, call descriptors, dispatch matching
//! export      → ExportPolicy + ExportModel resolver
//!   ↓
//! model       → TranslationUnit entities, model builder, directives, dump
//!   ↓
//! types       → C++ type expressions, template substitution
//!   ↓
//! frontend    → Logos lexer, preprocessor, rowan CST, typed AST
//!   ↓
//! base        → LineIndex/LineCol, QualifiedName, identifier helpers
//! ```

// ============================================================================
// MODULES (dependency order: base → frontend → types → model → export → ...)
// ============================================================================

/// Foundation types: positions, qualified names, identifiers
pub mod base;

/// Diagnostics with stable codes
pub mod diagnostics;

/// Error enums of every layer
pub mod error;

/// Built-in declaration-level C++ frontend
pub mod frontend;

/// C++ type expressions
pub mod types;

/// Export model: entities, directives, instantiations
pub mod model;

/// Export policy resolution
pub mod export;

/// Instantiation catalogues and dispatch
pub mod instantiate;

/// Host⇄native marshaling
pub mod marshal;

/// In-process binding of an export model
pub mod runtime;

/// pybind11 source generation
pub mod codegen;

/// End-to-end invocations
pub mod pipeline;

// Re-export commonly needed items
pub use codegen::{Module, RenderOutput, SkippedEntity};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{Error, Result};
pub use export::{ExportModel, ExportPolicy};
pub use frontend::{CxxFrontend, Frontend, FsSource, MemorySource};
pub use model::TranslationUnit;
pub use pipeline::{Generated, Invocation, Settings, run, run_batch};
pub use runtime::{HostArray, HostValue};
