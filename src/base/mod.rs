//! Foundation types for the pxx toolchain.
//!
//! This module provides fundamental types used throughout the generator:
//! - [`LineCol`], [`LineIndex`] - Line/column conversion
//! - [`QualifiedName`] - `::`-separated entity names
//! - Identifier helpers shared by the builder and the code generator
//!
//! This module has NO dependencies on other pxx modules.

mod name;
mod position;

pub use name::{QualifiedName, is_identifier, mangle};
pub use position::{LineCol, LineIndex};

// Re-export text-size types for convenience
pub use text_size::{self, TextRange, TextSize};
