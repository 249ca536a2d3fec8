//! Qualified C++ names and identifier helpers.

use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;

/// A `::`-separated name identifying an entity at root scope.
///
/// An empty namespace path means the entity lives in the global namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct QualifiedName {
    segments: Vec<SmolStr>,
}

impl QualifiedName {
    /// Build from a namespace path and a simple name.
    pub fn new(namespace: &[SmolStr], name: impl Into<SmolStr>) -> Self {
        let mut segments = namespace.to_vec();
        segments.push(name.into());
        Self { segments }
    }

    /// Parse `a::b::C`. Leading `::` (global qualifier) is dropped.
    pub fn parse(text: &str) -> Self {
        let segments = text
            .split("::")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SmolStr::new)
            .collect();
        Self { segments }
    }

    /// The last segment.
    pub fn name(&self) -> &str {
        self.segments.last().map(SmolStr::as_str).unwrap_or("")
    }

    /// All segments except the last.
    pub fn namespace(&self) -> &[SmolStr] {
        match self.segments.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn segments(&self) -> &[SmolStr] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `query` names this entity, either by its simple name or by a
    /// (possibly partial) qualified suffix such as `inner::Class`.
    pub fn matches(&self, query: &str) -> bool {
        let query = QualifiedName::parse(query);
        if query.segments.is_empty() || query.segments.len() > self.segments.len() {
            return false;
        }
        let offset = self.segments.len() - query.segments.len();
        self.segments[offset..] == query.segments[..]
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.to_string()
    }
}

/// Whether `text` is a valid identifier in both C++ and Python.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first == '_' || unicode_ident::is_xid_start(first) => {
            chars.all(unicode_ident::is_xid_continue)
        }
        _ => false,
    }
}

/// Turn an arbitrary spelling into a C++ identifier fragment
/// (`Sum<int,3>` → `Sum_int_3`).
pub fn mangle(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_underscore = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_display() {
        let ns = [SmolStr::new("a"), SmolStr::new("b")];
        let name = QualifiedName::new(&ns, "C");
        assert_eq!(name.to_string(), "a::b::C");
        assert_eq!(name.name(), "C");
        assert_eq!(name.namespace().len(), 2);
    }

    #[test]
    fn test_qualified_name_parse_drops_global_prefix() {
        assert_eq!(QualifiedName::parse("::std::vector").to_string(), "std::vector");
    }

    #[test]
    fn test_matches_suffix() {
        let name = QualifiedName::parse("outer::inner::Thing");
        assert!(name.matches("Thing"));
        assert!(name.matches("inner::Thing"));
        assert!(name.matches("outer::inner::Thing"));
        assert!(!name.matches("outer::Thing"));
        assert!(!name.matches("Other"));
        assert!(!name.matches(""));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("basic_class"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("3d"));
        assert!(!is_identifier("my-module"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_mangle() {
        assert_eq!(mangle("Sum<int, 3>"), "Sum_int_3");
        assert_eq!(mangle("std::array<float,3>"), "std_array_float_3");
    }
}
