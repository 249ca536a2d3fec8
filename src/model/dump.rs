//! Structured text dumps of the model for debugging.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Output format of [`dump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    #[default]
    Json,
    /// Requires the `yaml` feature.
    Yaml,
}

impl DumpFormat {
    pub fn name(&self) -> &'static str {
        match self {
            DumpFormat::Json => "json",
            DumpFormat::Yaml => "yaml",
        }
    }
}

/// Serialize `value` (a [`super::TranslationUnit`] or an export model).
///
/// JSON output is pretty-printed and ends with a newline.
pub fn dump<T: Serialize + ?Sized>(value: &T, format: DumpFormat) -> Result<String, RenderError> {
    match format {
        DumpFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)
                .map_err(|e| RenderError::Serialize(e.to_string()))?;
            text.push('\n');
            Ok(text)
        }
        DumpFormat::Yaml => dump_yaml(value),
    }
}

#[cfg(feature = "yaml")]
fn dump_yaml<T: Serialize + ?Sized>(value: &T) -> Result<String, RenderError> {
    serde_yaml::to_string(value).map_err(|e| RenderError::Serialize(e.to_string()))
}

#[cfg(not(feature = "yaml"))]
fn dump_yaml<T: Serialize + ?Sized>(_value: &T) -> Result<String, RenderError> {
    Err(RenderError::Serialize(
        "YAML output requires the 'yaml' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{CxxFrontend, MemorySource};
    use crate::model::load;
    use std::path::Path;

    #[test]
    fn test_json_dump_lists_entities_in_order() {
        let frontend = CxxFrontend::with_source(
            MemorySource::new().with_file("t.h", "struct A { int x; };\nint f(A a);\n"),
        );
        let tu = load(&frontend, Path::new("t.h"), &[]).unwrap();
        let text = dump(&tu, DumpFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let entities = value["entities"].as_array().unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["entity"], "class");
        assert_eq!(entities[0]["qname"], "A");
        assert_eq!(entities[0]["members"][0]["ty"], "int");
        assert_eq!(entities[1]["entity"], "function");
        assert_eq!(entities[1]["signature"]["ret"], "int");
    }

    #[cfg(not(feature = "yaml"))]
    #[test]
    fn test_yaml_needs_feature() {
        let err = dump(&vec![1, 2], DumpFormat::Yaml).unwrap_err();
        assert!(matches!(err, RenderError::Serialize(_)));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_yaml_dump() {
        let text = dump(&vec!["a"], DumpFormat::Yaml).unwrap();
        assert_eq!(text, "- a\n");
    }
}
