//! Invocation settings.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::InvocationError;
use crate::export::ExportPolicy;
use crate::model::DumpFormat;

/// Everything an invocation can configure besides its input and output
/// paths. Every field is optional in serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Restrict exported classes to these names.
    pub classes: Vec<String>,
    /// Defaults to the output, or else the input, file stem.
    pub module_name: Option<String>,
    /// Export every public entity instead of annotated ones.
    pub export_all: bool,
    /// Serialize the export model instead of generating code.
    pub dump: bool,
    pub dump_format: DumpFormat,
    /// Abort on the first entity that cannot be rendered.
    pub strict: bool,
    /// Passed to the frontend verbatim.
    pub flags: Vec<String>,
    /// Replaces the generated banner.
    pub header: Option<String>,
    /// Further `#include` lines for the generated source.
    pub includes: Vec<String>,
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, InvocationError> {
        serde_json::from_str(text).map_err(|e| InvocationError::InvalidSettings(e.to_string()))
    }

    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, InvocationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| InvocationError::InvalidSettings(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn policy(&self) -> ExportPolicy {
        ExportPolicy::from_options(&self.classes, self.export_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(Settings::from_json("{}").unwrap(), Settings::default());
        assert_eq!(Settings::default().policy(), ExportPolicy::Annotated);
    }

    #[test]
    fn test_settings_from_json() {
        let settings = Settings::from_json(
            r#"{
                "classes": ["TestClass"],
                "module_name": "basic",
                "dump": true,
                "dump_format": "yaml",
                "flags": ["-Iinclude", "-DNDEBUG"]
            }"#,
        )
        .unwrap();
        assert_eq!(settings.module_name.as_deref(), Some("basic"));
        assert_eq!(settings.dump_format, DumpFormat::Yaml);
        assert_eq!(settings.flags.len(), 2);
        assert_eq!(
            settings.policy(),
            ExportPolicy::Explicit(vec!["TestClass".to_string()])
        );
    }

    #[test]
    fn test_unknown_setting_is_rejected() {
        assert!(matches!(
            Settings::from_json(r#"{"clases": []}"#),
            Err(InvocationError::InvalidSettings(_))
        ));
    }
}
