//! One tool invocation, end to end.
//!
//! ```text
//! Invocation::validate → model::load → export::resolve → codegen::Module
//! ```
//!
//! Every stage hands an immutable value to the next. Invocations share no
//! state, so [`run_batch`] runs them on the rayon pool.

mod settings;

pub use settings::Settings;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::base::is_identifier;
use crate::codegen::{Module, SkippedEntity};
use crate::diagnostics::Diagnostic;
use crate::error::{InvocationError, Result};
use crate::export;
use crate::frontend::{CxxFrontend, Frontend};
use crate::model;

/// Input path, optional output path and settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub input: PathBuf,
    /// `None` returns the generated text instead of writing it.
    pub output: Option<PathBuf>,
    pub settings: Settings,
}

impl Invocation {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            settings: Settings::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// The configured module name, or else the output, or else the input,
    /// file stem.
    pub fn module_name(&self) -> String {
        if let Some(name) = &self.settings.module_name {
            return name.clone();
        }
        self.output
            .as_deref()
            .unwrap_or(&self.input)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Check the invocation against the filesystem. Returns the module name.
    pub fn validate(&self) -> Result<String, InvocationError> {
        self.validate_with(&CxxFrontend::new())
    }

    /// Like [`Invocation::validate`], with `frontend` deciding whether the
    /// input exists.
    pub fn validate_with(&self, frontend: &dyn Frontend) -> Result<String, InvocationError> {
        if !frontend.exists(&self.input) {
            return Err(InvocationError::MissingInput(self.input.clone()));
        }
        if let Some(output) = &self.output {
            let directory = output.parent().unwrap_or(Path::new(""));
            if !directory.as_os_str().is_empty() && !directory.is_dir() {
                return Err(InvocationError::MissingOutputDirectory(directory.to_path_buf()));
            }
        }
        let name = self.module_name();
        if !is_identifier(&name) {
            return Err(InvocationError::InvalidModuleName(name));
        }
        Ok(name)
    }
}

/// What a successful invocation produced.
#[derive(Debug, Clone)]
pub struct Generated {
    pub module_name: String,
    /// Generated source, or the model dump.
    pub text: String,
    pub skipped: Vec<SkippedEntity>,
    /// Warnings from the frontend and the model builder.
    pub diagnostics: Vec<Diagnostic>,
    /// Where `text` was written, if anywhere.
    pub written: Option<PathBuf>,
}

/// Run `invocation` with the filesystem frontend.
pub fn run(invocation: &Invocation) -> Result<Generated> {
    run_with(&CxxFrontend::new(), invocation)
}

/// Run `invocation` with `frontend`.
pub fn run_with(frontend: &dyn Frontend, invocation: &Invocation) -> Result<Generated> {
    let module_name = invocation.validate_with(frontend)?;
    let settings = &invocation.settings;
    info!(input = %invocation.input.display(), module = %module_name, "generating bindings");

    let unit = model::load(frontend, &invocation.input, &settings.flags)?;
    for diagnostic in &unit.diagnostics {
        warn!("{diagnostic}");
    }

    let model = export::resolve(&unit, &settings.policy())?;
    let sources: Vec<String> = invocation
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .into_iter()
        .collect();
    let module = Module::new(module_name.clone(), sources)
        .with_header(settings.header.clone())
        .with_includes(settings.includes.clone())
        .strict(settings.strict);

    let (text, skipped) = if settings.dump {
        (module.render_diagnostics(&model, settings.dump_format)?, Vec::new())
    } else {
        let output = module.render(&model)?;
        (output.source, output.skipped)
    };

    let written = match &invocation.output {
        Some(path) => {
            std::fs::write(path, &text).map_err(|source| InvocationError::Write {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), bytes = text.len(), "output written");
            Some(path.clone())
        }
        None => None,
    };

    Ok(Generated {
        module_name,
        text,
        skipped,
        diagnostics: unit.diagnostics,
        written,
    })
}

/// Run independent invocations in parallel with the filesystem frontend.
/// Results are in input order.
pub fn run_batch(invocations: &[Invocation]) -> Vec<Result<Generated>> {
    run_batch_with(&CxxFrontend::new(), invocations)
}

pub fn run_batch_with(frontend: &dyn Frontend, invocations: &[Invocation]) -> Vec<Result<Generated>> {
    invocations
        .par_iter()
        .map(|invocation| run_with(frontend, invocation))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::frontend::MemorySource;

    fn frontend() -> CxxFrontend<MemorySource> {
        CxxFrontend::with_source(MemorySource::new().with_file(
            "/src/widget.h",
            "// pxx :: export\nclass Widget {\npublic:\n  int size = 3;\n};\n",
        ))
    }

    #[test]
    fn test_module_name_defaults() {
        let invocation = Invocation::new("/src/widget.h");
        assert_eq!(invocation.module_name(), "widget");
        let invocation = invocation.with_output("/out/bindings.cpp");
        assert_eq!(invocation.module_name(), "bindings");
        let invocation = invocation.with_settings(Settings {
            module_name: Some("custom".to_string()),
            ..Settings::default()
        });
        assert_eq!(invocation.module_name(), "custom");
    }

    #[test]
    fn test_missing_input() {
        let err = Invocation::new("/src/absent.h")
            .validate_with(&frontend())
            .unwrap_err();
        assert!(matches!(err, InvocationError::MissingInput(_)));
    }

    #[test]
    fn test_invalid_module_name() {
        let invocation = Invocation::new("/src/widget.h").with_settings(Settings {
            module_name: Some("my-module".to_string()),
            ..Settings::default()
        });
        assert!(matches!(
            invocation.validate_with(&frontend()),
            Err(InvocationError::InvalidModuleName(name)) if name == "my-module"
        ));
    }

    #[test]
    fn test_run_returns_text() {
        let generated = run_with(&frontend(), &Invocation::new("/src/widget.h")).unwrap();
        assert_eq!(generated.module_name, "widget");
        assert!(generated.text.contains("PYBIND11_MODULE(widget, m)"));
        assert!(generated.text.contains("cls.def_property(\"size\""));
        assert!(generated.written.is_none());
    }

    #[test]
    fn test_unknown_class_stops_the_run() {
        let invocation = Invocation::new("/src/widget.h").with_settings(Settings {
            classes: vec!["Gadget".to_string()],
            ..Settings::default()
        });
        assert!(matches!(
            run_with(&frontend(), &invocation),
            Err(Error::Export(_))
        ));
    }
}
