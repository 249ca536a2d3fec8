//! pybind11 module generation.
//!
//! [`Module::render`] turns an [`ExportModel`] into one C++ source unit:
//! the file header and includes, the `pxx_runtime` prelude, and a
//! `PYBIND11_MODULE` block with one registration per exported symbol.
//! Template entry points shared by several instantiations get a static
//! dispatch catalogue mirroring [`crate::instantiate::Catalogue`].
//!
//! Output is a pure function of the model and the module settings.

mod emit;
mod prelude;
mod writer;

use rustc_hash::FxHashSet;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::error::RenderError;
use crate::export::ExportModel;
use crate::marshal::{ArrayFamily, NativeType, Ownership, Registry};
use crate::model::{DumpFormat, dump};
use emit::RenderContext;
use writer::SourceWriter;

const DEFAULT_HEADER: &str = "////////////////////////////////////////////
// Python bindings auto-generated by pxx. //
////////////////////////////////////////////";

/// An entity left out of the generated source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntity {
    pub entity: String,
    /// The type without a marshaling rule.
    pub ty: String,
}

/// Generated source plus what had to be left out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub source: String,
    pub skipped: Vec<SkippedEntity>,
}

impl RenderOutput {
    /// Whether every entity of the model was rendered.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Settings of one generated module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    sources: Vec<String>,
    header: Option<String>,
    includes: Vec<String>,
    strict: bool,
}

impl Module {
    /// A module named `name` that `#include`s `sources`.
    pub fn new(name: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sources,
            ..Self::default()
        }
    }

    /// Replace the default banner.
    pub fn with_header(mut self, header: Option<String>) -> Self {
        self.header = header;
        self
    }

    /// Further `#include` targets, `<x>` or `"x"`; bare names are quoted.
    pub fn with_includes(mut self, includes: Vec<String>) -> Self {
        self.includes = includes;
        self
    }

    /// Abort on the first unrenderable entity instead of skipping it.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render `model`.
    pub fn render(&self, model: &ExportModel) -> Result<RenderOutput, RenderError> {
        let registry = Registry::for_model(model);
        let mut ctx = RenderContext::new(self.strict, registry, shared_classes(model));
        ctx.render_module(&self.name, model)?;
        let (body, families, skipped) = ctx.finish();

        let mut out = SourceWriter::new();
        self.write_header(&mut out, model, &families);
        out.write_block(prelude::CORE);
        out.write_blank_line();
        if families.contains(&ArrayFamily::EigenMatrix) {
            out.write_block(prelude::EIGEN_DENSE);
            out.write_blank_line();
        }
        if families.contains(&ArrayFamily::EigenTensor) {
            out.write_block(prelude::EIGEN_TENSOR);
            out.write_blank_line();
        }
        for skip in &skipped {
            out.write_line(&format!(
                "// pxx: skipped `{}`: no marshaling rule for type `{}`",
                skip.entity, skip.ty
            ));
        }
        if !skipped.is_empty() {
            out.write_blank_line();
        }
        let mut source = out.finish();
        source.push_str(&body);

        debug!(
            module = %self.name,
            bytes = source.len(),
            skipped = skipped.len(),
            "module rendered"
        );
        Ok(RenderOutput { source, skipped })
    }

    /// Serialize `model` instead of rendering it.
    pub fn render_diagnostics(&self, model: &ExportModel, format: DumpFormat) -> Result<String, RenderError> {
        dump(model, format)
    }

    fn write_header(&self, out: &mut SourceWriter, model: &ExportModel, families: &FxHashSet<ArrayFamily>) {
        out.write_block(self.header.as_deref().unwrap_or(DEFAULT_HEADER));
        let provenance: Vec<String> = model.files.iter().map(|f| file_name(f)).collect();
        if !provenance.is_empty() {
            out.write_line(&format!("// Generated from: {}", provenance.join(", ")));
        }
        out.write_blank_line();

        for header in ["<array>", "<cmath>", "<functional>", "<limits>", "<stdexcept>", "<string>", "<vector>"] {
            out.write_line(&format!("#include {header}"));
        }
        out.write_blank_line();
        out.write_line("#include <pybind11/pybind11.h>");
        out.write_line("#include <pybind11/numpy.h>");
        if families.contains(&ArrayFamily::StdArray) || families.contains(&ArrayFamily::StdVector) {
            out.write_line("#include <pybind11/stl.h>");
        }
        if families.contains(&ArrayFamily::EigenMatrix) {
            out.write_line("#include <pybind11/eigen.h>");
        }
        if families.contains(&ArrayFamily::EigenTensor) {
            out.write_line("#include <pybind11/eigen/tensor.h>");
        }
        out.write_blank_line();

        for source in &self.sources {
            out.write_line(&format!("#include \"{source}\""));
        }
        for include in &self.includes {
            if include.starts_with('<') || include.starts_with('"') {
                out.write_line(&format!("#include {include}"));
            } else {
                out.write_line(&format!("#include \"{include}\""));
            }
        }
        if !self.sources.is_empty() || !self.includes.is_empty() {
            out.write_blank_line();
        }
        out.write_line("namespace py = pybind11;");
        out.write_blank_line();
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Classes held through `std::shared_ptr` somewhere in the model; they are
/// registered with a shared holder.
fn shared_classes(model: &ExportModel) -> FxHashSet<String> {
    let registry = Registry::for_model(model);
    let mut shared = FxHashSet::default();
    let mut visit = |ty: &crate::types::TypeExpr| {
        if let Some(NativeType::Object {
            class,
            ownership: Ownership::Shared,
        }) = NativeType::classify(ty, &|name| registry.is_class(name))
        {
            shared.insert(class);
        }
    };
    for class in model.all_classes() {
        class.fields.iter().for_each(|f| visit(&f.ty));
        for ctor in &class.constructors {
            ctor.params.iter().for_each(|p| visit(&p.ty));
        }
        for method in class.methods.iter().flat_map(|g| &g.overloads) {
            method.signature.param_types().for_each(&mut visit);
            visit(&method.signature.ret);
        }
    }
    let functions = model
        .functions
        .iter()
        .flat_map(|f| &f.overloads)
        .chain(model.templates.iter().flat_map(|t| {
            t.instantiations.iter().filter_map(|i| match &i.item {
                crate::export::ExportedItem::Function(f) => Some(f),
                crate::export::ExportedItem::Class(_) => None,
            })
        }));
    for function in functions {
        function.signature.param_types().for_each(&mut visit);
        visit(&function.signature.ret);
    }
    shared
}
