//! Helpers building models, bound modules and rendered sources from
//! in-memory headers.

use std::path::Path;

use once_cell::sync::Lazy;

use pxx::codegen::{Module, RenderOutput};
use pxx::export::{self, ExportModel, ExportPolicy};
use pxx::frontend::{CxxFrontend, MemorySource};
use pxx::model;
use pxx::runtime::BoundModule;

static BASIC_CLASS_SOURCE: Lazy<String> =
    Lazy::new(|| render(super::source_fixtures::BASIC_CLASS).source);

/// Path every single-file fixture is mounted at.
pub const FIXTURE_PATH: &str = "/fixtures/test.h";

pub fn frontend(text: &str) -> CxxFrontend<MemorySource> {
    CxxFrontend::with_source(MemorySource::new().with_file(FIXTURE_PATH, text))
}

pub fn export_model_with(text: &str, policy: &ExportPolicy) -> ExportModel {
    let unit = model::load(&frontend(text), Path::new(FIXTURE_PATH), &[]).expect("fixture should load");
    export::resolve(&unit, policy).expect("fixture should resolve")
}

/// Export model of `text` under the annotated policy.
pub fn export_model(text: &str) -> ExportModel {
    export_model_with(text, &ExportPolicy::Annotated)
}

pub fn bind(text: &str) -> BoundModule {
    BoundModule::bind("test", &export_model(text))
}

pub fn render(text: &str) -> RenderOutput {
    Module::new("test", vec!["test.h".to_string()])
        .render(&export_model(text))
        .expect("fixture should render")
}

/// Rendered source of the basic class fixture, computed once per test run.
pub fn basic_class_source() -> &'static str {
    &BASIC_CLASS_SOURCE
}
