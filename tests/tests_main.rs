#[path = "helpers/mod.rs"]
mod helpers;
#[path = "codegen/mod.rs"]
mod codegen;
#[path = "runtime/mod.rs"]
mod runtime;
#[path = "pipeline/mod.rs"]
mod pipeline;
