use pxx::codegen::{Module, SkippedEntity};
use pxx::error::RenderError;

use crate::helpers::model_helpers::{export_model, render};
use crate::helpers::source_fixtures::UNSUPPORTED;

#[test]
fn test_unsupported_parameter_is_skipped_and_noted() {
    let output = render(UNSUPPORTED);
    assert!(!output.is_complete());
    assert_eq!(
        output.skipped,
        vec![SkippedEntity {
            entity: "configure".to_string(),
            ty: "std::map<int, int>".to_string(),
        }]
    );
    assert!(output
        .source
        .contains("// pxx: skipped `configure`: no marshaling rule for type `std::map<int, int>`"));
    assert!(!output.source.contains("m.def(\"configure\""));
    assert!(output.source.contains("m.def(\"count\""));
}

#[test]
fn test_strict_mode_aborts() {
    let err = Module::new("test", Vec::new())
        .strict(true)
        .render(&export_model(UNSUPPORTED))
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::UnrenderableEntity {
            entity: "configure".to_string(),
            ty: "std::map<int, int>".to_string(),
        }
    );
}
