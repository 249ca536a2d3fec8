//! Shared entry points whose instantiations are only partly renderable.

use crate::helpers::model_helpers::render;
use crate::helpers::source_fixtures::{PARTIAL_CLASS_TEMPLATE, UNSUPPORTED_RETURN_TEMPLATE};

#[test]
fn test_skipped_member_keeps_the_dispatcher() {
    let output = render(PARTIAL_CLASS_TEMPLATE);
    assert!(!output.is_complete());
    let entities: Vec<&str> = output.skipped.iter().map(|s| s.entity.as_str()).collect();
    assert_eq!(entities, vec!["Box<int>::table", "Box<double>::table"]);
    assert!(output.source.contains("static const pxx_runtime::Catalogue catalogue_Box{\"Box\","));
    assert!(output.source.contains("m.def(\"Box\""));
}

#[test]
fn test_dropped_dispatcher_is_recorded() {
    let output = render(UNSUPPORTED_RETURN_TEMPLATE);
    assert!(!output.is_complete());
    let entities: Vec<&str> = output.skipped.iter().map(|s| s.entity.as_str()).collect();
    assert_eq!(entities, vec!["table", "table", "table"]);
    assert!(output.skipped.iter().all(|s| s.ty.starts_with("std::map<")));
    assert!(!output.source.contains("catalogue_table"));
    assert!(!output.source.contains("m.def(\"table"));
}
