use std::fs;

use tempfile::TempDir;

use pxx::error::{Error, InvocationError};
use pxx::{Invocation, run, run_batch};

use crate::helpers::source_fixtures::{BASIC_CLASS, CLASS_TEMPLATE, FUNCTION_TEMPLATE};

#[test]
fn test_batch_results_follow_input_order() {
    let dir = TempDir::new().unwrap();
    let mut invocations = Vec::new();
    for (name, text) in [
        ("basic_class.h", BASIC_CLASS),
        ("class_template.h", CLASS_TEMPLATE),
        ("function_template.h", FUNCTION_TEMPLATE),
    ] {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        invocations.push(Invocation::new(path));
    }
    invocations.insert(1, Invocation::new(dir.path().join("absent.h")));

    let results = run_batch(&invocations);
    assert_eq!(results.len(), 4);
    let names: Vec<Option<&str>> = results
        .iter()
        .map(|r| r.as_ref().ok().map(|g| g.module_name.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![Some("basic_class"), None, Some("class_template"), Some("function_template")]
    );
    assert!(matches!(
        &results[1],
        Err(Error::Invocation(InvocationError::MissingInput(_)))
    ));
}

#[test]
fn test_batch_matches_sequential_runs() {
    let dir = TempDir::new().unwrap();
    let invocations: Vec<Invocation> = (0..4)
        .map(|i| {
            let path = dir.path().join(format!("unit{i}.h"));
            fs::write(&path, BASIC_CLASS).unwrap();
            Invocation::new(path)
        })
        .collect();
    let batch = run_batch(&invocations);
    for (invocation, result) in invocations.iter().zip(batch) {
        assert_eq!(result.unwrap().text, run(invocation).unwrap().text);
    }
}
