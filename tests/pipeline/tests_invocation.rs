//! Invocations against the real filesystem.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use pxx::error::{Error, InvocationError};
use pxx::{Invocation, Settings, run};

use crate::helpers::source_fixtures::{BASIC_CLASS, UNSUPPORTED};

fn write_header(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_output_is_written() {
    let dir = TempDir::new().unwrap();
    let input = write_header(&dir, "basic_class.h", BASIC_CLASS);
    let output = dir.path().join("basic.cpp");

    let generated = run(&Invocation::new(&input).with_output(&output)).unwrap();
    assert_eq!(generated.module_name, "basic");
    assert_eq!(generated.written.as_deref(), Some(output.as_path()));

    let on_disk = fs::read_to_string(&output).unwrap();
    assert_eq!(on_disk, generated.text);
    assert!(on_disk.contains("PYBIND11_MODULE(basic, m)"));
    assert!(on_disk.contains("#include \"basic_class.h\""));
    assert!(on_disk.contains("// Generated from: basic_class.h"));
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let dir = TempDir::new().unwrap();
    let input = write_header(&dir, "basic_class.h", BASIC_CLASS);
    let first = dir.path().join("first.cpp");
    let second = dir.path().join("second.cpp");
    let settings = Settings {
        module_name: Some("basic".to_string()),
        ..Settings::default()
    };
    run(&Invocation::new(&input).with_output(&first).with_settings(settings.clone())).unwrap();
    run(&Invocation::new(&input).with_output(&second).with_settings(settings)).unwrap();
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let err = run(&Invocation::new(dir.path().join("absent.h"))).unwrap_err();
    assert!(matches!(err, Error::Invocation(InvocationError::MissingInput(_))));
}

#[test]
fn test_missing_output_directory() {
    let dir = TempDir::new().unwrap();
    let input = write_header(&dir, "basic_class.h", BASIC_CLASS);
    let output = dir.path().join("missing").join("basic.cpp");
    let err = run(&Invocation::new(&input).with_output(&output)).unwrap_err();
    assert!(matches!(
        err,
        Error::Invocation(InvocationError::MissingOutputDirectory(path)) if path == dir.path().join("missing")
    ));
    assert!(!output.exists());
}

#[test]
fn test_module_name_comes_from_input_without_output() {
    let dir = TempDir::new().unwrap();
    let input = write_header(&dir, "basic_class.h", BASIC_CLASS);
    let generated = run(&Invocation::new(&input)).unwrap();
    assert_eq!(generated.module_name, "basic_class");
    assert!(generated.written.is_none());
    assert!(generated.text.contains("PYBIND11_MODULE(basic_class, m)"));
}

#[test]
fn test_dump_serializes_the_export_model() {
    let dir = TempDir::new().unwrap();
    let input = write_header(&dir, "basic_class.h", BASIC_CLASS);
    let settings = Settings {
        dump: true,
        ..Settings::default()
    };
    let generated = run(&Invocation::new(&input).with_settings(settings)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&generated.text).unwrap();
    assert_eq!(value["classes"][0]["export_name"], "TestClass");
    assert!(!generated.text.contains("PYBIND11_MODULE"));
}

#[test]
fn test_settings_file_drives_the_run() {
    let dir = TempDir::new().unwrap();
    let input = write_header(&dir, "unsupported.h", UNSUPPORTED);
    let settings_path = dir.path().join("pxx.json");
    fs::write(&settings_path, r#"{"module_name": "configured", "strict": true}"#).unwrap();

    let settings = Settings::load(&settings_path).unwrap();
    let err = run(&Invocation::new(&input).with_settings(settings)).unwrap_err();
    assert!(matches!(err, Error::Render(_)));

    let lenient = Settings {
        module_name: Some("configured".to_string()),
        ..Settings::default()
    };
    let generated = run(&Invocation::new(&input).with_settings(lenient)).unwrap();
    assert_eq!(generated.skipped.len(), 1);
    assert!(generated.text.contains("PYBIND11_MODULE(configured, m)"));
}

#[test]
fn test_missing_settings_file() {
    let err = Settings::load(Path::new("/nonexistent/pxx.json")).unwrap_err();
    assert!(matches!(err, InvocationError::InvalidSettings(_)));
}
