//! Generated module source for the fixture headers.

use pxx::codegen::Module;
use pxx::export::ExportPolicy;

use crate::helpers::model_helpers::{basic_class_source, export_model, export_model_with, render};
use crate::helpers::source_fixtures::{BASIC_CLASS, CLASS_TEMPLATE, FUNCTION_TEMPLATE, TENSOR};

#[test]
fn test_basic_class_registration() {
    let output = render(BASIC_CLASS);
    let source = &output.source;
    assert!(output.is_complete());
    assert!(source.starts_with("////"));
    assert!(source.contains("// Python bindings auto-generated by pxx. //"));
    assert!(source.contains("#include \"test.h\""));
    assert!(source.contains("namespace py = pybind11;"));
    assert!(source.contains("PYBIND11_MODULE(test, m)"));
    assert!(source.contains("pxx_runtime::register_errors(m);"));
    assert!(source.contains("py::class_<TestClass> cls(m, \"TestClass\");"));
    assert!(source.contains(
        "cls.def(\"get_int\", [](TestClass &self) -> int { return self.get_int(); });"
    ));
    assert!(source.contains("cls.def_property(\"public_member_1\""));
    assert!(source.contains("cls.def_property_readonly(\"public_member_2\""));
}

#[test]
fn test_private_members_are_not_registered() {
    let source = basic_class_source();
    assert!(!source.contains("self.a_"));
    assert!(!source.contains("\"b_\""));
}

#[test]
fn test_rendering_is_deterministic() {
    for fixture in [BASIC_CLASS, CLASS_TEMPLATE, FUNCTION_TEMPLATE, TENSOR] {
        let model = export_model(fixture);
        let module = Module::new("test", vec!["test.h".to_string()]);
        let first = module.render(&model).unwrap();
        let second = module.render(&model).unwrap();
        assert_eq!(first.source, second.source);
        assert_eq!(render(fixture).source, first.source);
    }
    assert_eq!(render(BASIC_CLASS).source, basic_class_source());
}

#[test]
fn test_class_template_instances_are_distinct_classes() {
    let source = render(CLASS_TEMPLATE).source;
    assert!(source.contains("py::class_<Sum<int, 3>> cls(m, \"Sum\");"));
    assert!(source.contains("py::class_<Sum<int, 1>> cls(m, \"Sum1\");"));
    assert!(source.contains("#include <pybind11/stl.h>"));
}

#[test]
fn test_shared_entry_point_gets_a_catalogue() {
    let source = render(FUNCTION_TEMPLATE).source;
    assert!(source.contains("m.def(\"sum_float_3\""));
    assert!(source.contains("m.def(\"sum_double_4\""));
    assert!(source.contains("static const pxx_runtime::Catalogue catalogue_sum{\"sum\","));
    assert!(source.contains("return catalogue_sum.call(m, args, kwargs);"));
    assert!(source.contains("static const pxx_runtime::Catalogue catalogue_hidden_sum{\"hidden_sum\","));
    assert!(source.contains("m.def(\"test\""));
    // The explicit instantiation duplicates an instance directive.
    assert_eq!(source.matches("m.def(\"sum_float_3\"").count(), 1);
}

#[test]
fn test_tensor_module_includes_tensor_support() {
    let output = render(TENSOR);
    assert!(output.is_complete());
    assert!(output.source.contains("#include <pybind11/eigen/tensor.h>"));
    assert!(output.source.contains("m.def(\"add\""));
    assert!(!output.source.contains("#include <pybind11/eigen.h>"));
}

#[test]
fn test_custom_header_and_includes() {
    let module = Module::new("test", vec!["test.h".to_string()])
        .with_header(Some("// custom banner".to_string()))
        .with_includes(vec!["extra.h".to_string(), "<vector>".to_string()]);
    let source = module.render(&export_model(BASIC_CLASS)).unwrap().source;
    assert!(source.starts_with("// custom banner\n"));
    assert!(!source.contains("auto-generated by pxx"));
    assert!(source.contains("#include \"extra.h\""));
    assert!(source.contains("#include <vector>"));
}

#[test]
fn test_policies_select_classes() {
    let model = export_model_with(BASIC_CLASS, &ExportPolicy::DefaultPublic);
    assert_eq!(model.classes.len(), 1);

    let model = export_model_with(BASIC_CLASS, &ExportPolicy::Explicit(vec!["TestClass".to_string()]));
    let source = Module::new("test", Vec::new()).render(&model).unwrap().source;
    assert!(source.contains("py::class_<TestClass> cls(m, \"TestClass\");"));
}

#[test]
fn test_single_element_matrix_keeps_rank_two() {
    let source = render(
        r#"#include <Eigen/Dense>

// pxx :: export
// pxx :: instance(["1"])
// pxx :: instance(["2"])
template <int N>
double trace(Eigen::Matrix<double, N, N> m);
"#,
    )
    .source;
    assert!(source.contains("#include <pybind11/eigen.h>"));
    assert!(source.contains("if (R == 1 && C != 1) {"));
    assert!(source.contains("if (C == 1 && R != 1) {"));
    assert!(source.contains("pxx_runtime::Pattern::array(pxx_runtime::Kind::Float, {1, 1})"));
    assert!(source.contains("pxx_runtime::Pattern::array(pxx_runtime::Kind::Float, {2, 2})"));
}
