//! Template entry points shared by several instantiations.

use rstest::rstest;

use pxx::error::{DispatchError, RuntimeError};
use pxx::runtime::{HostArray, HostValue};

use crate::helpers::model_helpers::{bind, export_model};
use crate::helpers::source_fixtures::{
    FUNCTION_TEMPLATE, PARTIAL_CLASS_TEMPLATE, RANKED, TENSOR, UNSUPPORTED_RETURN_TEMPLATE,
};

fn floats(n: usize) -> HostValue {
    HostValue::Array(HostArray::vector(vec![1.0; n]))
}

fn tensor(shape: &[usize]) -> HostValue {
    let len = shape.iter().product::<usize>();
    HostValue::Array(HostArray::from_floats(shape, vec![0.5; len]).unwrap())
}

#[rstest]
#[case("sum", 3, "sum<float, 3>", "sum_float_3")]
#[case("sum", 4, "sum<double, 4>", "sum_double_4")]
#[case("hidden_sum", 3, "detail::sum<float, 3>", "hidden_sum_float_3")]
#[case("hidden_sum", 4, "detail::sum<double, 4>", "hidden_sum_double_4")]
fn test_length_selects_instantiation(
    #[case] entry_point: &str,
    #[case] len: usize,
    #[case] native: &str,
    #[case] binding: &str,
) {
    let module = bind(FUNCTION_TEMPLATE);
    let dispatcher = module.dispatcher(entry_point).unwrap();
    let resolved = dispatcher.resolve(&[floats(len)]).unwrap();
    assert_eq!(resolved.entry.native, native);
    assert_eq!(resolved.binding, binding);
}

#[test]
fn test_unlisted_length_has_no_match() {
    let module = bind(FUNCTION_TEMPLATE);
    let err = module.dispatcher("sum").unwrap().resolve(&[floats(5)]).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::NoMatchingInstantiation { name, .. } if name == "sum"
    ));
}

#[test]
fn test_instantiations_are_bound_individually() {
    let module = bind(FUNCTION_TEMPLATE);
    let symbols: Vec<&str> = module.symbols().collect();
    for name in ["test", "sum_float_3", "sum_double_4", "hidden_sum_float_3", "sum", "hidden_sum"] {
        assert!(symbols.contains(&name), "missing {name}");
    }
    assert_eq!(module.function_overload("sum_float_3", &[floats(3)]).unwrap(), 0);
    assert!(module.function_overload("sum_float_3", &[floats(4)]).is_err());
    assert_eq!(module.function_overload("test", &[HostValue::Int(1)]).unwrap(), 0);
}

#[test]
fn test_catalogue_keeps_directive_order() {
    let model = export_model(FUNCTION_TEMPLATE);
    let template = model.template("sum").unwrap();
    let natives: Vec<&str> = template.instantiations.iter().map(|i| i.native.as_str()).collect();
    assert_eq!(natives, vec!["sum<float, 3>", "sum<double, 4>"]);
}

#[rstest]
#[case(&[4], "norm<1>")]
#[case(&[2, 3], "norm<2>")]
fn test_rank_selects_instantiation(#[case] shape: &[usize], #[case] native: &str) {
    let module = bind(RANKED);
    let resolved = module.dispatcher("norm").unwrap().resolve(&[tensor(shape)]).unwrap();
    assert_eq!(resolved.entry.native, native);
}

#[test]
fn test_unlisted_rank_has_no_match() {
    let module = bind(RANKED);
    let err = module
        .dispatcher("norm")
        .unwrap()
        .resolve(&[tensor(&[2, 2, 2])])
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoMatchingInstantiation { .. }));
    assert!(err.to_string().contains("array<float>[2, 2, 2]"));
}

#[test]
fn test_fixed_rank_function_rejects_other_ranks() {
    let module = bind(TENSOR);
    assert_eq!(
        module
            .function_overload("add", &[tensor(&[2, 2, 2]), tensor(&[1, 2, 3])])
            .unwrap(),
        0
    );
    assert!(matches!(
        module.function_overload("add", &[tensor(&[2, 2]), tensor(&[2, 2])]),
        Err(RuntimeError::Conversion(_))
    ));
}

#[test]
fn test_skipped_member_keeps_the_dispatcher() {
    let module = bind(PARTIAL_CLASS_TEMPLATE);
    assert!(module.dispatcher("Box").is_some());
    assert!(module.skipped().contains(&"Box_int.table".to_string()));
    assert!(module.skipped().contains(&"Box_double.table".to_string()));
    let (_, class) = module.construct("Box", &[HostValue::Int(1)]).unwrap();
    assert_eq!(class.native(), "Box<int>");
}

#[test]
fn test_unsupported_return_drops_instantiations_and_dispatcher() {
    let module = bind(UNSUPPORTED_RETURN_TEMPLATE);
    assert!(module.dispatcher("table").is_none());
    for name in ["table_int", "table_double", "table"] {
        assert!(module.skipped().contains(&name.to_string()), "{name} not skipped");
    }
    let symbols: Vec<&str> = module.symbols().collect();
    assert!(!symbols.contains(&"table_int"));
    assert!(!symbols.contains(&"table"));
}
