//! Classes bound in-process: construction and attribute access.

use pxx::error::{ConversionError, RuntimeError};
use pxx::runtime::{HostArray, HostValue};

use crate::helpers::model_helpers::bind;
use crate::helpers::source_fixtures::{BASIC_CLASS, CLASS_TEMPLATE};

#[test]
fn test_basic_class_attributes() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    let attributes: Vec<&str> = class.attributes().collect();
    assert_eq!(
        attributes,
        vec!["get_string", "get_int", "public_member_1", "public_member_2"]
    );
    assert!(class.skipped().is_empty());
}

#[test]
fn test_fields_start_at_their_initializers() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    let object = class.construct(&[]).unwrap();
    assert_eq!(class.get(&object, "public_member_1").unwrap(), HostValue::Int(1));
    assert_eq!(class.get(&object, "public_member_2").unwrap(), HostValue::Int(2));
}

#[test]
fn test_mutable_field_round_trips() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    let object = class.construct(&[HostValue::Int(7)]).unwrap();
    class.set(&object, "public_member_1", &HostValue::Int(-12)).unwrap();
    assert_eq!(class.get(&object, "public_member_1").unwrap(), HostValue::Int(-12));
}

#[test]
fn test_const_field_is_read_only() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    let object = class.construct(&[]).unwrap();
    let err = class.set(&object, "public_member_2", &HostValue::Int(3)).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Conversion(ConversionError::ReadOnly { name }) if name == "public_member_2"
    ));
    assert_eq!(class.get(&object, "public_member_2").unwrap(), HostValue::Int(2));
}

#[test]
fn test_out_of_range_write_leaves_field_unchanged() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    let object = class.construct(&[]).unwrap();
    let err = class
        .set(&object, "public_member_1", &HostValue::Int(i64::from(i32::MAX) + 1))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Conversion(ConversionError::Range { .. })));
    assert_eq!(class.get(&object, "public_member_1").unwrap(), HostValue::Int(1));
}

#[test]
fn test_private_and_unknown_attributes() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    let object = class.construct(&[]).unwrap();
    assert!(!class.has_field("a_"));
    assert!(matches!(
        class.get(&object, "a_"),
        Err(RuntimeError::UnknownAttribute { name, .. }) if name == "a_"
    ));
}

#[test]
fn test_constructor_overloads() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    assert!(class.construct(&[HostValue::Int(99)]).is_ok());
    assert!(matches!(
        class.construct(&[HostValue::Str("x".to_string())]),
        Err(RuntimeError::Conversion(ConversionError::TypeMismatch { .. }))
    ));
}

#[test]
fn test_methods_resolve_overloads() {
    let module = bind(BASIC_CLASS);
    let class = module.class("TestClass").unwrap();
    assert_eq!(class.method_overload("get_int", &[]).unwrap(), 0);
    assert!(class.method_overload("get_int", &[HostValue::Int(1)]).is_err());
}

#[test]
fn test_primary_and_partial_instances_differ() {
    let module = bind(CLASS_TEMPLATE);

    let sum = module.class("Sum").unwrap();
    assert_eq!(sum.native(), "Sum<int, 3>");
    let object = sum.construct(&[]).unwrap();
    let data = sum.get(&object, "public_data").unwrap();
    assert_eq!(data.as_array().map(|a| a.shape.clone()), Some(vec![3]));
    let values = HostArray::from_ints(&[3], [4, 5, 6]).unwrap();
    sum.set(&object, "public_data", &HostValue::Array(values.clone())).unwrap();
    assert_eq!(
        sum.get(&object, "public_data").unwrap(),
        HostValue::Array(values)
    );
    let wrong = HostArray::from_ints(&[4], [1, 2, 3, 4]).unwrap();
    assert!(matches!(
        sum.set(&object, "public_data", &HostValue::Array(wrong)),
        Err(RuntimeError::Conversion(ConversionError::ShapeMismatch { .. }))
    ));

    let sum1 = module.class("Sum1").unwrap();
    assert_eq!(sum1.native(), "Sum<int, 1>");
    let object = sum1.construct(&[]).unwrap();
    sum1.set(&object, "public_data", &HostValue::Int(5)).unwrap();
    assert_eq!(sum1.get(&object, "public_data").unwrap(), HostValue::Int(5));
    assert!(sum1
        .set(&object, "public_data", &HostValue::Array(HostArray::vector([1.0])))
        .is_err());
}
