//! Host ⇄ native converters.
//!
//! Integer conversions are exact or fail with a range error. Floats never
//! silently turn into integers. Array buffers are rebuilt element by element
//! in the native layout.

use super::native::{ArrayType, Layout, NativeType, Ownership, ScalarKind};
use super::value::{NativeArray, NativeScalar, NativeValue, relayout};
use crate::error::ConversionError;
use crate::runtime::value::join;
use crate::runtime::{HostArray, HostBuffer, HostValue};

/// Whether `value` has the right kind for `ty`, ignoring range and shape.
pub fn accepts(ty: &NativeType, value: &HostValue, is_subclass: &dyn Fn(&str, &str) -> bool) -> bool {
    match (ty, value) {
        (NativeType::HostObject, _) => true,
        (NativeType::Scalar { kind }, value) => scalar_accepts(*kind, value),
        (NativeType::String { .. }, HostValue::Str(_)) => true,
        (NativeType::Array(a), HostValue::Array(h)) => element_accepts(a.element, h),
        (NativeType::Object { ownership, .. }, HostValue::None) => *ownership == Ownership::Borrowed,
        (NativeType::Object { class, .. }, HostValue::Object(o)) => {
            o.class() == class || is_subclass(o.class(), class)
        }
        _ => false,
    }
}

fn scalar_accepts(kind: ScalarKind, value: &HostValue) -> bool {
    match (kind, value) {
        (ScalarKind::Bool, HostValue::Bool(_)) => true,
        (ScalarKind::Char, HostValue::Str(s)) => s.chars().count() == 1,
        (k, HostValue::Int(_)) if k.is_integer() || k.is_float() => true,
        (k, HostValue::Float(_)) => k.is_float(),
        _ => false,
    }
}

fn element_accepts(kind: ScalarKind, array: &HostArray) -> bool {
    match array.buffer {
        HostBuffer::Bool(_) => kind == ScalarKind::Bool,
        HostBuffer::Int(_) => kind.is_integer() || kind.is_float(),
        HostBuffer::Float(_) => kind.is_float(),
    }
}

/// Convert a host value for a parameter or field of type `ty`.
pub fn to_native(
    ty: &NativeType,
    value: &HostValue,
    is_subclass: &dyn Fn(&str, &str) -> bool,
) -> Result<NativeValue, ConversionError> {
    match ty {
        NativeType::Void => Err(ConversionError::mismatch("void", value.type_name())),
        NativeType::Scalar { kind } => scalar_to_native(*kind, value).map(NativeValue::Scalar),
        NativeType::String { .. } => match value {
            HostValue::Str(s) => Ok(NativeValue::Str(s.clone())),
            other => Err(ConversionError::mismatch("str", other.type_name())),
        },
        NativeType::Array(array) => match value {
            HostValue::Array(host) => array_to_native(array, host).map(NativeValue::Array),
            other => Err(ConversionError::mismatch(
                format!("array<{}>{}", array.element, array.describe_shape()),
                other.type_name(),
            )),
        },
        NativeType::Object { class, ownership } => match value {
            HostValue::Object(handle) if accepts(ty, value, is_subclass) => {
                Ok(NativeValue::Object(match ownership {
                    Ownership::Borrowed => handle.borrow(),
                    Ownership::Shared => handle.share().map_err(|_| {
                        ConversionError::mismatch(format!("std::shared_ptr<{class}>"), handle.class())
                    })?,
                    Ownership::OwnedByWrapper => handle.clone(),
                }))
            }
            HostValue::None if *ownership == Ownership::Borrowed => Ok(NativeValue::Null),
            other => Err(ConversionError::mismatch(class.clone(), other.type_name())),
        },
        NativeType::HostObject => Err(ConversionError::mismatch(
            "a native value",
            format!("{} passed through as object", value.type_name()),
        )),
    }
}

/// Convert a native result or field value back to the host.
pub fn to_host(ty: &NativeType, value: &NativeValue) -> Result<HostValue, ConversionError> {
    match (ty, value) {
        (NativeType::Void, NativeValue::Void) => Ok(HostValue::None),
        (NativeType::Scalar { .. }, NativeValue::Scalar(s)) => scalar_to_host(s),
        (NativeType::String { .. }, NativeValue::Str(s)) => Ok(HostValue::Str(s.clone())),
        (NativeType::Array(_), NativeValue::Array(a)) => array_to_host(a).map(HostValue::Array),
        (NativeType::Object { ownership, .. }, NativeValue::Object(handle)) => {
            Ok(HostValue::Object(match ownership {
                Ownership::Borrowed => handle.borrow(),
                _ => handle.clone(),
            }))
        }
        (NativeType::Object { .. }, NativeValue::Null) => Ok(HostValue::None),
        (ty, value) => Err(ConversionError::mismatch(ty.to_string(), format!("{value:?}"))),
    }
}

fn scalar_to_native(kind: ScalarKind, value: &HostValue) -> Result<NativeScalar, ConversionError> {
    match (kind, value) {
        (ScalarKind::Bool, HostValue::Bool(b)) => Ok(NativeScalar::Bool(*b)),
        (ScalarKind::Char, HostValue::Str(s)) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => Ok(NativeScalar::Char(c)),
                _ => Err(ConversionError::range(format!("{s:?}"), "char")),
            }
        }
        (k, HostValue::Int(i)) if k.is_integer() => integer(k, i128::from(*i)),
        (k, HostValue::Int(i)) if k.is_float() => int_to_float(k, *i),
        (k, HostValue::Float(f)) if k.is_float() => float(k, *f),
        (k, other) => Err(ConversionError::mismatch(k.cpp(), other.type_name())),
    }
}

fn integer(kind: ScalarKind, value: i128) -> Result<NativeScalar, ConversionError> {
    let Some((min, max)) = kind.integer_range() else {
        return Err(ConversionError::mismatch(kind.cpp(), "int"));
    };
    if value < min || value > max {
        return Err(ConversionError::range(value, kind.cpp()));
    }
    Ok(if kind.is_signed() {
        NativeScalar::Signed(kind, value as i64)
    } else {
        NativeScalar::Unsigned(kind, value as u64)
    })
}

fn float(kind: ScalarKind, value: f64) -> Result<NativeScalar, ConversionError> {
    if kind == ScalarKind::F32 && value.is_finite() && value.abs() > f64::from(f32::MAX) {
        return Err(ConversionError::range(value, kind.cpp()));
    }
    let value = if kind == ScalarKind::F32 {
        f64::from(value as f32)
    } else {
        value
    };
    Ok(NativeScalar::Float(kind, value))
}

/// Integers convert to a float kind only when the kind represents them
/// exactly.
fn int_to_float(kind: ScalarKind, value: i64) -> Result<NativeScalar, ConversionError> {
    let exact = if kind == ScalarKind::F32 {
        (value as f32) as i128 == i128::from(value)
    } else {
        (value as f64) as i128 == i128::from(value)
    };
    if !exact {
        return Err(ConversionError::range(value, kind.cpp()));
    }
    float(kind, value as f64)
}

fn scalar_to_host(scalar: &NativeScalar) -> Result<HostValue, ConversionError> {
    Ok(match scalar {
        NativeScalar::Bool(b) => HostValue::Bool(*b),
        NativeScalar::Char(c) => HostValue::Str(c.to_string()),
        NativeScalar::Signed(_, v) => HostValue::Int(*v),
        NativeScalar::Unsigned(_, v) => HostValue::Int(unsigned_to_host(*v)?),
        NativeScalar::Float(_, v) => HostValue::Float(*v),
    })
}

fn unsigned_to_host(value: u64) -> Result<i64, ConversionError> {
    i64::try_from(value).map_err(|_| ConversionError::range(value, "int"))
}

fn array_to_native(ty: &ArrayType, host: &HostArray) -> Result<NativeArray, ConversionError> {
    if !ty.accepts_shape(&host.shape) {
        return Err(ConversionError::shape(
            ty.describe_shape(),
            format!("[{}]", join(&host.shape)),
        ));
    }
    let elements: Vec<NativeScalar> = match &host.buffer {
        HostBuffer::Bool(v) if ty.element == ScalarKind::Bool => {
            v.iter().map(|b| NativeScalar::Bool(*b)).collect()
        }
        HostBuffer::Int(v) if ty.element.is_integer() => v
            .iter()
            .map(|i| integer(ty.element, i128::from(*i)))
            .collect::<Result<_, _>>()?,
        HostBuffer::Int(v) if ty.element.is_float() => v
            .iter()
            .map(|i| int_to_float(ty.element, *i))
            .collect::<Result<_, _>>()?,
        HostBuffer::Float(v) if ty.element.is_float() => v
            .iter()
            .map(|f| float(ty.element, *f))
            .collect::<Result<_, _>>()?,
        buffer => {
            return Err(ConversionError::mismatch(
                format!("array<{}>", ty.element),
                format!("array<{}>", buffer.element()),
            ));
        }
    };
    let layout = if ty.dims.is_none() { Layout::RowMajor } else { ty.layout };
    Ok(NativeArray {
        element: ty.element,
        data: relayout(&elements, &host.shape, Layout::RowMajor, layout),
        shape: host.shape.clone(),
        layout,
    })
}

fn array_to_host(array: &NativeArray) -> Result<HostArray, ConversionError> {
    let row_major = relayout(&array.data, &array.shape, array.layout, Layout::RowMajor);
    let buffer = if array.element == ScalarKind::Bool {
        HostBuffer::Bool(row_major.iter().map(|s| matches!(s, NativeScalar::Bool(true))).collect())
    } else if array.element.is_float() {
        HostBuffer::Float(row_major.iter().map(NativeScalar::as_f64).collect())
    } else {
        HostBuffer::Int(
            row_major
                .iter()
                .map(|s| match s {
                    NativeScalar::Signed(_, v) => Ok(*v),
                    NativeScalar::Unsigned(_, v) => unsigned_to_host(*v),
                    other => Err(ConversionError::mismatch("int", format!("{other:?}"))),
                })
                .collect::<Result<_, _>>()?,
        )
    };
    Ok(HostArray {
        shape: array.shape.clone(),
        buffer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::native::{ArrayFamily, Dim};
    use crate::types::TypeExpr;
    use rstest::rstest;

    fn native(text: &str) -> NativeType {
        NativeType::classify(&TypeExpr::parse(text).unwrap(), &|_| false).unwrap()
    }

    fn no_bases(_: &str, _: &str) -> bool {
        false
    }

    #[rstest]
    #[case("unsigned char", HostValue::Int(256))]
    #[case("unsigned int", HostValue::Int(-1))]
    #[case("short", HostValue::Int(40_000))]
    #[case("int", HostValue::Int(1 << 40))]
    #[case("float", HostValue::Float(1e300))]
    #[case("double", HostValue::Int((1 << 53) + 1))]
    #[case("double", HostValue::Int(i64::MAX))]
    #[case("float", HostValue::Int(16_777_217))]
    fn test_out_of_range_values_fail(#[case] ty: &str, #[case] value: HostValue) {
        let err = to_native(&native(ty), &value, &no_bases).unwrap_err();
        assert!(matches!(err, ConversionError::Range { .. }), "{err}");
    }

    #[rstest]
    #[case("int", HostValue::Float(1.5))]
    #[case("bool", HostValue::Int(1))]
    #[case("std::string", HostValue::Int(1))]
    #[case("double", HostValue::Str("1".into()))]
    fn test_wrong_kinds_fail(#[case] ty: &str, #[case] value: HostValue) {
        let err = to_native(&native(ty), &value, &no_bases).unwrap_err();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_scalars_round_trip() {
        for (ty, value) in [
            ("int", HostValue::Int(-42)),
            ("std::uint64_t", HostValue::Int(7)),
            ("double", HostValue::Float(0.25)),
            ("bool", HostValue::Bool(true)),
            ("char", HostValue::Str("x".into())),
            ("const std::string&", HostValue::Str("hello".into())),
        ] {
            let ty = native(ty);
            let converted = to_native(&ty, &value, &no_bases).unwrap();
            assert_eq!(to_host(&ty, &converted).unwrap(), value);
        }
    }

    #[test]
    fn test_int_is_accepted_for_float() {
        let value = to_native(&native("float"), &HostValue::Int(3), &no_bases).unwrap();
        assert_eq!(value, NativeValue::Scalar(NativeScalar::Float(ScalarKind::F32, 3.0)));
        let value = to_native(&native("double"), &HostValue::Int(1 << 53), &no_bases).unwrap();
        assert_eq!(
            value,
            NativeValue::Scalar(NativeScalar::Float(ScalarKind::F64, 9_007_199_254_740_992.0))
        );
    }

    #[test]
    fn test_array_shape_is_checked() {
        let ty = native("std::array<float, 3>");
        let err = to_native(&ty, &HostArray::vector([1.0, 2.0]).into(), &no_bases).unwrap_err();
        assert_eq!(err, ConversionError::shape("[3]", "[2]"));
        let matrix = HostArray::from_floats(&[3, 1], [1.0, 2.0, 3.0]).unwrap();
        let err = to_native(&ty, &matrix.into(), &no_bases).unwrap_err();
        assert!(matches!(err, ConversionError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_column_major_storage_round_trips() {
        let ty = native("Eigen::MatrixXd");
        let NativeType::Array(array) = &ty else {
            panic!("expected array");
        };
        assert_eq!(array.family, ArrayFamily::EigenMatrix);
        assert_eq!(array.dims, Some(vec![Dim::Dynamic, Dim::Dynamic]));

        let host = HostArray::from_floats(&[2, 3], [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let NativeValue::Array(stored) = to_native(&ty, &host.clone().into(), &no_bases).unwrap()
        else {
            panic!("expected array");
        };
        let column_major: Vec<f64> = stored.data.iter().map(NativeScalar::as_f64).collect();
        assert_eq!(column_major, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(
            to_host(&ty, &NativeValue::Array(stored)).unwrap(),
            HostValue::Array(host)
        );
    }

    #[test]
    fn test_integer_buffers_are_range_checked() {
        let ty = native("std::vector<unsigned char>");
        let host = HostArray::from_ints(&[2], [1, 300]).unwrap();
        let err = to_native(&ty, &host.into(), &no_bases).unwrap_err();
        assert!(matches!(err, ConversionError::Range { .. }));

        let ty = native("std::vector<float>");
        let host = HostArray::from_ints(&[2], [1, 16_777_217]).unwrap();
        let err = to_native(&ty, &host.into(), &no_bases).unwrap_err();
        assert!(matches!(err, ConversionError::Range { .. }));
    }
}
