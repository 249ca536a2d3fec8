//! Native type descriptors: the marshaling view of a [`TypeExpr`].

use serde::Serialize;
use std::fmt;

use crate::types::{TemplateArg, TypeExpr, TypeName};

/// Element and scalar types with a host representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    /// Plain `char`: a one-character string on the host side.
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    /// Classify a fundamental spelling or a fixed-width alias.
    pub fn from_spelling(spelling: &str) -> Option<Self> {
        let spelling = spelling.strip_prefix("std::").unwrap_or(spelling);
        Some(match spelling {
            "bool" => ScalarKind::Bool,
            "char" => ScalarKind::Char,
            "signed char" | "int8_t" => ScalarKind::I8,
            "unsigned char" | "uint8_t" => ScalarKind::U8,
            "short" | "int16_t" => ScalarKind::I16,
            "unsigned short" | "uint16_t" => ScalarKind::U16,
            "int" | "int32_t" => ScalarKind::I32,
            "unsigned int" | "uint32_t" => ScalarKind::U32,
            "long" | "long long" | "int64_t" | "ptrdiff_t" | "ssize_t" | "intptr_t" => {
                ScalarKind::I64
            }
            "unsigned long" | "unsigned long long" | "uint64_t" | "size_t" | "uintptr_t" => {
                ScalarKind::U64
            }
            "float" => ScalarKind::F32,
            "double" => ScalarKind::F64,
            _ => return None,
        })
    }

    /// Canonical C++ spelling.
    pub fn cpp(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Char => "char",
            ScalarKind::I8 => "std::int8_t",
            ScalarKind::I16 => "std::int16_t",
            ScalarKind::I32 => "std::int32_t",
            ScalarKind::I64 => "std::int64_t",
            ScalarKind::U8 => "std::uint8_t",
            ScalarKind::U16 => "std::uint16_t",
            ScalarKind::U32 => "std::uint32_t",
            ScalarKind::U64 => "std::uint64_t",
            ScalarKind::F32 => "float",
            ScalarKind::F64 => "double",
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(
            self,
            ScalarKind::Bool | ScalarKind::Char | ScalarKind::F32 | ScalarKind::F64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64
        )
    }

    /// Inclusive value range of an integer kind.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        Some(match self {
            ScalarKind::I8 => (i8::MIN.into(), i8::MAX.into()),
            ScalarKind::I16 => (i16::MIN.into(), i16::MAX.into()),
            ScalarKind::I32 => (i32::MIN.into(), i32::MAX.into()),
            ScalarKind::I64 => (i64::MIN.into(), i64::MAX.into()),
            ScalarKind::U8 => (0, u8::MAX.into()),
            ScalarKind::U16 => (0, u16::MAX.into()),
            ScalarKind::U32 => (0, u32::MAX.into()),
            ScalarKind::U64 => (0, u64::MAX.into()),
            _ => return None,
        })
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cpp())
    }
}

/// Storage order of a multi-dimensional buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    RowMajor,
    ColMajor,
}

/// One dimension of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Fixed(usize),
    Dynamic,
}

impl Dim {
    pub fn accepts(&self, len: usize) -> bool {
        match self {
            Dim::Fixed(n) => *n == len,
            Dim::Dynamic => true,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{n}"),
            Dim::Dynamic => f.write_str("*"),
        }
    }
}

/// The container family an array type comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayFamily {
    StdArray,
    StdVector,
    EigenMatrix,
    EigenTensor,
    /// `py::array_t<T>`: any rank, passed through.
    HostArray,
}

/// A dense array type with its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArrayType {
    pub family: ArrayFamily,
    pub element: ScalarKind,
    /// `None` accepts any rank.
    pub dims: Option<Vec<Dim>>,
    pub layout: Layout,
}

impl ArrayType {
    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(Vec::len)
    }

    /// Whether a buffer of `shape` fits the declared dimensions.
    pub fn accepts_shape(&self, shape: &[usize]) -> bool {
        match &self.dims {
            None => true,
            Some(dims) => {
                dims.len() == shape.len() && dims.iter().zip(shape).all(|(d, n)| d.accepts(*n))
            }
        }
    }

    /// `[3, *]`; `[..]` for any rank.
    pub fn describe_shape(&self) -> String {
        match &self.dims {
            None => "[..]".to_string(),
            Some(dims) => {
                let dims: Vec<String> = dims.iter().map(Dim::to_string).collect();
                format!("[{}]", dims.join(", "))
            }
        }
    }
}

/// Who destroys the native object behind a host handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// The wrapper owns the object and destroys it exactly once.
    #[default]
    OwnedByWrapper,
    /// The object lives elsewhere; the wrapper never destroys it.
    Borrowed,
    /// Reference counted; destroyed when the last holder releases it.
    Shared,
}

/// The marshaling category of a native type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum NativeType {
    Void,
    Scalar { kind: ScalarKind },
    /// `std::string` or `const char*`; always copied.
    String { c_str: bool },
    Array(ArrayType),
    /// An exported class, by its native spelling.
    Object { class: String, ownership: Ownership },
    /// `py::object`: any host value, passed through.
    HostObject,
}

impl NativeType {
    /// Classify `ty`. `is_class` tells whether a spelling names an exported
    /// class. `None` means there is no marshaling rule for the type.
    pub fn classify(ty: &TypeExpr, is_class: &dyn Fn(&str) -> bool) -> Option<NativeType> {
        let bare = ty.strip_ref_cv();
        if bare.is_void() {
            return Some(NativeType::Void);
        }
        if ty.is_reference() && !bare.is_pointer() {
            // References to classes are borrowed; everything else is by value.
            return match NativeType::by_value(&bare, is_class)? {
                NativeType::Object { class, .. } => Some(NativeType::Object {
                    class,
                    ownership: Ownership::Borrowed,
                }),
                other => Some(other),
            };
        }
        if let Some(pointee) = bare.pointee() {
            if pointee.is_pointer() {
                return None;
            }
            if pointee.as_fundamental() == Some("char") && pointee.is_const {
                return Some(NativeType::String { c_str: true });
            }
            let spelling = class_spelling(&pointee)?;
            return is_class(&spelling).then_some(NativeType::Object {
                class: spelling,
                ownership: Ownership::Borrowed,
            });
        }
        NativeType::by_value(&bare, is_class)
    }

    fn by_value(ty: &TypeExpr, is_class: &dyn Fn(&str) -> bool) -> Option<NativeType> {
        if let Some(fundamental) = ty.as_fundamental() {
            return ScalarKind::from_spelling(fundamental).map(|kind| NativeType::Scalar { kind });
        }
        let name = ty.name()?;
        if !ty.declarators.is_empty() {
            return None;
        }
        let path = name.path();
        let path = path.strip_prefix("::").unwrap_or(&path);
        let args = name.args();
        match path {
            "std::string" => return Some(NativeType::String { c_str: false }),
            "std::shared_ptr" | "std::unique_ptr" => {
                let inner = args.first()?.as_type()?;
                let spelling = class_spelling(&inner.strip_ref_cv())?;
                let ownership = if path == "std::shared_ptr" {
                    Ownership::Shared
                } else {
                    Ownership::OwnedByWrapper
                };
                return is_class(&spelling).then_some(NativeType::Object {
                    class: spelling,
                    ownership,
                });
            }
            "py::object" | "pybind11::object" => return Some(NativeType::HostObject),
            _ => {}
        }
        if let Some(kind) = ScalarKind::from_spelling(path).filter(|_| args.is_empty()) {
            return Some(NativeType::Scalar { kind });
        }
        if let Some(array) = array_type(path, name) {
            return Some(NativeType::Array(array));
        }
        let spelling = class_spelling(ty)?;
        is_class(&spelling).then_some(NativeType::Object {
            class: spelling,
            ownership: Ownership::OwnedByWrapper,
        })
    }

    /// Whether the type belongs to a family that needs an extra pybind11
    /// header.
    pub fn uses_family(&self, family: ArrayFamily) -> bool {
        matches!(self, NativeType::Array(a) if a.family == family)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => f.write_str("void"),
            NativeType::Scalar { kind } => write!(f, "{kind}"),
            NativeType::String { .. } => f.write_str("str"),
            NativeType::Array(a) => write!(f, "array<{}>{}", a.element, a.describe_shape()),
            NativeType::Object { class, .. } => f.write_str(class),
            NativeType::HostObject => f.write_str("object"),
        }
    }
}

/// Spelling of a class type without cv or declarators: `ns::A`, `Sum<int, 3>`.
fn class_spelling(ty: &TypeExpr) -> Option<String> {
    if ty.name().is_none() || !ty.declarators.is_empty() {
        return None;
    }
    let mut bare = ty.clone();
    bare.is_const = false;
    bare.is_volatile = false;
    let spelling = bare.to_string();
    Some(spelling.strip_prefix("::").map(str::to_string).unwrap_or(spelling))
}

fn element_of(arg: &TemplateArg) -> Option<ScalarKind> {
    let ty = arg.as_type()?;
    if !ty.declarators.is_empty() {
        return None;
    }
    match ty.as_fundamental() {
        Some(fundamental) => ScalarKind::from_spelling(fundamental),
        None => ty
            .name()
            .filter(|n| n.args().is_empty())
            .and_then(|n| ScalarKind::from_spelling(&n.path())),
    }
    .filter(|k| *k != ScalarKind::Char)
}

fn dim_of(arg: &TemplateArg) -> Option<Dim> {
    if let Some(n) = arg.as_integer() {
        return match n {
            -1 => Some(Dim::Dynamic),
            n if n >= 0 => Some(Dim::Fixed(n as usize)),
            _ => None,
        };
    }
    match arg.last_word() {
        Some("Dynamic") => Some(Dim::Dynamic),
        _ => None,
    }
}

fn layout_of(arg: Option<&TemplateArg>) -> Layout {
    match arg {
        Some(arg) => {
            let text = arg.to_string();
            if text.contains("RowMajor") {
                Layout::RowMajor
            } else {
                Layout::ColMajor
            }
        }
        None => Layout::ColMajor,
    }
}

fn array_type(path: &str, name: &TypeName) -> Option<ArrayType> {
    let args = name.args();
    match path {
        "std::array" => {
            let (element, mut dims) = nested_element(args.first()?, "std::array")?;
            dims.insert(0, Dim::Fixed(args.get(1)?.as_integer()?.try_into().ok()?));
            Some(ArrayType {
                family: ArrayFamily::StdArray,
                element,
                dims: Some(dims),
                layout: Layout::RowMajor,
            })
        }
        "std::vector" => {
            let (element, mut dims) = nested_element(args.first()?, "std::vector")?;
            dims.insert(0, Dim::Dynamic);
            Some(ArrayType {
                family: ArrayFamily::StdVector,
                element,
                dims: Some(dims),
                layout: Layout::RowMajor,
            })
        }
        "Eigen::Matrix" | "Eigen::Array" => {
            let element = element_of(args.first()?)?;
            let rows = dim_of(args.get(1)?)?;
            let cols = dim_of(args.get(2)?)?;
            let layout = layout_of(args.get(3));
            Some(eigen_matrix(element, rows, cols, layout))
        }
        "Eigen::Tensor" => {
            let element = element_of(args.first()?)?;
            let rank: usize = args.get(1)?.as_integer()?.try_into().ok()?;
            Some(ArrayType {
                family: ArrayFamily::EigenTensor,
                element,
                dims: Some(vec![Dim::Dynamic; rank]),
                layout: layout_of(args.get(2)),
            })
        }
        "py::array_t" | "pybind11::array_t" => Some(ArrayType {
            family: ArrayFamily::HostArray,
            element: element_of(args.first()?)?,
            dims: None,
            layout: Layout::RowMajor,
        }),
        _ => eigen_typedef(path),
    }
}

/// Element and inner dimensions of a possibly nested standard container.
fn nested_element(arg: &TemplateArg, family: &str) -> Option<(ScalarKind, Vec<Dim>)> {
    if let Some(element) = element_of(arg) {
        return Some((element, Vec::new()));
    }
    let ty = arg.as_type()?;
    let name = ty.name()?;
    if name.path() != family || !ty.declarators.is_empty() {
        return None;
    }
    let array = array_type(family, name)?;
    Some((array.element, array.dims?))
}

/// Vectors (one fixed or dynamic dimension of extent 1) have rank 1.
fn eigen_matrix(element: ScalarKind, rows: Dim, cols: Dim, layout: Layout) -> ArrayType {
    let dims = match (rows, cols) {
        (rows, Dim::Fixed(1)) if rows != Dim::Fixed(1) => vec![rows],
        (Dim::Fixed(1), cols) if cols != Dim::Fixed(1) => vec![cols],
        (rows, cols) => vec![rows, cols],
    };
    ArrayType {
        family: ArrayFamily::EigenMatrix,
        element,
        dims: Some(dims),
        layout,
    }
}

/// `Eigen::MatrixXd`, `Eigen::Vector3f`, `Eigen::RowVectorXi`, ...
fn eigen_typedef(path: &str) -> Option<ArrayType> {
    let name = path.strip_prefix("Eigen::")?;
    let (shape, rest) = ["RowVector", "Vector", "Matrix", "Array"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix).map(|rest| (*prefix, rest)))?;
    let mut chars = rest.chars();
    let size = match chars.next()? {
        'X' => Dim::Dynamic,
        c @ '2'..='4' => Dim::Fixed(c as usize - '0' as usize),
        _ => return None,
    };
    let element = match chars.as_str() {
        "i" => ScalarKind::I32,
        "f" => ScalarKind::F32,
        "d" => ScalarKind::F64,
        _ => return None,
    };
    Some(match shape {
        "Vector" => eigen_matrix(element, size, Dim::Fixed(1), Layout::ColMajor),
        "RowVector" => eigen_matrix(element, Dim::Fixed(1), size, Layout::RowMajor),
        _ => eigen_matrix(element, size, size, Layout::ColMajor),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classify(text: &str) -> Option<NativeType> {
        let ty = TypeExpr::parse(text).unwrap();
        NativeType::classify(&ty, &|name| name == "A" || name == "ns::B")
    }

    fn array(text: &str) -> ArrayType {
        match classify(text) {
            Some(NativeType::Array(a)) => a,
            other => panic!("{text}: expected array, got {other:?}"),
        }
    }

    #[rstest]
    #[case("int", ScalarKind::I32)]
    #[case("const unsigned long &", ScalarKind::U64)]
    #[case("std::size_t", ScalarKind::U64)]
    #[case("int8_t", ScalarKind::I8)]
    #[case("double", ScalarKind::F64)]
    #[case("bool", ScalarKind::Bool)]
    fn test_scalars(#[case] text: &str, #[case] kind: ScalarKind) {
        assert_eq!(classify(text), Some(NativeType::Scalar { kind }));
    }

    #[rstest]
    #[case("std::array<float, 3>", ArrayFamily::StdArray, "[3]", Layout::RowMajor)]
    #[case("std::array<std::array<int, 2>, 4>", ArrayFamily::StdArray, "[4, 2]", Layout::RowMajor)]
    #[case("const std::vector<double>&", ArrayFamily::StdVector, "[*]", Layout::RowMajor)]
    #[case("Eigen::MatrixXd", ArrayFamily::EigenMatrix, "[*, *]", Layout::ColMajor)]
    #[case("Eigen::Vector3f", ArrayFamily::EigenMatrix, "[3]", Layout::ColMajor)]
    #[case("Eigen::Matrix<double, 2, Eigen::Dynamic>", ArrayFamily::EigenMatrix, "[2, *]", Layout::ColMajor)]
    #[case("Eigen::Matrix<float, 3, 3, Eigen::RowMajor>", ArrayFamily::EigenMatrix, "[3, 3]", Layout::RowMajor)]
    #[case("Eigen::Matrix<double, 1, 1>", ArrayFamily::EigenMatrix, "[1, 1]", Layout::ColMajor)]
    #[case("Eigen::Matrix<double, 1, 4>", ArrayFamily::EigenMatrix, "[4]", Layout::ColMajor)]
    #[case("Eigen::Tensor<float, 3>", ArrayFamily::EigenTensor, "[*, *, *]", Layout::ColMajor)]
    #[case("Eigen::Tensor<int, 2, Eigen::RowMajor>", ArrayFamily::EigenTensor, "[*, *]", Layout::RowMajor)]
    #[case("py::array_t<double>", ArrayFamily::HostArray, "[..]", Layout::RowMajor)]
    fn test_arrays(
        #[case] text: &str,
        #[case] family: ArrayFamily,
        #[case] shape: &str,
        #[case] layout: Layout,
    ) {
        let a = array(text);
        assert_eq!(a.family, family);
        assert_eq!(a.describe_shape(), shape);
        assert_eq!(a.layout, layout);
    }

    #[rstest]
    #[case("A", Ownership::OwnedByWrapper)]
    #[case("const A&", Ownership::Borrowed)]
    #[case("ns::B*", Ownership::Borrowed)]
    #[case("std::shared_ptr<A>", Ownership::Shared)]
    #[case("std::unique_ptr<ns::B>", Ownership::OwnedByWrapper)]
    fn test_objects(#[case] text: &str, #[case] ownership: Ownership) {
        match classify(text) {
            Some(NativeType::Object { ownership: o, .. }) => assert_eq!(o, ownership),
            other => panic!("{text}: {other:?}"),
        }
    }

    #[rstest]
    #[case("const char*", Some(NativeType::String { c_str: true }))]
    #[case("const std::string &", Some(NativeType::String { c_str: false }))]
    #[case("void", Some(NativeType::Void))]
    #[case("char*", None)]
    #[case("int*", None)]
    #[case("A**", None)]
    #[case("Unknown", None)]
    #[case("std::map<int, int>", None)]
    #[case("Eigen::MatrixXcd", None)]
    fn test_other_types(#[case] text: &str, #[case] expected: Option<NativeType>) {
        assert_eq!(classify(text), expected);
    }
}
