//! Native-side values produced by the host → native converters.

use super::handle::ObjectHandle;
use super::native::{ArrayType, Dim, Layout, NativeType, ScalarKind};

/// One scalar in its native kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeScalar {
    Bool(bool),
    Char(char),
    Signed(ScalarKind, i64),
    Unsigned(ScalarKind, u64),
    Float(ScalarKind, f64),
}

impl NativeScalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            NativeScalar::Bool(_) => ScalarKind::Bool,
            NativeScalar::Char(_) => ScalarKind::Char,
            NativeScalar::Signed(k, _) | NativeScalar::Unsigned(k, _) | NativeScalar::Float(k, _) => *k,
        }
    }

    /// Zero of `kind`.
    pub fn zero(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Bool => NativeScalar::Bool(false),
            ScalarKind::Char => NativeScalar::Char('\0'),
            ScalarKind::F32 | ScalarKind::F64 => NativeScalar::Float(kind, 0.0),
            k if k.is_signed() => NativeScalar::Signed(k, 0),
            k => NativeScalar::Unsigned(k, 0),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            NativeScalar::Bool(b) => f64::from(u8::from(*b)),
            NativeScalar::Char(c) => f64::from(u32::from(*c)),
            NativeScalar::Signed(_, v) => *v as f64,
            NativeScalar::Unsigned(_, v) => *v as f64,
            NativeScalar::Float(_, v) => *v,
        }
    }
}

/// A dense array stored in its declared layout.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeArray {
    pub element: ScalarKind,
    pub shape: Vec<usize>,
    pub layout: Layout,
    /// `shape.iter().product()` elements in `layout` order.
    pub data: Vec<NativeScalar>,
}

impl NativeArray {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A zero-filled array for `ty`; dynamic dimensions get length 0.
    pub fn zeros(ty: &ArrayType) -> Self {
        let shape: Vec<usize> = ty
            .dims
            .iter()
            .flatten()
            .map(|d| match d {
                Dim::Fixed(n) => *n,
                Dim::Dynamic => 0,
            })
            .collect();
        let count = shape.iter().product();
        NativeArray {
            element: ty.element,
            data: vec![NativeScalar::zero(ty.element); count],
            shape,
            layout: ty.layout,
        }
    }

    /// Element at a multi-index, independent of the storage layout.
    pub fn get(&self, index: &[usize]) -> Option<&NativeScalar> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        self.data.get(offset(&self.shape, index, self.layout))
    }
}

/// Flat offset of a multi-index in a buffer of `shape` stored in `layout`.
pub fn offset(shape: &[usize], index: &[usize], layout: Layout) -> usize {
    let mut offset = 0;
    let mut stride = 1;
    match layout {
        Layout::RowMajor => {
            for (i, n) in index.iter().zip(shape).rev() {
                offset += i * stride;
                stride *= n;
            }
        }
        Layout::ColMajor => {
            for (i, n) in index.iter().zip(shape) {
                offset += i * stride;
                stride *= n;
            }
        }
    }
    offset
}

/// Reorder a flat buffer of `shape` from one layout into another.
pub fn relayout<T: Clone>(data: &[T], shape: &[usize], from: Layout, to: Layout) -> Vec<T> {
    if from == to || shape.len() < 2 {
        return data.to_vec();
    }
    // Axes from fastest to slowest varying in `from`.
    let axes: Vec<usize> = match from {
        Layout::RowMajor => (0..shape.len()).rev().collect(),
        Layout::ColMajor => (0..shape.len()).collect(),
    };
    let mut out = data.to_vec();
    let mut index = vec![0; shape.len()];
    for item in data.iter().take(shape.iter().product()) {
        out[offset(shape, &index, to)] = item.clone();
        for &axis in &axes {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}

/// A value on the native side of the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Void,
    Scalar(NativeScalar),
    Str(String),
    Array(NativeArray),
    Object(ObjectHandle),
    /// A null object pointer.
    Null,
}

impl NativeValue {
    /// The value a default-initialized member of `ty` holds.
    pub fn default_for(ty: &NativeType) -> NativeValue {
        match ty {
            NativeType::Void => NativeValue::Void,
            NativeType::Scalar { kind } => NativeValue::Scalar(NativeScalar::zero(*kind)),
            NativeType::String { .. } => NativeValue::Str(String::new()),
            NativeType::Array(a) => NativeValue::Array(NativeArray::zeros(a)),
            NativeType::Object { .. } | NativeType::HostObject => NativeValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_layout() {
        let shape = [2, 3];
        assert_eq!(offset(&shape, &[1, 0], Layout::RowMajor), 3);
        assert_eq!(offset(&shape, &[1, 0], Layout::ColMajor), 1);
        assert_eq!(offset(&shape, &[0, 2], Layout::ColMajor), 4);
    }

    #[test]
    fn test_relayout_transposes_storage() {
        // [[1, 2, 3], [4, 5, 6]]
        let row_major = [1, 2, 3, 4, 5, 6];
        let col_major = relayout(&row_major, &[2, 3], Layout::RowMajor, Layout::ColMajor);
        assert_eq!(col_major, vec![1, 4, 2, 5, 3, 6]);
        let back = relayout(&col_major, &[2, 3], Layout::ColMajor, Layout::RowMajor);
        assert_eq!(back, row_major.to_vec());
    }

    #[test]
    fn test_get_is_layout_independent() {
        let array = NativeArray {
            element: ScalarKind::I32,
            shape: vec![2, 2],
            layout: Layout::ColMajor,
            data: [1, 3, 2, 4]
                .iter()
                .map(|v| NativeScalar::Signed(ScalarKind::I32, *v))
                .collect(),
        };
        assert_eq!(array.get(&[0, 1]), Some(&NativeScalar::Signed(ScalarKind::I32, 2)));
        assert_eq!(array.get(&[2, 0]), None);
    }
}
