//! Host-side dynamic values.

use std::fmt;

use crate::marshal::ObjectHandle;

/// Element type of a host array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostElement {
    Bool,
    Int,
    Float,
}

impl fmt::Display for HostElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostElement::Bool => "bool",
            HostElement::Int => "int",
            HostElement::Float => "float",
        })
    }
}

/// A flat row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum HostBuffer {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl HostBuffer {
    pub fn element(&self) -> HostElement {
        match self {
            HostBuffer::Bool(_) => HostElement::Bool,
            HostBuffer::Int(_) => HostElement::Int,
            HostBuffer::Float(_) => HostElement::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostBuffer::Bool(v) => v.len(),
            HostBuffer::Int(v) => v.len(),
            HostBuffer::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An n-dimensional host array: shape plus a flat row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    pub shape: Vec<usize>,
    pub buffer: HostBuffer,
}

impl HostArray {
    /// `None` when the buffer length does not match the shape.
    pub fn new(shape: Vec<usize>, buffer: HostBuffer) -> Option<Self> {
        (shape.iter().product::<usize>() == buffer.len()).then_some(Self { shape, buffer })
    }

    pub fn from_floats(shape: &[usize], data: impl Into<Vec<f64>>) -> Option<Self> {
        Self::new(shape.to_vec(), HostBuffer::Float(data.into()))
    }

    pub fn from_ints(shape: &[usize], data: impl Into<Vec<i64>>) -> Option<Self> {
        Self::new(shape.to_vec(), HostBuffer::Int(data.into()))
    }

    pub fn vector(data: impl Into<Vec<f64>>) -> Self {
        let data = data.into();
        Self {
            shape: vec![data.len()],
            buffer: HostBuffer::Float(data),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element(&self) -> HostElement {
        self.buffer.element()
    }

    /// Elements as `f64`, row-major.
    pub fn to_f64(&self) -> Vec<f64> {
        match &self.buffer {
            HostBuffer::Bool(v) => v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect(),
            HostBuffer::Int(v) => v.iter().map(|i| *i as f64).collect(),
            HostBuffer::Float(v) => v.clone(),
        }
    }

    /// Element-wise closeness for float buffers, equality otherwise.
    pub fn approx_eq(&self, other: &HostArray, tolerance: f64) -> bool {
        self.shape == other.shape
            && self
                .to_f64()
                .iter()
                .zip(other.to_f64())
                .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0))
    }
}

/// A dynamically typed host value.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(HostArray),
    Object(ObjectHandle),
}

impl HostValue {
    /// Host type name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            HostValue::None => "None".to_string(),
            HostValue::Bool(_) => "bool".to_string(),
            HostValue::Int(_) => "int".to_string(),
            HostValue::Float(_) => "float".to_string(),
            HostValue::Str(_) => "str".to_string(),
            HostValue::Array(a) => format!("array<{}>[{}]", a.element(), join(&a.shape)),
            HostValue::Object(o) => o.class().to_string(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            HostValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            HostValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<HostArray> for HostValue {
    fn from(value: HostArray) -> Self {
        HostValue::Array(value)
    }
}

impl From<ObjectHandle> for HostValue {
    fn from(value: ObjectHandle) -> Self {
        HostValue::Object(value)
    }
}

pub(crate) fn join(shape: &[usize]) -> String {
    shape
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
