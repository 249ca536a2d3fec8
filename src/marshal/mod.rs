//! Type marshaling between host values and native representations.
//!
//! A [`Registry`] maps native type descriptors to [`MarshalRule`]s. It knows
//! the exported classes, so object handles can be checked against the class
//! (or a subclass) a parameter expects. Rules are looked up, never mutated.

mod convert;
mod handle;
mod native;
mod value;

pub use convert::{accepts, to_host, to_native};
pub use handle::{NativeObject, ObjectHandle};
pub use native::{ArrayFamily, ArrayType, Dim, Layout, NativeType, Ownership, ScalarKind};
pub use value::{NativeArray, NativeScalar, NativeValue, offset, relayout};

use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::{ConversionError, MarshalError};
use crate::export::ExportModel;
use crate::runtime::HostValue;
use crate::types::TypeExpr;

#[derive(Debug, Clone, Default)]
struct ClassInfo {
    export_name: String,
    bases: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct ClassTable {
    classes: IndexMap<String, ClassInfo>,
}

impl ClassTable {
    fn is_subclass(&self, derived: &str, base: &str) -> bool {
        let mut pending = vec![derived];
        let mut seen = Vec::new();
        while let Some(class) = pending.pop() {
            if class == base {
                return true;
            }
            if seen.contains(&class) {
                continue;
            }
            seen.push(class);
            if let Some(info) = self.classes.get(class) {
                pending.extend(info.bases.iter().map(String::as_str));
            }
        }
        false
    }
}

/// The conversion rule for one native type.
#[derive(Debug, Clone)]
pub struct MarshalRule {
    /// The type as declared.
    pub ty: TypeExpr,
    pub native: NativeType,
    classes: Arc<ClassTable>,
}

impl MarshalRule {
    pub fn ownership(&self) -> Ownership {
        match &self.native {
            NativeType::Object { ownership, .. } => *ownership,
            _ => Ownership::OwnedByWrapper,
        }
    }

    /// Host-value predicate: right kind of value, range and shape aside.
    pub fn accepts(&self, value: &HostValue) -> bool {
        accepts(&self.native, value, &|d, b| self.classes.is_subclass(d, b))
    }

    pub fn to_native(&self, value: &HostValue) -> Result<NativeValue, ConversionError> {
        to_native(&self.native, value, &|d, b| self.classes.is_subclass(d, b))
    }

    pub fn to_host(&self, value: &NativeValue) -> Result<HostValue, ConversionError> {
        to_host(&self.native, value)
    }
}

/// Marshaling rules for one export model.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    classes: Arc<ClassTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every class of `model`.
    pub fn for_model(model: &ExportModel) -> Self {
        let mut table = ClassTable::default();
        for class in model.all_classes() {
            table.classes.insert(
                class.native.clone(),
                ClassInfo {
                    export_name: class.export_name.to_string(),
                    bases: class.bases.clone(),
                },
            );
        }
        Self {
            classes: Arc::new(table),
        }
    }

    /// Register a class by its native spelling.
    pub fn with_class(mut self, native: &str, export_name: &str, bases: &[&str]) -> Self {
        Arc::make_mut(&mut self.classes).classes.insert(
            native.to_string(),
            ClassInfo {
                export_name: export_name.to_string(),
                bases: bases.iter().map(|b| b.to_string()).collect(),
            },
        );
        self
    }

    pub fn is_class(&self, native: &str) -> bool {
        self.classes.classes.contains_key(native)
    }

    /// Host name of an exported class.
    pub fn export_name(&self, native: &str) -> Option<&str> {
        self.classes
            .classes
            .get(native)
            .map(|c| c.export_name.as_str())
    }

    pub fn is_subclass(&self, derived: &str, base: &str) -> bool {
        self.classes.is_subclass(derived, base)
    }

    /// The rule for a parameter or field of type `ty`.
    pub fn rule(&self, ty: &TypeExpr) -> Result<MarshalRule, MarshalError> {
        let rule = self.return_rule(ty)?;
        if rule.native == NativeType::Void {
            return Err(MarshalError::unsupported(ty.to_string()));
        }
        Ok(rule)
    }

    /// The rule for a return type; `void` is allowed.
    pub fn return_rule(&self, ty: &TypeExpr) -> Result<MarshalRule, MarshalError> {
        let native = NativeType::classify(ty, &|name| self.is_class(name))
            .ok_or_else(|| MarshalError::unsupported(ty.to_string()))?;
        Ok(MarshalRule {
            ty: ty.clone(),
            native,
            classes: self.classes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(text: &str) -> TypeExpr {
        TypeExpr::parse(text).unwrap()
    }

    #[test]
    fn test_void_is_a_return_type_only() {
        let registry = Registry::new();
        assert!(registry.return_rule(&ty("void")).is_ok());
        assert_eq!(
            registry.rule(&ty("void")).unwrap_err(),
            MarshalError::unsupported("void")
        );
    }

    #[test]
    fn test_unknown_class_has_no_rule() {
        let registry = Registry::new();
        assert!(matches!(
            registry.rule(&ty("Widget")),
            Err(MarshalError::UnsupportedType { .. })
        ));
        let registry = registry.with_class("Widget", "Widget", &[]);
        assert_eq!(registry.rule(&ty("Widget*")).unwrap().ownership(), Ownership::Borrowed);
    }

    #[test]
    fn test_objects_accept_subclasses() {
        let registry = Registry::new()
            .with_class("Base", "Base", &[])
            .with_class("Derived", "Derived", &["Base"]);
        let rule = registry.rule(&ty("Base*")).unwrap();
        let derived = ObjectHandle::owned(NativeObject::new("Derived"));
        let base = ObjectHandle::owned(NativeObject::new("Base"));
        assert!(rule.accepts(&HostValue::Object(derived.clone())));
        assert!(rule.accepts(&HostValue::None));

        let reverse = registry.rule(&ty("Derived")).unwrap();
        assert!(!reverse.accepts(&HostValue::Object(base)));
        assert!(!reverse.accepts(&HostValue::None));

        let NativeValue::Object(passed) = rule.to_native(&HostValue::Object(derived.clone())).unwrap()
        else {
            panic!("expected object");
        };
        assert_eq!(passed.ownership(), Ownership::Borrowed);
        assert!(passed.same_object(&derived));
    }
}
