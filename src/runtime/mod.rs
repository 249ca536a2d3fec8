//! The generated module's boundary, bound in-process.
//!
//! [`BoundModule`] mirrors what the pybind11 module registers for an
//! [`ExportModel`]: one [`BoundClass`] per class (instantiation classes
//! included), the overload sets of free functions, and one [`Dispatcher`]
//! per template entry point. It runs the same marshaling rules and the same
//! dispatch catalogues as the generated code, so the boundary contract can
//! be exercised without a C++ toolchain. Native method bodies are not
//! executed; objects carry their data members only.

pub mod value;

pub use value::{HostArray, HostBuffer, HostElement, HostValue};

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{ConversionError, DispatchError, MarshalError, RuntimeError};
use crate::export::{ExportModel, ExportedClass, ExportedItem};
use crate::instantiate::{CallDescriptor, Catalogue, Entry, SignaturePattern, binding_name};
use crate::marshal::{MarshalRule, NativeObject, NativeValue, ObjectHandle, Registry};
use crate::model::Field;

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone)]
struct BoundField {
    rule: MarshalRule,
    read_only: bool,
    initial: NativeValue,
}

/// One exported class: attribute accessors plus constructor and method
/// overload sets.
#[derive(Debug, Clone)]
pub struct BoundClass {
    export_name: String,
    native: String,
    fields: IndexMap<SmolStr, BoundField>,
    constructors: Vec<SignaturePattern>,
    methods: IndexMap<SmolStr, Vec<SignaturePattern>>,
    registry: Registry,
    skipped: Vec<String>,
}

impl BoundClass {
    /// Bind `class` under `export_name`. Members with a type that has no
    /// marshaling rule are left out and listed in [`BoundClass::skipped`].
    pub fn new(class: &ExportedClass, export_name: &str, registry: &Registry) -> Self {
        let mut skipped = Vec::new();
        let mut skip = |member: &str, err: MarshalError| {
            warn!(class = %export_name, member, error = %err, "member not bound");
            skipped.push(format!("{export_name}.{member}"));
        };

        let mut fields = IndexMap::new();
        for field in &class.fields {
            let rule = match registry.rule(&field.ty) {
                Ok(rule) => rule,
                Err(err) => {
                    skip(&field.name, err);
                    continue;
                }
            };
            let initial = initial_value(field, &rule);
            fields.insert(
                field.name.clone(),
                BoundField {
                    rule,
                    read_only: field.is_const,
                    initial,
                },
            );
        }

        let mut constructors = Vec::new();
        for constructor in &class.constructors {
            match SignaturePattern::from_params(&constructor.params, registry) {
                Ok(sig) => constructors.push(sig),
                Err(err) => skip("__init__", err),
            }
        }
        if class.default_constructor {
            constructors.push(SignaturePattern {
                params: Vec::new(),
                required: 0,
            });
        }

        let mut methods: IndexMap<SmolStr, Vec<SignaturePattern>> = IndexMap::new();
        for group in &class.methods {
            for method in &group.overloads {
                let bound = registry
                    .return_rule(&method.signature.ret)
                    .and_then(|_| SignaturePattern::from_params(&method.signature.params, registry));
                match bound {
                    Ok(sig) => methods.entry(group.name.clone()).or_default().push(sig),
                    Err(err) => skip(&group.name, err),
                }
            }
        }

        Self {
            export_name: export_name.to_string(),
            native: class.native.clone(),
            fields,
            constructors,
            methods,
            registry: registry.clone(),
            skipped,
        }
    }

    /// Members left out, as `Class.member`.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn export_name(&self) -> &str {
        &self.export_name
    }

    pub fn native(&self) -> &str {
        &self.native
    }

    /// Attribute names in registration order: methods, then fields.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.methods
            .keys()
            .chain(self.fields.keys())
            .map(SmolStr::as_str)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Construct an object owned by the returned handle. Data members hold
    /// their in-class initializers, or their default-initialized values.
    pub fn construct(&self, args: &[HostValue]) -> Result<ObjectHandle, RuntimeError> {
        let call = CallDescriptor::of(args);
        pick_overload(&self.export_name, "__init__", &self.constructors, &call, &self.registry)?;
        let mut object = NativeObject::new(self.native.clone());
        for (name, field) in &self.fields {
            object.fields.insert(name.clone(), field.initial.clone());
        }
        trace!(class = %self.export_name, "constructed");
        Ok(ObjectHandle::owned(object))
    }

    /// Index of the method overload a call with `args` reaches.
    pub fn method_overload(&self, name: &str, args: &[HostValue]) -> Result<usize, RuntimeError> {
        let overloads = self.methods.get(name).ok_or_else(|| self.unknown(name))?;
        pick_overload(&self.export_name, name, overloads, &CallDescriptor::of(args), &self.registry)
    }

    /// Read attribute `name` of `object`.
    pub fn get(&self, object: &ObjectHandle, name: &str) -> Result<HostValue, RuntimeError> {
        let field = self.fields.get(name).ok_or_else(|| self.unknown(name))?;
        let value = object
            .with(|o| o.fields.get(name).cloned())?
            .ok_or_else(|| self.unknown(name))?;
        Ok(field.rule.to_host(&value)?)
    }

    /// Write attribute `name` of `object`. Nothing is written unless the
    /// whole value converts.
    pub fn set(&self, object: &ObjectHandle, name: &str, value: &HostValue) -> Result<(), RuntimeError> {
        let field = self.fields.get(name).ok_or_else(|| self.unknown(name))?;
        if field.read_only {
            return Err(ConversionError::ReadOnly {
                name: name.to_string(),
            }
            .into());
        }
        let native = field.rule.to_native(value)?;
        object.with(|o| {
            o.fields.insert(SmolStr::new(name), native);
        })
    }

    fn unknown(&self, name: &str) -> RuntimeError {
        RuntimeError::UnknownAttribute {
            class: self.export_name.clone(),
            name: name.to_string(),
        }
    }
}

fn pick_overload(
    owner: &str,
    name: &str,
    overloads: &[SignaturePattern],
    call: &CallDescriptor,
    registry: &Registry,
) -> Result<usize, RuntimeError> {
    let is_subclass = |d: &str, b: &str| registry.is_subclass(d, b);
    overloads
        .iter()
        .position(|sig| sig.matches(call, &is_subclass).is_some())
        .ok_or_else(|| {
            ConversionError::mismatch(
                format!("arguments accepted by `{owner}.{name}`"),
                format!("({call})"),
            )
            .into()
        })
}

/// The in-class initializer of `field` converted through its rule; the
/// default-initialized value when there is none or it is not a literal.
fn initial_value(field: &Field, rule: &MarshalRule) -> NativeValue {
    let fallback = || NativeValue::default_for(&rule.native);
    let Some(text) = &field.default else {
        return fallback();
    };
    let Some(value) = literal(text) else {
        debug!(field = %field.name, initializer = %text, "initializer is not a literal");
        return fallback();
    };
    match rule.to_native(&value) {
        Ok(native) => native,
        Err(err) => {
            warn!(field = %field.name, initializer = %text, error = %err, "initializer does not convert");
            fallback()
        }
    }
}

/// A host value for a C++ literal: numbers, `true`/`false`, string and
/// character literals, and flat braced lists of numbers.
pub fn literal(text: &str) -> Option<HostValue> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        return braced(inner);
    }
    match text {
        "true" => return Some(HostValue::Bool(true)),
        "false" => return Some(HostValue::Bool(false)),
        "nullptr" => return Some(HostValue::None),
        _ => {}
    }
    if let Some(s) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Some(HostValue::Str(s.to_string()));
    }
    if let Some(c) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return (c.chars().count() == 1).then(|| HostValue::Str(c.to_string()));
    }
    number(text)
}

fn braced(inner: &str) -> Option<HostValue> {
    if inner.contains('{') {
        return None;
    }
    let items: Vec<HostValue> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(number)
        .collect::<Option<_>>()?;
    let shape = [items.len()];
    if items.iter().all(|v| matches!(v, HostValue::Int(_))) {
        let ints: Vec<i64> = items.iter().filter_map(HostValue::as_int).collect();
        HostArray::from_ints(&shape, ints).map(HostValue::Array)
    } else {
        let floats: Vec<f64> = items.iter().filter_map(HostValue::as_float).collect();
        HostArray::from_floats(&shape, floats).map(HostValue::Array)
    }
}

fn number(text: &str) -> Option<HostValue> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"));
    if let Some(hex) = hex {
        let hex = hex.trim_end_matches(['u', 'U', 'l', 'L']);
        let value = i64::from_str_radix(hex, 16).ok()?;
        return Some(HostValue::Int(if negative { -value } else { value }));
    }
    let is_float = digits.contains(['.', 'e', 'E']);
    if is_float {
        let value: f64 = digits.trim_end_matches(['f', 'F', 'l', 'L']).parse().ok()?;
        return Some(HostValue::Float(if negative { -value } else { value }));
    }
    let value: i64 = digits.trim_end_matches(['u', 'U', 'l', 'L']).parse().ok()?;
    Some(HostValue::Int(if negative { -value } else { value }))
}

// ============================================================================
// Dispatch
// ============================================================================

/// The outcome of dispatching one call.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub entry: &'a Entry,
    /// Host name of the selected instantiation.
    pub binding: &'a str,
    /// Index of the matching constructor or signature.
    pub signature: usize,
}

/// A template entry point: picks the instantiation a call reaches.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalogue: Arc<Catalogue>,
    bindings: IndexMap<String, String>,
}

impl Dispatcher {
    /// `bindings` maps native instantiation spellings to their host names.
    pub fn new(catalogue: Arc<Catalogue>, bindings: IndexMap<String, String>) -> Self {
        Self { catalogue, bindings }
    }

    pub fn name(&self) -> &str {
        &self.catalogue.name
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn resolve(&self, args: &[HostValue]) -> Result<Resolved<'_>, DispatchError> {
        let selection = self.catalogue.select(&CallDescriptor::of(args))?;
        let entry = &self.catalogue.entries()[selection.entry];
        let binding = self
            .bindings
            .get(&entry.native)
            .map_or(entry.native.as_str(), String::as_str);
        Ok(Resolved {
            entry,
            binding,
            signature: selection.signature,
        })
    }
}

// ============================================================================
// Module
// ============================================================================

/// Every host-visible symbol of one model.
#[derive(Debug, Clone, Default)]
pub struct BoundModule {
    pub name: String,
    classes: IndexMap<String, BoundClass>,
    functions: IndexMap<String, Vec<SignaturePattern>>,
    dispatchers: IndexMap<String, Dispatcher>,
    registry: Registry,
    /// Entities left out because one of their types has no rule.
    pub skipped: Vec<String>,
}

impl BoundModule {
    pub fn bind(name: &str, model: &ExportModel) -> Self {
        let registry = Registry::for_model(model);
        let mut module = BoundModule {
            name: name.to_string(),
            registry: registry.clone(),
            ..BoundModule::default()
        };

        for class in &model.classes {
            module.bind_class(class, class.export_name.as_str());
        }

        for function in &model.functions {
            let overloads: Result<Vec<_>, MarshalError> = function
                .overloads
                .iter()
                .map(|f| {
                    registry.return_rule(&f.signature.ret)?;
                    SignaturePattern::from_params(&f.signature.params, &registry)
                })
                .collect();
            match overloads {
                Ok(overloads) => {
                    module.functions.insert(function.export_name.to_string(), overloads);
                }
                Err(err) => module.skip(function.export_name.as_str(), &err),
            }
        }

        for template in &model.templates {
            for (export_name, instantiations) in template.entry_points() {
                let shared = instantiations.len() > 1;
                let mut bindings = IndexMap::new();
                for instantiation in &instantiations {
                    let host = binding_name(instantiation, shared);
                    match &instantiation.item {
                        ExportedItem::Class(class) => module.bind_class(class, &host),
                        ExportedItem::Function(f) => {
                            let bound = registry
                                .return_rule(&f.signature.ret)
                                .and_then(|_| SignaturePattern::from_params(&f.signature.params, &registry));
                            match bound {
                                Ok(sig) => {
                                    module.functions.insert(host.clone(), vec![sig]);
                                }
                                Err(err) => module.skip(&host, &err),
                            }
                        }
                    }
                    bindings.insert(instantiation.native.clone(), host);
                }
                if !shared {
                    continue;
                }
                match Catalogue::for_entry_point(template, export_name, &registry) {
                    Ok(catalogue) => {
                        module
                            .dispatchers
                            .insert(export_name.to_string(), Dispatcher::new(catalogue, bindings));
                    }
                    Err(err) => module.skip(export_name, &err),
                }
            }
        }

        debug!(
            module = %module.name,
            classes = module.classes.len(),
            functions = module.functions.len(),
            dispatchers = module.dispatchers.len(),
            skipped = module.skipped.len(),
            "module bound"
        );
        module
    }

    fn bind_class(&mut self, class: &ExportedClass, host: &str) {
        let bound = BoundClass::new(class, host, &self.registry);
        self.skipped.extend(bound.skipped().iter().cloned());
        self.classes.insert(host.to_string(), bound);
    }

    fn skip(&mut self, name: &str, err: &MarshalError) {
        warn!(entity = %name, error = %err, "entity not bound");
        self.skipped.push(name.to_string());
    }

    /// Entities left unbound: class members as `Class.member`, functions
    /// and entry points by host name.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn class(&self, name: &str) -> Option<&BoundClass> {
        self.classes.get(name)
    }

    pub fn dispatcher(&self, name: &str) -> Option<&Dispatcher> {
        self.dispatchers.get(name)
    }

    /// Host-visible names: classes, then functions, then dispatch entry
    /// points.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.classes
            .keys()
            .chain(self.functions.keys())
            .chain(self.dispatchers.keys())
            .map(String::as_str)
    }

    /// Index of the overload of function `name` a call with `args` reaches.
    pub fn function_overload(&self, name: &str, args: &[HostValue]) -> Result<usize, RuntimeError> {
        let overloads = self
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownAttribute {
                class: self.name.clone(),
                name: name.to_string(),
            })?;
        pick_overload(&self.name, name, overloads, &CallDescriptor::of(args), &self.registry)
    }

    /// Construct an instance of class `name`, dispatching through the entry
    /// point when several instantiations share it.
    pub fn construct(&self, name: &str, args: &[HostValue]) -> Result<(ObjectHandle, &BoundClass), RuntimeError> {
        let class = match self.dispatchers.get(name) {
            Some(dispatcher) => {
                let resolved = dispatcher.resolve(args)?;
                self.classes.get(resolved.binding)
            }
            None => self.classes.get(name),
        }
        .ok_or_else(|| RuntimeError::UnknownAttribute {
            class: self.name.clone(),
            name: name.to_string(),
        })?;
        Ok((class.construct(args)?, class))
    }
}
