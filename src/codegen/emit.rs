//! Registration code for classes, functions and template entry points.

use rustc_hash::FxHashSet;
use tracing::{trace, warn};

use super::SkippedEntity;
use super::writer::SourceWriter;
use crate::base::mangle;
use crate::error::{MarshalError, RenderError};
use crate::export::{ExportModel, ExportedClass, ExportedInstantiation, ExportedItem, ExportedTemplate};
use crate::instantiate::{ArgPattern, Catalogue, binding_name};
use crate::marshal::{ArrayFamily, Dim, MarshalRule, NativeType, Ownership, Registry, ScalarKind};
use crate::model::{Field, FunctionEntity, Method, Param, Specificity};
use crate::types::TypeExpr;

/// One lambda parameter.
struct ParamCode {
    decl: String,
    arg: String,
    name: Option<String>,
    default: Option<String>,
}

/// How a trampoline hands its result back.
struct ReturnCode {
    /// ` -> T`, empty for `void`.
    arrow: String,
    is_void: bool,
    borrowed: bool,
}

pub(super) struct RenderContext {
    strict: bool,
    registry: Registry,
    shared: FxHashSet<String>,
    families: FxHashSet<ArrayFamily>,
    skipped: Vec<SkippedEntity>,
    out: SourceWriter,
}

impl RenderContext {
    pub(super) fn new(strict: bool, registry: Registry, shared: FxHashSet<String>) -> Self {
        Self {
            strict,
            registry,
            shared,
            families: FxHashSet::default(),
            skipped: Vec::new(),
            out: SourceWriter::new(),
        }
    }

    pub(super) fn finish(self) -> (String, FxHashSet<ArrayFamily>, Vec<SkippedEntity>) {
        (self.out.finish(), self.families, self.skipped)
    }

    pub(super) fn render_module(&mut self, name: &str, model: &ExportModel) -> Result<(), RenderError> {
        self.out.open(&format!("PYBIND11_MODULE({name}, m)"));
        self.out.write_line("pxx_runtime::register_errors(m);");

        for class in &model.classes {
            self.out.write_blank_line();
            self.class(class, &class.export_name)?;
        }

        if !model.functions.is_empty() {
            self.out.write_blank_line();
        }
        for function in &model.functions {
            for overload in &function.overloads {
                self.function(overload, &function.export_name, &overload.qname.to_string())?;
            }
        }

        for template in &model.templates {
            self.template(template)?;
        }

        self.out.close("");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Record an entity that cannot be rendered. Fails in strict mode.
    fn unrenderable(&mut self, entity: &str, ty: &TypeExpr) -> Result<(), RenderError> {
        self.unrenderable_spelling(entity, &ty.to_string())
    }

    fn unrenderable_spelling(&mut self, entity: &str, ty: &str) -> Result<(), RenderError> {
        if self.strict {
            return Err(RenderError::unrenderable(entity, ty));
        }
        warn!(entity, ty, "entity skipped");
        self.skipped.push(SkippedEntity {
            entity: entity.to_string(),
            ty: ty.to_string(),
        });
        Ok(())
    }

    fn note(&mut self, rule: &MarshalRule) {
        if let NativeType::Array(a) = &rule.native {
            self.families.insert(a.family);
        }
    }

    fn params(&mut self, entity: &str, params: &[Param]) -> Result<Option<Vec<ParamCode>>, RenderError> {
        let mut code = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let rule = match self.registry.rule(&param.ty) {
                Ok(rule) => rule,
                Err(_) => {
                    self.unrenderable(entity, &param.ty)?;
                    return Ok(None);
                }
            };
            self.note(&rule);
            let var = format!("a{i}");
            let (decl, arg) = parameter(&rule, &var);
            code.push(ParamCode {
                decl,
                arg,
                name: param.name.as_ref().map(|n| n.to_string()),
                default: param.default.clone(),
            });
        }
        Ok(Some(code))
    }

    fn returns(&mut self, entity: &str, ty: &TypeExpr) -> Result<Option<ReturnCode>, RenderError> {
        let rule = match self.registry.return_rule(ty) {
            Ok(rule) => rule,
            Err(_) => {
                self.unrenderable(entity, ty)?;
                return Ok(None);
            }
        };
        self.note(&rule);
        Ok(Some(match &rule.native {
            NativeType::Void => ReturnCode {
                arrow: String::new(),
                is_void: true,
                borrowed: false,
            },
            NativeType::Object {
                ownership: Ownership::Borrowed,
                ..
            } => ReturnCode {
                arrow: format!(" -> {ty}"),
                is_void: false,
                borrowed: true,
            },
            _ => ReturnCode {
                arrow: format!(" -> {}", ty.strip_ref_cv()),
                is_void: false,
                borrowed: false,
            },
        }))
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn class(&mut self, class: &ExportedClass, host: &str) -> Result<(), RenderError> {
        trace!(class = %class.native, host, "rendering class");
        let native = &class.native;
        let mut parameters = vec![native.clone()];
        parameters.extend(class.bases.iter().cloned());
        if self.shared.contains(native) {
            parameters.push(format!("std::shared_ptr<{native}>"));
        }

        self.out.open("");
        self.out.write_line(&format!(
            "py::class_<{}> cls(m, \"{host}\");",
            parameters.join(", ")
        ));

        if !class.is_abstract {
            for ctor in &class.constructors {
                let entity = format!("{native}::{}", class.qname.name());
                let Some(params) = self.params(&entity, &ctor.params)? else {
                    continue;
                };
                self.out.write_line(&format!(
                    "cls.def(py::init([]({}) {{ return new {native}({}); }}){});",
                    decls(&params),
                    args(&params),
                    annotations(&params)
                ));
            }
            if class.default_constructor {
                self.out.write_line("cls.def(py::init<>());");
            }
        }

        for group in &class.methods {
            for method in &group.overloads {
                self.method(native, method)?;
            }
        }

        for field in &class.fields {
            self.field(native, field)?;
        }

        self.out.close("");
        Ok(())
    }

    fn method(&mut self, native: &str, method: &Method) -> Result<(), RenderError> {
        let entity = format!("{native}::{}", method.name);
        let Some(params) = self.params(&entity, &method.signature.params)? else {
            return Ok(());
        };
        let Some(ret) = self.returns(&entity, &method.signature.ret)? else {
            return Ok(());
        };
        let name = &method.name;
        let mut extra = annotations(&params);
        if ret.borrowed {
            extra.push_str(", py::return_value_policy::reference_internal");
        }
        let call = if method.is_static {
            format!("{native}::{name}({})", args(&params))
        } else {
            format!("self.{name}({})", args(&params))
        };
        let body = statement(&ret, &call);
        if method.is_static {
            self.out.write_line(&format!(
                "cls.def_static(\"{name}\", []({}){} {{ {body} }}{extra});",
                decls(&params),
                ret.arrow
            ));
        } else {
            let receiver = if method.is_const {
                format!("const {native} &self")
            } else {
                format!("{native} &self")
            };
            self.out.write_line(&format!(
                "cls.def(\"{name}\", []({}){} {{ {body} }}{extra});",
                with_receiver(&receiver, &params),
                ret.arrow
            ));
        }
        Ok(())
    }

    fn field(&mut self, native: &str, field: &Field) -> Result<(), RenderError> {
        let entity = format!("{native}::{}", field.name);
        let rule = match self.registry.rule(&field.ty) {
            Ok(rule) => rule,
            Err(_) => return self.unrenderable(&entity, &field.ty),
        };
        self.note(&rule);
        let name = &field.name;
        let value_ty = field.ty.strip_ref_cv();
        let (getter_ty, policy) = match &rule.native {
            NativeType::Object {
                ownership: Ownership::OwnedByWrapper,
                ..
            } => (
                format!("const {value_ty} &"),
                ", py::return_value_policy::reference_internal",
            ),
            NativeType::Object {
                ownership: Ownership::Borrowed,
                ..
            } => (field.ty.to_string(), ", py::return_value_policy::reference"),
            _ => (value_ty.to_string(), ""),
        };
        let (decl, arg) = parameter(&rule, "value");

        if field.is_static {
            let getter = format!("[](py::object) -> {getter_ty} {{ return {native}::{name}; }}");
            if field.is_const {
                self.out.write_line(&format!(
                    "cls.def_property_readonly_static(\"{name}\", {getter}{policy});"
                ));
            } else {
                self.out.write_line(&format!(
                    "cls.def_property_static(\"{name}\", {getter}, [](py::object, {decl}) {{ {native}::{name} = {arg}; }}{policy});"
                ));
            }
        } else {
            let getter = format!("[](const {native} &self) -> {getter_ty} {{ return self.{name}; }}");
            if field.is_const {
                self.out.write_line(&format!(
                    "cls.def_property_readonly(\"{name}\", {getter}{policy});"
                ));
            } else {
                self.out.write_line(&format!(
                    "cls.def_property(\"{name}\", {getter}, []({native} &self, {decl}) {{ self.{name} = {arg}; }}{policy});"
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Register `function` as `host`, calling `callee`.
    fn function(&mut self, function: &FunctionEntity, host: &str, callee: &str) -> Result<(), RenderError> {
        let entity = function.qname.to_string();
        let Some(params) = self.params(&entity, &function.signature.params)? else {
            return Ok(());
        };
        let Some(ret) = self.returns(&entity, &function.signature.ret)? else {
            return Ok(());
        };
        let mut extra = annotations(&params);
        if ret.borrowed {
            extra.push_str(", py::return_value_policy::reference");
        }
        let body = statement(&ret, &format!("{callee}({})", args(&params)));
        self.out.write_line(&format!(
            "m.def(\"{host}\", []({}){} {{ {body} }}{extra});",
            decls(&params),
            ret.arrow
        ));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    fn template(&mut self, template: &ExportedTemplate) -> Result<(), RenderError> {
        for (export_name, instantiations) in template.entry_points() {
            let shared = instantiations.len() > 1;
            for instantiation in &instantiations {
                let host = binding_name(instantiation, shared);
                match &instantiation.item {
                    ExportedItem::Class(class) => {
                        self.out.write_blank_line();
                        self.class(class, &host)?;
                    }
                    ExportedItem::Function(function) => {
                        if !shared {
                            self.out.write_blank_line();
                        }
                        self.function(function, &host, &instantiation.native)?;
                    }
                }
            }
            if !shared {
                continue;
            }
            let catalogue = match Catalogue::for_entry_point(template, export_name, &self.registry) {
                Ok(catalogue) => catalogue,
                Err(MarshalError::UnsupportedType { ty }) => {
                    self.unrenderable_spelling(export_name, &ty)?;
                    continue;
                }
            };
            self.dispatch(&catalogue, &instantiations);
        }
        Ok(())
    }

    fn dispatch(&mut self, catalogue: &Catalogue, instantiations: &[&ExportedInstantiation]) {
        let name = catalogue.name.as_str();
        let var = format!("catalogue_{}", mangle(name));
        self.out.write_blank_line();
        self.out.open("");
        self.out.open(&format!("static const pxx_runtime::Catalogue {var}{{\"{name}\","));
        for entry in catalogue.entries() {
            let binding = instantiations
                .iter()
                .find(|i| i.native == entry.native)
                .map_or_else(|| entry.native.clone(), |i| binding_name(i, true));
            self.out.open(&format!(
                "{{\"{}\", \"{binding}\", {},",
                entry.native,
                specificity(entry.specificity)
            ));
            for signature in &entry.signatures {
                let patterns: Vec<String> = signature.params.iter().map(pattern).collect();
                self.out.write_line(&format!(
                    "pxx_runtime::Signature{{{{{}}}, {}}},",
                    patterns.join(", "),
                    signature.required
                ));
            }
            self.out.close("},");
        }
        self.out.close("};");
        self.out.write_line(&format!(
            "m.def(\"{name}\", [m](const py::args &args, const py::kwargs &kwargs) mutable {{ return {var}.call(m, args, kwargs); }});"
        ));
        self.out.close("");
    }
}

/// Lambda parameter declaration and call argument for `rule`.
fn parameter(rule: &MarshalRule, var: &str) -> (String, String) {
    let ty = &rule.ty;
    let stripped = ty.strip_ref_cv();
    match &rule.native {
        NativeType::Scalar {
            kind: ScalarKind::Bool,
        } => (format!("bool {var}"), var.to_string()),
        NativeType::Scalar { .. } => (
            format!("pxx_runtime::Checked<{stripped}> {var}"),
            format!("{var}.value"),
        ),
        NativeType::Array(a) if a.family != ArrayFamily::HostArray => (
            format!("pxx_runtime::Checked<{stripped}> {var}"),
            format!("{var}.value"),
        ),
        NativeType::String { c_str: true } => (format!("const char *{var}"), var.to_string()),
        NativeType::String { c_str: false } => (format!("std::string {var}"), var.to_string()),
        NativeType::Object {
            ownership: Ownership::OwnedByWrapper,
            ..
        } => (format!("const {stripped} &{var}"), var.to_string()),
        NativeType::Object { .. } => (format!("{ty} {var}"), var.to_string()),
        _ => (format!("{stripped} {var}"), var.to_string()),
    }
}

fn decls(params: &[ParamCode]) -> String {
    params
        .iter()
        .map(|p| p.decl.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn with_receiver(receiver: &str, params: &[ParamCode]) -> String {
    if params.is_empty() {
        receiver.to_string()
    } else {
        format!("{receiver}, {}", decls(params))
    }
}

fn args(params: &[ParamCode]) -> String {
    params
        .iter()
        .map(|p| p.arg.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `, py::arg("a"), py::arg("b") = 2`, or nothing when no parameter is
/// named or defaulted.
fn annotations(params: &[ParamCode]) -> String {
    if params.iter().all(|p| p.name.is_none() && p.default.is_none()) {
        return String::new();
    }
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let name = p.name.clone().unwrap_or_else(|| format!("arg{i}"));
            match &p.default {
                Some(default) => format!(", py::arg(\"{name}\") = {default}"),
                None => format!(", py::arg(\"{name}\")"),
            }
        })
        .collect()
}

fn statement(ret: &ReturnCode, call: &str) -> String {
    if ret.is_void {
        format!("{call};")
    } else {
        format!("return {call};")
    }
}

fn specificity(specificity: Specificity) -> &'static str {
    match specificity {
        Specificity::Full => "pxx_runtime::Specificity::Full",
        Specificity::Partial => "pxx_runtime::Specificity::Partial",
        Specificity::Primary => "pxx_runtime::Specificity::Primary",
    }
}

fn kind(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Bool => "pxx_runtime::Kind::Bool",
        ScalarKind::Char => "pxx_runtime::Kind::Char",
        k if k.is_float() => "pxx_runtime::Kind::Float",
        _ => "pxx_runtime::Kind::Integer",
    }
}

/// C++ spelling of a dispatch pattern.
fn pattern(pattern: &ArgPattern) -> String {
    match pattern {
        ArgPattern::Scalar { kind: k } => format!("pxx_runtime::Pattern::scalar({})", kind(*k)),
        ArgPattern::Str => "pxx_runtime::Pattern::string()".to_string(),
        ArgPattern::Object { class, nullable } => {
            format!("pxx_runtime::Pattern::object<{class}>({nullable})")
        }
        ArgPattern::Array {
            element,
            dims: Some(dims),
        } => {
            let dims: Vec<String> = dims
                .iter()
                .map(|d| match d {
                    Dim::Fixed(n) => n.to_string(),
                    Dim::Dynamic => "-1".to_string(),
                })
                .collect();
            format!("pxx_runtime::Pattern::array({}, {{{}}})", kind(*element), dims.join(", "))
        }
        ArgPattern::Array { element, dims: None } => {
            format!("pxx_runtime::Pattern::array_any({})", kind(*element))
        }
        ArgPattern::Any => "pxx_runtime::Pattern::any()".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ArgPattern::Scalar { kind: ScalarKind::I32 }, "pxx_runtime::Pattern::scalar(pxx_runtime::Kind::Integer)")]
    #[case(ArgPattern::Str, "pxx_runtime::Pattern::string()")]
    #[case(
        ArgPattern::Array { element: ScalarKind::F32, dims: Some(vec![Dim::Fixed(3), Dim::Dynamic]) },
        "pxx_runtime::Pattern::array(pxx_runtime::Kind::Float, {3, -1})"
    )]
    #[case(
        ArgPattern::Object { class: "ns::A".to_string(), nullable: true },
        "pxx_runtime::Pattern::object<ns::A>(true)"
    )]
    fn test_pattern_spelling(#[case] input: ArgPattern, #[case] expected: &str) {
        assert_eq!(pattern(&input), expected);
    }

    #[test]
    fn test_annotations_name_unnamed_parameters() {
        let params = vec![
            ParamCode {
                decl: String::new(),
                arg: String::new(),
                name: None,
                default: None,
            },
            ParamCode {
                decl: String::new(),
                arg: String::new(),
                name: Some("b".to_string()),
                default: Some("2".to_string()),
            },
        ];
        assert_eq!(annotations(&params), ", py::arg(\"arg0\"), py::arg(\"b\") = 2");
        assert_eq!(annotations(&params[..1]), "");
    }
}
