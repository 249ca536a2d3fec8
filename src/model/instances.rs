//! Instantiation discovery for templates.
//!
//! The builder records evidence while walking: `instance(...)` directives,
//! partial and full specializations, explicit instantiations. Once every
//! template is known, each piece of evidence is matched to its template and
//! turned into an [`Instantiation`] bound to the most specialized declaration
//! that applies. Catalogues are then sorted most specific first and left
//! untouched from here on.

use smol_str::SmolStr;
use tracing::debug;

use super::directives::InstanceDirective;
use super::{
    Concrete, Entity, Evidence, ExportMark, Instantiation, Signature, Specificity, TemplateEntity,
    TemplateParam,
};
use crate::diagnostics::{Diagnostic, Location, codes};
use crate::types::{Bindings, TemplateArg};

/// One piece of evidence, with the scope it was written in.
#[derive(Debug, Clone)]
pub(super) struct Pending {
    pub scope: Vec<SmolStr>,
    /// The template's name as written; empty for [`PendingKind::Directives`].
    pub template: Vec<SmolStr>,
    pub kind: PendingKind,
    pub location: Option<Location>,
}

#[derive(Debug, Clone)]
pub(super) enum PendingKind {
    /// `instance(...)` directives on the primary template at `template`.
    Directives {
        template: usize,
        instances: Vec<InstanceDirective>,
    },
    Partial(PartialSpec),
    /// `template <>` specialization. Function specializations may leave
    /// their arguments to deduction.
    Full {
        args: Option<Vec<TemplateArg>>,
        entity: Concrete,
        mark: Option<ExportMark>,
    },
    /// `template class X<...>;` or `template R f(...);`
    Explicit {
        args: Option<Vec<TemplateArg>>,
        signature: Option<Signature>,
    },
}

#[derive(Debug, Clone)]
pub(super) struct PartialSpec {
    pub params: Vec<TemplateParam>,
    /// Arguments of the primary template in terms of `params`.
    pub args: Vec<TemplateArg>,
    pub pattern: Concrete,
    pub instances: Vec<InstanceDirective>,
    pub mark: Option<ExportMark>,
}

#[derive(Debug, Clone)]
struct FullSpec {
    args: Vec<TemplateArg>,
    entity: Concrete,
    mark: Option<ExportMark>,
}

/// Specializations attached to one template.
#[derive(Debug, Default)]
struct Declarations {
    partials: Vec<(PartialSpec, Option<Location>)>,
    fulls: Vec<FullSpec>,
}

struct Resolver<'a> {
    entities: &'a mut [Entity],
    diagnostics: &'a mut Vec<Diagnostic>,
}

/// Match `evidence` to the templates in `entities` and fill their catalogues.
pub(super) fn resolve(
    entities: &mut [Entity],
    evidence: Vec<Pending>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut resolver = Resolver {
        entities,
        diagnostics,
    };
    let mut declarations: Vec<Declarations> = (0..resolver.entities.len())
        .map(|_| Declarations::default())
        .collect();
    let mut uses = Vec::new();

    // Specializations first: every use below must see all of them.
    for pending in evidence {
        match pending.kind {
            PendingKind::Partial(partial) => {
                match resolver.lookup(&pending.scope, &partial.pattern, &pending.template) {
                    Some(index) => declarations[index].partials.push((partial, pending.location)),
                    None => resolver.unknown_template(&pending.template, pending.location),
                }
            }
            PendingKind::Full { args, entity, mark } => {
                let candidates = resolver.candidates(&pending.scope, &entity, &pending.template);
                let resolved = candidates.into_iter().find_map(|index| {
                    let template = resolver.template(index)?;
                    let args = match (&args, &entity) {
                        (Some(args), _) => complete_args(&template.params, args.clone()).ok(),
                        (None, Concrete::Function(f)) => deduce(template, None, &f.signature),
                        (None, Concrete::Class(_)) => None,
                    }?;
                    Some((index, args))
                });
                match resolved {
                    Some((index, args)) => declarations[index].fulls.push(FullSpec {
                        args,
                        entity: with_template(entity, resolver.template(index)),
                        mark,
                    }),
                    None => resolver.unknown_template(&pending.template, pending.location),
                }
            }
            _ => uses.push(pending),
        }
    }

    for (index, decls) in declarations.iter().enumerate() {
        let Some(template) = resolver.template(index) else {
            continue;
        };
        let name = SmolStr::new(template.qname.name());
        let mut found = Vec::new();
        for full in &decls.fulls {
            found.push(Instantiation {
                export_name: name.clone(),
                bindings: bind(&template.params, &full.args),
                args: full.args.clone(),
                specificity: Specificity::Full,
                evidence: Evidence::Specialization,
                mark: ExportMark::inherit(full.mark, template.mark),
                native: native_name(template, &full.args),
                entity: full.entity.clone(),
            });
        }
        let mut failures = Vec::new();
        for (partial, location) in &decls.partials {
            for directive in &partial.instances {
                let export_name = directive.name.clone().unwrap_or_else(|| name.clone());
                let args = parse_args(&directive.args)
                    .and_then(|args| complete_args(&partial.params, args))
                    .map(|args| {
                        let partial_bindings = bind(&partial.params, &args);
                        partial
                            .args
                            .iter()
                            .map(|a| a.substitute(&partial_bindings))
                            .collect::<Vec<_>>()
                    });
                let mark = ExportMark::inherit(partial.mark, template.mark);
                match args.and_then(|args| {
                    instantiate(template, decls, args, export_name, Evidence::Directive, mark)
                }) {
                    Ok(instantiation) => found.push(instantiation),
                    Err(message) => failures.push((message, location.clone())),
                }
            }
        }
        found.sort_by_key(|i| i.specificity);
        resolver.extend(index, found);
        for (message, location) in failures {
            resolver.warn(codes::INSTANCE_ARITY, message, location);
        }
    }

    for pending in uses {
        match pending.kind {
            PendingKind::Directives {
                template: index,
                instances,
            } => {
                let Some(template) = resolver.template(index) else {
                    continue;
                };
                let name = SmolStr::new(template.qname.name());
                let mut found = Vec::new();
                let mut failures = Vec::new();
                for directive in instances {
                    let export_name = directive.name.clone().unwrap_or_else(|| name.clone());
                    let result = parse_args(&directive.args)
                        .and_then(|args| complete_args(&template.params, args))
                        .and_then(|args| {
                            instantiate(
                                template,
                                &declarations[index],
                                args,
                                export_name,
                                Evidence::Directive,
                                template.mark,
                            )
                        });
                    match result {
                        Ok(instantiation) => found.push(instantiation),
                        Err(message) => failures.push(message),
                    }
                }
                resolver.extend(index, found);
                for message in failures {
                    resolver.warn(codes::INSTANCE_ARITY, message, pending.location.clone());
                }
            }
            PendingKind::Explicit { args, signature } => {
                let is_class = signature.is_none();
                let candidates = resolver.candidates_of_kind(&pending.scope, is_class, &pending.template);
                let resolved = candidates.into_iter().find_map(|index| {
                    let template = resolver.template(index)?;
                    let args = match &signature {
                        None => complete_args(&template.params, args.clone()?).ok()?,
                        Some(signature) => deduce(template, args.as_deref(), signature)?,
                    };
                    let name = SmolStr::new(template.qname.name());
                    instantiate(
                        template,
                        &declarations[index],
                        args,
                        name,
                        Evidence::ExplicitInstantiation,
                        template.mark,
                    )
                    .ok()
                    .map(|instantiation| (index, instantiation))
                });
                match resolved {
                    Some((index, instantiation)) => resolver.extend(index, vec![instantiation]),
                    None => resolver.unknown_template(&pending.template, pending.location),
                }
            }
            PendingKind::Partial(_) | PendingKind::Full { .. } => {}
        }
    }

    resolver.freeze();
}

impl Resolver<'_> {
    fn template(&self, index: usize) -> Option<&TemplateEntity> {
        match self.entities.get(index) {
            Some(Entity::Template(t)) => Some(t),
            _ => None,
        }
    }

    /// Templates named `written` as seen from `scope`, innermost scope first.
    fn candidates_of_kind(&self, scope: &[SmolStr], is_class: bool, written: &[SmolStr]) -> Vec<usize> {
        for depth in (0..=scope.len()).rev() {
            let mut path = scope[..depth].to_vec();
            path.extend(written.iter().cloned());
            let found: Vec<usize> = self
                .entities
                .iter()
                .enumerate()
                .filter_map(|(i, e)| match e {
                    Entity::Template(t)
                        if t.qname.segments() == path.as_slice()
                            && t.is_class_template() == is_class =>
                    {
                        Some(i)
                    }
                    _ => None,
                })
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    fn candidates(&self, scope: &[SmolStr], like: &Concrete, written: &[SmolStr]) -> Vec<usize> {
        self.candidates_of_kind(scope, like.is_class(), written)
    }

    fn lookup(&self, scope: &[SmolStr], like: &Concrete, written: &[SmolStr]) -> Option<usize> {
        self.candidates(scope, like, written).into_iter().next()
    }

    fn warn(&mut self, code: &'static str, message: String, location: Option<Location>) {
        debug!(code, %message, "instantiation skipped");
        self.diagnostics.push(
            Diagnostic::warning(message)
                .with_code(code)
                .with_location(location),
        );
    }

    fn unknown_template(&mut self, written: &[SmolStr], location: Option<Location>) {
        self.warn(
            codes::UNKNOWN_TEMPLATE,
            format!(
                "no matching template `{}` for specialization or instantiation; skipped",
                written.join("::")
            ),
            location,
        );
    }

    /// Append instantiations, dropping those already catalogued under the
    /// same export name and arguments.
    fn extend(&mut self, index: usize, found: Vec<Instantiation>) {
        let Some(Entity::Template(template)) = self.entities.get_mut(index) else {
            return;
        };
        for instantiation in found {
            let duplicate = template.instantiations.iter().any(|existing| {
                existing.export_name == instantiation.export_name
                    && same_args(&existing.args, &instantiation.args)
            });
            if duplicate {
                debug!(
                    template = %template.qname,
                    native = %instantiation.native,
                    "duplicate instantiation evidence"
                );
            } else {
                template.instantiations.push(instantiation);
            }
        }
    }

    fn freeze(&mut self) {
        for entity in self.entities.iter_mut() {
            if let Entity::Template(template) = entity {
                template.instantiations.sort_by_key(|i| i.specificity);
            }
        }
    }
}

fn same_args(a: &[TemplateArg], b: &[TemplateArg]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.unify(y, &[], &mut Bindings::new()))
}

fn parse_args(args: &[String]) -> Result<Vec<TemplateArg>, String> {
    args.iter()
        .map(|a| TemplateArg::parse(a).map_err(|e| format!("invalid template argument `{a}`: {e}")))
        .collect()
}

/// Fill trailing defaults and check the argument count.
fn complete_args(params: &[TemplateParam], mut args: Vec<TemplateArg>) -> Result<Vec<TemplateArg>, String> {
    if args.len() > params.len() {
        return Err(format!(
            "instance has {} template arguments, expected {}",
            args.len(),
            params.len()
        ));
    }
    while args.len() < params.len() {
        let param = &params[args.len()];
        let Some(default) = &param.default else {
            return Err(format!(
                "instance has {} template arguments, expected {}",
                args.len(),
                params.len()
            ));
        };
        let bindings = bind(params, &args);
        args.push(default.substitute(&bindings));
    }
    Ok(args)
}

fn bind(params: &[TemplateParam], args: &[TemplateArg]) -> Bindings {
    params
        .iter()
        .zip(args)
        .map(|(p, a)| (p.name.clone(), a.clone()))
        .collect()
}

/// Deduce a function template's arguments from a concrete signature.
fn deduce(
    template: &TemplateEntity,
    explicit: Option<&[TemplateArg]>,
    signature: &Signature,
) -> Option<Vec<TemplateArg>> {
    let Concrete::Function(pattern) = &template.pattern else {
        return None;
    };
    let names = template.param_names();
    let mut bindings = Bindings::new();
    if let Some(explicit) = explicit {
        if explicit.len() > names.len() {
            return None;
        }
        bindings = bind(&template.params, explicit);
    }
    if pattern.signature.params.len() != signature.params.len() {
        return None;
    }
    for (p, c) in pattern.signature.param_types().zip(signature.param_types()) {
        if !try_unify(p, c, &names, &mut bindings)
            && !try_unify(&p.strip_ref_cv(), &c.strip_ref_cv(), &names, &mut bindings)
        {
            return None;
        }
    }
    if !try_unify(&pattern.signature.ret, &signature.ret, &names, &mut bindings) {
        return None;
    }
    let mut args = Vec::new();
    for param in &template.params {
        match bindings.get(&param.name) {
            Some(arg) => args.push(arg.clone()),
            None => break,
        }
    }
    complete_args(&template.params, args).ok()
}

fn try_unify(
    pattern: &crate::types::TypeExpr,
    concrete: &crate::types::TypeExpr,
    names: &[SmolStr],
    bindings: &mut Bindings,
) -> bool {
    let mut attempt = bindings.clone();
    if pattern.unify(concrete, names, &mut attempt) {
        *bindings = attempt;
        true
    } else {
        false
    }
}

/// Bind `args` to the most specialized declaration of `template`.
fn instantiate(
    template: &TemplateEntity,
    decls: &Declarations,
    args: Vec<TemplateArg>,
    export_name: SmolStr,
    evidence: Evidence,
    mark: ExportMark,
) -> Result<Instantiation, String> {
    if args.len() != template.params.len() {
        return Err(format!(
            "instance of `{}` has {} template arguments, expected {}",
            template.qname,
            args.len(),
            template.params.len()
        ));
    }
    let bindings = bind(&template.params, &args);
    let native = native_name(template, &args);

    if let Some(full) = decls.fulls.iter().find(|f| same_args(&f.args, &args)) {
        return Ok(Instantiation {
            export_name,
            args,
            bindings,
            specificity: Specificity::Full,
            evidence,
            mark: ExportMark::inherit(full.mark, mark),
            native,
            entity: full.entity.clone(),
        });
    }

    for (partial, _) in &decls.partials {
        let names: Vec<SmolStr> = partial.params.iter().map(|p| p.name.clone()).collect();
        let mut partial_bindings = Bindings::new();
        let matches = partial.args.len() == args.len()
            && partial
                .args
                .iter()
                .zip(&args)
                .all(|(p, c)| p.unify(c, &names, &mut partial_bindings))
            && names.iter().all(|n| partial_bindings.contains_key(n));
        if matches {
            return Ok(Instantiation {
                export_name,
                args,
                bindings,
                specificity: Specificity::Partial,
                evidence,
                mark: ExportMark::inherit(partial.mark, mark),
                native,
                entity: partial.pattern.substitute(&partial_bindings),
            });
        }
    }

    Ok(Instantiation {
        export_name,
        args,
        specificity: Specificity::Primary,
        evidence,
        mark,
        native,
        entity: template.pattern.substitute(&bindings),
        bindings,
    })
}

fn native_name(template: &TemplateEntity, args: &[TemplateArg]) -> String {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    format!("{}<{}>", template.qname, args.join(", "))
}

fn with_template(entity: Concrete, template: Option<&TemplateEntity>) -> Concrete {
    match (entity, template) {
        (Concrete::Function(mut f), Some(t)) => {
            f.template = Some(t.qname.clone());
            f.qname = t.qname.clone();
            Concrete::Function(f)
        }
        (entity, _) => entity,
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::{CxxFrontend, MemorySource};
    use crate::model::{Concrete, Evidence, Specificity, TranslationUnit, load};
    use std::path::Path;

    fn build_text(text: &str) -> TranslationUnit {
        let frontend = CxxFrontend::with_source(MemorySource::new().with_file("t.h", text));
        load(&frontend, Path::new("t.h"), &[]).unwrap()
    }

    #[test]
    fn test_partial_specialization_wins_over_primary() {
        let tu = build_text(
            "// pxx :: export\n\
             // pxx :: instance([\"int\", \"3\"])\n\
             template <typename T, int N>\n\
             class Sum { public: std::array<T, N> public_data; std::array<T, N> get_data() const; };\n\
             \n\
             // pxx :: instance(\"Sum1\", [\"int\"])\n\
             template <typename T>\n\
             class Sum<T, 1> { public: T public_data; T get_data() const; };\n",
        );
        let template = tu.find_template("Sum").unwrap();
        let catalogue = &template.instantiations;
        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue[0].export_name, "Sum1");
        assert_eq!(catalogue[0].specificity, Specificity::Partial);
        assert_eq!(catalogue[0].native, "Sum<int, 1>");
        let Concrete::Class(partial) = &catalogue[0].entity else {
            panic!("expected class");
        };
        assert_eq!(partial.fields().next().unwrap().ty.to_string(), "int");

        assert_eq!(catalogue[1].export_name, "Sum");
        assert_eq!(catalogue[1].specificity, Specificity::Primary);
        let Concrete::Class(primary) = &catalogue[1].entity else {
            panic!("expected class");
        };
        assert_eq!(
            primary.fields().next().unwrap().ty.to_string(),
            "std::array<int, 3>"
        );
    }

    #[test]
    fn test_function_instances_and_explicit_instantiation() {
        let tu = build_text(
            "// pxx :: export\n\
             // pxx :: instance([\"float\", \"3\"])\n\
             // pxx :: instance([\"double\", \"4\"])\n\
             template<typename Scalar, size_t N>\n\
             Scalar sum(std::array<Scalar, N> x) { return x[0]; }\n\
             namespace detail {\n\
             // pxx :: instance(\"hidden_sum\", [\"float\", \"3\"])\n\
             // pxx :: export\n\
             template<typename Scalar, size_t N>\n\
             Scalar sum(std::array<Scalar, N> x) { return x[0]; }\n\
             }\n\
             template float sum(std::array<float, 3>);\n\
             template int sum(std::array<int, 2>);\n",
        );
        let sum = tu.templates().find(|t| t.qname.to_string() == "sum").unwrap();
        let natives: Vec<&str> = sum.instantiations.iter().map(|i| i.native.as_str()).collect();
        assert_eq!(natives, vec!["sum<float, 3>", "sum<double, 4>", "sum<int, 2>"]);
        assert_eq!(sum.instantiations[2].evidence, Evidence::ExplicitInstantiation);
        let Concrete::Function(f) = &sum.instantiations[1].entity else {
            panic!("expected function");
        };
        assert_eq!(f.signature.describe(), "(std::array<double, 4>) -> double");

        let hidden = tu.find_template("detail::sum").unwrap();
        assert_eq!(hidden.instantiations.len(), 1);
        assert_eq!(hidden.instantiations[0].export_name, "hidden_sum");
    }

    #[test]
    fn test_full_specializations_come_first() {
        let tu = build_text(
            "// pxx :: instance([\"float\"])\n\
             template <typename T> struct Box { T value; };\n\
             template <> struct Box<int> { long value; };\n",
        );
        let template = tu.find_template("Box").unwrap();
        let tiers: Vec<Specificity> = template.instantiations.iter().map(|i| i.specificity).collect();
        assert_eq!(tiers, vec![Specificity::Full, Specificity::Primary]);
        assert_eq!(template.instantiations[0].evidence, Evidence::Specialization);
    }

    #[test]
    fn test_bad_instances_are_reported() {
        let tu = build_text(
            "// pxx :: instance([\"float\", \"3\", \"x\"])\n\
             template <typename T, int N = 2> struct Box {};\n\
             template class Unknown<int>;\n",
        );
        let codes: Vec<&str> = tu.diagnostics.iter().filter_map(|d| d.code.as_deref()).collect();
        assert_eq!(codes, vec!["W0302", "W0204"]);
        assert!(tu.find_template("Box").unwrap().instantiations.is_empty());
    }
}
