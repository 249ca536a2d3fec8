//! AST Model Builder: one walk over the typed AST producing entities.
//!
//! Unsupported constructs are skipped with a `W02xx` warning. Template
//! instantiation evidence is collected during the walk and resolved in
//! [`super::instances`] once every declaration has been seen.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::path::Path;
use tracing::{debug, trace};

use super::directives::{Directives, parse_directives};
use super::instances::{self, Pending, PendingKind, PartialSpec};
use super::{
    BaseRef, ClassEntity, ClassKind, Concrete, Constructor, Entity, ExportMark, Field,
    FunctionEntity, Member, Method, Param, Signature, TemplateEntity, TemplateParam,
    TemplateParamKind, TranslationUnit, Visibility,
};
use crate::base::QualifiedName;
use crate::diagnostics::{Diagnostic, Location, codes};
use crate::error::ParseError;
use crate::frontend::ast::{self, Access, AstNode, ClassKey, Declaration};
use crate::frontend::{Frontend, ParsedUnit, SyntaxNode};
use crate::types::{Bindings, TemplateArg, TypeExpr, TypeName};

/// Parse `path` with `frontend` and build its translation unit.
pub fn load(
    frontend: &dyn Frontend,
    path: &Path,
    flags: &[String],
) -> Result<TranslationUnit, ParseError> {
    let unit = frontend.parse(path, flags)?;
    Ok(build(&unit))
}

/// Build the translation unit of an already parsed file.
pub fn build(unit: &ParsedUnit) -> TranslationUnit {
    let mut builder = Builder::new(unit);
    if let Some(root) = unit.root() {
        let declarations: Vec<Declaration> = root.declarations().collect();
        builder.declarations(&declarations, &Scope::default());
    }
    builder.finish()
}

/// Lexical context of a declaration.
#[derive(Debug, Clone, Default)]
struct Scope {
    /// Enclosing namespaces and classes.
    path: Vec<SmolStr>,
    /// Effective mark of the enclosing declaration.
    mark: ExportMark,
    /// Template parameter names visible here.
    template_params: Vec<SmolStr>,
    /// Inside a class template: its name and the type it stands for.
    injected: Option<(SmolStr, TypeExpr)>,
}

impl Scope {
    fn nested(&self, segments: &[SmolStr], mark: ExportMark) -> Scope {
        let mut path = self.path.clone();
        path.extend(segments.iter().cloned());
        Scope {
            path,
            mark,
            ..self.clone()
        }
    }
}

struct Builder<'u> {
    unit: &'u ParsedUnit,
    entities: Vec<Entity>,
    /// Qualified names of declared classes, templates and aliases.
    known_types: FxHashSet<String>,
    aliases: IndexMap<String, TypeExpr>,
    evidence: Vec<Pending>,
    diagnostics: Vec<Diagnostic>,
}

impl<'u> Builder<'u> {
    fn new(unit: &'u ParsedUnit) -> Self {
        Self {
            unit,
            entities: Vec::new(),
            known_types: FxHashSet::default(),
            aliases: IndexMap::new(),
            evidence: Vec::new(),
            diagnostics: unit.diagnostics().to_vec(),
        }
    }

    fn finish(mut self) -> TranslationUnit {
        instances::resolve(&mut self.entities, self.evidence, &mut self.diagnostics);
        debug!(
            entities = self.entities.len(),
            warnings = self.diagnostics.len(),
            "built translation unit"
        );
        TranslationUnit {
            files: self.unit.files().iter().map(|f| f.path.clone()).collect(),
            system_includes: self.unit.system_includes().to_vec(),
            entities: self.entities,
            aliases: self.aliases,
            diagnostics: self.diagnostics,
        }
    }

    // ------------------------------------------------------------------------
    // Diagnostics and lookup helpers
    // ------------------------------------------------------------------------

    fn location(&self, node: &SyntaxNode) -> Option<Location> {
        let token = node
            .descendants_with_tokens()
            .filter_map(|e| e.into_token())
            .find(|t| !t.kind().is_trivia())?;
        self.unit.location(token.text_range().start())
    }

    fn warn(&mut self, code: &'static str, message: String, location: Option<Location>) {
        debug!(code, %message, "skipped declaration");
        self.diagnostics.push(
            Diagnostic::warning(message)
                .with_code(code)
                .with_location(location),
        );
    }

    /// Directives in the comments above `node`, and above `inner` if given.
    fn directives(&mut self, node: &SyntaxNode, inner: Option<&SyntaxNode>) -> Directives {
        let mut comments = ast::leading_comments(node);
        if let Some(inner) = inner {
            comments.extend(ast::leading_comments(inner));
        }
        let (directives, errors) = parse_directives(&comments);
        if !errors.is_empty() {
            let location = self.location(node);
            for error in errors {
                self.warn(codes::MALFORMED_DIRECTIVE, error, location.clone());
            }
        }
        directives
    }

    fn declare_type(&mut self, scope: &Scope, segments: &[SmolStr]) -> String {
        let mut path = scope.path.clone();
        path.extend(segments.iter().cloned());
        let qualified = path.join("::");
        self.known_types.insert(qualified.clone());
        qualified
    }

    /// The namespace to put in front of a name written as `segments`.
    fn prefix_for(&self, segments: &[SmolStr], scope: &Scope) -> Option<Vec<SmolStr>> {
        if segments.len() == 1 && scope.template_params.contains(&segments[0]) {
            return None;
        }
        let written = segments.join("::");
        (1..=scope.path.len()).rev().find_map(|i| {
            let candidate = format!("{}::{}", scope.path[..i].join("::"), written);
            self.known_types
                .contains(&candidate)
                .then(|| scope.path[..i].to_vec())
        })
    }

    fn alias(&self, name: &TypeName) -> Option<TypeExpr> {
        if name.segments.iter().any(|s| s.args.is_some()) {
            return None;
        }
        self.aliases.get(&name.path()).cloned()
    }

    /// Qualify names and expand aliases in a type written in `scope`.
    fn normalize(&self, ty: TypeExpr, scope: &Scope) -> TypeExpr {
        let mut ty = ty;
        if let Some((name, injected)) = &scope.injected {
            let mut bindings = Bindings::new();
            bindings.insert(name.clone(), TemplateArg::Type(injected.clone()));
            ty = ty.substitute(&bindings);
        }
        let qualified = ty.qualify(&|segments: &[SmolStr]| self.prefix_for(segments, scope));
        qualified.resolve_aliases(&|name: &TypeName| self.alias(name))
    }

    /// Parse the type spelled by `ty` followed by `suffix` (`*`, `&`).
    fn resolve_type(&self, ty: &ast::Type, suffix: &str, scope: &Scope) -> Option<TypeExpr> {
        let text = format!("{}{}", ty.spelling(), suffix);
        let parsed = TypeExpr::parse(&text).ok()?;
        Some(self.normalize(parsed, scope))
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    fn declarations(&mut self, declarations: &[Declaration], scope: &Scope) {
        for declaration in declarations {
            self.declaration(declaration, scope);
        }
    }

    fn declaration(&mut self, declaration: &Declaration, scope: &Scope) {
        match declaration {
            Declaration::Namespace(namespace) => {
                let directives = self.directives(namespace.syntax(), None);
                let segments = namespace
                    .name()
                    .map(|n| QualifiedName::parse(&n.text()).segments().to_vec())
                    .unwrap_or_default();
                let inner = scope.nested(&segments, ExportMark::inherit(directives.mark, scope.mark));
                self.declarations(&namespace.declarations(), &inner);
            }
            Declaration::LinkageSpec(linkage) => {
                self.declarations(&linkage.declarations(), scope);
            }
            Declaration::Class(class) => {
                let directives = self.directives(class.syntax(), None);
                self.class_declaration(class, scope, &directives);
            }
            Declaration::Function(function) => {
                let directives = self.directives(function.syntax(), None);
                if let Some(entity) = self.free_function(function, scope, &directives) {
                    trace!(function = %entity.qname, "built function");
                    self.entities.push(Entity::Function(entity));
                }
            }
            Declaration::TemplateDecl(decl) => self.template(decl, scope),
            Declaration::ExplicitInstantiation(inst) => self.explicit_instantiation(inst, scope),
            Declaration::TypeAlias(alias) => {
                if let (Some(name), Some(ty), false) = (alias.name(), alias.ty(), alias.is_complex()) {
                    self.alias_declaration(&name.simple(), &ty, scope);
                }
            }
            Declaration::Typedef(typedef) => {
                if let (Some(name), Some(ty), false) =
                    (typedef.name(), typedef.ty(), typedef.is_complex())
                {
                    self.alias_declaration(&name.simple(), &ty, scope);
                }
            }
            Declaration::Skipped(skipped) => {
                let description = skipped.describe();
                let code = if description == "template alias" {
                    codes::TEMPLATE_ALIAS
                } else {
                    codes::UNSUPPORTED_DECLARATION
                };
                let location = self.location(skipped.syntax());
                self.warn(code, format!("{description} is not supported; skipped"), location);
            }
            // Namespace-scope variables, using-directives and stray access
            // specifiers carry nothing to export.
            Declaration::Field(_) | Declaration::UsingDecl(_) | Declaration::AccessSpec(_) => {}
        }
    }

    fn alias_declaration(&mut self, name: &str, ty: &ast::Type, scope: &Scope) {
        let Some(target) = self.resolve_type(ty, "", scope) else {
            debug!(alias = name, "alias target is not a parsable type");
            return;
        };
        let qualified = self.declare_type(scope, &[SmolStr::new(name)]);
        self.aliases.insert(qualified, target);
    }

    fn class_declaration(&mut self, class: &ast::Class, scope: &Scope, directives: &Directives) {
        if class.template_args().is_some() {
            let location = self.location(class.syntax());
            self.warn(
                codes::UNKNOWN_TEMPLATE,
                format!("specialization `{}` without template header; skipped", class.spelling_head()),
                location,
            );
            return;
        }
        let slot = self.entities.len();
        if let Some(entity) = self.class(class, scope, directives) {
            trace!(class = %entity.qname, members = entity.members.len(), "built class");
            self.entities.insert(slot, Entity::Class(entity));
        }
    }

    /// Build a class definition. Nested classes are added to the entity list
    /// as they are found.
    fn class(
        &mut self,
        class: &ast::Class,
        scope: &Scope,
        directives: &Directives,
    ) -> Option<ClassEntity> {
        let location = self.location(class.syntax());
        let Some(name) = class.name() else {
            self.warn(
                codes::UNSUPPORTED_DECLARATION,
                "anonymous class is not supported; skipped".to_string(),
                location,
            );
            return None;
        };
        let segments = QualifiedName::parse(&name.text()).segments().to_vec();
        self.declare_type(scope, &segments);

        let kind = match class.class_key() {
            Some(ClassKey::Struct) => ClassKind::Struct,
            Some(ClassKey::Class) => ClassKind::Class,
            Some(ClassKey::Union) | None => {
                if class.is_definition() {
                    self.warn(
                        codes::UNSUPPORTED_DECLARATION,
                        format!("union `{}` is not supported; skipped", name.text()),
                        location,
                    );
                }
                return None;
            }
        };
        if !class.is_definition() {
            return None;
        }

        let mark = ExportMark::inherit(directives.mark, scope.mark);
        let mut path = scope.path.clone();
        path.extend(segments.iter().cloned());
        let qname = QualifiedName::parse(&path.join("::"));
        let inner = scope.nested(&segments, mark);

        let bases = class
            .bases()
            .iter()
            .filter_map(|base| {
                let ty = self.resolve_type(&base.ty()?, "", scope)?;
                let name = QualifiedName::parse(&ty.name()?.path());
                let visibility = match base.access() {
                    Some(access) => visibility(access),
                    None => kind.default_visibility(),
                };
                Some(BaseRef {
                    name,
                    ty,
                    visibility,
                    is_virtual: base.is_virtual(),
                })
            })
            .collect();

        let class_name = SmolStr::new(name.simple());
        let mut members = Vec::new();
        let mut visibility_now = kind.default_visibility();
        for member in class.members() {
            match &member {
                Declaration::AccessSpec(spec) => {
                    if let Some(access) = spec.access() {
                        visibility_now = visibility(access);
                    }
                }
                Declaration::Function(function) => {
                    let own = self.directives(function.syntax(), None);
                    let member_mark = ExportMark::inherit(own.mark, mark);
                    if let Some(m) =
                        self.member_function(function, &class_name, visibility_now, member_mark, &inner)
                    {
                        members.push(m);
                    }
                }
                Declaration::Field(field) => {
                    let own = self.directives(field.syntax(), None);
                    let member_mark = ExportMark::inherit(own.mark, mark);
                    members.extend(self.fields(field, visibility_now, member_mark, &inner));
                }
                Declaration::Class(nested) => {
                    let own = self.directives(nested.syntax(), None);
                    if !inner.template_params.is_empty() {
                        let location = self.location(nested.syntax());
                        self.warn(
                            codes::UNSUPPORTED_DECLARATION,
                            format!("nested class in class template `{qname}` is not supported; skipped"),
                            location,
                        );
                    } else if visibility_now == Visibility::Public {
                        self.class_declaration(nested, &inner, &own);
                    } else if let Some(name) = nested.name() {
                        self.declare_type(&inner, &[SmolStr::new(name.simple())]);
                    }
                }
                Declaration::TemplateDecl(decl) => {
                    let location = self.location(decl.syntax());
                    self.warn(
                        codes::MEMBER_TEMPLATE,
                        format!("member template in `{qname}` is not exported"),
                        location,
                    );
                }
                Declaration::TypeAlias(alias) => {
                    if let (Some(name), Some(ty), false) = (alias.name(), alias.ty(), alias.is_complex()) {
                        self.alias_declaration(&name.simple(), &ty, &inner);
                    }
                }
                Declaration::Typedef(typedef) => {
                    if let (Some(name), Some(ty), false) =
                        (typedef.name(), typedef.ty(), typedef.is_complex())
                    {
                        self.alias_declaration(&name.simple(), &ty, &inner);
                    }
                }
                Declaration::Skipped(skipped) => {
                    let location = self.location(skipped.syntax());
                    self.warn(
                        codes::UNSUPPORTED_DECLARATION,
                        format!("{} in `{qname}` is not supported; skipped", skipped.describe()),
                        location,
                    );
                }
                Declaration::UsingDecl(_)
                | Declaration::Namespace(_)
                | Declaration::LinkageSpec(_)
                | Declaration::ExplicitInstantiation(_) => {}
            }
        }

        Some(ClassEntity {
            qname,
            kind,
            bases,
            members,
            mark,
            location,
        })
    }

    fn member_function(
        &mut self,
        function: &ast::Function,
        class_name: &str,
        visibility: Visibility,
        mark: ExportMark,
        scope: &Scope,
    ) -> Option<Member> {
        let location = self.location(function.syntax());
        if function.is_destructor() {
            return None;
        }
        if function.is_operator() {
            if visibility == Visibility::Public {
                self.warn(
                    codes::OPERATOR_OVERLOAD,
                    format!(
                        "operator `{}` of `{class_name}` is not exported",
                        function.name().map(|n| n.text()).unwrap_or_default()
                    ),
                    location,
                );
            }
            return None;
        }

        if function.is_constructor_like() {
            let written = function.ty().map(|t| t.spelling()).unwrap_or_default();
            let written = written.strip_prefix("explicit ").unwrap_or(&written);
            if written != class_name {
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    format!("declaration `{written}(...)` in `{class_name}` is not supported; skipped"),
                    location,
                );
                return None;
            }
            let params = self.params(function, scope, class_name, location.clone())?;
            // A deleted constructor still suppresses the implicit one.
            let visibility = if function.is_deleted() {
                Visibility::Private
            } else {
                visibility
            };
            return Some(Member::Constructor(Constructor {
                visibility,
                params,
                mark,
                location,
            }));
        }

        let name = function.name()?;
        if name.is_qualified() || function.is_deleted() {
            return None;
        }
        let method_name = name.simple();
        let entity_name = format!("{class_name}::{method_name}");
        let params = self.params(function, scope, &entity_name, location.clone())?;
        let ret = self.return_type(function, scope, &entity_name, location.clone())?;
        Some(Member::Method(Method {
            name: SmolStr::new(method_name),
            visibility,
            signature: Signature { params, ret },
            is_const: function.is_const(),
            is_static: function.is_static(),
            is_virtual: function.is_virtual(),
            is_pure: function.is_pure(),
            mark,
            location,
        }))
    }

    fn fields(
        &mut self,
        field: &ast::Field,
        visibility: Visibility,
        mark: ExportMark,
        scope: &Scope,
    ) -> Vec<Member> {
        let location = self.location(field.syntax());
        let Some(ty) = field.ty() else {
            return Vec::new();
        };
        if field.is_bitfield() {
            self.warn(
                codes::UNSUPPORTED_DECLARATION,
                format!("bit-field `{}` is not supported; skipped", field.spelling()),
                location,
            );
            return Vec::new();
        }

        let mut declarators: Vec<(String, String, bool, Option<ast::Initializer>)> = Vec::new();
        if let Some(name) = field.name() {
            declarators.push((
                name.simple(),
                String::new(),
                field.array_suffixes().next().is_some(),
                field.initializer(),
            ));
        }
        for declarator in field.declarators() {
            if let Some(name) = declarator.name() {
                declarators.push((
                    name.simple(),
                    declarator.prefix(),
                    declarator.array_suffixes().next().is_some(),
                    declarator.initializer(),
                ));
            }
        }

        let mut members = Vec::new();
        for (name, prefix, is_array, initializer) in declarators {
            if is_array {
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    format!("C array member `{name}` is not supported; skipped"),
                    location.clone(),
                );
                continue;
            }
            let Some(resolved) = self.resolve_type(&ty, &prefix, scope) else {
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    format!("member `{name}` has an unparsable type `{}`; skipped", ty.spelling()),
                    location.clone(),
                );
                continue;
            };
            let default = initializer.map(|i| {
                if i.is_braced() {
                    i.spelling()
                } else {
                    i.value()
                }
            });
            members.push(Member::Field(Field {
                name: SmolStr::new(name),
                visibility,
                is_const: resolved.is_const_object() || field.is_constexpr(),
                ty: resolved,
                is_static: field.is_static(),
                default,
                mark,
                location: location.clone(),
            }));
        }
        members
    }

    fn params(
        &mut self,
        function: &ast::Function,
        scope: &Scope,
        entity: &str,
        location: Option<Location>,
    ) -> Option<Vec<Param>> {
        if function.has_unparsed_parts() {
            self.warn(
                codes::UNSUPPORTED_DECLARATION,
                format!("`{entity}` has parameters that cannot be modelled; skipped"),
                location,
            );
            return None;
        }
        let mut params = Vec::new();
        for param in function.params() {
            if param.is_void() {
                continue;
            }
            if param.is_variadic() || param.is_pack() {
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    format!("variadic function `{entity}` is not supported; skipped"),
                    location,
                );
                return None;
            }
            // Array parameters decay to pointers.
            let suffix = if param.array_suffixes().next().is_some() {
                "*"
            } else {
                ""
            };
            let resolved = param.ty().and_then(|ty| self.resolve_type(&ty, suffix, scope));
            let Some(ty) = resolved else {
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    format!("`{entity}` has a parameter of unparsable type; skipped"),
                    location,
                );
                return None;
            };
            params.push(Param {
                name: param.name().map(|n| SmolStr::new(n.simple())),
                ty,
                default: param.default().map(|d| d.value()),
            });
        }
        Some(params)
    }

    fn return_type(
        &mut self,
        function: &ast::Function,
        scope: &Scope,
        entity: &str,
        location: Option<Location>,
    ) -> Option<TypeExpr> {
        let written = match (function.ty(), function.trailing_return()) {
            (_, Some(trailing)) => Some(trailing),
            (ty, None) => ty,
        };
        let resolved = written.and_then(|ty| self.resolve_type(&ty, "", scope));
        if resolved.is_none() {
            self.warn(
                codes::UNSUPPORTED_DECLARATION,
                format!("`{entity}` has an unparsable return type; skipped"),
                location,
            );
        }
        resolved
    }

    fn free_function(
        &mut self,
        function: &ast::Function,
        scope: &Scope,
        directives: &Directives,
    ) -> Option<FunctionEntity> {
        let location = self.location(function.syntax());
        let Some(name) = function.name() else {
            self.warn(
                codes::UNSUPPORTED_DECLARATION,
                format!("declaration `{}` is not supported; skipped", function.spelling_head()),
                location,
            );
            return None;
        };
        if function.is_operator() {
            self.warn(
                codes::OPERATOR_OVERLOAD,
                format!("operator `{}` is not exported", name.text()),
                location,
            );
            return None;
        }
        // Out-of-line member definitions were declared in their class.
        if name.is_qualified() || function.is_deleted() {
            return None;
        }
        let qname = QualifiedName::new(&scope.path, name.simple());
        let entity = qname.to_string();
        let params = self.params(function, scope, &entity, location.clone())?;
        let ret = self.return_type(function, scope, &entity, location.clone())?;
        Some(FunctionEntity {
            qname,
            signature: Signature { params, ret },
            template: None,
            mark: ExportMark::inherit(directives.mark, scope.mark),
            location,
        })
    }

    // ------------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------------

    fn template_params(&mut self, decl: &ast::TemplateDecl, scope: &Scope) -> Option<Vec<TemplateParam>> {
        let mut params = Vec::new();
        for (i, param) in decl.params().iter().enumerate() {
            if param.is_pack() {
                let location = self.location(decl.syntax());
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    "variadic template is not supported; skipped".to_string(),
                    location,
                );
                return None;
            }
            let name = param
                .name()
                .map(|n| SmolStr::new(n.simple()))
                .unwrap_or_else(|| SmolStr::new(format!("_{i}")));
            let kind = match param.kind() {
                ast::TemplateParamKind::Type => TemplateParamKind::Type,
                ast::TemplateParamKind::Template => TemplateParamKind::Template,
                ast::TemplateParamKind::Value(ty) => match self.resolve_type(&ty, "", scope) {
                    Some(ty) => TemplateParamKind::Value(ty),
                    None => TemplateParamKind::Value(TypeExpr::fundamental("int")),
                },
            };
            let default = param
                .default()
                .and_then(|d| TemplateArg::parse(&d.value()).ok());
            params.push(TemplateParam {
                name,
                kind,
                default,
                is_pack: false,
            });
        }
        Some(params)
    }

    /// Template arguments as written in a `TEMPLATE_ARGS` node.
    fn template_args(&self, args: &ast::TemplateArgs, scope: &Scope) -> Option<Vec<TemplateArg>> {
        args.args()
            .map(|arg| {
                TemplateArg::parse(&arg.spelling()).ok().map(|parsed| match parsed {
                    TemplateArg::Type(ty) => TemplateArg::Type(self.normalize(ty, scope)),
                    value => value,
                })
            })
            .collect()
    }

    fn template(&mut self, decl: &ast::TemplateDecl, scope: &Scope) {
        let location = self.location(decl.syntax());
        let inner_decl = decl.declaration();
        let directives = self.directives(decl.syntax(), inner_decl.as_ref().map(|d| d.syntax()));
        let Some(params) = self.template_params(decl, scope) else {
            return;
        };
        let mark = directives.mark;
        let param_names: Vec<SmolStr> = params.iter().map(|p| p.name.clone()).collect();
        let mut template_scope = scope.clone();
        template_scope.template_params.extend(param_names.iter().cloned());

        match inner_decl {
            Some(Declaration::Class(class)) => {
                let Some(name) = class.name() else {
                    return;
                };
                let simple = SmolStr::new(name.simple());
                let written = QualifiedName::parse(&name.text()).segments().to_vec();
                match (class.template_args(), params.is_empty()) {
                    (None, false) => {
                        // Primary class template
                        template_scope.injected = Some((
                            simple.clone(),
                            injected_type(&param_names, &simple),
                        ));
                        let pattern_directives = Directives {
                            mark,
                            instances: Vec::new(),
                        };
                        let Some(pattern) = self.class(&class, &template_scope, &pattern_directives)
                        else {
                            return;
                        };
                        self.push_template(pattern.qname.clone(), params, Concrete::Class(pattern), directives, scope, location);
                    }
                    (Some(args), false) => {
                        let Some(args) = self.template_args(&args, &template_scope) else {
                            return;
                        };
                        template_scope.injected = Some((simple.clone(), specialized_type(&simple, &args)));
                        let pattern_directives = Directives {
                            mark,
                            instances: Vec::new(),
                        };
                        let Some(pattern) = self.class(&class, &template_scope, &pattern_directives)
                        else {
                            return;
                        };
                        self.evidence.push(Pending {
                            scope: scope.path.clone(),
                            template: written,
                            kind: PendingKind::Partial(PartialSpec {
                                params,
                                args,
                                pattern: Concrete::Class(pattern),
                                instances: directives.instances,
                                mark,
                            }),
                            location,
                        });
                    }
                    (Some(args), true) => {
                        let Some(args) = self.template_args(&args, scope) else {
                            return;
                        };
                        let mut full_scope = scope.clone();
                        full_scope.injected = Some((simple.clone(), specialized_type(&simple, &args)));
                        let pattern_directives = Directives {
                            mark,
                            instances: Vec::new(),
                        };
                        let Some(entity) = self.class(&class, &full_scope, &pattern_directives) else {
                            return;
                        };
                        self.evidence.push(Pending {
                            scope: scope.path.clone(),
                            template: written,
                            kind: PendingKind::Full {
                                args: Some(args),
                                entity: Concrete::Class(entity),
                                mark,
                            },
                            location,
                        });
                    }
                    (None, true) => {
                        self.warn(
                            codes::UNSUPPORTED_DECLARATION,
                            format!("`template <>` without arguments on `{}`; skipped", name.text()),
                            location,
                        );
                    }
                }
            }
            Some(Declaration::Function(function)) => {
                let Some(name) = function.name() else {
                    return;
                };
                if name.is_qualified() {
                    // Out-of-line definition of a member of a class template
                    return;
                }
                let written = vec![SmolStr::new(name.simple())];
                let function_directives = Directives {
                    mark,
                    instances: Vec::new(),
                };
                let Some(mut entity) = self.free_function(&function, &template_scope, &function_directives)
                else {
                    return;
                };
                match (params.is_empty(), function.template_args()) {
                    (false, None) => {
                        entity.template = Some(entity.qname.clone());
                        self.push_template(
                            entity.qname.clone(),
                            params,
                            Concrete::Function(entity),
                            directives,
                            scope,
                            location,
                        );
                    }
                    (true, explicit) => {
                        let args = match explicit {
                            Some(args) => match self.template_args(&args, scope) {
                                Some(args) => Some(args),
                                None => return,
                            },
                            None => None,
                        };
                        self.evidence.push(Pending {
                            scope: scope.path.clone(),
                            template: written,
                            kind: PendingKind::Full {
                                args,
                                entity: Concrete::Function(entity),
                                mark,
                            },
                            location,
                        });
                    }
                    (false, Some(_)) => {
                        self.warn(
                            codes::UNSUPPORTED_DECLARATION,
                            format!("partial specialization of function `{}` is not supported; skipped", name.text()),
                            location,
                        );
                    }
                }
            }
            Some(Declaration::TemplateDecl(_)) => {
                debug!("nested template header skipped");
            }
            Some(other) => {
                self.warn(
                    codes::UNSUPPORTED_DECLARATION,
                    format!("template `{}` is not supported; skipped", short(&other.spelling())),
                    location,
                );
            }
            None => {}
        }
    }

    fn push_template(
        &mut self,
        qname: QualifiedName,
        params: Vec<TemplateParam>,
        pattern: Concrete,
        directives: Directives,
        scope: &Scope,
        location: Option<Location>,
    ) {
        self.known_types.insert(qname.to_string());
        let index = self.entities.len();
        trace!(template = %qname, params = params.len(), "built template");
        self.entities.push(Entity::Template(TemplateEntity {
            qname,
            params,
            pattern,
            instantiations: Vec::new(),
            mark: ExportMark::inherit(directives.mark, scope.mark),
            location: location.clone(),
        }));
        if !directives.instances.is_empty() {
            self.evidence.push(Pending {
                scope: scope.path.clone(),
                template: Vec::new(),
                kind: PendingKind::Directives {
                    template: index,
                    instances: directives.instances,
                },
                location,
            });
        }
    }

    fn explicit_instantiation(&mut self, inst: &ast::ExplicitInstantiation, scope: &Scope) {
        let location = self.location(inst.syntax());
        match inst.declaration() {
            Some(Declaration::Class(class)) => {
                let (Some(name), Some(args)) = (class.name(), class.template_args()) else {
                    return;
                };
                let Some(args) = self.template_args(&args, scope) else {
                    return;
                };
                self.evidence.push(Pending {
                    scope: scope.path.clone(),
                    template: QualifiedName::parse(&name.text()).segments().to_vec(),
                    kind: PendingKind::Explicit {
                        args: Some(args),
                        signature: None,
                    },
                    location,
                });
            }
            Some(Declaration::Function(function)) => {
                let Some(name) = function.name() else {
                    return;
                };
                let explicit = match function.template_args() {
                    Some(args) => match self.template_args(&args, scope) {
                        Some(args) => Some(args),
                        None => return,
                    },
                    None => None,
                };
                let Some(entity) = self.free_function(&function, scope, &Directives::default()) else {
                    return;
                };
                self.evidence.push(Pending {
                    scope: scope.path.clone(),
                    template: QualifiedName::parse(&name.text()).segments().to_vec(),
                    kind: PendingKind::Explicit {
                        args: explicit,
                        signature: Some(entity.signature),
                    },
                    location,
                });
            }
            _ => {}
        }
    }
}

fn visibility(access: Access) -> Visibility {
    match access {
        Access::Public => Visibility::Public,
        Access::Protected => Visibility::Protected,
        Access::Private => Visibility::Private,
    }
}

/// `Sum<T, N>` for the primary template `Sum` with parameters `T, N`.
fn injected_type(params: &[SmolStr], name: &str) -> TypeExpr {
    let args = params
        .iter()
        .map(|p| TemplateArg::Type(TypeExpr::named(p)))
        .collect();
    specialized_type(name, &args)
}

fn specialized_type(name: &str, args: &Vec<TemplateArg>) -> TypeExpr {
    let mut ty = TypeExpr::named(name);
    if let crate::types::BaseType::Named(type_name) = &mut ty.base {
        type_name.segments[0].args = Some(args.clone());
    }
    ty
}

fn short(text: &str) -> String {
    let short: String = text.chars().take(40).collect();
    if short.len() < text.len() {
        format!("{short}...")
    } else {
        short
    }
}

trait SpellingHead {
    /// The declaration's spelling up to its body, shortened.
    fn spelling_head(&self) -> String;
}

impl<N: AstNode> SpellingHead for N {
    fn spelling_head(&self) -> String {
        let text = self.spelling();
        let head = text.split('{').next().unwrap_or(&text).trim();
        short(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{CxxFrontend, MemorySource};

    fn build_text(text: &str) -> TranslationUnit {
        let frontend = CxxFrontend::with_source(MemorySource::new().with_file("test.h", text));
        load(&frontend, Path::new("test.h"), &[]).unwrap()
    }

    #[test]
    fn test_basic_class_members() {
        let tu = build_text(
            "// pxx :: export\n\
             class TestClass {\n\
             public:\n\
               TestClass(){};\n\
               TestClass(int a) : a_(a){};\n\
               const char* get_string() {return \"hello\";}\n\
               int get_int() {return 42;}\n\
               int public_member_1 = 1;\n\
               const int public_member_2 = 2;\n\
             private:\n\
               int a_ = 99;\n\
             };\n",
        );
        let class = tu.find_class("TestClass").unwrap();
        assert_eq!(class.mark, ExportMark::Exported);
        assert_eq!(class.constructors().count(), 2);
        let methods: Vec<&str> = class.methods().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["get_string", "get_int"]);
        assert_eq!(
            class.methods().next().unwrap().signature.ret.to_string(),
            "const char*"
        );

        let fields: Vec<&Field> = class.fields().collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].default.as_deref(), Some("1"));
        assert!(!fields[0].is_const);
        assert!(fields[1].is_const);
        assert_eq!(fields[2].visibility, Visibility::Private);
        assert!(fields.iter().all(|f| f.mark == ExportMark::Exported));
    }

    #[test]
    fn test_namespaces_qualify_names_and_aliases_expand() {
        let tu = build_text(
            "namespace outer { namespace inner {\n\
               class Point { public: double x; };\n\
               using Matrix = Eigen::MatrixXd;\n\
               Point make(const Point& p, Matrix m);\n\
             } }\n",
        );
        let function = tu.functions().next().unwrap();
        assert_eq!(function.qname.to_string(), "outer::inner::make");
        assert_eq!(
            function.signature.describe(),
            "(const outer::inner::Point&, Eigen::MatrixXd) -> outer::inner::Point"
        );
        assert!(tu.aliases.contains_key("outer::inner::Matrix"));
    }

    #[test]
    fn test_hide_wins_over_inherited_export() {
        let tu = build_text(
            "// pxx :: export\n\
             namespace ns {\n\
             struct A {\n\
               // pxx :: hide\n\
               int secret;\n\
               int open;\n\
             };\n\
             // pxx :: hide\n\
             void internal();\n\
             }\n",
        );
        let class = tu.find_class("ns::A").unwrap();
        let marks: Vec<ExportMark> = class.fields().map(|f| f.mark).collect();
        assert_eq!(marks, vec![ExportMark::Hidden, ExportMark::Exported]);
        assert_eq!(tu.functions().next().unwrap().mark, ExportMark::Hidden);
    }

    #[test]
    fn test_unsupported_constructs_warn() {
        let tu = build_text(
            "enum Color { Red };\n\
             // pxx :: exprt\n\
             class A {\n\
             public:\n\
               bool operator==(const A&) const;\n\
               template <typename T> void foo(const T&);\n\
               int bits : 3;\n\
               int raw[4];\n\
               int ok;\n\
             };\n",
        );
        let codes: Vec<&str> = tu
            .diagnostics
            .iter()
            .filter_map(|d| d.code.as_deref())
            .collect();
        assert_eq!(
            codes,
            vec![
                codes::UNSUPPORTED_DECLARATION,
                codes::MALFORMED_DIRECTIVE,
                codes::OPERATOR_OVERLOAD,
                codes::MEMBER_TEMPLATE,
                codes::UNSUPPORTED_DECLARATION,
                codes::UNSUPPORTED_DECLARATION,
            ]
        );
        let class = tu.find_class("A").unwrap();
        assert_eq!(class.fields().count(), 1);
        assert_eq!(class.mark, ExportMark::Unmarked);
    }

    #[test]
    fn test_bases_and_nested_classes() {
        let tu = build_text(
            "namespace ns {\n\
             class Base { public: int id; };\n\
             class Derived : public Base {\n\
             public:\n\
               struct Inner { int v; };\n\
               Inner get() const;\n\
             };\n\
             }\n",
        );
        let names: Vec<String> = tu.classes().map(|c| c.qname.to_string()).collect();
        assert_eq!(names, vec!["ns::Base", "ns::Derived", "ns::Derived::Inner"]);
        let derived = tu.find_class("Derived").unwrap();
        assert_eq!(derived.bases[0].name.to_string(), "ns::Base");
        assert_eq!(derived.bases[0].visibility, Visibility::Public);
        let get = derived.methods().next().unwrap();
        assert!(get.is_const);
        assert_eq!(get.signature.ret.to_string(), "ns::Derived::Inner");
    }

    #[test]
    fn test_directive_on_first_declaration_of_a_block() {
        let tu = build_text(
            "namespace ns {\n\
             // pxx :: export\n\
             class A {};\n\
             }\n\
             namespace spaced {\n\
             \n\
             // pxx :: export\n\
             void f();\n\
             }\n\
             extern \"C\" {\n\
             // pxx :: export\n\
             int g();\n\
             }\n",
        );
        assert_eq!(tu.find_class("ns::A").unwrap().mark, ExportMark::Exported);
        let marks: Vec<(String, ExportMark)> = tu
            .functions()
            .map(|f| (f.qname.to_string(), f.mark))
            .collect();
        assert_eq!(
            marks,
            vec![
                ("spaced::f".to_string(), ExportMark::Exported),
                ("g".to_string(), ExportMark::Exported),
            ]
        );
    }

    #[test]
    fn test_deleted_constructor_suppresses_implicit_one() {
        let tu = build_text("struct A { A() = delete; A(int); };\nstruct B { int x; };\n");
        let a = tu.find_class("A").unwrap();
        assert!(!a.has_implicit_constructor());
        assert_eq!(a.constructors().next().unwrap().visibility, Visibility::Private);
        assert!(tu.find_class("B").unwrap().has_implicit_constructor());
    }
}
