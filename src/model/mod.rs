//! The export model's source of truth: entities found in one translation unit.
//!
//! Entities are plain, tree-shaped values. Bases and types are referenced by
//! name; nothing here points back into the frontend's syntax tree.

mod builder;
mod directives;
mod dump;
mod instances;

pub use builder::{build, load};
pub use directives::{Directives, InstanceDirective, parse_directives};
pub use dump::{DumpFormat, dump};

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use std::path::PathBuf;

use crate::base::QualifiedName;
use crate::diagnostics::{Diagnostic, Location};
use crate::types::{Bindings, TemplateArg, TypeExpr};

// ============================================================================
// Translation unit
// ============================================================================

/// Everything the builder found in one parsed file and its quoted includes.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationUnit {
    /// Files read, the main file first.
    pub files: Vec<PathBuf>,
    /// `<...>` includes seen while preprocessing.
    pub system_includes: Vec<String>,
    pub entities: Vec<Entity>,
    /// Type aliases by qualified name, already expanded.
    #[serde(skip)]
    pub aliases: IndexMap<String, TypeExpr>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TranslationUnit {
    pub fn classes(&self) -> impl Iterator<Item = &ClassEntity> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Class(c) => Some(c),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntity> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateEntity> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Template(t) => Some(t),
            _ => None,
        })
    }

    /// Find a class by simple or (partially) qualified name.
    pub fn find_class(&self, query: &str) -> Option<&ClassEntity> {
        self.classes().find(|c| c.qname.matches(query))
    }

    /// Find a class by its exact qualified name.
    pub fn class(&self, qname: &QualifiedName) -> Option<&ClassEntity> {
        self.classes().find(|c| &c.qname == qname)
    }

    /// Find a template by simple or (partially) qualified name.
    pub fn find_template(&self, query: &str) -> Option<&TemplateEntity> {
        self.templates().find(|t| t.qname.matches(query))
    }

    pub fn main_file(&self) -> Option<&PathBuf> {
        self.files.first()
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Whether a declaration is selected for export by a `// pxx ::` directive.
///
/// Values stored in the model are effective: a member without a directive
/// of its own carries the mark of its class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMark {
    #[default]
    Unmarked,
    Exported,
    Hidden,
}

impl ExportMark {
    /// `own` if present, else the mark inherited from the enclosing scope.
    pub fn inherit(own: Option<ExportMark>, parent: ExportMark) -> ExportMark {
        own.unwrap_or(parent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Class,
    Struct,
}

impl ClassKind {
    /// Visibility of members before the first access specifier.
    pub fn default_visibility(self) -> Visibility {
        match self {
            ClassKind::Class => Visibility::Private,
            ClassKind::Struct => Visibility::Public,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum Entity {
    Class(ClassEntity),
    Function(FunctionEntity),
    Template(TemplateEntity),
}

impl Entity {
    pub fn qname(&self) -> &QualifiedName {
        match self {
            Entity::Class(c) => &c.qname,
            Entity::Function(f) => &f.qname,
            Entity::Template(t) => &t.qname,
        }
    }

    pub fn mark(&self) -> ExportMark {
        match self {
            Entity::Class(c) => c.mark,
            Entity::Function(f) => f.mark,
            Entity::Template(t) => t.mark,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: Option<SmolStr>,
    pub ty: TypeExpr,
    /// Default argument as written.
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret: TypeExpr,
}

impl Signature {
    pub fn substitute(&self, bindings: &Bindings) -> Signature {
        Signature {
            params: substitute_params(&self.params, bindings),
            ret: self.ret.substitute(bindings),
        }
    }

    pub fn param_types(&self) -> impl Iterator<Item = &TypeExpr> {
        self.params.iter().map(|p| &p.ty)
    }

    /// `(const A&, int) -> void`
    pub fn describe(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        format!("({}) -> {}", params.join(", "), self.ret)
    }
}

fn substitute_params(params: &[Param], bindings: &Bindings) -> Vec<Param> {
    params
        .iter()
        .map(|p| Param {
            ty: p.ty.substitute(bindings),
            ..p.clone()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseRef {
    /// The base as resolved at the point of declaration.
    pub name: QualifiedName,
    pub ty: TypeExpr,
    pub visibility: Visibility,
    pub is_virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constructor {
    pub visibility: Visibility,
    pub params: Vec<Param>,
    pub mark: ExportMark,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Method {
    pub name: SmolStr,
    pub visibility: Visibility,
    pub signature: Signature,
    pub is_const: bool,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_pure: bool,
    pub mark: ExportMark,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: SmolStr,
    pub visibility: Visibility,
    pub ty: TypeExpr,
    /// `const` or `constexpr`: readable but not writable.
    pub is_const: bool,
    pub is_static: bool,
    /// Default member initializer as written.
    pub default: Option<String>,
    pub mark: ExportMark,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "member", rename_all = "lowercase")]
pub enum Member {
    Constructor(Constructor),
    Method(Method),
    Field(Field),
}

impl Member {
    pub fn visibility(&self) -> Visibility {
        match self {
            Member::Constructor(c) => c.visibility,
            Member::Method(m) => m.visibility,
            Member::Field(f) => f.visibility,
        }
    }

    pub fn mark(&self) -> ExportMark {
        match self {
            Member::Constructor(c) => c.mark,
            Member::Method(m) => m.mark,
            Member::Field(f) => f.mark,
        }
    }

    /// Exported name; constructors have none.
    pub fn name(&self) -> Option<&str> {
        match self {
            Member::Constructor(_) => None,
            Member::Method(m) => Some(&m.name),
            Member::Field(f) => Some(&f.name),
        }
    }

    pub fn is_public(&self) -> bool {
        self.visibility() == Visibility::Public
    }

    fn substitute(&self, bindings: &Bindings) -> Member {
        match self {
            Member::Constructor(c) => Member::Constructor(Constructor {
                params: substitute_params(&c.params, bindings),
                ..c.clone()
            }),
            Member::Method(m) => Member::Method(Method {
                signature: m.signature.substitute(bindings),
                ..m.clone()
            }),
            Member::Field(f) => Member::Field(Field {
                ty: f.ty.substitute(bindings),
                ..f.clone()
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassEntity {
    pub qname: QualifiedName,
    pub kind: ClassKind,
    pub bases: Vec<BaseRef>,
    pub members: Vec<Member>,
    pub mark: ExportMark,
    pub location: Option<Location>,
}

impl ClassEntity {
    pub fn constructors(&self) -> impl Iterator<Item = &Constructor> {
        self.members.iter().filter_map(|m| match m {
            Member::Constructor(c) => Some(c),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(m) => Some(m),
            _ => None,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.members.iter().filter_map(|m| match m {
            Member::Field(f) => Some(f),
            _ => None,
        })
    }

    /// Declares at least one pure virtual method.
    pub fn is_abstract(&self) -> bool {
        self.methods().any(|m| m.is_pure)
    }

    /// Whether the class may be constructed without arguments.
    pub fn has_implicit_constructor(&self) -> bool {
        self.constructors().next().is_none() && !self.is_abstract()
    }

    pub fn substitute(&self, bindings: &Bindings) -> ClassEntity {
        ClassEntity {
            bases: self
                .bases
                .iter()
                .map(|b| BaseRef {
                    ty: b.ty.substitute(bindings),
                    ..b.clone()
                })
                .collect(),
            members: self.members.iter().map(|m| m.substitute(bindings)).collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionEntity {
    pub qname: QualifiedName,
    pub signature: Signature,
    /// The owning template for instantiated functions.
    pub template: Option<QualifiedName>,
    pub mark: ExportMark,
    pub location: Option<Location>,
}

impl FunctionEntity {
    pub fn substitute(&self, bindings: &Bindings) -> FunctionEntity {
        FunctionEntity {
            signature: self.signature.substitute(bindings),
            ..self.clone()
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "type", rename_all = "lowercase")]
pub enum TemplateParamKind {
    Type,
    Value(TypeExpr),
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateParam {
    pub name: SmolStr,
    pub kind: TemplateParamKind,
    pub default: Option<TemplateArg>,
    pub is_pack: bool,
}

/// The declaration an instantiation was produced from, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Specificity {
    /// An explicit `template <>` specialization.
    Full,
    /// A partial specialization with some parameters left generic.
    Partial,
    /// The primary template.
    Primary,
}

/// How the builder learned about an instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    /// A `// pxx :: instance(...)` directive.
    Directive,
    /// A `template <>` specialization.
    Specialization,
    /// A `template class X<...>;` or `template R f(...);` statement.
    ExplicitInstantiation,
}

/// The declaration a template or instantiation stands for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Concrete {
    Class(ClassEntity),
    Function(FunctionEntity),
}

impl Concrete {
    pub fn substitute(&self, bindings: &Bindings) -> Concrete {
        match self {
            Concrete::Class(c) => Concrete::Class(c.substitute(bindings)),
            Concrete::Function(f) => Concrete::Function(f.substitute(bindings)),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Concrete::Class(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instantiation {
    /// Name of the host entry point.
    pub export_name: SmolStr,
    /// Arguments for the primary template's parameters.
    pub args: Vec<TemplateArg>,
    pub bindings: Bindings,
    pub specificity: Specificity,
    pub evidence: Evidence,
    pub mark: ExportMark,
    /// Native spelling: `Sum<int, 3>`, `detail::sum<float, 3>`.
    pub native: String,
    pub entity: Concrete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateEntity {
    pub qname: QualifiedName,
    pub params: Vec<TemplateParam>,
    /// The primary declaration, uninstantiated.
    pub pattern: Concrete,
    /// Ordered most specific first; frozen once the builder finishes.
    pub instantiations: Vec<Instantiation>,
    pub mark: ExportMark,
    pub location: Option<Location>,
}

impl TemplateEntity {
    pub fn param_names(&self) -> Vec<SmolStr> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    pub fn is_class_template(&self) -> bool {
        self.pattern.is_class()
    }
}
