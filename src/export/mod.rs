//! Export policy resolution: TranslationUnit + ExportPolicy → ExportModel.
//!
//! The resolver is a pure function. It never mutates the translation unit
//! and the model it returns is read-only from then on.
//!
//! Under every policy:
//! - entities marked `hide` are left out,
//! - only `public` members are exported,
//! - overloads of one name are grouped into one exported name,
//! - public members of bases that are not exported themselves are folded
//!   into the derived class, unless the derived class declares the name.

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use std::path::PathBuf;
use tracing::{debug, trace};

use crate::base::QualifiedName;
use crate::diagnostics::{Diagnostic, Location};
use crate::error::ExportError;
use crate::model::{
    ClassEntity, ClassKind, Concrete, Constructor, ExportMark, Field, FunctionEntity, Member,
    Method, Specificity, TemplateEntity, TranslationUnit, Visibility,
};
use crate::types::TemplateArg;

/// Which entities of a translation unit take part in code generation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "policy", content = "classes", rename_all = "snake_case")]
pub enum ExportPolicy {
    /// The listed classes, matched by simple or qualified name, plus every
    /// free function and template.
    Explicit(Vec<String>),
    /// Every class with a public surface, every function and template.
    DefaultPublic,
    /// Entities carrying an `export` directive.
    #[default]
    Annotated,
}

impl ExportPolicy {
    /// The policy selected by a class list and the export-all flag. A
    /// non-empty class list takes precedence.
    pub fn from_options(classes: &[String], export_all: bool) -> Self {
        if !classes.is_empty() {
            ExportPolicy::Explicit(classes.to_vec())
        } else if export_all {
            ExportPolicy::DefaultPublic
        } else {
            ExportPolicy::Annotated
        }
    }

    fn admits(&self, mark: ExportMark) -> bool {
        match self {
            ExportPolicy::Annotated => mark == ExportMark::Exported,
            ExportPolicy::Explicit(_) | ExportPolicy::DefaultPublic => mark != ExportMark::Hidden,
        }
    }
}

// ============================================================================
// Export model
// ============================================================================

/// The subset of a translation unit selected for code generation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportModel {
    pub policy: ExportPolicy,
    /// Originating source files, the main file first.
    pub files: Vec<PathBuf>,
    pub classes: Vec<ExportedClass>,
    pub functions: Vec<ExportedFunction>,
    pub templates: Vec<ExportedTemplate>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ExportModel {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.functions.is_empty() && self.templates.is_empty()
    }

    pub fn class(&self, export_name: &str) -> Option<&ExportedClass> {
        self.classes.iter().find(|c| c.export_name == export_name)
    }

    pub fn function(&self, export_name: &str) -> Option<&ExportedFunction> {
        self.functions.iter().find(|f| f.export_name == export_name)
    }

    pub fn template(&self, query: &str) -> Option<&ExportedTemplate> {
        self.templates.iter().find(|t| t.qname.matches(query))
    }

    /// Every exported class, including template instantiations.
    pub fn all_classes(&self) -> impl Iterator<Item = &ExportedClass> {
        self.classes.iter().chain(self.templates.iter().flat_map(|t| {
            t.instantiations.iter().filter_map(|i| match &i.item {
                ExportedItem::Class(c) => Some(c),
                ExportedItem::Function(_) => None,
            })
        }))
    }
}

/// A class as it appears in the generated module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedClass {
    pub qname: QualifiedName,
    pub export_name: SmolStr,
    /// C++ spelling of the class type: `ns::A`, `Sum<int, 3>`.
    pub native: String,
    pub kind: ClassKind,
    /// Native spellings of exported bases.
    pub bases: Vec<String>,
    pub constructors: Vec<Constructor>,
    /// No declared constructors: the implicit default one is exported.
    pub default_constructor: bool,
    pub methods: Vec<MethodGroup>,
    pub fields: Vec<Field>,
    pub is_abstract: bool,
    pub location: Option<Location>,
}

impl ExportedClass {
    pub fn method(&self, name: &str) -> Option<&MethodGroup> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Exported member names, in declaration order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.methods
            .iter()
            .map(|m| m.name.as_str())
            .chain(self.fields.iter().map(|f| f.name.as_str()))
    }
}

/// All overloads of one method name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodGroup {
    pub name: SmolStr,
    pub overloads: Vec<Method>,
}

/// All overloads of one free function name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedFunction {
    pub export_name: SmolStr,
    pub overloads: Vec<FunctionEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedTemplate {
    pub qname: QualifiedName,
    pub is_class: bool,
    /// Exported instantiations, most specific first.
    pub instantiations: Vec<ExportedInstantiation>,
}

impl ExportedTemplate {
    /// Export names in first-seen order, each with its instantiations.
    pub fn entry_points(&self) -> IndexMap<&str, Vec<&ExportedInstantiation>> {
        let mut groups: IndexMap<&str, Vec<&ExportedInstantiation>> = IndexMap::new();
        for instantiation in &self.instantiations {
            groups
                .entry(instantiation.export_name.as_str())
                .or_default()
                .push(instantiation);
        }
        groups
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedInstantiation {
    pub export_name: SmolStr,
    pub native: String,
    pub args: Vec<TemplateArg>,
    pub specificity: Specificity,
    pub item: ExportedItem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExportedItem {
    Class(ExportedClass),
    Function(FunctionEntity),
}

// ============================================================================
// Resolver
// ============================================================================

/// Select the entities of `unit` that `policy` exports.
pub fn resolve(unit: &TranslationUnit, policy: &ExportPolicy) -> Result<ExportModel, ExportError> {
    if let ExportPolicy::Explicit(names) = policy {
        for name in names {
            let known = unit.find_class(name).is_some()
                || unit
                    .find_template(name)
                    .is_some_and(TemplateEntity::is_class_template);
            if !known {
                return Err(ExportError::UnknownExportTarget { name: name.clone() });
            }
        }
    }

    let resolver = Resolver { unit, policy };
    let selected: Vec<&ClassEntity> = unit
        .classes()
        .filter(|c| resolver.selects_class(c))
        .collect();

    let mut model = ExportModel {
        policy: policy.clone(),
        files: unit.files.clone(),
        diagnostics: unit.diagnostics.clone(),
        ..ExportModel::default()
    };

    for class in &selected {
        model
            .classes
            .push(resolver.export_class(class, class.mark, &selected, None));
    }

    let mut functions: IndexMap<SmolStr, Vec<FunctionEntity>> = IndexMap::new();
    for function in unit.functions() {
        if policy.admits(function.mark) {
            functions
                .entry(SmolStr::new(function.qname.name()))
                .or_default()
                .push(function.clone());
        }
    }
    model.functions = functions
        .into_iter()
        .map(|(export_name, overloads)| ExportedFunction {
            export_name,
            overloads,
        })
        .collect();

    for template in unit.templates() {
        if let Some(exported) = resolver.export_template(template, &selected) {
            model.templates.push(exported);
        }
    }

    debug!(
        classes = model.classes.len(),
        functions = model.functions.len(),
        templates = model.templates.len(),
        "resolved export model"
    );
    Ok(model)
}

struct Resolver<'a> {
    unit: &'a TranslationUnit,
    policy: &'a ExportPolicy,
}

impl Resolver<'_> {
    fn selects_class(&self, class: &ClassEntity) -> bool {
        if class.mark == ExportMark::Hidden {
            return false;
        }
        match self.policy {
            ExportPolicy::Explicit(names) => names.iter().any(|n| class.qname.matches(n)),
            ExportPolicy::DefaultPublic => {
                class.members.iter().all(Member::is_public)
                    || class.members.iter().any(Member::is_public)
            }
            ExportPolicy::Annotated => class.mark == ExportMark::Exported,
        }
    }

    fn admits_member(&self, member: &Member, owner: ExportMark) -> bool {
        if !member.is_public() {
            return false;
        }
        let mark = match member.mark() {
            ExportMark::Unmarked => owner,
            mark => mark,
        };
        match self.policy {
            ExportPolicy::Annotated => mark == ExportMark::Exported,
            _ => mark != ExportMark::Hidden,
        }
    }

    /// `native` overrides the class spelling for template instantiations.
    fn export_class(
        &self,
        class: &ClassEntity,
        owner: ExportMark,
        selected: &[&ClassEntity],
        native: Option<(&str, SmolStr)>,
    ) -> ExportedClass {
        let is_abstract = class.is_abstract();
        let mut exported = ExportedClass {
            qname: class.qname.clone(),
            export_name: native
                .as_ref()
                .map(|(_, name)| name.clone())
                .unwrap_or_else(|| SmolStr::new(class.qname.name())),
            native: native
                .map(|(spelling, _)| spelling.to_string())
                .unwrap_or_else(|| class.qname.to_string()),
            kind: class.kind,
            bases: Vec::new(),
            constructors: Vec::new(),
            default_constructor: class.has_implicit_constructor(),
            methods: Vec::new(),
            fields: Vec::new(),
            is_abstract,
            location: class.location.clone(),
        };

        let mut methods: IndexMap<SmolStr, Vec<Method>> = IndexMap::new();
        for member in &class.members {
            if !self.admits_member(member, owner) {
                continue;
            }
            match member {
                Member::Constructor(c) if !is_abstract => exported.constructors.push(c.clone()),
                Member::Constructor(_) => {}
                Member::Method(m) => methods.entry(m.name.clone()).or_default().push(m.clone()),
                Member::Field(f) => exported.fields.push(f.clone()),
            }
        }

        let mut visited = vec![class.qname.clone()];
        for base in &class.bases {
            if base.visibility != Visibility::Public {
                continue;
            }
            if selected.iter().any(|s| s.qname == base.name) {
                exported.bases.push(base.name.to_string());
            } else if let Some(base_class) = self.unit.class(&base.name) {
                self.inherit(base_class, &mut methods, &mut exported.fields, &mut visited);
            } else {
                trace!(class = %class.qname, base = %base.name, "base outside the translation unit");
            }
        }

        exported.methods = methods
            .into_iter()
            .map(|(name, overloads)| MethodGroup { name, overloads })
            .collect();
        exported
    }

    /// Fold the public surface of an unexported base into a derived class.
    fn inherit(
        &self,
        base: &ClassEntity,
        methods: &mut IndexMap<SmolStr, Vec<Method>>,
        fields: &mut Vec<Field>,
        visited: &mut Vec<QualifiedName>,
    ) {
        if visited.contains(&base.qname) {
            return;
        }
        visited.push(base.qname.clone());
        let declared: Vec<SmolStr> = methods
            .keys()
            .cloned()
            .chain(fields.iter().map(|f| f.name.clone()))
            .collect();

        let mut inherited: IndexMap<SmolStr, Vec<Method>> = IndexMap::new();
        for member in &base.members {
            if !member.is_public() || member.mark() == ExportMark::Hidden {
                continue;
            }
            let Some(name) = member.name() else {
                continue;
            };
            if declared.iter().any(|d| d == name) {
                continue;
            }
            match member {
                Member::Method(m) => inherited.entry(m.name.clone()).or_default().push(m.clone()),
                Member::Field(f) => fields.push(f.clone()),
                Member::Constructor(_) => {}
            }
        }
        methods.extend(inherited);

        for grand in &base.bases {
            if let Some(grand_class) = self.unit.class(&grand.name) {
                self.inherit(grand_class, methods, fields, visited);
            }
        }
    }

    fn export_template(
        &self,
        template: &TemplateEntity,
        selected: &[&ClassEntity],
    ) -> Option<ExportedTemplate> {
        if template.mark == ExportMark::Hidden {
            return None;
        }
        let instantiations: Vec<ExportedInstantiation> = template
            .instantiations
            .iter()
            .filter(|i| self.policy.admits(i.mark))
            .map(|i| ExportedInstantiation {
                export_name: i.export_name.clone(),
                native: i.native.clone(),
                args: i.args.clone(),
                specificity: i.specificity,
                item: match &i.entity {
                    Concrete::Class(c) => ExportedItem::Class(self.export_class(
                        c,
                        i.mark,
                        selected,
                        Some((&i.native, i.export_name.clone())),
                    )),
                    Concrete::Function(f) => ExportedItem::Function(f.clone()),
                },
            })
            .collect();
        if instantiations.is_empty() {
            debug!(template = %template.qname, "template without exported instantiations");
            return None;
        }
        Some(ExportedTemplate {
            qname: template.qname.clone(),
            is_class: template.is_class_template(),
            instantiations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{CxxFrontend, MemorySource};
    use crate::model::load;
    use rstest::rstest;
    use std::path::Path;

    const SOURCE: &str = "\
// pxx :: export
class TestClass {
public:
    TestClass();
    std::string get_string();
    int get_int() const;
    int get_int(int offset) const;
    // pxx :: hide
    void internal();
    int public_member_1 = 1;
    int public_member_2 = 2;
private:
    int secret;
};

class Plain {
public:
    int value;
};

// pxx :: hide
class Hidden { public: int x; };

class Secretive { int x; };

// pxx :: export
int answer();
int other();
";

    fn unit() -> TranslationUnit {
        let frontend = CxxFrontend::with_source(MemorySource::new().with_file("t.h", SOURCE));
        load(&frontend, Path::new("t.h"), &[]).unwrap()
    }

    fn class_names(model: &ExportModel) -> Vec<&str> {
        model.classes.iter().map(|c| c.export_name.as_str()).collect()
    }

    #[rstest]
    #[case(ExportPolicy::Annotated, vec!["TestClass"], vec!["answer"])]
    #[case(ExportPolicy::DefaultPublic, vec!["TestClass", "Plain"], vec!["answer", "other"])]
    #[case(ExportPolicy::Explicit(vec!["Plain".into()]), vec!["Plain"], vec!["answer", "other"])]
    fn test_policies(
        #[case] policy: ExportPolicy,
        #[case] classes: Vec<&str>,
        #[case] functions: Vec<&str>,
    ) {
        let model = resolve(&unit(), &policy).unwrap();
        assert_eq!(class_names(&model), classes);
        let names: Vec<&str> = model.functions.iter().map(|f| f.export_name.as_str()).collect();
        assert_eq!(names, functions);
    }

    #[test]
    fn test_members_are_public_grouped_and_filtered() {
        let model = resolve(&unit(), &ExportPolicy::Annotated).unwrap();
        let class = model.class("TestClass").unwrap();
        let names: Vec<&str> = class.member_names().collect();
        assert_eq!(
            names,
            vec!["get_string", "get_int", "public_member_1", "public_member_2"]
        );
        assert_eq!(class.method("get_int").unwrap().overloads.len(), 2);
        assert_eq!(class.constructors.len(), 1);
        assert!(!class.default_constructor);
    }

    #[test]
    fn test_unknown_class_is_an_error() {
        let err = resolve(&unit(), &ExportPolicy::Explicit(vec!["Missing".into()])).unwrap_err();
        assert_eq!(
            err,
            ExportError::UnknownExportTarget {
                name: "Missing".into()
            }
        );
    }

    #[test]
    fn test_hidden_class_is_excluded_even_when_listed() {
        let model = resolve(&unit(), &ExportPolicy::Explicit(vec!["Hidden".into()])).unwrap();
        assert!(model.classes.is_empty());
    }

    #[test]
    fn test_unexported_base_members_are_inherited() {
        let frontend = CxxFrontend::with_source(MemorySource::new().with_file(
            "t.h",
            "struct Base { int base_value; int shared(); };\n\
             // pxx :: export\n\
             struct Derived : public Base { int shared(); int own; };\n\
             // pxx :: export\n\
             struct Other : Derived {};\n",
        ));
        let tu = load(&frontend, Path::new("t.h"), &[]).unwrap();
        let model = resolve(&tu, &ExportPolicy::Annotated).unwrap();
        let derived = model.class("Derived").unwrap();
        assert!(derived.bases.is_empty());
        let names: Vec<&str> = derived.member_names().collect();
        assert_eq!(names, vec!["shared", "own", "base_value"]);
        assert_eq!(derived.method("shared").unwrap().overloads.len(), 1);

        let other = model.class("Other").unwrap();
        assert_eq!(other.bases, vec!["Derived".to_string()]);
        assert_eq!(other.member_names().count(), 0);
    }

    #[test]
    fn test_templates_keep_catalogue_order() {
        let frontend = CxxFrontend::with_source(MemorySource::new().with_file(
            "t.h",
            "// pxx :: export\n\
             // pxx :: instance([\"int\", \"3\"])\n\
             template <typename T, int N> struct Sum { T data; };\n\
             // pxx :: instance(\"Sum1\", [\"int\"])\n\
             template <typename T> struct Sum<T, 1> { T value; };\n\
             template <typename T> T unused(T x);\n",
        ));
        let tu = load(&frontend, Path::new("t.h"), &[]).unwrap();
        let model = resolve(&tu, &ExportPolicy::Annotated).unwrap();
        assert_eq!(model.templates.len(), 1);
        let sum = model.template("Sum").unwrap();
        let entry_points: Vec<&str> = sum.entry_points().keys().copied().collect();
        assert_eq!(entry_points, vec!["Sum1", "Sum"]);
        let natives: Vec<&str> = model.all_classes().map(|c| c.native.as_str()).collect();
        assert_eq!(natives, vec!["Sum<int, 1>", "Sum<int, 3>"]);
    }
}
