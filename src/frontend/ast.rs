//! Typed AST wrappers over the untyped rowan CST.
//!
//! Each struct wraps a SyntaxNode and provides methods to access children.
//! The wrappers never allocate a second tree; everything is read lazily
//! from the green nodes.

use super::syntax_kind::{SyntaxKind, SyntaxNode, SyntaxToken};
use rowan::NodeOrToken;

// ============================================================================
// Helper utilities
// ============================================================================

/// Check if a syntax node has a direct child token of the specified kind.
#[inline]
fn has_token(node: &SyntaxNode, kind: SyntaxKind) -> bool {
    node.children_with_tokens()
        .filter_map(|e| e.into_token())
        .any(|t| t.kind() == kind)
}

/// Direct, non-trivia child tokens of a node.
fn direct_tokens(node: &SyntaxNode) -> impl Iterator<Item = SyntaxToken> + '_ {
    node.children_with_tokens()
        .filter_map(|e| e.into_token())
        .filter(|t| !t.kind().is_trivia())
}

/// Spell the non-trivia tokens under `node` on one line.
///
/// Words are separated by a single space, commas are followed by one and
/// all other punctuation is glued to its neighbours, so
/// `std :: array < float,3 >` spells `std::array<float, 3>`.
pub fn spell(node: &SyntaxNode) -> String {
    let tokens = node
        .descendants_with_tokens()
        .filter_map(|e| e.into_token())
        .filter(|t| !t.kind().is_trivia());
    spell_tokens(tokens)
}

fn spell_tokens(tokens: impl Iterator<Item = SyntaxToken>) -> String {
    let mut out = String::new();
    let mut last: Option<SyntaxKind> = None;
    for token in tokens {
        let kind = token.kind();
        if let Some(prev) = last {
            if (is_spaced(prev) && is_spaced(kind)) || prev == SyntaxKind::COMMA {
                out.push(' ');
            }
        }
        out.push_str(token.text());
        last = Some(kind);
    }
    out
}

fn is_spaced(kind: SyntaxKind) -> bool {
    kind.is_word() || kind.is_literal()
}

macro_rules! ast_node {
    ($name:ident, $kind:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) SyntaxNode);

        impl AstNode for $name {
            fn can_cast(kind: SyntaxKind) -> bool {
                kind == SyntaxKind::$kind
            }

            fn cast(node: SyntaxNode) -> Option<Self> {
                if Self::can_cast(node.kind()) {
                    Some(Self(node))
                } else {
                    None
                }
            }

            fn syntax(&self) -> &SyntaxNode {
                &self.0
            }
        }
    };
}

macro_rules! has_token_method {
    ($name:ident, $kind:ident) => {
        #[doc = concat!("Check if this node has the `", stringify!($kind), "` token.")]
        pub fn $name(&self) -> bool {
            has_token(&self.0, SyntaxKind::$kind)
        }
    };
    ($name:ident, $kind:ident, $example:literal) => {
        #[doc = concat!("Check if this node has the `", stringify!($kind), "` token (e.g., `", $example, "`).")]
        pub fn $name(&self) -> bool {
            has_token(&self.0, SyntaxKind::$kind)
        }
    };
}

macro_rules! first_child_method {
    ($name:ident, $type:ident) => {
        #[doc = concat!("Get the first `", stringify!($type), "` child of this node.")]
        pub fn $name(&self) -> Option<$type> {
            self.0.children().find_map($type::cast)
        }
    };
}

macro_rules! children_method {
    ($name:ident, $type:ident) => {
        #[doc = concat!("Get all `", stringify!($type), "` children of this node.")]
        pub fn $name(&self) -> impl Iterator<Item = $type> + '_ {
            self.0.children().filter_map($type::cast)
        }
    };
}

macro_rules! child_after_keyword_method {
    ($name:ident, $type:ident, $keyword:ident, $doc:literal) => {
        #[doc = $doc]
        pub fn $name(&self) -> Option<$type> {
            let mut seen_keyword = false;
            for child in self.0.children_with_tokens() {
                match child {
                    NodeOrToken::Token(t) if t.kind() == SyntaxKind::$keyword => {
                        seen_keyword = true;
                    }
                    NodeOrToken::Node(n) if seen_keyword => {
                        if let Some(result) = $type::cast(n) {
                            return Some(result);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
    };
}

macro_rules! token_to_enum_method {
    ($name:ident, $enum_type:ident, [$($token:ident => $variant:ident),+ $(,)?]) => {
        pub fn $name(&self) -> Option<$enum_type> {
            for token in self.0.children_with_tokens().filter_map(|e| e.into_token()) {
                match token.kind() {
                    $(SyntaxKind::$token => return Some($enum_type::$variant),)+
                    _ => {}
                }
            }
            None
        }
    };
}

/// Trait for AST nodes that wrap a SyntaxNode
pub trait AstNode: Sized {
    fn can_cast(kind: SyntaxKind) -> bool;
    fn cast(node: SyntaxNode) -> Option<Self>;
    fn syntax(&self) -> &SyntaxNode;

    /// Text of the node without trivia, see [`spell`].
    fn spelling(&self) -> String {
        spell(self.syntax())
    }

    /// The `//` comments directly above this node.
    fn leading_comments(&self) -> Vec<String> {
        leading_comments(self.syntax())
    }
}

/// Collect the line comments directly preceding `node`, top to bottom.
///
/// A blank line ends the block; block comments in between are stepped over.
/// Only trivia is inspected: the first preceding token or node that is not
/// trivia stops the search.
pub fn leading_comments(node: &SyntaxNode) -> Vec<String> {
    let mut comments = Vec::new();
    let mut newlines = 0;
    let mut current = node.prev_sibling_or_token();

    while let Some(element) = current {
        match element {
            NodeOrToken::Token(ref t) => match t.kind() {
                SyntaxKind::WHITESPACE => {
                    newlines += t.text().matches('\n').count();
                    if newlines >= 2 {
                        break;
                    }
                    current = t.prev_sibling_or_token();
                }
                SyntaxKind::LINE_COMMENT => {
                    comments.push(t.text().to_string());
                    newlines = 0;
                    current = t.prev_sibling_or_token();
                }
                SyntaxKind::BLOCK_COMMENT => {
                    newlines = 0;
                    current = t.prev_sibling_or_token();
                }
                _ => break,
            },
            NodeOrToken::Node(_) => break,
        }
    }

    comments.reverse();
    comments
}

// ============================================================================
// Root and declarations
// ============================================================================

ast_node!(SourceFile, SOURCE_FILE);

impl SourceFile {
    children_method!(declarations, Declaration);
}

/// Any declaration that may appear at namespace or class scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Declaration {
    Namespace(Namespace),
    LinkageSpec(LinkageSpec),
    Class(Class),
    Function(Function),
    Field(Field),
    TemplateDecl(TemplateDecl),
    ExplicitInstantiation(ExplicitInstantiation),
    TypeAlias(TypeAlias),
    Typedef(Typedef),
    UsingDecl(UsingDecl),
    AccessSpec(AccessSpec),
    Skipped(Skipped),
}

impl AstNode for Declaration {
    fn can_cast(kind: SyntaxKind) -> bool {
        matches!(
            kind,
            SyntaxKind::NAMESPACE
                | SyntaxKind::LINKAGE_SPEC
                | SyntaxKind::CLASS
                | SyntaxKind::FUNCTION
                | SyntaxKind::FIELD
                | SyntaxKind::TEMPLATE_DECL
                | SyntaxKind::EXPLICIT_INSTANTIATION
                | SyntaxKind::TYPE_ALIAS
                | SyntaxKind::TYPEDEF
                | SyntaxKind::USING_DECL
                | SyntaxKind::ACCESS_SPEC
                | SyntaxKind::SKIPPED
        )
    }

    fn cast(node: SyntaxNode) -> Option<Self> {
        match node.kind() {
            SyntaxKind::NAMESPACE => Some(Self::Namespace(Namespace(node))),
            SyntaxKind::LINKAGE_SPEC => Some(Self::LinkageSpec(LinkageSpec(node))),
            SyntaxKind::CLASS => Some(Self::Class(Class(node))),
            SyntaxKind::FUNCTION => Some(Self::Function(Function(node))),
            SyntaxKind::FIELD => Some(Self::Field(Field(node))),
            SyntaxKind::TEMPLATE_DECL => Some(Self::TemplateDecl(TemplateDecl(node))),
            SyntaxKind::EXPLICIT_INSTANTIATION => {
                Some(Self::ExplicitInstantiation(ExplicitInstantiation(node)))
            }
            SyntaxKind::TYPE_ALIAS => Some(Self::TypeAlias(TypeAlias(node))),
            SyntaxKind::TYPEDEF => Some(Self::Typedef(Typedef(node))),
            SyntaxKind::USING_DECL => Some(Self::UsingDecl(UsingDecl(node))),
            SyntaxKind::ACCESS_SPEC => Some(Self::AccessSpec(AccessSpec(node))),
            SyntaxKind::SKIPPED => Some(Self::Skipped(Skipped(node))),
            _ => None,
        }
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Self::Namespace(n) => n.syntax(),
            Self::LinkageSpec(n) => n.syntax(),
            Self::Class(n) => n.syntax(),
            Self::Function(n) => n.syntax(),
            Self::Field(n) => n.syntax(),
            Self::TemplateDecl(n) => n.syntax(),
            Self::ExplicitInstantiation(n) => n.syntax(),
            Self::TypeAlias(n) => n.syntax(),
            Self::Typedef(n) => n.syntax(),
            Self::UsingDecl(n) => n.syntax(),
            Self::AccessSpec(n) => n.syntax(),
            Self::Skipped(n) => n.syntax(),
        }
    }
}

ast_node!(DeclList, DECL_LIST);

impl DeclList {
    children_method!(declarations, Declaration);
}

ast_node!(Namespace, NAMESPACE);

impl Namespace {
    first_child_method!(name, Name);
    first_child_method!(body, DeclList);
    has_token_method!(is_inline, INLINE_KW, "inline namespace v1 {}");

    pub fn declarations(&self) -> Vec<Declaration> {
        self.body()
            .map(|body| body.declarations().collect())
            .unwrap_or_default()
    }
}

ast_node!(LinkageSpec, LINKAGE_SPEC);

impl LinkageSpec {
    /// Declarations of the block form, or the single declaration of
    /// `extern "C" void f();`.
    pub fn declarations(&self) -> Vec<Declaration> {
        match self.0.children().find_map(DeclList::cast) {
            Some(body) => body.declarations().collect(),
            None => self.0.children().filter_map(Declaration::cast).collect(),
        }
    }
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKey {
    Class,
    Struct,
    Union,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Public,
    Protected,
    Private,
}

ast_node!(Class, CLASS);

impl Class {
    first_child_method!(name, Name);
    first_child_method!(template_args, TemplateArgs);
    first_child_method!(base_list, BaseList);
    first_child_method!(member_list, MemberList);

    token_to_enum_method!(class_key, ClassKey, [
        CLASS_KW => Class,
        STRUCT_KW => Struct,
        UNION_KW => Union,
    ]);

    pub fn bases(&self) -> Vec<BaseSpec> {
        self.base_list()
            .map(|list| list.specs().collect())
            .unwrap_or_default()
    }

    pub fn members(&self) -> Vec<Declaration> {
        self.member_list()
            .map(|list| list.declarations().collect())
            .unwrap_or_default()
    }

    /// A class with a body, as opposed to a forward declaration or an
    /// explicit instantiation.
    pub fn is_definition(&self) -> bool {
        self.member_list().is_some()
    }
}

ast_node!(BaseList, BASE_LIST);

impl BaseList {
    children_method!(specs, BaseSpec);
}

ast_node!(BaseSpec, BASE_SPEC);

impl BaseSpec {
    first_child_method!(ty, Type);
    has_token_method!(is_virtual, VIRTUAL_KW);

    token_to_enum_method!(access, Access, [
        PUBLIC_KW => Public,
        PROTECTED_KW => Protected,
        PRIVATE_KW => Private,
    ]);
}

ast_node!(MemberList, MEMBER_LIST);

impl MemberList {
    children_method!(declarations, Declaration);
}

ast_node!(AccessSpec, ACCESS_SPEC);

impl AccessSpec {
    token_to_enum_method!(access, Access, [
        PUBLIC_KW => Public,
        PROTECTED_KW => Protected,
        PRIVATE_KW => Private,
    ]);
}

// ============================================================================
// Templates
// ============================================================================

ast_node!(TemplateDecl, TEMPLATE_DECL);

impl TemplateDecl {
    first_child_method!(param_list, TemplateParams);

    pub fn params(&self) -> Vec<TemplateParam> {
        self.param_list()
            .map(|list| list.params().collect())
            .unwrap_or_default()
    }

    /// The templated declaration (itself a template for member templates
    /// of class templates defined out of line).
    pub fn declaration(&self) -> Option<Declaration> {
        self.0.children().find_map(Declaration::cast)
    }
}

ast_node!(TemplateParams, TEMPLATE_PARAMS);

impl TemplateParams {
    children_method!(params, TemplateParam);
}

/// What a template parameter stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateParamKind {
    /// `typename T` / `class T`
    Type,
    /// `int N`, `size_t N`
    Value(Type),
    /// `template <typename> class C`
    Template,
}

ast_node!(TemplateParam, TEMPLATE_PARAM);

impl TemplateParam {
    first_child_method!(name, Name);
    first_child_method!(default, Initializer);
    has_token_method!(is_pack, ELLIPSIS, "typename... Ts");

    pub fn kind(&self) -> TemplateParamKind {
        if self.0.children().any(|n| n.kind() == SyntaxKind::TEMPLATE_PARAMS) {
            TemplateParamKind::Template
        } else if let Some(ty) = self.0.children().find_map(Type::cast) {
            TemplateParamKind::Value(ty)
        } else {
            TemplateParamKind::Type
        }
    }
}

ast_node!(TemplateArgs, TEMPLATE_ARGS);

impl TemplateArgs {
    children_method!(args, TemplateArg);
}

ast_node!(TemplateArg, TEMPLATE_ARG);

ast_node!(ExplicitInstantiation, EXPLICIT_INSTANTIATION);

impl ExplicitInstantiation {
    has_token_method!(is_extern, EXTERN_KW, "extern template class A<int>;");

    pub fn declaration(&self) -> Option<Declaration> {
        self.0.children().find_map(Declaration::cast)
    }
}

// ============================================================================
// Functions and variables
// ============================================================================

ast_node!(Function, FUNCTION);

impl Function {
    first_child_method!(name, Name);
    first_child_method!(param_list, ParamList);
    first_child_method!(template_args, TemplateArgs);
    first_child_method!(initializer, Initializer);
    first_child_method!(body, Body);
    first_child_method!(skipped, Skipped);
    child_after_keyword_method!(
        trailing_return,
        Type,
        ARROW,
        "The type after `->` in `auto f() -> int`."
    );

    has_token_method!(is_const, CONST_KW, "int get() const;");
    has_token_method!(is_static, STATIC_KW);
    has_token_method!(is_virtual, VIRTUAL_KW);
    has_token_method!(is_explicit, EXPLICIT_KW);
    has_token_method!(is_inline, INLINE_KW);
    has_token_method!(is_constexpr, CONSTEXPR_KW);

    /// The type written before the declarator. For constructor-like
    /// declarations without a NAME this is the class name.
    pub fn ty(&self) -> Option<Type> {
        self.0.children().find_map(Type::cast)
    }

    pub fn params(&self) -> Vec<Param> {
        self.param_list()
            .map(|list| list.params().collect())
            .unwrap_or_default()
    }

    /// `A(int)`: a type followed by a parameter list and no declarator name.
    pub fn is_constructor_like(&self) -> bool {
        self.name().is_none() && self.ty().is_some()
    }

    pub fn is_destructor(&self) -> bool {
        self.name().is_some_and(|n| n.is_destructor())
    }

    pub fn is_operator(&self) -> bool {
        self.name().is_some_and(|n| n.is_operator())
    }

    pub fn is_pure(&self) -> bool {
        self.initializer().is_some_and(|i| i.value() == "0")
    }

    pub fn is_deleted(&self) -> bool {
        self.initializer().is_some_and(|i| i.value() == "delete")
    }

    /// `A() = default;`
    pub fn is_defaulted(&self) -> bool {
        self.initializer().is_some_and(|i| i.value() == "default")
    }

    pub fn has_body(&self) -> bool {
        self.body().is_some()
    }

    /// Whether any parameter or the declarator could not be modelled.
    pub fn has_unparsed_parts(&self) -> bool {
        self.skipped().is_some() || self.params().iter().any(Param::is_unparsed)
    }
}

ast_node!(ParamList, PARAM_LIST);

impl ParamList {
    children_method!(params, Param);
}

ast_node!(Param, PARAM);

impl Param {
    first_child_method!(ty, Type);
    first_child_method!(name, Name);
    first_child_method!(default, Initializer);
    children_method!(array_suffixes, ArraySuffix);

    /// A C variadic `...` parameter.
    pub fn is_variadic(&self) -> bool {
        self.ty().is_none() && has_token(&self.0, SyntaxKind::ELLIPSIS)
    }

    /// `Ts... args`
    pub fn is_pack(&self) -> bool {
        self.ty().is_some() && has_token(&self.0, SyntaxKind::ELLIPSIS)
    }

    /// `void` as the only parameter of `f(void)`.
    pub fn is_void(&self) -> bool {
        self.name().is_none()
            && self.array_suffixes().next().is_none()
            && self.ty().is_some_and(|t| t.spelling() == "void")
    }

    pub fn is_unparsed(&self) -> bool {
        self.0.children().any(|n| n.kind() == SyntaxKind::SKIPPED)
    }
}

ast_node!(Field, FIELD);

impl Field {
    first_child_method!(ty, Type);
    first_child_method!(name, Name);
    first_child_method!(initializer, Initializer);
    children_method!(array_suffixes, ArraySuffix);
    children_method!(declarators, Declarator);

    has_token_method!(is_static, STATIC_KW);
    has_token_method!(is_mutable, MUTABLE_KW);
    has_token_method!(is_constexpr, CONSTEXPR_KW);
    has_token_method!(is_extern, EXTERN_KW);
    has_token_method!(is_bitfield, COLON, "unsigned flag : 1;");
}

ast_node!(Declarator, DECLARATOR);

impl Declarator {
    first_child_method!(name, Name);
    first_child_method!(initializer, Initializer);
    children_method!(array_suffixes, ArraySuffix);

    /// The `*`, `&` and `const` tokens written before the name.
    pub fn prefix(&self) -> String {
        spell_tokens(direct_tokens(&self.0).filter(|t| t.kind() != SyntaxKind::COMMA))
    }
}

ast_node!(ArraySuffix, ARRAY_SUFFIX);

impl ArraySuffix {
    /// The extent between the brackets, empty for `[]`.
    pub fn extent(&self) -> String {
        spell_tokens(direct_tokens(&self.0).filter(|t| {
            !matches!(t.kind(), SyntaxKind::L_BRACKET | SyntaxKind::R_BRACKET)
        }))
    }
}

ast_node!(Initializer, INITIALIZER);

impl Initializer {
    /// The initializer text without the leading `=`.
    pub fn value(&self) -> String {
        let mut tokens = self
            .0
            .descendants_with_tokens()
            .filter_map(|e| e.into_token())
            .filter(|t| !t.kind().is_trivia())
            .peekable();
        if tokens.peek().is_some_and(|t| t.kind() == SyntaxKind::EQ) {
            tokens.next();
        }
        spell_tokens(tokens)
    }

    /// `{...}` rather than `= ...`
    pub fn is_braced(&self) -> bool {
        direct_tokens(&self.0)
            .next()
            .is_some_and(|t| t.kind() == SyntaxKind::L_BRACE)
    }
}

ast_node!(Body, BODY);

// ============================================================================
// Aliases and opaque constructs
// ============================================================================

ast_node!(TypeAlias, TYPE_ALIAS);

impl TypeAlias {
    first_child_method!(name, Name);
    first_child_method!(ty, Type);

    /// Function types and other aliases not reducible to a [`Type`].
    pub fn is_complex(&self) -> bool {
        self.0.children().any(|n| n.kind() == SyntaxKind::SKIPPED)
    }
}

ast_node!(Typedef, TYPEDEF);

impl Typedef {
    first_child_method!(name, Name);
    first_child_method!(ty, Type);

    /// Whether anything other than `;` follows the name (`typedef int A[3];`).
    pub fn is_complex(&self) -> bool {
        let mut after_name = false;
        for child in self.0.children_with_tokens() {
            match child {
                NodeOrToken::Node(n) if n.kind() == SyntaxKind::NAME => after_name = true,
                NodeOrToken::Node(_) if after_name => return true,
                NodeOrToken::Token(t)
                    if after_name
                        && !t.kind().is_trivia()
                        && t.kind() != SyntaxKind::SEMICOLON =>
                {
                    return true;
                }
                _ => {}
            }
        }
        false
    }
}

ast_node!(UsingDecl, USING_DECL);

impl UsingDecl {
    has_token_method!(is_using_namespace, NAMESPACE_KW, "using namespace std;");
}

ast_node!(Skipped, SKIPPED);

impl Skipped {
    /// Short human description of what was skipped.
    pub fn describe(&self) -> String {
        let mut tokens = direct_tokens(&self.0);
        let first = tokens.next();
        let second = tokens.next();
        let name = |t: &Option<SyntaxToken>| {
            t.as_ref()
                .filter(|t| t.kind() == SyntaxKind::IDENT)
                .map(|t| format!(" `{}`", t.text()))
                .unwrap_or_default()
        };
        match first.as_ref().map(|t| t.kind()) {
            Some(SyntaxKind::ENUM_KW) => {
                let name = match second.as_ref().map(|t| t.kind()) {
                    Some(SyntaxKind::CLASS_KW | SyntaxKind::STRUCT_KW) => name(&tokens.next()),
                    _ => name(&second),
                };
                format!("enum{name}")
            }
            Some(SyntaxKind::FRIEND_KW) => "friend declaration".to_string(),
            Some(SyntaxKind::STATIC_ASSERT_KW) => "static_assert".to_string(),
            Some(SyntaxKind::TEMPLATE_KW) => "template alias".to_string(),
            Some(SyntaxKind::NAMESPACE_KW) => format!("namespace alias{}", name(&second)),
            Some(SyntaxKind::TYPEDEF_KW) => "typedef".to_string(),
            _ => {
                let text = self.spelling();
                let short: String = text.chars().take(40).collect();
                if short.len() < text.len() {
                    format!("declaration `{short}...`")
                } else {
                    format!("declaration `{short}`")
                }
            }
        }
    }
}

// ============================================================================
// Names and types
// ============================================================================

ast_node!(Name, NAME);

impl Name {
    pub fn text(&self) -> String {
        self.spelling()
    }

    pub fn is_destructor(&self) -> bool {
        has_token(&self.0, SyntaxKind::TILDE)
    }

    pub fn is_operator(&self) -> bool {
        has_token(&self.0, SyntaxKind::OPERATOR_KW)
    }

    /// Whether the name carries a `::` qualifier (`A::method`).
    pub fn is_qualified(&self) -> bool {
        has_token(&self.0, SyntaxKind::COLON_COLON)
    }

    /// The last identifier of the name.
    pub fn simple(&self) -> String {
        direct_tokens(&self.0)
            .filter(|t| t.kind() == SyntaxKind::IDENT)
            .last()
            .map(|t| t.text().to_string())
            .unwrap_or_default()
    }
}

ast_node!(Type, TYPE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;
    use crate::frontend::preprocess::{FileId, Origin, PpToken};

    fn source_file(text: &str) -> SourceFile {
        let tokens: Vec<PpToken> = tokenize(text)
            .into_iter()
            .map(|t| PpToken {
                kind: t.kind,
                text: t.text.into(),
                origin: Origin {
                    file: FileId(0),
                    offset: t.offset,
                },
            })
            .collect();
        let parse = parse(&tokens);
        assert!(parse.ok(), "{:?}", parse.errors);
        SourceFile::cast(parse.syntax()).unwrap()
    }

    fn only_class(file: &SourceFile) -> Class {
        match file.declarations().next() {
            Some(Declaration::Class(class)) => class,
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_class_accessors() {
        let file = source_file(
            "struct Derived : public Base, private virtual Other {\n\
             public:\n  Derived(int a, double b = 1.0);\n  int get() const;\n  static int count;\n};",
        );
        let class = only_class(&file);
        assert_eq!(class.class_key(), Some(ClassKey::Struct));
        assert_eq!(class.name().unwrap().text(), "Derived");
        assert!(class.is_definition());

        let bases = class.bases();
        assert_eq!(bases.len(), 2);
        assert_eq!(bases[0].access(), Some(Access::Public));
        assert_eq!(bases[1].access(), Some(Access::Private));
        assert!(bases[1].is_virtual());
        assert_eq!(bases[1].ty().unwrap().spelling(), "Other");

        let members = class.members();
        assert!(matches!(members[0], Declaration::AccessSpec(_)));
        let Declaration::Function(ctor) = &members[1] else {
            panic!("expected constructor");
        };
        assert!(ctor.is_constructor_like());
        let params = ctor.params();
        assert_eq!(params[1].name().unwrap().text(), "b");
        assert_eq!(params[1].default().unwrap().value(), "1.0");

        let Declaration::Function(get) = &members[2] else {
            panic!("expected method");
        };
        assert!(get.is_const());
        assert_eq!(get.ty().unwrap().spelling(), "int");

        let Declaration::Field(count) = &members[3] else {
            panic!("expected field");
        };
        assert!(count.is_static());
    }

    #[test]
    fn test_spelling_normalizes_whitespace() {
        let file = source_file("const std :: array< float,3 >& data(  unsigned   long n );");
        let Some(Declaration::Function(f)) = file.declarations().next() else {
            panic!("expected function");
        };
        assert_eq!(f.ty().unwrap().spelling(), "const std::array<float, 3>&");
        assert_eq!(f.params()[0].ty().unwrap().spelling(), "unsigned long");
    }

    #[test]
    fn test_template_params() {
        let file = source_file(
            "template <typename T, int N = 3, typename... Ts, template <typename> class C>\n\
             class Sum {};",
        );
        let Some(Declaration::TemplateDecl(decl)) = file.declarations().next() else {
            panic!("expected template");
        };
        let params = decl.params();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].kind(), TemplateParamKind::Type);
        assert!(matches!(params[1].kind(), TemplateParamKind::Value(_)));
        assert_eq!(params[1].default().unwrap().value(), "3");
        assert!(params[2].is_pack());
        assert_eq!(params[3].kind(), TemplateParamKind::Template);
        assert!(matches!(decl.declaration(), Some(Declaration::Class(_))));
    }

    #[test]
    fn test_function_qualifiers() {
        let file = source_file(
            "class A {\n  virtual void f() = 0;\n  A(const A&) = delete;\n  ~A();\n  bool operator==(const A&) const;\n};",
        );
        let class = only_class(&file);
        let functions: Vec<Function> = class
            .members()
            .into_iter()
            .filter_map(|d| match d {
                Declaration::Function(f) => Some(f),
                _ => None,
            })
            .collect();
        assert!(functions[0].is_pure());
        assert!(functions[0].is_virtual());
        assert!(functions[1].is_deleted());
        assert!(functions[2].is_destructor());
        assert!(functions[3].is_operator());
        assert_eq!(functions[3].name().unwrap().text(), "operator==");
    }

    #[test]
    fn test_leading_comments_stop_at_blank_line() {
        let file = source_file(
            "// unrelated\n\n// pxx :: export\n/* note */\n// pxx :: hide\nclass A {};",
        );
        let class = only_class(&file);
        assert_eq!(
            class.leading_comments(),
            vec!["// pxx :: export".to_string(), "// pxx :: hide".to_string()]
        );
    }

    #[test]
    fn test_skipped_descriptions() {
        let file = source_file("enum class Color { Red };\nstatic_assert(true, \"\");");
        let descriptions: Vec<String> = file
            .declarations()
            .filter_map(|d| match d {
                Declaration::Skipped(s) => Some(s.describe()),
                _ => None,
            })
            .collect();
        assert_eq!(descriptions, vec!["enum `Color`", "static_assert"]);
    }
}
