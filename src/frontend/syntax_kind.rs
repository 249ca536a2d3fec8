//! Syntax kinds for the Rowan-based C++ declaration CST
//!
//! This enum defines all node and token kinds in the syntax tree. Only the
//! declaration-level structure needed for binding generation is modelled;
//! function bodies and initializers are kept as opaque token runs.

/// All syntax kinds (tokens and nodes) of the C++ declaration tree
///
/// Tokens are leaf nodes (identifiers, keywords, punctuation).
/// Nodes are composite (namespaces, classes, functions, templates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum SyntaxKind {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    WHITESPACE = 0,
    LINE_COMMENT,
    BLOCK_COMMENT,
    /// A whole preprocessor line (`#include ...`); consumed by the preprocessor
    DIRECTIVE,

    // =========================================================================
    // LITERALS
    // =========================================================================
    IDENT,
    INT_NUMBER,
    FLOAT_NUMBER,
    STRING,
    CHAR,

    // =========================================================================
    // PUNCTUATION
    // =========================================================================
    L_BRACE,       // {
    R_BRACE,       // }
    L_PAREN,       // (
    R_PAREN,       // )
    L_BRACKET,     // [
    R_BRACKET,     // ]
    L_ANGLE,       // <
    R_ANGLE,       // >
    SEMICOLON,     // ;
    COLON,         // :
    COLON_COLON,   // ::
    COMMA,         // ,
    EQ,            // =
    STAR,          // *
    AMP,           // &
    AMP_AMP,       // &&
    TILDE,         // ~
    DOT,           // .
    ARROW,         // ->
    ELLIPSIS,      // ...
    PLUS,          // +
    MINUS,         // -
    SLASH,         // /
    PERCENT,       // %
    BANG,          // !
    QUESTION,      // ?
    PIPE,          // |
    CARET,         // ^
    HASH,          // #

    // =========================================================================
    // KEYWORDS
    // =========================================================================
    CLASS_KW,
    STRUCT_KW,
    UNION_KW,
    ENUM_KW,
    NAMESPACE_KW,
    TEMPLATE_KW,
    TYPENAME_KW,
    PUBLIC_KW,
    PROTECTED_KW,
    PRIVATE_KW,
    VIRTUAL_KW,
    STATIC_KW,
    CONST_KW,
    CONSTEXPR_KW,
    VOLATILE_KW,
    INLINE_KW,
    EXPLICIT_KW,
    EXTERN_KW,
    FRIEND_KW,
    MUTABLE_KW,
    USING_KW,
    TYPEDEF_KW,
    OPERATOR_KW,
    NOEXCEPT_KW,
    STATIC_ASSERT_KW,

    // =========================================================================
    // NODES
    // =========================================================================
    SOURCE_FILE,
    NAMESPACE,
    DECL_LIST,
    LINKAGE_SPEC,
    CLASS,
    BASE_LIST,
    BASE_SPEC,
    MEMBER_LIST,
    ACCESS_SPEC,
    TEMPLATE_DECL,
    TEMPLATE_PARAMS,
    TEMPLATE_PARAM,
    TEMPLATE_ARGS,
    TEMPLATE_ARG,
    EXPLICIT_INSTANTIATION,
    FUNCTION,
    PARAM_LIST,
    PARAM,
    FIELD,
    DECLARATOR,
    ARRAY_SUFFIX,
    TYPE,
    NAME,
    BODY,
    CTOR_INIT,
    INITIALIZER,
    TYPE_ALIAS,
    TYPEDEF,
    USING_DECL,
    /// A recognised but unsupported construct (enum, friend, static_assert, ...)
    SKIPPED,

    // Special
    ERROR,

    #[doc(hidden)]
    __LAST,
}

impl SyntaxKind {
    /// Check if this is a trivia token (whitespace or comment)
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::WHITESPACE | Self::LINE_COMMENT | Self::BLOCK_COMMENT | Self::DIRECTIVE
        )
    }

    /// Check if this is a keyword
    pub fn is_keyword(self) -> bool {
        (self as u16) >= (Self::CLASS_KW as u16) && (self as u16) <= (Self::STATIC_ASSERT_KW as u16)
    }

    /// Check if this is a punctuation token
    pub fn is_punct(self) -> bool {
        (self as u16) >= (Self::L_BRACE as u16) && (self as u16) <= (Self::HASH as u16)
    }

    /// Check if this is a literal
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Self::IDENT | Self::INT_NUMBER | Self::FLOAT_NUMBER | Self::STRING | Self::CHAR
        )
    }

    /// Whether this token can start or continue a name in a type
    pub fn is_word(self) -> bool {
        self == Self::IDENT || self.is_keyword()
    }

    /// `class`, `struct` or `union`
    pub fn is_class_key(self) -> bool {
        matches!(self, Self::CLASS_KW | Self::STRUCT_KW | Self::UNION_KW)
    }

    /// Access specifier keywords
    pub fn is_access(self) -> bool {
        matches!(self, Self::PUBLIC_KW | Self::PROTECTED_KW | Self::PRIVATE_KW)
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

impl From<rowan::SyntaxKind> for SyntaxKind {
    fn from(raw: rowan::SyntaxKind) -> Self {
        assert!(raw.0 < SyntaxKind::__LAST as u16);
        // Safety: we control all syntax kinds and check bounds above
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }
}

/// Language definition for Rowan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CxxLanguage {}

impl rowan::Language for CxxLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        raw.into()
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

/// Type aliases for convenience
pub type SyntaxNode = rowan::SyntaxNode<CxxLanguage>;
pub type SyntaxToken = rowan::SyntaxToken<CxxLanguage>;
pub type SyntaxElement = rowan::SyntaxElement<CxxLanguage>;
