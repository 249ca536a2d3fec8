//! Logos-based lexer for C++ declarations
//!
//! Fast tokenization using the logos crate. Preprocessor lines are lexed as a
//! single `DIRECTIVE` token (including backslash continuations) and handed to
//! the preprocessor.

use super::syntax_kind::SyntaxKind;
use logos::Logos;
use text_size::TextSize;

/// A token with its kind, text, and position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: SyntaxKind,
    pub text: &'a str,
    pub offset: TextSize,
}

/// Lexer wrapping the logos-generated tokenizer
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, LogosToken>,
    offset: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: LogosToken::lexer(input),
            offset: 0,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let logos_token = self.inner.next()?;
        let text = self.inner.slice();
        let offset = TextSize::new(self.offset);
        self.offset += text.len() as u32;

        let kind = match logos_token {
            Ok(t) => t.into(),
            Err(()) => SyntaxKind::ERROR,
        };

        Some(Token { kind, text, offset })
    }
}

/// Tokenize an entire string into a Vec
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// Consume a block comment through its closing `*/`. Unterminated comments
/// run to the end of input and lex as an error.
fn block_comment(lex: &mut logos::Lexer<'_, LogosToken>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

/// Logos token enum - maps to SyntaxKind
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
pub enum LogosToken {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment,

    #[regex(r"#([^\n\\]|\\\r?\n|\\[^\n])*")]
    Directive,

    // =========================================================================
    // LITERALS
    // =========================================================================
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[regex(r"[0-9][0-9']*[uUlLzZ]*")]
    #[regex(r"0[xX][0-9a-fA-F']+[uUlLzZ]*")]
    Integer,

    #[regex(r"[0-9][0-9']*\.[0-9']*([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"\.[0-9][0-9']*([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"[0-9][0-9']*[eE][+-]?[0-9]+[fFlL]?")]
    Float,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,

    #[regex(r"'([^'\\\n]|\\.)+'")]
    Char,

    // =========================================================================
    // MULTI-CHARACTER PUNCTUATION (must come before single-char)
    // =========================================================================
    #[token("::")]
    ColonColon,
    #[token("&&")]
    AmpAmp,
    #[token("->")]
    Arrow,
    #[token("...")]
    Ellipsis,

    // =========================================================================
    // SINGLE-CHARACTER PUNCTUATION
    // =========================================================================
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("=")]
    Eq,
    #[token("*")]
    Star,
    #[token("&")]
    Amp,
    #[token("~")]
    Tilde,
    #[token(".")]
    Dot,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,

    // =========================================================================
    // KEYWORDS
    // =========================================================================
    #[token("class")]
    ClassKw,
    #[token("struct")]
    StructKw,
    #[token("union")]
    UnionKw,
    #[token("enum")]
    EnumKw,
    #[token("namespace")]
    NamespaceKw,
    #[token("template")]
    TemplateKw,
    #[token("typename")]
    TypenameKw,
    #[token("public")]
    PublicKw,
    #[token("protected")]
    ProtectedKw,
    #[token("private")]
    PrivateKw,
    #[token("virtual")]
    VirtualKw,
    #[token("static")]
    StaticKw,
    #[token("const")]
    ConstKw,
    #[token("constexpr")]
    ConstexprKw,
    #[token("volatile")]
    VolatileKw,
    #[token("inline")]
    InlineKw,
    #[token("explicit")]
    ExplicitKw,
    #[token("extern")]
    ExternKw,
    #[token("friend")]
    FriendKw,
    #[token("mutable")]
    MutableKw,
    #[token("using")]
    UsingKw,
    #[token("typedef")]
    TypedefKw,
    #[token("operator")]
    OperatorKw,
    #[token("noexcept")]
    NoexceptKw,
    #[token("static_assert")]
    StaticAssertKw,
}

impl From<LogosToken> for SyntaxKind {
    fn from(token: LogosToken) -> Self {
        use LogosToken::*;
        match token {
            Whitespace => SyntaxKind::WHITESPACE,
            LineComment => SyntaxKind::LINE_COMMENT,
            BlockComment => SyntaxKind::BLOCK_COMMENT,
            Directive => SyntaxKind::DIRECTIVE,
            Ident => SyntaxKind::IDENT,
            Integer => SyntaxKind::INT_NUMBER,
            Float => SyntaxKind::FLOAT_NUMBER,
            String => SyntaxKind::STRING,
            Char => SyntaxKind::CHAR,
            ColonColon => SyntaxKind::COLON_COLON,
            AmpAmp => SyntaxKind::AMP_AMP,
            Arrow => SyntaxKind::ARROW,
            Ellipsis => SyntaxKind::ELLIPSIS,
            LBrace => SyntaxKind::L_BRACE,
            RBrace => SyntaxKind::R_BRACE,
            LParen => SyntaxKind::L_PAREN,
            RParen => SyntaxKind::R_PAREN,
            LBracket => SyntaxKind::L_BRACKET,
            RBracket => SyntaxKind::R_BRACKET,
            Lt => SyntaxKind::L_ANGLE,
            Gt => SyntaxKind::R_ANGLE,
            Semicolon => SyntaxKind::SEMICOLON,
            Colon => SyntaxKind::COLON,
            Comma => SyntaxKind::COMMA,
            Eq => SyntaxKind::EQ,
            Star => SyntaxKind::STAR,
            Amp => SyntaxKind::AMP,
            Tilde => SyntaxKind::TILDE,
            Dot => SyntaxKind::DOT,
            Plus => SyntaxKind::PLUS,
            Minus => SyntaxKind::MINUS,
            Slash => SyntaxKind::SLASH,
            Percent => SyntaxKind::PERCENT,
            Bang => SyntaxKind::BANG,
            Question => SyntaxKind::QUESTION,
            Pipe => SyntaxKind::PIPE,
            Caret => SyntaxKind::CARET,
            ClassKw => SyntaxKind::CLASS_KW,
            StructKw => SyntaxKind::STRUCT_KW,
            UnionKw => SyntaxKind::UNION_KW,
            EnumKw => SyntaxKind::ENUM_KW,
            NamespaceKw => SyntaxKind::NAMESPACE_KW,
            TemplateKw => SyntaxKind::TEMPLATE_KW,
            TypenameKw => SyntaxKind::TYPENAME_KW,
            PublicKw => SyntaxKind::PUBLIC_KW,
            ProtectedKw => SyntaxKind::PROTECTED_KW,
            PrivateKw => SyntaxKind::PRIVATE_KW,
            VirtualKw => SyntaxKind::VIRTUAL_KW,
            StaticKw => SyntaxKind::STATIC_KW,
            ConstKw => SyntaxKind::CONST_KW,
            ConstexprKw => SyntaxKind::CONSTEXPR_KW,
            VolatileKw => SyntaxKind::VOLATILE_KW,
            InlineKw => SyntaxKind::INLINE_KW,
            ExplicitKw => SyntaxKind::EXPLICIT_KW,
            ExternKw => SyntaxKind::EXTERN_KW,
            FriendKw => SyntaxKind::FRIEND_KW,
            MutableKw => SyntaxKind::MUTABLE_KW,
            UsingKw => SyntaxKind::USING_KW,
            TypedefKw => SyntaxKind::TYPEDEF_KW,
            OperatorKw => SyntaxKind::OPERATOR_KW,
            NoexceptKw => SyntaxKind::NOEXCEPT_KW,
            StaticAssertKw => SyntaxKind::STATIC_ASSERT_KW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<SyntaxKind> {
        tokenize(input)
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !k.is_trivia())
            .collect()
    }

    #[test]
    fn test_lex_class() {
        let tokens: Vec<_> = Lexer::new("class A {};").collect();
        assert_eq!(tokens.len(), 7); // class, ws, A, ws, {, }, ;
        assert_eq!(tokens[0].kind, SyntaxKind::CLASS_KW);
        assert_eq!(tokens[1].kind, SyntaxKind::WHITESPACE);
        assert_eq!(tokens[2].kind, SyntaxKind::IDENT);
        assert_eq!(tokens[6].kind, SyntaxKind::SEMICOLON);
        assert_eq!(tokens[2].offset, TextSize::new(6));
    }

    #[test]
    fn test_lex_qualified_template_type() {
        assert_eq!(
            kinds("std::array<float, 3>"),
            vec![
                SyntaxKind::IDENT,
                SyntaxKind::COLON_COLON,
                SyntaxKind::IDENT,
                SyntaxKind::L_ANGLE,
                SyntaxKind::IDENT,
                SyntaxKind::COMMA,
                SyntaxKind::INT_NUMBER,
                SyntaxKind::R_ANGLE,
            ]
        );
    }

    #[test]
    fn test_lex_nested_template_closers_are_separate() {
        let k = kinds("std::vector<std::vector<int>>");
        assert_eq!(k[k.len() - 1], SyntaxKind::R_ANGLE);
        assert_eq!(k[k.len() - 2], SyntaxKind::R_ANGLE);
    }

    #[test]
    fn test_lex_directive_line_with_continuation() {
        let tokens = tokenize("#define X \\\n  1\nint");
        assert_eq!(tokens[0].kind, SyntaxKind::DIRECTIVE);
        assert_eq!(tokens[0].text, "#define X \\\n  1");
        assert_eq!(tokens[2].kind, SyntaxKind::IDENT);
    }

    #[test]
    fn test_lex_comment_and_keywords() {
        let tokens = tokenize("// pxx :: export\ntemplate<typename T>");
        assert_eq!(tokens[0].kind, SyntaxKind::LINE_COMMENT);
        assert_eq!(tokens[0].text, "// pxx :: export");
        assert_eq!(tokens[2].kind, SyntaxKind::TEMPLATE_KW);
        assert_eq!(tokens[4].kind, SyntaxKind::TYPENAME_KW);
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(kinds("42u"), vec![SyntaxKind::INT_NUMBER]);
        assert_eq!(kinds("0x1F"), vec![SyntaxKind::INT_NUMBER]);
        assert_eq!(kinds("1.5f"), vec![SyntaxKind::FLOAT_NUMBER]);
        assert_eq!(kinds("1e-3"), vec![SyntaxKind::FLOAT_NUMBER]);
    }

    #[test]
    fn test_lex_block_comment_with_stars() {
        let tokens = tokenize("/** doc **/x");
        assert_eq!(tokens[0].kind, SyntaxKind::BLOCK_COMMENT);
        assert_eq!(tokens[0].text, "/** doc **/");
        assert_eq!(tokens[1].kind, SyntaxKind::IDENT);
    }

    #[test]
    fn test_lex_block_comments() {
        let tokens = tokenize("/* note */");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, SyntaxKind::BLOCK_COMMENT);

        assert_eq!(
            kinds("int f(int /*a*/);"),
            vec![
                SyntaxKind::IDENT,
                SyntaxKind::IDENT,
                SyntaxKind::L_PAREN,
                SyntaxKind::IDENT,
                SyntaxKind::R_PAREN,
                SyntaxKind::SEMICOLON,
            ]
        );
        assert_eq!(kinds("/* a * b / c */x"), vec![SyntaxKind::IDENT]);
    }

    #[test]
    fn test_lex_unterminated_block_comment() {
        let tokens = tokenize("x /* open");
        assert_eq!(tokens.last().unwrap().kind, SyntaxKind::ERROR);
        assert_eq!(tokens.last().unwrap().text, "/* open");
    }
}
