//! Recursive descent parser for C++ declarations
//!
//! Builds a rowan GreenNode tree from the preprocessed token stream.
//! Supports error recovery and produces a lossless CST: function bodies,
//! initializers and constructs that binding generation does not need are
//! kept as opaque, balanced token runs.

use super::preprocess::{Origin, PpToken};
use super::syntax_kind::{SyntaxKind, SyntaxNode};
use rowan::{Checkpoint, GreenNode, GreenNodeBuilder};
use text_size::TextSize;

/// Parse result containing the green tree and any errors
#[derive(Debug, Clone)]
pub struct Parse {
    pub green: GreenNode,
    pub origins: OriginMap,
    pub errors: Vec<SyntaxError>,
}

impl Parse {
    /// Get the root syntax node
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// Check if parsing succeeded without errors
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A syntax error with the origin of the offending token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub origin: Option<Origin>,
}

/// Maps offsets in the tree text back to where each token was read from.
#[derive(Debug, Clone, Default)]
pub struct OriginMap {
    starts: Vec<TextSize>,
    origins: Vec<Origin>,
}

impl OriginMap {
    fn push(&mut self, start: TextSize, origin: Origin) {
        self.starts.push(start);
        self.origins.push(origin);
    }

    /// Origin of the token covering `offset`.
    pub fn lookup(&self, offset: TextSize) -> Option<Origin> {
        let idx = self.starts.partition_point(|start| *start <= offset);
        idx.checked_sub(1).and_then(|i| self.origins.get(i)).copied()
    }
}

/// Parse a preprocessed token stream into a CST
pub fn parse(tokens: &[PpToken]) -> Parse {
    let mut parser = Parser::new(tokens);
    parser.parse_source_file();
    parser.finish()
}

/// Words that combine into fundamental types (`unsigned long long int`).
const FUNDAMENTAL_WORDS: &[&str] = &[
    "void", "bool", "char", "wchar_t", "char8_t", "char16_t", "char32_t", "short", "int", "long",
    "signed", "unsigned", "float", "double", "auto",
];

const SPECIFIER_WORDS: &[&str] = &["consteval", "constinit", "thread_local"];

/// The parser state
struct Parser<'t> {
    tokens: &'t [PpToken],
    pos: usize,
    offset: TextSize,
    last_kind: SyntaxKind,
    builder: GreenNodeBuilder<'static>,
    origins: OriginMap,
    errors: Vec<SyntaxError>,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [PpToken]) -> Self {
        Self {
            tokens,
            pos: 0,
            offset: TextSize::new(0),
            last_kind: SyntaxKind::WHITESPACE,
            builder: GreenNodeBuilder::new(),
            origins: OriginMap::default(),
            errors: Vec::new(),
        }
    }

    fn finish(self) -> Parse {
        Parse {
            green: self.builder.finish(),
            origins: self.origins,
            errors: self.errors,
        }
    }

    // =========================================================================
    // Token inspection (always skips trivia)
    // =========================================================================

    fn lookahead(&self) -> impl Iterator<Item = &'t PpToken> {
        let tokens: &'t [PpToken] = self.tokens;
        tokens[self.pos..].iter().filter(|t| !t.kind.is_trivia())
    }

    fn nth_token(&self, n: usize) -> Option<&'t PpToken> {
        self.lookahead().nth(n)
    }

    fn nth(&self, n: usize) -> SyntaxKind {
        self.nth_token(n).map(|t| t.kind).unwrap_or(SyntaxKind::ERROR)
    }

    fn current(&self) -> SyntaxKind {
        self.nth(0)
    }

    fn current_text(&self) -> &'t str {
        self.nth_token(0).map(|t| t.text.as_str()).unwrap_or("")
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.current() == kind
    }

    fn at_any(&self, kinds: &[SyntaxKind]) -> bool {
        kinds.contains(&self.current())
    }

    fn at_word(&self, words: &[&str]) -> bool {
        self.at(SyntaxKind::IDENT) && words.contains(&self.current_text())
    }

    fn at_eof(&self) -> bool {
        self.nth_token(0).is_none()
    }

    // =========================================================================
    // Token consumption
    // =========================================================================

    fn push_token(&mut self) {
        let tokens: &'t [PpToken] = self.tokens;
        let token = &tokens[self.pos];
        self.origins.push(self.offset, token.origin);
        self.builder.token(token.kind.into(), token.text.as_str());
        self.offset += TextSize::of(token.text.as_str());
        if !token.kind.is_trivia() {
            self.last_kind = token.kind;
        }
        self.pos += 1;
    }

    fn skip_trivia(&mut self) {
        while self.pos < self.tokens.len() && self.tokens[self.pos].kind.is_trivia() {
            self.push_token();
        }
    }

    fn bump(&mut self) {
        self.skip_trivia();
        if self.pos < self.tokens.len() {
            self.push_token();
        }
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: SyntaxKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(format!("expected {}", what));
            false
        }
    }

    /// Bump a bracketed group (`(...)`, `[...]` or `{...}`) including its
    /// closer. Angle brackets are not tracked.
    fn bump_group(&mut self) {
        let mut stack = Vec::new();
        loop {
            let kind = self.current();
            match kind {
                SyntaxKind::L_PAREN | SyntaxKind::L_BRACKET | SyntaxKind::L_BRACE => {
                    stack.push(closer(kind));
                }
                SyntaxKind::R_PAREN | SyntaxKind::R_BRACKET | SyntaxKind::R_BRACE => {
                    if stack.last() == Some(&kind) {
                        stack.pop();
                    } else {
                        self.error("mismatched closing bracket");
                        return;
                    }
                }
                _ if self.at_eof() => {
                    self.error("unexpected end of file inside a bracketed group");
                    return;
                }
                _ => {}
            }
            self.bump();
            if stack.is_empty() {
                return;
            }
        }
    }

    /// Bump an angle-bracket group starting at `<`, including the closer.
    fn bump_angle_group(&mut self) {
        self.bump();
        self.bump_balanced_until(&[SyntaxKind::R_ANGLE], true);
        self.expect(SyntaxKind::R_ANGLE, "`>`");
    }

    /// Bump tokens until one of `stops` appears at nesting depth zero. The
    /// stop token is not consumed. Also stops, without consuming, at a `;`
    /// outside any bracket, at a closing bracket that has no opener and at
    /// end of file.
    ///
    /// With `angles`, a `<` directly after a name opens a template argument
    /// list; unclosed angles are dropped when a `;` or brace is reached.
    fn bump_balanced_until(&mut self, stops: &[SyntaxKind], angles: bool) {
        let mut stack: Vec<SyntaxKind> = Vec::new();
        while !self.at_eof() {
            let kind = self.current();
            if stack.is_empty() && stops.contains(&kind) {
                return;
            }
            match kind {
                SyntaxKind::L_PAREN | SyntaxKind::L_BRACKET | SyntaxKind::L_BRACE => {
                    if kind == SyntaxKind::L_BRACE {
                        drop_angles(&mut stack);
                    }
                    stack.push(closer(kind));
                }
                SyntaxKind::L_ANGLE
                    if angles
                        && matches!(self.last_kind, SyntaxKind::IDENT | SyntaxKind::R_ANGLE) =>
                {
                    stack.push(SyntaxKind::R_ANGLE);
                }
                SyntaxKind::R_ANGLE if stack.last() == Some(&SyntaxKind::R_ANGLE) => {
                    stack.pop();
                }
                SyntaxKind::R_PAREN | SyntaxKind::R_BRACKET | SyntaxKind::R_BRACE => {
                    drop_angles(&mut stack);
                    if stack.last() == Some(&kind) {
                        stack.pop();
                    } else {
                        return;
                    }
                }
                SyntaxKind::SEMICOLON => {
                    drop_angles(&mut stack);
                    if stack.is_empty() {
                        return;
                    }
                }
                _ => {}
            }
            self.bump();
        }
    }

    // =========================================================================
    // Error handling
    // =========================================================================

    fn error(&mut self, message: impl Into<String>) {
        let origin = self
            .nth_token(0)
            .or_else(|| self.tokens.last())
            .map(|t| t.origin);
        self.errors.push(SyntaxError {
            message: message.into(),
            origin,
        });
    }

    fn error_recover(&mut self, message: impl Into<String>) {
        self.error(message);
        self.start_node(SyntaxKind::ERROR);
        let start = self.pos;
        self.bump_balanced_until(&[SyntaxKind::SEMICOLON, SyntaxKind::R_BRACE], false);
        self.eat(SyntaxKind::SEMICOLON);
        // Always consume at least one token to make progress
        if self.pos == start {
            self.bump();
        }
        self.finish_node();
    }

    // =========================================================================
    // Node building helpers
    // =========================================================================

    fn start_node(&mut self, kind: SyntaxKind) {
        self.skip_trivia();
        self.builder.start_node(kind.into());
    }

    /// Open a node before any pending trivia, so comments that follow
    /// become its children.
    fn start_node_keeping_trivia(&mut self, kind: SyntaxKind) {
        self.builder.start_node(kind.into());
    }

    fn start_node_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) {
        self.builder.start_node_at(checkpoint, kind.into());
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.skip_trivia();
        self.builder.checkpoint()
    }

    fn finish_node(&mut self) {
        self.builder.finish_node();
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_source_file(&mut self) {
        // The root owns leading trivia
        self.builder.start_node(SyntaxKind::SOURCE_FILE.into());
        self.parse_declarations(false);
        self.skip_trivia();
        self.finish_node();
    }

    fn parse_declarations(&mut self, in_braces: bool) {
        loop {
            if self.at_eof() {
                if in_braces {
                    self.error("expected `}`");
                }
                return;
            }
            if self.at(SyntaxKind::R_BRACE) {
                if in_braces {
                    return;
                }
                self.error_recover("unmatched `}`");
                continue;
            }
            let start = self.pos;
            self.parse_declaration();
            if self.pos == start {
                self.error_recover("expected declaration");
            }
        }
    }

    fn parse_declaration(&mut self) {
        match self.current() {
            SyntaxKind::SEMICOLON => self.bump(),
            SyntaxKind::NAMESPACE_KW => self.parse_namespace(),
            SyntaxKind::INLINE_KW if self.nth(1) == SyntaxKind::NAMESPACE_KW => {
                self.parse_namespace()
            }
            SyntaxKind::EXTERN_KW if self.nth(1) == SyntaxKind::STRING => {
                self.parse_linkage_spec()
            }
            SyntaxKind::EXTERN_KW if self.nth(1) == SyntaxKind::TEMPLATE_KW => {
                self.parse_explicit_instantiation()
            }
            SyntaxKind::TEMPLATE_KW if self.nth(1) == SyntaxKind::L_ANGLE => {
                if self.template_alias_ahead() {
                    self.skip_statement();
                } else {
                    self.parse_template_decl();
                }
            }
            SyntaxKind::TEMPLATE_KW => self.parse_explicit_instantiation(),
            kind if kind.is_class_key() && self.class_head_ahead() => self.parse_class(),
            SyntaxKind::ENUM_KW => self.skip_statement(),
            SyntaxKind::FRIEND_KW | SyntaxKind::STATIC_ASSERT_KW => self.skip_declaration(),
            SyntaxKind::USING_KW => self.parse_using(),
            SyntaxKind::TYPEDEF_KW => self.parse_typedef(),
            SyntaxKind::L_BRACKET if self.nth(1) == SyntaxKind::L_BRACKET => self.parse_member(),
            SyntaxKind::L_BRACKET | SyntaxKind::R_BRACKET | SyntaxKind::R_PAREN => {
                self.error_recover("expected declaration")
            }
            _ => self.parse_member(),
        }
    }

    /// Whether a class-key starts a class head (definition, forward
    /// declaration or explicit instantiation) rather than an elaborated type
    /// in some other declaration.
    fn class_head_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut last = SyntaxKind::CLASS_KW;
        for token in self.lookahead().skip(1) {
            match token.kind {
                SyntaxKind::L_ANGLE | SyntaxKind::L_PAREN | SyntaxKind::L_BRACKET => depth += 1,
                SyntaxKind::R_ANGLE | SyntaxKind::R_PAREN | SyntaxKind::R_BRACKET if depth > 0 => {
                    depth -= 1
                }
                SyntaxKind::SEMICOLON | SyntaxKind::L_BRACE | SyntaxKind::R_BRACE if depth > 0 => {
                    return false;
                }
                _ if depth > 0 => {}
                // `struct stat buf;` declares a variable
                SyntaxKind::IDENT if last == SyntaxKind::IDENT && token.text != "final" => {
                    return false;
                }
                SyntaxKind::IDENT | SyntaxKind::COLON_COLON => {}
                SyntaxKind::L_BRACE | SyntaxKind::COLON | SyntaxKind::SEMICOLON => return true,
                _ => return false,
            }
            last = token.kind;
        }
        false
    }

    /// `template<...> using X = ...;`
    fn template_alias_ahead(&self) -> bool {
        let mut depth = 0usize;
        for token in self.lookahead().skip(1) {
            match token.kind {
                SyntaxKind::L_ANGLE => depth += 1,
                SyntaxKind::R_ANGLE => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        continue;
                    }
                }
                SyntaxKind::SEMICOLON | SyntaxKind::L_BRACE => return false,
                kind if depth == 0 => return kind == SyntaxKind::USING_KW,
                _ => {}
            }
        }
        false
    }

    fn parse_namespace(&mut self) {
        // namespace alias: `namespace fs = std::filesystem;`
        let alias_offset = if self.at(SyntaxKind::INLINE_KW) { 3 } else { 2 };
        if self.nth(alias_offset) == SyntaxKind::EQ {
            self.skip_statement();
            return;
        }
        self.start_node(SyntaxKind::NAMESPACE);
        self.eat(SyntaxKind::INLINE_KW);
        self.bump();
        if self.at(SyntaxKind::IDENT) {
            self.start_node(SyntaxKind::NAME);
            self.bump();
            while self.eat(SyntaxKind::COLON_COLON) {
                self.eat(SyntaxKind::INLINE_KW);
                self.expect(SyntaxKind::IDENT, "namespace name");
            }
            self.finish_node();
        }
        if self.eat(SyntaxKind::L_BRACE) {
            self.start_node_keeping_trivia(SyntaxKind::DECL_LIST);
            self.parse_declarations(true);
            self.finish_node();
            self.expect(SyntaxKind::R_BRACE, "`}` to close namespace");
        } else {
            self.error("expected `{` after namespace name");
        }
        self.finish_node();
    }

    fn parse_linkage_spec(&mut self) {
        self.start_node(SyntaxKind::LINKAGE_SPEC);
        self.bump(); // extern
        self.bump(); // "C"
        if self.eat(SyntaxKind::L_BRACE) {
            self.start_node_keeping_trivia(SyntaxKind::DECL_LIST);
            self.parse_declarations(true);
            self.finish_node();
            self.expect(SyntaxKind::R_BRACE, "`}` to close linkage specification");
        } else {
            self.parse_declaration();
        }
        self.finish_node();
    }

    fn parse_template_decl(&mut self) {
        self.start_node(SyntaxKind::TEMPLATE_DECL);
        self.bump(); // template
        self.parse_template_params();
        if self.at(SyntaxKind::TEMPLATE_KW) && self.nth(1) == SyntaxKind::L_ANGLE {
            self.parse_template_decl();
        } else if self.at_eof() {
            self.error("expected declaration after template parameter list");
        } else {
            self.parse_declaration();
        }
        self.finish_node();
    }

    fn parse_template_params(&mut self) {
        self.start_node(SyntaxKind::TEMPLATE_PARAMS);
        self.expect(SyntaxKind::L_ANGLE, "`<`");
        while !self.at(SyntaxKind::R_ANGLE) && !self.at_eof() {
            self.parse_template_param();
            if !self.eat(SyntaxKind::COMMA) {
                break;
            }
        }
        self.expect(SyntaxKind::R_ANGLE, "`>` to close template parameters");
        self.finish_node();
    }

    fn parse_template_param(&mut self) {
        self.start_node(SyntaxKind::TEMPLATE_PARAM);
        match self.current() {
            SyntaxKind::TYPENAME_KW | SyntaxKind::CLASS_KW => self.bump(),
            SyntaxKind::TEMPLATE_KW => {
                self.bump();
                self.parse_template_params();
                if self.at_any(&[SyntaxKind::TYPENAME_KW, SyntaxKind::CLASS_KW]) {
                    self.bump();
                }
            }
            _ => {
                if !self.parse_type() {
                    self.error("expected template parameter");
                }
            }
        }
        self.eat(SyntaxKind::ELLIPSIS);
        if self.at(SyntaxKind::IDENT) {
            self.parse_simple_name();
        }
        if self.at(SyntaxKind::EQ) {
            self.start_node(SyntaxKind::INITIALIZER);
            self.bump();
            self.bump_balanced_until(&[SyntaxKind::COMMA, SyntaxKind::R_ANGLE], true);
            self.finish_node();
        }
        self.finish_node();
    }

    fn parse_explicit_instantiation(&mut self) {
        self.start_node(SyntaxKind::EXPLICIT_INSTANTIATION);
        self.eat(SyntaxKind::EXTERN_KW);
        self.bump(); // template
        if self.current().is_class_key() {
            self.parse_class();
        } else {
            self.parse_member();
        }
        self.finish_node();
    }

    fn parse_class(&mut self) {
        self.start_node(SyntaxKind::CLASS);
        self.bump(); // class-key
        self.skip_attributes();
        if self.at_any(&[SyntaxKind::IDENT, SyntaxKind::COLON_COLON]) {
            self.start_node(SyntaxKind::NAME);
            self.eat(SyntaxKind::COLON_COLON);
            self.bump();
            while self.at(SyntaxKind::COLON_COLON) && self.nth(1) == SyntaxKind::IDENT {
                self.bump();
                self.bump();
            }
            self.finish_node();
        }
        if self.at(SyntaxKind::L_ANGLE) {
            self.parse_template_args();
        }
        if self.at_word(&["final"]) {
            self.bump();
        }
        if self.at(SyntaxKind::COLON) {
            self.parse_base_list();
        }
        if self.at(SyntaxKind::L_BRACE) {
            self.parse_member_list();
            // Declarators of the class type: `} instance, *pointer;`
            if self.at_any(&[SyntaxKind::IDENT, SyntaxKind::STAR, SyntaxKind::AMP]) {
                self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
            }
        }
        self.expect(SyntaxKind::SEMICOLON, "`;` after class");
        self.finish_node();
    }

    fn parse_base_list(&mut self) {
        self.start_node(SyntaxKind::BASE_LIST);
        self.bump(); // :
        loop {
            self.start_node(SyntaxKind::BASE_SPEC);
            while self.at_any(&[
                SyntaxKind::VIRTUAL_KW,
                SyntaxKind::PUBLIC_KW,
                SyntaxKind::PROTECTED_KW,
                SyntaxKind::PRIVATE_KW,
            ]) {
                self.bump();
            }
            if !self.parse_type() {
                self.error("expected base class");
            }
            self.eat(SyntaxKind::ELLIPSIS);
            self.finish_node();
            if !self.eat(SyntaxKind::COMMA) {
                break;
            }
        }
        self.finish_node();
    }

    fn parse_member_list(&mut self) {
        self.start_node(SyntaxKind::MEMBER_LIST);
        self.bump(); // {
        loop {
            if self.at_eof() {
                self.error("expected `}` to close class body");
                break;
            }
            if self.at(SyntaxKind::R_BRACE) {
                break;
            }
            if self.current().is_access() && self.nth(1) == SyntaxKind::COLON {
                self.start_node(SyntaxKind::ACCESS_SPEC);
                self.bump();
                self.bump();
                self.finish_node();
                continue;
            }
            let start = self.pos;
            self.parse_declaration();
            if self.pos == start {
                self.error_recover("expected member declaration");
            }
        }
        self.eat(SyntaxKind::R_BRACE);
        self.finish_node();
    }

    fn parse_template_args(&mut self) {
        self.start_node(SyntaxKind::TEMPLATE_ARGS);
        self.bump(); // <
        while !self.at(SyntaxKind::R_ANGLE) && !self.at_eof() {
            self.start_node(SyntaxKind::TEMPLATE_ARG);
            self.bump_balanced_until(&[SyntaxKind::COMMA, SyntaxKind::R_ANGLE], true);
            self.finish_node();
            if !self.eat(SyntaxKind::COMMA) {
                break;
            }
        }
        self.expect(SyntaxKind::R_ANGLE, "`>` to close template arguments");
        self.finish_node();
    }

    fn parse_using(&mut self) {
        if self.nth(1) == SyntaxKind::IDENT && self.nth(2) == SyntaxKind::EQ {
            self.start_node(SyntaxKind::TYPE_ALIAS);
            self.bump(); // using
            self.parse_simple_name();
            self.bump(); // =
            if !self.parse_type() {
                self.error("expected aliased type");
            }
            if !self.at(SyntaxKind::SEMICOLON) {
                // Function types and other complex aliases
                self.start_node(SyntaxKind::SKIPPED);
                self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
                self.finish_node();
            }
        } else {
            self.start_node(SyntaxKind::USING_DECL);
            self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
        }
        self.expect(SyntaxKind::SEMICOLON, "`;`");
        self.finish_node();
    }

    fn parse_typedef(&mut self) {
        let complex = self
            .lookahead()
            .take_while(|t| t.kind != SyntaxKind::SEMICOLON)
            .any(|t| {
                matches!(
                    t.kind,
                    SyntaxKind::L_PAREN | SyntaxKind::L_BRACE | SyntaxKind::L_BRACKET
                )
            });
        if complex {
            self.skip_statement();
            return;
        }
        self.start_node(SyntaxKind::TYPEDEF);
        self.bump(); // typedef
        if !self.parse_type() {
            self.error("expected type in typedef");
        }
        if self.at(SyntaxKind::IDENT) {
            self.parse_simple_name();
        } else {
            self.error("expected typedef name");
        }
        self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
        self.expect(SyntaxKind::SEMICOLON, "`;` after typedef");
        self.finish_node();
    }

    /// A recognised construct that always ends in `;` (enums, aliases),
    /// kept as an opaque SKIPPED run.
    fn skip_statement(&mut self) {
        self.start_node(SyntaxKind::SKIPPED);
        self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
        self.expect(SyntaxKind::SEMICOLON, "`;`");
        self.finish_node();
    }

    /// A recognised construct kept as an opaque SKIPPED run: up to and
    /// including a `;` at depth zero, or a braced group and an optional `;`
    /// after it (friend functions defined in place).
    fn skip_declaration(&mut self) {
        self.start_node(SyntaxKind::SKIPPED);
        loop {
            match self.current() {
                _ if self.at_eof() => break,
                SyntaxKind::SEMICOLON => {
                    self.bump();
                    break;
                }
                SyntaxKind::L_BRACE => {
                    self.bump_group();
                    self.eat(SyntaxKind::SEMICOLON);
                    break;
                }
                SyntaxKind::R_BRACE | SyntaxKind::R_PAREN | SyntaxKind::R_BRACKET => break,
                SyntaxKind::L_PAREN | SyntaxKind::L_BRACKET => self.bump_group(),
                _ => self.bump(),
            }
        }
        self.finish_node();
    }

    /// Functions, constructors, destructors, operators, fields and
    /// variables.
    fn parse_member(&mut self) {
        let checkpoint = self.checkpoint();
        let start = self.pos;
        loop {
            if self.at_any(&[
                SyntaxKind::STATIC_KW,
                SyntaxKind::INLINE_KW,
                SyntaxKind::VIRTUAL_KW,
                SyntaxKind::EXPLICIT_KW,
                SyntaxKind::CONSTEXPR_KW,
                SyntaxKind::EXTERN_KW,
                SyntaxKind::MUTABLE_KW,
            ]) || self.at_word(SPECIFIER_WORDS)
            {
                self.bump();
            } else if self.at(SyntaxKind::L_BRACKET) && self.nth(1) == SyntaxKind::L_BRACKET {
                self.bump_group();
            } else {
                break;
            }
        }

        if self.at(SyntaxKind::TILDE) {
            self.start_node_at(checkpoint, SyntaxKind::FUNCTION);
            self.start_node(SyntaxKind::NAME);
            self.bump();
            self.expect(SyntaxKind::IDENT, "destructor name");
            self.finish_node();
            self.parse_function_rest();
            self.finish_node();
            return;
        }
        if self.at(SyntaxKind::OPERATOR_KW) {
            // Conversion operator
            self.start_node_at(checkpoint, SyntaxKind::FUNCTION);
            self.parse_operator_name();
            self.parse_function_rest();
            self.finish_node();
            return;
        }

        if !self.parse_type() {
            if self.pos == start {
                return;
            }
            // Specifiers without a type
            self.start_node_at(checkpoint, SyntaxKind::SKIPPED);
            self.eat(SyntaxKind::SEMICOLON);
            self.finish_node();
            return;
        }

        match self.current() {
            SyntaxKind::L_PAREN => {
                // Constructor-like: the "type" is the entity name
                self.start_node_at(checkpoint, SyntaxKind::FUNCTION);
                self.parse_function_rest();
                self.finish_node();
            }
            SyntaxKind::OPERATOR_KW => {
                self.start_node_at(checkpoint, SyntaxKind::FUNCTION);
                self.parse_operator_name();
                self.parse_function_rest();
                self.finish_node();
            }
            SyntaxKind::IDENT | SyntaxKind::COLON_COLON => {
                let operator = self.parse_declarator_name();
                if !operator && self.at(SyntaxKind::L_ANGLE) {
                    self.parse_template_args();
                }
                if self.at(SyntaxKind::L_PAREN) {
                    self.start_node_at(checkpoint, SyntaxKind::FUNCTION);
                    self.parse_function_rest();
                } else {
                    self.start_node_at(checkpoint, SyntaxKind::FIELD);
                    self.parse_field_rest();
                }
                self.finish_node();
            }
            _ => {
                // A type with no declarator, e.g. an unexpanded macro
                self.start_node_at(checkpoint, SyntaxKind::SKIPPED);
                self.eat(SyntaxKind::SEMICOLON);
                self.finish_node();
            }
        }
    }

    /// Parse a TYPE node. Returns false, consuming nothing, when the current
    /// token cannot start a type.
    fn parse_type(&mut self) -> bool {
        let starts_type = matches!(
            self.current(),
            SyntaxKind::IDENT
                | SyntaxKind::COLON_COLON
                | SyntaxKind::CONST_KW
                | SyntaxKind::VOLATILE_KW
                | SyntaxKind::TYPENAME_KW
                | SyntaxKind::ENUM_KW
        ) || self.current().is_class_key();
        if !starts_type {
            return false;
        }

        self.start_node(SyntaxKind::TYPE);
        while self.at_any(&[
            SyntaxKind::CONST_KW,
            SyntaxKind::VOLATILE_KW,
            SyntaxKind::TYPENAME_KW,
            SyntaxKind::ENUM_KW,
        ]) || self.current().is_class_key()
        {
            self.bump();
        }

        if self.at_word(FUNDAMENTAL_WORDS) {
            while self.at_word(FUNDAMENTAL_WORDS)
                || self.at_any(&[SyntaxKind::CONST_KW, SyntaxKind::VOLATILE_KW])
            {
                self.bump();
            }
        } else if self.at_any(&[SyntaxKind::IDENT, SyntaxKind::COLON_COLON]) {
            self.parse_qualified_type_name();
        } else {
            self.error("expected type name");
        }

        loop {
            match self.current() {
                SyntaxKind::CONST_KW
                | SyntaxKind::VOLATILE_KW
                | SyntaxKind::STAR
                | SyntaxKind::AMP
                | SyntaxKind::AMP_AMP => self.bump(),
                _ => break,
            }
        }
        self.finish_node();
        true
    }

    fn parse_qualified_type_name(&mut self) {
        self.eat(SyntaxKind::COLON_COLON);
        loop {
            if self.current_text() == "decltype" && self.nth(1) == SyntaxKind::L_PAREN {
                self.bump();
                self.bump_group();
            } else if !self.eat(SyntaxKind::IDENT) {
                self.error("expected name");
                return;
            }
            if self.at(SyntaxKind::L_ANGLE) {
                self.bump_angle_group();
            }
            if self.at(SyntaxKind::COLON_COLON) && self.nth(1) != SyntaxKind::STAR {
                self.bump();
                self.eat(SyntaxKind::TEMPLATE_KW);
                continue;
            }
            return;
        }
    }

    /// NAME of a declarator, possibly qualified (`A::method`,
    /// `ns::A::operator=`). Template arguments between segments stay in the
    /// name; trailing ones are left for a TEMPLATE_ARGS node. Returns whether
    /// the name is an operator.
    fn parse_declarator_name(&mut self) -> bool {
        self.start_node(SyntaxKind::NAME);
        self.eat(SyntaxKind::COLON_COLON);
        let mut operator = false;
        loop {
            if self.at(SyntaxKind::OPERATOR_KW) {
                self.bump_operator_tokens();
                operator = true;
                break;
            }
            self.eat(SyntaxKind::TILDE);
            if !self.eat(SyntaxKind::IDENT) {
                self.error("expected name");
                break;
            }
            if self.at(SyntaxKind::L_ANGLE) && self.angle_group_followed_by_scope() {
                self.bump_angle_group();
            }
            if !self.eat(SyntaxKind::COLON_COLON) {
                break;
            }
        }
        self.finish_node();
        operator
    }

    fn angle_group_followed_by_scope(&self) -> bool {
        let mut depth = 0usize;
        let mut tokens = self.lookahead();
        for token in tokens.by_ref() {
            match token.kind {
                SyntaxKind::L_ANGLE => depth += 1,
                SyntaxKind::R_ANGLE => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                SyntaxKind::SEMICOLON | SyntaxKind::L_BRACE => return false,
                _ => {}
            }
        }
        tokens.next().map(|t| t.kind) == Some(SyntaxKind::COLON_COLON)
    }

    fn parse_operator_name(&mut self) {
        self.start_node(SyntaxKind::NAME);
        self.bump_operator_tokens();
        self.finish_node();
    }

    fn bump_operator_tokens(&mut self) {
        self.bump(); // operator
        if self.at(SyntaxKind::L_PAREN) && self.nth(1) == SyntaxKind::R_PAREN {
            self.bump();
            self.bump();
            return;
        }
        while !self.at_eof() && !self.at_any(&[SyntaxKind::L_PAREN, SyntaxKind::SEMICOLON]) {
            self.bump();
        }
    }

    fn parse_simple_name(&mut self) {
        self.start_node(SyntaxKind::NAME);
        self.bump();
        self.finish_node();
    }

    fn parse_function_rest(&mut self) {
        self.parse_param_list();
        loop {
            match self.current() {
                SyntaxKind::CONST_KW
                | SyntaxKind::VOLATILE_KW
                | SyntaxKind::AMP
                | SyntaxKind::AMP_AMP => self.bump(),
                SyntaxKind::NOEXCEPT_KW => {
                    self.bump();
                    if self.at(SyntaxKind::L_PAREN) {
                        self.bump_group();
                    }
                }
                SyntaxKind::IDENT if self.at_word(&["override", "final"]) => self.bump(),
                SyntaxKind::IDENT if self.at_word(&["throw"]) => {
                    self.bump();
                    if self.at(SyntaxKind::L_PAREN) {
                        self.bump_group();
                    }
                }
                SyntaxKind::ARROW => {
                    self.bump();
                    if !self.parse_type() {
                        self.error("expected trailing return type");
                    }
                }
                _ => break,
            }
        }

        if self.at(SyntaxKind::EQ) {
            // = 0, = default, = delete
            self.start_node(SyntaxKind::INITIALIZER);
            self.bump();
            self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
            self.finish_node();
        }
        if self.at(SyntaxKind::COLON) {
            self.parse_ctor_init();
        }

        match self.current() {
            SyntaxKind::L_BRACE => {
                self.start_node(SyntaxKind::BODY);
                self.bump_group();
                self.finish_node();
            }
            SyntaxKind::SEMICOLON => self.bump(),
            _ if self.at_eof() => self.error("expected `;` or function body"),
            _ => {
                // Declarators this parser does not model (function pointers, ...)
                self.start_node(SyntaxKind::SKIPPED);
                self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
                self.finish_node();
                self.expect(SyntaxKind::SEMICOLON, "`;`");
            }
        }
    }

    fn parse_ctor_init(&mut self) {
        self.start_node(SyntaxKind::CTOR_INIT);
        self.bump(); // :
        loop {
            match self.current() {
                _ if self.at_eof() => break,
                SyntaxKind::L_BRACE
                    if matches!(self.last_kind, SyntaxKind::IDENT | SyntaxKind::R_ANGLE) =>
                {
                    self.bump_group()
                }
                SyntaxKind::L_BRACE | SyntaxKind::SEMICOLON | SyntaxKind::R_BRACE => break,
                SyntaxKind::L_PAREN | SyntaxKind::L_BRACKET => self.bump_group(),
                _ => self.bump(),
            }
        }
        self.finish_node();
    }

    fn parse_param_list(&mut self) {
        self.start_node(SyntaxKind::PARAM_LIST);
        if !self.expect(SyntaxKind::L_PAREN, "`(`") {
            self.finish_node();
            return;
        }
        while !self.at(SyntaxKind::R_PAREN) && !self.at_eof() {
            self.parse_param();
            if !self.eat(SyntaxKind::COMMA) {
                break;
            }
        }
        self.expect(SyntaxKind::R_PAREN, "`)` to close parameter list");
        self.finish_node();
    }

    fn parse_param(&mut self) {
        self.start_node(SyntaxKind::PARAM);
        if self.eat(SyntaxKind::ELLIPSIS) {
            self.finish_node();
            return;
        }
        if self.parse_type() {
            self.eat(SyntaxKind::ELLIPSIS);
            if self.at(SyntaxKind::IDENT) {
                self.parse_simple_name();
            }
            while self.at(SyntaxKind::L_BRACKET) {
                self.parse_array_suffix();
            }
        }
        if self.at(SyntaxKind::EQ) {
            self.start_node(SyntaxKind::INITIALIZER);
            self.bump();
            self.bump_balanced_until(&[SyntaxKind::COMMA, SyntaxKind::R_PAREN], true);
            self.finish_node();
        }
        if !self.at_any(&[SyntaxKind::COMMA, SyntaxKind::R_PAREN]) && !self.at_eof() {
            self.start_node(SyntaxKind::SKIPPED);
            self.bump_balanced_until(&[SyntaxKind::COMMA, SyntaxKind::R_PAREN], true);
            self.finish_node();
        }
        self.finish_node();
    }

    fn parse_array_suffix(&mut self) {
        self.start_node(SyntaxKind::ARRAY_SUFFIX);
        self.bump(); // [
        self.bump_balanced_until(&[SyntaxKind::R_BRACKET], false);
        self.expect(SyntaxKind::R_BRACKET, "`]`");
        self.finish_node();
    }

    fn parse_field_rest(&mut self) {
        while self.at(SyntaxKind::L_BRACKET) {
            self.parse_array_suffix();
        }
        if self.at(SyntaxKind::COLON) {
            // Bit-field width
            self.bump();
            self.bump_balanced_until(
                &[
                    SyntaxKind::SEMICOLON,
                    SyntaxKind::COMMA,
                    SyntaxKind::EQ,
                    SyntaxKind::L_BRACE,
                ],
                false,
            );
        }
        self.parse_initializer_opt();
        while self.eat(SyntaxKind::COMMA) {
            self.start_node(SyntaxKind::DECLARATOR);
            while self.at_any(&[
                SyntaxKind::STAR,
                SyntaxKind::AMP,
                SyntaxKind::AMP_AMP,
                SyntaxKind::CONST_KW,
            ]) {
                self.bump();
            }
            if self.at(SyntaxKind::IDENT) {
                self.parse_simple_name();
            } else {
                self.error("expected declarator name");
            }
            while self.at(SyntaxKind::L_BRACKET) {
                self.parse_array_suffix();
            }
            self.parse_initializer_opt();
            self.finish_node();
        }
        if !self.eat(SyntaxKind::SEMICOLON) {
            self.error("expected `;` after declaration");
            self.bump_balanced_until(&[SyntaxKind::SEMICOLON], false);
            self.eat(SyntaxKind::SEMICOLON);
        }
    }

    fn parse_initializer_opt(&mut self) {
        match self.current() {
            SyntaxKind::EQ => {
                self.start_node(SyntaxKind::INITIALIZER);
                self.bump();
                self.bump_balanced_until(&[SyntaxKind::SEMICOLON, SyntaxKind::COMMA], true);
                self.finish_node();
            }
            SyntaxKind::L_BRACE => {
                self.start_node(SyntaxKind::INITIALIZER);
                self.bump_group();
                self.finish_node();
            }
            _ => {}
        }
    }

    fn skip_attributes(&mut self) {
        loop {
            if self.at(SyntaxKind::L_BRACKET) && self.nth(1) == SyntaxKind::L_BRACKET {
                self.bump_group();
            } else if self.at_word(&["alignas"]) && self.nth(1) == SyntaxKind::L_PAREN {
                self.bump();
                self.bump_group();
            } else {
                return;
            }
        }
    }
}

fn closer(opener: SyntaxKind) -> SyntaxKind {
    match opener {
        SyntaxKind::L_PAREN => SyntaxKind::R_PAREN,
        SyntaxKind::L_BRACKET => SyntaxKind::R_BRACKET,
        _ => SyntaxKind::R_BRACE,
    }
}

/// Pop angle entries that turned out to be comparisons.
fn drop_angles(stack: &mut Vec<SyntaxKind>) {
    while stack.last() == Some(&SyntaxKind::R_ANGLE) {
        stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::preprocess::FileId;

    fn parse_text(text: &str) -> Parse {
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
        parse(&tokens)
    }

    fn kinds(parse: &Parse) -> Vec<SyntaxKind> {
        parse.syntax().descendants().map(|n| n.kind()).collect()
    }

    #[test]
    fn test_tree_is_lossless() {
        let text = "// pxx :: export\nclass A {\npublic:\n  A() {}\n  int x = 1;\n};\n";
        let parse = parse_text(text);
        assert!(parse.ok(), "{:?}", parse.errors);
        assert_eq!(parse.syntax().text().to_string(), text);
    }

    #[test]
    fn test_class_members() {
        let parse = parse_text(
            "class A : public B {\npublic:\n  A(int a) : a_(a), b_{1} {}\n  ~A();\n  virtual int get() const = 0;\n  int x, *y;\nprivate:\n  int a_;\n};",
        );
        assert!(parse.ok(), "{:?}", parse.errors);
        let kinds = kinds(&parse);
        assert!(kinds.contains(&SyntaxKind::BASE_SPEC));
        assert!(kinds.contains(&SyntaxKind::CTOR_INIT));
        assert!(kinds.contains(&SyntaxKind::DECLARATOR));
        assert_eq!(
            kinds
                .iter()
                .filter(|k| **k == SyntaxKind::ACCESS_SPEC)
                .count(),
            2
        );
        assert_eq!(
            kinds.iter().filter(|k| **k == SyntaxKind::FUNCTION).count(),
            3
        );
        assert_eq!(kinds.iter().filter(|k| **k == SyntaxKind::FIELD).count(), 2);
    }

    #[test]
    fn test_templates_and_instantiations() {
        let parse = parse_text(
            "template<typename T, int N = 3> class Sum { std::array<T, N> data; };\n\
             template <typename t> class Class<t, 0> {};\n\
             template class Class<int, 0>;\n\
             template float sum(std::array<float, 3>);\n\
             template<> int f<int>(int);\n",
        );
        assert!(parse.ok(), "{:?}", parse.errors);
        let kinds = kinds(&parse);
        assert_eq!(
            kinds
                .iter()
                .filter(|k| **k == SyntaxKind::TEMPLATE_DECL)
                .count(),
            3
        );
        assert_eq!(
            kinds
                .iter()
                .filter(|k| **k == SyntaxKind::EXPLICIT_INSTANTIATION)
                .count(),
            2
        );
        assert_eq!(
            kinds
                .iter()
                .filter(|k| **k == SyntaxKind::TEMPLATE_ARGS)
                .count(),
            3
        );
    }

    #[test]
    fn test_unsupported_constructs_are_skipped() {
        let parse = parse_text(
            "enum class E { A, B };\nstatic_assert(sizeof(int) == 4, \"\");\n\
             template<typename T> using Vec = std::vector<T>;\n\
             class A { friend bool operator==(A, A) { return true; } void (*cb)(int); };",
        );
        assert!(parse.ok(), "{:?}", parse.errors);
        let kinds = kinds(&parse);
        // enum, static_assert, alias, friend, and the function pointer's
        // parameter and trailing declarator
        assert_eq!(kinds.iter().filter(|k| **k == SyntaxKind::SKIPPED).count(), 6);
    }

    #[test]
    fn test_namespaces_and_aliases() {
        let parse = parse_text(
            "namespace a::b { using Matrix = Eigen::MatrixXd; typedef unsigned long size_type; }\n\
             namespace { int hidden(); }\n\
             extern \"C\" { void c_function(void); }",
        );
        assert!(parse.ok(), "{:?}", parse.errors);
        let kinds = kinds(&parse);
        assert!(kinds.contains(&SyntaxKind::TYPE_ALIAS));
        assert!(kinds.contains(&SyntaxKind::TYPEDEF));
        assert!(kinds.contains(&SyntaxKind::LINKAGE_SPEC));
        assert_eq!(
            kinds
                .iter()
                .filter(|k| **k == SyntaxKind::NAMESPACE)
                .count(),
            2
        );
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        let parse = parse_text("class A { int x; ");
        assert!(!parse.ok());
        let parse = parse_text("int f(int a;\n");
        assert!(!parse.ok());
        let parse = parse_text("}\nint y;");
        assert_eq!(parse.errors.len(), 1);
        assert_eq!(parse.errors[0].message, "unmatched `}`");
    }

    #[test]
    fn test_origin_lookup() {
        let parse = parse_text("int x;");
        let origin = parse.origins.lookup(TextSize::new(4)).unwrap();
        assert_eq!(origin.offset, TextSize::new(4));
    }
}
