//! Token-level preprocessor
//!
//! Splices quoted includes, expands object-like macros and evaluates
//! conditional blocks over the lexer's token stream. Angle-bracket includes
//! are recorded but never expanded. Every emitted token keeps an [`Origin`]
//! pointing back at the file and offset it was read from; macro expansions
//! inherit the origin of the macro use.

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::path::{Path, PathBuf};
use text_size::TextSize;
use tracing::{debug, trace};

use super::lexer::{Token, tokenize};
use super::source::{SourceProvider, normalize};
use super::syntax_kind::SyntaxKind;
use crate::base::LineIndex;
use crate::diagnostics::{Diagnostic, Location, codes};
use crate::error::ParseError;

const MAX_INCLUDE_DEPTH: usize = 64;

/// Index of a file in [`Preprocessed::files`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Where a token was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Origin {
    pub file: FileId,
    pub offset: TextSize,
}

/// A token of the expanded stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpToken {
    pub kind: SyntaxKind,
    pub text: SmolStr,
    pub origin: Origin,
}

/// A file that contributed tokens
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub line_index: LineIndex,
}

/// Include directories and macro definitions taken from compiler flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessorConfig {
    pub include_dirs: Vec<PathBuf>,
    /// Macro name to replacement text, in flag order.
    pub defines: IndexMap<SmolStr, String>,
}

impl PreprocessorConfig {
    /// Extract `-I`, `-iquote`, `-isystem`, `-D` and `-U` flags, in either
    /// attached (`-Idir`) or separate (`-I dir`) form. Anything else is
    /// ignored.
    pub fn from_flags(flags: &[String]) -> Self {
        let mut config = Self::default();
        config
            .defines
            .insert(SmolStr::new_static("__cplusplus"), "201703L".to_string());

        let mut iter = flags.iter();
        while let Some(flag) = iter.next() {
            for prefix in ["-I", "-iquote", "-isystem", "-D", "-U"] {
                let Some(rest) = flag.strip_prefix(prefix) else {
                    continue;
                };
                let value = if rest.is_empty() {
                    match iter.next() {
                        Some(value) => value.as_str(),
                        None => break,
                    }
                } else {
                    rest
                };
                match prefix {
                    "-D" => {
                        let (name, replacement) = value.split_once('=').unwrap_or((value, "1"));
                        config
                            .defines
                            .insert(SmolStr::new(name), replacement.to_string());
                    }
                    "-U" => {
                        config.defines.shift_remove(value);
                    }
                    _ => config.include_dirs.push(PathBuf::from(value)),
                }
                break;
            }
        }
        config
    }
}

/// Output of a preprocessor run
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub tokens: Vec<PpToken>,
    /// Every file read, the main file first.
    pub files: Vec<SourceFile>,
    /// Angle-bracket includes, in first-seen order.
    pub system_includes: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
struct Macro {
    body: Vec<(SyntaxKind, SmolStr)>,
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    parent_active: bool,
    active: bool,
    taken: bool,
    origin: Origin,
}

/// Preprocesses one main file and everything it includes.
pub struct Preprocessor<'s, S: SourceProvider + ?Sized> {
    source: &'s S,
    include_dirs: Vec<PathBuf>,
    macros: IndexMap<SmolStr, Macro>,
    files: Vec<SourceFile>,
    once: FxHashSet<PathBuf>,
    include_depth: usize,
    conditionals: Vec<Conditional>,
    tokens: Vec<PpToken>,
    system_includes: IndexSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'s, S: SourceProvider + ?Sized> Preprocessor<'s, S> {
    pub fn new(source: &'s S, config: &PreprocessorConfig) -> Self {
        let macros = config
            .defines
            .iter()
            .map(|(name, text)| (name.clone(), Macro { body: macro_body(&tokenize(text)) }))
            .collect();
        Self {
            source,
            include_dirs: config.include_dirs.clone(),
            macros,
            files: Vec::new(),
            once: FxHashSet::default(),
            include_depth: 0,
            conditionals: Vec::new(),
            tokens: Vec::new(),
            system_includes: IndexSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Preprocess `path`.
    pub fn run(mut self, path: &Path) -> Result<Preprocessed, ParseError> {
        debug!(path = %path.display(), "preprocessing");
        self.process_file(path, None)?;
        debug!(
            tokens = self.tokens.len(),
            files = self.files.len(),
            "preprocessing done"
        );
        Ok(Preprocessed {
            tokens: self.tokens,
            files: self.files,
            system_includes: self.system_includes.into_iter().collect(),
            diagnostics: self.diagnostics,
        })
    }

    fn process_file(&mut self, path: &Path, included_from: Option<Origin>) -> Result<(), ParseError> {
        let path = normalize(path);
        if self.once.contains(&path) {
            trace!(path = %path.display(), "skipping #pragma once file");
            return Ok(());
        }
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(self.fatal(
                included_from,
                format!("#include nested too deeply at `{}`", path.display()),
            ));
        }
        let text = self.source.read(&path).map_err(|err| {
            self.fatal(
                included_from,
                format!("cannot read `{}`: {}", path.display(), err),
            )
        })?;

        let file = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            path: path.clone(),
            line_index: LineIndex::new(&text),
        });
        self.include_depth += 1;
        let depth = self.conditionals.len();

        for token in tokenize(&text) {
            let origin = Origin {
                file,
                offset: token.offset,
            };
            match token.kind {
                SyntaxKind::DIRECTIVE => self.directive(token.text, origin, &path)?,
                _ if !self.active() => {}
                SyntaxKind::ERROR => {
                    return Err(self.fatal(
                        Some(origin),
                        format!("invalid character `{}`", token.text),
                    ));
                }
                SyntaxKind::IDENT if self.macros.contains_key(token.text) => {
                    let mut expanding = Vec::new();
                    self.expand(token.text, origin, &mut expanding);
                }
                kind => self.tokens.push(PpToken {
                    kind,
                    text: SmolStr::new(token.text),
                    origin,
                }),
            }
        }

        if self.conditionals.len() > depth {
            let open = self.conditionals[depth].origin;
            return Err(self.fatal(Some(open), "unterminated conditional directive".to_string()));
        }
        self.include_depth -= 1;
        Ok(())
    }

    fn active(&self) -> bool {
        self.conditionals.last().is_none_or(|c| c.active)
    }

    fn expand(&mut self, name: &str, origin: Origin, expanding: &mut Vec<SmolStr>) {
        let Some(body) = self.macros.get(name).map(|m| m.body.clone()) else {
            return;
        };
        trace!(name, "expanding macro");
        expanding.push(SmolStr::new(name));
        for (kind, text) in body {
            if kind == SyntaxKind::IDENT
                && !expanding.contains(&text)
                && self.macros.contains_key(&text)
            {
                self.expand(&text, origin, expanding);
            } else {
                self.tokens.push(PpToken { kind, text, origin });
            }
        }
        expanding.pop();
    }

    // =========================================================================
    // Directives
    // =========================================================================

    fn directive(&mut self, text: &str, origin: Origin, path: &Path) -> Result<(), ParseError> {
        let line = text[1..].replace("\\\r\n", " ").replace("\\\n", " ");
        let tokens = tokenize(&line);
        let mut words = tokens.iter().filter(|t| !t.kind.is_trivia());
        let Some(name) = words.next() else {
            // Null directive
            return Ok(());
        };
        let rest_start: usize = (name.offset + TextSize::of(name.text)).into();
        let rest: &str = line[rest_start..].trim();
        let args: Vec<&Token<'_>> = words.collect();

        match name.text {
            "if" => {
                let value = self.active() && self.evaluate(&args, origin)?;
                self.push_conditional(value, origin);
            }
            "ifdef" | "ifndef" => {
                let defined = args
                    .first()
                    .is_some_and(|t| self.macros.contains_key(t.text));
                let value = defined == (name.text == "ifdef");
                self.push_conditional(value, origin);
            }
            "elif" | "elifdef" | "elifndef" => {
                let Some(top) = self.conditionals.last().copied() else {
                    return Err(self.unbalanced(name.text, origin));
                };
                let value = if !top.parent_active || top.taken {
                    false
                } else if name.text == "elif" {
                    self.evaluate(&args, origin)?
                } else {
                    let defined = args
                        .first()
                        .is_some_and(|t| self.macros.contains_key(t.text));
                    defined == (name.text == "elifdef")
                };
                if let Some(top) = self.conditionals.last_mut() {
                    top.active = value;
                    top.taken |= value;
                }
            }
            "else" => match self.conditionals.last_mut() {
                Some(top) => {
                    top.active = top.parent_active && !top.taken;
                    top.taken = true;
                }
                None => return Err(self.unbalanced("else", origin)),
            },
            "endif" => {
                if self.conditionals.pop().is_none() {
                    return Err(self.unbalanced("endif", origin));
                }
            }
            _ if !self.active() => {}
            "include" | "include_next" => self.include(rest, origin, path)?,
            "define" => self.define(&tokens, name, origin),
            "undef" => {
                if let Some(target) = args.first() {
                    self.macros.shift_remove(target.text);
                }
            }
            "pragma" => {
                if args.first().is_some_and(|t| t.text == "once") {
                    self.once.insert(path.to_path_buf());
                }
            }
            "error" => {
                return Err(self.fatal(Some(origin), format!("#error {}", rest)));
            }
            other => {
                let diagnostic = Diagnostic::warning(format!("ignored directive `#{}`", other))
                    .with_code(codes::IGNORED_DIRECTIVE)
                    .with_location(Some(self.location(origin)));
                self.diagnostics.push(diagnostic);
            }
        }
        Ok(())
    }

    fn push_conditional(&mut self, value: bool, origin: Origin) {
        let parent_active = self.active();
        self.conditionals.push(Conditional {
            parent_active,
            active: parent_active && value,
            taken: parent_active && value,
            origin,
        });
    }

    fn include(&mut self, rest: &str, origin: Origin, path: &Path) -> Result<(), ParseError> {
        if let Some(quoted) = rest.strip_prefix('"') {
            let name = quoted.split('"').next().unwrap_or_default();
            let target = self.resolve_include(name, path).ok_or_else(|| {
                self.fatal(Some(origin), format!("'{}' file not found", name))
            })?;
            debug!(include = %target.display(), "splicing include");
            return self.process_file(&target, Some(origin));
        }
        if let Some(angled) = rest.strip_prefix('<') {
            let name = angled.split('>').next().unwrap_or_default().trim();
            trace!(include = name, "recording system include");
            self.system_includes.insert(name.to_string());
            return Ok(());
        }
        let diagnostic = Diagnostic::warning(format!("ignored computed include `{}`", rest))
            .with_code(codes::IGNORED_DIRECTIVE)
            .with_location(Some(self.location(origin)));
        self.diagnostics.push(diagnostic);
        Ok(())
    }

    fn resolve_include(&self, name: &str, including: &Path) -> Option<PathBuf> {
        let local = including.parent().map(|dir| dir.join(name));
        local
            .into_iter()
            .chain(self.include_dirs.iter().map(|dir| dir.join(name)))
            .map(|candidate| normalize(&candidate))
            .find(|candidate| self.source.exists(candidate))
    }

    fn define(&mut self, tokens: &[Token<'_>], directive: &Token<'_>, origin: Origin) {
        let mut iter = tokens
            .iter()
            .skip_while(|t| t.offset <= directive.offset)
            .skip_while(|t| t.kind.is_trivia());
        let Some(name) = iter.next().filter(|t| t.kind.is_word()) else {
            let diagnostic = Diagnostic::warning("#define without a macro name")
                .with_code(codes::IGNORED_DIRECTIVE)
                .with_location(Some(self.location(origin)));
            self.diagnostics.push(diagnostic);
            return;
        };
        let body: Vec<Token<'_>> = iter.cloned().collect();
        if body.first().is_some_and(|t| t.kind == SyntaxKind::L_PAREN) {
            let diagnostic =
                Diagnostic::warning(format!("function-like macro `{}` is not expanded", name.text))
                    .with_code(codes::FUNCTION_MACRO)
                    .with_location(Some(self.location(origin)));
            self.diagnostics.push(diagnostic);
            return;
        }
        trace!(name = name.text, "defining macro");
        self.macros.insert(
            SmolStr::new(name.text),
            Macro {
                body: macro_body(&body),
            },
        );
    }

    // =========================================================================
    // Conditional expressions
    // =========================================================================

    fn evaluate(&self, args: &[&Token<'_>], origin: Origin) -> Result<bool, ParseError> {
        let tokens: Vec<(SyntaxKind, &str)> = args.iter().map(|t| (t.kind, t.text)).collect();
        let mut eval = CondEval {
            tokens: &tokens,
            pos: 0,
            macros: &self.macros,
        };
        match eval.or() {
            Some(value) if eval.pos == tokens.len() => Ok(value != 0),
            _ => Err(self.fatal(
                Some(origin),
                "malformed #if expression".to_string(),
            )),
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    fn location(&self, origin: Origin) -> Location {
        let file = &self.files[origin.file.0 as usize];
        Location::new(&file.path, file.line_index.line_col(origin.offset))
    }

    fn fatal(&self, origin: Option<Origin>, message: String) -> ParseError {
        ParseError::new(message, origin.map(|o| self.location(o)))
    }

    fn unbalanced(&self, directive: &str, origin: Origin) -> ParseError {
        self.fatal(Some(origin), format!("#{} without #if", directive))
    }
}

/// Replacement list of a macro: comments dropped, whitespace runs collapsed
/// to one space, leading and trailing whitespace trimmed.
fn macro_body(tokens: &[Token<'_>]) -> Vec<(SyntaxKind, SmolStr)> {
    let mut body: Vec<(SyntaxKind, SmolStr)> = Vec::new();
    for token in tokens {
        match token.kind {
            SyntaxKind::LINE_COMMENT | SyntaxKind::BLOCK_COMMENT | SyntaxKind::WHITESPACE => {
                if body
                    .last()
                    .is_some_and(|(kind, _)| *kind != SyntaxKind::WHITESPACE)
                {
                    body.push((SyntaxKind::WHITESPACE, SmolStr::new_static(" ")));
                }
            }
            kind => body.push((kind, SmolStr::new(token.text))),
        }
    }
    if body.last().is_some_and(|(kind, _)| *kind == SyntaxKind::WHITESPACE) {
        body.pop();
    }
    body
}

fn parse_int(text: &str) -> Option<i64> {
    let digits: String = text
        .trim_end_matches(['u', 'U', 'l', 'L'])
        .chars()
        .filter(|c| *c != '\'')
        .collect();
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else {
        digits.parse().ok()
    }
}

/// Recursive descent evaluator for `#if` expressions.
struct CondEval<'a> {
    tokens: &'a [(SyntaxKind, &'a str)],
    pos: usize,
    macros: &'a IndexMap<SmolStr, Macro>,
}

impl CondEval<'_> {
    fn peek(&self, n: usize) -> Option<SyntaxKind> {
        self.tokens.get(self.pos + n).map(|(kind, _)| *kind)
    }

    fn at_pair(&self, first: SyntaxKind, second: SyntaxKind) -> bool {
        self.peek(0) == Some(first) && self.peek(1) == Some(second)
    }

    fn or(&mut self) -> Option<i64> {
        let mut value = self.and()?;
        while self.at_pair(SyntaxKind::PIPE, SyntaxKind::PIPE) {
            self.pos += 2;
            let rhs = self.and()?;
            value = ((value != 0) || (rhs != 0)) as i64;
        }
        Some(value)
    }

    fn and(&mut self) -> Option<i64> {
        let mut value = self.equality()?;
        while self.peek(0) == Some(SyntaxKind::AMP_AMP) {
            self.pos += 1;
            let rhs = self.equality()?;
            value = ((value != 0) && (rhs != 0)) as i64;
        }
        Some(value)
    }

    fn equality(&mut self) -> Option<i64> {
        let mut value = self.relational()?;
        loop {
            if self.at_pair(SyntaxKind::EQ, SyntaxKind::EQ) {
                self.pos += 2;
                value = (value == self.relational()?) as i64;
            } else if self.at_pair(SyntaxKind::BANG, SyntaxKind::EQ) {
                self.pos += 2;
                value = (value != self.relational()?) as i64;
            } else {
                return Some(value);
            }
        }
    }

    fn relational(&mut self) -> Option<i64> {
        let mut value = self.additive()?;
        loop {
            let op = match self.peek(0) {
                Some(kind @ (SyntaxKind::L_ANGLE | SyntaxKind::R_ANGLE)) => kind,
                _ => return Some(value),
            };
            let or_equal = self.peek(1) == Some(SyntaxKind::EQ);
            self.pos += if or_equal { 2 } else { 1 };
            let rhs = self.additive()?;
            value = match (op, or_equal) {
                (SyntaxKind::L_ANGLE, false) => value < rhs,
                (SyntaxKind::L_ANGLE, true) => value <= rhs,
                (_, false) => value > rhs,
                (_, true) => value >= rhs,
            } as i64;
        }
    }

    fn additive(&mut self) -> Option<i64> {
        let mut value = self.unary()?;
        loop {
            match self.peek(0) {
                Some(SyntaxKind::PLUS) => {
                    self.pos += 1;
                    value = value.wrapping_add(self.unary()?);
                }
                Some(SyntaxKind::MINUS) => {
                    self.pos += 1;
                    value = value.wrapping_sub(self.unary()?);
                }
                _ => return Some(value),
            }
        }
    }

    fn unary(&mut self) -> Option<i64> {
        match self.peek(0)? {
            SyntaxKind::BANG => {
                self.pos += 1;
                Some((self.unary()? == 0) as i64)
            }
            SyntaxKind::MINUS => {
                self.pos += 1;
                Some(self.unary()?.wrapping_neg())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Option<i64> {
        let (kind, text) = *self.tokens.get(self.pos)?;
        self.pos += 1;
        match kind {
            SyntaxKind::INT_NUMBER => parse_int(text),
            SyntaxKind::L_PAREN => {
                let value = self.or()?;
                (self.peek(0) == Some(SyntaxKind::R_PAREN)).then(|| {
                    self.pos += 1;
                    value
                })
            }
            _ if text == "defined" => {
                let parenthesized = self.peek(0) == Some(SyntaxKind::L_PAREN);
                if parenthesized {
                    self.pos += 1;
                }
                let (_, name) = *self.tokens.get(self.pos)?;
                self.pos += 1;
                if parenthesized {
                    if self.peek(0) != Some(SyntaxKind::R_PAREN) {
                        return None;
                    }
                    self.pos += 1;
                }
                Some(self.macros.contains_key(name) as i64)
            }
            _ if kind.is_word() => {
                if self.peek(0) == Some(SyntaxKind::L_PAREN) {
                    // Unknown function-like macro or feature test: evaluates to 0
                    let mut depth = 0usize;
                    while let Some(kind) = self.peek(0) {
                        self.pos += 1;
                        match kind {
                            SyntaxKind::L_PAREN => depth += 1,
                            SyntaxKind::R_PAREN => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    return Some(0);
                }
                match text {
                    "true" => Some(1),
                    "false" => Some(0),
                    _ => Some(
                        self.macros
                            .get(text)
                            .and_then(|m| match m.body.as_slice() {
                                [(SyntaxKind::INT_NUMBER, value)] => parse_int(value),
                                _ => None,
                            })
                            .unwrap_or(0),
                    ),
                }
            }
            _ => None,
        }
    }
}
