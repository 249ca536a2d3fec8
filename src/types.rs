//! C++ type expressions.
//!
//! [`TypeExpr`] is the structured form of a type spelling such as
//! `const std::array<float, 3>&` or `char const *`. Printing is canonical:
//! `TypeExpr::parse(&t.to_string()) == t` for every parsed `t`, and two
//! spellings of the same type print identically.

use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::frontend::{SyntaxKind, tokenize};

/// Nesting bound for alias resolution; deeper chains are left unresolved.
const MAX_ALIAS_DEPTH: usize = 16;

/// Words that combine into fundamental types
const FUNDAMENTAL_WORDS: &[&str] = &[
    "void", "bool", "char", "wchar_t", "char8_t", "char16_t", "char32_t", "short", "int", "long",
    "signed", "unsigned", "float", "double", "auto",
];

/// A parsed C++ type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct TypeExpr {
    pub is_const: bool,
    pub is_volatile: bool,
    pub base: BaseType,
    /// Pointer and reference declarators, innermost first
    /// (`const char* const&` has `[Pointer { const }, LValueRef]`).
    pub declarators: Vec<Indirection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// `void`, `unsigned long`, `long double`, ... in canonical spelling
    Fundamental(SmolStr),
    Named(TypeName),
}

/// A possibly qualified, possibly templated name: `std::array<float, 3>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Written with a leading `::`
    pub global: bool,
    pub segments: Vec<NameSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameSegment {
    pub name: SmolStr,
    pub args: Option<Vec<TemplateArg>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum TemplateArg {
    Type(TypeExpr),
    /// A non-type argument kept as normalized text (`3`, `N + 1`, `true`)
    Value(SmolStr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indirection {
    Pointer { is_const: bool },
    LValueRef,
    RValueRef,
}

// ============================================================================
// Construction and inspection
// ============================================================================

impl TypeExpr {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let tokens: Vec<(SyntaxKind, &str)> = tokenize(text)
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect();
        let mut parser = TypeParser { tokens: &tokens, pos: 0 };
        let ty = parser
            .parse_type()
            .ok_or_else(|| ParseError::new(format!("cannot parse type `{text}`"), None))?;
        if parser.pos != tokens.len() {
            return Err(ParseError::new(
                format!("unexpected `{}` in type `{text}`", tokens[parser.pos].1),
                None,
            ));
        }
        Ok(ty)
    }

    pub fn fundamental(name: &str) -> Self {
        Self::bare(BaseType::Fundamental(SmolStr::new(name)))
    }

    /// A single unqualified name without template arguments.
    pub fn named(name: &str) -> Self {
        Self::bare(BaseType::Named(TypeName::simple(name)))
    }

    pub fn void() -> Self {
        Self::fundamental("void")
    }

    fn bare(base: BaseType) -> Self {
        Self {
            is_const: false,
            is_volatile: false,
            base,
            declarators: Vec::new(),
        }
    }

    pub fn is_void(&self) -> bool {
        self.declarators.is_empty() && matches!(&self.base, BaseType::Fundamental(f) if f == "void")
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self.declarators.last(),
            Some(Indirection::LValueRef | Indirection::RValueRef)
        )
    }

    pub fn pointer_depth(&self) -> usize {
        self.declarators
            .iter()
            .filter(|d| matches!(d, Indirection::Pointer { .. }))
            .count()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.declarators.last(), Some(Indirection::Pointer { .. }))
    }

    /// Whether the object this type denotes (or refers to) is const:
    /// `const int`, `const A&`, `char* const`.
    pub fn is_const_object(&self) -> bool {
        let mut declarators = self.declarators.iter().rev().peekable();
        while declarators
            .peek()
            .is_some_and(|d| matches!(d, Indirection::LValueRef | Indirection::RValueRef))
        {
            declarators.next();
        }
        match declarators.next() {
            Some(Indirection::Pointer { is_const }) => *is_const,
            Some(_) => false,
            None => self.is_const,
        }
    }

    /// The type without outer references and without the const/volatile
    /// qualifiers that apply to the resulting object.
    pub fn strip_ref_cv(&self) -> TypeExpr {
        let mut out = self.clone();
        while matches!(
            out.declarators.last(),
            Some(Indirection::LValueRef | Indirection::RValueRef)
        ) {
            out.declarators.pop();
        }
        match out.declarators.last_mut() {
            Some(Indirection::Pointer { is_const }) => *is_const = false,
            _ => {
                out.is_const = false;
                out.is_volatile = false;
            }
        }
        out
    }

    /// The type a pointer points to, and the pointer's own constness dropped.
    pub fn pointee(&self) -> Option<TypeExpr> {
        let mut out = self.strip_ref_cv();
        match out.declarators.pop() {
            Some(Indirection::Pointer { .. }) => Some(out),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&TypeName> {
        match &self.base {
            BaseType::Named(name) => Some(name),
            BaseType::Fundamental(_) => None,
        }
    }

    /// Canonical fundamental spelling, if this is one without declarators.
    pub fn as_fundamental(&self) -> Option<&str> {
        match &self.base {
            BaseType::Fundamental(f) if self.declarators.is_empty() => Some(f),
            _ => None,
        }
    }

    /// Whether any name in the type starts with namespace `ns`.
    pub fn mentions_namespace(&self, ns: &str) -> bool {
        match &self.base {
            BaseType::Fundamental(_) => false,
            BaseType::Named(name) => {
                (name.segments.len() > 1 && name.segments[0].name == ns)
                    || name.segments.iter().any(|s| {
                        s.args.iter().flatten().any(|a| match a {
                            TemplateArg::Type(t) => t.mentions_namespace(ns),
                            TemplateArg::Value(_) => false,
                        })
                    })
            }
        }
    }

    /// Every qualified path named in the type, outermost first.
    pub fn named_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths(&self, out: &mut Vec<String>) {
        if let BaseType::Named(name) = &self.base {
            out.push(name.path());
            for arg in name.segments.iter().flat_map(|s| s.args.iter().flatten()) {
                if let TemplateArg::Type(t) = arg {
                    t.collect_paths(out);
                }
            }
        }
    }
}

impl TypeName {
    pub fn simple(name: &str) -> Self {
        Self {
            global: false,
            segments: vec![NameSegment {
                name: SmolStr::new(name),
                args: None,
            }],
        }
    }

    /// The name without template arguments: `std::array`.
    pub fn path(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("::")
    }

    pub fn segment_names(&self) -> Vec<SmolStr> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }

    pub fn last(&self) -> Option<&NameSegment> {
        self.segments.last()
    }

    /// Template arguments of the last segment.
    pub fn args(&self) -> &[TemplateArg] {
        self.segments
            .last()
            .and_then(|s| s.args.as_deref())
            .unwrap_or(&[])
    }

    /// A single segment without arguments, e.g. a template parameter.
    pub fn as_simple(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [only] if !self.global && only.args.is_none() => Some(&only.name),
            _ => None,
        }
    }
}

impl TemplateArg {
    /// Parse a single argument spelling (`int`, `3`, `Eigen::RowMajor`).
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let tokens: Vec<(SyntaxKind, &str)> = tokenize(text)
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect();
        if tokens.is_empty() {
            return Err(ParseError::new("empty template argument", None));
        }
        let mut parser = TypeParser { tokens: &tokens, pos: 0 };
        let arg = parser.parse_arg();
        if parser.pos != tokens.len() {
            return Ok(TemplateArg::Value(SmolStr::new(spell_raw(&tokens))));
        }
        Ok(arg)
    }

    /// The argument as an integer constant (`3`, `3u`, `-1`).
    pub fn as_integer(&self) -> Option<i64> {
        let text = match self {
            TemplateArg::Value(v) => v.as_str(),
            TemplateArg::Type(_) => return None,
        };
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let digits: String = digits
            .trim_end_matches(['u', 'U', 'l', 'L', 'z', 'Z'])
            .chars()
            .filter(|c| *c != '\'')
            .collect();
        let value = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            i64::from_str_radix(hex, 16).ok()?
        } else {
            digits.parse::<i64>().ok()?
        };
        Some(if negative { -value } else { value })
    }

    pub fn as_type(&self) -> Option<&TypeExpr> {
        match self {
            TemplateArg::Type(t) => Some(t),
            TemplateArg::Value(_) => None,
        }
    }

    /// Last name segment of a type argument or the value text:
    /// `Eigen::RowMajor` → `RowMajor`.
    pub fn last_word(&self) -> Option<&str> {
        match self {
            TemplateArg::Type(t) => t.name().and_then(|n| n.last()).map(|s| s.name.as_str()),
            TemplateArg::Value(v) => Some(v.as_str()),
        }
    }
}

// ============================================================================
// Transformations
// ============================================================================

/// Template parameter bindings, in parameter order.
pub type Bindings = IndexMap<SmolStr, TemplateArg>;

impl TypeExpr {
    /// Replace template parameter names with their bound arguments.
    pub fn substitute(&self, bindings: &Bindings) -> TypeExpr {
        if bindings.is_empty() {
            return self.clone();
        }
        if let Some(param) = self.name().and_then(TypeName::as_simple) {
            match bindings.get(param) {
                Some(TemplateArg::Type(bound)) => return self.apply_onto(bound),
                Some(TemplateArg::Value(value)) => {
                    let mut out = self.clone();
                    out.base = BaseType::Named(TypeName::simple(value));
                    return out;
                }
                None => {}
            }
        }
        let mut out = self.clone();
        if let BaseType::Named(name) = &mut out.base {
            for segment in &mut name.segments {
                if let Some(args) = &mut segment.args {
                    for arg in args.iter_mut() {
                        *arg = arg.substitute(bindings);
                    }
                }
            }
        }
        out
    }

    /// Combine this type's qualifiers and declarators with `inner` standing
    /// in for the base: `const T&` onto `int*` is `int* const&`.
    fn apply_onto(&self, inner: &TypeExpr) -> TypeExpr {
        let mut out = inner.clone();
        if self.is_const || self.is_volatile {
            match out.declarators.last_mut() {
                Some(Indirection::Pointer { is_const }) => *is_const |= self.is_const,
                Some(_) => {}
                None => {
                    out.is_const |= self.is_const;
                    out.is_volatile |= self.is_volatile;
                }
            }
        }
        out.declarators.extend(self.declarators.iter().copied());
        // `T&` with T = `int&` collapses to `int&`
        collapse_references(&mut out.declarators);
        out
    }

    /// Expand names that `lookup` knows as aliases (`using Matrix = ...;`).
    pub fn resolve_aliases(&self, lookup: &dyn Fn(&TypeName) -> Option<TypeExpr>) -> TypeExpr {
        self.resolve_aliases_at(lookup, 0)
    }

    fn resolve_aliases_at(
        &self,
        lookup: &dyn Fn(&TypeName) -> Option<TypeExpr>,
        depth: usize,
    ) -> TypeExpr {
        if depth >= MAX_ALIAS_DEPTH {
            return self.clone();
        }
        let mut out = self.clone();
        if let BaseType::Named(name) = &mut out.base {
            for segment in &mut name.segments {
                if let Some(args) = &mut segment.args {
                    for arg in args.iter_mut() {
                        if let TemplateArg::Type(t) = arg {
                            *t = t.resolve_aliases_at(lookup, depth + 1);
                        }
                    }
                }
            }
            if let Some(target) = lookup(name) {
                let target = target.resolve_aliases_at(lookup, depth + 1);
                return out.apply_onto(&target);
            }
        }
        out
    }

    /// Prefix names with the namespaces `prefix_for` reports for them.
    ///
    /// `prefix_for` receives the written path segments (`["Inner"]`) and
    /// returns the namespace path to put in front (`["outer"]`), if any.
    pub fn qualify(&self, prefix_for: &dyn Fn(&[SmolStr]) -> Option<Vec<SmolStr>>) -> TypeExpr {
        let mut out = self.clone();
        if let BaseType::Named(name) = &mut out.base {
            for segment in &mut name.segments {
                if let Some(args) = &mut segment.args {
                    for arg in args.iter_mut() {
                        if let TemplateArg::Type(t) = arg {
                            *t = t.qualify(prefix_for);
                        }
                    }
                }
            }
            if !name.global {
                if let Some(prefix) = prefix_for(&name.segment_names()) {
                    let mut segments: Vec<NameSegment> = prefix
                        .into_iter()
                        .map(|name| NameSegment { name, args: None })
                        .collect();
                    segments.append(&mut name.segments);
                    name.segments = segments;
                }
            }
        }
        out
    }

    /// Deduce bindings for `params` such that `self` (the pattern) with
    /// them substituted equals `concrete`. Returns false on mismatch;
    /// `bindings` may then hold partial results.
    pub fn unify(&self, concrete: &TypeExpr, params: &[SmolStr], bindings: &mut Bindings) -> bool {
        if let Some(param) = self.name().and_then(TypeName::as_simple) {
            if params.iter().any(|p| p == param) {
                return self.bind_param(param, concrete, bindings);
            }
        }
        if self.is_const != concrete.is_const
            || self.is_volatile != concrete.is_volatile
            || self.declarators != concrete.declarators
        {
            return false;
        }
        match (&self.base, &concrete.base) {
            (BaseType::Fundamental(a), BaseType::Fundamental(b)) => a == b,
            (BaseType::Named(a), BaseType::Named(b)) => {
                a.segments.len() == b.segments.len()
                    && a.segments.iter().zip(&b.segments).all(|(x, y)| {
                        x.name == y.name
                            && match (&x.args, &y.args) {
                                (None, None) => true,
                                (Some(xs), Some(ys)) => {
                                    xs.len() == ys.len()
                                        && xs
                                            .iter()
                                            .zip(ys)
                                            .all(|(p, c)| p.unify(c, params, bindings))
                                }
                                _ => false,
                            }
                    })
            }
            _ => false,
        }
    }

    fn bind_param(&self, param: &str, concrete: &TypeExpr, bindings: &mut Bindings) -> bool {
        // The pattern's qualifiers and declarators must be present on the
        // concrete type; what remains is the deduced argument.
        let n = self.declarators.len();
        if concrete.declarators.len() < n
            || concrete.declarators[concrete.declarators.len() - n..] != self.declarators[..]
        {
            return false;
        }
        let mut deduced = concrete.clone();
        deduced.declarators.truncate(concrete.declarators.len() - n);
        if self.is_const || self.is_volatile {
            if !deduced.declarators.is_empty()
                || (self.is_const && !concrete.is_const)
                || (self.is_volatile && !concrete.is_volatile)
            {
                return false;
            }
            deduced.is_const &= !self.is_const;
            deduced.is_volatile &= !self.is_volatile;
        }
        bind(param, TemplateArg::Type(deduced), bindings)
    }
}

impl TemplateArg {
    pub fn substitute(&self, bindings: &Bindings) -> TemplateArg {
        match self {
            TemplateArg::Type(t) => {
                if let Some(param) = t.name().and_then(TypeName::as_simple) {
                    if let Some(bound) = bindings.get(param) {
                        if t.declarators.is_empty() && !t.is_const && !t.is_volatile {
                            return bound.clone();
                        }
                    }
                }
                TemplateArg::Type(t.substitute(bindings))
            }
            TemplateArg::Value(v) => {
                let tokens: Vec<(SyntaxKind, String)> = tokenize(v)
                    .into_iter()
                    .filter(|t| !t.kind.is_trivia())
                    .map(|t| match (t.kind, bindings.get(t.text)) {
                        (SyntaxKind::IDENT, Some(bound)) => (SyntaxKind::IDENT, bound.to_string()),
                        _ => (t.kind, t.text.to_string()),
                    })
                    .collect();
                let borrowed: Vec<(SyntaxKind, &str)> =
                    tokens.iter().map(|(k, s)| (*k, s.as_str())).collect();
                TemplateArg::Value(SmolStr::new(spell_raw(&borrowed)))
            }
        }
    }

    /// See [`TypeExpr::unify`].
    pub fn unify(&self, concrete: &TemplateArg, params: &[SmolStr], bindings: &mut Bindings) -> bool {
        match (self, concrete) {
            (TemplateArg::Type(p), c) if is_param(p, params) => {
                let param = p.name().and_then(TypeName::as_simple).unwrap_or_default();
                match c {
                    TemplateArg::Type(ct) => p.bind_param(param, ct, bindings),
                    TemplateArg::Value(_) => bind(param, c.clone(), bindings),
                }
            }
            (TemplateArg::Type(p), TemplateArg::Type(c)) => p.unify(c, params, bindings),
            (TemplateArg::Value(p), TemplateArg::Value(c)) => {
                p == c || (self.as_integer().is_some() && self.as_integer() == concrete.as_integer())
            }
            _ => false,
        }
    }
}

fn is_param(ty: &TypeExpr, params: &[SmolStr]) -> bool {
    ty.name()
        .and_then(TypeName::as_simple)
        .is_some_and(|name| params.iter().any(|p| p == name))
}

fn bind(param: &str, arg: TemplateArg, bindings: &mut Bindings) -> bool {
    match bindings.get(param) {
        Some(existing) => *existing == arg,
        None => {
            bindings.insert(SmolStr::new(param), arg);
            true
        }
    }
}

fn collapse_references(declarators: &mut Vec<Indirection>) {
    let mut i = 1;
    while i < declarators.len() {
        let pair = (declarators[i - 1], declarators[i]);
        match pair {
            (Indirection::LValueRef | Indirection::RValueRef, Indirection::LValueRef)
            | (Indirection::LValueRef, Indirection::RValueRef) => {
                declarators[i - 1] = Indirection::LValueRef;
                declarators.remove(i);
            }
            (Indirection::RValueRef, Indirection::RValueRef) => {
                declarators.remove(i);
            }
            _ => i += 1,
        }
    }
}

// ============================================================================
// Printing
// ============================================================================

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        if self.is_volatile {
            f.write_str("volatile ")?;
        }
        match &self.base {
            BaseType::Fundamental(name) => f.write_str(name)?,
            BaseType::Named(name) => write!(f, "{}", name)?,
        }
        for declarator in &self.declarators {
            match declarator {
                Indirection::Pointer { is_const: false } => f.write_str("*")?,
                Indirection::Pointer { is_const: true } => f.write_str("* const")?,
                Indirection::LValueRef => f.write_str("&")?,
                Indirection::RValueRef => f.write_str("&&")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.global {
            f.write_str("::")?;
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            f.write_str(&segment.name)?;
            if let Some(args) = &segment.args {
                f.write_str("<")?;
                for (j, arg) in args.iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateArg::Type(t) => write!(f, "{}", t),
            TemplateArg::Value(v) => f.write_str(v),
        }
    }
}

impl From<TypeExpr> for String {
    fn from(ty: TypeExpr) -> Self {
        ty.to_string()
    }
}

impl From<TemplateArg> for String {
    fn from(arg: TemplateArg) -> Self {
        arg.to_string()
    }
}

impl FromStr for TypeExpr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeExpr::parse(s)
    }
}

/// Spell raw tokens: words separated by a space, `, ` after commas and
/// operators surrounded by spaces.
fn spell_raw(tokens: &[(SyntaxKind, &str)]) -> String {
    let mut out = String::new();
    let mut last: Option<SyntaxKind> = None;
    for (kind, text) in tokens {
        if let Some(prev) = last {
            let word = |k: SyntaxKind| k.is_word() || k.is_literal();
            // a leading sign binds to its operand: `-1`
            let unary = matches!(prev, SyntaxKind::MINUS | SyntaxKind::PLUS) && out.len() == 1;
            if prev == SyntaxKind::COMMA
                || (word(prev) && word(*kind))
                || (is_operator(*kind) && prev != SyntaxKind::L_PAREN)
                || (is_operator(prev) && !unary)
            {
                out.push(' ');
            }
        }
        out.push_str(text);
        last = Some(*kind);
    }
    out
}

fn is_operator(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        SyntaxKind::PLUS
            | SyntaxKind::MINUS
            | SyntaxKind::STAR
            | SyntaxKind::SLASH
            | SyntaxKind::PERCENT
            | SyntaxKind::PIPE
            | SyntaxKind::CARET
            | SyntaxKind::AMP
            | SyntaxKind::AMP_AMP
    )
}

// ============================================================================
// Parsing
// ============================================================================

struct TypeParser<'a, 't> {
    tokens: &'a [(SyntaxKind, &'t str)],
    pos: usize,
}

impl TypeParser<'_, '_> {
    fn current(&self) -> Option<SyntaxKind> {
        self.tokens.get(self.pos).map(|(k, _)| *k)
    }

    fn text(&self) -> &str {
        self.tokens.get(self.pos).map(|(_, t)| *t).unwrap_or("")
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.current() == Some(kind)
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_cv(&mut self, is_const: &mut bool, is_volatile: &mut bool) {
        loop {
            match self.current() {
                Some(SyntaxKind::CONST_KW) => *is_const = true,
                Some(SyntaxKind::VOLATILE_KW) => *is_volatile = true,
                _ => return,
            }
            self.pos += 1;
        }
    }

    fn parse_type(&mut self) -> Option<TypeExpr> {
        let mut is_const = false;
        let mut is_volatile = false;
        loop {
            self.eat_cv(&mut is_const, &mut is_volatile);
            match self.current() {
                Some(SyntaxKind::TYPENAME_KW | SyntaxKind::ENUM_KW) => self.pos += 1,
                Some(kind) if kind.is_class_key() => self.pos += 1,
                _ => break,
            }
        }

        let base = if FUNDAMENTAL_WORDS.contains(&self.text()) && self.at(SyntaxKind::IDENT) {
            let mut words = Vec::new();
            loop {
                if self.at(SyntaxKind::IDENT) && FUNDAMENTAL_WORDS.contains(&self.text()) {
                    words.push(self.text().to_string());
                    self.pos += 1;
                } else if matches!(
                    self.current(),
                    Some(SyntaxKind::CONST_KW | SyntaxKind::VOLATILE_KW)
                ) {
                    self.eat_cv(&mut is_const, &mut is_volatile);
                } else {
                    break;
                }
            }
            BaseType::Fundamental(SmolStr::new(canonical_fundamental(&words)))
        } else {
            BaseType::Named(self.parse_name()?)
        };
        self.eat_cv(&mut is_const, &mut is_volatile);

        let mut declarators = Vec::new();
        loop {
            match self.current() {
                Some(SyntaxKind::STAR) => {
                    self.pos += 1;
                    let mut ptr_const = false;
                    let mut ptr_volatile = false;
                    self.eat_cv(&mut ptr_const, &mut ptr_volatile);
                    declarators.push(Indirection::Pointer { is_const: ptr_const });
                }
                Some(SyntaxKind::AMP) => {
                    self.pos += 1;
                    declarators.push(Indirection::LValueRef);
                }
                Some(SyntaxKind::AMP_AMP) => {
                    self.pos += 1;
                    declarators.push(Indirection::RValueRef);
                }
                _ => break,
            }
        }

        Some(TypeExpr {
            is_const,
            is_volatile,
            base,
            declarators,
        })
    }

    fn parse_name(&mut self) -> Option<TypeName> {
        let global = self.eat(SyntaxKind::COLON_COLON);
        let mut segments = Vec::new();
        loop {
            self.eat(SyntaxKind::TEMPLATE_KW);
            if !self.at(SyntaxKind::IDENT) {
                return None;
            }
            let name = SmolStr::new(self.text());
            self.pos += 1;
            let args = if self.at(SyntaxKind::L_ANGLE) {
                Some(self.parse_args()?)
            } else {
                None
            };
            segments.push(NameSegment { name, args });
            if !self.eat(SyntaxKind::COLON_COLON) {
                break;
            }
        }
        Some(TypeName { global, segments })
    }

    fn parse_args(&mut self) -> Option<Vec<TemplateArg>> {
        self.pos += 1; // <
        let mut args = Vec::new();
        if self.eat(SyntaxKind::R_ANGLE) {
            return Some(args);
        }
        loop {
            args.push(self.parse_arg());
            if self.eat(SyntaxKind::COMMA) {
                continue;
            }
            if self.eat(SyntaxKind::R_ANGLE) {
                return Some(args);
            }
            return None;
        }
    }

    /// A type when the tokens up to the next `,` or `>` form one, else
    /// the raw value text.
    fn parse_arg(&mut self) -> TemplateArg {
        let start = self.pos;
        let is_value_word = matches!(self.text(), "true" | "false" | "nullptr" | "sizeof");
        if !is_value_word {
            if let Some(ty) = self.parse_type() {
                if self.current().is_none()
                    || self.at(SyntaxKind::COMMA)
                    || self.at(SyntaxKind::R_ANGLE)
                {
                    return TemplateArg::Type(ty);
                }
            }
        }
        self.pos = start;
        let mut depth = 0usize;
        while let Some(kind) = self.current() {
            match kind {
                SyntaxKind::L_PAREN | SyntaxKind::L_ANGLE => depth += 1,
                SyntaxKind::R_PAREN => depth = depth.saturating_sub(1),
                SyntaxKind::COMMA | SyntaxKind::R_ANGLE if depth == 0 => break,
                SyntaxKind::R_ANGLE => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
        TemplateArg::Value(SmolStr::new(spell_raw(&self.tokens[start..self.pos])))
    }
}

/// Canonical spelling of a fundamental type given its words in any order.
fn canonical_fundamental(words: &[String]) -> String {
    let mut signed = false;
    let mut unsigned = false;
    let mut short = false;
    let mut longs = 0;
    let mut base: Option<&str> = None;
    for word in words {
        match word.as_str() {
            "signed" => signed = true,
            "unsigned" => unsigned = true,
            "short" => short = true,
            "long" => longs += 1,
            "int" => base = base.or(Some("int")),
            other => base = Some(other),
        }
    }
    match base {
        Some("char") if signed => "signed char".to_string(),
        Some("char") if unsigned => "unsigned char".to_string(),
        Some("double") if longs > 0 => "long double".to_string(),
        Some(other) if other != "int" => other.to_string(),
        _ => {
            let width = if short {
                "short"
            } else if longs >= 2 {
                "long long"
            } else if longs == 1 {
                "long"
            } else {
                "int"
            };
            if unsigned {
                format!("unsigned {width}")
            } else {
                width.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ty(text: &str) -> TypeExpr {
        TypeExpr::parse(text).unwrap()
    }

    #[rstest]
    #[case("int", "int")]
    #[case("unsigned", "unsigned int")]
    #[case("long int unsigned", "unsigned long")]
    #[case("signed char", "signed char")]
    #[case("long long int", "long long")]
    #[case("char const *", "const char*")]
    #[case("const char * const", "const char* const")]
    #[case("std :: array< float,3 > const &", "const std::array<float, 3>&")]
    #[case("Eigen::Tensor<float, 4, Eigen::RowMajor>", "Eigen::Tensor<float, 4, Eigen::RowMajor>")]
    #[case("std::vector<std::vector<int>>", "std::vector<std::vector<int>>")]
    #[case("typename T::value_type&&", "T::value_type&&")]
    #[case("std::array<int, N + 1>", "std::array<int, N + 1>")]
    #[case("::ns::A*", "::ns::A*")]
    fn test_canonical_printing(#[case] input: &str, #[case] expected: &str) {
        let parsed = ty(input);
        assert_eq!(parsed.to_string(), expected);
        assert_eq!(ty(expected), parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TypeExpr::parse("int )").is_err());
        assert!(TypeExpr::parse("").is_err());
        assert!(TypeExpr::parse("std::array<int").is_err());
    }

    #[test]
    fn test_template_args_are_classified() {
        let t = ty("Eigen::Matrix<double, Eigen::Dynamic, 1>");
        let args = t.name().unwrap().args();
        assert!(matches!(args[0], TemplateArg::Type(_)));
        assert_eq!(args[2], TemplateArg::Value("1".into()));
        assert_eq!(args[2].as_integer(), Some(1));
        assert_eq!(args[1].last_word(), Some("Dynamic"));
        assert_eq!(TemplateArg::parse("3u").unwrap().as_integer(), Some(3));
        assert_eq!(TemplateArg::parse("true").unwrap(), TemplateArg::Value("true".into()));
    }

    #[test]
    fn test_substitute_types_and_values() {
        let mut bindings = Bindings::new();
        bindings.insert("T".into(), TemplateArg::Type(ty("int")));
        bindings.insert("N".into(), TemplateArg::Value("3".into()));
        assert_eq!(
            ty("const std::array<T, N>&").substitute(&bindings).to_string(),
            "const std::array<int, 3>&"
        );
        assert_eq!(ty("T*").substitute(&bindings).to_string(), "int*");
        assert_eq!(
            ty("std::array<T, N + 1>").substitute(&bindings).to_string(),
            "std::array<int, 3 + 1>"
        );

        // Qualifiers of the pattern apply to the pointer, not the pointee
        let mut pointer = Bindings::new();
        pointer.insert("T".into(), TemplateArg::Type(ty("char*")));
        assert_eq!(ty("const T").substitute(&pointer).to_string(), "char* const");
        let mut reference = Bindings::new();
        reference.insert("T".into(), TemplateArg::Type(ty("int&")));
        assert_eq!(ty("T&&").substitute(&reference).to_string(), "int&");
    }

    #[test]
    fn test_resolve_aliases() {
        let lookup = |name: &TypeName| match name.path().as_str() {
            "Matrix" => Some(ty("Eigen::MatrixXd")),
            "Tensor3" => Some(ty("Eigen::Tensor<float, 3>")),
            "Loop" => Some(ty("Loop")),
            _ => None,
        };
        assert_eq!(
            ty("const Matrix&").resolve_aliases(&lookup).to_string(),
            "const Eigen::MatrixXd&"
        );
        assert_eq!(
            ty("std::vector<Tensor3>").resolve_aliases(&lookup).to_string(),
            "std::vector<Eigen::Tensor<float, 3>>"
        );
        assert_eq!(ty("Loop").resolve_aliases(&lookup).to_string(), "Loop");
    }

    #[test]
    fn test_qualify_prefixes_known_names() {
        let prefix_for = |segments: &[SmolStr]| {
            (segments.first().map(SmolStr::as_str) == Some("MyType"))
                .then(|| vec![SmolStr::new("my_namespace")])
        };
        assert_eq!(
            ty("const MyType&").qualify(&prefix_for).to_string(),
            "const my_namespace::MyType&"
        );
        assert_eq!(
            ty("std::vector<MyType>").qualify(&prefix_for).to_string(),
            "std::vector<my_namespace::MyType>"
        );
        assert_eq!(ty("::MyType").qualify(&prefix_for).to_string(), "::MyType");
    }

    #[test]
    fn test_unify_deduces_bindings() {
        let params = [SmolStr::new("Scalar"), SmolStr::new("N")];
        let mut bindings = Bindings::new();
        assert!(ty("std::array<Scalar, N>").unify(
            &ty("std::array<float, 3>"),
            &params,
            &mut bindings
        ));
        assert_eq!(bindings["Scalar"].to_string(), "float");
        assert_eq!(bindings["N"], TemplateArg::Value("3".into()));

        let mut bindings = Bindings::new();
        assert!(ty("const Scalar&").unify(&ty("const double&"), &params, &mut bindings));
        assert_eq!(bindings["Scalar"].to_string(), "double");

        let mut bindings = Bindings::new();
        assert!(!ty("std::pair<Scalar, Scalar>").unify(
            &ty("std::pair<int, float>"),
            &params,
            &mut bindings
        ));
        assert!(!ty("std::vector<Scalar>").unify(&ty("std::list<int>"), &params, &mut bindings));
    }

    #[test]
    fn test_const_object_and_stripping() {
        assert!(ty("const int").is_const_object());
        assert!(ty("const A&").is_const_object());
        assert!(!ty("const char*").is_const_object());
        assert!(ty("char* const").is_const_object());
        assert_eq!(ty("const std::string&").strip_ref_cv().to_string(), "std::string");
        assert_eq!(ty("const char* const&").strip_ref_cv().to_string(), "const char*");
        assert_eq!(ty("const char*").pointee().unwrap().to_string(), "const char");
        assert!(ty("void").is_void());
        assert!(!ty("void*").is_void());
        assert!(ty("std::vector<Eigen::MatrixXd>").mentions_namespace("Eigen"));
        assert!(!ty("Matrix").mentions_namespace("Eigen"));
    }
}
